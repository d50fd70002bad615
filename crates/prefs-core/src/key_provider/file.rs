//! Key files with owner-only permissions.
//!
//! One file per alias, named after a digest of the alias, containing the
//! base64 key. Written through a temp file in the same directory and renamed
//! into place so a crash never leaves a truncated key behind.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use zeroize::Zeroizing;

use super::{decode_key, encode_key, open_with, seal_with, KeyBytes, KeyProvider};
use crate::crypto::generate_key;
use crate::digest;
use crate::error::KeyError;
use crate::paths::restrict_to_owner;

pub struct FileKeyProvider {
    dir: PathBuf,
    cache: Mutex<HashMap<String, KeyBytes>>,
}

impl FileKeyProvider {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn key_path(&self, alias: &str) -> PathBuf {
        self.dir.join(format!("{}.key", &digest::hash(alias)[..32]))
    }

    fn load_locked(
        &self,
        cache: &mut HashMap<String, KeyBytes>,
        alias: &str,
    ) -> Result<Option<KeyBytes>, String> {
        if let Some(key) = cache.get(alias) {
            return Ok(Some(key.clone()));
        }
        let path = self.key_path(alias);
        if !path.exists() {
            return Ok(None);
        }
        let encoded = Zeroizing::new(
            fs::read_to_string(&path).map_err(|e| format!("read {}: {e}", path.display()))?,
        );
        let key = decode_key(&encoded)?;
        cache.insert(alias.to_string(), key.clone());
        Ok(Some(key))
    }

    /// Publish `key` as the key file for `alias` unless one already exists.
    /// Returns `false` when another writer created the file first.
    fn write_new_key(&self, alias: &str, key: &KeyBytes) -> std::io::Result<bool> {
        fs::create_dir_all(&self.dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(encode_key(key).as_bytes())?;
        tmp.as_file().sync_all()?;
        restrict_to_owner(tmp.path())?;
        match tmp.persist_noclobber(self.key_path(alias)) {
            Ok(_) => Ok(true),
            Err(e) if e.error.kind() == std::io::ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(e.error),
        }
    }
}

impl fmt::Debug for FileKeyProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileKeyProvider")
            .field("dir", &self.dir)
            .finish_non_exhaustive()
    }
}

impl KeyProvider for FileKeyProvider {
    fn ensure_key(&self, alias: &str) -> Result<(), KeyError> {
        let mut cache = self.cache.lock();
        match self.load_locked(&mut cache, alias) {
            Ok(Some(_)) => return Ok(()),
            Ok(None) => {}
            Err(reason) => return Err(KeyError::generation(alias, reason)),
        }
        tracing::info!(alias, dir = %self.dir.display(), "creating key file");
        let key = generate_key();
        let created = self
            .write_new_key(alias, &key)
            .map_err(|e| KeyError::generation(alias, format!("write key file: {e}")))?;
        if created {
            cache.insert(alias.to_string(), key);
            return Ok(());
        }

        // Lost the race to another process or handle: adopt the winner's key.
        tracing::debug!(alias, "key file appeared concurrently, loading it");
        match self.load_locked(&mut cache, alias) {
            Ok(Some(_)) => Ok(()),
            Ok(None) => Err(KeyError::generation(alias, "key file vanished after creation race")),
            Err(reason) => Err(KeyError::generation(alias, reason)),
        }
    }

    fn encrypt(&self, alias: &str, plaintext: &[u8]) -> Result<Vec<u8>, KeyError> {
        let key = {
            let mut cache = self.cache.lock();
            self.load_locked(&mut cache, alias)
                .map_err(|reason| KeyError::unavailable(alias, reason))?
                .ok_or_else(|| KeyError::unavailable(alias, "no key file for this alias"))?
        };
        seal_with(&key, alias, plaintext)
    }

    fn decrypt(&self, alias: &str, ciphertext: &[u8]) -> Result<Zeroizing<Vec<u8>>, KeyError> {
        let key = {
            let mut cache = self.cache.lock();
            match self.load_locked(&mut cache, alias) {
                Ok(Some(key)) => key,
                Ok(None) => return Err(KeyError::DecryptFailed),
                Err(reason) => {
                    tracing::warn!(alias, %reason, "key file unreadable during decrypt");
                    return Err(KeyError::DecryptFailed);
                }
            }
        };
        open_with(&key, alias, ciphertext)
    }

    fn has_key(&self, alias: &str) -> Result<bool, KeyError> {
        let mut cache = self.cache.lock();
        self.load_locked(&mut cache, alias)
            .map(|key| key.is_some())
            .map_err(|reason| KeyError::unavailable(alias, reason))
    }

    fn delete_key(&self, alias: &str) -> Result<(), KeyError> {
        let mut cache = self.cache.lock();
        cache.remove(alias);
        let path = self.key_path(alias);
        match fs::remove_file(&path) {
            Ok(()) => {
                tracing::warn!(alias, "key file deleted; sealed values are now unreadable");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(KeyError::unavailable(alias, format!("delete key file: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn key_survives_new_provider_instance() {
        let dir = tempdir().unwrap();
        let first = FileKeyProvider::new(dir.path());
        first.ensure_key("alias").unwrap();
        let ct = first.encrypt("alias", b"persisted").unwrap();

        let second = FileKeyProvider::new(dir.path());
        assert!(second.has_key("alias").unwrap());
        assert_eq!(second.decrypt("alias", &ct).unwrap().as_slice(), b"persisted");
    }

    #[test]
    fn ensure_key_twice_keeps_the_key() {
        let dir = tempdir().unwrap();
        let provider = FileKeyProvider::new(dir.path());
        provider.ensure_key("alias").unwrap();
        let before = fs::read_to_string(provider.key_path("alias")).unwrap();
        provider.ensure_key("alias").unwrap();
        let after = fs::read_to_string(provider.key_path("alias")).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn concurrent_first_use_agrees_on_one_key() {
        use std::sync::{Arc, Barrier};
        use std::thread;

        for _ in 0..10 {
            let dir = tempdir().unwrap();
            let barrier = Arc::new(Barrier::new(8));
            let handles: Vec<_> = (0..8)
                .map(|i| {
                    let dir = dir.path().to_path_buf();
                    let barrier = barrier.clone();
                    thread::spawn(move || {
                        let provider = FileKeyProvider::new(&dir);
                        barrier.wait();
                        provider.ensure_key("alias").unwrap();
                        provider.encrypt("alias", format!("value-{i}").as_bytes()).unwrap()
                    })
                })
                .collect();
            let sealed: Vec<Vec<u8>> = handles.into_iter().map(|h| h.join().unwrap()).collect();

            let fresh = FileKeyProvider::new(dir.path());
            for (i, ct) in sealed.iter().enumerate() {
                let pt = fresh.decrypt("alias", ct).unwrap();
                assert_eq!(pt.as_slice(), format!("value-{i}").as_bytes());
            }
        }
    }

    #[cfg(unix)]
    #[test]
    fn key_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempdir().unwrap();
        let provider = FileKeyProvider::new(dir.path());
        provider.ensure_key("alias").unwrap();
        let mode = fs::metadata(provider.key_path("alias")).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn corrupt_key_file_fails_generation() {
        let dir = tempdir().unwrap();
        let provider = FileKeyProvider::new(dir.path());
        fs::write(provider.key_path("alias"), "garbage").unwrap();
        assert!(matches!(
            provider.ensure_key("alias"),
            Err(KeyError::GenerationFailed { .. })
        ));
    }

    #[test]
    fn delete_then_decrypt_fails() {
        let dir = tempdir().unwrap();
        let provider = FileKeyProvider::new(dir.path());
        provider.ensure_key("alias").unwrap();
        let ct = provider.encrypt("alias", b"gone soon").unwrap();
        provider.delete_key("alias").unwrap();
        assert!(!provider.has_key("alias").unwrap());
        assert_eq!(provider.decrypt("alias", &ct).unwrap_err(), KeyError::DecryptFailed);
        assert!(provider.delete_key("alias").is_ok());
    }
}
