use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use zeroize::Zeroizing;

use super::{open_with, seal_with, KeyBytes, KeyProvider};
use crate::crypto::generate_key;
use crate::error::KeyError;

/// Keys held in process memory only. Used in tests and for throwaway stores.
pub struct MemoryKeyProvider {
    keys: Mutex<HashMap<String, KeyBytes>>,
    refuse_generation: AtomicBool,
}

impl MemoryKeyProvider {
    pub fn new() -> Self {
        Self {
            keys: Mutex::new(HashMap::new()),
            refuse_generation: AtomicBool::new(false),
        }
    }

    /// A provider whose `ensure_key` rejects creation of new keys, like a
    /// device without secure hardware.
    pub fn refusing() -> Self {
        let provider = Self::new();
        provider.set_refuse_generation(true);
        provider
    }

    pub fn set_refuse_generation(&self, refuse: bool) {
        self.refuse_generation.store(refuse, Ordering::SeqCst);
    }

    fn key(&self, alias: &str) -> Option<KeyBytes> {
        self.keys.lock().get(alias).cloned()
    }
}

impl Default for MemoryKeyProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MemoryKeyProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryKeyProvider")
            .field("aliases", &self.keys.lock().len())
            .finish_non_exhaustive()
    }
}

impl KeyProvider for MemoryKeyProvider {
    fn ensure_key(&self, alias: &str) -> Result<(), KeyError> {
        let mut keys = self.keys.lock();
        if keys.contains_key(alias) {
            return Ok(());
        }
        if self.refuse_generation.load(Ordering::SeqCst) {
            return Err(KeyError::generation(alias, "key generation refused"));
        }
        keys.insert(alias.to_string(), generate_key());
        Ok(())
    }

    fn encrypt(&self, alias: &str, plaintext: &[u8]) -> Result<Vec<u8>, KeyError> {
        let key = self
            .key(alias)
            .ok_or_else(|| KeyError::unavailable(alias, "no key under this alias"))?;
        seal_with(&key, alias, plaintext)
    }

    fn decrypt(&self, alias: &str, ciphertext: &[u8]) -> Result<Zeroizing<Vec<u8>>, KeyError> {
        let key = self.key(alias).ok_or(KeyError::DecryptFailed)?;
        open_with(&key, alias, ciphertext)
    }

    fn has_key(&self, alias: &str) -> Result<bool, KeyError> {
        Ok(self.keys.lock().contains_key(alias))
    }

    fn delete_key(&self, alias: &str) -> Result<(), KeyError> {
        self.keys.lock().remove(alias);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_key_is_idempotent() {
        let provider = MemoryKeyProvider::new();
        provider.ensure_key("a").unwrap();
        let ct = provider.encrypt("a", b"before").unwrap();
        provider.ensure_key("a").unwrap();
        assert_eq!(provider.decrypt("a", &ct).unwrap().as_slice(), b"before");
    }

    #[test]
    fn encrypt_without_key_is_unavailable() {
        let provider = MemoryKeyProvider::new();
        assert!(matches!(
            provider.encrypt("missing", b"x"),
            Err(KeyError::Unavailable { .. })
        ));
        assert_eq!(
            provider.decrypt("missing", &[0u8; 64]).unwrap_err(),
            KeyError::DecryptFailed
        );
    }

    #[test]
    fn refusing_provider_fails_generation_but_keeps_existing_keys() {
        let provider = MemoryKeyProvider::new();
        provider.ensure_key("existing").unwrap();
        provider.set_refuse_generation(true);
        assert!(provider.ensure_key("existing").is_ok());
        assert!(matches!(
            provider.ensure_key("new"),
            Err(KeyError::GenerationFailed { .. })
        ));
        assert!(matches!(
            MemoryKeyProvider::refusing().ensure_key("x"),
            Err(KeyError::GenerationFailed { .. })
        ));
    }

    #[test]
    fn recreated_key_does_not_open_old_ciphertext() {
        let provider = MemoryKeyProvider::new();
        provider.ensure_key("a").unwrap();
        let ct = provider.encrypt("a", b"old").unwrap();
        provider.delete_key("a").unwrap();
        provider.ensure_key("a").unwrap();
        assert_eq!(provider.decrypt("a", &ct).unwrap_err(), KeyError::DecryptFailed);
    }
}
