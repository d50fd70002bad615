use std::collections::HashMap;
use std::fmt;

use keyring::Entry;
use parking_lot::Mutex;
use zeroize::Zeroizing;

use super::{decode_key, encode_key, open_with, seal_with, KeyBytes, KeyProvider};
use crate::crypto::generate_key;
use crate::error::KeyError;

/// Service name under which key entries are filed in the platform keyring.
pub const KEYRING_SERVICE: &str = "prefs-keystore";

/// Key material lives in the platform keyring as base64 text, one entry per
/// alias. The first successful load is cached for the life of the provider.
///
/// All keyring calls happen under the cache lock: the Secret Service and
/// Credential Manager backends are not guaranteed to be reentrant.
pub struct KeyringKeyProvider {
    service: String,
    cache: Mutex<HashMap<String, KeyBytes>>,
}

impl KeyringKeyProvider {
    pub fn new() -> Self {
        Self::with_service(KEYRING_SERVICE)
    }

    /// Use a custom service name (separates applications or test runs).
    pub fn with_service(service: &str) -> Self {
        Self {
            service: service.to_string(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn entry(&self, alias: &str) -> Result<Entry, keyring::Error> {
        Entry::new(&self.service, alias)
    }

    /// Cached key, else the keyring entry. `Ok(None)` when no entry exists.
    fn load_locked(
        &self,
        cache: &mut HashMap<String, KeyBytes>,
        alias: &str,
    ) -> Result<Option<KeyBytes>, String> {
        if let Some(key) = cache.get(alias) {
            return Ok(Some(key.clone()));
        }
        let entry = self.entry(alias).map_err(|e| format!("keyring init: {e}"))?;
        match entry.get_password() {
            Ok(encoded) => {
                let encoded = Zeroizing::new(encoded);
                let key = decode_key(&encoded)?;
                tracing::debug!(alias, "loaded key from keyring");
                cache.insert(alias.to_string(), key.clone());
                Ok(Some(key))
            }
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(format!("load key: {e}")),
        }
    }
}

impl Default for KeyringKeyProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for KeyringKeyProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyringKeyProvider")
            .field("service", &self.service)
            .finish_non_exhaustive()
    }
}

impl KeyProvider for KeyringKeyProvider {
    fn ensure_key(&self, alias: &str) -> Result<(), KeyError> {
        let mut cache = self.cache.lock();
        match self.load_locked(&mut cache, alias) {
            Ok(Some(_)) => return Ok(()),
            Ok(None) => {}
            Err(reason) => return Err(KeyError::generation(alias, reason)),
        }

        tracing::info!(alias, "no key in keyring, generating one");
        let key = generate_key();
        let entry = self
            .entry(alias)
            .map_err(|e| KeyError::generation(alias, format!("keyring init: {e}")))?;
        entry
            .set_password(&encode_key(&key))
            .map_err(|e| KeyError::generation(alias, format!("store key: {e}")))?;
        cache.insert(alias.to_string(), key);
        Ok(())
    }

    fn encrypt(&self, alias: &str, plaintext: &[u8]) -> Result<Vec<u8>, KeyError> {
        let key = {
            let mut cache = self.cache.lock();
            self.load_locked(&mut cache, alias)
                .map_err(|reason| KeyError::unavailable(alias, reason))?
                .ok_or_else(|| KeyError::unavailable(alias, "no key under this alias"))?
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
                    tracing::warn!(alias, %reason, "keyring read failed during decrypt");
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
        let entry = self
            .entry(alias)
            .map_err(|e| KeyError::unavailable(alias, format!("keyring init: {e}")))?;
        match entry.delete_password() {
            Ok(()) => {
                tracing::warn!(alias, "key deleted from keyring; sealed values are now unreadable");
                Ok(())
            }
            Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(KeyError::unavailable(alias, format!("delete key: {e}"))),
        }
    }
}
