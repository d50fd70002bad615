//! Platform key facility abstraction.
//!
//! A provider owns symmetric key material addressed by alias and performs the
//! cipher operations with it; callers never see the key bytes. Three backends:
//! - OS keyring (Keychain / Credential Manager / Secret Service)
//! - owner-only key files, for hosts without a keyring daemon
//! - process memory, for tests

mod file;
mod memory;
mod os_keyring;

use base64::{engine::general_purpose, Engine as _};
use zeroize::Zeroizing;

use crate::crypto::{self, AeadFailure, KEY_LEN};
use crate::error::KeyError;

pub use self::file::FileKeyProvider;
pub use self::memory::MemoryKeyProvider;
pub use self::os_keyring::{KeyringKeyProvider, KEYRING_SERVICE};

pub(crate) type KeyBytes = Zeroizing<[u8; KEY_LEN]>;

pub trait KeyProvider: Send + Sync {
    /// Create key material under `alias` unless it already exists.
    /// Calling this again never replaces an existing key.
    fn ensure_key(&self, alias: &str) -> Result<(), KeyError>;

    /// Encrypt with the key under `alias`. Output is randomized.
    fn encrypt(&self, alias: &str, plaintext: &[u8]) -> Result<Vec<u8>, KeyError>;

    /// Decrypt a blob produced by `encrypt`. Any failure, including a missing
    /// key, is reported as `KeyError::DecryptFailed`.
    fn decrypt(&self, alias: &str, ciphertext: &[u8]) -> Result<Zeroizing<Vec<u8>>, KeyError>;

    fn has_key(&self, alias: &str) -> Result<bool, KeyError>;

    /// Remove the key under `alias`. Everything sealed with it becomes
    /// unreadable. Deleting a missing key is not an error.
    fn delete_key(&self, alias: &str) -> Result<(), KeyError>;
}

pub(crate) fn seal_with(
    key: &KeyBytes,
    alias: &str,
    plaintext: &[u8],
) -> Result<Vec<u8>, KeyError> {
    crypto::encrypt(&key[..], plaintext, alias.as_bytes()).map_err(|e| match e {
        AeadFailure::InvalidKey => KeyError::unavailable(alias, "invalid key material"),
        AeadFailure::Encrypt | AeadFailure::Decrypt => {
            KeyError::unavailable(alias, "encryption failed")
        }
    })
}

pub(crate) fn open_with(
    key: &KeyBytes,
    alias: &str,
    ciphertext: &[u8],
) -> Result<Zeroizing<Vec<u8>>, KeyError> {
    crypto::decrypt(&key[..], ciphertext, alias.as_bytes()).map_err(|_| KeyError::DecryptFailed)
}

pub(crate) fn encode_key(key: &KeyBytes) -> Zeroizing<String> {
    Zeroizing::new(general_purpose::STANDARD.encode(&key[..]))
}

pub(crate) fn decode_key(encoded: &str) -> Result<KeyBytes, String> {
    let bytes = Zeroizing::new(
        general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|e| format!("decode key: {e}"))?,
    );
    if bytes.len() != KEY_LEN {
        return Err(format!("key length {} (expected {KEY_LEN})", bytes.len()));
    }
    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    key.copy_from_slice(&bytes);
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_encoding_roundtrip() {
        let key = crypto::generate_key();
        let encoded = encode_key(&key);
        let decoded = decode_key(&encoded).unwrap();
        assert_eq!(&key[..], &decoded[..]);
    }

    #[test]
    fn decode_rejects_wrong_length() {
        let short = general_purpose::STANDARD.encode([7u8; 16]);
        assert!(decode_key(&short).is_err());
        assert!(decode_key("not base64 !!").is_err());
    }

    #[test]
    fn ciphertext_is_bound_to_alias() {
        let key = crypto::generate_key();
        let ct = seal_with(&key, "alias-one", b"value").unwrap();
        assert_eq!(
            open_with(&key, "alias-two", &ct).unwrap_err(),
            KeyError::DecryptFailed
        );
        assert_eq!(open_with(&key, "alias-one", &ct).unwrap().as_slice(), b"value");
    }
}
