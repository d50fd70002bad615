//! Turns `(name, plaintext)` into `(hashed name, ciphertext)` and back.
//!
//! Ciphertext is base64 (standard alphabet, padded) when written to the
//! medium, which only stores typed scalars and strings.

use std::sync::Arc;

use base64::{engine::general_purpose, Engine as _};

use crate::digest;
use crate::error::KeyError;
use crate::key_provider::KeyProvider;
use crate::medium::{EditOp, PreferenceMedium, Value};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedValue {
    pub hashed_name: String,
    pub ciphertext: Vec<u8>,
}

impl SealedValue {
    pub fn encoded_ciphertext(&self) -> String {
        general_purpose::STANDARD.encode(&self.ciphertext)
    }

    pub fn into_edit(self) -> EditOp {
        let encoded = self.encoded_ciphertext();
        EditOp::Put(self.hashed_name, Value::String(encoded))
    }
}

#[derive(Clone)]
pub struct SecureValueCodec {
    keys: Arc<dyn KeyProvider>,
}

impl SecureValueCodec {
    pub fn new(keys: Arc<dyn KeyProvider>) -> Self {
        Self { keys }
    }

    pub fn hashed_name(&self, name: &str) -> String {
        digest::hash(name)
    }

    pub fn seal(&self, alias: &str, name: &str, value: &str) -> Result<SealedValue, KeyError> {
        let ciphertext = self.keys.encrypt(alias, value.as_bytes())?;
        Ok(SealedValue {
            hashed_name: self.hashed_name(name),
            ciphertext,
        })
    }

    /// Decrypted value of `name`, or `default` when it is absent or cannot be
    /// read back for any reason. Never fails.
    pub fn open(
        &self,
        medium: &dyn PreferenceMedium,
        alias: &str,
        name: &str,
        default: &str,
    ) -> String {
        self.try_open(medium, alias, name)
            .unwrap_or_else(|| default.to_string())
    }

    /// Same contract as [`open`](Self::open) with `None` standing in for the
    /// default.
    pub fn try_open(
        &self,
        medium: &dyn PreferenceMedium,
        alias: &str,
        name: &str,
    ) -> Option<String> {
        let hashed = self.hashed_name(name);
        let encoded = match medium.get(&hashed)? {
            Value::String(encoded) => encoded,
            other => {
                tracing::warn!(
                    entry = %hashed,
                    found = other.type_name(),
                    "secure entry has wrong type, using default"
                );
                return None;
            }
        };
        let ciphertext = match general_purpose::STANDARD.decode(encoded.as_bytes()) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(
                    entry = %hashed,
                    error = %e,
                    "secure entry is not base64, using default"
                );
                return None;
            }
        };
        let plaintext = match self.keys.decrypt(alias, &ciphertext) {
            Ok(plaintext) => plaintext,
            Err(e) => {
                tracing::warn!(
                    entry = %hashed,
                    alias,
                    error = %e,
                    "secure entry unreadable, using default"
                );
                return None;
            }
        };
        match std::str::from_utf8(&plaintext) {
            Ok(text) => Some(text.to_string()),
            Err(_) => {
                tracing::warn!(entry = %hashed, "secure entry is not UTF-8, using default");
                None
            }
        }
    }
}
