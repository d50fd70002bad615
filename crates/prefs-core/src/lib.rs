//! prefs-core: encrypted persistent preference store
//!
//! # Storage strategy
//! - Ordinary preferences are stored as typed values in a key-value medium.
//! - Secure strings are sealed with XChaCha20-Poly1305 under a per-alias key
//!   held by a key provider (OS keyring, key file or memory), base64-encoded.
//! - The names of secure entries are replaced by their SHA-256 hex digest, so
//!   neither the plaintext name nor the value reaches the medium.
//!
//! # Module layout
//! - `store`         typed accessors, batches, secure slots
//! - `codec`         name digest + seal/open of secure values
//! - `key_provider`  key lifecycle and alias-bound encryption
//! - `medium`        persistent key-value collaborators (memory, JSON file)
//! - `crypto`        AEAD helpers
//! - `digest`        name hashing
//! - `config`        store configuration and backend wiring
//! - `paths`         data/config directory resolution
//! - `mock_api`      canned async user API for local development
//! - `error`         error types

pub mod codec;
pub mod config;
pub mod crypto;
pub mod digest;
pub mod error;
pub mod key_provider;
pub mod medium;
pub mod mock_api;
pub mod paths;
pub mod store;

pub use codec::{SealedValue, SecureValueCodec};
pub use config::{KeyBackend, MediumBackend, PrefsConfig};
pub use error::{ConfigError, FormatError, KeyError, PrefsError, StorageError};
pub use key_provider::{FileKeyProvider, KeyProvider, KeyringKeyProvider, MemoryKeyProvider};
pub use medium::{EditOp, FileMedium, MemoryMedium, PreferenceMedium, Value};
pub use mock_api::{MockApi, Sample};
pub use store::{keys, Batch, PrefValue, PreferenceStore, SecureSlot};
