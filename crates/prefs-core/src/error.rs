use thiserror::Error;

/// Failures of the platform key facility.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KeyError {
    #[error("Key generation failed for alias {alias}: {reason}")]
    GenerationFailed { alias: String, reason: String },

    #[error("Key unavailable for alias {alias}: {reason}")]
    Unavailable { alias: String, reason: String },

    #[error("Decryption failed (wrong key, missing key or tampered ciphertext)")]
    DecryptFailed,
}

impl KeyError {
    pub fn generation(alias: &str, reason: impl Into<String>) -> Self {
        Self::GenerationFailed {
            alias: alias.to_string(),
            reason: reason.into(),
        }
    }

    pub fn unavailable(alias: &str, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            alias: alias.to_string(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Commit failed: {0}")]
    CommitFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialisation error: {0}")]
    Serialisation(#[from] serde_json::Error),

    #[error("Settings file corrupt: {0}")]
    Corrupt(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FormatError {
    #[error("Cannot parse {value:?} as {expected}")]
    ParseFailed {
        value: String,
        expected: &'static str,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot determine data directory")]
    NoDataDir,

    #[error("Unknown {kind} backend: {value}")]
    UnknownBackend { kind: &'static str, value: String },

    #[error("Config file {path}: {reason}")]
    Invalid { path: String, reason: String },

    #[error("Key backend {key} does not persist keys; it cannot be used with the {medium} medium")]
    IncompatibleBackends { key: String, medium: String },
}

/// Top-level error type for the preference store.
#[derive(Debug, Error)]
pub enum PrefsError {
    #[error("Key error: {0}")]
    Key(#[from] KeyError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Format error: {0}")]
    Format(#[from] FormatError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

pub type Result<T> = std::result::Result<T, PrefsError>;
