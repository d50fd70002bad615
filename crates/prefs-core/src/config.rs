//! Store configuration: JSON file, then environment overrides.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, PrefsError};
use crate::key_provider::{
    FileKeyProvider, KeyProvider, KeyringKeyProvider, MemoryKeyProvider, KEYRING_SERVICE,
};
use crate::medium::{FileMedium, MemoryMedium, PreferenceMedium};
use crate::paths;
use crate::store::PreferenceStore;

pub const DEFAULT_SETTINGS_NAME: &str = "app_settings";
pub const DEFAULT_KEYSTORE_ALIAS: &str = "app-keystore-alias";

pub const DATA_DIR_ENV: &str = "PREFS_DATA_DIR";
pub const KEY_BACKEND_ENV: &str = "PREFS_KEY_BACKEND";
pub const MEDIUM_BACKEND_ENV: &str = "PREFS_MEDIUM_BACKEND";
pub const KEYSTORE_ALIAS_ENV: &str = "PREFS_KEYSTORE_ALIAS";

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum KeyBackend {
    #[default]
    Keyring,
    File,
    Memory,
}

impl FromStr for KeyBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "keyring" => Ok(Self::Keyring),
            "file" => Ok(Self::File),
            "memory" => Ok(Self::Memory),
            _ => Err(ConfigError::UnknownBackend {
                kind: "key",
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for KeyBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Keyring => "keyring",
            Self::File => "file",
            Self::Memory => "memory",
        })
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MediumBackend {
    #[default]
    File,
    Memory,
}

impl FromStr for MediumBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" => Ok(Self::File),
            "memory" => Ok(Self::Memory),
            _ => Err(ConfigError::UnknownBackend {
                kind: "medium",
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for MediumBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::File => "file",
            Self::Memory => "memory",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrefsConfig {
    #[serde(default = "default_settings_name")]
    pub settings_name: String,
    #[serde(default = "default_keystore_alias")]
    pub keystore_alias: String,
    #[serde(default = "default_keyring_service")]
    pub keyring_service: String,
    #[serde(default)]
    pub key_backend: KeyBackend,
    #[serde(default)]
    pub medium_backend: MediumBackend,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
}

fn default_settings_name() -> String {
    DEFAULT_SETTINGS_NAME.to_string()
}

fn default_keystore_alias() -> String {
    DEFAULT_KEYSTORE_ALIAS.to_string()
}

fn default_keyring_service() -> String {
    KEYRING_SERVICE.to_string()
}

impl Default for PrefsConfig {
    fn default() -> Self {
        Self {
            settings_name: default_settings_name(),
            keystore_alias: default_keystore_alias(),
            keyring_service: default_keyring_service(),
            key_backend: KeyBackend::default(),
            medium_backend: MediumBackend::default(),
            data_dir: None,
        }
    }
}

impl PrefsConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let invalid = |reason: String| ConfigError::Invalid {
            path: path.display().to_string(),
            reason,
        };
        let data = fs::read(path).map_err(|e| invalid(e.to_string()))?;
        serde_json::from_slice(&data).map_err(|e| invalid(e.to_string()))
    }

    /// `explicit` must exist when given. Otherwise the per-user config file is
    /// used if present, else defaults. Environment overrides apply last.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match explicit {
            Some(path) => Self::from_file(path)?,
            None => match paths::config_file() {
                Ok(path) if path.exists() => Self::from_file(path)?,
                _ => Self::default(),
            },
        };
        config.apply_overrides(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup(DATA_DIR_ENV) {
            self.data_dir = Some(PathBuf::from(dir));
        }
        if let Some(backend) = lookup(KEY_BACKEND_ENV) {
            self.key_backend = backend.parse()?;
        }
        if let Some(backend) = lookup(MEDIUM_BACKEND_ENV) {
            self.medium_backend = backend.parse()?;
        }
        if let Some(alias) = lookup(KEYSTORE_ALIAS_ENV) {
            self.keystore_alias = alias;
        }
        Ok(())
    }

    pub fn resolved_data_dir(&self) -> Result<PathBuf, ConfigError> {
        match &self.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => paths::data_dir(),
        }
    }

    pub fn key_provider(&self) -> Result<Arc<dyn KeyProvider>, ConfigError> {
        let provider: Arc<dyn KeyProvider> = match self.key_backend {
            KeyBackend::Keyring => {
                Arc::new(KeyringKeyProvider::with_service(&self.keyring_service))
            }
            KeyBackend::File => Arc::new(FileKeyProvider::new(paths::keys_dir(
                &self.resolved_data_dir()?,
            ))),
            KeyBackend::Memory => Arc::new(MemoryKeyProvider::new()),
        };
        Ok(provider)
    }

    pub fn medium(&self) -> Result<Arc<dyn PreferenceMedium>, PrefsError> {
        let medium: Arc<dyn PreferenceMedium> = match self.medium_backend {
            MediumBackend::File => Arc::new(FileMedium::in_dir(
                self.resolved_data_dir()?,
                &self.settings_name,
            )?),
            MediumBackend::Memory => Arc::new(MemoryMedium::new()),
        };
        Ok(medium)
    }

    /// A process-local key under a persistent medium would leave every secure
    /// value unreadable after a restart.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.key_backend == KeyBackend::Memory && self.medium_backend == MediumBackend::File {
            return Err(ConfigError::IncompatibleBackends {
                key: self.key_backend.to_string(),
                medium: self.medium_backend.to_string(),
            });
        }
        Ok(())
    }

    /// Wire the configured backends into a store.
    pub fn build_store(&self) -> Result<PreferenceStore, PrefsError> {
        self.validate()?;
        let medium = self.medium()?;
        let keys = self.key_provider()?;
        tracing::info!(
            key_backend = %self.key_backend,
            alias = %self.keystore_alias,
            "opening preference store"
        );
        PreferenceStore::open(medium, keys, &self.keystore_alias)
    }
}
