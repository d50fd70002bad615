use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::{EditOp, PreferenceMedium, Value};
use crate::error::StorageError;
use crate::paths::restrict_to_owner;

pub const SETTINGS_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct SettingsDocument {
    version: u32,
    #[serde(default)]
    entries: BTreeMap<String, Value>,
}

/// JSON settings file. The whole document is rewritten through a temp file
/// and renamed over the old one on every commit, so readers of the file see
/// either the previous batch or the new one.
///
/// Commits hold an exclusive lock on `<path>.lock` and apply the batch to the
/// file as it is on disk, so several handles (or processes) sharing one file
/// do not overwrite each other's entries. Reads are served from the view as of
/// the last open, reload or commit of this handle.
#[derive(Debug)]
pub struct FileMedium {
    path: PathBuf,
    entries: RwLock<BTreeMap<String, Value>>,
}

impl FileMedium {
    /// Open the settings file at `path`, or start empty if it does not exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        let entries = Self::load(&path)?;
        tracing::debug!(path = %path.display(), entries = entries.len(), "opened settings file");
        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    /// `<dir>/<settings_name>.json`
    pub fn in_dir<P: AsRef<Path>>(dir: P, settings_name: &str) -> Result<Self, StorageError> {
        Self::open(dir.as_ref().join(format!("{settings_name}.json")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Re-read the file, dropping the in-memory view.
    pub fn reload(&self) -> Result<(), StorageError> {
        let entries = Self::load(&self.path)?;
        *self.entries.write() = entries;
        Ok(())
    }

    fn load(path: &Path) -> Result<BTreeMap<String, Value>, StorageError> {
        if !path.exists() {
            return Ok(BTreeMap::new());
        }
        let data = fs::read(path)?;
        let doc: SettingsDocument = serde_json::from_slice(&data)
            .map_err(|e| StorageError::Corrupt(format!("{}: {e}", path.display())))?;
        if doc.version != SETTINGS_FORMAT_VERSION {
            return Err(StorageError::Corrupt(format!(
                "{}: unsupported format version {}",
                path.display(),
                doc.version
            )));
        }
        Ok(doc.entries)
    }

    fn dir(&self) -> PathBuf {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    fn lock_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_os_string();
        name.push(".lock");
        PathBuf::from(name)
    }

    /// Blocks until no other handle is committing to this file.
    fn lock(&self) -> Result<File, StorageError> {
        fs::create_dir_all(self.dir())?;
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(self.lock_path())?;
        FileExt::lock_exclusive(&file)?;
        Ok(file)
    }

    fn write(&self, entries: &BTreeMap<String, Value>) -> Result<(), StorageError> {
        let dir = self.dir();
        fs::create_dir_all(&dir)?;
        let doc = SettingsDocument {
            version: SETTINGS_FORMAT_VERSION,
            entries: entries.clone(),
        };
        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        serde_json::to_writer_pretty(&mut tmp, &doc)?;
        tmp.as_file().sync_all()?;
        restrict_to_owner(tmp.path())?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }

    /// Apply `ops` to the current file contents and write the result.
    fn commit_locked(&self, ops: &[EditOp]) -> Result<BTreeMap<String, Value>, StorageError> {
        let lock = self.lock()?;
        let mut staged = Self::load(&self.path)?;
        for op in ops {
            op.apply_to(&mut staged);
        }
        let written = self.write(&staged);
        if let Err(e) = FileExt::unlock(&lock) {
            tracing::debug!(path = %self.path.display(), error = %e, "settings unlock failed");
        }
        written.map(|()| staged)
    }
}

impl PreferenceMedium for FileMedium {
    fn get(&self, key: &str) -> Option<Value> {
        self.entries.read().get(key).cloned()
    }

    fn keys(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }

    fn commit(&self, ops: &[EditOp]) -> Result<(), StorageError> {
        for op in ops {
            if let EditOp::Put(key, Value::Float(v)) = op {
                if !v.is_finite() {
                    return Err(StorageError::CommitFailed(format!(
                        "non-finite float for {key} cannot be stored"
                    )));
                }
            }
        }
        let mut entries = self.entries.write();
        let staged = self.commit_locked(ops).map_err(|e| {
            tracing::warn!(path = %self.path.display(), error = %e, "settings commit failed");
            StorageError::CommitFailed(e.to_string())
        })?;
        *entries = staged;
        Ok(())
    }
}
