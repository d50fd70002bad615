use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::{Mutex, RwLock};

use super::{EditOp, PreferenceMedium, Value};
use crate::error::StorageError;

/// Volatile medium. Commits build a staged copy under the write lock and swap
/// it in only after every operation applied.
#[derive(Debug, Default)]
pub struct MemoryMedium {
    entries: RwLock<BTreeMap<String, Value>>,
    fail_after: Mutex<Option<usize>>,
    commits: AtomicUsize,
}

impl MemoryMedium {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next commit fail after applying `applied` of its operations
    /// to the staged copy. Used to exercise partial-commit behaviour.
    pub fn fail_next_commit_after(&self, applied: usize) {
        *self.fail_after.lock() = Some(applied);
    }

    /// Number of successful commits so far.
    pub fn commit_count(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    /// Copy of every stored entry.
    pub fn snapshot(&self) -> BTreeMap<String, Value> {
        self.entries.read().clone()
    }
}

impl PreferenceMedium for MemoryMedium {
    fn get(&self, key: &str) -> Option<Value> {
        self.entries.read().get(key).cloned()
    }

    fn keys(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }

    fn commit(&self, ops: &[EditOp]) -> Result<(), StorageError> {
        let mut entries = self.entries.write();
        let fail_after = self.fail_after.lock().take();
        let mut staged = entries.clone();
        for (applied, op) in ops.iter().enumerate() {
            if fail_after == Some(applied) {
                return Err(StorageError::CommitFailed(format!(
                    "medium failed after {applied} of {} operations",
                    ops.len()
                )));
            }
            op.apply_to(&mut staged);
        }
        if fail_after.is_some() {
            return Err(StorageError::CommitFailed(
                "medium failed before publishing the batch".to_string(),
            ));
        }
        *entries = staged;
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_commit_leaves_nothing_behind() {
        let medium = MemoryMedium::new();
        medium
            .commit(&[EditOp::Put("c".into(), Value::Int(3))])
            .unwrap();

        medium.fail_next_commit_after(2);
        let err = medium
            .commit(&[
                EditOp::Put("a".into(), Value::Int(1)),
                EditOp::Put("b".into(), Value::Int(2)),
                EditOp::Remove("c".into()),
            ])
            .unwrap_err();
        assert!(matches!(err, StorageError::CommitFailed(_)));
        assert_eq!(medium.keys(), vec!["c".to_string()]);
        assert_eq!(medium.commit_count(), 1);

        // failure is one-shot
        medium
            .commit(&[EditOp::Put("a".into(), Value::Int(1))])
            .unwrap();
        assert_eq!(medium.get("a"), Some(Value::Int(1)));
    }

    #[test]
    fn failure_armed_past_the_end_still_fails() {
        let medium = MemoryMedium::new();
        medium.fail_next_commit_after(10);
        assert!(medium
            .commit(&[EditOp::Put("a".into(), Value::Int(1))])
            .is_err());
        assert!(medium.keys().is_empty());
    }
}
