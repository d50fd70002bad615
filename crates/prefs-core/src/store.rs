//! Typed preference store with encrypted secure slots.
//!
//! Plain entries are stored as-is. Secure entries go through
//! [`SecureValueCodec`]: the name is replaced by its digest and the value by
//! ciphertext under the store's key alias.
//!
//! The store is not internally synchronized across calls. Each commit is
//! atomic, but a read followed by a write is not; callers that need
//! read-modify-write consistency must hold their own lock around it.

use std::fmt;
use std::sync::Arc;

use crate::codec::SecureValueCodec;
use crate::error::{FormatError, KeyError, PrefsError, StorageError};
use crate::key_provider::KeyProvider;
use crate::medium::{EditOp, PreferenceMedium, Value};

/// Names of the preferences the application knows about.
pub mod keys {
    pub const ACCESS_TOKEN: &str = "ACCESS_TOKEN";
}

/// A scalar the store can hold.
///
/// `f64` has no native slot in the medium and travels as its decimal string.
pub trait PrefValue: Sized {
    fn into_value(self) -> Value;
    fn from_value(value: Value) -> Option<Self>;
}

impl PrefValue for i32 {
    fn into_value(self) -> Value {
        Value::Int(self)
    }
    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Int(v) => Some(v),
            _ => None,
        }
    }
}

impl PrefValue for i64 {
    fn into_value(self) -> Value {
        Value::Long(self)
    }
    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Long(v) => Some(v),
            _ => None,
        }
    }
}

impl PrefValue for f32 {
    fn into_value(self) -> Value {
        Value::Float(self)
    }
    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Float(v) => Some(v),
            _ => None,
        }
    }
}

impl PrefValue for bool {
    fn into_value(self) -> Value {
        Value::Bool(self)
    }
    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Bool(v) => Some(v),
            _ => None,
        }
    }
}

impl PrefValue for String {
    fn into_value(self) -> Value {
        Value::String(self)
    }
    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::String(v) => Some(v),
            _ => None,
        }
    }
}

impl PrefValue for f64 {
    fn into_value(self) -> Value {
        Value::String(self.to_string())
    }
    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::String(s) => parse_double(&s).ok(),
            _ => None,
        }
    }
}

pub fn parse_double(s: &str) -> Result<f64, FormatError> {
    s.trim().parse::<f64>().map_err(|_| FormatError::ParseFailed {
        value: s.to_string(),
        expected: "double",
    })
}

pub struct PreferenceStore {
    medium: Arc<dyn PreferenceMedium>,
    codec: SecureValueCodec,
    alias: String,
}

impl fmt::Debug for PreferenceStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreferenceStore")
            .field("alias", &self.alias)
            .finish_non_exhaustive()
    }
}

impl PreferenceStore {
    /// Build a store over `medium`, making sure key material exists under
    /// `alias`. A key provider that cannot create the key fails construction:
    /// without it secure slots cannot work.
    pub fn open(
        medium: Arc<dyn PreferenceMedium>,
        keys: Arc<dyn KeyProvider>,
        alias: &str,
    ) -> Result<Self, PrefsError> {
        keys.ensure_key(alias)?;
        tracing::debug!(alias, "preference store ready");
        Ok(Self {
            medium,
            codec: SecureValueCodec::new(keys),
            alias: alias.to_string(),
        })
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn medium(&self) -> &Arc<dyn PreferenceMedium> {
        &self.medium
    }

    /// Start an explicit batch. Nothing is visible until [`Batch::commit`].
    pub fn edit(&self) -> Batch<'_> {
        Batch {
            store: self,
            ops: Vec::new(),
        }
    }

    /// Fill a batch in `f` and commit it if `f` succeeds.
    pub fn batch<F>(&self, f: F) -> Result<(), PrefsError>
    where
        F: FnOnce(&mut Batch<'_>) -> Result<(), PrefsError>,
    {
        let mut batch = self.edit();
        f(&mut batch)?;
        batch.commit()?;
        Ok(())
    }

    fn commit_ops(&self, ops: &[EditOp]) -> Result<(), StorageError> {
        self.medium.commit(ops).map_err(|e| {
            tracing::warn!(operations = ops.len(), error = %e, "preference commit failed");
            e
        })
    }

    fn apply(&self, op: EditOp) -> Result<(), StorageError> {
        self.commit_ops(std::slice::from_ref(&op))
    }

    // === plain entries

    pub fn set<T: PrefValue>(&self, key: &str, value: T) -> Result<(), StorageError> {
        self.apply(EditOp::Put(key.to_string(), value.into_value()))
    }

    /// Stored value of type `T`, or `default` when the key is absent or holds
    /// another type.
    pub fn get<T: PrefValue>(&self, key: &str, default: T) -> T {
        self.medium
            .get(key)
            .and_then(T::from_value)
            .unwrap_or(default)
    }

    pub fn set_int(&self, key: &str, value: i32) -> Result<(), StorageError> {
        self.set(key, value)
    }

    pub fn set_long(&self, key: &str, value: i64) -> Result<(), StorageError> {
        self.set(key, value)
    }

    pub fn set_float(&self, key: &str, value: f32) -> Result<(), StorageError> {
        self.set(key, value)
    }

    pub fn set_bool(&self, key: &str, value: bool) -> Result<(), StorageError> {
        self.set(key, value)
    }

    pub fn set_string(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.set(key, value.to_string())
    }

    pub fn set_double(&self, key: &str, value: f64) -> Result<(), StorageError> {
        self.set(key, value)
    }

    pub fn get_int(&self, key: &str, default: i32) -> i32 {
        self.medium.get_int(key, default)
    }

    pub fn get_long(&self, key: &str, default: i64) -> i64 {
        self.medium.get_long(key, default)
    }

    pub fn get_float(&self, key: &str, default: f32) -> f32 {
        self.medium.get_float(key, default)
    }

    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        self.medium.get_bool(key, default)
    }

    pub fn get_string(&self, key: &str, default: &str) -> String {
        self.get_string_opt(key)
            .unwrap_or_else(|| default.to_string())
    }

    pub fn get_string_opt(&self, key: &str) -> Option<String> {
        self.medium.get_string(key)
    }

    /// Parses the stored decimal string. A malformed string yields `default`.
    pub fn get_double(&self, key: &str, default: f64) -> f64 {
        match self.medium.get(key) {
            Some(Value::String(s)) => parse_double(&s).unwrap_or_else(|e| {
                tracing::debug!(key, error = %e, "stored double unreadable, using default");
                default
            }),
            _ => default,
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.medium.contains(key)
    }

    /// Raw keys as stored. Secure entries appear under their digest.
    pub fn keys(&self) -> Vec<String> {
        self.medium.keys()
    }

    /// Remove every key in `keys` in one atomic commit.
    pub fn remove<I, S>(&self, keys: I) -> Result<(), StorageError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let ops: Vec<EditOp> = keys
            .into_iter()
            .map(|k| EditOp::Remove(k.as_ref().to_string()))
            .collect();
        self.commit_ops(&ops)
    }

    pub fn clear(&self) -> Result<(), StorageError> {
        self.apply(EditOp::Clear)
    }

    // === secure entries

    /// Encrypt and store `value` under the digest of `name`. `None` or an
    /// empty string removes the entry instead.
    pub fn set_secure_string(&self, name: &str, value: Option<&str>) -> Result<(), PrefsError> {
        let op = self.secure_op(name, value)?;
        self.apply(op)?;
        Ok(())
    }

    /// Decrypted value of `name`, or `default` if it is missing or cannot be
    /// decrypted (key deleted, ciphertext damaged).
    pub fn get_secure_string(&self, name: &str, default: Option<&str>) -> Option<String> {
        self.codec
            .try_open(self.medium.as_ref(), &self.alias, name)
            .or_else(|| default.map(str::to_string))
    }

    pub fn has_secure(&self, name: &str) -> bool {
        self.medium.contains(&self.codec.hashed_name(name))
    }

    pub fn remove_secure(&self, name: &str) -> Result<(), StorageError> {
        self.apply(EditOp::Remove(self.codec.hashed_name(name)))
    }

    pub fn secure_slot(&self, name: &str) -> SecureSlot<'_> {
        SecureSlot {
            store: self,
            name: name.to_string(),
        }
    }

    pub fn access_token(&self) -> Option<String> {
        self.get_secure_string(keys::ACCESS_TOKEN, None)
    }

    pub fn set_access_token(&self, token: Option<&str>) -> Result<(), PrefsError> {
        self.set_secure_string(keys::ACCESS_TOKEN, token)
    }

    fn secure_op(&self, name: &str, value: Option<&str>) -> Result<EditOp, KeyError> {
        match value {
            Some(v) if !v.is_empty() => Ok(self.codec.seal(&self.alias, name, v)?.into_edit()),
            _ => Ok(EditOp::Remove(self.codec.hashed_name(name))),
        }
    }
}

/// Staged mutations against a [`PreferenceStore`], committed as one unit.
#[must_use = "a batch does nothing until it is committed"]
pub struct Batch<'a> {
    store: &'a PreferenceStore,
    ops: Vec<EditOp>,
}

impl<'a> Batch<'a> {
    pub fn put<T: PrefValue>(&mut self, key: &str, value: T) -> &mut Self {
        self.ops.push(EditOp::Put(key.to_string(), value.into_value()));
        self
    }

    pub fn put_int(&mut self, key: &str, value: i32) -> &mut Self {
        self.put(key, value)
    }

    pub fn put_long(&mut self, key: &str, value: i64) -> &mut Self {
        self.put(key, value)
    }

    pub fn put_float(&mut self, key: &str, value: f32) -> &mut Self {
        self.put(key, value)
    }

    pub fn put_bool(&mut self, key: &str, value: bool) -> &mut Self {
        self.put(key, value)
    }

    pub fn put_string(&mut self, key: &str, value: &str) -> &mut Self {
        self.put(key, value.to_string())
    }

    pub fn put_double(&mut self, key: &str, value: f64) -> &mut Self {
        self.put(key, value)
    }

    pub fn remove(&mut self, key: &str) -> &mut Self {
        self.ops.push(EditOp::Remove(key.to_string()));
        self
    }

    /// Drops everything committed so far. Operations staged after this call
    /// still apply.
    pub fn clear(&mut self) -> &mut Self {
        self.ops.push(EditOp::Clear);
        self
    }

    /// Encryption happens now; the write is staged like any other.
    pub fn set_secure_string(
        &mut self,
        name: &str,
        value: Option<&str>,
    ) -> Result<&mut Self, KeyError> {
        let op = self.store.secure_op(name, value)?;
        self.ops.push(op);
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn commit(self) -> Result<(), StorageError> {
        if self.ops.is_empty() {
            return Ok(());
        }
        self.store.commit_ops(&self.ops)
    }

    pub fn discard(self) {
        tracing::debug!(operations = self.ops.len(), "batch discarded");
    }
}

/// Handle to one named secure entry.
#[derive(Clone)]
pub struct SecureSlot<'a> {
    store: &'a PreferenceStore,
    name: String,
}

impl SecureSlot<'_> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self) -> Option<String> {
        self.store.get_secure_string(&self.name, None)
    }

    pub fn get_or(&self, default: &str) -> String {
        self.get().unwrap_or_else(|| default.to_string())
    }

    pub fn set(&self, value: Option<&str>) -> Result<(), PrefsError> {
        self.store.set_secure_string(&self.name, value)
    }

    pub fn clear(&self) -> Result<(), StorageError> {
        self.store.remove_secure(&self.name)
    }

    pub fn is_set(&self) -> bool {
        self.store.has_secure(&self.name)
    }
}
