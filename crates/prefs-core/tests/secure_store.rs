use std::fs;
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine};
use prefs_core::digest;
use prefs_core::{
    keys, FileKeyProvider, FileMedium, KeyProvider, MemoryKeyProvider, MemoryMedium,
    PreferenceMedium, PreferenceStore, Value,
};
use tempfile::tempdir;

const ALIAS: &str = "app-keystore-alias";

fn file_store(dir: &std::path::Path) -> (PreferenceStore, Arc<FileMedium>) {
    let medium = Arc::new(FileMedium::in_dir(dir, "app_settings").unwrap());
    let keys = Arc::new(FileKeyProvider::new(dir.join("keys")));
    let store = PreferenceStore::open(medium.clone(), keys, ALIAS).unwrap();
    (store, medium)
}

#[test]
fn access_token_never_reaches_disk_in_plaintext() {
    let dir = tempdir().unwrap();
    let (store, medium) = file_store(dir.path());

    store.set_access_token(Some("tok-abc123")).unwrap();
    assert_eq!(store.access_token().as_deref(), Some("tok-abc123"));

    let on_disk = fs::read_to_string(medium.path()).unwrap();
    assert!(!on_disk.contains(keys::ACCESS_TOKEN));
    assert!(!on_disk.contains("tok-abc123"));
    assert!(on_disk.contains(&digest::hash(keys::ACCESS_TOKEN)));

    store.set_access_token(None).unwrap();
    assert_eq!(store.access_token(), None);
    assert!(store.keys().is_empty());
}

#[test]
fn values_survive_reopen() {
    let dir = tempdir().unwrap();
    {
        let (store, _) = file_store(dir.path());
        store
            .batch(|b| {
                b.put_int("launches", 7)
                    .put_long("installed_at", 1_700_000_000_123)
                    .put_float("volume", 0.75)
                    .put_bool("onboarded", true)
                    .put_string("theme", "dark")
                    .put_double("balance", 1234.5678)
                    .set_secure_string("pin", Some("0000 ✓"))?;
                Ok(())
            })
            .unwrap();
    }

    let (store, _) = file_store(dir.path());
    assert_eq!(store.get_int("launches", 0), 7);
    assert_eq!(store.get_long("installed_at", 0), 1_700_000_000_123);
    assert_eq!(store.get_float("volume", 0.0), 0.75);
    assert!(store.get_bool("onboarded", false));
    assert_eq!(store.get_string("theme", "light"), "dark");
    assert_eq!(store.get_double("balance", 0.0), 1234.5678);
    assert_eq!(store.get_secure_string("pin", None).as_deref(), Some("0000 ✓"));
}

#[test]
fn batch_is_all_or_nothing() {
    let medium = Arc::new(MemoryMedium::new());
    let store =
        PreferenceStore::open(medium.clone(), Arc::new(MemoryKeyProvider::new()), ALIAS).unwrap();
    store.set_int("c", 3).unwrap();
    let before = medium.snapshot();

    medium.fail_next_commit_after(2);
    let mut batch = store.edit();
    batch.put_int("a", 1).put_int("b", 2).remove("c");
    assert!(batch.commit().is_err());

    assert_eq!(medium.snapshot(), before);
    assert_eq!(store.get_int("a", -1), -1);
    assert_eq!(store.get_int("c", -1), 3);

    let mut batch = store.edit();
    batch.put_int("a", 1).put_int("b", 2).remove("c");
    batch.commit().unwrap();
    assert_eq!(store.get_int("a", -1), 1);
    assert_eq!(store.get_int("b", -1), 2);
    assert!(!store.contains("c"));
}

#[test]
fn damaged_ciphertext_falls_back_to_default() {
    let medium = Arc::new(MemoryMedium::new());
    let store =
        PreferenceStore::open(medium.clone(), Arc::new(MemoryKeyProvider::new()), ALIAS).unwrap();
    store.set_secure_string("session", Some("s3cret")).unwrap();

    let hashed = digest::hash("session");
    let Some(Value::String(encoded)) = medium.get(&hashed) else {
        panic!("secure entry missing");
    };
    let mut raw = STANDARD.decode(encoded).unwrap();
    let last = raw.len() - 1;
    raw[last] ^= 0x01;
    medium
        .commit(&[prefs_core::EditOp::Put(hashed, Value::String(STANDARD.encode(raw)))])
        .unwrap();

    assert_eq!(
        store.get_secure_string("session", Some("fallback")).as_deref(),
        Some("fallback")
    );
    assert_eq!(store.get_secure_string("session", None), None);
}

#[test]
fn reopening_keeps_existing_key() {
    let dir = tempdir().unwrap();
    let provider = FileKeyProvider::new(dir.path().join("keys"));
    provider.ensure_key(ALIAS).unwrap();
    let sealed = provider.encrypt(ALIAS, b"kept").unwrap();

    provider.ensure_key(ALIAS).unwrap();
    let again = FileKeyProvider::new(dir.path().join("keys"));
    again.ensure_key(ALIAS).unwrap();
    assert_eq!(&again.decrypt(ALIAS, &sealed).unwrap()[..], b"kept");
}

#[test]
fn deleted_key_degrades_to_default() {
    let dir = tempdir().unwrap();
    let provider = Arc::new(FileKeyProvider::new(dir.path().join("keys")));
    let medium = Arc::new(FileMedium::in_dir(dir.path(), "app_settings").unwrap());
    let store = PreferenceStore::open(medium, provider.clone(), ALIAS).unwrap();
    store.set_access_token(Some("tok-abc123")).unwrap();

    provider.delete_key(ALIAS).unwrap();
    assert_eq!(store.access_token(), None);
    assert!(store.has_secure(keys::ACCESS_TOKEN));
}
