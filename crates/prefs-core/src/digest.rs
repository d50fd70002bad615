//! Name obfuscation for secure entries.
//!
//! Storage key = lowercase hex of SHA-256 over the UTF-8 bytes of the
//! preference name. No salt: the same name must map to the same storage key
//! on every run, so this is part of the on-disk format.

use sha2::{Digest, Sha256};

/// Length of a hashed name in characters.
pub const HASH_HEX_LEN: usize = 64;

pub fn hash(input: &str) -> String {
    hex::encode(Sha256::digest(input.as_bytes()))
}

/// True if `key` has the shape of a hashed name.
pub fn looks_hashed(key: &str) -> bool {
    key.len() == HASH_HEX_LEN && key.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_vector() {
        assert_eq!(
            hash("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn deterministic_and_distinct() {
        assert_eq!(hash("ACCESS_TOKEN"), hash("ACCESS_TOKEN"));
        assert_ne!(hash("ACCESS_TOKEN"), hash("ACCESS_TOKEN "));
        assert_ne!(hash("a"), hash("b"));
    }

    #[test]
    fn output_shape() {
        let h = hash("");
        assert_eq!(h.len(), HASH_HEX_LEN);
        assert!(looks_hashed(&h));
        assert!(!looks_hashed("ACCESS_TOKEN"));
        assert!(!looks_hashed(&h.to_uppercase()));
    }

    #[test]
    fn unicode_names() {
        let h = hash("jeton d'accès 🔑");
        assert_eq!(h.len(), HASH_HEX_LEN);
        assert_eq!(h, hash("jeton d'accès 🔑"));
    }
}
