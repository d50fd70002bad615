//! XChaCha20-Poly1305 helpers shared by every key provider.
//!
//! Key size: 32 bytes. Nonce: 24 bytes (random). Tag: 16 bytes.
//!
//! Ciphertext wire format:
//!   [ nonce (24 bytes) | ciphertext + tag ]
//!
//! The key alias is passed as associated data, so a value sealed under one
//! alias does not open under another even if the key bytes were shared.

use chacha20poly1305::aead::{Aead, AeadCore, KeyInit, OsRng, Payload};
use chacha20poly1305::{XChaCha20Poly1305, XNonce};
use rand::RngCore;
use zeroize::Zeroizing;

pub const KEY_LEN: usize = 32;
pub const NONCE_LEN: usize = 24;
pub const TAG_LEN: usize = 16;

/// Reasons a sealed blob could not be produced or opened. Providers map these
/// onto `KeyError` with the alias attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AeadFailure {
    InvalidKey,
    Encrypt,
    Decrypt,
}

pub fn generate_key() -> Zeroizing<[u8; KEY_LEN]> {
    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    rand::rngs::OsRng.fill_bytes(&mut key[..]);
    key
}

pub fn encrypt(key: &[u8], plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>, AeadFailure> {
    let cipher = XChaCha20Poly1305::new_from_slice(key).map_err(|_| AeadFailure::InvalidKey)?;
    let nonce = XChaCha20Poly1305::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(&nonce, Payload { msg: plaintext, aad })
        .map_err(|_| AeadFailure::Encrypt)?;

    let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

pub fn decrypt(key: &[u8], data: &[u8], aad: &[u8]) -> Result<Zeroizing<Vec<u8>>, AeadFailure> {
    if data.len() < NONCE_LEN + TAG_LEN {
        return Err(AeadFailure::Decrypt);
    }
    let (nonce_bytes, ct) = data.split_at(NONCE_LEN);
    let nonce = XNonce::from_slice(nonce_bytes);
    let cipher = XChaCha20Poly1305::new_from_slice(key).map_err(|_| AeadFailure::InvalidKey)?;
    let plaintext = cipher
        .decrypt(nonce, Payload { msg: ct, aad })
        .map_err(|_| AeadFailure::Decrypt)?;
    Ok(Zeroizing::new(plaintext))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_then_decrypt() {
        let key = generate_key();
        let ct = encrypt(&key[..], b"hello", b"alias").unwrap();
        assert_eq!(ct.len(), NONCE_LEN + 5 + TAG_LEN);
        let pt = decrypt(&key[..], &ct, b"alias").unwrap();
        assert_eq!(pt.as_slice(), b"hello");
    }

    #[test]
    fn nonce_is_fresh_per_call() {
        let key = generate_key();
        let a = encrypt(&key[..], b"same", b"").unwrap();
        let b = encrypt(&key[..], b"same", b"").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn wrong_aad_is_rejected() {
        let key = generate_key();
        let ct = encrypt(&key[..], b"secret", b"alias-a").unwrap();
        assert_eq!(
            decrypt(&key[..], &ct, b"alias-b").unwrap_err(),
            AeadFailure::Decrypt
        );
    }

    #[test]
    fn short_input_is_rejected() {
        let key = generate_key();
        assert_eq!(
            decrypt(&key[..], &[0u8; 10], b"").unwrap_err(),
            AeadFailure::Decrypt
        );
    }

    #[test]
    fn bad_key_length() {
        assert_eq!(
            encrypt(&[1u8; 7], b"x", b"").unwrap_err(),
            AeadFailure::InvalidKey
        );
    }
}
