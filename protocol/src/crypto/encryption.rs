//! # AES-256-GCM Encryption
//!
//! Symmetric encryption for TAD channel messages. Every private channel
//! has one shared key; a message body is sealed with that key before it
//! ever leaves the sending node.
//!
//! We use AES-256-GCM (Galois/Counter Mode) because:
//!
//! - It's an AEAD cipher — authentication and encryption in one operation.
//!   No "encrypt-then-MAC" vs "MAC-then-encrypt" debates. It just works.
//! - AES-NI hardware acceleration is available on every modern x86 CPU and
//!   most ARM chips. Performance is essentially free.
//! - 256-bit keys provide a comfortable security margin.
//!
//! ## Nonce management
//!
//! GCM is notoriously unforgiving about nonce reuse. If you encrypt two
//! different messages with the same key and nonce, an attacker can recover
//! the XOR of the plaintexts AND forge authentication tags. Game over.
//!
//! Our strategy: random 96-bit nonces from a CSPRNG. The birthday bound
//! for 96-bit nonces is ~2^48 messages per key — far beyond what a single
//! channel key will ever see before a member rotates it. Don't try to be
//! clever with counter-based nonces unless you have a very good reason and
//! a very good implementation.
//!
//! ## Wire format
//!
//! The envelope transmitted on the wire carries `nonce` and `ciphertext` as
//! sibling fields, not packed together, so [`seal_message`]/[`open_message`]
//! — thin wrappers over [`encrypt_with_aad`]/[`decrypt_with_aad`] with an
//! empty AAD — are what the message layer actually uses.

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use rand::RngCore;
use thiserror::Error;

use crate::config::{AES_KEY_LENGTH, AES_NONCE_LENGTH};

/// Errors that can occur during encryption/decryption.
///
/// We intentionally keep these vague. Detailed error messages about
/// cryptographic failures are a gift to attackers. The difference between
/// "wrong key" and "corrupted ciphertext" is none of their business.
#[derive(Debug, Error)]
pub enum EncryptionError {
    #[error("encryption failed")]
    EncryptFailed,

    #[error("decryption failed -- wrong key or corrupted ciphertext")]
    DecryptFailed,

    #[error("invalid key length: expected {AES_KEY_LENGTH} bytes")]
    InvalidKeyLength,

    #[error("invalid nonce length: expected {AES_NONCE_LENGTH} bytes")]
    InvalidNonceLength,

    #[error("ciphertext too short: must be at least {AES_NONCE_LENGTH} bytes")]
    CiphertextTooShort,
}

/// Encrypt with Additional Authenticated Data (AAD).
///
/// The AAD is authenticated but NOT encrypted. Use it for metadata that
/// needs integrity protection but doesn't need to be secret.
///
/// Returns a tuple of `(nonce, ciphertext)` where the nonce is 12 bytes
/// and the ciphertext includes the 16-byte auth tag.
///
/// The caller MUST provide the same AAD at decryption time, or authentication
/// will fail. This is the "A" in AEAD doing its job.
pub fn encrypt_with_aad(
    key: &[u8; AES_KEY_LENGTH],
    plaintext: &[u8],
    aad: &[u8],
) -> Result<([u8; AES_NONCE_LENGTH], Vec<u8>), EncryptionError> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| EncryptionError::EncryptFailed)?;

    let mut nonce_bytes = [0u8; AES_NONCE_LENGTH];
    rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let payload = Payload {
        msg: plaintext,
        aad,
    };

    let ciphertext = cipher
        .encrypt(nonce, payload)
        .map_err(|_| EncryptionError::EncryptFailed)?;

    Ok((nonce_bytes, ciphertext))
}

/// Decrypt ciphertext that was encrypted with AAD.
///
/// The nonce and AAD must match the values used during encryption, or
/// decryption will fail with an authentication error. This is by design —
/// any mismatch means tampering.
pub fn decrypt_with_aad(
    key: &[u8; AES_KEY_LENGTH],
    nonce: &[u8; AES_NONCE_LENGTH],
    ciphertext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, EncryptionError> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| EncryptionError::DecryptFailed)?;
    let nonce = Nonce::from_slice(nonce);

    let payload = Payload {
        msg: ciphertext,
        aad,
    };

    cipher
        .decrypt(nonce, payload)
        .map_err(|_| EncryptionError::DecryptFailed)
}

/// Seal a channel message body, returning the `(nonce, ciphertext)` pair
/// already base64-encoded — the form the wire envelope and the persisted
/// message row both carry. No AAD: membership, not message metadata, is
/// what gates who can decrypt.
pub fn seal_message(
    channel_key: &[u8; AES_KEY_LENGTH],
    plaintext: &[u8],
) -> Result<(String, String), EncryptionError> {
    let (nonce, ciphertext) = encrypt_with_aad(channel_key, plaintext, b"")?;
    Ok((
        base64::Engine::encode(&base64::engine::general_purpose::STANDARD, nonce),
        base64::Engine::encode(&base64::engine::general_purpose::STANDARD, ciphertext),
    ))
}

/// Inverse of [`seal_message`].
pub fn open_message(
    channel_key: &[u8; AES_KEY_LENGTH],
    nonce_b64: &str,
    ciphertext_b64: &str,
) -> Result<Vec<u8>, EncryptionError> {
    use base64::Engine;
    let nonce_bytes = base64::engine::general_purpose::STANDARD
        .decode(nonce_b64)
        .map_err(|_| EncryptionError::InvalidNonceLength)?;
    let nonce: [u8; AES_NONCE_LENGTH] = nonce_bytes
        .try_into()
        .map_err(|_| EncryptionError::InvalidNonceLength)?;
    let ciphertext = base64::engine::general_purpose::STANDARD
        .decode(ciphertext_b64)
        .map_err(|_| EncryptionError::DecryptFailed)?;
    decrypt_with_aad(channel_key, &nonce, &ciphertext, b"")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> [u8; 32] {
        // A fixed key for testing. Never use a predictable key in production.
        // But you knew that. Right?
        let mut key = [0u8; 32];
        for (i, byte) in key.iter_mut().enumerate() {
            *byte = i as u8;
        }
        key
    }

    #[test]
    fn test_aad_encrypt_decrypt_roundtrip() {
        let key = test_key();
        let plaintext = b"hey #general, anyone around?";
        let aad = b"channel:general";

        let (nonce, ciphertext) = encrypt_with_aad(&key, plaintext, aad).unwrap();
        let recovered = decrypt_with_aad(&key, &nonce, &ciphertext, aad).unwrap();
        assert_eq!(recovered, plaintext);
    }

    #[test]
    fn test_wrong_aad_fails_decryption() {
        let key = test_key();
        let (nonce, ciphertext) = encrypt_with_aad(&key, b"secret", b"correct-aad").unwrap();

        // Changing the AAD should cause authentication failure.
        // This is the whole point of "authenticated" in AEAD.
        assert!(decrypt_with_aad(&key, &nonce, &ciphertext, b"wrong-aad").is_err());
    }

    #[test]
    fn test_wrong_key_fails_decryption() {
        let key = test_key();
        let (nonce, ciphertext) = encrypt_with_aad(&key, b"secret", b"").unwrap();

        let mut wrong_key = test_key();
        wrong_key[0] ^= 0xFF; // Flip one byte

        assert!(decrypt_with_aad(&wrong_key, &nonce, &ciphertext, b"").is_err());
    }

    #[test]
    fn test_modified_ciphertext_fails_decryption() {
        let key = test_key();
        let (nonce, mut ciphertext) = encrypt_with_aad(&key, b"secret", b"").unwrap();
        ciphertext[0] ^= 0xFF;

        assert!(decrypt_with_aad(&key, &nonce, &ciphertext, b"").is_err());
    }

    #[test]
    fn test_unique_nonces() {
        // Two encryptions with the same key should produce different nonces.
        // If this fails, the RNG is broken and we need to burn everything down.
        let key = test_key();
        let (nonce1, _) = encrypt_with_aad(&key, b"message", b"").unwrap();
        let (nonce2, _) = encrypt_with_aad(&key, b"message", b"").unwrap();
        assert_ne!(nonce1, nonce2);
    }

    #[test]
    fn test_ciphertext_length() {
        // Ciphertext should be plaintext length + auth tag (16).
        let key = test_key();
        let plaintext = b"exactly 26 bytes of input!";
        let (_, ciphertext) = encrypt_with_aad(&key, plaintext, b"").unwrap();
        assert_eq!(ciphertext.len(), plaintext.len() + 16);
    }

    #[test]
    fn test_large_plaintext() {
        // AES-GCM can handle messages up to 2^36 - 32 bytes per NIST SP 800-38D.
        // We won't test that limit, but 1MB should be fine.
        let key = test_key();
        let plaintext = vec![0xAB; 1_000_000];
        let (nonce, ciphertext) = encrypt_with_aad(&key, &plaintext, b"").unwrap();
        let recovered = decrypt_with_aad(&key, &nonce, &ciphertext, b"").unwrap();
        assert_eq!(recovered, plaintext);
    }

    #[test]
    fn test_seal_open_message_roundtrip() {
        let key = test_key();
        let (nonce, ciphertext) = seal_message(&key, b"hey #general").unwrap();
        let recovered = open_message(&key, &nonce, &ciphertext).unwrap();
        assert_eq!(recovered, b"hey #general");
    }

    #[test]
    fn test_seal_message_fields_are_base64() {
        let key = test_key();
        let (nonce, ciphertext) = seal_message(&key, b"payload").unwrap();
        assert!(base64::Engine::decode(&base64::engine::general_purpose::STANDARD, &nonce).is_ok());
        assert!(
            base64::Engine::decode(&base64::engine::general_purpose::STANDARD, &ciphertext).is_ok()
        );
    }

    #[test]
    fn test_open_message_wrong_channel_key_fails() {
        let key = test_key();
        let mut other_key = test_key();
        other_key[0] ^= 0xFF;
        let (nonce, ciphertext) = seal_message(&key, b"payload").unwrap();
        assert!(open_message(&other_key, &nonce, &ciphertext).is_err());
    }

    #[test]
    fn test_open_message_rejects_short_nonce() {
        let key = test_key();
        let (_, ciphertext) = seal_message(&key, b"payload").unwrap();
        let bogus_nonce = base64::Engine::encode(&base64::engine::general_purpose::STANDARD, b"short");
        assert!(open_message(&key, &bogus_nonce, &ciphertext).is_err());
    }
}
