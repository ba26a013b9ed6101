//! # Password-Derived Channel Keys
//!
//! The legacy path alongside invite-based private channels: a public
//! channel can instead be "encrypted" by a shared password rather than
//! an explicit member list. Anyone who knows
//! the password can derive the channel's symmetric key; there is no
//! invite handshake and no per-member bookkeeping.
//!
//! A single Argon2id pass produces 64 bytes of output, split into the
//! symmetric key (first 32 bytes) and a separate verification hash (last
//! 32 bytes) — so the row a node persists (`password_hash`/`salt`) can
//! confirm a candidate password is correct without ever handing out the
//! key itself to something just reading the stored hash.

use argon2::{Algorithm, Argon2, Params, Version};
use rand::RngCore;
use thiserror::Error;

/// Memory cost in KiB. Deliberately modest — this gates joining a chat
/// channel, not unlocking an at-rest key vault, so a sub-second
/// derivation on commodity hardware is the right trade-off.
const M_COST: u32 = 19_456;
const T_COST: u32 = 2;
const P_COST: u32 = 1;
const OUTPUT_LEN: usize = 64;

pub const SALT_LEN: usize = 16;

#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("argon2 key derivation failed: {0}")]
    Derivation(String),
}

/// Derived material for a password-protected channel: the 32-byte
/// symmetric key used to encrypt/decrypt messages, and a 32-byte
/// verification hash safe to persist alongside the salt.
pub struct ChannelKeyMaterial {
    pub key: [u8; 32],
    pub verification_hash: [u8; 32],
}

/// Generate a fresh random salt for a new password-protected channel.
pub fn generate_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    rand::rngs::OsRng.fill_bytes(&mut salt);
    salt
}

/// Derive the channel key and verification hash from a password and salt.
pub fn derive_channel_material(
    password: &str,
    salt: &[u8],
) -> Result<ChannelKeyMaterial, PasswordError> {
    let params = Params::new(M_COST, T_COST, P_COST, Some(OUTPUT_LEN))
        .map_err(|e| PasswordError::Derivation(e.to_string()))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut output = [0u8; OUTPUT_LEN];
    argon2
        .hash_password_into(password.as_bytes(), salt, &mut output)
        .map_err(|e| PasswordError::Derivation(e.to_string()))?;

    let mut key = [0u8; 32];
    let mut verification_hash = [0u8; 32];
    key.copy_from_slice(&output[..32]);
    verification_hash.copy_from_slice(&output[32..]);

    Ok(ChannelKeyMaterial { key, verification_hash })
}

/// Check a candidate password against a persisted verification hash,
/// re-deriving the key in the process so a correct guess can join
/// immediately without a second round trip.
pub fn verify_and_derive(
    password: &str,
    salt: &[u8],
    expected_hash: &[u8],
) -> Result<Option<[u8; 32]>, PasswordError> {
    let material = derive_channel_material(password, salt)?;
    if constant_time_eq(&material.verification_hash, expected_hash) {
        Ok(Some(material.key))
    } else {
        Ok(None)
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_password_and_salt_derive_identical_material() {
        let salt = generate_salt();
        let a = derive_channel_material("correct horse battery staple", &salt).unwrap();
        let b = derive_channel_material("correct horse battery staple", &salt).unwrap();
        assert_eq!(a.key, b.key);
        assert_eq!(a.verification_hash, b.verification_hash);
    }

    #[test]
    fn different_passwords_derive_different_keys() {
        let salt = generate_salt();
        let a = derive_channel_material("password one", &salt).unwrap();
        let b = derive_channel_material("password two", &salt).unwrap();
        assert_ne!(a.key, b.key);
    }

    #[test]
    fn different_salts_derive_different_keys_for_same_password() {
        let a = derive_channel_material("shared secret", &generate_salt()).unwrap();
        let b = derive_channel_material("shared secret", &generate_salt()).unwrap();
        assert_ne!(a.key, b.key);
    }

    #[test]
    fn key_and_verification_hash_are_distinct() {
        let salt = generate_salt();
        let material = derive_channel_material("hunter2", &salt).unwrap();
        assert_ne!(material.key, material.verification_hash);
    }

    #[test]
    fn verify_and_derive_accepts_correct_password() {
        let salt = generate_salt();
        let material = derive_channel_material("the eagle flies at midnight", &salt).unwrap();
        let recovered =
            verify_and_derive("the eagle flies at midnight", &salt, &material.verification_hash)
                .unwrap();
        assert_eq!(recovered, Some(material.key));
    }

    #[test]
    fn verify_and_derive_rejects_wrong_password() {
        let salt = generate_salt();
        let material = derive_channel_material("right password", &salt).unwrap();
        let recovered = verify_and_derive("wrong password", &salt, &material.verification_hash).unwrap();
        assert_eq!(recovered, None);
    }

    #[test]
    fn generated_salts_are_not_all_zero_and_differ() {
        let a = generate_salt();
        let b = generate_salt();
        assert_ne!(a, [0u8; SALT_LEN]);
        assert_ne!(a, b);
    }
}
