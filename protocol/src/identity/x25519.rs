//! # X25519 Encryption Keypair
//!
//! Every node also carries a long-lived X25519 keypair, distinct from its
//! Ed25519 signing keypair. This is the key channel invites are sealed
//! against (see [`crate::crypto::sealed_box`]) — unlike the signing key,
//! it never signs anything, it only participates in Diffie-Hellman.
//!
//! A static (non-ephemeral) secret is used here, in contrast to the
//! per-session ephemeral keys a sealed box's *sender* generates on the
//! fly — this key has to outlive any single invite so that invites sent
//! to this node days apart can all be opened with it.

use std::fmt;
use thiserror::Error;
use x25519_dalek::{PublicKey, StaticSecret};

#[derive(Debug, Error)]
pub enum X25519Error {
    #[error("invalid X25519 public key: expected 32 bytes")]
    InvalidPublicKey,

    #[error("invalid X25519 secret key: expected 32 bytes")]
    InvalidSecretKey,
}

/// A node's long-lived X25519 encryption keypair.
pub struct EncryptionKeypair {
    secret: StaticSecret,
}

/// The public half of an [`EncryptionKeypair`].
#[derive(Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct EncryptionPublicKey {
    bytes: [u8; 32],
}

impl EncryptionKeypair {
    /// Generate a fresh keypair using the OS CSPRNG.
    pub fn generate() -> Self {
        Self {
            secret: StaticSecret::random_from_rng(rand::rngs::OsRng),
        }
    }

    /// Reconstruct from raw secret bytes, as loaded from the identity
    /// store at startup.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self {
            secret: StaticSecret::from(bytes),
        }
    }

    pub fn secret_key_bytes(&self) -> [u8; 32] {
        self.secret.to_bytes()
    }

    pub fn public_key(&self) -> EncryptionPublicKey {
        EncryptionPublicKey {
            bytes: PublicKey::from(&self.secret).to_bytes(),
        }
    }

    /// Compute the Diffie-Hellman shared secret with a peer's public key.
    /// Used by sealed-box opening, never directly as a cipher key (see
    /// [`crate::crypto::sealed_box`] for the KDF step).
    pub fn diffie_hellman(&self, peer_public: &EncryptionPublicKey) -> [u8; 32] {
        let peer_pk = PublicKey::from(peer_public.bytes);
        *self.secret.diffie_hellman(&peer_pk).as_bytes()
    }
}

impl Clone for EncryptionKeypair {
    fn clone(&self) -> Self {
        Self {
            secret: StaticSecret::from(self.secret.to_bytes()),
        }
    }
}

impl fmt::Debug for EncryptionKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EncryptionKeypair(pub={})", self.public_key())
    }
}

impl EncryptionPublicKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self { bytes }
    }

    pub fn try_from_slice(slice: &[u8]) -> Result<Self, X25519Error> {
        let bytes: [u8; 32] = slice.try_into().map_err(|_| X25519Error::InvalidPublicKey)?;
        Ok(Self { bytes })
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }

    pub fn from_hex(s: &str) -> Result<Self, X25519Error> {
        let decoded = hex::decode(s).map_err(|_| X25519Error::InvalidPublicKey)?;
        Self::try_from_slice(&decoded)
    }
}

impl fmt::Display for EncryptionPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for EncryptionPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EncryptionPublicKey({})", &self.to_hex()[..16])
    }
}
