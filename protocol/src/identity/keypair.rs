//! # Ed25519 Signing Keypair
//!
//! Every TAD node has exactly one long-lived Ed25519 keypair. It signs
//! every message the node originates and its public half feeds directly
//! into [`node_id`](crate::identity::node_id) derivation.
//!
//! ## Security considerations
//!
//! - Private key bytes are never exposed through `Debug`.
//! - Key generation uses `OsRng`; there is no seed-based constructor in
//!   the public API because TAD has no recovery-phrase concept — lose
//!   the key file, lose the identity.

use ed25519_dalek::{Signature as DalekSignature, Signer, SigningKey, Verifier, VerifyingKey};
use std::fmt;
use thiserror::Error;

/// Errors from signing-key operations.
///
/// Deliberately vague about *why* a key is invalid — leaking structural
/// detail about rejected key material is a classic footgun.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("invalid secret key bytes: wrong length or not a valid scalar")]
    InvalidSecretKey,

    #[error("invalid public key bytes: not a valid Ed25519 point")]
    InvalidPublicKey,

    #[error("invalid signature bytes: expected 64 bytes")]
    InvalidSignature,
}

/// A node's Ed25519 signing keypair.
///
/// Does not implement `Serialize`/`Deserialize` — persisting the secret
/// half is a deliberate act handled by [`crate::identity::identity`],
/// not something that should happen by accident via a derive.
pub struct SigningKeypair {
    signing_key: SigningKey,
}

/// The public half of a [`SigningKeypair`], safe to share over the wire.
#[derive(Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct VerifyingKeyBytes {
    bytes: [u8; 32],
}

/// A 64-byte Ed25519 signature.
#[derive(Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SignatureBytes {
    bytes: Vec<u8>,
}

impl SigningKeypair {
    /// Generate a fresh keypair using the OS CSPRNG.
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut rand::rngs::OsRng);
        Self { signing_key }
    }

    /// Reconstruct a keypair from its raw 32-byte secret scalar.
    ///
    /// Used when loading a persisted identity at startup.
    pub fn from_bytes(secret_key_bytes: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(secret_key_bytes),
        }
    }

    /// The raw 32-byte secret key. Handle with care — this is the only
    /// thing standing between an attacker and this node's identity.
    pub fn secret_key_bytes(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }

    /// The public verifying key.
    pub fn public_key(&self) -> VerifyingKeyBytes {
        VerifyingKeyBytes {
            bytes: self.signing_key.verifying_key().to_bytes(),
        }
    }

    /// Sign a message. Ed25519 is deterministic: the same (key, message)
    /// always produces the same signature.
    pub fn sign(&self, message: &[u8]) -> SignatureBytes {
        let sig = self.signing_key.sign(message);
        SignatureBytes {
            bytes: sig.to_bytes().to_vec(),
        }
    }

    /// Verify a signature against this keypair's own public key.
    pub fn verify(&self, message: &[u8], signature: &SignatureBytes) -> bool {
        self.public_key().verify(message, signature)
    }
}

impl Clone for SigningKeypair {
    fn clone(&self) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(&self.signing_key.to_bytes()),
        }
    }
}

impl fmt::Debug for SigningKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SigningKeypair(pub={})", self.public_key().to_hex())
    }
}

impl VerifyingKeyBytes {
    /// Wrap raw bytes without validating them against the curve.
    /// Prefer [`try_from_slice`](Self::try_from_slice) for untrusted input.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self { bytes }
    }

    /// Parse and validate a public key from an arbitrary-length slice.
    pub fn try_from_slice(slice: &[u8]) -> Result<Self, KeyError> {
        let bytes: [u8; 32] = slice.try_into().map_err(|_| KeyError::InvalidPublicKey)?;
        VerifyingKey::from_bytes(&bytes).map_err(|_| KeyError::InvalidPublicKey)?;
        Ok(Self { bytes })
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }

    /// Verify a signature against this public key. Returns `false` on any
    /// malformed input rather than propagating an error — callers almost
    /// always just want a yes/no answer.
    pub fn verify(&self, message: &[u8], signature: &SignatureBytes) -> bool {
        let Ok(verifying_key) = VerifyingKey::from_bytes(&self.bytes) else {
            return false;
        };
        let Ok(sig_bytes) = <[u8; 64]>::try_from(signature.bytes.as_slice()) else {
            return false;
        };
        let dalek_sig = DalekSignature::from_bytes(&sig_bytes);
        verifying_key.verify(message, &dalek_sig).is_ok()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }

    pub fn from_hex(s: &str) -> Result<Self, KeyError> {
        let decoded = hex::decode(s).map_err(|_| KeyError::InvalidPublicKey)?;
        Self::try_from_slice(&decoded)
    }
}

impl fmt::Display for VerifyingKeyBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for VerifyingKeyBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VerifyingKeyBytes({})", &self.to_hex()[..16])
    }
}

impl SignatureBytes {
    pub fn from_bytes(bytes: [u8; 64]) -> Self {
        Self {
            bytes: bytes.to_vec(),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.bytes)
    }

    pub fn from_hex(s: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(s).map_err(|_| KeyError::InvalidSignature)?;
        if bytes.len() != 64 {
            return Err(KeyError::InvalidSignature);
        }
        Ok(Self { bytes })
    }
}

impl fmt::Debug for SignatureBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SignatureBytes({}...)", &self.to_hex()[..8.min(self.to_hex().len())])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_produces_valid_keypair() {
        let kp = SigningKeypair::generate();
        assert_eq!(kp.public_key().as_bytes().len(), 32);
    }

    #[test]
    fn sign_verify_roundtrip() {
        let kp = SigningKeypair::generate();
        let msg = b"hello #general";
        let sig = kp.sign(msg);
        assert!(kp.verify(msg, &sig));
    }

    #[test]
    fn wrong_message_fails_verification() {
        let kp = SigningKeypair::generate();
        let sig = kp.sign(b"original");
        assert!(!kp.verify(b"tampered", &sig));
    }

    #[test]
    fn wrong_key_fails_verification() {
        let kp1 = SigningKeypair::generate();
        let kp2 = SigningKeypair::generate();
        let sig = kp1.sign(b"message");
        assert!(!kp2.public_key().verify(b"message", &sig));
    }

    #[test]
    fn secret_key_roundtrip() {
        let kp = SigningKeypair::generate();
        let bytes = kp.secret_key_bytes();
        let restored = SigningKeypair::from_bytes(&bytes);
        assert_eq!(kp.public_key(), restored.public_key());
    }

    #[test]
    fn signatures_are_deterministic() {
        let kp = SigningKeypair::generate();
        let sig1 = kp.sign(b"determinism");
        let sig2 = kp.sign(b"determinism");
        assert_eq!(sig1, sig2);
    }

    #[test]
    fn debug_does_not_leak_secret() {
        let kp = SigningKeypair::generate();
        let debug_str = format!("{:?}", kp);
        assert!(debug_str.starts_with("SigningKeypair(pub="));
        assert!(!debug_str.contains("signing_key"));
    }

    #[test]
    fn public_key_hex_roundtrip() {
        let kp = SigningKeypair::generate();
        let pk = kp.public_key();
        let recovered = VerifyingKeyBytes::from_hex(&pk.to_hex()).unwrap();
        assert_eq!(pk, recovered);
    }

    #[test]
    fn rejects_wrong_length_public_key() {
        assert!(VerifyingKeyBytes::try_from_slice(&[0u8; 16]).is_err());
    }

    #[test]
    fn rejects_wrong_length_signature_hex() {
        assert!(SignatureBytes::from_hex("deadbeef").is_err());
    }

    #[test]
    fn two_generated_keypairs_differ() {
        let kp1 = SigningKeypair::generate();
        let kp2 = SigningKeypair::generate();
        assert_ne!(kp1.public_key(), kp2.public_key());
    }
}
