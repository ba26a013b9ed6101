//! # Message Signing
//!
//! Thin, crate-level wrapper tying [`crate::identity::keypair`] to
//! [`crate::identity::canonical`]: every gossiped message is signed over
//! its canonical JSON encoding, never over the struct's in-memory layout.
//!
//! Keeping this as free functions (rather than methods on `SigningKeypair`)
//! gives one place to audit "what does TAD actually sign" separately from
//! "how does Ed25519 signing work".

use crate::identity::canonical::{self, CanonicalError};
use crate::identity::keypair::{SignatureBytes, SigningKeypair, VerifyingKeyBytes};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SigningError {
    #[error("failed to canonicalize value for signing: {0}")]
    Canonicalize(#[from] CanonicalError),
}

/// Sign the canonical encoding of `value`.
pub fn sign_canonical<T: Serialize>(
    keypair: &SigningKeypair,
    value: &T,
) -> Result<SignatureBytes, SigningError> {
    let bytes = canonical::to_canonical_json(value)?;
    Ok(keypair.sign(bytes.as_bytes()))
}

/// Verify a signature against the canonical encoding of `value`.
///
/// Returns `false` (never an error) on any malformed input, mirroring
/// [`VerifyingKeyBytes::verify`] — callers almost always just want a
/// yes/no answer, and a canonicalization failure is just another way for
/// the signature to not check out.
pub fn verify_canonical<T: Serialize>(
    public_key: &VerifyingKeyBytes,
    value: &T,
    signature: &SignatureBytes,
) -> bool {
    let Ok(bytes) = canonical::to_canonical_json(value) else {
        return false;
    };
    public_key.verify(bytes.as_bytes(), signature)
}

/// Verify multiple signatures at once, short-circuiting on the first
/// failure. Used when validating a batch of gossip messages replayed from
/// the persistence log at startup.
pub fn batch_verify_canonical<T: Serialize>(
    items: &[(VerifyingKeyBytes, T, SignatureBytes)],
) -> bool {
    items
        .iter()
        .all(|(pk, value, sig)| verify_canonical(pk, value, sig))
}
