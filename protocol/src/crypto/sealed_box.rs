//! # Sealed-Box Channel Invites
//!
//! A channel invite has to reach exactly one recipient without any prior
//! interactive handshake — the inviter may not even be online at the same
//! time as the invitee once the invite is gossiped. That rules out the
//! two-round ephemeral-ephemeral exchange used elsewhere in this crate;
//! instead this is a one-shot "sealed box": the sender generates a fresh
//! ephemeral X25519 keypair, runs Diffie-Hellman against the recipient's
//! long-lived static public key, and derives a key with the same
//! BLAKE3 `derive_key`-mode KDF construction used for session keys.
//!
//! ```text
//! sender:   ephemeral_secret, ephemeral_public = X25519::generate()
//!           shared = DH(ephemeral_secret, recipient_static_public)
//!           key = KDF(shared, sorted(ephemeral_public, recipient_static_public))
//!           seal channel_key under `key` with AES-256-GCM
//!           send { ephemeral_public, nonce, ciphertext }
//!
//! recipient: shared = DH(recipient_static_secret, ephemeral_public)
//!            key = KDF(shared, sorted(ephemeral_public, recipient_static_public))
//!            open ciphertext under `key`
//! ```
//!
//! Because the recipient's static secret never moves and the sender's
//! ephemeral secret is discarded immediately after sealing, this gives
//! sender-anonymity and forward secrecy for the invite itself — but not
//! for the channel key it delivers, which lives on for as long as the
//! channel does. That tradeoff is intentional: TAD explicitly does not
//! promise forward secrecy for channel content — channel keys are
//! long-lived by design.

use crate::config::AES_KEY_LENGTH;
use crate::crypto::encryption::{self, EncryptionError};
use crate::identity::x25519::{EncryptionKeypair, EncryptionPublicKey};
use thiserror::Error;

const KDF_CONTEXT: &str = "tad channel invite sealed box v1";

#[derive(Debug, Error)]
pub enum SealedBoxError {
    #[error("failed to seal invite payload: {0}")]
    Seal(EncryptionError),

    #[error("failed to open invite payload: {0}")]
    Open(EncryptionError),
}

/// A sealed channel invite, ready to be attached to an `INVITE` envelope.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SealedInvite {
    pub ephemeral_public_key: EncryptionPublicKey,
    pub nonce: String,
    pub ciphertext: String,
}

/// Seal `payload` (typically a channel's symmetric key) so that only the
/// holder of `recipient_static_public`'s matching secret can open it.
pub fn seal(
    recipient_static_public: &EncryptionPublicKey,
    payload: &[u8],
) -> Result<SealedInvite, SealedBoxError> {
    let ephemeral = EncryptionKeypair::generate();
    let ephemeral_public = ephemeral.public_key();
    let shared = ephemeral.diffie_hellman(recipient_static_public);
    let key = derive_box_key(&shared, &ephemeral_public, recipient_static_public);

    let (nonce, ciphertext) =
        encryption::seal_message(&key, payload).map_err(SealedBoxError::Seal)?;

    Ok(SealedInvite {
        ephemeral_public_key: ephemeral_public,
        nonce,
        ciphertext,
    })
}

/// Open a [`SealedInvite`] using the recipient's long-lived encryption
/// keypair.
pub fn open(
    recipient_keypair: &EncryptionKeypair,
    invite: &SealedInvite,
) -> Result<Vec<u8>, SealedBoxError> {
    let shared = recipient_keypair.diffie_hellman(&invite.ephemeral_public_key);
    let key = derive_box_key(
        &shared,
        &invite.ephemeral_public_key,
        &recipient_keypair.public_key(),
    );

    encryption::open_message(&key, &invite.nonce, &invite.ciphertext).map_err(SealedBoxError::Open)
}

/// Domain-separated KDF over the raw DH output, binding the derived key to
/// both public keys in canonical (sorted) order so sender and recipient
/// always land on the same key regardless of which side computes it.
fn derive_box_key(
    shared_secret: &[u8; 32],
    ephemeral_public: &EncryptionPublicKey,
    recipient_static_public: &EncryptionPublicKey,
) -> [u8; AES_KEY_LENGTH] {
    let mut hasher = blake3::Hasher::new_derive_key(KDF_CONTEXT);
    hasher.update(shared_secret);

    let (first, second) = if ephemeral_public.as_bytes() <= recipient_static_public.as_bytes() {
        (ephemeral_public.as_bytes(), recipient_static_public.as_bytes())
    } else {
        (recipient_static_public.as_bytes(), ephemeral_public.as_bytes())
    };
    hasher.update(first);
    hasher.update(second);

    let mut key = [0u8; AES_KEY_LENGTH];
    hasher.finalize_xof().fill(&mut key);
    key
}
