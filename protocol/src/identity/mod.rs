//! # Identity Module
//!
//! Every TAD node is identified by two long-lived keypairs generated on
//! first run: an Ed25519 keypair that signs everything the node
//! originates, and an X25519 keypair that channel invites are sealed
//! against. The Ed25519 public key also feeds `node_id` derivation — a
//! short, human-showable identifier nodes use to refer to each other.
//!
//! The identity stack is layered:
//!
//! 1. **Keypair** — Ed25519 signing key material. Signs messages, proves
//!    authorship.
//! 2. **X25519** — Long-lived encryption key material. Never signs
//!    anything; only participates in Diffie-Hellman for sealed-box
//!    invites.
//! 3. **Node ID** — SHA-256 of the signing public key, truncated to 20
//!    bytes, Base32-encoded. This is what peers display and log.
//! 4. **Canonical encoding** — The deterministic byte representation
//!    signed messages are hashed/signed over.
//! 5. **Identity** — Combines the above into the one object a node loads
//!    once at startup.

pub mod canonical;
pub mod identity;
pub mod keypair;
pub mod node_id;
pub mod x25519;

pub use canonical::{to_canonical_json, CanonicalError};
pub use identity::{IdentityError, NodeIdentity, PublicBundle};
pub use keypair::{KeyError, SignatureBytes, SigningKeypair, VerifyingKeyBytes};
pub use node_id::{NodeId, NodeIdError};
pub use x25519::{EncryptionKeypair, EncryptionPublicKey, X25519Error};
