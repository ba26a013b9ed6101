//! # Cryptographic Primitives for TAD
//!
//! Every encrypted payload and sealed invite flows through here. Key
//! *material* (Ed25519 signing keys, X25519 encryption keys, derived node
//! IDs) lives in [`crate::identity`] instead — this module is purely about
//! what you do with keys once you have them.
//!
//! We deliberately chose boring, well-audited cryptography:
//!
//! - **Ed25519** for signatures (see [`crate::identity::keypair`]).
//! - **X25519** for key exchange, used here for sealed-box invites.
//! - **AES-256-GCM** for symmetric encryption — AEAD done right.
//! - **BLAKE3** for key derivation — `derive_key` mode is purpose-built
//!   for turning a raw DH output into a uniform key.
//!
//! ## A note on "rolling your own crypto"
//!
//! We don't. Everything here is a thin, type-safe wrapper around audited
//! implementations. If you're tempted to optimize these functions, please
//! reconsider. Then reconsider again. Then go read about timing attacks
//! and come back when you've lost the urge.

pub mod encryption;
pub mod password;
pub mod sealed_box;
pub mod signatures;

pub use encryption::{seal_message, open_message};
pub use password::{ChannelKeyMaterial, PasswordError};
pub use sealed_box::{seal, open, SealedBoxError, SealedInvite};
pub use signatures::{sign_canonical, verify_canonical, SigningError};
