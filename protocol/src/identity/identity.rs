//! # Node Identity
//!
//! Ties together the two long-lived keypairs (Ed25519 signing, X25519
//! encryption) and the derived [`NodeId`] into the one object a TAD node
//! creates once and loads on every subsequent boot.
//!
//! File layout under the data directory:
//!
//! ```text
//! <data_dir>/identity/signing.key     (0600, 32 raw bytes)
//! <data_dir>/identity/encryption.key  (0600, 32 raw bytes)
//! <data_dir>/identity/public.json     (world-readable, public material)
//! ```

use crate::identity::keypair::{SigningKeypair, VerifyingKeyBytes};
use crate::identity::node_id::NodeId;
use crate::identity::x25519::{EncryptionKeypair, EncryptionPublicKey};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("failed to read identity file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write identity file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("identity key file {path} has the wrong length: expected 32 bytes, got {found}")]
    WrongKeyLength { path: PathBuf, found: usize },

    #[error("public key bundle is corrupt: {0}")]
    CorruptPublicBundle(serde_json::Error),
}

/// The public material other nodes learn about this one: signing key,
/// encryption key, and the node ID derived from the former.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicBundle {
    pub node_id: NodeId,
    pub signing_public_key: VerifyingKeyBytes,
    pub encryption_public_key: EncryptionPublicKey,
}

/// A node's full, long-lived identity.
///
/// Immutable after creation except `display_name`.
pub struct NodeIdentity {
    signing_keypair: SigningKeypair,
    encryption_keypair: EncryptionKeypair,
    node_id: NodeId,
    display_name: Option<String>,
}

impl NodeIdentity {
    /// Generate a brand-new identity. Does not touch disk — callers that
    /// want persistence should go through [`load_or_generate`].
    pub fn generate(display_name: Option<String>) -> Self {
        let signing_keypair = SigningKeypair::generate();
        let encryption_keypair = EncryptionKeypair::generate();
        let node_id = NodeId::from_public_key(&signing_keypair.public_key());
        Self {
            signing_keypair,
            encryption_keypair,
            node_id,
            display_name,
        }
    }

    /// Load a previously persisted identity from `data_dir`, or generate
    /// and persist a fresh one if none exists yet.
    ///
    /// Private key files are written with owner-only (`0600`) permissions
    /// on Unix; the public bundle is left at the default (world-readable)
    /// permissions so peers' out-of-band tooling can read it.
    pub fn load_or_generate(data_dir: &Path) -> Result<Self, IdentityError> {
        let identity_dir = data_dir.join("identity");
        let signing_path = identity_dir.join("signing.key");
        let encryption_path = identity_dir.join("encryption.key");
        let public_path = identity_dir.join("public.json");

        if signing_path.exists() && encryption_path.exists() {
            let signing_bytes = read_key_file(&signing_path)?;
            let encryption_bytes = read_key_file(&encryption_path)?;
            let signing_keypair = SigningKeypair::from_bytes(&signing_bytes);
            let encryption_keypair = EncryptionKeypair::from_bytes(encryption_bytes);
            let node_id = NodeId::from_public_key(&signing_keypair.public_key());

            let display_name = fs::read_to_string(&public_path)
                .ok()
                .and_then(|raw| serde_json::from_str::<StoredProfile>(&raw).ok())
                .and_then(|profile| profile.display_name);

            return Ok(Self {
                signing_keypair,
                encryption_keypair,
                node_id,
                display_name,
            });
        }

        fs::create_dir_all(&identity_dir).map_err(|source| IdentityError::Write {
            path: identity_dir.clone(),
            source,
        })?;

        let identity = Self::generate(None);
        write_key_file(&signing_path, &identity.signing_keypair.secret_key_bytes())?;
        write_key_file(
            &encryption_path,
            &identity.encryption_keypair.secret_key_bytes(),
        )?;

        let profile = StoredProfile {
            display_name: identity.display_name.clone(),
        };
        let serialized =
            serde_json::to_string_pretty(&profile).map_err(IdentityError::CorruptPublicBundle)?;
        fs::write(&public_path, serialized).map_err(|source| IdentityError::Write {
            path: public_path,
            source,
        })?;

        Ok(identity)
    }

    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    pub fn signing_keypair(&self) -> &SigningKeypair {
        &self.signing_keypair
    }

    pub fn encryption_keypair(&self) -> &EncryptionKeypair {
        &self.encryption_keypair
    }

    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    pub fn set_display_name(&mut self, name: Option<String>) {
        self.display_name = name;
    }

    /// The public material this node advertises to peers.
    pub fn public_bundle(&self) -> PublicBundle {
        PublicBundle {
            node_id: self.node_id.clone(),
            signing_public_key: self.signing_keypair.public_key(),
            encryption_public_key: self.encryption_keypair.public_key(),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct StoredProfile {
    display_name: Option<String>,
}

fn read_key_file(path: &Path) -> Result<[u8; 32], IdentityError> {
    let bytes = fs::read(path).map_err(|source| IdentityError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    if bytes.len() != 32 {
        return Err(IdentityError::WrongKeyLength {
            path: path.to_path_buf(),
            found: bytes.len(),
        });
    }
    let mut arr = [0u8; 32];
    arr.copy_from_slice(&bytes);
    Ok(arr)
}

fn write_key_file(path: &Path, bytes: &[u8; 32]) -> Result<(), IdentityError> {
    fs::write(path, bytes).map_err(|source| IdentityError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    restrict_to_owner(path)?;
    Ok(())
}

#[cfg(unix)]
fn restrict_to_owner(path: &Path) -> Result<(), IdentityError> {
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|source| {
        IdentityError::Write {
            path: path.to_path_buf(),
            source,
        }
    })
}

#[cfg(not(unix))]
fn restrict_to_owner(_path: &Path) -> Result<(), IdentityError> {
    Ok(())
}
