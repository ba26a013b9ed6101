//! # Node Profile
//!
//! A small TOML file at `<data_dir>/profile.toml`, separate from the
//! identity keys and the message database. Holds the node's preferred
//! display name and a couple of startup-convenience settings so a bare
//! `tad-node run -d <dir>` after the first `init`/`run` remembers what
//! was configured last time.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeProfile {
    /// Display name advertised over mDNS and in the handshake.
    #[serde(default)]
    pub display_name: Option<String>,
    /// TCP listen port used on the previous run, for operator convenience.
    #[serde(default)]
    pub port: Option<u16>,
}

impl NodeProfile {
    fn path(data_dir: &Path) -> std::path::PathBuf {
        data_dir.join("profile.toml")
    }

    /// Load the profile from `<data_dir>/profile.toml`, or an empty
    /// default if the file does not exist yet.
    pub fn load(data_dir: &Path) -> Result<Self> {
        let path = Self::path(data_dir);
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("failed to parse {}", path.display()))
    }

    /// Persist the profile to `<data_dir>/profile.toml`.
    pub fn save(&self, data_dir: &Path) -> Result<()> {
        let path = Self::path(data_dir);
        let serialized = toml::to_string_pretty(self).context("failed to serialize profile")?;
        fs::write(&path, serialized).with_context(|| format!("failed to write {}", path.display()))
    }
}
