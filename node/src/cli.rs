//! # CLI Interface
//!
//! Defines the command-line argument structure for `tad-node` using
//! `clap` derive. Supports four subcommands: `run`, `init`, `status`,
//! and `version`.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

/// TAD — a decentralized local-network P2P chat node.
///
/// Discovers peers on the LAN over mDNS, connects directly over TCP,
/// and relays chat messages through a gossip overlay into named
/// channels, optionally end-to-end encrypted.
#[derive(Parser, Debug)]
#[command(
    name = "tad-node",
    about = "TAD local-network P2P chat node",
    version,
    propagate_version = true
)]
pub struct TadNodeCli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands for the TAD node binary.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the node.
    Run(RunArgs),
    /// Initialize a new node — creates the data directory and generates
    /// a fresh identity keypair.
    Init(InitArgs),
    /// Query the status of a running node via its debug API.
    Status(StatusArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Path to the node data directory where the identity, message
    /// store, and channel keys are kept.
    ///
    /// Created on first run if it does not exist.
    #[arg(long, short = 'd', env = "TAD_DATA_DIR", default_value = "~/.tad")]
    pub data_dir: PathBuf,

    /// TCP port to listen on for peer connections.
    #[arg(long, env = "TAD_PORT", default_value_t = tad_core::config::DEFAULT_PORT)]
    pub port: u16,

    /// Port for the local debug/status HTTP API.
    #[arg(long, env = "TAD_API_PORT", default_value_t = 8766)]
    pub api_port: u16,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "TAD_METRICS_PORT", default_value_t = 8767)]
    pub metrics_port: u16,

    /// Display name advertised to other peers over mDNS and in the
    /// handshake. Defaults to the node's derived `node_id` when unset.
    #[arg(long, env = "TAD_DISPLAY_NAME")]
    pub display_name: Option<String>,

    /// Disable mDNS discovery. Peers must be dialed explicitly.
    #[arg(long)]
    pub no_discovery: bool,

    /// Explicit peer addresses (`host:port`) to dial on startup, in
    /// addition to whatever mDNS discovers.
    #[arg(long = "peer")]
    pub peers: Vec<String>,

    /// Default `tracing` log level when `RUST_LOG` is unset.
    #[arg(long, env = "TAD_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

/// Arguments for the `init` subcommand.
#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Path to the data directory to initialize.
    #[arg(long, short = 'd', env = "TAD_DATA_DIR", default_value = "~/.tad")]
    pub data_dir: PathBuf,

    /// Display name to advertise. Defaults to the derived `node_id`.
    #[arg(long)]
    pub display_name: Option<String>,
}

/// Expands a leading `~` to the user's home directory. Any other path is
/// returned unchanged.
pub fn resolve_data_dir(path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~") {
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    path.to_path_buf()
}

/// Arguments for the `status` subcommand.
#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// Debug API endpoint of the running node.
    #[arg(long, default_value = "http://127.0.0.1:8766")]
    pub api_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli_structure() {
        // Ensures the derive macros produce a valid CLI definition.
        TadNodeCli::command().debug_assert();
    }

    #[test]
    fn resolve_data_dir_expands_tilde() {
        std::env::set_var("HOME", "/home/tester");
        let resolved = resolve_data_dir(Path::new("~/.tad"));
        assert_eq!(resolved, PathBuf::from("/home/tester/.tad"));
    }

    #[test]
    fn resolve_data_dir_leaves_absolute_path_unchanged() {
        let resolved = resolve_data_dir(Path::new("/var/lib/tad"));
        assert_eq!(resolved, PathBuf::from("/var/lib/tad"));
    }
}
