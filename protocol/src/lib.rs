// Copyright (c) 2026 TAD Contributors. MIT License.
// See LICENSE for details.

//! # TAD — Core Library
//!
//! `tad-core` implements the hard parts of a decentralized, local-network
//! peer-to-peer chat system: nodes discover each other over mDNS, connect
//! directly over TCP, and propagate messages through a gossip overlay into
//! named channels, optionally end-to-end encrypted.
//!
//! ## Architecture
//!
//! - **identity** — Ed25519 signing keys, X25519 encryption keys, `node_id`
//!   derivation, canonical encoding for signing.
//! - **crypto** — AES-256-GCM message encryption and X25519 sealed-box
//!   channel invites built on top of identity's key types.
//! - **persistence** — the durable `sled`-backed store for messages,
//!   channels, memberships, peers, and the gossip dedup cache.
//! - **network** — connection fabric (TCP accept/dial/framing), mDNS
//!   discovery, the gossip engine, and the wire envelope types.
//! - **orchestrator** — wires the above together and fans callbacks out
//!   to the UI layer.
//! - **config** — protocol constants: ports, timeouts, gossip parameters,
//!   rate limits.
//!
//! Dependency order (leaves first): identity, crypto, persistence,
//! network, orchestrator.
//!
//! ## Design Philosophy
//!
//! 1. Correctness over performance (but we're still fast).
//! 2. No unsafe code in crypto paths — we sleep at night.
//! 3. Every public API is documented. Internal shame is documented too.

pub mod config;
pub mod crypto;
pub mod identity;
pub mod network;
pub mod orchestrator;
pub mod persistence;
