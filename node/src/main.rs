// Copyright (c) 2026 TAD Contributors. MIT License.
// See LICENSE for details.

//! # TAD Node
//!
//! Entry point for the `tad-node` binary: the process shell that turns
//! `tad-core`'s `Orchestrator` into a running LAN chat daemon. Parses CLI
//! arguments, initializes logging and metrics, opens the connection
//! fabric's listener, starts mDNS discovery, dials configured peers, and
//! serves the debug HTTP/WS API and Prometheus metrics endpoint.
//!
//! The binary supports four subcommands:
//!
//! - `run`     — start the node
//! - `init`    — initialize a data directory and generate an identity
//! - `status`  — query a running node's debug status endpoint
//! - `version` — print build version information
//!
//! Sending messages, creating channels, and issuing invites are not
//! wired to a terminal UI here — that presentation layer is out of
//! scope for this daemon — but every operation it would need is exposed
//! directly on [`tad_core::orchestrator::Orchestrator`].

mod api;
mod cli;
mod logging;
mod metrics;
mod profile;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use parking_lot::Mutex;
use tokio::net::{TcpListener, TcpStream};
use tokio::signal;
use tokio::sync::{mpsc, watch};
use tokio::task::AbortHandle;

use tad_core::config::{self, HEARTBEAT_INTERVAL, MDNS_SERVICE_TYPE, READ_IDLE_TIMEOUT};
use tad_core::identity::identity::NodeIdentity;
use tad_core::identity::node_id::NodeId;
use tad_core::network::discovery::Discovery;
use tad_core::network::envelope::{
    CreateChannel, Envelope, GossipEnvelope, JoinChannel, LeaveChannel, PeerAnnounce, PeerRequest,
    PeerResponse, Ping, Pong, SyncRequestEnvelope, SyncResponseEnvelope,
};
use tad_core::network::fabric::{self, FabricError, Session};
use tad_core::network::gossip::RateLimitCategory;
use tad_core::orchestrator::Orchestrator;
use tad_core::persistence::db::Store;
use tad_core::persistence::models::PeerStatus;

use cli::{Commands, InitArgs, RunArgs, StatusArgs, TadNodeCli};
use logging::LogFormat;
use metrics::NodeMetrics;
use profile::NodeProfile;

/// How often the maintenance task prunes the durable gossip cache.
/// Independent of the per-entry [`tad_core::config::GOSSIP_CACHE_ENTRY_TTL`].
const MAINTENANCE_INTERVAL: std::time::Duration = std::time::Duration::from_secs(300);

#[tokio::main]
async fn main() -> Result<()> {
    let cli = TadNodeCli::parse();

    match cli.command {
        Commands::Run(args) => run_node(args).await,
        Commands::Init(args) => init_node(args),
        Commands::Status(args) => query_status(args).await,
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// run — Full node startup sequence
// ---------------------------------------------------------------------------

/// Starts the full node: connection fabric listener, mDNS discovery,
/// outbound dialer, gossip maintenance, debug API, and metrics endpoint.
///
/// Startup sequence:
/// 1.  Resolve data directory and load the TOML profile
/// 2.  Initialize logging
/// 3.  Load or generate node identity
/// 4.  Open the persistent store
/// 5.  Create the orchestrator
/// 6.  Bind the TCP listener
/// 7.  Start mDNS discovery (unless `--no-discovery`)
/// 8.  Dial explicit `--peer` addresses
/// 9.  Spawn the accept loop
/// 10. Spawn the periodic gossip-cache maintenance task
/// 11. Start the debug API and metrics servers
/// 12. Await shutdown, then drain sessions
async fn run_node(args: RunArgs) -> Result<()> {
    // --- 1. Resolve data directory and load the TOML profile ---
    let data_dir = cli::resolve_data_dir(&args.data_dir);
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("failed to create data directory: {}", data_dir.display()))?;

    let mut profile =
        NodeProfile::load(&data_dir).context("failed to load node profile")?;
    if args.display_name.is_some() || profile.port != Some(args.port) {
        if args.display_name.is_some() {
            profile.display_name = args.display_name.clone();
        }
        profile.port = Some(args.port);
        profile
            .save(&data_dir)
            .context("failed to persist node profile")?;
    }
    let display_name = args.display_name.clone().or_else(|| profile.display_name.clone());

    // --- 2. Initialize logging ---
    let log_filter = format!(
        "tad_node={level},tad_core={level},tower_http=info",
        level = args.log_level
    );
    logging::init_logging(&log_filter, LogFormat::Pretty);

    tracing::info!(
        port = args.port,
        api_port = args.api_port,
        metrics_port = args.metrics_port,
        data_dir = %data_dir.display(),
        discovery = !args.no_discovery,
        "starting tad-node"
    );

    // --- 3. Load or generate node identity ---
    let mut identity = NodeIdentity::load_or_generate(&data_dir)
        .context("failed to load or generate node identity")?;
    if let Some(name) = display_name.clone() {
        identity.set_display_name(Some(name));
    }
    let node_id = identity.node_id().clone();
    tracing::info!(node_id = %node_id, "identity ready");

    // --- 4. Open the persistent store ---
    let db_path = data_dir.join("db");
    let store = Store::open(&db_path)
        .with_context(|| format!("failed to open database at {}", db_path.display()))?;

    // --- 5. Create the orchestrator ---
    let orchestrator = Arc::new(Orchestrator::new(identity, store));

    // --- Metrics ---
    let node_metrics = Arc::new(NodeMetrics::new());

    // --- Shutdown signal ---
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // --- Session tie-break bookkeeping ---
    let sessions = Arc::new(SessionTable::new());

    // --- Dial queue: mDNS discovery and peer exchange both feed this ---
    let (dial_tx, dial_rx) = mpsc::unbounded_channel::<SocketAddr>();

    // --- 6. Bind the TCP listener ---
    let listen_addr: SocketAddr = format!("0.0.0.0:{}", args.port)
        .parse()
        .expect("valid socket address");
    let listener = fabric::listen(listen_addr)
        .await
        .with_context(|| format!("failed to bind TCP listener on {}", listen_addr))?;
    tracing::info!(%listen_addr, "connection fabric listening");

    // --- 7. Start mDNS discovery ---
    let discovery_handle = if args.no_discovery {
        None
    } else {
        match start_discovery(&node_id, args.port, display_name.as_deref(), dial_tx.clone()) {
            Ok(handle) => Some(handle),
            Err(e) => {
                tracing::warn!(error = %e, "mdns discovery unavailable, continuing without it");
                None
            }
        }
    };

    // --- 8. Dial explicit --peer addresses ---
    for peer_spec in &args.peers {
        match tokio::net::lookup_host(peer_spec).await {
            Ok(mut addrs) => {
                if let Some(addr) = addrs.next() {
                    let _ = dial_tx.send(addr);
                } else {
                    tracing::warn!(peer = %peer_spec, "could not resolve peer address");
                }
            }
            Err(e) => tracing::warn!(peer = %peer_spec, error = %e, "could not resolve peer address"),
        }
    }

    // --- Dial loop: drains the queue, opens outbound sessions ---
    let dial_loop_handle = tokio::spawn(run_dial_loop(
        dial_rx,
        Arc::clone(&orchestrator),
        Arc::clone(&node_metrics),
        Arc::clone(&sessions),
        dial_tx.clone(),
        shutdown_rx.clone(),
        args.port,
    ));

    // --- 9. Accept loop ---
    let accept_loop_handle = tokio::spawn(run_accept_loop(
        listener,
        Arc::clone(&orchestrator),
        Arc::clone(&node_metrics),
        Arc::clone(&sessions),
        dial_tx.clone(),
        shutdown_rx.clone(),
    ));

    // --- 10. Periodic maintenance ---
    let maintenance_handle = tokio::spawn(run_maintenance_loop(
        Arc::clone(&orchestrator),
        Arc::clone(&node_metrics),
        shutdown_rx.clone(),
    ));

    // --- 11. Debug API and metrics servers ---
    let app_state = api::AppState {
        version: format!("{} (protocol {})", env!("CARGO_PKG_VERSION"), config::PROTOCOL_VERSION),
        orchestrator: Arc::clone(&orchestrator),
        metrics: Arc::clone(&node_metrics),
    };
    let api_router = api::create_router(app_state);
    let api_addr: SocketAddr = format!("0.0.0.0:{}", args.api_port).parse().expect("valid socket address");
    let api_listener = TcpListener::bind(api_addr)
        .await
        .with_context(|| format!("failed to bind debug API listener on {}", api_addr))?;
    tracing::info!(%api_addr, "debug API listening");

    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(Arc::clone(&node_metrics));
    let metrics_addr: SocketAddr = format!("0.0.0.0:{}", args.metrics_port).parse().expect("valid socket address");
    let metrics_listener = TcpListener::bind(metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {}", metrics_addr))?;
    tracing::info!(%metrics_addr, "metrics endpoint listening");

    print_startup_banner(&node_id.to_text(), listen_addr, api_addr, &data_dir.to_string_lossy());

    // --- 12. Await shutdown ---
    tokio::select! {
        res = axum::serve(api_listener, api_router) => {
            if let Err(e) = res {
                tracing::error!("debug API server error: {}", e);
            }
        }
        res = axum::serve(metrics_listener, metrics_router) => {
            if let Err(e) = res {
                tracing::error!("metrics server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received, draining sessions");
        }
    }

    let _ = shutdown_tx.send(true);
    accept_loop_handle.abort();
    dial_loop_handle.abort();
    maintenance_handle.abort();
    sessions.abort_all();
    if let Some(handle) = discovery_handle {
        handle.abort();
    }
    tokio::time::sleep(config::SHUTDOWN_GRACE_PERIOD.min(std::time::Duration::from_millis(200))).await;

    tracing::info!("tad-node stopped");
    Ok(())
}

// ---------------------------------------------------------------------------
// Session bookkeeping and tie-break
// ---------------------------------------------------------------------------

struct SessionEntry {
    abort: AbortHandle,
    outbound: bool,
}

/// Tracks one task per live peer so a later, lexicographically-winning
/// connection to the same peer can abort an earlier loser.
struct SessionTable {
    entries: Mutex<HashMap<NodeId, SessionEntry>>,
}

impl SessionTable {
    fn new() -> Self {
        Self { entries: Mutex::new(HashMap::new()) }
    }

    /// Decides whether a freshly handshaken session should be kept,
    /// given any existing session to the same peer. Aborts the loser.
    /// Returns `true` if `abort` should be registered as the surviving
    /// session for `peer`.
    fn admit(&self, self_id: &NodeId, peer: &NodeId, outbound: bool, abort: AbortHandle) -> bool {
        let mut entries = self.entries.lock();
        let new_initiator = if outbound { self_id.to_text() } else { peer.to_text() };
        match entries.get(peer) {
            Some(existing) => {
                let existing_initiator = if existing.outbound { self_id.to_text() } else { peer.to_text() };
                if new_initiator < existing_initiator {
                    existing.abort.abort();
                    entries.insert(peer.clone(), SessionEntry { abort, outbound });
                    true
                } else {
                    abort.abort();
                    false
                }
            }
            None => {
                entries.insert(peer.clone(), SessionEntry { abort, outbound });
                true
            }
        }
    }

    fn abort_all(&self) {
        for (_, entry) in self.entries.lock().drain() {
            entry.abort.abort();
        }
    }
}

// ---------------------------------------------------------------------------
// mDNS discovery
// ---------------------------------------------------------------------------

/// Spins up the mDNS daemon on a blocking thread (`mdns-sd`'s browse
/// receiver is a synchronous crossbeam channel) and forwards every
/// discovered peer's address into the dial queue.
fn start_discovery(
    node_id: &NodeId,
    port: u16,
    display_name: Option<&str>,
    dial_tx: mpsc::UnboundedSender<SocketAddr>,
) -> Result<AbortHandle> {
    let mut discovery = Discovery::new(node_id.clone()).context("failed to start mdns daemon")?;
    let host_ip = local_ipv4().unwrap_or_else(|| "0.0.0.0".parse().unwrap());
    discovery
        .announce(host_ip, port, display_name)
        .context("failed to announce mdns service")?;
    let stream = discovery.browse().context("failed to browse mdns service")?;
    tracing::info!(service = MDNS_SERVICE_TYPE, %host_ip, port, "mdns discovery started");

    let task = tokio::task::spawn_blocking(move || {
        // `discovery` must outlive the browse loop — dropping it would
        // unregister our announcement and tear down the daemon thread.
        let _discovery = discovery;
        while let Some(peer) = stream.next_peer() {
            if let Some(ip) = peer.addresses.first() {
                let addr = SocketAddr::new(*ip, peer.port);
                tracing::debug!(node_id = %peer.node_id, %addr, "discovered peer via mdns");
                let _ = dial_tx.send(addr);
            }
        }
    });
    Ok(task.abort_handle())
}

/// Best-effort local IPv4 address for mDNS service advertisement: binds a
/// UDP socket to a public address without sending anything, then reads
/// back the OS-chosen local address.
fn local_ipv4() -> Option<std::net::IpAddr> {
    let socket = std::net::UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("8.8.8.8:80").ok()?;
    socket.local_addr().ok().map(|a| a.ip())
}

// ---------------------------------------------------------------------------
// Dial loop
// ---------------------------------------------------------------------------

async fn run_dial_loop(
    mut dial_rx: mpsc::UnboundedReceiver<SocketAddr>,
    orchestrator: Arc<Orchestrator>,
    metrics: Arc<NodeMetrics>,
    sessions: Arc<SessionTable>,
    dial_tx: mpsc::UnboundedSender<SocketAddr>,
    shutdown_rx: watch::Receiver<bool>,
    listen_port: u16,
) {
    while let Some(addr) = dial_rx.recv().await {
        let orchestrator = Arc::clone(&orchestrator);
        let metrics = Arc::clone(&metrics);
        let sessions = Arc::clone(&sessions);
        let dial_tx = dial_tx.clone();
        let shutdown_rx = shutdown_rx.clone();
        tokio::spawn(async move {
            match dial_and_handshake(addr, &orchestrator, listen_port).await {
                Ok(session) => {
                    spawn_session(session, orchestrator, metrics, sessions, dial_tx, shutdown_rx, true);
                }
                Err(e) => {
                    tracing::debug!(%addr, error = %e, "outbound dial failed");
                }
            }
        });
    }
}

async fn dial_and_handshake(addr: SocketAddr, orchestrator: &Orchestrator, listen_port: u16) -> Result<Session, FabricError> {
    let stream: TcpStream = fabric::dial(addr).await?;
    let identity = orchestrator.identity();
    fabric::handshake_outbound(
        stream,
        addr,
        identity.node_id().clone(),
        identity.display_name().map(|s| s.to_string()),
        listen_port,
        identity.signing_keypair().public_key().to_hex(),
        identity.encryption_keypair().public_key().to_hex(),
    )
    .await
}

// ---------------------------------------------------------------------------
// Accept loop
// ---------------------------------------------------------------------------

async fn run_accept_loop(
    listener: TcpListener,
    orchestrator: Arc<Orchestrator>,
    metrics: Arc<NodeMetrics>,
    sessions: Arc<SessionTable>,
    dial_tx: mpsc::UnboundedSender<SocketAddr>,
    shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        let (stream, peer_addr) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                tracing::warn!(error = %e, "accept failed");
                continue;
            }
        };
        let orchestrator = Arc::clone(&orchestrator);
        let metrics = Arc::clone(&metrics);
        let sessions = Arc::clone(&sessions);
        let dial_tx = dial_tx.clone();
        let shutdown_rx = shutdown_rx.clone();
        tokio::spawn(async move {
            let identity = orchestrator.identity();
            let handshake = fabric::handshake_inbound(
                stream,
                peer_addr,
                identity.node_id().clone(),
                identity.display_name().map(|s| s.to_string()),
                identity.signing_keypair().public_key().to_hex(),
                identity.encryption_keypair().public_key().to_hex(),
            )
            .await;
            match handshake {
                Ok(session) => {
                    spawn_session(session, orchestrator, metrics, sessions, dial_tx, shutdown_rx, false);
                }
                Err(e) => {
                    tracing::debug!(%peer_addr, error = %e, "inbound handshake failed");
                }
            }
        });
    }
}

// ---------------------------------------------------------------------------
// Session lifecycle
// ---------------------------------------------------------------------------

/// Registers the session's outbound sink with the orchestrator, applies
/// the peer-dedup tie-break, and spawns the read/write loop.
fn spawn_session(
    session: Session,
    orchestrator: Arc<Orchestrator>,
    metrics: Arc<NodeMetrics>,
    sessions: Arc<SessionTable>,
    dial_tx: mpsc::UnboundedSender<SocketAddr>,
    shutdown_rx: watch::Receiver<bool>,
    outbound: bool,
) {
    let peer_node_id = session.peer_node_id.clone();
    let self_node_id = orchestrator.identity().node_id().clone();

    let handle = tokio::spawn(run_session(session, Arc::clone(&orchestrator), Arc::clone(&metrics), dial_tx, shutdown_rx, outbound));
    let admitted = sessions.admit(&self_node_id, &peer_node_id, outbound, handle.abort_handle());
    if !admitted {
        tracing::debug!(peer = %peer_node_id, "closed losing session per tie-break");
    }
}

async fn run_session(
    mut session: Session,
    orchestrator: Arc<Orchestrator>,
    metrics: Arc<NodeMetrics>,
    dial_tx: mpsc::UnboundedSender<SocketAddr>,
    mut shutdown_rx: watch::Receiver<bool>,
    outbound: bool,
) {
    let peer_node_id = session.peer_node_id.clone();
    let peer_addr = session.peer_addr;

    let _ = orchestrator.observe_peer(
        peer_node_id.clone(),
        peer_addr.to_string(),
        session.peer_signing_public_key.clone(),
        session.peer_encryption_public_key.clone(),
    );
    metrics.peers_discovered_total.inc();

    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Envelope>();
    orchestrator.register_peer(peer_node_id.clone(), outbound_tx);
    metrics.connected_peers.set(orchestrator.connected_peer_count() as i64);
    tracing::info!(peer = %peer_node_id, %peer_addr, outbound, "session established");

    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
    heartbeat.tick().await; // first tick fires immediately; consume it

    'session: loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    break 'session;
                }
            }
            _ = heartbeat.tick() => {
                let ping = Envelope::Ping(Ping { sent_at: config::now_unix() });
                if session.send(&ping).await.is_err() {
                    break 'session;
                }
            }
            outgoing = outbound_rx.recv() => {
                match outgoing {
                    Some(envelope) => {
                        if session.send(&envelope).await.is_err() {
                            break 'session;
                        }
                    }
                    None => break 'session,
                }
            }
            incoming = tokio::time::timeout(READ_IDLE_TIMEOUT, session.recv()) => {
                match incoming {
                    Ok(Ok(Some(envelope))) => {
                        if !handle_envelope(envelope, &peer_node_id, &orchestrator, &metrics, &dial_tx, &mut session).await {
                            break 'session;
                        }
                    }
                    Ok(Ok(None)) => {
                        tracing::debug!(peer = %peer_node_id, "peer closed connection");
                        break 'session;
                    }
                    Ok(Err(e)) => {
                        tracing::warn!(peer = %peer_node_id, error = %e, "session error");
                        metrics.sessions_closed_total.inc();
                        break 'session;
                    }
                    Err(_) => {
                        tracing::warn!(peer = %peer_node_id, "peer idle timeout");
                        break 'session;
                    }
                }
            }
        }
    }

    orchestrator.deregister_peer(&peer_node_id);
    if let Ok(Some(mut peer)) = orchestrator.store().get_peer(&peer_node_id) {
        peer.mark_seen(config::now_unix(), PeerStatus::Offline);
        let _ = orchestrator.store().put_peer(&peer);
    }
    metrics.connected_peers.set(orchestrator.connected_peer_count() as i64);
    tracing::info!(peer = %peer_node_id, "session closed");
}

/// Dispatches one inbound envelope. Returns `false` if the session
/// should be closed (rate-limit escalation or too many malformed
/// frames — the latter is already enforced inside `Session::recv`).
async fn handle_envelope(
    envelope: Envelope,
    from_peer: &NodeId,
    orchestrator: &Arc<Orchestrator>,
    metrics: &Arc<NodeMetrics>,
    dial_tx: &mpsc::UnboundedSender<SocketAddr>,
    session: &mut Session,
) -> bool {
    match envelope {
        Envelope::Gossip(env) => {
            let verdict = orchestrator.check_rate_limit(from_peer, RateLimitCategory::GossipForwarded);
            if !verdict.allowed {
                metrics.rate_limit_violations_total.inc();
                if verdict.should_close_session {
                    metrics.sessions_closed_total.inc();
                    return false;
                }
                return true;
            }
            if let Err(e) = orchestrator.handle_gossip(env, from_peer) {
                tracing::warn!(peer = %from_peer, error = %e, "failed to process gossip message");
            } else {
                metrics.messages_received_total.inc();
            }
            true
        }
        Envelope::Message(message) => {
            let env = GossipEnvelope { ttl: message.ttl, hop_count: message.hop_count, message };
            if let Err(e) = orchestrator.handle_gossip(env, from_peer) {
                tracing::warn!(peer = %from_peer, error = %e, "failed to process direct message");
            }
            true
        }
        Envelope::Ping(Ping { sent_at }) => {
            let _ = session.send(&Envelope::Pong(Pong { sent_at })).await;
            true
        }
        Envelope::Pong(_) => true,
        Envelope::PeerAnnounce(PeerAnnounce { address, .. }) => {
            if let Ok(addr) = address.parse::<SocketAddr>() {
                let _ = dial_tx.send(addr);
            }
            true
        }
        Envelope::PeerRequest(PeerRequest) => {
            let verdict = orchestrator.check_rate_limit(from_peer, RateLimitCategory::PeerRequests);
            if !verdict.allowed {
                metrics.rate_limit_violations_total.inc();
                if verdict.should_close_session {
                    return false;
                }
                return true;
            }
            let peers = orchestrator
                .store()
                .list_peers()
                .unwrap_or_default()
                .into_iter()
                .filter(|p| &p.node_id != from_peer)
                .map(|p| PeerAnnounce { node_id: p.node_id, address: p.address })
                .collect();
            let _ = session.send(&Envelope::PeerResponse(PeerResponse { peers })).await;
            true
        }
        Envelope::PeerResponse(PeerResponse { peers }) => {
            for announced in peers {
                if let Ok(addr) = announced.address.parse::<SocketAddr>() {
                    let _ = dial_tx.send(addr);
                }
            }
            true
        }
        Envelope::SyncRequest(SyncRequestEnvelope { channel, since }) => {
            let verdict = orchestrator.check_rate_limit(from_peer, RateLimitCategory::SyncRequests);
            if !verdict.allowed {
                metrics.rate_limit_violations_total.inc();
                if verdict.should_close_session {
                    return false;
                }
                return true;
            }
            let messages = orchestrator.store().messages_for_channel_since(&channel, since).unwrap_or_default();
            let _ = session.send(&Envelope::SyncResponse(SyncResponseEnvelope { channel, messages })).await;
            true
        }
        Envelope::SyncResponse(SyncResponseEnvelope { messages, .. }) => {
            for message in messages {
                let env = GossipEnvelope { ttl: 0, hop_count: message.hop_count, message };
                let _ = orchestrator.handle_gossip(env, from_peer);
            }
            true
        }
        Envelope::CreateChannel(CreateChannel { name, encrypted }) => {
            if !encrypted && orchestrator.store().get_channel(&name).ok().flatten().is_none() {
                let _ = orchestrator.create_public_channel(&name);
            }
            true
        }
        Envelope::JoinChannel(JoinChannel { channel }) => {
            let now = config::now_unix();
            let _ = orchestrator
                .store()
                .put_membership(&tad_core::persistence::models::ChannelMembership::new(channel, from_peer.clone(), now));
            true
        }
        Envelope::LeaveChannel(LeaveChannel { channel: _ }) => true,
        Envelope::Invite(_) => {
            // Invites always travel wrapped as a `gossip` Message addressed
            // to `@invite:<node_id>`; a bare top-level Invite frame is not
            // part of the wire contract.
            tracing::debug!(peer = %from_peer, "ignoring unexpected top-level invite frame");
            true
        }
        Envelope::Hello(_) | Envelope::Welcome(_) => {
            tracing::debug!(peer = %from_peer, "ignoring unexpected post-handshake hello/welcome");
            true
        }
        Envelope::Error(err) => {
            tracing::debug!(peer = %from_peer, code = ?err.code, detail = %err.detail, "peer reported protocol error");
            true
        }
    }
}

// ---------------------------------------------------------------------------
// Periodic maintenance
// ---------------------------------------------------------------------------

async fn run_maintenance_loop(orchestrator: Arc<Orchestrator>, metrics: Arc<NodeMetrics>, mut shutdown_rx: watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(MAINTENANCE_INTERVAL);
    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    return;
                }
            }
            _ = interval.tick() => {
                match orchestrator.prune_gossip_cache() {
                    Ok(pruned) if pruned > 0 => {
                        tracing::debug!(pruned, "pruned expired gossip cache entries");
                    }
                    Ok(_) => {}
                    Err(e) => tracing::warn!(error = %e, "gossip cache maintenance failed"),
                }
                metrics.duplicates_dropped_total.set(orchestrator.gossip().duplicates_dropped() as i64);
                metrics.signature_failures_total.set(orchestrator.gossip().signature_failures() as i64);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// init — Data directory initialization
// ---------------------------------------------------------------------------

/// Initializes a new node data directory and generates a fresh identity.
///
/// Creates the directory structure:
/// ```text
/// {data_dir}/
///     db/         — sled-backed message/channel/peer store
///     identity/   — Ed25519 + X25519 keypairs, public bundle
///     profile.toml — display name and a few startup preferences
/// ```
fn init_node(args: InitArgs) -> Result<()> {
    logging::init_logging("tad_node=info", LogFormat::Pretty);

    let data_dir = cli::resolve_data_dir(&args.data_dir);
    tracing::info!(data_dir = %data_dir.display(), "initializing node");

    let identity_marker = data_dir.join("identity").join("signing.key");
    if identity_marker.exists() {
        anyhow::bail!(
            "data directory already initialized at {} (identity already present)",
            data_dir.display()
        );
    }

    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("failed to create data directory: {}", data_dir.display()))?;

    let mut identity = NodeIdentity::load_or_generate(&data_dir).context("failed to generate identity")?;
    if let Some(name) = args.display_name {
        identity.set_display_name(Some(name.clone()));
        let mut profile = NodeProfile::load(&data_dir).context("failed to load node profile")?;
        profile.display_name = Some(name);
        profile.save(&data_dir).context("failed to persist node profile")?;
    }

    let db_path = data_dir.join("db");
    let _store = Store::open(&db_path).with_context(|| format!("failed to open database at {}", db_path.display()))?;

    println!();
    println!("Node initialized successfully.");
    println!();
    println!("  Data directory : {}", data_dir.display());
    println!("  Node ID        : {}", identity.node_id().to_text());
    println!("  DB directory   : {}", db_path.display());
    println!();
    println!("Run `tad-node run -d {}` to start the node.", data_dir.display());

    Ok(())
}

// ---------------------------------------------------------------------------
// status — Query a running node
// ---------------------------------------------------------------------------

async fn query_status(args: StatusArgs) -> Result<()> {
    let url = format!("{}/status", args.api_url.trim_end_matches('/'));
    let body = http_get(&url).await?;

    match serde_json::from_str::<serde_json::Value>(&body) {
        Ok(json) => {
            println!("Node Status");
            if let Some(v) = json.get("version").and_then(|v| v.as_str()) {
                println!("  Version         : {}", v);
            }
            if let Some(v) = json.get("node_id").and_then(|v| v.as_str()) {
                println!("  Node ID         : {}", v);
            }
            if let Some(v) = json.get("connected_peers").and_then(|v| v.as_u64()) {
                println!("  Connected Peers : {}", v);
            }
            if let Some(v) = json.get("known_peers").and_then(|v| v.as_u64()) {
                println!("  Known Peers     : {}", v);
            }
            if let Some(v) = json.get("channels").and_then(|v| v.as_u64()) {
                println!("  Channels        : {}", v);
            }
            if let Some(v) = json.get("messages_stored").and_then(|v| v.as_u64()) {
                println!("  Messages Stored : {}", v);
            }
        }
        Err(_) => println!("{}", body),
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// version
// ---------------------------------------------------------------------------

fn print_version() {
    println!("tad-node {}", env!("CARGO_PKG_VERSION"));
    println!("protocol {}", config::PROTOCOL_VERSION);
}

// ---------------------------------------------------------------------------
// Startup banner
// ---------------------------------------------------------------------------

fn print_startup_banner(node_id: &str, listen_addr: SocketAddr, api_addr: SocketAddr, data_dir: &str) {
    let node_id_short = if node_id.len() > 20 { format!("{}...", &node_id[..20]) } else { node_id.to_string() };

    let lines = [
        format!("  Node ID:  {}", node_id_short),
        format!("  Listen:   {}", listen_addr),
        format!("  Debug API:http://{}", api_addr),
        format!("  Data:     {}", data_dir),
    ];
    let title = format!("  TAD \u{2014} Chat Node v{}", env!("CARGO_PKG_VERSION"));

    let max_width = lines.iter().map(|l| l.len()).chain(std::iter::once(title.len())).max().unwrap_or(50) + 4;
    let border = "\u{2550}".repeat(max_width);

    println!();
    println!("\u{2554}{}\u{2557}", border);
    println!("\u{2551}  {:<width$}  \u{2551}", title.trim(), width = max_width - 4);
    println!("\u{2560}{}\u{2563}", border);
    for line in &lines {
        println!("\u{2551}  {:<width$}  \u{2551}", line.trim(), width = max_width - 4);
    }
    println!("\u{255A}{}\u{255D}", border);
    println!();
}

// ---------------------------------------------------------------------------
// Shutdown signal
// ---------------------------------------------------------------------------

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

// ---------------------------------------------------------------------------
// Minimal HTTP client for `status`
// ---------------------------------------------------------------------------

/// Minimal HTTP GET without pulling in a full client crate — `status`
/// only ever talks to the local debug API on loopback.
async fn http_get(url: &str) -> Result<String> {
    let rest = url.strip_prefix("http://").unwrap_or(url);
    let (authority, path) = match rest.find('/') {
        Some(i) => (&rest[..i], &rest[i..]),
        None => (rest, "/"),
    };
    let (host, port) = match authority.rfind(':') {
        Some(i) => (&authority[..i], authority[i + 1..].parse::<u16>().unwrap_or(80)),
        None => (authority, 80u16),
    };

    let addr = format!("{}:{}", host, port);
    let mut stream = TcpStream::connect(&addr)
        .await
        .with_context(|| format!("failed to connect to {}", addr))?;

    let request = format!("GET {} HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n\r\n", path, host);

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    stream.write_all(request.as_bytes()).await?;
    stream.shutdown().await?;

    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).await?;
    let response = String::from_utf8_lossy(&buf);
    let body = response.split_once("\r\n\r\n").map(|(_, b)| b.to_string()).unwrap_or_else(|| response.to_string());
    Ok(body)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tad_core::identity::keypair::SigningKeypair;

    fn test_node_id() -> NodeId {
        NodeId::from_public_key(&SigningKeypair::generate().public_key())
    }

    #[test]
    fn startup_banner_does_not_panic() {
        print_startup_banner(
            "abcdefghijklmnopqrstuvwxyz234567",
            "0.0.0.0:8765".parse().unwrap(),
            "127.0.0.1:8766".parse().unwrap(),
            "/home/user/.tad",
        );
    }

    #[test]
    fn session_table_admits_first_session_for_a_peer() {
        let table = SessionTable::new();
        let self_id = test_node_id();
        let peer_id = test_node_id();
        let handle = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap()
            .block_on(async { tokio::spawn(async { std::future::pending::<()>().await }).abort_handle() });
        assert!(table.admit(&self_id, &peer_id, true, handle));
    }

    #[test]
    fn session_table_tie_break_keeps_smaller_initiator() {
        let table = SessionTable::new();
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        rt.block_on(async {
            // This node's own identity never changes across admit() calls;
            // only the peer and the direction of each race vary.
            let (self_id, peer_id) = {
                let a = test_node_id();
                let b = test_node_id();
                if a.to_text() < b.to_text() { (a, b) } else { (b, a) }
            };
            assert!(self_id.to_text() < peer_id.to_text());

            let first = tokio::spawn(async { std::future::pending::<()>().await }).abort_handle();
            // An inbound session arrives first; its initiator is the peer
            // (the larger id), so it loses to a subsequent outbound session.
            assert!(table.admit(&self_id, &peer_id, false, first));

            let second = tokio::spawn(async { std::future::pending::<()>().await }).abort_handle();
            // This node then dials out itself; its initiator is `self_id`,
            // the smaller id, so the new session should win the tie-break.
            let admitted = table.admit(&self_id, &peer_id, true, second);
            assert!(admitted, "smaller initiator should win the tie-break");
        });
    }

    #[test]
    fn resolve_data_dir_used_consistently() {
        // Smoke-check that main.rs and cli.rs agree on the helper's shape.
        let resolved = cli::resolve_data_dir(std::path::Path::new("/tmp/tad-test"));
        assert_eq!(resolved, std::path::PathBuf::from("/tmp/tad-test"));
    }
}
