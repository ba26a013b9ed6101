//! # Debug HTTP API
//!
//! A small, local-only HTTP surface for inspecting a running node:
//! `/status` for a point-in-time snapshot, `/peers` and `/channels` for
//! the persisted tables, and `/ws` for streaming events live. This is
//! not a control plane — sending messages, creating channels, and
//! issuing invites happen through [`tad_core::orchestrator::Orchestrator`]
//! directly, called from `main.rs`'s command loop.

use std::sync::Arc;

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tower_http::trace::TraceLayer;

use tad_core::config::PROTOCOL_VERSION;
use tad_core::orchestrator::Orchestrator;
use tad_core::persistence::models::{Channel, Peer};

use crate::metrics::SharedMetrics;

/// Shared application state handed to every axum handler.
#[derive(Clone)]
pub struct AppState {
    pub version: String,
    pub orchestrator: Arc<Orchestrator>,
    pub metrics: SharedMetrics,
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    version: String,
    protocol_version: &'static str,
    node_id: String,
    display_name: Option<String>,
    connected_peers: usize,
    known_peers: usize,
    channels: usize,
    messages_stored: usize,
}

async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    let orchestrator = &state.orchestrator;
    let store = orchestrator.store();
    let known_peers = store.list_peers().map(|p| p.len()).unwrap_or(0);
    let channels = store.list_channels().map(|c| c.len()).unwrap_or(0);

    Json(StatusResponse {
        version: state.version.clone(),
        protocol_version: PROTOCOL_VERSION,
        node_id: orchestrator.identity().node_id().to_text(),
        display_name: orchestrator.identity().display_name().map(|s| s.to_string()),
        connected_peers: orchestrator.connected_peer_count(),
        known_peers,
        channels,
        messages_stored: store.message_count(),
    })
}

#[derive(Debug, Serialize)]
struct PeerSummary {
    node_id: String,
    address: String,
    status: String,
    first_seen: i64,
    last_seen: i64,
    blocked: bool,
}

impl From<Peer> for PeerSummary {
    fn from(peer: Peer) -> Self {
        Self {
            node_id: peer.node_id.to_text(),
            address: peer.address,
            status: format!("{:?}", peer.status).to_lowercase(),
            first_seen: peer.first_seen,
            last_seen: peer.last_seen,
            blocked: peer.blocked,
        }
    }
}

async fn peers_handler(State(state): State<AppState>) -> impl IntoResponse {
    let peers = state
        .orchestrator
        .store()
        .list_peers()
        .unwrap_or_default()
        .into_iter()
        .map(PeerSummary::from)
        .collect::<Vec<_>>();
    Json(peers)
}

#[derive(Debug, Serialize)]
struct ChannelSummary {
    name: String,
    encrypted: bool,
    created_at: i64,
    last_activity: i64,
    message_count: u64,
}

impl From<Channel> for ChannelSummary {
    fn from(channel: Channel) -> Self {
        Self {
            name: channel.name,
            encrypted: channel.encrypted,
            created_at: channel.created_at,
            last_activity: channel.last_activity,
            message_count: channel.message_count,
        }
    }
}

async fn channels_handler(State(state): State<AppState>) -> impl IntoResponse {
    let channels = state
        .orchestrator
        .store()
        .list_channels()
        .unwrap_or_default()
        .into_iter()
        .map(ChannelSummary::from)
        .collect::<Vec<_>>();
    Json(channels)
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws_connection(socket, state))
}

/// Streams every orchestrator event, JSON-encoded, one per WebSocket
/// text frame, until the client disconnects or the broadcast channel
/// falls behind and is closed out from under it.
async fn handle_ws_connection(mut socket: WebSocket, state: AppState) {
    let mut events = state.orchestrator.subscribe();
    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Ok(event) => {
                        let payload = match serde_json::to_string(&event) {
                            Ok(p) => p,
                            Err(e) => {
                                tracing::warn!("failed to encode event for websocket: {}", e);
                                continue;
                            }
                        };
                        if socket.send(WsMessage::Text(payload)).await.is_err() {
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "websocket client lagged, events dropped");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(WsMessage::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/status", get(status_handler))
        .route("/peers", get(peers_handler))
        .route("/channels", get(channels_handler))
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use tad_core::identity::identity::NodeIdentity;
    use tad_core::persistence::db::Store;
    use tower::ServiceExt;

    fn test_state() -> AppState {
        let identity = NodeIdentity::generate(Some("alice".into()));
        let store = Store::open_temporary().unwrap();
        AppState {
            version: "0.1.0".into(),
            orchestrator: Arc::new(Orchestrator::new(identity, store)),
            metrics: Arc::new(crate::metrics::NodeMetrics::new().unwrap()),
        }
    }

    async fn get(router: Router, path: &str) -> (axum::http::StatusCode, serde_json::Value) {
        let request = axum::http::Request::builder()
            .uri(path)
            .body(axum::body::Body::empty())
            .unwrap();
        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    #[tokio::test]
    async fn status_reports_node_identity_and_counts() {
        let state = test_state();
        state.orchestrator.create_public_channel("#general").unwrap();
        let router = create_router(state.clone());

        let (status, body) = get(router, "/status").await;
        assert_eq!(status, axum::http::StatusCode::OK);
        assert_eq!(body["node_id"], state.orchestrator.identity().node_id().to_text());
        assert_eq!(body["channels"], 1);
        assert_eq!(body["connected_peers"], 0);
    }

    #[tokio::test]
    async fn peers_and_channels_start_empty() {
        let router = create_router(test_state());
        let (status, body) = get(router.clone(), "/peers").await;
        assert_eq!(status, axum::http::StatusCode::OK);
        assert_eq!(body, serde_json::json!([]));

        let (status, body) = get(router, "/channels").await;
        assert_eq!(status, axum::http::StatusCode::OK);
        assert_eq!(body, serde_json::json!([]));
    }

    #[tokio::test]
    async fn channels_handler_reflects_created_channel() {
        let state = test_state();
        state.orchestrator.create_private_channel("#secret").unwrap();
        let router = create_router(state);

        let (_, body) = get(router, "/channels").await;
        let channels = body.as_array().unwrap();
        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0]["name"], "#secret");
        assert_eq!(channels[0]["encrypted"], true);
    }
}
