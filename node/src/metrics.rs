//! # Prometheus Metrics
//!
//! Exposes operational metrics for the node. Scraped by Prometheus at the
//! `/metrics` HTTP endpoint on the configured metrics port.
//!
//! All metrics are registered in a dedicated [`prometheus::Registry`] so they
//! do not collide with any default global registry consumers.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};
use std::sync::Arc;

/// Holds all Prometheus metric handles for the node.
#[derive(Clone)]
pub struct NodeMetrics {
    registry: Registry,
    /// Messages originated locally and broadcast into the overlay.
    pub messages_sent_total: IntCounter,
    /// Messages delivered locally after surviving gossip ingress.
    pub messages_received_total: IntCounter,
    /// Messages forwarded to other peers as part of fanout.
    pub messages_forwarded_total: IntCounter,
    /// Inbound gossip dropped as duplicates of an already-seen message id.
    pub duplicates_dropped_total: IntGauge,
    /// Inbound gossip dropped for failing signature verification.
    pub signature_failures_total: IntGauge,
    /// Number of currently connected peers.
    pub connected_peers: IntGauge,
    /// Number of peers discovered via mDNS or peer exchange, ever.
    pub peers_discovered_total: IntCounter,
    /// Rate-limit violations observed across all peers and categories.
    pub rate_limit_violations_total: IntCounter,
    /// Sessions closed for repeated rate-limit or protocol violations.
    pub sessions_closed_total: IntCounter,
}

impl NodeMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Self {
        let registry =
            Registry::new_custom(Some("tad".into()), None).expect("failed to create prometheus registry");

        let messages_sent_total = IntCounter::new(
            "messages_sent_total",
            "Total number of messages originated locally and broadcast",
        )
        .expect("metric creation");
        registry.register(Box::new(messages_sent_total.clone())).expect("metric registration");

        let messages_received_total = IntCounter::new(
            "messages_received_total",
            "Total number of messages delivered locally via gossip",
        )
        .expect("metric creation");
        registry
            .register(Box::new(messages_received_total.clone()))
            .expect("metric registration");

        let messages_forwarded_total = IntCounter::new(
            "messages_forwarded_total",
            "Total number of messages forwarded to other peers",
        )
        .expect("metric creation");
        registry
            .register(Box::new(messages_forwarded_total.clone()))
            .expect("metric registration");

        let duplicates_dropped_total = IntGauge::new(
            "duplicates_dropped_total",
            "Inbound gossip dropped as duplicates of an already-seen message",
        )
        .expect("metric creation");
        registry
            .register(Box::new(duplicates_dropped_total.clone()))
            .expect("metric registration");

        let signature_failures_total = IntGauge::new(
            "signature_failures_total",
            "Inbound gossip dropped for failing signature verification",
        )
        .expect("metric creation");
        registry
            .register(Box::new(signature_failures_total.clone()))
            .expect("metric registration");

        let connected_peers = IntGauge::new("connected_peers", "Number of currently connected peers")
            .expect("metric creation");
        registry.register(Box::new(connected_peers.clone())).expect("metric registration");

        let peers_discovered_total = IntCounter::new(
            "peers_discovered_total",
            "Total number of distinct peers discovered via mDNS or peer exchange",
        )
        .expect("metric creation");
        registry
            .register(Box::new(peers_discovered_total.clone()))
            .expect("metric registration");

        let rate_limit_violations_total = IntCounter::new(
            "rate_limit_violations_total",
            "Total number of rate-limit violations observed across all peers",
        )
        .expect("metric creation");
        registry
            .register(Box::new(rate_limit_violations_total.clone()))
            .expect("metric registration");

        let sessions_closed_total = IntCounter::new(
            "sessions_closed_total",
            "Total number of sessions closed for repeated protocol or rate-limit violations",
        )
        .expect("metric creation");
        registry
            .register(Box::new(sessions_closed_total.clone()))
            .expect("metric registration");

        Self {
            registry,
            messages_sent_total,
            messages_received_total,
            messages_forwarded_total,
            duplicates_dropped_total,
            signature_failures_total,
            connected_peers,
            peers_discovered_total,
            rate_limit_violations_total,
            sessions_closed_total,
        }
    }

    /// Encodes all registered metrics into the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer).expect("prometheus output is valid utf-8"))
    }
}

/// Shared metrics state passed to axum handlers via extension.
pub type SharedMetrics = Arc<NodeMetrics>;

/// Axum handler that renders `/metrics` in Prometheus text format.
///
/// Returns HTTP 500 if encoding fails (should never happen in practice).
pub async fn metrics_handler(
    axum::extract::State(metrics): axum::extract::State<SharedMetrics>,
) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}
