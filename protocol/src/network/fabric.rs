//! # Connection Fabric
//!
//! Raw TCP plumbing: dialing out, accepting in, newline-delimited JSON
//! framing with a hard size cap, and the HELLO/WELCOME handshake that
//! turns a bare socket into a [`Session`].
//!
//! This module owns exactly one socket per call — it does not manage a
//! peer table or decide who to connect to. That's [`crate::network::gossip`]
//! and [`crate::orchestrator`]'s job. Keeping the fabric dumb makes it
//! testable without spinning up mDNS or a gossip engine.

use std::net::SocketAddr;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, warn};

use crate::config::{CONNECT_TIMEOUT, MAX_FRAME_SIZE_BYTES, MAX_MALFORMED_FRAMES_BEFORE_CLOSE, PROTOCOL_VERSION};
use crate::identity::node_id::NodeId;
use crate::network::envelope::{Envelope, ErrorCode, ErrorEnvelope, Hello, Welcome};

// ---------------------------------------------------------------------------
// FabricError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum FabricError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("connect to {0} timed out")]
    ConnectTimeout(SocketAddr),

    #[error("frame exceeded {MAX_FRAME_SIZE_BYTES} bytes")]
    FrameTooLarge,

    #[error("peer closed the connection")]
    Closed,

    #[error("handshake failed: expected {expected}, got {got}")]
    UnexpectedFrame { expected: &'static str, got: &'static str },

    #[error("protocol version mismatch: local {local}, peer {peer}")]
    ProtocolVersionMismatch { local: String, peer: String },

    #[error("too many malformed frames on this session")]
    TooManyMalformedFrames,

    #[error("frame was not valid JSON: {0}")]
    MalformedFrame(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// Listening / Dialing
// ---------------------------------------------------------------------------

/// Binds a TCP listener on `addr`. The caller drives the accept loop —
/// this just opens the socket.
pub async fn listen(addr: SocketAddr) -> Result<TcpListener, FabricError> {
    let listener = TcpListener::bind(addr).await?;
    debug!(%addr, "listening for TAD peers");
    Ok(listener)
}

/// Dials `addr` with [`CONNECT_TIMEOUT`], disabling Nagle's algorithm on
/// success since TAD frames are small and latency-sensitive.
pub async fn dial(addr: SocketAddr) -> Result<TcpStream, FabricError> {
    let stream = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(addr))
        .await
        .map_err(|_| FabricError::ConnectTimeout(addr))??;
    stream.set_nodelay(true)?;
    Ok(stream)
}

// ---------------------------------------------------------------------------
// Framing
// ---------------------------------------------------------------------------

/// Reads one newline-delimited frame, enforcing [`MAX_FRAME_SIZE_BYTES`].
/// Returns `Ok(None)` on clean EOF (peer closed before sending anything).
async fn read_frame(reader: &mut BufReader<OwnedReadHalf>) -> Result<Option<String>, FabricError> {
    let mut line = String::new();
    let mut limited = reader.take(MAX_FRAME_SIZE_BYTES as u64 + 1);
    let bytes_read = limited.read_line(&mut line).await?;
    if bytes_read == 0 {
        return Ok(None);
    }
    if line.len() > MAX_FRAME_SIZE_BYTES || (!line.ends_with('\n') && line.len() as u64 > MAX_FRAME_SIZE_BYTES as u64) {
        return Err(FabricError::FrameTooLarge);
    }
    Ok(Some(line))
}

async fn write_frame(writer: &mut OwnedWriteHalf, envelope: &Envelope) -> Result<(), FabricError> {
    let frame = envelope.to_frame()?;
    if frame.len() > MAX_FRAME_SIZE_BYTES {
        return Err(FabricError::FrameTooLarge);
    }
    writer.write_all(frame.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// A handshaken connection to exactly one peer.
///
/// Holds the split halves of the underlying `TcpStream` plus the peer's
/// identity as learned from the handshake. `malformed_frame_count` tracks
/// repeated protocol offenses — once it crosses
/// [`MAX_MALFORMED_FRAMES_BEFORE_CLOSE`], [`Session::recv`] returns
/// [`FabricError::TooManyMalformedFrames`] and the caller is expected to
/// drop the session.
pub struct Session {
    pub peer_node_id: NodeId,
    pub peer_display_name: Option<String>,
    pub peer_addr: SocketAddr,
    /// Hex-encoded Ed25519 signing public key the peer announced at
    /// handshake, as `persistence::models::Peer::signing_public_key` is
    /// stored.
    pub peer_signing_public_key: String,
    /// Hex-encoded X25519 encryption public key the peer announced at
    /// handshake.
    pub peer_encryption_public_key: String,
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    malformed_frame_count: u32,
}

impl Session {
    /// Sends one envelope, newline-framed.
    pub async fn send(&mut self, envelope: &Envelope) -> Result<(), FabricError> {
        write_frame(&mut self.writer, envelope).await
    }

    /// Sends a protocol error and lets the caller decide whether to close
    /// the underlying socket afterward.
    pub async fn send_error(&mut self, code: ErrorCode, detail: impl Into<String>) -> Result<(), FabricError> {
        self.send(&Envelope::Error(ErrorEnvelope::new(code, detail))).await
    }

    /// Reads and parses the next envelope. Returns `Ok(None)` on clean
    /// peer disconnect. A malformed frame does not close the session by
    /// itself — it's counted, and the session is only torn down once
    /// repeated offenses cross the threshold.
    pub async fn recv(&mut self) -> Result<Option<Envelope>, FabricError> {
        loop {
            let line = match read_frame(&mut self.reader).await? {
                Some(line) => line,
                None => return Ok(None),
            };
            match Envelope::from_line(&line) {
                Ok(envelope) => return Ok(Some(envelope)),
                Err(e) => {
                    self.malformed_frame_count += 1;
                    warn!(peer = %self.peer_node_id, error = %e, count = self.malformed_frame_count, "malformed frame");
                    if self.malformed_frame_count >= MAX_MALFORMED_FRAMES_BEFORE_CLOSE {
                        return Err(FabricError::TooManyMalformedFrames);
                    }
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Handshake
// ---------------------------------------------------------------------------

fn version_overlaps(local: &str, peer: &str) -> bool {
    // Semver-lite: compatible iff the major version matches. A fuller
    // implementation would parse properly; TAD only needs to gate on
    // "will these two nodes understand each other's envelopes."
    local.split('.').next() == peer.split('.').next()
}

/// Dialer side of the handshake: sends `HELLO`, expects `WELCOME` back.
#[allow(clippy::too_many_arguments)]
pub async fn handshake_outbound(
    stream: TcpStream,
    peer_addr: SocketAddr,
    node_id: NodeId,
    display_name: Option<String>,
    listen_port: u16,
    signing_public_key: String,
    encryption_public_key: String,
) -> Result<Session, FabricError> {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    let hello = Envelope::Hello(Hello {
        node_id: node_id.clone(),
        display_name: display_name.clone(),
        protocol_version: PROTOCOL_VERSION.to_string(),
        listen_port,
        signing_public_key,
        encryption_public_key,
    });
    write_frame(&mut write_half, &hello).await?;

    let line = read_frame(&mut reader)
        .await?
        .ok_or(FabricError::UnexpectedFrame { expected: "welcome", got: "eof" })?;
    let envelope = Envelope::from_line(&line)?;
    let welcome = match envelope {
        Envelope::Welcome(w) => w,
        _ => return Err(FabricError::UnexpectedFrame { expected: "welcome", got: "other" }),
    };

    if !version_overlaps(PROTOCOL_VERSION, &welcome.protocol_version) {
        return Err(FabricError::ProtocolVersionMismatch {
            local: PROTOCOL_VERSION.to_string(),
            peer: welcome.protocol_version,
        });
    }

    Ok(Session {
        peer_node_id: welcome.node_id,
        peer_display_name: welcome.display_name,
        peer_addr,
        peer_signing_public_key: welcome.signing_public_key,
        peer_encryption_public_key: welcome.encryption_public_key,
        reader,
        writer: write_half,
        malformed_frame_count: 0,
    })
}

/// Listener side of the handshake: expects `HELLO`, replies with `WELCOME`.
pub async fn handshake_inbound(
    stream: TcpStream,
    peer_addr: SocketAddr,
    node_id: NodeId,
    display_name: Option<String>,
    signing_public_key: String,
    encryption_public_key: String,
) -> Result<Session, FabricError> {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    let line = read_frame(&mut reader)
        .await?
        .ok_or(FabricError::UnexpectedFrame { expected: "hello", got: "eof" })?;
    let envelope = Envelope::from_line(&line)?;
    let hello = match envelope {
        Envelope::Hello(h) => h,
        _ => return Err(FabricError::UnexpectedFrame { expected: "hello", got: "other" }),
    };

    if !version_overlaps(PROTOCOL_VERSION, &hello.protocol_version) {
        let _ = write_frame(
            &mut write_half,
            &Envelope::Error(ErrorEnvelope::new(
                ErrorCode::ProtocolVersionMismatch,
                format!("local {} vs peer {}", PROTOCOL_VERSION, hello.protocol_version),
            )),
        )
        .await;
        return Err(FabricError::ProtocolVersionMismatch {
            local: PROTOCOL_VERSION.to_string(),
            peer: hello.protocol_version,
        });
    }

    let welcome = Envelope::Welcome(Welcome {
        node_id: node_id.clone(),
        display_name: display_name.clone(),
        protocol_version: PROTOCOL_VERSION.to_string(),
        signing_public_key,
        encryption_public_key,
    });
    write_frame(&mut write_half, &welcome).await?;

    Ok(Session {
        peer_node_id: hello.node_id,
        peer_display_name: hello.display_name,
        peer_addr,
        peer_signing_public_key: hello.signing_public_key,
        peer_encryption_public_key: hello.encryption_public_key,
        reader,
        writer: write_half,
        malformed_frame_count: 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::keypair::SigningKeypair;

    fn test_node_id() -> NodeId {
        let kp = SigningKeypair::generate();
        NodeId::from_public_key(&kp.public_key())
    }

    #[test]
    fn version_overlap_same_major() {
        assert!(version_overlaps("1.0.0", "1.4.2"));
    }

    #[test]
    fn version_mismatch_different_major() {
        assert!(!version_overlaps("1.0.0", "2.0.0"));
    }

    #[tokio::test]
    async fn handshake_completes_and_exchanges_node_ids() {
        let listener = listen("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let local_addr = listener.local_addr().unwrap();

        let server_node_id = test_node_id();
        let client_node_id = test_node_id();

        let server_task = {
            let server_node_id = server_node_id.clone();
            tokio::spawn(async move {
                let (stream, addr) = listener.accept().await.unwrap();
                handshake_inbound(
                    stream,
                    addr,
                    server_node_id,
                    Some("server".into()),
                    "serverkey".into(),
                    "serverenc".into(),
                )
                .await
                .unwrap()
            })
        };

        let client_stream = dial(local_addr).await.unwrap();
        let client_session = handshake_outbound(
            client_stream,
            local_addr,
            client_node_id.clone(),
            Some("client".into()),
            8765,
            "clientkey".into(),
            "clientenc".into(),
        )
        .await
        .unwrap();

        let server_session = server_task.await.unwrap();

        assert_eq!(client_session.peer_node_id, server_node_id);
        assert_eq!(server_session.peer_node_id, client_node_id);
        assert_eq!(server_session.peer_display_name, Some("client".into()));
    }

    #[tokio::test]
    async fn send_and_recv_roundtrip_a_ping() {
        let listener = listen("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let local_addr = listener.local_addr().unwrap();

        let server_task = tokio::spawn(async move {
            let (stream, addr) = listener.accept().await.unwrap();
            let mut session = handshake_inbound(stream, addr, test_node_id(), None, "k".into(), "e".into())
                .await
                .unwrap();
            let envelope = session.recv().await.unwrap().unwrap();
            session.send(&envelope).await.unwrap();
        });

        let client_stream = dial(local_addr).await.unwrap();
        let mut client_session = handshake_outbound(
            client_stream,
            local_addr,
            test_node_id(),
            None,
            8765,
            "k".into(),
            "e".into(),
        )
        .await
        .unwrap();

        client_session
            .send(&Envelope::Ping(crate::network::envelope::Ping { sent_at: 42 }))
            .await
            .unwrap();
        let echoed = client_session.recv().await.unwrap().unwrap();
        match echoed {
            Envelope::Ping(p) => assert_eq!(p.sent_at, 42),
            other => panic!("expected Ping, got {:?}", other),
        }

        server_task.await.unwrap();
    }

    #[tokio::test]
    async fn recv_returns_none_on_clean_disconnect() {
        let listener = listen("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let local_addr = listener.local_addr().unwrap();

        let server_task = tokio::spawn(async move {
            let (stream, addr) = listener.accept().await.unwrap();
            handshake_inbound(stream, addr, test_node_id(), None, "k".into(), "e".into())
                .await
                .unwrap()
        });

        let client_stream = dial(local_addr).await.unwrap();
        let client_session = handshake_outbound(
            client_stream,
            local_addr,
            test_node_id(),
            None,
            8765,
            "k".into(),
            "e".into(),
        )
        .await
        .unwrap();
        let mut server_session = server_task.await.unwrap();

        drop(client_session);
        let result = server_session.recv().await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn connect_to_closed_port_fails() {
        // Port 1 is reserved and nothing should be listening there.
        let addr: SocketAddr = "127.0.0.1:1".parse().unwrap();
        let result = dial(addr).await;
        assert!(result.is_err());
    }
}
