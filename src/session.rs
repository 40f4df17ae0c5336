//! Protocol session: the strictly sequential request/response driver.
//!
//! A [`Session`] composes the frame codec, the message codec, and the
//! transport into the two supported exchanges. Every operation is one
//! round: encode the payload, wrap it with a header stamped from a
//! monotonic millisecond clock, send, read exactly 8 header bytes, read
//! exactly `payload_len` more, decode. No pipelining, no concurrency.
//!
//! # State Machine
//!
//! ```text
//!                 connect()          propose_versions()
//! [Disconnected] ──────────> [Connected] ──────────> [VersionProposed]
//!                                                          │
//!                                              accept      v
//!                  [VersionConfirmed] <─────────────────────
//!                         │
//!                         │ request_intersect()
//!                         v
//!                  [IntersectRequested] ──────────> [IntersectResolved]
//!
//! [Failed] is terminal and reachable from any non-terminal state; on
//! entering it the connection is closed exactly once.
//! ```
//!
//! `disconnect()` is valid in any state and idempotent.

use std::time::Instant;

use serde_cbor::Value;

use crate::config::NetworkConfig;
use crate::error::{ClientError, Result};
use crate::frame::{FrameHeader, Mode, HEADER_SIZE, PROTOCOL_CHAIN_SYNC, PROTOCOL_HANDSHAKE};
use crate::message::{FindIntersect, HandshakeReply, IntersectReply, Point, VersionProposal};
use crate::transport::Connection;

/// Session state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No connection open.
    Disconnected,
    /// TCP connection open, no handshake yet.
    Connected,
    /// Version proposal sent, awaiting the reply.
    VersionProposed,
    /// Peer accepted a version; chain-sync may proceed.
    VersionConfirmed,
    /// Find-intersect sent, awaiting the reply.
    IntersectRequested,
    /// Intersect reply received (found or not found).
    IntersectResolved,
    /// A fatal error occurred; the connection is closed.
    Failed,
}

/// The version a peer agreed to during the handshake.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfirmedVersion {
    /// The agreed protocol version number.
    pub version: u64,
    /// The peer's negotiation parameters, kept as decoded CBOR.
    pub params: Value,
}

/// A single-connection client session against one node.
pub struct Session {
    config: NetworkConfig,
    conn: Option<Connection>,
    state: SessionState,
    /// Anchor for the wrapping millisecond timestamps in frame headers.
    clock: Instant,
}

impl Session {
    /// Create a session with the given network parameters. No connection
    /// is opened yet.
    pub fn new(config: NetworkConfig) -> Self {
        Self {
            config,
            conn: None,
            state: SessionState::Disconnected,
            clock: Instant::now(),
        }
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether a connection is currently open.
    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    /// The network parameters this session was built with.
    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    /// Open the TCP connection. `Disconnected -> Connected`.
    ///
    /// On failure the session stays `Disconnected` with no resource held.
    pub fn connect(&mut self, host: &str, port: u16) -> Result<()> {
        self.expect_state(SessionState::Disconnected, "connect")?;
        self.conn = Some(Connection::open(host, port)?);
        self.state = SessionState::Connected;
        Ok(())
    }

    /// Run the handshake. `Connected -> VersionProposed -> VersionConfirmed`.
    ///
    /// Proposes every configured version with the configured network
    /// magic. A refusal fails the session with
    /// [`ClientError::VersionMismatch`]; there is no retry with a reduced
    /// version set.
    pub fn propose_versions(&mut self) -> Result<ConfirmedVersion> {
        self.expect_state(SessionState::Connected, "propose_versions")?;
        let proposal = VersionProposal {
            magic: self.config.magic,
            versions: self.config.versions.clone(),
        };
        tracing::info!(
            magic = proposal.magic,
            ">>> proposing versions {:?}",
            proposal.versions
        );

        self.state = SessionState::VersionProposed;
        let payload = match proposal.encode() {
            Ok(payload) => payload,
            Err(e) => return self.fail(e),
        };
        let reply_bytes = match self.exchange(PROTOCOL_HANDSHAKE, &payload) {
            Ok(bytes) => bytes,
            Err(e) => return self.fail(e),
        };

        match HandshakeReply::decode(&reply_bytes) {
            Ok(HandshakeReply::Accepted { version, params }) => {
                tracing::info!(version, "<<< version accepted");
                self.state = SessionState::VersionConfirmed;
                Ok(ConfirmedVersion { version, params })
            }
            Ok(HandshakeReply::Refused { reason }) => self.fail(ClientError::VersionMismatch {
                reason: format!("{reason:?}"),
            }),
            Err(e) => self.fail(e),
        }
    }

    /// Ask the node for the newest shared point among `points`.
    /// `VersionConfirmed -> IntersectRequested -> IntersectResolved`.
    ///
    /// With `None` the configured candidates (by default the Byron-era
    /// tail) are proposed. Both reply variants are valid terminal
    /// outcomes; neither is an error.
    pub fn request_intersect(&mut self, points: Option<&[Point]>) -> Result<IntersectReply> {
        self.expect_state(SessionState::VersionConfirmed, "request_intersect")?;
        let request = FindIntersect {
            points: points.map_or_else(|| self.config.intersect_candidates.clone(), <[Point]>::to_vec),
        };
        tracing::info!(">>> requesting intersection of {} points", request.points.len());

        self.state = SessionState::IntersectRequested;
        let payload = match request.encode() {
            Ok(payload) => payload,
            Err(e) => return self.fail(e),
        };
        let reply_bytes = match self.exchange(PROTOCOL_CHAIN_SYNC, &payload) {
            Ok(bytes) => bytes,
            Err(e) => return self.fail(e),
        };

        match IntersectReply::decode(&reply_bytes) {
            Ok(reply) => {
                tracing::info!("<<< intersection reply: {reply:?}");
                self.state = SessionState::IntersectResolved;
                Ok(reply)
            }
            Err(e) => self.fail(e),
        }
    }

    /// Close the connection if one is open. Valid in any state,
    /// idempotent; the session returns to `Disconnected`.
    pub fn disconnect(&mut self) {
        if let Some(mut conn) = self.conn.take() {
            conn.close();
        }
        self.state = SessionState::Disconnected;
    }

    /// One request/response round on the given mini-protocol.
    fn exchange(&mut self, protocol_id: u16, payload: &[u8]) -> Result<Vec<u8>> {
        let header = FrameHeader::new(
            self.timestamp_ms(),
            Mode::Initiator,
            protocol_id,
            payload.len(),
        )?;
        let conn = self
            .conn
            .as_mut()
            .ok_or_else(|| ClientError::Protocol("no open connection".to_string()))?;

        let mut message = Vec::with_capacity(HEADER_SIZE + payload.len());
        message.extend_from_slice(&header.to_bytes());
        message.extend_from_slice(payload);
        conn.send(&message)?;

        let header_bytes = conn.recv_exact(HEADER_SIZE)?;
        if header_bytes.is_empty() {
            return Err(ClientError::NoResponse);
        }
        let reply = FrameHeader::from_bytes(&header_bytes)?;
        tracing::debug!(?reply, "received frame header");

        let body = conn.recv_exact(usize::from(reply.payload_len))?;
        if body.len() != usize::from(reply.payload_len) {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!(
                    "peer closed before the announced {} payload bytes",
                    reply.payload_len
                ),
            )
            .into());
        }
        Ok(body)
    }

    /// Monotonic milliseconds since session creation, wrapping at 32 bits.
    fn timestamp_ms(&self) -> u32 {
        self.clock.elapsed().as_millis() as u32
    }

    fn expect_state(&self, expected: SessionState, operation: &str) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(ClientError::Protocol(format!(
                "cannot {operation} in state {:?}",
                self.state
            )))
        }
    }

    /// Enter the terminal `Failed` state, closing the connection exactly
    /// once, and propagate the error.
    fn fail<T>(&mut self, err: ClientError) -> Result<T> {
        tracing::warn!("session failed: {err}");
        self.state = SessionState::Failed;
        if let Some(mut conn) = self.conn.take() {
            conn.close();
        }
        Err(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session_is_disconnected() {
        let session = Session::new(NetworkConfig::mainnet());
        assert_eq!(session.state(), SessionState::Disconnected);
        assert!(!session.is_connected());
    }

    #[test]
    fn test_operations_out_of_order_are_protocol_errors() {
        let mut session = Session::new(NetworkConfig::mainnet());
        assert!(matches!(
            session.propose_versions(),
            Err(ClientError::Protocol(_))
        ));
        assert!(matches!(
            session.request_intersect(None),
            Err(ClientError::Protocol(_))
        ));
        // Misuse does not poison the session.
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[test]
    fn test_connect_failure_stays_disconnected() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let mut session = Session::new(NetworkConfig::mainnet());
        let err = session.connect("127.0.0.1", port).unwrap_err();
        assert!(matches!(err, ClientError::Connect { .. }));
        assert_eq!(session.state(), SessionState::Disconnected);
        assert!(!session.is_connected());
    }

    #[test]
    fn test_disconnect_is_idempotent() {
        let mut session = Session::new(NetworkConfig::mainnet());
        session.disconnect();
        session.disconnect();
        assert_eq!(session.state(), SessionState::Disconnected);
    }
}
