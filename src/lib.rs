//! # Ouromux - Minimal Ouroboros Node-to-Node Client
//!
//! A minimal client for a Cardano-family node's peer-to-peer wire
//! protocol: open a TCP connection, negotiate a protocol version
//! (handshake), and issue a single chain-synchronization intersection
//! query against a list of well-known historical block references.
//!
//! ## Wire Format
//!
//! Every message is an 8-byte multiplexer header immediately followed by
//! exactly `payload_len` bytes of CBOR payload:
//!
//! ```text
//! Client                              Node
//!    |                                  |
//!    |-- [hdr proto=0][0, {v: magic}] ->|  Propose versions (handshake)
//!    |<- [hdr][1, v, params] -----------|  Version accepted
//!    |        or [2, reason]            |  or refused
//!    |                                  |
//!    |-- [hdr proto=2][4, [points]] --->|  Find intersect (chain-sync)
//!    |<- [hdr][5, point, tip] ----------|  Intersection found
//!    |        or [6, tip]               |  or not found
//! ```
//!
//! The header carries a wrapping 32-bit millisecond timestamp, a mode
//! bit (initiator/responder agency), a 15-bit mini-protocol id, and a
//! 16-bit payload length, all big-endian. See [`frame`] for the exact
//! bit layout.
//!
//! ## Session State Machine
//!
//! | State                | Description                            | Valid transitions           |
//! |----------------------|----------------------------------------|-----------------------------|
//! | `Disconnected`       | No connection open                     | → Connected                 |
//! | `Connected`          | TCP open, no handshake yet             | → VersionProposed           |
//! | `VersionProposed`    | Proposal sent, awaiting reply          | → VersionConfirmed, Failed  |
//! | `VersionConfirmed`   | Peer accepted a version                | → IntersectRequested        |
//! | `IntersectRequested` | Find-intersect sent, awaiting reply    | → IntersectResolved, Failed |
//! | `IntersectResolved`  | Intersect reply received               | (terminal)                  |
//! | `Failed`             | Fatal error, connection closed         | (terminal)                  |
//!
//! Usage is strictly sequential request/response on a single connection:
//! no concurrency, no pipelining, no demultiplexing of concurrently
//! active mini-protocols.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use ouromux::{NetworkConfig, Session};
//!
//! let mut session = Session::new(NetworkConfig::mainnet());
//! session.connect("relay.example.org", 3001)?;
//! let confirmed = session.propose_versions()?;
//! println!("agreed on version {}", confirmed.version);
//!
//! // Intersect against the default Byron-era tail candidates.
//! let reply = session.request_intersect(None)?;
//! println!("intersection: {reply:?}");
//! session.disconnect();
//! ```
//!
//! ## Modules
//!
//! - [`frame`]: 8-byte multiplexer header codec (pure, no I/O)
//! - [`message`]: CBOR mini-protocol message codec (pure, no I/O)
//! - [`transport`]: blocking TCP connection primitives
//! - [`session`]: the sequential request/response state machine
//! - [`config`]: network magic, version range, intersection candidates
//! - [`error`]: error types and result alias

pub mod config;
pub mod error;
pub mod frame;
pub mod message;
pub mod session;
pub mod transport;

// Re-exports for convenience
pub use config::{byron_tail, NetworkConfig, MAINNET_MAGIC};
pub use error::{ClientError, Result};
pub use frame::{FrameHeader, Mode, HEADER_SIZE, PROTOCOL_CHAIN_SYNC, PROTOCOL_HANDSHAKE};
pub use message::{FindIntersect, HandshakeReply, IntersectReply, Point, VersionProposal};
pub use session::{ConfirmedVersion, Session, SessionState};
pub use transport::Connection;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
