//! Multiplexer frame header encoding and decoding.
//!
//! Every message on the wire is an 8-byte header immediately followed by
//! exactly `payload_len` bytes of CBOR payload. There are no boundary
//! markers beyond the declared length, so an off-by-one in bit position
//! or byte count desynchronizes the whole session.
//!
//! # Wire Layout
//!
//! ```text
//! byte  0         1         2         3         4         5         6         7
//!      +---------+---------+---------+---------+---------+---------+---------+---------+
//!      |        timestamp_ms (u32, big-endian)  |M| proto_id (15b)  | payload_len (u16) |
//!      +---------+---------+---------+---------+---------+---------+---------+---------+
//! ```
//!
//! `M` is the mode bit: the most significant bit of byte 4. It carries
//! initiator/responder agency, not request semantics; this client sends
//! every request with mode 0 and decodes but never branches on the mode
//! of replies. The remaining 15 bits of bytes 4-5 are the mini-protocol
//! id, big-endian. All packing is plain shift/mask arithmetic over
//! fixed-width unsigned integers.

use crate::error::{ClientError, Result};

/// Fixed frame header size in bytes
pub const HEADER_SIZE: usize = 8;

/// Largest value the 15-bit mini-protocol id field can carry
pub const MAX_PROTOCOL_ID: u16 = 0x7FFF;

/// Handshake mini-protocol id
pub const PROTOCOL_HANDSHAKE: u16 = 0;

/// Chain-sync mini-protocol id
pub const PROTOCOL_CHAIN_SYNC: u16 = 2;

/// Multiplexer agency bit carried in the top bit of byte 4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Message sent by the protocol initiator (this client).
    #[default]
    Initiator,
    /// Message sent by the protocol responder (the node).
    Responder,
}

impl Mode {
    /// Decode from the wire bit.
    pub fn from_bit(bit: u8) -> Self {
        if bit == 0 {
            Mode::Initiator
        } else {
            Mode::Responder
        }
    }

    /// Encode to the wire bit.
    pub fn as_bit(self) -> u8 {
        match self {
            Mode::Initiator => 0,
            Mode::Responder => 1,
        }
    }
}

/// The fixed 8-byte multiplexer header preceding every payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Wrapping monotonic clock sample in milliseconds, truncated to 32 bits.
    pub timestamp_ms: u32,
    /// Initiator/responder agency bit.
    pub mode: Mode,
    /// Mini-protocol id, at most 15 bits.
    pub protocol_id: u16,
    /// Exact byte length of the CBOR payload that follows.
    pub payload_len: u16,
}

impl FrameHeader {
    /// Build a header, validating the field widths.
    ///
    /// `payload_len` is taken as the actual payload size so that an
    /// oversized payload surfaces as [`ClientError::InvalidRange`] instead
    /// of a silent truncation.
    pub fn new(timestamp_ms: u32, mode: Mode, protocol_id: u16, payload_len: usize) -> Result<Self> {
        if protocol_id > MAX_PROTOCOL_ID {
            return Err(ClientError::InvalidRange {
                field: "protocol_id",
                value: u64::from(protocol_id),
                max: u64::from(MAX_PROTOCOL_ID),
            });
        }
        let payload_len = u16::try_from(payload_len).map_err(|_| ClientError::InvalidRange {
            field: "payload_len",
            value: payload_len as u64,
            max: u64::from(u16::MAX),
        })?;
        Ok(Self {
            timestamp_ms,
            mode,
            protocol_id,
            payload_len,
        })
    }

    /// Pack into the 8-byte wire representation.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[..4].copy_from_slice(&self.timestamp_ms.to_be_bytes());
        // protocol_id <= 0x7FFF is an invariant of new(); the mask keeps a
        // hand-built header from bleeding into the mode bit.
        let id = self.protocol_id & MAX_PROTOCOL_ID;
        buf[4] = (self.mode.as_bit() << 7) | ((id >> 8) as u8);
        buf[5] = (id & 0xFF) as u8;
        buf[6..8].copy_from_slice(&self.payload_len.to_be_bytes());
        buf
    }

    /// Parse the 8-byte wire representation.
    ///
    /// Anything other than exactly [`HEADER_SIZE`] input bytes is a caller
    /// contract violation and fails with [`ClientError::MalformedHeader`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != HEADER_SIZE {
            return Err(ClientError::MalformedHeader {
                expected: HEADER_SIZE,
                actual: bytes.len(),
            });
        }
        let timestamp_ms = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let mode = Mode::from_bit(bytes[4] >> 7);
        let protocol_id = (u16::from(bytes[4] & 0x7F) << 8) | u16::from(bytes[5]);
        let payload_len = u16::from_be_bytes([bytes[6], bytes[7]]);
        Ok(Self {
            timestamp_ms,
            mode,
            protocol_id,
            payload_len,
        })
    }
}
