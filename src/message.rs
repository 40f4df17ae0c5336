//! Mini-protocol messages and their CBOR wire encoding.
//!
//! Payloads are CBOR arrays whose first element is a message tag:
//!
//! | Tag | Mini-protocol | Message            | Shape                          |
//! |-----|---------------|--------------------|--------------------------------|
//! | 0   | handshake     | ProposeVersions    | `[0, {version: params, ...}]`  |
//! | 1   | handshake     | AcceptVersion      | `[1, version, params]`         |
//! | 2   | handshake     | Refuse             | `[2, reason]`                  |
//! | 4   | chain-sync    | FindIntersect      | `[4, [point, ...]]`            |
//! | 5   | chain-sync    | IntersectFound     | `[5, point, tip]`              |
//! | 6   | chain-sync    | IntersectNotFound  | `[6, tip]`                     |
//!
//! A `point` is either an empty array (chain origin) or `[slot, hash]`.
//! Version parameters are a bare network magic below version 4 and
//! `[magic, peer_sharing]` from version 4 onward.
//!
//! Encoding is deterministic: the version map is a `BTreeMap`, so keys
//! serialize in ascending order, and the same logical value always
//! produces the same bytes.

use std::collections::BTreeMap;
use std::ops::RangeInclusive;

use serde_cbor::Value;

use crate::error::{ClientError, Result};

/// Handshake message tag: version proposal.
pub const TAG_PROPOSE_VERSIONS: u64 = 0;
/// Handshake message tag: version accepted.
pub const TAG_ACCEPT_VERSION: u64 = 1;
/// Handshake message tag: proposal refused.
pub const TAG_REFUSE: u64 = 2;
/// Chain-sync message tag: find intersect.
pub const TAG_FIND_INTERSECT: u64 = 4;
/// Chain-sync message tag: intersection found.
pub const TAG_INTERSECT_FOUND: u64 = 5;
/// Chain-sync message tag: no intersection.
pub const TAG_INTERSECT_NOT_FOUND: u64 = 6;

/// First protocol version whose parameters carry a peer-sharing flag.
pub const PEER_SHARING_MIN_VERSION: u8 = 4;

/// A chain position reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Point {
    /// The start of the chain, encoded as an empty array.
    Origin,
    /// A concrete block, encoded as `[slot, hash]`.
    Block {
        /// Slot number of the block.
        slot: u64,
        /// Block header hash bytes.
        hash: Vec<u8>,
    },
}

impl Point {
    /// Convenience constructor for a block point.
    pub fn block(slot: u64, hash: impl Into<Vec<u8>>) -> Self {
        Point::Block {
            slot,
            hash: hash.into(),
        }
    }

    fn to_value(&self) -> Value {
        match self {
            Point::Origin => Value::Array(Vec::new()),
            Point::Block { slot, hash } => Value::Array(vec![
                Value::Integer(i128::from(*slot)),
                Value::Bytes(hash.clone()),
            ]),
        }
    }

    fn from_value(value: &Value) -> Option<Self> {
        let items = as_array(value)?;
        match items.as_slice() {
            [] => Some(Point::Origin),
            [slot, Value::Bytes(hash)] => Some(Point::Block {
                slot: as_u64(slot)?,
                hash: hash.clone(),
            }),
            _ => None,
        }
    }
}

/// Handshake request: every supported version mapped to its negotiation
/// parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionProposal {
    /// Network magic advertised for every version.
    pub magic: u32,
    /// Contiguous range of proposed protocol versions.
    pub versions: RangeInclusive<u8>,
}

impl VersionProposal {
    /// Serialize to the `[0, {version: params, ...}]` payload.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut versions = BTreeMap::new();
        for version in self.versions.clone() {
            let magic = Value::Integer(i128::from(self.magic));
            let params = if version >= PEER_SHARING_MIN_VERSION {
                // Peer sharing stays disabled; this client never serves peers.
                Value::Array(vec![magic, Value::Bool(false)])
            } else {
                magic
            };
            versions.insert(Value::Integer(i128::from(version)), params);
        }
        to_payload(&Value::Array(vec![
            Value::Integer(i128::from(TAG_PROPOSE_VERSIONS)),
            Value::Map(versions),
        ]))
    }

    /// Parse a `[0, {version: params, ...}]` payload back into a proposal.
    ///
    /// Accepts exactly the shapes [`encode`](Self::encode) produces: a
    /// contiguous version range and one magic shared by every entry.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let value = from_payload(bytes)?;
        let items = expect_tagged(&value, TAG_PROPOSE_VERSIONS, 2, bytes)?;
        let Some(Value::Map(entries)) = items.get(1) else {
            return Err(decode_err("version proposal is not a map", bytes));
        };
        if entries.is_empty() {
            return Err(decode_err("version proposal map is empty", bytes));
        }

        let mut versions: Vec<u8> = Vec::with_capacity(entries.len());
        let mut magic: Option<u32> = None;
        for (key, params) in entries {
            let version = as_u64(key)
                .and_then(|v| u8::try_from(v).ok())
                .ok_or_else(|| decode_err("version key is not a small integer", bytes))?;
            let entry_magic = match params {
                Value::Array(pair) => match pair.as_slice() {
                    [m, Value::Bool(_)] => as_u64(m),
                    _ => None,
                },
                bare => as_u64(bare),
            }
            .and_then(|m| u32::try_from(m).ok())
            .ok_or_else(|| decode_err("unrecognized version parameters", bytes))?;

            if *magic.get_or_insert(entry_magic) != entry_magic {
                return Err(decode_err("version entries disagree on network magic", bytes));
            }
            versions.push(version);
        }

        versions.sort_unstable();
        let (first, last) = (versions[0], versions[versions.len() - 1]);
        if versions.len() != usize::from(last - first) + 1 {
            return Err(decode_err("proposed versions are not contiguous", bytes));
        }
        Ok(Self {
            magic: magic.unwrap_or_default(),
            versions: first..=last,
        })
    }
}

/// Chain-sync request asking for the newest shared point among candidates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FindIntersect {
    /// Candidate points, newest first.
    pub points: Vec<Point>,
}

impl FindIntersect {
    /// Serialize to the `[4, [point, ...]]` payload.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let points = self.points.iter().map(Point::to_value).collect();
        to_payload(&Value::Array(vec![
            Value::Integer(i128::from(TAG_FIND_INTERSECT)),
            Value::Array(points),
        ]))
    }

    /// Parse a `[4, [point, ...]]` payload.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let value = from_payload(bytes)?;
        let items = expect_tagged(&value, TAG_FIND_INTERSECT, 2, bytes)?;
        let Some(Value::Array(raw_points)) = items.get(1) else {
            return Err(decode_err("find-intersect candidates are not an array", bytes));
        };
        let points = raw_points
            .iter()
            .map(|p| Point::from_value(p).ok_or_else(|| decode_err("unrecognized point shape", bytes)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { points })
    }
}

/// Peer reply to a version proposal.
#[derive(Debug, Clone, PartialEq)]
pub enum HandshakeReply {
    /// `[1, version, params]`: the peer picked a version.
    Accepted {
        /// The agreed protocol version.
        version: u64,
        /// The peer's negotiation parameters, kept as decoded CBOR.
        params: Value,
    },
    /// `[2, reason]`: the peer refused every proposed version.
    Refused {
        /// The refuse reason payload, kept as decoded CBOR.
        reason: Value,
    },
}

impl HandshakeReply {
    /// Parse an accept/refuse payload.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let value = from_payload(bytes)?;
        let items = as_array(&value)
            .ok_or_else(|| decode_err("handshake reply is not an array", bytes))?;
        match (items.first().and_then(as_u64), items.len()) {
            (Some(TAG_ACCEPT_VERSION), 3) => {
                let version = as_u64(&items[1])
                    .ok_or_else(|| decode_err("accepted version is not an integer", bytes))?;
                Ok(HandshakeReply::Accepted {
                    version,
                    params: items[2].clone(),
                })
            }
            (Some(TAG_REFUSE), 2) => Ok(HandshakeReply::Refused {
                reason: items[1].clone(),
            }),
            _ => Err(decode_err("unrecognized handshake reply", bytes)),
        }
    }

    /// Serialize to the wire payload. Used by responder-side test doubles.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let value = match self {
            HandshakeReply::Accepted { version, params } => Value::Array(vec![
                Value::Integer(i128::from(TAG_ACCEPT_VERSION)),
                Value::Integer(i128::from(*version)),
                params.clone(),
            ]),
            HandshakeReply::Refused { reason } => Value::Array(vec![
                Value::Integer(i128::from(TAG_REFUSE)),
                reason.clone(),
            ]),
        };
        to_payload(&value)
    }
}

/// Peer reply to a find-intersect request. Both outcomes are valid
/// terminal results, not protocol errors.
#[derive(Debug, Clone, PartialEq)]
pub enum IntersectReply {
    /// `[5, point, tip]`: a candidate lies on the peer's current chain.
    Found {
        /// The newest shared point.
        point: Point,
        /// The peer's chain tip, kept as decoded CBOR.
        tip: Value,
    },
    /// `[6, tip]`: no candidate lies on the peer's current chain.
    NotFound {
        /// The peer's chain tip, kept as decoded CBOR.
        tip: Value,
    },
}

impl IntersectReply {
    /// Parse a found/not-found payload.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let value = from_payload(bytes)?;
        let items = as_array(&value)
            .ok_or_else(|| decode_err("intersect reply is not an array", bytes))?;
        match (items.first().and_then(as_u64), items.len()) {
            (Some(TAG_INTERSECT_FOUND), 3) => {
                let point = Point::from_value(&items[1])
                    .ok_or_else(|| decode_err("intersection point has an unrecognized shape", bytes))?;
                Ok(IntersectReply::Found {
                    point,
                    tip: items[2].clone(),
                })
            }
            (Some(TAG_INTERSECT_NOT_FOUND), 2) => Ok(IntersectReply::NotFound {
                tip: items[1].clone(),
            }),
            _ => Err(decode_err("unrecognized intersect reply", bytes)),
        }
    }

    /// Serialize to the wire payload. Used by responder-side test doubles.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let value = match self {
            IntersectReply::Found { point, tip } => Value::Array(vec![
                Value::Integer(i128::from(TAG_INTERSECT_FOUND)),
                point.to_value(),
                tip.clone(),
            ]),
            IntersectReply::NotFound { tip } => Value::Array(vec![
                Value::Integer(i128::from(TAG_INTERSECT_NOT_FOUND)),
                tip.clone(),
            ]),
        };
        to_payload(&value)
    }
}

fn to_payload(value: &Value) -> Result<Vec<u8>> {
    serde_cbor::to_vec(value)
        .map_err(|e| ClientError::Protocol(format!("CBOR encoding failed: {e}")))
}

fn from_payload(bytes: &[u8]) -> Result<Value> {
    serde_cbor::from_slice(bytes).map_err(|e| ClientError::Decode {
        reason: format!("invalid CBOR: {e}"),
        bytes: bytes.to_vec(),
    })
}

fn decode_err(reason: &str, bytes: &[u8]) -> ClientError {
    ClientError::Decode {
        reason: reason.to_string(),
        bytes: bytes.to_vec(),
    }
}

fn as_array(value: &Value) -> Option<&Vec<Value>> {
    match value {
        Value::Array(items) => Some(items),
        _ => None,
    }
}

fn as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Integer(n) => u64::try_from(*n).ok(),
        _ => None,
    }
}

fn expect_tagged<'a>(
    value: &'a Value,
    tag: u64,
    len: usize,
    bytes: &[u8],
) -> Result<&'a Vec<Value>> {
    let items = as_array(value).ok_or_else(|| decode_err("payload is not an array", bytes))?;
    if items.len() != len || items.first().and_then(as_u64) != Some(tag) {
        return Err(decode_err("unexpected message tag or arity", bytes));
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proposal() -> VersionProposal {
        VersionProposal {
            magic: 764824073,
            versions: 1..=8,
        }
    }

    #[test]
    fn test_proposal_shape() {
        let bytes = proposal().encode().unwrap();
        let value: Value = serde_cbor::from_slice(&bytes).unwrap();
        let Value::Array(items) = value else {
            panic!("proposal is not an array")
        };
        assert_eq!(items[0], Value::Integer(0));
        let Value::Map(entries) = &items[1] else {
            panic!("proposal body is not a map")
        };
        assert_eq!(entries.len(), 8);
        // Bare magic below version 4, [magic, false] from 4 onward.
        assert_eq!(
            entries.get(&Value::Integer(3)),
            Some(&Value::Integer(764824073))
        );
        assert_eq!(
            entries.get(&Value::Integer(4)),
            Some(&Value::Array(vec![
                Value::Integer(764824073),
                Value::Bool(false)
            ]))
        );
    }

    #[test]
    fn test_proposal_round_trip() {
        let bytes = proposal().encode().unwrap();
        assert_eq!(VersionProposal::decode(&bytes).unwrap(), proposal());
    }

    #[test]
    fn test_proposal_deterministic() {
        assert_eq!(proposal().encode().unwrap(), proposal().encode().unwrap());
    }

    #[test]
    fn test_find_intersect_round_trip() {
        let request = FindIntersect {
            points: vec![Point::block(4492799, vec![0xAB; 32]), Point::Origin],
        };
        let bytes = request.encode().unwrap();
        assert_eq!(FindIntersect::decode(&bytes).unwrap(), request);
    }

    #[test]
    fn test_origin_encodes_as_empty_array() {
        let bytes = FindIntersect {
            points: vec![Point::Origin],
        }
        .encode()
        .unwrap();
        let value: Value = serde_cbor::from_slice(&bytes).unwrap();
        let Value::Array(items) = value else {
            panic!("request is not an array")
        };
        assert_eq!(items[1], Value::Array(vec![Value::Array(Vec::new())]));
    }

    #[test]
    fn test_handshake_reply_accept() {
        let reply = HandshakeReply::Accepted {
            version: 7,
            params: Value::Array(vec![Value::Integer(764824073), Value::Bool(false)]),
        };
        let decoded = HandshakeReply::decode(&reply.encode().unwrap()).unwrap();
        assert_eq!(decoded, reply);
    }

    #[test]
    fn test_handshake_reply_refuse() {
        let reply = HandshakeReply::Refused {
            reason: Value::Array(vec![Value::Integer(2), Value::Text("bad magic".into())]),
        };
        let decoded = HandshakeReply::decode(&reply.encode().unwrap()).unwrap();
        assert_eq!(decoded, reply);
    }

    #[test]
    fn test_intersect_reply_found() {
        let reply = IntersectReply::Found {
            point: Point::block(359, vec![1, 2, 3]),
            tip: Value::Integer(42),
        };
        let decoded = IntersectReply::decode(&reply.encode().unwrap()).unwrap();
        assert_eq!(decoded, reply);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let err = HandshakeReply::decode(&[0xFF, 0x00, 0x12]).unwrap_err();
        assert!(matches!(err, ClientError::Decode { .. }));
    }

    #[test]
    fn test_decode_keeps_raw_bytes() {
        // Valid CBOR, wrong shape: the raw payload must survive for diagnosis.
        let bytes = serde_cbor::to_vec(&Value::Integer(9)).unwrap();
        match HandshakeReply::decode(&bytes).unwrap_err() {
            ClientError::Decode { bytes: kept, .. } => assert_eq!(kept, bytes),
            other => panic!("expected Decode, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_rejects_wrong_tag() {
        let bytes = FindIntersect { points: vec![] }.encode().unwrap();
        assert!(matches!(
            HandshakeReply::decode(&bytes),
            Err(ClientError::Decode { .. })
        ));
    }
}
