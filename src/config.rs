//! Network configuration.
//!
//! The network magic, the proposed version range, and the default
//! intersection candidates are immutable inputs to a session, not
//! module-level constants: tests and other networks substitute their own
//! [`NetworkConfig`]. Values come from the built-in mainnet defaults, a
//! TOML file, or environment variable overrides.

use std::ops::RangeInclusive;
use std::path::PathBuf;

use hex_literal::hex;
use serde::Deserialize;

use crate::error::{ClientError, Result};
use crate::message::Point;

/// Network magic of the Cardano mainnet.
pub const MAINNET_MAGIC: u32 = 764824073;

/// Oldest node-to-node protocol version proposed by default.
pub const DEFAULT_MIN_VERSION: u8 = 1;

/// Newest node-to-node protocol version proposed by default.
pub const DEFAULT_MAX_VERSION: u8 = 8;

/// The final blocks of the Byron era on mainnet, newest first. A
/// well-known default candidate set for the first intersection query.
pub fn byron_tail() -> Vec<Point> {
    vec![
        Point::block(
            4492799,
            hex!("f8084c61b6a238acec985b59310b6ecec49c0ab8352249afd7268da5cff2a457"),
        ),
        Point::block(
            1598399,
            hex!("7e16781b40ebf8b6da18f7b5e8ade855d6738095ef2f1c58c77e88b6e45997a4"),
        ),
        Point::block(
            359,
            hex!("9c0fe75b6a0499e9576a09589a5777e7021824e8a6d037065829423f861a9bb6"),
        ),
    ]
}

/// Immutable per-session network parameters.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Network magic proposed for every version.
    pub magic: u32,
    /// Contiguous range of protocol versions to propose.
    pub versions: RangeInclusive<u8>,
    /// Default candidate points for `request_intersect`, newest first.
    pub intersect_candidates: Vec<Point>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self::mainnet()
    }
}

impl NetworkConfig {
    /// Mainnet parameters: magic 764824073, versions 1..=8, and the
    /// Byron-era tail as intersection candidates.
    pub fn mainnet() -> Self {
        Self {
            magic: MAINNET_MAGIC,
            versions: DEFAULT_MIN_VERSION..=DEFAULT_MAX_VERSION,
            intersect_candidates: byron_tail(),
        }
    }

    /// Load configuration from a TOML file. Absent keys keep their
    /// mainnet defaults.
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let content = std::fs::read_to_string(&path)
            .map_err(|e| ClientError::Config(format!("Failed to read config file: {e}")))?;
        let file: ConfigFile = toml::from_str(&content)?;
        file.try_into()
    }

    /// Apply environment variable overrides (`OUROMUX_MAGIC`,
    /// `OUROMUX_MIN_VERSION`, `OUROMUX_MAX_VERSION`).
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(magic) = env_parse("OUROMUX_MAGIC") {
            self.magic = magic;
        }
        let min = env_parse("OUROMUX_MIN_VERSION").unwrap_or(*self.versions.start());
        let max = env_parse("OUROMUX_MAX_VERSION").unwrap_or(*self.versions.end());
        if min <= max {
            self.versions = min..=max;
        }
        self
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

/// On-disk configuration shape.
#[derive(Debug, Deserialize)]
struct ConfigFile {
    magic: Option<u32>,
    min_version: Option<u8>,
    max_version: Option<u8>,
    intersect_candidates: Option<Vec<PointEntry>>,
}

/// One intersection candidate in the config file; the hash is hex-encoded.
#[derive(Debug, Deserialize)]
struct PointEntry {
    slot: u64,
    hash: String,
}

impl TryFrom<ConfigFile> for NetworkConfig {
    type Error = ClientError;

    fn try_from(file: ConfigFile) -> Result<Self> {
        let defaults = NetworkConfig::mainnet();
        let min = file.min_version.unwrap_or(*defaults.versions.start());
        let max = file.max_version.unwrap_or(*defaults.versions.end());
        if min < 1 || min > max {
            return Err(ClientError::Config(format!(
                "invalid version range {min}..={max}"
            )));
        }
        let intersect_candidates = match file.intersect_candidates {
            None => defaults.intersect_candidates,
            Some(entries) => entries
                .into_iter()
                .map(|entry| {
                    let hash = hex::decode(&entry.hash).map_err(|e| {
                        ClientError::Config(format!("invalid hash hex for slot {}: {e}", entry.slot))
                    })?;
                    Ok(Point::block(entry.slot, hash))
                })
                .collect::<Result<Vec<_>>>()?,
        };
        Ok(NetworkConfig {
            magic: file.magic.unwrap_or(defaults.magic),
            versions: min..=max,
            intersect_candidates,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_mainnet_defaults() {
        let config = NetworkConfig::default();
        assert_eq!(config.magic, 764824073);
        assert_eq!(config.versions, 1..=8);
        assert_eq!(config.intersect_candidates.len(), 3);
        // Newest first, final Byron block on top.
        assert!(matches!(
            &config.intersect_candidates[0],
            Point::Block { slot: 4492799, hash } if hash.len() == 32
        ));
        assert!(matches!(
            &config.intersect_candidates[2],
            Point::Block { slot: 359, .. }
        ));
    }

    #[test]
    fn test_from_file_overrides() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
magic = 1097911063
max_version = 6

[[intersect_candidates]]
slot = 12
hash = "aabbcc"
"#
        )
        .unwrap();

        let config = NetworkConfig::from_file(file.path()).unwrap();
        assert_eq!(config.magic, 1097911063);
        assert_eq!(config.versions, 1..=6);
        assert_eq!(
            config.intersect_candidates,
            vec![Point::block(12, vec![0xAA, 0xBB, 0xCC])]
        );
    }

    #[test]
    fn test_from_file_bad_hex() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[[intersect_candidates]]
slot = 1
hash = "not hex"
"#
        )
        .unwrap();
        let err = NetworkConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ClientError::Config(_)));
    }

    #[test]
    fn test_from_file_bad_version_range() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "min_version = 7\nmax_version = 3").unwrap();
        let err = NetworkConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ClientError::Config(_)));
    }
}
