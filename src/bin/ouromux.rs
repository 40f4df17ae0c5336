//! Ouromux CLI binary.
//!
//! Drives a single client session against a node's node-to-node
//! listening endpoint.
//!
//! # Commands
//!
//! - `handshake` - Connect and negotiate a protocol version
//! - `intersect` - Handshake, then query a chain intersection

use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use ouromux::{NetworkConfig, Point, Session, VERSION};

#[derive(Parser)]
#[command(name = "ouromux")]
#[command(version = VERSION)]
#[command(about = "Minimal Ouroboros node-to-node client", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect and negotiate a protocol version
    Handshake {
        #[command(flatten)]
        target: Target,
    },

    /// Handshake, then query a chain intersection
    Intersect {
        #[command(flatten)]
        target: Target,

        /// Candidate point as `slot:hex_hash` (repeatable, newest first;
        /// default: the well-known Byron-era tail)
        #[arg(short, long = "point")]
        points: Vec<String>,
    },
}

/// Node endpoint and network parameters shared by every command.
#[derive(Args)]
struct Target {
    /// Node host name or address
    host: String,

    /// Node-to-node listening port
    #[arg(default_value_t = 3001)]
    port: u16,

    /// TOML network configuration file (default: mainnet)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

impl Target {
    fn config(&self) -> anyhow::Result<NetworkConfig> {
        let config = match &self.config {
            Some(path) => NetworkConfig::from_file(path)
                .with_context(|| format!("loading config from {}", path.display()))?,
            None => NetworkConfig::mainnet(),
        };
        Ok(config.with_env_overrides())
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    match Cli::parse().command {
        Commands::Handshake { target } => {
            let mut session = connect_and_handshake(&target)?;
            session.disconnect();
        }
        Commands::Intersect { target, points } => {
            let mut session = connect_and_handshake(&target)?;
            let candidates = points
                .iter()
                .map(|p| parse_point(p))
                .collect::<anyhow::Result<Vec<_>>>()?;
            let reply = session
                .request_intersect(if candidates.is_empty() {
                    None
                } else {
                    Some(&candidates)
                })
                .context("intersect query failed")?;
            println!("{reply:?}");
            session.disconnect();
        }
    }
    Ok(())
}

fn connect_and_handshake(target: &Target) -> anyhow::Result<Session> {
    let mut session = Session::new(target.config()?);
    session.connect(&target.host, target.port)?;
    let confirmed = session.propose_versions().context("handshake failed")?;
    println!(
        "negotiated version {} ({:?})",
        confirmed.version, confirmed.params
    );
    Ok(session)
}

/// Parse a `slot:hex_hash` candidate point.
fn parse_point(raw: &str) -> anyhow::Result<Point> {
    let (slot, hash) = raw
        .split_once(':')
        .with_context(|| format!("point `{raw}` is not slot:hex_hash"))?;
    let slot: u64 = slot.parse().with_context(|| format!("bad slot in `{raw}`"))?;
    let hash = hex::decode(hash).with_context(|| format!("bad hash hex in `{raw}`"))?;
    Ok(Point::block(slot, hash))
}
