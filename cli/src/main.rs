// hopmesh — command-line front end for the flood relay core
//
// Encode and decode advertisement payloads, run a flood across a simulated
// chain of nodes, and manage the persisted relay settings.

mod config;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use hopmesh_core::advert::FieldWalk;
use hopmesh_core::{
    AdvertisementPacket, ManufacturerId, Name, RelayEngine, RelayError, RelayStats, ServiceUuid,
    SimulatedAir, TagScheme,
};
use std::sync::Arc;
use tracing::warn;

#[derive(Parser)]
#[command(name = "hopmesh")]
#[command(about = "HopMesh — hop-limited flood relay over BLE advertisements", long_about = None)]
#[command(version)]
struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encode a flood packet and print the payload as hex
    Encode {
        #[arg(long)]
        hop: u8,
        #[arg(long)]
        message_id: String,
        /// Text name
        #[arg(long, conflicts_with = "name_id")]
        name: Option<String>,
        /// Two byte integer name (decimal or 0x hex)
        #[arg(long)]
        name_id: Option<String>,
        #[arg(long)]
        sender: Option<String>,
        #[arg(long)]
        distance: Option<f32>,
        #[arg(long)]
        device_type: Option<u8>,
        /// Service UUID: 4 or 8 hex digits, or a full UUID (repeatable)
        #[arg(long = "service")]
        services: Vec<String>,
        /// Target identifier, defaults to the configured one
        #[arg(long)]
        target: Option<String>,
        /// Tag scheme (v1 or v2), defaults to the configured one
        #[arg(long)]
        scheme: Option<String>,
    },
    /// Decode a hex payload and print its fields as JSON
    Decode {
        payload: String,
        #[arg(long)]
        scheme: Option<String>,
    },
    /// Flood one message down a chain of simulated nodes
    Simulate {
        #[arg(short, long, default_value = "4")]
        nodes: usize,
        #[arg(long, default_value = "3")]
        hops: u8,
        /// Scan cycles each node runs, defaults to one more than the chain length
        #[arg(short, long)]
        cycles: Option<usize>,
        #[arg(long)]
        message_id: Option<String>,
        /// Override the scan duration
        #[arg(long)]
        scan_ms: Option<u64>,
        /// Override how long each advert stays on air
        #[arg(long)]
        advertise_ms: Option<u64>,
    },
    /// Configure settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    Set { key: String, value: String },
    Get { key: String },
    List,
    /// Print the config file location
    Path,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let json_logs = config::Config::load().map(|c| c.json_logs).unwrap_or(false);
    init_logging(cli.verbose, json_logs);

    match cli.command {
        Commands::Encode {
            hop,
            message_id,
            name,
            name_id,
            sender,
            distance,
            device_type,
            services,
            target,
            scheme,
        } => {
            let mut packet = AdvertisementPacket::new()
                .with_hop_count(hop)
                .with_message_id(config::parse_u16(&message_id)?);
            if let Some(text) = name {
                packet = packet.with_name(Name::Text(text));
            }
            if let Some(id) = name_id {
                packet = packet.with_name(Name::Id(config::parse_u16(&id)?));
            }
            if let Some(sender) = sender {
                packet = packet.with_sender(config::parse_u16(&sender)?);
            }
            if let Some(distance) = distance {
                packet = packet.with_distance(distance);
            }
            if let Some(device_type) = device_type {
                packet = packet.with_device_type(device_type);
            }
            for service in &services {
                packet = packet.with_service(parse_service(service)?);
            }
            cmd_encode(packet, target, scheme)
        }
        Commands::Decode { payload, scheme } => cmd_decode(&payload, scheme),
        Commands::Simulate {
            nodes,
            hops,
            cycles,
            message_id,
            scan_ms,
            advertise_ms,
        } => {
            let message_id = message_id.map(|id| config::parse_u16(&id)).transpose()?;
            cmd_simulate(nodes, hops, cycles, message_id, scan_ms, advertise_ms).await
        }
        Commands::Config { action } => cmd_config(action),
    }
}

fn init_logging(verbose: bool, json: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn resolve_scheme(flag: Option<String>, config: &config::Config) -> Result<TagScheme> {
    match flag {
        Some(value) => config::parse_scheme(&value),
        None => Ok(config.relay.scheme),
    }
}

/// 4 hex digits, 8 hex digits, or a hyphenated 128-bit UUID
fn parse_service(value: &str) -> Result<ServiceUuid> {
    let digits = value.trim_start_matches("0x");
    match digits.len() {
        4 => Ok(ServiceUuid::Short(
            u16::from_str_radix(digits, 16).context("Invalid 16-bit service UUID")?,
        )),
        8 => Ok(ServiceUuid::Medium(
            u32::from_str_radix(digits, 16).context("Invalid 32-bit service UUID")?,
        )),
        _ => Ok(ServiceUuid::Long(
            uuid::Uuid::parse_str(value).context("Invalid 128-bit service UUID")?,
        )),
    }
}

fn cmd_encode(mut packet: AdvertisementPacket, target: Option<String>, scheme: Option<String>) -> Result<()> {
    let config = config::Config::load()?;
    let scheme = resolve_scheme(scheme, &config)?;
    let target = match target {
        Some(value) => ManufacturerId(config::parse_u16(&value)?),
        None => config.relay.target(),
    };
    packet.manufacturer = Some(target);

    let payload = packet
        .encode(scheme)
        .context("Packet does not fit in an advertisement")?;
    println!("{}", hex::encode(&payload));
    Ok(())
}

fn cmd_decode(payload: &str, scheme: Option<String>) -> Result<()> {
    let config = config::Config::load()?;
    let scheme = resolve_scheme(scheme, &config)?;
    let cleaned: String = payload
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':')
        .collect();
    let bytes = hex::decode(cleaned.trim_start_matches("0x")).context("Payload is not valid hex")?;

    let decoded = AdvertisementPacket::decode(&bytes, scheme);
    let records: Vec<serde_json::Value> = FieldWalk::parse(&bytes)
        .records
        .iter()
        .map(|r| {
            serde_json::json!({
                "offset": r.offset,
                "tag": format!("0x{:02X}", r.tag),
                "value": hex::encode(r.value),
            })
        })
        .collect();

    let report = serde_json::json!({
        "scheme": scheme.to_string(),
        "length": bytes.len(),
        "packet": decoded.packet,
        "relayable": decoded.is_relayable(),
        "issues": decoded.issues.iter().map(|e| e.to_string()).collect::<Vec<_>>(),
        "records": records,
    });
    println!(
        "{}",
        serde_json::to_string_pretty(&report).context("Failed to render decode report")?
    );
    Ok(())
}

async fn cmd_simulate(
    nodes: usize,
    hops: u8,
    cycles: Option<usize>,
    message_id: Option<u16>,
    scan_ms: Option<u64>,
    advertise_ms: Option<u64>,
) -> Result<()> {
    anyhow::ensure!(nodes >= 2, "A flood needs at least two nodes");

    let mut relay = config::Config::load()?.relay;
    if let Some(ms) = scan_ms {
        relay.scan.duration_ms = ms;
    }
    if let Some(ms) = advertise_ms {
        relay.advertise.duration_ms = ms;
    }
    let cycles = cycles.unwrap_or(nodes + 1);

    println!("{}", "Flood simulation".bold());
    println!(
        "  {} nodes in a chain, {} hops, {} cycles per node",
        nodes, hops, cycles
    );
    println!();

    let air = SimulatedAir::new();
    let mut tasks = Vec::with_capacity(nodes);
    for (index, radio) in air.chain(nodes).into_iter().enumerate() {
        let mut engine =
            RelayEngine::new(Arc::new(radio), relay.clone()).context("Failed to build relay engine")?;
        engine.start().await.context("Failed to activate simulated radio")?;

        let origin = (index == 0).then(|| {
            let mut packet = AdvertisementPacket::new()
                .with_name(Name::Id(index as u16))
                .with_sender(index as u16)
                .with_hop_count(hops);
            packet.message_id = message_id;
            packet
        });

        tasks.push(tokio::spawn(async move {
            if let Some(packet) = origin {
                engine.originate(packet).await?;
            }
            for _ in 0..cycles {
                if let Err(e) = engine.run_cycle().await {
                    warn!(node = index, "cycle failed: {}", e);
                }
                tokio::time::sleep(engine.config().idle_delay()).await;
            }
            Ok::<RelayStats, RelayError>(engine.stats())
        }));
    }

    let mut results = Vec::with_capacity(nodes);
    for (index, task) in tasks.into_iter().enumerate() {
        let stats = task
            .await
            .context("Node task panicked")?
            .with_context(|| format!("node-{} failed", index))?;
        results.push(stats);
    }

    println!(
        "  {:<8} {:>9} {:>9} {:>9} {:>9}",
        "node", "accepted", "relayed", "dupes", "spent"
    );
    for (index, stats) in results.iter().enumerate() {
        let name = air.node_name(index).unwrap_or_else(|| index.to_string());
        let relayed = if stats.forwarded > 0 || stats.originated > 0 {
            (stats.forwarded + stats.originated).to_string().green()
        } else {
            "0".dimmed()
        };
        println!(
            "  {:<8} {:>9} {:>9} {:>9} {:>9}",
            name.bright_cyan(),
            stats.accepted,
            relayed,
            stats.drops.duplicate,
            stats.drops.hops_exhausted
        );
    }

    println!();
    println!("{}", "Transmissions".bold());
    for transmission in air.transmissions() {
        let packet = AdvertisementPacket::decode(&transmission.payload, relay.scheme).packet;
        println!(
            "  {} id={} hop={}  {}",
            air.node_name(transmission.from)
                .unwrap_or_default()
                .bright_cyan(),
            packet
                .message_id
                .map(|id| id.to_string())
                .unwrap_or_else(|| "-".to_string()),
            packet
                .hop_count
                .map(|h| h.to_string())
                .unwrap_or_else(|| "-".to_string()),
            hex::encode(&transmission.payload).dimmed()
        );
    }

    let reached = results
        .iter()
        .skip(1)
        .filter(|stats| stats.accepted > 0)
        .count();
    println!();
    println!(
        "{} flood reached {}/{} nodes",
        "✓".green(),
        reached,
        nodes - 1
    );
    Ok(())
}

fn cmd_config(action: ConfigAction) -> Result<()> {
    let mut config = config::Config::load()?;

    match action {
        ConfigAction::Set { key, value } => {
            config.set(&key, &value)?;
            config.save()?;
            println!("{} Set {} = {}", "✓".green(), key.bright_cyan(), value);
        }

        ConfigAction::Get { key } => {
            if let Some(value) = config.get(&key) {
                println!("{} = {}", key.bright_cyan(), value);
            } else {
                anyhow::bail!("Unknown config key: {}", key);
            }
        }

        ConfigAction::List => {
            println!("{}", "Configuration".bold());
            println!();

            for (key, value) in config.list() {
                println!("  {:<22} {}", key.bright_cyan(), value);
            }
        }

        ConfigAction::Path => {
            println!("{}", config::Config::config_file()?.display());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_service_widths() {
        assert_eq!(parse_service("180F").unwrap(), ServiceUuid::Short(0x180F));
        assert_eq!(parse_service("0x12345678").unwrap(), ServiceUuid::Medium(0x1234_5678));
        assert!(matches!(
            parse_service("6e400001-b5a3-f393-e0a9-e50e24dcca9e").unwrap(),
            ServiceUuid::Long(_)
        ));
        assert!(parse_service("zz").is_err());
    }

    #[test]
    fn test_cli_parses_simulate() {
        let cli = Cli::try_parse_from(["hopmesh", "simulate", "--nodes", "5", "--hops", "2"]).unwrap();
        match cli.command {
            Commands::Simulate { nodes, hops, cycles, .. } => {
                assert_eq!(nodes, 5);
                assert_eq!(hops, 2);
                assert_eq!(cycles, None);
            }
            _ => panic!("expected simulate"),
        }
    }

    #[test]
    fn test_cli_rejects_both_name_forms() {
        let result = Cli::try_parse_from([
            "hopmesh",
            "encode",
            "--hop",
            "3",
            "--message-id",
            "1",
            "--name",
            "relay",
            "--name-id",
            "0x1234",
        ]);
        assert!(result.is_err());
    }
}
