// Configuration management for the hopmesh CLI
//
// Cross-platform config stored in:
// - macOS: ~/Library/Application Support/hopmesh/config.json
// - Linux: ~/.config/hopmesh/config.json
// - Windows: %APPDATA%\hopmesh\config.json

use anyhow::{Context, Result};
use hopmesh_core::{HopPolicy, ManufacturerId, RelayConfig, TagScheme};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Relay settings handed to every simulated node
    pub relay: RelayConfig,

    /// Emit logs as JSON lines instead of human readable text
    pub json_logs: bool,
}

impl Config {
    /// Get the config directory path (cross-platform)
    pub fn config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to determine config directory")?
            .join("hopmesh");

        std::fs::create_dir_all(&config_dir).context("Failed to create config directory")?;

        Ok(config_dir)
    }

    /// Get the config file path
    pub fn config_file() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.json"))
    }

    /// Load config from the default location, creating it on first use
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_file()?)
    }

    /// Load config from `path`, or write the defaults there if it does not exist
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path).context("Failed to read config file")?;
            let config: Config =
                serde_json::from_str(&contents).context("Failed to parse config file")?;
            config
                .relay
                .validate()
                .context("Config file holds invalid relay settings")?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    /// Save config to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_file()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let contents = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, contents).context("Failed to write config file")?;
        Ok(())
    }

    /// Set a config value in memory; the caller saves
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let mut updated = self.relay.clone();
        match key {
            "scheme" => updated.scheme = parse_scheme(value)?,
            "target_id" => updated.scan.target = ManufacturerId(parse_u16(value)?),
            "ledger_capacity" => {
                updated.ledger_capacity = value.parse().context("Invalid number")?;
            }
            "hop_policy" => updated.hop_policy = parse_hop_policy(value)?,
            "origin_hop_count" => {
                updated.origin_hop_count = value.parse().context("Invalid hop count")?;
            }
            "idle_delay_ms" => {
                updated.idle_delay_ms = value.parse().context("Invalid number")?;
            }
            "max_radio_failures" => {
                updated.max_consecutive_radio_failures = value.parse().context("Invalid number")?;
            }
            "scan_duration_ms" => {
                updated.scan.duration_ms = value.parse().context("Invalid number")?;
            }
            "scan_interval_us" => {
                updated.scan.interval_us = value.parse().context("Invalid number")?;
            }
            "scan_window_us" => {
                updated.scan.window_us = value.parse().context("Invalid number")?;
            }
            "stop_on_first_match" => {
                updated.scan.stop_on_first_match = value.parse().context("Invalid boolean value")?;
            }
            "advertise_interval_us" => {
                updated.advertise.interval_us = value.parse().context("Invalid number")?;
            }
            "advertise_duration_ms" => {
                updated.advertise.duration_ms = value.parse().context("Invalid number")?;
            }
            "json_logs" => {
                self.json_logs = value.parse().context("Invalid boolean value")?;
                return Ok(());
            }
            _ => anyhow::bail!("Unknown config key: {}", key),
        }

        updated.validate().context("Rejected config value")?;
        self.relay = updated;
        Ok(())
    }

    /// Get a config value
    pub fn get(&self, key: &str) -> Option<String> {
        self.list()
            .into_iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// List all config values
    pub fn list(&self) -> Vec<(String, String)> {
        let relay = &self.relay;
        vec![
            ("scheme".to_string(), relay.scheme.to_string()),
            ("target_id".to_string(), relay.target().to_string()),
            ("ledger_capacity".to_string(), relay.ledger_capacity.to_string()),
            ("hop_policy".to_string(), hop_policy_name(relay.hop_policy).to_string()),
            ("origin_hop_count".to_string(), relay.origin_hop_count.to_string()),
            ("idle_delay_ms".to_string(), relay.idle_delay_ms.to_string()),
            (
                "max_radio_failures".to_string(),
                relay.max_consecutive_radio_failures.to_string(),
            ),
            ("scan_duration_ms".to_string(), relay.scan.duration_ms.to_string()),
            ("scan_interval_us".to_string(), relay.scan.interval_us.to_string()),
            ("scan_window_us".to_string(), relay.scan.window_us.to_string()),
            (
                "stop_on_first_match".to_string(),
                relay.scan.stop_on_first_match.to_string(),
            ),
            (
                "advertise_interval_us".to_string(),
                relay.advertise.interval_us.to_string(),
            ),
            (
                "advertise_duration_ms".to_string(),
                relay.advertise.duration_ms.to_string(),
            ),
            ("json_logs".to_string(), self.json_logs.to_string()),
        ]
    }
}

/// Accepts `v1`/`v2`, `1`/`2` or `legacy`
pub fn parse_scheme(value: &str) -> Result<TagScheme> {
    let version = match value.to_ascii_lowercase().as_str() {
        "legacy" => 1,
        other => other
            .trim_start_matches('v')
            .parse::<u8>()
            .context("Invalid tag scheme")?,
    };
    TagScheme::from_version(version).with_context(|| format!("Unknown tag scheme: {}", value))
}

/// Decimal or `0x` prefixed hex
pub fn parse_u16(value: &str) -> Result<u16> {
    let parsed = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => value.parse(),
    };
    parsed.with_context(|| format!("Invalid 16-bit value: {}", value))
}

fn parse_hop_policy(value: &str) -> Result<HopPolicy> {
    match value {
        "forward-final-hop" => Ok(HopPolicy::ForwardFinalHop),
        "stop-before-zero" => Ok(HopPolicy::StopBeforeZero),
        _ => anyhow::bail!(
            "Unknown hop policy: {} (expected forward-final-hop or stop-before-zero)",
            value
        ),
    }
}

fn hop_policy_name(policy: HopPolicy) -> &'static str {
    match policy {
        HopPolicy::ForwardFinalHop => "forward-final-hop",
        HopPolicy::StopBeforeZero => "stop-before-zero",
    }
}
