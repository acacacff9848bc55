// Broadcaster — puts one finished payload on air for a bounded time
//
// The radio advertises the payload at a fixed interval, the broadcaster
// sleeps for the configured duration and then stops the advert so the node
// can go back to scanning. Centrals that connect while a node is advertising
// are tracked by connection handle; a disconnect can put the node's own
// originated payload back on air. Relayed payloads are never replayed.

use crate::advert::MAX_LEGACY_ADV_PAYLOAD;
use crate::radio::{Radio, RadioError, RadioEvent};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Advertising configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvertiseConfig {
    /// Advertising interval in microseconds (default 500000us)
    pub interval_us: u64,
    /// How long one payload stays on air (default 1000ms)
    pub duration_ms: u64,
    /// Largest payload handed to the radio
    pub max_payload: usize,
    /// Put the last originated payload back on air when a central disconnects
    pub readvertise_on_disconnect: bool,
}

impl Default for AdvertiseConfig {
    fn default() -> Self {
        Self {
            interval_us: 500_000,
            duration_ms: 1000,
            max_payload: MAX_LEGACY_ADV_PAYLOAD,
            readvertise_on_disconnect: true,
        }
    }
}

impl AdvertiseConfig {
    pub fn validate(&self) -> Result<(), BroadcastError> {
        if self.interval_us == 0 || self.duration_ms == 0 {
            return Err(BroadcastError::InvalidAdvertiseConfig(
                "Advertising interval and duration must be > 0".to_string(),
            ));
        }
        if self.max_payload == 0 || self.max_payload > u8::MAX as usize {
            return Err(BroadcastError::InvalidAdvertiseConfig(format!(
                "Payload ceiling must be 1..=255, got {}",
                self.max_payload
            )));
        }
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_micros(self.interval_us)
    }

    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BroadcastError {
    #[error("Invalid advertise configuration: {0}")]
    InvalidAdvertiseConfig(String),
    #[error("Payload too large to advertise: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },
    #[error(transparent)]
    Radio(#[from] RadioError),
}

pub struct Broadcaster {
    config: AdvertiseConfig,
    centrals: HashSet<u16>,
    own_payload: Option<Vec<u8>>,
}

impl Broadcaster {
    pub fn new(config: AdvertiseConfig) -> Result<Self, BroadcastError> {
        config.validate()?;
        Ok(Self {
            config,
            centrals: HashSet::new(),
            own_payload: None,
        })
    }

    pub fn config(&self) -> &AdvertiseConfig {
        &self.config
    }

    /// Advertise `payload` for the configured duration, then stop
    pub async fn broadcast(&mut self, radio: &dyn Radio, payload: &[u8]) -> Result<(), BroadcastError> {
        if payload.len() > self.config.max_payload {
            return Err(BroadcastError::PayloadTooLarge {
                size: payload.len(),
                max: self.config.max_payload,
            });
        }

        radio.start_advertise(self.config.interval(), payload).await?;
        debug!(len = payload.len(), "advertising {}", hex::encode(payload));

        tokio::time::sleep(self.config.duration()).await;

        radio.stop_advertise().await?;
        Ok(())
    }

    /// Broadcast a payload this node originated and keep it for re-advertising
    pub async fn broadcast_own(&mut self, radio: &dyn Radio, payload: &[u8]) -> Result<(), BroadcastError> {
        self.broadcast(radio, payload).await?;
        self.own_payload = Some(payload.to_vec());
        Ok(())
    }

    /// Re-run the last originated broadcast. Returns false if there is none.
    pub async fn readvertise(&mut self, radio: &dyn Radio) -> Result<bool, BroadcastError> {
        let Some(payload) = self.own_payload.clone() else {
            return Ok(false);
        };
        self.broadcast(radio, &payload).await?;
        Ok(true)
    }

    /// Track a connection notification. Returns true when the event asks for
    /// the originated payload to be put back on air.
    pub fn handle_event(&mut self, event: &RadioEvent) -> bool {
        match event {
            RadioEvent::CentralConnect { conn_handle } => {
                if self.centrals.insert(*conn_handle) {
                    info!("Central connected (handle {})", conn_handle);
                }
                false
            }
            RadioEvent::CentralDisconnect { conn_handle } => {
                if !self.centrals.remove(conn_handle) {
                    warn!("Disconnect for unknown central handle {}", conn_handle);
                }
                info!("Central disconnected (handle {})", conn_handle);
                self.config.readvertise_on_disconnect && self.own_payload.is_some()
            }
            _ => false,
        }
    }

    pub fn connected_centrals(&self) -> usize {
        self.centrals.len()
    }

    pub fn own_payload(&self) -> Option<&[u8]> {
        self.own_payload.as_deref()
    }
}
