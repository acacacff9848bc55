//! Relay engine — scan, filter, re-encode, re-broadcast
//!
//! One engine drives one node. Each cycle walks the same states:
//!
//! ```text
//! Idle -> Scanning -> Draining -> Forwarding -> Idle
//! ```
//!
//! The scanner fills the engine's ledger while it listens, so by the time a
//! cycle drains its results every accepted message id is already marked seen.
//! Forwarding is fire-and-forget: one bounded advert per accepted packet with
//! the hop count decremented and the node's target identifier stamped on it.
//!
//! Scanning and advertising strictly alternate on the single radio.

use crate::advert::{AdvError, AdvertisementPacket, FieldKind, ManufacturerId, TagScheme};
use crate::broadcaster::{AdvertiseConfig, BroadcastError, Broadcaster};
use crate::ledger::{SeenLedger, DEFAULT_LEDGER_CAPACITY, MAX_LEDGER_CAPACITY};
use crate::radio::{event_channel, EventQueue, Radio, RadioError};
use crate::scanner::{DropStats, ScanConfig, ScanEnd, Scanner, ScannerError};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

const FRESH_ID_DRAWS: usize = 64;

/// Where the hop budget runs out
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum HopPolicy {
    /// A packet heard with hop 1 goes out once more with hop 0
    #[default]
    ForwardFinalHop,
    /// A packet whose decremented hop count would be 0 is not forwarded
    StopBeforeZero,
}

impl HopPolicy {
    /// Hop count to put on the forwarded packet, or None to stop here
    pub fn next_hop(&self, received: u8) -> Option<u8> {
        let next = received.checked_sub(1)?;
        match self {
            HopPolicy::ForwardFinalHop => Some(next),
            HopPolicy::StopBeforeZero => (next > 0).then_some(next),
        }
    }
}

/// Per-cycle engine state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelayState {
    Idle,
    Scanning,
    Draining,
    Forwarding,
}

/// Relay engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Tag scheme for decoding and re-encoding; overrides `scan.scheme`
    pub scheme: TagScheme,
    pub ledger_capacity: usize,
    pub hop_policy: HopPolicy,
    /// Hop count stamped on originated packets that carry none
    pub origin_hop_count: u8,
    /// Pause between cycles (default 10ms)
    pub idle_delay_ms: u64,
    /// `run` gives up after this many radio failures in a row
    pub max_consecutive_radio_failures: u32,
    pub scan: ScanConfig,
    pub advertise: AdvertiseConfig,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            scheme: TagScheme::default(),
            ledger_capacity: DEFAULT_LEDGER_CAPACITY,
            hop_policy: HopPolicy::default(),
            origin_hop_count: 4,
            idle_delay_ms: 10,
            max_consecutive_radio_failures: 5,
            scan: ScanConfig::default(),
            advertise: AdvertiseConfig::default(),
        }
    }
}

impl RelayConfig {
    pub fn validate(&self) -> Result<(), RelayError> {
        self.scan
            .validate()
            .map_err(|e| RelayError::InvalidConfig(e.to_string()))?;
        self.advertise
            .validate()
            .map_err(|e| RelayError::InvalidConfig(e.to_string()))?;
        if !(1..=MAX_LEDGER_CAPACITY).contains(&self.ledger_capacity) {
            return Err(RelayError::InvalidConfig(format!(
                "ledger_capacity must be 1..={}, got {}",
                MAX_LEDGER_CAPACITY, self.ledger_capacity
            )));
        }
        if self.max_consecutive_radio_failures == 0 {
            return Err(RelayError::InvalidConfig(
                "max_consecutive_radio_failures must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Identifier stamped on every forwarded and originated packet
    pub fn target(&self) -> ManufacturerId {
        self.scan.target
    }

    pub fn idle_delay(&self) -> Duration {
        Duration::from_millis(self.idle_delay_ms)
    }
}

/// Relay engine errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RelayError {
    #[error("Invalid relay configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Radio(#[from] RadioError),

    #[error("Failed to encode packet: {0}")]
    Encode(#[from] AdvError),

    #[error("Scan cycle failed: {0}")]
    ScanFailed(#[from] ScannerError),

    #[error("Broadcast failed: {0}")]
    Broadcast(#[from] BroadcastError),

    #[error("Giving up after {0} consecutive radio failures")]
    RadioFailuresExceeded(u32),
}

/// Running counters for one engine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayStats {
    pub cycles: u64,
    pub accepted: u64,
    pub forwarded: u64,
    pub originated: u64,
    /// Accepted but stopped by the hop policy
    pub hop_policy_stops: u64,
    pub drops: DropStats,
    pub scan_failures: u64,
    pub scan_timeouts: u64,
    pub encode_failures: u64,
    pub broadcast_failures: u64,
}

/// What one cycle did
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub accepted: usize,
    pub forwarded: usize,
    pub broadcast_failures: usize,
    pub drops: DropStats,
    pub ended: ScanEnd,
}

/// The relay engine for one node
pub struct RelayEngine {
    radio: Arc<dyn Radio>,
    config: RelayConfig,
    state: RelayState,
    ledger: SeenLedger,
    scanner: Scanner,
    broadcaster: Broadcaster,
    events: EventQueue,
    stats: RelayStats,
    consecutive_failures: u32,
}

impl RelayEngine {
    /// Create an engine and register its event queue with `radio`
    pub fn new(radio: Arc<dyn Radio>, mut config: RelayConfig) -> Result<Self, RelayError> {
        config.scan.scheme = config.scheme;
        config.validate()?;

        let scanner = Scanner::new(config.scan.clone())?;
        let broadcaster = Broadcaster::new(config.advertise.clone())?;
        let (sink, events) = event_channel();
        radio.set_event_sink(sink);

        Ok(Self {
            radio,
            state: RelayState::Idle,
            ledger: SeenLedger::with_capacity(config.ledger_capacity),
            scanner,
            broadcaster,
            events,
            stats: RelayStats::default(),
            consecutive_failures: 0,
            config,
        })
    }

    /// Power up the radio
    pub async fn start(&mut self) -> Result<(), RelayError> {
        self.radio.activate().await?;
        info!(
            "Relay engine started (scheme {}, target {})",
            self.config.scheme,
            self.config.target()
        );
        Ok(())
    }

    pub fn state(&self) -> RelayState {
        self.state
    }

    pub fn stats(&self) -> RelayStats {
        self.stats
    }

    pub fn ledger(&self) -> &SeenLedger {
        &self.ledger
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn connected_centrals(&self) -> usize {
        self.broadcaster.connected_centrals()
    }

    /// Build the outbound payload for an accepted packet.
    ///
    /// Returns `Ok(None)` when the hop policy says the packet stops here.
    /// Sender, message id, name, distance and device type are carried over;
    /// services are not. Device type is dropped under a scheme with no tag
    /// for it.
    pub fn prepare_forward(&self, packet: &AdvertisementPacket) -> Result<Option<Vec<u8>>, AdvError> {
        let Some(hop_count) = packet
            .hop_count
            .and_then(|hops| self.config.hop_policy.next_hop(hops))
        else {
            return Ok(None);
        };

        let scheme = self.config.scheme;
        let outbound = AdvertisementPacket {
            manufacturer: Some(self.config.target()),
            services: Vec::new(),
            name: packet.name.clone(),
            hop_count: Some(hop_count),
            distance: packet.distance,
            sender: packet.sender,
            message_id: packet.message_id,
            device_type: packet
                .device_type
                .filter(|_| scheme.tag(FieldKind::DeviceType).is_some()),
        };

        outbound
            .encode_with_limit(scheme, self.config.advertise.max_payload)
            .map(Some)
    }

    /// One scan, drain and forward pass
    pub async fn run_cycle(&mut self) -> Result<CycleReport, RelayError> {
        self.state = RelayState::Scanning;
        let cycle = match self
            .scanner
            .run_cycle(self.radio.as_ref(), &mut self.events, &mut self.ledger)
            .await
        {
            Ok(cycle) => cycle,
            Err(e) => {
                self.state = RelayState::Idle;
                self.stats.scan_failures += 1;
                return Err(e.into());
            }
        };

        self.stats.cycles += 1;
        self.stats.accepted += cycle.results.len() as u64;
        self.stats.drops.merge(&cycle.drops);
        if cycle.ended == ScanEnd::TimedOut {
            self.stats.scan_timeouts += 1;
        }

        self.state = RelayState::Draining;
        let mut outbound = Vec::with_capacity(cycle.results.len());
        for result in &cycle.results {
            match self.prepare_forward(&result.packet) {
                Ok(Some(payload)) => outbound.push((result.packet.message_id, payload)),
                Ok(None) => {
                    debug!(
                        message_id = ?result.packet.message_id,
                        "hop budget exhausted, not forwarding"
                    );
                    self.stats.hop_policy_stops += 1;
                }
                Err(e) => {
                    warn!(message_id = ?result.packet.message_id, "re-encode failed: {}", e);
                    self.stats.encode_failures += 1;
                }
            }
        }

        let mut readvertise = false;
        for event in &cycle.peripheral_events {
            readvertise |= self.broadcaster.handle_event(event);
        }

        self.state = RelayState::Forwarding;
        let mut forwarded = 0;
        let mut broadcast_failures = 0;
        for (message_id, payload) in outbound {
            match self.broadcaster.broadcast(self.radio.as_ref(), &payload).await {
                Ok(()) => {
                    forwarded += 1;
                    self.stats.forwarded += 1;
                    info!(?message_id, "forwarded flood packet");
                }
                Err(e) => {
                    broadcast_failures += 1;
                    self.stats.broadcast_failures += 1;
                    warn!(?message_id, "broadcast failed: {}", e);
                }
            }
        }

        if readvertise && forwarded == 0 {
            if let Err(e) = self.broadcaster.readvertise(self.radio.as_ref()).await {
                broadcast_failures += 1;
                self.stats.broadcast_failures += 1;
                warn!("re-advertise after disconnect failed: {}", e);
            }
        }

        self.state = RelayState::Idle;
        Ok(CycleReport {
            accepted: cycle.results.len(),
            forwarded,
            broadcast_failures,
            drops: cycle.drops,
            ended: cycle.ended,
        })
    }

    /// Inject this node's own message into the flood.
    ///
    /// A fresh random message id is drawn if the packet carries none. The id
    /// is recorded in the ledger first so echoes from neighbours are dropped.
    pub async fn originate(&mut self, mut packet: AdvertisementPacket) -> Result<u16, RelayError> {
        let message_id = match packet.message_id {
            Some(id) => id,
            None => self.fresh_message_id(),
        };
        packet.message_id = Some(message_id);
        packet.manufacturer = Some(self.config.target());
        if packet.hop_count.is_none() {
            packet.hop_count = Some(self.config.origin_hop_count);
        }

        let payload = packet.encode_with_limit(self.config.scheme, self.config.advertise.max_payload)?;

        self.ledger.record(message_id);
        self.state = RelayState::Forwarding;
        let result = self.broadcaster.broadcast_own(self.radio.as_ref(), &payload).await;
        self.state = RelayState::Idle;
        result?;

        self.stats.originated += 1;
        info!(message_id, hop_count = ?packet.hop_count, "originated flood packet");
        Ok(message_id)
    }

    /// Random id within the scheme's range, avoiding ids still in the ledger
    /// when one can be found in a few draws
    fn fresh_message_id(&self) -> u16 {
        let max = self.config.scheme.max_id();
        let mut rng = rand::thread_rng();
        let mut id = rng.gen_range(0..=max);
        for _ in 0..FRESH_ID_DRAWS {
            if !self.ledger.contains(id) {
                break;
            }
            id = rng.gen_range(0..=max);
        }
        id
    }

    fn note_radio_failure(&mut self) -> Result<(), RelayError> {
        self.consecutive_failures += 1;
        if self.consecutive_failures >= self.config.max_consecutive_radio_failures {
            return Err(RelayError::RadioFailuresExceeded(self.consecutive_failures));
        }
        Ok(())
    }

    /// Cycle until `shutdown` flips to true or its sender is dropped.
    ///
    /// A single failed cycle is logged and the loop carries on; only a run of
    /// `max_consecutive_radio_failures` radio failures ends it with an error.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<RelayStats, RelayError> {
        while !*shutdown.borrow() {
            match self.run_cycle().await {
                Ok(report) if report.broadcast_failures > 0 && report.forwarded == 0 => {
                    self.note_radio_failure()?;
                }
                Ok(_) => self.consecutive_failures = 0,
                Err(RelayError::ScanFailed(ScannerError::Radio(e))) => {
                    warn!("scan failed: {}", e);
                    self.note_radio_failure()?;
                }
                Err(e) => return Err(e),
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.idle_delay()) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!(
            cycles = self.stats.cycles,
            forwarded = self.stats.forwarded,
            "Relay engine stopped"
        );
        Ok(self.stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advert::{Name, ServiceUuid};
    use crate::radio::{AdvKind, BleAddress, RadioEvent, ScriptedRadio};
    use crate::scanner::DEFAULT_TARGET_ID;

    fn fast_config() -> RelayConfig {
        RelayConfig {
            idle_delay_ms: 1,
            scan: ScanConfig::default().with_duration_ms(20),
            advertise: AdvertiseConfig {
                duration_ms: 2,
                ..AdvertiseConfig::default()
            },
            ..RelayConfig::default()
        }
    }

    fn engine_with(config: RelayConfig) -> (RelayEngine, Arc<ScriptedRadio>) {
        let radio = Arc::new(ScriptedRadio::new());
        let engine = RelayEngine::new(radio.clone(), config).unwrap();
        (engine, radio)
    }

    fn heard(message_id: u16, hops: u8) -> RadioEvent {
        let payload = AdvertisementPacket::new()
            .with_manufacturer(DEFAULT_TARGET_ID)
            .with_hop_count(hops)
            .with_sender(0x5678)
            .with_message_id(message_id)
            .encode(TagScheme::V2)
            .unwrap();
        RadioEvent::ScanResult {
            addr: BleAddress([0x11; 6]),
            adv_type: AdvKind::AdvInd,
            rssi: -50,
            payload,
        }
    }

    #[test]
    fn test_hop_policy() {
        assert_eq!(HopPolicy::ForwardFinalHop.next_hop(4), Some(3));
        assert_eq!(HopPolicy::ForwardFinalHop.next_hop(1), Some(0));
        assert_eq!(HopPolicy::ForwardFinalHop.next_hop(0), None);
        assert_eq!(HopPolicy::StopBeforeZero.next_hop(2), Some(1));
        assert_eq!(HopPolicy::StopBeforeZero.next_hop(1), None);
        assert_eq!(HopPolicy::StopBeforeZero.next_hop(0), None);
    }

    #[test]
    fn test_relay_config_default() {
        let config = RelayConfig::default();
        assert_eq!(config.ledger_capacity, 10);
        assert_eq!(config.idle_delay(), Duration::from_millis(10));
        assert_eq!(config.target(), ManufacturerId(0x0102));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_relay_config_serde_roundtrip() {
        let config = RelayConfig {
            scheme: TagScheme::Legacy,
            hop_policy: HopPolicy::StopBeforeZero,
            ..RelayConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let restored: RelayConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.scheme, TagScheme::Legacy);
        assert_eq!(restored.hop_policy, HopPolicy::StopBeforeZero);
        assert_eq!(restored.scan.target, config.scan.target);
        assert_eq!(restored.advertise.interval_us, 500_000);
    }

    #[test]
    fn test_relay_config_rejects_zero_failure_limit() {
        let config = RelayConfig {
            max_consecutive_radio_failures: 0,
            ..RelayConfig::default()
        };
        assert!(matches!(config.validate(), Err(RelayError::InvalidConfig(_))));
    }

    #[test]
    fn test_relay_config_bounds_ledger_capacity() {
        for capacity in [0, MAX_LEDGER_CAPACITY + 1, usize::MAX] {
            let config = RelayConfig {
                ledger_capacity: capacity,
                ..RelayConfig::default()
            };
            assert!(matches!(config.validate(), Err(RelayError::InvalidConfig(_))));

            let radio = Arc::new(ScriptedRadio::new());
            assert!(matches!(
                RelayEngine::new(radio, config),
                Err(RelayError::InvalidConfig(_))
            ));
        }

        let largest = RelayConfig {
            ledger_capacity: MAX_LEDGER_CAPACITY,
            ..RelayConfig::default()
        };
        let (engine, _radio) = engine_with(largest);
        assert_eq!(engine.ledger().capacity(), MAX_LEDGER_CAPACITY);
    }

    #[test]
    fn test_prepare_forward_restamps_and_decrements() {
        let (engine, _radio) = engine_with(fast_config());
        let packet = AdvertisementPacket::new()
            .with_manufacturer(DEFAULT_TARGET_ID)
            .with_service(ServiceUuid::Short(0x180F))
            .with_name(Name::Id(0x1234))
            .with_hop_count(4)
            .with_distance(7.94)
            .with_sender(0x5678)
            .with_message_id(4321)
            .with_device_type(2);

        let payload = engine.prepare_forward(&packet).unwrap().unwrap();
        let forwarded = AdvertisementPacket::decode(&payload, TagScheme::V2).packet;

        assert_eq!(forwarded.hop_count, Some(3));
        assert_eq!(forwarded.manufacturer, Some(DEFAULT_TARGET_ID));
        assert_eq!(forwarded.name, Some(Name::Id(0x1234)));
        assert_eq!(forwarded.distance, Some(7.94));
        assert_eq!(forwarded.sender, Some(0x5678));
        assert_eq!(forwarded.message_id, Some(4321));
        assert_eq!(forwarded.device_type, Some(2));
        assert!(forwarded.services.is_empty());
    }

    #[test]
    fn test_prepare_forward_final_hop() {
        let (engine, _radio) = engine_with(fast_config());
        let packet = AdvertisementPacket::new().with_hop_count(1).with_message_id(1);
        let payload = engine.prepare_forward(&packet).unwrap().unwrap();
        assert_eq!(
            AdvertisementPacket::decode(&payload, TagScheme::V2).packet.hop_count,
            Some(0)
        );

        let (strict, _radio) = engine_with(RelayConfig {
            hop_policy: HopPolicy::StopBeforeZero,
            ..fast_config()
        });
        assert_eq!(strict.prepare_forward(&packet).unwrap(), None);
    }

    #[test]
    fn test_prepare_forward_legacy_drops_device_type() {
        let (engine, _radio) = engine_with(RelayConfig {
            scheme: TagScheme::Legacy,
            ..fast_config()
        });
        let packet = AdvertisementPacket::new()
            .with_hop_count(3)
            .with_message_id(9)
            .with_device_type(1);

        let payload = engine.prepare_forward(&packet).unwrap().unwrap();
        let forwarded = AdvertisementPacket::decode(&payload, TagScheme::Legacy).packet;
        assert_eq!(forwarded.hop_count, Some(2));
        assert_eq!(forwarded.device_type, None);
    }

    #[tokio::test]
    async fn test_cycle_forwards_accepted_packet() {
        let (mut engine, radio) = engine_with(fast_config());
        radio.push_scan(vec![heard(7, 3)]);

        let report = engine.run_cycle().await.unwrap();
        assert_eq!(report.accepted, 1);
        assert_eq!(report.forwarded, 1);
        assert_eq!(engine.state(), RelayState::Idle);

        let sent = radio.advertised();
        assert_eq!(sent.len(), 1);
        let forwarded = AdvertisementPacket::decode(&sent[0], TagScheme::V2).packet;
        assert_eq!(forwarded.hop_count, Some(2));
        assert_eq!(forwarded.message_id, Some(7));
    }

    #[tokio::test]
    async fn test_same_message_across_cycles_forwards_once() {
        let (mut engine, radio) = engine_with(fast_config());
        radio.push_scan(vec![heard(99, 3)]);
        radio.push_scan(vec![heard(99, 3)]);

        engine.run_cycle().await.unwrap();
        let second = engine.run_cycle().await.unwrap();

        assert_eq!(second.accepted, 0);
        assert_eq!(second.drops.duplicate, 1);
        assert_eq!(radio.advertised().len(), 1);
        assert_eq!(engine.stats().forwarded, 1);
        assert_eq!(engine.stats().cycles, 2);
    }

    #[tokio::test]
    async fn test_broadcast_failure_does_not_abort_cycle() {
        let (mut engine, radio) = engine_with(fast_config());
        radio.push_scan(vec![heard(1, 3), heard(2, 3)]);
        radio.fail_next_adverts(1);

        let report = engine.run_cycle().await.unwrap();
        assert_eq!(report.forwarded, 1);
        assert_eq!(report.broadcast_failures, 1);
        assert_eq!(engine.stats().broadcast_failures, 1);
    }

    #[tokio::test]
    async fn test_originate_records_message_id() {
        let (mut engine, radio) = engine_with(fast_config());
        let id = engine
            .originate(AdvertisementPacket::new().with_name(Name::Id(0x1234)))
            .await
            .unwrap();

        assert!(engine.ledger().contains(id));
        let sent = radio.advertised();
        assert_eq!(sent.len(), 1);
        let packet = AdvertisementPacket::decode(&sent[0], TagScheme::V2).packet;
        assert_eq!(packet.message_id, Some(id));
        assert_eq!(packet.hop_count, Some(4));
        assert_eq!(packet.manufacturer, Some(DEFAULT_TARGET_ID));

        // our own message echoed back is not relayed
        radio.push_scan(vec![heard(id, 3)]);
        let report = engine.run_cycle().await.unwrap();
        assert_eq!(report.forwarded, 0);
        assert_eq!(report.drops.duplicate, 1);
    }

    #[tokio::test]
    async fn test_originate_under_legacy_draws_single_byte_ids() {
        let (mut engine, radio) = engine_with(RelayConfig {
            scheme: TagScheme::Legacy,
            ..fast_config()
        });
        for _ in 0..5 {
            let id = engine.originate(AdvertisementPacket::new()).await.unwrap();
            assert!(id <= 255);
        }
        for payload in radio.advertised() {
            let decoded = AdvertisementPacket::decode(&payload, TagScheme::Legacy);
            assert!(decoded.issues.is_empty());
            assert!(decoded.packet.message_id.is_some());
        }

        let wide = engine
            .originate(AdvertisementPacket::new().with_message_id(4321))
            .await;
        assert!(matches!(
            wide,
            Err(RelayError::Encode(AdvError::ValueOutOfRange { .. }))
        ));
    }

    #[tokio::test]
    async fn test_originate_keeps_given_id() {
        let (mut engine, _radio) = engine_with(fast_config());
        let id = engine
            .originate(AdvertisementPacket::new().with_message_id(4321).with_hop_count(2))
            .await
            .unwrap();
        assert_eq!(id, 4321);
        assert_eq!(engine.stats().originated, 1);
    }

    #[tokio::test]
    async fn test_disconnect_readvertises_originated_payload() {
        let (mut engine, radio) = engine_with(fast_config());
        engine
            .originate(AdvertisementPacket::new().with_message_id(5))
            .await
            .unwrap();
        radio.push_scan(vec![
            RadioEvent::CentralConnect { conn_handle: 1 },
            RadioEvent::CentralDisconnect { conn_handle: 1 },
        ]);

        engine.run_cycle().await.unwrap();
        let sent = radio.advertised();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0], sent[1]);
        assert_eq!(engine.connected_centrals(), 0);
    }

    #[tokio::test]
    async fn test_disconnect_never_replays_relayed_payload() {
        let (mut engine, radio) = engine_with(fast_config());
        radio.push_scan(vec![heard(8, 3)]);
        engine.run_cycle().await.unwrap();
        assert_eq!(radio.advertised().len(), 1);

        radio.push_scan(vec![
            RadioEvent::CentralConnect { conn_handle: 2 },
            RadioEvent::CentralDisconnect { conn_handle: 2 },
        ]);
        let report = engine.run_cycle().await.unwrap();
        assert_eq!(report.forwarded, 0);
        assert_eq!(radio.advertised().len(), 1);
    }

    #[tokio::test]
    async fn test_run_gives_up_after_radio_failures() {
        let (mut engine, radio) = engine_with(RelayConfig {
            max_consecutive_radio_failures: 3,
            ..fast_config()
        });
        radio.fail_next_scans(10);

        let (_tx, rx) = watch::channel(false);
        let result = engine.run(rx).await;
        assert_eq!(result, Err(RelayError::RadioFailuresExceeded(3)));
        assert_eq!(engine.stats().scan_failures, 3);
    }

    #[tokio::test]
    async fn test_run_recovers_from_isolated_failures() {
        let (mut engine, radio) = engine_with(RelayConfig {
            max_consecutive_radio_failures: 2,
            ..fast_config()
        });
        radio.fail_next_scans(1);
        radio.push_scan(vec![heard(3, 2)]);

        let (tx, rx) = watch::channel(false);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(80)).await;
            let _ = tx.send(true);
        });

        let stats = engine.run(rx).await.unwrap();
        assert_eq!(stats.scan_failures, 1);
        assert_eq!(stats.forwarded, 1);
        assert!(stats.cycles >= 1);
    }

    #[tokio::test]
    async fn test_run_stops_when_shutdown_already_set() {
        let (mut engine, radio) = engine_with(fast_config());
        let (_tx, rx) = watch::channel(true);
        let stats = engine.run(rx).await.unwrap();
        assert_eq!(stats.cycles, 0);
        assert!(radio.calls().is_empty());
    }
}
