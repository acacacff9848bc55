/// Flood scanner — turns radio scan events into relay candidates
///
/// For every overheard advertisement the scanner decodes the payload and
/// applies the relay filters in a fixed order: PDU kind, malformed walk,
/// target identifier, hop budget, ledger. The first filter that rejects the
/// packet decides the drop reason. Accepted message ids are recorded in the
/// ledger immediately, so a duplicate arriving later in the same cycle is
/// already suppressed.
///
/// A cycle ends when the radio reports `ScanComplete` or when the scan
/// duration plus a grace period elapses, whichever comes first.

use crate::advert::{AdvertisementPacket, ManufacturerId, TagScheme};
use crate::ledger::SeenLedger;
use crate::radio::{AdvKind, BleAddress, EventQueue, Radio, RadioError, RadioEvent};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Target identifier the relay floods under unless configured otherwise
pub const DEFAULT_TARGET_ID: ManufacturerId = ManufacturerId(0x0102);

/// Scan configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// How long one scan cycle listens (default 2000ms)
    pub duration_ms: u64,
    /// Scan interval in microseconds (default 30000us)
    pub interval_us: u64,
    /// Scan window in microseconds (default 30000us, continuous listening)
    pub window_us: u64,
    /// Extra wait past `duration_ms` before giving up on `ScanComplete`
    pub grace_ms: u64,
    /// Only packets carrying this manufacturer identifier are relayed
    pub target: ManufacturerId,
    /// Tag table used to decode payloads
    pub scheme: TagScheme,
    /// Advertising PDU kinds that are considered at all
    pub accepted_kinds: Vec<AdvKind>,
    /// Stop the scan as soon as one packet is accepted
    pub stop_on_first_match: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            duration_ms: 2000,
            interval_us: 30_000,
            window_us: 30_000,
            grace_ms: 500,
            target: DEFAULT_TARGET_ID,
            scheme: TagScheme::default(),
            accepted_kinds: vec![AdvKind::AdvInd, AdvKind::AdvDirectInd],
            stop_on_first_match: false,
        }
    }
}

impl ScanConfig {
    pub fn with_target(mut self, target: ManufacturerId) -> Self {
        self.target = target;
        self
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    pub fn with_stop_on_first_match(mut self, stop: bool) -> Self {
        self.stop_on_first_match = stop;
        self
    }

    pub fn validate(&self) -> Result<(), ScannerError> {
        if self.window_us > self.interval_us {
            return Err(ScannerError::InvalidScanConfig(
                "Scan window must be <= scan interval".to_string(),
            ));
        }
        if self.interval_us == 0 || self.window_us == 0 || self.duration_ms == 0 {
            return Err(ScannerError::InvalidScanConfig(
                "Scan duration and intervals must be > 0".to_string(),
            ));
        }
        if self.accepted_kinds.is_empty() {
            return Err(ScannerError::InvalidScanConfig(
                "At least one advertising PDU kind must be accepted".to_string(),
            ));
        }
        Ok(())
    }

    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_micros(self.interval_us)
    }

    pub fn window(&self) -> Duration {
        Duration::from_micros(self.window_us)
    }
}

/// Scanner state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScannerState {
    Idle,
    Scanning,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScannerError {
    #[error("Invalid scan configuration: {0}")]
    InvalidScanConfig(String),
    #[error("Scanner not idle")]
    NotIdle,
    #[error(transparent)]
    Radio(#[from] RadioError),
}

/// Why an overheard advertisement was not relayed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DropReason {
    /// PDU kind not in the accepted set
    FilteredAdvKind,
    /// Record walk ran past the end of the payload
    Malformed,
    /// Manufacturer identifier missing or not ours
    TargetMismatch,
    /// No hop count field
    NoHopCount,
    /// Hop count already zero
    HopsExhausted,
    /// No message id field, nothing to dedup on
    NoMessageId,
    /// Message id is in the ledger
    Duplicate,
}

/// Per-reason drop counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropStats {
    pub filtered_adv_kind: u64,
    pub malformed: u64,
    pub target_mismatch: u64,
    pub no_hop_count: u64,
    pub hops_exhausted: u64,
    pub no_message_id: u64,
    pub duplicate: u64,
}

impl DropStats {
    pub fn record(&mut self, reason: DropReason) {
        let counter = match reason {
            DropReason::FilteredAdvKind => &mut self.filtered_adv_kind,
            DropReason::Malformed => &mut self.malformed,
            DropReason::TargetMismatch => &mut self.target_mismatch,
            DropReason::NoHopCount => &mut self.no_hop_count,
            DropReason::HopsExhausted => &mut self.hops_exhausted,
            DropReason::NoMessageId => &mut self.no_message_id,
            DropReason::Duplicate => &mut self.duplicate,
        };
        *counter += 1;
    }

    pub fn merge(&mut self, other: &DropStats) {
        self.filtered_adv_kind += other.filtered_adv_kind;
        self.malformed += other.malformed;
        self.target_mismatch += other.target_mismatch;
        self.no_hop_count += other.no_hop_count;
        self.hops_exhausted += other.hops_exhausted;
        self.no_message_id += other.no_message_id;
        self.duplicate += other.duplicate;
    }

    pub fn total(&self) -> u64 {
        self.filtered_adv_kind
            + self.malformed
            + self.target_mismatch
            + self.no_hop_count
            + self.hops_exhausted
            + self.no_message_id
            + self.duplicate
    }
}

/// Accepted advertisement, ready for the relay engine
#[derive(Debug, Clone)]
pub struct ScanResult {
    pub addr: BleAddress,
    pub adv_type: AdvKind,
    /// RSSI (Received Signal Strength Indicator) in dBm
    pub rssi: i8,
    pub packet: AdvertisementPacket,
}

/// Outcome of screening one advertisement
#[derive(Debug, Clone)]
pub enum ScanVerdict {
    Accept(ScanResult),
    Drop(DropReason),
}

/// How a scan cycle ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanEnd {
    /// Radio reported the scan duration elapsed
    Completed,
    /// Stopped after the first accepted packet
    StoppedOnMatch,
    /// No completion arrived before the deadline
    TimedOut,
}

/// Everything one scan cycle produced
#[derive(Debug, Clone)]
pub struct ScanCycle {
    pub results: Vec<ScanResult>,
    pub drops: DropStats,
    /// Connect/disconnect notifications that arrived while scanning
    pub peripheral_events: Vec<RadioEvent>,
    pub ended: ScanEnd,
}

pub struct Scanner {
    state: ScannerState,
    config: ScanConfig,
}

impl Scanner {
    pub fn new(config: ScanConfig) -> Result<Self, ScannerError> {
        config.validate()?;
        Ok(Self {
            state: ScannerState::Idle,
            config,
        })
    }

    pub fn state(&self) -> ScannerState {
        self.state
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Apply the relay filters to one advertisement
    pub fn screen(
        &self,
        ledger: &mut SeenLedger,
        addr: BleAddress,
        adv_type: AdvKind,
        rssi: i8,
        payload: &[u8],
    ) -> ScanVerdict {
        if !self.config.accepted_kinds.contains(&adv_type) {
            return ScanVerdict::Drop(DropReason::FilteredAdvKind);
        }

        let decoded = AdvertisementPacket::decode(payload, self.config.scheme);
        if !decoded.is_relayable() {
            debug!(%addr, issues = ?decoded.issues, "malformed advertisement");
            return ScanVerdict::Drop(DropReason::Malformed);
        }
        if !decoded.issues.is_empty() {
            debug!(%addr, issues = ?decoded.issues, "advertisement fields ignored");
        }

        let packet = decoded.packet;
        if packet.manufacturer != Some(self.config.target) {
            return ScanVerdict::Drop(DropReason::TargetMismatch);
        }

        match packet.hop_count {
            None => return ScanVerdict::Drop(DropReason::NoHopCount),
            Some(0) => return ScanVerdict::Drop(DropReason::HopsExhausted),
            Some(_) => {}
        }

        let Some(message_id) = packet.message_id else {
            return ScanVerdict::Drop(DropReason::NoMessageId);
        };
        if !ledger.record(message_id) {
            return ScanVerdict::Drop(DropReason::Duplicate);
        }

        ScanVerdict::Accept(ScanResult {
            addr,
            adv_type,
            rssi,
            packet,
        })
    }

    /// Run one scan cycle against `radio`, screening every result into `ledger`
    pub async fn run_cycle(
        &mut self,
        radio: &dyn Radio,
        queue: &mut EventQueue,
        ledger: &mut SeenLedger,
    ) -> Result<ScanCycle, ScannerError> {
        if self.state != ScannerState::Idle {
            return Err(ScannerError::NotIdle);
        }

        let mut cycle = ScanCycle {
            results: Vec::new(),
            drops: DropStats::default(),
            peripheral_events: Vec::new(),
            ended: ScanEnd::Completed,
        };

        // Leftovers from before this scan are stale; only keep peripheral events
        loop {
            match queue.try_recv() {
                Ok(RadioEvent::ScanResult { .. }) | Ok(RadioEvent::ScanComplete) => {}
                Ok(event) => cycle.peripheral_events.push(event),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    return Err(RadioError::Unavailable("event queue closed".to_string()).into())
                }
            }
        }

        radio
            .start_scan(self.config.duration(), self.config.interval(), self.config.window())
            .await?;
        self.state = ScannerState::Scanning;

        let deadline =
            Instant::now() + self.config.duration() + Duration::from_millis(self.config.grace_ms);
        let mut stopped = false;

        loop {
            let event = match tokio::time::timeout_at(deadline, queue.recv()).await {
                Ok(Some(event)) => event,
                Ok(None) => {
                    self.state = ScannerState::Idle;
                    return Err(RadioError::Unavailable("event queue closed".to_string()).into());
                }
                Err(_) => {
                    warn!("scan completion not reported before deadline");
                    if !stopped {
                        if let Err(e) = radio.stop_scan().await {
                            warn!("stop_scan after timeout failed: {}", e);
                        }
                    }
                    cycle.ended = if stopped {
                        ScanEnd::StoppedOnMatch
                    } else {
                        ScanEnd::TimedOut
                    };
                    break;
                }
            };

            match event {
                RadioEvent::ScanComplete => {
                    cycle.ended = if stopped {
                        ScanEnd::StoppedOnMatch
                    } else {
                        ScanEnd::Completed
                    };
                    break;
                }
                // in flight when the scan was stopped; never screened
                RadioEvent::ScanResult { .. } if stopped => {}
                RadioEvent::ScanResult {
                    addr,
                    adv_type,
                    rssi,
                    payload,
                } => match self.screen(ledger, addr, adv_type, rssi, &payload) {
                    ScanVerdict::Accept(result) => {
                        debug!(
                            %addr,
                            message_id = ?result.packet.message_id,
                            hop_count = ?result.packet.hop_count,
                            "accepted flood packet"
                        );
                        cycle.results.push(result);
                        if self.config.stop_on_first_match {
                            stopped = true;
                            if let Err(e) = radio.stop_scan().await {
                                warn!("stop_scan after first match failed: {}", e);
                                cycle.ended = ScanEnd::StoppedOnMatch;
                                break;
                            }
                        }
                    }
                    ScanVerdict::Drop(reason) => {
                        debug!(%addr, ?reason, "dropped advertisement");
                        cycle.drops.record(reason);
                    }
                },
                other => cycle.peripheral_events.push(other),
            }
        }

        self.state = ScannerState::Idle;
        Ok(cycle)
    }
}
