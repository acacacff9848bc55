//! Radio contract — the seam between the relay core and a BLE stack
//!
//! The core never touches hardware. It drives an implementation of [`Radio`]
//! and consumes [`RadioEvent`]s the implementation pushes into an unbounded
//! queue. The notification side does nothing but enqueue; all decoding and
//! relay work happens on the engine's task between await points.
//!
//! Two implementations ship with the crate:
//! - [`SimulatedAir`]: an in-process shared medium with an adjacency list
//! - [`ScriptedRadio`]: replays canned scan batches and records every call

pub mod scripted;
pub mod sim;

pub use scripted::{RadioCall, ScriptedRadio};
pub use sim::{SimRadio, SimulatedAir, Transmission};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

/// Queue the radio pushes notifications into
pub type EventSink = mpsc::UnboundedSender<RadioEvent>;

/// Receiving half held by the node's event loop
pub type EventQueue = mpsc::UnboundedReceiver<RadioEvent>;

/// Create a connected sink/queue pair
pub fn event_channel() -> (EventSink, EventQueue) {
    mpsc::unbounded_channel()
}

/// Errors surfaced by a radio implementation
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RadioError {
    #[error("Radio unavailable: {0}")]
    Unavailable(String),
    #[error("Radio busy: cannot scan and advertise at the same time")]
    Busy,
    #[error("Radio operation failed: {0}")]
    Failed(String),
}

/// 48-bit Bluetooth device address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct BleAddress(pub [u8; 6]);

impl BleAddress {
    /// Lower-case hex with no separators
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for BleAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            a, b, c, d, e, g
        )
    }
}

/// Advertising PDU type reported with a scan result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AdvKind {
    /// Connectable undirected
    AdvInd,
    /// Connectable directed
    AdvDirectInd,
    /// Scannable undirected
    AdvScanInd,
    /// Non-connectable undirected
    AdvNonconnInd,
    /// Scan response
    ScanRsp,
    Unknown(u8),
}

impl AdvKind {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0x00 => AdvKind::AdvInd,
            0x01 => AdvKind::AdvDirectInd,
            0x02 => AdvKind::AdvScanInd,
            0x03 => AdvKind::AdvNonconnInd,
            0x04 => AdvKind::ScanRsp,
            other => AdvKind::Unknown(other),
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            AdvKind::AdvInd => 0x00,
            AdvKind::AdvDirectInd => 0x01,
            AdvKind::AdvScanInd => 0x02,
            AdvKind::AdvNonconnInd => 0x03,
            AdvKind::ScanRsp => 0x04,
            AdvKind::Unknown(other) => *other,
        }
    }
}

/// Notifications delivered by the radio
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioEvent {
    ScanResult {
        addr: BleAddress,
        adv_type: AdvKind,
        rssi: i8,
        payload: Vec<u8>,
    },
    ScanComplete,
    CentralConnect {
        conn_handle: u16,
    },
    CentralDisconnect {
        conn_handle: u16,
    },
}

impl fmt::Display for RadioEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RadioEvent::ScanResult {
                addr,
                adv_type,
                rssi,
                payload,
            } => write!(
                f,
                "ScanResult {{ addr: {}, adv_type: {:?}, rssi: {}, payload_len: {} }}",
                addr,
                adv_type,
                rssi,
                payload.len()
            ),
            RadioEvent::ScanComplete => write!(f, "ScanComplete"),
            RadioEvent::CentralConnect { conn_handle } => {
                write!(f, "CentralConnect {{ conn_handle: {} }}", conn_handle)
            }
            RadioEvent::CentralDisconnect { conn_handle } => {
                write!(f, "CentralDisconnect {{ conn_handle: {} }}", conn_handle)
            }
        }
    }
}

/// BLE radio operations the relay core depends on
///
/// Implemented by platform code (a HAL binding, a host controller
/// interface) or by the in-memory radios in this module.
#[async_trait]
pub trait Radio: Send + Sync {
    /// Power up the controller
    async fn activate(&self) -> Result<(), RadioError>;

    /// Register the queue notifications are pushed into, replacing any previous one
    fn set_event_sink(&self, sink: EventSink);

    /// Scan for `duration`, listening for `window` out of every `interval`.
    /// `ScanComplete` is delivered when the duration elapses or the scan is stopped.
    async fn start_scan(
        &self,
        duration: Duration,
        interval: Duration,
        window: Duration,
    ) -> Result<(), RadioError>;

    async fn stop_scan(&self) -> Result<(), RadioError>;

    /// Advertise `payload` every `interval` until stopped
    async fn start_advertise(&self, interval: Duration, payload: &[u8]) -> Result<(), RadioError>;

    async fn stop_advertise(&self) -> Result<(), RadioError>;
}
