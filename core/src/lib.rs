// HopMesh Core — hop-limited flood relay over BLE advertisements
//
// A node overhears advertisements, keeps the ones tagged with its target
// identifier that still have hops left and have not been seen recently, and
// puts each back on air with one hop less.

pub mod advert;
pub mod broadcaster;
pub mod ledger;
pub mod radio;
pub mod relay;
pub mod scanner;

// ============================================================================
// RE-EXPORTS
// ============================================================================

pub use advert::{
    AdvError, AdvertisementPacket, DecodedPacket, FieldKind, ManufacturerId, Name, ServiceUuid,
    TagScheme, MAX_LEGACY_ADV_PAYLOAD,
};
pub use broadcaster::{AdvertiseConfig, BroadcastError, Broadcaster};
pub use ledger::{SeenLedger, DEFAULT_LEDGER_CAPACITY, MAX_LEDGER_CAPACITY};
pub use radio::{
    event_channel, AdvKind, BleAddress, EventQueue, EventSink, Radio, RadioError, RadioEvent,
    ScriptedRadio, SimRadio, SimulatedAir,
};
pub use relay::{CycleReport, HopPolicy, RelayConfig, RelayEngine, RelayError, RelayState, RelayStats};
pub use scanner::{
    DropReason, DropStats, ScanConfig, ScanEnd, ScanResult, Scanner, ScannerError, ScannerState,
    DEFAULT_TARGET_ID,
};
