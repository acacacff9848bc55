//! Advertisement codec — TLV payloads carried in BLE advertising PDUs
//!
//! This module provides:
//! - FieldRecord / FieldWalk: the raw `[length][type][value]` record walk
//! - TagScheme: versioned tag tables for the two protocol generations
//! - AdvertisementPacket: typed encode/decode with declared field widths
//!
//! Format:
//! ```text
//! [1 byte]  length = 1 + N
//! [1 byte]  type tag
//! [N bytes] value
//! ```
//! Records are concatenated with no terminator. A zero length byte marks the
//! start of padding and ends the walk; anything but zeros after it makes the
//! payload malformed.

pub mod field;
pub mod packet;
pub mod tag;

pub use field::{decode_field, FieldRecord, FieldWalk};
pub use packet::{
    decode_device_type, decode_distance, decode_hop_count, decode_manufacturer,
    decode_message_id, decode_name, decode_sender, decode_services, AdvertisementPacket,
    DecodedPacket, ManufacturerId, Name, ServiceUuid,
};
pub use tag::{FieldKind, TagScheme};

use thiserror::Error;

/// Legacy advertising payload ceiling
pub const MAX_LEGACY_ADV_PAYLOAD: usize = 31;

/// Largest value a single record can hold (length byte covers the type byte too)
pub const MAX_FIELD_VALUE: usize = u8::MAX as usize - 1;

/// Advertisement codec errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AdvError {
    #[error("Malformed payload: record at offset {offset} claims {length} bytes, {available} available")]
    MalformedPayload {
        offset: usize,
        length: usize,
        available: usize,
    },

    #[error("Unexpected width for {field}: expected {expected} bytes, got {actual}")]
    UnexpectedFieldWidth {
        field: FieldKind,
        expected: usize,
        actual: usize,
    },

    #[error("Non-zero byte at offset {offset} after zero padding")]
    DataAfterPadding { offset: usize },

    #[error("Value {value} does not fit {field} (max {max})")]
    ValueOutOfRange { field: FieldKind, value: u16, max: u16 },

    #[error("Payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("Field {0} is not representable in tag scheme {1}")]
    UnsupportedField(FieldKind, TagScheme),

    #[error("Name is not valid UTF-8")]
    InvalidUtf8,
}
