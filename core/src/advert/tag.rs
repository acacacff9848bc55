/// Advertisement type tags and the versioned tag tables
///
/// Two generations of the protocol assign different tag bytes to the same
/// logical fields, and the first generation packs every integer into a
/// single byte. A node speaks exactly one `TagScheme`; every encode and
/// decode call names the scheme it uses so the two are never mixed.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Logical field carried in an advertisement record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldKind {
    /// Manufacturer specific data (target identifier)
    Manufacturer,
    /// Complete list of 16-bit service UUIDs
    Uuid16,
    /// Complete list of 32-bit service UUIDs
    Uuid32,
    /// Complete list of 128-bit service UUIDs
    Uuid128,
    /// Integer node name
    NameId,
    /// UTF-8 node name
    NameText,
    /// Remaining relay budget
    HopCount,
    /// IEEE-754 single precision distance
    Distance,
    /// Originator id
    Sender,
    /// Dedup key
    MessageId,
    /// One byte device class
    DeviceType,
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldKind::Manufacturer => "manufacturer",
            FieldKind::Uuid16 => "uuid16",
            FieldKind::Uuid32 => "uuid32",
            FieldKind::Uuid128 => "uuid128",
            FieldKind::NameId => "name_id",
            FieldKind::NameText => "name_text",
            FieldKind::HopCount => "hop_count",
            FieldKind::Distance => "distance",
            FieldKind::Sender => "sender",
            FieldKind::MessageId => "message_id",
            FieldKind::DeviceType => "device_type",
        };
        write!(f, "{}", name)
    }
}

/// Versioned tag table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TagScheme {
    /// First generation firmware. Integers are one byte wide, text and
    /// integer names share one tag and there is no device type field.
    Legacy,
    /// Refined table, message id moved to 0x18
    #[default]
    V2,
}

impl TagScheme {
    /// Tag byte for a field, `None` if this scheme cannot carry it
    pub fn tag(&self, kind: FieldKind) -> Option<u8> {
        match self {
            TagScheme::Legacy => match kind {
                FieldKind::Manufacturer => Some(0xFF),
                FieldKind::Uuid16 => Some(0x03),
                FieldKind::Uuid32 => Some(0x05),
                FieldKind::Uuid128 => Some(0x07),
                FieldKind::NameId | FieldKind::NameText => Some(0x02),
                FieldKind::HopCount => Some(0x09),
                FieldKind::Distance => Some(0x06),
                FieldKind::Sender => Some(0x08),
                FieldKind::MessageId => Some(0x04),
                FieldKind::DeviceType => None,
            },
            TagScheme::V2 => match kind {
                FieldKind::Manufacturer => Some(0xFF),
                FieldKind::Uuid16 => Some(0x03),
                FieldKind::Uuid32 => Some(0x05),
                FieldKind::Uuid128 => Some(0x07),
                FieldKind::NameId => Some(0x08),
                FieldKind::NameText => Some(0x09),
                FieldKind::HopCount => Some(0x15),
                FieldKind::Distance => Some(0x16),
                FieldKind::Sender => Some(0x17),
                FieldKind::MessageId => Some(0x18),
                FieldKind::DeviceType => Some(0x19),
            },
        }
    }

    /// Declared value width in bytes, `None` for variable width fields
    pub fn width(&self, kind: FieldKind) -> Option<usize> {
        match kind {
            FieldKind::Manufacturer => Some(2),
            FieldKind::Uuid16 => Some(2),
            FieldKind::Uuid32 => Some(4),
            FieldKind::Uuid128 => Some(16),
            FieldKind::NameText => None,
            FieldKind::HopCount | FieldKind::DeviceType => Some(1),
            FieldKind::Distance => Some(4),
            FieldKind::NameId | FieldKind::Sender | FieldKind::MessageId => match self {
                TagScheme::Legacy => Some(1),
                TagScheme::V2 => Some(2),
            },
        }
    }

    /// Largest integer an id field (name, sender, message id) can carry
    pub fn max_id(&self) -> u16 {
        match self {
            TagScheme::Legacy => u8::MAX as u16,
            TagScheme::V2 => u16::MAX,
        }
    }

    /// Whether text and integer names share a tag and must be told apart by width
    pub fn shares_name_tag(&self) -> bool {
        matches!(self, TagScheme::Legacy)
    }

    /// Numeric version, used in logs and the CLI config
    pub fn version(&self) -> u8 {
        match self {
            TagScheme::Legacy => 1,
            TagScheme::V2 => 2,
        }
    }

    /// Look up a scheme by numeric version
    pub fn from_version(version: u8) -> Option<Self> {
        match version {
            1 => Some(TagScheme::Legacy),
            2 => Some(TagScheme::V2),
            _ => None,
        }
    }
}

impl fmt::Display for TagScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.version())
    }
}
