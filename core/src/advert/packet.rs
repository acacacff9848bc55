/// Typed advertisement packet with declared per-field widths
///
/// Every field is optional; an absent field is omitted from the TLV stream
/// and a present zero is encoded as zero. Decoding never fails outright: it
/// returns whatever fields it could interpret plus a list of issues, and
/// marks the packet malformed if the record walk itself broke.

use super::field::{FieldRecord, FieldWalk};
use super::tag::{FieldKind, TagScheme};
use super::{AdvError, MAX_LEGACY_ADV_PAYLOAD};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Two byte target identifier carried as manufacturer data (little-endian,
/// like a Bluetooth company id)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ManufacturerId(pub u16);

impl ManufacturerId {
    pub fn to_bytes(self) -> [u8; 2] {
        self.0.to_le_bytes()
    }

    pub fn from_bytes(bytes: [u8; 2]) -> Self {
        Self(u16::from_le_bytes(bytes))
    }
}

impl fmt::Display for ManufacturerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04X}", self.0)
    }
}

/// Node name, either a compact integer or UTF-8 text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Name {
    Id(u16),
    Text(String),
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Name::Id(id) => write!(f, "0x{:04X}", id),
            Name::Text(text) => write!(f, "{}", text),
        }
    }
}

/// Advertised service UUID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServiceUuid {
    /// 16-bit assigned number
    Short(u16),
    /// 32-bit assigned number
    Medium(u32),
    /// Full 128-bit UUID
    Long(Uuid),
}

impl ServiceUuid {
    fn kind(&self) -> FieldKind {
        match self {
            ServiceUuid::Short(_) => FieldKind::Uuid16,
            ServiceUuid::Medium(_) => FieldKind::Uuid32,
            ServiceUuid::Long(_) => FieldKind::Uuid128,
        }
    }

    /// Wire bytes, little-endian as BLE transmits them
    fn to_wire(self) -> Vec<u8> {
        match self {
            ServiceUuid::Short(v) => v.to_le_bytes().to_vec(),
            ServiceUuid::Medium(v) => v.to_le_bytes().to_vec(),
            ServiceUuid::Long(uuid) => {
                let mut bytes = *uuid.as_bytes();
                bytes.reverse();
                bytes.to_vec()
            }
        }
    }

    fn from_wire(kind: FieldKind, value: &[u8]) -> Result<Self, AdvError> {
        let width_error = |expected| AdvError::UnexpectedFieldWidth {
            field: kind,
            expected,
            actual: value.len(),
        };
        match kind {
            FieldKind::Uuid16 => <[u8; 2]>::try_from(value)
                .map(|b| ServiceUuid::Short(u16::from_le_bytes(b)))
                .map_err(|_| width_error(2)),
            FieldKind::Uuid32 => <[u8; 4]>::try_from(value)
                .map(|b| ServiceUuid::Medium(u32::from_le_bytes(b)))
                .map_err(|_| width_error(4)),
            _ => <[u8; 16]>::try_from(value)
                .map(|mut b| {
                    b.reverse();
                    ServiceUuid::Long(Uuid::from_bytes(b))
                })
                .map_err(|_| width_error(16)),
        }
    }
}

/// Logical flood message carried in one advertisement
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdvertisementPacket {
    pub manufacturer: Option<ManufacturerId>,
    /// Emitted grouped by width: 16-bit, then 32-bit, then 128-bit
    pub services: Vec<ServiceUuid>,
    pub name: Option<Name>,
    pub hop_count: Option<u8>,
    pub distance: Option<f32>,
    pub sender: Option<u16>,
    pub message_id: Option<u16>,
    pub device_type: Option<u8>,
}

impl AdvertisementPacket {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_manufacturer(mut self, id: ManufacturerId) -> Self {
        self.manufacturer = Some(id);
        self
    }

    pub fn with_service(mut self, uuid: ServiceUuid) -> Self {
        self.services.push(uuid);
        self
    }

    pub fn with_name(mut self, name: Name) -> Self {
        self.name = Some(name);
        self
    }

    pub fn with_hop_count(mut self, hops: u8) -> Self {
        self.hop_count = Some(hops);
        self
    }

    pub fn with_distance(mut self, distance: f32) -> Self {
        self.distance = Some(distance);
        self
    }

    pub fn with_sender(mut self, sender: u16) -> Self {
        self.sender = Some(sender);
        self
    }

    pub fn with_message_id(mut self, id: u16) -> Self {
        self.message_id = Some(id);
        self
    }

    pub fn with_device_type(mut self, device_type: u8) -> Self {
        self.device_type = Some(device_type);
        self
    }

    /// Encode against the legacy 31 byte advertising ceiling
    pub fn encode(&self, scheme: TagScheme) -> Result<Vec<u8>, AdvError> {
        self.encode_with_limit(scheme, MAX_LEGACY_ADV_PAYLOAD)
    }

    /// Encode in the fixed emission order, failing if the result exceeds `max_len`
    pub fn encode_with_limit(&self, scheme: TagScheme, max_len: usize) -> Result<Vec<u8>, AdvError> {
        let mut buf = Vec::with_capacity(MAX_LEGACY_ADV_PAYLOAD);

        if let Some(id) = self.manufacturer {
            put(&mut buf, scheme, FieldKind::Manufacturer, &id.to_bytes())?;
        }

        for kind in [FieldKind::Uuid16, FieldKind::Uuid32, FieldKind::Uuid128] {
            for uuid in self.services.iter().filter(|s| s.kind() == kind) {
                put(&mut buf, scheme, kind, &uuid.to_wire())?;
            }
        }

        match &self.name {
            Some(Name::Id(id)) => put_id(&mut buf, scheme, FieldKind::NameId, *id)?,
            Some(Name::Text(text)) => {
                // a text name as wide as an integer name would read back as one
                if scheme.shares_name_tag() && scheme.width(FieldKind::NameId) == Some(text.len()) {
                    return Err(AdvError::UnsupportedField(FieldKind::NameText, scheme));
                }
                put(&mut buf, scheme, FieldKind::NameText, text.as_bytes())?
            }
            None => {}
        }

        if let Some(hops) = self.hop_count {
            put(&mut buf, scheme, FieldKind::HopCount, &[hops])?;
        }
        if let Some(distance) = self.distance {
            put(&mut buf, scheme, FieldKind::Distance, &distance.to_le_bytes())?;
        }
        if let Some(sender) = self.sender {
            put_id(&mut buf, scheme, FieldKind::Sender, sender)?;
        }
        if let Some(id) = self.message_id {
            put_id(&mut buf, scheme, FieldKind::MessageId, id)?;
        }
        if let Some(device_type) = self.device_type {
            put(&mut buf, scheme, FieldKind::DeviceType, &[device_type])?;
        }

        if buf.len() > max_len {
            return Err(AdvError::PayloadTooLarge {
                size: buf.len(),
                max: max_len,
            });
        }

        Ok(buf)
    }

    /// Decode every field the payload carries
    pub fn decode(payload: &[u8], scheme: TagScheme) -> DecodedPacket {
        let walk = FieldWalk::parse(payload);
        let mut issues = Vec::new();

        let mut services = Vec::new();
        for kind in [FieldKind::Uuid16, FieldKind::Uuid32, FieldKind::Uuid128] {
            let Some(tag) = scheme.tag(kind) else { continue };
            for value in walk.values(tag) {
                match ServiceUuid::from_wire(kind, value) {
                    Ok(uuid) => services.push(uuid),
                    Err(e) => issues.push(e),
                }
            }
        }

        let packet = AdvertisementPacket {
            manufacturer: keep(&mut issues, take_manufacturer(&walk, scheme)),
            services,
            name: keep(&mut issues, take_name(&walk, scheme)),
            hop_count: keep(&mut issues, take_u8(&walk, scheme, FieldKind::HopCount)),
            distance: keep(&mut issues, take_distance(&walk, scheme)),
            sender: keep(&mut issues, take_id(&walk, scheme, FieldKind::Sender)),
            message_id: keep(&mut issues, take_id(&walk, scheme, FieldKind::MessageId)),
            device_type: keep(&mut issues, take_u8(&walk, scheme, FieldKind::DeviceType)),
        };

        let malformed = walk.error.is_some();
        if let Some(e) = walk.error {
            issues.push(e);
        }

        DecodedPacket {
            packet,
            issues,
            malformed,
        }
    }
}

/// Outcome of decoding one payload
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedPacket {
    pub packet: AdvertisementPacket,
    /// Width mismatches and the walk error, in the order they were found
    pub issues: Vec<AdvError>,
    /// The record walk stopped on a length running past the buffer or on
    /// data behind zero padding
    pub malformed: bool,
}

impl DecodedPacket {
    /// Only payloads whose record walk completed may be forwarded
    pub fn is_relayable(&self) -> bool {
        !self.malformed
    }
}

fn put(buf: &mut Vec<u8>, scheme: TagScheme, kind: FieldKind, value: &[u8]) -> Result<(), AdvError> {
    let tag = scheme
        .tag(kind)
        .ok_or(AdvError::UnsupportedField(kind, scheme))?;
    FieldRecord::write(buf, tag, value)
}

/// Integer id fields: big-endian u16 under V2, a single byte under Legacy
fn put_id(buf: &mut Vec<u8>, scheme: TagScheme, kind: FieldKind, value: u16) -> Result<(), AdvError> {
    match scheme.width(kind) {
        Some(1) => {
            let byte = u8::try_from(value).map_err(|_| AdvError::ValueOutOfRange {
                field: kind,
                value,
                max: scheme.max_id(),
            })?;
            put(buf, scheme, kind, &[byte])
        }
        _ => put(buf, scheme, kind, &value.to_be_bytes()),
    }
}

fn keep<T>(issues: &mut Vec<AdvError>, result: Result<Option<T>, AdvError>) -> Option<T> {
    match result {
        Ok(value) => value,
        Err(e) => {
            issues.push(e);
            None
        }
    }
}

fn take_fixed<const N: usize>(
    walk: &FieldWalk<'_>,
    scheme: TagScheme,
    kind: FieldKind,
) -> Result<Option<[u8; N]>, AdvError> {
    let Some(tag) = scheme.tag(kind) else {
        return Ok(None);
    };
    match walk.first(tag) {
        None => Ok(None),
        Some(value) => <[u8; N]>::try_from(value)
            .map(Some)
            .map_err(|_| AdvError::UnexpectedFieldWidth {
                field: kind,
                expected: N,
                actual: value.len(),
            }),
    }
}

fn take_u8(walk: &FieldWalk<'_>, scheme: TagScheme, kind: FieldKind) -> Result<Option<u8>, AdvError> {
    Ok(take_fixed::<1>(walk, scheme, kind)?.map(|b| b[0]))
}

fn take_id(walk: &FieldWalk<'_>, scheme: TagScheme, kind: FieldKind) -> Result<Option<u16>, AdvError> {
    match scheme.width(kind) {
        Some(1) => Ok(take_fixed::<1>(walk, scheme, kind)?.map(|b| u16::from(b[0]))),
        _ => Ok(take_fixed::<2>(walk, scheme, kind)?.map(u16::from_be_bytes)),
    }
}

fn take_distance(walk: &FieldWalk<'_>, scheme: TagScheme) -> Result<Option<f32>, AdvError> {
    Ok(take_fixed::<4>(walk, scheme, FieldKind::Distance)?.map(f32::from_le_bytes))
}

fn take_manufacturer(walk: &FieldWalk<'_>, scheme: TagScheme) -> Result<Option<ManufacturerId>, AdvError> {
    Ok(take_fixed::<2>(walk, scheme, FieldKind::Manufacturer)?.map(ManufacturerId::from_bytes))
}

fn take_name(walk: &FieldWalk<'_>, scheme: TagScheme) -> Result<Option<Name>, AdvError> {
    let text = |value: &[u8]| {
        std::str::from_utf8(value)
            .map(|s| Some(Name::Text(s.to_owned())))
            .map_err(|_| AdvError::InvalidUtf8)
    };

    if scheme.shares_name_tag() {
        let Some(tag) = scheme.tag(FieldKind::NameId) else {
            return Ok(None);
        };
        // one byte is an integer name, anything else is text
        return match walk.first(tag) {
            None => Ok(None),
            Some(&[id]) => Ok(Some(Name::Id(u16::from(id)))),
            Some(value) => text(value),
        };
    }

    if let Some(id) = take_id(walk, scheme, FieldKind::NameId)? {
        return Ok(Some(Name::Id(id)));
    }
    match scheme.tag(FieldKind::NameText).and_then(|tag| walk.first(tag)) {
        Some(value) => text(value),
        None => Ok(None),
    }
}

/// Run a typed lookup; a missing field on a walk that broke early reports the break
fn typed<T>(
    payload: &[u8],
    lookup: impl FnOnce(&FieldWalk<'_>) -> Result<Option<T>, AdvError>,
) -> Result<Option<T>, AdvError> {
    let walk = FieldWalk::parse(payload);
    match lookup(&walk)? {
        Some(value) => Ok(Some(value)),
        None => match walk.error {
            Some(e) => Err(e),
            None => Ok(None),
        },
    }
}

pub fn decode_manufacturer(payload: &[u8], scheme: TagScheme) -> Result<Option<ManufacturerId>, AdvError> {
    typed(payload, |walk| take_manufacturer(walk, scheme))
}

pub fn decode_name(payload: &[u8], scheme: TagScheme) -> Result<Option<Name>, AdvError> {
    typed(payload, |walk| take_name(walk, scheme))
}

pub fn decode_hop_count(payload: &[u8], scheme: TagScheme) -> Result<Option<u8>, AdvError> {
    typed(payload, |walk| take_u8(walk, scheme, FieldKind::HopCount))
}

pub fn decode_distance(payload: &[u8], scheme: TagScheme) -> Result<Option<f32>, AdvError> {
    typed(payload, |walk| take_distance(walk, scheme))
}

pub fn decode_sender(payload: &[u8], scheme: TagScheme) -> Result<Option<u16>, AdvError> {
    typed(payload, |walk| take_id(walk, scheme, FieldKind::Sender))
}

pub fn decode_message_id(payload: &[u8], scheme: TagScheme) -> Result<Option<u16>, AdvError> {
    typed(payload, |walk| take_id(walk, scheme, FieldKind::MessageId))
}

pub fn decode_device_type(payload: &[u8], scheme: TagScheme) -> Result<Option<u8>, AdvError> {
    typed(payload, |walk| take_u8(walk, scheme, FieldKind::DeviceType))
}

/// All advertised services; the first record with the wrong width is an error
pub fn decode_services(payload: &[u8], scheme: TagScheme) -> Result<Vec<ServiceUuid>, AdvError> {
    let walk = FieldWalk::parse(payload);
    let mut services = Vec::new();
    for kind in [FieldKind::Uuid16, FieldKind::Uuid32, FieldKind::Uuid128] {
        let Some(tag) = scheme.tag(kind) else { continue };
        for value in walk.values(tag) {
            services.push(ServiceUuid::from_wire(kind, value)?);
        }
    }
    Ok(services)
}
