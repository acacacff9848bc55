/// Raw TLV record walk over an advertisement payload
///
/// The walk never reads outside the buffer. A record whose length byte runs
/// past the end stops the walk; everything parsed before it is kept and the
/// walk is flagged malformed so the packet is never relayed. The same holds
/// for data hidden behind zero padding.

use super::{AdvError, MAX_FIELD_VALUE};

/// One `[length][type][value]` unit borrowed from a payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldRecord<'a> {
    /// Byte offset of the length byte within the payload
    pub offset: usize,
    /// Type tag
    pub tag: u8,
    /// Value bytes (length - 1 of them)
    pub value: &'a [u8],
}

impl<'a> FieldRecord<'a> {
    /// The length byte as it appears on the wire
    pub fn length(&self) -> usize {
        1 + self.value.len()
    }

    /// Append a record to `buf`
    pub fn write(buf: &mut Vec<u8>, tag: u8, value: &[u8]) -> Result<(), AdvError> {
        if value.len() > MAX_FIELD_VALUE {
            return Err(AdvError::PayloadTooLarge {
                size: value.len(),
                max: MAX_FIELD_VALUE,
            });
        }
        buf.push((value.len() + 1) as u8);
        buf.push(tag);
        buf.extend_from_slice(value);
        Ok(())
    }
}

/// Result of walking a payload: the records that parsed, plus the reason the
/// walk stopped early if it did
#[derive(Debug, Clone, PartialEq)]
pub struct FieldWalk<'a> {
    pub records: Vec<FieldRecord<'a>>,
    pub error: Option<AdvError>,
}

impl<'a> FieldWalk<'a> {
    /// Walk every record in `payload`
    ///
    /// A zero length byte ends the significant part of the payload (radios
    /// hand over zero-padded buffers) and is not an error as long as only
    /// zeros follow it. Nor is a lone trailing length byte with no type byte
    /// after it.
    pub fn parse(payload: &'a [u8]) -> Self {
        let mut records = Vec::new();
        let mut i = 0usize;

        while i + 1 < payload.len() {
            let length = payload[i] as usize;
            if length == 0 {
                let error = payload[i..]
                    .iter()
                    .position(|b| *b != 0)
                    .map(|stray| AdvError::DataAfterPadding { offset: i + stray });
                return Self { records, error };
            }

            let end = i + 1 + length;
            if end > payload.len() {
                return Self {
                    records,
                    error: Some(AdvError::MalformedPayload {
                        offset: i,
                        length,
                        available: payload.len() - i - 1,
                    }),
                };
            }

            records.push(FieldRecord {
                offset: i,
                tag: payload[i + 1],
                value: &payload[i + 2..end],
            });
            i = end;
        }

        Self {
            records,
            error: None,
        }
    }

    /// Whether the walk stopped on a malformed record
    pub fn is_malformed(&self) -> bool {
        self.error.is_some()
    }

    /// Value slices of every record carrying `tag`, in payload order
    pub fn values(&self, tag: u8) -> Vec<&'a [u8]> {
        self.records
            .iter()
            .filter(|r| r.tag == tag)
            .map(|r| r.value)
            .collect()
    }

    /// Value of the first record carrying `tag`
    pub fn first(&self, tag: u8) -> Option<&'a [u8]> {
        self.records.iter().find(|r| r.tag == tag).map(|r| r.value)
    }
}

/// Collect every value tagged `tag`, keeping the malformed marker if the walk
/// stopped early
pub fn decode_field(payload: &[u8], tag: u8) -> FieldWalk<'_> {
    let walk = FieldWalk::parse(payload);
    FieldWalk {
        records: walk.records.into_iter().filter(|r| r.tag == tag).collect(),
        error: walk.error,
    }
}
