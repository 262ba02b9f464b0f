//! Header metadata: primer packs, index table segments and the header
//! metadata encoder used when writing files.

use crate::error::{MrxError, Result};
use crate::klv::{local_set_items, write_local_set, Klv};
use crate::types::Umid;
use crate::ul::{dotted_hex, labels, UL};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{Cursor, Read};

/// Primer map: local tag (4 hex digits) to dotted-hex UL.
pub type PrimerMap = BTreeMap<String, String>;

/// Decoded index table: field name to value.
pub type IndexTable = BTreeMap<String, IndexValue>;

/// Primer pack for local tag mapping
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrimerPack {
    /// Local tag to UL mapping
    pub mappings: Vec<(u16, UL)>,
}

impl PrimerPack {
    /// Create new primer pack with the tags the header metadata encoder uses
    pub fn new() -> Self {
        PrimerPack {
            mappings: vec![
                (tags::INSTANCE_UID, *b"\x06\x0E\x2B\x34\x01\x01\x01\x01\x01\x01\x15\x02\x00\x00\x00\x00"),
                (tags::GENERATION_UID, *b"\x06\x0E\x2B\x34\x01\x01\x01\x02\x05\x20\x07\x01\x08\x00\x00\x00"),
                (tags::LAST_MODIFIED_DATE, *b"\x06\x0E\x2B\x34\x01\x01\x01\x02\x07\x02\x01\x10\x02\x04\x00\x00"),
                (tags::VERSION, *b"\x06\x0E\x2B\x34\x01\x01\x01\x02\x03\x01\x02\x01\x05\x00\x00\x00"),
                (tags::OPERATIONAL_PATTERN, *b"\x06\x0E\x2B\x34\x01\x01\x01\x05\x01\x02\x02\x03\x00\x00\x00\x00"),
                (tags::ESSENCE_CONTAINERS, *b"\x06\x0E\x2B\x34\x01\x01\x01\x05\x01\x02\x02\x10\x02\x01\x00\x00"),
                (tags::PACKAGE_UID, *b"\x06\x0E\x2B\x34\x01\x01\x01\x01\x01\x01\x15\x10\x00\x00\x00\x00"),
            ],
        }
    }

    /// Add mapping
    pub fn add(&mut self, tag: u16, ul: UL) {
        if !self.mappings.iter().any(|(t, _)| *t == tag) {
            self.mappings.push((tag, ul));
        }
    }

    /// Lookup UL by tag
    pub fn lookup(&self, tag: u16) -> Option<&UL> {
        self.mappings.iter().find(|(t, _)| *t == tag).map(|(_, ul)| ul)
    }

    /// Decode a primer pack value: batch count, item size (18), then `(tag, UL)` pairs.
    pub fn parse(value: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(value);
        let count = cursor.read_u32::<BigEndian>()? as usize;
        let item_size = cursor.read_u32::<BigEndian>()? as usize;
        if item_size != 18 {
            return Err(MrxError::invalid_klv(
                0,
                format!("primer pack item size {}, expected 18", item_size),
            ));
        }

        let needed = 8 + count * item_size;
        if value.len() < needed {
            return Err(MrxError::InsufficientData {
                needed,
                available: value.len(),
            });
        }

        let mut mappings = Vec::with_capacity(count);
        for _ in 0..count {
            let tag = cursor.read_u16::<BigEndian>()?;
            let mut ul = [0u8; 16];
            cursor.read_exact(&mut ul)?;
            mappings.push((tag, ul));
        }
        Ok(PrimerPack { mappings })
    }

    /// Encode as a KLV
    pub fn to_klv(&self) -> Result<Klv> {
        let mut value = Vec::with_capacity(8 + self.mappings.len() * 18);
        value.write_u32::<BigEndian>(self.mappings.len() as u32)?;
        value.write_u32::<BigEndian>(18)?;
        for (tag, ul) in &self.mappings {
            value.write_u16::<BigEndian>(*tag)?;
            value.extend_from_slice(ul);
        }
        Ok(Klv::new(labels::PRIMER_PACK, value))
    }

    /// Text form used by the decoder
    pub fn to_map(&self) -> PrimerMap {
        self.mappings
            .iter()
            .map(|(tag, ul)| (format!("{:04x}", tag), dotted_hex(ul)))
            .collect()
    }
}

/// Local tags
pub mod tags {
    /// Instance UID
    pub const INSTANCE_UID: u16 = 0x3C0A;
    /// Generation UID
    pub const GENERATION_UID: u16 = 0x0102;
    /// Last modified date
    pub const LAST_MODIFIED_DATE: u16 = 0x3B02;
    /// Version
    pub const VERSION: u16 = 0x3B05;
    /// Operational pattern
    pub const OPERATIONAL_PATTERN: u16 = 0x3B09;
    /// Essence containers
    pub const ESSENCE_CONTAINERS: u16 = 0x3B0A;
    /// Package UID
    pub const PACKAGE_UID: u16 = 0x4401;

    /// Index edit rate
    pub const INDEX_EDIT_RATE: u16 = 0x3F0B;
    /// Index start position
    pub const INDEX_START_POSITION: u16 = 0x3F0C;
    /// Index duration
    pub const INDEX_DURATION: u16 = 0x3F0D;
    /// Edit unit byte count
    pub const EDIT_UNIT_BYTE_COUNT: u16 = 0x3F05;
    /// Index SID
    pub const INDEX_SID: u16 = 0x3F06;
    /// Body SID
    pub const BODY_SID: u16 = 0x3F07;
    /// Slice count
    pub const SLICE_COUNT: u16 = 0x3F08;
    /// Delta entry array
    pub const DELTA_ENTRY_ARRAY: u16 = 0x3F09;
    /// Index entry array
    pub const INDEX_ENTRY_ARRAY: u16 = 0x3F0A;
    /// Pos table count
    pub const POS_TABLE_COUNT: u16 = 0x3F0E;
    /// Ext start offset
    pub const EXT_START_OFFSET: u16 = 0x3F0F;
    /// VBE byte count
    pub const VBE_BYTE_COUNT: u16 = 0x3F10;
}

/// A decoded index table field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IndexValue {
    /// Unsigned integer field
    Unsigned(u64),
    /// Signed integer field
    Signed(i64),
    /// Anything rendered as text (rationals, UIDs, unknown fields)
    Text(String),
}

fn be_unsigned(value: &[u8]) -> Option<u64> {
    (1..=8)
        .contains(&value.len())
        .then(|| value.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64))
}

fn be_signed(value: &[u8]) -> Option<i64> {
    let bytes: [u8; 8] = value.try_into().ok()?;
    Some(i64::from_be_bytes(bytes))
}

fn batch_len(value: &[u8]) -> Option<u32> {
    let mut cursor = Cursor::new(value);
    cursor.read_u32::<BigEndian>().ok()
}

/// Decode an index table segment local set into named fields.
///
/// Tags outside the index table set are named through `primer` when it
/// knows them, and rendered as hex.
pub fn decode_index_table(value: &[u8], primer: &PrimerMap) -> Result<IndexTable> {
    let mut table = IndexTable::new();

    for (tag, field) in local_set_items(value)? {
        let (name, decoded) = match tag {
            tags::INSTANCE_UID => ("InstanceID".to_string(), IndexValue::Text(dotted_hex(field))),
            tags::INDEX_EDIT_RATE if field.len() == 8 => {
                let num = i32::from_be_bytes([field[0], field[1], field[2], field[3]]);
                let den = i32::from_be_bytes([field[4], field[5], field[6], field[7]]);
                ("IndexEditRate".to_string(), IndexValue::Text(format!("{}/{}", num, den)))
            }
            tags::INDEX_START_POSITION | tags::INDEX_DURATION => {
                let name = if tag == tags::INDEX_START_POSITION {
                    "IndexStartPosition"
                } else {
                    "IndexDuration"
                };
                match be_signed(field) {
                    Some(v) => (name.to_string(), IndexValue::Signed(v)),
                    None => (name.to_string(), IndexValue::Text(dotted_hex(field))),
                }
            }
            tags::DELTA_ENTRY_ARRAY | tags::INDEX_ENTRY_ARRAY => {
                let name = if tag == tags::DELTA_ENTRY_ARRAY {
                    "DeltaEntryCount"
                } else {
                    "IndexEntryCount"
                };
                let count = batch_len(field).unwrap_or(0);
                (name.to_string(), IndexValue::Unsigned(count as u64))
            }
            tags::EDIT_UNIT_BYTE_COUNT
            | tags::INDEX_SID
            | tags::BODY_SID
            | tags::SLICE_COUNT
            | tags::POS_TABLE_COUNT
            | tags::EXT_START_OFFSET
            | tags::VBE_BYTE_COUNT => {
                let name = match tag {
                    tags::EDIT_UNIT_BYTE_COUNT => "EditUnitByteCount",
                    tags::INDEX_SID => "IndexSID",
                    tags::BODY_SID => "BodySID",
                    tags::SLICE_COUNT => "SliceCount",
                    tags::POS_TABLE_COUNT => "PosTableCount",
                    tags::EXT_START_OFFSET => "ExtStartOffset",
                    _ => "VBEByteCount",
                };
                match be_unsigned(field) {
                    Some(v) => (name.to_string(), IndexValue::Unsigned(v)),
                    None => (name.to_string(), IndexValue::Text(dotted_hex(field))),
                }
            }
            other => {
                let tag_text = format!("{:04x}", other);
                let name = match primer.get(&tag_text) {
                    Some(ul) => ul.clone(),
                    None => format!("Tag{}", tag_text),
                };
                (name, IndexValue::Text(dotted_hex(field)))
            }
        };
        table.insert(name, decoded);
    }

    tracing::debug!(fields = table.len(), "decoded index table segment");
    Ok(table)
}

/// What a [`GroupEncoder`] gets to describe the file being written.
#[derive(Debug, Clone)]
pub struct HeaderContext {
    /// Material package UMID, shared with the manifest
    pub umid: Umid,
    /// Operational pattern label
    pub operational_pattern: UL,
    /// Essence container labels of every stream
    pub essence_containers: Vec<UL>,
}

/// Produces the header metadata bytes that follow the header partition pack.
///
/// The descriptive metadata model lives outside this crate; the encoder only
/// needs the encoded bytes, whose length becomes the header byte count.
pub trait GroupEncoder: Send + Sync {
    /// Encode primer pack and metadata sets.
    fn encode_header_metadata(&self, context: &HeaderContext) -> Result<Vec<u8>>;
}

/// Built-in header metadata: primer pack, preface, content storage and
/// material package.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeaderMetadata;

impl HeaderMetadata {
    fn preface(&self, context: &HeaderContext) -> Result<Klv> {
        let mut value = Vec::new();
        write_local_set(&mut value, tags::INSTANCE_UID, uuid::Uuid::new_v4().as_bytes())?;
        write_local_set(&mut value, tags::GENERATION_UID, uuid::Uuid::new_v4().as_bytes())?;
        write_local_set(&mut value, tags::LAST_MODIFIED_DATE, &timestamp_bytes())?;
        write_local_set(&mut value, tags::VERSION, &0x0103u16.to_be_bytes())?;
        write_local_set(&mut value, tags::OPERATIONAL_PATTERN, &context.operational_pattern)?;

        let mut batch = Vec::with_capacity(8 + context.essence_containers.len() * 16);
        batch.write_u32::<BigEndian>(context.essence_containers.len() as u32)?;
        batch.write_u32::<BigEndian>(16)?;
        for ul in &context.essence_containers {
            batch.extend_from_slice(ul);
        }
        write_local_set(&mut value, tags::ESSENCE_CONTAINERS, &batch)?;

        Ok(Klv::new(labels::PREFACE, value))
    }

    fn content_storage(&self) -> Result<Klv> {
        let mut value = Vec::new();
        write_local_set(&mut value, tags::INSTANCE_UID, uuid::Uuid::new_v4().as_bytes())?;
        Ok(Klv::new(labels::CONTENT_STORAGE, value))
    }

    fn material_package(&self, context: &HeaderContext) -> Result<Klv> {
        let mut value = Vec::new();
        write_local_set(&mut value, tags::INSTANCE_UID, uuid::Uuid::new_v4().as_bytes())?;
        write_local_set(&mut value, tags::PACKAGE_UID, &context.umid.0)?;
        Ok(Klv::new(labels::MATERIAL_PACKAGE, value))
    }
}

impl GroupEncoder for HeaderMetadata {
    fn encode_header_metadata(&self, context: &HeaderContext) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        for klv in [
            PrimerPack::new().to_klv()?,
            self.preface(context)?,
            self.content_storage()?,
            self.material_package(context)?,
        ] {
            klv.write(&mut out)?;
        }
        Ok(out)
    }
}

/// SMPTE timestamp: year (u16), month, day, hour, minute, second, quarter-milliseconds.
fn timestamp_bytes() -> [u8; 8] {
    use chrono::{Datelike, Timelike, Utc};

    let now = Utc::now();
    let year = (now.year().clamp(0, u16::MAX as i32) as u16).to_be_bytes();
    [
        year[0],
        year[1],
        now.month() as u8,
        now.day() as u8,
        now.hour() as u8,
        now.minute() as u8,
        now.second() as u8,
        (now.timestamp_subsec_millis() / 4) as u8,
    ]
}
