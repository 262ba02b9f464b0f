//! MRX partition handling
//!
//! MRX files are divided into partitions:
//! - Header partition (required)
//! - Body and generic-stream partitions carrying essence
//! - Footer partition (required for closed/complete files)
//!
//! and end with a Random Index Pack listing every partition's offset.

use crate::ber::{ber_decode, ber_encode, ber_encode_fixed};
use crate::error::{MrxError, Result};
use crate::ul::{labels, UniversalLabel, UL};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};
use std::io::{Cursor, Read};

/// Size of the fixed part of a partition pack value.
pub const FIXED_BODY_SIZE: usize = 64;

/// Size of the length token written in front of every partition pack value.
pub const PARTITION_LENGTH_TOKEN: usize = 4;

/// Partition kind, from byte 13 of the partition pack key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartitionKind {
    /// Header partition
    Header,
    /// Body partition
    Body,
    /// Footer partition
    Footer,
    /// Unrecognised partition type byte
    Invalid,
}

impl PartitionKind {
    /// Kind for a partition pack key.
    pub fn from_key(key: &UniversalLabel) -> Self {
        match key.as_bytes()[13] {
            0x02 => PartitionKind::Header,
            0x03 => PartitionKind::Body,
            0x04 => PartitionKind::Footer,
            _ => PartitionKind::Invalid,
        }
    }
}

/// Partition status, from byte 14 of the partition pack key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionStatus {
    /// Open and incomplete
    OpenIncomplete,
    /// Closed and incomplete
    ClosedIncomplete,
    /// Open and complete
    OpenComplete,
    /// Closed and complete
    ClosedComplete,
    /// Generic stream partition
    GenericStream,
    /// Any other status byte
    Unknown(u8),
}

impl PartitionStatus {
    /// Status for a partition pack key.
    pub fn from_key(key: &UniversalLabel) -> Self {
        match key.as_bytes()[14] {
            0x01 => PartitionStatus::OpenIncomplete,
            0x02 => PartitionStatus::ClosedIncomplete,
            0x03 => PartitionStatus::OpenComplete,
            0x04 => PartitionStatus::ClosedComplete,
            0x11 => PartitionStatus::GenericStream,
            other => PartitionStatus::Unknown(other),
        }
    }
}

/// Partition pack
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionPack {
    /// Partition pack key
    pub key: UL,
    /// Major version (should be 1)
    pub major_version: u16,
    /// Minor version (should be 2 or 3)
    pub minor_version: u16,
    /// KAG size (key alignment grid)
    pub kag_size: u32,
    /// This partition offset in file
    pub this_partition: u64,
    /// Previous partition offset
    pub previous_partition: u64,
    /// Footer partition offset
    pub footer_partition: u64,
    /// Header byte count (bytes of header metadata after the pack)
    pub header_byte_count: u64,
    /// Index byte count
    pub index_byte_count: u64,
    /// Index SID (stream ID for index)
    pub index_sid: u32,
    /// Body offset (for body partitions)
    pub body_offset: u64,
    /// Body SID (stream ID for essence)
    pub body_sid: u32,
    /// Operational pattern
    pub operational_pattern: UL,
    /// Essence container labels
    pub essence_containers: Vec<UL>,
}

impl Default for PartitionPack {
    fn default() -> Self {
        PartitionPack {
            key: labels::HEADER_PARTITION_CLOSED_COMPLETE,
            major_version: 1,
            minor_version: 3,
            kag_size: 1,
            this_partition: 0,
            previous_partition: 0,
            footer_partition: 0,
            header_byte_count: 0,
            index_byte_count: 0,
            index_sid: 0,
            body_offset: 0,
            body_sid: 0,
            operational_pattern: labels::OP1A,
            essence_containers: Vec::new(),
        }
    }
}

impl PartitionPack {
    /// Create header partition
    pub fn header() -> Self {
        PartitionPack::default()
    }

    /// Create body partition
    pub fn body(body_sid: u32) -> Self {
        PartitionPack {
            key: labels::BODY_PARTITION_CLOSED_COMPLETE,
            body_sid,
            ..Default::default()
        }
    }

    /// Create generic stream partition
    pub fn generic_stream(body_sid: u32) -> Self {
        PartitionPack {
            key: labels::GENERIC_STREAM_PARTITION,
            body_sid,
            ..Default::default()
        }
    }

    /// Create footer partition
    pub fn footer() -> Self {
        PartitionPack {
            key: labels::FOOTER_PARTITION,
            ..Default::default()
        }
    }

    /// Partition kind from the key
    pub fn kind(&self) -> PartitionKind {
        PartitionKind::from_key(&UniversalLabel(self.key))
    }

    /// Partition status from the key
    pub fn status(&self) -> PartitionStatus {
        PartitionStatus::from_key(&UniversalLabel(self.key))
    }

    /// Parse a partition pack from its key and value.
    ///
    /// The 64-byte fixed body is required; the operational pattern and the
    /// essence container batch are read when present.
    pub fn parse(key: &UniversalLabel, value: &[u8]) -> Result<Self> {
        if !key.is_smpte() {
            return Err(MrxError::invalid_partition(format!(
                "bad partition key signature {}",
                key
            )));
        }
        if value.len() < FIXED_BODY_SIZE {
            return Err(MrxError::InsufficientData {
                needed: FIXED_BODY_SIZE,
                available: value.len(),
            });
        }

        let mut cursor = Cursor::new(value);
        let major_version = cursor.read_u16::<BigEndian>()?;
        let minor_version = cursor.read_u16::<BigEndian>()?;
        let kag_size = cursor.read_u32::<BigEndian>()?;
        let this_partition = cursor.read_u64::<BigEndian>()?;
        let previous_partition = cursor.read_u64::<BigEndian>()?;
        let footer_partition = cursor.read_u64::<BigEndian>()?;
        let header_byte_count = cursor.read_u64::<BigEndian>()?;
        let index_byte_count = cursor.read_u64::<BigEndian>()?;
        let index_sid = cursor.read_u32::<BigEndian>()?;
        let body_offset = cursor.read_u64::<BigEndian>()?;
        let body_sid = cursor.read_u32::<BigEndian>()?;

        let mut operational_pattern = [0u8; 16];
        let mut essence_containers = Vec::new();
        if value.len() >= FIXED_BODY_SIZE + 16 {
            cursor.read_exact(&mut operational_pattern)?;
        }
        if value.len() >= FIXED_BODY_SIZE + 24 {
            let batch_count = cursor.read_u32::<BigEndian>()?;
            let item_size = cursor.read_u32::<BigEndian>()? as usize;
            for _ in 0..batch_count {
                let start = cursor.position() as usize;
                if item_size != 16 || start + 16 > value.len() {
                    break;
                }
                let mut ul = [0u8; 16];
                cursor.read_exact(&mut ul)?;
                essence_containers.push(ul);
            }
        }

        Ok(PartitionPack {
            key: key.0,
            major_version,
            minor_version,
            kag_size,
            this_partition,
            previous_partition,
            footer_partition,
            header_byte_count,
            index_byte_count,
            index_sid,
            body_offset,
            body_sid,
            operational_pattern,
            essence_containers,
        })
    }

    /// Value length: fixed body, operational pattern, batch header, labels.
    pub fn value_size(&self) -> usize {
        FIXED_BODY_SIZE + 16 + 8 + self.essence_containers.len() * 16
    }

    /// Total encoded size of the pack
    pub fn size(&self) -> usize {
        16 + PARTITION_LENGTH_TOKEN + self.value_size()
    }

    /// Encode the pack with its fixed four byte length token.
    pub fn to_vec(&self) -> Result<Vec<u8>> {
        let value_size = self.value_size();
        let token = ber_encode_fixed(value_size as u64, PARTITION_LENGTH_TOKEN).ok_or_else(|| {
            MrxError::invalid_partition(format!("partition pack of {} bytes", value_size))
        })?;

        let mut out = Vec::with_capacity(self.size());
        out.extend_from_slice(&self.key);
        out.extend_from_slice(&token);
        out.write_u16::<BigEndian>(self.major_version)?;
        out.write_u16::<BigEndian>(self.minor_version)?;
        out.write_u32::<BigEndian>(self.kag_size)?;
        out.write_u64::<BigEndian>(self.this_partition)?;
        out.write_u64::<BigEndian>(self.previous_partition)?;
        out.write_u64::<BigEndian>(self.footer_partition)?;
        out.write_u64::<BigEndian>(self.header_byte_count)?;
        out.write_u64::<BigEndian>(self.index_byte_count)?;
        out.write_u32::<BigEndian>(self.index_sid)?;
        out.write_u64::<BigEndian>(self.body_offset)?;
        out.write_u32::<BigEndian>(self.body_sid)?;
        out.extend_from_slice(&self.operational_pattern);

        out.write_u32::<BigEndian>(self.essence_containers.len() as u32)?;
        out.write_u32::<BigEndian>(16)?;
        for ec in &self.essence_containers {
            out.extend_from_slice(ec);
        }

        Ok(out)
    }

    /// Add essence container
    pub fn add_essence_container(&mut self, ul: UL) {
        if !self.essence_containers.contains(&ul) {
            self.essence_containers.push(ul);
        }
    }
}

/// Random Index Pack entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RipEntry {
    /// Body SID (0 for header/footer)
    pub body_sid: u32,
    /// Byte offset of partition
    pub byte_offset: u64,
}

/// Random Index Pack
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RandomIndexPack {
    /// One entry per partition, in file order
    pub entries: Vec<RipEntry>,
}

impl RandomIndexPack {
    /// Create new RIP
    pub fn new() -> Self {
        Self::default()
    }

    /// Add entry
    pub fn add_entry(&mut self, body_sid: u32, byte_offset: u64) {
        self.entries.push(RipEntry {
            body_sid,
            byte_offset,
        });
    }

    /// Encode the pack, ending with its overall-length trailer.
    pub fn to_vec(&self) -> Result<Vec<u8>> {
        let value_size = self.entries.len() * 12 + 4;
        let len_bytes = ber_encode(value_size as u64);

        let mut out = Vec::with_capacity(16 + len_bytes.len() + value_size);
        out.extend_from_slice(&labels::RANDOM_INDEX_PACK);
        out.extend_from_slice(&len_bytes);
        for entry in &self.entries {
            out.write_u32::<BigEndian>(entry.body_sid)?;
            out.write_u64::<BigEndian>(entry.byte_offset)?;
        }

        let overall_length = 12 * self.entries.len() + 16 + len_bytes.len() + 4;
        out.write_u32::<BigEndian>(overall_length as u32)?;
        Ok(out)
    }

    /// Parse the RIP at the end of `data`, located through its trailer.
    pub fn parse_trailing(data: &[u8]) -> Result<Self> {
        if data.len() < 4 {
            return Err(MrxError::InsufficientData {
                needed: 4,
                available: data.len(),
            });
        }

        let mut tail = &data[data.len() - 4..];
        let overall_length = tail.read_u32::<BigEndian>()? as usize;
        if overall_length < 21 || overall_length > data.len() {
            return Err(MrxError::invalid_partition(format!(
                "random index pack length {} out of range",
                overall_length
            )));
        }

        Self::parse(&data[data.len() - overall_length..])
    }

    /// Parse a RIP starting at its key.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < 17 || data[..16] != labels::RANDOM_INDEX_PACK {
            return Err(MrxError::invalid_partition("missing random index pack key"));
        }

        let (value_size, len_size) = ber_decode(&data[16..]);
        let start = 16 + len_size;
        let end = start + value_size as usize;
        if len_size == 0 || end > data.len() || value_size < 4 {
            return Err(MrxError::InsufficientData {
                needed: end,
                available: data.len(),
            });
        }

        let mut cursor = Cursor::new(&data[start..end - 4]);
        let mut rip = RandomIndexPack::new();
        for _ in 0..(value_size as usize - 4) / 12 {
            let body_sid = cursor.read_u32::<BigEndian>()?;
            let byte_offset = cursor.read_u64::<BigEndian>()?;
            rip.add_entry(body_sid, byte_offset);
        }

        Ok(rip)
    }
}
