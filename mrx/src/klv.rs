//! KLV (Key-Length-Value) triplet handling
//!
//! All data in MRX files is encoded as KLV triplets:
//! - Key: 16-byte Universal Label identifying the data
//! - Length: BER-encoded length of the value
//! - Value: The actual data

use crate::ber::ber_encode;
use crate::error::{MrxError, Result};
use crate::ul::{UniversalLabel, UL};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use bytes::Bytes;
use std::io::{Cursor, Write};

/// A KLV triplet as assembled from the byte stream.
///
/// The raw length field is kept alongside its decoded value so the exact
/// on-disk size of the record is always known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Klv {
    /// Universal Label (key)
    pub key: UniversalLabel,
    /// Raw BER length field
    pub length: Bytes,
    /// Value data
    pub value: Bytes,
    /// Decoded value length
    pub length_value: u64,
}

impl Klv {
    /// Create a KLV with a canonical BER length for `value`.
    pub fn new(key: UL, value: impl Into<Bytes>) -> Self {
        let value = value.into();
        let length_value = value.len() as u64;
        Klv {
            key: UniversalLabel(key),
            length: Bytes::from(ber_encode(length_value)),
            value,
            length_value,
        }
    }

    /// Total size including key and length field
    pub fn total_length(&self) -> u64 {
        16 + self.length.len() as u64 + self.value.len() as u64
    }

    /// Serialize the triplet, returning the bytes written.
    pub fn write<W: Write>(&self, writer: &mut W) -> Result<usize> {
        writer.write_all(self.key.as_bytes())?;
        writer.write_all(&self.length)?;
        writer.write_all(&self.value)?;
        Ok(self.total_length() as usize)
    }

    /// Serialize into a fresh buffer.
    pub fn to_vec(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.total_length() as usize);
        out.extend_from_slice(self.key.as_bytes());
        out.extend_from_slice(&self.length);
        out.extend_from_slice(&self.value);
        out
    }
}

/// Write a local set item (2-byte tag, 2-byte length)
pub fn write_local_set<W: Write>(writer: &mut W, tag: u16, value: &[u8]) -> Result<usize> {
    let length = u16::try_from(value.len()).map_err(|_| MrxError::InsufficientData {
        needed: value.len(),
        available: u16::MAX as usize,
    })?;
    writer.write_u16::<BigEndian>(tag)?;
    writer.write_u16::<BigEndian>(length)?;
    writer.write_all(value)?;
    Ok(4 + value.len())
}

/// Read a local set item at `offset`, returning `(tag, value, bytes_consumed)`.
pub fn read_local_set(data: &[u8], offset: usize) -> Result<(u16, &[u8], usize)> {
    let available = data.len().saturating_sub(offset);
    if available < 4 {
        return Err(MrxError::InsufficientData {
            needed: 4,
            available,
        });
    }

    let mut cursor = Cursor::new(&data[offset..]);
    let tag = cursor.read_u16::<BigEndian>()?;
    let length = cursor.read_u16::<BigEndian>()? as usize;

    if available - 4 < length {
        return Err(MrxError::InsufficientData {
            needed: length,
            available: available - 4,
        });
    }

    Ok((tag, &data[offset + 4..offset + 4 + length], 4 + length))
}

/// Iterate the items of a local set value.
pub fn local_set_items(data: &[u8]) -> Result<Vec<(u16, &[u8])>> {
    let mut items = Vec::new();
    let mut offset = 0;
    while offset < data.len() {
        let (tag, value, consumed) = read_local_set(data, offset)?;
        items.push((tag, value));
        offset += consumed;
    }
    Ok(items)
}
