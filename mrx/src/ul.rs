//! Universal Label (UL) types for MRX
//!
//! Universal Labels are 16-byte SMPTE identifiers used as KLV keys for
//! partition packs, metadata sets and essence elements.

use std::fmt;

/// A 16-byte Universal Label
pub type UL = [u8; 16];

/// Canonical text of the reserved key that marks a run of skipped content packages.
pub const SKIP_MARKER_KEY: &str = "00000000.00000000.00000000.00000000";

/// A key as read from the stream, with classification helpers.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UniversalLabel(pub UL);

impl UniversalLabel {
    pub fn new(bytes: UL) -> Self {
        UniversalLabel(bytes)
    }

    pub fn as_bytes(&self) -> &UL {
        &self.0
    }

    /// Check if this is a SMPTE-registered label (starts with 06 0E 2B 34)
    pub fn is_smpte(&self) -> bool {
        self.0[0..4] == labels::SMPTE_PREFIX
    }

    /// Check the partition-pack pattern `06 0e 2b 34 . 02 05 01 .. 0d 01 02 01 . 01 .. ..`.
    ///
    /// The Random Index Pack shares the pattern; byte 13 tells them apart.
    pub fn is_partition_pack(&self) -> bool {
        self.is_smpte()
            && self.0[4..7] == [0x02, 0x05, 0x01]
            && self.0[8..13] == [0x0D, 0x01, 0x02, 0x01, 0x01]
            && matches!(self.0[13], 0x02 | 0x03 | 0x04 | 0x11)
    }

    /// Check if this is the Random Index Pack key
    pub fn is_random_index_pack(&self) -> bool {
        self.is_partition_pack() && self.0[13] == 0x11
    }

    /// Check if this is a primer pack
    pub fn is_primer_pack(&self) -> bool {
        self.0[0..13] == labels::PRIMER_PACK[0..13] && self.0[13] == 0x05
    }

    /// Check if this is one of the reserved KLV fill keys
    pub fn is_fill_item(&self) -> bool {
        labels::FILL_ITEMS.iter().any(|fill| *fill == self.0)
    }

    /// Check if this is an index table segment
    pub fn is_index_table_segment(&self) -> bool {
        self.0[0..4] == labels::SMPTE_PREFIX
            && self.0[5] == 0x53
            && self.0[8..15] == labels::INDEX_TABLE_SEGMENT[8..15]
    }

    /// Lower-case dotted hex, `xxxxxxxx.xxxxxxxx.xxxxxxxx.xxxxxxxx`.
    pub fn to_dotted_hex(&self) -> String {
        dotted_hex(&self.0)
    }

    /// `urn:smpte:ul:` form used as a registry key.
    pub fn to_urn(&self) -> String {
        format!("urn:smpte:ul:{}", self.to_dotted_hex())
    }

    /// Copy with the given byte positions replaced.
    pub fn with_bytes(&self, replacements: &[(usize, u8)]) -> Self {
        let mut bytes = self.0;
        for &(index, value) in replacements {
            bytes[index] = value;
        }
        UniversalLabel(bytes)
    }

    /// Parse dotted or plain hex, with or without a `urn:smpte:ul:` prefix.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.strip_prefix("urn:smpte:ul:").unwrap_or(text);
        let digits: Vec<u8> = text
            .bytes()
            .filter(|b| !matches!(b, b'.' | b' '))
            .collect();
        if digits.len() != 32 {
            return None;
        }

        let mut bytes = [0u8; 16];
        for (i, pair) in digits.chunks(2).enumerate() {
            let pair = std::str::from_utf8(pair).ok()?;
            bytes[i] = u8::from_str_radix(pair, 16).ok()?;
        }
        Some(UniversalLabel(bytes))
    }
}

/// Dotted hex of arbitrary bytes, a `.` after every fourth byte.
pub fn dotted_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2 + bytes.len() / 4);
    for (i, b) in bytes.iter().enumerate() {
        if i > 0 && i % 4 == 0 {
            out.push('.');
        }
        out.push_str(&format!("{:02x}", b));
    }
    out
}

impl fmt::Debug for UniversalLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UL({})", self.to_dotted_hex())
    }
}

impl fmt::Display for UniversalLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_dotted_hex())
    }
}

impl From<UL> for UniversalLabel {
    fn from(bytes: UL) -> Self {
        UniversalLabel(bytes)
    }
}

impl From<&[u8; 16]> for UniversalLabel {
    fn from(bytes: &[u8; 16]) -> Self {
        UniversalLabel(*bytes)
    }
}

/// Labels the decoder classifies on and the encoder writes.
pub mod labels {
    use super::UL;

    /// First four bytes of every SMPTE key
    pub const SMPTE_PREFIX: [u8; 4] = [0x06, 0x0E, 0x2B, 0x34];

    /// Closed and complete header partition pack
    pub const HEADER_PARTITION_CLOSED_COMPLETE: UL = [
        0x06, 0x0E, 0x2B, 0x34, 0x02, 0x05, 0x01, 0x01, 0x0D, 0x01, 0x02, 0x01, 0x01, 0x02, 0x04,
        0x00,
    ];

    /// Closed and complete body partition pack
    pub const BODY_PARTITION_CLOSED_COMPLETE: UL = [
        0x06, 0x0E, 0x2B, 0x34, 0x02, 0x05, 0x01, 0x01, 0x0D, 0x01, 0x02, 0x01, 0x01, 0x03, 0x04,
        0x00,
    ];

    /// Generic stream partition (body partition key, status byte 0x11)
    pub const GENERIC_STREAM_PARTITION: UL = [
        0x06, 0x0E, 0x2B, 0x34, 0x02, 0x05, 0x01, 0x01, 0x0D, 0x01, 0x02, 0x01, 0x01, 0x03, 0x11,
        0x00,
    ];

    /// Closed and complete footer partition pack
    pub const FOOTER_PARTITION: UL = [
        0x06, 0x0E, 0x2B, 0x34, 0x02, 0x05, 0x01, 0x01, 0x0D, 0x01, 0x02, 0x01, 0x01, 0x04, 0x04,
        0x00,
    ];

    pub const PRIMER_PACK: UL = [
        0x06, 0x0E, 0x2B, 0x34, 0x02, 0x05, 0x01, 0x01, 0x0D, 0x01, 0x02, 0x01, 0x01, 0x05, 0x01,
        0x00,
    ];

    /// Reserved KLV fill keys (legacy version 1, version 2 and the later registered form)
    pub const FILL_ITEMS: [UL; 3] = [
        [
            0x06, 0x0E, 0x2B, 0x34, 0x01, 0x01, 0x01, 0x01, 0x03, 0x01, 0x02, 0x10, 0x01, 0x00,
            0x00, 0x00,
        ],
        [
            0x06, 0x0E, 0x2B, 0x34, 0x01, 0x01, 0x01, 0x02, 0x03, 0x01, 0x02, 0x10, 0x01, 0x00,
            0x00, 0x00,
        ],
        [
            0x06, 0x0E, 0x2B, 0x34, 0x01, 0x01, 0x01, 0x03, 0x03, 0x01, 0x02, 0x10, 0x01, 0x00,
            0x00, 0x00,
        ],
    ];

    pub const INDEX_TABLE_SEGMENT: UL = [
        0x06, 0x0E, 0x2B, 0x34, 0x02, 0x53, 0x01, 0x01, 0x0D, 0x01, 0x02, 0x01, 0x01, 0x10, 0x01,
        0x00,
    ];

    pub const RANDOM_INDEX_PACK: UL = [
        0x06, 0x0E, 0x2B, 0x34, 0x02, 0x05, 0x01, 0x01, 0x0D, 0x01, 0x02, 0x01, 0x01, 0x11, 0x01,
        0x00,
    ];

    /// Op1a operational pattern
    pub const OP1A: UL = [
        0x06, 0x0E, 0x2B, 0x34, 0x04, 0x01, 0x01, 0x01, 0x0D, 0x01, 0x02, 0x01, 0x01, 0x01, 0x01,
        0x00,
    ];

    // Metadata sets

    /// Preface set key; every header metadata tree hangs off it
    pub const PREFACE: UL = [
        0x06, 0x0E, 0x2B, 0x34, 0x02, 0x53, 0x01, 0x01, 0x0D, 0x01, 0x01, 0x01, 0x01, 0x01, 0x2F,
        0x00,
    ];

    pub const CONTENT_STORAGE: UL = [
        0x06, 0x0E, 0x2B, 0x34, 0x02, 0x53, 0x01, 0x01, 0x0D, 0x01, 0x01, 0x01, 0x01, 0x01, 0x18,
        0x00,
    ];

    pub const MATERIAL_PACKAGE: UL = [
        0x06, 0x0E, 0x2B, 0x34, 0x02, 0x53, 0x01, 0x01, 0x0D, 0x01, 0x01, 0x01, 0x01, 0x01, 0x36,
        0x00,
    ];

    // Essence

    /// ISXD data element; byte 13 is the element count, byte 14 the wrapping
    /// (0x01 frame, 0x02 clip), byte 15 the element number.
    pub const ISXD_DATA_ELEMENT: UL = [
        0x06, 0x0E, 0x2B, 0x34, 0x01, 0x02, 0x01, 0x05, 0x0E, 0x09, 0x05, 0x02, 0x01, 0x01, 0x01,
        0x00,
    ];

    /// Generic stream data element (carries the embedded manifest)
    pub const GENERIC_STREAM_DATA_ELEMENT: UL = [
        0x06, 0x0E, 0x2B, 0x34, 0x01, 0x01, 0x01, 0x0C, 0x0D, 0x01, 0x05, 0x09, 0x01, 0x00, 0x00,
        0x00,
    ];

    /// ISXD essence container label
    pub const ISXD_CONTAINER: UL = [
        0x06, 0x0E, 0x2B, 0x34, 0x04, 0x01, 0x01, 0x05, 0x0E, 0x09, 0x06, 0x06, 0x00, 0x00, 0x00,
        0x00,
    ];
}
