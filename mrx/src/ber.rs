//! SMPTE BER variable-length integers
//!
//! KLV lengths use the short form (one byte, value < 0x80) or the long form:
//! a first byte of `0x80 | n` followed by `n` big-endian length bytes.

/// Largest number of length bytes a long-form BER field may declare.
pub const MAX_LENGTH_BYTES: usize = 8;

/// Decode a BER length from the start of `data`.
///
/// Returns `(value, bytes_consumed)`. A long-form count larger than the bytes
/// present is clamped to what is available. Empty input or a count above
/// eight yields `(0, 0)`.
pub fn ber_decode(data: &[u8]) -> (u64, usize) {
    let Some(&first) = data.first() else {
        return (0, 0);
    };

    if first < 0x80 {
        return (first as u64, 1);
    }

    let count = (first & 0x0F) as usize;
    if count > MAX_LENGTH_BYTES {
        return (0, 0);
    }
    let count = count.min(data.len() - 1);

    let value = data[1..=count]
        .iter()
        .fold(0u64, |acc, &b| (acc << 8) | b as u64);

    (value, 1 + count)
}

/// Size of the whole BER field announced by its first byte.
///
/// Returns `None` when the first byte declares more than eight length bytes.
pub fn field_size(first: u8) -> Option<usize> {
    if first < 0x80 {
        return Some(1);
    }
    let count = (first & 0x0F) as usize;
    (count <= MAX_LENGTH_BYTES).then_some(1 + count)
}

/// Canonical (shortest) BER encoding of `value`.
pub fn ber_encode(value: u64) -> Vec<u8> {
    if value < 0x80 {
        return vec![value as u8];
    }

    let significant = 8 - (value.leading_zeros() as usize / 8);
    let mut out = Vec::with_capacity(1 + significant);
    out.push(0x80 | significant as u8);
    out.extend_from_slice(&value.to_be_bytes()[8 - significant..]);
    out
}

/// Long-form BER encoding padded to exactly `width` bytes in total.
///
/// Partition packs use a fixed four byte token (`0x83` plus 24 bits) so
/// their size is known before the value is laid out. Returns `None` when
/// `value` does not fit.
pub fn ber_encode_fixed(value: u64, width: usize) -> Option<Vec<u8>> {
    let count = width.checked_sub(1)?;
    if count == 0 || count > MAX_LENGTH_BYTES {
        return None;
    }
    if count < 8 && value >> (count * 8) != 0 {
        return None;
    }

    let mut out = Vec::with_capacity(width);
    out.push(0x80 | count as u8);
    out.extend_from_slice(&value.to_be_bytes()[8 - count..]);
    Some(out)
}

/// Number of bytes `ber_encode(value)` produces.
pub fn encoded_len(value: u64) -> usize {
    if value < 0x80 {
        1
    } else {
        1 + 8 - (value.leading_zeros() as usize / 8)
    }
}
