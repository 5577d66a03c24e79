//! Packed bit-field header decoding.
//!
//! A raw buffer is the preamble followed by a fixed-length header region followed by the pixel
//! payload. The header region is described declaratively by [`crate::config::HeaderFormat`]; this
//! module turns that description plus a raw buffer into a typed [`Header`] and the remaining
//! payload bytes.

use streamdaq_common::{extract_bitfield, reverse_bits_in_bytes, reverse_byte_order, BitBuffer};

use crate::config::{
    DeviceConfig, HeaderFormat, BUFFER_COUNT_FIELD, FRAME_BUFFER_COUNT_FIELD, FRAME_NUM_FIELD,
};
use crate::error::BufferError;

/// A decoded buffer header.
///
/// `frame_num`, `buffer_count` and `frame_buffer_count` are promoted to named fields because
/// every stage of the pipeline needs them; every other declared field lives in an ordered
/// key/value list and is reached through [`Header::field`]. This keeps the header format fully
/// runtime-configurable (new devices just declare new fields in YAML) while still giving the
/// hot path direct field access.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub frame_num: u64,
    pub buffer_count: u64,
    pub frame_buffer_count: usize,
    /// Every declared field, in [`HeaderFormat`] order, including the three above.
    fields: Vec<(String, u64)>,
}

impl Header {
    pub fn field(&self, name: &str) -> Option<u64> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| *v)
    }

    /// Declared field names, in config order. Used as the CSV header line.
    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|(n, _)| n.as_str()).collect()
    }

    /// Declared field values, in the same order as [`Header::field_names`]. Used as a CSV data
    /// row.
    pub fn field_values(&self) -> Vec<u64> {
        self.fields.iter().map(|(_, v)| *v).collect()
    }
}

/// Splits `buf` into `(header, payload)`, applying the config's bit/byte reversal flags.
pub fn decode_header(
    buf: &[u8],
    format: &HeaderFormat,
    config: &DeviceConfig,
) -> Result<(Header, Vec<u8>), BufferError> {
    let preamble_bytes = config.preamble.len();
    let header_bytes = config.header_len / 8;
    let needed = preamble_bytes + header_bytes;

    if buf.len() < needed {
        return Err(BufferError::TooShort {
            got: buf.len(),
            needed,
        });
    }

    let mut header_region = buf[preamble_bytes..needed].to_vec();
    if config.reverse_header_bits {
        header_region = reverse_bits_in_bytes(&header_region);
    }
    if config.reverse_header_bytes {
        header_region = reverse_byte_order(&header_region);
    }

    let mut payload = buf[needed..].to_vec();
    if config.reverse_payload_bits {
        payload = reverse_bits_in_bytes(&payload);
    }
    if config.reverse_payload_bytes {
        payload = reverse_byte_order(&payload);
    }

    let header_bits = BitBuffer::from_bytes(&header_region);
    let mut fields = Vec::with_capacity(format.len());
    for spec in format {
        // A malformed header_len/bit_start combination is a configuration error, not a
        // per-buffer one; it would have been caught by `DeviceConfig::validate` in a well-formed
        // deployment. We still guard against panics on out-of-range fields defensively.
        let value = extract_bitfield(header_bits.as_bits(), spec.bit_start, spec.bit_length)
            .unwrap_or(0);
        fields.push((spec.name.clone(), value));
    }

    let frame_num = lookup(&fields, FRAME_NUM_FIELD);
    let buffer_count = lookup(&fields, BUFFER_COUNT_FIELD);
    let frame_buffer_count = lookup(&fields, FRAME_BUFFER_COUNT_FIELD) as usize;

    Ok((
        Header {
            frame_num,
            buffer_count,
            frame_buffer_count,
            fields,
        },
        payload,
    ))
}

fn lookup(fields: &[(String, u64)], name: &str) -> u64 {
    fields
        .iter()
        .find(|(n, _)| n == name)
        .map(|(_, v)| *v)
        .unwrap_or(0)
}
