//! Variable-length integer encoding matching `github.com/1f349/int-byte-utils`.
//!
//! The introducer byte carries the *count* of magnitude bytes that follow,
//! not a magnitude itself: `0 -> [0x00]` (zero magnitude bytes), `1 ->
//! [0x01, 0x01]`, `255 -> [0x01, 0xff]`, `256 -> [0x02, 0x00, 0x01]`. The
//! magnitude bytes are little-endian and always the minimal count needed to
//! hold the value — there is no fixed set of width thresholds, the
//! introducer is simply `ceil(bits_needed / 8)`.

use crate::error::{WireError, WireResult};
use std::io::{Read, Write};

/// Number of magnitude bytes needed to hold `value`: 0 only for `value == 0`.
fn magnitude_len(value: u64) -> usize {
    if value == 0 {
        0
    } else {
        let significant_bits = 64 - value.leading_zeros() as usize;
        (significant_bits + 7) / 8
    }
}

/// Number of bytes `write_varint` would emit for `value`, without writing.
pub fn varint_len(value: u64) -> usize {
    1 + magnitude_len(value)
}

/// Writes `value` to `out` as an introducer byte (count of magnitude bytes)
/// followed by that many little-endian magnitude bytes. Returns the number
/// of bytes written.
pub fn write_varint<W: Write + ?Sized>(out: &mut W, value: u64) -> WireResult<usize> {
    let len = magnitude_len(value);
    out.write_all(&[len as u8])?;
    if len > 0 {
        out.write_all(&value.to_le_bytes()[..len])?;
    }
    Ok(1 + len)
}

/// Reads one varint from `input`. Returns `(bytes_consumed, value)`.
pub fn read_varint<R: Read + ?Sized>(input: &mut R) -> WireResult<(usize, u64)> {
    let mut introducer = [0u8; 1];
    input.read_exact(&mut introducer)?;
    let len = introducer[0] as usize;
    if len == 0 {
        return Ok((1, 0));
    }
    if len > 8 {
        return Err(WireError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "varint introducer exceeds 8 magnitude bytes",
        )));
    }
    let mut buf = [0u8; 8];
    input.read_exact(&mut buf[..len])?;
    Ok((1 + len, u64::from_le_bytes(buf)))
}

/// Encodes `value` to a freshly allocated `Vec<u8>`.
pub fn encode_varint(value: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(varint_len(value));
    // A Vec<u8> is an infallible Write sink; the WireError path is
    // unreachable here but write_varint's signature stays I/O-general.
    write_varint(&mut out, value).expect("writing to a Vec<u8> cannot fail");
    out
}

/// Decodes a varint from the front of `bytes`. Returns `(bytes_consumed, value)`.
pub fn decode_varint(bytes: &[u8]) -> WireResult<(usize, u64)> {
    let mut cursor = bytes;
    read_varint(&mut cursor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_boundary_values() {
        let values: &[u64] = &[
            0,
            1,
            252,
            253,
            255,
            256,
            65535,
            65536,
            u32::MAX as u64 - 1,
            u32::MAX as u64,
            u32::MAX as u64 + 1,
        ];
        for &v in values {
            let encoded = encode_varint(v);
            assert_eq!(encoded.len(), varint_len(v), "length mismatch for {v}");
            let (consumed, decoded) = decode_varint(&encoded).unwrap();
            assert_eq!(consumed, encoded.len());
            assert_eq!(decoded, v);
        }
    }

    #[test]
    fn matches_reference_byte_layout() {
        assert_eq!(encode_varint(0), vec![0x00]);
        assert_eq!(encode_varint(1), vec![0x01, 0x01]);
        assert_eq!(encode_varint(255), vec![0x01, 0xff]);
        assert_eq!(encode_varint(256), vec![0x02, 0x00, 0x01]);
        assert_eq!(encode_varint(65536), vec![0x03, 0x00, 0x00, 0x01]);
    }

    #[test]
    fn introducer_is_always_minimal_magnitude_byte_count() {
        for &(value, expected_len) in &[
            (0u64, 1usize),
            (1, 2),
            (255, 2),
            (256, 3),
            (65535, 3),
            (65536, 4),
            (u32::MAX as u64, 5),
            (u32::MAX as u64 + 1, 6),
            (u64::MAX, 9),
        ] {
            assert_eq!(varint_len(value), expected_len, "for {value}");
            assert_eq!(encode_varint(value).len(), expected_len, "for {value}");
        }
    }

    #[test]
    fn truncated_input_is_an_error() {
        // Introducer claims 2 magnitude bytes but only 1 is present.
        let bytes = [0x02, 0x01];
        assert!(decode_varint(&bytes).is_err());
    }

    #[test]
    fn introducer_past_eight_bytes_is_rejected() {
        let bytes = [0x09, 0, 0, 0, 0, 0, 0, 0, 0, 0];
        assert!(decode_varint(&bytes).is_err());
    }
}
