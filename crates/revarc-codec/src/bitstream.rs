//! MSB-first bit packing primitives.
//!
//! [`BitWriter`] buffers bits into bytes most-significant-bit first.
//! [`BitReader`] is the exact dual. A write sequence replayed through a
//! reader with the same width sequence reproduces the original values.
//! Raw byte payloads are kept byte-aligned by zero-padding the in-progress
//! byte first (`write_fill_bits` / `read_fill_bits`).

use bytes::{Bytes, BytesMut};

use crate::{DecodingError, EncodingError};

/// Widest single field the wire format allows. Part of the contract: the
/// diff header declares field widths and the decoder enforces the same cap.
pub const MAX_FIELD_WIDTH: u8 = 31;

/// Packs bits into a growable byte buffer, MSB-first.
#[derive(Debug, Default)]
pub struct BitWriter {
    buf: BytesMut,
    /// Byte under construction; only meaningful when `bit_pos > 0`.
    current: u8,
    /// Bits already occupied in `current` (0..8).
    bit_pos: u8,
}

impl BitWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
            current: 0,
            bit_pos: 0,
        }
    }

    /// Appends a single bit. Only 0 and 1 are accepted.
    pub fn write_bit(&mut self, bit: u8) -> Result<(), EncodingError> {
        if bit > 1 {
            return Err(EncodingError::InvalidBit { value: bit });
        }
        self.current |= bit << (7 - self.bit_pos);
        self.bit_pos += 1;
        if self.bit_pos == 8 {
            self.buf.extend_from_slice(&[self.current]);
            self.current = 0;
            self.bit_pos = 0;
        }
        Ok(())
    }

    /// Appends the `width` low-order bits of `value`, most significant
    /// first. A width of 0 writes nothing and accepts only the value 0.
    pub fn write_value(&mut self, width: u8, value: u64) -> Result<(), EncodingError> {
        if width > MAX_FIELD_WIDTH {
            return Err(EncodingError::WidthTooLarge { width });
        }
        if width < 64 && value >> width != 0 {
            return Err(EncodingError::ValueTooLarge { width, value });
        }
        for shift in (0..width).rev() {
            self.write_bit(((value >> shift) & 1) as u8)?;
        }
        Ok(())
    }

    /// Zero-pads the in-progress byte, if any, to the next byte boundary.
    pub fn write_fill_bits(&mut self) {
        if self.bit_pos > 0 {
            self.buf.extend_from_slice(&[self.current]);
            self.current = 0;
            self.bit_pos = 0;
        }
    }

    /// Fill-pads, then appends raw bytes unmodified.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.write_fill_bits();
        self.buf.extend_from_slice(bytes);
    }

    /// Number of bits written so far, including the in-progress byte.
    pub fn bit_len(&self) -> usize {
        self.buf.len() * 8 + self.bit_pos as usize
    }

    /// Finalizes the stream, zero-padding the last byte.
    pub fn finish(mut self) -> Bytes {
        self.write_fill_bits();
        self.buf.freeze()
    }
}

/// Reads bits from a byte slice, MSB-first.
#[derive(Debug)]
pub struct BitReader<'a> {
    data: &'a [u8],
    byte_pos: usize,
    /// Bits already consumed from the current byte (0..8).
    bit_pos: u8,
}

impl<'a> BitReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            byte_pos: 0,
            bit_pos: 0,
        }
    }

    /// Current position in bits from the start of the stream.
    pub fn bit_position(&self) -> usize {
        self.byte_pos * 8 + self.bit_pos as usize
    }

    /// Bits left before the end of input.
    pub fn remaining_bits(&self) -> usize {
        self.data.len() * 8 - self.bit_position()
    }

    /// Reads a single bit.
    pub fn read_bit(&mut self) -> Result<u8, DecodingError> {
        let byte = *self
            .data
            .get(self.byte_pos)
            .ok_or(DecodingError::UnexpectedEof {
                position: self.bit_position(),
            })?;
        let bit = (byte >> (7 - self.bit_pos)) & 1;
        self.bit_pos += 1;
        if self.bit_pos == 8 {
            self.bit_pos = 0;
            self.byte_pos += 1;
        }
        Ok(bit)
    }

    /// Reads a `width`-bit value, most significant bit first. A width of 0
    /// consumes nothing and yields 0.
    pub fn read_value(&mut self, width: u8) -> Result<u64, DecodingError> {
        if width > MAX_FIELD_WIDTH {
            return Err(DecodingError::WidthTooLarge { width });
        }
        let mut value = 0u64;
        for _ in 0..width {
            value = (value << 1) | u64::from(self.read_bit()?);
        }
        Ok(value)
    }

    /// Advances to the next byte boundary, discarding pad bits.
    pub fn read_fill_bits(&mut self) {
        if self.bit_pos > 0 {
            self.bit_pos = 0;
            self.byte_pos += 1;
        }
    }

    /// Discards padding, then reads `n` raw bytes.
    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], DecodingError> {
        self.read_fill_bits();
        let end = self.byte_pos + n;
        if end > self.data.len() {
            return Err(DecodingError::UnexpectedEof {
                position: self.bit_position(),
            });
        }
        let bytes = &self.data[self.byte_pos..end];
        self.byte_pos = end;
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn single_bits_pack_msb_first() {
        let mut w = BitWriter::new();
        for bit in [1, 0, 1, 1, 0, 0, 0, 1] {
            w.write_bit(bit).unwrap();
        }
        assert_eq!(&w.finish()[..], &[0b1011_0001]);
    }

    #[test]
    fn write_bit_rejects_non_binary() {
        let mut w = BitWriter::new();
        assert_eq!(
            w.write_bit(2).unwrap_err(),
            EncodingError::InvalidBit { value: 2 }
        );
    }

    #[test]
    fn value_roundtrip_across_byte_boundaries() {
        let mut w = BitWriter::new();
        w.write_value(5, 0b10110).unwrap();
        w.write_value(13, 0x1abc & 0x1fff).unwrap();
        w.write_value(3, 0b101).unwrap();
        let bytes = w.finish();

        let mut r = BitReader::new(&bytes);
        assert_eq!(r.read_value(5).unwrap(), 0b10110);
        assert_eq!(r.read_value(13).unwrap(), 0x1abc & 0x1fff);
        assert_eq!(r.read_value(3).unwrap(), 0b101);
    }

    #[test]
    fn width_limit_enforced_both_ways() {
        let mut w = BitWriter::new();
        assert_eq!(
            w.write_value(32, 1).unwrap_err(),
            EncodingError::WidthTooLarge { width: 32 }
        );

        let data = [0u8; 8];
        let mut r = BitReader::new(&data);
        assert_eq!(
            r.read_value(32).unwrap_err(),
            DecodingError::WidthTooLarge { width: 32 }
        );
    }

    #[test]
    fn value_overflow_is_rejected_not_truncated() {
        let mut w = BitWriter::new();
        assert_eq!(
            w.write_value(3, 8).unwrap_err(),
            EncodingError::ValueTooLarge { width: 3, value: 8 }
        );
    }

    #[test]
    fn zero_width_is_a_nop() {
        let mut w = BitWriter::new();
        w.write_value(0, 0).unwrap();
        assert_eq!(w.bit_len(), 0);
        assert!(w.write_value(0, 1).is_err());

        let mut r = BitReader::new(&[]);
        assert_eq!(r.read_value(0).unwrap(), 0);
    }

    #[test]
    fn fill_bits_align_raw_bytes() {
        let mut w = BitWriter::new();
        w.write_value(3, 0b101).unwrap();
        w.write_bytes(b"xy");
        w.write_value(4, 0xF).unwrap();
        let bytes = w.finish();
        // 1 padded header byte + 2 raw bytes + 1 padded trailer byte.
        assert_eq!(bytes.len(), 4);

        let mut r = BitReader::new(&bytes);
        assert_eq!(r.read_value(3).unwrap(), 0b101);
        assert_eq!(r.read_bytes(2).unwrap(), b"xy");
        assert_eq!(r.read_value(4).unwrap(), 0xF);
    }

    #[test]
    fn read_past_end_fails() {
        let mut r = BitReader::new(&[0xFF]);
        assert_eq!(r.read_value(8).unwrap(), 0xFF);
        assert!(matches!(
            r.read_value(1).unwrap_err(),
            DecodingError::UnexpectedEof { .. }
        ));
    }

    #[test]
    fn remaining_bits_tracks_cursor() {
        let mut r = BitReader::new(&[0x00, 0x00]);
        assert_eq!(r.remaining_bits(), 16);
        r.read_value(5).unwrap();
        assert_eq!(r.remaining_bits(), 11);
        r.read_fill_bits();
        assert_eq!(r.remaining_bits(), 8);
    }

    proptest! {
        #[test]
        fn roundtrip_arbitrary_width_sequences(
            fields in prop::collection::vec((1u8..=31, any::<u64>()), 0..50)
        ) {
            let fields: Vec<(u8, u64)> = fields
                .into_iter()
                .map(|(w, v)| (w, v & ((1u64 << w) - 1)))
                .collect();

            let mut writer = BitWriter::new();
            for &(w, v) in &fields {
                writer.write_value(w, v).unwrap();
            }
            let bytes = writer.finish();

            let mut reader = BitReader::new(&bytes);
            for &(w, v) in &fields {
                prop_assert_eq!(reader.read_value(w).unwrap(), v);
            }
        }
    }
}
