//! Per-diff field statistics and minimal width computation.
//!
//! The encoder's first pass classifies every part's fields into four
//! categories and accumulates running maxima and counts:
//!
//! - **S**: start positions
//! - **E**: old-text span lengths
//! - **B**: block ids
//! - **L**: text payload byte lengths
//!
//! plus the part count (**C**) and total raw text bytes (**T**).
//!
//! The one-shot `ceil(log2(max + 1))` conversion is modeled as a state
//! change: [`CodecData`] (collecting) is consumed by [`CodecData::finalize`]
//! into [`CodecWidths`], so re-running the conversion is impossible by
//! construction.

use crate::bitstream::MAX_FIELD_WIDTH;
use crate::EncodingError;

/// Bits in the fixed wire header.
pub(crate) const HEADER_BITS: u64 = 24;

/// Bits per action code.
pub(crate) const ACTION_BITS: u64 = 3;

/// One field category's running maximum and occurrence count.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Category {
    max: u64,
    count: u64,
}

impl Category {
    fn record(&mut self, value: u64) {
        self.max = self.max.max(value);
        self.count += 1;
    }

    /// Minimal width for this category: 0 bits when it never occurs, at
    /// least 1 bit when it occurs (a 0-bit field cannot encode anything),
    /// otherwise the bit length of the maximum.
    fn width(self) -> u8 {
        if self.count == 0 {
            0
        } else if self.max == 0 {
            1
        } else {
            (64 - self.max.leading_zeros()) as u8
        }
    }
}

/// Collecting state: accumulates maxima and counts over one diff's parts.
///
/// Must be fresh per diff; the typestate guarantees it cannot survive
/// finalization.
#[derive(Debug, Clone, Default)]
pub struct CodecData {
    start: Category,
    span: Category,
    block: Category,
    text_len: Category,
    parts: u64,
    text_bytes: u64,
}

impl CodecData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one part's presence (the 3-bit action code).
    pub fn record_part(&mut self) {
        self.parts += 1;
    }

    /// Records a start position (S category).
    pub fn record_start(&mut self, value: u64) {
        self.start.record(value);
    }

    /// Records an old-text span length (E category).
    pub fn record_span(&mut self, value: u64) {
        self.span.record(value);
    }

    /// Records a block id (B category).
    pub fn record_block(&mut self, value: u64) {
        self.block.record(value);
    }

    /// Records a text payload of `len` bytes (L category + raw bytes).
    pub fn record_text(&mut self, len: u64) {
        self.text_len.record(len);
        self.text_bytes += len;
    }

    pub fn part_count(&self) -> u64 {
        self.parts
    }

    /// Size estimate before width conversion, derived from the running raw
    /// maxima. Never smaller than the finalized exact size.
    pub fn total_size_in_bits(&self) -> u64 {
        HEADER_BITS
            + ACTION_BITS * self.parts
            + u64::from(self.start.width()) * self.start.count
            + u64::from(self.span.width()) * self.span.count
            + u64::from(self.block.width()) * self.block.count
            + u64::from(self.text_len.width()) * self.text_len.count
            + 8 * self.text_bytes
    }

    /// Converts maxima to minimal bit widths, consuming the collector.
    pub fn finalize(self) -> Result<CodecWidths, EncodingError> {
        let widths = CodecWidths {
            start_width: self.start.width(),
            span_width: self.span.width(),
            block_width: self.block.width(),
            text_len_width: self.text_len.width(),
            start_count: self.start.count,
            span_count: self.span.count,
            block_count: self.block.count,
            text_len_count: self.text_len.count,
            parts: self.parts,
            text_bytes: self.text_bytes,
        };
        for width in [
            widths.start_width,
            widths.span_width,
            widths.block_width,
            widths.text_len_width,
        ] {
            if width > MAX_FIELD_WIDTH {
                return Err(EncodingError::WidthTooLarge { width });
            }
        }
        Ok(widths)
    }
}

/// Finalized state: the minimal per-category widths and the counts needed
/// to compute the exact encoded size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecWidths {
    pub start_width: u8,
    pub span_width: u8,
    pub block_width: u8,
    pub text_len_width: u8,
    start_count: u64,
    span_count: u64,
    block_count: u64,
    text_len_count: u64,
    parts: u64,
    text_bytes: u64,
}

impl CodecWidths {
    pub fn part_count(&self) -> u64 {
        self.parts
    }

    /// Exact encoded size in bits:
    /// `24 + 3·C + wS·nS + wE·nE + wB·nB + wL·nL + 8·T`.
    pub fn total_size_in_bits(&self) -> u64 {
        HEADER_BITS
            + ACTION_BITS * self.parts
            + u64::from(self.start_width) * self.start_count
            + u64::from(self.span_width) * self.span_count
            + u64::from(self.block_width) * self.block_count
            + u64::from(self.text_len_width) * self.text_len_count
            + 8 * self.text_bytes
    }
}
