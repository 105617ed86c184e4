//! Aligned span pairs produced by the matcher.
//!
//! A [`DiffBlock`] pairs a span of the old text with a span of the new text.
//! Matched blocks have content on both sides; the gaps between consecutive
//! matched blocks are linearized into insert/delete/replace parts.

/// A paired span: `[a_start, a_end)` in the old text and `[b_start, b_end)`
/// in the new text. Offsets are character positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiffBlock {
    pub a_start: usize,
    pub a_end: usize,
    pub b_start: usize,
    pub b_end: usize,
}

impl DiffBlock {
    pub fn new(a_start: usize, a_end: usize, b_start: usize, b_end: usize) -> Self {
        debug_assert!(a_start <= a_end && b_start <= b_end);
        Self {
            a_start,
            a_end,
            b_start,
            b_end,
        }
    }
}
