//! # revarc-codec: Bit-packed wire codec for edit scripts
//!
//! Serializes a [`revarc_diff::Diff`]'s parts into a self-describing,
//! bit-level binary form and back:
//!
//! - [`BitWriter`] / [`BitReader`]: MSB-first bit packing primitives.
//! - [`CodecData`] / [`CodecWidths`]: two-state field-width computation —
//!   collect maxima and counts, then finalize to minimal bit widths exactly
//!   once.
//! - [`encode_parts`] / [`decode_parts`]: the two-pass encoder and its
//!   inverse.
//!
//! This is dense packing, not entropy coding: the only size reduction comes
//! from writing each field at the narrowest width that fits the diff's
//! largest value in that category.

mod bitstream;
mod codec_data;
mod error;
mod revision;

pub use bitstream::{BitReader, BitWriter, MAX_FIELD_WIDTH};
pub use codec_data::{CodecData, CodecWidths};
pub use error::{DecodingError, EncodingError};
pub use revision::{decode_parts, encode_parts, CODEC_VERSION, MAX_PARTS, PART_COUNT_WIDTH};
