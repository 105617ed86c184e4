//! Two-pass encoder and decoder for edit scripts.
//!
//! # Wire layout (version 1)
//!
//! ```text
//! header   : version:4 | widthS:5 | widthE:5 | widthB:5 | widthL:5   (24 bits)
//! count    : part count                                              (20 bits)
//! per part : action:3, then that action's fields at the header widths,
//!            then (if the action carries text) fill bits + raw UTF-8 bytes
//! trailer  : zero padding to the final byte boundary
//! ```
//!
//! Fields per action:
//!
//! | action          | S | E | B | L + text |
//! |-----------------|---|---|---|----------|
//! | insert          | x |   |   | x        |
//! | delete          | x | x |   |          |
//! | replace         | x | x |   | x        |
//! | cut             | x | x | x |          |
//! | paste           | x |   | x | x        |
//! | full revision   |   |   |   | x        |
//! | decoder data    |   |   | x | x        |
//!
//! The header layout is versioned; encoder and decoder move in lock-step.

use bytes::Bytes;
use revarc_diff::{DiffAction, DiffPart};

use crate::bitstream::{BitReader, BitWriter};
use crate::codec_data::{CodecData, CodecWidths};
use crate::{DecodingError, EncodingError};

/// Wire format version written in the header's top nibble.
pub const CODEC_VERSION: u8 = 1;

/// Width of the part count field following the header.
pub const PART_COUNT_WIDTH: u8 = 20;

/// Most parts one encoded diff can carry.
pub const MAX_PARTS: usize = (1 << PART_COUNT_WIDTH) - 1;

const VERSION_WIDTH: u8 = 4;
const WIDTH_FIELD_WIDTH: u8 = 5;

/// Pass 1: classifies every part's fields and accumulates the statistics
/// the width computation needs.
pub fn scan_parts(parts: &[DiffPart]) -> CodecData {
    let mut data = CodecData::new();
    for part in parts {
        data.record_part();
        match part.action() {
            DiffAction::Insert => {
                data.record_start(part.start() as u64);
                data.record_text(text_bytes(part));
            }
            DiffAction::Delete => {
                data.record_start(part.start() as u64);
                data.record_span(part.length() as u64);
            }
            DiffAction::Replace => {
                data.record_start(part.start() as u64);
                data.record_span(part.length() as u64);
                data.record_text(text_bytes(part));
            }
            DiffAction::Cut => {
                data.record_start(part.start() as u64);
                data.record_span(part.length() as u64);
                data.record_block(part.block().unwrap_or_default());
            }
            DiffAction::Paste => {
                data.record_start(part.start() as u64);
                data.record_block(part.block().unwrap_or_default());
                data.record_text(text_bytes(part));
            }
            DiffAction::FullRevisionUncompressed => {
                data.record_text(text_bytes(part));
            }
            DiffAction::DecoderData => {
                data.record_block(part.block().unwrap_or_default());
                data.record_text(text_bytes(part));
            }
        }
    }
    data
}

fn text_bytes(part: &DiffPart) -> u64 {
    part.text().map_or(0, |t| t.len() as u64)
}

/// Pass 2: emits the header and every part at the minimal widths computed
/// in pass 1.
pub fn encode_parts(parts: &[DiffPart]) -> Result<Bytes, EncodingError> {
    if parts.len() > MAX_PARTS {
        return Err(EncodingError::TooManyParts {
            count: parts.len(),
            max: MAX_PARTS,
        });
    }

    let widths = scan_parts(parts).finalize()?;
    let mut writer = BitWriter::with_capacity(widths.total_size_in_bits() as usize / 8 + 8);

    writer.write_value(VERSION_WIDTH, u64::from(CODEC_VERSION))?;
    writer.write_value(WIDTH_FIELD_WIDTH, u64::from(widths.start_width))?;
    writer.write_value(WIDTH_FIELD_WIDTH, u64::from(widths.span_width))?;
    writer.write_value(WIDTH_FIELD_WIDTH, u64::from(widths.block_width))?;
    writer.write_value(WIDTH_FIELD_WIDTH, u64::from(widths.text_len_width))?;
    writer.write_value(PART_COUNT_WIDTH, parts.len() as u64)?;

    for part in parts {
        writer.write_value(3, u64::from(part.action().ordinal()))?;
        encode_fields(&mut writer, &widths, part)?;
    }
    Ok(writer.finish())
}

fn encode_fields(
    writer: &mut BitWriter,
    widths: &CodecWidths,
    part: &DiffPart,
) -> Result<(), EncodingError> {
    let start = part.start() as u64;
    let span = part.length() as u64;
    let block = part.block().unwrap_or_default();

    match part.action() {
        DiffAction::Insert => {
            writer.write_value(widths.start_width, start)?;
            encode_text(writer, widths, part)?;
        }
        DiffAction::Delete => {
            writer.write_value(widths.start_width, start)?;
            writer.write_value(widths.span_width, span)?;
        }
        DiffAction::Replace => {
            writer.write_value(widths.start_width, start)?;
            writer.write_value(widths.span_width, span)?;
            encode_text(writer, widths, part)?;
        }
        DiffAction::Cut => {
            writer.write_value(widths.start_width, start)?;
            writer.write_value(widths.span_width, span)?;
            writer.write_value(widths.block_width, block)?;
        }
        DiffAction::Paste => {
            writer.write_value(widths.start_width, start)?;
            writer.write_value(widths.block_width, block)?;
            encode_text(writer, widths, part)?;
        }
        DiffAction::FullRevisionUncompressed => {
            encode_text(writer, widths, part)?;
        }
        DiffAction::DecoderData => {
            writer.write_value(widths.block_width, block)?;
            encode_text(writer, widths, part)?;
        }
    }
    Ok(())
}

fn encode_text(
    writer: &mut BitWriter,
    widths: &CodecWidths,
    part: &DiffPart,
) -> Result<(), EncodingError> {
    let text = part.text().unwrap_or_default();
    writer.write_value(widths.text_len_width, text.len() as u64)?;
    writer.write_bytes(text.as_bytes());
    Ok(())
}

/// Decodes an encoded diff back into its parts.
pub fn decode_parts(data: &[u8]) -> Result<Vec<DiffPart>, DecodingError> {
    let mut reader = BitReader::new(data);

    let version = reader.read_value(VERSION_WIDTH)? as u8;
    if version != CODEC_VERSION {
        return Err(DecodingError::UnsupportedVersion { version });
    }
    let start_width = reader.read_value(WIDTH_FIELD_WIDTH)? as u8;
    let span_width = reader.read_value(WIDTH_FIELD_WIDTH)? as u8;
    let block_width = reader.read_value(WIDTH_FIELD_WIDTH)? as u8;
    let text_len_width = reader.read_value(WIDTH_FIELD_WIDTH)? as u8;
    let count = reader.read_value(PART_COUNT_WIDTH)? as usize;

    let mut parts = Vec::with_capacity(count.min(4096));
    for _ in 0..count {
        let code = reader.read_value(3)? as u8;
        let action =
            DiffAction::from_ordinal(code).ok_or(DecodingError::InvalidAction { code })?;

        let mut start = 0usize;
        let mut length = 0usize;
        let mut block = None;
        let mut text = None;

        match action {
            DiffAction::Insert => {
                start = reader.read_value(start_width)? as usize;
                text = Some(decode_text(&mut reader, text_len_width)?);
            }
            DiffAction::Delete => {
                start = reader.read_value(start_width)? as usize;
                length = reader.read_value(span_width)? as usize;
            }
            DiffAction::Replace => {
                start = reader.read_value(start_width)? as usize;
                length = reader.read_value(span_width)? as usize;
                text = Some(decode_text(&mut reader, text_len_width)?);
            }
            DiffAction::Cut => {
                start = reader.read_value(start_width)? as usize;
                length = reader.read_value(span_width)? as usize;
                block = Some(reader.read_value(block_width)?);
            }
            DiffAction::Paste => {
                start = reader.read_value(start_width)? as usize;
                block = Some(reader.read_value(block_width)?);
                text = Some(decode_text(&mut reader, text_len_width)?);
            }
            DiffAction::FullRevisionUncompressed => {
                text = Some(decode_text(&mut reader, text_len_width)?);
            }
            DiffAction::DecoderData => {
                block = Some(reader.read_value(block_width)?);
                text = Some(decode_text(&mut reader, text_len_width)?);
            }
        }

        // Actions whose length is implied by the payload rather than an E field.
        if matches!(
            action,
            DiffAction::Insert | DiffAction::Paste | DiffAction::FullRevisionUncompressed
        ) {
            length = text.as_deref().map_or(0, |t| t.chars().count());
        }

        let part = DiffPart::from_wire(action, start, length, block, text)
            .map_err(|e| DecodingError::MalformedPart {
                reason: e.to_string(),
            })?;
        parts.push(part);
    }
    Ok(parts)
}

fn decode_text(reader: &mut BitReader<'_>, width: u8) -> Result<String, DecodingError> {
    let len = reader.read_value(width)? as usize;
    let bytes = reader.read_bytes(len)?;
    String::from_utf8(bytes.to_vec()).map_err(|_| DecodingError::InvalidText)
}
