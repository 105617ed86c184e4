//! Codec error taxonomy.
//!
//! Encoding failures are caller bugs (a value was recorded that does not fit
//! its declared width) and abort the current diff. Decoding failures indicate
//! corrupt input and abort reconstruction of that revision without crashing
//! the reader.

use thiserror::Error;

/// Errors raised while encoding a diff.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EncodingError {
    /// A field width above the wire contract's 31-bit limit was requested.
    #[error("field width {width} exceeds the 31-bit wire limit")]
    WidthTooLarge { width: u8 },

    /// A value does not fit in its declared field width.
    #[error("value {value} does not fit in {width} bits")]
    ValueTooLarge { width: u8, value: u64 },

    /// `write_bit` was given something other than 0 or 1.
    #[error("bit value {value} is not 0 or 1")]
    InvalidBit { value: u8 },

    /// The diff has more parts than the header's count field can express.
    #[error("diff has {count} parts, exceeding the wire maximum {max}")]
    TooManyParts { count: usize, max: usize },
}

/// Errors raised while decoding a diff.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodingError {
    /// The stream ended before the expected structure was complete.
    #[error("unexpected end of input at bit {position}")]
    UnexpectedEof { position: usize },

    /// A field width above the wire contract's 31-bit limit was requested.
    #[error("field width {width} exceeds the 31-bit wire limit")]
    WidthTooLarge { width: u8 },

    /// A 3-bit action code outside the defined ordinals.
    #[error("invalid action code {code}")]
    InvalidAction { code: u8 },

    /// The header declares a codec version this decoder does not speak.
    #[error("unsupported codec version {version}")]
    UnsupportedVersion { version: u8 },

    /// A text payload is not valid UTF-8.
    #[error("text payload is not valid UTF-8")]
    InvalidText,

    /// Decoded fields violate the diff part invariants.
    #[error("decoded part is malformed: {reason}")]
    MalformedPart { reason: String },
}
