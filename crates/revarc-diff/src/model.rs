//! Typed edit operations and the ordered edit script.
//!
//! A [`Diff`] is replayed in sequence against a working character buffer.
//! Offsets and lengths are expressed in characters, so replay is independent
//! of the byte encoding chosen by the revision codec.

use std::collections::HashMap;
use std::fmt;

use revarc_types::RevisionMeta;

use crate::DiffError;

/// The kind of a single edit operation.
///
/// Wire ordinals are fixed: they are written as 3-bit action codes by the
/// revision codec and must never be reordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DiffAction {
    Insert = 0,
    Delete = 1,
    Replace = 2,
    Cut = 3,
    Paste = 4,
    FullRevisionUncompressed = 5,
    DecoderData = 6,
}

impl DiffAction {
    /// Returns the 3-bit wire code for this action.
    pub fn ordinal(self) -> u8 {
        self as u8
    }

    /// Maps a wire code back to an action. Returns `None` for codes
    /// outside 0..=6, which a decoder must treat as corruption.
    pub fn from_ordinal(ordinal: u8) -> Option<Self> {
        match ordinal {
            0 => Some(DiffAction::Insert),
            1 => Some(DiffAction::Delete),
            2 => Some(DiffAction::Replace),
            3 => Some(DiffAction::Cut),
            4 => Some(DiffAction::Paste),
            5 => Some(DiffAction::FullRevisionUncompressed),
            6 => Some(DiffAction::DecoderData),
            _ => None,
        }
    }

    /// Whether this action carries a text payload.
    pub fn carries_text(self) -> bool {
        matches!(
            self,
            DiffAction::Insert
                | DiffAction::Replace
                | DiffAction::Paste
                | DiffAction::FullRevisionUncompressed
                | DiffAction::DecoderData
        )
    }

    /// Whether this action carries a block id.
    pub fn carries_block(self) -> bool {
        matches!(
            self,
            DiffAction::Cut | DiffAction::Paste | DiffAction::DecoderData
        )
    }

    fn name(self) -> &'static str {
        match self {
            DiffAction::Insert => "insert",
            DiffAction::Delete => "delete",
            DiffAction::Replace => "replace",
            DiffAction::Cut => "cut",
            DiffAction::Paste => "paste",
            DiffAction::FullRevisionUncompressed => "full_revision",
            DiffAction::DecoderData => "decoder_data",
        }
    }
}

impl fmt::Display for DiffAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One edit operation within an edit script.
///
/// Invariants, enforced by the constructors:
/// - `text` is present iff [`DiffAction::carries_text`] holds. Paste is the
///   exception: its payload comes from the clipboard, not the part.
/// - `block` is present iff [`DiffAction::carries_block`] holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffPart {
    action: DiffAction,
    start: usize,
    length: usize,
    block: Option<u64>,
    text: Option<String>,
}

impl DiffPart {
    /// Insert `text` at character position `start`.
    pub fn insert(start: usize, text: impl Into<String>) -> Self {
        let text = text.into();
        let length = text.chars().count();
        Self {
            action: DiffAction::Insert,
            start,
            length,
            block: None,
            text: Some(text),
        }
    }

    /// Remove `length` characters at `start`.
    pub fn delete(start: usize, length: usize) -> Self {
        Self {
            action: DiffAction::Delete,
            start,
            length,
            block: None,
            text: None,
        }
    }

    /// Replace `length` characters at `start` with `text`.
    pub fn replace(start: usize, length: usize, text: impl Into<String>) -> Self {
        Self {
            action: DiffAction::Replace,
            start,
            length,
            block: None,
            text: Some(text.into()),
        }
    }

    /// Remove `length` characters at `start` into clipboard slot `block`.
    pub fn cut(start: usize, length: usize, block: u64) -> Self {
        Self {
            action: DiffAction::Cut,
            start,
            length,
            block: Some(block),
            text: None,
        }
    }

    /// Insert a moved block at `start`.
    ///
    /// The text payload duplicates the cut content so a decoder can replay
    /// a paste without having tracked the matching cut.
    pub fn paste(start: usize, block: u64, text: impl Into<String>) -> Self {
        let text = text.into();
        let length = text.chars().count();
        Self {
            action: DiffAction::Paste,
            start,
            length,
            block: Some(block),
            text: Some(text),
        }
    }

    /// A complete undiffed snapshot of the revision text.
    pub fn full_revision(text: impl Into<String>) -> Self {
        let text = text.into();
        let length = text.chars().count();
        Self {
            action: DiffAction::FullRevisionUncompressed,
            start: 0,
            length,
            block: None,
            text: Some(text),
        }
    }

    /// Opaque decoder metadata tagged with `block`. Ignored on replay.
    pub fn decoder_data(block: u64, payload: impl Into<String>) -> Self {
        Self {
            action: DiffAction::DecoderData,
            start: 0,
            length: 0,
            block: Some(block),
            text: Some(payload.into()),
        }
    }

    /// Rebuilds a part from decoded wire fields, validating the
    /// action/payload invariant.
    pub fn from_wire(
        action: DiffAction,
        start: usize,
        length: usize,
        block: Option<u64>,
        text: Option<String>,
    ) -> Result<Self, DiffError> {
        if action.carries_text() != text.is_some() {
            return Err(DiffError::InvalidPart {
                action: action.name(),
                reason: if action.carries_text() {
                    "requires a text payload"
                } else {
                    "must not carry a text payload"
                },
            });
        }
        if action.carries_block() != block.is_some() {
            return Err(DiffError::InvalidPart {
                action: action.name(),
                reason: if action.carries_block() {
                    "requires a block id"
                } else {
                    "must not carry a block id"
                },
            });
        }
        Ok(Self {
            action,
            start,
            length,
            block,
            text,
        })
    }

    pub fn action(&self) -> DiffAction {
        self.action
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn length(&self) -> usize {
        self.length
    }

    /// `start + length`.
    pub fn end(&self) -> usize {
        self.start + self.length
    }

    pub fn block(&self) -> Option<u64> {
        self.block
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }
}

/// An ordered edit script plus the metadata of the revision it produces.
///
/// Part order is semantically significant: replay applies each part in
/// sequence against the evolving buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diff {
    pub meta: RevisionMeta,
    parts: Vec<DiffPart>,
}

impl Diff {
    pub fn new(meta: RevisionMeta, parts: Vec<DiffPart>) -> Self {
        Self { meta, parts }
    }

    pub fn parts(&self) -> &[DiffPart] {
        &self.parts
    }

    /// Whether this diff is a full snapshot rather than an edit chain link.
    pub fn is_full_revision(&self) -> bool {
        self.parts
            .first()
            .is_some_and(|p| p.action() == DiffAction::FullRevisionUncompressed)
    }

    /// Estimated encoded size in bytes, used for task byte accounting.
    pub fn size_estimate(&self) -> usize {
        let payload: usize = self
            .parts
            .iter()
            .map(|p| p.text().map_or(8, |t| t.len() + 8))
            .sum();
        payload + self.meta.comment.len() + self.meta.contributor.name.len() + 64
    }

    /// Replays this edit script against `base`, producing the revision text.
    pub fn apply(&self, base: &str) -> Result<String, DiffError> {
        let mut buffer: Vec<char> = base.chars().collect();
        let mut clipboard: HashMap<u64, Vec<char>> = HashMap::new();

        for part in &self.parts {
            apply_part(part, &mut buffer, &mut clipboard)?;
        }
        Ok(buffer.into_iter().collect())
    }
}

fn apply_part(
    part: &DiffPart,
    buffer: &mut Vec<char>,
    clipboard: &mut HashMap<u64, Vec<char>>,
) -> Result<(), DiffError> {
    let bounds_err = || DiffError::OutOfBounds {
        action: part.action.name(),
        start: part.start,
        len: buffer.len(),
    };

    match part.action {
        DiffAction::Insert => {
            if part.start > buffer.len() {
                return Err(bounds_err());
            }
            let text: Vec<char> = part.text
                .as_deref()
                .unwrap_or_default()
                .chars()
                .collect();
            buffer.splice(part.start..part.start, text);
        }
        DiffAction::Delete => {
            if part.end() > buffer.len() {
                return Err(bounds_err());
            }
            buffer.drain(part.start..part.end());
        }
        DiffAction::Replace => {
            if part.end() > buffer.len() {
                return Err(bounds_err());
            }
            let text: Vec<char> = part.text
                .as_deref()
                .unwrap_or_default()
                .chars()
                .collect();
            buffer.splice(part.start..part.end(), text);
        }
        DiffAction::Cut => {
            if part.end() > buffer.len() {
                return Err(bounds_err());
            }
            let cut: Vec<char> = buffer.drain(part.start..part.end()).collect();
            // Constructor guarantees the block id is present.
            let block = part.block.unwrap_or_default();
            clipboard.insert(block, cut);
        }
        DiffAction::Paste => {
            if part.start > buffer.len() {
                return Err(bounds_err());
            }
            let block = part.block.unwrap_or_default();
            // Prefer the cut content; the payload is the self-contained
            // fallback for decoders replaying a paste in isolation.
            let pasted = clipboard.remove(&block).unwrap_or_else(|| {
                part.text.as_deref().unwrap_or_default().chars().collect()
            });
            buffer.splice(part.start..part.start, pasted);
        }
        DiffAction::FullRevisionUncompressed => {
            buffer.clear();
            buffer.extend(part.text.as_deref().unwrap_or_default().chars());
        }
        DiffAction::DecoderData => {
            // Codec metadata rides the wire but does not touch the text.
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use revarc_types::{ArticleId, Contributor, RevisionCounter, RevisionId, Timestamp};

    use super::*;

    fn meta() -> RevisionMeta {
        RevisionMeta {
            id: RevisionId::new(10),
            article_id: ArticleId::new(1),
            counter: RevisionCounter::new(2),
            timestamp: Timestamp::from_millis(1_000),
            contributor: Contributor::registered("alice", 7),
            comment: "test edit".to_string(),
            minor: false,
        }
    }

    #[test]
    fn ordinals_roundtrip() {
        for ordinal in 0..=6u8 {
            let action = DiffAction::from_ordinal(ordinal).unwrap();
            assert_eq!(action.ordinal(), ordinal);
        }
        assert_eq!(DiffAction::from_ordinal(7), None);
    }

    #[test]
    fn insert_length_is_char_count() {
        let part = DiffPart::insert(3, "héllo");
        assert_eq!(part.length(), 5);
        assert_eq!(part.end(), 8);
    }

    #[test]
    fn apply_insert_delete_replace() {
        let parts = vec![
            DiffPart::insert(5, " cruel"),
            DiffPart::delete(0, 5),
            DiffPart::replace(1, 5, "kind"),
        ];
        let diff = Diff::new(meta(), parts);
        // "hello world" -> "hello cruel world" -> " cruel world" -> " kind world"
        assert_eq!(diff.apply("hello world").unwrap(), " kind world");
    }

    #[test]
    fn apply_cut_paste_moves_block() {
        let parts = vec![DiffPart::cut(0, 4, 0), DiffPart::paste(4, 0, "one ")];
        let diff = Diff::new(meta(), parts);
        // "one two x" -> "two x" -> "two one x"
        assert_eq!(diff.apply("one two x").unwrap(), "two one x");
    }

    #[test]
    fn paste_falls_back_to_payload_without_cut() {
        let diff = Diff::new(meta(), vec![DiffPart::paste(0, 3, "moved ")]);
        assert_eq!(diff.apply("tail").unwrap(), "moved tail");
    }

    #[test]
    fn apply_full_revision_replaces_buffer() {
        let diff = Diff::new(meta(), vec![DiffPart::full_revision("fresh text")]);
        assert_eq!(diff.apply("anything at all").unwrap(), "fresh text");
        assert!(diff.is_full_revision());
    }

    #[test]
    fn apply_out_of_bounds_fails() {
        let diff = Diff::new(meta(), vec![DiffPart::delete(10, 5)]);
        let err = diff.apply("short").unwrap_err();
        assert!(matches!(err, DiffError::OutOfBounds { .. }));
    }

    #[test]
    fn decoder_data_is_inert_on_replay() {
        let diff = Diff::new(meta(), vec![DiffPart::decoder_data(1, "v1-metadata")]);
        assert_eq!(diff.apply("unchanged").unwrap(), "unchanged");
    }

    #[test]
    fn from_wire_rejects_mismatched_payload() {
        let err =
            DiffPart::from_wire(DiffAction::Delete, 0, 3, None, Some("x".into())).unwrap_err();
        assert!(matches!(err, DiffError::InvalidPart { .. }));

        let err = DiffPart::from_wire(DiffAction::Insert, 0, 1, None, None).unwrap_err();
        assert!(matches!(err, DiffError::InvalidPart { .. }));

        let err = DiffPart::from_wire(DiffAction::Cut, 0, 1, None, None).unwrap_err();
        assert!(matches!(err, DiffError::InvalidPart { .. }));
    }
}
