//! Revision input abstraction.
//!
//! A source yields a flat record stream: a page-start record followed by
//! that page's revisions, then the next page, until exhausted. Revision
//! text arrives as raw bytes; the page export format does not guarantee
//! valid UTF-8, and the producer decides what to do with bad sequences.

use revarc_types::{Contributor, PageHeader, RevisionId, Timestamp};

/// A revision as read from the dump, before filtering and counting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRevision {
    pub id: RevisionId,
    pub timestamp: Timestamp,
    pub contributor: Contributor,
    pub comment: String,
    pub minor: bool,
    /// Raw text bytes, not yet validated as UTF-8.
    pub text: Vec<u8>,
}

impl RawRevision {
    /// Rough in-memory footprint, used for queue byte accounting.
    pub fn size_estimate(&self) -> usize {
        self.text.len() + self.comment.len() + self.contributor.name.len() + 64
    }
}

/// One record from the dump stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceRecord {
    /// Start of a new page; subsequent revisions belong to it.
    PageStart(PageHeader),
    Revision(RawRevision),
}

/// Pull-based reader over one dump archive.
pub trait RevisionSource: Send {
    /// Yields the next record, or `None` at end of archive.
    fn next_record(&mut self) -> Option<SourceRecord>;
}

/// In-memory source backed by a pre-built record list.
#[derive(Debug, Default)]
pub struct VecSource {
    records: std::vec::IntoIter<SourceRecord>,
}

impl VecSource {
    pub fn new(records: Vec<SourceRecord>) -> Self {
        Self {
            records: records.into_iter(),
        }
    }
}

impl RevisionSource for VecSource {
    fn next_record(&mut self) -> Option<SourceRecord> {
        self.records.next()
    }
}
