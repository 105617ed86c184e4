//! # revarc-types: Core types for `revarc`
//!
//! This crate contains shared types used across the revarc system:
//! - Entity IDs ([`ArticleId`], [`RevisionId`], [`RevisionCounter`])
//! - Temporal types ([`Timestamp`])
//! - Revision metadata ([`Revision`], [`Contributor`], [`PageHeader`])
//! - Surrogate handling policy ([`SurrogateMode`])
//! - Input archive descriptions ([`ArchiveKind`], [`ArchiveDescription`])

use std::fmt::{self, Display};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

// ============================================================================
// Entity IDs - All Copy (cheap 8-byte values)
// ============================================================================

/// Unique identifier for an article (a page in the dump).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ArticleId(u64);

impl ArticleId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

impl Display for ArticleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ArticleId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<ArticleId> for u64 {
    fn from(id: ArticleId) -> Self {
        id.0
    }
}

/// Unique identifier for a single revision, assigned by the dump.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RevisionId(u64);

impl RevisionId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

impl Display for RevisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for RevisionId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<RevisionId> for u64 {
    fn from(id: RevisionId) -> Self {
        id.0
    }
}

/// Position of a revision within its article, in dump order (1-based).
///
/// Counter order is the order revisions appear in the source stream, which
/// is not necessarily chronological. The store maintains both orderings.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct RevisionCounter(u32);

impl RevisionCounter {
    pub fn new(counter: u32) -> Self {
        Self(counter)
    }

    /// Returns the next counter in sequence.
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl Display for RevisionCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for RevisionCounter {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl From<RevisionCounter> for u32 {
    fn from(counter: RevisionCounter) -> Self {
        counter.0
    }
}

// ============================================================================
// Temporal types
// ============================================================================

/// A point in time as milliseconds since the Unix epoch.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct Timestamp(i64);

impl Timestamp {
    pub fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    pub fn as_millis(self) -> i64 {
        self.0
    }

    /// Returns the current wall-clock time.
    pub fn now() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_millis() as i64);
        Self(millis)
    }
}

impl Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Revision metadata
// ============================================================================

/// The author of a revision.
///
/// Anonymous edits carry the IP address as `name` and no `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contributor {
    pub name: String,
    pub id: Option<u64>,
    pub registered: bool,
}

impl Contributor {
    /// A registered contributor with a user id.
    pub fn registered(name: impl Into<String>, id: u64) -> Self {
        Self {
            name: name.into(),
            id: Some(id),
            registered: true,
        }
    }

    /// An anonymous contributor identified only by name/address.
    pub fn anonymous(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: None,
            registered: false,
        }
    }
}

/// Page-level metadata preceding a page's revisions in the source stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageHeader {
    pub article_id: ArticleId,
    pub name: String,
    pub namespace: i32,
}

/// Metadata shared by a raw revision and its computed diff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevisionMeta {
    pub id: RevisionId,
    pub article_id: ArticleId,
    pub counter: RevisionCounter,
    pub timestamp: Timestamp,
    pub contributor: Contributor,
    pub comment: String,
    pub minor: bool,
}

/// One revision of an article, as delivered by the dump reader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Revision {
    pub meta: RevisionMeta,
    pub text: String,
}

impl Revision {
    /// Estimated encoded size in bytes, used for task byte accounting.
    ///
    /// Deliberately coarse: the text dominates, metadata is a flat overhead.
    pub fn size_estimate(&self) -> usize {
        self.text.len() + self.meta.comment.len() + self.meta.contributor.name.len() + 64
    }
}

// ============================================================================
// Surrogate handling
// ============================================================================

/// Policy for revisions whose text contains malformed character sequences.
///
/// Only [`SurrogateMode::DiscardRevision`] has verified behavior. The other
/// modes exist in the configuration surface for forward compatibility but
/// are rejected at validation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SurrogateMode {
    /// Drop the whole revision and log the skip.
    DiscardRevision,
    /// Unverified: replace malformed sequences with U+FFFD.
    ReplaceSequence,
    /// Unverified: strip malformed sequences.
    StripSequence,
}

impl SurrogateMode {
    /// Whether this mode has verified, supported behavior.
    pub fn is_supported(self) -> bool {
        matches!(self, SurrogateMode::DiscardRevision)
    }
}

impl Default for SurrogateMode {
    fn default() -> Self {
        SurrogateMode::DiscardRevision
    }
}

// ============================================================================
// Input archives
// ============================================================================

/// Container format of one input archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveKind {
    Xml,
    Bzip2,
    SevenZip,
}

/// One input archive in the configured processing order.
///
/// Immutable after handout by the archive manager; `start_offset` lets a
/// resumed run skip already-processed bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveDescription {
    pub kind: ArchiveKind,
    pub path: PathBuf,
    #[serde(default)]
    pub start_offset: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn article_id_roundtrip() {
        let id = ArticleId::new(42);
        assert_eq!(u64::from(id), 42);
        assert_eq!(id.to_string(), "42");
    }

    #[test]
    fn counter_next_increments() {
        let c = RevisionCounter::new(1);
        assert_eq!(c.next(), RevisionCounter::new(2));
    }

    #[test]
    fn timestamp_ordering() {
        let a = Timestamp::from_millis(1_000);
        let b = Timestamp::from_millis(2_000);
        assert!(a < b);
        assert_eq!(a.as_millis(), 1_000);
    }

    #[test]
    fn contributor_constructors() {
        let reg = Contributor::registered("alice", 7);
        assert!(reg.registered);
        assert_eq!(reg.id, Some(7));

        let anon = Contributor::anonymous("127.0.0.1");
        assert!(!anon.registered);
        assert_eq!(anon.id, None);
    }

    #[test]
    fn only_discard_mode_is_supported() {
        assert!(SurrogateMode::DiscardRevision.is_supported());
        assert!(!SurrogateMode::ReplaceSequence.is_supported());
        assert!(!SurrogateMode::StripSequence.is_supported());
    }

    #[test]
    fn revision_size_estimate_tracks_text() {
        let rev = Revision {
            meta: RevisionMeta {
                id: RevisionId::new(1),
                article_id: ArticleId::new(1),
                counter: RevisionCounter::new(1),
                timestamp: Timestamp::from_millis(0),
                contributor: Contributor::anonymous("0.0.0.0"),
                comment: String::new(),
                minor: false,
            },
            text: "x".repeat(100),
        };
        assert!(rev.size_estimate() >= 100);
    }
}
