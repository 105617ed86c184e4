//! Store error types.

use revarc_codec::DecodingError;
use revarc_diff::DiffError;
use revarc_types::{ArticleId, RevisionCounter};
use thiserror::Error;

/// Errors from the chronological store and the index builders.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No revision with this article/counter pair has been appended.
    #[error("unknown revision: article {article} counter {counter}")]
    UnknownRevision {
        article: ArticleId,
        counter: RevisionCounter,
    },

    /// A revision with this article/counter pair already exists.
    #[error("duplicate revision: article {article} counter {counter}")]
    DuplicateRevision {
        article: ArticleId,
        counter: RevisionCounter,
    },

    /// A diff was appended with no full revision anchoring its chain.
    #[error("article {article} has no full revision covering counter {counter}")]
    MissingFullRevision {
        article: ArticleId,
        counter: RevisionCounter,
    },

    /// An encoded diff in the chain failed to decode.
    #[error("diff chain decode failed: {0}")]
    Decode(#[from] DecodingError),

    /// A decoded diff failed to replay against the chain text.
    #[error("diff chain replay failed: {0}")]
    Replay(#[from] DiffError),

    /// A single index record exceeds the maximum chunk size.
    #[error("index record of {record} bytes exceeds the packet bound {max}")]
    RecordTooLarge { record: usize, max: usize },
}
