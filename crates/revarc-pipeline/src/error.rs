//! Pipeline error taxonomy.

use revarc_codec::EncodingError;
use revarc_diff::DiffError;
use revarc_store::StoreError;
use revarc_types::SurrogateMode;
use thiserror::Error;

/// Errors from the ingestion pipeline stages.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A bounded handoff found no queue space within its deadline.
    /// Retried by the caller's policy or escalated to a pipeline stall.
    #[error("{stage} transmission timed out after {waited_ms} ms")]
    Timeout { stage: &'static str, waited_ms: u64 },

    /// A single output record exceeded the packet limit on its own.
    #[error("output record of {size} bytes exceeds the {max} byte packet limit")]
    RecordTooLarge { size: usize, max: usize },

    /// A surrogate mode without verified behavior was selected.
    #[error("surrogate mode {mode:?} is unsupported; only DiscardRevision is verified")]
    UnsupportedSurrogateMode { mode: SurrogateMode },

    /// Diff calculation failed for a task even after a retry.
    #[error("diff calculation failed for article {article}: {reason}")]
    DiffFailed { article: u64, reason: String },

    /// Codec rejected a diff while encoding for output.
    #[error(transparent)]
    Encoding(#[from] EncodingError),

    /// Edit-script construction or replay failed.
    #[error(transparent)]
    Diff(#[from] DiffError),

    /// The revision store rejected an append or lookup.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// An output sink write failed.
    #[error("sink write failed: {source}")]
    Sink {
        #[from]
        source: std::io::Error,
    },
}
