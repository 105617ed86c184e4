//! # revarc
//!
//! Compact revision archive for full-history wiki dumps.
//!
//! revarc turns a page/revision export into a chronologically ordered
//! archive of bit-packed diffs plus the index tables needed to pull any
//! single revision back out without replaying the whole history:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                             revarc                               │
//! │  ┌──────────┐   ┌──────────┐   ┌───────────┐   ┌──────────────┐  │
//! │  │ Producer │ → │  Diff    │ → │  Codec    │ → │ Store + Sink │  │
//! │  │ (parse)  │   │ (blocks) │   │ (bitpack) │   │ (indices)    │  │
//! │  └──────────┘   └──────────┘   └───────────┘   └──────────────┘  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each revision is stored either as a full snapshot or as an edit script
//! against its predecessor; snapshots anchor replay so reconstruction of
//! revision *k* touches only the snapshot and the diffs after it.
//!
//! # Quick Start
//!
//! ```ignore
//! use revarc::{Archiver, ConfigLoader, CsvSink, VecSource};
//!
//! let config = ConfigLoader::new().load()?;
//! let base64 = config.output.base64_payloads;
//! let archiver = Archiver::new(config);
//! let report = archiver.run(
//!     |archive| open_dump(archive),
//!     |consumer| CsvSink::new(output_for(consumer), base64),
//! )?;
//! println!("{} revisions archived", report.producer.revisions);
//! ```
//!
//! # Modules
//!
//! - **Pipeline**: [`Archiver`], [`Coordinator`] - ingestion entry points
//! - **Foundation**: IDs, metadata, diff model, bit-level codec
//! - **Storage**: chronological store and index builders

pub use revarc_codec::{
    decode_parts, encode_parts, BitReader, BitWriter, CodecData, CodecWidths, DecodingError,
    EncodingError, CODEC_VERSION,
};
pub use revarc_config::{
    ConfigError, ConfigLoader, FilterConfig, OutputConfig, PipelineConfig, RevarcConfig,
};
pub use revarc_diff::{Diff, DiffAction, DiffBlock, DiffCalculator, DiffError, DiffPart};
pub use revarc_pipeline::{
    ArchiveManager, ArticleFilter, ArticleHeader, ArticleProducer, ConsumerStats, Coordinator,
    CoordinatorReport, CsvSink, DiffConsumer, DiffRecord, DiffWorker, IndexTable, PipelineError,
    ProducerReport, RawRevision, RevisionSink, RevisionSource, SourceRecord, SqlSink, Task,
    TaskKind, VecSource,
};
pub use revarc_store::{
    ArticleIndexBuilder, ChronoIndexBuilder, ChronoStorage, IndexChunk, IndexSink,
    RevisionIndexBuilder, StoreError, StoredPayload,
};
pub use revarc_types::{
    ArchiveDescription, ArchiveKind, ArticleId, Contributor, PageHeader, Revision,
    RevisionCounter, RevisionId, RevisionMeta, SurrogateMode, Timestamp,
};

/// High-level entry point: a configured pipeline ready to run.
///
/// Thin wrapper over [`Coordinator`] that validates the configuration
/// before spawning anything.
pub struct Archiver {
    coordinator: Coordinator,
}

impl Archiver {
    pub fn new(config: RevarcConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            coordinator: Coordinator::new(config),
        })
    }

    /// Runs the pipeline to completion over the configured archives.
    pub fn run<F, G, S>(&self, open_source: F, make_sink: G) -> anyhow::Result<CoordinatorReport>
    where
        F: Fn(&ArchiveDescription) -> Box<dyn RevisionSource>,
        G: Fn(usize) -> S,
        S: RevisionSink + 'static,
    {
        Ok(self.coordinator.run(open_source, make_sink)?)
    }

    /// Requests an orderly stop; in-flight work still drains.
    pub fn shutdown(&self) {
        self.coordinator.shutdown();
    }

    pub fn is_shutdown(&self) -> bool {
        self.coordinator.is_shutdown()
    }
}
