//! # revarc-pipeline: Concurrent dump ingestion
//!
//! A multi-stage producer/consumer system turning page/revision streams
//! into encoded diff chains and index tables:
//!
//! ```text
//! ArchiveManager ──> ArticleProducer ──> DiffWorker pool ──> DiffConsumer pool
//!   (archive pool)    (Task<Revision>)    (Task<Diff>)        (encode + sink + indices)
//! ```
//!
//! Stage queues are bounded by item count *and* byte budget; handoffs block
//! with a deadline and fail with a typed timeout rather than stalling
//! forever. All parts of one article route to a single diff worker and a
//! single consumer, so part order and the revision *k-1* → *k* dependency
//! hold without locks; cross-article tasks interleave freely.
//!
//! Shutdown is cooperative and monotonic: each stage drains in-flight work,
//! signals via its shutdown flag, and the coordinator joins every thread
//! before reporting.

mod archive;
mod consumer;
mod coordinator;
mod error;
mod producer;
mod queue;
mod sink;
mod source;
mod task;
mod transmit;
mod worker;

pub use archive::ArchiveManager;
pub use consumer::{ConsumerStats, DiffConsumer};
pub use coordinator::{Coordinator, CoordinatorReport};
pub use error::PipelineError;
pub use producer::{ArticleFilter, ArticleProducer, ProducerReport};
pub use queue::{ByteSized, TaskQueue};
pub use sink::{CsvSink, DiffRecord, IndexTable, RevisionSink, SqlSink};
pub use source::{RawRevision, RevisionSource, SourceRecord, VecSource};
pub use task::{ArticleHeader, Task, TaskKind};
pub use transmit::{RoutedTransmitter, TaskTransmitter};
pub use worker::{DiffRouter, DiffWorker};
