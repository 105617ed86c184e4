//! The three archive index builders and their chunked output path.
//!
//! Builders buffer serialized records and hand them to an [`IndexSink`] in
//! chunks bounded by a maximum packet size: a chunk is finalized whenever
//! appending the next record would exceed the bound. Records are
//! newline-terminated, fields tab-separated.

use bytes::{Bytes, BytesMut};
use revarc_types::{ArticleId, RevisionCounter, RevisionId};
use tracing::trace;

use crate::StoreError;

/// One finalized batch of index records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexChunk {
    /// Monotonic per-builder chunk number, for downstream ordering.
    pub sequence: u64,
    pub data: Bytes,
}

/// Destination for finalized index chunks.
pub trait IndexSink {
    fn write_chunk(&mut self, chunk: IndexChunk) -> Result<(), StoreError>;
}

/// Test/simple sink that collects chunks in memory.
#[derive(Debug, Default)]
pub struct CollectSink {
    pub chunks: Vec<IndexChunk>,
}

impl IndexSink for CollectSink {
    fn write_chunk(&mut self, chunk: IndexChunk) -> Result<(), StoreError> {
        self.chunks.push(chunk);
        Ok(())
    }
}

/// Size-bounded record buffer shared by the three builders.
#[derive(Debug)]
struct ChunkBuffer {
    max_packet: usize,
    buf: BytesMut,
    sequence: u64,
}

impl ChunkBuffer {
    fn new(max_packet: usize) -> Self {
        assert!(max_packet > 0, "max packet size must be positive");
        Self {
            max_packet,
            buf: BytesMut::new(),
            sequence: 0,
        }
    }

    fn append(&mut self, record: &str, sink: &mut dyn IndexSink) -> Result<(), StoreError> {
        if record.len() > self.max_packet {
            return Err(StoreError::RecordTooLarge {
                record: record.len(),
                max: self.max_packet,
            });
        }
        if !self.buf.is_empty() && self.buf.len() + record.len() > self.max_packet {
            self.flush(sink)?;
        }
        self.buf.extend_from_slice(record.as_bytes());
        Ok(())
    }

    fn flush(&mut self, sink: &mut dyn IndexSink) -> Result<(), StoreError> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let chunk = IndexChunk {
            sequence: self.sequence,
            data: self.buf.split().freeze(),
        };
        trace!(sequence = chunk.sequence, bytes = chunk.data.len(), "index chunk finalized");
        self.sequence += 1;
        sink.write_chunk(chunk)
    }
}

/// Records the counter↔chronological permutation per article, sparsely.
///
/// Only positions where the two orderings disagree are stored, so an
/// article whose revisions are already in time order costs O(1) space
/// regardless of its length.
#[derive(Debug)]
pub struct ChronoIndexBuilder {
    buffer: ChunkBuffer,
}

impl ChronoIndexBuilder {
    pub fn new(max_packet: usize) -> Self {
        Self {
            buffer: ChunkBuffer::new(max_packet),
        }
    }

    /// Appends one article's permutation record.
    ///
    /// `order` is `(counter, chronological index)` in counter order, as
    /// produced by `ChronoStorage::finalize_article`.
    pub fn article_done(
        &mut self,
        article: ArticleId,
        order: &[(RevisionCounter, u32)],
        sink: &mut dyn IndexSink,
    ) -> Result<(), StoreError> {
        let (forward, reverse) = sparse_permutation(order);
        let record = format!("{article}\t{forward}\t{reverse}\n");
        self.buffer.append(&record, sink)
    }

    pub fn flush(&mut self, sink: &mut dyn IndexSink) -> Result<(), StoreError> {
        self.buffer.flush(sink)
    }
}

/// Computes the sparse forward (counter position → chronological index) and
/// reverse (chronological position → counter) mappings, omitting identity
/// entries. Both are space-separated `from:to` pairs.
fn sparse_permutation(order: &[(RevisionCounter, u32)]) -> (String, String) {
    let mut forward = String::new();
    for (position, &(_, chrono)) in order.iter().enumerate() {
        let expected = position as u32 + 1;
        if chrono != expected {
            if !forward.is_empty() {
                forward.push(' ');
            }
            forward.push_str(&format!("{expected}:{chrono}"));
        }
    }

    let mut by_chrono: Vec<(u32, u32)> = order
        .iter()
        .enumerate()
        .map(|(position, &(_, chrono))| (chrono, position as u32 + 1))
        .collect();
    by_chrono.sort_unstable();

    let mut reverse = String::new();
    for &(chrono, counter_position) in &by_chrono {
        if counter_position != chrono {
            if !reverse.is_empty() {
                reverse.push(' ');
            }
            reverse.push_str(&format!("{chrono}:{counter_position}"));
        }
    }
    (forward, reverse)
}

/// Records, per storage block, the covering full revision and the counter
/// range it spans.
#[derive(Debug)]
pub struct ArticleIndexBuilder {
    buffer: ChunkBuffer,
}

impl ArticleIndexBuilder {
    pub fn new(max_packet: usize) -> Self {
        Self {
            buffer: ChunkBuffer::new(max_packet),
        }
    }

    pub fn add(
        &mut self,
        article: ArticleId,
        full_revision: RevisionId,
        start: RevisionCounter,
        end: RevisionCounter,
        sink: &mut dyn IndexSink,
    ) -> Result<(), StoreError> {
        let record = format!("{article}\t{full_revision}\t{start}\t{end}\n");
        self.buffer.append(&record, sink)
    }

    pub fn flush(&mut self, sink: &mut dyn IndexSink) -> Result<(), StoreError> {
        self.buffer.flush(sink)
    }
}

/// Maps a revision id to its storage primary key and covering full
/// revision, for O(1) point lookups.
#[derive(Debug)]
pub struct RevisionIndexBuilder {
    buffer: ChunkBuffer,
}

impl RevisionIndexBuilder {
    pub fn new(max_packet: usize) -> Self {
        Self {
            buffer: ChunkBuffer::new(max_packet),
        }
    }

    pub fn add(
        &mut self,
        revision: RevisionId,
        primary_key: u64,
        full_revision: RevisionId,
        sink: &mut dyn IndexSink,
    ) -> Result<(), StoreError> {
        let record = format!("{revision}\t{primary_key}\t{full_revision}\n");
        self.buffer.append(&record, sink)
    }

    pub fn flush(&mut self, sink: &mut dyn IndexSink) -> Result<(), StoreError> {
        self.buffer.flush(sink)
    }
}
