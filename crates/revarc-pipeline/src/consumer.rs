//! Storage and output stage.
//!
//! A consumer owns one input queue, one revision store, and one sink.
//! Incoming diffs are encoded and appended to the store immediately, but
//! nothing reaches the sink until the article's final part arrives: an
//! article is either written completely or not at all. Completion resolves
//! the chronological ordering, assigns dense primary keys, and feeds the
//! three index builders.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use revarc_codec::encode_parts;
use revarc_diff::Diff;
use revarc_store::{
    ArticleIndexBuilder, BlockHandle, ChronoIndexBuilder, ChronoStorage, CollectSink,
    RevisionIndexBuilder, StoredPayload,
};
use revarc_types::{ArticleId, RevisionId};

use crate::error::PipelineError;
use crate::queue::TaskQueue;
use crate::sink::{DiffRecord, IndexTable, RevisionSink};
use crate::task::{Task, TaskKind};

/// Poll interval while the input queue is empty.
const IDLE_WAIT: Duration = Duration::from_millis(5);

/// Time split of a consumer's run, for pool sizing.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsumerStats {
    pub working: Duration,
    pub sleeping: Duration,
    pub revisions_written: u64,
    pub articles_completed: u64,
    pub articles_banned: u64,
}

impl ConsumerStats {
    /// Fraction of run time spent doing work rather than waiting.
    pub fn efficiency(&self) -> f64 {
        let total = self.working + self.sleeping;
        if total.is_zero() {
            return 1.0;
        }
        self.working.as_secs_f64() / total.as_secs_f64()
    }
}

/// Output buffered for an article still awaiting its final part.
#[derive(Debug, Default)]
struct PendingArticle {
    handles: Vec<BlockHandle>,
    records: Vec<DiffRecord>,
}

/// One thread's worth of encoding, storage, and output.
pub struct DiffConsumer<S: RevisionSink> {
    id: usize,
    input: Arc<TaskQueue<Task<Diff>>>,
    store: ChronoStorage,
    sink: S,
    pending: HashMap<ArticleId, PendingArticle>,
    chrono_index: ChronoIndexBuilder,
    article_index: ArticleIndexBuilder,
    revision_index: RevisionIndexBuilder,
    chrono_chunks: CollectSink,
    article_chunks: CollectSink,
    revision_chunks: CollectSink,
    /// Shared across the pool; keys stay unique when several consumers
    /// deliver concurrently.
    primary_keys: Arc<AtomicU64>,
    shutdown: Arc<AtomicBool>,
    stats: ConsumerStats,
}

impl<S: RevisionSink> DiffConsumer<S> {
    pub fn new(
        id: usize,
        input: Arc<TaskQueue<Task<Diff>>>,
        sink: S,
        max_packet: usize,
        primary_keys: Arc<AtomicU64>,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        Self {
            id,
            input,
            store: ChronoStorage::new(),
            sink,
            pending: HashMap::new(),
            chrono_index: ChronoIndexBuilder::new(max_packet),
            article_index: ArticleIndexBuilder::new(max_packet),
            revision_index: RevisionIndexBuilder::new(max_packet),
            chrono_chunks: CollectSink::default(),
            article_chunks: CollectSink::default(),
            revision_chunks: CollectSink::default(),
            primary_keys,
            shutdown,
            stats: ConsumerStats::default(),
        }
    }

    /// Requests a stop; the running loop observes it before its next pull.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Processes tasks until the end-of-stream marker arrives or shutdown
    /// is requested, then flushes every builder and the sink. The shutdown
    /// check sits between pulls; delivered articles stay delivered, and a
    /// half-consumed one is never persisted.
    pub fn run(&mut self) -> Result<ConsumerStats, PipelineError> {
        loop {
            if self.is_shutdown() {
                self.finish()?;
                debug!(consumer = self.id, "consumer stopping on shutdown request");
                return Ok(self.stats);
            }
            let waited = Instant::now();
            let Some(task) = self.input.pop_timeout(IDLE_WAIT) else {
                self.stats.sleeping += waited.elapsed();
                continue;
            };
            self.stats.sleeping += waited.elapsed();

            let started = Instant::now();
            let kind = task.kind();
            let result = match kind {
                TaskKind::End => {
                    self.finish()?;
                    self.stats.working += started.elapsed();
                    debug!(consumer = self.id, "consumer drained on end of stream");
                    return Ok(self.stats);
                }
                TaskKind::Dummy => Ok(()),
                TaskKind::Banned => {
                    self.ban(&task);
                    Ok(())
                }
                _ => self.process(task),
            };
            self.stats.working += started.elapsed();
            result?;
        }
    }

    /// Encodes and stores one task's diffs, delivering the article if this
    /// task completes it.
    pub fn process(&mut self, task: Task<Diff>) -> Result<(), PipelineError> {
        let header = task
            .header()
            .cloned()
            .expect("data task without article header");
        let completes = task.kind().completes_article();

        for diff in task.into_items() {
            let payload = encode_parts(diff.parts())?;
            let full_text = diff
                .parts()
                .first()
                .filter(|_| diff.is_full_revision())
                .and_then(|part| part.text())
                .map(str::to_owned);
            let meta = diff.meta.clone();

            let stored = match full_text {
                Some(text) => StoredPayload::Full(text),
                None => StoredPayload::Diff(payload.clone()),
            };
            let handle = self.store.append(meta.clone(), stored)?;
            let anchor = self.anchor_id(handle);

            let entry = self.pending.entry(header.id).or_default();
            entry.handles.push(handle);
            entry.records.push(DiffRecord {
                // Assigned when the article is delivered.
                primary_key: 0,
                article: meta.article_id,
                revision: meta.id,
                counter: meta.counter,
                timestamp: meta.timestamp,
                contributor: meta.contributor.name,
                contributor_id: meta.contributor.id,
                contributor_registered: meta.contributor.registered,
                comment: meta.comment,
                minor: meta.minor,
                full_revision: anchor,
                payload,
            });
        }

        if completes {
            self.complete(header.id)?;
        }
        Ok(())
    }

    /// Delivers one finished article: ordering, primary keys, revision
    /// rows, and all three indices.
    fn complete(&mut self, article: ArticleId) -> Result<(), PipelineError> {
        let Some(pending) = self.pending.remove(&article) else {
            // Every revision of the article was discarded upstream.
            debug!(consumer = self.id, %article, "article completed empty");
            return Ok(());
        };

        let order = self.store.finalize_article(article);

        // One contiguous key run per article keeps its rows adjacent.
        let count = pending.records.len() as u64;
        let mut next_key = self.primary_keys.fetch_add(count, Ordering::Relaxed);

        for (handle, mut record) in pending.handles.iter().zip(pending.records) {
            record.primary_key = next_key;
            next_key += 1;

            self.sink.write_revision(&record)?;
            self.revision_index.add(
                record.revision,
                record.primary_key,
                record.full_revision,
                &mut self.revision_chunks,
            )?;
            self.store.mark_delivered(*handle);
            self.stats.revisions_written += 1;
        }

        self.article_segments(article, &pending.handles)?;
        self.chrono_index
            .article_done(article, &order, &mut self.chrono_chunks)?;
        self.drain_chunks()?;

        self.stats.articles_completed += 1;
        Ok(())
    }

    /// Covering full revision of a stored block.
    fn anchor_id(&self, handle: BlockHandle) -> RevisionId {
        let anchor = self
            .store
            .block(handle)
            .full_revision
            .expect("appended block without anchor");
        self.store.revision(anchor).meta.id
    }

    /// Emits one article-index entry per full-revision segment: the
    /// snapshot and the counter range it covers.
    fn article_segments(
        &mut self,
        article: ArticleId,
        handles: &[BlockHandle],
    ) -> Result<(), PipelineError> {
        let mut run: Option<(BlockHandle, BlockHandle)> = None;
        let anchor_of = |handle: BlockHandle| {
            self.store
                .block(handle)
                .full_revision
                .expect("appended block without anchor")
        };

        let mut segments: Vec<(BlockHandle, BlockHandle, BlockHandle)> = Vec::new();
        for &handle in handles {
            let anchor = anchor_of(handle);
            match run {
                Some((start, _)) if anchor_of(start) == anchor => {
                    run = Some((start, handle));
                }
                Some((start, end)) => {
                    segments.push((anchor_of(start), start, end));
                    run = Some((handle, handle));
                }
                None => run = Some((handle, handle)),
            }
        }
        if let Some((start, end)) = run {
            segments.push((anchor_of(start), start, end));
        }

        for (anchor, start, end) in segments {
            self.article_index.add(
                article,
                self.store.revision(anchor).meta.id,
                self.store.block(start).counter,
                self.store.block(end).counter,
                &mut self.article_chunks,
            )?;
        }
        Ok(())
    }

    /// Drops a banned article without writing anything for it.
    fn ban(&mut self, task: &Task<Diff>) {
        let Some(header) = task.header() else {
            return;
        };
        let dropped = self.pending.remove(&header.id);
        warn!(
            consumer = self.id,
            article = %header.id,
            name = %header.name,
            buffered = dropped.map_or(0, |pending| pending.records.len()),
            "article banned, output dropped"
        );
        self.stats.articles_banned += 1;
    }

    /// Flushes the index builders and the sink at end of stream.
    fn finish(&mut self) -> Result<(), PipelineError> {
        if !self.pending.is_empty() {
            warn!(
                consumer = self.id,
                articles = self.pending.len(),
                "end of stream with incomplete articles, dropping them"
            );
            self.pending.clear();
        }
        self.chrono_index.flush(&mut self.chrono_chunks)?;
        self.article_index.flush(&mut self.article_chunks)?;
        self.revision_index.flush(&mut self.revision_chunks)?;
        self.drain_chunks()?;
        self.sink.flush()?;
        info!(
            consumer = self.id,
            revisions = self.stats.revisions_written,
            articles = self.stats.articles_completed,
            banned = self.stats.articles_banned,
            "consumer finished"
        );
        Ok(())
    }

    fn drain_chunks(&mut self) -> Result<(), PipelineError> {
        for chunk in self.chrono_chunks.chunks.drain(..) {
            self.sink.write_index(IndexTable::Chrono, &chunk)?;
        }
        for chunk in self.article_chunks.chunks.drain(..) {
            self.sink.write_index(IndexTable::Article, &chunk)?;
        }
        for chunk in self.revision_chunks.chunks.drain(..) {
            self.sink.write_index(IndexTable::Revision, &chunk)?;
        }
        Ok(())
    }

    /// Reconstructs a stored revision's text, for verification reads.
    pub fn materialize(
        &self,
        article: ArticleId,
        counter: revarc_types::RevisionCounter,
    ) -> Result<String, PipelineError> {
        Ok(self.store.materialize(article, counter)?)
    }

    pub fn stats(&self) -> ConsumerStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use revarc_store::IndexChunk;
    use revarc_types::{
        Contributor, RevisionCounter, RevisionId, RevisionMeta, Timestamp,
    };

    use crate::task::ArticleHeader;

    use super::*;

    #[derive(Default, Clone)]
    struct MemorySink {
        revisions: Arc<Mutex<Vec<DiffRecord>>>,
        indices: Arc<Mutex<Vec<(IndexTable, IndexChunk)>>>,
        flushed: Arc<Mutex<bool>>,
    }

    impl RevisionSink for MemorySink {
        fn write_revision(&mut self, record: &DiffRecord) -> Result<(), PipelineError> {
            self.revisions.lock().unwrap().push(record.clone());
            Ok(())
        }

        fn write_index(
            &mut self,
            table: IndexTable,
            chunk: &IndexChunk,
        ) -> Result<(), PipelineError> {
            self.indices.lock().unwrap().push((table, chunk.clone()));
            Ok(())
        }

        fn flush(&mut self) -> Result<(), PipelineError> {
            *self.flushed.lock().unwrap() = true;
            Ok(())
        }
    }

    fn meta(article: u64, counter: u32, millis: i64) -> RevisionMeta {
        RevisionMeta {
            id: RevisionId::new(article * 1_000 + u64::from(counter)),
            article_id: ArticleId::new(article),
            counter: RevisionCounter::new(counter),
            timestamp: Timestamp::from_millis(millis),
            contributor: Contributor::registered("editor", 7),
            comment: format!("edit {counter}"),
            minor: false,
        }
    }

    fn diff_chain(article: u64, texts: &[&str], millis: &[i64]) -> Vec<Diff> {
        let mut calculator = revarc_diff::DiffCalculator::new();
        let mut previous: Option<String> = None;
        texts
            .iter()
            .zip(millis)
            .enumerate()
            .map(|(index, (text, &stamp))| {
                let diff = calculator
                    .calculate(
                        meta(article, index as u32 + 1, stamp),
                        previous.as_deref(),
                        text,
                    )
                    .unwrap();
                previous = Some((*text).to_owned());
                diff
            })
            .collect()
    }

    fn consumer(sink: MemorySink) -> DiffConsumer<MemorySink> {
        let input = Arc::new(TaskQueue::new(8, 1 << 20));
        DiffConsumer::new(
            0,
            input,
            sink,
            1 << 14,
            Arc::new(AtomicU64::new(1)),
            Arc::new(AtomicBool::new(false)),
        )
    }

    fn full_task(article: u64, diffs: Vec<Diff>) -> Task<Diff> {
        let mut task = Task::new(
            TaskKind::Full,
            ArticleHeader {
                id: ArticleId::new(article),
                name: format!("Article {article}"),
            },
            1,
        );
        for diff in diffs {
            let size = diff.size_estimate();
            task.push(diff, size);
        }
        task
    }

    #[test]
    fn completed_article_is_written_with_dense_keys() {
        let sink = MemorySink::default();
        let mut consumer = consumer(sink.clone());
        let diffs = diff_chain(1, &["one", "one two", "one two three"], &[100, 200, 300]);

        consumer.process(full_task(1, diffs)).unwrap();

        let written = sink.revisions.lock().unwrap();
        assert_eq!(written.len(), 3);
        let keys: Vec<u64> = written.iter().map(|r| r.primary_key).collect();
        assert_eq!(keys, vec![1, 2, 3]);
        assert!(written[0].is_snapshot());
        assert!(!written[1].is_snapshot());
        // All three share the first revision as their anchor.
        assert!(written.iter().all(|r| r.full_revision == written[0].revision));
    }

    #[test]
    fn stored_revisions_materialize_back_to_their_text() {
        let sink = MemorySink::default();
        let mut consumer = consumer(sink);
        let texts = ["alpha beta", "alpha gamma beta", "gamma beta"];
        let diffs = diff_chain(4, &texts, &[10, 20, 30]);

        consumer.process(full_task(4, diffs)).unwrap();

        for (index, expected) in texts.iter().enumerate() {
            let text = consumer
                .materialize(ArticleId::new(4), RevisionCounter::new(index as u32 + 1))
                .unwrap();
            assert_eq!(&text, expected);
        }
    }

    #[test]
    fn split_article_is_withheld_until_last_part() {
        let sink = MemorySink::default();
        let mut consumer = consumer(sink.clone());
        let diffs = diff_chain(2, &["a", "a b"], &[100, 200]);
        let mut iter = diffs.into_iter();

        let header = ArticleHeader {
            id: ArticleId::new(2),
            name: "Split".to_owned(),
        };
        let mut first = Task::new(TaskKind::PartialFirst, header.clone(), 1);
        let diff = iter.next().unwrap();
        let size = diff.size_estimate();
        first.push(diff, size);
        consumer.process(first).unwrap();
        assert!(sink.revisions.lock().unwrap().is_empty());

        let mut last = Task::new(TaskKind::PartialLast, header, 2);
        let diff = iter.next().unwrap();
        let size = diff.size_estimate();
        last.push(diff, size);
        consumer.process(last).unwrap();
        assert_eq!(sink.revisions.lock().unwrap().len(), 2);
    }

    #[test]
    fn banned_article_leaves_no_output() {
        let sink = MemorySink::default();
        let mut consumer = consumer(sink.clone());
        let diffs = diff_chain(3, &["x"], &[50]);

        let header = ArticleHeader {
            id: ArticleId::new(3),
            name: "Doomed".to_owned(),
        };
        let mut first = Task::new(TaskKind::PartialFirst, header.clone(), 1);
        let diff = diffs.into_iter().next().unwrap();
        let size = diff.size_estimate();
        first.push(diff, size);
        consumer.process(first).unwrap();

        consumer.ban(&Task::banned(header, 2));

        assert!(sink.revisions.lock().unwrap().is_empty());
        assert_eq!(consumer.stats().articles_banned, 1);
    }

    #[test]
    fn shutdown_flushes_and_stops_the_loop() {
        let sink = MemorySink::default();
        let mut consumer = consumer(sink.clone());
        let diffs = diff_chain(7, &["done"], &[10]);
        consumer.process(full_task(7, diffs)).unwrap();

        consumer.shutdown();
        assert!(consumer.is_shutdown());
        let stats = consumer.run().unwrap();

        // Delivered output survives the early stop and the sink is flushed.
        assert_eq!(stats.revisions_written, 1);
        assert_eq!(sink.revisions.lock().unwrap().len(), 1);
        assert!(*sink.flushed.lock().unwrap());
    }

    #[test]
    fn finish_flushes_indices_and_sink() {
        let sink = MemorySink::default();
        let mut consumer = consumer(sink.clone());
        // Timestamps out of counter order exercise the permutation record.
        let diffs = diff_chain(5, &["v1", "v2", "v3"], &[300, 100, 200]);
        consumer.process(full_task(5, diffs)).unwrap();
        consumer.finish().unwrap();

        let indices = sink.indices.lock().unwrap();
        let chrono: Vec<&IndexChunk> = indices
            .iter()
            .filter(|(table, _)| *table == IndexTable::Chrono)
            .map(|(_, chunk)| chunk)
            .collect();
        assert_eq!(chrono.len(), 1);
        let record = String::from_utf8(chrono[0].data.to_vec()).unwrap();
        // Counter 1 is chronologically last of three.
        assert!(record.starts_with("5\t"));
        assert!(record.contains("1:3"));
        assert!(*sink.flushed.lock().unwrap());

        let articles: Vec<&IndexChunk> = indices
            .iter()
            .filter(|(table, _)| *table == IndexTable::Article)
            .map(|(_, chunk)| chunk)
            .collect();
        assert_eq!(articles.len(), 1);
        let record = String::from_utf8(articles[0].data.to_vec()).unwrap();
        assert_eq!(record, "5\t5001\t1\t3\n");
    }
}
