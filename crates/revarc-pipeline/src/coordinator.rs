//! Pipeline assembly and life cycle.
//!
//! The coordinator wires queues and thread pools from the configuration,
//! drives archives through the producer on the calling thread, and runs
//! diff workers and consumers on named spawned threads. Shutdown is
//! monotonic: once requested it never un-requests, stage end markers flow
//! strictly downstream, and every thread is joined before the report is
//! returned.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

use tracing::{info, warn};

use revarc_config::RevarcConfig;
use revarc_diff::Diff;
use revarc_types::{ArchiveDescription, Revision};

use crate::archive::ArchiveManager;
use crate::consumer::{ConsumerStats, DiffConsumer};
use crate::error::PipelineError;
use crate::producer::{ArticleFilter, ArticleProducer, ProducerReport};
use crate::queue::TaskQueue;
use crate::sink::RevisionSink;
use crate::source::RevisionSource;
use crate::task::Task;
use crate::transmit::{RoutedTransmitter, TaskTransmitter};
use crate::worker::DiffWorker;

/// Final accounting of one pipeline run.
#[derive(Debug)]
pub struct CoordinatorReport {
    pub producer: ProducerReport,
    pub consumers: Vec<ConsumerStats>,
}

impl CoordinatorReport {
    /// Mean working fraction across the consumer pool.
    pub fn consumer_efficiency(&self) -> f64 {
        if self.consumers.is_empty() {
            return 1.0;
        }
        let sum: f64 = self.consumers.iter().map(ConsumerStats::efficiency).sum();
        sum / self.consumers.len() as f64
    }
}

/// Owns the queues, pools, and shutdown flag of one pipeline run.
pub struct Coordinator {
    config: RevarcConfig,
    shutdown: Arc<AtomicBool>,
}

impl Coordinator {
    pub fn new(config: RevarcConfig) -> Self {
        Self {
            config,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Requests an orderly stop: no further archives are claimed, work in
    /// flight still drains. Safe to call from any thread, any number of
    /// times.
    pub fn shutdown(&self) {
        if !self.shutdown.swap(true, Ordering::AcqRel) {
            info!("pipeline shutdown requested");
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Handle other threads can use to request shutdown.
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Runs the pipeline to completion.
    ///
    /// `open_source` turns a claimed archive into a record stream;
    /// `make_sink` builds one output sink per consumer. The call returns
    /// once every stage has drained and every thread is joined.
    pub fn run<F, G, S>(
        &self,
        open_source: F,
        make_sink: G,
    ) -> Result<CoordinatorReport, PipelineError>
    where
        F: Fn(&ArchiveDescription) -> Box<dyn RevisionSource>,
        G: Fn(usize) -> S,
        S: RevisionSink + 'static,
    {
        let pipeline = &self.config.pipeline;
        let timeout = Duration::from_millis(pipeline.transmit_timeout_ms);

        let worker_queues: Vec<Arc<TaskQueue<Task<Revision>>>> = (0..pipeline.diff_workers)
            .map(|_| Arc::new(TaskQueue::new(pipeline.queue_capacity, pipeline.queue_bytes)))
            .collect();
        let consumer_queues: Vec<Arc<TaskQueue<Task<Diff>>>> = (0..pipeline.consumers)
            .map(|_| Arc::new(TaskQueue::new(pipeline.queue_capacity, pipeline.queue_bytes)))
            .collect();

        let to_workers = Arc::new(RoutedTransmitter::new(
            "diff",
            worker_queues.clone(),
            timeout,
        ));
        let to_consumers = Arc::new(RoutedTransmitter::new(
            "consume",
            consumer_queues.clone(),
            timeout,
        ));

        let worker_handles: Vec<_> = worker_queues
            .iter()
            .enumerate()
            .map(|(id, queue)| {
                let mut worker = DiffWorker::new(
                    id,
                    Arc::clone(queue),
                    Arc::clone(&to_consumers),
                    Arc::clone(&self.shutdown),
                );
                thread::Builder::new()
                    .name(format!("revarc-diff-{id}"))
                    .spawn(move || worker.run())
                    .expect("spawning diff worker thread")
            })
            .collect();

        let primary_keys = Arc::new(AtomicU64::new(1));
        let consumer_handles: Vec<_> = consumer_queues
            .iter()
            .enumerate()
            .map(|(id, queue)| {
                let mut consumer = DiffConsumer::new(
                    id,
                    Arc::clone(queue),
                    make_sink(id),
                    self.config.output.max_allowed_packet,
                    Arc::clone(&primary_keys),
                    Arc::clone(&self.shutdown),
                );
                thread::Builder::new()
                    .name(format!("revarc-consume-{id}"))
                    .spawn(move || consumer.run())
                    .expect("spawning consumer thread")
            })
            .collect();

        let producer_result = self.produce(&open_source, Arc::clone(&to_workers));

        // End markers flow downstream even when production failed, so the
        // pools drain and join instead of spinning forever. A failed
        // broadcast falls back to the shutdown flag: the stage that missed
        // its marker still observes the flag between pulls and exits, so
        // every handle below is joinable.
        let mut worker_error = None;
        if let Err(error) = to_workers.broadcast_end() {
            warn!(%error, "end marker broadcast to diff pool failed");
            self.shutdown();
            worker_error.get_or_insert(error);
        }
        for handle in worker_handles {
            if let Err(error) = handle.join().expect("diff worker thread panicked") {
                warn!(%error, "diff worker failed");
                worker_error.get_or_insert(error);
            }
        }

        let mut consumers = Vec::new();
        let mut consumer_error = None;
        if let Err(error) = to_consumers.broadcast_end() {
            warn!(%error, "end marker broadcast to consumer pool failed");
            self.shutdown();
            consumer_error.get_or_insert(error);
        }
        for handle in consumer_handles {
            match handle.join().expect("consumer thread panicked") {
                Ok(stats) => consumers.push(stats),
                Err(error) => {
                    warn!(%error, "consumer failed");
                    consumer_error.get_or_insert(error);
                }
            }
        }

        self.shutdown();

        let producer = producer_result?;
        if let Some(error) = worker_error {
            return Err(error);
        }
        if let Some(error) = consumer_error {
            return Err(error);
        }

        let report = CoordinatorReport {
            producer,
            consumers,
        };
        info!(
            articles = report.producer.articles,
            revisions = report.producer.revisions,
            efficiency = report.consumer_efficiency(),
            "pipeline run complete"
        );
        Ok(report)
    }

    /// Claims archives until the manager runs dry or shutdown is asked.
    fn produce<F>(
        &self,
        open_source: &F,
        to_workers: Arc<RoutedTransmitter<Revision>>,
    ) -> Result<ProducerReport, PipelineError>
    where
        F: Fn(&ArchiveDescription) -> Box<dyn RevisionSource>,
    {
        let manager = ArchiveManager::new(self.config.archives.clone());
        let filter = ArticleFilter {
            namespaces: self.config.filter.namespaces.clone(),
            banned_name_prefixes: self.config.filter.banned_name_prefixes.clone(),
        };
        let mut producer = ArticleProducer::new(
            filter,
            self.config.filter.surrogate_mode,
            self.config.pipeline.split_threshold,
            to_workers,
            Arc::clone(&self.shutdown),
        )?;

        while let Some(archive) = manager.next() {
            if self.is_shutdown() {
                info!(
                    remaining = manager.remaining() + 1,
                    "shutdown requested, remaining archives skipped"
                );
                break;
            }
            info!(archive = %archive.path.display(), "processing archive");
            let mut source = open_source(&archive);
            producer.process_source(source.as_mut())?;
        }
        Ok(producer.report())
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::Mutex;

    use revarc_config::{FilterConfig, OutputConfig, PipelineConfig};
    use revarc_store::IndexChunk;
    use revarc_types::{
        ArchiveKind, ArticleId, Contributor, PageHeader, RevisionId, SurrogateMode, Timestamp,
    };

    use crate::sink::{DiffRecord, IndexTable};
    use crate::source::{RawRevision, SourceRecord, VecSource};

    use super::*;

    #[derive(Default, Clone)]
    struct SharedSink {
        revisions: Arc<Mutex<Vec<DiffRecord>>>,
    }

    impl RevisionSink for SharedSink {
        fn write_revision(&mut self, record: &DiffRecord) -> Result<(), PipelineError> {
            self.revisions.lock().unwrap().push(record.clone());
            Ok(())
        }

        fn write_index(
            &mut self,
            _table: IndexTable,
            _chunk: &IndexChunk,
        ) -> Result<(), PipelineError> {
            Ok(())
        }

        fn flush(&mut self) -> Result<(), PipelineError> {
            Ok(())
        }
    }

    fn config(archives: usize) -> RevarcConfig {
        RevarcConfig {
            archives: (0..archives)
                .map(|index| ArchiveDescription {
                    kind: ArchiveKind::Xml,
                    path: PathBuf::from(format!("dump-{index}.xml")),
                    start_offset: 0,
                })
                .collect(),
            filter: FilterConfig {
                namespaces: vec![0],
                banned_name_prefixes: Vec::new(),
                surrogate_mode: SurrogateMode::DiscardRevision,
            },
            pipeline: PipelineConfig {
                diff_workers: 2,
                consumers: 2,
                split_threshold: 1 << 20,
                queue_capacity: 16,
                queue_bytes: 1 << 20,
                transmit_timeout_ms: 1_000,
            },
            output: OutputConfig {
                max_allowed_packet: 1 << 14,
                base64_payloads: true,
            },
        }
    }

    fn records(article: u64, texts: &[&str]) -> Vec<SourceRecord> {
        let mut records = vec![SourceRecord::PageStart(PageHeader {
            article_id: ArticleId::new(article),
            name: format!("Article {article}"),
            namespace: 0,
        })];
        for (index, text) in texts.iter().enumerate() {
            records.push(SourceRecord::Revision(RawRevision {
                id: RevisionId::new(article * 100 + index as u64),
                timestamp: Timestamp::from_millis(index as i64 * 1_000),
                contributor: Contributor::anonymous("10.0.0.1"),
                comment: String::new(),
                minor: false,
                text: text.as_bytes().to_vec(),
            }));
        }
        records
    }

    #[test]
    fn run_drains_all_archives_and_joins() {
        let coordinator = Coordinator::new(config(2));
        let sink = SharedSink::default();
        let sink_for_factory = sink.clone();

        let report = coordinator
            .run(
                |archive| {
                    let article = if archive.path.to_string_lossy().contains("dump-0") {
                        1
                    } else {
                        2
                    };
                    Box::new(VecSource::new(records(article, &["one", "one two"])))
                },
                move |_| sink_for_factory.clone(),
            )
            .unwrap();

        assert_eq!(report.producer.articles, 2);
        assert_eq!(report.producer.revisions, 4);
        assert_eq!(report.consumers.len(), 2);
        assert!(coordinator.is_shutdown());

        let written = sink.revisions.lock().unwrap();
        assert_eq!(written.len(), 4);
    }

    /// Yields pages forever; only a shutdown request ends a run over it.
    #[derive(Default)]
    struct EndlessSource {
        next: u64,
    }

    impl RevisionSource for EndlessSource {
        fn next_record(&mut self) -> Option<SourceRecord> {
            // Pace the stream so queues keep headroom while it runs.
            thread::sleep(Duration::from_millis(1));
            self.next += 1;
            if self.next % 2 == 1 {
                Some(SourceRecord::PageStart(PageHeader {
                    article_id: ArticleId::new(self.next),
                    name: format!("Page {}", self.next),
                    namespace: 0,
                }))
            } else {
                Some(SourceRecord::Revision(RawRevision {
                    id: RevisionId::new(self.next),
                    timestamp: Timestamp::from_millis(self.next as i64),
                    contributor: Contributor::anonymous("10.0.0.1"),
                    comment: String::new(),
                    minor: false,
                    text: b"text".to_vec(),
                }))
            }
        }
    }

    #[test]
    fn shutdown_handle_unblocks_a_running_pipeline() {
        let mut config = config(1);
        // Plenty of queue headroom so no handoff blocks around the stop.
        config.pipeline.queue_capacity = 4_096;
        let coordinator = Coordinator::new(config);

        let handle = coordinator.shutdown_handle();
        let stopper = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            handle.store(true, Ordering::Release);
        });

        // Without cooperative cancellation this run would never return.
        let report = coordinator
            .run(
                |_| Box::new(EndlessSource::default()),
                |_| SharedSink::default(),
            )
            .unwrap();
        stopper.join().unwrap();
        assert!(coordinator.is_shutdown());
        assert!(report.producer.articles > 0);
    }

    #[test]
    fn shutdown_before_run_claims_no_archives() {
        let coordinator = Coordinator::new(config(3));
        coordinator.shutdown();
        coordinator.shutdown();

        let report = coordinator
            .run(
                |_| Box::new(VecSource::new(records(1, &["text"]))),
                |_| SharedSink::default(),
            )
            .unwrap();
        assert_eq!(report.producer.articles, 0);
    }
}
