//! Diff computation stage.
//!
//! Each worker owns one input queue and a per-article text cache: because
//! every part of an article routes to the same worker, the cache always
//! holds revision *k-1* when revision *k* arrives, and no cross-thread
//! state is needed. A failed computation is retried once with a reset
//! calculator; a second failure bans the whole article downstream.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::{debug, warn};

use revarc_diff::{Diff, DiffCalculator};
use revarc_types::{ArticleId, Revision};

use crate::error::PipelineError;
use crate::queue::TaskQueue;
use crate::task::{Task, TaskKind};
use crate::transmit::TaskTransmitter;

/// Poll interval while the input queue is empty.
const IDLE_WAIT: Duration = Duration::from_millis(5);

/// Deterministic article-to-worker assignment.
///
/// Both stage boundaries use this rule, so "same article, same worker"
/// holds across the whole pipeline.
#[derive(Debug, Clone, Copy)]
pub struct DiffRouter {
    workers: usize,
}

impl DiffRouter {
    /// # Panics
    ///
    /// Panics if `workers` is 0.
    pub fn new(workers: usize) -> Self {
        assert!(workers > 0, "router needs at least one worker");
        Self { workers }
    }

    pub fn route(&self, article: ArticleId) -> usize {
        (u64::from(article) % self.workers as u64) as usize
    }

    pub fn workers(&self) -> usize {
        self.workers
    }
}

/// One thread's worth of diff computation.
pub struct DiffWorker<T: TaskTransmitter<Diff>> {
    id: usize,
    input: Arc<TaskQueue<Task<Revision>>>,
    output: T,
    calculator: DiffCalculator,
    /// Latest accepted text per in-flight article.
    last_text: HashMap<ArticleId, String>,
    /// Articles already banned; their remaining parts are dropped.
    banned: HashSet<ArticleId>,
    shutdown: Arc<AtomicBool>,
}

impl<T: TaskTransmitter<Diff>> DiffWorker<T> {
    pub fn new(
        id: usize,
        input: Arc<TaskQueue<Task<Revision>>>,
        output: T,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        Self {
            id,
            input,
            output,
            calculator: DiffCalculator::new(),
            last_text: HashMap::new(),
            banned: HashSet::new(),
            shutdown,
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
    /// is requested. The check sits between pulls, so an in-flight task is
    /// always finished, never abandoned halfway.
    pub fn run(&mut self) -> Result<(), PipelineError> {
        loop {
            if self.is_shutdown() {
                debug!(worker = self.id, "diff worker stopping on shutdown request");
                return Ok(());
            }
            let Some(task) = self.input.pop_timeout(IDLE_WAIT) else {
                continue;
            };
            match task.kind() {
                TaskKind::End => {
                    debug!(worker = self.id, "diff worker draining on end of stream");
                    return Ok(());
                }
                TaskKind::Dummy => {}
                TaskKind::Banned => self.forward_ban(task)?,
                _ => self.process(task)?,
            }
        }
    }

    /// Diffs one task's revisions and forwards the result.
    pub fn process(&mut self, task: Task<Revision>) -> Result<(), PipelineError> {
        let header = task
            .header()
            .cloned()
            .expect("data task without article header");
        let completes = task.kind().completes_article();

        if self.banned.contains(&header.id) {
            if completes {
                self.banned.remove(&header.id);
            }
            return Ok(());
        }

        let mut out: Task<Diff> = Task::new(task.kind(), header.clone(), task.part());
        let part = task.part();
        for revision in task.into_items() {
            match self.diff_revision(&revision) {
                Ok(diff) => {
                    let size = diff.size_estimate();
                    out.push(diff, size);
                    self.last_text.insert(header.id, revision.text);
                }
                Err(error) => {
                    warn!(
                        worker = self.id,
                        article = %header.id,
                        revision = %revision.meta.id,
                        %error,
                        "diff failed twice, banning article"
                    );
                    self.last_text.remove(&header.id);
                    if !completes {
                        self.banned.insert(header.id);
                    }
                    return self.output.transmit(Task::banned(header, part));
                }
            }
        }

        if completes {
            self.last_text.remove(&header.id);
        }
        self.output.transmit(out)
    }

    /// One computation with a single retry after a calculator reset.
    fn diff_revision(&mut self, revision: &Revision) -> Result<Diff, PipelineError> {
        let previous = self.last_text.get(&revision.meta.article_id);
        let previous = previous.map(String::as_str);
        let first = self
            .calculator
            .calculate(revision.meta.clone(), previous, &revision.text);
        let error = match first {
            Ok(diff) => return Ok(diff),
            Err(error) => error,
        };
        debug!(
            worker = self.id,
            revision = %revision.meta.id,
            %error,
            "diff attempt failed, retrying once"
        );
        self.calculator.reset();
        self.calculator
            .calculate(revision.meta.clone(), previous, &revision.text)
            .map_err(|error| PipelineError::DiffFailed {
                article: u64::from(revision.meta.article_id),
                reason: error.to_string(),
            })
    }

    fn forward_ban(&mut self, task: Task<Revision>) -> Result<(), PipelineError> {
        let header = task
            .header()
            .cloned()
            .expect("banned task without article header");
        self.last_text.remove(&header.id);
        if !task.kind().completes_article() {
            self.banned.insert(header.id);
        }
        self.output.transmit(Task::banned(header, task.part()))
    }
}
