//! Article production: dump records into revision tasks.
//!
//! The producer walks one archive's record stream, filters pages, assigns
//! per-article revision counters, and packs accepted revisions into tasks.
//! An article whose accumulated text passes the split threshold is emitted
//! as a `PartialFirst → Partial* → PartialLast` sequence instead of one
//! `Full` task, so a single huge page cannot pin the whole pipeline's
//! memory.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, warn};

use revarc_types::{PageHeader, Revision, RevisionCounter, RevisionMeta, SurrogateMode};

use crate::error::PipelineError;
use crate::source::{RawRevision, RevisionSource, SourceRecord};
use crate::task::{ArticleHeader, Task, TaskKind};
use crate::transmit::TaskTransmitter;

/// Page admission rules.
#[derive(Debug, Clone, Default)]
pub struct ArticleFilter {
    /// Admitted namespaces; empty admits every namespace.
    pub namespaces: Vec<i32>,
    /// Pages whose name starts with any of these are skipped.
    pub banned_name_prefixes: Vec<String>,
}

impl ArticleFilter {
    pub fn accepts(&self, header: &PageHeader) -> bool {
        if !self.namespaces.is_empty() && !self.namespaces.contains(&header.namespace) {
            return false;
        }
        !self
            .banned_name_prefixes
            .iter()
            .any(|prefix| header.name.starts_with(prefix.as_str()))
    }
}

/// Outcome counters for one producer run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProducerReport {
    pub articles: u64,
    pub revisions: u64,
    pub discarded_revisions: u64,
    pub skipped_pages: u64,
    pub tasks: u64,
}

/// State of the article currently being packed.
struct OpenArticle {
    header: ArticleHeader,
    next_counter: RevisionCounter,
    /// Part counter of the pending task, 1-based.
    part: u32,
    pending: Task<Revision>,
}

impl OpenArticle {
    fn new(header: ArticleHeader) -> Self {
        let pending = Task::new(TaskKind::Full, header.clone(), 1);
        Self {
            header,
            next_counter: RevisionCounter::new(1),
            part: 1,
            pending,
        }
    }
}

/// Turns a record stream into routed revision tasks.
pub struct ArticleProducer<T: TaskTransmitter<Revision>> {
    filter: ArticleFilter,
    surrogate_mode: SurrogateMode,
    /// Task payload size at which an article gets split into parts.
    split_threshold: usize,
    transmitter: T,
    shutdown: Arc<AtomicBool>,
    open: Option<OpenArticle>,
    skipping: bool,
    report: ProducerReport,
}

impl<T: TaskTransmitter<Revision>> ArticleProducer<T> {
    pub fn new(
        filter: ArticleFilter,
        surrogate_mode: SurrogateMode,
        split_threshold: usize,
        transmitter: T,
        shutdown: Arc<AtomicBool>,
    ) -> Result<Self, PipelineError> {
        if !surrogate_mode.is_supported() {
            return Err(PipelineError::UnsupportedSurrogateMode {
                mode: surrogate_mode,
            });
        }
        Ok(Self {
            filter,
            surrogate_mode,
            split_threshold,
            transmitter,
            shutdown,
            open: None,
            skipping: false,
            report: ProducerReport::default(),
        })
    }

    /// Requests a stop; the record loop observes it before its next pull.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Drains one source, emitting tasks as pages complete. The final
    /// page is flushed when the source runs out. A shutdown request stops
    /// the walk between records; the open article is still closed, so
    /// downstream never sees a part sequence without its last part.
    pub fn process_source(
        &mut self,
        source: &mut dyn RevisionSource,
    ) -> Result<(), PipelineError> {
        loop {
            if self.is_shutdown() {
                debug!("shutdown requested, leaving archive early");
                break;
            }
            let Some(record) = source.next_record() else {
                break;
            };
            match record {
                SourceRecord::PageStart(header) => self.start_page(header)?,
                SourceRecord::Revision(revision) => self.take_revision(revision)?,
            }
        }
        self.finish_article()?;
        Ok(())
    }

    /// Counters accumulated so far.
    pub fn report(&self) -> ProducerReport {
        self.report
    }

    fn start_page(&mut self, header: PageHeader) -> Result<(), PipelineError> {
        self.finish_article()?;
        if self.filter.accepts(&header) {
            self.report.articles += 1;
            self.skipping = false;
            self.open = Some(OpenArticle::new(ArticleHeader {
                id: header.article_id,
                name: header.name,
            }));
        } else {
            debug!(article = %header.article_id, name = %header.name, "page filtered out");
            self.report.skipped_pages += 1;
            self.skipping = true;
        }
        Ok(())
    }

    fn take_revision(&mut self, raw: RawRevision) -> Result<(), PipelineError> {
        if self.skipping {
            return Ok(());
        }
        let Some(open) = self.open.as_mut() else {
            // Revisions before the first page record are malformed input.
            warn!(revision = %raw.id, "revision outside any page, dropped");
            return Ok(());
        };

        let text = match String::from_utf8(raw.text) {
            Ok(text) => text,
            Err(_) => match self.surrogate_mode {
                SurrogateMode::DiscardRevision => {
                    warn!(
                        article = %open.header.id,
                        revision = %raw.id,
                        "revision text is not valid UTF-8, discarded"
                    );
                    self.report.discarded_revisions += 1;
                    return Ok(());
                }
                mode => return Err(PipelineError::UnsupportedSurrogateMode { mode }),
            },
        };

        // Counters number *kept* revisions; discards leave no gap.
        let counter = open.next_counter;
        open.next_counter = counter.next();
        self.report.revisions += 1;

        let revision = Revision {
            meta: RevisionMeta {
                id: raw.id,
                article_id: open.header.id,
                counter,
                timestamp: raw.timestamp,
                contributor: raw.contributor,
                comment: raw.comment,
                minor: raw.minor,
            },
            text,
        };
        let size = revision.size_estimate();
        open.pending.push(revision, size);

        if open.pending.byte_size() >= self.split_threshold {
            self.emit_partial()?;
        }
        Ok(())
    }

    /// Emits the pending task as a non-final part and opens the next one.
    fn emit_partial(&mut self) -> Result<(), PipelineError> {
        let open = self.open.as_mut().expect("no open article to split");
        let kind = if open.part == 1 {
            TaskKind::PartialFirst
        } else {
            TaskKind::Partial
        };
        open.part += 1;
        let next = Task::new(TaskKind::Full, open.header.clone(), open.part);
        let mut task = std::mem::replace(&mut open.pending, next);
        task.set_kind(kind);
        self.report.tasks += 1;
        self.transmitter.transmit(task)
    }

    /// Closes the open article, emitting its final task.
    fn finish_article(&mut self) -> Result<(), PipelineError> {
        let Some(mut open) = self.open.take() else {
            return Ok(());
        };
        // A single-part article goes out as Full; a split one always ends
        // with PartialLast, even when the final part carries no revisions.
        if open.part > 1 {
            open.pending.set_kind(TaskKind::PartialLast);
        }
        self.report.tasks += 1;
        self.transmitter.transmit(open.pending)
    }
}
