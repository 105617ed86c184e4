//! Deadline-bounded task handoff between stages.
//!
//! All parts of one article must land on the same downstream worker, in
//! order. The routed transmitter owns one bounded queue per worker and
//! picks the queue from the article id, so ordering needs no locks; tasks
//! for different articles spread across the pool.

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::error::PipelineError;
use crate::queue::{ByteSized, TaskQueue};
use crate::task::Task;
use crate::worker::DiffRouter;

/// Sender side of a stage boundary.
pub trait TaskTransmitter<D>: Send + Sync
where
    Task<D>: ByteSized,
{
    /// Hands a task to its downstream worker, blocking up to the
    /// configured deadline. Timing out is an error, not a silent drop.
    fn transmit(&self, task: Task<D>) -> Result<(), PipelineError>;

    /// Delivers an end-of-stream task to every downstream worker.
    fn broadcast_end(&self) -> Result<(), PipelineError>;
}

impl<D, T> TaskTransmitter<D> for Arc<T>
where
    T: TaskTransmitter<D>,
    Task<D>: ByteSized,
{
    fn transmit(&self, task: Task<D>) -> Result<(), PipelineError> {
        (**self).transmit(task)
    }

    fn broadcast_end(&self) -> Result<(), PipelineError> {
        (**self).broadcast_end()
    }
}

/// Routes tasks to a fixed worker pool by article id.
#[derive(Debug)]
pub struct RoutedTransmitter<D>
where
    Task<D>: ByteSized,
{
    stage: &'static str,
    queues: Vec<Arc<TaskQueue<Task<D>>>>,
    router: DiffRouter,
    timeout: Duration,
}

impl<D> RoutedTransmitter<D>
where
    Task<D>: ByteSized,
{
    pub fn new(
        stage: &'static str,
        queues: Vec<Arc<TaskQueue<Task<D>>>>,
        timeout: Duration,
    ) -> Self {
        assert!(!queues.is_empty(), "transmitter needs at least one queue");
        let router = DiffRouter::new(queues.len());
        Self {
            stage,
            queues,
            router,
            timeout,
        }
    }

    /// Queue index a given article routes to.
    pub fn route(&self, article: revarc_types::ArticleId) -> usize {
        self.router.route(article)
    }

    fn push(&self, index: usize, task: Task<D>) -> Result<(), PipelineError> {
        match self.queues[index].push_timeout(task, self.timeout) {
            Ok(()) => Ok(()),
            Err(task) => {
                warn!(
                    stage = self.stage,
                    queue = index,
                    key = %task.key(),
                    "handoff timed out, downstream is saturated"
                );
                Err(PipelineError::Timeout {
                    stage: self.stage,
                    waited_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
                })
            }
        }
    }
}

impl<D> TaskTransmitter<D> for RoutedTransmitter<D>
where
    D: Send,
    Task<D>: ByteSized,
{
    fn transmit(&self, task: Task<D>) -> Result<(), PipelineError> {
        let index = match task.header() {
            Some(header) => self.route(header.id),
            // Headerless control tasks have no ordering constraint.
            None => 0,
        };
        self.push(index, task)
    }

    fn broadcast_end(&self) -> Result<(), PipelineError> {
        // Every queue gets an attempt even when one handoff times out, so
        // a single saturated worker cannot starve its siblings of the
        // end marker.
        let mut first_error = None;
        for index in 0..self.queues.len() {
            if let Err(error) = self.push(index, Task::end()) {
                first_error.get_or_insert(error);
            }
        }
        match first_error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use revarc_types::{ArticleId, Revision};

    use crate::task::{ArticleHeader, TaskKind};

    use super::*;

    fn pool(workers: usize) -> Vec<Arc<TaskQueue<Task<Revision>>>> {
        (0..workers)
            .map(|_| Arc::new(TaskQueue::new(8, 1 << 20)))
            .collect()
    }

    fn task_for(article: u64, part: u32) -> Task<Revision> {
        Task::new(
            TaskKind::Partial,
            ArticleHeader {
                id: ArticleId::new(article),
                name: format!("Article {article}"),
            },
            part,
        )
    }

    #[test]
    fn same_article_routes_to_same_queue() {
        let queues = pool(3);
        let tx = RoutedTransmitter::new("diff", queues.clone(), Duration::from_millis(10));

        tx.transmit(task_for(7, 1)).unwrap();
        tx.transmit(task_for(7, 2)).unwrap();

        let target = tx.route(ArticleId::new(7));
        assert_eq!(queues[target].len(), 2);
        let first = queues[target].try_pop().unwrap();
        let second = queues[target].try_pop().unwrap();
        assert_eq!(first.key(), "7-1");
        assert_eq!(second.key(), "7-2");
    }

    #[test]
    fn saturated_queue_times_out() {
        let queues = pool(1);
        let tx = RoutedTransmitter::new("diff", queues, Duration::from_millis(20));

        for part in 1..=8 {
            tx.transmit(task_for(1, part)).unwrap();
        }
        let err = tx.transmit(task_for(1, 9)).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Timeout {
                stage: "diff",
                waited_ms: 20
            }
        ));
    }

    #[test]
    fn broadcast_end_skips_no_queue_on_timeout() {
        let queues = pool(2);
        // Saturate queue 0 so its end marker times out.
        for part in 1..=8 {
            queues[0]
                .push_timeout(task_for(2, part), Duration::from_millis(10))
                .unwrap();
        }

        let tx = RoutedTransmitter::new("diff", queues.clone(), Duration::from_millis(10));
        let err = tx.broadcast_end().unwrap_err();
        assert!(matches!(err, PipelineError::Timeout { stage: "diff", .. }));
        // The unsaturated queue still received its marker.
        assert_eq!(queues[1].try_pop().unwrap().kind(), TaskKind::End);
    }

    #[test]
    fn broadcast_end_reaches_every_queue() {
        let queues = pool(3);
        let tx = RoutedTransmitter::new("consume", queues.clone(), Duration::from_millis(10));
        tx.broadcast_end().unwrap();
        for queue in &queues {
            assert_eq!(queue.try_pop().unwrap().kind(), TaskKind::End);
        }
    }
}
