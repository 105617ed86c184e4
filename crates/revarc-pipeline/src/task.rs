//! Units of pipeline work.
//!
//! A [`Task`] carries an ordered slice of one article's payload items (raw
//! revisions upstream, diffs downstream) plus the bookkeeping needed to
//! reassemble articles split across parts. Control kinds (`Dummy`, `End`,
//! `Banned`) carry signals, not data.

use revarc_diff::Diff;
use revarc_types::{ArticleId, Revision};

use crate::queue::ByteSized;

/// Task life-cycle kind.
///
/// Data tasks follow `Full` or `PartialFirst → Partial* → PartialLast`;
/// the remaining kinds are control signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    /// A whole article in one task.
    Full,
    /// First part of a split article.
    PartialFirst,
    /// Middle part of a split article.
    Partial,
    /// Final part of a split article.
    PartialLast,
    /// No-op placeholder.
    Dummy,
    /// Stream end: the receiving stage should drain and shut down.
    End,
    /// The article failed processing and must be skipped entirely.
    Banned,
}

impl TaskKind {
    /// Whether this kind is a control signal rather than data.
    pub fn is_control(self) -> bool {
        matches!(self, TaskKind::Dummy | TaskKind::End | TaskKind::Banned)
    }

    /// Whether this kind is one part of a split article.
    pub fn is_partial(self) -> bool {
        matches!(
            self,
            TaskKind::PartialFirst | TaskKind::Partial | TaskKind::PartialLast
        )
    }

    /// Whether this kind completes its article's task stream.
    pub fn completes_article(self) -> bool {
        matches!(self, TaskKind::Full | TaskKind::PartialLast)
    }
}

/// Identity of the article a task belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleHeader {
    pub id: ArticleId,
    pub name: String,
}

/// One unit of pipeline work.
#[derive(Debug, Clone)]
pub struct Task<D> {
    kind: TaskKind,
    header: Option<ArticleHeader>,
    items: Vec<D>,
    /// 1-based part counter within the article's task stream.
    part: u32,
    /// Running byte-size estimate of the payload, for backpressure.
    byte_size: usize,
}

impl<D> Task<D> {
    /// Creates an empty data task.
    pub fn new(kind: TaskKind, header: ArticleHeader, part: u32) -> Self {
        debug_assert!(part >= 1, "part counters are 1-based");
        Self {
            kind,
            header: Some(header),
            items: Vec::new(),
            part,
            byte_size: 0,
        }
    }

    /// Stream-end control task.
    pub fn end() -> Self {
        Self::control(TaskKind::End)
    }

    /// No-op control task.
    pub fn dummy() -> Self {
        Self::control(TaskKind::Dummy)
    }

    /// Marks an article part as failed; consumers drop the whole article.
    pub fn banned(header: ArticleHeader, part: u32) -> Self {
        Self {
            kind: TaskKind::Banned,
            header: Some(header),
            items: Vec::new(),
            part,
            byte_size: 0,
        }
    }

    fn control(kind: TaskKind) -> Self {
        Self {
            kind,
            header: None,
            items: Vec::new(),
            part: 1,
            byte_size: 0,
        }
    }

    /// Appends an item, accumulating its declared encoded size.
    pub fn push(&mut self, item: D, declared_size: usize) {
        self.items.push(item);
        self.byte_size += declared_size;
    }

    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    /// Rewrites the kind (used when a pending part turns out to be the
    /// first, a middle, or the last piece of its article).
    pub fn set_kind(&mut self, kind: TaskKind) {
        self.kind = kind;
    }

    pub fn header(&self) -> Option<&ArticleHeader> {
        self.header.as_ref()
    }

    pub fn items(&self) -> &[D] {
        &self.items
    }

    pub fn into_items(self) -> Vec<D> {
        self.items
    }

    pub fn part(&self) -> u32 {
        self.part
    }

    pub fn byte_size(&self) -> usize {
        self.byte_size
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Identity key: `article_id + "-" + part_counter`.
    pub fn key(&self) -> String {
        match &self.header {
            Some(header) => format!("{}-{}", header.id, self.part),
            None => format!("control-{:?}", self.kind),
        }
    }
}

impl ByteSized for Task<Revision> {
    fn byte_size(&self) -> usize {
        self.byte_size
    }
}

impl ByteSized for Task<Diff> {
    fn byte_size(&self) -> usize {
        self.byte_size
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    fn header() -> ArticleHeader {
        ArticleHeader {
            id: ArticleId::new(17),
            name: "Example".to_string(),
        }
    }

    #[test]
    fn key_combines_article_and_part() {
        let task: Task<u8> = Task::new(TaskKind::Partial, header(), 3);
        assert_eq!(task.key(), "17-3");
    }

    #[test]
    fn push_accumulates_byte_size() {
        let mut task: Task<u8> = Task::new(TaskKind::Full, header(), 1);
        task.push(1, 100);
        task.push(2, 250);
        assert_eq!(task.byte_size(), 350);
        assert_eq!(task.items(), &[1, 2]);
    }

    #[test_case(TaskKind::Dummy, true; "dummy is control")]
    #[test_case(TaskKind::End, true; "end is control")]
    #[test_case(TaskKind::Banned, true; "banned is control")]
    #[test_case(TaskKind::Full, false; "full is data")]
    #[test_case(TaskKind::PartialFirst, false; "partial first is data")]
    #[test_case(TaskKind::PartialLast, false; "partial last is data")]
    fn control_kinds_are_flagged(kind: TaskKind, control: bool) {
        assert_eq!(kind.is_control(), control);
    }

    #[test_case(TaskKind::Full, true; "full completes")]
    #[test_case(TaskKind::PartialLast, true; "partial last completes")]
    #[test_case(TaskKind::PartialFirst, false; "partial first does not")]
    #[test_case(TaskKind::Partial, false; "middle part does not")]
    fn completion_follows_kind(kind: TaskKind, completes: bool) {
        assert_eq!(kind.completes_article(), completes);
    }

    #[test]
    fn end_task_has_no_header() {
        let task: Task<u8> = Task::end();
        assert!(task.header().is_none());
        assert_eq!(task.kind(), TaskKind::End);
    }
}
