//! The doubly-indexed linked revision store.
//!
//! Nodes live in an arena addressed by [`BlockHandle`]; the four chain
//! links are handles rather than references, so the two orderings can
//! cross-cut freely without ownership cycles and splices stay O(1).
//!
//! Counter-order links are resolved immediately on append (counter order is
//! known from the source). Chronological links are resolved per article by
//! [`ChronoStorage::finalize_article`] once all of the article's revisions
//! have been seen.

use std::collections::HashMap;

use bytes::Bytes;
use revarc_codec::decode_parts;
use revarc_diff::Diff;
use revarc_types::{ArticleId, RevisionCounter, RevisionId, RevisionMeta};
use tracing::debug;

use crate::StoreError;

/// Arena index of one revision node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockHandle(usize);

impl BlockHandle {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Payload stored for one revision: an anchoring snapshot or an encoded
/// edit script against its predecessor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredPayload {
    Full(String),
    Diff(Bytes),
}

/// One stored revision: its metadata plus the payload.
#[derive(Debug, Clone)]
pub struct StoredRevision {
    pub meta: RevisionMeta,
    pub payload: StoredPayload,
}

/// One node in the two linked orderings.
///
/// `counter_prev`/`counter_next` follow dump order; `index_prev`/`index_next`
/// follow timestamp order once the article is finalized. `full_revision`
/// points at the nearest preceding full-revision node covering this one.
#[derive(Debug, Clone)]
pub struct ChronoStorageBlock {
    pub full_revision: Option<BlockHandle>,
    pub chrono_index: Option<u32>,
    pub counter: RevisionCounter,
    pub delivered: bool,
    pub index_prev: Option<BlockHandle>,
    pub index_next: Option<BlockHandle>,
    pub counter_prev: Option<BlockHandle>,
    pub counter_next: Option<BlockHandle>,
}

/// In-memory revision store over all articles in flight.
///
/// Each article's nodes are only ever touched by the single consumer that
/// owns that article's task stream, so the store needs no internal locking.
#[derive(Debug, Default)]
pub struct ChronoStorage {
    blocks: Vec<ChronoStorageBlock>,
    revisions: Vec<StoredRevision>,
    by_counter: HashMap<(ArticleId, RevisionCounter), BlockHandle>,
    by_revision_id: HashMap<RevisionId, BlockHandle>,
    heads: HashMap<ArticleId, BlockHandle>,
    tails: HashMap<ArticleId, BlockHandle>,
}

impl ChronoStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one revision, linking it into its article's counter chain.
    ///
    /// A diff payload requires an already-appended predecessor carrying a
    /// full-revision anchor.
    pub fn append(
        &mut self,
        meta: RevisionMeta,
        payload: StoredPayload,
    ) -> Result<BlockHandle, StoreError> {
        let article = meta.article_id;
        let counter = meta.counter;
        if self.by_counter.contains_key(&(article, counter)) {
            return Err(StoreError::DuplicateRevision { article, counter });
        }

        let handle = BlockHandle(self.blocks.len());
        let counter_prev = self.tails.get(&article).copied();

        let full_revision = match payload {
            StoredPayload::Full(_) => Some(handle),
            StoredPayload::Diff(_) => {
                let anchor = counter_prev
                    .and_then(|prev| self.blocks[prev.0].full_revision)
                    .ok_or(StoreError::MissingFullRevision { article, counter })?;
                Some(anchor)
            }
        };

        self.blocks.push(ChronoStorageBlock {
            full_revision,
            chrono_index: None,
            counter,
            delivered: false,
            index_prev: None,
            index_next: None,
            counter_prev,
            counter_next: None,
        });
        self.by_revision_id.insert(meta.id, handle);
        self.revisions.push(StoredRevision { meta, payload });

        if let Some(prev) = counter_prev {
            self.blocks[prev.0].counter_next = Some(handle);
        } else {
            self.heads.insert(article, handle);
        }
        self.tails.insert(article, handle);
        self.by_counter.insert((article, counter), handle);
        Ok(handle)
    }

    /// Resolves the chronological chain for one article.
    ///
    /// Sorts the article's nodes by timestamp (counter breaking ties),
    /// assigns 1-based chronological indices, and links `index_prev`/`next`.
    /// Returns `(counter, chronological index)` pairs in counter order, as
    /// consumed by the chronological index builder.
    pub fn finalize_article(&mut self, article: ArticleId) -> Vec<(RevisionCounter, u32)> {
        let mut handles = Vec::new();
        let mut cursor = self.heads.get(&article).copied();
        while let Some(handle) = cursor {
            handles.push(handle);
            cursor = self.blocks[handle.0].counter_next;
        }

        let mut by_time = handles.clone();
        by_time.sort_by_key(|h| {
            let block = &self.blocks[h.0];
            (self.revisions[h.0].meta.timestamp, block.counter)
        });

        for (position, &handle) in by_time.iter().enumerate() {
            let block = &mut self.blocks[handle.0];
            block.chrono_index = Some(position as u32 + 1);
            block.index_prev = position.checked_sub(1).map(|p| by_time[p]);
            block.index_next = by_time.get(position + 1).copied();
        }

        debug!(article = %article, revisions = handles.len(), "chronological chain resolved");

        handles
            .iter()
            .map(|&h| {
                let block = &self.blocks[h.0];
                (block.counter, block.chrono_index.unwrap_or_default())
            })
            .collect()
    }

    /// Reconstructs a revision's text by replaying the diff chain forward
    /// from its covering full revision.
    pub fn materialize(
        &self,
        article: ArticleId,
        counter: RevisionCounter,
    ) -> Result<String, StoreError> {
        let target = self
            .by_counter
            .get(&(article, counter))
            .copied()
            .ok_or(StoreError::UnknownRevision { article, counter })?;
        let anchor = self.blocks[target.0]
            .full_revision
            .ok_or(StoreError::MissingFullRevision { article, counter })?;

        let mut text = match &self.revisions[anchor.0].payload {
            StoredPayload::Full(full) => full.clone(),
            StoredPayload::Diff(_) => {
                return Err(StoreError::MissingFullRevision { article, counter });
            }
        };

        let mut cursor = self.blocks[anchor.0].counter_next;
        let mut position = anchor;
        while position != target {
            let handle = cursor.ok_or(StoreError::UnknownRevision { article, counter })?;
            let stored = &self.revisions[handle.0];
            if let StoredPayload::Diff(encoded) = &stored.payload {
                let parts = decode_parts(encoded)?;
                let diff = Diff::new(stored.meta.clone(), parts);
                text = diff.apply(&text)?;
            }
            position = handle;
            cursor = self.blocks[handle.0].counter_next;
        }
        Ok(text)
    }

    /// Marks a revision as delivered to the output sink.
    pub fn mark_delivered(&mut self, handle: BlockHandle) {
        if let Some(block) = self.blocks.get_mut(handle.0) {
            block.delivered = true;
        }
    }

    pub fn block(&self, handle: BlockHandle) -> &ChronoStorageBlock {
        &self.blocks[handle.0]
    }

    pub fn revision(&self, handle: BlockHandle) -> &StoredRevision {
        &self.revisions[handle.0]
    }

    pub fn lookup_counter(
        &self,
        article: ArticleId,
        counter: RevisionCounter,
    ) -> Option<BlockHandle> {
        self.by_counter.get(&(article, counter)).copied()
    }

    pub fn lookup_revision_id(&self, id: RevisionId) -> Option<BlockHandle> {
        self.by_revision_id.get(&id).copied()
    }

    /// Number of stored revisions across all articles.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}
