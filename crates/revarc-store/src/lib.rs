//! # revarc-store: Chronologically linked revision storage
//!
//! The store receives each article's revisions as full snapshots or encoded
//! diffs and links them into two independent orderings over one node set:
//! counter order (as revisions appear in the dump) and chronological order
//! (by timestamp). Any revision is reconstructed by jumping to its covering
//! full revision and replaying the diff chain forward.
//!
//! Alongside the store, three index builders emit the lookup tables that
//! make reconstruction sub-linear, chunked under a configurable byte bound:
//!
//! - [`ChronoIndexBuilder`]: sparse counter↔chronological permutations
//! - [`ArticleIndexBuilder`]: full-revision coverage ranges per article
//! - [`RevisionIndexBuilder`]: revision id → storage key point lookups

mod chrono;
mod error;
mod index;

pub use chrono::{BlockHandle, ChronoStorage, ChronoStorageBlock, StoredPayload, StoredRevision};
pub use error::StoreError;
pub use index::{
    ArticleIndexBuilder, ChronoIndexBuilder, CollectSink, IndexChunk, IndexSink,
    RevisionIndexBuilder,
};
