//! # revarc-diff: Edit scripts between article revisions
//!
//! This crate defines the diff model shared across the system and the
//! calculator that produces edit scripts:
//!
//! - [`DiffAction`] / [`DiffPart`]: typed edit operations with fixed wire
//!   ordinals.
//! - [`Diff`]: an ordered edit script plus the revision metadata it belongs
//!   to. Replay ([`Diff::apply`]) transforms revision *k-1*'s text into
//!   revision *k*'s text.
//! - [`DiffBlock`]: aligned span pairs produced by the matcher before
//!   linearization.
//! - [`DiffCalculator`]: word-granularity matcher with retry-safe
//!   [`DiffCalculator::reset`] semantics.

mod block;
mod calculator;
mod error;
mod model;

pub use block::DiffBlock;
pub use calculator::DiffCalculator;
pub use error::DiffError;
pub use model::{Diff, DiffAction, DiffPart};
