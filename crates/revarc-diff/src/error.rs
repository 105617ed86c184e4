//! Diff model and calculation error types.

use thiserror::Error;

/// Errors from building or replaying an edit script.
#[derive(Debug, Error)]
pub enum DiffError {
    /// An operation references a position past the end of the working buffer.
    #[error("operation {action} at {start} is out of bounds (buffer length {len})")]
    OutOfBounds {
        action: &'static str,
        start: usize,
        len: usize,
    },

    /// A part constructor was given a payload mismatching its action.
    #[error("action {action} {reason}")]
    InvalidPart {
        action: &'static str,
        reason: &'static str,
    },
}
