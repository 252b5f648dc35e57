//! Defines [`PoolError`], the error type returned by pool operations.

use thiserror::Error;

/// Errors that a [`Pool`](crate::Pool) can report.
///
/// Both variants are structural, retrying the failed operation with the same
/// inputs will fail again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PoolError {
    /// The object size (or the block size itself) cannot produce a block with at least one slot.
    #[error("invalid configuration: {object_size}-byte objects do not fit a {block_size}-byte block")]
    InvalidConfiguration {
        object_size: usize,
        block_size: usize,
    },

    /// The backing source could not supply another block.
    #[error("out of memory: block source could not supply {block_size} bytes")]
    OutOfMemory { block_size: usize },
}
