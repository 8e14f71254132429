//! Error taxonomy for the scheduler's public API (spec §7).
//!
//! `CheckFunctionError` is deliberately not part of this enum: per spec
//! §4.4.4 / §7 a panicking `check_function` is caught at the call site,
//! logged, and folded into a `false` precheck result. It never reaches a
//! caller as a `Result::Err`.

use thiserror::Error;

use crate::block::{BlockId, BlockStatus};

/// Raised at [`crate::Scheduler::new`]; fatal, construction fails outright.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigurationError {
    /// `requires()` transitively describes a cycle.
    #[error("dependency cycle detected involving task {task_id}")]
    Cycle { task_id: u64 },

    /// Two distinct `Task` handles were discovered (directly or transitively
    /// via `requires()`) claiming the same `task_id`.
    #[error("duplicate task id {task_id}")]
    DuplicateTaskId { task_id: u64 },

    /// A block in the supplied edge set names a task that was never
    /// registered via `DependencyGraphBuilder::add_block`.
    #[error("block {0} references a task with no registered blocks")]
    UnknownBlock(BlockId),
}

/// Raised by `acquire_block`/`release_block` when the caller violates the
/// acquire/release contract. Indicates a programmer bug -- block-level
/// failures never raise, they surface as status updates and counts (spec
/// §7).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InvariantError {
    /// `release_block` was called for a block whose id is not in
    /// `processing_blocks` -- it was never acquired, or was already
    /// released once.
    #[error("block {0} released but was not in processing_blocks")]
    NotProcessing(BlockId),

    /// `release_block` was called with a status other than `SUCCESS` or
    /// `FAILED`.
    #[error("block {0} released with non-terminal status {1}")]
    NonTerminalRelease(BlockId, BlockStatus),

    /// `mark_success` was called for a block already recorded as failed or
    /// orphaned.
    #[error("block {0} marked successful after already being marked failed or orphaned")]
    DoubleSuccess(BlockId),

    /// `has_next` reported a root available but the root iterator yielded
    /// nothing -- a `DependencyGraph` bug, not a caller error.
    #[error("has_next reported a root for task {task_id} but the root iterator was empty")]
    ExhaustedRoots { task_id: u64 },
}

/// Top-level error type returned by the scheduler's public API.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchedulerError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    Invariant(#[from] InvariantError),
}
