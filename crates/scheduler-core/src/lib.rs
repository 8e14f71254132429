//! Block-level dependency scheduling for chunked data-processing pipelines.
//!
//! A pipeline is a set of [`Task`]s wired together by [`Task::requires`].
//! Each task owns some number of blocks; [`PipelineBlocks`] (fed by an
//! external block-geometry module, out of scope here) describes which
//! blocks depend on which, across task boundaries. [`Scheduler`] then
//! exposes an acquire/release loop: callers pull ready blocks with
//! [`Scheduler::acquire_block`], do the work, and report the outcome with
//! [`Scheduler::release_block`], which admits newly-ready downstream
//! blocks, retries transient failures up to each task's `max_retries`, and
//! orphans transitively-blocked work once a block's retries are exhausted.

mod block;
mod error;
mod graph;
mod queue;
mod ready_surface;
mod scheduler;
mod state;
mod task;

pub use block::{Block, BlockId, BlockStatus};
pub use error::{ConfigurationError, InvariantError, SchedulerError};
pub use graph::{DependencyGraph, DependencyGraphBuilder, RootBlocks};
pub use ready_surface::{OrphanReport, ReadySurface};
pub use scheduler::{PipelineBlocks, Scheduler, SchedulerConfig};
pub use state::TaskState;
pub use task::{CheckFunction, Task};
