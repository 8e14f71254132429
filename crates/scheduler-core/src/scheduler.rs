//! `Scheduler` -- the public entry point tying graph, ready surface, and
//! per-task queues together (spec §4, §5, §6).

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

use tracing::{debug, error, warn};

use crate::block::{Block, BlockId, BlockStatus};
use crate::error::{ConfigurationError, InvariantError, SchedulerError};
use crate::graph::DependencyGraphBuilder;
use crate::queue::ProcessingQueue;
use crate::ready_surface::ReadySurface;
use crate::state::TaskState;
use crate::task::Task;

/// Tuning knobs that change scheduler-wide behavior without changing the
/// dependency structure itself (spec §5).
#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    /// When `true`, [`crate::ready_surface::ReadySurface::mark_failure`]
    /// counts every failed-or-orphaned edge relation it discovers, even
    /// through blocks a prior, independent failure already orphaned (spec
    /// §4.2, §8 scenario S4). When `false` (the default), each block is
    /// counted at most once, the first time it becomes orphaned.
    pub count_all_orphans: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            count_all_orphans: false,
        }
    }
}

/// The geometry supplied by the caller at construction time: every block
/// each task owns, plus the edges between them.
///
/// This stands in for the out-of-scope block-enumeration module (spec
/// §1): something upstream of the scheduler already knows that block 7 of
/// "resample" depends on blocks 3 and 4 of "ingest", and hands that
/// knowledge in through [`PipelineBlocks::add_block`]/`add_edge` the same
/// way it would hand it to [`DependencyGraphBuilder`] directly. `Scheduler`
/// wraps the builder so callers only touch one type.
#[derive(Debug, Default)]
pub struct PipelineBlocks(DependencyGraphBuilder);

impl PipelineBlocks {
    pub fn new() -> Self {
        Self(DependencyGraphBuilder::default())
    }

    pub fn add_block(&mut self, task_id: u64, block_id: u64) -> &mut Self {
        self.0.add_block(task_id, block_id);
        self
    }

    pub fn add_edge(&mut self, upstream: BlockId, downstream: BlockId) -> &mut Self {
        self.0.add_edge(upstream, downstream);
        self
    }
}

struct Inner {
    ready_surface: ReadySurface,
    task_map: HashMap<u64, Arc<dyn Task>>,
    task_states: HashMap<u64, TaskState>,
    task_queues: HashMap<u64, ProcessingQueue>,
    /// One-slot-per-task memo of the most recent precheck (spec §4.4.4):
    /// `(block, result)`. Invalidated -- overwritten -- on every
    /// `release_block` for that task, per the Open Question decision
    /// recorded in `DESIGN.md`.
    last_prechecked: HashMap<u64, (Block, bool)>,
    count_all_orphans: bool,
}

/// Coordinates which blocks are ready to run, tracks retries, and
/// propagates failure through the dependency graph.
///
/// All mutable state lives behind a single [`Mutex`] (spec §5, thread
/// safety option (a)): every public method takes `&self`, so the type can
/// be shared across worker threads behind an `Arc` without the caller
/// serializing access itself.
pub struct Scheduler {
    inner: Mutex<Inner>,
}

impl Scheduler {
    /// Build a scheduler from a root set of tasks (discovered transitively
    /// via [`Task::requires`]) and the block geometry describing how their
    /// blocks depend on one another.
    ///
    /// Fails with [`ConfigurationError::DuplicateTaskId`] if two distinct
    /// task handles claim the same id, or with
    /// [`ConfigurationError::Cycle`] / [`ConfigurationError::UnknownBlock`]
    /// propagated from graph construction.
    pub fn new(
        roots: Vec<Arc<dyn Task>>,
        blocks: PipelineBlocks,
        config: SchedulerConfig,
    ) -> Result<Self, SchedulerError> {
        let task_map = collect_tasks(roots)?;
        let graph = Arc::new(blocks.0.build().map_err(SchedulerError::Configuration)?);

        let mut task_states = HashMap::new();
        let mut task_queues = HashMap::new();
        let mut roots_by_task = graph.roots();
        for &task_id in task_map.keys() {
            let (count, root_blocks) = roots_by_task
                .remove(&task_id)
                .unwrap_or_else(|| (0, crate::graph::RootBlocks::empty()));
            let mut state = TaskState::new(graph.num_blocks(task_id));
            state.ready = count;
            task_states.insert(task_id, state);
            task_queues.insert(task_id, ProcessingQueue::new(task_id, root_blocks));
            debug!(task_id, blocks = count, "registered task");
        }

        let ready_surface = ReadySurface::new(graph);

        Ok(Self {
            inner: Mutex::new(Inner {
                ready_surface,
                task_map,
                task_states,
                task_queues,
                last_prechecked: HashMap::new(),
                count_all_orphans: config.count_all_orphans,
            }),
        })
    }

    /// True iff any task has a block immediately available.
    pub fn has_next(&self) -> bool {
        let inner = self.inner.lock().expect("scheduler mutex poisoned");
        inner.task_queues.values().any(ProcessingQueue::has_next)
    }

    /// Acquire the next available block for `task_id`, applying the
    /// precheck skip path (spec §4.4.4): if the task's `check_function`
    /// returns `true` for the candidate block, it is immediately recorded
    /// as `SUCCESS` (via the same path as a caller-driven release) and the
    /// loop tries the next candidate instead of handing it out.
    ///
    /// Iterative, not recursive (unlike the reference behavior this was
    /// ported from): an unbounded run of skippable blocks cannot overflow
    /// the stack.
    pub fn acquire_block(&self, task_id: u64) -> Result<Option<Block>, SchedulerError> {
        let mut inner = self.inner.lock().expect("scheduler mutex poisoned");
        loop {
            let Some(queue) = inner.task_queues.get_mut(&task_id) else {
                return Ok(None);
            };
            if !queue.has_next() {
                return Ok(None);
            }
            let mut block = queue
                .get_next()
                .map_err(SchedulerError::Invariant)?;
            block.status = BlockStatus::Ready;
            if let Some(state) = inner.task_states.get_mut(&task_id) {
                state.ready = state.ready.saturating_sub(1);
            }

            let skip = match inner.last_prechecked.get(&task_id) {
                Some((cached, result)) if *cached == block => *result,
                _ => run_check_function(&inner.task_map, task_id, &block),
            };
            inner.last_prechecked.insert(task_id, (block.clone(), skip));

            if skip {
                debug!(block = %block.id(), "precheck skipped block");
                if let Some(queue) = inner.task_queues.get_mut(&task_id) {
                    queue.mark_processing(block.block_id);
                }
                block.status = BlockStatus::Skipped;
                let _ = release_locked(&mut inner, block)?;
                continue;
            }

            block.status = BlockStatus::InProgress;
            if let Some(queue) = inner.task_queues.get_mut(&task_id) {
                queue.mark_processing(block.block_id);
            }
            if let Some(state) = inner.task_states.get_mut(&task_id) {
                state.started = true;
                state.processing += 1;
            }
            return Ok(Some(block));
        }
    }

    /// Report the outcome of a block previously returned by
    /// [`Self::acquire_block`] (or, transparently, by the precheck skip
    /// path). Dispatches success/retry/terminal-failure per spec §4.4.3
    /// and returns the set of tasks whose [`TaskState`] changed as a
    /// result, mirroring the update-notification shape of the original
    /// implementation this scheduler's release semantics are grounded on.
    pub fn release_block(&self, block: Block) -> Result<HashMap<u64, TaskState>, SchedulerError> {
        let mut inner = self.inner.lock().expect("scheduler mutex poisoned");
        release_locked(&mut inner, block)
    }

    /// Every task with at least one block ready to acquire right now.
    pub fn get_ready_tasks(&self) -> Vec<Arc<dyn Task>> {
        let inner = self.inner.lock().expect("scheduler mutex poisoned");
        inner
            .task_queues
            .iter()
            .filter(|(_, q)| q.has_next())
            .filter_map(|(task_id, _)| inner.task_map.get(task_id).cloned())
            .collect()
    }

    /// A snapshot of every task's current counters.
    pub fn task_states(&self) -> HashMap<u64, TaskState> {
        let inner = self.inner.lock().expect("scheduler mutex poisoned");
        inner.task_states.clone()
    }
}

fn release_locked(
    inner: &mut Inner,
    block: Block,
) -> Result<HashMap<u64, TaskState>, SchedulerError> {
    let id = block.id();
    let task_id = block.task_id;

    if !block.status.is_terminal() {
        return Err(SchedulerError::Invariant(InvariantError::NonTerminalRelease(
            id,
            block.status,
        )));
    }

    let was_processing = inner
        .task_queues
        .get_mut(&task_id)
        .map(|q| q.remove_processing(block.block_id))
        .unwrap_or(false);
    if !was_processing {
        return Err(SchedulerError::Invariant(InvariantError::NotProcessing(id)));
    }

    inner.last_prechecked.remove(&task_id);

    if let Some(state) = inner.task_states.get_mut(&task_id) {
        state.processing = state.processing.saturating_sub(1);
    }

    let mut changed = HashMap::new();

    match block.status {
        BlockStatus::Success | BlockStatus::Skipped => {
            let newly_ready = inner
                .ready_surface
                .mark_success(&block)
                .map_err(SchedulerError::Invariant)?;
            if let Some(state) = inner.task_states.get_mut(&task_id) {
                state.completed += 1;
            }
            for ready_id in &newly_ready {
                if let Some(queue) = inner.task_queues.get_mut(&ready_id.task_id) {
                    queue.queue_ready_block(Block::new(ready_id.task_id, ready_id.block_id), None);
                }
                if let Some(state) = inner.task_states.get_mut(&ready_id.task_id) {
                    state.ready += 1;
                }
            }
            let mut touched: Vec<u64> = newly_ready.iter().map(|i| i.task_id).collect();
            touched.push(task_id);
            touched.sort_unstable();
            touched.dedup();
            for t in touched {
                if let Some(state) = inner.task_states.get(&t) {
                    changed.insert(t, *state);
                }
            }
        }
        BlockStatus::Failed => {
            let retries = inner
                .task_queues
                .get(&task_id)
                .map(|q| q.retries(block.block_id))
                .unwrap_or(0);
            let max_retries = inner
                .task_map
                .get(&task_id)
                .map(|t| t.max_retries())
                .unwrap_or(0);

            if retries < max_retries {
                if let Some(queue) = inner.task_queues.get_mut(&task_id) {
                    queue.increment_retries(block.block_id);
                    let mut retry_block = block.clone();
                    retry_block.status = BlockStatus::Created;
                    queue.queue_ready_block(retry_block, None);
                }
                if let Some(state) = inner.task_states.get_mut(&task_id) {
                    state.ready += 1;
                }
                warn!(block = %id, retries = retries + 1, max_retries, "retrying failed block");
                if let Some(state) = inner.task_states.get(&task_id) {
                    changed.insert(task_id, *state);
                }
            } else {
                error!(block = %id, "block failed with no retries remaining");
                let report = inner.ready_surface.mark_failure(&block, inner.count_all_orphans);
                if let Some(state) = inner.task_states.get_mut(&task_id) {
                    state.failed += 1;
                }
                changed.insert(task_id, *inner.task_states.get(&task_id).unwrap());

                for downstream_task in report.affected_tasks() {
                    let n = report.for_task(downstream_task);
                    if let Some(state) = inner.task_states.get_mut(&downstream_task) {
                        state.orphaned += n;
                    }
                    if let Some(state) = inner.task_states.get(&downstream_task) {
                        changed.insert(downstream_task, *state);
                    }
                }
            }
        }
        other => {
            return Err(SchedulerError::Invariant(InvariantError::NonTerminalRelease(
                id, other,
            )));
        }
    }

    Ok(changed)
}

/// Runs `task_id`'s `check_function` against `block` if one is registered,
/// catching a panic and treating it as "do not skip" (spec §4.4.4, §7).
fn run_check_function(task_map: &HashMap<u64, Arc<dyn Task>>, task_id: u64, block: &Block) -> bool {
    let Some(task) = task_map.get(&task_id) else {
        return false;
    };
    let Some(check) = task.check_function() else {
        return false;
    };
    match catch_unwind(AssertUnwindSafe(|| check(block))) {
        Ok(result) => result,
        Err(_) => {
            error!(block = %block.id(), "check_function panicked, treating block as not skippable");
            false
        }
    }
}

/// Walks `requires()` transitively from `roots`, rejecting duplicate task
/// ids (spec §4.4.1).
fn collect_tasks(roots: Vec<Arc<dyn Task>>) -> Result<HashMap<u64, Arc<dyn Task>>, SchedulerError> {
    let mut seen: HashMap<u64, Arc<dyn Task>> = HashMap::new();
    let mut stack = roots;
    while let Some(task) = stack.pop() {
        let id = task.task_id();
        if let Some(existing) = seen.get(&id) {
            if !Arc::ptr_eq(existing, &task) {
                return Err(SchedulerError::Configuration(ConfigurationError::DuplicateTaskId {
                    task_id: id,
                }));
            }
            continue;
        }
        stack.extend(task.requires());
        seen.insert(id, task);
    }
    Ok(seen)
}
