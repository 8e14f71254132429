//! In-memory fixtures for exercising `scheduler-core` without a real
//! block-geometry source or worker pool.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use scheduler_core::{Block, CheckFunction, PipelineBlocks, Task};

/// A minimal [`Task`] implementation for tests: fixed id, fixed retry
/// budget, optional upstream list, optional precheck.
#[derive(Debug)]
pub struct FixtureTask {
    id: u64,
    max_retries: u32,
    requires: Vec<Arc<dyn Task>>,
    check_function: Option<CheckFunction>,
}

impl FixtureTask {
    pub fn new(id: u64, max_retries: u32) -> Arc<Self> {
        Arc::new(Self {
            id,
            max_retries,
            requires: Vec::new(),
            check_function: None,
        })
    }

    pub fn with_requires(id: u64, max_retries: u32, requires: Vec<Arc<dyn Task>>) -> Arc<Self> {
        Arc::new(Self {
            id,
            max_retries,
            requires,
            check_function: None,
        })
    }

    /// A task whose check function always skips (every block is marked
    /// already done).
    pub fn always_skip(id: u64, max_retries: u32) -> Arc<Self> {
        Arc::new(Self {
            id,
            max_retries,
            requires: Vec::new(),
            check_function: Some(Box::new(|_: &Block| true)),
        })
    }

    /// A task with a caller-supplied precheck.
    pub fn with_check(id: u64, max_retries: u32, check_function: CheckFunction) -> Arc<Self> {
        Arc::new(Self {
            id,
            max_retries,
            requires: Vec::new(),
            check_function: Some(check_function),
        })
    }

    /// A task whose check function panics on the first call and never
    /// again (spec §8 "precheck-exception-non-fatal" scenario): exercises
    /// the `catch_unwind` path without wedging the scheduler in a retry
    /// loop.
    pub fn panics_once(id: u64, max_retries: u32) -> Arc<Self> {
        let fired = AtomicBool::new(false);
        Arc::new(Self {
            id,
            max_retries,
            requires: Vec::new(),
            check_function: Some(Box::new(move |_: &Block| {
                if !fired.swap(true, Ordering::SeqCst) {
                    panic!("simulated precheck failure");
                }
                false
            })),
        })
    }
}

impl Task for FixtureTask {
    fn task_id(&self) -> u64 {
        self.id
    }

    fn max_retries(&self) -> u32 {
        self.max_retries
    }

    fn check_function(&self) -> Option<&CheckFunction> {
        self.check_function.as_ref()
    }

    fn requires(&self) -> Vec<Arc<dyn Task>> {
        self.requires.clone()
    }
}

/// A straight chain `task[0] -> task[1] -> ... -> task[n-1]`, one block per
/// task, wired into a [`PipelineBlocks`] ready to pass to
/// `Scheduler::new`.
pub fn linear_chain(task_ids: &[u64], max_retries: u32) -> (Vec<Arc<dyn Task>>, PipelineBlocks) {
    let mut tasks: Vec<Arc<dyn Task>> = Vec::new();
    let mut blocks = PipelineBlocks::new();

    for (i, &id) in task_ids.iter().enumerate() {
        let upstream = tasks.last().cloned().into_iter().collect::<Vec<_>>();
        let task: Arc<dyn Task> = FixtureTask::with_requires(id, max_retries, upstream);
        blocks.add_block(id, 0);
        if i > 0 {
            blocks.add_edge(
                scheduler_core::BlockId {
                    task_id: task_ids[i - 1],
                    block_id: 0,
                },
                scheduler_core::BlockId {
                    task_id: id,
                    block_id: 0,
                },
            );
        }
        tasks.push(task);
    }

    let roots = tasks.last().cloned().into_iter().collect();
    (roots, blocks)
}

/// Two upstream tasks (`a`, `b`), each with one block, both feeding a
/// single downstream block of task `c` -- the fan-in shape spec §8's
/// `count_all_orphans` scenario (S4) exercises.
pub fn fan_in(a: u64, b: u64, c: u64, max_retries: u32) -> (Vec<Arc<dyn Task>>, PipelineBlocks) {
    let task_a: Arc<dyn Task> = FixtureTask::new(a, max_retries);
    let task_b: Arc<dyn Task> = FixtureTask::new(b, max_retries);
    let task_c: Arc<dyn Task> =
        FixtureTask::with_requires(c, max_retries, vec![Arc::clone(&task_a), Arc::clone(&task_b)]);

    let mut blocks = PipelineBlocks::new();
    blocks.add_block(a, 0).add_block(b, 0).add_block(c, 0);
    blocks.add_edge(
        scheduler_core::BlockId { task_id: a, block_id: 0 },
        scheduler_core::BlockId { task_id: c, block_id: 0 },
    );
    blocks.add_edge(
        scheduler_core::BlockId { task_id: b, block_id: 0 },
        scheduler_core::BlockId { task_id: c, block_id: 0 },
    );

    (vec![task_c], blocks)
}
