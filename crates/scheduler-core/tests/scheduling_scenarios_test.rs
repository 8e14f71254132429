//! End-to-end scenarios against a bare `Scheduler`, one per documented
//! scheduling behavior: linear success, retry-then-success, retry
//! exhaustion with orphan propagation, the `count_all_orphans` flag,
//! and the precheck skip path (including a panicking precheck).

use std::sync::Arc;

use scheduler_core::{Block, BlockId, BlockStatus, PipelineBlocks, Scheduler, SchedulerConfig, Task};
use scheduler_test_utils::{fan_in, FixtureTask};

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

fn skip_only_block_zero() -> scheduler_core::CheckFunction {
    Box::new(|b: &Block| b.block_id == 0)
}

fn config(count_all_orphans: bool) -> SchedulerConfig {
    SchedulerConfig { count_all_orphans }
}

fn drain_acquire(scheduler: &Scheduler, task_id: u64) -> Vec<Block> {
    let mut out = Vec::new();
    while let Some(b) = scheduler.acquire_block(task_id).unwrap() {
        out.push(b);
    }
    out
}

/// Task A -> Task B, three blocks each, block i of A is the sole upstream
/// of block i of B.
fn linear_three_wide(max_retries: u32) -> (Vec<Arc<dyn Task>>, PipelineBlocks) {
    let task_a: Arc<dyn Task> = FixtureTask::new(1, max_retries);
    let task_b: Arc<dyn Task> =
        FixtureTask::with_requires(2, max_retries, vec![Arc::clone(&task_a)]);

    let mut blocks = PipelineBlocks::new();
    for i in 0..3 {
        blocks.add_block(1, i).add_block(2, i);
        blocks.add_edge(
            BlockId { task_id: 1, block_id: i },
            BlockId { task_id: 2, block_id: i },
        );
    }
    (vec![task_b], blocks)
}

#[test]
fn s1_linear_chain_all_succeed() {
    let (roots, blocks) = linear_three_wide(0);
    let scheduler = Scheduler::new(roots, blocks, config(false)).unwrap();

    for b in drain_acquire(&scheduler, 1) {
        let mut done = b;
        done.status = BlockStatus::Success;
        scheduler.release_block(done).unwrap();
    }
    for b in drain_acquire(&scheduler, 2) {
        let mut done = b;
        done.status = BlockStatus::Success;
        scheduler.release_block(done).unwrap();
    }

    let states = scheduler.task_states();
    assert_eq!(states[&1].completed, 3);
    assert_eq!(states[&2].completed, 3);
    assert_eq!(states[&1].failed, 0);
    assert_eq!(states[&2].orphaned, 0);
    assert!(scheduler.get_ready_tasks().is_empty());
}

#[test]
fn s2_retry_then_success() {
    let task_a: Arc<dyn Task> = FixtureTask::new(1, 2);
    let mut blocks = PipelineBlocks::new();
    blocks.add_block(1, 0);
    let scheduler = Scheduler::new(vec![task_a], blocks, config(false)).unwrap();

    let mut block = scheduler.acquire_block(1).unwrap().unwrap();
    block.status = BlockStatus::Failed;
    scheduler.release_block(block).unwrap();

    let mut block = scheduler.acquire_block(1).unwrap().unwrap();
    block.status = BlockStatus::Failed;
    scheduler.release_block(block).unwrap();

    let mut block = scheduler.acquire_block(1).unwrap().unwrap();
    block.status = BlockStatus::Success;
    scheduler.release_block(block).unwrap();

    let states = scheduler.task_states();
    assert_eq!(states[&1].completed, 1);
    assert_eq!(states[&1].failed, 0);
    assert_eq!(states[&1].orphaned, 0);
}

#[test]
fn s3_retry_exhausted_orphans_downstream() {
    // A -> B, B has b0 and b1 both depending on a0. max_retries=1.
    let task_a: Arc<dyn Task> = FixtureTask::new(1, 1);
    let task_b: Arc<dyn Task> =
        FixtureTask::with_requires(2, 1, vec![Arc::clone(&task_a)]);

    let mut blocks = PipelineBlocks::new();
    blocks.add_block(1, 0).add_block(2, 0).add_block(2, 1);
    blocks.add_edge(BlockId { task_id: 1, block_id: 0 }, BlockId { task_id: 2, block_id: 0 });
    blocks.add_edge(BlockId { task_id: 1, block_id: 0 }, BlockId { task_id: 2, block_id: 1 });

    let scheduler = Scheduler::new(vec![task_b], blocks, config(false)).unwrap();

    let mut block = scheduler.acquire_block(1).unwrap().unwrap();
    block.status = BlockStatus::Failed;
    scheduler.release_block(block).unwrap();

    let mut block = scheduler.acquire_block(1).unwrap().unwrap();
    block.status = BlockStatus::Failed;
    scheduler.release_block(block).unwrap();

    let states = scheduler.task_states();
    assert_eq!(states[&1].failed, 1);
    assert_eq!(states[&1].orphaned, 0);
    assert_eq!(states[&2].orphaned, 2);
    assert_eq!(states[&2].completed, 0);
    assert!(scheduler.get_ready_tasks().is_empty());
}

fn fail_to_exhaustion(scheduler: &Scheduler, task_id: u64) {
    let mut block = scheduler.acquire_block(task_id).unwrap().unwrap();
    block.status = BlockStatus::Failed;
    scheduler.release_block(block).unwrap();
}

#[test]
fn s4_count_all_orphans_flag_changes_fan_in_total() {
    for (flag, expected) in [(false, 1usize), (true, 2usize)] {
        let (roots, blocks) = fan_in(1, 2, 3, 0);
        let scheduler = Scheduler::new(roots, blocks, config(flag)).unwrap();

        fail_to_exhaustion(&scheduler, 1);
        fail_to_exhaustion(&scheduler, 2);

        let states = scheduler.task_states();
        assert_eq!(states[&3].orphaned, expected, "count_all_orphans={flag}");
    }
}

#[test]
fn s5_precheck_skips_completed_block() {
    // check_function returns true for a0, false for a1.
    let task: Arc<dyn Task> = FixtureTask::with_check(1, 0, skip_only_block_zero());
    let mut blocks = PipelineBlocks::new();
    blocks.add_block(1, 0).add_block(1, 1);
    let scheduler = Scheduler::new(vec![task], blocks, config(false)).unwrap();

    let returned = scheduler.acquire_block(1).unwrap();
    let block = returned.expect("a1 should be handed out");
    assert_eq!(block.block_id, 1);
    assert_eq!(block.status, BlockStatus::InProgress);

    let states = scheduler.task_states();
    assert_eq!(states[&1].completed, 1, "a0 was skipped straight to SUCCESS");
}

#[test]
fn s6_precheck_panic_is_non_fatal() {
    let task: Arc<dyn Task> = FixtureTask::panics_once(1, 0);
    let mut blocks = PipelineBlocks::new();
    blocks.add_block(1, 0);
    let scheduler = Scheduler::new(vec![task], blocks, config(false)).unwrap();

    // The precheck panics on the first call; the scheduler must catch it
    // and hand the block back as unchecked rather than propagating.
    let block = scheduler.acquire_block(1).unwrap();
    assert!(block.is_some());
    assert_eq!(block.unwrap().status, BlockStatus::InProgress);
}
