//! `ProcessingQueue` -- per-task FIFO of ready blocks, in-flight set, and
//! retry counters (spec §3, §4.3).

use std::collections::{HashMap, HashSet, VecDeque};

use crate::block::Block;
use crate::error::InvariantError;
use crate::graph::RootBlocks;

/// Holds one task's ready queue, in-flight set, and per-block retry count.
pub struct ProcessingQueue {
    task_id: u64,
    ready_queue: VecDeque<Block>,
    processing_blocks: HashSet<u64>,
    block_retries: HashMap<u64, u32>,
    roots: RootBlocks,
}

impl ProcessingQueue {
    pub fn new(task_id: u64, roots: RootBlocks) -> Self {
        Self {
            task_id,
            ready_queue: VecDeque::new(),
            processing_blocks: HashSet::new(),
            block_retries: HashMap::new(),
            roots,
        }
    }

    /// True iff a block is available without blocking: either the ready
    /// queue holds one, or the lazy root sequence has one left.
    pub fn has_next(&self) -> bool {
        !self.ready_queue.is_empty() || !self.roots.is_empty()
    }

    /// Pop the next block to hand out. The ready queue drains first, then
    /// the root sequence (spec §4.3). Returns
    /// [`InvariantError::ExhaustedRoots`] if `has_next` was true but the
    /// root iterator is empty -- a [`crate::graph::DependencyGraph`] bug.
    pub fn get_next(&mut self) -> Result<Block, InvariantError> {
        if let Some(block) = self.ready_queue.pop_front() {
            return Ok(block);
        }
        match self.roots.next() {
            Some(id) => Ok(Block::new(id.task_id, id.block_id)),
            None => Err(InvariantError::ExhaustedRoots {
                task_id: self.task_id,
            }),
        }
    }

    /// Admit a block to the ready queue. `index = None` appends (the only
    /// path the scheduler itself exercises); `Some(i)` inserts at a given
    /// position, preserving retry latency when a caller wants head-of-line
    /// admission (spec §4.3: "currently unused by the scheduler itself").
    ///
    /// # Panics
    ///
    /// Panics (debug builds) if `block`'s id is already in the in-flight
    /// set -- admitting a block that is still being processed is a
    /// programmer error, not a runtime condition a caller can trigger
    /// through the public API.
    pub fn queue_ready_block(&mut self, block: Block, index: Option<usize>) {
        debug_assert!(
            !self.processing_blocks.contains(&block.block_id),
            "block {} admitted to ready queue while still processing",
            block.block_id
        );
        match index {
            Some(i) => {
                let i = i.min(self.ready_queue.len());
                self.ready_queue.insert(i, block);
            }
            None => self.ready_queue.push_back(block),
        }
    }

    pub fn mark_processing(&mut self, block_id: u64) {
        self.processing_blocks.insert(block_id);
    }

    /// Remove `block_id` from the in-flight set. Returns `false` if it was
    /// not present (the caller released a block that was never acquired,
    /// or released twice).
    pub fn remove_processing(&mut self, block_id: u64) -> bool {
        self.processing_blocks.remove(&block_id)
    }

    pub fn retries(&self, block_id: u64) -> u32 {
        self.block_retries.get(&block_id).copied().unwrap_or(0)
    }

    pub fn increment_retries(&mut self, block_id: u64) {
        *self.block_retries.entry(block_id).or_insert(0) += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::DependencyGraphBuilder;

    fn roots_for(task_id: u64, n: u64) -> RootBlocks {
        if n == 0 {
            return RootBlocks::empty();
        }
        let mut b = DependencyGraphBuilder::new();
        for i in 0..n {
            b.add_block(task_id, i);
        }
        let graph = b.build().unwrap();
        graph.roots().remove(&task_id).map(|(_, r)| r).unwrap()
    }

    #[test]
    fn drains_ready_queue_before_roots() {
        let mut q = ProcessingQueue::new(1, roots_for(1, 2));
        assert!(q.has_next());
        q.queue_ready_block(Block::new(1, 100), None);
        let first = q.get_next().unwrap();
        assert_eq!(first.block_id, 100, "ready queue drains before roots");
    }

    #[test]
    fn has_next_false_once_drained() {
        let mut q = ProcessingQueue::new(1, roots_for(1, 1));
        assert!(q.has_next());
        let _ = q.get_next().unwrap();
        assert!(!q.has_next());
        assert!(matches!(
            q.get_next(),
            Err(InvariantError::ExhaustedRoots { task_id: 1 })
        ));
    }

    #[test]
    fn head_insertion_supported_but_unused_by_default() {
        let mut q = ProcessingQueue::new(1, roots_for(1, 0));
        q.queue_ready_block(Block::new(1, 1), None);
        q.queue_ready_block(Block::new(1, 2), Some(0));
        let first = q.get_next().unwrap();
        assert_eq!(first.block_id, 2);
    }

    #[test]
    fn retry_counter_defaults_to_zero_and_increments() {
        let q_task = 1;
        let mut q = ProcessingQueue::new(q_task, roots_for(q_task, 0));
        assert_eq!(q.retries(42), 0);
        q.increment_retries(42);
        q.increment_retries(42);
        assert_eq!(q.retries(42), 2);
    }

    #[test]
    fn processing_set_tracks_in_flight_blocks() {
        let mut q = ProcessingQueue::new(1, roots_for(1, 0));
        q.mark_processing(7);
        assert!(q.remove_processing(7));
        assert!(!q.remove_processing(7));
    }
}
