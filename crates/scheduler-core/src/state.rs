//! `TaskState` -- per-task block counters exposed to callers (spec §4.5,
//! §6 observability).

use serde::{Deserialize, Serialize};

/// A snapshot of one task's block counts.
///
/// `pending` is derived, never stored directly: it is always
/// `total - (ready + processing + completed + failed + orphaned)`, computed
/// with saturating arithmetic so a transient race between two counter
/// updates can never underflow into a bogus huge count.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskState {
    pub total: usize,
    pub ready: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
    pub orphaned: usize,
    /// Set once this task has yielded at least one block via
    /// `acquire_block` (spec §4.5: distinguishes "not started" from
    /// "started but still at zero ready/processing/...").
    pub started: bool,
}

impl TaskState {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }

    /// Blocks not yet ready, processing, or in a terminal state.
    pub fn pending(&self) -> usize {
        self.total
            .saturating_sub(self.ready)
            .saturating_sub(self.processing)
            .saturating_sub(self.completed)
            .saturating_sub(self.failed)
            .saturating_sub(self.orphaned)
    }

    /// True once every block has reached a terminal status. A task with
    /// zero blocks is done from the moment it's registered (spec §4: "that
    /// task is immediately done and must not appear in `get_ready_tasks`").
    pub fn is_done(&self) -> bool {
        self.completed + self.failed + self.orphaned == self.total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_is_derived_and_non_negative() {
        let mut s = TaskState::new(5);
        s.ready = 2;
        s.completed = 3;
        assert_eq!(s.pending(), 0);
        s.completed = 10;
        assert_eq!(s.pending(), 0, "saturating, never underflows");
    }

    #[test]
    fn is_done_true_for_empty_task_and_when_fully_terminal() {
        let empty = TaskState::new(0);
        assert!(empty.is_done(), "a zero-block task is immediately done");

        let mut s = TaskState::new(2);
        s.completed = 1;
        s.failed = 1;
        assert!(s.is_done());
    }
}
