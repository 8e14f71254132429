//! The `Block` value type and its status enum (spec §3, §4.4.6).

use std::fmt;

use serde::{Deserialize, Serialize};

/// The lifecycle status of a single block.
///
/// ```text
/// CREATED ──(enters ready_queue)──▶ READY
/// READY ──(acquire)──▶ IN_PROGRESS
/// IN_PROGRESS ──(release, SUCCESS)──▶ SUCCESS          (terminal)
/// IN_PROGRESS ──(release, FAILED, retries left)──▶ READY
/// IN_PROGRESS ──(release, FAILED, no retries)──▶ FAILED (terminal)
/// READY ──(upstream failed)──▶ ORPHANED                (terminal)
/// IN_PROGRESS ──(precheck skip path)──▶ SKIPPED→SUCCESS (terminal)
/// ```
///
/// The `READY -> ORPHANED` edge is never reached by this implementation: a
/// block only becomes `READY` once every upstream has already succeeded, so
/// none of its upstreams can subsequently fail. It is kept in the enum and
/// the diagram above because the state machine is part of the public
/// contract; only `CREATED` blocks are ever orphaned in practice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlockStatus {
    Created,
    Ready,
    InProgress,
    Success,
    Failed,
    Skipped,
    Orphaned,
}

impl BlockStatus {
    /// Terminal statuses never change again once reached.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            BlockStatus::Success | BlockStatus::Failed | BlockStatus::Skipped | BlockStatus::Orphaned
        )
    }
}

impl Default for BlockStatus {
    fn default() -> Self {
        BlockStatus::Created
    }
}

impl fmt::Display for BlockStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BlockStatus::Created => "created",
            BlockStatus::Ready => "ready",
            BlockStatus::InProgress => "in_progress",
            BlockStatus::Success => "success",
            BlockStatus::Failed => "failed",
            BlockStatus::Skipped => "skipped",
            BlockStatus::Orphaned => "orphaned",
        };
        f.write_str(s)
    }
}

/// Stable identity of a block, independent of its mutable `status`.
///
/// The scheduler re-identifies every block it is handed back by
/// `(task_id, block_id)` rather than trusting the caller's copy (spec §3,
/// "Ownership").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockId {
    pub task_id: u64,
    pub block_id: u64,
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.task_id, self.block_id)
    }
}

/// A unit of work inside a task: the scheduling granularity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Block {
    pub task_id: u64,
    pub block_id: u64,
    pub status: BlockStatus,
}

impl Block {
    /// Construct a fresh block in the `CREATED` status.
    pub fn new(task_id: u64, block_id: u64) -> Self {
        Self {
            task_id,
            block_id,
            status: BlockStatus::Created,
        }
    }

    /// Construct a block with an explicit status (used by tests and by the
    /// scheduler when it admits or re-admits blocks to a ready queue).
    pub fn with_status(task_id: u64, block_id: u64, status: BlockStatus) -> Self {
        Self {
            task_id,
            block_id,
            status,
        }
    }

    /// The block's stable `(task_id, block_id)` identity.
    pub fn id(&self) -> BlockId {
        BlockId {
            task_id: self.task_id,
            block_id: self.block_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_status_display_roundtrip() {
        let variants = [
            BlockStatus::Created,
            BlockStatus::Ready,
            BlockStatus::InProgress,
            BlockStatus::Success,
            BlockStatus::Failed,
            BlockStatus::Skipped,
            BlockStatus::Orphaned,
        ];
        for v in variants {
            assert!(!v.to_string().is_empty());
        }
    }

    #[test]
    fn terminal_statuses() {
        assert!(BlockStatus::Success.is_terminal());
        assert!(BlockStatus::Failed.is_terminal());
        assert!(BlockStatus::Orphaned.is_terminal());
        assert!(BlockStatus::Skipped.is_terminal());
        assert!(!BlockStatus::Created.is_terminal());
        assert!(!BlockStatus::Ready.is_terminal());
        assert!(!BlockStatus::InProgress.is_terminal());
    }

    #[test]
    fn block_id_identifies_regardless_of_status() {
        let a = Block::with_status(1, 2, BlockStatus::Created);
        let b = Block::with_status(1, 2, BlockStatus::Success);
        assert_eq!(a.id(), b.id());
    }
}
