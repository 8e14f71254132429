//! `DependencyGraph` -- materialized block-to-block edges (spec §3, §4.1).
//!
//! Enumerating *which* blocks depend on which (the block geometry) is an
//! external collaborator's job (spec §1): given task parameters, some other
//! module decides that block 7 of task "resample" depends on blocks 3 and 4
//! of task "ingest". That module hands its answer to
//! [`DependencyGraphBuilder`] one block and one edge at a time; this module
//! only materializes the result into the indices the scheduler nucleus
//! needs: `upstream`, `downstream`, `num_blocks`, and a once-per-task lazy
//! root sequence.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::OnceLock;

use crate::block::BlockId;
use crate::error::ConfigurationError;

fn empty_block_set(found: Option<&HashSet<BlockId>>) -> &HashSet<BlockId> {
    static EMPTY: OnceLock<HashSet<BlockId>> = OnceLock::new();
    found.unwrap_or_else(|| EMPTY.get_or_init(HashSet::new))
}

/// A one-shot, deterministic sequence of root blocks for a single task.
///
/// "Restartable only once" (spec §4.1): each `RootBlocks` instance is a
/// plain forward iterator over a `Vec` built at graph-construction time, so
/// once it's been handed to a [`crate::queue::ProcessingQueue`] and drained,
/// there is nothing left to replay. A fresh instance can still be obtained
/// from [`DependencyGraph::roots`], which is why the type itself carries no
/// "already consumed" flag.
#[derive(Debug)]
pub struct RootBlocks(std::vec::IntoIter<BlockId>);

impl RootBlocks {
    fn new(ids: Vec<BlockId>) -> Self {
        Self(ids.into_iter())
    }

    /// An already-exhausted sequence, for callers (tests, fixtures) that
    /// need a `RootBlocks` handle for a task with no root blocks.
    pub(crate) fn empty() -> Self {
        Self(Vec::new().into_iter())
    }

    /// Number of root blocks not yet yielded.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.len() == 0
    }
}

impl Iterator for RootBlocks {
    type Item = BlockId;

    fn next(&mut self) -> Option<BlockId> {
        self.0.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.0.size_hint()
    }
}

impl ExactSizeIterator for RootBlocks {}

/// Materialized block-to-block upstream/downstream edge set across every
/// task in the pipeline.
#[derive(Debug)]
pub struct DependencyGraph {
    upstream: HashMap<BlockId, HashSet<BlockId>>,
    downstream: HashMap<BlockId, HashSet<BlockId>>,
    num_blocks: HashMap<u64, usize>,
    roots: HashMap<u64, Vec<BlockId>>,
}

impl DependencyGraph {
    /// All direct upstream blocks of `block`. Empty if `block` is a root or
    /// unknown.
    pub fn upstream(&self, block: BlockId) -> &HashSet<BlockId> {
        empty_block_set(self.upstream.get(&block))
    }

    /// All direct downstream blocks of `block`. Empty if nothing depends on
    /// it or it is unknown.
    pub fn downstream(&self, block: BlockId) -> &HashSet<BlockId> {
        empty_block_set(self.downstream.get(&block))
    }

    /// Exact block count for `task_id`, or `0` for an unregistered task.
    pub fn num_blocks(&self, task_id: u64) -> usize {
        self.num_blocks.get(&task_id).copied().unwrap_or(0)
    }

    /// Per task: the number of root blocks and a fresh, once-per-call
    /// sequence to produce them. The sequence always yields exactly that
    /// many elements (spec §4.1) -- it is cloned from storage computed once
    /// at construction time, not recomputed lazily.
    pub fn roots(&self) -> HashMap<u64, (usize, RootBlocks)> {
        self.roots
            .iter()
            .map(|(&task_id, ids)| (task_id, (ids.len(), RootBlocks::new(ids.clone()))))
            .collect()
    }

    /// Every task id with at least one registered block.
    pub fn task_ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.num_blocks.keys().copied()
    }
}

/// Incrementally builds a [`DependencyGraph`] from blocks and edges supplied
/// by the (out-of-scope) block-geometry module.
#[derive(Debug, Default)]
pub struct DependencyGraphBuilder {
    blocks: HashMap<u64, Vec<BlockId>>,
    seen_blocks: HashSet<BlockId>,
    edges: Vec<(BlockId, BlockId)>,
}

impl DependencyGraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a block. Order of registration is the deterministic
    /// tie-break used for root enumeration (spec §4.1: "enumeration order
    /// is implementation-defined but must be deterministic given the same
    /// inputs").
    pub fn add_block(&mut self, task_id: u64, block_id: u64) -> &mut Self {
        let id = BlockId { task_id, block_id };
        if self.seen_blocks.insert(id) {
            self.blocks.entry(task_id).or_default().push(id);
        }
        self
    }

    /// Record that `downstream` depends on `upstream`. Both blocks must
    /// already have been (or will be) registered with [`Self::add_block`].
    pub fn add_edge(&mut self, upstream: BlockId, downstream: BlockId) -> &mut Self {
        self.edges.push((upstream, downstream));
        self
    }

    /// Materialize the graph, validating acyclicity.
    ///
    /// Returns [`ConfigurationError::Cycle`] if `requires()`/the supplied
    /// edges transitively describe a cycle, and
    /// [`ConfigurationError::UnknownBlock`] if an edge names a block whose
    /// task was never registered via [`Self::add_block`].
    pub fn build(self) -> Result<DependencyGraph, ConfigurationError> {
        let mut upstream: HashMap<BlockId, HashSet<BlockId>> = HashMap::new();
        let mut downstream: HashMap<BlockId, HashSet<BlockId>> = HashMap::new();

        for &id in &self.seen_blocks {
            upstream.entry(id).or_default();
            downstream.entry(id).or_default();
        }

        for (up, down) in &self.edges {
            if !self.seen_blocks.contains(up) {
                return Err(ConfigurationError::UnknownBlock(*up));
            }
            if !self.seen_blocks.contains(down) {
                return Err(ConfigurationError::UnknownBlock(*down));
            }
            upstream.entry(*down).or_default().insert(*up);
            downstream.entry(*up).or_default().insert(*down);
        }

        let num_blocks = self
            .blocks
            .iter()
            .map(|(&task_id, ids)| (task_id, ids.len()))
            .collect();

        let roots = self
            .blocks
            .iter()
            .map(|(&task_id, ids)| {
                let task_roots: Vec<BlockId> = ids
                    .iter()
                    .copied()
                    .filter(|id| upstream.get(id).map(HashSet::is_empty).unwrap_or(true))
                    .collect();
                (task_id, task_roots)
            })
            .collect();

        let graph = DependencyGraph {
            upstream,
            downstream,
            num_blocks,
            roots,
        };

        detect_cycle(&graph)?;

        Ok(graph)
    }
}

/// Kahn's algorithm: if topological processing can't drain every block, a
/// cycle exists among the unprocessed remainder.
fn detect_cycle(graph: &DependencyGraph) -> Result<(), ConfigurationError> {
    let mut indegree: HashMap<BlockId, usize> = HashMap::new();
    for (&id, preds) in &graph.upstream {
        indegree.insert(id, preds.len());
    }

    let mut queue: VecDeque<BlockId> = indegree
        .iter()
        .filter(|&(_, &deg)| deg == 0)
        .map(|(&id, _)| id)
        .collect();

    let mut visited = 0usize;
    while let Some(id) = queue.pop_front() {
        visited += 1;
        for &down in graph.downstream(id) {
            let deg = indegree.get_mut(&down).expect("downstream block registered");
            *deg -= 1;
            if *deg == 0 {
                queue.push_back(down);
            }
        }
    }

    if visited == indegree.len() {
        Ok(())
    } else {
        // Any block left with a nonzero indegree participates in a cycle.
        let task_id = indegree
            .into_iter()
            .find(|&(_, deg)| deg > 0)
            .map(|(id, _)| id.task_id)
            .unwrap_or_default();
        Err(ConfigurationError::Cycle { task_id })
    }
}
