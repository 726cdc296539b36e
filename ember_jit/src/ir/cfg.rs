//! Control-flow graph over the fixed nodes of a [`Graph`].
//!
//! Blocks are discovered by walking fixed chains from `Start`:
//!
//! ```text
//!   Start ─ A ─ If ──┬── Begin ─ B ─ End ──┐
//!                    │                     ├── Region ─ C ─ Return
//!                    └── Begin ─ End ──────┘
//! ```
//!
//! A block begins at `Start`, `Region`, `Loop`, or a `Begin` hanging off an
//! `If`, and ends at its terminator. Block IDs are reverse post-order
//! indices, so the entry block is always `BlockId(0)` and every forward edge
//! goes from a lower to a higher ID.

use super::graph::Graph;
use super::node::NodeId;
use super::operators::{ControlOp, NodeKind, Operator};
use ember_core::{JitError, JitResult};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::fmt;

// =============================================================================
// Block
// =============================================================================

/// Handle to a basic block.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct BlockId(u32);

impl BlockId {
    /// Create a block ID from a raw index.
    #[inline]
    pub const fn new(index: u32) -> Self {
        BlockId(index)
    }

    /// Raw index.
    #[inline]
    pub const fn index(self) -> u32 {
        self.0
    }

    /// Raw index as `usize`.
    #[inline]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "B{}", self.0)
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A basic block: a maximal fixed chain from a block begin to a terminator.
#[derive(Debug, Clone)]
pub struct Block {
    /// This block's ID.
    pub id: BlockId,
    /// First fixed node.
    pub begin: NodeId,
    /// Terminator.
    pub end: NodeId,
    /// Fixed chain from `begin` to `end`, inclusive.
    pub fixed: Vec<NodeId>,
    /// Predecessors; for merges, in the order of the merge's end inputs.
    pub preds: SmallVec<[BlockId; 2]>,
    /// Successors; for branches, `[true, false]`.
    pub succs: SmallVec<[BlockId; 2]>,
}

// =============================================================================
// Control Flow Graph
// =============================================================================

/// Block structure of a graph.
#[derive(Debug, Clone)]
pub struct Cfg {
    /// Blocks in reverse post-order.
    blocks: Vec<Block>,
    /// Block of every fixed node.
    node_to_block: FxHashMap<NodeId, BlockId>,
}

/// A block discovered before reverse post-order numbering.
struct RawBlock {
    begin: NodeId,
    end: NodeId,
    fixed: Vec<NodeId>,
    /// Heads of successor blocks.
    succ_heads: SmallVec<[NodeId; 2]>,
}

impl Cfg {
    /// Build the CFG of `graph`.
    pub fn build(graph: &Graph) -> JitResult<Self> {
        let mut raw: Vec<RawBlock> = Vec::new();
        let mut head_index: FxHashMap<NodeId, usize> = FxHashMap::default();
        let mut owner: FxHashMap<NodeId, usize> = FxHashMap::default();
        let mut worklist = vec![graph.start];

        while let Some(head) = worklist.pop() {
            if head_index.contains_key(&head) {
                continue;
            }
            let index = raw.len();
            head_index.insert(head, index);

            let mut fixed = Vec::new();
            let mut current = head;
            loop {
                if owner.insert(current, index).is_some() {
                    return Err(JitError::malformed(format!(
                        "fixed node {current} is reachable from two blocks"
                    )));
                }
                fixed.push(current);
                let node = graph.node(current);
                if node.kind().is_terminator() {
                    break;
                }
                let next = node.next();
                let Some(next_node) = graph.get(next) else {
                    return Err(JitError::malformed(format!(
                        "chain through {current} ends without a terminator"
                    )));
                };
                if next_node.kind() == NodeKind::BlockBegin {
                    return Err(JitError::malformed(format!(
                        "{current} falls into block header {next} without an end"
                    )));
                }
                current = next;
            }

            let end = current;
            let end_node = graph.node(end);
            let succ_heads: SmallVec<[NodeId; 2]> = match end_node.op {
                Operator::Control(ControlOp::If(_)) => {
                    SmallVec::from_slice(&[end_node.true_successor(), end_node.false_successor()])
                }
                Operator::Control(ControlOp::End) | Operator::Control(ControlOp::LoopEnd) => {
                    let target = graph.end_target(end).ok_or_else(|| {
                        JitError::malformed(format!("{end} does not jump to a merge"))
                    })?;
                    SmallVec::from_slice(&[target])
                }
                _ => SmallVec::new(),
            };
            for &succ in succ_heads.iter().rev() {
                if !graph.is_live(succ) {
                    return Err(JitError::malformed(format!("{end} has a dangling successor")));
                }
                worklist.push(succ);
            }
            raw.push(RawBlock {
                begin: head,
                end,
                fixed,
                succ_heads,
            });
        }

        // Reverse post-order from the entry.
        let mut post_order = Vec::with_capacity(raw.len());
        let mut visited = vec![false; raw.len()];
        let mut stack: Vec<(usize, usize)> = vec![(0, 0)];
        visited[0] = true;
        while let Some(top) = stack.last_mut() {
            let (block, next_succ) = *top;
            if let Some(&succ_head) = raw[block].succ_heads.get(next_succ) {
                top.1 += 1;
                let succ = head_index[&succ_head];
                if !visited[succ] {
                    visited[succ] = true;
                    stack.push((succ, 0));
                }
            } else {
                post_order.push(block);
                stack.pop();
            }
        }
        let mut rpo_number = vec![0u32; raw.len()];
        for (rpo, &block) in post_order.iter().rev().enumerate() {
            rpo_number[block] = rpo as u32;
        }

        let mut blocks: Vec<Block> = post_order
            .iter()
            .rev()
            .map(|&block| {
                let raw_block = &raw[block];
                Block {
                    id: BlockId(rpo_number[block]),
                    begin: raw_block.begin,
                    end: raw_block.end,
                    fixed: raw_block.fixed.clone(),
                    preds: SmallVec::new(),
                    succs: raw_block
                        .succ_heads
                        .iter()
                        .map(|head| BlockId(rpo_number[head_index[head]]))
                        .collect(),
                }
            })
            .collect();

        let node_to_block: FxHashMap<NodeId, BlockId> = owner
            .iter()
            .map(|(&node, &block)| (node, BlockId(rpo_number[block])))
            .collect();

        // Predecessors. Merge predecessors follow the merge's end inputs so
        // that phi operand `i` flows in from `preds[i]`.
        for index in 0..blocks.len() {
            let begin = blocks[index].begin;
            let begin_node = graph.node(begin);
            let preds: SmallVec<[BlockId; 2]> = match begin_node.op {
                Operator::Control(ControlOp::Region) | Operator::Control(ControlOp::Loop) => {
                    let mut preds = SmallVec::new();
                    for end in begin_node.inputs().iter() {
                        let block = node_to_block.get(&end).ok_or_else(|| {
                            JitError::malformed(format!("end {end} of merge {begin} is unreachable"))
                        })?;
                        preds.push(*block);
                    }
                    preds
                }
                Operator::Control(ControlOp::Begin) => {
                    let pred = begin_node.predecessor();
                    node_to_block.get(&pred).copied().into_iter().collect()
                }
                _ => SmallVec::new(),
            };
            blocks[index].preds = preds;
        }

        Ok(Cfg {
            blocks,
            node_to_block,
        })
    }

    /// Entry block.
    #[inline]
    pub fn entry(&self) -> BlockId {
        BlockId(0)
    }

    /// All blocks in reverse post-order.
    #[inline]
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Block by ID.
    #[inline]
    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.as_usize()]
    }

    /// Number of blocks.
    #[inline]
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Whether there are no blocks.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Block containing a fixed node.
    #[inline]
    pub fn block_of(&self, node: NodeId) -> Option<BlockId> {
        self.node_to_block.get(&node).copied()
    }
}

// =============================================================================
// Dominator Tree
// =============================================================================

/// Immediate dominators of a [`Cfg`], computed with the iterative
/// Cooper-Harvey-Kennedy algorithm over reverse post-order.
#[derive(Debug, Clone)]
pub struct DominatorTree {
    /// Immediate dominator; the entry maps to itself.
    idom: Vec<BlockId>,
    /// Depth in the dominator tree; the entry has depth 0.
    depth: Vec<u32>,
}

impl DominatorTree {
    /// Compute dominators.
    pub fn build(cfg: &Cfg) -> Self {
        const UNDEFINED: u32 = u32::MAX;
        let count = cfg.len();
        let mut idom = vec![UNDEFINED; count];
        if count == 0 {
            return DominatorTree {
                idom: Vec::new(),
                depth: Vec::new(),
            };
        }
        idom[0] = 0;

        let intersect = |idom: &[u32], mut a: u32, mut b: u32| {
            while a != b {
                while a > b {
                    a = idom[a as usize];
                }
                while b > a {
                    b = idom[b as usize];
                }
            }
            a
        };

        let mut changed = true;
        while changed {
            changed = false;
            for block in cfg.blocks().iter().skip(1) {
                let mut new_idom = UNDEFINED;
                for pred in &block.preds {
                    if idom[pred.as_usize()] == UNDEFINED {
                        continue;
                    }
                    new_idom = if new_idom == UNDEFINED {
                        pred.0
                    } else {
                        intersect(&idom, pred.0, new_idom)
                    };
                }
                if new_idom != UNDEFINED && idom[block.id.as_usize()] != new_idom {
                    idom[block.id.as_usize()] = new_idom;
                    changed = true;
                }
            }
        }

        // Parents precede children in reverse post-order.
        let mut depth = vec![0u32; count];
        for index in 1..count {
            depth[index] = depth[idom[index] as usize] + 1;
        }

        DominatorTree {
            idom: idom.into_iter().map(BlockId).collect(),
            depth,
        }
    }

    /// Immediate dominator, or `None` for the entry.
    #[inline]
    pub fn idom(&self, block: BlockId) -> Option<BlockId> {
        if block.0 == 0 {
            None
        } else {
            Some(self.idom[block.as_usize()])
        }
    }

    /// Depth in the dominator tree.
    #[inline]
    pub fn depth(&self, block: BlockId) -> u32 {
        self.depth[block.as_usize()]
    }

    /// Whether `a` dominates `b` (every block dominates itself).
    pub fn dominates(&self, a: BlockId, mut b: BlockId) -> bool {
        while self.depth(b) > self.depth(a) {
            b = self.idom[b.as_usize()];
        }
        a == b
    }

    /// Whether `a` dominates `b` and differs from it.
    #[inline]
    pub fn strictly_dominates(&self, a: BlockId, b: BlockId) -> bool {
        a != b && self.dominates(a, b)
    }

    /// Lowest common dominator of `a` and `b`.
    pub fn common_dominator(&self, mut a: BlockId, mut b: BlockId) -> BlockId {
        while self.depth(a) > self.depth(b) {
            a = self.idom[a.as_usize()];
        }
        while self.depth(b) > self.depth(a) {
            b = self.idom[b.as_usize()];
        }
        while a != b {
            a = self.idom[a.as_usize()];
            b = self.idom[b.as_usize()];
        }
        a
    }
}

// =============================================================================
// Loop Analysis
// =============================================================================

/// A natural loop.
#[derive(Debug, Clone)]
pub struct LoopInfo {
    /// Header block (a `Loop` node).
    pub header: BlockId,
    /// Blocks in the loop body, header included.
    pub blocks: Vec<BlockId>,
    /// Nesting depth, 1 for outermost loops.
    pub depth: u32,
}

/// Natural loops and per-block loop depth.
#[derive(Debug, Clone, Default)]
pub struct LoopAnalysis {
    /// Loops, one per header.
    pub loops: Vec<LoopInfo>,
    /// Loop depth of every block.
    block_depth: Vec<u32>,
}

impl LoopAnalysis {
    /// Find natural loops from `LoopEnd` back edges.
    pub fn compute(graph: &Graph, cfg: &Cfg, dom: &DominatorTree) -> JitResult<Self> {
        let mut by_header: FxHashMap<BlockId, Vec<BlockId>> = FxHashMap::default();
        for block in cfg.blocks() {
            if !matches!(
                graph.node(block.end).op,
                Operator::Control(ControlOp::LoopEnd)
            ) {
                continue;
            }
            let header = block.succs[0];
            if !dom.dominates(header, block.id) {
                return Err(JitError::malformed(format!(
                    "back edge {} -> {header} does not target a dominating header",
                    block.id
                )));
            }
            by_header.entry(header).or_default().push(block.id);
        }

        let mut block_depth = vec![0u32; cfg.len()];
        let mut headers: Vec<BlockId> = by_header.keys().copied().collect();
        headers.sort();

        let mut loops = Vec::with_capacity(headers.len());
        for header in headers {
            let mut in_loop = vec![false; cfg.len()];
            in_loop[header.as_usize()] = true;
            let mut worklist = by_header[&header].clone();
            while let Some(block) = worklist.pop() {
                if in_loop[block.as_usize()] {
                    continue;
                }
                in_loop[block.as_usize()] = true;
                worklist.extend(cfg.block(block).preds.iter().copied());
            }
            let blocks: Vec<BlockId> = (0..cfg.len() as u32)
                .map(BlockId)
                .filter(|b| in_loop[b.as_usize()])
                .collect();
            for block in &blocks {
                block_depth[block.as_usize()] += 1;
            }
            loops.push(LoopInfo {
                header,
                blocks,
                depth: 0,
            });
        }
        for info in &mut loops {
            info.depth = block_depth[info.header.as_usize()];
        }

        Ok(LoopAnalysis { loops, block_depth })
    }

    /// Loop nesting depth of a block (0 outside loops).
    #[inline]
    pub fn depth(&self, block: BlockId) -> u32 {
        self.block_depth.get(block.as_usize()).copied().unwrap_or(0)
    }

    /// Number of loops.
    #[inline]
    pub fn len(&self) -> usize {
        self.loops.len()
    }

    /// Whether there are no loops.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.loops.is_empty()
    }
}

// =============================================================================
// Tests
// =============================================================================
