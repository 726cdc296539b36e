//! Guard lowering.
//!
//! Replaces every floating guard with explicit control flow: a two-way
//! branch whose likely side continues the method and whose other side
//! deoptimizes.
//!
//! # Algorithm
//!
//! Each block of the schedule is walked in order, tracking the last fixed
//! node seen (`last_fixed`) and a fast path whose `next` is still open.
//! A guard `G(cond)` after `last_fixed` becomes:
//!
//! ```text
//! before:  last_fixed ─ X              G(cond) floating
//!
//! after:   last_fixed ─ If(cond) ─┬─ Begin (fast) ─ X
//!                                 └─ Begin ─ Deopt(reason, action)
//! ```
//!
//! The fast path is the true side, or the false side for a negated guard.
//! All uses of the guard move to the fast-path `Begin`, and the next fixed
//! node of the block is linked after it.
//!
//! Every guard of the schedule is checked before the first one is lowered,
//! so a malformed graph is rejected unchanged.

use super::OptimizationPass;
use crate::ir::cfg::BlockId;
use crate::ir::graph::Graph;
use crate::ir::node::{InputList, NodeFlags, NodeId};
use crate::ir::operators::{BranchHint, ControlOp, GuardInfo, Operator};
use crate::ir::schedule::Schedule;
use ember_core::{JitError, JitResult};

// =============================================================================
// Guard Lowering Pass
// =============================================================================

/// Lowers floating guards into branch-and-deoptimize control flow.
#[derive(Debug, Default)]
pub struct GuardLowering {
    /// Guards replaced by an `If`.
    lowered: usize,
    /// Lowered guards that trap on a true condition.
    negated: usize,
    /// Blocks walked.
    blocks_visited: usize,
}

impl GuardLowering {
    /// Create a new pass.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of guards lowered.
    #[inline]
    pub fn lowered(&self) -> usize {
        self.lowered
    }

    /// Number of negated guards lowered.
    #[inline]
    pub fn negated(&self) -> usize {
        self.negated
    }

    /// Number of blocks walked.
    #[inline]
    pub fn blocks_visited(&self) -> usize {
        self.blocks_visited
    }

    /// Check every guard of `block` before anything is rewritten.
    fn check_block(&self, graph: &Graph, schedule: &Schedule, block: BlockId) -> JitResult<()> {
        let mut open_guard: Option<NodeId> = None;
        for (position, &id) in schedule.nodes_for(block).iter().enumerate() {
            let node = graph.node(id);
            if node.is_dead() {
                continue;
            }
            if node.is_fixed() {
                open_guard = None;
            } else if node.op.is_guard() {
                self.check_condition(graph, schedule, id, block, position)?;
                open_guard = Some(id);
            }
        }
        match open_guard {
            Some(guard) => Err(JitError::malformed(format!(
                "guard {guard} in {block} is not followed by a fixed node"
            ))),
            None => Ok(()),
        }
    }

    fn lower_block(
        &mut self,
        graph: &mut Graph,
        schedule: &Schedule,
        block: BlockId,
    ) -> JitResult<()> {
        self.blocks_visited += 1;
        let mut last_fixed = schedule.cfg().block(block).begin;
        let mut fast_path: Option<NodeId> = None;

        for &id in schedule.nodes_for(block) {
            let node = graph.node(id);
            if node.is_dead() {
                continue;
            }
            if node.is_fixed() {
                let has_next = node.kind().has_next();
                if let Some(fast) = fast_path.take() {
                    graph.set_next(fast, id)?;
                }
                if has_next {
                    last_fixed = id;
                }
            } else if let Some(&info) = node.op.guard_info() {
                let fast = self.lower_guard(graph, id, info, last_fixed)?;
                last_fixed = fast;
                fast_path = Some(fast);
            }
        }
        Ok(())
    }

    /// The guard's condition must be available before the guard.
    fn check_condition(
        &self,
        graph: &Graph,
        schedule: &Schedule,
        guard: NodeId,
        block: BlockId,
        position: usize,
    ) -> JitResult<()> {
        let condition = graph.node(guard).input(0);
        let available = match (schedule.block_of(condition), schedule.position_of(condition)) {
            (Some(cond_block), Some(cond_position)) if cond_block == block => {
                cond_position < position
            }
            (Some(cond_block), _) => schedule.dominators().strictly_dominates(cond_block, block),
            (None, _) => false,
        };
        if available {
            Ok(())
        } else {
            Err(JitError::malformed(format!(
                "condition {condition} of guard {guard} is not scheduled before it"
            )))
        }
    }

    /// Replace `guard` with a branch after `last_fixed`; returns the fast path.
    fn lower_guard(
        &mut self,
        graph: &mut Graph,
        guard: NodeId,
        info: GuardInfo,
        last_fixed: NodeId,
    ) -> JitResult<NodeId> {
        let condition = graph.node(guard).input(0);

        let fast = graph.add_node(Operator::Control(ControlOp::Begin), InputList::new());
        let deopt_begin = graph.add_node(Operator::Control(ControlOp::Begin), InputList::new());
        let deopt = graph.add_node(
            Operator::Control(ControlOp::Deopt(info.deopt_info())),
            InputList::new(),
        );
        graph.set_next(deopt_begin, deopt)?;

        let (hint, on_true, on_false) = if info.negated {
            (BranchHint::LikelyFalse, deopt_begin, fast)
        } else {
            (BranchHint::LikelyTrue, fast, deopt_begin)
        };
        let branch = graph.add_node(
            Operator::Control(ControlOp::If(hint)),
            InputList::single(condition),
        );
        graph.set_successor(branch, 0, on_true)?;
        graph.set_successor(branch, 1, on_false)?;

        for id in [fast, deopt_begin, deopt, branch] {
            graph.node_mut(id).flags.insert(NodeFlags::LOWERED);
        }

        graph.replace_and_delete(guard, fast)?;
        graph.set_next(last_fixed, branch)?;

        self.lowered += 1;
        if info.negated {
            self.negated += 1;
        }
        log::trace!(
            target: "ember::guard-lowering",
            "{guard} ({}) -> {branch} after {last_fixed}, fast {fast}, deopt {deopt}",
            info.reason
        );
        Ok(fast)
    }
}

impl OptimizationPass for GuardLowering {
    fn name(&self) -> &'static str {
        "guard-lowering"
    }

    fn run(&mut self, graph: &mut Graph, schedule: &Schedule) -> JitResult<bool> {
        for block in schedule.cfg().blocks() {
            self.check_block(graph, schedule, block.id)?;
        }
        let before = self.lowered;
        for block in schedule.cfg().blocks() {
            self.lower_block(graph, schedule, block.id)?;
        }
        Ok(self.lowered > before)
    }
}

// =============================================================================
// Tests
// =============================================================================
