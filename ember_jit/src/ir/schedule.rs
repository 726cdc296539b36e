//! Global code scheduling.
//!
//! Assigns every live node to a basic block and orders the nodes of each
//! block, producing the linear form consumed by guard lowering.
//!
//! # Algorithm
//!
//! 1. Build the CFG, dominator tree and loop nesting
//! 2. Early schedule: each floating node goes to the deepest block among
//!    its inputs' blocks
//! 3. Late schedule: each floating node moves down to the lowest common
//!    dominator of its uses, unless that would sink it into a loop
//! 4. Order each block: fixed chain order, with floating nodes emitted
//!    just before the first node that needs them
//!
//! Guards are placed like any other floating node, so a guard lands in the
//! block of the code it protects rather than above a branch that skips
//! that code. A guard without uses stays in its earliest block, and an
//! anchored guard is emitted directly after its anchor.

use super::cfg::{BlockId, Cfg, DominatorTree, LoopAnalysis};
use super::graph::Graph;
use super::node::NodeId;
use super::operators::{NodeKind, Operator};
use ember_core::{JitError, JitResult};

// =============================================================================
// Configuration
// =============================================================================

/// Scheduler knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleConfig {
    /// Keep nodes at their earliest block when the latest block is more
    /// deeply nested in loops.
    pub hoist_out_of_loops: bool,
    /// Run [`Schedule::verify`] on the result.
    pub verify: bool,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            hoist_out_of_loops: true,
            verify: false,
        }
    }
}

impl ScheduleConfig {
    /// Configuration for tests: always verify.
    pub fn for_testing() -> Self {
        Self {
            hoist_out_of_loops: true,
            verify: true,
        }
    }
}

// =============================================================================
// Schedule
// =============================================================================

/// Result of scheduling a graph.
#[derive(Debug, Clone)]
pub struct Schedule {
    cfg: Cfg,
    dominators: DominatorTree,
    loops: LoopAnalysis,
    /// Ordered nodes of every block.
    block_nodes: Vec<Vec<NodeId>>,
    /// Block of every node, indexed by node.
    node_block: Vec<Option<BlockId>>,
    /// Position within its block, indexed by node.
    node_position: Vec<u32>,
}

impl Schedule {
    /// The control-flow graph.
    #[inline]
    pub fn cfg(&self) -> &Cfg {
        &self.cfg
    }

    /// Dominator tree of the CFG.
    #[inline]
    pub fn dominators(&self) -> &DominatorTree {
        &self.dominators
    }

    /// Loop nesting of the CFG.
    #[inline]
    pub fn loops(&self) -> &LoopAnalysis {
        &self.loops
    }

    /// Ordered nodes of `block`.
    #[inline]
    pub fn nodes_for(&self, block: BlockId) -> &[NodeId] {
        &self.block_nodes[block.as_usize()]
    }

    /// Block a node was scheduled into.
    #[inline]
    pub fn block_of(&self, node: NodeId) -> Option<BlockId> {
        self.node_block.get(node.as_usize()).copied().flatten()
    }

    /// Position of a node within its block.
    #[inline]
    pub fn position_of(&self, node: NodeId) -> Option<usize> {
        self.block_of(node)
            .map(|_| self.node_position[node.as_usize()] as usize)
    }

    /// Number of scheduled nodes.
    pub fn node_count(&self) -> usize {
        self.block_nodes.iter().map(Vec::len).sum()
    }

    /// Check that every live node is scheduled and every input is available
    /// where it is used.
    ///
    /// An input must be in a strictly dominating block, or earlier in the
    /// same block. Phi operands are checked against the predecessor they
    /// flow in from; merge headers' incoming ends are control edges and are
    /// not checked.
    pub fn verify(&self, graph: &Graph) -> JitResult<()> {
        for (id, _) in graph.iter() {
            if self.block_of(id).is_none() {
                return Err(JitError::malformed(format!("{id} was not scheduled")));
            }
        }

        for block in self.cfg.blocks() {
            for (position, &id) in self.nodes_for(block.id).iter().enumerate() {
                let node = graph.node(id);
                if node.kind() == NodeKind::BlockBegin {
                    continue;
                }
                for (index, input) in node.inputs().iter().enumerate() {
                    let input_block = self.block_of(input).ok_or_else(|| {
                        JitError::malformed(format!("input {input} of {id} was not scheduled"))
                    })?;

                    if matches!(node.op, Operator::Phi) && index > 0 {
                        let pred = block.preds.get(index - 1).copied().ok_or_else(|| {
                            JitError::malformed(format!("phi {id} has more operands than preds"))
                        })?;
                        if !self.dominators.dominates(input_block, pred) {
                            return Err(JitError::malformed(format!(
                                "phi operand {input} of {id} does not dominate {pred}"
                            )));
                        }
                        continue;
                    }

                    let available = if input_block == block.id {
                        (self.node_position[input.as_usize()] as usize) < position
                    } else {
                        self.dominators.strictly_dominates(input_block, block.id)
                    };
                    if !available {
                        return Err(JitError::malformed(format!(
                            "input {input} ({input_block}) is not available at {id} ({})",
                            block.id
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

// =============================================================================
// Scheduler
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    Active,
    Done,
}

/// Places floating nodes into blocks and orders each block.
#[derive(Debug, Default)]
pub struct Scheduler {
    config: ScheduleConfig,
}

impl Scheduler {
    /// Create a scheduler.
    #[inline]
    pub fn new(config: ScheduleConfig) -> Self {
        Self { config }
    }

    /// Schedule `graph`.
    pub fn schedule(&self, graph: &Graph) -> JitResult<Schedule> {
        let cfg = Cfg::build(graph)?;
        let dominators = DominatorTree::build(&cfg);
        let loops = LoopAnalysis::compute(graph, &cfg, &dominators)?;

        let mut state = Placement::new(graph, &cfg, &dominators, &loops);
        state.place_fixed()?;
        let topo = state.schedule_early()?;
        state.schedule_late(&topo, self.config.hoist_out_of_loops)?;
        let (block_nodes, node_position) = state.order_blocks()?;
        let node_block = state.block;

        let schedule = Schedule {
            cfg,
            dominators,
            loops,
            block_nodes,
            node_block,
            node_position,
        };
        log::debug!(
            target: "ember::schedule",
            "scheduled {} nodes into {} blocks ({} loops)",
            schedule.node_count(),
            schedule.cfg.len(),
            schedule.loops.len()
        );
        if self.config.verify {
            schedule.verify(graph)?;
        }
        Ok(schedule)
    }
}

/// Working state of one scheduling run.
struct Placement<'a> {
    graph: &'a Graph,
    cfg: &'a Cfg,
    dom: &'a DominatorTree,
    loops: &'a LoopAnalysis,
    /// Final block of every node.
    block: Vec<Option<BlockId>>,
    /// Earliest block of floating nodes.
    early: Vec<Option<BlockId>>,
}

impl<'a> Placement<'a> {
    fn new(graph: &'a Graph, cfg: &'a Cfg, dom: &'a DominatorTree, loops: &'a LoopAnalysis) -> Self {
        Self {
            graph,
            cfg,
            dom,
            loops,
            block: vec![None; graph.len()],
            early: vec![None; graph.len()],
        }
    }

    /// Whether the scheduler chooses the block of this node.
    fn is_floating(&self, id: NodeId) -> bool {
        matches!(
            self.graph.node(id).kind(),
            NodeKind::Floating | NodeKind::Guard
        )
    }

    /// Fixed nodes take their chain's block; phis take their merge's block.
    fn place_fixed(&mut self) -> JitResult<()> {
        for (id, node) in self.graph.iter() {
            if node.is_fixed() {
                let block = self.cfg.block_of(id).ok_or_else(|| {
                    JitError::malformed(format!(
                        "fixed node {id} ({:?}) is not reachable from start",
                        node.op
                    ))
                })?;
                self.block[id.as_usize()] = Some(block);
            }
        }
        for (id, node) in self.graph.iter() {
            if node.kind() == NodeKind::Pinned {
                let merge = node.input(0);
                let block = merge
                    .is_valid()
                    .then(|| self.cfg.block_of(merge))
                    .flatten()
                    .ok_or_else(|| {
                        JitError::malformed(format!("phi {id} is not attached to a merge"))
                    })?;
                self.block[id.as_usize()] = Some(block);
            }
        }
        Ok(())
    }

    /// Block an input is available from during the early pass.
    fn input_block(&self, user: NodeId, input: NodeId) -> JitResult<BlockId> {
        if !self.graph.is_live(input) {
            return Err(JitError::malformed(format!("{user} has a dangling input {input}")));
        }
        let placed = if self.is_floating(input) {
            self.early[input.as_usize()]
        } else {
            self.block[input.as_usize()]
        };
        placed.ok_or_else(|| JitError::malformed(format!("input {input} of {user} has no block")))
    }

    /// Compute the earliest block of every floating node.
    ///
    /// Returns the floating nodes in dependency order (inputs first).
    fn schedule_early(&mut self) -> JitResult<Vec<NodeId>> {
        let mut mark = vec![Mark::Unvisited; self.graph.len()];
        let mut topo = Vec::new();
        let roots: Vec<NodeId> = self
            .graph
            .iter()
            .filter(|(id, _)| self.is_floating(*id))
            .map(|(id, _)| id)
            .collect();

        for root in roots {
            if mark[root.as_usize()] != Mark::Unvisited {
                continue;
            }
            mark[root.as_usize()] = Mark::Active;
            let mut stack: Vec<(NodeId, usize)> = vec![(root, 0)];

            while let Some(top) = stack.last_mut() {
                let (id, next_input) = *top;
                if let Some(input) = self.graph.node(id).inputs().get(next_input) {
                    top.1 += 1;
                    if !self.graph.is_live(input) || !self.is_floating(input) {
                        continue;
                    }
                    match mark[input.as_usize()] {
                        Mark::Active => {
                            return Err(JitError::malformed(format!(
                                "data dependency cycle through {input}"
                            )));
                        }
                        Mark::Unvisited => {
                            mark[input.as_usize()] = Mark::Active;
                            stack.push((input, 0));
                        }
                        Mark::Done => {}
                    }
                    continue;
                }

                let earliest = self.earliest_block(id)?;
                self.early[id.as_usize()] = Some(earliest);
                mark[id.as_usize()] = Mark::Done;
                topo.push(id);
                stack.pop();
            }
        }
        Ok(topo)
    }

    /// Deepest input block; all input blocks must lie on one dominator chain.
    fn earliest_block(&self, id: NodeId) -> JitResult<BlockId> {
        let node = self.graph.node(id);
        let mut deepest = self.cfg.entry();
        for input in node.inputs().iter() {
            let block = self.input_block(id, input)?;
            if self.dom.depth(block) > self.dom.depth(deepest) {
                deepest = block;
            }
        }
        for input in node.inputs().iter() {
            let block = self.input_block(id, input)?;
            if !self.dom.dominates(block, deepest) {
                return Err(JitError::malformed(format!(
                    "inputs of {id} are in unrelated blocks {block} and {deepest}"
                )));
            }
        }
        Ok(deepest)
    }

    /// Block in which `user` needs `id`.
    fn use_block(&self, id: NodeId, user: NodeId) -> JitResult<Option<BlockId>> {
        let user_node = self.graph.node(user);
        if matches!(user_node.op, Operator::Phi) {
            let Some(merge_block) = self.block[user.as_usize()] else {
                return Ok(None);
            };
            let preds = &self.cfg.block(merge_block).preds;
            let mut lca: Option<BlockId> = None;
            for (index, input) in user_node.inputs().iter().enumerate().skip(1) {
                if input != id {
                    continue;
                }
                let pred = preds.get(index - 1).copied().ok_or_else(|| {
                    JitError::malformed(format!("phi {user} has more operands than preds"))
                })?;
                lca = Some(match lca {
                    Some(current) => self.dom.common_dominator(current, pred),
                    None => pred,
                });
            }
            return Ok(lca);
        }
        Ok(self.block[user.as_usize()])
    }

    /// Move floating nodes down to the lowest common dominator of their uses.
    fn schedule_late(&mut self, topo: &[NodeId], hoist_out_of_loops: bool) -> JitResult<()> {
        for &id in topo.iter().rev() {
            let earliest = self.early[id.as_usize()].ok_or_else(|| {
                JitError::malformed(format!("{id} has no earliest block"))
            })?;

            let mut latest: Option<BlockId> = None;
            for &user in self.graph.uses(id) {
                if !self.graph.is_live(user) {
                    continue;
                }
                if let Some(block) = self.use_block(id, user)? {
                    latest = Some(match latest {
                        Some(current) => self.dom.common_dominator(current, block),
                        None => block,
                    });
                }
            }

            let placed = match latest {
                None => earliest,
                Some(latest) => {
                    if !self.dom.dominates(earliest, latest) {
                        return Err(JitError::malformed(format!(
                            "{id} is used in {latest}, which {earliest} does not dominate"
                        )));
                    }
                    if hoist_out_of_loops && self.loops.depth(latest) > self.loops.depth(earliest) {
                        earliest
                    } else {
                        latest
                    }
                }
            };
            log::trace!(
                target: "ember::schedule",
                "{id} ({:?}): earliest {earliest}, placed {placed}",
                self.graph.node(id).op
            );
            self.block[id.as_usize()] = Some(placed);
        }
        Ok(())
    }

    /// Order the nodes of every block.
    fn order_blocks(&self) -> JitResult<(Vec<Vec<NodeId>>, Vec<u32>)> {
        let mut members: Vec<Vec<NodeId>> = vec![Vec::new(); self.cfg.len()];
        for (id, node) in self.graph.iter() {
            if node.is_fixed() {
                continue;
            }
            if let Some(block) = self.block[id.as_usize()] {
                members[block.as_usize()].push(id);
            }
        }

        let mut emitted = vec![false; self.graph.len()];
        let mut position = vec![0u32; self.graph.len()];
        let mut block_nodes = Vec::with_capacity(self.cfg.len());

        for block in self.cfg.blocks() {
            let mut order = Vec::with_capacity(block.fixed.len() + members[block.id.as_usize()].len());
            for &fixed in &block.fixed {
                let node = self.graph.node(fixed);
                if node.kind().is_terminator() {
                    for &floating in &members[block.id.as_usize()] {
                        self.emit(floating, block.id, &mut emitted, &mut order)?;
                    }
                }
                if node.kind() != NodeKind::BlockBegin {
                    for input in node.inputs().iter() {
                        self.emit_input(fixed, input, block.id, &mut emitted, &mut order)?;
                    }
                }
                emitted[fixed.as_usize()] = true;
                order.push(fixed);

                if node.kind().has_next() {
                    for &floating in &members[block.id.as_usize()] {
                        if self.anchor_of(floating) == Some(fixed)
                            && self.fixed_inputs_emitted(floating, block.id, &emitted)
                        {
                            self.emit(floating, block.id, &mut emitted, &mut order)?;
                        }
                    }
                }
            }
            for (index, &id) in order.iter().enumerate() {
                position[id.as_usize()] = index as u32;
            }
            block_nodes.push(order);
        }
        Ok((block_nodes, position))
    }

    /// Fixed node a guard may not be scheduled above.
    fn anchor_of(&self, id: NodeId) -> Option<NodeId> {
        let node = self.graph.node(id);
        if !node.op.is_guard() || node.inputs().len() < 2 {
            return None;
        }
        let anchor = node.input(1);
        anchor.is_valid().then_some(anchor)
    }

    /// Whether every fixed node `root` transitively needs in `block` has
    /// already been emitted.
    fn fixed_inputs_emitted(&self, root: NodeId, block: BlockId, emitted: &[bool]) -> bool {
        let mut stack = vec![root];
        let mut seen = vec![root];
        while let Some(id) = stack.pop() {
            for input in self.graph.node(id).inputs().iter() {
                if !input.is_valid()
                    || self.block[input.as_usize()] != Some(block)
                    || emitted[input.as_usize()]
                    || seen.contains(&input)
                {
                    continue;
                }
                if self.graph.node(input).is_fixed() {
                    return false;
                }
                seen.push(input);
                stack.push(input);
            }
        }
        true
    }

    /// Emit an in-block input of `user` if it is floating and not yet placed.
    fn emit_input(
        &self,
        user: NodeId,
        input: NodeId,
        block: BlockId,
        emitted: &mut [bool],
        order: &mut Vec<NodeId>,
    ) -> JitResult<()> {
        if self.block[input.as_usize()] != Some(block) || emitted[input.as_usize()] {
            return Ok(());
        }
        if self.graph.node(input).is_fixed() {
            return Err(JitError::malformed(format!(
                "{user} uses {input}, which comes later in {block}"
            )));
        }
        self.emit(input, block, emitted, order)
    }

    /// Emit a floating node of `block` after its in-block dependencies.
    fn emit(
        &self,
        root: NodeId,
        block: BlockId,
        emitted: &mut [bool],
        order: &mut Vec<NodeId>,
    ) -> JitResult<()> {
        if emitted[root.as_usize()] {
            return Ok(());
        }
        let mut stack: Vec<(NodeId, usize)> = vec![(root, 0)];
        while let Some(top) = stack.last_mut() {
            let (id, next_input) = *top;
            let node = self.graph.node(id);
            // Phi operands flow in from predecessors.
            let input_limit = if matches!(node.op, Operator::Phi) {
                1
            } else {
                node.inputs().len()
            };
            if next_input < input_limit {
                top.1 += 1;
                let input = node.input(next_input);
                if !input.is_valid()
                    || self.block[input.as_usize()] != Some(block)
                    || emitted[input.as_usize()]
                {
                    continue;
                }
                if self.graph.node(input).is_fixed() {
                    return Err(JitError::malformed(format!(
                        "{id} uses fixed node {input}, which comes later in {block}"
                    )));
                }
                if stack.iter().any(|&(pending, _)| pending == input) {
                    return Err(JitError::malformed(format!(
                        "data dependency cycle through {input}"
                    )));
                }
                stack.push((input, 0));
                continue;
            }
            emitted[id.as_usize()] = true;
            order.push(id);
            stack.pop();
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::builder::{ArithmeticBuilder, ControlBuilder, GraphBuilder, GuardBuilder};
    use crate::ir::deopt::{DeoptAction, DeoptReason};
    use crate::ir::node::InputList;
    use crate::ir::operators::{BranchHint, GuardInfo};

    fn scheduler() -> Scheduler {
        Scheduler::new(ScheduleConfig::for_testing())
    }

    fn null_check() -> GuardInfo {
        GuardInfo::new(DeoptReason::NullCheck, DeoptAction::InvalidateReprofile)
    }

    // -------------------------------------------------------------------------
    // Placement
    // -------------------------------------------------------------------------

    #[test]
    fn test_straight_line_order() {
        let mut builder = GraphBuilder::new();
        let p0 = builder.parameter(0);
        let one = builder.const_int(1);
        let sum = builder.int_add(p0, one);
        let load = builder.load(0, &[sum]);
        let ret = builder.return_value(&[load]);
        let graph = builder.finish().unwrap();

        let schedule = scheduler().schedule(&graph).unwrap();
        let entry = schedule.cfg().entry();
        assert_eq!(
            schedule.nodes_for(entry),
            &[graph.start, p0, one, sum, load, ret]
        );
        assert_eq!(schedule.position_of(sum), Some(3));
        assert_eq!(schedule.node_count(), graph.live_count());
    }

    #[test]
    fn test_use_in_one_branch_sinks_into_it() {
        let mut builder = GraphBuilder::new();
        let p0 = builder.parameter(0);
        let p1 = builder.parameter(1);
        let cond = builder.int_lt(p0, p1);
        let sum = builder.int_add(p0, p1);
        let (t, f) = builder.branch(cond, BranchHint::None);
        builder.set_control(t);
        let load = builder.load(0, &[sum]);
        builder.return_value(&[load]);
        builder.set_control(f);
        builder.return_value(&[]);
        let graph = builder.finish().unwrap();

        let schedule = scheduler().schedule(&graph).unwrap();
        assert_eq!(schedule.block_of(sum), schedule.block_of(t));
        assert_eq!(schedule.block_of(cond), Some(schedule.cfg().entry()));
    }

    #[test]
    fn test_sibling_uses_place_at_common_dominator() {
        let mut builder = GraphBuilder::new();
        let p0 = builder.parameter(0);
        let p1 = builder.parameter(1);
        let cond = builder.int_lt(p0, p1);
        let sum = builder.int_add(p0, p1);
        let (t, f) = builder.branch(cond, BranchHint::None);
        builder.set_control(t);
        builder.load(0, &[sum]);
        let t_end = builder.end();
        builder.set_control(f);
        builder.load(8, &[sum]);
        let f_end = builder.end();
        builder.region(&[t_end, f_end]);
        builder.return_value(&[]);
        let graph = builder.finish().unwrap();

        let schedule = scheduler().schedule(&graph).unwrap();
        let entry = schedule.cfg().entry();
        assert_ne!(schedule.block_of(t), Some(entry));
        assert_eq!(schedule.block_of(sum), Some(entry));
    }

    #[test]
    fn test_phi_operand_used_in_predecessor() {
        let mut builder = GraphBuilder::new();
        let p0 = builder.parameter(0);
        let p1 = builder.parameter(1);
        let cond = builder.int_lt(p0, p1);
        let (t, f) = builder.branch(cond, BranchHint::None);
        builder.set_control(t);
        let t_end = builder.end();
        builder.set_control(f);
        let f_end = builder.end();
        let merge = builder.region(&[t_end, f_end]);
        let diff = builder.int_op(crate::ir::operators::ArithOp::Sub, p0, p1);
        let phi = builder.phi(merge, &[p0, diff]);
        builder.return_value(&[phi]);
        let graph = builder.finish().unwrap();

        let schedule = scheduler().schedule(&graph).unwrap();
        assert_eq!(schedule.block_of(diff), schedule.block_of(f));
        assert_eq!(schedule.block_of(phi), schedule.block_of(merge));
    }

    #[test]
    fn test_no_sinking_into_loop() {
        let mut builder = GraphBuilder::new();
        let p0 = builder.parameter(0);
        let p1 = builder.parameter(1);
        let product = builder.int_op(crate::ir::operators::ArithOp::Mul, p0, p1);
        let header = builder.loop_begin();
        let cond = builder.int_lt(p0, p1);
        let (body, exit) = builder.branch(cond, BranchHint::LikelyTrue);
        builder.set_control(body);
        builder.store(0, &[product]);
        builder.loop_end(header);
        builder.set_control(exit);
        builder.return_value(&[]);
        let graph = builder.finish().unwrap();

        let schedule = scheduler().schedule(&graph).unwrap();
        assert_eq!(schedule.block_of(product), Some(schedule.cfg().entry()));

        let sinking = Scheduler::new(ScheduleConfig {
            hoist_out_of_loops: false,
            verify: true,
        });
        let schedule = sinking.schedule(&graph).unwrap();
        assert_eq!(schedule.block_of(product), schedule.block_of(body));
    }

    #[test]
    fn test_guard_sinks_to_block_of_its_use() {
        let mut builder = GraphBuilder::new();
        let p0 = builder.parameter(0);
        let p1 = builder.parameter(1);
        let in_range = builder.int_lt(p0, p1);
        let guard = builder.guard(in_range, null_check());
        let (t, f) = builder.branch(p0, BranchHint::None);
        builder.set_control(t);
        builder.load(0, &[guard]);
        builder.return_value(&[]);
        builder.set_control(f);
        builder.return_value(&[]);
        let graph = builder.finish().unwrap();

        let schedule = scheduler().schedule(&graph).unwrap();
        assert_eq!(schedule.block_of(guard), schedule.block_of(t));
        assert_ne!(schedule.block_of(guard), schedule.block_of(f));
    }

    #[test]
    fn test_unused_guard_stays_at_earliest_block() {
        let mut builder = GraphBuilder::new();
        let p0 = builder.parameter(0);
        let guard = builder.guard(p0, null_check());
        let (t, f) = builder.branch(p0, BranchHint::None);
        builder.set_control(t);
        builder.return_value(&[]);
        builder.set_control(f);
        builder.return_value(&[]);
        let graph = builder.finish().unwrap();

        let schedule = scheduler().schedule(&graph).unwrap();
        assert_eq!(schedule.block_of(guard), Some(schedule.cfg().entry()));
    }

    #[test]
    fn test_guard_not_sunk_into_loop() {
        let mut builder = GraphBuilder::new();
        let p0 = builder.parameter(0);
        let p1 = builder.parameter(1);
        let guard = builder.guard(p0, null_check());
        let header = builder.loop_begin();
        let cond = builder.int_lt(p0, p1);
        let (body, exit) = builder.branch(cond, BranchHint::LikelyTrue);
        builder.set_control(body);
        builder.store(0, &[p1, guard]);
        builder.loop_end(header);
        builder.set_control(exit);
        builder.return_value(&[]);
        let graph = builder.finish().unwrap();

        let schedule = scheduler().schedule(&graph).unwrap();
        assert_eq!(schedule.block_of(guard), Some(schedule.cfg().entry()));
        assert_ne!(schedule.block_of(guard), schedule.block_of(body));
    }

    #[test]
    fn test_anchored_guard_follows_anchor() {
        let mut builder = GraphBuilder::new();
        let p0 = builder.parameter(0);
        let a = builder.load(0, &[p0]);
        let guard = builder.guard_here(p0, null_check());
        let b = builder.store(8, &[p0]);
        let ret = builder.return_value(&[]);
        let graph = builder.finish().unwrap();

        let schedule = scheduler().schedule(&graph).unwrap();
        let entry = schedule.cfg().entry();
        assert_eq!(schedule.nodes_for(entry), &[graph.start, p0, a, guard, b, ret]);
    }

    #[test]
    fn test_anchored_guard_waits_for_later_fixed_condition() {
        let mut builder = GraphBuilder::new();
        let p0 = builder.parameter(0);
        let a = builder.load(0, &[p0]);
        let b = builder.load(8, &[p0]);
        let guard = builder.anchored_guard(b, a, null_check());
        let ret = builder.return_value(&[]);
        let graph = builder.finish().unwrap();

        let schedule = scheduler().schedule(&graph).unwrap();
        let entry = schedule.cfg().entry();
        assert_eq!(schedule.nodes_for(entry), &[graph.start, p0, a, b, guard, ret]);
    }

    // -------------------------------------------------------------------------
    // Failures
    // -------------------------------------------------------------------------

    #[test]
    fn test_cycle_is_malformed() {
        let mut builder = GraphBuilder::new();
        let p0 = builder.parameter(0);
        let one = builder.const_int(1);
        let a = builder.int_add(p0, one);
        let b = builder.int_add(a, one);
        builder.return_value(&[b]);
        let mut graph = builder.finish().unwrap();
        graph.set_input(a, 0, b).unwrap();

        let err = scheduler().schedule(&graph).unwrap_err();
        assert!(matches!(err, JitError::MalformedGraph { .. }));
    }

    #[test]
    fn test_unreachable_fixed_node_is_malformed() {
        let mut builder = GraphBuilder::new();
        builder.return_value(&[]);
        let mut graph = builder.finish().unwrap();
        graph.add_node(
            Operator::Memory(crate::ir::operators::MemoryOp::Load(0)),
            InputList::new(),
        );

        assert!(matches!(
            scheduler().schedule(&graph),
            Err(JitError::MalformedGraph { .. })
        ));
    }

    // -------------------------------------------------------------------------
    // Determinism & Validity
    // -------------------------------------------------------------------------

    #[test]
    fn test_schedule_is_deterministic() {
        let build = || {
            let mut builder = GraphBuilder::new();
            let p0 = builder.parameter(0);
            let p1 = builder.parameter(1);
            let c1 = builder.int_lt(p0, p1);
            let c2 = builder.int_eq(p0, p1);
            builder.guard(c1, null_check());
            builder.guard(c2, null_check());
            let sum = builder.int_add(p0, p1);
            builder.load(0, &[sum]);
            builder.return_value(&[]);
            builder.finish().unwrap()
        };
        let first = scheduler().schedule(&build()).unwrap();
        let second = scheduler().schedule(&build()).unwrap();
        let entry = first.cfg().entry();
        assert_eq!(first.nodes_for(entry), second.nodes_for(entry));
    }

    #[test]
    fn test_verify_accepts_loop_with_phi() {
        let mut builder = GraphBuilder::new();
        let zero = builder.const_int(0);
        let one = builder.const_int(1);
        let limit = builder.parameter(0);
        let header = builder.loop_begin();
        let phi = builder.phi(header, &[zero]);
        let next = builder.int_add(phi, one);
        let cond = builder.int_lt(next, limit);
        let (body, exit) = builder.branch(cond, BranchHint::LikelyTrue);
        builder.set_control(body);
        builder.loop_end(header);
        builder.graph_mut().push_input(phi, next);
        builder.set_control(exit);
        builder.return_value(&[phi]);
        let graph = builder.finish().unwrap();

        let schedule = scheduler().schedule(&graph).unwrap();
        assert_eq!(schedule.block_of(next), schedule.block_of(header));
        assert_eq!(schedule.loops().depth(schedule.block_of(next).unwrap()), 1);
        schedule.verify(&graph).unwrap();
    }
}
