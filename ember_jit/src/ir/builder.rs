//! Graph construction helpers.
//!
//! `GraphBuilder` tracks the current control point (the last fixed node
//! whose `next` is still open) and appends fixed nodes there. Operations are
//! split across extension traits the way front ends use them:
//!
//! - [`ArithmeticBuilder`]: constants, parameters, arithmetic, comparisons
//! - [`ControlBuilder`]: fixed memory ops, branches, merges, loops, exits
//! - [`GuardBuilder`]: speculative guards
//!
//! Linking errors are latched and reported by [`GraphBuilder::finish`].

use super::deopt::DeoptInfo;
use super::graph::Graph;
use super::node::{InputList, NodeId};
use super::operators::{ArithOp, BranchHint, CmpOp, ControlOp, GuardInfo, MemoryOp, Operator};
use ember_core::{JitError, JitResult};

// =============================================================================
// Graph Builder
// =============================================================================

/// Incremental builder for a method graph.
#[derive(Debug)]
pub struct GraphBuilder {
    graph: Graph,
    /// Open control point, `INVALID` after a terminator.
    control: NodeId,
    /// First linking error, reported by `finish`.
    error: Option<JitError>,
}

impl GraphBuilder {
    /// Create a builder positioned after `Start`.
    pub fn new() -> Self {
        let graph = Graph::new();
        let control = graph.start;
        GraphBuilder {
            graph,
            control,
            error: None,
        }
    }

    /// Current control point.
    #[inline]
    pub fn control(&self) -> NodeId {
        self.control
    }

    /// Continue building after `node` (a block begin or fixed-with-next node).
    #[inline]
    pub fn set_control(&mut self, node: NodeId) {
        self.control = node;
    }

    /// Read-only access to the graph under construction.
    #[inline]
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Mutable access to the graph under construction.
    #[inline]
    pub fn graph_mut(&mut self) -> &mut Graph {
        &mut self.graph
    }

    /// Finish building, reporting the first linking error.
    pub fn finish(self) -> JitResult<Graph> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.graph),
        }
    }

    /// Link `node` after the current control point.
    fn append(&mut self, node: NodeId) {
        if !self.control.is_valid() {
            self.latch(JitError::malformed(format!(
                "{node} appended with no open control point"
            )));
            return;
        }
        if let Err(err) = self.graph.set_next(self.control, node) {
            self.latch(err);
        }
    }

    fn latch(&mut self, err: JitError) {
        if self.error.is_none() {
            self.error = Some(err);
        }
    }
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Arithmetic Builder
// =============================================================================

/// Floating value construction.
pub trait ArithmeticBuilder {
    /// Incoming argument `index`.
    fn parameter(&mut self, index: u32) -> NodeId;
    /// Integer constant.
    fn const_int(&mut self, value: i64) -> NodeId;
    /// Boolean constant.
    fn const_bool(&mut self, value: bool) -> NodeId;
    /// Integer arithmetic.
    fn int_op(&mut self, op: ArithOp, lhs: NodeId, rhs: NodeId) -> NodeId;
    /// Integer comparison.
    fn int_cmp(&mut self, op: CmpOp, lhs: NodeId, rhs: NodeId) -> NodeId;
    /// Boolean negation.
    fn logical_not(&mut self, value: NodeId) -> NodeId;

    /// `lhs + rhs`.
    fn int_add(&mut self, lhs: NodeId, rhs: NodeId) -> NodeId {
        self.int_op(ArithOp::Add, lhs, rhs)
    }

    /// `lhs < rhs`.
    fn int_lt(&mut self, lhs: NodeId, rhs: NodeId) -> NodeId {
        self.int_cmp(CmpOp::Lt, lhs, rhs)
    }

    /// `lhs == rhs`.
    fn int_eq(&mut self, lhs: NodeId, rhs: NodeId) -> NodeId {
        self.int_cmp(CmpOp::Eq, lhs, rhs)
    }
}

impl ArithmeticBuilder for GraphBuilder {
    fn parameter(&mut self, index: u32) -> NodeId {
        self.graph
            .unique_node(Operator::Parameter(index), InputList::new())
    }

    fn const_int(&mut self, value: i64) -> NodeId {
        self.graph
            .unique_node(Operator::ConstInt(value), InputList::new())
    }

    fn const_bool(&mut self, value: bool) -> NodeId {
        self.graph
            .unique_node(Operator::ConstBool(value), InputList::new())
    }

    fn int_op(&mut self, op: ArithOp, lhs: NodeId, rhs: NodeId) -> NodeId {
        self.graph
            .unique_node(Operator::IntOp(op), InputList::pair(lhs, rhs))
    }

    fn int_cmp(&mut self, op: CmpOp, lhs: NodeId, rhs: NodeId) -> NodeId {
        self.graph
            .unique_node(Operator::IntCmp(op), InputList::pair(lhs, rhs))
    }

    fn logical_not(&mut self, value: NodeId) -> NodeId {
        self.graph
            .unique_node(Operator::LogicalNot, InputList::single(value))
    }
}

// =============================================================================
// Control Builder
// =============================================================================

/// Fixed node and control-flow construction.
pub trait ControlBuilder {
    /// Append a fixed memory operation.
    fn memory(&mut self, op: MemoryOp, inputs: InputList) -> NodeId;
    /// Append a two-way branch and return its `(true, false)` begins.
    ///
    /// The builder has no open control point afterwards.
    fn branch(&mut self, condition: NodeId, hint: BranchHint) -> (NodeId, NodeId);
    /// Close the current path with a forward jump.
    fn end(&mut self) -> NodeId;
    /// Merge forward jumps and continue after the region.
    fn region(&mut self, ends: &[NodeId]) -> NodeId;
    /// Value merge at a region or loop header.
    fn phi(&mut self, merge: NodeId, values: &[NodeId]) -> NodeId;
    /// Jump into a new loop header and continue inside it.
    fn loop_begin(&mut self) -> NodeId;
    /// Close the current path with a back edge to `header`.
    fn loop_end(&mut self, header: NodeId) -> NodeId;
    /// Close the current path with a return.
    fn return_value(&mut self, values: &[NodeId]) -> NodeId;
    /// Close the current path with a deoptimization exit.
    fn deopt(&mut self, info: DeoptInfo) -> NodeId;

    /// Append a field load.
    fn load(&mut self, offset: u32, inputs: &[NodeId]) -> NodeId {
        self.memory(MemoryOp::Load(offset), InputList::from_slice(inputs))
    }

    /// Append a field store.
    fn store(&mut self, offset: u32, inputs: &[NodeId]) -> NodeId {
        self.memory(MemoryOp::Store(offset), InputList::from_slice(inputs))
    }

    /// Append a call.
    fn call(&mut self, target: u32, args: &[NodeId]) -> NodeId {
        self.memory(MemoryOp::Call(target), InputList::from_slice(args))
    }
}

impl ControlBuilder for GraphBuilder {
    fn memory(&mut self, op: MemoryOp, inputs: InputList) -> NodeId {
        let node = self.graph.add_node(Operator::Memory(op), inputs);
        self.append(node);
        self.control = node;
        node
    }

    fn branch(&mut self, condition: NodeId, hint: BranchHint) -> (NodeId, NodeId) {
        let branch = self
            .graph
            .add_node(Operator::Control(ControlOp::If(hint)), InputList::single(condition));
        self.append(branch);

        let on_true = self
            .graph
            .add_node(Operator::Control(ControlOp::Begin), InputList::new());
        let on_false = self
            .graph
            .add_node(Operator::Control(ControlOp::Begin), InputList::new());
        if let Err(err) = self.graph.set_successor(branch, 0, on_true) {
            self.latch(err);
        }
        if let Err(err) = self.graph.set_successor(branch, 1, on_false) {
            self.latch(err);
        }
        self.control = NodeId::INVALID;
        (on_true, on_false)
    }

    fn end(&mut self) -> NodeId {
        let end = self
            .graph
            .add_node(Operator::Control(ControlOp::End), InputList::new());
        self.append(end);
        self.control = NodeId::INVALID;
        end
    }

    fn region(&mut self, ends: &[NodeId]) -> NodeId {
        let region = self
            .graph
            .add_node(Operator::Control(ControlOp::Region), InputList::from_slice(ends));
        self.control = region;
        region
    }

    fn phi(&mut self, merge: NodeId, values: &[NodeId]) -> NodeId {
        let mut inputs = InputList::single(merge);
        for &value in values {
            inputs.push(value);
        }
        self.graph.add_node(Operator::Phi, inputs)
    }

    fn loop_begin(&mut self) -> NodeId {
        let entry = self.end();
        let header = self
            .graph
            .add_node(Operator::Control(ControlOp::Loop), InputList::single(entry));
        self.control = header;
        header
    }

    fn loop_end(&mut self, header: NodeId) -> NodeId {
        let back_edge = self
            .graph
            .add_node(Operator::Control(ControlOp::LoopEnd), InputList::single(header));
        self.append(back_edge);
        self.graph.push_input(header, back_edge);
        self.control = NodeId::INVALID;
        back_edge
    }

    fn return_value(&mut self, values: &[NodeId]) -> NodeId {
        let ret = self
            .graph
            .add_node(Operator::Control(ControlOp::Return), InputList::from_slice(values));
        self.append(ret);
        self.control = NodeId::INVALID;
        ret
    }

    fn deopt(&mut self, info: DeoptInfo) -> NodeId {
        let exit = self
            .graph
            .add_node(Operator::Control(ControlOp::Deopt(info)), InputList::new());
        self.append(exit);
        self.control = NodeId::INVALID;
        exit
    }
}

// =============================================================================
// Guard Builder
// =============================================================================

/// Speculative guard construction.
pub trait GuardBuilder {
    /// Guard on `condition`, free to float within the dominance constraints
    /// of its condition.
    fn guard(&mut self, condition: NodeId, info: GuardInfo) -> NodeId;

    /// Guard on `condition` that may not be scheduled above `anchor`.
    fn anchored_guard(&mut self, condition: NodeId, anchor: NodeId, info: GuardInfo) -> NodeId;

    /// Guard anchored at the current control point.
    fn guard_here(&mut self, condition: NodeId, info: GuardInfo) -> NodeId;
}

impl GuardBuilder for GraphBuilder {
    fn guard(&mut self, condition: NodeId, info: GuardInfo) -> NodeId {
        self.graph
            .unique_node(Operator::Guard(info), InputList::single(condition))
    }

    fn anchored_guard(&mut self, condition: NodeId, anchor: NodeId, info: GuardInfo) -> NodeId {
        self.graph
            .unique_node(Operator::Guard(info), InputList::pair(condition, anchor))
    }

    fn guard_here(&mut self, condition: NodeId, info: GuardInfo) -> NodeId {
        let anchor = self.control;
        if !anchor.is_valid() {
            self.latch(JitError::malformed(
                "guard anchored with no open control point",
            ));
            return self.guard(condition, info);
        }
        self.anchored_guard(condition, anchor, info)
    }
}

// =============================================================================
// Tests
// =============================================================================
