//! IR operators.
//!
//! The operator set is closed: every pass that cares about node structure
//! matches on [`NodeKind`], so adding an operator without classifying it is a
//! compile error in `Operator::kind`.
//!
//! ```text
//!  fixed (in a block's chain)         floating (placed by the scheduler)
//!  ─────────────────────────          ──────────────────────────────────
//!  Start Begin Region Loop            Parameter ConstInt ConstBool
//!  Memory(Load/Store/Call)            IntOp IntCmp LogicalNot Guard
//!  If End LoopEnd Return Deopt        Phi (pinned to its region)
//! ```

use super::deopt::{DeoptAction, DeoptInfo, DeoptReason, SpeculationId};

// =============================================================================
// Operator
// =============================================================================

/// The operation a node performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    /// Control-flow structure.
    Control(ControlOp),
    /// Side-effecting operation in a fixed chain.
    Memory(MemoryOp),
    /// Speculative check, abstract until lowered.
    Guard(GuardInfo),
    /// Incoming argument.
    Parameter(u32),
    /// Integer constant.
    ConstInt(i64),
    /// Boolean constant.
    ConstBool(bool),
    /// Integer arithmetic.
    IntOp(ArithOp),
    /// Integer comparison producing a boolean.
    IntCmp(CmpOp),
    /// Boolean negation.
    LogicalNot,
    /// SSA merge of values; input 0 is the region or loop header.
    Phi,
}

/// Control operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlOp {
    /// Method entry.
    Start,
    /// Start of a control-flow path.
    Begin,
    /// Merge of forward edges; inputs are the incoming `End` nodes.
    Region,
    /// Loop header; input 0 is the entry `End`, the rest are `LoopEnd`s.
    Loop,
    /// Forward jump into a region.
    End,
    /// Back edge; input 0 is the loop header.
    LoopEnd,
    /// Two-way branch on input 0.
    If(BranchHint),
    /// Method exit; inputs are the returned values.
    Return,
    /// Deoptimization exit.
    Deopt(DeoptInfo),
}

/// Static prediction attached to an `If`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BranchHint {
    /// No prediction.
    #[default]
    None,
    /// The true successor is almost always taken.
    LikelyTrue,
    /// The false successor is almost always taken.
    LikelyFalse,
}

impl BranchHint {
    /// Probability that the true successor is taken.
    pub fn true_probability(self) -> f64 {
        match self {
            BranchHint::None => 0.5,
            BranchHint::LikelyTrue => 1.0,
            BranchHint::LikelyFalse => 0.0,
        }
    }
}

/// Side-effecting operations living in a fixed chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryOp {
    /// Load a field at the given offset from input 0.
    Load(u32),
    /// Store input 1 to a field at the given offset from input 0.
    Store(u32),
    /// Call the target with the inputs as arguments.
    Call(u32),
}

/// Integer arithmetic operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArithOp {
    /// Addition.
    Add,
    /// Subtraction.
    Sub,
    /// Multiplication.
    Mul,
}

/// Integer comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CmpOp {
    /// Equal.
    Eq,
    /// Not equal.
    Ne,
    /// Signed less than.
    Lt,
    /// Signed less than or equal.
    Le,
    /// Signed greater than.
    Gt,
    /// Signed greater than or equal.
    Ge,
}

// =============================================================================
// Guard Info
// =============================================================================

/// Payload of a guard node.
///
/// Inputs of a guard: 0 is the boolean condition, 1 (optional) is the fixed
/// node the guard is anchored to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GuardInfo {
    /// Trap cause copied onto the deopt exit.
    pub reason: DeoptReason,
    /// Resume policy copied onto the deopt exit.
    pub action: DeoptAction,
    /// Trap when the condition is true instead of when it is false.
    pub negated: bool,
    /// Speculation this guard protects, if any.
    pub speculation: Option<SpeculationId>,
}

impl GuardInfo {
    /// Guard that traps when its condition is false.
    #[inline]
    pub const fn new(reason: DeoptReason, action: DeoptAction) -> Self {
        GuardInfo {
            reason,
            action,
            negated: false,
            speculation: None,
        }
    }

    /// Guard that traps when its condition is true.
    #[inline]
    pub const fn negated(reason: DeoptReason, action: DeoptAction) -> Self {
        GuardInfo {
            reason,
            action,
            negated: true,
            speculation: None,
        }
    }

    /// Attach a speculation context.
    #[inline]
    pub const fn with_speculation(mut self, speculation: SpeculationId) -> Self {
        self.speculation = Some(speculation);
        self
    }

    /// Deopt payload for the exit this guard lowers to.
    #[inline]
    pub const fn deopt_info(&self) -> DeoptInfo {
        DeoptInfo {
            reason: self.reason,
            action: self.action,
            speculation: self.speculation,
        }
    }
}

// =============================================================================
// Node Kind
// =============================================================================

/// Structural classification of an operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// Always starts a block: `Start`, `Region`, `Loop`.
    BlockBegin,
    /// `Begin`: starts a block only when its predecessor is an `If`.
    Begin,
    /// Ordinary fixed node with a single `next` successor.
    FixedWithNext,
    /// `If`: ends a block with two successors.
    ControlSplit,
    /// `End`/`LoopEnd`: ends a block by jumping to a merge.
    ControlEnd,
    /// `Return`/`Deopt`: ends a block and leaves the method.
    ControlSink,
    /// Floating guard.
    Guard,
    /// Floating node pinned to a block (`Phi`).
    Pinned,
    /// Pure floating computation.
    Floating,
}

impl NodeKind {
    /// Whether nodes of this kind live in a fixed chain.
    #[inline]
    pub const fn is_fixed(self) -> bool {
        matches!(
            self,
            NodeKind::BlockBegin
                | NodeKind::Begin
                | NodeKind::FixedWithNext
                | NodeKind::ControlSplit
                | NodeKind::ControlEnd
                | NodeKind::ControlSink
        )
    }

    /// Whether nodes of this kind have exactly one `next` successor.
    #[inline]
    pub const fn has_next(self) -> bool {
        matches!(
            self,
            NodeKind::BlockBegin | NodeKind::Begin | NodeKind::FixedWithNext
        )
    }

    /// Whether nodes of this kind end a block.
    #[inline]
    pub const fn is_terminator(self) -> bool {
        matches!(
            self,
            NodeKind::ControlSplit | NodeKind::ControlEnd | NodeKind::ControlSink
        )
    }

    /// Number of successor slots.
    #[inline]
    pub const fn successor_count(self) -> usize {
        match self {
            NodeKind::BlockBegin | NodeKind::Begin | NodeKind::FixedWithNext => 1,
            NodeKind::ControlSplit => 2,
            NodeKind::ControlEnd
            | NodeKind::ControlSink
            | NodeKind::Guard
            | NodeKind::Pinned
            | NodeKind::Floating => 0,
        }
    }
}

impl Operator {
    /// Classify this operator.
    pub const fn kind(&self) -> NodeKind {
        match self {
            Operator::Control(ControlOp::Start)
            | Operator::Control(ControlOp::Region)
            | Operator::Control(ControlOp::Loop) => NodeKind::BlockBegin,
            Operator::Control(ControlOp::Begin) => NodeKind::Begin,
            Operator::Control(ControlOp::If(_)) => NodeKind::ControlSplit,
            Operator::Control(ControlOp::End) | Operator::Control(ControlOp::LoopEnd) => {
                NodeKind::ControlEnd
            }
            Operator::Control(ControlOp::Return) | Operator::Control(ControlOp::Deopt(_)) => {
                NodeKind::ControlSink
            }
            Operator::Memory(_) => NodeKind::FixedWithNext,
            Operator::Guard(_) => NodeKind::Guard,
            Operator::Phi => NodeKind::Pinned,
            Operator::Parameter(_)
            | Operator::ConstInt(_)
            | Operator::ConstBool(_)
            | Operator::IntOp(_)
            | Operator::IntCmp(_)
            | Operator::LogicalNot => NodeKind::Floating,
        }
    }

    /// Whether `Graph::unique` may share structurally equal nodes.
    #[inline]
    pub const fn is_value_numberable(&self) -> bool {
        matches!(self.kind(), NodeKind::Floating | NodeKind::Guard)
    }

    /// Whether this is a guard.
    #[inline]
    pub const fn is_guard(&self) -> bool {
        matches!(self, Operator::Guard(_))
    }

    /// Guard payload, if this is a guard.
    #[inline]
    pub const fn guard_info(&self) -> Option<&GuardInfo> {
        match self {
            Operator::Guard(info) => Some(info),
            _ => None,
        }
    }
}
