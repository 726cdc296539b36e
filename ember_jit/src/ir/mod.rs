//! Sea-of-Nodes intermediate representation.
//!
//! Fixed nodes (control flow and side effects) form one linked chain per
//! basic block. Everything else floats and is placed by the scheduler.

pub mod builder;
pub mod cfg;
pub mod deopt;
pub mod graph;
pub mod node;
pub mod operators;
pub mod schedule;

// Re-export key types
pub use builder::{ArithmeticBuilder, ControlBuilder, GraphBuilder, GuardBuilder};
pub use cfg::{Block, BlockId, Cfg, DominatorTree, LoopAnalysis};
pub use deopt::{DeoptAction, DeoptInfo, DeoptReason, SpeculationId};
pub use graph::Graph;
pub use node::{InputList, Node, NodeFlags, NodeId};
pub use operators::{BranchHint, ControlOp, GuardInfo, NodeKind, Operator};
pub use schedule::{Schedule, ScheduleConfig, Scheduler};
