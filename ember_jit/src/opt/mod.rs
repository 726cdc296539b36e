//! Speculative optimization passes for the Sea-of-Nodes IR.
//!
//! - **Guard lowering**: turns floating guards into explicit branches to
//!   deoptimization exits
//!
//! # Pipeline
//!
//! [`lower_guards`] schedules the graph, lowers every guard against that
//! schedule, and optionally re-verifies the fixed chains. A failure aborts
//! only the compilation of this graph.

pub mod guard_lowering;

// Re-export key types
pub use guard_lowering::GuardLowering;

use crate::ir::graph::Graph;
use crate::ir::schedule::{Schedule, ScheduleConfig, Scheduler};
use ember_core::{JitError, JitResult};

// =============================================================================
// Optimization Pass Trait
// =============================================================================

/// A single pass over a scheduled IR graph.
pub trait OptimizationPass {
    /// The name of this pass (for debugging/logging).
    fn name(&self) -> &'static str;

    /// Run the pass on the graph using a schedule computed beforehand.
    /// Returns true if the graph was modified.
    fn run(&mut self, graph: &mut Graph, schedule: &Schedule) -> JitResult<bool>;
}

// =============================================================================
// Driver
// =============================================================================

/// Configuration for [`lower_guards`].
#[derive(Debug, Clone, Default)]
pub struct OptConfig {
    /// Scheduler settings.
    pub schedule: ScheduleConfig,
    /// Check chain integrity after lowering.
    pub verify_graph: bool,
}

impl OptConfig {
    /// Configuration for tests: verify the schedule and the result.
    pub fn for_testing() -> Self {
        OptConfig {
            schedule: ScheduleConfig::for_testing(),
            verify_graph: true,
        }
    }
}

/// Statistics from [`lower_guards`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OptStats {
    /// Guards replaced by branches.
    pub guards_lowered: usize,
    /// Lowered guards that trap on a true condition.
    pub negated_guards: usize,
    /// Blocks walked by the lowering pass.
    pub blocks_visited: usize,
    /// Nodes placed by the scheduler.
    pub nodes_scheduled: usize,
}

/// Schedule `graph` and lower all of its guards.
pub fn lower_guards(graph: &mut Graph, config: &OptConfig) -> JitResult<OptStats> {
    let schedule = Scheduler::new(config.schedule).schedule(graph)?;

    let mut pass = GuardLowering::new();
    pass.run(graph, &schedule)?;

    if config.verify_graph {
        graph.verify_chains()?;
        if let Some(&guard) = graph.guards().first() {
            return Err(JitError::malformed(format!(
                "guard {guard} survived {}",
                pass.name()
            )));
        }
    }

    let stats = OptStats {
        guards_lowered: pass.lowered(),
        negated_guards: pass.negated(),
        blocks_visited: pass.blocks_visited(),
        nodes_scheduled: schedule.node_count(),
    };
    log::debug!(
        target: "ember::guard-lowering",
        "lowered {} guards ({} negated) across {} blocks",
        stats.guards_lowered,
        stats.negated_guards,
        stats.blocks_visited
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::builder::{ArithmeticBuilder, ControlBuilder, GraphBuilder, GuardBuilder};
    use crate::ir::deopt::{DeoptAction, DeoptReason};
    use crate::ir::operators::GuardInfo;

    #[test]
    fn test_lower_guards_stats() {
        let mut builder = GraphBuilder::new();
        let p0 = builder.parameter(0);
        let p1 = builder.parameter(1);
        let cond = builder.int_lt(p0, p1);
        builder.guard(
            cond,
            GuardInfo::negated(DeoptReason::BoundsCheck, DeoptAction::InvalidateReprofile),
        );
        builder.return_value(&[]);
        let mut graph = builder.finish().unwrap();

        let stats = lower_guards(&mut graph, &OptConfig::for_testing()).unwrap();
        assert_eq!(stats.guards_lowered, 1);
        assert_eq!(stats.negated_guards, 1);
        assert_eq!(stats.blocks_visited, 1);
        assert_eq!(stats.nodes_scheduled, 6);
    }

    #[test]
    fn test_malformed_graph_aborts() {
        let mut builder = GraphBuilder::new();
        builder.load(0, &[]);
        let mut graph = builder.finish().unwrap();

        let err = lower_guards(&mut graph, &OptConfig::default()).unwrap_err();
        assert!(err.is_compilation_failure());
    }
}
