//! Deoptimization vocabulary.
//!
//! Reasons and actions are machine-independent: lowering copies them
//! verbatim onto synthesized `Deopt` nodes and the runtime decodes them when
//! a trap is taken.

use std::fmt;

// =============================================================================
// Deoptimization Reason
// =============================================================================

/// Why a speculative path was abandoned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DeoptReason {
    /// No specific reason recorded.
    None = 0,
    /// A null check failed.
    NullCheck = 1,
    /// An array bounds check failed.
    BoundsCheck = 2,
    /// A checked cast failed.
    ClassCast = 3,
    /// An array store had an incompatible element type.
    ArrayStore = 4,
    /// Code that was never reached while profiling was executed.
    UnreachedCode = 5,
    /// A type check guarding an inlined call failed.
    TypeCheckedInliningViolated = 6,
    /// A profile-driven type check failed.
    OptimizedTypeCheckViolated = 7,
    /// An arithmetic exception (overflow, division by zero).
    Arithmetic = 8,
    /// A runtime constraint such as an assumption no longer holds.
    RuntimeConstraint = 9,
    /// A loop limit check failed.
    LoopLimitCheck = 10,
    /// Speculative alias analysis was wrong.
    Aliasing = 11,
    /// Explicit transfer back to the interpreter.
    TransferToInterpreter = 12,
}

impl DeoptReason {
    /// Get a human-readable name.
    pub const fn as_str(self) -> &'static str {
        match self {
            DeoptReason::None => "none",
            DeoptReason::NullCheck => "null_check",
            DeoptReason::BoundsCheck => "bounds_check",
            DeoptReason::ClassCast => "class_cast",
            DeoptReason::ArrayStore => "array_store",
            DeoptReason::UnreachedCode => "unreached_code",
            DeoptReason::TypeCheckedInliningViolated => "type_checked_inlining_violated",
            DeoptReason::OptimizedTypeCheckViolated => "optimized_type_check_violated",
            DeoptReason::Arithmetic => "arithmetic",
            DeoptReason::RuntimeConstraint => "runtime_constraint",
            DeoptReason::LoopLimitCheck => "loop_limit_check",
            DeoptReason::Aliasing => "aliasing",
            DeoptReason::TransferToInterpreter => "transfer_to_interpreter",
        }
    }
}

impl fmt::Display for DeoptReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Deoptimization Action
// =============================================================================

/// How execution resumes after a deoptimization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DeoptAction {
    /// Resume in the interpreter, keep the compiled code.
    None = 0,
    /// Recompile once this trap has fired too often.
    RecompileIfTooManyDeopts = 1,
    /// Invalidate the compiled code and collect a fresh profile.
    InvalidateReprofile = 2,
    /// Invalidate the compiled code and recompile immediately.
    InvalidateRecompile = 3,
    /// Invalidate the compiled code and never compile this method again.
    InvalidateStopCompiling = 4,
}

impl DeoptAction {
    /// Get a human-readable name.
    pub const fn as_str(self) -> &'static str {
        match self {
            DeoptAction::None => "none",
            DeoptAction::RecompileIfTooManyDeopts => "recompile_if_too_many_deopts",
            DeoptAction::InvalidateReprofile => "invalidate_reprofile",
            DeoptAction::InvalidateRecompile => "invalidate_recompile",
            DeoptAction::InvalidateStopCompiling => "invalidate_stop_compiling",
        }
    }

    /// Whether taking this trap invalidates the compiled code.
    #[inline]
    pub const fn invalidates_code(self) -> bool {
        matches!(
            self,
            DeoptAction::InvalidateReprofile
                | DeoptAction::InvalidateRecompile
                | DeoptAction::InvalidateStopCompiling
        )
    }
}

impl fmt::Display for DeoptAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Speculation Context
// =============================================================================

/// Identifies the speculation a guard was derived from.
///
/// The runtime uses it to stop speculating on a site that keeps failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct SpeculationId(pub u32);

/// Payload of a deoptimization exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeoptInfo {
    /// Trap cause.
    pub reason: DeoptReason,
    /// Resume policy.
    pub action: DeoptAction,
    /// Speculation that failed, if any.
    pub speculation: Option<SpeculationId>,
}

impl DeoptInfo {
    /// Create deopt info without a speculation context.
    #[inline]
    pub const fn new(reason: DeoptReason, action: DeoptAction) -> Self {
        DeoptInfo {
            reason,
            action,
            speculation: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_names() {
        assert_eq!(DeoptReason::NullCheck.as_str(), "null_check");
        assert_eq!(DeoptReason::BoundsCheck.to_string(), "bounds_check");
        assert_eq!(DeoptReason::TransferToInterpreter as u8, 12);
    }

    #[test]
    fn test_action_invalidates_code() {
        assert!(!DeoptAction::None.invalidates_code());
        assert!(!DeoptAction::RecompileIfTooManyDeopts.invalidates_code());
        assert!(DeoptAction::InvalidateRecompile.invalidates_code());
        assert!(DeoptAction::InvalidateStopCompiling.invalidates_code());
    }
}
