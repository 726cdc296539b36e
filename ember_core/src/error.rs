//! Error types and result definitions for Ember.
//!
//! Errors fall into three groups:
//! - Structural IR errors (`MalformedGraph`), which abort the compilation of
//!   a single method
//! - Local graph API misuse (`ConflictingPosition`, `DanglingUse`), reported
//!   at the call that violated the precondition
//! - Speculation failures (`InvalidAssumption`), an expected signal that
//!   callers answer by deoptimizing

use thiserror::Error;

/// The result type used throughout Ember.
pub type JitResult<T> = Result<T, JitError>;

/// Error type covering all Ember error conditions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JitError {
    /// A structural precondition of the IR was violated.
    #[error("MalformedGraph: {message}")]
    MalformedGraph {
        /// Error description.
        message: String,
    },

    /// A node that already has a position in a fixed chain was inserted again.
    #[error("ConflictingPosition: node n{node} already has a position in a fixed chain")]
    ConflictingPosition {
        /// Raw index of the offending node.
        node: u32,
    },

    /// A node was deleted while other nodes still use it.
    #[error("DanglingUse: node n{node} still has {uses} live use(s)")]
    DanglingUse {
        /// Raw index of the node being deleted.
        node: u32,
        /// Number of remaining uses.
        uses: usize,
    },

    /// An assumption was checked after it had been invalidated.
    #[error("InvalidAssumption: assumption '{name}' no longer holds")]
    InvalidAssumption {
        /// Name of the invalidated assumption.
        name: String,
    },

    /// The process logger could not be installed.
    #[error("LoggerError: {message}")]
    Logger {
        /// Error description.
        message: String,
    },
}

impl JitError {
    /// Create a malformed graph error.
    #[inline]
    pub fn malformed(message: impl Into<String>) -> Self {
        JitError::MalformedGraph {
            message: message.into(),
        }
    }

    /// Check whether this error aborts only the current compilation.
    #[inline]
    pub fn is_compilation_failure(&self) -> bool {
        matches!(
            self,
            JitError::MalformedGraph { .. }
                | JitError::ConflictingPosition { .. }
                | JitError::DanglingUse { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = JitError::malformed("cycle through n4");
        assert_eq!(err.to_string(), "MalformedGraph: cycle through n4");

        let err = JitError::DanglingUse { node: 7, uses: 2 };
        assert_eq!(err.to_string(), "DanglingUse: node n7 still has 2 live use(s)");

        let err = JitError::InvalidAssumption {
            name: "no_subclass".into(),
        };
        assert!(err.to_string().contains("no_subclass"));
    }

    #[test]
    fn test_compilation_failure_classification() {
        assert!(JitError::malformed("x").is_compilation_failure());
        assert!(JitError::ConflictingPosition { node: 1 }.is_compilation_failure());
        assert!(
            !JitError::InvalidAssumption {
                name: "a".into()
            }
            .is_compilation_failure()
        );
    }
}
