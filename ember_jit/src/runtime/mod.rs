//! JIT runtime support for speculative code.
//!
//! Tracks which installed code depends on which runtime assumptions, so
//! that code built on a fact that stops holding is invalidated promptly.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │  ┌────────────────────┐        ┌──────────────────────────┐   │
//! │  │ AssumptionRegistry │        │        CodeCache         │   │
//! │  │                    │        │                          │   │
//! │  │ name → Assumption  │◄───────│ code id → InstalledCode  │   │
//! │  │   (Weak dependents)│register│   (owning Arc)           │   │
//! │  └────────────────────┘        └──────────────────────────┘   │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use ember_jit::runtime::{AssumptionRegistry, CodeCache, RuntimeConfig};
//! use std::sync::Arc;
//!
//! let config = RuntimeConfig::default();
//! let registry = Arc::new(AssumptionRegistry::new(config.clone()));
//! let cache = CodeCache::with_registry(&config, Arc::clone(&registry));
//!
//! let stable = registry.create("Point.x is final");
//! let code = cache.install(7, 0x1000, &[stable.clone()]);
//!
//! registry.invalidate("Point.x is final");
//! assert!(!code.is_valid());
//! ```

pub mod assumption;
pub mod code_cache;
pub mod installed_code;

pub use assumption::{Assumption, AssumptionRegistry, DependentEntry, RegistryStats};
pub use code_cache::{CodeCache, CodeCacheStats};
pub use installed_code::{DependentCode, InstalledCode};

// =============================================================================
// Runtime Configuration
// =============================================================================

/// Configuration for the assumption and code-cache runtime.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Dependent-list length at which an assumption first drops entries
    /// whose code was reclaimed or reinstalled.
    pub prune_threshold: usize,
    /// Initial number of code-cache slots.
    pub initial_cache_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            prune_threshold: 64,
            initial_cache_capacity: 256,
        }
    }
}

impl RuntimeConfig {
    /// Create a config for testing (small limits so pruning kicks in early).
    pub fn for_testing() -> Self {
        Self {
            prune_threshold: 4,
            initial_cache_capacity: 8,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
