//! Runtime assumptions and their dependent code.
//!
//! An [`Assumption`] is a named fact that compiled code relies on, such as
//! "this class has no subclasses". It starts valid and can only become
//! invalid. Code that relies on it registers as a dependent; invalidation
//! makes every dependent that still runs the registering compilation
//! non-executable.
//!
//! # Concurrency
//!
//! - `check` reads one atomic flag and never blocks
//! - `register_dependent` and `invalidate` serialize on the assumption's own
//!   mutex, so a registration is either seen by the invalidation or rejected
//! - dependents are held weakly; reclaimed code is skipped, and code that was
//!   reinstalled since registration is left alone

use super::installed_code::DependentCode;
use super::RuntimeConfig;
use ember_core::{JitError, JitResult};
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

// =============================================================================
// Dependent Entry
// =============================================================================

/// Weak link from an assumption to one compilation of a piece of code.
#[derive(Debug, Clone)]
pub struct DependentEntry {
    code: Weak<dyn DependentCode>,
    version: u64,
}

impl DependentEntry {
    /// Capture `code` at its current version.
    pub fn new<C: DependentCode + 'static>(code: &Arc<C>) -> Self {
        let weak: Weak<C> = Arc::downgrade(code);
        let weak: Weak<dyn DependentCode> = weak;
        Self {
            code: weak,
            version: code.version(),
        }
    }

    /// Version captured at registration.
    #[inline]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// The code, if it is still alive and still at the captured version.
    pub fn live_code(&self) -> Option<Arc<dyn DependentCode>> {
        self.code
            .upgrade()
            .filter(|code| code.version() == self.version)
    }
}

// =============================================================================
// Assumption
// =============================================================================

#[derive(Debug)]
struct Dependents {
    entries: Vec<DependentEntry>,
    /// List length that triggers the next prune.
    prune_at: usize,
}

/// A named fact that compiled code may rely on.
#[derive(Debug)]
pub struct Assumption {
    name: String,
    valid: AtomicBool,
    dependents: Mutex<Dependents>,
}

impl Assumption {
    /// Create a valid assumption with the default prune threshold.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_prune_threshold(name, RuntimeConfig::default().prune_threshold)
    }

    /// Create a valid assumption that prunes its dependents once `threshold`
    /// entries accumulate.
    pub fn with_prune_threshold(name: impl Into<String>, threshold: usize) -> Self {
        Self {
            name: name.into(),
            valid: AtomicBool::new(true),
            dependents: Mutex::new(Dependents {
                entries: Vec::new(),
                prune_at: threshold.max(1),
            }),
        }
    }

    /// Assumption name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the assumption still holds.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    /// Fail with `InvalidAssumption` once the assumption no longer holds.
    #[inline]
    pub fn check(&self) -> JitResult<()> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(JitError::InvalidAssumption {
                name: self.name.clone(),
            })
        }
    }

    /// Record `code` as relying on this assumption.
    ///
    /// If the assumption is already invalid nothing is recorded, `code` is
    /// invalidated, and `false` is returned.
    pub fn register_dependent<C: DependentCode + 'static>(&self, code: &Arc<C>) -> bool {
        {
            let mut dependents = self.dependents.lock();
            if self.valid.load(Ordering::Acquire) {
                if dependents.entries.len() >= dependents.prune_at {
                    let removed = Self::prune(&mut dependents.entries);
                    if dependents.entries.len() * 2 > dependents.prune_at {
                        dependents.prune_at *= 2;
                    }
                    log::trace!(
                        target: "ember::assumption",
                        "'{}': pruned {removed} dependents, next prune at {}",
                        self.name,
                        dependents.prune_at
                    );
                }
                dependents.entries.push(DependentEntry::new(code));
                return true;
            }
        }
        code.invalidate();
        log::warn!(
            target: "ember::assumption",
            "'{}' is invalid; rejected dependent at version {}",
            self.name,
            code.version()
        );
        false
    }

    /// Mark the assumption invalid and invalidate its live dependents.
    ///
    /// Returns `true` for the call that performed the transition; later
    /// calls do nothing.
    pub fn invalidate(&self) -> bool {
        let mut dependents = self.dependents.lock();
        if !self.valid.load(Ordering::Acquire) {
            return false;
        }
        self.valid.store(false, Ordering::Release);

        let entries = std::mem::take(&mut dependents.entries);
        let total = entries.len();
        let mut invalidated = 0;
        for entry in &entries {
            if let Some(code) = entry.live_code() {
                code.invalidate();
                invalidated += 1;
            }
        }
        log::debug!(
            target: "ember::assumption",
            "'{}' invalidated: {invalidated} of {total} dependents",
            self.name
        );
        true
    }

    /// Number of recorded dependent entries, stale ones included.
    pub fn dependent_count(&self) -> usize {
        self.dependents.lock().entries.len()
    }

    /// Drop entries whose code was reclaimed or reinstalled; returns how many.
    pub fn prune_dependents(&self) -> usize {
        Self::prune(&mut self.dependents.lock().entries)
    }

    fn prune(entries: &mut Vec<DependentEntry>) -> usize {
        let before = entries.len();
        entries.retain(|entry| entry.live_code().is_some());
        before - entries.len()
    }
}

// =============================================================================
// Assumption Registry
// =============================================================================

/// Statistics for an [`AssumptionRegistry`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    /// Assumptions currently registered by name.
    pub assumptions: usize,
    /// Invalidations performed through the registry.
    pub invalidations: u64,
    /// Dependents recorded through `register_all`.
    pub registrations: u64,
    /// Registrations rejected because the assumption was already invalid.
    pub rejected: u64,
}

/// Named assumptions shared by the compiler and the runtime.
#[derive(Debug)]
pub struct AssumptionRegistry {
    config: RuntimeConfig,
    assumptions: RwLock<FxHashMap<String, Arc<Assumption>>>,
    invalidations: AtomicU64,
    registrations: AtomicU64,
    rejected: AtomicU64,
}

impl AssumptionRegistry {
    /// Create an empty registry.
    pub fn new(config: RuntimeConfig) -> Self {
        Self {
            config,
            assumptions: RwLock::new(FxHashMap::default()),
            invalidations: AtomicU64::new(0),
            registrations: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        }
    }

    /// Assumption named `name`.
    ///
    /// Returns the registered assumption while it is valid; once it has been
    /// invalidated a fresh, valid assumption takes its place.
    pub fn create(&self, name: &str) -> Arc<Assumption> {
        if let Some(existing) = self.get(name) {
            if existing.is_valid() {
                return existing;
            }
        }
        let mut assumptions = self.assumptions.write();
        if let Some(existing) = assumptions.get(name) {
            if existing.is_valid() {
                return Arc::clone(existing);
            }
        }
        let assumption = Arc::new(Assumption::with_prune_threshold(
            name,
            self.config.prune_threshold,
        ));
        assumptions.insert(name.to_owned(), Arc::clone(&assumption));
        assumption
    }

    /// Registered assumption named `name`.
    pub fn get(&self, name: &str) -> Option<Arc<Assumption>> {
        self.assumptions.read().get(name).cloned()
    }

    /// Invalidate the assumption named `name`.
    ///
    /// Returns `true` if this call made it invalid.
    pub fn invalidate(&self, name: &str) -> bool {
        let Some(assumption) = self.get(name) else {
            return false;
        };
        let transitioned = assumption.invalidate();
        if transitioned {
            self.invalidations.fetch_add(1, Ordering::Relaxed);
        }
        transitioned
    }

    /// Register `code` on every assumption it was compiled against.
    ///
    /// Stops at the first invalid assumption, which invalidates `code`.
    /// Returns whether all registrations succeeded.
    pub fn register_all<C: DependentCode + 'static>(
        &self,
        assumptions: &[Arc<Assumption>],
        code: &Arc<C>,
    ) -> bool {
        for assumption in assumptions {
            if !assumption.register_dependent(code) {
                self.rejected.fetch_add(1, Ordering::Relaxed);
                return false;
            }
            self.registrations.fetch_add(1, Ordering::Relaxed);
        }
        true
    }

    /// Number of named assumptions.
    pub fn len(&self) -> usize {
        self.assumptions.read().len()
    }

    /// Whether no assumptions are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registry statistics.
    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            assumptions: self.len(),
            invalidations: self.invalidations.load(Ordering::Relaxed),
            registrations: self.registrations.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }
}

impl Default for AssumptionRegistry {
    fn default() -> Self {
        Self::new(RuntimeConfig::default())
    }
}

// =============================================================================
// Tests
// =============================================================================
