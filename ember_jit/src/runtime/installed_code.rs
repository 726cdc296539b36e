//! Installed machine code as seen by the assumption machinery.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

// =============================================================================
// Dependent Code
// =============================================================================

/// Code that can be invalidated when an assumption it relies on fails.
pub trait DependentCode: Send + Sync {
    /// Current version; changes whenever new code is installed in the slot.
    fn version(&self) -> u64;

    /// Make the code non-executable. Idempotent.
    fn invalidate(&self);
}

// =============================================================================
// Installed Code
// =============================================================================

/// A slot holding the entry address of one compiled method.
///
/// Every [`install`](InstalledCode::install) starts a new version, so
/// dependents registered against an older compilation no longer match.
#[derive(Debug)]
pub struct InstalledCode {
    name: String,
    version: AtomicU64,
    /// Entry address; 0 when not executable.
    address: AtomicUsize,
    invalidations: AtomicU64,
}

impl InstalledCode {
    /// Create an empty, non-executable slot.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: AtomicU64::new(0),
            address: AtomicUsize::new(0),
            invalidations: AtomicU64::new(0),
        }
    }

    /// Slot name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Install new code at `address`, returning the new version.
    pub fn install(&self, address: usize) -> u64 {
        let version = self.version.fetch_add(1, Ordering::AcqRel) + 1;
        self.address.store(address, Ordering::Release);
        version
    }

    /// Entry address, 0 if not executable.
    #[inline]
    pub fn address(&self) -> usize {
        self.address.load(Ordering::Acquire)
    }

    /// Whether the slot holds executable code.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.address() != 0
    }

    /// Number of invalidations that made executable code non-executable.
    #[inline]
    pub fn invalidation_count(&self) -> u64 {
        self.invalidations.load(Ordering::Relaxed)
    }
}

impl DependentCode for InstalledCode {
    #[inline]
    fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    fn invalidate(&self) {
        if self.address.swap(0, Ordering::AcqRel) != 0 {
            self.invalidations.fetch_add(1, Ordering::Relaxed);
        }
    }
}
