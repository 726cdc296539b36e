//! Code cache owning installed code.
//!
//! The cache holds the only strong reference to each [`InstalledCode`]
//! slot. Assumptions reference slots weakly, so reclaiming a slot here is
//! what makes its dependent entries stop resolving. Registrations go
//! through the cache's [`AssumptionRegistry`] so they show up in its stats.

use super::assumption::{Assumption, AssumptionRegistry};
use super::installed_code::InstalledCode;
use super::RuntimeConfig;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

// =============================================================================
// Code Cache
// =============================================================================

/// Installed code indexed by code ID.
///
/// Thread-safe via internal locking.
#[derive(Debug)]
pub struct CodeCache {
    /// Registry that records dependent registrations.
    registry: Arc<AssumptionRegistry>,
    /// Map from code ID to its slot.
    entries: RwLock<FxHashMap<u64, Arc<InstalledCode>>>,
    /// Install counter.
    installs: AtomicU64,
    /// Reclaim counter.
    reclaims: AtomicU64,
    /// Lookup hit counter.
    hits: AtomicU64,
    /// Lookup miss counter.
    misses: AtomicU64,
}

impl CodeCache {
    /// Create an empty cache with its own registry.
    pub fn new(config: &RuntimeConfig) -> Self {
        Self::with_registry(config, Arc::new(AssumptionRegistry::new(config.clone())))
    }

    /// Create an empty cache that registers dependents through `registry`.
    pub fn with_registry(config: &RuntimeConfig, registry: Arc<AssumptionRegistry>) -> Self {
        let mut entries = FxHashMap::default();
        entries.reserve(config.initial_cache_capacity);
        Self {
            registry,
            entries: RwLock::new(entries),
            installs: AtomicU64::new(0),
            reclaims: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Install code for `code_id` at `address`, compiled against
    /// `assumptions`.
    ///
    /// Reuses the existing slot if there is one, so older compilations in
    /// that slot become stale for their assumptions. If any assumption is
    /// already invalid the slot is invalidated before this returns.
    pub fn install(
        &self,
        code_id: u64,
        address: usize,
        assumptions: &[Arc<Assumption>],
    ) -> Arc<InstalledCode> {
        let slot = {
            let mut entries = self.entries.write();
            Arc::clone(
                entries
                    .entry(code_id)
                    .or_insert_with(|| Arc::new(InstalledCode::new(format!("code#{code_id}")))),
            )
        };

        let version = slot.install(address);
        self.installs.fetch_add(1, Ordering::Relaxed);

        if !self.registry.register_all(assumptions, &slot) {
            log::warn!(
                target: "ember::code-cache",
                "{} v{version} installed against an invalid assumption",
                slot.name()
            );
        }
        log::debug!(
            target: "ember::code-cache",
            "installed {} v{version} at {address:#x} ({} assumptions)",
            slot.name(),
            assumptions.len()
        );
        slot
    }

    /// Registry this cache registers dependents through.
    #[inline]
    pub fn registry(&self) -> &Arc<AssumptionRegistry> {
        &self.registry
    }

    /// Look up installed code by ID.
    #[inline]
    pub fn lookup(&self, code_id: u64) -> Option<Arc<InstalledCode>> {
        let result = self.entries.read().get(&code_id).cloned();

        if result.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        result
    }

    /// Drop the cache's reference to a slot; returns whether one existed.
    pub fn reclaim(&self, code_id: u64) -> bool {
        let removed = self.entries.write().remove(&code_id);
        if removed.is_some() {
            self.reclaims.fetch_add(1, Ordering::Relaxed);
            log::trace!(target: "ember::code-cache", "reclaimed code#{code_id}");
        }
        removed.is_some()
    }

    /// Get the number of slots in the cache.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Check if the cache is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get cache statistics.
    pub fn stats(&self) -> CodeCacheStats {
        CodeCacheStats {
            entries: self.len(),
            installs: self.installs.load(Ordering::Relaxed),
            reclaims: self.reclaims.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

impl Default for CodeCache {
    fn default() -> Self {
        Self::new(&RuntimeConfig::default())
    }
}

/// Code cache statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CodeCacheStats {
    /// Number of slots.
    pub entries: usize,
    /// Number of installs.
    pub installs: u64,
    /// Number of reclaimed slots.
    pub reclaims: u64,
    /// Lookup hits.
    pub hits: u64,
    /// Lookup misses.
    pub misses: u64,
}

impl CodeCacheStats {
    /// Lookup hit rate in `[0, 1]`.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::installed_code::DependentCode;

    #[test]
    fn test_install_lookup() {
        let cache = CodeCache::new(&RuntimeConfig::for_testing());
        let code = cache.install(42, 0x1000, &[]);
        assert!(code.is_valid());
        assert_eq!(code.name(), "code#42");

        let found = cache.lookup(42).unwrap();
        assert!(Arc::ptr_eq(&found, &code));
        assert!(cache.lookup(999).is_none());
    }

    #[test]
    fn test_reinstall_reuses_slot() {
        let cache = CodeCache::default();
        let first = cache.install(1, 0x1000, &[]);
        let second = cache.install(1, 0x2000, &[]);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.version(), 2);
        assert_eq!(second.address(), 0x2000);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_install_against_invalid_assumption() {
        let cache = CodeCache::default();
        let assumption = Arc::new(Assumption::new("a"));
        assumption.invalidate();

        let code = cache.install(1, 0x1000, &[assumption]);
        assert!(!code.is_valid());
    }

    #[test]
    fn test_install_counts_in_registry_stats() {
        let config = RuntimeConfig::for_testing();
        let registry = Arc::new(AssumptionRegistry::new(config.clone()));
        let cache = CodeCache::with_registry(&config, Arc::clone(&registry));
        let a = registry.create("a");
        let b = registry.create("b");

        cache.install(1, 0x1000, &[a.clone(), b.clone()]);
        registry.invalidate("b");
        let code = cache.install(2, 0x2000, &[a, b]);
        assert!(!code.is_valid());

        let stats = registry.stats();
        assert_eq!(stats.registrations, 3);
        assert_eq!(stats.rejected, 1);
        assert!(Arc::ptr_eq(cache.registry(), &registry));
    }

    #[test]
    fn test_reclaim() {
        let cache = CodeCache::default();
        cache.install(1, 0x1000, &[]);
        assert!(cache.reclaim(1));
        assert!(!cache.reclaim(1));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_stats() {
        let cache = CodeCache::default();
        cache.lookup(1);
        cache.install(1, 0x1000, &[]);
        cache.lookup(1);
        cache.lookup(2);
        cache.reclaim(1);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.installs, 1);
        assert_eq!(stats.reclaims, 1);
        assert_eq!(stats.entries, 0);
        assert!((stats.hit_rate() - 1.0 / 3.0).abs() < 1e-9);
    }
}
