//! End-to-End Assumption Tracking Tests
//!
//! Exercises the assumption registry together with the code cache,
//! including concurrent registration and invalidation.

use ember_core::JitError;
use ember_jit::runtime::{
    Assumption, AssumptionRegistry, CodeCache, DependentCode, InstalledCode, RuntimeConfig,
};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

// =============================================================================
// Test Helpers
// =============================================================================

fn init() {
    ember_core::logging::init_for_tests();
}

/// Dependent that counts how often it was invalidated.
#[derive(Debug, Default)]
struct CountingCode {
    version: AtomicU64,
    invalidations: AtomicU64,
}

impl DependentCode for CountingCode {
    fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    fn invalidate(&self) {
        self.invalidations.fetch_add(1, Ordering::Relaxed);
    }
}

// =============================================================================
// Scenarios
// =============================================================================

#[test]
fn test_single_invalidation_then_immediate_rejection() {
    init();
    let registry = AssumptionRegistry::new(RuntimeConfig::for_testing());
    let assumption = registry.create("Shape#12 has no setters");

    let first = Arc::new(CountingCode::default());
    let second = Arc::new(CountingCode::default());
    assert!(assumption.register_dependent(&first));
    assert!(assumption.register_dependent(&second));

    assert!(registry.invalidate("Shape#12 has no setters"));
    assert_eq!(first.invalidations.load(Ordering::Relaxed), 1);
    assert_eq!(second.invalidations.load(Ordering::Relaxed), 1);

    // Invalidating again is a no-op.
    assert!(!assumption.invalidate());
    assert_eq!(first.invalidations.load(Ordering::Relaxed), 1);

    let late = Arc::new(CountingCode::default());
    assert!(!assumption.register_dependent(&late));
    assert_eq!(late.invalidations.load(Ordering::Relaxed), 1);
    assert_eq!(assumption.dependent_count(), 0);
    assert!(matches!(
        assumption.check(),
        Err(JitError::InvalidAssumption { .. })
    ));
}

#[test]
fn test_stale_version_is_not_invalidated() {
    init();
    let assumption = Assumption::new("a");
    let code = Arc::new(CountingCode::default());
    assumption.register_dependent(&code);

    code.version.fetch_add(1, Ordering::AcqRel);
    assumption.invalidate();
    assert_eq!(code.invalidations.load(Ordering::Relaxed), 0);
}

#[test]
fn test_cache_reinstall_makes_old_registration_stale() {
    init();
    let config = RuntimeConfig::for_testing();
    let registry = Arc::new(AssumptionRegistry::new(config.clone()));
    let cache = CodeCache::with_registry(&config, Arc::clone(&registry));

    let old_fact = registry.create("old");
    let new_fact = registry.create("new");

    let code = cache.install(1, 0x1000, &[old_fact.clone()]);
    cache.install(1, 0x2000, &[new_fact.clone()]);

    // The first compilation was replaced; its assumption no longer applies.
    registry.invalidate("old");
    assert!(code.is_valid());
    assert_eq!(code.address(), 0x2000);

    registry.invalidate("new");
    assert!(!code.is_valid());
    assert_eq!(code.invalidation_count(), 1);
    assert_eq!(registry.stats().registrations, 2);
}

#[test]
fn test_reclaimed_code_is_skipped() {
    init();
    let config = RuntimeConfig::for_testing();
    let registry = Arc::new(AssumptionRegistry::new(config.clone()));
    let cache = CodeCache::with_registry(&config, Arc::clone(&registry));
    let fact = registry.create("fact");

    cache.install(7, 0x1000, &[fact.clone()]);
    assert!(cache.reclaim(7));
    assert_eq!(fact.dependent_count(), 1);

    assert!(registry.invalidate("fact"));
    assert!(cache.lookup(7).is_none());
}

#[test]
fn test_long_lived_assumption_stays_bounded() {
    init();
    let config = RuntimeConfig::for_testing();
    let cache = CodeCache::new(&config);
    let fact = Arc::new(Assumption::with_prune_threshold("fact", config.prune_threshold));

    // Every reinstall leaves the previous registration stale.
    for round in 0..200usize {
        cache.install(1, 0x1000 + round, &[fact.clone()]);
    }
    assert!(fact.dependent_count() <= config.prune_threshold);

    fact.invalidate();
    let code = cache.lookup(1).unwrap();
    assert!(!code.is_valid());
}

// =============================================================================
// Concurrency
// =============================================================================

#[test]
fn test_invalidation_visible_from_all_threads() {
    init();
    let assumption = Arc::new(Assumption::new("global"));
    let barrier = Arc::new(Barrier::new(5));
    let observed = Arc::new(AtomicBool::new(false));

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let assumption = Arc::clone(&assumption);
            let barrier = Arc::clone(&barrier);
            let observed = Arc::clone(&observed);
            thread::spawn(move || {
                barrier.wait();
                while assumption.check().is_ok() {
                    std::hint::spin_loop();
                }
                observed.store(true, Ordering::Relaxed);
                // Once invalid, never valid again.
                for _ in 0..1000 {
                    assert!(assumption.check().is_err());
                }
            })
        })
        .collect();

    barrier.wait();
    assert!(assumption.invalidate());
    for reader in readers {
        reader.join().unwrap();
    }
    assert!(observed.load(Ordering::Relaxed));
}

#[test]
fn test_registration_racing_invalidation_never_leaks() {
    init();
    for _ in 0..50 {
        let assumption = Arc::new(Assumption::with_prune_threshold("race", 8));
        let barrier = Arc::new(Barrier::new(5));

        let registrars: Vec<_> = (0..4)
            .map(|_| {
                let assumption = Arc::clone(&assumption);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    let mut codes = Vec::new();
                    for index in 0..64 {
                        let code = Arc::new(InstalledCode::new(format!("c{index}")));
                        code.install(0x1000 + index);
                        assumption.register_dependent(&code);
                        codes.push(code);
                    }
                    codes
                })
            })
            .collect();

        barrier.wait();
        assumption.invalidate();

        for registrar in registrars {
            let codes = registrar.join().unwrap();
            // Every registration either happened before the invalidation
            // (and was invalidated by it) or was rejected (and invalidated
            // itself). No code stays executable and none is hit twice.
            for code in codes {
                assert!(!code.is_valid());
                assert_eq!(code.invalidation_count(), 1);
            }
        }
        assert_eq!(assumption.dependent_count(), 0);
    }
}

#[test]
fn test_concurrent_registry_invalidation_happens_once() {
    init();
    let registry = Arc::new(AssumptionRegistry::new(RuntimeConfig::for_testing()));
    let assumption = registry.create("once");
    let code = Arc::new(CountingCode::default());
    assumption.register_dependent(&code);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let registry = Arc::clone(&registry);
            thread::spawn(move || registry.invalidate("once"))
        })
        .collect();
    let transitions = handles
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .filter(|&transitioned| transitioned)
        .count();

    assert_eq!(transitions, 1);
    assert_eq!(code.invalidations.load(Ordering::Relaxed), 1);
    assert_eq!(registry.stats().invalidations, 1);
}
