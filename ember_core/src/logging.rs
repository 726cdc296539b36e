//! Logger installation.
//!
//! Library code logs through the `log` facade with per-component targets
//! (`ember::schedule`, `ember::guard-lowering`, `ember::assumption`,
//! `ember::code-cache`). Embedders that do not install their own logger can
//! use [`init`] to get a `simplelog` logger on stderr.

use crate::error::{JitError, JitResult};
use log::LevelFilter;
use simplelog::SimpleLogger;
use std::sync::Once;

/// Install a `simplelog` logger at the given level.
///
/// Fails if a logger has already been installed for this process.
pub fn init(level: LevelFilter) -> JitResult<()> {
    SimpleLogger::init(level, simplelog::Config::default()).map_err(|err| JitError::Logger {
        message: err.to_string(),
    })
}

/// Install a trace-level logger once per process, ignoring later calls.
pub fn init_for_tests() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = SimpleLogger::init(LevelFilter::Trace, simplelog::Config::default());
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_for_tests_is_idempotent() {
        init_for_tests();
        init_for_tests();
        log::trace!(target: "ember::test", "logger installed");
        assert!(init(LevelFilter::Info).is_err());
    }
}
