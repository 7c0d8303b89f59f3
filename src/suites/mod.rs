//! Bundled suites
//!
//! Self-check suites the host binary plans and runs, plus the exit-test
//! bodies it can be re-entered to run.

mod engine;
mod processes;

use crate::models::TestRegistry;

pub use processes::exit_tests;

/// Every bundled test and suite
pub fn registry() -> TestRegistry {
    let mut registry = TestRegistry::new();
    registry.extend(engine::tests());
    registry.extend(processes::tests());
    registry
}
