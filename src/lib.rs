//! Test Conductor - test planning, scheduling and reporting engine
//!
//! Plans a graph of suites and test functions against a filter, runs the
//! resulting steps concurrently with cancellation and time limits, and
//! reports every occurrence as an event that recorders render as console
//! lines, JUnit XML or versioned JSON-lines records.
//!
//! ## Features
//!
//! - Trait-driven planning: conditions, tags, serialization, time limits and
//!   custom execution scopes
//! - Parallel or serial execution with a concurrency limit and repetition
//! - Expectations, known issues, confirmations and polling confirmations
//! - Exit tests that run a body in a child process and check how it ended
//!
//! ## Usage
//!
//! ```ignore
//! use test_conductor::{Configuration, Runner, Test, TestId};
//! use test_conductor::expect::expect;
//!
//! let tests = vec![Test::function(TestId::new(["Math", "adds"]), || async {
//!     expect(1 + 1 == 2, "addition works");
//!     Ok(())
//! })];
//! let outcome = Runner::new(tests, Configuration::new()).await.run().await;
//! assert!(!outcome.is_failure());
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod events;
pub mod executor;
pub mod exit_test;
pub mod expect;
pub mod models;
pub mod output;
pub mod planner;
pub mod suites;
pub mod utils;

pub use config::Configuration;
pub use error::{AbiError, ConfigError, ExitTestError, ExpectationFailedError};
pub use events::{Event, EventContext, EventHandler, EventKind};
pub use executor::{RunOutcome, Runner};
pub use models::{Issue, IssueKind, Test, TestId, TestRegistry, Trait};
pub use planner::{Plan, TestFilter};
