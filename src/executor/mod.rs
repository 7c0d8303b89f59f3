//! Test execution engine
//!
//! Runs planned steps with cancellation, concurrency limits and task-local
//! test context.

mod cancel;
pub mod context;
mod parallel;
mod runner;

pub use cancel::CancellationToken;
pub use context::{cancel_case, cancel_test, post, record, IssueTally, TestContext};
pub use parallel::ParallelPolicy;
pub use runner::{RunOutcome, Runner};
