//! Static test registration
//!
//! The registry is the discovery source handed to the planner.

use std::collections::HashSet;
use tracing::debug;

use super::test::{Test, TestId};

/// Ordered collection of declared tests; duplicate ids collapse to the first
#[derive(Debug, Default)]
pub struct TestRegistry {
    tests: Vec<Test>,
    seen: HashSet<TestId>,
}

impl TestRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a test, returning false if its id was already registered
    pub fn register(&mut self, test: Test) -> bool {
        if !self.seen.insert(test.id().clone()) {
            debug!("Ignoring duplicate registration of {}", test.id());
            return false;
        }
        self.tests.push(test);
        true
    }

    pub fn with(mut self, test: Test) -> Self {
        self.register(test);
        self
    }

    pub fn extend(&mut self, tests: impl IntoIterator<Item = Test>) {
        for test in tests {
            self.register(test);
        }
    }

    pub fn tests(&self) -> &[Test] {
        &self.tests
    }

    pub fn into_tests(self) -> Vec<Test> {
        self.tests
    }

    pub fn len(&self) -> usize {
        self.tests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }
}
