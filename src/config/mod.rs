//! Configuration module
//!
//! The runtime `Configuration` a run executes under, plus the file and
//! environment layers the host binary builds it from.

pub mod env;
pub mod file;
pub mod profile;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::ConfigError;
use crate::events::{Event, EventContext, EventHandler};
use crate::exit_test::ExitTestHandler;
use crate::planner::TestFilter;

/// When to start another iteration of the plan
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Continuation {
    /// Always run up to the maximum
    #[default]
    Always,
    /// Repeat while the previous iteration failed
    WhileIssueRecorded,
    /// Repeat until an iteration fails
    UntilIssueRecorded,
}

impl Continuation {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "always" => Some(Continuation::Always),
            "while_issue_recorded" | "while_failing" => Some(Continuation::WhileIssueRecorded),
            "until_issue_recorded" | "until_failing" => Some(Continuation::UntilIssueRecorded),
            _ => None,
        }
    }
}

/// How many times the plan runs
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RepetitionPolicy {
    maximum_iterations: usize,
    continuation: Continuation,
}

impl Default for RepetitionPolicy {
    fn default() -> Self {
        Self::once()
    }
}

impl RepetitionPolicy {
    pub fn once() -> Self {
        Self {
            maximum_iterations: 1,
            continuation: Continuation::Always,
        }
    }

    pub fn new(maximum_iterations: usize, continuation: Continuation) -> Result<Self, ConfigError> {
        if maximum_iterations == 0 {
            return Err(ConfigError::InvalidRepetition(
                "iterations must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            maximum_iterations,
            continuation,
        })
    }

    pub fn maximum_iterations(&self) -> usize {
        self.maximum_iterations
    }

    pub fn continuation(&self) -> Continuation {
        self.continuation
    }

    /// Whether another iteration should start after `completed` iterations
    pub fn should_continue(&self, completed: usize, issue_recorded: bool) -> bool {
        if completed >= self.maximum_iterations {
            return false;
        }
        match self.continuation {
            Continuation::Always => true,
            Continuation::WhileIssueRecorded => issue_recorded,
            Continuation::UntilIssueRecorded => !issue_recorded,
        }
    }
}

/// Settings a run executes under
#[derive(Clone)]
pub struct Configuration {
    /// Receives every event of the run
    pub event_handler: Option<EventHandler>,

    /// Selects which tests run
    pub filter: TestFilter,

    /// Run unrelated steps concurrently
    pub parallel: bool,

    /// Maximum test functions running at once
    pub max_concurrent: usize,

    /// Time limit for cases without a time limit trait
    pub default_time_limit: Option<Duration>,

    pub repetition_policy: RepetitionPolicy,

    /// Post `expectationChecked` for every `expect` and `require`
    pub deliver_expectation_checked_events: bool,

    /// Launches exit tests; exit tests record a system issue without one
    pub exit_test_handler: Option<Arc<dyn ExitTestHandler>>,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            event_handler: None,
            filter: TestFilter::all(),
            parallel: true,
            max_concurrent: default_max_concurrent(),
            default_time_limit: None,
            repetition_policy: RepetitionPolicy::once(),
            deliver_expectation_checked_events: false,
            exit_test_handler: None,
        }
    }
}

fn default_max_concurrent() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

impl Configuration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_event_handler(mut self, handler: EventHandler) -> Self {
        self.event_handler = Some(handler);
        self
    }

    pub fn with_filter(mut self, filter: TestFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    pub fn with_default_time_limit(mut self, limit: Duration) -> Self {
        self.default_time_limit = Some(limit);
        self
    }

    pub fn with_repetition_policy(mut self, policy: RepetitionPolicy) -> Self {
        self.repetition_policy = policy;
        self
    }

    pub fn with_expectation_checked_events(mut self, deliver: bool) -> Self {
        self.deliver_expectation_checked_events = deliver;
        self
    }

    pub fn with_exit_test_handler(mut self, handler: Arc<dyn ExitTestHandler>) -> Self {
        self.exit_test_handler = Some(handler);
        self
    }

    /// Deliver `event` to this configuration's handler
    pub fn post(&self, event: &Event, context: &EventContext<'_>) {
        if let Some(handler) = &self.event_handler {
            handler(event, context);
        }
    }
}

impl fmt::Debug for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Configuration")
            .field("has_event_handler", &self.event_handler.is_some())
            .field("filter", &self.filter)
            .field("parallel", &self.parallel)
            .field("max_concurrent", &self.max_concurrent)
            .field("default_time_limit", &self.default_time_limit)
            .field("repetition_policy", &self.repetition_policy)
            .field(
                "deliver_expectation_checked_events",
                &self.deliver_expectation_checked_events,
            )
            .field("has_exit_test_handler", &self.exit_test_handler.is_some())
            .finish()
    }
}
