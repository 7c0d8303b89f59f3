//! Events
//!
//! Events are the only channel through which a run becomes observable.
//! They are created once, never mutated, and fanned out to handlers.

pub mod abi;
mod bus;
pub mod fallback;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::config::Configuration;
use crate::models::{Case, CaseId, Issue, SkipInfo, SourceLocation, Test, TestId};
use crate::planner::Plan;
use crate::utils::Instant;

pub use bus::EventBus;

/// Result of one `expect`/`require` check
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Expectation {
    pub is_passing: bool,
    pub is_required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub source_location: SourceLocation,
}

/// A named blob attached to a test
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub preferred_name: String,
    pub bytes: Vec<u8>,
}

/// Every kind of occurrence a run can report
#[derive(Clone, Debug, PartialEq)]
pub enum EventKind {
    RunStarted,
    IterationStarted(usize),
    TestStarted,
    TestCaseStarted,
    ExpectationChecked(Expectation),
    IssueRecorded(Issue),
    ValueAttached(Attachment),
    MessageLogged(String),
    TestCaseEnded,
    TestCaseCancelled(SkipInfo),
    TestEnded,
    TestSkipped(SkipInfo),
    TestCancelled(SkipInfo),
    IterationEnded(usize),
    RunEnded,
}

impl EventKind {
    /// Wire name of this kind
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::RunStarted => "runStarted",
            EventKind::IterationStarted(_) => "iterationStarted",
            EventKind::TestStarted => "testStarted",
            EventKind::TestCaseStarted => "testCaseStarted",
            EventKind::ExpectationChecked(_) => "expectationChecked",
            EventKind::IssueRecorded(_) => "issueRecorded",
            EventKind::ValueAttached(_) => "valueAttached",
            EventKind::MessageLogged(_) => "messageLogged",
            EventKind::TestCaseEnded => "testCaseEnded",
            EventKind::TestCaseCancelled(_) => "testCaseCancelled",
            EventKind::TestEnded => "testEnded",
            EventKind::TestSkipped(_) => "testSkipped",
            EventKind::TestCancelled(_) => "testCancelled",
            EventKind::IterationEnded(_) => "iterationEnded",
            EventKind::RunEnded => "runEnded",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An immutable occurrence
#[derive(Clone, Debug, PartialEq)]
pub struct Event {
    pub kind: EventKind,
    pub test_id: Option<TestId>,
    pub test_case_id: Option<CaseId>,
    pub instant: Instant,
}

impl Event {
    pub fn new(kind: EventKind, test_id: Option<TestId>, test_case_id: Option<CaseId>) -> Self {
        Self {
            kind,
            test_id,
            test_case_id,
            instant: Instant::now(),
        }
    }

    /// An event not associated with any test
    pub fn global(kind: EventKind) -> Self {
        Self::new(kind, None, None)
    }
}

/// What a handler can see besides the event itself
#[derive(Clone, Copy, Default)]
pub struct EventContext<'a> {
    pub test: Option<&'a Test>,
    pub test_case: Option<&'a Case>,
    pub plan: Option<&'a Plan>,
    pub configuration: Option<&'a Configuration>,
}

impl<'a> EventContext<'a> {
    pub fn with_test(mut self, test: Option<&'a Test>) -> Self {
        self.test = test;
        self
    }

    pub fn with_case(mut self, case: Option<&'a Case>) -> Self {
        self.test_case = case;
        self
    }

    pub fn with_plan(mut self, plan: Option<&'a Plan>) -> Self {
        self.plan = plan;
        self
    }

    pub fn with_configuration(mut self, configuration: Option<&'a Configuration>) -> Self {
        self.configuration = configuration;
        self
    }
}

/// Receives events; may be called concurrently from parallel steps
pub type EventHandler = Arc<dyn Fn(&Event, &EventContext<'_>) + Send + Sync>;

/// Box a closure as an [`EventHandler`]
pub fn handler<F>(f: F) -> EventHandler
where
    F: Fn(&Event, &EventContext<'_>) + Send + Sync + 'static,
{
    Arc::new(f)
}
