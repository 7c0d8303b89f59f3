//! Exit tests
//!
//! An exit test runs a registered body in a fresh copy of the host process
//! so that process-fatal outcomes (an explicit exit, an abort, a signal)
//! become values the parent can check.
//!
//! The parent side is [`expect_exit`]/[`require_exit`], which hand the test
//! to the configured [`ExitTestHandler`]. [`ProcessSpawner`] is the
//! standard handler. The child side is [`ReentryRequest`], which the host
//! binary checks for before doing anything else.

mod capture;
mod condition;
mod reentry;
mod supervisor;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use tracing::{debug, warn};

use crate::error::{ExitTestError, ExpectationFailedError};
use crate::events::EventKind;
use crate::executor::{post, record, CancellationToken, TestContext};
use crate::expect::check;
use crate::models::{Issue, IssueKind, SourceLocation};

pub use capture::CapturedValues;
pub use condition::ExitCondition;
pub use reentry::{ExitTestBody, ExitTestRegistry, ReentryRequest};
pub use supervisor::ProcessSpawner;

/// Environment variable naming the exit test a child should run
pub const ID_VAR: &str = "TEST_CONDUCTOR_EXIT_TEST_ID";
/// Environment variable holding the path of the capture blob
pub const CAPTURES_VAR: &str = "TEST_CONDUCTOR_EXIT_TEST_CAPTURES";
/// Environment variable holding the path of the back channel
pub const BACKCHANNEL_VAR: &str = "TEST_CONDUCTOR_EXIT_TEST_BACKCHANNEL";
/// Environment variable holding the ABI version of the back channel
pub const ABI_VERSION_VAR: &str = "TEST_CONDUCTOR_EXIT_TEST_ABI_VERSION";

/// Identifies a registered exit-test body
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ExitTestId(String);

impl ExitTestId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExitTestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ExitTestId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// One invocation of an exit test
#[derive(Clone, Debug)]
pub struct ExitTest {
    pub id: ExitTestId,
    pub captures: CapturedValues,
    pub observe_stdout: bool,
    pub observe_stderr: bool,
}

impl ExitTest {
    pub fn new(id: impl Into<ExitTestId>) -> Self {
        Self {
            id: id.into(),
            captures: CapturedValues::default(),
            observe_stdout: false,
            observe_stderr: false,
        }
    }

    pub fn with_captures(mut self, captures: CapturedValues) -> Self {
        self.captures = captures;
        self
    }

    /// Collect the child's standard output
    pub fn observing_stdout(mut self) -> Self {
        self.observe_stdout = true;
        self
    }

    /// Collect the child's standard error
    pub fn observing_stderr(mut self) -> Self {
        self.observe_stderr = true;
        self
    }
}

/// What the parent learned about a finished exit test
#[derive(Clone, Debug, PartialEq)]
pub struct ExitTestArtifacts {
    pub exit_condition: ExitCondition,
    /// Empty unless the test observed stdout
    pub stdout: Vec<u8>,
    /// Empty unless the test observed stderr
    pub stderr: Vec<u8>,
    /// Events the child raised, in order
    pub forwarded: Vec<EventKind>,
}

impl ExitTestArtifacts {
    pub fn new(exit_condition: ExitCondition) -> Self {
        Self {
            exit_condition,
            stdout: Vec::new(),
            stderr: Vec::new(),
            forwarded: Vec::new(),
        }
    }

    /// Issues the child recorded
    pub fn forwarded_issues(&self) -> impl Iterator<Item = &Issue> {
        self.forwarded.iter().filter_map(|kind| match kind {
            EventKind::IssueRecorded(issue) => Some(issue),
            _ => None,
        })
    }

    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// Launches exit tests on behalf of a run
pub trait ExitTestHandler: Send + Sync {
    /// Run `test` to completion. Cancelling `token` must still reap the child.
    fn launch<'a>(
        &'a self,
        test: &'a ExitTest,
        token: CancellationToken,
    ) -> BoxFuture<'a, Result<ExitTestArtifacts, ExitTestError>>;
}

/// Replay what the child raised as if it happened here
fn forward(artifacts: &ExitTestArtifacts) {
    for kind in &artifacts.forwarded {
        match kind {
            EventKind::IssueRecorded(issue) => record(issue.clone()),
            EventKind::ValueAttached(_) | EventKind::MessageLogged(_) => post(kind.clone()),
            other => debug!("Not forwarding child {} event", other),
        }
    }
}

fn system_issue(test: &ExitTest, error: &ExitTestError, location: SourceLocation) -> Issue {
    Issue::new(IssueKind::System, Some(location))
        .with_comment(error.to_string())
        .with_comment(format!("Exit test '{}'", test.id))
}

async fn run_exit_test(
    test: ExitTest,
    expected: ExitCondition,
    is_required: bool,
    location: SourceLocation,
) -> (ExitTestArtifacts, bool) {
    let context = TestContext::current();
    let token = context
        .as_ref()
        .map(|context| context.token().clone())
        .unwrap_or_default();
    let handler = context
        .as_ref()
        .and_then(|context| context.configuration().exit_test_handler.clone());

    let Some(handler) = handler else {
        record(system_issue(&test, &ExitTestError::HandlerMissing, location));
        return (ExitTestArtifacts::new(ExitCondition::Failure), false);
    };

    debug!("Launching exit test {}", test.id);
    let artifacts = match handler.launch(&test, token).await {
        Ok(artifacts) => artifacts,
        Err(ExitTestError::Cancelled) => {
            debug!("Exit test {} cancelled", test.id);
            return (ExitTestArtifacts::new(ExitCondition::Failure), false);
        }
        Err(e) => {
            warn!("Exit test {} could not run: {e}", test.id);
            record(system_issue(&test, &e, location));
            return (ExitTestArtifacts::new(ExitCondition::Failure), false);
        }
    };

    forward(&artifacts);
    let observed = artifacts.exit_condition;
    let passed = expected.matches(&observed);
    let description = (!passed).then(|| {
        format!("Expected exit test '{}' to exit with {expected}, but it exited with {observed}", test.id)
    });
    check(passed, is_required, description, location);
    (artifacts, passed)
}

/// Run `test` in a child process and expect it to end with `expected`.
///
/// A mismatch records `expectationFailed`; a child that cannot be launched
/// records a `system` issue and reports [`ExitCondition::Failure`].
#[track_caller]
pub fn expect_exit(test: ExitTest, expected: ExitCondition) -> impl Future<Output = ExitTestArtifacts> {
    let location = SourceLocation::caller();
    async move { run_exit_test(test, expected, false, location).await.0 }
}

/// Like [`expect_exit`], but fails the body when the expectation fails
#[track_caller]
pub fn require_exit(
    test: ExitTest,
    expected: ExitCondition,
) -> impl Future<Output = Result<ExitTestArtifacts, ExpectationFailedError>> {
    let location = SourceLocation::caller();
    async move {
        let id = test.id.clone();
        match run_exit_test(test, expected, true, location).await {
            (artifacts, true) => Ok(artifacts),
            (_, false) => Err(ExpectationFailedError {
                description: Some(format!("exit test '{id}' exited with {expected}")),
            }),
        }
    }
}
