//! Expectation API used inside test bodies
//!
//! Every check reports through the task-local test context; outside a
//! running test the fallback handler receives the issue instead.

pub mod confirmation;
pub mod known_issue;
pub mod polling;

use std::fmt::Debug;

use crate::error::ExpectationFailedError;
use crate::events::{Attachment, EventKind, Expectation};
use crate::executor::{post, record, TestContext};
use crate::models::{Issue, IssueKind, Severity, SourceLocation};

pub use confirmation::{confirmation, Confirmation, ExpectedCount};
pub use known_issue::{with_known_issue, IssueMatcher, KnownIssue};
pub use polling::{confirm_always_passes, confirm_passes_eventually, PollingOptions};

pub(crate) fn check(
    is_passing: bool,
    is_required: bool,
    description: Option<String>,
    location: SourceLocation,
) -> bool {
    let deliver = TestContext::current()
        .is_some_and(|context| context.configuration().deliver_expectation_checked_events);
    if deliver {
        post(EventKind::ExpectationChecked(Expectation {
            is_passing,
            is_required,
            description: description.clone(),
            source_location: location.clone(),
        }));
    }
    if !is_passing {
        record(Issue::new(IssueKind::ExpectationFailed { description }, Some(location)));
    }
    is_passing
}

/// Record an `expectationFailed` issue unless `condition` holds.
///
/// Returns `condition` so callers can branch on it.
#[track_caller]
pub fn expect(condition: bool, description: impl Into<String>) -> bool {
    check(condition, false, Some(description.into()), SourceLocation::caller())
}

/// Expect `left == right`, describing both values on failure
#[track_caller]
pub fn expect_eq<T: PartialEq + Debug>(left: T, right: T) -> bool {
    let location = SourceLocation::caller();
    let passing = left == right;
    let description = (!passing).then(|| format!("{left:?} == {right:?}"));
    check(passing, false, description, location)
}

/// Like [`expect`], but stops the body when the condition fails.
///
/// ```ignore
/// require(!items.is_empty(), "items were loaded")?;
/// ```
#[track_caller]
pub fn require(
    condition: bool,
    description: impl Into<String>,
) -> Result<(), ExpectationFailedError> {
    let description = description.into();
    if check(condition, true, Some(description.clone()), SourceLocation::caller()) {
        Ok(())
    } else {
        Err(ExpectationFailedError {
            description: Some(description),
        })
    }
}

/// Unwrap `value` or record a failed requirement
#[track_caller]
pub fn require_some<T>(
    value: Option<T>,
    description: impl Into<String>,
) -> Result<T, ExpectationFailedError> {
    let location = SourceLocation::caller();
    let description = description.into();
    let passing = value.is_some();
    check(passing, true, Some(description.clone()), location);
    value.ok_or(ExpectationFailedError {
        description: Some(description),
    })
}

/// Record an unconditional issue
#[track_caller]
pub fn record_issue(comment: impl Into<String>) {
    record(Issue::new(IssueKind::Unconditional, Some(SourceLocation::caller())).with_comment(comment));
}

/// Record a warning; warnings never fail a run
#[track_caller]
pub fn record_warning(comment: impl Into<String>) {
    record(
        Issue::new(IssueKind::Unconditional, Some(SourceLocation::caller()))
            .with_comment(comment)
            .with_severity(Severity::Warning),
    );
}

/// Record an `errorCaught` issue for `error`
#[track_caller]
pub fn record_error(error: &anyhow::Error) {
    record(Issue::error_caught(error, Some(SourceLocation::caller())));
}

/// Attach a named value to the current test
pub fn attach(preferred_name: impl Into<String>, bytes: impl Into<Vec<u8>>) {
    post(EventKind::ValueAttached(Attachment {
        preferred_name: preferred_name.into(),
        bytes: bytes.into(),
    }));
}

/// Log a message against the current test
pub fn log_message(text: impl Into<String>) {
    post(EventKind::MessageLogged(text.into()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Configuration;
    use crate::events::testing::Collector;
    use crate::executor::CancellationToken;
    use crate::models::{Case, Test, TestId};
    use std::sync::Arc;

    fn context(collector: &Collector, configuration: Configuration) -> Arc<TestContext> {
        let configuration = configuration.with_event_handler(collector.handler());
        let test = Arc::new(Test::function(TestId::new(["T"]), || async { Ok(()) }));
        let token = CancellationToken::new();
        Arc::new(
            TestContext::detached(configuration)
                .with_test(test, token.clone())
                .with_case(Case::unparameterized(), token.child()),
        )
    }

    #[test]
    fn test_expect_records_failures_only() {
        let collector = Collector::default();
        context(&collector, Configuration::new()).sync_scope(|| {
            assert!(expect(1 + 1 == 2, "math works"));
            assert!(!expect(false, "never true"));
            assert!(!expect_eq("a", "b"));
        });

        let issues = collector.issues();
        assert_eq!(issues.len(), 2);
        assert_eq!(
            issues[0].kind,
            IssueKind::ExpectationFailed {
                description: Some("never true".to_string())
            }
        );
        assert!(issues[1].description().contains("\"a\" == \"b\""));
        assert!(!collector.names().contains(&"expectationChecked"));
    }

    #[test]
    fn test_require_returns_marker_error() {
        let collector = Collector::default();
        let result = context(&collector, Configuration::new())
            .sync_scope(|| require(false, "precondition"));

        let error = anyhow::Error::new(result.unwrap_err());
        assert!(crate::error::is_control_flow(&error));
        assert_eq!(collector.issues().len(), 1);
    }

    #[test]
    fn test_expectation_checked_events_are_opt_in() {
        let collector = Collector::default();
        let configuration = Configuration::new().with_expectation_checked_events(true);
        context(&collector, configuration).sync_scope(|| {
            expect(true, "one");
            let _ = require(true, "two");
        });

        assert_eq!(collector.names(), vec!["expectationChecked", "expectationChecked"]);
        assert!(collector.issues().is_empty());
    }

    #[test]
    fn test_attachments_and_messages() {
        let collector = Collector::default();
        context(&collector, Configuration::new()).sync_scope(|| {
            attach("payload.json", b"{}".to_vec());
            log_message("hello");
            record_warning("careful");
        });

        let events = collector.events();
        assert_eq!(events.len(), 3);
        assert!(matches!(&events[0].kind, EventKind::ValueAttached(a) if a.preferred_name == "payload.json"));
        assert_eq!(events[1].kind, EventKind::MessageLogged("hello".to_string()));
        assert!(!collector.issues()[0].is_failure());
    }

    #[test]
    fn test_record_error_keeps_the_error_chain() {
        let collector = Collector::default();
        let error = anyhow::anyhow!("socket closed").context("reading reply");
        context(&collector, Configuration::new()).sync_scope(|| record_error(&error));

        let issues = collector.issues();
        assert_eq!(issues.len(), 1);
        assert_eq!(
            issues[0].kind,
            IssueKind::ErrorCaught {
                description: "reading reply: socket closed".to_string()
            }
        );
        assert!(issues[0].source_location().is_some());
    }
}
