//! Issue model
//!
//! Issues are created at the point of failure and only travel forward
//! through the event bus.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::test::SourceLocation;

/// What went wrong
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "details", rename_all = "camelCase")]
pub enum IssueKind {
    ExpectationFailed {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    ErrorCaught {
        description: String,
    },
    ApiMisused,
    ConfirmationMiscounted {
        actual: usize,
        expected: String,
    },
    Unconditional,
    System,
    KnownIssueNotRecorded,
    TimeLimitExceeded {
        milliseconds: u64,
    },
    PollingConfirmationFailed,
}

impl IssueKind {
    /// Whether an active known-issue scope may claim this kind
    pub fn can_be_known(&self) -> bool {
        !matches!(
            self,
            IssueKind::System | IssueKind::ApiMisused | IssueKind::KnownIssueNotRecorded
        )
    }

    /// Short machine-friendly name
    pub fn name(&self) -> &'static str {
        match self {
            IssueKind::ExpectationFailed { .. } => "expectationFailed",
            IssueKind::ErrorCaught { .. } => "errorCaught",
            IssueKind::ApiMisused => "apiMisused",
            IssueKind::ConfirmationMiscounted { .. } => "confirmationMiscounted",
            IssueKind::Unconditional => "unconditional",
            IssueKind::System => "system",
            IssueKind::KnownIssueNotRecorded => "knownIssueNotRecorded",
            IssueKind::TimeLimitExceeded { .. } => "timeLimitExceeded",
            IssueKind::PollingConfirmationFailed => "pollingConfirmationFailed",
        }
    }
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IssueKind::ExpectationFailed {
                description: Some(description),
            } => write!(f, "Expectation failed: {description}"),
            IssueKind::ExpectationFailed { description: None } => write!(f, "Expectation failed"),
            IssueKind::ErrorCaught { description } => write!(f, "Caught error: {description}"),
            IssueKind::ApiMisused => write!(f, "An API was misused"),
            IssueKind::ConfirmationMiscounted { actual, expected } => write!(
                f,
                "Confirmation was confirmed {actual} time(s), but expected {expected}"
            ),
            IssueKind::Unconditional => write!(f, "Issue recorded"),
            IssueKind::System => write!(f, "A system failure occurred"),
            IssueKind::KnownIssueNotRecorded => {
                write!(f, "Known issue was not recorded")
            }
            IssueKind::TimeLimitExceeded { milliseconds } => {
                write!(f, "Time limit was exceeded: {:.3} seconds", *milliseconds as f64 / 1000.0)
            }
            IssueKind::PollingConfirmationFailed => {
                write!(f, "Polling confirmation failed")
            }
        }
    }
}

/// Issue severity; only `Error` can fail a run
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    #[default]
    Error,
}

/// Where an issue came from
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_location: Option<SourceLocation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backtrace: Option<String>,
}

/// A recorded failure or warning
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
    pub kind: IssueKind,
    pub severity: Severity,
    pub is_known: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub comments: Vec<String>,
    #[serde(default)]
    pub source_context: SourceContext,
}

impl Issue {
    pub fn new(kind: IssueKind, source_location: Option<SourceLocation>) -> Self {
        Self {
            kind,
            severity: Severity::Error,
            is_known: false,
            comments: Vec::new(),
            source_context: SourceContext {
                source_location,
                backtrace: None,
            },
        }
    }

    /// An `errorCaught` issue describing `error`
    pub fn error_caught(error: &anyhow::Error, source_location: Option<SourceLocation>) -> Self {
        let backtrace = error.backtrace();
        let mut issue = Self::new(
            IssueKind::ErrorCaught {
                description: format!("{error:#}"),
            },
            source_location,
        );
        if backtrace.status() == std::backtrace::BacktraceStatus::Captured {
            issue.source_context.backtrace = Some(backtrace.to_string());
        }
        issue
    }

    /// A `system` issue with a comment
    pub fn system(comment: impl Into<String>) -> Self {
        Self::new(IssueKind::System, None).with_comment(comment)
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comments.push(comment.into());
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    /// True if this issue fails the run
    pub fn is_failure(&self) -> bool {
        !self.is_known && self.severity == Severity::Error
    }

    pub fn source_location(&self) -> Option<&SourceLocation> {
        self.source_context.source_location.as_ref()
    }

    /// One-line description including comments
    pub fn description(&self) -> String {
        let mut text = self.kind.to_string();
        for comment in &self.comments {
            text.push_str(" - ");
            text.push_str(comment);
        }
        text
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())?;
        if let Some(location) = self.source_location() {
            write!(f, " at {location}")?;
        }
        Ok(())
    }
}
