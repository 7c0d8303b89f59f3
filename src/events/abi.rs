//! ABI records
//!
//! Versioned JSON-lines records (`{"version", "kind", "payload"}`) used to
//! stream events to external tools and to forward events out of exit-test
//! child processes. Payload shapes only ever grow; decoders ignore fields
//! they do not know.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::ops::RangeInclusive;
use std::sync::Arc;
use tracing::warn;

use crate::error::{AbiError, ConfigError};
use crate::models::{CaseId, Issue, IssueKind, Severity, SkipInfo, SourceContext, SourceLocation, Tag, Test, TestId};
use crate::utils::Instant;

use super::{Attachment, Event, EventHandler, EventKind, Expectation};

/// Versions this build can produce and consume
pub const SUPPORTED_VERSIONS: RangeInclusive<u32> = 0..=1;

/// Version produced when none is requested
pub const CURRENT_VERSION: u32 = 1;

/// Reject a stream version before any record is produced
pub fn check_version(version: u32) -> Result<(), ConfigError> {
    if SUPPORTED_VERSIONS.contains(&version) {
        Ok(())
    } else {
        Err(ConfigError::UnsupportedAbiVersion {
            requested: version,
            minimum: *SUPPORTED_VERSIONS.start(),
            maximum: *SUPPORTED_VERSIONS.end(),
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Test,
    Event,
}

impl RecordKind {
    fn name(self) -> &'static str {
        match self {
            RecordKind::Test => "test",
            RecordKind::Event => "event",
        }
    }
}

/// Versioned envelope
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub version: u32,
    pub kind: RecordKind,
    pub payload: serde_json::Value,
}

impl Record {
    fn new(version: u32, kind: RecordKind, payload: impl Serialize) -> Result<Self, AbiError> {
        if !SUPPORTED_VERSIONS.contains(&version) {
            return Err(AbiError::UnsupportedVersion(version));
        }
        Ok(Self {
            version,
            kind,
            payload: serde_json::to_value(payload)?,
        })
    }

    pub fn test(test: &Test, version: u32) -> Result<Self, AbiError> {
        Self::new(version, RecordKind::Test, EncodedTest::new(test, version))
    }

    pub fn event(event: &Event, version: u32) -> Result<Self, AbiError> {
        Self::new(version, RecordKind::Event, EncodedEvent::new(event, version))
    }

    /// Encode as a single line without the trailing newline
    pub fn encode_line(&self) -> Result<String, AbiError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode_line(line: &str) -> Result<Self, AbiError> {
        let record: Record = serde_json::from_str(line.trim())?;
        if !SUPPORTED_VERSIONS.contains(&record.version) {
            return Err(AbiError::UnsupportedVersion(record.version));
        }
        Ok(record)
    }

    fn expect_kind(&self, expected: RecordKind) -> Result<(), AbiError> {
        if self.kind == expected {
            Ok(())
        } else {
            Err(AbiError::UnexpectedKind {
                expected: expected.name(),
                found: self.kind.name(),
            })
        }
    }

    /// Decode the payload of a `test` record using this record's version
    pub fn decode_test(&self) -> Result<EncodedTest, AbiError> {
        self.expect_kind(RecordKind::Test)?;
        let mut test: EncodedTest = serde_json::from_value(self.payload.clone())?;
        test.restrict_to(self.version);
        Ok(test)
    }

    /// Decode the payload of an `event` record using this record's version
    pub fn decode_event(&self) -> Result<EncodedEvent, AbiError> {
        self.expect_kind(RecordKind::Event)?;
        let mut event: EncodedEvent = serde_json::from_value(self.payload.clone())?;
        if let Some(issue) = &mut event.issue {
            issue.restrict_to(self.version);
        }
        Ok(event)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncodedTestKind {
    Suite,
    Function,
}

/// Payload of a `test` record
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodedTest {
    pub kind: EncodedTestKind,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub id: TestId,
    pub source_location: SourceLocation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_parameterized: Option<bool>,
    /// Since version 1
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<Tag>>,
}

impl EncodedTest {
    pub fn new(test: &Test, version: u32) -> Self {
        let mut encoded = Self {
            kind: if test.is_suite() {
                EncodedTestKind::Suite
            } else {
                EncodedTestKind::Function
            },
            name: test.name().to_string(),
            display_name: (test.display_name() != test.name())
                .then(|| test.display_name().to_string()),
            id: test.id().clone(),
            source_location: test.source_location().clone(),
            is_parameterized: (!test.is_suite()).then(|| test.is_parameterized()),
            tags: Some(test.tags()),
        };
        encoded.restrict_to(version);
        encoded
    }

    fn restrict_to(&mut self, version: u32) {
        if version < 1 {
            self.tags = None;
        }
    }
}

/// Wire form of an [`Issue`]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodedIssue {
    pub kind: IssueKind,
    pub is_known: bool,
    /// Since version 1
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    /// Since version 1
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_failure: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub comments: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_location: Option<SourceLocation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backtrace: Option<String>,
}

impl EncodedIssue {
    pub fn new(issue: &Issue, version: u32) -> Self {
        let mut encoded = Self {
            kind: issue.kind.clone(),
            is_known: issue.is_known,
            severity: Some(issue.severity),
            is_failure: Some(issue.is_failure()),
            comments: issue.comments.clone(),
            source_location: issue.source_context.source_location.clone(),
            backtrace: issue.source_context.backtrace.clone(),
        };
        encoded.restrict_to(version);
        encoded
    }

    fn restrict_to(&mut self, version: u32) {
        if version < 1 {
            self.severity = None;
            self.is_failure = None;
        }
    }

    /// Rebuild the issue; a missing severity means `Error`
    pub fn to_issue(&self) -> Issue {
        Issue {
            kind: self.kind.clone(),
            severity: self.severity.unwrap_or_default(),
            is_known: self.is_known,
            comments: self.comments.clone(),
            source_context: SourceContext {
                source_location: self.source_location.clone(),
                backtrace: self.backtrace.clone(),
            },
        }
    }
}

/// Wire form of an [`Instant`]
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct EncodedInstant {
    pub absolute: f64,
    #[serde(rename = "since1970")]
    pub since_1970: f64,
}

/// Payload of an `event` record
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodedEvent {
    pub kind: String,
    pub instant: EncodedInstant,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_id: Option<TestId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_case_id: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iteration: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue: Option<EncodedIssue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_info: Option<SkipInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment: Option<Attachment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expectation: Option<Expectation>,
}

impl EncodedEvent {
    pub fn new(event: &Event, version: u32) -> Self {
        let mut encoded = Self {
            kind: event.kind.name().to_string(),
            instant: EncodedInstant {
                absolute: event.instant.uptime_secs(),
                since_1970: event.instant.since_1970(),
            },
            test_id: event.test_id.clone(),
            test_case_id: event.test_case_id.map(|id| id.0),
            iteration: None,
            issue: None,
            skip_info: None,
            message: None,
            attachment: None,
            expectation: None,
        };
        match &event.kind {
            EventKind::IterationStarted(index) | EventKind::IterationEnded(index) => {
                encoded.iteration = Some(*index)
            }
            EventKind::IssueRecorded(issue) => {
                encoded.issue = Some(EncodedIssue::new(issue, version))
            }
            EventKind::TestSkipped(info)
            | EventKind::TestCancelled(info)
            | EventKind::TestCaseCancelled(info) => encoded.skip_info = Some(info.clone()),
            EventKind::MessageLogged(message) => encoded.message = Some(message.clone()),
            EventKind::ValueAttached(attachment) => encoded.attachment = Some(attachment.clone()),
            EventKind::ExpectationChecked(expectation) => {
                encoded.expectation = Some(expectation.clone())
            }
            _ => {}
        }
        encoded
    }

    /// Rebuild the in-process event
    pub fn to_event(&self) -> Result<Event, AbiError> {
        let missing = || AbiError::UnknownEventKind(format!("{} (incomplete payload)", self.kind));
        let skip_info = || self.skip_info.clone().unwrap_or_default();
        let kind = match self.kind.as_str() {
            "runStarted" => EventKind::RunStarted,
            "iterationStarted" => EventKind::IterationStarted(self.iteration.ok_or_else(missing)?),
            "testStarted" => EventKind::TestStarted,
            "testCaseStarted" => EventKind::TestCaseStarted,
            "expectationChecked" => {
                EventKind::ExpectationChecked(self.expectation.clone().ok_or_else(missing)?)
            }
            "issueRecorded" => EventKind::IssueRecorded(
                self.issue.as_ref().ok_or_else(missing)?.to_issue(),
            ),
            "valueAttached" => {
                EventKind::ValueAttached(self.attachment.clone().ok_or_else(missing)?)
            }
            "messageLogged" => EventKind::MessageLogged(self.message.clone().ok_or_else(missing)?),
            "testCaseEnded" => EventKind::TestCaseEnded,
            "testCaseCancelled" => EventKind::TestCaseCancelled(skip_info()),
            "testEnded" => EventKind::TestEnded,
            "testSkipped" => EventKind::TestSkipped(skip_info()),
            "testCancelled" => EventKind::TestCancelled(skip_info()),
            "iterationEnded" => EventKind::IterationEnded(self.iteration.ok_or_else(missing)?),
            "runEnded" => EventKind::RunEnded,
            other => return Err(AbiError::UnknownEventKind(other.to_string())),
        };
        Ok(Event {
            kind,
            test_id: self.test_id.clone(),
            test_case_id: self.test_case_id.map(CaseId),
            instant: Instant::from_parts(self.instant.absolute, self.instant.since_1970),
        })
    }
}

/// Handler writing every event (and, on `runStarted`, every planned test)
/// as one ABI record per line.
///
/// Fails before producing anything if `version` is unsupported.
pub fn abi_handler<W>(writer: W, version: u32) -> Result<EventHandler, ConfigError>
where
    W: Write + Send + 'static,
{
    check_version(version)?;
    let writer = Mutex::new(writer);
    Ok(Arc::new(move |event, context| {
        let mut writer = writer.lock();
        if event.kind == EventKind::RunStarted {
            if let Some(plan) = context.plan {
                for step in plan.steps() {
                    write_record(&mut *writer, Record::test(&step.test, version));
                }
            }
        }
        write_record(&mut *writer, Record::event(event, version));
    }))
}

fn write_record(writer: &mut dyn Write, record: Result<Record, AbiError>) {
    let line = match record.and_then(|record| record.encode_line()) {
        Ok(line) => line,
        Err(e) => {
            warn!("Failed to encode ABI record: {e}");
            return;
        }
    };
    if let Err(e) = writeln!(writer, "{line}").and_then(|_| writer.flush()) {
        warn!("Failed to write ABI record: {e}");
    }
}
