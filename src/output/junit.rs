//! JUnit XML recorder
//!
//! Accumulates test records and writes one `<testsuites>` document when the
//! run ends.

use parking_lot::Mutex;
use std::fmt::Write as _;
use std::io::Write;
use std::time::Duration;
use tracing::warn;

use crate::events::{handler, Event, EventContext, EventHandler, EventKind};
use crate::models::{RunSummary, TestRecord, TestStatus};
use crate::utils::format_seconds;

use super::summary::SummaryRecorder;

/// Writes a JUnit document for the run on `runEnded`
pub struct JUnitRecorder {
    writer: Mutex<Box<dyn Write + Send>>,
    summary: SummaryRecorder,
}

impl JUnitRecorder {
    pub fn new(writer: impl Write + Send + 'static) -> Self {
        Self {
            writer: Mutex::new(Box::new(writer)),
            summary: SummaryRecorder::new(),
        }
    }

    pub fn summary(&self) -> SummaryRecorder {
        self.summary.clone()
    }

    pub fn into_handler(self) -> EventHandler {
        handler(move |event, context| self.record(event, context))
    }

    fn record(&self, event: &Event, context: &EventContext<'_>) {
        self.summary.record(event, context);
        if !matches!(event.kind, EventKind::RunEnded) {
            return;
        }
        let document = render_junit(&self.summary.summary());
        let mut writer = self.writer.lock();
        let written = writer.write_all(document.as_bytes());
        if let Err(e) = written.and_then(|()| writer.flush()) {
            warn!("Failed to write JUnit report: {e}");
        }
    }
}

/// Render a run summary as a JUnit XML document
pub fn render_junit(summary: &RunSummary) -> String {
    let mut output = String::new();

    output.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    output.push_str("<testsuites>\n");
    let _ = writeln!(
        output,
        "  <testsuite name=\"TestResults\" tests=\"{}\" failures=\"{}\" skipped=\"{}\" time=\"{}\">",
        summary.total(),
        summary.failed(),
        summary.skipped(),
        format_seconds(Duration::from_millis(summary.total_duration_ms)),
    );

    for record in summary.tests() {
        write_testcase(&mut output, record);
    }

    output.push_str("  </testsuite>\n");
    output.push_str("</testsuites>\n");

    output
}

fn write_testcase(output: &mut String, record: &TestRecord) {
    let classname = record
        .id
        .parent()
        .map(|parent| parent.name_path().join("."))
        .unwrap_or_default();
    let _ = write!(
        output,
        "    <testcase classname=\"{}\" name=\"{}\"",
        escape_xml(&classname),
        escape_xml(&record.display_name),
    );

    match record.status {
        TestStatus::Skipped => {
            output.push_str(">\n      <skipped />\n    </testcase>\n");
            return;
        }
        _ => {
            let time = format_seconds(Duration::from_millis(record.duration_ms.unwrap_or(0)));
            let _ = write!(output, " time=\"{time}\"");
        }
    }

    let failures: Vec<_> = record.issues.iter().filter(|i| i.is_failure()).collect();
    if failures.is_empty() && record.status != TestStatus::Cancelled {
        output.push_str(" />\n");
        return;
    }

    output.push_str(">\n");
    for issue in failures {
        let _ = writeln!(
            output,
            "      <failure message=\"{}\" type=\"{}\" />",
            escape_xml(&issue.description()),
            issue.kind.name(),
        );
    }
    if record.status == TestStatus::Cancelled {
        let message = record.message.as_deref().unwrap_or("cancelled");
        let _ = writeln!(output, "      <skipped message=\"{}\" />", escape_xml(message));
    }
    output.push_str("    </testcase>\n");
}

/// Escape XML special characters
fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
