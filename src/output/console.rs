//! Console recorder
//!
//! Renders events as human-readable lines. Issue counts come from a
//! [`SummaryRecorder`] fed by the same events, so the "with N issues" clause
//! of a test or run reflects everything recorded before it ended.

use parking_lot::Mutex;
use std::io::Write;
use std::time::Duration;

use crate::events::{handler, Event, EventContext, EventHandler, EventKind};
use crate::models::{Issue, Severity, TestId, TestStatus};
use crate::utils::format_seconds;

use super::summary::SummaryRecorder;

const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const GRAY: &str = "\x1b[90m";
const RESET: &str = "\x1b[0m";

/// Writes one line per reportable event
pub struct ConsoleRecorder {
    writer: Mutex<Box<dyn Write + Send>>,
    summary: SummaryRecorder,
    colorize: bool,
    verbose: bool,
}

impl ConsoleRecorder {
    pub fn new(writer: impl Write + Send + 'static) -> Self {
        Self {
            writer: Mutex::new(Box::new(writer)),
            summary: SummaryRecorder::new(),
            colorize: true,
            verbose: false,
        }
    }

    /// Console recorder on stdout
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }

    pub fn no_color(mut self) -> Self {
        self.colorize = false;
        self
    }

    /// Also report case boundaries and logged messages
    pub fn verbose(mut self) -> Self {
        self.verbose = true;
        self
    }

    /// The summary this recorder aggregates into
    pub fn summary(&self) -> SummaryRecorder {
        self.summary.clone()
    }

    pub fn into_handler(self) -> EventHandler {
        handler(move |event, context| self.write(event, context))
    }

    fn write(&self, event: &Event, context: &EventContext<'_>) {
        let lines = self.render(event, context);
        if lines.is_empty() {
            return;
        }
        let mut writer = self.writer.lock();
        for line in lines {
            // A closed stdout must not take the run down with it.
            let _ = writeln!(writer, "{line}");
        }
        let _ = writer.flush();
    }

    /// Lines for one event, after folding it into the summary
    pub fn render(&self, event: &Event, context: &EventContext<'_>) -> Vec<String> {
        self.summary.record(event, context);
        let subject = Subject::new(event.test_id.as_ref(), context);

        let line = match &event.kind {
            EventKind::RunStarted => Some(self.line(GRAY, "◇", "Test run started.".to_string())),
            EventKind::IterationStarted(index) if *index > 0 => Some(self.line(
                GRAY,
                "↻",
                format!("Repetition {} of the test run started.", index + 1),
            )),
            EventKind::TestStarted => subject
                .map(|s| self.line(GRAY, "◇", format!("{} {} started.", s.noun, s.name))),
            EventKind::TestCaseStarted if self.verbose => {
                match (subject, context.test_case.filter(|c| c.is_parameterized())) {
                    (Some(s), Some(case)) => Some(self.line(
                        GRAY,
                        "◇",
                        format!("{} {} started case {case}.", s.noun, s.name),
                    )),
                    _ => None,
                }
            }
            EventKind::IssueRecorded(issue) => Some(self.issue_line(subject, issue)),
            EventKind::MessageLogged(message) if self.verbose => Some(match subject {
                Some(s) => self.line(GRAY, "ℹ", format!("{} {}: {message}", s.noun, s.name)),
                None => self.line(GRAY, "ℹ", message.clone()),
            }),
            EventKind::ValueAttached(attachment) => subject.map(|s| {
                self.line(
                    GRAY,
                    "⎘",
                    format!(
                        "{} {} attached '{}' ({} bytes).",
                        s.noun,
                        s.name,
                        attachment.preferred_name,
                        attachment.bytes.len()
                    ),
                )
            }),
            EventKind::TestCaseCancelled(info) if self.verbose => subject.map(|s| {
                self.line(
                    YELLOW,
                    "⊘",
                    format!("{} {} cancelled a case{}.", s.noun, s.name, comment(&info.comment)),
                )
            }),
            EventKind::TestEnded => subject.and_then(|s| self.ended_line(s, event)),
            EventKind::TestSkipped(info) => subject.map(|s| {
                self.line(
                    YELLOW,
                    "➜",
                    format!("{} {} skipped{}.", s.noun, s.name, comment(&info.comment)),
                )
            }),
            EventKind::TestCancelled(info) => subject.map(|s| {
                self.line(
                    YELLOW,
                    "⊘",
                    format!("{} {} cancelled{}.", s.noun, s.name, comment(&info.comment)),
                )
            }),
            EventKind::RunEnded => Some(self.run_ended_line()),
            _ => None,
        };
        line.into_iter().collect()
    }

    fn issue_line(&self, subject: Option<Subject<'_>>, issue: &Issue) -> String {
        let (color, symbol, what) = if issue.severity == Severity::Warning {
            (YELLOW, "⚠", "a warning")
        } else if issue.is_known {
            (GRAY, "✘", "a known issue")
        } else {
            (RED, "✘", "an issue")
        };
        let location = issue
            .source_location()
            .map(|l| format!(" at {l}"))
            .unwrap_or_default();
        let text = match subject {
            Some(s) => format!(
                "{} {} recorded {what}{location}: {}",
                s.noun,
                s.name,
                issue.description()
            ),
            None => format!("The test run recorded {what}{location}: {}", issue.description()),
        };
        self.line(color, symbol, text)
    }

    fn ended_line(&self, subject: Subject<'_>, event: &Event) -> Option<String> {
        let id = event.test_id.as_ref()?;
        let record = self.summary.record_for(id)?;
        let after = record
            .duration_ms
            .map(|ms| format!(" after {} seconds", format_seconds(Duration::from_millis(ms))))
            .unwrap_or_default();
        let clause = record.counts.clause();
        Some(match record.status {
            TestStatus::Failed => self.line(
                RED,
                "✘",
                format!("{} {} failed{after}{clause}.", subject.noun, subject.name),
            ),
            _ => self.line(
                GREEN,
                "✔",
                format!("{} {} passed{after}{clause}.", subject.noun, subject.name),
            ),
        })
    }

    fn run_ended_line(&self) -> String {
        let summary = self.summary.summary();
        let total = summary.total();
        let noun = if total == 1 { "test" } else { "tests" };
        let after = format_seconds(Duration::from_millis(summary.total_duration_ms));
        let clause = summary.counts.clause();
        if summary.is_failure() {
            self.line(
                RED,
                "✘",
                format!("Test run with {total} {noun} failed after {after} seconds{clause}."),
            )
        } else {
            self.line(
                GREEN,
                "✔",
                format!("Test run with {total} {noun} passed after {after} seconds{clause}."),
            )
        }
    }

    fn line(&self, color: &str, symbol: &str, text: String) -> String {
        if self.colorize {
            format!("{color}{symbol}{RESET} {text}")
        } else {
            format!("{symbol} {text}")
        }
    }
}

/// The test an event is about, as the console names it
#[derive(Clone, Copy)]
struct Subject<'a> {
    noun: &'static str,
    name: &'a str,
}

impl<'a> Subject<'a> {
    fn new(id: Option<&'a TestId>, context: &EventContext<'a>) -> Option<Self> {
        match (context.test, id) {
            (Some(test), _) => Some(Self {
                noun: if test.is_suite() { "Suite" } else { "Test" },
                name: test.display_name(),
            }),
            (None, Some(id)) => Some(Self {
                noun: "Test",
                name: id.name(),
            }),
            (None, None) => None,
        }
    }
}

fn comment(comment: &Option<String>) -> String {
    comment
        .as_deref()
        .map(|c| format!(": \"{c}\""))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{IssueKind, SkipInfo, Test};

    fn recorder() -> ConsoleRecorder {
        ConsoleRecorder::new(std::io::sink()).no_color()
    }

    fn render(recorder: &ConsoleRecorder, kind: EventKind, test: Option<&Test>) -> Vec<String> {
        let event = Event::new(kind, test.map(|t| t.id().clone()), None);
        recorder.render(&event, &EventContext::default().with_test(test))
    }

    fn test(name: &str) -> Test {
        Test::function(TestId::new(["Widgets", name]), || async { Ok(()) })
    }

    #[test]
    fn test_passing_test_has_no_issue_clause() {
        let recorder = recorder();
        let t = test("spins");
        render(&recorder, EventKind::TestStarted, Some(&t));
        let lines = render(&recorder, EventKind::TestEnded, Some(&t));
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("✔ Test spins passed after "));
        assert!(lines[0].ends_with(" seconds."));
    }

    #[test]
    fn test_known_issues_are_counted() {
        let recorder = recorder();
        let t = test("wobbles");
        render(&recorder, EventKind::TestStarted, Some(&t));
        let mut known = Issue::new(IssueKind::Unconditional, None).with_comment("flaky");
        known.is_known = true;
        let lines = render(&recorder, EventKind::IssueRecorded(known), Some(&t));
        assert_eq!(lines, vec!["✘ Test wobbles recorded a known issue: Issue recorded - flaky"]);

        let lines = render(&recorder, EventKind::TestEnded, Some(&t));
        assert!(lines[0].contains("passed"));
        assert!(lines[0].ends_with(" with 1 issue (including 1 known)."));
    }

    #[test]
    fn test_global_issue_is_tolerated() {
        let recorder = recorder();
        let lines = render(&recorder, EventKind::IssueRecorded(Issue::system("lost event")), None);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("✘ The test run recorded an issue"));
        assert!(lines[0].contains("lost event"));

        render(&recorder, EventKind::RunStarted, None);
        let lines = render(&recorder, EventKind::RunEnded, None);
        assert!(lines[0].starts_with("✘ Test run with 0 tests failed"));
        assert!(lines[0].ends_with(" with 1 issue."));
    }

    #[test]
    fn test_skipped_with_comment() {
        let recorder = recorder();
        let t = test("later");
        let lines = render(
            &recorder,
            EventKind::TestSkipped(SkipInfo::with_comment("not ready")),
            Some(&t),
        );
        assert_eq!(lines, vec!["➜ Test later skipped: \"not ready\"."]);
    }

    #[test]
    fn test_colors_only_when_enabled() {
        let colored = ConsoleRecorder::new(std::io::sink());
        let lines = colored.render(&Event::global(EventKind::RunStarted), &EventContext::default());
        assert!(lines[0].contains("\x1b["));

        let plain = recorder();
        let lines = plain.render(&Event::global(EventKind::RunStarted), &EventContext::default());
        assert_eq!(lines, vec!["◇ Test run started."]);
    }

    #[test]
    fn test_quiet_events_render_nothing() {
        let recorder = recorder();
        let t = test("quiet");
        assert!(render(&recorder, EventKind::TestCaseStarted, Some(&t)).is_empty());
        assert!(render(&recorder, EventKind::MessageLogged("hi".into()), Some(&t)).is_empty());
        assert!(render(&recorder, EventKind::IterationStarted(0), None).is_empty());
    }
}
