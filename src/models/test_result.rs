//! Test result models
//!
//! Per-test outcomes and the run summary aggregated from events.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::issue::Issue;
use super::test::TestId;

/// Final status of a test
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Passed,
    Failed,
    Skipped,
    Cancelled,
}

impl TestStatus {
    pub fn symbol(&self) -> &'static str {
        match self {
            TestStatus::Passed => "✓",
            TestStatus::Failed => "✗",
            TestStatus::Skipped => "○",
            TestStatus::Cancelled => "⊘",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, TestStatus::Passed | TestStatus::Skipped)
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestStatus::Passed => write!(f, "PASS"),
            TestStatus::Failed => write!(f, "FAIL"),
            TestStatus::Skipped => write!(f, "SKIP"),
            TestStatus::Cancelled => write!(f, "CANCEL"),
        }
    }
}

/// Issue counts for a test or a run
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueCounts {
    pub total: usize,
    pub known: usize,
    pub warnings: usize,
    pub failures: usize,
}

impl IssueCounts {
    pub fn add(&mut self, issue: &Issue) {
        self.total += 1;
        if issue.is_known {
            self.known += 1;
        }
        if issue.severity == super::issue::Severity::Warning {
            self.warnings += 1;
        }
        if issue.is_failure() {
            self.failures += 1;
        }
    }

    /// " with N issue(s) (including K known)", or nothing when N is zero
    pub fn clause(&self) -> String {
        if self.total == 0 {
            return String::new();
        }
        let noun = if self.total == 1 { "issue" } else { "issues" };
        if self.known > 0 {
            format!(" with {} {noun} (including {} known)", self.total, self.known)
        } else {
            format!(" with {} {noun}", self.total)
        }
    }
}

/// Outcome of a single test
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TestRecord {
    pub id: TestId,
    pub display_name: String,
    pub is_suite: bool,
    pub status: TestStatus,
    pub duration_ms: Option<u64>,
    pub issues: Vec<Issue>,
    pub counts: IssueCounts,
    pub message: Option<String>,
}

impl TestRecord {
    pub fn new(id: TestId, display_name: impl Into<String>, is_suite: bool) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            is_suite,
            status: TestStatus::Passed,
            duration_ms: None,
            issues: Vec::new(),
            counts: IssueCounts::default(),
            message: None,
        }
    }

    pub fn record_issue(&mut self, issue: &Issue) {
        self.counts.add(issue);
        if issue.is_failure() {
            self.status = TestStatus::Failed;
        }
        self.issues.push(issue.clone());
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl fmt::Display for TestRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.status.symbol(), self.display_name)?;
        if let Some(duration_ms) = self.duration_ms {
            write!(f, " [{duration_ms}ms]")?;
        }
        write!(f, "{}", self.counts.clause())?;
        if let Some(msg) = &self.message {
            write!(f, " - {msg}")?;
        }
        Ok(())
    }
}

/// Summary of a whole run
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RunSummary {
    pub records: BTreeMap<TestId, TestRecord>,
    pub counts: IssueCounts,
    pub iterations: usize,
    pub total_duration_ms: u64,
}

impl RunSummary {
    /// Function records only, in id order
    pub fn tests(&self) -> impl Iterator<Item = &TestRecord> {
        self.records.values().filter(|r| !r.is_suite)
    }

    fn count(&self, status: TestStatus) -> usize {
        self.tests().filter(|r| r.status == status).count()
    }

    pub fn total(&self) -> usize {
        self.tests().count()
    }

    pub fn passed(&self) -> usize {
        self.count(TestStatus::Passed)
    }

    pub fn failed(&self) -> usize {
        self.count(TestStatus::Failed)
    }

    pub fn skipped(&self) -> usize {
        self.count(TestStatus::Skipped)
    }

    pub fn cancelled(&self) -> usize {
        self.count(TestStatus::Cancelled)
    }

    pub fn pass_rate(&self) -> f64 {
        if self.total() == 0 {
            0.0
        } else {
            (self.passed() as f64 / self.total() as f64) * 100.0
        }
    }

    pub fn is_failure(&self) -> bool {
        self.counts.failures > 0
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━")?;
        writeln!(
            f,
            "Total: {} | Pass: {} | Fail: {} | Skip: {} | Cancel: {}",
            self.total(),
            self.passed(),
            self.failed(),
            self.skipped(),
            self.cancelled()
        )?;
        writeln!(
            f,
            "Pass Rate: {:.1}% | Duration: {}ms",
            self.pass_rate(),
            self.total_duration_ms
        )
    }
}
