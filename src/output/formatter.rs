//! Output formatters for run results
//!
//! Output format selection plus the end-of-run summary table and report
//! files.

use std::path::Path;

use anyhow::Context;

use crate::models::{RunSummary, TestRecord, TestStatus};

use super::junit::render_junit;

/// What the host binary writes to stdout while a run progresses
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable lines
    #[default]
    Console,
    /// A JUnit XML document when the run ends
    Junit,
    /// Versioned JSON-lines records for another tool to consume
    Abi,
}

impl OutputFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "console" | "human" => Some(OutputFormat::Console),
            "junit" | "xml" => Some(OutputFormat::Junit),
            "abi" | "json" | "jsonl" => Some(OutputFormat::Abi),
            _ => None,
        }
    }
}

/// Result formatter
pub struct ResultFormatter {
    colorize: bool,
}

impl ResultFormatter {
    pub fn new() -> Self {
        Self { colorize: true }
    }

    pub fn no_color(mut self) -> Self {
        self.colorize = false;
        self
    }

    /// One line for a test record
    pub fn format_record(&self, record: &TestRecord) -> String {
        let status_str = if self.colorize {
            match record.status {
                TestStatus::Passed => "\x1b[32m✓ PASS\x1b[0m",
                TestStatus::Failed => "\x1b[31m✗ FAIL\x1b[0m",
                TestStatus::Skipped => "\x1b[33m○ SKIP\x1b[0m",
                TestStatus::Cancelled => "\x1b[33m⊘ CANCEL\x1b[0m",
            }
        } else {
            match record.status {
                TestStatus::Passed => "✓ PASS",
                TestStatus::Failed => "✗ FAIL",
                TestStatus::Skipped => "○ SKIP",
                TestStatus::Cancelled => "⊘ CANCEL",
            }
        };

        let duration = record
            .duration_ms
            .map(|ms| format!("{ms:>6}ms"))
            .unwrap_or_else(|| "     -  ".to_string());
        format!("{:40} {} [{}]", record.id.to_string(), status_str, duration)
    }

    /// Summary table for a finished run
    pub fn format_summary_table(&self, summary: &RunSummary) -> String {
        let mut output = String::new();

        // Header
        output.push_str("\n╔══════════════════════════════════════════════════════════════╗\n");
        output.push_str(&format!(
            "║  Test run - {:3} iteration(s)                                 ║\n",
            summary.iterations
        ));
        output.push_str("╠══════════════════════════════════════════════════════════════╣\n");

        for record in summary.tests() {
            output.push_str(&format!("║  {}\n", self.format_record(record)));
        }

        // Footer
        output.push_str("╠══════════════════════════════════════════════════════════════╣\n");

        let pass_str = if self.colorize {
            format!("\x1b[32m{}\x1b[0m", summary.passed())
        } else {
            summary.passed().to_string()
        };
        let fail_str = if self.colorize && summary.failed() > 0 {
            format!("\x1b[31m{}\x1b[0m", summary.failed())
        } else {
            summary.failed().to_string()
        };

        output.push_str(&format!(
            "║  Total: {:2} | Pass: {} | Fail: {} | Skip: {:2} | Cancel: {:2}\n",
            summary.total(),
            pass_str,
            fail_str,
            summary.skipped(),
            summary.cancelled()
        ));
        output.push_str(&format!(
            "║  Pass Rate: {:5.1}% | Duration: {:6}ms{}\n",
            summary.pass_rate(),
            summary.total_duration_ms,
            summary.counts.clause()
        ));
        output.push_str("╚══════════════════════════════════════════════════════════════╝\n");

        output
    }
}

impl Default for ResultFormatter {
    fn default() -> Self {
        Self::new()
    }
}

/// Write a JUnit report for `summary` to a file
pub fn write_junit_to_file(path: impl AsRef<Path>, summary: &RunSummary) -> anyhow::Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    std::fs::write(path, render_junit(summary))
        .with_context(|| format!("Failed to write JUnit report: {}", path.display()))?;
    Ok(())
}
