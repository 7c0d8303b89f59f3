//! Run summary recorder
//!
//! Folds the event stream into a [`RunSummary`]: one record per test, the
//! run-wide issue counts and the run duration.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use crate::events::{handler, Event, EventContext, EventHandler, EventKind};
use crate::models::{RunSummary, TestId, TestRecord, TestStatus};
use crate::utils::Instant;

#[derive(Default)]
struct State {
    summary: RunSummary,
    started: HashMap<TestId, Instant>,
    run_started: Option<Instant>,
}

/// Builds a [`RunSummary`] from events; safe to share between handlers
#[derive(Clone, Default)]
pub struct SummaryRecorder {
    state: Arc<Mutex<State>>,
}

impl SummaryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// A handler feeding this recorder
    pub fn handler(&self) -> EventHandler {
        let recorder = self.clone();
        handler(move |event, context| recorder.record(event, context))
    }

    /// Fold one event into the summary
    pub fn record(&self, event: &Event, context: &EventContext<'_>) {
        let mut state = self.state.lock();
        let state = &mut *state;
        match &event.kind {
            EventKind::RunStarted => state.run_started = Some(event.instant),
            EventKind::IterationEnded(_) => state.summary.iterations += 1,
            EventKind::RunEnded => {
                if let Some(started) = &state.run_started {
                    state.summary.total_duration_ms =
                        event.instant.duration_since(started).as_millis() as u64;
                }
            }
            EventKind::TestStarted => {
                if let Some(id) = &event.test_id {
                    // A repeated test starts over with a fresh record.
                    state.summary.records.insert(id.clone(), new_record(id, context));
                    state.started.insert(id.clone(), event.instant);
                }
            }
            EventKind::IssueRecorded(issue) => {
                state.summary.counts.add(issue);
                if let Some(id) = &event.test_id {
                    entry(&mut state.summary, id, context).record_issue(issue);
                }
            }
            EventKind::TestEnded => {
                if let Some(id) = &event.test_id {
                    let duration = state
                        .started
                        .get(id)
                        .map(|started| event.instant.duration_since(started).as_millis() as u64);
                    entry(&mut state.summary, id, context).duration_ms = duration;
                }
            }
            EventKind::TestSkipped(info) => {
                if let Some(id) = &event.test_id {
                    let mut record = new_record(id, context);
                    record.status = TestStatus::Skipped;
                    record.message = info.comment.clone();
                    state.summary.records.insert(id.clone(), record);
                }
            }
            EventKind::TestCancelled(info) => {
                if let Some(id) = &event.test_id {
                    let record = entry(&mut state.summary, id, context);
                    if record.status != TestStatus::Failed {
                        record.status = TestStatus::Cancelled;
                    }
                    if record.message.is_none() {
                        record.message = info.comment.clone();
                    }
                    if let Some(started) = state.started.get(id) {
                        record.duration_ms =
                            Some(event.instant.duration_since(started).as_millis() as u64);
                    }
                }
            }
            _ => {}
        }
    }

    /// Snapshot of everything recorded so far
    pub fn summary(&self) -> RunSummary {
        self.state.lock().summary.clone()
    }

    pub fn record_for(&self, id: &TestId) -> Option<TestRecord> {
        self.state.lock().summary.records.get(id).cloned()
    }
}

fn new_record(id: &TestId, context: &EventContext<'_>) -> TestRecord {
    match context.test {
        Some(test) => TestRecord::new(id.clone(), test.display_name(), test.is_suite()),
        None => TestRecord::new(id.clone(), id.name(), false),
    }
}

fn entry<'a>(summary: &'a mut RunSummary, id: &TestId, context: &EventContext<'_>) -> &'a mut TestRecord {
    summary
        .records
        .entry(id.clone())
        .or_insert_with(|| new_record(id, context))
}
