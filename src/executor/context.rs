//! Task-local test context
//!
//! Each running case (and each suite scope) executes with a `TestContext`
//! installed as a tokio task-local. Issue recording, event posting and
//! cancellation look it up; code running outside any context falls back to
//! the process-wide fallback handler.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::Configuration;
use crate::error::CancellationError;
use crate::events::{fallback, Event, EventContext, EventKind};
use crate::expect::known_issue;
use crate::models::{Case, Issue, IssueCounts, Severity, SkipInfo, SourceLocation, Test};
use crate::planner::Plan;

use super::cancel::CancellationToken;

tokio::task_local! {
    static CURRENT: Arc<TestContext>;
}

/// Lock-free issue counters shared by every step of a run
#[derive(Debug, Default)]
pub struct IssueTally {
    total: AtomicUsize,
    known: AtomicUsize,
    warnings: AtomicUsize,
    failures: AtomicUsize,
}

impl IssueTally {
    pub fn add(&self, issue: &Issue) {
        self.total.fetch_add(1, Ordering::Relaxed);
        if issue.is_known {
            self.known.fetch_add(1, Ordering::Relaxed);
        }
        if issue.severity == Severity::Warning {
            self.warnings.fetch_add(1, Ordering::Relaxed);
        }
        if issue.is_failure() {
            self.failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn failures(&self) -> usize {
        self.failures.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> IssueCounts {
        IssueCounts {
            total: self.total.load(Ordering::Relaxed),
            known: self.known.load(Ordering::Relaxed),
            warnings: self.warnings.load(Ordering::Relaxed),
            failures: self.failures(),
        }
    }
}

/// Everything code inside a test body can reach
pub struct TestContext {
    configuration: Arc<Configuration>,
    plan: Option<Arc<Plan>>,
    test: Option<Arc<Test>>,
    case: Option<Case>,
    test_token: CancellationToken,
    case_token: Option<CancellationToken>,
    tally: Arc<IssueTally>,
}

impl TestContext {
    pub fn new(configuration: Arc<Configuration>, plan: Option<Arc<Plan>>, tally: Arc<IssueTally>) -> Self {
        Self {
            configuration,
            plan,
            test: None,
            case: None,
            test_token: CancellationToken::new(),
            case_token: None,
            tally,
        }
    }

    /// A context attached to no plan, as used by an exit-test child
    pub fn detached(configuration: Configuration) -> Self {
        Self::new(Arc::new(configuration), None, Arc::new(IssueTally::default()))
    }

    pub fn with_test(mut self, test: Arc<Test>, token: CancellationToken) -> Self {
        self.test = Some(test);
        self.test_token = token;
        self
    }

    pub fn with_case(mut self, case: Case, token: CancellationToken) -> Self {
        self.case = Some(case);
        self.case_token = Some(token);
        self
    }

    /// The context of the calling task, if any
    pub fn current() -> Option<Arc<TestContext>> {
        CURRENT.try_with(Arc::clone).ok()
    }

    /// Run `future` with this context installed
    pub async fn scope<F: Future>(self: Arc<Self>, future: F) -> F::Output {
        CURRENT.scope(self, future).await
    }

    /// Run `f` with this context installed
    pub fn sync_scope<R>(self: Arc<Self>, f: impl FnOnce() -> R) -> R {
        CURRENT.sync_scope(self, f)
    }

    pub fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    pub fn test(&self) -> Option<&Test> {
        self.test.as_deref()
    }

    pub fn case(&self) -> Option<&Case> {
        self.case.as_ref()
    }

    pub fn tally(&self) -> &IssueTally {
        &self.tally
    }

    /// Token of the innermost running unit (case, else test)
    pub fn token(&self) -> &CancellationToken {
        self.case_token.as_ref().unwrap_or(&self.test_token)
    }

    pub fn is_cancelled(&self) -> bool {
        self.token().is_cancelled() || self.test_token.is_cancelled()
    }

    /// Post an event attributed to this context's test and case
    pub fn post(&self, kind: EventKind) {
        let event = Event::new(
            kind,
            self.test.as_ref().map(|t| t.id().clone()),
            self.case.as_ref().map(Case::id),
        );
        let context = EventContext {
            test: self.test.as_deref(),
            test_case: self.case.as_ref(),
            plan: self.plan.as_deref(),
            configuration: Some(&self.configuration),
        };
        self.configuration.post(&event, &context);
    }

    /// Record `issue` unless this context was cancelled
    pub fn record(&self, issue: Issue) {
        if self.is_cancelled() {
            debug!("Suppressing issue after cancellation: {}", issue.description());
            return;
        }
        self.tally.add(&issue);
        self.post(EventKind::IssueRecorded(issue));
    }
}

/// Post `kind` in the current context, or to the fallback handler
pub fn post(kind: EventKind) {
    match TestContext::current() {
        Some(context) => context.post(kind),
        None => {
            fallback::post(&Event::global(kind));
        }
    }
}

/// Record an issue, applying any active known-issue scope
pub fn record(issue: Issue) {
    record_unmatched(known_issue::match_issue(issue));
}

/// Record an issue without known-issue matching
pub(crate) fn record_unmatched(issue: Issue) {
    match TestContext::current() {
        Some(context) => context.record(issue),
        None => {
            fallback::post(&Event::global(EventKind::IssueRecorded(issue)));
        }
    }
}

fn cancel(comment: Option<&str>, location: SourceLocation, whole_test: bool) -> anyhow::Error {
    let comment = comment.map(str::to_string);
    let reason = SkipInfo::new(comment.clone(), Some(location));
    match TestContext::current() {
        Some(context) if whole_test => context.test_token.cancel_with(reason),
        Some(context) => context.token().cancel_with(reason),
        None => warn!("Cancellation requested outside of a running test"),
    }
    anyhow::Error::new(CancellationError { comment })
}

/// Cancel the current test and all of its remaining cases.
///
/// Return the error from the body: `return Err(cancel_test(None))`.
#[track_caller]
pub fn cancel_test(comment: Option<&str>) -> anyhow::Error {
    cancel(comment, SourceLocation::caller(), true)
}

/// Cancel only the current case
#[track_caller]
pub fn cancel_case(comment: Option<&str>) -> anyhow::Error {
    cancel(comment, SourceLocation::caller(), false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::testing::Collector;
    use crate::models::{IssueKind, TestId};

    fn context(collector: &Collector) -> Arc<TestContext> {
        let configuration = Configuration::new().with_event_handler(collector.handler());
        let test = Arc::new(Test::function(TestId::new(["S", "t"]), || async { Ok(()) }));
        let test_token = CancellationToken::new();
        Arc::new(
            TestContext::detached(configuration)
                .with_test(test, test_token.clone())
                .with_case(Case::unparameterized(), test_token.child()),
        )
    }

    #[tokio::test]
    async fn test_record_attributes_issue() {
        let collector = Collector::default();
        let ctx = context(&collector);
        ctx.clone()
            .scope(async { record(Issue::new(IssueKind::Unconditional, None)) })
            .await;

        let events = collector.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].test_id, Some(TestId::new(["S", "t"])));
        assert_eq!(ctx.tally().snapshot().failures, 1);
    }

    #[tokio::test]
    async fn test_cancellation_suppresses_issues() {
        let collector = Collector::default();
        let ctx = context(&collector);
        let error = ctx
            .clone()
            .scope(async {
                let error = cancel_case(Some("not today"));
                record(Issue::new(IssueKind::Unconditional, None));
                error
            })
            .await;

        assert!(crate::error::is_control_flow(&error));
        assert!(ctx.is_cancelled());
        assert!(collector.issues().is_empty());
        assert_eq!(ctx.tally().snapshot().total, 0);
    }

    #[test]
    fn test_outside_context_uses_fallback() {
        let _slot = fallback::testing::lock();
        let collector = Collector::default();
        let previous = fallback::install(collector.handler());

        record(Issue::new(IssueKind::Unconditional, None));
        assert_eq!(collector.issues().len(), 1);

        match previous {
            Some(handler) => {
                fallback::install(handler);
            }
            None => {
                fallback::reset();
            }
        }
    }
}
