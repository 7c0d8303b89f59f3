//! Test execution runner
//!
//! Walks a plan's step graph under the configured concurrency policy and
//! reports everything that happens as events.

use futures::future::BoxFuture;
use futures::FutureExt;
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::Configuration;
use crate::error::is_control_flow;
use crate::events::{Event, EventContext, EventKind};
use crate::models::{Case, Issue, IssueCounts, IssueKind, SkipInfo, Test, Trait};
use crate::planner::{Action, Plan, StepNode};
use crate::utils::Timer;

use super::cancel::CancellationToken;
use super::context::{IssueTally, TestContext};
use super::parallel::ParallelPolicy;

/// What a finished run reports
#[derive(Clone, Debug)]
pub struct RunOutcome {
    pub iterations: usize,
    pub issues: IssueCounts,
    pub duration: Duration,
}

impl RunOutcome {
    /// True if any unknown error-severity issue was recorded
    pub fn is_failure(&self) -> bool {
        self.issues.failures > 0
    }
}

/// Runs a plan
pub struct Runner {
    plan: Arc<Plan>,
    configuration: Arc<Configuration>,
    token: CancellationToken,
}

impl Runner {
    /// Plan `tests` with the configuration's filter
    pub async fn new(tests: impl IntoIterator<Item = Test>, configuration: Configuration) -> Self {
        let plan = Plan::build(tests, &configuration.filter).await;
        Self::with_plan(plan, configuration)
    }

    pub fn with_plan(plan: Plan, configuration: Configuration) -> Self {
        Self {
            plan: Arc::new(plan),
            configuration: Arc::new(configuration),
            token: CancellationToken::new(),
        }
    }

    pub fn plan(&self) -> &Plan {
        &self.plan
    }

    pub fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    /// Cancel every step that has not started; running cases end cancelled
    pub fn cancel(&self) {
        info!("Run cancelled");
        self.token.cancel_with(SkipInfo::with_comment("Run cancelled"));
    }

    /// Token cancelling this run, for use from another task
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    fn post(&self, kind: EventKind) {
        let event = Event::global(kind);
        let context = EventContext::default()
            .with_plan(Some(&self.plan))
            .with_configuration(Some(&self.configuration));
        self.configuration.post(&event, &context);
    }

    /// Run the plan, repeating per the repetition policy
    pub async fn run(&self) -> RunOutcome {
        let timer = Timer::start("run");
        let tally = Arc::new(IssueTally::default());
        let policy = self.configuration.repetition_policy;
        let lanes = ParallelPolicy::new(self.configuration.parallel, self.configuration.max_concurrent);

        info!(
            "Starting run of {} steps (parallel: {}, max concurrent: {})",
            self.plan.steps().len(),
            lanes.is_parallel(),
            lanes.max_concurrent()
        );
        self.post(EventKind::RunStarted);

        let mut iterations = 0;
        loop {
            let failures_before = tally.failures();
            self.post(EventKind::IterationStarted(iterations));

            let execution = Arc::new(Execution {
                configuration: self.configuration.clone(),
                plan: self.plan.clone(),
                run_token: self.token.clone(),
                tally: tally.clone(),
                lanes: lanes.clone(),
            });
            let root = self.plan.step_graph().clone();
            execution.run_node(root, !lanes.is_parallel()).await;

            self.post(EventKind::IterationEnded(iterations));
            iterations += 1;

            let issue_recorded = tally.failures() > failures_before;
            if self.token.is_cancelled() || !policy.should_continue(iterations, issue_recorded) {
                break;
            }
            debug!("Starting iteration {}", iterations + 1);
        }

        self.post(EventKind::RunEnded);
        let outcome = RunOutcome {
            iterations,
            issues: tally.snapshot(),
            duration: timer.elapsed(),
        };
        info!(
            "Run finished in {}ms with {} issue(s), {} failing",
            outcome.duration.as_millis(),
            outcome.issues.total,
            outcome.issues.failures
        );
        outcome
    }
}

enum CaseOutcome {
    Finished(anyhow::Result<()>),
    TimedOut(Duration),
}

/// State shared by every step of one iteration
struct Execution {
    configuration: Arc<Configuration>,
    plan: Arc<Plan>,
    run_token: CancellationToken,
    tally: Arc<IssueTally>,
    lanes: ParallelPolicy,
}

impl Execution {
    fn post(&self, test: &Test, case: Option<&Case>, kind: EventKind) {
        let event = Event::new(kind, Some(test.id().clone()), case.map(Case::id));
        let context = EventContext {
            test: Some(test),
            test_case: case,
            plan: Some(&self.plan),
            configuration: Some(&self.configuration),
        };
        self.configuration.post(&event, &context);
    }

    fn context(&self, test: &Arc<Test>, token: CancellationToken) -> TestContext {
        TestContext::new(
            self.configuration.clone(),
            Some(self.plan.clone()),
            self.tally.clone(),
        )
        .with_test(test.clone(), token)
    }

    fn run_node(self: Arc<Self>, node: Arc<StepNode>, serialized: bool) -> BoxFuture<'static, ()> {
        async move {
            let Some(step) = node.step.clone() else {
                self.run_children(&node, serialized).await;
                return;
            };
            let test = step.test;
            let serialized = serialized || test.is_serialized();

            if self.run_token.is_cancelled() && step.action.is_run() {
                let reason = self.run_token.reason().unwrap_or_default();
                self.post(&test, None, EventKind::TestCancelled(reason));
                self.run_children(&node, serialized).await;
                return;
            }

            match step.action {
                Action::Skip(info) => {
                    debug!("Skipping {}", test.id());
                    self.post(&test, None, EventKind::TestSkipped(info));
                    self.run_children(&node, serialized).await;
                }
                Action::RecordIssue(issue) => {
                    self.post(&test, None, EventKind::TestStarted);
                    self.context(&test, self.run_token.child()).record(issue);
                    self.run_children(&node, serialized).await;
                    self.post(&test, None, EventKind::TestEnded);
                }
                Action::Run if test.is_suite() => {
                    self.clone().run_suite(node, test, serialized).await;
                }
                Action::Run => {
                    self.run_function(test, serialized).await;
                }
            }
        }
        .boxed()
    }

    async fn run_children(self: &Arc<Self>, node: &StepNode, serialized: bool) {
        let units = node
            .children
            .iter()
            .map(|child| self.clone().run_node(child.clone(), serialized))
            .collect();
        self.lanes.run_all(serialized, units).await;
    }

    async fn run_suite(self: Arc<Self>, node: Arc<StepNode>, test: Arc<Test>, serialized: bool) {
        debug!("Entering suite {}", test.id());
        self.post(&test, None, EventKind::TestStarted);

        let context = Arc::new(self.context(&test, self.run_token.child()));
        let children = {
            let this = self.clone();
            let node = node.clone();
            async move {
                this.run_children(&node, serialized).await;
                Ok(())
            }
            .boxed()
        };
        let scoped = test
            .traits()
            .iter()
            .rev()
            .filter(|t| !t.is_recursive())
            .filter_map(Trait::as_custom_execution)
            .fold(children, |body, custom| {
                custom.scoping().provide_scope(&test, None, body)
            });

        if let Err(error) = context.clone().scope(scoped).await {
            if !is_control_flow(&error) {
                context.record(Issue::error_caught(&error, Some(test.source_location().clone())));
            }
        }
        self.post(&test, None, EventKind::TestEnded);
    }

    async fn run_function(self: Arc<Self>, test: Arc<Test>, serialized: bool) {
        let _permit = self.lanes.acquire().await;
        debug!("Running {}", test.id());
        self.post(&test, None, EventKind::TestStarted);

        let test_token = self.run_token.child();
        let cases = test.cases();
        let units = cases
            .into_iter()
            .map(|case| self.clone().run_case(test.clone(), case, test_token.clone()))
            .collect();
        self.lanes.run_all(serialized, units).await;

        if test_token.is_cancelled() {
            let reason = test_token.reason().unwrap_or_default();
            self.post(&test, None, EventKind::TestCancelled(reason));
        } else {
            self.post(&test, None, EventKind::TestEnded);
        }
    }

    async fn run_case(self: Arc<Self>, test: Arc<Test>, case: Case, test_token: CancellationToken) {
        self.post(&test, Some(&case), EventKind::TestCaseStarted);
        if test_token.is_cancelled() {
            let reason = test_token.reason().unwrap_or_default();
            self.post(&test, Some(&case), EventKind::TestCaseCancelled(reason));
            return;
        }

        let case_token = test_token.child();
        let context = Arc::new(
            self.context(&test, test_token)
                .with_case(case.clone(), case_token.clone()),
        );

        let Some(body) = test.body() else {
            self.post(&test, Some(&case), EventKind::TestCaseEnded);
            return;
        };
        let body = test
            .traits()
            .iter()
            .rev()
            .filter_map(Trait::as_custom_execution)
            .fold(body(case.clone()), |body, custom| {
                custom.scoping().provide_scope(&test, Some(&case), body)
            });

        let limit = match (test.time_limit(), self.configuration.default_time_limit) {
            (Some(own), Some(default)) => Some(own.min(default)),
            (own, default) => own.or(default),
        };
        let guarded = async move {
            match limit {
                Some(limit) => match tokio::time::timeout(limit, body).await {
                    Ok(result) => CaseOutcome::Finished(result),
                    Err(_) => CaseOutcome::TimedOut(limit),
                },
                None => CaseOutcome::Finished(body.await),
            }
        };

        let mut handle = tokio::spawn(context.clone().scope(guarded));
        let joined = tokio::select! {
            joined = &mut handle => Some(joined),
            _ = case_token.cancelled() => {
                handle.abort();
                None
            }
        };

        let location = Some(test.source_location().clone());
        match joined {
            Some(Ok(CaseOutcome::Finished(Ok(())))) | None => {}
            Some(Ok(CaseOutcome::Finished(Err(error)))) => {
                if !is_control_flow(&error) {
                    context.record(Issue::error_caught(&error, location));
                }
            }
            Some(Ok(CaseOutcome::TimedOut(limit))) => {
                let milliseconds = u64::try_from(limit.as_millis()).unwrap_or(u64::MAX);
                context.record(Issue::new(IssueKind::TimeLimitExceeded { milliseconds }, location));
            }
            Some(Err(join_error)) if join_error.is_panic() => {
                let message = panic_message(join_error.into_panic());
                context.record(Issue::new(
                    IssueKind::ErrorCaught {
                        description: format!("panicked: {message}"),
                    },
                    location,
                ));
            }
            Some(Err(join_error)) => {
                context.record(Issue::system(format!("Case task failed: {join_error}")));
            }
        }

        if case_token.is_cancelled() {
            let reason = case_token.reason().unwrap_or_default();
            self.post(&test, Some(&case), EventKind::TestCaseCancelled(reason));
        } else {
            self.post(&test, Some(&case), EventKind::TestCaseEnded);
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
