//! Known-issue scopes
//!
//! Issues recorded inside a known-issue scope are marked known and stop
//! counting as failures. A non-intermittent scope that sees no matching
//! issue records `knownIssueNotRecorded` instead.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

use crate::error::is_control_flow;
use crate::executor::context::record_unmatched;
use crate::models::{Issue, IssueKind, SourceLocation};

/// Decides whether a scope accepts an issue
pub type IssueMatcher = Arc<dyn Fn(&Issue) -> bool + Send + Sync>;

tokio::task_local! {
    static SCOPES: Arc<Vec<Arc<Scope>>>;
}

struct Scope {
    matcher: Option<IssueMatcher>,
    matched: AtomicUsize,
}

impl Scope {
    fn accepts(&self, issue: &Issue) -> bool {
        self.matcher.as_ref().map_or(true, |matcher| matcher(issue))
    }
}

/// Mark `issue` known if an enclosing scope accepts it; the innermost scope wins
pub(crate) fn match_issue(mut issue: Issue) -> Issue {
    if issue.is_known || !issue.kind.can_be_known() {
        return issue;
    }
    let accepted = SCOPES
        .try_with(|scopes| {
            scopes.iter().rev().find(|scope| scope.accepts(&issue)).map(|scope| {
                scope.matched.fetch_add(1, Ordering::Relaxed);
            })
        })
        .ok()
        .flatten()
        .is_some();
    issue.is_known = accepted;
    issue
}

fn nested(scope: Arc<Scope>) -> Arc<Vec<Arc<Scope>>> {
    let mut chain = SCOPES.try_with(|scopes| scopes.as_ref().clone()).unwrap_or_default();
    chain.push(scope);
    Arc::new(chain)
}

/// A pre-declared issue expected inside a block of code
#[derive(Clone)]
pub struct KnownIssue {
    comment: Option<String>,
    is_intermittent: bool,
    matcher: Option<IssueMatcher>,
    source_location: SourceLocation,
}

impl KnownIssue {
    #[track_caller]
    pub fn new(comment: impl Into<String>) -> Self {
        Self {
            comment: Some(comment.into()),
            is_intermittent: false,
            matcher: None,
            source_location: SourceLocation::caller(),
        }
    }

    /// Do not complain when no matching issue occurs
    pub fn intermittent(mut self) -> Self {
        self.is_intermittent = true;
        self
    }

    /// Only accept issues `matcher` returns true for
    pub fn matching<F>(mut self, matcher: F) -> Self
    where
        F: Fn(&Issue) -> bool + Send + Sync + 'static,
    {
        self.matcher = Some(Arc::new(matcher));
        self
    }

    fn scope(&self) -> Arc<Scope> {
        Arc::new(Scope {
            matcher: self.matcher.clone(),
            matched: AtomicUsize::new(0),
        })
    }

    fn finish(&self, scope: &Scope, result: anyhow::Result<()>) {
        if let Err(error) = result {
            if !is_control_flow(&error) {
                let mut issue = Issue::error_caught(&error, Some(self.source_location.clone()));
                if scope.accepts(&issue) {
                    scope.matched.fetch_add(1, Ordering::Relaxed);
                    issue.is_known = true;
                }
                record_unmatched(match_issue(issue));
            }
        }
        if scope.matched.load(Ordering::Relaxed) == 0 && !self.is_intermittent {
            debug!("Known issue was not recorded: {:?}", self.comment);
            let mut issue = Issue::new(IssueKind::KnownIssueNotRecorded, Some(self.source_location.clone()));
            if let Some(comment) = &self.comment {
                issue = issue.with_comment(comment.clone());
            }
            record_unmatched(issue);
        }
    }

    /// Run `body` with this known issue in effect
    pub async fn run<F>(self, body: F)
    where
        F: Future<Output = anyhow::Result<()>>,
    {
        let scope = self.scope();
        let result = SCOPES.scope(nested(scope.clone()), body).await;
        self.finish(&scope, result);
    }

    /// Synchronous form of [`KnownIssue::run`]
    pub fn run_sync(self, body: impl FnOnce() -> anyhow::Result<()>) {
        let scope = self.scope();
        let result = SCOPES.sync_scope(nested(scope.clone()), body);
        self.finish(&scope, result);
    }
}

/// Run `body`, treating issues it records as known
#[track_caller]
pub fn with_known_issue<F>(comment: impl Into<String>, body: F) -> impl Future<Output = ()>
where
    F: Future<Output = anyhow::Result<()>>,
{
    KnownIssue::new(comment).run(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Configuration;
    use crate::events::testing::Collector;
    use crate::executor::{CancellationToken, TestContext};
    use crate::expect::{expect, record_issue};
    use crate::models::{Case, Test, TestId};

    fn context(collector: &Collector) -> Arc<TestContext> {
        let configuration = Configuration::new().with_event_handler(collector.handler());
        let test = Arc::new(Test::function(TestId::new(["T"]), || async { Ok(()) }));
        let token = CancellationToken::new();
        Arc::new(
            TestContext::detached(configuration)
                .with_test(test, token.clone())
                .with_case(Case::unparameterized(), token.child()),
        )
    }

    #[tokio::test]
    async fn test_matching_issue_becomes_known() {
        let collector = Collector::default();
        context(&collector)
            .scope(with_known_issue("bug 42", async {
                expect(false, "broken");
                Ok(())
            }))
            .await;

        let issues = collector.issues();
        assert_eq!(issues.len(), 1);
        assert!(issues[0].is_known);
        assert!(!issues[0].is_failure());
    }

    #[tokio::test]
    async fn test_missing_issue_records_exactly_one() {
        let collector = Collector::default();
        context(&collector)
            .scope(with_known_issue("should fail", async { Ok(()) }))
            .await;

        let issues = collector.issues();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].kind, IssueKind::KnownIssueNotRecorded);
        assert!(!issues[0].is_known);
        assert!(issues[0].is_failure());
        assert_eq!(collector.events().len(), 1);
    }

    #[tokio::test]
    async fn test_intermittent_scope_tolerates_absence() {
        let collector = Collector::default();
        context(&collector)
            .scope(KnownIssue::new("flaky").intermittent().run(async { Ok(()) }))
            .await;
        assert!(collector.issues().is_empty());
    }

    #[test]
    fn test_matcher_filters_issues() {
        let collector = Collector::default();
        context(&collector).sync_scope(|| {
            KnownIssue::new("only timeouts")
                .matching(|issue| issue.description().contains("timeout"))
                .run_sync(|| {
                    record_issue("timeout talking to server");
                    record_issue("wrong answer");
                    Ok(())
                })
        });

        let issues = collector.issues();
        assert_eq!(issues.len(), 2);
        assert!(issues[0].is_known);
        assert!(!issues[1].is_known);
    }

    #[test]
    fn test_thrown_error_is_matched() {
        let collector = Collector::default();
        context(&collector).sync_scope(|| {
            KnownIssue::new("throws").run_sync(|| anyhow::bail!("disk on fire"))
        });

        let issues = collector.issues();
        assert_eq!(issues.len(), 1);
        assert!(issues[0].is_known);
        assert!(issues[0].description().contains("disk on fire"));
    }

    #[test]
    fn test_inner_scope_wins() {
        let collector = Collector::default();
        context(&collector).sync_scope(|| {
            KnownIssue::new("outer").intermittent().run_sync(|| {
                KnownIssue::new("inner").run_sync(|| {
                    record_issue("caught by inner");
                    Ok(())
                });
                Ok(())
            })
        });

        let issues = collector.issues();
        assert_eq!(issues.len(), 1);
        assert!(issues[0].is_known);
    }
}
