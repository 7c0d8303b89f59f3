//! Confirmations
//!
//! Counted expectations that some callback fires a given number of times
//! before the confirmation's scope ends.

use std::fmt;
use std::future::Future;
use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::executor::record;
use crate::models::{Issue, IssueKind, SourceLocation};

/// How many confirmations a scope expects
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExpectedCount {
    Exactly(usize),
    Range(RangeInclusive<usize>),
}

impl ExpectedCount {
    pub fn contains(&self, count: usize) -> bool {
        match self {
            ExpectedCount::Exactly(expected) => *expected == count,
            ExpectedCount::Range(range) => range.contains(&count),
        }
    }
}

impl From<usize> for ExpectedCount {
    fn from(count: usize) -> Self {
        ExpectedCount::Exactly(count)
    }
}

impl From<RangeInclusive<usize>> for ExpectedCount {
    fn from(range: RangeInclusive<usize>) -> Self {
        ExpectedCount::Range(range)
    }
}

impl fmt::Display for ExpectedCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExpectedCount::Exactly(count) => write!(f, "{count}"),
            ExpectedCount::Range(range) => write!(f, "{}...{}", range.start(), range.end()),
        }
    }
}

/// Handle passed to a confirmation's body
#[derive(Debug, Default)]
pub struct Confirmation {
    count: AtomicUsize,
}

impl Confirmation {
    pub fn confirm(&self) {
        self.confirm_by(1);
    }

    pub fn confirm_by(&self, count: usize) {
        self.count.fetch_add(count, Ordering::Relaxed);
    }

    pub fn count(&self) -> usize {
        self.count.load(Ordering::Relaxed)
    }
}

/// Run `body`, then check it confirmed `expected` times.
///
/// A mismatch records `confirmationMiscounted`; the body's own result is
/// returned either way.
#[track_caller]
pub fn confirmation<F, Fut, R>(
    comment: impl Into<String>,
    expected: impl Into<ExpectedCount>,
    body: F,
) -> impl Future<Output = anyhow::Result<R>>
where
    F: FnOnce(Arc<Confirmation>) -> Fut,
    Fut: Future<Output = anyhow::Result<R>>,
{
    let location = SourceLocation::caller();
    let comment = comment.into();
    let expected = expected.into();
    async move {
        let confirmation = Arc::new(Confirmation::default());
        let result = body(confirmation.clone()).await;

        let actual = confirmation.count();
        if !expected.contains(actual) {
            record(
                Issue::new(
                    IssueKind::ConfirmationMiscounted {
                        actual,
                        expected: expected.to_string(),
                    },
                    Some(location),
                )
                .with_comment(comment),
            );
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Configuration;
    use crate::events::testing::Collector;
    use crate::executor::TestContext;
    use crate::models::{Test, TestId};
    use std::time::Duration;

    fn context(collector: &Collector) -> Arc<TestContext> {
        let configuration = Configuration::new().with_event_handler(collector.handler());
        let test = Arc::new(Test::function(TestId::new(["T"]), || async { Ok(()) }));
        Arc::new(TestContext::detached(configuration).with_test(test, Default::default()))
    }

    #[tokio::test]
    async fn test_exact_count_confirmed() {
        let collector = Collector::default();
        let result = context(&collector)
            .scope(confirmation("three pings", 3usize, |pinged| async move {
                let tasks: Vec<_> = (0..3)
                    .map(|_| {
                        let pinged = pinged.clone();
                        tokio::spawn(async move { pinged.confirm() })
                    })
                    .collect();
                for task in tasks {
                    task.await?;
                }
                Ok::<_, anyhow::Error>(7)
            }))
            .await;

        assert_eq!(result.unwrap(), 7);
        assert!(collector.issues().is_empty());
    }

    #[tokio::test]
    async fn test_miscount_records_issue() {
        let collector = Collector::default();
        let _ = context(&collector)
            .scope(confirmation("a few", 2usize..=4, |fired| async move {
                fired.confirm();
                tokio::time::sleep(Duration::from_millis(1)).await;
                Ok(())
            }))
            .await;

        let issues = collector.issues();
        assert_eq!(issues.len(), 1);
        assert_eq!(
            issues[0].kind,
            IssueKind::ConfirmationMiscounted {
                actual: 1,
                expected: "2...4".to_string()
            }
        );
        assert_eq!(issues[0].comments, vec!["a few".to_string()]);
    }

    #[test]
    fn test_expected_count() {
        assert!(ExpectedCount::from(0usize).contains(0));
        assert!(!ExpectedCount::from(1usize..=3).contains(4));
        assert_eq!(ExpectedCount::from(5usize).to_string(), "5");
    }
}
