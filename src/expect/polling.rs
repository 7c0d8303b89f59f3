//! Polling confirmations
//!
//! Sample a condition at a fixed interval until a deadline, either waiting
//! for it to pass once or checking that it never fails.

use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use crate::error::{is_control_flow, ConfigError};
use crate::executor::{record, TestContext};
use crate::models::{Issue, IssueKind, SourceLocation};

/// Interval and deadline of a polling confirmation
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollingOptions {
    interval: Duration,
    duration: Duration,
}

impl Default for PollingOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(1),
            duration: Duration::from_secs(1),
        }
    }
}

impl PollingOptions {
    pub fn new(interval: Duration, duration: Duration) -> Result<Self, ConfigError> {
        if interval.is_zero() {
            return Err(ConfigError::InvalidPolling("interval must be positive".to_string()));
        }
        if duration.is_zero() {
            return Err(ConfigError::InvalidPolling("duration must be positive".to_string()));
        }
        if interval > duration {
            return Err(ConfigError::InvalidPolling(format!(
                "interval {interval:?} exceeds duration {duration:?}"
            )));
        }
        Ok(Self { interval, duration })
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Behavior {
    PassesOnce,
    PassesAlways,
}

fn is_cancelled() -> bool {
    TestContext::current().is_some_and(|context| context.is_cancelled())
}

async fn poll<F, Fut>(
    behavior: Behavior,
    comment: String,
    options: PollingOptions,
    mut body: F,
    location: SourceLocation,
) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<bool>>,
{
    let deadline = Instant::now() + options.duration;
    let mut attempts = 0u32;
    let mut failed = false;
    loop {
        if is_cancelled() {
            debug!("Polling stopped by cancellation after {attempts} attempts");
            return false;
        }
        let passed = match tokio::time::timeout_at(deadline, body()).await {
            Ok(Ok(passed)) => passed,
            Ok(Err(error)) => {
                if !is_control_flow(&error) {
                    record(Issue::error_caught(&error, Some(location)));
                }
                return false;
            }
            Err(_) => {
                debug!("Polling deadline reached during attempt {}", attempts + 1);
                break;
            }
        };
        attempts += 1;
        match behavior {
            Behavior::PassesOnce if passed => return true,
            Behavior::PassesAlways if !passed => {
                failed = true;
                break;
            }
            _ => {}
        }
        if Instant::now() >= deadline {
            break;
        }
        tokio::time::sleep_until((Instant::now() + options.interval).min(deadline)).await;
        if Instant::now() >= deadline {
            break;
        }
    }

    let passed = behavior == Behavior::PassesAlways && !failed;
    if !passed && !is_cancelled() {
        record(Issue::new(IssueKind::PollingConfirmationFailed, Some(location)).with_comment(comment));
    }
    passed
}

/// Poll `body` until it returns `true` or the deadline passes
#[track_caller]
pub fn confirm_passes_eventually<F, Fut>(
    comment: impl Into<String>,
    options: PollingOptions,
    body: F,
) -> impl Future<Output = bool>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<bool>>,
{
    poll(Behavior::PassesOnce, comment.into(), options, body, SourceLocation::caller())
}

/// Poll `body` until the deadline, failing on the first `false`
#[track_caller]
pub fn confirm_always_passes<F, Fut>(
    comment: impl Into<String>,
    options: PollingOptions,
    body: F,
) -> impl Future<Output = bool>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<bool>>,
{
    poll(Behavior::PassesAlways, comment.into(), options, body, SourceLocation::caller())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Configuration;
    use crate::events::testing::Collector;
    use crate::models::{Test, TestId};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn context(collector: &Collector) -> Arc<TestContext> {
        let configuration = Configuration::new().with_event_handler(collector.handler());
        let test = Arc::new(Test::function(TestId::new(["T"]), || async { Ok(()) }));
        Arc::new(TestContext::detached(configuration).with_test(test, Default::default()))
    }

    fn options() -> PollingOptions {
        PollingOptions::new(Duration::from_millis(1), Duration::from_millis(200)).unwrap()
    }

    #[test]
    fn test_invalid_options() {
        let ms = Duration::from_millis;
        assert!(PollingOptions::new(Duration::ZERO, ms(10)).is_err());
        assert!(PollingOptions::new(ms(10), Duration::ZERO).is_err());
        assert!(PollingOptions::new(ms(20), ms(10)).is_err());
        assert!(PollingOptions::new(ms(5), ms(20)).is_ok());
    }

    #[tokio::test]
    async fn test_passes_eventually() {
        let collector = Collector::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let passed = context(&collector)
            .scope(confirm_passes_eventually("third time lucky", options(), move || {
                let counter = counter.clone();
                async move { Ok(counter.fetch_add(1, Ordering::Relaxed) >= 2) }
            }))
            .await;

        assert!(passed);
        assert_eq!(calls.load(Ordering::Relaxed), 3);
        assert!(collector.issues().is_empty());
    }

    #[tokio::test]
    async fn test_never_passing_records_issue() {
        let collector = Collector::default();
        let passed = context(&collector)
            .scope(confirm_passes_eventually("never", options(), || async { Ok(false) }))
            .await;

        assert!(!passed);
        let issues = collector.issues();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].kind, IssueKind::PollingConfirmationFailed);
    }

    #[tokio::test]
    async fn test_always_passes() {
        let collector = Collector::default();
        let ok = context(&collector)
            .scope(confirm_always_passes("steady", options(), || async { Ok(true) }))
            .await;
        assert!(ok);

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let ok = context(&collector)
            .scope(confirm_always_passes("wobbly", options(), move || {
                let counter = counter.clone();
                async move { Ok(counter.fetch_add(1, Ordering::Relaxed) < 3) }
            }))
            .await;
        assert!(!ok);
        assert_eq!(calls.load(Ordering::Relaxed), 4);
        assert_eq!(collector.issues().len(), 1);
    }

    #[tokio::test]
    async fn test_slow_body_stops_at_deadline() {
        let collector = Collector::default();
        let options = PollingOptions::new(Duration::from_millis(50), Duration::from_millis(100)).unwrap();
        let started = std::time::Instant::now();
        let passed = context(&collector)
            .scope(confirm_passes_eventually("slow", options, || async {
                tokio::time::sleep(Duration::from_millis(80)).await;
                Ok(false)
            }))
            .await;
        let elapsed = started.elapsed();

        assert!(!passed);
        assert!(elapsed < Duration::from_millis(150), "took {elapsed:?}");
        assert_eq!(collector.issues()[0].kind, IssueKind::PollingConfirmationFailed);
    }

    #[tokio::test]
    async fn test_always_passes_until_deadline_with_slow_body() {
        let collector = Collector::default();
        let options = PollingOptions::new(Duration::from_millis(10), Duration::from_millis(60)).unwrap();
        let passed = context(&collector)
            .scope(confirm_always_passes("slow but steady", options, || async {
                tokio::time::sleep(Duration::from_millis(40)).await;
                Ok(true)
            }))
            .await;

        assert!(passed);
        assert!(collector.issues().is_empty());
    }

    #[tokio::test]
    async fn test_body_error_is_recorded() {
        let collector = Collector::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let passed = context(&collector)
            .scope(confirm_always_passes("errs", options(), move || {
                counter.fetch_add(1, Ordering::Relaxed);
                async { Err::<bool, _>(anyhow::anyhow!("db connection refused")) }
            }))
            .await;

        assert!(!passed);
        assert_eq!(calls.load(Ordering::Relaxed), 1);
        let issues = collector.issues();
        assert_eq!(issues.len(), 1);
        assert!(matches!(&issues[0].kind, IssueKind::ErrorCaught { .. }));
        assert!(issues[0].description().contains("db connection refused"));
    }

    #[tokio::test]
    async fn test_control_flow_error_stops_quietly() {
        let collector = Collector::default();
        let passed = context(&collector)
            .scope(confirm_passes_eventually("cancelled", options(), || async {
                Err::<bool, _>(anyhow::Error::new(crate::error::CancellationError::default()))
            }))
            .await;

        assert!(!passed);
        assert!(collector.issues().is_empty());
    }
}
