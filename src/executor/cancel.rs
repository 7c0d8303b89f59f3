//! Cooperative cancellation
//!
//! A `CancellationToken` is threaded through step execution and checked at
//! step boundaries, before each case, and while awaiting exit tests.
//! Cancelling a token cancels its children but never its parent or siblings.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::Notify;

use crate::models::SkipInfo;

#[derive(Debug, Default)]
struct Inner {
    cancelled: AtomicBool,
    reason: Mutex<Option<SkipInfo>>,
    notify: Notify,
    children: Mutex<Vec<Weak<Inner>>>,
}

impl Inner {
    fn cancel(&self, reason: SkipInfo) {
        {
            let mut slot = self.reason.lock();
            if self.cancelled.load(Ordering::Acquire) {
                return;
            }
            *slot = Some(reason.clone());
            self.cancelled.store(true, Ordering::Release);
        }
        self.notify.notify_waiters();
        let children = std::mem::take(&mut *self.children.lock());
        for child in children.iter().filter_map(Weak::upgrade) {
            child.cancel(reason.clone());
        }
    }
}

/// Shared cancellation signal with parent-to-child propagation
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    inner: Arc<Inner>,
}

impl CancellationToken {
    /// Create a new non-cancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// A token cancelled whenever this one is
    pub fn child(&self) -> Self {
        let child = Self::new();
        {
            let mut children = self.inner.children.lock();
            children.retain(|c| c.strong_count() > 0);
            children.push(Arc::downgrade(&child.inner));
        }
        if self.is_cancelled() {
            child.inner.cancel(self.reason().unwrap_or_default());
        }
        child
    }

    /// Signal cancellation.
    pub fn cancel(&self) {
        self.inner.cancel(SkipInfo::default());
    }

    /// Signal cancellation with a reason; later calls keep the first reason
    pub fn cancel_with(&self, reason: SkipInfo) {
        self.inner.cancel(reason);
    }

    /// Check if cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    pub fn reason(&self) -> Option<SkipInfo> {
        self.inner.reason.lock().clone()
    }

    /// Resolve once this token is cancelled
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_cancel_propagates_down_only() {
        let parent = CancellationToken::new();
        let child = parent.child();
        let sibling = parent.child();
        let grandchild = child.child();

        child.cancel_with(SkipInfo::with_comment("flaky"));

        assert!(child.is_cancelled());
        assert!(grandchild.is_cancelled());
        assert!(!parent.is_cancelled());
        assert!(!sibling.is_cancelled());
        assert_eq!(
            grandchild.reason().and_then(|r| r.comment).as_deref(),
            Some("flaky")
        );
    }

    #[test]
    fn test_child_of_cancelled_token_starts_cancelled() {
        let parent = CancellationToken::new();
        parent.cancel();
        assert!(parent.child().is_cancelled());
    }

    #[test]
    fn test_first_reason_wins() {
        let token = CancellationToken::new();
        token.cancel_with(SkipInfo::with_comment("first"));
        token.cancel_with(SkipInfo::with_comment("second"));
        assert_eq!(token.reason().and_then(|r| r.comment).as_deref(), Some("first"));
    }

    #[tokio::test]
    async fn test_cancelled_wakes_waiters() {
        let token = CancellationToken::new();
        let waiter = {
            let token = token.clone();
            tokio::spawn(async move { token.cancelled().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        token.child().inner.cancel(SkipInfo::default());
        assert!(!token.is_cancelled());

        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter woke")
            .unwrap();
    }

    #[test]
    fn test_cancelled_returns_at_once_when_already_cancelled() {
        let token = CancellationToken::new();
        token.cancel();
        tokio_test::block_on(token.child().cancelled());
        assert!(token.child().is_cancelled());
    }
}
