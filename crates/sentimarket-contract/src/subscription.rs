//! Cancellation handles for event subscriptions

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;

#[derive(Debug)]
pub(crate) struct Subscription {
    id: u64,
    cancelled: AtomicBool,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Subscription {
    pub(crate) fn new(id: u64) -> Arc<Self> {
        Arc::new(Self {
            id,
            cancelled: AtomicBool::new(false),
            task: Mutex::new(None),
        })
    }

    /// Hand over the delivery task; aborted at once if already cancelled
    pub(crate) fn attach(&self, task: JoinHandle<()>) {
        let mut slot = self.task.lock();
        if self.cancelled.load(Ordering::SeqCst) {
            task.abort();
        } else {
            *slot = Some(task);
        }
    }

    pub(crate) fn cancel(&self) -> bool {
        if self.cancelled.swap(true, Ordering::SeqCst) {
            return false;
        }
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
        true
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Handle returned by `subscribe_to_results`.
///
/// [`cancel`](Self::cancel) removes exactly this subscription; calling it
/// again is a no-op. Dropping the handle does not cancel. All subscriptions
/// are cancelled when the contract session unbinds.
#[derive(Debug, Clone)]
pub struct SubscriptionHandle {
    inner: Arc<Subscription>,
}

impl SubscriptionHandle {
    pub(crate) fn new(inner: Arc<Subscription>) -> Self {
        Self { inner }
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Stop delivery to this subscription's callback
    pub fn cancel(&self) {
        if self.inner.cancel() {
            tracing::debug!(subscription = self.inner.id, "Result subscription cancelled");
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cancel_is_idempotent() {
        let sub = Subscription::new(7);
        sub.attach(tokio::spawn(std::future::pending::<()>()));
        let handle = SubscriptionHandle::new(sub.clone());

        assert!(!handle.is_cancelled());
        handle.cancel();
        handle.cancel();
        assert!(handle.is_cancelled());
        assert!(sub.task.lock().is_none());
        assert!(!sub.cancel());
    }

    #[tokio::test]
    async fn test_attach_after_cancel_aborts_task() {
        let sub = Subscription::new(1);
        sub.cancel();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let _tx = tx;
            std::future::pending::<()>().await
        });
        sub.attach(task);
        // the aborted task drops its sender
        assert!(rx.await.is_err());
    }
}
