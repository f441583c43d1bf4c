//! Owned subscription handles.
//!
//! A [`SubscriptionGuard`] runs its release action exactly once, either on
//! an explicit `close()` or when dropped. A [`Subscription`] pairs a guard
//! with the receiving end of the stream it protects.

use std::sync::Mutex;

use tokio::sync::mpsc;

type CloseFn = Box<dyn FnOnce() + Send>;

pub struct SubscriptionGuard {
    on_close: Mutex<Option<CloseFn>>,
}

impl SubscriptionGuard {
    pub fn new(on_close: impl FnOnce() + Send + 'static) -> Self {
        Self {
            on_close: Mutex::new(Some(Box::new(on_close))),
        }
    }

    /// A guard with nothing to release.
    pub fn noop() -> Self {
        Self {
            on_close: Mutex::new(None),
        }
    }

    /// Release the underlying resource. Later calls do nothing.
    pub fn close(&self) {
        let action = self
            .on_close
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(action) = action {
            action();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.on_close
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .is_none()
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for SubscriptionGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionGuard")
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// A stream of items plus the guard that keeps it open.
pub struct Subscription<T> {
    rx: mpsc::Receiver<T>,
    guard: SubscriptionGuard,
}

impl<T> Subscription<T> {
    pub fn new(rx: mpsc::Receiver<T>, guard: SubscriptionGuard) -> Self {
        Self { rx, guard }
    }

    /// Next item, or `None` once the source is gone or the subscription closed.
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Next item if one is already buffered.
    pub fn try_recv(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    pub fn close(&mut self) {
        self.guard.close();
        self.rx.close();
    }

    /// Split into the receiver and the guard so a pump task can own the
    /// stream while the caller keeps the guard.
    pub fn into_parts(self) -> (mpsc::Receiver<T>, SubscriptionGuard) {
        (self.rx, self.guard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting_guard() -> (SubscriptionGuard, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let guard = SubscriptionGuard::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        (guard, count)
    }

    #[test]
    fn close_runs_once() {
        let (guard, count) = counting_guard();
        guard.close();
        guard.close();
        assert!(guard.is_closed());
        drop(guard);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn drop_closes() {
        let (guard, count) = counting_guard();
        drop(guard);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn noop_guard_is_closed() {
        assert!(SubscriptionGuard::noop().is_closed());
    }

    #[tokio::test]
    async fn subscription_close_ends_stream() {
        let (tx, rx) = mpsc::channel(4);
        let (guard, count) = counting_guard();
        let mut sub = Subscription::new(rx, guard);

        tx.send(1).await.unwrap();
        assert_eq!(sub.recv().await, Some(1));

        sub.close();
        assert!(tx.send(2).await.is_err());
        assert_eq!(sub.recv().await, None);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn into_parts_keeps_guard_alive() {
        let (_tx, rx) = mpsc::channel::<u8>(1);
        let (guard, count) = counting_guard();
        let (_rx, guard) = Subscription::new(rx, guard).into_parts();
        assert_eq!(count.load(Ordering::SeqCst), 0);
        drop(guard);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
