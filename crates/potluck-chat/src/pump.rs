//! Background tasks that own a backend subscription and feed a handler.

use std::future::Future;

use potluck_backend::Subscription;
use potluck_common::BackendError;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Handle to a running subscription pump.
///
/// The pump opens the subscription in the background, so the handle exists
/// (and can be closed) before the subscription is established. Closing is
/// idempotent and also happens on drop; the backend subscription is
/// released when the pump exits.
pub struct SubscriptionTask {
    cancel: CancellationToken,
    opened: watch::Receiver<bool>,
    task: Option<JoinHandle<()>>,
}

impl SubscriptionTask {
    pub(crate) fn spawn<T, O, H, Fut>(what: &'static str, open: O, mut handler: H) -> Self
    where
        T: Send + 'static,
        O: Future<Output = Result<Subscription<T>, BackendError>> + Send + 'static,
        H: FnMut(T) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let (opened_tx, opened) = watch::channel(false);

        let task = tokio::spawn(async move {
            let result = tokio::select! {
                biased;
                _ = token.cancelled() => {
                    debug!(what, "Closed before subscription opened");
                    return;
                }
                result = open => result,
            };
            let mut sub = match result {
                Ok(sub) => sub,
                Err(e) => {
                    warn!(what, error = %e, "Failed to open subscription");
                    return;
                }
            };
            debug!(what, "Subscription open");
            opened_tx.send_replace(true);

            loop {
                let item = tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    item = sub.recv() => item,
                };
                match item {
                    Some(item) => handler(item).await,
                    None => {
                        debug!(what, "Subscription stream ended");
                        break;
                    }
                }
            }
            sub.close();
        });

        Self {
            cancel,
            opened,
            task: Some(task),
        }
    }

    /// Wait until the subscription is established. Returns `false` if it
    /// closed or failed first.
    pub async fn opened(&self) -> bool {
        let mut opened = self.opened.clone();
        let result = opened.wait_for(|open| *open).await.is_ok();
        result
    }

    /// Stop delivering. Safe to call any number of times.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Close and wait until the backend subscription has been released.
    pub async fn shutdown(&mut self) {
        self.close();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for SubscriptionTask {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
