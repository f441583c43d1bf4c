//! Local typing signal: "typing" on every keystroke, "stopped" after a
//! quiet period or on send.

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::trace;

use crate::presence::TypingPublisher;

pub struct TypingDebouncer {
    publisher: TypingPublisher,
    delay: Duration,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl TypingDebouncer {
    pub fn new(publisher: TypingPublisher, delay: Duration) -> Self {
        Self {
            publisher,
            delay,
            pending: Mutex::new(None),
        }
    }

    fn pending(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record a keystroke: publish "typing" and restart the stop timer.
    pub async fn notify(&self) {
        let publisher = self.publisher.clone();
        let delay = self.delay;
        let timer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            trace!("Typing went quiet");
            publisher.publish_typing(false).await;
        });
        if let Some(previous) = self.pending().replace(timer) {
            previous.abort();
        }
        self.publisher.publish_typing(true).await;
    }

    /// A message was sent: publish "stopped" now and drop the timer.
    pub async fn on_send(&self) {
        self.cancel();
        self.publisher.publish_typing(false).await;
    }

    /// Drop the timer without publishing.
    pub fn close(&self) {
        self.cancel();
    }

    /// Whether a "stopped" publish is still scheduled.
    pub fn has_pending(&self) -> bool {
        self.pending()
            .as_ref()
            .is_some_and(|timer| !timer.is_finished())
    }

    fn cancel(&self) {
        if let Some(timer) = self.pending().take() {
            timer.abort();
        }
    }
}

impl Drop for TypingDebouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use potluck_backend::{Backend, MemoryBackend};
    use potluck_common::Identity;
    use std::sync::Arc;
    use tokio::time::{sleep, Instant};

    const DELAY: Duration = Duration::from_millis(1500);

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn setup() -> (Arc<MemoryBackend>, TypingDebouncer) {
        let memory = Arc::new(MemoryBackend::with_identity(Identity::new("me", None)));
        let publisher = TypingPublisher::new(&Backend::memory(Arc::clone(&memory)), "c", "typing");
        (memory, TypingDebouncer::new(publisher, DELAY))
    }

    /// `(is_typing, elapsed since start)` for each publish.
    fn publishes(memory: &MemoryBackend, start: Instant) -> Vec<(bool, Duration)> {
        memory
            .published()
            .into_iter()
            .map(|p| (p.payload["is_typing"] == true, p.at - start))
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn stop_follows_last_keystroke() {
        let (memory, debouncer) = setup();
        let start = Instant::now();

        debouncer.notify().await;
        sleep(ms(500)).await;
        debouncer.notify().await;
        sleep(ms(500)).await;
        debouncer.notify().await;
        assert!(debouncer.has_pending());

        sleep(ms(2000)).await;
        assert!(!debouncer.has_pending());
        assert_eq!(
            publishes(&memory, start),
            [
                (true, ms(0)),
                (true, ms(500)),
                (true, ms(1000)),
                (false, ms(2500)),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn send_stops_immediately_and_cancels_timer() {
        let (memory, debouncer) = setup();
        let start = Instant::now();

        debouncer.notify().await;
        sleep(ms(10)).await;
        debouncer.on_send().await;
        assert!(!debouncer.has_pending());

        sleep(ms(3000)).await;
        assert_eq!(
            publishes(&memory, start),
            [(true, ms(0)), (false, ms(10))]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn close_drops_timer_silently() {
        let (memory, debouncer) = setup();
        debouncer.notify().await;
        debouncer.close();
        sleep(ms(3000)).await;
        assert_eq!(memory.published().len(), 1);
    }
}
