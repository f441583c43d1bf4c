//! Typing presence: who else is typing right now.
//!
//! Typing signals travel over a lossy broadcast channel, so a "stopped"
//! event may never arrive. Each remote user therefore gets one expiry timer.
//! A "typing" event only pushes the entry's deadline back; the timer wakes
//! at its old deadline, sees the new one, and sleeps again. Timers carry the
//! generation of the entry they were started for, so a timer that raced
//! with its own abort can never remove a newer entry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use potluck_backend::{AuthProvider, Backend, BroadcastChannel};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::pump::SubscriptionTask;
use crate::typing::{TypingEvent, TypingUser};

// ---------------------------------------------------------------------------
// Tracker
// ---------------------------------------------------------------------------

struct Entry {
    user: TypingUser,
    generation: u64,
    /// Order of first appearance, for a stable display order.
    seq: u64,
    deadline: Instant,
    timer: JoinHandle<()>,
}

#[derive(Default)]
struct Table {
    entries: HashMap<String, Entry>,
    next_generation: u64,
    next_seq: u64,
    closed: bool,
    #[cfg(test)]
    timers_started: usize,
}

impl Table {
    fn snapshot(&self) -> Vec<TypingUser> {
        let mut entries: Vec<&Entry> = self.entries.values().collect();
        entries.sort_by_key(|e| e.seq);
        entries.into_iter().map(|e| e.user.clone()).collect()
    }
}

struct Inner {
    table: Mutex<Table>,
    expiry: Duration,
    local_user_id: Option<String>,
    changes: watch::Sender<Vec<TypingUser>>,
}

fn lock(table: &Mutex<Table>) -> MutexGuard<'_, Table> {
    table.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// The set of remote users currently typing.
///
/// Cheap to clone; clones share state. Must be fed from inside a tokio
/// runtime since expiry timers are spawned tasks.
#[derive(Clone)]
pub struct TypingTracker {
    inner: Arc<Inner>,
}

impl TypingTracker {
    /// `local_user_id` identifies this client's own events, which are
    /// ignored.
    pub fn new(expiry: Duration, local_user_id: Option<String>) -> Self {
        let (changes, _) = watch::channel(Vec::new());
        Self {
            inner: Arc::new(Inner {
                table: Mutex::new(Table::default()),
                expiry,
                local_user_id,
                changes,
            }),
        }
    }

    pub fn expiry(&self) -> Duration {
        self.inner.expiry
    }

    /// Fold one typing event into the set.
    pub fn apply(&self, event: &TypingEvent) {
        if self.inner.local_user_id.as_deref() == Some(event.user_id.as_str()) {
            trace!(user_id = %event.user_id, "Ignoring own typing event");
            return;
        }

        let mut table = lock(&self.inner.table);
        if table.closed {
            return;
        }

        if !event.is_typing {
            if let Some(entry) = table.entries.remove(&event.user_id) {
                entry.timer.abort();
                debug!(user_id = %event.user_id, "Stopped typing");
                self.publish(&table);
            }
            return;
        }

        let deadline = Instant::now() + self.inner.expiry;
        let user = TypingUser::from(event);
        if let Some(entry) = table.entries.get_mut(&event.user_id) {
            entry.deadline = deadline;
            if entry.user != user {
                entry.user = user;
                self.publish(&table);
            }
            return;
        }

        table.next_generation += 1;
        table.next_seq += 1;
        let generation = table.next_generation;
        let seq = table.next_seq;
        #[cfg(test)]
        {
            table.timers_started += 1;
        }
        let timer = self.spawn_expiry(event.user_id.clone(), generation, deadline);
        table.entries.insert(
            event.user_id.clone(),
            Entry {
                user,
                generation,
                seq,
                deadline,
                timer,
            },
        );
        debug!(user_id = %event.user_id, "Started typing");
        self.publish(&table);
    }

    fn spawn_expiry(&self, user_id: String, generation: u64, deadline: Instant) -> JoinHandle<()> {
        let inner = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            let mut deadline = deadline;
            loop {
                tokio::time::sleep_until(deadline).await;
                match expire(&inner, &user_id, generation) {
                    Wake::Rearm(next) => deadline = next,
                    Wake::Done => break,
                }
            }
        })
    }

    fn publish(&self, table: &Table) {
        self.inner.changes.send_replace(table.snapshot());
    }

    /// Users currently typing, in order of first appearance.
    pub fn typing_users(&self) -> Vec<TypingUser> {
        lock(&self.inner.table).snapshot()
    }

    /// Change notifications. The current value is always the latest set.
    pub fn watch(&self) -> watch::Receiver<Vec<TypingUser>> {
        self.inner.changes.subscribe()
    }

    /// Expiry timers still scheduled.
    pub fn pending_timers(&self) -> usize {
        lock(&self.inner.table)
            .entries
            .values()
            .filter(|e| !e.timer.is_finished())
            .count()
    }

    /// Cancel every timer and clear the set. Later events and timer
    /// firings are ignored.
    pub fn teardown(&self) {
        let mut table = lock(&self.inner.table);
        if table.closed {
            return;
        }
        table.closed = true;
        for (_, entry) in table.entries.drain() {
            entry.timer.abort();
        }
        self.publish(&table);
        debug!("Typing tracker torn down");
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.inner.table).closed
    }

    /// Feed the tracker from a broadcast channel.
    pub fn listen(
        &self,
        broadcast: Arc<dyn BroadcastChannel>,
        channel: &str,
        event: &str,
    ) -> TypingSubscription {
        let channel = channel.to_string();
        let event = event.to_string();
        let tracker = self.clone();
        let task = SubscriptionTask::spawn(
            "typing broadcasts",
            async move { broadcast.subscribe(&channel, &event).await },
            move |payload: serde_json::Value| {
                match TypingEvent::from_payload(&payload) {
                    Some(event) => tracker.apply(&event),
                    None => debug!(%payload, "Ignoring malformed typing payload"),
                }
                std::future::ready(())
            },
        );
        TypingSubscription {
            task,
            tracker: self.clone(),
        }
    }
}

/// What an expiry timer should do after waking.
#[derive(Debug, PartialEq, Eq)]
enum Wake {
    /// The entry was refreshed; sleep until its new deadline.
    Rearm(Instant),
    Done,
}

fn expire(inner: &Weak<Inner>, user_id: &str, generation: u64) -> Wake {
    let Some(inner) = inner.upgrade() else {
        return Wake::Done;
    };
    let mut table = lock(&inner.table);
    if table.closed {
        return Wake::Done;
    }
    let deadline = match table.entries.get(user_id) {
        Some(entry) if entry.generation == generation => entry.deadline,
        _ => return Wake::Done,
    };
    if deadline > Instant::now() {
        return Wake::Rearm(deadline);
    }
    table.entries.remove(user_id);
    debug!(user_id, "Typing expired");
    inner.changes.send_replace(table.snapshot());
    Wake::Done
}

/// A broadcast listener bound to a tracker. Closing it (explicitly or by
/// drop) stops delivery and tears the tracker down.
pub struct TypingSubscription {
    task: SubscriptionTask,
    tracker: TypingTracker,
}

impl TypingSubscription {
    pub fn tracker(&self) -> &TypingTracker {
        &self.tracker
    }

    pub fn close(&self) {
        self.task.close();
        self.tracker.teardown();
    }

    pub async fn shutdown(&mut self) {
        self.tracker.teardown();
        self.task.shutdown().await;
    }
}

impl Drop for TypingSubscription {
    fn drop(&mut self) {
        self.close();
    }
}

// ---------------------------------------------------------------------------
// Publisher
// ---------------------------------------------------------------------------

/// Sends this client's typing state.
#[derive(Clone)]
pub struct TypingPublisher {
    broadcast: Arc<dyn BroadcastChannel>,
    auth: Arc<dyn AuthProvider>,
    channel: String,
    event: String,
}

impl TypingPublisher {
    pub fn new(backend: &Backend, channel: impl Into<String>, event: impl Into<String>) -> Self {
        Self {
            broadcast: Arc::clone(&backend.broadcast),
            auth: Arc::clone(&backend.auth),
            channel: channel.into(),
            event: event.into(),
        }
    }

    /// Broadcast the local user's typing state. Does nothing when signed
    /// out; delivery failures are logged, never returned.
    pub async fn publish_typing(&self, is_typing: bool) {
        let Some(identity) = self.auth.current_identity().await else {
            trace!("No session, not publishing typing state");
            return;
        };
        let event = TypingEvent::new(identity.user_id, identity.email, is_typing);
        if let Err(e) = self
            .broadcast
            .publish(&self.channel, &self.event, event.to_payload())
            .await
        {
            warn!(channel = %self.channel, error = %e, "Failed to publish typing state");
        }
    }
}
