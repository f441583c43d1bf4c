//! One chat screen's worth of state: the merged message list, loading and
//! sending flags, and who is typing, with change events for a UI.

use std::sync::Arc;
use std::time::Duration;

use potluck_backend::Backend;
use potluck_config::ChatConfig;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::debounce::TypingDebouncer;
use crate::error::ChatError;
use crate::message::Message;
use crate::presence::{TypingPublisher, TypingSubscription, TypingTracker};
use crate::pump::SubscriptionTask;
use crate::reconciler::{validate_body, MessageStream};
use crate::timeline::MessageTimeline;
use crate::typing::TypingUser;

const EVENT_BUFFER: usize = 256;

/// Change notifications for a UI.
///
/// Events are hints to redraw; the session state is authoritative. When
/// the receiver falls behind by more than the buffer, further events are
/// dropped rather than holding up the session.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    /// A history load finished. `count` is the size of the merged list.
    HistoryLoaded { count: usize, failed: bool },
    MessageAdded(Message),
    MessageRemoved { id: String },
    TypingChanged(Vec<TypingUser>),
}

/// Point-in-time copy of everything a chat screen renders.
#[derive(Debug, Clone)]
pub struct ChatView {
    pub messages: Vec<Message>,
    pub is_loading: bool,
    pub is_sending: bool,
    pub history_failed: bool,
    pub typing_users: Vec<TypingUser>,
}

#[derive(Default)]
struct ChatState {
    timeline: MessageTimeline,
    loading: bool,
    sending: bool,
    history_failed: bool,
}

pub struct ChatSession {
    stream: MessageStream,
    state: Arc<RwLock<ChatState>>,
    events: mpsc::Sender<ChatEvent>,
    inserts: SubscriptionTask,
    typing: TypingSubscription,
    debouncer: TypingDebouncer,
    typing_forwarder: JoinHandle<()>,
    history_limit: usize,
}

impl ChatSession {
    /// Subscribe to inserts and typing, then load history.
    ///
    /// History is fetched only once the insert feed has been acknowledged
    /// by the backend, so nothing inserted in between is missed.
    pub async fn start(backend: &Backend, config: &ChatConfig) -> (Self, mpsc::Receiver<ChatEvent>) {
        let (events, events_rx) = mpsc::channel(EVENT_BUFFER);
        let stream = MessageStream::new(backend, config.table.clone());
        let state = Arc::new(RwLock::new(ChatState {
            loading: true,
            ..ChatState::default()
        }));

        let inserts = {
            let state = Arc::clone(&state);
            let events = events.clone();
            stream.subscribe_to_inserts(move |msg| {
                let state = Arc::clone(&state);
                let events = events.clone();
                async move {
                    let added = state.write().await.timeline.push(msg.clone());
                    if added {
                        emit(&events, ChatEvent::MessageAdded(msg));
                    }
                }
            })
        };

        let local_user_id = backend.auth.current_identity().await.map(|i| i.user_id);
        let tracker = TypingTracker::new(
            Duration::from_millis(config.typing_timeout_ms),
            local_user_id,
        );
        let typing_forwarder = forward_typing(tracker.watch(), events.clone());
        let typing = tracker.listen(
            Arc::clone(&backend.broadcast),
            &config.typing_channel,
            &config.typing_event,
        );
        let debouncer = TypingDebouncer::new(
            TypingPublisher::new(backend, config.typing_channel.clone(), config.typing_event.clone()),
            Duration::from_millis(config.typing_debounce_ms),
        );

        if !inserts.opened().await {
            warn!(table = %config.table, "Live updates unavailable, showing history only");
        }

        let session = Self {
            stream,
            state,
            events,
            inserts,
            typing,
            debouncer,
            typing_forwarder,
            history_limit: config.history_limit,
        };
        session.reload().await;
        info!(table = %config.table, "Chat session started");
        (session, events_rx)
    }

    // -- Reads ---------------------------------------------------------------

    pub async fn messages(&self) -> Vec<Message> {
        self.state.read().await.timeline.messages().to_vec()
    }

    pub async fn is_loading(&self) -> bool {
        self.state.read().await.loading
    }

    pub async fn is_sending(&self) -> bool {
        self.state.read().await.sending
    }

    /// Whether the last history load failed. The message list still reads
    /// as whatever was already held (empty on first load).
    pub async fn history_failed(&self) -> bool {
        self.state.read().await.history_failed
    }

    pub fn typing_users(&self) -> Vec<TypingUser> {
        self.typing.tracker().typing_users()
    }

    pub fn typing_tracker(&self) -> &TypingTracker {
        self.typing.tracker()
    }

    pub fn debouncer(&self) -> &TypingDebouncer {
        &self.debouncer
    }

    pub async fn view(&self) -> ChatView {
        let state = self.state.read().await;
        ChatView {
            messages: state.timeline.messages().to_vec(),
            is_loading: state.loading,
            is_sending: state.sending,
            history_failed: state.history_failed,
            typing_users: self.typing_users(),
        }
    }

    // -- Actions -------------------------------------------------------------

    /// Reload the history window and merge it with live arrivals.
    pub async fn reload(&self) {
        self.state.write().await.loading = true;
        let result = self.stream.try_load_history(self.history_limit).await;

        let (count, failed) = {
            let mut state = self.state.write().await;
            let failed = match result {
                Ok(history) => {
                    state.timeline.replace_history(history);
                    false
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load message history");
                    true
                }
            };
            state.history_failed = failed;
            state.loading = false;
            (state.timeline.len(), failed)
        };
        emit(&self.events, ChatEvent::HistoryLoaded { count, failed });
    }

    /// Send a message. The sent row shows up through the insert feed, not
    /// as an optimistic local entry.
    pub async fn send(&self, body: &str) -> Result<(), ChatError> {
        validate_body(body)?;
        self.debouncer.on_send().await;

        self.state.write().await.sending = true;
        let result = self.stream.send(body).await;
        self.state.write().await.sending = false;
        result
    }

    pub async fn delete(&self, id: &str) -> Result<(), ChatError> {
        self.stream.delete(id).await?;
        let removed = self.state.write().await.timeline.remove(id);
        if removed {
            emit(&self.events, ChatEvent::MessageRemoved { id: id.to_string() });
        }
        Ok(())
    }

    /// Call on every local keystroke.
    pub async fn notify_typing(&self) {
        self.debouncer.notify().await;
    }

    /// Release subscriptions and timers. Dropping the session does the
    /// same without waiting.
    pub async fn close(&mut self) {
        self.debouncer.close();
        self.typing.shutdown().await;
        self.inserts.shutdown().await;
        self.typing_forwarder.abort();
        info!(table = %self.stream.table(), "Chat session closed");
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        self.typing_forwarder.abort();
    }
}

/// Queue an event without waiting. Returns false once the receiver is gone.
fn emit(events: &mpsc::Sender<ChatEvent>, event: ChatEvent) -> bool {
    match events.try_send(event) {
        Ok(()) => true,
        Err(TrySendError::Full(event)) => {
            debug!(?event, "Event buffer full, dropping event");
            true
        }
        Err(TrySendError::Closed(_)) => false,
    }
}

fn forward_typing(
    mut changes: watch::Receiver<Vec<TypingUser>>,
    events: mpsc::Sender<ChatEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while changes.changed().await.is_ok() {
            let users = changes.borrow_and_update().clone();
            if !emit(&events, ChatEvent::TypingChanged(users)) {
                break;
            }
        }
    })
}
