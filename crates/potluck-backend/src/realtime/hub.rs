//! Routes realtime events to per-subscription streams.
//!
//! Each subscription registers a route on a topic. The first route on a
//! topic joins the channel; closing the last one leaves it. Topics joined
//! only to publish stay joined until the hub disconnects.
//!
//! A subscription resolves only once the server has acknowledged the join,
//! so anything written after `subscribe*` returns is delivered.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use potluck_common::BackendError;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use super::client::RealtimeClient;
use super::types::{BroadcastConfig, ChannelConfig, PostgresChangeFilter, RealtimeConfig, RealtimeEvent};
use crate::subscription::{Subscription, SubscriptionGuard};
use crate::{BroadcastChannel, ChangeFeed, Row};

const ROUTE_BUFFER: usize = 128;
const JOIN_TIMEOUT: Duration = Duration::from_secs(10);

type JoinWaiter = oneshot::Sender<Result<(), String>>;

enum RouteKind {
    Broadcast {
        event: String,
        tx: mpsc::Sender<serde_json::Value>,
    },
    Inserts {
        table: String,
        tx: mpsc::Sender<Row>,
    },
}

struct Route {
    id: u64,
    kind: RouteKind,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
enum JoinState {
    #[default]
    Idle,
    Joining,
    Joined,
}

#[derive(Default)]
struct Topic {
    routes: Vec<Route>,
    /// Joined for publishing; never left on last unsubscribe.
    pinned: bool,
    state: JoinState,
    /// Subscribers waiting for the server's join reply.
    waiters: Vec<JoinWaiter>,
}

impl Topic {
    fn settle(&mut self, outcome: Result<(), String>) {
        self.state = if outcome.is_ok() {
            JoinState::Joined
        } else {
            JoinState::Idle
        };
        for waiter in self.waiters.drain(..) {
            let _ = waiter.send(outcome.clone());
        }
    }
}

#[derive(Default)]
struct RouteTable {
    topics: HashMap<String, Topic>,
}

/// Outcome of registering a route.
enum Registered {
    /// First use of the topic; send the join and wait for its reply.
    NeedsJoin(oneshot::Receiver<Result<(), String>>),
    /// A join is already in flight; wait for its reply.
    Pending(oneshot::Receiver<Result<(), String>>),
    AlreadyJoined,
}

pub struct RealtimeHub {
    client: RealtimeClient,
    table: Arc<Mutex<RouteTable>>,
    next_route: AtomicU64,
    router: tokio::task::JoinHandle<()>,
}

fn lock(table: &Mutex<RouteTable>) -> MutexGuard<'_, RouteTable> {
    table.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl RealtimeHub {
    /// Open the realtime connection and start routing its events.
    pub fn connect(config: RealtimeConfig) -> Self {
        let (client, events) = RealtimeClient::connect(config);
        Self::with_client(client, events)
    }

    pub(crate) fn with_client(
        client: RealtimeClient,
        events: mpsc::Receiver<RealtimeEvent>,
    ) -> Self {
        let table = Arc::new(Mutex::new(RouteTable::default()));
        let router = tokio::spawn(route_events(events, Arc::clone(&table)));
        Self {
            client,
            table,
            next_route: AtomicU64::new(1),
            router,
        }
    }

    pub fn client(&self) -> &RealtimeClient {
        &self.client
    }

    fn register(&self, topic: &str, kind: RouteKind) -> (u64, Registered) {
        let id = self.next_route.fetch_add(1, Ordering::Relaxed);
        let mut table = lock(&self.table);
        let entry = table.topics.entry(topic.to_string()).or_default();
        entry.routes.push(Route { id, kind });
        let state = entry.state;
        let registered = match state {
            JoinState::Joined => Registered::AlreadyJoined,
            JoinState::Idle | JoinState::Joining => {
                let (tx, rx) = oneshot::channel();
                entry.waiters.push(tx);
                entry.state = JoinState::Joining;
                if state == JoinState::Idle {
                    Registered::NeedsJoin(rx)
                } else {
                    Registered::Pending(rx)
                }
            }
        };
        (id, registered)
    }

    /// Guard that removes route `id` and leaves `topic` once it is empty.
    fn route_guard(&self, topic: &str, id: u64) -> SubscriptionGuard {
        let table = Arc::clone(&self.table);
        let client = self.client.clone();
        let topic = topic.to_string();
        SubscriptionGuard::new(move || {
            let leave = {
                let mut table = lock(&table);
                match table.topics.get_mut(&topic) {
                    Some(entry) => {
                        entry.routes.retain(|r| r.id != id);
                        let empty = entry.routes.is_empty() && !entry.pinned;
                        if empty {
                            table.topics.remove(&topic);
                        }
                        empty
                    }
                    None => false,
                }
            };
            if leave {
                debug!(topic = %topic, "Last subscriber gone, leaving channel");
                client.request_leave(&topic);
            }
        })
    }

    async fn join_after_register(
        &self,
        topic: &str,
        id: u64,
        registered: Registered,
        config: ChannelConfig,
    ) -> Result<SubscriptionGuard, BackendError> {
        // Dropping the guard on failure unregisters the route.
        let guard = self.route_guard(topic, id);
        let reply = match registered {
            Registered::AlreadyJoined => return Ok(guard),
            Registered::Pending(reply) => reply,
            Registered::NeedsJoin(reply) => {
                if let Err(e) = self.client.join_channel(topic, config).await {
                    self.fail_join(topic, "join request failed");
                    return Err(e);
                }
                reply
            }
        };

        match tokio::time::timeout(JOIN_TIMEOUT, reply).await {
            Ok(Ok(Ok(()))) => Ok(guard),
            Ok(Ok(Err(message))) => Err(BackendError::Realtime(format!(
                "join {topic} rejected: {message}"
            ))),
            Ok(Err(_)) => Err(BackendError::Closed),
            Err(_) => {
                self.fail_join(topic, "join timed out");
                Err(BackendError::Realtime(format!("join {topic} timed out")))
            }
        }
    }

    /// Give up on an in-flight join so the next subscriber retries it.
    fn fail_join(&self, topic: &str, message: &str) {
        if let Some(entry) = lock(&self.table).topics.get_mut(topic) {
            if entry.state == JoinState::Joining {
                entry.settle(Err(message.to_string()));
            }
        }
    }

    /// Leave every channel and stop the connection.
    pub async fn disconnect(&self) {
        self.client.disconnect().await;
        lock(&self.table).topics.clear();
    }
}

impl Drop for RealtimeHub {
    fn drop(&mut self) {
        self.router.abort();
    }
}

fn inserts_topic(table: &str) -> String {
    format!("db-inserts:{table}")
}

fn broadcast_config() -> ChannelConfig {
    ChannelConfig {
        broadcast: BroadcastConfig {
            self_send: false,
            ack: false,
        },
        postgres_changes: Vec::new(),
    }
}

#[async_trait]
impl ChangeFeed for RealtimeHub {
    async fn subscribe_inserts(&self, table: &str) -> Result<Subscription<Row>, BackendError> {
        let topic = inserts_topic(table);
        let (tx, rx) = mpsc::channel(ROUTE_BUFFER);
        let (id, registered) = self.register(
            &topic,
            RouteKind::Inserts {
                table: table.to_string(),
                tx,
            },
        );
        let config = ChannelConfig {
            broadcast: BroadcastConfig::default(),
            postgres_changes: vec![PostgresChangeFilter::inserts(table)],
        };
        let guard = self.join_after_register(&topic, id, registered, config).await?;
        debug!(table = %table, route = id, "Subscribed to row inserts");
        Ok(Subscription::new(rx, guard))
    }
}

#[async_trait]
impl BroadcastChannel for RealtimeHub {
    async fn publish(
        &self,
        channel: &str,
        event: &str,
        payload: serde_json::Value,
    ) -> Result<(), BackendError> {
        let needs_join = {
            let mut table = lock(&self.table);
            let entry = table.topics.entry(channel.to_string()).or_default();
            entry.pinned = true;
            let idle = entry.state == JoinState::Idle;
            if idle {
                entry.state = JoinState::Joining;
            }
            idle
        };
        if needs_join {
            self.client.join_channel(channel, broadcast_config()).await?;
        }
        self.client.broadcast(channel, event, payload).await
    }

    async fn subscribe(
        &self,
        channel: &str,
        event: &str,
    ) -> Result<Subscription<serde_json::Value>, BackendError> {
        let (tx, rx) = mpsc::channel(ROUTE_BUFFER);
        let (id, registered) = self.register(
            channel,
            RouteKind::Broadcast {
                event: event.to_string(),
                tx,
            },
        );
        let guard = self
            .join_after_register(channel, id, registered, broadcast_config())
            .await?;
        debug!(channel = %channel, event = %event, route = id, "Subscribed to broadcast");
        Ok(Subscription::new(rx, guard))
    }
}

/// A delivery resolved under the lock and performed after releasing it.
enum Delivery {
    Broadcast(mpsc::Sender<serde_json::Value>, serde_json::Value),
    Insert(mpsc::Sender<Row>, Row),
}

fn resolve(table: &RouteTable, event: &RealtimeEvent) -> Vec<Delivery> {
    match event {
        RealtimeEvent::Broadcast {
            topic,
            event,
            payload,
        } => table
            .topics
            .get(topic)
            .into_iter()
            .flat_map(|t| t.routes.iter())
            .filter_map(|route| match &route.kind {
                RouteKind::Broadcast { event: wanted, tx } if wanted == event => {
                    Some(Delivery::Broadcast(tx.clone(), payload.clone()))
                }
                _ => None,
            })
            .collect(),
        RealtimeEvent::PostgresChange {
            topic,
            table: changed,
            change,
            record,
        } if change == "INSERT" => table
            .topics
            .get(topic)
            .into_iter()
            .flat_map(|t| t.routes.iter())
            .filter_map(|route| match &route.kind {
                RouteKind::Inserts { table: wanted, tx } if wanted == changed => {
                    Some(Delivery::Insert(tx.clone(), record.clone()))
                }
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Record a join reply and wake whoever waits on it.
fn settle_join(table: &Mutex<RouteTable>, topic: &str, outcome: Result<(), String>) {
    if let Some(entry) = lock(table).topics.get_mut(topic) {
        entry.settle(outcome);
    }
}

async fn route_events(mut events: mpsc::Receiver<RealtimeEvent>, table: Arc<Mutex<RouteTable>>) {
    while let Some(event) = events.recv().await {
        match &event {
            RealtimeEvent::ChannelJoined { topic } => {
                settle_join(&table, topic, Ok(()));
            }
            RealtimeEvent::ChannelError { topic, message } => {
                warn!(topic = %topic, message = %message, "Realtime channel error");
                settle_join(&table, topic, Err(message.clone()));
            }
            RealtimeEvent::Error(message) => {
                warn!(message = %message, "Realtime connection error");
            }
            _ => {}
        }

        let deliveries = resolve(&lock(&table), &event);
        for delivery in deliveries {
            // A closed receiver just means that subscriber went away.
            match delivery {
                Delivery::Broadcast(tx, payload) => {
                    // Broadcast is lossy by contract; never stall the router on it.
                    if tx.try_send(payload).is_err() {
                        debug!("Dropped broadcast for slow or closed subscriber");
                    }
                }
                Delivery::Insert(tx, row) => {
                    let _ = tx.send(row).await;
                }
            }
        }
    }
    debug!("Realtime event stream ended");
}

#[cfg(test)]
mod tests {
    use super::super::types::RealtimeCommand;
    use super::*;
    use serde_json::json;

    fn table_with(topic: &str, kind: RouteKind) -> RouteTable {
        let mut table = RouteTable::default();
        table.topics.entry(topic.into()).or_default().routes.push(Route { id: 1, kind });
        table
    }

    #[test]
    fn resolves_broadcast_by_event_name() {
        let (tx, _rx) = mpsc::channel(1);
        let table = table_with(
            "chat-typing",
            RouteKind::Broadcast {
                event: "typing".into(),
                tx,
            },
        );

        let hit = RealtimeEvent::Broadcast {
            topic: "chat-typing".into(),
            event: "typing".into(),
            payload: json!({}),
        };
        assert_eq!(resolve(&table, &hit).len(), 1);

        let miss = RealtimeEvent::Broadcast {
            topic: "chat-typing".into(),
            event: "other".into(),
            payload: json!({}),
        };
        assert!(resolve(&table, &miss).is_empty());
    }

    #[test]
    fn resolves_only_inserts_for_matching_table() {
        let (tx, _rx) = mpsc::channel(1);
        let table = table_with(
            &inserts_topic("messages"),
            RouteKind::Inserts {
                table: "messages".into(),
                tx,
            },
        );

        let insert = RealtimeEvent::PostgresChange {
            topic: inserts_topic("messages"),
            table: "messages".into(),
            change: "INSERT".into(),
            record: json!({"id": 1}),
        };
        assert_eq!(resolve(&table, &insert).len(), 1);

        let update = RealtimeEvent::PostgresChange {
            topic: inserts_topic("messages"),
            table: "messages".into(),
            change: "UPDATE".into(),
            record: json!({"id": 1}),
        };
        assert!(resolve(&table, &update).is_empty());
    }

    /// Wait for the next join command and answer it.
    async fn reply_to_join(
        command_rx: &mut mpsc::Receiver<RealtimeCommand>,
        event_tx: &mpsc::Sender<RealtimeEvent>,
        error: Option<&str>,
    ) {
        loop {
            match command_rx.recv().await {
                Some(RealtimeCommand::JoinChannel { topic, .. }) => {
                    let event = match error {
                        None => RealtimeEvent::ChannelJoined { topic },
                        Some(message) => RealtimeEvent::ChannelError {
                            topic,
                            message: message.into(),
                        },
                    };
                    event_tx.send(event).await.unwrap();
                    return;
                }
                Some(_) => continue,
                None => panic!("command channel closed before a join"),
            }
        }
    }

    #[tokio::test]
    async fn router_delivers_and_guard_unregisters() {
        let (command_tx, mut command_rx) = mpsc::channel(8);
        let client = RealtimeClient::detached(command_tx);
        let (event_tx, event_rx) = mpsc::channel(8);
        let hub = RealtimeHub::with_client(client, event_rx);

        let (sub, ()) = tokio::join!(
            BroadcastChannel::subscribe(&hub, "chat-typing", "typing"),
            reply_to_join(&mut command_rx, &event_tx, None),
        );
        let mut sub = sub.unwrap();
        event_tx
            .send(RealtimeEvent::Broadcast {
                topic: "chat-typing".into(),
                event: "typing".into(),
                payload: json!({"user_id": "u2"}),
            })
            .await
            .unwrap();
        let payload = sub.recv().await.unwrap();
        assert_eq!(payload["user_id"], "u2");

        sub.close();
        assert!(lock(&hub.table).topics.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn subscribe_resolves_only_after_join_reply() {
        let (command_tx, mut command_rx) = mpsc::channel(8);
        let client = RealtimeClient::detached(command_tx);
        let (event_tx, event_rx) = mpsc::channel(8);
        let hub = Arc::new(RealtimeHub::with_client(client, event_rx));

        let pending = tokio::spawn({
            let hub = Arc::clone(&hub);
            async move { hub.subscribe_inserts("messages").await.map(|_| ()) }
        });
        let Some(RealtimeCommand::JoinChannel { topic, .. }) = command_rx.recv().await else {
            panic!("expected a join command");
        };
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(!pending.is_finished());

        event_tx
            .send(RealtimeEvent::ChannelJoined { topic })
            .await
            .unwrap();
        pending.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn rejected_join_fails_subscribe_and_unregisters() {
        let (command_tx, mut command_rx) = mpsc::channel(8);
        let client = RealtimeClient::detached(command_tx);
        let (event_tx, event_rx) = mpsc::channel(8);
        let hub = RealtimeHub::with_client(client, event_rx);

        let (sub, ()) = tokio::join!(
            hub.subscribe_inserts("messages"),
            reply_to_join(&mut command_rx, &event_tx, Some("unauthorized")),
        );
        assert!(matches!(sub, Err(BackendError::Realtime(m)) if m.contains("unauthorized")));
        assert!(lock(&hub.table).topics.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn unanswered_join_times_out() {
        let (command_tx, _command_rx) = mpsc::channel(8);
        let client = RealtimeClient::detached(command_tx);
        let (_event_tx, event_rx) = mpsc::channel(8);
        let hub = RealtimeHub::with_client(client, event_rx);

        let err = hub.subscribe_inserts("messages").await.err().unwrap();
        assert!(matches!(err, BackendError::Realtime(m) if m.contains("timed out")));
        assert!(lock(&hub.table).topics.is_empty());
    }

    #[tokio::test]
    async fn publish_pins_topic_and_joins_once() {
        let (command_tx, mut command_rx) = mpsc::channel(8);
        let client = RealtimeClient::detached(command_tx);
        let (_event_tx, event_rx) = mpsc::channel(8);
        let hub = RealtimeHub::with_client(client, event_rx);

        hub.publish("chat-typing", "typing", json!({"is_typing": true}))
            .await
            .unwrap();
        hub.publish("chat-typing", "typing", json!({"is_typing": false}))
            .await
            .unwrap();

        let mut joins = 0;
        let mut broadcasts = 0;
        while let Ok(cmd) = command_rx.try_recv() {
            match cmd {
                RealtimeCommand::JoinChannel { .. } => joins += 1,
                RealtimeCommand::Broadcast { .. } => broadcasts += 1,
                _ => {}
            }
        }
        assert_eq!(joins, 1);
        assert_eq!(broadcasts, 2);
        assert!(lock(&hub.table).topics["chat-typing"].pinned);
    }
}
