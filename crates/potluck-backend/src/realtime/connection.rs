//! Background WebSocket connection loop with auto-reconnect.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::handler::handle_phoenix_message;
use super::types::{ChannelConfig, PhoenixMessage, RealtimeCommand, RealtimeConfig, RealtimeEvent};

// ---------------------------------------------------------------------------
// Ref Counter
// ---------------------------------------------------------------------------

/// Monotonically increasing ref counter for Phoenix messages.
static REF_COUNTER: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_ref() -> String {
    REF_COUNTER.fetch_add(1, Ordering::Relaxed).to_string()
}

/// Channels to rejoin after a reconnect, keyed by topic.
type JoinedChannels = Arc<RwLock<HashMap<String, ChannelConfig>>>;

async fn send_message<S>(ws_write: &Arc<Mutex<S>>, msg: &PhoenixMessage) -> bool
where
    S: futures_util::Sink<WsMessage> + Unpin,
{
    match serde_json::to_string(msg) {
        Ok(json) => {
            let mut writer = ws_write.lock().await;
            writer.send(WsMessage::Text(json.into())).await.is_ok()
        }
        Err(e) => {
            warn!(error = %e, "Failed to encode Phoenix message");
            false
        }
    }
}

// ---------------------------------------------------------------------------
// Connection Loop
// ---------------------------------------------------------------------------

/// Background task managing the WebSocket connection with auto-reconnect.
pub(crate) async fn connection_loop(
    config: RealtimeConfig,
    connected: Arc<RwLock<bool>>,
    event_tx: mpsc::Sender<RealtimeEvent>,
    command_rx: mpsc::Receiver<RealtimeCommand>,
    shutdown: CancellationToken,
) {
    let command_rx = Arc::new(Mutex::new(command_rx));
    let joined_channels: JoinedChannels = Arc::new(RwLock::new(HashMap::new()));
    let access_token: Option<Arc<str>> = config.access_token.as_deref().map(Arc::from);
    let mut reconnect_delay = config.reconnect_delay_secs;

    while !shutdown.is_cancelled() {
        let url = config.ws_url();
        info!(url = %url.split('?').next().unwrap_or(""), "Connecting to Supabase Realtime");

        match tokio::time::timeout(
            Duration::from_secs(15),
            tokio_tungstenite::connect_async(&url),
        )
        .await
        {
            Ok(Ok((ws_stream, _))) => {
                reconnect_delay = config.reconnect_delay_secs;
                *connected.write().await = true;
                let _ = event_tx.send(RealtimeEvent::Connected).await;

                let (ws_write, mut ws_read) = ws_stream.split();
                let ws_write = Arc::new(Mutex::new(ws_write));

                // Rejoin previously-joined channels.
                {
                    let channels = joined_channels.read().await;
                    for (topic, channel_config) in channels.iter() {
                        let msg = PhoenixMessage::for_topic(
                            topic,
                            "phx_join",
                            channel_config.to_join_payload(access_token.as_deref()),
                        );
                        send_message(&ws_write, &msg).await;
                    }
                }

                let heartbeat_handle = tokio::spawn(heartbeat_task(
                    Arc::clone(&ws_write),
                    config.heartbeat_interval_secs,
                ));

                let mut cmd_handle = tokio::spawn(command_forwarder(
                    Arc::clone(&command_rx),
                    Arc::clone(&ws_write),
                    Arc::clone(&joined_channels),
                    access_token.clone(),
                ));

                loop {
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        next = ws_read.next() => match next {
                            Some(Ok(WsMessage::Text(text))) => {
                                match serde_json::from_str::<PhoenixMessage>(&text) {
                                    Ok(phoenix_msg) => {
                                        handle_phoenix_message(&phoenix_msg, &event_tx).await;
                                    }
                                    Err(_) => {
                                        debug!(text = %text, "Unrecognized message from Supabase");
                                    }
                                }
                            }
                            Some(Ok(WsMessage::Close(_))) | None => {
                                info!("Supabase Realtime closed connection");
                                break;
                            }
                            Some(Err(e)) => {
                                warn!(error = %e, "WebSocket error");
                                break;
                            }
                            Some(Ok(_)) => {}
                        }
                    }
                }

                heartbeat_handle.abort();
                if shutdown.is_cancelled() {
                    // Let the forwarder flush the queued leave/close frames.
                    if tokio::time::timeout(Duration::from_secs(1), &mut cmd_handle)
                        .await
                        .is_err()
                    {
                        cmd_handle.abort();
                    }
                } else {
                    cmd_handle.abort();
                }
                *connected.write().await = false;
                let _ = event_tx.send(RealtimeEvent::Disconnected).await;
            }
            Ok(Err(e)) => {
                error!(error = %e, "Failed to connect to Supabase Realtime");
                let _ = event_tx
                    .send(RealtimeEvent::Error(format!("Connection failed: {e}")))
                    .await;
            }
            Err(_elapsed) => {
                error!("WebSocket connection timed out after 15s");
                let _ = event_tx
                    .send(RealtimeEvent::Error(
                        "Connection timed out after 15s".to_string(),
                    ))
                    .await;
            }
        }

        if shutdown.is_cancelled() {
            break;
        }

        // Exponential backoff reconnect.
        info!(delay = reconnect_delay, "Reconnecting in {} seconds", reconnect_delay);
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(Duration::from_secs(reconnect_delay)) => {}
        }
        reconnect_delay = (reconnect_delay * 2).min(config.max_reconnect_delay_secs);
    }

    info!("Realtime connection loop stopped");
}

// ---------------------------------------------------------------------------
// Heartbeat
// ---------------------------------------------------------------------------

async fn heartbeat_task<S>(ws_write: Arc<Mutex<S>>, interval_secs: u64)
where
    S: futures_util::Sink<WsMessage> + Unpin,
{
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
    loop {
        interval.tick().await;
        let msg = PhoenixMessage {
            topic: "phoenix".to_string(),
            event: "heartbeat".to_string(),
            payload: serde_json::json!({}),
            msg_ref: Some(next_ref()),
        };
        if !send_message(&ws_write, &msg).await {
            break;
        }
    }
}

// ---------------------------------------------------------------------------
// Command Forwarder
// ---------------------------------------------------------------------------

async fn command_forwarder<S>(
    cmd_rx: Arc<Mutex<mpsc::Receiver<RealtimeCommand>>>,
    cmd_write: Arc<Mutex<S>>,
    cmd_channels: JoinedChannels,
    access_token: Option<Arc<str>>,
) where
    S: futures_util::Sink<WsMessage> + Unpin,
{
    let mut rx = cmd_rx.lock().await;
    while let Some(cmd) = rx.recv().await {
        match cmd {
            RealtimeCommand::JoinChannel { topic, config } => {
                let msg = PhoenixMessage::for_topic(
                    &topic,
                    "phx_join",
                    config.to_join_payload(access_token.as_deref()),
                );
                send_message(&cmd_write, &msg).await;
                cmd_channels.write().await.insert(topic, config);
            }
            RealtimeCommand::LeaveChannel { topic } => {
                let msg = PhoenixMessage::for_topic(&topic, "phx_leave", serde_json::json!({}));
                send_message(&cmd_write, &msg).await;
                cmd_channels.write().await.remove(&topic);
            }
            RealtimeCommand::Broadcast {
                topic,
                event,
                payload,
            } => {
                let msg = PhoenixMessage::for_topic(
                    &topic,
                    "broadcast",
                    serde_json::json!({
                        "type": "broadcast",
                        "event": event,
                        "payload": payload
                    }),
                );
                send_message(&cmd_write, &msg).await;
            }
            RealtimeCommand::Disconnect => {
                let mut channels = cmd_channels.write().await;
                for topic in channels.keys() {
                    let msg =
                        PhoenixMessage::for_topic(topic, "phx_leave", serde_json::json!({}));
                    send_message(&cmd_write, &msg).await;
                }
                channels.clear();
                drop(channels);
                let mut writer = cmd_write.lock().await;
                let _ = writer.send(WsMessage::Close(None)).await;
                return;
            }
        }
    }
}
