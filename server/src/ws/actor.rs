use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{sleep_until, timeout};

use crate::chat::presence;
use crate::state::AppState;
use crate::ws::bootstrap::bootstrap;
use crate::ws::connection::{CloseReason, Connection, OutboundReceiver};
use crate::ws::protocol;

/// How long teardown waits for the writer to flush the close frame.
const CLOSE_FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

/// Run the actor-per-connection pattern for an authenticated WebSocket.
///
/// Splits the WebSocket into reader and writer halves:
/// - Writer task: owns the sink, drains the connection's outbound queue and
///   sends the close frame once the close signal fires
/// - Reader loop: heartbeats, client relays, liveness deadline
///
/// Everything else reaches this socket through the `Arc<Connection>` held by
/// the registry and topic index.
pub async fn run_connection(socket: WebSocket, state: AppState, user_id: String) {
    let (conn, rx) = Connection::new(user_id.as_str(), &state.gateway);
    // Subscribe before admitting so a replacement racing with setup is seen.
    let writer_close = conn.close_signal();
    let mut reader_close = conn.close_signal();

    state.connections.admit_and_replace(&user_id, Arc::clone(&conn));
    conn.mark_open();

    let (ws_sender, mut ws_receiver) = socket.split();
    let mut writer_handle = tokio::spawn(writer_task(ws_sender, rx, writer_close));

    let topics = bootstrap(&state, &conn).await.unwrap_or_default();
    let server_topics: Vec<String> = topics.server_topics().collect();

    tracing::info!(
        user_id = %user_id,
        subscriber_id = conn.subscriber_id(),
        "WebSocket actor started"
    );

    loop {
        tokio::select! {
            _ = reader_close.changed() => break,
            _ = sleep_until(conn.deadline()) => {
                tracing::warn!(user_id = %user_id, "Heartbeat timeout, closing connection");
                conn.close(CloseReason::heartbeat_timeout());
                break;
            }
            frame = ws_receiver.next() => match frame {
                Some(Ok(Message::Binary(data))) => {
                    let _ = protocol::handle_frame(&state, &conn, &data);
                }
                Some(Ok(Message::Text(text))) => {
                    protocol::handle_text(&conn, text.as_str());
                }
                Some(Ok(Message::Ping(_))) => {
                    // The pong itself is answered by the transport.
                    conn.touch();
                }
                Some(Ok(Message::Pong(_))) => {}
                Some(Ok(Message::Close(frame))) => {
                    tracing::info!(
                        user_id = %user_id,
                        reason = ?frame,
                        "Client initiated close"
                    );
                    conn.close(CloseReason::peer_gone());
                    break;
                }
                Some(Err(e)) => {
                    tracing::warn!(
                        user_id = %user_id,
                        error = %e,
                        "WebSocket receive error"
                    );
                    conn.close(CloseReason::peer_gone());
                    break;
                }
                None => {
                    tracing::info!(user_id = %user_id, "WebSocket stream ended");
                    conn.close(CloseReason::peer_gone());
                    break;
                }
            }
        }
    }

    // Closing state is set by now, so no new subscription can land after this.
    let removed = state.connections.remove(&user_id, &conn);
    let dropped = state.topics.unsubscribe_all(&conn);

    if removed && state.presence_enabled {
        if let Err(e) = presence::announce_offline(&state, &user_id, &server_topics) {
            tracing::error!(user_id = %user_id, error = %e, "Failed to announce offline status");
        }
    }
    conn.mark_closed();

    if timeout(CLOSE_FLUSH_TIMEOUT, &mut writer_handle).await.is_err() {
        writer_handle.abort();
    }

    tracing::info!(
        user_id = %user_id,
        subscriber_id = conn.subscriber_id(),
        replaced = !removed,
        topics = dropped,
        reason = ?conn.close_reason(),
        "WebSocket actor stopped"
    );
}

/// Writer task: forwards queued frames to the sink until the close signal.
///
/// Frames still queued when the signal fires are discarded.
async fn writer_task(
    mut ws_sender: SplitSink<WebSocket, Message>,
    mut rx: OutboundReceiver,
    mut close_rx: watch::Receiver<Option<CloseReason>>,
) {
    loop {
        tokio::select! {
            biased;
            changed = close_rx.changed() => {
                let reason = match changed {
                    Ok(()) => close_rx.borrow().clone(),
                    Err(_) => None,
                };
                if let Some(reason) = reason.filter(|r| *r != CloseReason::peer_gone()) {
                    let frame = CloseFrame {
                        code: reason.code,
                        reason: reason.reason.into(),
                    };
                    let _ = ws_sender.send(Message::Close(Some(frame))).await;
                }
                break;
            }
            msg = rx.recv() => match msg {
                Some(msg) => {
                    if ws_sender.send(msg).await.is_err() {
                        break;
                    }
                }
                None => break,
            }
        }
    }
}
