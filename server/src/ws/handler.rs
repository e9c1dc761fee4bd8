use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use serde::Deserialize;

use crate::state::AppState;
use crate::ws::actor;

/// Query parameters for WebSocket connection.
/// Auth is via query param ?token=JWT.
#[derive(Debug, Deserialize)]
pub struct WsAuthQuery {
    #[serde(default)]
    pub token: String,
}

/// GET /ws?token=JWT
/// WebSocket upgrade endpoint. Authenticates via query parameter.
/// On auth failure, upgrades then immediately closes with 4001 (expired) or
/// 4002 (invalid); no connection is admitted.
/// On success, spawns an actor for the connection.
pub async fn ws_upgrade(
    State(state): State<AppState>,
    Query(params): Query<WsAuthQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let ws = ws.max_message_size(state.gateway.max_frame_bytes);

    match state.sessions.validate_session(&params.token) {
        Ok(user_id) => {
            tracing::info!(user_id = %user_id, "WebSocket connection authenticated");
            ws.on_upgrade(move |socket| actor::run_connection(socket, state, user_id))
        }
        Err(err) => {
            let close_code = err.close_code();
            tracing::warn!(
                close_code = close_code,
                reason = %err,
                "WebSocket auth failed"
            );

            // Upgrade the connection, then immediately close with the error code
            ws.on_upgrade(move |mut socket| async move {
                let close_frame = CloseFrame {
                    code: close_code,
                    reason: err.to_string().into(),
                };
                let _ = socket.send(Message::Close(Some(close_frame))).await;
            })
        }
    }
}
