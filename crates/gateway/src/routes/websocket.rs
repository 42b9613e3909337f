use axum::{
    extract::{ws::WebSocketUpgrade, State},
    response::Response,
};
use tracing::{debug, warn};

use crate::{AppState, CurrentUser, WebSocketTransport};

/// Upgrade an authenticated request and hand the socket to the hub.
pub async fn connect(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    current: CurrentUser,
) -> Response {
    let limit = state.hub().settings().max_message_size;
    let user = current.user;

    ws.max_message_size(limit)
        .on_upgrade(move |socket| async move {
            let user_id = user.id;
            match state
                .hub()
                .user_connect(WebSocketTransport::new(socket), user)
                .await
            {
                Ok(handle) => debug!(%user_id, connection_id = %handle.id(), "websocket attached"),
                Err(error) => warn!(%user_id, %error, "failed to attach websocket"),
            }
        })
}
