//! Axum WebSocket upgrade handler.

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use chrono::Utc;
use serde::Deserialize;

use super::connection::Connection;
use crate::app_state::AppState;
use crate::error::RoomError;

/// Query parameters accepted by the upgrade endpoint.
#[derive(Debug, Deserialize)]
pub struct SubscribeParams {
    /// Connection key; a UUID v4 is generated when absent.
    #[serde(default)]
    pub connection_key: Option<String>,
}

/// `GET /ws/{key}` — Upgrade to WebSocket and subscribe to the room.
///
/// Inbound frames are capped at the room's `max_message_size`. If the room
/// rejects the socket, the client receives a close frame carrying the
/// error text.
///
/// # Errors
///
/// Returns [`RoomError::RoomNotFound`] before upgrading if the room does
/// not exist, and [`RoomError::InvalidRequest`] for an empty connection key.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(room_key): Path<String>,
    Query(params): Query<SubscribeParams>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, RoomError> {
    let room = state.store.get(&room_key).await?;
    let connection_key = match params.connection_key {
        Some(key) if key.is_empty() => {
            return Err(RoomError::InvalidRequest(
                "connection_key must not be empty".to_string(),
            ));
        }
        Some(key) => key,
        None => uuid::Uuid::new_v4().to_string(),
    };
    let max_message_size = room.config().max_message_size;

    Ok(ws
        .max_message_size(max_message_size)
        .on_upgrade(move |socket| async move {
            let connection = Connection::new(connection_key.clone(), socket)
                .with_attribute("connected_at", Utc::now().to_rfc3339());
            if let Err(err) = room.subscribe(connection).await {
                tracing::debug!(
                    room = %room.key(),
                    connection = %connection_key,
                    error = %err,
                    "subscription rejected"
                );
            }
        }))
}
