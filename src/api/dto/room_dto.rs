//! Room request/response DTOs.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use crate::domain::{ConnectionInfo, Room};

/// Request body for `POST /api/v1/rooms`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateRoomRequest {
    /// Unique room key.
    pub key: String,
    /// Inbound frame cap in bytes. Defaults to the server setting.
    #[serde(default)]
    pub max_message_size: Option<usize>,
    /// Seconds without subscribers before the room stops listening
    /// (0 = never). Defaults to the server setting.
    #[serde(default)]
    pub idle_shutdown_secs: Option<u64>,
}

/// Summary of a room as returned by create and get.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RoomResponse {
    /// Room key.
    pub key: String,
    /// Inbound frame cap in bytes.
    pub max_message_size: usize,
    /// Idle shutdown interval in seconds (0 = never).
    pub idle_shutdown_secs: u64,
    /// When this process first materialized the room.
    pub created_at: DateTime<Utc>,
    /// Whether the room currently runs its actor.
    pub listening: bool,
    /// Whether the room has been closed.
    pub closed: bool,
    /// Number of live connections.
    pub connections: usize,
}

impl RoomResponse {
    /// Captures the current state of `room`.
    pub async fn from_room(room: &Room) -> Self {
        let config = room.config();
        Self {
            key: room.key().to_string(),
            max_message_size: config.max_message_size,
            idle_shutdown_secs: config.idle_shutdown.as_secs(),
            created_at: room.created_at(),
            listening: room.is_listening().await,
            closed: room.is_closed().await,
            connections: room.connection_count().await,
        }
    }
}

/// A live connection in a room.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ConnectionDto {
    /// Connection key, unique within the room.
    pub key: String,
    /// Attributes attached at subscribe time.
    #[schema(value_type = Object)]
    pub attributes: HashMap<String, Value>,
}

impl From<ConnectionInfo> for ConnectionDto {
    fn from(info: ConnectionInfo) -> Self {
        Self {
            key: info.key,
            attributes: info.attributes,
        }
    }
}

/// Response for `POST /api/v1/rooms/{key}/broadcast`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BroadcastResponse {
    /// Room key.
    pub room: String,
    /// Connections present when the message was queued.
    pub recipients: usize,
}
