//! Room handlers: create, get, delete, broadcast, connections.

use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::Value;

use crate::api::dto::{BroadcastResponse, ConnectionDto, CreateRoomRequest, RoomResponse};
use crate::app_state::AppState;
use crate::error::{ErrorResponse, RoomError};

/// `POST /rooms` — Create a room.
///
/// # Errors
///
/// Returns [`RoomError::RoomAlreadyExists`] if the key is taken and
/// [`RoomError::InvalidRequest`] for an unusable key.
#[utoipa::path(
    post,
    path = "/api/v1/rooms",
    tag = "Rooms",
    summary = "Create a room",
    description = "Registers a room under a unique key. Omitted limits take the server defaults. The room starts listening when the first client subscribes.",
    request_body = CreateRoomRequest,
    responses(
        (status = 201, description = "Room created", body = RoomResponse),
        (status = 400, description = "Invalid room key", body = ErrorResponse),
        (status = 409, description = "Room already exists", body = ErrorResponse),
    )
)]
pub async fn create_room(
    State(state): State<AppState>,
    Json(req): Json<CreateRoomRequest>,
) -> Result<impl IntoResponse, RoomError> {
    let max_message_size = req
        .max_message_size
        .unwrap_or(state.room_defaults.max_message_size);
    let idle_shutdown = req
        .idle_shutdown_secs
        .map_or(state.room_defaults.idle_shutdown, Duration::from_secs);

    let room = state
        .store
        .create(&req.key, max_message_size, idle_shutdown)
        .await?;

    Ok((StatusCode::CREATED, Json(RoomResponse::from_room(&room).await)))
}

/// `GET /rooms/{key}` — Room details.
///
/// # Errors
///
/// Returns [`RoomError::RoomNotFound`] if the room does not exist.
#[utoipa::path(
    get,
    path = "/api/v1/rooms/{key}",
    tag = "Rooms",
    summary = "Get room details",
    description = "Returns the room's limits, whether it is listening, and its connection count.",
    params(
        ("key" = String, Path, description = "Room key"),
    ),
    responses(
        (status = 200, description = "Room details", body = RoomResponse),
        (status = 404, description = "Room not found", body = ErrorResponse),
    )
)]
pub async fn get_room(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<impl IntoResponse, RoomError> {
    let room = state.store.get(&key).await?;
    Ok(Json(RoomResponse::from_room(&room).await))
}

/// `DELETE /rooms/{key}` — Close and remove a room.
///
/// # Errors
///
/// Returns [`RoomError::RoomNotFound`] if the room does not exist.
#[utoipa::path(
    delete,
    path = "/api/v1/rooms/{key}",
    tag = "Rooms",
    summary = "Delete a room",
    description = "Closes every connection of the room and removes it from the store.",
    params(
        ("key" = String, Path, description = "Room key"),
    ),
    responses(
        (status = 204, description = "Room deleted"),
        (status = 404, description = "Room not found", body = ErrorResponse),
    )
)]
pub async fn delete_room(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<impl IntoResponse, RoomError> {
    state.store.delete(&key).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /rooms/{key}/broadcast` — Push a JSON message to every client.
///
/// # Errors
///
/// Returns [`RoomError::RoomNotFound`] if the room does not exist and
/// [`RoomError::RoomClosed`] if it has been closed.
#[utoipa::path(
    post,
    path = "/api/v1/rooms/{key}/broadcast",
    tag = "Rooms",
    summary = "Broadcast a message",
    description = "Queues the request body for delivery to every connection of the room. Delivery is best effort: without subscribers the message is dropped.",
    params(
        ("key" = String, Path, description = "Room key"),
    ),
    request_body(content = serde_json::Value, description = "Any JSON document"),
    responses(
        (status = 202, description = "Message queued", body = BroadcastResponse),
        (status = 404, description = "Room not found", body = ErrorResponse),
        (status = 410, description = "Room closed", body = ErrorResponse),
    )
)]
pub async fn broadcast(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(message): Json<Value>,
) -> Result<impl IntoResponse, RoomError> {
    let room = state.store.get(&key).await?;
    if room.is_closed().await {
        return Err(RoomError::RoomClosed(key));
    }
    let recipients = room.connection_count().await;
    room.broadcast(message).await;
    tracing::debug!(room = %key, recipients, "broadcast queued");

    Ok((
        StatusCode::ACCEPTED,
        Json(BroadcastResponse {
            room: key,
            recipients,
        }),
    ))
}

/// `GET /rooms/{key}/connections` — List live connections.
///
/// # Errors
///
/// Returns [`RoomError::RoomNotFound`] if the room does not exist.
#[utoipa::path(
    get,
    path = "/api/v1/rooms/{key}/connections",
    tag = "Rooms",
    summary = "List connections",
    description = "Returns the connections currently subscribed to the room, sorted by key.",
    params(
        ("key" = String, Path, description = "Room key"),
    ),
    responses(
        (status = 200, description = "Connections", body = Vec<ConnectionDto>),
        (status = 404, description = "Room not found", body = ErrorResponse),
    )
)]
pub async fn list_connections(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<impl IntoResponse, RoomError> {
    let room = state.store.get(&key).await?;
    let connections: Vec<ConnectionDto> = room
        .connections()
        .await
        .into_iter()
        .map(ConnectionDto::from)
        .collect();
    Ok(Json(connections))
}

/// Room management routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/rooms", post(create_room))
        .route("/rooms/{key}", get(get_room).delete(delete_room))
        .route("/rooms/{key}/broadcast", post(broadcast))
        .route("/rooms/{key}/connections", get(list_connections))
}

#[cfg(test)]
#[allow(clippy::panic, clippy::indexing_slicing)]
mod tests {
    use std::sync::Arc;

    use axum::body::{Body, to_bytes};
    use axum::http::{Method, Request};
    use serde_json::json;
    use tokio_test::assert_ok;
    use tower::ServiceExt;

    use super::*;
    use crate::domain::RoomConfig;
    use crate::store::{MemoryRoomStore, RoomStore};
    use crate::ws::testing::socket;

    fn app() -> (Router, Arc<MemoryRoomStore>) {
        let store = Arc::new(MemoryRoomStore::new());
        let state = AppState::new(
            Arc::clone(&store) as Arc<dyn RoomStore>,
            RoomConfig::new(1024, Duration::from_secs(30)),
        );
        (crate::api::build_router().with_state(state), store)
    }

    fn request(method: Method, uri: &str, body: Option<Value>) -> Request<Body> {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        };
        let Ok(request) = request else {
            panic!("invalid test request");
        };
        request
    }

    async fn call(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let response = assert_ok!(app.clone().oneshot(req).await);
        let status = response.status();
        let bytes = assert_ok!(to_bytes(response.into_body(), usize::MAX).await);
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            assert_ok!(serde_json::from_slice(&bytes))
        };
        (status, body)
    }

    #[tokio::test]
    async fn create_applies_server_defaults() {
        let (app, _) = app();
        let (status, body) = call(
            &app,
            request(Method::POST, "/api/v1/rooms", Some(json!({"key": "chat"}))),
        )
        .await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["key"], "chat");
        assert_eq!(body["max_message_size"], 1024);
        assert_eq!(body["idle_shutdown_secs"], 30);
        assert_eq!(body["listening"], false);
        assert_eq!(body["connections"], 0);
    }

    #[tokio::test]
    async fn duplicate_create_conflicts() {
        let (app, _) = app();
        let body = json!({"key": "chat", "max_message_size": 64, "idle_shutdown_secs": 0});
        let (status, _) = call(&app, request(Method::POST, "/api/v1/rooms", Some(body.clone()))).await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, err) = call(&app, request(Method::POST, "/api/v1/rooms", Some(body))).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(err["error"]["code"], 2002);
    }

    #[tokio::test]
    async fn unschedulable_idle_shutdown_is_rejected() {
        let (app, store) = app();
        let (status, err) = call(
            &app,
            request(
                Method::POST,
                "/api/v1/rooms",
                Some(json!({"key": "chat", "idle_shutdown_secs": u64::MAX})),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(err["error"]["code"], 1001);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn unknown_room_is_not_found() {
        let (app, _) = app();
        let (status, err) = call(&app, request(Method::GET, "/api/v1/rooms/nope", None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(err["error"]["code"], 2001);

        let (status, _) = call(&app, request(Method::DELETE, "/api/v1/rooms/nope", None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn broadcast_reaches_subscribers() {
        let (app, store) = app();
        let room = assert_ok!(store.create("notif", 512, Duration::ZERO).await);
        let (connection, mut peer) = socket("alice");
        assert_ok!(room.subscribe(connection.with_attribute("user", "alice")).await);

        let (status, body) = call(
            &app,
            request(
                Method::POST,
                "/api/v1/rooms/notif/broadcast",
                Some(json!({"text": "deploy finished"})),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["recipients"], 1);
        assert_eq!(peer.next_json().await, Some(json!({"text": "deploy finished"})));

        let (status, connections) = call(
            &app,
            request(Method::GET, "/api/v1/rooms/notif/connections", None),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(connections, json!([{"key": "alice", "attributes": {"user": "alice"}}]));

        let (_, detail) = call(&app, request(Method::GET, "/api/v1/rooms/notif", None)).await;
        assert_eq!(detail["listening"], true);
        assert_eq!(detail["connections"], 1);
    }

    #[tokio::test]
    async fn delete_closes_the_room() {
        let (app, store) = app();
        let room = assert_ok!(store.create("chat", 512, Duration::ZERO).await);

        let (status, _) = call(&app, request(Method::DELETE, "/api/v1/rooms/chat", None)).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(room.is_closed().await);

        let (status, _) = call(
            &app,
            request(Method::POST, "/api/v1/rooms/chat/broadcast", Some(json!({}))),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
