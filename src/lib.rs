//! # wsroom
//!
//! WebSocket rooms with JSON broadcast.
//!
//! A [`Room`] owns a set of WebSocket connections keyed by a per-room
//! connection key. Every JSON object a client sends is fanned out to all
//! connections of the room, including the sender. Each room is driven by a
//! single actor task started on the first subscription; it stops again
//! after an idle interval without subscribers. Each connection runs a read
//! pump and a write pump with ping/pong liveness checks, and a client that
//! cannot keep up with the room is evicted instead of slowing it down.
//!
//! Rooms are kept in a [`RoomStore`]: [`MemoryRoomStore`] for a single
//! process, or [`SqlRoomStore`] to persist room parameters in MySQL or
//! SQLite so they survive restarts.
//!
//! ## Architecture
//!
//! ```text
//! Clients (HTTP, WebSocket)
//!     │
//!     ├── REST Handlers (api/)
//!     ├── Upgrade Handler (ws/handler)
//!     │
//!     ├── RoomStore (store/)
//!     │     ├── MemoryRoomStore
//!     │     └── SqlRoomStore ── MySQL / SQLite
//!     │
//!     ├── Room actor (domain/)
//!     │
//!     └── Connection pumps (ws/connection)
//! ```

pub mod api;
pub mod app_state;
pub mod config;
pub mod domain;
pub mod error;
pub mod store;
pub mod ws;

use axum::Router;
use axum::routing::get;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use app_state::AppState;
pub use config::ServerConfig;
pub use domain::{
    ConnectionInfo, DEFAULT_IDLE_SHUTDOWN, DEFAULT_MAX_MESSAGE_SIZE, DEFAULT_PING_PERIOD,
    DEFAULT_PONG_WAIT, DEFAULT_WRITE_WAIT, Room, RoomConfig,
};
pub use error::RoomError;
pub use store::{MemoryRoomStore, RoomStore, SqlRoomStore};
pub use ws::Connection;

/// Builds the HTTP service: REST API, OpenAPI document, and the
/// `/ws/{key}` upgrade endpoint.
pub fn build_app(state: AppState) -> Router {
    Router::new()
        .merge(api::build_router())
        .route("/ws/{key}", get(ws::handler::ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
