//! Crate error type with HTTP status code mapping.
//!
//! [`RoomError`] is returned by every directory and membership operation
//! (`RoomStore::{create, get, delete}`, `Room::{subscribe, unsubscribe}`).
//! Socket failures inside the connection pumps are never surfaced here;
//! they only cause the connection to be evicted.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

/// Structured JSON error response body.
///
/// All error responses of the bundled HTTP service follow this shape:
/// ```json
/// {
///   "error": {
///     "code": 2001,
///     "message": "room not found: chat",
///     "details": null
///   }
/// }
/// ```
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Numeric error code (see [`RoomError::error_code`]).
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Errors produced by rooms and room stores.
///
/// # Error Code Ranges
///
/// | Range     | Category         | HTTP Status                    |
/// |-----------|------------------|--------------------------------|
/// | 1000–1999 | Validation       | 400 Bad Request                |
/// | 2000–2999 | Rooms            | 404 Not Found / 409 / 410 Gone |
/// | 3000–3999 | Connections      | 404 Not Found / 409 Conflict   |
/// | 5000–5999 | Server           | 500 Internal Server Error      |
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    /// No room is registered under the given key.
    #[error("room not found: {0}")]
    RoomNotFound(String),

    /// A room with the given key already exists.
    #[error("room already exists: {0}")]
    RoomAlreadyExists(String),

    /// The room was closed and no longer accepts subscribers.
    #[error("room closed: {0}")]
    RoomClosed(String),

    /// No connection with the given key is subscribed to the room.
    #[error("connection not found: {0}")]
    ConnectionNotFound(String),

    /// A connection with the given key is already subscribed to the room.
    #[error("connection already subscribed: {0}")]
    ConnectionAlreadyExists(String),

    /// Request validation failed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Store or room parameters cannot be represented or are unsafe to use.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Database driver failure, passed through unchanged.
    #[error("persistence error: {0}")]
    Persistence(#[from] sqlx::Error),
}

impl RoomError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::InvalidRequest(_) => 1001,
            Self::InvalidConfig(_) => 1002,
            Self::RoomNotFound(_) => 2001,
            Self::RoomAlreadyExists(_) => 2002,
            Self::RoomClosed(_) => 2003,
            Self::ConnectionNotFound(_) => 3001,
            Self::ConnectionAlreadyExists(_) => 3002,
            Self::Persistence(_) => 5001,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) | Self::InvalidConfig(_) => StatusCode::BAD_REQUEST,
            Self::RoomNotFound(_) | Self::ConnectionNotFound(_) => StatusCode::NOT_FOUND,
            Self::RoomAlreadyExists(_) | Self::ConnectionAlreadyExists(_) => StatusCode::CONFLICT,
            Self::RoomClosed(_) => StatusCode::GONE,
            Self::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for RoomError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                message: self.to_string(),
                details: None,
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}
