//! REST API layer: route handlers, DTOs, router composition, and the
//! OpenAPI document.
//!
//! Resource endpoints are mounted under `/api/v1`.

pub mod dto;
pub mod handlers;

#[cfg(not(feature = "swagger-ui"))]
use axum::Json;
use axum::Router;
#[cfg(not(feature = "swagger-ui"))]
use axum::routing::get;
use utoipa::OpenApi;

use crate::app_state::AppState;

/// Path serving the generated OpenAPI document.
pub const OPENAPI_PATH: &str = "/api-docs/openapi.json";

/// OpenAPI description of every REST endpoint.
#[derive(Debug, OpenApi)]
#[openapi(
    info(title = "wsroom", description = "WebSocket rooms with JSON broadcast"),
    paths(
        handlers::system::health_handler,
        handlers::rooms::create_room,
        handlers::rooms::get_room,
        handlers::rooms::delete_room,
        handlers::rooms::broadcast,
        handlers::rooms::list_connections,
    ),
    components(schemas(
        dto::CreateRoomRequest,
        dto::RoomResponse,
        dto::ConnectionDto,
        dto::BroadcastResponse,
        handlers::system::HealthResponse,
        crate::error::ErrorResponse,
        crate::error::ErrorBody,
    )),
    tags(
        (name = "System", description = "Service status"),
        (name = "Rooms", description = "Room lifecycle and broadcast"),
    )
)]
pub struct ApiDoc;

/// Builds the complete API router with all REST endpoints.
///
/// With the `swagger-ui` feature the document is served by Swagger UI,
/// which also mounts the interactive explorer at `/swagger-ui`.
pub fn build_router() -> Router<AppState> {
    let router = Router::new()
        .nest("/api/v1", handlers::routes())
        .merge(handlers::system::routes());

    #[cfg(feature = "swagger-ui")]
    let router = router.merge(
        utoipa_swagger_ui::SwaggerUi::new("/swagger-ui").url(OPENAPI_PATH, ApiDoc::openapi()),
    );
    #[cfg(not(feature = "swagger-ui"))]
    let router = router.route(OPENAPI_PATH, get(openapi_handler));

    router
}

#[cfg(not(feature = "swagger-ui"))]
async fn openapi_handler() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
