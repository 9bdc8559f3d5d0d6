//! Shared application state injected into all Axum handlers.

use std::sync::Arc;
use std::time::Duration;

use sqlx::any::AnyPoolOptions;

use crate::config::ServerConfig;
use crate::domain::RoomConfig;
use crate::error::RoomError;
use crate::store::{MemoryRoomStore, RoomStore, SqlRoomStore};

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Room directory backing every endpoint.
    pub store: Arc<dyn RoomStore>,
    /// Parameters applied to rooms created without explicit values.
    pub room_defaults: RoomConfig,
}

impl AppState {
    /// Wraps a store with the given room defaults.
    #[must_use]
    pub fn new(store: Arc<dyn RoomStore>, room_defaults: RoomConfig) -> Self {
        Self {
            store,
            room_defaults,
        }
    }
}

/// Builds the room store selected by `config`.
///
/// A configured `DATABASE_URL` selects the durable [`SqlRoomStore`];
/// otherwise rooms live in a [`MemoryRoomStore`].
///
/// # Errors
///
/// Returns [`RoomError::Persistence`] if the database is unreachable and
/// [`RoomError::InvalidConfig`] for an unusable table name.
pub async fn build_store(config: &ServerConfig) -> Result<Arc<dyn RoomStore>, RoomError> {
    let template = config.room_defaults();
    match &config.database_url {
        Some(url) => {
            let options = AnyPoolOptions::new()
                .max_connections(config.database_max_connections)
                .acquire_timeout(Duration::from_secs(config.database_connect_timeout_secs));
            let store = SqlRoomStore::connect_with(options, url, &config.room_table, template).await?;
            tracing::info!(table = store.table(), "using database room store");
            Ok(Arc::new(store))
        }
        None => {
            tracing::info!("using in-memory room store");
            Ok(Arc::new(MemoryRoomStore::with_defaults(template)))
        }
    }
}

/// Creates every room listed in `BOOTSTRAP_ROOMS`.
///
/// Rooms that already exist (for example rows left by a previous run of a
/// durable store) are kept as they are.
///
/// # Errors
///
/// Returns the first error other than [`RoomError::RoomAlreadyExists`].
pub async fn bootstrap_rooms(store: &dyn RoomStore, config: &ServerConfig) -> Result<(), RoomError> {
    let defaults = config.room_defaults();
    for key in &config.bootstrap_rooms {
        match store
            .create(key, defaults.max_message_size, defaults.idle_shutdown)
            .await
        {
            Ok(_) => tracing::info!(room = %key, "bootstrap room created"),
            Err(RoomError::RoomAlreadyExists(_)) => {
                tracing::info!(room = %key, "bootstrap room already exists");
            }
            Err(err) => return Err(err),
        }
    }
    Ok(())
}
