//! Room directories.
//!
//! [`RoomStore`] is the capability set shared by both backings:
//!
//! - [`MemoryRoomStore`]: process-local map of live rooms.
//! - [`SqlRoomStore`]: room configuration persisted in a relational table,
//!   with live rooms cached in process memory and rebuilt from their row on
//!   first lookup after a restart.
//!
//! Only configuration is durable. Membership always lives in the room's
//! actor and is lost with the process.

pub mod memory;
pub mod models;
pub mod sql;

use std::time::Duration;

use async_trait::async_trait;

pub use memory::MemoryRoomStore;
pub use models::RoomRecord;
pub use sql::SqlRoomStore;

use crate::domain::{MAX_IDLE_SHUTDOWN, Room};
use crate::error::RoomError;

/// Longest accepted room key; matches the `roomKey VARCHAR(100)` column.
pub const MAX_ROOM_KEY_LEN: usize = 100;

/// A named directory of rooms.
#[async_trait]
pub trait RoomStore: Send + Sync + std::fmt::Debug {
    /// Creates and registers a room.
    ///
    /// # Errors
    ///
    /// Returns [`RoomError::RoomAlreadyExists`] if the key is taken,
    /// [`RoomError::InvalidRequest`] for an empty or over-long key, and
    /// [`RoomError::Persistence`] on database failure.
    async fn create(
        &self,
        key: &str,
        max_message_size: usize,
        idle_shutdown: Duration,
    ) -> Result<Room, RoomError>;

    /// Looks up a room.
    ///
    /// # Errors
    ///
    /// Returns [`RoomError::RoomNotFound`] if no room has the key and
    /// [`RoomError::Persistence`] on database failure.
    async fn get(&self, key: &str) -> Result<Room, RoomError>;

    /// Removes a room and closes it.
    ///
    /// # Errors
    ///
    /// Returns [`RoomError::RoomNotFound`] if no room has the key and
    /// [`RoomError::Persistence`] on database failure.
    async fn delete(&self, key: &str) -> Result<(), RoomError>;
}

/// Checks that `key` is usable as a room key in every backing.
///
/// # Errors
///
/// Returns [`RoomError::InvalidRequest`] for an empty or over-long key.
pub fn validate_key(key: &str) -> Result<(), RoomError> {
    if key.is_empty() {
        return Err(RoomError::InvalidRequest("room key must not be empty".to_string()));
    }
    if key.chars().count() > MAX_ROOM_KEY_LEN {
        return Err(RoomError::InvalidRequest(format!(
            "room key longer than {MAX_ROOM_KEY_LEN} characters"
        )));
    }
    Ok(())
}

/// Checks that a room's idle interval can be scheduled and persisted.
///
/// # Errors
///
/// Returns [`RoomError::InvalidRequest`] if `idle_shutdown` exceeds
/// [`MAX_IDLE_SHUTDOWN`].
pub fn validate_idle_shutdown(idle_shutdown: Duration) -> Result<(), RoomError> {
    if idle_shutdown > MAX_IDLE_SHUTDOWN {
        return Err(RoomError::InvalidRequest(format!(
            "idle_shutdown of {}s exceeds the maximum of {}s",
            idle_shutdown.as_secs(),
            MAX_IDLE_SHUTDOWN.as_secs()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_bounded() {
        assert!(validate_key("chat").is_ok());
        assert!(validate_key(&"k".repeat(MAX_ROOM_KEY_LEN)).is_ok());
        assert!(matches!(validate_key(""), Err(RoomError::InvalidRequest(_))));
        assert!(matches!(
            validate_key(&"k".repeat(MAX_ROOM_KEY_LEN + 1)),
            Err(RoomError::InvalidRequest(_))
        ));
    }

    #[test]
    fn idle_shutdown_is_bounded() {
        assert!(validate_idle_shutdown(Duration::ZERO).is_ok());
        assert!(validate_idle_shutdown(MAX_IDLE_SHUTDOWN).is_ok());
        assert!(matches!(
            validate_idle_shutdown(Duration::from_secs(u64::MAX)),
            Err(RoomError::InvalidRequest(_))
        ));
    }
}
