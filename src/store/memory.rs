//! In-memory room directory.
//!
//! [`MemoryRoomStore`] keeps every room in a `HashMap` behind a
//! [`tokio::sync::RwLock`], so lookups run concurrently and creations and
//! deletions are serialized. Rooms live until deleted or until the process
//! exits.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{RoomStore, validate_idle_shutdown, validate_key};
use crate::domain::{Room, RoomConfig};
use crate::error::RoomError;

/// Process-local directory of live rooms.
#[derive(Debug, Default)]
pub struct MemoryRoomStore {
    rooms: RwLock<HashMap<String, Room>>,
    template: RoomConfig,
}

impl MemoryRoomStore {
    /// Creates an empty store whose rooms use the default timings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty store whose rooms copy the timings of `template`.
    #[must_use]
    pub fn with_defaults(template: RoomConfig) -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            template,
        }
    }

    /// Keys of all rooms, sorted.
    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.rooms.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Number of rooms in the store.
    pub async fn len(&self) -> usize {
        self.rooms.read().await.len()
    }

    /// Returns `true` if the store holds no rooms.
    pub async fn is_empty(&self) -> bool {
        self.rooms.read().await.is_empty()
    }
}

#[async_trait]
impl RoomStore for MemoryRoomStore {
    async fn create(
        &self,
        key: &str,
        max_message_size: usize,
        idle_shutdown: Duration,
    ) -> Result<Room, RoomError> {
        validate_key(key)?;
        validate_idle_shutdown(idle_shutdown)?;
        let mut rooms = self.rooms.write().await;
        if rooms.contains_key(key) {
            return Err(RoomError::RoomAlreadyExists(key.to_string()));
        }
        let room = Room::new(key, self.template.with_limits(max_message_size, idle_shutdown));
        rooms.insert(key.to_string(), room.clone());
        tracing::info!(room = key, max_message_size, ?idle_shutdown, "room created");
        Ok(room)
    }

    async fn get(&self, key: &str) -> Result<Room, RoomError> {
        self.rooms
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| RoomError::RoomNotFound(key.to_string()))
    }

    async fn delete(&self, key: &str) -> Result<(), RoomError> {
        let room = self
            .rooms
            .write()
            .await
            .remove(key)
            .ok_or_else(|| RoomError::RoomNotFound(key.to_string()))?;
        room.close().await;
        tracing::info!(room = key, "room deleted");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use tokio_test::{assert_err, assert_ok};

    use super::*;
    use crate::domain::DEFAULT_MAX_MESSAGE_SIZE;

    const IDLE: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn create_and_get_return_the_same_room() {
        let store = MemoryRoomStore::new();
        let created = assert_ok!(store.create("chat", DEFAULT_MAX_MESSAGE_SIZE, IDLE).await);
        let fetched = assert_ok!(store.get("chat").await);

        assert!(created.same_room(&fetched));
        assert_eq!(fetched.key(), "chat");
        assert_eq!(fetched.config().idle_shutdown, IDLE);
    }

    #[tokio::test]
    async fn duplicate_create_keeps_the_original() {
        let store = MemoryRoomStore::new();
        let first = assert_ok!(store.create("chat", 512, IDLE).await);

        let err = assert_err!(store.create("chat", 1024, IDLE).await);
        assert!(matches!(err, RoomError::RoomAlreadyExists(ref key) if key == "chat"));

        let fetched = assert_ok!(store.get("chat").await);
        assert!(first.same_room(&fetched));
        assert_eq!(fetched.config().max_message_size, 512);
    }

    #[tokio::test]
    async fn get_unknown_room_is_not_found() {
        let store = MemoryRoomStore::new();
        let err = assert_err!(store.get("nope").await);
        assert!(matches!(err, RoomError::RoomNotFound(_)));
    }

    #[tokio::test]
    async fn delete_closes_and_removes() {
        let store = MemoryRoomStore::new();
        let room = assert_ok!(store.create("chat", 512, IDLE).await);

        assert_ok!(store.delete("chat").await);
        assert!(room.is_closed().await);
        assert!(matches!(
            store.get("chat").await,
            Err(RoomError::RoomNotFound(_))
        ));

        let err = assert_err!(store.delete("chat").await);
        assert!(matches!(err, RoomError::RoomNotFound(_)));
    }

    #[tokio::test]
    async fn rooms_inherit_template_timings() {
        let template = RoomConfig::default()
            .with_pong_wait(Duration::from_secs(30))
            .with_outbound_capacity(4);
        let store = MemoryRoomStore::with_defaults(template);
        let room = assert_ok!(store.create("chat", 2048, IDLE).await);

        assert_eq!(room.config().pong_wait, Duration::from_secs(30));
        assert_eq!(room.config().outbound_capacity, 4);
        assert_eq!(room.config().max_message_size, 2048);
    }

    #[tokio::test]
    async fn keys_and_len_track_rooms() {
        let store = MemoryRoomStore::new();
        assert!(store.is_empty().await);

        let _ = store.create("b", 512, IDLE).await;
        let _ = store.create("a", 512, IDLE).await;

        assert_eq!(store.len().await, 2);
        assert_eq!(store.keys().await, vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn empty_key_is_rejected() {
        let store = MemoryRoomStore::new();
        let err = assert_err!(store.create("", 512, IDLE).await);
        assert!(matches!(err, RoomError::InvalidRequest(_)));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn overflowing_idle_shutdown_is_rejected() {
        let store = MemoryRoomStore::new();
        let err = assert_err!(store.create("chat", 512, Duration::from_secs(u64::MAX)).await);
        assert!(matches!(err, RoomError::InvalidRequest(_)));
        assert!(store.is_empty().await);
    }
}
