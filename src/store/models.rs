//! Row model for the room directory table.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::RoomConfig;
use crate::error::RoomError;

/// A row of the room table.
///
/// Columns are nullable in the schema; a missing value falls back to the
/// store's template when the room is rebuilt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomRecord {
    /// Primary key (`roomKey`).
    pub room_key: String,
    /// Inbound frame cap in bytes (`max_message_size`).
    pub max_message_size: Option<i64>,
    /// Idle shutdown interval in nanoseconds (`idle_shutdown_ns`).
    pub idle_shutdown_ns: Option<i64>,
}

impl RoomRecord {
    /// Builds the row persisted for a new room.
    ///
    /// # Errors
    ///
    /// Returns [`RoomError::InvalidConfig`] if either value does not fit a
    /// signed 64-bit column.
    pub fn new(
        room_key: &str,
        max_message_size: usize,
        idle_shutdown: Duration,
    ) -> Result<Self, RoomError> {
        let max_message_size = i64::try_from(max_message_size).map_err(|_| {
            RoomError::InvalidConfig(format!("max_message_size {max_message_size} out of range"))
        })?;
        let idle_shutdown_ns = i64::try_from(idle_shutdown.as_nanos()).map_err(|_| {
            RoomError::InvalidConfig(format!("idle_shutdown {idle_shutdown:?} out of range"))
        })?;
        Ok(Self {
            room_key: room_key.to_string(),
            max_message_size: Some(max_message_size),
            idle_shutdown_ns: Some(idle_shutdown_ns),
        })
    }

    /// Room parameters for this row, with timings taken from `template`.
    ///
    /// # Errors
    ///
    /// Returns [`RoomError::InvalidConfig`] if a stored value is negative.
    pub fn config(&self, template: RoomConfig) -> Result<RoomConfig, RoomError> {
        let max_message_size = match self.max_message_size {
            Some(value) => usize::try_from(value).map_err(|_| {
                RoomError::InvalidConfig(format!(
                    "room {}: stored max_message_size {value} is invalid",
                    self.room_key
                ))
            })?,
            None => template.max_message_size,
        };
        let idle_shutdown = match self.idle_shutdown_ns {
            Some(value) => u64::try_from(value).map(Duration::from_nanos).map_err(|_| {
                RoomError::InvalidConfig(format!(
                    "room {}: stored idle_shutdown_ns {value} is invalid",
                    self.room_key
                ))
            })?,
            None => template.idle_shutdown,
        };
        Ok(template.with_limits(max_message_size, idle_shutdown))
    }
}

impl From<(String, Option<i64>, Option<i64>)> for RoomRecord {
    fn from((room_key, max_message_size, idle_shutdown_ns): (String, Option<i64>, Option<i64>)) -> Self {
        Self {
            room_key,
            max_message_size,
            idle_shutdown_ns,
        }
    }
}
