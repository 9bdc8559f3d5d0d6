//! Domain layer: rooms, their actor, and their parameters.
//!
//! A [`Room`] owns a set of WebSocket connections through a single actor
//! task; [`RoomConfig`] fixes its timing and sizing at construction.

pub mod room;
pub mod room_config;

pub use room::{ConnectionInfo, Payload, Room};
pub use room_config::{
    DEFAULT_BROADCAST_CAPACITY, DEFAULT_IDLE_SHUTDOWN, DEFAULT_MAX_MESSAGE_SIZE,
    DEFAULT_OUTBOUND_CAPACITY, DEFAULT_PING_PERIOD, DEFAULT_PONG_WAIT, DEFAULT_WRITE_WAIT,
    MAX_IDLE_SHUTDOWN, RoomConfig,
};
