//! WebSocket layer: subscribed connections and the upgrade endpoint.
//!
//! [`connection::Connection`] wraps an upgraded socket and runs its read
//! and write pumps once a room accepts it. The `/ws/{key}` endpoint
//! upgrades HTTP requests and subscribes the resulting socket.

pub mod connection;
pub mod handler;

#[cfg(test)]
pub(crate) mod testing;

pub use connection::Connection;
