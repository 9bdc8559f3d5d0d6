//! Server configuration loaded from environment variables.
//!
//! All settings come from environment variables (or a `.env` file via
//! `dotenvy`). Unset or unparsable numeric values fall back to their
//! defaults; only `LISTEN_ADDR` is validated strictly.

use std::net::SocketAddr;
use std::time::Duration;

use crate::domain::{
    DEFAULT_BROADCAST_CAPACITY, DEFAULT_IDLE_SHUTDOWN, DEFAULT_MAX_MESSAGE_SIZE,
    DEFAULT_OUTBOUND_CAPACITY, DEFAULT_PONG_WAIT, DEFAULT_WRITE_WAIT, RoomConfig,
};
use crate::error::RoomError;

/// Default table name for the durable room store.
pub const DEFAULT_ROOM_TABLE: &str = "wsroom";

/// Top-level server configuration.
///
/// Loaded once at startup via [`ServerConfig::from_env`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Socket address to bind the HTTP server to (e.g. `0.0.0.0:8080`).
    pub listen_addr: SocketAddr,

    /// Database connection string. `None` selects the in-memory store.
    pub database_url: Option<String>,

    /// Table holding room rows.
    pub room_table: String,

    /// Maximum number of database connections in the pool.
    pub database_max_connections: u32,

    /// Timeout in seconds for acquiring a database connection.
    pub database_connect_timeout_secs: u64,

    /// Default inbound frame cap in bytes.
    pub max_message_size: usize,

    /// Default idle shutdown in seconds (0 = never).
    pub idle_shutdown_secs: u64,

    /// Seconds allowed for a single socket write.
    pub write_wait_secs: u64,

    /// Seconds a connection may stay silent before it is dropped.
    pub pong_wait_secs: u64,

    /// Per-connection outbound queue capacity.
    pub outbound_capacity: usize,

    /// Pending broadcasts a room buffers before publishers wait.
    pub broadcast_capacity: usize,

    /// Rooms created at startup.
    pub bootstrap_rooms: Vec<String>,

    /// Emit logs as JSON lines instead of human-readable text.
    pub log_json: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            database_url: None,
            room_table: DEFAULT_ROOM_TABLE.to_string(),
            database_max_connections: 10,
            database_connect_timeout_secs: 5,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            idle_shutdown_secs: DEFAULT_IDLE_SHUTDOWN.as_secs(),
            write_wait_secs: DEFAULT_WRITE_WAIT.as_secs(),
            pong_wait_secs: DEFAULT_PONG_WAIT.as_secs(),
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
            broadcast_capacity: DEFAULT_BROADCAST_CAPACITY,
            bootstrap_rooms: Vec::new(),
            log_json: false,
        }
    }
}

impl ServerConfig {
    /// Loads configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns [`RoomError::InvalidConfig`] if `LISTEN_ADDR` is set but
    /// cannot be parsed as a [`SocketAddr`].
    pub fn from_env() -> Result<Self, RoomError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Same as [`ServerConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, RoomError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let listen_addr = match lookup("LISTEN_ADDR") {
            Some(raw) => raw
                .parse()
                .map_err(|e| RoomError::InvalidConfig(format!("LISTEN_ADDR {raw:?}: {e}")))?,
            None => defaults.listen_addr,
        };

        let database_url = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty());
        let room_table = lookup("ROOM_TABLE")
            .filter(|table| !table.trim().is_empty())
            .unwrap_or(defaults.room_table);

        let bootstrap_rooms = lookup("BOOTSTRAP_ROOMS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|key| !key.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let log_json = lookup("LOG_FORMAT").is_some_and(|format| format.eq_ignore_ascii_case("json"));

        Ok(Self {
            listen_addr,
            database_url,
            room_table,
            database_max_connections: parse_var(
                &lookup,
                "DATABASE_MAX_CONNECTIONS",
                defaults.database_max_connections,
            ),
            database_connect_timeout_secs: parse_var(
                &lookup,
                "DATABASE_CONNECT_TIMEOUT_SECS",
                defaults.database_connect_timeout_secs,
            ),
            max_message_size: parse_var(&lookup, "ROOM_MAX_MESSAGE_SIZE", defaults.max_message_size),
            idle_shutdown_secs: parse_var(
                &lookup,
                "ROOM_IDLE_SHUTDOWN_SECS",
                defaults.idle_shutdown_secs,
            ),
            write_wait_secs: parse_var(&lookup, "ROOM_WRITE_WAIT_SECS", defaults.write_wait_secs),
            pong_wait_secs: parse_var(&lookup, "ROOM_PONG_WAIT_SECS", defaults.pong_wait_secs),
            outbound_capacity: parse_var(
                &lookup,
                "ROOM_OUTBOUND_CAPACITY",
                defaults.outbound_capacity,
            ),
            broadcast_capacity: parse_var(
                &lookup,
                "ROOM_BROADCAST_CAPACITY",
                defaults.broadcast_capacity,
            ),
            bootstrap_rooms,
            log_json,
        })
    }

    /// Room parameters applied when a request leaves them unspecified.
    #[must_use]
    pub fn room_defaults(&self) -> RoomConfig {
        RoomConfig::new(
            self.max_message_size,
            Duration::from_secs(self.idle_shutdown_secs),
        )
        .with_write_wait(Duration::from_secs(self.write_wait_secs))
        .with_pong_wait(Duration::from_secs(self.pong_wait_secs))
        .with_outbound_capacity(self.outbound_capacity)
        .with_broadcast_capacity(self.broadcast_capacity)
    }
}

/// Parses a variable as `T`, returning `default` on missing or invalid
/// values.
fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
