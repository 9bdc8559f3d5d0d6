//! Durable room directory over a relational table.
//!
//! [`SqlRoomStore`] persists each room's configuration as one row and keeps
//! the live [`Room`] objects in a process-local cache. After a restart the
//! first [`RoomStore::get`] for a key rebuilds the room from its row.
//!
//! The store talks to the database through `sqlx::AnyPool`; MySQL is the
//! production backing and SQLite serves tests and single-node setups. Both
//! use `?` placeholders, which the statements below rely on.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::any::AnyPoolOptions;
use sqlx::mysql::MySqlDatabaseError;
use sqlx::{AnyPool, Executor};
use tokio::sync::RwLock;

use super::models::RoomRecord;
use super::{RoomStore, validate_idle_shutdown, validate_key};
use crate::domain::{Room, RoomConfig};
use crate::error::RoomError;

/// MySQL `ER_DUP_ENTRY`.
const ER_DUP_ENTRY: u16 = 1062;

/// Longest accepted table name.
const MAX_TABLE_NAME_LEN: usize = 64;

/// SQL text for the three statements used after construction.
#[derive(Debug)]
struct Statements {
    insert: String,
    select: String,
    delete: String,
}

impl Statements {
    fn for_table(table: &str) -> Self {
        Self {
            insert: format!(
                "INSERT INTO {table} (roomKey, max_message_size, idle_shutdown_ns) VALUES (?, ?, ?)"
            ),
            select: format!(
                "SELECT roomKey, max_message_size, idle_shutdown_ns FROM {table} WHERE roomKey = ?"
            ),
            delete: format!("DELETE FROM {table} WHERE roomKey = ?"),
        }
    }

    /// Validates every statement against the database once, so that
    /// malformed SQL or a missing table surfaces at construction. The
    /// prepared handles are discarded; each pooled connection prepares and
    /// caches the statements again on first use.
    async fn prepare(&self, pool: &AnyPool) -> Result<(), sqlx::Error> {
        let mut conn = pool.acquire().await?;
        for sql in [&self.insert, &self.select, &self.delete] {
            (&mut *conn).prepare(sql.as_str()).await?;
        }
        Ok(())
    }
}

/// Room directory whose configuration survives process restarts.
#[derive(Debug)]
pub struct SqlRoomStore {
    pool: AnyPool,
    table: String,
    statements: Statements,
    template: RoomConfig,
    rooms: RwLock<HashMap<String, Room>>,
}

impl SqlRoomStore {
    /// Connects to `database_url` with default pool options and room
    /// timings.
    ///
    /// # Errors
    ///
    /// See [`SqlRoomStore::new`].
    pub async fn connect(database_url: &str, table: &str) -> Result<Self, RoomError> {
        Self::connect_with(AnyPoolOptions::new(), database_url, table, RoomConfig::default()).await
    }

    /// Connects to `database_url` with the given pool options; rooms copy
    /// the timings of `template`.
    ///
    /// # Errors
    ///
    /// Returns [`RoomError::Persistence`] if the connection fails, and
    /// anything [`SqlRoomStore::new`] returns.
    pub async fn connect_with(
        options: AnyPoolOptions,
        database_url: &str,
        table: &str,
        template: RoomConfig,
    ) -> Result<Self, RoomError> {
        sqlx::any::install_default_drivers();
        let pool = options.connect(database_url).await?;
        Self::new(pool, table, template).await
    }

    /// Builds a store over an existing pool: creates the table if needed
    /// and prepares the insert, select and delete statements.
    ///
    /// # Errors
    ///
    /// Returns [`RoomError::InvalidConfig`] if `table` is not a plain SQL
    /// identifier and [`RoomError::Persistence`] on database failure.
    pub async fn new(pool: AnyPool, table: &str, template: RoomConfig) -> Result<Self, RoomError> {
        validate_table_name(table)?;

        let create = format!(
            "CREATE TABLE IF NOT EXISTS {table} (\
             roomKey VARCHAR(100) NOT NULL, \
             max_message_size BIGINT, \
             idle_shutdown_ns BIGINT, \
             PRIMARY KEY (roomKey))"
        );
        sqlx::query(&create).execute(&pool).await?;

        let statements = Statements::for_table(table);
        statements.prepare(&pool).await?;
        tracing::debug!(table, "room table ready");

        Ok(Self {
            pool,
            table: table.to_string(),
            statements,
            template,
            rooms: RwLock::new(HashMap::new()),
        })
    }

    /// Name of the backing table.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Number of live rooms cached in this process.
    pub async fn cached_len(&self) -> usize {
        self.rooms.read().await.len()
    }

    /// Closes every cached room and the database pool.
    pub async fn close(&self) {
        let rooms: Vec<Room> = self.rooms.write().await.drain().map(|(_, room)| room).collect();
        for room in &rooms {
            room.close().await;
        }
        self.pool.close().await;
    }
}

#[async_trait]
impl RoomStore for SqlRoomStore {
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

        let record = RoomRecord::new(key, max_message_size, idle_shutdown)?;
        let inserted = sqlx::query(&self.statements.insert)
            .bind(record.room_key.as_str())
            .bind(record.max_message_size)
            .bind(record.idle_shutdown_ns)
            .execute(&self.pool)
            .await;
        match inserted {
            Ok(_) => {}
            Err(err) if is_unique_violation(&err) => {
                return Err(RoomError::RoomAlreadyExists(key.to_string()));
            }
            Err(err) => return Err(err.into()),
        }

        let room = Room::new(key, self.template.with_limits(max_message_size, idle_shutdown));
        rooms.insert(key.to_string(), room.clone());
        tracing::info!(room = key, max_message_size, ?idle_shutdown, "room created");
        Ok(room)
    }

    async fn get(&self, key: &str) -> Result<Room, RoomError> {
        if let Some(room) = self.rooms.read().await.get(key) {
            return Ok(room.clone());
        }

        // The row is read under the write guard so that a concurrent delete
        // cannot leave a rebuilt room in the cache after its row is gone.
        let mut rooms = self.rooms.write().await;
        if let Some(room) = rooms.get(key) {
            return Ok(room.clone());
        }

        let row: Option<(String, Option<i64>, Option<i64>)> =
            sqlx::query_as(&self.statements.select)
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;
        let Some(row) = row else {
            return Err(RoomError::RoomNotFound(key.to_string()));
        };
        let config = RoomRecord::from(row).config(self.template)?;

        let room = Room::new(key, config);
        rooms.insert(key.to_string(), room.clone());
        tracing::debug!(room = key, "room restored from table");
        Ok(room)
    }

    async fn delete(&self, key: &str) -> Result<(), RoomError> {
        let (cached, result) = {
            let mut rooms = self.rooms.write().await;
            let result = sqlx::query(&self.statements.delete)
                .bind(key)
                .execute(&self.pool)
                .await?;
            (rooms.remove(key), result)
        };

        match cached {
            Some(room) => room.close().await,
            None if result.rows_affected() == 0 => {
                return Err(RoomError::RoomNotFound(key.to_string()));
            }
            None => {}
        }
        tracing::info!(room = key, "room deleted");
        Ok(())
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    let sqlx::Error::Database(db_err) = err else {
        return false;
    };
    db_err.is_unique_violation()
        || db_err
            .try_downcast_ref::<MySqlDatabaseError>()
            .is_some_and(|mysql| mysql.number() == ER_DUP_ENTRY)
}

fn validate_table_name(table: &str) -> Result<(), RoomError> {
    let mut chars = table.chars();
    let starts_well = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    let rest_ok = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if starts_well && rest_ok && table.len() <= MAX_TABLE_NAME_LEN {
        Ok(())
    } else {
        Err(RoomError::InvalidConfig(format!("invalid table name: {table:?}")))
    }
}
