//! Room handle and the actor that owns its connection set.
//!
//! A [`Room`] is a cheap, clonable handle. All membership state lives in a
//! single [`RoomActor`] task; every public operation is a message sent to
//! one of the actor's intakes:
//!
//! ```text
//! subscribe ───► register   ─┐
//! unsubscribe ─► unregister ─┤
//! read pumps ──► broadcast  ─┼─► RoomActor ──► outbound queue ──► write pump
//! connections ─► query      ─┤      (owns connections map)
//! close ───────► close      ─┘
//! ```
//!
//! The actor starts lazily on the first subscription, stops by itself once
//! it has been empty for a full idle interval (a later subscription starts
//! a fresh one), and stops for good on [`Room::close`].

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::time::{self, Interval, MissedTickBehavior};

use super::RoomConfig;
use super::room_config::deadline_after;
use crate::error::RoomError;
use crate::ws::connection::{Connection, RoomLink};

/// A broadcast message. Shared between all outbound queues of a fan-out.
pub type Payload = Arc<Value>;

/// Snapshot of one subscribed connection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionInfo {
    /// Connection key, unique within the room.
    pub key: String,
    /// Application attributes attached before subscribing.
    pub attributes: HashMap<String, Value>,
}

/// Request to drop a connection from the room.
///
/// `reply` is set for explicit [`Room::unsubscribe`] calls; pumps and
/// slow-consumer eviction fire and forget. Those carry the `token` of the
/// registration they belong to, so a late request from a torn-down
/// connection cannot remove a newer connection that reused its key.
#[derive(Debug)]
pub(crate) struct Unregister {
    pub(crate) key: String,
    pub(crate) token: Option<u64>,
    pub(crate) reply: Option<oneshot::Sender<bool>>,
}

impl Unregister {
    pub(crate) fn evict(key: String, token: u64) -> Self {
        Self {
            key,
            token: Some(token),
            reply: None,
        }
    }
}

#[derive(Debug)]
struct Register {
    connection: Connection,
    reply: oneshot::Sender<Result<(), RoomError>>,
}

/// Senders into the running actor.
#[derive(Debug)]
struct ActorHandle {
    generation: u64,
    register: mpsc::UnboundedSender<Register>,
    unregister: mpsc::UnboundedSender<Unregister>,
    broadcast: mpsc::Sender<Payload>,
    query: mpsc::UnboundedSender<oneshot::Sender<Vec<ConnectionInfo>>>,
    close: Option<oneshot::Sender<()>>,
}

#[derive(Debug, Default)]
struct ActorSlot {
    actor: Option<ActorHandle>,
    generation: u64,
    closed: bool,
}

#[derive(Debug)]
struct RoomInner {
    key: Arc<str>,
    config: RoomConfig,
    created_at: DateTime<Utc>,
    slot: Mutex<ActorSlot>,
}

/// A named group of WebSocket subscribers sharing a broadcast bus.
///
/// Cloning yields another handle to the same room.
#[derive(Debug, Clone)]
pub struct Room {
    inner: Arc<RoomInner>,
}

impl Room {
    /// Creates a room. No task runs until the first subscription.
    #[must_use]
    pub fn new(key: impl Into<String>, config: RoomConfig) -> Self {
        let key: String = key.into();
        Self {
            inner: Arc::new(RoomInner {
                key: Arc::from(key),
                config,
                created_at: Utc::now(),
                slot: Mutex::new(ActorSlot::default()),
            }),
        }
    }

    /// The room's key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.inner.key
    }

    /// The room's immutable parameters.
    #[must_use]
    pub fn config(&self) -> &RoomConfig {
        &self.inner.config
    }

    /// When this room object was constructed in this process.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.inner.created_at
    }

    /// Returns `true` if both handles refer to the same room.
    #[must_use]
    pub fn same_room(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Whether an actor is currently running for this room.
    pub async fn is_listening(&self) -> bool {
        self.inner.slot.lock().await.actor.is_some()
    }

    /// Whether [`Room::close`] has been called.
    pub async fn is_closed(&self) -> bool {
        self.inner.slot.lock().await.closed
    }

    /// Hands a connection to the room and starts its pumps.
    ///
    /// Starts the actor if none is running. Returns once the actor has
    /// accepted or rejected the connection; a rejected connection receives
    /// a policy close frame carrying the error text.
    ///
    /// # Errors
    ///
    /// Returns [`RoomError::ConnectionAlreadyExists`] if the key is taken
    /// and [`RoomError::RoomClosed`] if the room has been closed.
    pub async fn subscribe(&self, connection: Connection) -> Result<(), RoomError> {
        let (reply, response) = oneshot::channel();
        {
            let mut slot = self.inner.slot.lock().await;
            if slot.closed {
                return Err(self.reject_closed(connection));
            }
            let actor = self.ensure_actor(&mut slot);
            if let Err(mpsc::error::SendError(Register { connection, .. })) =
                actor.register.send(Register { connection, reply })
            {
                slot.actor = None;
                return Err(self.reject_closed(connection));
            }
        }
        response
            .await
            .unwrap_or_else(|_| Err(RoomError::RoomClosed(self.key().to_string())))
    }

    /// Removes the connection with the given key.
    ///
    /// # Errors
    ///
    /// Returns [`RoomError::ConnectionNotFound`] if no such connection is
    /// subscribed.
    pub async fn unsubscribe(&self, key: &str) -> Result<(), RoomError> {
        let not_found = || RoomError::ConnectionNotFound(key.to_string());
        let unregister = {
            let slot = self.inner.slot.lock().await;
            slot.actor.as_ref().map(|actor| actor.unregister.clone())
        }
        .ok_or_else(not_found)?;

        let (reply, response) = oneshot::channel();
        unregister
            .send(Unregister {
                key: key.to_string(),
                token: None,
                reply: Some(reply),
            })
            .map_err(|_| not_found())?;

        match response.await {
            Ok(true) => Ok(()),
            _ => Err(not_found()),
        }
    }

    /// Fans `message` out to every current connection, best effort.
    ///
    /// Waits only for room on the broadcast intake. Without a running
    /// actor there is nobody to deliver to and the message is dropped.
    pub async fn broadcast(&self, message: Value) {
        let intake = {
            let slot = self.inner.slot.lock().await;
            slot.actor.as_ref().map(|actor| actor.broadcast.clone())
        };
        let Some(intake) = intake else {
            tracing::trace!(room = %self.inner.key, "broadcast dropped, no listener");
            return;
        };
        if intake.send(Arc::new(message)).await.is_err() {
            tracing::trace!(room = %self.inner.key, "broadcast dropped, actor stopped");
        }
    }

    /// Snapshot of the current connections, sorted by key.
    pub async fn connections(&self) -> Vec<ConnectionInfo> {
        let query = {
            let slot = self.inner.slot.lock().await;
            slot.actor.as_ref().map(|actor| actor.query.clone())
        };
        let Some(query) = query else {
            return Vec::new();
        };
        let (reply, response) = oneshot::channel();
        if query.send(reply).is_err() {
            return Vec::new();
        }
        response.await.unwrap_or_default()
    }

    /// Number of current connections.
    pub async fn connection_count(&self) -> usize {
        self.connections().await.len()
    }

    /// Stops the actor and every connection pump. Idempotent.
    ///
    /// Later subscriptions fail with [`RoomError::RoomClosed`].
    pub async fn close(&self) {
        let mut slot = self.inner.slot.lock().await;
        if slot.closed {
            return;
        }
        slot.closed = true;
        if let Some(close) = slot.actor.take().and_then(|mut actor| actor.close.take()) {
            let _ = close.send(());
        }
        tracing::info!(room = %self.inner.key, "room closed");
    }

    fn ensure_actor<'a>(&self, slot: &'a mut ActorSlot) -> &'a ActorHandle {
        let ActorSlot {
            actor, generation, ..
        } = slot;
        actor.get_or_insert_with(|| {
            *generation += 1;
            RoomActor::spawn(Arc::clone(&self.inner), *generation)
        })
    }

    fn reject_closed(&self, connection: Connection) -> RoomError {
        let err = RoomError::RoomClosed(self.key().to_string());
        tokio::spawn(connection.reject(err.to_string(), self.inner.config.write_wait));
        err
    }
}

#[derive(Debug)]
struct Member {
    token: u64,
    outbound: mpsc::Sender<Payload>,
    attributes: HashMap<String, Value>,
}

/// The single task owning a room's connection map.
#[derive(Debug)]
struct RoomActor {
    room: Arc<RoomInner>,
    generation: u64,
    next_token: u64,
    connections: HashMap<String, Member>,
    link: RoomLink,
    register: mpsc::UnboundedReceiver<Register>,
    unregister: mpsc::UnboundedReceiver<Unregister>,
    broadcast: mpsc::Receiver<Payload>,
    query: mpsc::UnboundedReceiver<oneshot::Sender<Vec<ConnectionInfo>>>,
    close: oneshot::Receiver<()>,
}

impl RoomActor {
    fn spawn(room: Arc<RoomInner>, generation: u64) -> ActorHandle {
        let (register_tx, register) = mpsc::unbounded_channel();
        let (unregister_tx, unregister) = mpsc::unbounded_channel();
        let (broadcast_tx, broadcast) = mpsc::channel(room.config.broadcast_capacity);
        let (query_tx, query) = mpsc::unbounded_channel();
        let (close_tx, close) = oneshot::channel();

        let link = RoomLink {
            room: Arc::clone(&room.key),
            config: room.config,
            broadcast: broadcast_tx.clone(),
            unregister: unregister_tx.clone(),
        };
        tracing::debug!(room = %room.key, generation, "room actor starting");

        let actor = Self {
            room,
            generation,
            next_token: 0,
            connections: HashMap::new(),
            link,
            register,
            unregister,
            broadcast,
            query,
            close,
        };
        tokio::spawn(actor.run());

        ActorHandle {
            generation,
            register: register_tx,
            unregister: unregister_tx,
            broadcast: broadcast_tx,
            query: query_tx,
            close: Some(close_tx),
        }
    }

    async fn run(mut self) {
        let mut idle = self.room.config.idle_interval().map(|period| {
            let mut ticker = time::interval_at(deadline_after(period), period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        });

        loop {
            tokio::select! {
                biased;
                _ = &mut self.close => {
                    self.shutdown();
                    break;
                }
                Some(register) = self.register.recv() => self.handle_register(register),
                Some(unregister) = self.unregister.recv() => self.handle_unregister(unregister),
                Some(payload) = self.broadcast.recv() => self.handle_broadcast(&payload),
                Some(reply) = self.query.recv() => {
                    let _ = reply.send(self.snapshot());
                }
                () = idle_tick(&mut idle) => {
                    if self.connections.is_empty() && self.retire().await {
                        tracing::info!(room = %self.room.key, "room idle, actor stopped");
                        break;
                    }
                }
            }
        }

        tracing::debug!(room = %self.room.key, generation = self.generation, "room actor exited");
    }

    fn handle_register(&mut self, Register { connection, reply }: Register) {
        if self.connections.contains_key(connection.key()) {
            let err = RoomError::ConnectionAlreadyExists(connection.key().to_string());
            tracing::debug!(room = %self.room.key, connection = %connection.key(), "duplicate connection key rejected");
            tokio::spawn(connection.reject(err.to_string(), self.room.config.write_wait));
            let _ = reply.send(Err(err));
            return;
        }

        let key = connection.key().to_string();
        self.next_token += 1;
        let token = self.next_token;
        let (outbound, queue) = mpsc::channel(self.room.config.outbound_capacity);
        let attributes = connection.start(queue, self.link.clone(), token);
        self.connections.insert(
            key.clone(),
            Member {
                token,
                outbound,
                attributes,
            },
        );
        tracing::debug!(
            room = %self.room.key,
            connection = %key,
            members = self.connections.len(),
            "connection registered"
        );

        // A caller that gave up waiting still leaves the connection subscribed.
        let _ = reply.send(Ok(()));
    }

    fn handle_unregister(&mut self, Unregister { key, token, reply }: Unregister) {
        let current = self
            .connections
            .get(&key)
            .is_some_and(|member| token.is_none_or(|token| token == member.token));
        if !current {
            if token.is_some() {
                tracing::trace!(room = %self.room.key, connection = %key, "stale unregister ignored");
            }
            if let Some(reply) = reply {
                let _ = reply.send(false);
            }
            return;
        }

        // Dropping the member drops the only outbound sender, which ends the
        // write pump after it flushes a close frame.
        let removed = self.connections.remove(&key).is_some();
        if removed {
            tracing::debug!(
                room = %self.room.key,
                connection = %key,
                members = self.connections.len(),
                "connection unregistered"
            );
        }
        if let Some(reply) = reply {
            let _ = reply.send(removed);
        }
    }

    fn handle_broadcast(&self, payload: &Payload) {
        for (key, member) in &self.connections {
            match member.outbound.try_send(Arc::clone(payload)) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(room = %self.room.key, connection = %key, "outbound queue full, evicting slow consumer");
                    self.evict(key, member.token);
                }
                Err(TrySendError::Closed(_)) => {
                    tracing::debug!(room = %self.room.key, connection = %key, "outbound queue closed, evicting");
                    self.evict(key, member.token);
                }
            }
        }
        tracing::trace!(room = %self.room.key, members = self.connections.len(), "broadcast dispatched");
    }

    fn evict(&self, key: &str, token: u64) {
        let _ = self
            .link
            .unregister
            .send(Unregister::evict(key.to_string(), token));
    }

    fn snapshot(&self) -> Vec<ConnectionInfo> {
        let mut infos: Vec<ConnectionInfo> = self
            .connections
            .iter()
            .map(|(key, member)| ConnectionInfo {
                key: key.clone(),
                attributes: member.attributes.clone(),
            })
            .collect();
        infos.sort_by(|a, b| a.key.cmp(&b.key));
        infos
    }

    /// Clears the room's actor slot unless a registration is in flight.
    ///
    /// Subscribers enqueue under the slot lock, so an empty register intake
    /// observed while holding it stays empty until the slot is cleared.
    async fn retire(&mut self) -> bool {
        let mut slot = self.room.slot.lock().await;
        if !self.register.is_empty() {
            return false;
        }
        if slot
            .actor
            .as_ref()
            .is_some_and(|actor| actor.generation == self.generation)
        {
            slot.actor = None;
        }
        true
    }

    fn shutdown(&mut self) {
        let members = self.connections.len();
        self.connections.clear();
        tracing::debug!(room = %self.room.key, members, "room actor closed all connections");
    }
}

async fn idle_tick(idle: &mut Option<Interval>) {
    match idle {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}
