//! A single subscribed WebSocket and its two I/O pumps.
//!
//! Once the room actor accepts a [`Connection`], the socket is split and
//! driven by two tasks:
//!
//! - the **write pump** drains the connection's outbound queue, writes one
//!   JSON text frame per message and pings the peer every `ping_period`;
//! - the **read pump** decodes inbound JSON objects and forwards them to the
//!   room's broadcast intake, enforcing the frame size cap and the pong
//!   deadline.
//!
//! Pump failures are logged and end the connection; they never reach the
//! caller of [`crate::domain::Room::subscribe`].

use std::collections::HashMap;
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{CloseFrame, Message, WebSocket, close_code};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use serde_json::{Map, Value};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, MissedTickBehavior};

use crate::domain::room::{Payload, Unregister};
use crate::domain::room_config::deadline_after;
use crate::domain::RoomConfig;

/// Outgoing half of a socket.
pub type FrameSink = Pin<Box<dyn Sink<Message, Error = axum::Error> + Send>>;

/// Incoming half of a socket.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Message, axum::Error>> + Send>>;

/// Close frame reasons are capped at 123 bytes by RFC 6455.
const MAX_CLOSE_REASON: usize = 123;

/// An upgraded WebSocket waiting to be handed to a room.
///
/// The key must be unique within the room it subscribes to. Attributes are
/// opaque to the room and are reported back through
/// [`crate::domain::Room::connections`].
pub struct Connection {
    key: String,
    attributes: HashMap<String, Value>,
    sink: FrameSink,
    stream: FrameStream,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("key", &self.key)
            .field("attributes", &self.attributes)
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Wraps an upgraded axum WebSocket.
    #[must_use]
    pub fn new(key: impl Into<String>, socket: WebSocket) -> Self {
        let (sink, stream) = socket.split();
        Self::from_parts(key, sink, stream)
    }

    /// Builds a connection from an arbitrary frame sink and stream.
    ///
    /// Useful for transports other than axum's `WebSocket` and for driving
    /// a room without a network.
    #[must_use]
    pub fn from_parts<Si, St>(key: impl Into<String>, sink: Si, stream: St) -> Self
    where
        Si: Sink<Message, Error = axum::Error> + Send + 'static,
        St: Stream<Item = Result<Message, axum::Error>> + Send + 'static,
    {
        Self {
            key: key.into(),
            attributes: HashMap::new(),
            sink: Box::pin(sink),
            stream: Box::pin(stream),
        }
    }

    /// Attaches an application attribute.
    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// The key identifying this connection within its room.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Application attributes attached to this connection.
    #[must_use]
    pub fn attributes(&self) -> &HashMap<String, Value> {
        &self.attributes
    }

    /// Starts both pumps and returns the attributes for the actor's
    /// membership record. `token` identifies this registration in the
    /// unregister request the read pump sends when it stops.
    pub(crate) fn start(
        self,
        outbound: mpsc::Receiver<Payload>,
        link: RoomLink,
        token: u64,
    ) -> HashMap<String, Value> {
        let Self {
            key,
            attributes,
            sink,
            stream,
        } = self;
        let key: Arc<str> = Arc::from(key);
        let (closed_tx, closed_rx) = oneshot::channel();

        tokio::spawn(write_pump(
            sink,
            outbound,
            Arc::clone(&key),
            Arc::clone(&link.room),
            link.config,
            closed_tx,
        ));
        tokio::spawn(read_pump(stream, key, token, link, closed_rx));

        attributes
    }

    /// Sends a policy close frame carrying `reason` and closes the socket.
    pub(crate) async fn reject(self, reason: String, write_wait: Duration) {
        let Self { key, mut sink, .. } = self;
        let frame = Message::Close(Some(CloseFrame {
            code: close_code::POLICY,
            reason: close_reason(reason).into(),
        }));
        if let Err(err) = send_frame(&mut sink, frame, write_wait).await {
            tracing::debug!(connection = %key, reason = %err, "failed to send rejection");
        }
        let _ = time::timeout(write_wait, sink.close()).await;
    }
}

/// The connection's handle on the room it belongs to.
#[derive(Debug, Clone)]
pub(crate) struct RoomLink {
    pub(crate) room: Arc<str>,
    pub(crate) config: RoomConfig,
    pub(crate) broadcast: mpsc::Sender<Payload>,
    pub(crate) unregister: mpsc::UnboundedSender<Unregister>,
}

/// Why a pump stopped.
#[derive(Debug, thiserror::Error)]
enum PumpError {
    #[error("socket error: {0}")]
    Socket(#[from] axum::Error),

    #[error("write not completed within {0:?}")]
    WriteTimeout(Duration),

    #[error("no pong within {0:?}")]
    PongTimeout(Duration),

    #[error("frame of {size} bytes exceeds limit of {limit}")]
    FrameTooLarge { size: usize, limit: usize },

    #[error("invalid json payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("peer went away")]
    PeerGone,

    #[error("room stopped")]
    RoomStopped,
}

async fn write_pump(
    mut sink: FrameSink,
    mut outbound: mpsc::Receiver<Payload>,
    key: Arc<str>,
    room: Arc<str>,
    config: RoomConfig,
    // Dropped on return, which stops the read pump.
    _closed: oneshot::Sender<()>,
) {
    match write_loop(&mut sink, &mut outbound, &config).await {
        Ok(()) => tracing::debug!(room = %room, connection = %key, "write pump finished"),
        Err(err) => {
            tracing::debug!(room = %room, connection = %key, reason = %err, "write pump stopped");
        }
    }
    let _ = time::timeout(config.write_wait, sink.close()).await;
}

async fn write_loop(
    sink: &mut FrameSink,
    outbound: &mut mpsc::Receiver<Payload>,
    config: &RoomConfig,
) -> Result<(), PumpError> {
    let period = config.ping_period();
    let mut ping = time::interval_at(deadline_after(period), period);
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            payload = outbound.recv() => {
                let Some(payload) = payload else {
                    send_frame(sink, Message::Close(None), config.write_wait).await?;
                    return Ok(());
                };
                let text = serde_json::to_string(&*payload)?;
                send_frame(sink, Message::text(text), config.write_wait).await?;
            }
            _ = ping.tick() => {
                send_frame(sink, Message::Ping(Bytes::new()), config.write_wait).await?;
            }
        }
    }
}

async fn read_pump(
    mut stream: FrameStream,
    key: Arc<str>,
    token: u64,
    link: RoomLink,
    mut closed: oneshot::Receiver<()>,
) {
    match read_loop(&mut stream, &link, &mut closed).await {
        Ok(()) => tracing::debug!(room = %link.room, connection = %key, "read pump finished"),
        Err(err) => {
            tracing::debug!(room = %link.room, connection = %key, reason = %err, "read pump stopped");
        }
    }
    let _ = link.unregister.send(Unregister::evict(key.to_string(), token));
}

async fn read_loop(
    stream: &mut FrameStream,
    link: &RoomLink,
    closed: &mut oneshot::Receiver<()>,
) -> Result<(), PumpError> {
    let pong_wait = link.config.pong_wait;
    let limit = link.config.max_message_size;
    let mut deadline = deadline_after(pong_wait);

    loop {
        let next = tokio::select! {
            _ = &mut *closed => return Ok(()),
            next = time::timeout_at(deadline, stream.next()) => {
                next.map_err(|_| PumpError::PongTimeout(pong_wait))?
            }
        };

        let object = match next.ok_or(PumpError::PeerGone)?? {
            Message::Text(text) => decode_object(text.as_str().as_bytes(), limit)?,
            Message::Binary(data) => decode_object(&data, limit)?,
            Message::Pong(_) => {
                deadline = deadline_after(pong_wait);
                continue;
            }
            Message::Ping(_) => continue,
            Message::Close(_) => return Ok(()),
        };

        link.broadcast
            .send(Arc::new(Value::Object(object)))
            .await
            .map_err(|_| PumpError::RoomStopped)?;
    }
}

fn decode_object(data: &[u8], limit: usize) -> Result<Map<String, Value>, PumpError> {
    if data.len() > limit {
        return Err(PumpError::FrameTooLarge {
            size: data.len(),
            limit,
        });
    }
    Ok(serde_json::from_slice(data)?)
}

async fn send_frame(
    sink: &mut FrameSink,
    frame: Message,
    write_wait: Duration,
) -> Result<(), PumpError> {
    time::timeout(write_wait, sink.send(frame))
        .await
        .map_err(|_| PumpError::WriteTimeout(write_wait))??;
    Ok(())
}

fn close_reason(mut reason: String) -> String {
    if reason.len() > MAX_CLOSE_REASON {
        let mut end = MAX_CLOSE_REASON;
        while !reason.is_char_boundary(end) {
            end -= 1;
        }
        reason.truncate(end);
    }
    reason
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use serde_json::json;
    use tokio_test::assert_ok;

    use super::*;
    use crate::ws::testing;

    fn link(config: RoomConfig) -> (RoomLink, mpsc::Receiver<Payload>, mpsc::UnboundedReceiver<Unregister>) {
        let (broadcast, broadcast_rx) = mpsc::channel(8);
        let (unregister, unregister_rx) = mpsc::unbounded_channel();
        let link = RoomLink {
            room: Arc::from("test"),
            config,
            broadcast,
            unregister,
        };
        (link, broadcast_rx, unregister_rx)
    }

    #[test]
    fn decode_rejects_oversized_frames() {
        let err = decode_object(br#"{"a":"0123456789"}"#, 8);
        assert!(matches!(err, Err(PumpError::FrameTooLarge { size: 18, limit: 8 })));
    }

    #[test]
    fn decode_requires_an_object() {
        assert!(matches!(decode_object(b"[1,2]", 64), Err(PumpError::Json(_))));
        let object = assert_ok!(decode_object(br#"{"x":1}"#, 64));
        assert_eq!(Value::Object(object), json!({"x": 1}));
    }

    #[test]
    fn close_reason_is_truncated_on_char_boundary() {
        let long = "é".repeat(100);
        let reason = close_reason(long);
        assert!(reason.len() <= MAX_CLOSE_REASON);
        assert!(reason.chars().all(|c| c == 'é'));
        assert_eq!(close_reason("short".to_string()), "short");
    }

    #[test]
    fn attributes_are_kept() {
        let (conn, _peer) = testing::socket("a");
        let conn = conn.with_attribute("name", "alice");
        assert_eq!(conn.key(), "a");
        assert_eq!(conn.attributes().get("name"), Some(&json!("alice")));
    }

    #[tokio::test]
    async fn write_pump_serializes_messages_and_closes() {
        let (conn, mut peer) = testing::socket("a");
        let (link, _broadcast_rx, _unregister_rx) = link(RoomConfig::default());
        let (outbound, queue) = mpsc::channel(4);
        let _ = conn.start(queue, link, 1);

        assert_ok!(outbound.send(Arc::new(json!({"msg": "hi"}))).await);
        assert_eq!(peer.next_json().await, Some(json!({"msg": "hi"})));

        drop(outbound);
        let Some(frame) = peer.next_frame().await else {
            panic!("expected a close frame");
        };
        assert!(matches!(frame, Message::Close(None)));
    }

    #[tokio::test]
    async fn read_pump_forwards_objects_to_the_room() {
        let (conn, peer) = testing::socket("a");
        let (link, mut broadcast_rx, _unregister_rx) = link(RoomConfig::default());
        let (_outbound, queue) = mpsc::channel(4);
        let _ = conn.start(queue, link, 1);

        peer.send_text(r#"{"x":1}"#);
        let Some(payload) = time::timeout(testing::WAIT, broadcast_rx.recv())
            .await
            .ok()
            .flatten()
        else {
            panic!("expected a forwarded payload");
        };
        assert_eq!(*payload, json!({"x": 1}));
    }

    #[tokio::test]
    async fn read_pump_unregisters_on_malformed_payload() {
        let (conn, peer) = testing::socket("a");
        let (link, _broadcast_rx, mut unregister_rx) = link(RoomConfig::default());
        let (_outbound, queue) = mpsc::channel(4);
        let _ = conn.start(queue, link, 7);

        peer.send_text("not json");
        let Some(unregister) = time::timeout(testing::WAIT, unregister_rx.recv())
            .await
            .ok()
            .flatten()
        else {
            panic!("expected an unregister request");
        };
        assert_eq!(unregister.key, "a");
        assert_eq!(unregister.token, Some(7));
        assert!(unregister.reply.is_none());
    }

    #[tokio::test]
    async fn write_pump_pings_on_cadence() {
        let (conn, mut peer) = testing::socket("a");
        let config = RoomConfig::default().with_pong_wait(Duration::from_millis(100));
        let (link, _broadcast_rx, _unregister_rx) = link(config);
        let (_outbound, queue) = mpsc::channel(4);
        let _ = conn.start(queue, link, 1);

        let Some(frame) = peer.next_frame().await else {
            panic!("expected a ping");
        };
        assert!(matches!(frame, Message::Ping(_)));
    }

    #[tokio::test]
    async fn reject_sends_policy_close() {
        let (conn, mut peer) = testing::socket("a");
        conn.reject("connection already subscribed: a".to_string(), Duration::from_secs(1))
            .await;
        let Some(Message::Close(Some(frame))) = peer.next_frame().await else {
            panic!("expected a close frame with a reason");
        };
        assert_eq!(frame.code, close_code::POLICY);
        assert_eq!(frame.reason.as_str(), "connection already subscribed: a");
    }
}
