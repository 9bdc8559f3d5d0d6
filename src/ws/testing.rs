//! In-memory socket doubles for driving rooms without a network.

use std::time::Duration;

use axum::extract::ws::Message;
use futures_util::{sink, stream};
use serde_json::Value;
use tokio::sync::mpsc;

use super::connection::Connection;

/// Upper bound for any single wait in tests.
pub(crate) const WAIT: Duration = Duration::from_secs(2);

/// The client side of an in-memory socket.
#[derive(Debug)]
pub(crate) struct Peer {
    inbound: mpsc::UnboundedSender<Result<Message, axum::Error>>,
    outbound: mpsc::UnboundedReceiver<Message>,
}

impl Peer {
    /// Sends a text frame to the server side.
    pub(crate) fn send_text(&self, text: &str) {
        let _ = self.inbound.send(Ok(Message::text(text.to_string())));
    }

    /// Sends an arbitrary frame to the server side.
    pub(crate) fn send(&self, frame: Message) {
        let _ = self.inbound.send(Ok(frame));
    }

    /// Next frame written by the server, or `None` after [`WAIT`].
    pub(crate) async fn next_frame(&mut self) -> Option<Message> {
        tokio::time::timeout(WAIT, self.outbound.recv())
            .await
            .ok()
            .flatten()
    }

    /// Next JSON text frame written by the server, skipping pings.
    pub(crate) async fn next_json(&mut self) -> Option<Value> {
        loop {
            match self.next_frame().await? {
                Message::Text(text) => return serde_json::from_str(text.as_str()).ok(),
                Message::Ping(_) => continue,
                _ => return None,
            }
        }
    }
}

/// A connection whose writes are delivered to the returned [`Peer`].
pub(crate) fn socket(key: &str) -> (Connection, Peer) {
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel::<Message>();

    let frames = sink::unfold(outbound_tx, |tx, frame: Message| async move {
        tx.send(frame).map_err(axum::Error::new)?;
        Ok::<_, axum::Error>(tx)
    });
    let connection = Connection::from_parts(key, frames, receiver_stream(inbound_rx));

    (
        connection,
        Peer {
            inbound: inbound_tx,
            outbound: outbound_rx,
        },
    )
}

/// A connection whose writes never complete, as with a peer that stopped
/// reading. The returned sender keeps the inbound side open.
pub(crate) fn stalled_socket(
    key: &str,
) -> (Connection, mpsc::UnboundedSender<Result<Message, axum::Error>>) {
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let frames = sink::unfold((), |(), _frame: Message| {
        std::future::pending::<Result<(), axum::Error>>()
    });
    let connection = Connection::from_parts(key, frames, receiver_stream(inbound_rx));
    (connection, inbound_tx)
}

fn receiver_stream<T: Send + 'static>(
    rx: mpsc::UnboundedReceiver<T>,
) -> impl futures_util::Stream<Item = T> + Send + 'static {
    stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|item| (item, rx)) })
}
