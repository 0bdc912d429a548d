//! The implementation of the sending end of the application layer protocol.

use std::{io, time::Duration};

use futures::{Sink, SinkExt};
use log::{debug, warn};
use serde::Serialize;
use tokio_tungstenite::tungstenite::{
    self, Message,
    protocol::{CloseFrame, frame::coding::CloseCode},
};

const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// The sending end handle of the communication.
pub struct FrameSender<W>
where
    W: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    tx: W,
}

impl<W> FrameSender<W>
where
    W: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    /// Creates a new `FrameSender` instance.
    ///
    /// # Arguments
    /// * `tx` - The underlying message sink.
    pub(super) fn new(tx: W) -> Self {
        Self { tx }
    }

    /// Sends `msg` through the inner sender as a single json text frame.
    ///
    /// # Arguments
    /// * `msg` - A serializable object.
    ///
    /// # Returns
    /// A result object that returns `io::Error` on failure.
    pub async fn send<T: Serialize>(&mut self, msg: &T) -> io::Result<()> {
        let text = serde_json::to_string(msg)?;
        self.tx
            .send(Message::Text(text))
            .await
            .map_err(io::Error::other)
    }

    /// Starts the closing handshake with a normal close code.
    ///
    /// Gives up after five seconds. Failures are not reported, the socket is being
    /// discarded anyway.
    pub async fn close(&mut self) {
        self.close_within(CLOSE_TIMEOUT).await;
    }

    /// Same as `close` but waiting at most `limit` for the close frame to be written.
    pub async fn close_within(&mut self, limit: Duration) {
        let frame = CloseFrame {
            code: CloseCode::Normal,
            reason: "".into(),
        };

        match tokio::time::timeout(limit, self.tx.send(Message::Close(Some(frame)))).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!("failed to send close frame: {e}"),
            Err(_) => warn!("peer did not take the close frame within {limit:?}"),
        }
    }
}
