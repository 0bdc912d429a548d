//! The implementation of the receiving end of the application layer protocol.

use futures::{Stream, StreamExt};
use log::{debug, warn};
use tokio_tungstenite::tungstenite::{
    self, Message,
    protocol::{CloseFrame, frame::coding::CloseCode},
};

/// How the transport ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Closure {
    /// The peer sent a close frame with the given code.
    Clean(u16),
    /// The socket failed or ended without a closing handshake.
    Abnormal,
}

impl Closure {
    fn from_frame(frame: Option<CloseFrame<'_>>) -> Self {
        match frame {
            Some(frame) if frame.code == CloseCode::Abnormal => Self::Abnormal,
            Some(frame) => Self::Clean(frame.code.into()),
            None => Self::Clean(CloseCode::Status.into()),
        }
    }
}

/// A single inbound transport event, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Text(String),
    Closed(Closure),
}

/// The receiving end handle of the communication.
pub struct FrameReceiver<R>
where
    R: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    rx: R,
}

impl<R> FrameReceiver<R>
where
    R: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    /// Creates a new `FrameReceiver` instance.
    ///
    /// # Arguments
    /// * `rx` - The underlying message stream.
    pub(super) fn new(rx: R) -> Self {
        Self { rx }
    }

    /// Waits for the next meaningful event on the socket.
    ///
    /// Pings, pongs and raw frames are skipped. Binary frames are accepted when they hold
    /// valid UTF-8. Once a `Closed` event has been returned the receiver should not be
    /// polled again.
    ///
    /// # Returns
    /// The next text frame or the way the socket was closed.
    pub async fn recv(&mut self) -> Event {
        loop {
            match self.rx.next().await {
                Some(Ok(Message::Text(text))) => return Event::Text(text),
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                    Ok(text) => return Event::Text(text),
                    Err(e) => warn!("dropping binary frame that is not utf-8: {e}"),
                },
                Some(Ok(Message::Close(frame))) => return Event::Closed(Closure::from_frame(frame)),
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!("socket error: {e}");
                    return Event::Closed(Closure::Abnormal);
                }
                None => return Event::Closed(Closure::Abnormal),
            }
        }
    }
}
