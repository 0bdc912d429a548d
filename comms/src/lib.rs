mod error;
pub mod frame;
pub mod msg;
mod receiver;
mod sender;

use futures::{
    StreamExt,
    stream::{SplitSink, SplitStream},
};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::{WebSocketStream, tungstenite::Message};

pub use error::ProtocolErr;
pub use receiver::{Closure, Event, FrameReceiver};
pub use sender::FrameSender;

/// Re-exported so dependants can name socket types without depending on the transport crate.
pub use tokio_tungstenite;

/// The receiving half of a split websocket.
pub type WsReceiver<S> = FrameReceiver<SplitStream<WebSocketStream<S>>>;

/// The sending half of a split websocket.
pub type WsSender<S> = FrameSender<SplitSink<WebSocketStream<S>, Message>>;

/// Creates both `FrameReceiver` and `FrameSender` network channel parts.
///
/// Given an open websocket, splits it and returns both ends of the communication.
///
/// # Arguments
/// * `ws` - An established websocket stream.
///
/// # Returns
/// A communication stream in the form of a frame receiver and sender.
pub fn channel<S>(ws: WebSocketStream<S>) -> (WsReceiver<S>, WsSender<S>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (tx, rx) = ws.split();
    (FrameReceiver::new(rx), FrameSender::new(tx))
}
