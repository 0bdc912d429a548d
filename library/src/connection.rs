use std::io;

use comms::{
    Closure, Event, WsSender,
    frame::{Outbound, Registration},
    tokio_tungstenite::{self, MaybeTlsStream, WebSocketStream},
};
use log::{debug, info};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpStream,
    sync::{mpsc, watch},
    task::JoinHandle,
};

use crate::{
    config::Endpoint,
    error::{LibraryErr, Result},
};

/// Opens the websocket to the coordinator.
///
/// This trait acts as an indirection layer, letting the connection manager dial real
/// sockets in production and in-memory ones in tests.
#[async_trait::async_trait]
pub trait Connector: Send + Sync {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Opens a websocket to `endpoint`.
    async fn connect(&self, endpoint: &Endpoint) -> io::Result<WebSocketStream<Self::Stream>>;
}

/// Dials the endpoint over tcp, with tls for `wss` urls.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

#[async_trait::async_trait]
impl Connector for WsConnector {
    type Stream = MaybeTlsStream<TcpStream>;

    async fn connect(&self, endpoint: &Endpoint) -> io::Result<WebSocketStream<Self::Stream>> {
        let (ws, _) = tokio_tungstenite::connect_async(endpoint.url())
            .await
            .map_err(io::Error::other)?;

        Ok(ws)
    }
}

/// Lifecycle of the coordinator connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Registered,
    Listening,
    Closed,
}

/// Owns the transport: connects, registers, queues inbound events and sends frames.
///
/// Inbound events are pumped by a reader task into an unbounded queue, so frames that
/// arrive while a round is training wait in arrival order instead of being dropped.
pub struct Connection<C: Connector> {
    connector: C,
    endpoint: Endpoint,
    state: watch::Sender<ConnectionState>,
    tx: Option<WsSender<C::Stream>>,
    events: mpsc::UnboundedReceiver<Event>,
    reader: Option<JoinHandle<()>>,
}

impl<C: Connector> Connection<C> {
    /// Creates a new, disconnected `Connection`.
    ///
    /// # Arguments
    /// * `connector` - How to open the socket.
    /// * `endpoint` - The coordinator's url for this repository.
    pub fn new(connector: C, endpoint: Endpoint) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (_, events) = mpsc::unbounded_channel();

        Self {
            connector,
            endpoint,
            state,
            tx: None,
            events,
            reader: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Subscribes to state transitions.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    fn set_state(&self, state: ConnectionState) {
        debug!("connection state {:?} -> {state:?}", self.state());
        self.state.send_replace(state);
    }

    /// Opens the socket, registers as a library peer and starts listening.
    ///
    /// Any previous socket is discarded first.
    ///
    /// # Errors
    /// `LibraryErr::Connection` if the socket can't be opened or the registration frame
    /// can't be sent; the connection is left `Disconnected`.
    pub async fn connect(&mut self) -> Result<()> {
        self.discard();
        self.set_state(ConnectionState::Connecting);
        info!("connecting to {}", self.endpoint);

        let ws = match self.connector.connect(&self.endpoint).await {
            Ok(ws) => ws,
            Err(e) => {
                self.set_state(ConnectionState::Disconnected);
                return Err(LibraryErr::Connection(e));
            }
        };

        let (mut rx, mut tx) = comms::channel(ws);
        let registration = Outbound::Registration(Registration::library());
        if let Err(e) = tx.send(&registration).await {
            self.set_state(ConnectionState::Disconnected);
            return Err(LibraryErr::Connection(e));
        }
        self.set_state(ConnectionState::Registered);

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        self.reader = Some(tokio::spawn(async move {
            loop {
                let event = rx.recv().await;
                let closed = matches!(event, Event::Closed(_));

                if events_tx.send(event).is_err() || closed {
                    break;
                }
            }
        }));

        self.events = events_rx;
        self.tx = Some(tx);
        self.set_state(ConnectionState::Listening);
        info!("connection successful, listening");
        Ok(())
    }

    /// Waits for the next inbound event, in arrival order.
    ///
    /// Without a live reader this reports an abnormal closure.
    pub async fn next_event(&mut self) -> Event {
        self.events
            .recv()
            .await
            .unwrap_or(Event::Closed(Closure::Abnormal))
    }

    /// Sends a frame over the live socket.
    ///
    /// Nothing is buffered: if the frame can't be sent now it is not sent at all.
    ///
    /// # Errors
    /// `LibraryErr::NotConnected` if the connection isn't listening, `LibraryErr::Connection`
    /// if the socket fails while sending.
    pub async fn send(&mut self, frame: &Outbound) -> Result<()> {
        if self.state() != ConnectionState::Listening {
            return Err(LibraryErr::NotConnected);
        }

        let Some(tx) = self.tx.as_mut() else {
            return Err(LibraryErr::NotConnected);
        };

        tx.send(frame).await.map_err(LibraryErr::Connection)
    }

    /// Marks the socket as gone after the peer closed it or it failed.
    pub fn mark_closed(&mut self) {
        self.discard();
        self.set_state(ConnectionState::Closed);
    }

    /// Closes the socket on purpose with a normal close code.
    pub async fn close(&mut self) {
        if let Some(tx) = self.tx.as_mut() {
            tx.close().await;
        }

        self.mark_closed();
    }

    fn discard(&mut self) {
        self.tx = None;
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

impl<C: Connector> Drop for Connection<C> {
    fn drop(&mut self) {
        self.discard();
    }
}
