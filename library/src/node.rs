use std::time::Duration;

use comms::{Closure, Event, frame::Outbound};
use log::{info, warn};
use storage::LocalStore;
use tokio_util::sync::CancellationToken;

use crate::{
    connection::{Connection, Connector},
    error::Result,
    orchestrator::{Disposition, Orchestrator},
};

/// The sequential processing loop of a bootstrapped library.
///
/// Frames are handled one at a time in arrival order. The loop ends when the coordinator
/// closes the connection cleanly or `shutdown` is cancelled; abnormal closures are
/// followed by reconnect attempts until one succeeds.
pub(crate) struct Node<S, C: Connector> {
    connection: Connection<C>,
    orchestrator: Orchestrator<S>,
    reconnect_delay: Duration,
    shutdown: CancellationToken,
}

impl<S, C> Node<S, C>
where
    S: LocalStore + Sync + 'static,
    C: Connector + 'static,
{
    pub fn new(
        connection: Connection<C>,
        orchestrator: Orchestrator<S>,
        reconnect_delay: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            connection,
            orchestrator,
            reconnect_delay,
            shutdown,
        }
    }

    /// Processes inbound frames until the node stops.
    pub async fn run(mut self) -> Result<()> {
        loop {
            let event = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => None,
                event = self.connection.next_event() => Some(event),
            };

            let Some(event) = event else {
                info!("stopping, closing connection");
                self.connection.close().await;
                return Ok(());
            };

            match event {
                Event::Text(text) => self.dispatch(&text).await,
                Event::Closed(Closure::Abnormal) => {
                    warn!("connection lost, reconnecting...");
                    self.connection.mark_closed();

                    if !self.reconnect().await {
                        info!("stopped while reconnecting");
                        return Ok(());
                    }
                }
                Event::Closed(Closure::Clean(code)) => {
                    info!(code = code; "coordinator closed the connection");
                    self.connection.mark_closed();
                    return Ok(());
                }
            }
        }
    }

    async fn dispatch(&mut self, text: &str) {
        let Disposition::Reply(frame) = self.orchestrator.handle(text).await else {
            return;
        };

        let (session_id, round) = (frame.session_id.clone(), frame.round);
        match self.connection.send(&Outbound::NewWeights(frame)).await {
            Ok(()) => info!(session_id = session_id.as_str(), round = round; "sent new weights"),
            Err(e) => warn!(
                session_id = session_id.as_str(),
                round = round;
                "round committed but its result was not delivered: {e}"
            ),
        }
    }

    /// Retries `connect` until it succeeds.
    ///
    /// # Returns
    /// `false` if shutdown was requested before a connection could be made.
    async fn reconnect(&mut self) -> bool {
        let mut attempt: u64 = 0;

        loop {
            attempt += 1;

            let res = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return false,
                res = self.connection.connect() => res,
            };

            match res {
                Ok(()) => {
                    info!(attempt = attempt; "reconnected");
                    return true;
                }
                Err(e) => warn!(attempt = attempt; "reconnect failed: {e}"),
            }

            tokio::select! {
                _ = self.shutdown.cancelled() => return false,
                _ = tokio::time::sleep(self.reconnect_delay) => {}
            }
        }
    }
}
