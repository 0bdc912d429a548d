use std::sync::Arc;

use log::{error, info, warn};
use storage::{DatasetRecord, LocalStore, RepositoryId, Row, StoreErr};
use tokio::{sync::watch, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::{
    config::LibraryConfig,
    connection::{Connection, ConnectionState, Connector, WsConnector},
    error::{LibraryErr, Result},
    node::Node,
    orchestrator::Orchestrator,
    trainer::{SharedTrainer, Trainer},
};

struct Running {
    repo_id: RepositoryId,
    shutdown: CancellationToken,
    state: watch::Receiver<ConnectionState>,
    task: JoinHandle<Result<()>>,
}

/// The embedding application's handle on a federated training client.
///
/// Once bootstrapped, a background task owns the coordinator connection and answers
/// train requests with the provided `Trainer`. Dropping the handle stops that task.
pub struct Library<S, C = WsConnector> {
    config: LibraryConfig,
    store: Arc<S>,
    connector: C,
    trainer: SharedTrainer,
    running: Option<Running>,
}

impl<S: LocalStore + Send + Sync + 'static> Library<S> {
    /// Creates a library that dials the real coordinator.
    pub fn with_store(config: LibraryConfig, store: Arc<S>, trainer: Box<dyn Trainer>) -> Self {
        Self::new(config, store, WsConnector, trainer)
    }
}

impl<S, C> Library<S, C>
where
    S: LocalStore + Send + Sync + 'static,
    C: Connector + Clone + 'static,
{
    /// Creates a new, not yet bootstrapped `Library`.
    ///
    /// # Arguments
    /// * `config` - Endpoint derivation and reconnect settings.
    /// * `store` - Where datasets and session rounds are persisted.
    /// * `connector` - How sockets to the coordinator are opened.
    /// * `trainer` - The numeric training step.
    pub fn new(config: LibraryConfig, store: Arc<S>, connector: C, trainer: Box<dyn Trainer>) -> Self {
        Self {
            config,
            store,
            connector,
            trainer: SharedTrainer::new(trainer),
            running: None,
        }
    }

    /// Stores the initial dataset, connects to the repository's coordinator and starts
    /// answering train requests in the background.
    ///
    /// Does nothing if the library is already bootstrapped. An existing record for
    /// `repo_id` gets its data replaced, its session rounds are kept.
    ///
    /// # Errors
    /// `LibraryErr::InvalidData` for ragged rows, a store error, or
    /// `LibraryErr::Connection` if the first connection attempt fails. In every case the
    /// library stays not bootstrapped and `bootstrap` may be called again.
    pub async fn bootstrap(&mut self, repo_id: RepositoryId, initial_data: Vec<Row>) -> Result<()> {
        if let Some(running) = &self.running {
            info!("already bootstrapped for repository {}, ignoring", running.repo_id);
            return Ok(());
        }

        self.store_initial_data(&repo_id, initial_data).await?;

        let endpoint = self.config.endpoint_for(&repo_id);
        let mut connection = Connection::new(self.connector.clone(), endpoint);
        let state = connection.subscribe();

        if let Err(e) = connection.connect().await {
            error!("bootstrap of repository {repo_id} failed: {e}");
            return Err(e);
        }

        let orchestrator =
            Orchestrator::with_shared(repo_id.clone(), Arc::clone(&self.store), self.trainer.clone());

        let shutdown = CancellationToken::new();
        let node = Node::new(
            connection,
            orchestrator,
            self.config.reconnect_delay(),
            shutdown.clone(),
        );

        let task = tokio::spawn(node.run());
        info!("bootstrapped repository {repo_id}");

        self.running = Some(Running {
            repo_id,
            shutdown,
            state,
            task,
        });

        Ok(())
    }

    async fn store_initial_data(&self, repo_id: &RepositoryId, data: Vec<Row>) -> Result<()> {
        let record = match self.store.get_dataset(repo_id).await {
            Ok(mut existing) => {
                existing.replace_data(data)?;
                existing
            }
            Err(StoreErr::NotFound(_)) => DatasetRecord::new(data)?,
            Err(e) => return Err(e.into()),
        };

        info!(
            rows = record.rows(),
            cols = record.cols();
            "storing initial data for repository {repo_id}"
        );
        self.store.put_dataset(repo_id, record).await?;
        Ok(())
    }

    /// Appends rows to a repository's dataset.
    ///
    /// Rounds trained after this call see the new rows.
    ///
    /// # Errors
    /// `LibraryErr::NotBootstrapped` before `bootstrap` succeeded,
    /// `LibraryErr::InvalidData` if the rows' width doesn't match the dataset, or
    /// `LibraryErr::UnknownRepository` if nothing was stored for `repo_id`.
    pub async fn add_data(&self, repo_id: &RepositoryId, rows: Vec<Row>) -> Result<()> {
        if self.running.is_none() {
            return Err(LibraryErr::NotBootstrapped);
        }

        let count = rows.len();
        self.store.append_data(repo_id, rows).await?;
        info!(rows = count; "appended data to repository {repo_id}");
        Ok(())
    }

    pub fn is_bootstrapped(&self) -> bool {
        self.running.is_some()
    }

    /// Watches the coordinator connection, `None` before bootstrap.
    pub fn state(&self) -> Option<watch::Receiver<ConnectionState>> {
        self.running.as_ref().map(|running| running.state.clone())
    }

    /// Closes the connection with a normal close and waits for the background task.
    ///
    /// Afterwards the library is no longer bootstrapped.
    pub async fn shutdown(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };

        running.shutdown.cancel();
        match running.task.await {
            Ok(Ok(())) => info!("library for repository {} stopped", running.repo_id),
            Ok(Err(e)) => warn!("library stopped with an error: {e}"),
            Err(e) => error!("library task failed: {e}"),
        }
    }
}

impl<S, C> Drop for Library<S, C> {
    fn drop(&mut self) {
        if let Some(running) = &self.running {
            running.shutdown.cancel();
        }
    }
}
