//! Client node of a federated training system.
//!
//! A `Library` keeps a local dataset per repository, connects to the repository's
//! coordinator and answers its train requests exactly once per round.

mod bootstrap;
mod config;
mod connection;
mod error;
mod node;
mod orchestrator;
mod tracker;
mod trainer;

pub use bootstrap::Library;
pub use comms::{
    ProtocolErr,
    frame::TrainingResult,
    msg::{Hyperparameters, TrainRequest},
};
pub use config::{Endpoint, LibraryConfig};
pub use connection::{Connection, ConnectionState, Connector, WsConnector};
pub use error::{LibraryErr, Result};
pub use orchestrator::{Disposition, Orchestrator};
pub use storage::{DatasetRecord, FileStore, LocalStore, MemoryStore, RepositoryId, Row, StoreErr};
pub use tracker::{Admission, Rejection, RoundTracker};
pub use trainer::{Trainer, TrainerErr};
