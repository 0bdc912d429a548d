use std::{error::Error, fmt, io};

use storage::{RepositoryId, StoreErr};

use crate::trainer::TrainerErr;

/// The library's result type.
pub type Result<T> = std::result::Result<T, LibraryErr>;

/// Library runtime failures.
///
/// Only `Connection` during bootstrap and `NotBootstrapped` reach the embedding
/// application, everything else is logged by the node and the offending frame dropped.
#[derive(Debug)]
pub enum LibraryErr {
    /// The coordinator could not be reached or registered with.
    Connection(io::Error),
    /// A frame was sent while the connection was not listening.
    NotConnected,
    UnknownRepository(RepositoryId),
    StoreUnavailable(StoreErr),
    /// Rows or identifiers rejected by the store.
    InvalidData(StoreErr),
    Trainer(TrainerErr),
    NotBootstrapped,
    /// A commit that doesn't follow the last completed round.
    OutOfSequenceCommit {
        session_id: String,
        current: u64,
        got: u64,
    },
    InvalidConfig(String),
}

impl fmt::Display for LibraryErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connection(e) => write!(f, "connection error: {e}"),
            Self::NotConnected => write!(f, "not connected to the coordinator"),
            Self::UnknownRepository(repo_id) => write!(f, "unknown repository {repo_id}"),
            Self::StoreUnavailable(e) => write!(f, "local store failure: {e}"),
            Self::InvalidData(e) => write!(f, "invalid data: {e}"),
            Self::Trainer(e) => write!(f, "trainer error: {e}"),
            Self::NotBootstrapped => write!(f, "library not bootstrapped"),
            Self::OutOfSequenceCommit {
                session_id,
                current,
                got,
            } => write!(
                f,
                "tried to commit round {got} of session {session_id} which is at round {current}"
            ),
            Self::InvalidConfig(detail) => write!(f, "invalid config: {detail}"),
        }
    }
}

impl Error for LibraryErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Connection(e) => Some(e),
            Self::StoreUnavailable(e) | Self::InvalidData(e) => Some(e),
            Self::Trainer(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StoreErr> for LibraryErr {
    fn from(value: StoreErr) -> Self {
        match value {
            StoreErr::NotFound(repo_id) => Self::UnknownRepository(repo_id),
            StoreErr::NonSequentialRound {
                session_id,
                current,
                got,
            } => Self::OutOfSequenceCommit {
                session_id,
                current,
                got,
            },
            e @ (StoreErr::ShapeMismatch { .. }
            | StoreErr::NonFiniteValue { .. }
            | StoreErr::InvalidRepositoryId(_)) => Self::InvalidData(e),
            e @ (StoreErr::Unavailable(_) | StoreErr::Corrupt(_)) => Self::StoreUnavailable(e),
        }
    }
}

impl From<TrainerErr> for LibraryErr {
    fn from(value: TrainerErr) -> Self {
        Self::Trainer(value)
    }
}
