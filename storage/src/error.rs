use std::{
    error::Error,
    fmt::{self, Display},
    io,
};

use crate::RepositoryId;

/// The result type used in the entire storage crate.
pub type Result<T> = std::result::Result<T, StoreErr>;

/// Local store failures.
#[derive(Debug)]
pub enum StoreErr {
    /// No record is stored under this repository.
    NotFound(RepositoryId),
    /// The backing medium could not be read or written.
    Unavailable(io::Error),
    /// A stored record could not be decoded or violates its own invariants.
    Corrupt(String),
    /// A row's width disagrees with the dataset's column count.
    ShapeMismatch {
        row: usize,
        expected: usize,
        got: usize,
    },
    /// A NaN or infinite value, which json can't represent.
    NonFiniteValue { row: usize, col: usize },
    InvalidRepositoryId(String),
    /// A session round may only move forward by exactly one.
    NonSequentialRound {
        session_id: String,
        current: u64,
        got: u64,
    },
}

impl Display for StoreErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound(repo_id) => write!(f, "no dataset stored for repository {repo_id}"),
            Self::Unavailable(e) => write!(f, "store unavailable: {e}"),
            Self::Corrupt(detail) => write!(f, "corrupt record: {detail}"),
            Self::ShapeMismatch { row, expected, got } => write!(
                f,
                "row {row} has {got} columns, the dataset has {expected}"
            ),
            Self::NonFiniteValue { row, col } => {
                write!(f, "row {row} column {col} is not a finite number")
            }
            Self::InvalidRepositoryId(id) => write!(
                f,
                "invalid repository id {id:?}, expected ascii letters, digits, '-' or '_'"
            ),
            Self::NonSequentialRound {
                session_id,
                current,
                got,
            } => write!(
                f,
                "session {session_id} is at round {current}, cannot move to round {got}"
            ),
        }
    }
}

impl Error for StoreErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Unavailable(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for StoreErr {
    fn from(value: io::Error) -> Self {
        Self::Unavailable(value)
    }
}
