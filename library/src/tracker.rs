use std::{fmt, sync::Arc};

use comms::msg::TrainRequest;
use storage::{LocalStore, RepositoryId};

use crate::error::Result;

/// Why a train request was not admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// The requested round is not the one right after the last completed round.
    StaleOrOutOfOrderRound { current: u64, requested: u64 },
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StaleOrOutOfOrderRound { current, requested } => write!(
                f,
                "request's round was {requested} and current round is {current}"
            ),
        }
    }
}

/// The outcome of admission control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Accepted,
    Rejected(Rejection),
}

/// Decides which train requests may run, based on the rounds persisted in the store.
///
/// A round is admitted only if it is exactly one past the last committed round, and it is
/// committed only after training succeeded. Since both checks read persisted state, a
/// redelivered request is rejected as stale even across reconnects.
pub struct RoundTracker<S> {
    store: Arc<S>,
}

impl<S: LocalStore> RoundTracker<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Returns the last completed round of a session.
    ///
    /// An unknown session is registered at round 0 and persisted right away. Known
    /// sessions are only read.
    ///
    /// # Errors
    /// `LibraryErr::UnknownRepository` if the repository has no dataset, or a store error.
    pub async fn current_round(&self, repo_id: &RepositoryId, session_id: &str) -> Result<u64> {
        let record = self.store.get_dataset(repo_id).await?;
        if let Some(round) = record.session_round(session_id) {
            return Ok(round);
        }

        let round = self
            .store
            .update(repo_id, |record| Ok(record.ensure_session(session_id)))
            .await?;

        Ok(round)
    }

    /// Checks `request` against the session's persisted round.
    ///
    /// # Returns
    /// `Admission::Accepted` iff `request.round == current_round + 1`.
    pub async fn admit(&self, repo_id: &RepositoryId, request: &TrainRequest) -> Result<Admission> {
        let current = self.current_round(repo_id, &request.session_id).await?;

        if current.checked_add(1) == Some(request.round) {
            Ok(Admission::Accepted)
        } else {
            Ok(Admission::Rejected(Rejection::StaleOrOutOfOrderRound {
                current,
                requested: request.round,
            }))
        }
    }

    /// Records `round` as the session's last completed round.
    ///
    /// # Errors
    /// `LibraryErr::OutOfSequenceCommit` if `round` is not exactly one past the current
    /// round. `admit` gates every commit, so this signals a bug rather than bad input.
    pub async fn commit(&self, repo_id: &RepositoryId, session_id: &str, round: u64) -> Result<()> {
        self.store
            .update(repo_id, |record| record.advance_session(session_id, round))
            .await?;

        Ok(())
    }
}
