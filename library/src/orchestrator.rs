use std::sync::Arc;

use comms::{
    ProtocolErr,
    frame::NewWeights,
    msg::{Request, TrainRequest},
};
use log::{debug, error, info, warn};
use storage::{LocalStore, RepositoryId};

use crate::{
    error::{LibraryErr, Result},
    tracker::{Admission, Rejection, RoundTracker},
    trainer::{SharedTrainer, Trainer},
};

/// Where a single inbound frame ended up.
#[derive(Debug)]
pub enum Disposition {
    /// The round was trained and committed, this frame must be sent back.
    Reply(NewWeights),
    /// Admission control refused the round, nothing was trained.
    Dropped(Rejection),
    /// A collaborator failed after admission, the round stays uncommitted.
    Failed(LibraryErr),
    /// The frame could not be decoded.
    Invalid(ProtocolErr),
    Stopped,
}

/// Sequences admission, data loading, training and commit for each request.
pub struct Orchestrator<S> {
    repo_id: RepositoryId,
    store: Arc<S>,
    tracker: RoundTracker<S>,
    trainer: SharedTrainer,
}

impl<S: LocalStore + Sync + 'static> Orchestrator<S> {
    /// Creates a new `Orchestrator`.
    ///
    /// # Arguments
    /// * `repo_id` - The repository this connection registered for.
    /// * `store` - Where the dataset and the session rounds live.
    /// * `trainer` - The numeric training step.
    pub fn new(repo_id: RepositoryId, store: Arc<S>, trainer: Box<dyn Trainer>) -> Self {
        Self::with_shared(repo_id, store, SharedTrainer::new(trainer))
    }

    pub(crate) fn with_shared(repo_id: RepositoryId, store: Arc<S>, trainer: SharedTrainer) -> Self {
        Self {
            tracker: RoundTracker::new(Arc::clone(&store)),
            repo_id,
            store,
            trainer,
        }
    }

    /// Decodes and handles one inbound text frame.
    ///
    /// Never fails: every problem is logged and reported through the returned disposition.
    pub async fn handle(&self, text: &str) -> Disposition {
        match Request::decode(text) {
            Ok(Request::Train(request)) => self.train(request).await,
            Ok(Request::Stop) => {
                info!("received STOP message, nothing to do");
                Disposition::Stopped
            }
            Err(e) => {
                warn!("dropping frame: {e}");
                Disposition::Invalid(e)
            }
        }
    }

    /// Runs one train request through admission, training and commit.
    pub async fn train(&self, request: TrainRequest) -> Disposition {
        let session_id = request.session_id.as_str();
        let round = request.round;
        debug!(session_id = session_id, round = round; "received TRAIN message");

        match self.tracker.admit(&self.repo_id, &request).await {
            Ok(Admission::Accepted) => {}
            Ok(Admission::Rejected(rejection)) => {
                info!(session_id = session_id, round = round; "ignoring server's message: {rejection}");
                return Disposition::Dropped(rejection);
            }
            Err(e) => {
                error!(session_id = session_id, round = round; "admission failed: {e}");
                return Disposition::Failed(e);
            }
        }

        match self.run_round(&request).await {
            Ok(frame) => Disposition::Reply(frame),
            Err(e) => {
                error!(session_id = session_id, round = round; "round failed: {e}");
                Disposition::Failed(e)
            }
        }
    }

    async fn run_round(&self, request: &TrainRequest) -> Result<NewWeights> {
        let dataset = self.store.get_dataset(&self.repo_id).await?;

        info!(
            session_id = request.session_id.as_str(),
            round = request.round,
            rows = dataset.rows();
            "starting round"
        );

        let results = self
            .trainer
            .train(dataset, request.hyperparameters.clone())
            .await?;

        self.tracker
            .commit(&self.repo_id, &request.session_id, request.round)
            .await?;

        info!(
            session_id = request.session_id.as_str(),
            round = request.round;
            "finished training"
        );

        Ok(NewWeights::new(request, results))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use comms::{frame::TrainingResult, msg::Hyperparameters};
    use serde_json::json;
    use storage::{DatasetRecord, MemoryStore};

    use super::*;
    use crate::{test::FlakyStore, trainer::TrainerErr};

    struct RowCounter {
        calls: Arc<AtomicUsize>,
        fail_first: bool,
    }

    impl Trainer for RowCounter {
        fn train(
            &mut self,
            dataset: &DatasetRecord,
            _hyperparameters: &Hyperparameters,
        ) -> std::result::Result<TrainingResult, TrainerErr> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_first && call == 0 {
                return Err(TrainerErr::new("out of memory"));
            }

            Ok(TrainingResult::new(json!([1.0, 2.0]), dataset.rows() as f64))
        }
    }

    fn repo() -> RepositoryId {
        RepositoryId::new("R1").unwrap()
    }

    fn train_frame(session_id: &str, round: u64) -> String {
        json!({
            "action": "TRAIN",
            "sessionId": session_id,
            "round": round,
            "hyperparameters": {},
        })
        .to_string()
    }

    async fn orchestrator(fail_first: bool) -> (Orchestrator<MemoryStore>, Arc<MemoryStore>, Arc<AtomicUsize>) {
        let store = Arc::new(MemoryStore::new());
        let record = DatasetRecord::new(vec![vec![1.0, 2.0]; 3]).unwrap();
        store.put_dataset(&repo(), record).await.unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let trainer = RowCounter {
            calls: Arc::clone(&calls),
            fail_first,
        };

        let orchestrator = Orchestrator::new(repo(), Arc::clone(&store), Box::new(trainer));
        (orchestrator, store, calls)
    }

    #[tokio::test]
    async fn accepted_round_is_trained_committed_and_answered() {
        let (orchestrator, store, calls) = orchestrator(false).await;

        let Disposition::Reply(frame) = orchestrator.handle(&train_frame("S1", 1)).await else {
            panic!("expected a reply");
        };

        assert_eq!(frame.session_id, "S1");
        assert_eq!(frame.round, 1);
        assert_eq!(frame.results.omega, 3.0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let record = store.get_dataset(&repo()).await.unwrap();
        assert_eq!(record.session_round("S1"), Some(1));
    }

    #[tokio::test]
    async fn redelivered_round_is_dropped() {
        let (orchestrator, _, calls) = orchestrator(false).await;

        assert!(matches!(
            orchestrator.handle(&train_frame("S1", 1)).await,
            Disposition::Reply(_)
        ));
        assert!(matches!(
            orchestrator.handle(&train_frame("S1", 1)).await,
            Disposition::Dropped(Rejection::StaleOrOutOfOrderRound {
                current: 1,
                requested: 1
            })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn skipped_round_is_dropped_without_training() {
        let (orchestrator, store, calls) = orchestrator(false).await;

        assert!(matches!(
            orchestrator.handle(&train_frame("S1", 2)).await,
            Disposition::Dropped(_)
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let record = store.get_dataset(&repo()).await.unwrap();
        assert_eq!(record.session_round("S1"), Some(0));
    }

    #[tokio::test]
    async fn failed_training_leaves_round_retryable() {
        let (orchestrator, store, calls) = orchestrator(true).await;

        assert!(matches!(
            orchestrator.handle(&train_frame("S1", 1)).await,
            Disposition::Failed(LibraryErr::Trainer(_))
        ));
        let record = store.get_dataset(&repo()).await.unwrap();
        assert_eq!(record.session_round("S1"), Some(0));

        assert!(matches!(
            orchestrator.handle(&train_frame("S1", 1)).await,
            Disposition::Reply(_)
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn store_failure_on_commit_leaves_round_retryable() {
        let store = Arc::new(FlakyStore::default());
        let record = DatasetRecord::new(vec![vec![1.0, 2.0]; 3]).unwrap();
        store.put_dataset(&repo(), record).await.unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let trainer = RowCounter {
            calls: Arc::clone(&calls),
            fail_first: false,
        };
        let orchestrator = Orchestrator::new(repo(), Arc::clone(&store), Box::new(trainer));

        // Known session: admission only reads, so the next update is the commit.
        orchestrator.tracker.current_round(&repo(), "S1").await.unwrap();
        store.fail_next_update();

        assert!(matches!(
            orchestrator.handle(&train_frame("S1", 1)).await,
            Disposition::Failed(LibraryErr::StoreUnavailable(_))
        ));
        let record = store.get_dataset(&repo()).await.unwrap();
        assert_eq!(record.session_round("S1"), Some(0));

        let Disposition::Reply(frame) = orchestrator.handle(&train_frame("S1", 1)).await else {
            panic!("expected a reply");
        };
        assert_eq!(frame.round, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn unknown_repository_fails() {
        let calls = Arc::new(AtomicUsize::new(0));
        let trainer = RowCounter {
            calls: Arc::clone(&calls),
            fail_first: false,
        };
        let orchestrator = Orchestrator::new(repo(), Arc::new(MemoryStore::new()), Box::new(trainer));

        assert!(matches!(
            orchestrator.handle(&train_frame("S1", 1)).await,
            Disposition::Failed(LibraryErr::UnknownRepository(_))
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn stop_and_garbage_have_no_side_effects() {
        let (orchestrator, store, calls) = orchestrator(false).await;

        assert!(matches!(
            orchestrator.handle(r#"{"action":"STOP"}"#).await,
            Disposition::Stopped
        ));
        assert!(matches!(
            orchestrator.handle(r#"{"action":"DANCE"}"#).await,
            Disposition::Invalid(ProtocolErr::UnknownAction(_))
        ));
        assert!(matches!(
            orchestrator.handle("{").await,
            Disposition::Invalid(ProtocolErr::Malformed(_))
        ));

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        let record = store.get_dataset(&repo()).await.unwrap();
        assert_eq!(record.sessions().count(), 0);
    }
}
