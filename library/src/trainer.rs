use std::{error::Error, fmt, sync::Arc};

use comms::{frame::TrainingResult, msg::Hyperparameters};
use parking_lot::Mutex;
use storage::DatasetRecord;
use tokio::task;

/// The numeric training step, provided by the embedding application.
///
/// `train` may block for a long time; the node runs it on tokio's blocking pool so inbound
/// frames keep being queued meanwhile. Timeouts, if any, are the trainer's business.
pub trait Trainer: Send + 'static {
    /// Trains one round.
    ///
    /// # Arguments
    /// * `dataset` - The repository's dataset as stored when the round was admitted.
    /// * `hyperparameters` - The settings sent by the coordinator for this round.
    ///
    /// # Returns
    /// The round's result or a `TrainerErr`, in which case the round stays uncommitted.
    fn train(
        &mut self,
        dataset: &DatasetRecord,
        hyperparameters: &Hyperparameters,
    ) -> Result<TrainingResult, TrainerErr>;
}

/// A failed training step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainerErr(String);

impl TrainerErr {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

impl fmt::Display for TrainerErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Error for TrainerErr {}

/// A trainer shared between the bootstrap handle and the node task.
#[derive(Clone)]
pub(crate) struct SharedTrainer(Arc<Mutex<Box<dyn Trainer>>>);

impl SharedTrainer {
    pub fn new(trainer: Box<dyn Trainer>) -> Self {
        Self(Arc::new(Mutex::new(trainer)))
    }

    /// Runs the trainer on the blocking pool.
    ///
    /// The dataset and hyperparameters are moved in to satisfy `'static`. A panic inside
    /// the trainer is reported as a `TrainerErr`.
    pub async fn train(
        &self,
        dataset: DatasetRecord,
        hyperparameters: Hyperparameters,
    ) -> Result<TrainingResult, TrainerErr> {
        let trainer = Arc::clone(&self.0);

        task::spawn_blocking(move || trainer.lock().train(&dataset, &hyperparameters))
            .await
            .map_err(|e| TrainerErr::new(format!("trainer task failed: {e}")))?
    }
}
