use crate::artifacts::TrainingManifest;
use crate::dataset::{Dataset, DatasetSource, TrainingExample};
use crate::error::TuneResult;
use crate::job::{JobConfig, JobId};
use crate::progress::ProgressSink;
use async_trait::async_trait;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrainerStatus {
    Idle,
    Preparing,
    Running,
    Finished,
    Failed(String),
    Cancelled,
}

/// A fine-tuning backend.
///
/// One job owns one device for its whole duration; `run` is synchronous from
/// the caller's perspective (a single awaited call) and `cancel` only takes
/// effect at step boundaries.
#[async_trait]
pub trait Trainer: Send + Sync {
    fn id(&self) -> &'static str;

    /// Validate the config and load the dataset. Side-effect-free beyond
    /// reading the corpus; safe to run ahead of device acquisition.
    async fn prepare(&self, config: &JobConfig, source: &DatasetSource) -> TuneResult<Dataset>;

    /// Execute the bounded training loop and persist artifacts.
    async fn run(
        &self,
        config: &JobConfig,
        dataset: &[TrainingExample],
        progress: &dyn ProgressSink,
    ) -> TuneResult<TrainingManifest>;

    async fn status(&self, job_id: &JobId) -> TuneResult<TrainerStatus>;

    /// Request cancellation; honored at the next step boundary.
    async fn cancel(&self, job_id: &JobId) -> TuneResult<()>;
}
