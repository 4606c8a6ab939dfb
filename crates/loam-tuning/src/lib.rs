//! Loam Tuning
//!
//! Backend-agnostic fine-tuning primitives for:
//! - Declaring fine-tuning jobs (`JobConfig`)
//! - Representing instruction datasets and examples
//! - Writing adapter artifacts + manifests
//! - Implementing fine-tuning backends (`Trainer`)

pub mod artifacts;
pub mod dataset;
pub mod error;
pub mod job;
pub mod layout;
pub mod progress;
pub mod registry;
pub mod trainer;

pub use artifacts::{make_artifact, sha256_file, ArtifactKind, TrainingArtifact, TrainingManifest, TrainingMetrics};
pub use dataset::{compute_dataset_id, load_dataset, validate_examples, Dataset, DatasetId, DatasetSource, TrainingExample};
pub use error::{TuneError, TuneResult};
pub use job::{AdapterParams, JobConfig, JobId, LrSchedule, OptimParams, OutputSpec, PrecisionPolicy};
pub use layout::OutputLayout;
pub use progress::{NullProgressSink, ProgressEvent, ProgressSink, StdoutProgressSink};
pub use registry::{discover_trained_adapters, TrainedAdapterEntry};
pub use trainer::{Trainer, TrainerStatus};
