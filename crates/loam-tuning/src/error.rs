use thiserror::Error;

pub type TuneResult<T> = std::result::Result<T, TuneError>;

/// Failure taxonomy for fine-tuning jobs.
///
/// Validation errors (`Data`, `Config`) surface before any expensive resource
/// acquisition. `Resource` aborts the current job but leaves already-written
/// checkpoints intact. Nothing is retried automatically at any layer.
#[derive(Debug, Error)]
pub enum TuneError {
    #[error("data error: {0}")]
    Data(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("resource error: {0}")]
    Resource(String),

    #[error("dependency error: {0}")]
    Dependency(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("artifact error: {0}")]
    Artifact(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl TuneError {
    /// Suggested remediation printed next to the cause on failure paths.
    #[must_use]
    pub fn remediation(&self) -> Option<&'static str> {
        match self {
            Self::Data(_) => Some("check the training corpus: it must be a non-empty JSON array of {\"text\": ...} objects"),
            Self::Config(_) => Some("adjust the job configuration (hyperparameters, target modules) and re-run"),
            Self::Resource(_) => Some("reduce batch size or gradient accumulation, or enable an accelerator, and re-run"),
            Self::Dependency(_) => Some("verify the base model id and that required artifacts are installed"),
            Self::NotFound(_) => Some("verify the path points at a saved adapter directory (adapter_config.json present)"),
            Self::Artifact(_) | Self::Io(_) | Self::Json(_) | Self::Other(_) => None,
        }
    }
}
