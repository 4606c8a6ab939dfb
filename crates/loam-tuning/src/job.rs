use crate::error::{TuneError, TuneResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// Identifier for a fine-tuning job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub String);

impl JobId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Low-rank adapter hyperparameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdapterParams {
    /// Rank of the A/B decomposition.
    pub rank: u32,
    /// Scaling numerator; the adapter delta is scaled by `alpha / rank`.
    pub alpha: f32,
    /// Dropout probability on the adapter input path during training.
    pub dropout: f32,
    /// Named base-model modules the adapter wraps.
    pub target_modules: Vec<String>,
}

impl Default for AdapterParams {
    fn default() -> Self {
        Self {
            rank: 8,
            alpha: 16.0,
            dropout: 0.1,
            target_modules: vec!["embed_tokens".to_string(), "lm_head".to_string()],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LrSchedule {
    Constant,
    Linear,
}

/// Optimization hyperparameters for the bounded training loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimParams {
    pub batch_size: u32,
    pub grad_accum_steps: u32,
    pub learning_rate: f64,
    pub max_steps: u64,
    pub warmup_steps: u64,
    pub weight_decay: f64,
    pub schedule: LrSchedule,
    /// Checkpoint every this many optimizer steps.
    pub save_steps: u64,
    /// Emit a progress event every this many optimizer steps.
    pub logging_steps: u64,
}

impl Default for OptimParams {
    fn default() -> Self {
        Self {
            batch_size: 2,
            grad_accum_steps: 4,
            learning_rate: 1e-4,
            max_steps: 200,
            warmup_steps: 10,
            weight_decay: 0.01,
            schedule: LrSchedule::Linear,
            save_steps: 50,
            logging_steps: 10,
        }
    }
}

/// Where trained artifacts land.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputSpec {
    /// Local directory for checkpoints and the final adapter.
    pub dir: PathBuf,
    /// Optional hub repository id; when set, the final artifact is exported
    /// to the local hub staging root after saving.
    #[serde(default)]
    pub hub_repo: Option<String>,
}

/// Precision selection policy.
///
/// Under `Auto` the mode follows device capability detected at call time;
/// the two force variants are the only caller-side override.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrecisionPolicy {
    Auto,
    ForceFull,
    ForceHalf,
}

impl Default for PrecisionPolicy {
    fn default() -> Self {
        Self::Auto
    }
}

/// Declarative description of one fine-tuning job.
///
/// Created once at job start and never mutated; every backend call takes it
/// by reference instead of reading process-wide state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    pub job_id: JobId,
    pub created_at: DateTime<Utc>,
    /// Base model id, resolved against the model registry.
    pub base_model: String,
    pub adapter: AdapterParams,
    pub optim: OptimParams,
    pub output: OutputSpec,
    pub seed: u64,
    /// Examples are truncated to this many tokens after tokenization.
    pub max_seq_len: u32,
    pub precision: PrecisionPolicy,
}

impl JobConfig {
    #[must_use]
    pub fn new(base_model: impl Into<String>, output_dir: PathBuf) -> Self {
        Self {
            job_id: JobId::new(),
            created_at: Utc::now(),
            base_model: base_model.into(),
            adapter: AdapterParams::default(),
            optim: OptimParams::default(),
            output: OutputSpec { dir: output_dir, hub_repo: None },
            seed: 3407,
            max_seq_len: 1024,
            precision: PrecisionPolicy::default(),
        }
    }

    /// Eager validation; runs before any model download or device allocation.
    pub fn validate(&self) -> TuneResult<()> {
        if self.base_model.trim().is_empty() {
            return Err(TuneError::Config("base_model is required".to_string()));
        }
        if self.adapter.rank == 0 {
            return Err(TuneError::Config("adapter.rank must be >= 1".to_string()));
        }
        if !self.adapter.alpha.is_finite() || self.adapter.alpha <= 0.0 {
            return Err(TuneError::Config("adapter.alpha must be > 0".to_string()));
        }
        if !(0.0..1.0).contains(&self.adapter.dropout) {
            return Err(TuneError::Config("adapter.dropout must be in [0, 1)".to_string()));
        }
        if self.adapter.target_modules.is_empty() {
            return Err(TuneError::Config("adapter.target_modules must not be empty".to_string()));
        }
        if self.optim.batch_size == 0 {
            return Err(TuneError::Config("optim.batch_size must be >= 1".to_string()));
        }
        if self.optim.grad_accum_steps == 0 {
            return Err(TuneError::Config("optim.grad_accum_steps must be >= 1".to_string()));
        }
        if !self.optim.learning_rate.is_finite() || self.optim.learning_rate <= 0.0 {
            return Err(TuneError::Config("optim.learning_rate must be > 0".to_string()));
        }
        if self.optim.max_steps == 0 {
            return Err(TuneError::Config("optim.max_steps must be >= 1".to_string()));
        }
        if self.optim.save_steps == 0 {
            return Err(TuneError::Config("optim.save_steps must be >= 1".to_string()));
        }
        if self.optim.logging_steps == 0 {
            return Err(TuneError::Config("optim.logging_steps must be >= 1".to_string()));
        }
        if self.max_seq_len == 0 {
            return Err(TuneError::Config("max_seq_len must be >= 1".to_string()));
        }
        if self.output.dir.as_os_str().is_empty() {
            return Err(TuneError::Config("output.dir is required".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> JobConfig {
        JobConfig::new("loam/charlm-tiny", PathBuf::from("out"))
    }

    #[test]
    fn test_default_config_validates() {
        assert!(config().validate().is_ok());
    }

    #[test]
    fn test_validate_requires_base_model() {
        let mut cfg = config();
        cfg.base_model = "  ".to_string();
        assert!(matches!(cfg.validate(), Err(TuneError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_zero_rank_and_batch() {
        let mut cfg = config();
        cfg.adapter.rank = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = config();
        cfg.optim.batch_size = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_dropout_of_one() {
        let mut cfg = config();
        cfg.adapter.dropout = 1.0;
        assert!(cfg.validate().is_err());
    }
}
