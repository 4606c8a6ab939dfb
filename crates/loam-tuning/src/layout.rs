use crate::error::TuneResult;
use std::path::{Path, PathBuf};

pub const ADAPTER_CONFIG_FILE: &str = "adapter_config.json";
pub const ADAPTER_WEIGHTS_FILE: &str = "adapter_model.json";
pub const TOKENIZER_FILE: &str = "tokenizer.json";
pub const MANIFEST_FILE: &str = "training_manifest.json";

/// Filesystem layout of a fine-tuning output directory.
///
/// The root holds the final adapter (`adapter_config.json`,
/// `adapter_model.json`, `tokenizer.json`) plus `training_manifest.json`;
/// intermediate checkpoints live under `checkpoint-<step>/` with the exact
/// same file set, so any checkpoint is a valid reload target.
#[derive(Debug, Clone)]
pub struct OutputLayout {
    root: PathBuf,
}

impl OutputLayout {
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn adapter_config_path(&self) -> PathBuf {
        self.root.join(ADAPTER_CONFIG_FILE)
    }

    #[must_use]
    pub fn adapter_weights_path(&self) -> PathBuf {
        self.root.join(ADAPTER_WEIGHTS_FILE)
    }

    #[must_use]
    pub fn tokenizer_path(&self) -> PathBuf {
        self.root.join(TOKENIZER_FILE)
    }

    #[must_use]
    pub fn manifest_path(&self) -> PathBuf {
        self.root.join(MANIFEST_FILE)
    }

    #[must_use]
    pub fn checkpoint_dir(&self, step: u64) -> PathBuf {
        self.root.join(format!("checkpoint-{step}"))
    }

    /// Checkpoint directories present on disk, sorted by step.
    pub fn list_checkpoints(&self) -> TuneResult<Vec<(u64, PathBuf)>> {
        let mut out = Vec::new();
        let dir = match std::fs::read_dir(&self.root) {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(out),
            Err(e) => return Err(e.into()),
        };
        for entry in dir {
            let entry = entry?;
            if !entry.path().is_dir() {
                continue;
            }
            let name = entry.file_name();
            let Some(step) = name.to_str().and_then(|n| n.strip_prefix("checkpoint-")) else {
                continue;
            };
            if let Ok(step) = step.parse::<u64>() {
                out.push((step, entry.path()));
            }
        }
        out.sort_by_key(|(step, _)| *step);
        Ok(out)
    }

    pub fn ensure_root(&self) -> TuneResult<()> {
        std::fs::create_dir_all(&self.root)?;
        Ok(())
    }
}
