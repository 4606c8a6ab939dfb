use crate::adapter::{load_adapter_weights, read_adapter_config, ModelHandle};
use crate::model::ModelRegistry;
use crate::tensor::Matrix;
use crate::tokenizer::ByteTokenizer;
use loam_tuning::layout::TOKENIZER_FILE;
use loam_tuning::TuneResult;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

pub const MERGED_CONFIG_FILE: &str = "config.json";
pub const MERGED_WEIGHTS_FILE: &str = "model.json";

/// Config written next to merged weights.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergedModelConfig {
    pub base_model_name_or_path: String,
    pub merged_from_rank: u32,
    pub hidden_dim: usize,
    pub vocab_size: usize,
}

/// Offline adapter merge: fold `scale * B.A` into the frozen base weights
/// and write a standalone full-model checkpoint to `out_dir`.
///
/// Deliberately a separate post-processing step; `run` never calls this.
pub fn merge_adapter(adapter_dir: &Path, out_dir: &Path) -> TuneResult<MergedModelConfig> {
    let config = read_adapter_config(adapter_dir)?;
    let base = ModelRegistry::load(&config.base_model_name_or_path)?;
    let adapter = load_adapter_weights(adapter_dir, &config, &base)?;
    let tokenizer = ByteTokenizer::load(&adapter_dir.join(TOKENIZER_FILE))?;

    let handle = ModelHandle { model: base, adapter };
    let merged = handle.merge_into_base();

    std::fs::create_dir_all(out_dir)?;

    let merged_config = MergedModelConfig {
        base_model_name_or_path: config.base_model_name_or_path.clone(),
        merged_from_rank: config.r,
        hidden_dim: merged.hidden_dim(),
        vocab_size: merged.vocab_size(),
    };
    std::fs::write(
        out_dir.join(MERGED_CONFIG_FILE),
        serde_json::to_string_pretty(&merged_config)?,
    )?;

    let weights: BTreeMap<&str, &Matrix> = merged
        .module_names()
        .into_iter()
        .filter_map(|name| merged.module(name).map(|m| (name, m)))
        .collect();
    std::fs::write(
        out_dir.join(MERGED_WEIGHTS_FILE),
        serde_json::to_string(&weights)?,
    )?;

    tokenizer.save(&out_dir.join(TOKENIZER_FILE))?;

    info!(
        base_model = %merged_config.base_model_name_or_path,
        dir = %out_dir.display(),
        "wrote merged model"
    );
    Ok(merged_config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{attach_adapter, save_adapter_dir};
    use crate::device::Precision;
    use loam_tuning::{AdapterParams, TuneError};
    use tempfile::TempDir;

    #[test]
    fn test_merge_writes_full_model_files() {
        let temp = TempDir::new().unwrap();
        let adapter_dir = temp.path().join("adapter");
        let model = ModelRegistry::load("loam/charlm-tiny").unwrap();
        let handle = attach_adapter(model, &AdapterParams::default(), 3407).unwrap();
        save_adapter_dir(&adapter_dir, &handle, &ByteTokenizer::new(), Precision::Full).unwrap();

        let out = temp.path().join("merged");
        let config = merge_adapter(&adapter_dir, &out).unwrap();
        assert_eq!(config.merged_from_rank, 8);
        assert!(out.join(MERGED_CONFIG_FILE).exists());
        assert!(out.join(MERGED_WEIGHTS_FILE).exists());
        assert!(out.join(TOKENIZER_FILE).exists());
    }

    #[test]
    fn test_merge_missing_adapter_is_not_found() {
        let temp = TempDir::new().unwrap();
        assert!(matches!(
            merge_adapter(&temp.path().join("nope"), &temp.path().join("out")),
            Err(TuneError::NotFound(_))
        ));
    }
}
