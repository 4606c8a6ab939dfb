use crate::error::{TuneError, TuneResult};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Stable identifier for a dataset (content hash).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DatasetId(pub String);

/// A single formatted conversation turn for SFT-style fine-tuning.
///
/// The text carries its own role-delimiter markup
/// (`<|im_start|>role\n...<|im_end|>`); the runner never re-templates it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingExample {
    pub text: String,
}

pub type Dataset = Vec<TrainingExample>;

/// Where the training corpus comes from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DatasetSource {
    /// A JSON file holding an array of `{"text": ...}` objects.
    JsonArray { path: PathBuf },
    /// A JSONL file, one `TrainingExample` per line.
    Jsonl { path: PathBuf },
    /// Examples supplied directly by the caller.
    Inline { examples: Vec<TrainingExample> },
}

/// Load a dataset from its source. Malformed input fails fast with `Data`;
/// insertion order is preserved for seed-reproducible shuffling downstream.
pub fn load_dataset(source: &DatasetSource) -> TuneResult<Dataset> {
    let examples = match source {
        DatasetSource::JsonArray { path } => read_json_array(path)?,
        DatasetSource::Jsonl { path } => read_jsonl(path)?,
        DatasetSource::Inline { examples } => examples.clone(),
    };
    validate_examples(&examples)?;
    Ok(examples)
}

fn read_json_array(path: &Path) -> TuneResult<Dataset> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        TuneError::Data(format!("cannot read corpus {}: {}", path.display(), e))
    })?;
    serde_json::from_str::<Dataset>(&contents)
        .map_err(|e| TuneError::Data(format!("corpus {} is not a JSON array of {{\"text\"}} objects: {}", path.display(), e)))
}

fn read_jsonl(path: &Path) -> TuneResult<Dataset> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        TuneError::Data(format!("cannot read corpus {}: {}", path.display(), e))
    })?;
    let mut dataset = Vec::new();
    for (idx, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let ex: TrainingExample = serde_json::from_str(line).map_err(|e| {
            TuneError::Data(format!("failed to parse jsonl line {}: {}", idx + 1, e))
        })?;
        dataset.push(ex);
    }
    Ok(dataset)
}

pub fn validate_examples(examples: &[TrainingExample]) -> TuneResult<()> {
    if examples.is_empty() {
        return Err(TuneError::Data("dataset must not be empty".to_string()));
    }
    for (idx, ex) in examples.iter().enumerate() {
        if ex.text.trim().is_empty() {
            return Err(TuneError::Data(format!("example[{idx}] text is empty")));
        }
    }
    Ok(())
}

pub fn compute_dataset_id(examples: &[TrainingExample]) -> TuneResult<DatasetId> {
    let mut hasher = Sha256::new();
    for ex in examples {
        let bytes = serde_json::to_vec(ex)?;
        hasher.update(bytes);
        hasher.update(b"\n");
    }
    Ok(DatasetId(hex::encode(hasher.finalize())))
}
