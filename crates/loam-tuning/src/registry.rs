use crate::artifacts::TrainingManifest;
use crate::error::TuneResult;
use crate::layout::MANIFEST_FILE;
use std::path::{Path, PathBuf};

/// A discovered trained adapter.
#[derive(Debug, Clone)]
pub struct TrainedAdapterEntry {
    /// Output directory holding the adapter files.
    pub adapter_dir: PathBuf,
    /// Base model the adapter was trained against.
    pub base_model: String,
    /// The job manifest for details/metadata.
    pub manifest: TrainingManifest,
}

fn read_manifest(path: &Path) -> TuneResult<TrainingManifest> {
    let bytes = std::fs::read(path)?;
    Ok(serde_json::from_slice::<TrainingManifest>(&bytes)?)
}

/// Discover trained adapters by scanning `<root>/*/training_manifest.json`.
///
/// Directories without a manifest are skipped, not errors; a missing root
/// yields an empty list.
pub fn discover_trained_adapters(root: &Path) -> TuneResult<Vec<TrainedAdapterEntry>> {
    let mut out = Vec::new();

    let dir = match std::fs::read_dir(root) {
        Ok(d) => d,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(out),
        Err(e) => return Err(e.into()),
    };

    for entry in dir {
        let entry = entry?;
        let adapter_dir = entry.path();
        if !adapter_dir.is_dir() {
            continue;
        }
        let manifest_path = adapter_dir.join(MANIFEST_FILE);
        if !manifest_path.exists() {
            continue;
        }
        let manifest = read_manifest(&manifest_path)?;
        out.push(TrainedAdapterEntry {
            adapter_dir,
            base_model: manifest.base_model.clone(),
            manifest,
        });
    }

    out.sort_by(|a, b| a.manifest.created_at.cmp(&b.manifest.created_at));
    Ok(out)
}
