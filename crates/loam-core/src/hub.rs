use loam_tuning::{TuneError, TuneResult};
use std::path::{Path, PathBuf};
use tracing::info;

/// Environment override for the hub staging root.
pub const HUB_DIR_ENV: &str = "LOAM_HUB_DIR";

fn staging_root() -> PathBuf {
    match std::env::var(HUB_DIR_ENV) {
        Ok(dir) if !dir.trim().is_empty() => PathBuf::from(dir),
        _ => std::env::temp_dir().join("loam-hub"),
    }
}

/// Export a saved adapter directory to the local hub staging area under
/// `<staging_root>/<repo_id>/`, with the root taken from `LOAM_HUB_DIR`
/// (falling back to the system temp dir). Stands in for a remote artifact
/// store push; there is no network involved.
pub fn export_to_hub(adapter_dir: &Path, repo_id: &str) -> TuneResult<PathBuf> {
    export_to_hub_in(&staging_root(), adapter_dir, repo_id)
}

/// Export into an explicit staging root. Re-exporting overwrites prior
/// contents.
pub fn export_to_hub_in(root: &Path, adapter_dir: &Path, repo_id: &str) -> TuneResult<PathBuf> {
    if repo_id.trim().is_empty() {
        return Err(TuneError::Config("hub repo id must not be empty".to_string()));
    }
    if !adapter_dir.is_dir() {
        return Err(TuneError::NotFound(format!(
            "adapter directory missing: {}",
            adapter_dir.display()
        )));
    }

    let target = root.join(repo_id);
    std::fs::create_dir_all(&target).map_err(|e| {
        TuneError::Dependency(format!(
            "cannot create hub staging dir {}: {}",
            target.display(),
            e
        ))
    })?;

    for entry in std::fs::read_dir(adapter_dir)? {
        let entry = entry?;
        let path = entry.path();
        // Checkpoint subdirectories stay local; only the final file set ships.
        if path.is_file() {
            std::fs::copy(&path, target.join(entry.file_name()))?;
        }
    }

    info!(repo = repo_id, dir = %target.display(), "staged adapter for hub upload");
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_export_copies_files_not_checkpoints() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("adapter");
        std::fs::create_dir_all(src.join("checkpoint-50")).unwrap();
        std::fs::write(src.join("adapter_config.json"), b"{}").unwrap();

        let staging = temp.path().join("hub");
        let target = export_to_hub_in(&staging, &src, "user/pet-adapter").unwrap();

        assert!(target.join("adapter_config.json").exists());
        assert!(!target.join("checkpoint-50").exists());
    }

    #[test]
    fn test_export_missing_dir_is_not_found() {
        let temp = TempDir::new().unwrap();
        assert!(matches!(
            export_to_hub_in(temp.path(), &temp.path().join("nope"), "user/x"),
            Err(TuneError::NotFound(_))
        ));
    }
}
