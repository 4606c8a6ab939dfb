use crate::device::Precision;
use crate::model::BaseModel;
use crate::tensor::Matrix;
use crate::tokenizer::ByteTokenizer;
use loam_tuning::layout::{ADAPTER_CONFIG_FILE, ADAPTER_WEIGHTS_FILE, TOKENIZER_FILE};
use loam_tuning::{AdapterParams, TuneError, TuneResult};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Low-rank decomposition for one wrapped module: `delta = scale * A . B`
/// with `A: rows x r` and `B: r x cols` matching the base matrix shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoraModule {
    pub a: Matrix,
    pub b: Matrix,
}

impl LoraModule {
    /// `scale * (A[row] . B)` — the adapter's contribution to one base row.
    #[must_use]
    pub fn delta_row(&self, row: usize, scale: f32) -> Vec<f32> {
        let rank = self.b.rows;
        let cols = self.b.cols;
        let mut out = vec![0.0f32; cols];
        let a_row = self.a.row(row);
        for k in 0..rank {
            let ak = a_row[k] * scale;
            if ak == 0.0 {
                continue;
            }
            let b_row = self.b.row(k);
            for (o, bv) in out.iter_mut().zip(b_row) {
                *o += ak * bv;
            }
        }
        out
    }

    #[must_use]
    pub fn param_count(&self) -> usize {
        self.a.len() + self.b.len()
    }
}

/// The trainable adapter: one `LoraModule` per wrapped base module.
/// `BTreeMap` keeps module order deterministic across save/load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoraAdapter {
    pub rank: u32,
    pub alpha: f32,
    pub dropout: f32,
    pub modules: BTreeMap<String, LoraModule>,
}

impl LoraAdapter {
    #[must_use]
    pub fn scale(&self) -> f32 {
        self.alpha / self.rank as f32
    }

    #[must_use]
    pub fn param_count(&self) -> usize {
        self.modules.values().map(LoraModule::param_count).sum()
    }
}

/// Owned pairing of a loaded base model and its attached adapter. Held
/// exclusively by the runner for the duration of a job and dropped at job
/// end or on failure.
#[derive(Debug, Clone)]
pub struct ModelHandle {
    pub model: BaseModel,
    pub adapter: LoraAdapter,
}

impl ModelHandle {
    /// Base row plus the adapter delta for a wrapped module; the plain base
    /// row for anything the adapter does not cover.
    pub fn effective_row(&self, module_name: &str, row: usize) -> TuneResult<Vec<f32>> {
        let base = self
            .model
            .module(module_name)
            .ok_or_else(|| TuneError::Config(format!("no such module: {module_name}")))?;
        let mut out = base.row(row).to_vec();
        if let Some(lora) = self.adapter.modules.get(module_name) {
            let delta = lora.delta_row(row, self.adapter.scale());
            for (o, d) in out.iter_mut().zip(delta) {
                *o += d;
            }
        }
        Ok(out)
    }

    /// Fold the adapter into a copy of the base weights (offline merge; never
    /// part of the training loop).
    #[must_use]
    pub fn merge_into_base(&self) -> BaseModel {
        let mut merged = self.model.clone();
        let scale = self.adapter.scale();
        for (name, lora) in &self.adapter.modules {
            if let Some(weights) = merged.module_mut(name) {
                for row in 0..weights.rows {
                    let delta = lora.delta_row(row, scale);
                    for (col, d) in delta.iter().enumerate() {
                        weights.add_at(row, col, *d);
                    }
                }
            }
        }
        merged
    }
}

/// Wrap the named target modules of `model` with low-rank A/B pairs.
///
/// A is seeded-random, B is zeros, so the freshly attached adapter is an
/// exact no-op on the base model's behavior. Fails with `Config` if a target
/// module name does not exist on the base model.
pub fn attach_adapter(model: BaseModel, params: &AdapterParams, seed: u64) -> TuneResult<ModelHandle> {
    let mut rng = StdRng::seed_from_u64(seed);
    let rank = params.rank as usize;
    let mut modules = BTreeMap::new();

    for name in &params.target_modules {
        let base = model.module(name).ok_or_else(|| {
            TuneError::Config(format!(
                "target module '{}' does not exist on base model '{}' (available: {})",
                name,
                model.model_id(),
                model.module_names().join(", ")
            ))
        })?;
        let init_scale = 1.0 / (rank as f32).sqrt();
        let a = Matrix::from_fn(base.rows, rank, |_, _| {
            (rng.gen::<f32>() * 2.0 - 1.0) * init_scale
        });
        let b = Matrix::zeros(rank, base.cols);
        modules.insert(name.clone(), LoraModule { a, b });
    }

    let adapter = LoraAdapter {
        rank: params.rank,
        alpha: params.alpha,
        dropout: params.dropout,
        modules,
    };
    Ok(ModelHandle { model, adapter })
}

/// On-disk adapter config (`adapter_config.json`). Field names follow the
/// conventional PEFT layout so that the directory is self-describing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterConfig {
    pub base_model_name_or_path: String,
    pub r: u32,
    pub lora_alpha: f32,
    pub lora_dropout: f32,
    pub target_modules: Vec<String>,
    pub precision: Precision,
}

/// Write the full adapter artifact set into `dir` (idempotent overwrite):
/// `adapter_config.json`, `adapter_model.json`, `tokenizer.json`.
pub fn save_adapter_dir(
    dir: &Path,
    handle: &ModelHandle,
    tokenizer: &ByteTokenizer,
    precision: Precision,
) -> TuneResult<()> {
    std::fs::create_dir_all(dir)?;

    let config = AdapterConfig {
        base_model_name_or_path: handle.model.model_id().to_string(),
        r: handle.adapter.rank,
        lora_alpha: handle.adapter.alpha,
        lora_dropout: handle.adapter.dropout,
        target_modules: handle.adapter.modules.keys().cloned().collect(),
        precision,
    };
    std::fs::write(
        dir.join(ADAPTER_CONFIG_FILE),
        serde_json::to_string_pretty(&config)?,
    )?;

    let weights = match precision {
        Precision::Full => handle.adapter.clone(),
        Precision::Half => narrow_adapter(&handle.adapter),
    };
    std::fs::write(
        dir.join(ADAPTER_WEIGHTS_FILE),
        serde_json::to_string(&weights)?,
    )?;

    tokenizer.save(&dir.join(TOKENIZER_FILE))?;
    Ok(())
}

/// Read `adapter_config.json` from a saved adapter directory.
pub fn read_adapter_config(dir: &Path) -> TuneResult<AdapterConfig> {
    if !dir.is_dir() {
        return Err(TuneError::NotFound(format!(
            "adapter directory missing: {}",
            dir.display()
        )));
    }
    let path = dir.join(ADAPTER_CONFIG_FILE);
    if !path.exists() {
        return Err(TuneError::NotFound(format!(
            "{} missing in {}",
            ADAPTER_CONFIG_FILE,
            dir.display()
        )));
    }
    let bytes = std::fs::read(&path)?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Read and validate adapter weights against the config and base model.
pub fn load_adapter_weights(
    dir: &Path,
    config: &AdapterConfig,
    model: &BaseModel,
) -> TuneResult<LoraAdapter> {
    let path = dir.join(ADAPTER_WEIGHTS_FILE);
    if !path.exists() {
        return Err(TuneError::NotFound(format!(
            "{} missing in {}",
            ADAPTER_WEIGHTS_FILE,
            dir.display()
        )));
    }
    let bytes = std::fs::read(&path)?;
    let adapter: LoraAdapter = serde_json::from_slice(&bytes)?;

    if adapter.rank != config.r {
        return Err(TuneError::Artifact(format!(
            "adapter rank mismatch: weights say {}, config says {}",
            adapter.rank, config.r
        )));
    }
    for name in &config.target_modules {
        let lora = adapter.modules.get(name).ok_or_else(|| {
            TuneError::Artifact(format!("adapter weights missing module '{name}'"))
        })?;
        let base = model.module(name).ok_or_else(|| {
            TuneError::Config(format!(
                "target module '{}' does not exist on base model '{}'",
                name,
                model.model_id()
            ))
        })?;
        if lora.a.rows != base.rows || lora.b.cols != base.cols || lora.a.cols != lora.b.rows {
            return Err(TuneError::Artifact(format!(
                "adapter dims for '{}' do not match base {}x{}: A {}x{}, B {}x{}",
                name, base.rows, base.cols, lora.a.rows, lora.a.cols, lora.b.rows, lora.b.cols
            )));
        }
    }
    Ok(adapter)
}

/// bf16-style narrowing: drop the low 16 mantissa bits of every weight.
fn narrow_adapter(adapter: &LoraAdapter) -> LoraAdapter {
    let mut out = adapter.clone();
    for lora in out.modules.values_mut() {
        for v in lora.a.data.iter_mut().chain(lora.b.data.iter_mut()) {
            *v = f32::from_bits(v.to_bits() & 0xFFFF_0000);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ModelRegistry, EMBED_TOKENS, LM_HEAD};
    use tempfile::TempDir;

    fn params() -> AdapterParams {
        AdapterParams::default()
    }

    #[test]
    fn test_attach_rejects_missing_target_module() {
        let model = ModelRegistry::load("loam/charlm-tiny").unwrap();
        let mut p = params();
        p.target_modules = vec!["q_proj".to_string()];
        assert!(matches!(
            attach_adapter(model, &p, 3407),
            Err(TuneError::Config(_))
        ));
    }

    #[test]
    fn test_fresh_adapter_is_noop() {
        let model = ModelRegistry::load("loam/charlm-tiny").unwrap();
        let base_row = model.module(LM_HEAD).unwrap().row(0).to_vec();
        let handle = attach_adapter(model, &params(), 3407).unwrap();
        let eff = handle.effective_row(LM_HEAD, 0).unwrap();
        assert_eq!(eff, base_row);
    }

    #[test]
    fn test_save_load_roundtrip_preserves_weights() {
        let temp = TempDir::new().unwrap();
        let model = ModelRegistry::load("loam/charlm-tiny").unwrap();
        let mut handle = attach_adapter(model, &params(), 3407).unwrap();
        // Give B a nonzero value so the roundtrip is not trivially zeros.
        handle
            .adapter
            .modules
            .get_mut(EMBED_TOKENS)
            .unwrap()
            .b
            .add_at(0, 0, 0.5);

        let tok = ByteTokenizer::new();
        save_adapter_dir(temp.path(), &handle, &tok, Precision::Full).unwrap();

        let config = read_adapter_config(temp.path()).unwrap();
        assert_eq!(config.base_model_name_or_path, "loam/charlm-tiny");

        let model = ModelRegistry::load(&config.base_model_name_or_path).unwrap();
        let loaded = load_adapter_weights(temp.path(), &config, &model).unwrap();
        assert_eq!(loaded, handle.adapter);
    }

    #[test]
    fn test_read_config_missing_dir_is_not_found() {
        assert!(matches!(
            read_adapter_config(Path::new("/no/such/adapter")),
            Err(TuneError::NotFound(_))
        ));
    }

    #[test]
    fn test_merge_applies_scaled_delta() {
        let model = ModelRegistry::load("loam/charlm-tiny").unwrap();
        let base_val = model.module(LM_HEAD).unwrap().get(0, 0);
        let mut handle = attach_adapter(model, &params(), 3407).unwrap();
        let lora = handle.adapter.modules.get_mut(LM_HEAD).unwrap();
        let a00 = lora.a.get(0, 0);
        lora.b.add_at(0, 0, 1.0);

        let merged = handle.merge_into_base();
        let expected = base_val + handle.adapter.scale() * a00;
        let got = merged.module(LM_HEAD).unwrap().get(0, 0);
        assert!((got - expected).abs() < 1e-5);
    }
}
