use crate::tensor::Matrix;
use crate::tokenizer::VOCAB_SIZE;
use loam_tuning::{TuneError, TuneResult};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sha2::{Digest, Sha256};

pub const EMBED_TOKENS: &str = "embed_tokens";
pub const LM_HEAD: &str = "lm_head";

/// The frozen pretrained base: a byte-level causal LM with two named weight
/// modules. `embed_tokens` maps the previous token to a hidden vector
/// (tanh-activated), `lm_head` projects the hidden vector to next-token
/// logits. Weights are derived deterministically from the model id, so the
/// same id always resolves to the same frozen parameters.
#[derive(Debug, Clone)]
pub struct BaseModel {
    model_id: String,
    hidden_dim: usize,
    /// VOCAB_SIZE x hidden_dim
    embed: Matrix,
    /// hidden_dim x VOCAB_SIZE
    head: Matrix,
}

impl BaseModel {
    fn build(model_id: &str, hidden_dim: usize) -> Self {
        let mut rng = StdRng::seed_from_u64(seed_for(model_id));
        let scale = 1.0 / (hidden_dim as f32).sqrt();
        let embed = Matrix::from_fn(VOCAB_SIZE, hidden_dim, |_, _| {
            (rng.gen::<f32>() * 2.0 - 1.0) * scale
        });
        let head = Matrix::from_fn(hidden_dim, VOCAB_SIZE, |_, _| {
            (rng.gen::<f32>() * 2.0 - 1.0) * scale
        });
        Self { model_id: model_id.to_string(), hidden_dim, embed, head }
    }

    #[must_use]
    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    #[must_use]
    pub fn hidden_dim(&self) -> usize {
        self.hidden_dim
    }

    #[must_use]
    pub fn vocab_size(&self) -> usize {
        VOCAB_SIZE
    }

    #[must_use]
    pub fn module_names(&self) -> [&'static str; 2] {
        [EMBED_TOKENS, LM_HEAD]
    }

    /// The embedding matrix (`embed_tokens`), VOCAB_SIZE x hidden_dim.
    #[must_use]
    pub fn embed(&self) -> &Matrix {
        &self.embed
    }

    /// The projection matrix (`lm_head`), hidden_dim x VOCAB_SIZE.
    #[must_use]
    pub fn head(&self) -> &Matrix {
        &self.head
    }

    #[must_use]
    pub fn module(&self, name: &str) -> Option<&Matrix> {
        match name {
            EMBED_TOKENS => Some(&self.embed),
            LM_HEAD => Some(&self.head),
            _ => None,
        }
    }

    #[must_use]
    pub fn module_mut(&mut self, name: &str) -> Option<&mut Matrix> {
        match name {
            EMBED_TOKENS => Some(&mut self.embed),
            LM_HEAD => Some(&mut self.head),
            _ => None,
        }
    }

    /// Total frozen parameter count.
    #[must_use]
    pub fn param_count(&self) -> usize {
        self.embed.len() + self.head.len()
    }
}

fn seed_for(model_id: &str) -> u64 {
    let digest = Sha256::digest(model_id.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(bytes)
}

/// Builtin catalogue of base models. Stands in for a remote model hub: the
/// id resolves locally or not at all.
pub struct ModelRegistry;

const KNOWN_MODELS: &[(&str, usize)] = &[
    ("loam/charlm-tiny", 16),
    ("loam/charlm-base", 32),
];

impl ModelRegistry {
    pub fn load(model_id: &str) -> TuneResult<BaseModel> {
        let Some((id, dim)) = KNOWN_MODELS.iter().find(|(id, _)| *id == model_id) else {
            return Err(TuneError::Dependency(format!(
                "unknown base model '{}' (available: {})",
                model_id,
                Self::known_ids().join(", ")
            )));
        };
        Ok(BaseModel::build(id, *dim))
    }

    #[must_use]
    pub fn known_ids() -> Vec<&'static str> {
        KNOWN_MODELS.iter().map(|(id, _)| *id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_rejects_unknown_id() {
        assert!(matches!(
            ModelRegistry::load("nobody/nothing"),
            Err(TuneError::Dependency(_))
        ));
    }

    #[test]
    fn test_unknown_id_error_lists_known_models() {
        let err = ModelRegistry::load("nobody/nothing").unwrap_err();
        let msg = err.to_string();
        for id in ModelRegistry::known_ids() {
            assert!(msg.contains(id));
        }
    }

    #[test]
    fn test_same_id_builds_identical_weights() {
        let a = ModelRegistry::load("loam/charlm-tiny").unwrap();
        let b = ModelRegistry::load("loam/charlm-tiny").unwrap();
        assert_eq!(a.module(EMBED_TOKENS), b.module(EMBED_TOKENS));
        assert_eq!(a.module(LM_HEAD), b.module(LM_HEAD));
    }

    #[test]
    fn test_module_lookup() {
        let m = ModelRegistry::load("loam/charlm-tiny").unwrap();
        assert!(m.module(EMBED_TOKENS).is_some());
        assert!(m.module("q_proj").is_none());
        let embed = m.module(EMBED_TOKENS).unwrap();
        assert_eq!(embed.rows, m.vocab_size());
        assert_eq!(embed.cols, m.hidden_dim());
    }
}
