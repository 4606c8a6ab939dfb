use crate::adapter::{load_adapter_weights, read_adapter_config, AdapterConfig, ModelHandle};
use crate::model::{BaseModel, ModelRegistry};
use crate::tokenizer::ByteTokenizer;
use loam_tuning::layout::TOKENIZER_FILE;
use loam_tuning::{TuneError, TuneResult};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::Path;
use tracing::info;

const DEFAULT_SAMPLING_SEED: u64 = 3407;

/// A reloaded adapter ready for smoke-test generation.
///
/// Reconstructs the base model from the saved adapter config, attaches the
/// persisted adapter weights, and exposes `generate`. The adapter is folded
/// into a copy of the base weights at load time; inference never mutates
/// the artifact on disk.
pub struct GenerationHandle {
    model: BaseModel,
    tokenizer: ByteTokenizer,
    config: AdapterConfig,
    rng: StdRng,
}

impl GenerationHandle {
    /// Load a saved adapter directory (final output or any checkpoint).
    ///
    /// Fails with `NotFound` if the directory or `adapter_config.json` is
    /// absent; with `Dependency` if the referenced base model is unknown.
    pub fn load(dir: &Path) -> TuneResult<Self> {
        Self::load_with_seed(dir, DEFAULT_SAMPLING_SEED)
    }

    pub fn load_with_seed(dir: &Path, seed: u64) -> TuneResult<Self> {
        let config = read_adapter_config(dir)?;
        let base = ModelRegistry::load(&config.base_model_name_or_path)?;
        let adapter = load_adapter_weights(dir, &config, &base)?;
        let tokenizer = ByteTokenizer::load(&dir.join(TOKENIZER_FILE))?;

        info!(
            base_model = %config.base_model_name_or_path,
            rank = config.r,
            dir = %dir.display(),
            "loaded adapter"
        );

        let handle = ModelHandle { model: base, adapter };
        Ok(Self {
            model: handle.merge_into_base(),
            tokenizer,
            config,
            rng: StdRng::seed_from_u64(seed),
        })
    }

    #[must_use]
    pub fn config(&self) -> &AdapterConfig {
        &self.config
    }

    /// Generate a continuation for `prompt`. Temperature at or below zero
    /// means greedy decoding; otherwise logits are divided by the
    /// temperature before sampling.
    pub fn generate(
        &mut self,
        prompt: &str,
        max_new_tokens: usize,
        temperature: f32,
    ) -> TuneResult<String> {
        if prompt.trim().is_empty() {
            return Err(TuneError::Data("prompt must not be empty".to_string()));
        }

        let mut ids = self.tokenizer.encode(prompt, prompt.len() + 1);
        let prompt_len = ids.len();

        for _ in 0..max_new_tokens {
            let prev = ids[ids.len() - 1];
            let next = self.next_token(prev, temperature);
            ids.push(next);
        }

        Ok(self.tokenizer.decode(&ids[prompt_len..]))
    }

    fn next_token(&mut self, prev: usize, temperature: f32) -> usize {
        let embed = self.model.embed();
        let head = self.model.head();
        let h: Vec<f32> = embed.row(prev).iter().map(|x| x.tanh()).collect();

        let v = self.model.vocab_size();
        let mut logits = vec![0.0f32; v];
        for (i, hi) in h.iter().enumerate() {
            for (l, w) in logits.iter_mut().zip(head.row(i)) {
                *l += hi * w;
            }
        }

        if temperature <= 0.0 {
            return argmax(&logits);
        }

        for l in &mut logits {
            *l /= temperature;
        }
        let max_logit = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let mut probs: Vec<f32> = logits.iter().map(|l| (l - max_logit).exp()).collect();
        let sum: f32 = probs.iter().sum();
        for p in &mut probs {
            *p /= sum;
        }

        let draw: f32 = self.rng.gen();
        let mut acc = 0.0f32;
        for (id, p) in probs.iter().enumerate() {
            acc += p;
            if draw <= acc {
                return id;
            }
        }
        probs.len() - 1
    }
}

fn argmax(values: &[f32]) -> usize {
    let mut best = 0;
    for (i, v) in values.iter().enumerate() {
        if *v > values[best] {
            best = i;
        }
    }
    best
}
