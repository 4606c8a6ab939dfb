use crate::adapter::{attach_adapter, save_adapter_dir, LoraAdapter, LoraModule};
use crate::device::Device;
use crate::hub::export_to_hub;
use crate::model::{BaseModel, ModelRegistry, EMBED_TOKENS, LM_HEAD};
use crate::tensor::Matrix;
use crate::tokenizer::ByteTokenizer;
use loam_tuning::{
    compute_dataset_id, load_dataset, make_artifact, ArtifactKind, Dataset, DatasetSource,
    JobConfig, JobId, LrSchedule, OutputLayout, ProgressEvent, ProgressSink, Trainer,
    TrainerStatus, TrainingExample, TrainingManifest, TrainingMetrics, TuneError, TuneResult,
};
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// The local fine-tuning backend: attaches a LoRA adapter to a registry
/// base model and runs a bounded SGD loop over next-token cross-entropy,
/// checkpointing every `save_steps` optimizer steps.
#[derive(Clone)]
pub struct FineTuneJobRunner {
    device: Device,
    statuses: Arc<Mutex<HashMap<String, TrainerStatus>>>,
    cancelled: Arc<Mutex<HashSet<String>>>,
}

impl FineTuneJobRunner {
    /// Runner on the device detected from the current environment.
    #[must_use]
    pub fn new() -> Self {
        Self::with_device(Device::detect())
    }

    #[must_use]
    pub fn with_device(device: Device) -> Self {
        Self {
            device,
            statuses: Arc::new(Mutex::new(HashMap::new())),
            cancelled: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    #[must_use]
    pub fn device(&self) -> &Device {
        &self.device
    }

    fn set_status(&self, job_id: &JobId, status: TrainerStatus) {
        if let Ok(mut s) = self.statuses.lock() {
            s.insert(job_id.0.clone(), status);
        }
    }

    fn is_cancelled(&self, job_id: &JobId) -> bool {
        self.cancelled
            .lock()
            .map(|c| c.contains(&job_id.0))
            .unwrap_or(false)
    }

    /// Working-set estimate checked against the device budget before any
    /// training state is allocated. The dominant terms are the frozen base,
    /// the adapter plus its gradient buffers, and one step's activations.
    fn estimate_working_set(
        &self,
        model: &BaseModel,
        adapter: &LoraAdapter,
        config: &JobConfig,
    ) -> u64 {
        let f32_bytes = 4u64;
        let base = model.param_count() as u64 * f32_bytes;
        let adapter_and_grads = adapter.param_count() as u64 * 2 * f32_bytes;
        let tokens_per_step = u64::from(config.optim.batch_size)
            * u64::from(config.optim.grad_accum_steps)
            * u64::from(config.max_seq_len);
        let activations =
            tokens_per_step * (model.hidden_dim() as u64 + model.vocab_size() as u64) * f32_bytes;
        base + adapter_and_grads + activations
    }

    fn run_inner(
        &self,
        config: &JobConfig,
        dataset: &[TrainingExample],
        progress: &dyn ProgressSink,
    ) -> TuneResult<TrainingManifest> {
        config.validate()?;
        loam_tuning::validate_examples(dataset)?;
        let dataset_id = compute_dataset_id(dataset)?;

        let job_id = config.job_id.clone();
        progress.on_event(ProgressEvent::Started { job_id: job_id.clone() });
        self.set_status(&job_id, TrainerStatus::Preparing);

        let precision = self.device.resolve_precision(config.precision);
        info!(
            device = %self.device.name,
            ?precision,
            base_model = %config.base_model,
            "acquiring base model"
        );

        let model = ModelRegistry::load(&config.base_model)?;
        let mut handle = attach_adapter(model, &config.adapter, config.seed)?;

        let estimate = self.estimate_working_set(&handle.model, &handle.adapter, config);
        if estimate > self.device.memory_budget_bytes {
            return Err(TuneError::Resource(format!(
                "estimated working set {} bytes exceeds device '{}' budget {} bytes",
                estimate, self.device.name, self.device.memory_budget_bytes
            )));
        }

        let layout = OutputLayout::new(config.output.dir.clone());
        layout.ensure_root()?;

        let tokenizer = ByteTokenizer::new();
        let tokenized: Vec<Vec<usize>> = dataset
            .iter()
            .map(|ex| tokenizer.encode(&ex.text, config.max_seq_len as usize))
            .collect();

        // One RNG drives shuffling, dropout, and nothing else; a fixed seed
        // reproduces the whole run on the same build.
        let mut rng = StdRng::seed_from_u64(config.seed);
        let mut order: Vec<usize> = (0..tokenized.len()).collect();
        order.shuffle(&mut rng);
        let mut cursor = 0usize;

        self.set_status(&job_id, TrainerStatus::Running);
        progress.on_event(ProgressEvent::Message {
            job_id: job_id.clone(),
            message: format!(
                "training {} adapter params on {} examples ({} steps)",
                handle.adapter.param_count(),
                dataset.len(),
                config.optim.max_steps
            ),
        });

        let examples_per_step =
            (config.optim.batch_size * config.optim.grad_accum_steps) as usize;
        let max_steps = config.optim.max_steps;
        let mut completed_steps = 0u64;
        let mut examples_seen = 0u64;
        let mut last_loss = f64::NAN;

        for step in 1..=max_steps {
            if self.is_cancelled(&job_id) {
                self.set_status(&job_id, TrainerStatus::Cancelled);
                progress.on_event(ProgressEvent::Message {
                    job_id: job_id.clone(),
                    message: format!("cancelled at step boundary {step}"),
                });
                break;
            }

            let mut grads = zero_grads_like(&handle.adapter);
            let mut loss_sum = 0.0f64;
            let mut token_count = 0usize;

            for _ in 0..examples_per_step {
                let ids = &tokenized[order[cursor]];
                cursor += 1;
                if cursor == order.len() {
                    order.shuffle(&mut rng);
                    cursor = 0;
                }
                let mask = DropoutMask::sample(&handle.adapter, &mut rng);
                let (loss, tokens) =
                    accumulate_example(&handle.model, &handle.adapter, &mut grads, ids, &mask);
                loss_sum += loss;
                token_count += tokens;
                examples_seen += 1;
            }

            if token_count == 0 {
                return Err(TuneError::Data(
                    "batch contained no trainable tokens (all examples truncated to BOS only)"
                        .to_string(),
                ));
            }

            let lr = lr_at(&config.optim, step) as f32;
            apply_update(
                &mut handle.adapter,
                &grads,
                lr,
                config.optim.weight_decay as f32,
                token_count as f32,
            );

            last_loss = loss_sum / token_count as f64;
            completed_steps = step;

            if step % config.optim.logging_steps == 0 || step == max_steps {
                progress.on_event(ProgressEvent::Step {
                    job_id: job_id.clone(),
                    step,
                    total: max_steps,
                    loss: last_loss,
                    lr: f64::from(lr),
                });
            }

            if step % config.optim.save_steps == 0 || step == max_steps {
                let ckpt_dir = layout.checkpoint_dir(step);
                save_adapter_dir(&ckpt_dir, &handle, &tokenizer, precision)?;
                debug!(step, dir = %ckpt_dir.display(), "wrote checkpoint");
                progress.on_event(ProgressEvent::Checkpoint { job_id: job_id.clone(), step });
            }
        }

        // Final save at the output root; idempotent overwrite.
        save_adapter_dir(layout.root(), &handle, &tokenizer, precision)?;

        let artifacts = vec![
            make_artifact(ArtifactKind::AdapterConfig, layout.adapter_config_path())?,
            make_artifact(ArtifactKind::AdapterWeights, layout.adapter_weights_path())?,
            make_artifact(ArtifactKind::Tokenizer, layout.tokenizer_path())?,
        ];

        let manifest = TrainingManifest {
            job_id: job_id.clone(),
            created_at: chrono::Utc::now(),
            base_model: config.base_model.clone(),
            dataset_id,
            metrics: TrainingMetrics {
                train_loss: if last_loss.is_nan() { None } else { Some(last_loss) },
                steps: Some(completed_steps),
                examples_seen: Some(examples_seen),
            },
            artifacts,
        };
        std::fs::write(
            layout.manifest_path(),
            serde_json::to_string_pretty(&manifest)?,
        )?;

        if let Some(hub_repo) = &config.output.hub_repo {
            let staged = export_to_hub(layout.root(), hub_repo)?;
            progress.on_event(ProgressEvent::Message {
                job_id: job_id.clone(),
                message: format!("exported adapter to hub staging: {}", staged.display()),
            });
        }

        let cancelled = self.is_cancelled(&job_id);
        if !cancelled {
            self.set_status(&job_id, TrainerStatus::Finished);
        }
        progress.on_event(ProgressEvent::Finished { job_id });
        Ok(manifest)
    }
}

impl Default for FineTuneJobRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Trainer for FineTuneJobRunner {
    fn id(&self) -> &'static str {
        "loam-local"
    }

    async fn prepare(&self, config: &JobConfig, source: &DatasetSource) -> TuneResult<Dataset> {
        config.validate()?;
        load_dataset(source)
    }

    async fn run(
        &self,
        config: &JobConfig,
        dataset: &[TrainingExample],
        progress: &dyn ProgressSink,
    ) -> TuneResult<TrainingManifest> {
        match self.run_inner(config, dataset, progress) {
            Ok(manifest) => Ok(manifest),
            Err(e) => {
                self.set_status(&config.job_id, TrainerStatus::Failed(e.to_string()));
                Err(e)
            }
        }
    }

    async fn status(&self, job_id: &JobId) -> TuneResult<TrainerStatus> {
        Ok(self
            .statuses
            .lock()
            .ok()
            .and_then(|s| s.get(&job_id.0).cloned())
            .unwrap_or(TrainerStatus::Idle))
    }

    async fn cancel(&self, job_id: &JobId) -> TuneResult<()> {
        if let Ok(mut c) = self.cancelled.lock() {
            c.insert(job_id.0.clone());
        }
        Ok(())
    }
}

/// Per-example dropout state for the adapter path. `0.0` means the adapter
/// contribution (and its gradient) is dropped for this example; otherwise
/// the inverted-scaling factor keeps expectations unchanged.
struct DropoutMask {
    embed: f32,
    head: f32,
}

impl DropoutMask {
    fn sample(adapter: &LoraAdapter, rng: &mut StdRng) -> Self {
        let p = adapter.dropout;
        let mut draw = |wrapped: bool| -> f32 {
            if !wrapped {
                return 0.0;
            }
            if p <= 0.0 {
                return 1.0;
            }
            // The draw happens even for dropped paths to keep the RNG
            // stream aligned across masks.
            if rng.gen::<f32>() < p {
                0.0
            } else {
                1.0 / (1.0 - p)
            }
        };
        Self {
            embed: draw(adapter.modules.contains_key(EMBED_TOKENS)),
            head: draw(adapter.modules.contains_key(LM_HEAD)),
        }
    }
}

fn zero_grads_like(adapter: &LoraAdapter) -> BTreeMap<String, LoraModule> {
    adapter
        .modules
        .iter()
        .map(|(name, m)| {
            (
                name.clone(),
                LoraModule {
                    a: Matrix::zeros(m.a.rows, m.a.cols),
                    b: Matrix::zeros(m.b.rows, m.b.cols),
                },
            )
        })
        .collect()
}

/// Forward + manual backprop for one tokenized example. Gradients flow only
/// into the adapter A/B matrices; the base stays frozen. Returns the summed
/// cross-entropy and the number of predicted tokens.
fn accumulate_example(
    model: &BaseModel,
    adapter: &LoraAdapter,
    grads: &mut BTreeMap<String, LoraModule>,
    ids: &[usize],
    mask: &DropoutMask,
) -> (f64, usize) {
    if ids.len() < 2 {
        return (0.0, 0);
    }

    let d = model.hidden_dim();
    let v = model.vocab_size();
    let scale = adapter.scale();
    let embed = model.embed();
    let head = model.head();
    let embed_lora = adapter.modules.get(EMBED_TOKENS);
    let head_lora = adapter.modules.get(LM_HEAD);
    let embed_scale = scale * mask.embed;
    let head_scale = scale * mask.head;
    let rank = adapter.rank as usize;

    let mut loss = 0.0f64;
    let mut predicted = 0usize;

    for t in 1..ids.len() {
        let prev = ids[t - 1];
        let target = ids[t];

        // e = embed_eff[prev]
        let mut e = embed.row(prev).to_vec();
        if let Some(lora) = embed_lora {
            if embed_scale != 0.0 {
                for (ev, dv) in e.iter_mut().zip(lora.delta_row(prev, embed_scale)) {
                    *ev += dv;
                }
            }
        }

        // h = tanh(e)
        let h: Vec<f32> = e.iter().map(|x| x.tanh()).collect();

        // logits = h . head_eff, with the adapter part factored through
        // the rank-r bottleneck: v_k = h . A[:,k], logits += s * v . B
        let mut logits = vec![0.0f32; v];
        for (i, hi) in h.iter().enumerate() {
            if *hi == 0.0 {
                continue;
            }
            for (l, w) in logits.iter_mut().zip(head.row(i)) {
                *l += hi * w;
            }
        }
        let mut vproj = vec![0.0f32; rank];
        if let Some(lora) = head_lora {
            if head_scale != 0.0 {
                for (i, hi) in h.iter().enumerate() {
                    let a_row = lora.a.row(i);
                    for (vk, ak) in vproj.iter_mut().zip(a_row) {
                        *vk += hi * ak;
                    }
                }
                for (k, vk) in vproj.iter().enumerate() {
                    let coeff = head_scale * vk;
                    if coeff == 0.0 {
                        continue;
                    }
                    for (l, bv) in logits.iter_mut().zip(lora.b.row(k)) {
                        *l += coeff * bv;
                    }
                }
            }
        }

        // softmax cross-entropy
        let max_logit = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let mut probs: Vec<f32> = logits.iter().map(|l| (l - max_logit).exp()).collect();
        let sum: f32 = probs.iter().sum();
        for p in &mut probs {
            *p /= sum;
        }
        loss += -f64::from(probs[target].max(f32::MIN_POSITIVE)).ln();
        predicted += 1;

        // dlogits = p - onehot(target)
        let mut dlogits = probs;
        dlogits[target] -= 1.0;

        // head adapter grads + dh
        let mut dh = vec![0.0f32; d];
        for (i, dh_i) in dh.iter_mut().enumerate() {
            *dh_i = head.row_dot(i, &dlogits);
        }
        if head_scale != 0.0 {
            if let (Some(lora), Some(g)) = (head_lora, grads.get_mut(LM_HEAD)) {
                // u_k = B[k] . dlogits
                let mut u = vec![0.0f32; rank];
                for (k, uk) in u.iter_mut().enumerate() {
                    *uk = lora.b.row_dot(k, &dlogits);
                }
                for (i, hi) in h.iter().enumerate() {
                    let coeff = head_scale * hi;
                    for (k, uk) in u.iter().enumerate() {
                        g.a.add_at(i, k, coeff * uk);
                    }
                }
                for (k, vk) in vproj.iter().enumerate() {
                    let coeff = head_scale * vk;
                    if coeff == 0.0 {
                        continue;
                    }
                    for (j, gl) in dlogits.iter().enumerate() {
                        g.b.add_at(k, j, coeff * gl);
                    }
                }
                // adapter part of dh
                for (i, dh_i) in dh.iter_mut().enumerate() {
                    let a_row = lora.a.row(i);
                    let adapted: f32 = a_row.iter().zip(&u).map(|(a, uk)| a * uk).sum();
                    *dh_i += head_scale * adapted;
                }
            }
        }

        // de = (1 - h^2) * dh
        let de: Vec<f32> = h.iter().zip(&dh).map(|(hi, g)| (1.0 - hi * hi) * g).collect();

        // embed adapter grads; only row `prev` of the embedding sees gradient
        if embed_scale != 0.0 {
            if let (Some(lora), Some(g)) = (embed_lora, grads.get_mut(EMBED_TOKENS)) {
                for k in 0..rank {
                    let bk_dot = lora.b.row_dot(k, &de);
                    g.a.add_at(prev, k, embed_scale * bk_dot);
                    let coeff = embed_scale * lora.a.get(prev, k);
                    if coeff == 0.0 {
                        continue;
                    }
                    for (c, dv) in de.iter().enumerate() {
                        g.b.add_at(k, c, coeff * dv);
                    }
                }
            }
        }
    }

    (loss, predicted)
}

/// Linear warmup followed by the configured decay.
fn lr_at(optim: &loam_tuning::OptimParams, step: u64) -> f64 {
    let base = optim.learning_rate;
    if optim.warmup_steps > 0 && step <= optim.warmup_steps {
        return base * step as f64 / optim.warmup_steps as f64;
    }
    match optim.schedule {
        LrSchedule::Constant => base,
        LrSchedule::Linear => {
            let total = optim.max_steps.max(1);
            let remaining = total.saturating_sub(step) as f64;
            let span = total.saturating_sub(optim.warmup_steps).max(1) as f64;
            base * (remaining / span).max(0.0)
        }
    }
}

/// Plain SGD with decoupled weight decay on the adapter matrices.
fn apply_update(
    adapter: &mut LoraAdapter,
    grads: &BTreeMap<String, LoraModule>,
    lr: f32,
    weight_decay: f32,
    grad_norm: f32,
) {
    for (name, g) in grads {
        let Some(lora) = adapter.modules.get_mut(name) else {
            continue;
        };
        for (w, gw) in lora.a.data.iter_mut().zip(&g.a.data) {
            *w -= lr * (gw / grad_norm + weight_decay * *w);
        }
        for (w, gw) in lora.b.data.iter_mut().zip(&g.b.data) {
            *w -= lr * (gw / grad_norm + weight_decay * *w);
        }
    }
}
