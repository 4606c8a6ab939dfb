//! End-to-end backend tests: train, checkpoint, reload, generate, merge.

use loam_core::{merge_adapter, FineTuneJobRunner, GenerationHandle};
use loam_core::device::Device;
use loam_tuning::{
    sha256_file, JobConfig, NullProgressSink, OptimParams, OutputLayout, Trainer, TrainingExample,
};
use std::path::PathBuf;
use tempfile::TempDir;

fn corpus() -> Vec<TrainingExample> {
    vec![
        TrainingExample {
            text: "<|im_start|>user\nWhat is LoRA?<|im_end|>\n<|im_start|>assistant\nLow-rank adapters.<|im_end|>\n".to_string(),
        },
        TrainingExample {
            text: "<|im_start|>user\nHello<|im_end|>\n<|im_start|>assistant\nHi there!<|im_end|>\n".to_string(),
        },
        TrainingExample {
            text: "<|im_start|>user\nPing<|im_end|>\n<|im_start|>assistant\nPong.<|im_end|>\n".to_string(),
        },
    ]
}

fn config(out: PathBuf) -> JobConfig {
    let mut cfg = JobConfig::new("loam/charlm-tiny", out);
    cfg.optim = OptimParams {
        batch_size: 1,
        grad_accum_steps: 2,
        max_steps: 6,
        warmup_steps: 2,
        save_steps: 3,
        logging_steps: 2,
        ..OptimParams::default()
    };
    cfg.max_seq_len = 128;
    cfg
}

#[tokio::test]
async fn test_train_save_reload_generate_roundtrip() {
    let temp = TempDir::new().unwrap();
    let out = temp.path().join("adapter");
    let runner = FineTuneJobRunner::with_device(Device::cpu());
    let cfg = config(out.clone());

    let manifest = runner.run(&cfg, &corpus(), &NullProgressSink).await.unwrap();
    assert_eq!(manifest.metrics.steps, Some(6));
    assert_eq!(manifest.artifacts.len(), 3);

    let mut handle = GenerationHandle::load(&out).unwrap();
    assert_eq!(handle.config().base_model_name_or_path, "loam/charlm-tiny");
    let text = handle
        .generate("<|im_start|>user\nHello<|im_end|>\n", 24, 0.3)
        .unwrap();
    // Chars, not bytes: invalid byte tokens decode to U+FFFD, which is one
    // character but three bytes.
    assert!(text.chars().count() <= 24);
}

#[tokio::test]
async fn test_checkpoints_are_valid_reload_targets() {
    let temp = TempDir::new().unwrap();
    let out = temp.path().join("adapter");
    let runner = FineTuneJobRunner::with_device(Device::cpu());
    let cfg = config(out.clone());
    runner.run(&cfg, &corpus(), &NullProgressSink).await.unwrap();

    let layout = OutputLayout::new(out);
    let checkpoints = layout.list_checkpoints().unwrap();
    let steps: Vec<u64> = checkpoints.iter().map(|(s, _)| *s).collect();
    assert_eq!(steps, vec![3, 6]);

    for (_, dir) in checkpoints {
        let mut handle = GenerationHandle::load(&dir).unwrap();
        handle.generate("ping", 8, 0.0).unwrap();
    }
}

#[tokio::test]
async fn test_identical_seed_reproduces_checkpoints() {
    let temp = TempDir::new().unwrap();

    let mut manifests = Vec::new();
    let mut weight_hashes = Vec::new();
    for name in ["run-a", "run-b"] {
        let out = temp.path().join(name);
        let runner = FineTuneJobRunner::with_device(Device::cpu());
        let mut cfg = config(out.clone());
        cfg.seed = 3407;
        let manifest = runner.run(&cfg, &corpus(), &NullProgressSink).await.unwrap();

        let layout = OutputLayout::new(out);
        let steps: Vec<u64> = layout
            .list_checkpoints()
            .unwrap()
            .into_iter()
            .map(|(s, _)| s)
            .collect();
        assert_eq!(steps, vec![3, 6]);
        weight_hashes.push(sha256_file(&layout.adapter_weights_path()).unwrap());
        manifests.push(manifest);
    }

    assert_eq!(manifests[0].metrics.steps, manifests[1].metrics.steps);
    assert_eq!(manifests[0].dataset_id, manifests[1].dataset_id);
    assert_eq!(weight_hashes[0], weight_hashes[1]);
}

#[tokio::test]
async fn test_merge_after_training_is_reload_independent() {
    let temp = TempDir::new().unwrap();
    let out = temp.path().join("adapter");
    let runner = FineTuneJobRunner::with_device(Device::cpu());
    let cfg = config(out.clone());
    runner.run(&cfg, &corpus(), &NullProgressSink).await.unwrap();

    let merged_dir = temp.path().join("merged");
    let merged = merge_adapter(&out, &merged_dir).unwrap();
    assert_eq!(merged.base_model_name_or_path, "loam/charlm-tiny");
    assert!(merged_dir.join("model.json").exists());
}

#[tokio::test]
async fn test_rerun_overwrites_same_output_dir() {
    let temp = TempDir::new().unwrap();
    let out = temp.path().join("adapter");
    let runner = FineTuneJobRunner::with_device(Device::cpu());
    let cfg = config(out.clone());

    runner.run(&cfg, &corpus(), &NullProgressSink).await.unwrap();
    let first = sha256_file(&OutputLayout::new(out.clone()).adapter_weights_path()).unwrap();

    // Same config and seed again into the same directory: idempotent save.
    runner.run(&cfg, &corpus(), &NullProgressSink).await.unwrap();
    let second = sha256_file(&OutputLayout::new(out).adapter_weights_path()).unwrap();
    assert_eq!(first, second);
}
