//! CLI integration tests for the `loam` binary.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn write_corpus(dir: &TempDir) -> std::path::PathBuf {
    let path = dir.path().join("corpus.json");
    std::fs::write(
        &path,
        r#"[
  {"text": "<|im_start|>user\nA<|im_end|>\n<|im_start|>assistant\nB<|im_end|>\n"},
  {"text": "<|im_start|>user\nC<|im_end|>\n<|im_start|>assistant\nD<|im_end|>\n"}
]"#,
    )
    .unwrap();
    path
}

fn loam() -> Command {
    Command::cargo_bin("loam").unwrap()
}

#[test]
fn test_train_then_test_roundtrip() {
    let temp = TempDir::new().unwrap();
    let corpus = write_corpus(&temp);
    let out = temp.path().join("adapter");

    loam()
        .args(["train", "--data"])
        .arg(&corpus)
        .arg("--output")
        .arg(&out)
        .args(["--max-steps", "2", "--batch-size", "1", "--grad-accum", "1", "--save-steps", "2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Fine-tuning complete"));

    assert!(out.join("adapter_config.json").exists());
    assert!(out.join("checkpoint-2").exists());

    loam()
        .args(["test", "--model"])
        .arg(&out)
        .args(["--prompt", "hello", "--max-new-tokens", "8", "--temperature", "0"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Completion"));
}

#[test]
fn test_train_json_outputs_manifest() {
    let temp = TempDir::new().unwrap();
    let corpus = write_corpus(&temp);
    let out = temp.path().join("adapter");

    loam()
        .args(["train", "--data"])
        .arg(&corpus)
        .arg("--output")
        .arg(&out)
        .args(["--max-steps", "1", "--batch-size", "1", "--grad-accum", "1", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"base_model\": \"loam/charlm-tiny\""));
}

#[test]
fn test_train_rejects_malformed_corpus() {
    let temp = TempDir::new().unwrap();
    let corpus = temp.path().join("bad.json");
    std::fs::write(&corpus, "{not json").unwrap();

    loam()
        .args(["train", "--data"])
        .arg(&corpus)
        .arg("--output")
        .arg(temp.path().join("out"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("data error"));
}

#[test]
fn test_test_missing_model_dir_fails_with_hint() {
    let temp = TempDir::new().unwrap();

    loam()
        .args(["test", "--model"])
        .arg(temp.path().join("missing"))
        .args(["--prompt", "hi"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"))
        .stderr(predicate::str::contains("hint:"));
}

#[test]
fn test_list_empty_root() {
    let temp = TempDir::new().unwrap();

    loam()
        .args(["list", "--root"])
        .arg(temp.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Trained Adapters (0)"));
}

#[test]
fn test_merge_after_train() {
    let temp = TempDir::new().unwrap();
    let corpus = write_corpus(&temp);
    let out = temp.path().join("adapter");

    loam()
        .args(["train", "--data"])
        .arg(&corpus)
        .arg("--output")
        .arg(&out)
        .args(["--max-steps", "1", "--batch-size", "1", "--grad-accum", "1"])
        .assert()
        .success();

    loam()
        .args(["merge", "--model"])
        .arg(&out)
        .arg("--output")
        .arg(temp.path().join("merged"))
        .assert()
        .success()
        .stdout(predicate::str::contains("Merge complete"));

    assert!(temp.path().join("merged").join("model.json").exists());
}
