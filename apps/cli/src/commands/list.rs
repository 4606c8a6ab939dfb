//! List trained adapters discovered under a root directory.

use anyhow::Result;
use colored::Colorize;
use loam_tuning::discover_trained_adapters;
use serde_json::json;
use std::path::Path;

pub fn execute(root: &Path, json_output: bool) -> Result<()> {
    let adapters = discover_trained_adapters(root)?;

    if json_output {
        let out: Vec<_> = adapters
            .iter()
            .map(|a| {
                json!({
                    "dir": a.adapter_dir,
                    "base_model": a.base_model,
                    "job_id": a.manifest.job_id.0,
                    "created_at": a.manifest.created_at,
                    "steps": a.manifest.metrics.steps,
                    "train_loss": a.manifest.metrics.train_loss,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!();
    println!("{}", format!("Trained Adapters ({})", adapters.len()).bold().cyan());
    println!();

    if adapters.is_empty() {
        println!("  {}", "No trained adapters found under this directory.".dimmed());
        println!();
        println!(
            "  {}",
            "Tip: run `loam train --data corpus.json --output <dir>` to produce one.".dimmed()
        );
        return Ok(());
    }

    println!("{:<40} {:<24} {}", "Directory", "Base model", "Steps");
    println!("{}", "─".repeat(80));
    for a in adapters {
        println!(
            "{:<40} {:<24} {}",
            a.adapter_dir.display().to_string().cyan(),
            a.base_model.dimmed(),
            a.manifest.metrics.steps.map_or("-".to_string(), |s| s.to_string()),
        );
    }
    println!();
    Ok(())
}
