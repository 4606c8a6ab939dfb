//! Fine-tuning command implementation.

use anyhow::Result;
use colored::Colorize;
use loam_core::FineTuneJobRunner;
use loam_tuning::{DatasetSource, JobConfig, StdoutProgressSink, Trainer};
use std::path::PathBuf;

pub struct TrainOpts {
    pub data: PathBuf,
    pub output: PathBuf,
    pub base_model: String,
    pub max_steps: Option<u64>,
    pub batch_size: Option<u32>,
    pub grad_accum: Option<u32>,
    pub learning_rate: Option<f64>,
    pub rank: Option<u32>,
    pub save_steps: Option<u64>,
    pub seed: Option<u64>,
    pub hub_repo: Option<String>,
    pub json: bool,
}

impl TrainOpts {
    fn into_config(self) -> (JobConfig, DatasetSource) {
        let mut config = JobConfig::new(self.base_model, self.output);
        if let Some(v) = self.max_steps {
            config.optim.max_steps = v;
        }
        if let Some(v) = self.batch_size {
            config.optim.batch_size = v;
        }
        if let Some(v) = self.grad_accum {
            config.optim.grad_accum_steps = v;
        }
        if let Some(v) = self.learning_rate {
            config.optim.learning_rate = v;
        }
        if let Some(v) = self.rank {
            config.adapter.rank = v;
        }
        if let Some(v) = self.save_steps {
            config.optim.save_steps = v;
        }
        if let Some(v) = self.seed {
            config.seed = v;
        }
        config.output.hub_repo = self.hub_repo;

        let source = DatasetSource::JsonArray { path: self.data };
        (config, source)
    }
}

pub async fn execute(opts: TrainOpts) -> Result<()> {
    let json_output = opts.json;
    let (config, source) = opts.into_config();

    let runner = FineTuneJobRunner::new();
    let dataset = runner.prepare(&config, &source).await?;
    let manifest = runner.run(&config, &dataset, &StdoutProgressSink).await?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&manifest)?);
        return Ok(());
    }

    println!();
    println!("{}", "Fine-tuning complete".bold().green());
    println!("  Job: {}", manifest.job_id.0.cyan());
    println!("  Base model: {}", manifest.base_model.cyan());
    if let Some(steps) = manifest.metrics.steps {
        println!("  Steps: {steps}");
    }
    if let Some(loss) = manifest.metrics.train_loss {
        println!("  Final loss: {loss:.4}");
    }
    println!(
        "  Use: {}",
        format!("loam test --model {} --prompt '...'", config.output.dir.display()).dimmed()
    );
    println!();
    Ok(())
}
