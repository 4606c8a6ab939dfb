//! Loam CLI - drive LoRA fine-tuning jobs and smoke-test the results.
//!
//! `loam train` runs a fine-tuning job against a local corpus, `loam test`
//! reloads a saved adapter and generates text, `loam merge` folds an adapter
//! into its base weights, and `loam list` shows trained adapters.

mod commands;

use clap::{Parser, Subcommand};
use colored::Colorize;
use loam_tuning::TuneError;
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Loam - configuration-driven LoRA fine-tuning for a local language model.
#[derive(Parser, Debug)]
#[command(
    name = "loam",
    author,
    version,
    about = "Loam - LoRA fine-tuning job runner",
    long_about = "Loam fine-tunes a local causal language model with a low-rank adapter.\nJobs are declared up front, run to completion or failure, and persist\nreloadable adapter artifacts."
)]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "warn", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a fine-tuning job
    ///
    /// Reads a JSON array of {"text": ...} examples, attaches a LoRA adapter
    /// to the base model, trains for a bounded number of steps, and writes
    /// checkpoints plus the final adapter to the output directory.
    Train {
        /// Path to the training corpus (JSON array of {"text": ...})
        #[arg(long)]
        data: PathBuf,

        /// Output directory for checkpoints and the final adapter
        #[arg(long)]
        output: PathBuf,

        /// Base model id
        #[arg(long, default_value = "loam/charlm-tiny")]
        base_model: String,

        /// Optimizer steps to run
        #[arg(long)]
        max_steps: Option<u64>,

        /// Per-device batch size
        #[arg(long)]
        batch_size: Option<u32>,

        /// Gradient accumulation steps
        #[arg(long)]
        grad_accum: Option<u32>,

        /// Learning rate
        #[arg(long)]
        learning_rate: Option<f64>,

        /// LoRA rank
        #[arg(long)]
        rank: Option<u32>,

        /// Checkpoint every N steps
        #[arg(long)]
        save_steps: Option<u64>,

        /// Random seed (shuffling, adapter init, dropout)
        #[arg(long)]
        seed: Option<u64>,

        /// Export the final adapter to the local hub staging area as this repo id
        #[arg(long)]
        hub_repo: Option<String>,

        /// Output the training manifest as JSON
        #[arg(long)]
        json: bool,
    },

    /// Reload a saved adapter and generate text (smoke test)
    Test {
        /// Saved adapter directory (output dir or any checkpoint)
        #[arg(long)]
        model: PathBuf,

        /// Prompt to generate from
        #[arg(long)]
        prompt: String,

        /// Maximum new tokens to generate
        #[arg(long, default_value_t = 100)]
        max_new_tokens: usize,

        /// Sampling temperature; 0 means greedy
        #[arg(long, default_value_t = 0.7)]
        temperature: f32,
    },

    /// Fold an adapter into its base model (offline post-processing)
    Merge {
        /// Saved adapter directory
        #[arg(long)]
        model: PathBuf,

        /// Output directory for the merged model (default: <model>-merged)
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// List trained adapters under a directory
    List {
        /// Directory whose children are scanned for training manifests
        #[arg(long, default_value = ".")]
        root: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let level = match args.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::WARN,
    };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("warning: failed to initialize logging");
    }

    let result = match args.command {
        Command::Train {
            data,
            output,
            base_model,
            max_steps,
            batch_size,
            grad_accum,
            learning_rate,
            rank,
            save_steps,
            seed,
            hub_repo,
            json,
        } => {
            commands::train::execute(commands::train::TrainOpts {
                data,
                output,
                base_model,
                max_steps,
                batch_size,
                grad_accum,
                learning_rate,
                rank,
                save_steps,
                seed,
                hub_repo,
                json,
            })
            .await
        }
        Command::Test { model, prompt, max_new_tokens, temperature } => {
            commands::test::execute(&model, &prompt, max_new_tokens, temperature)
        }
        Command::Merge { model, output } => commands::merge::execute(&model, output),
        Command::List { root, json } => commands::list::execute(&root, json),
    };

    if let Err(err) = result {
        eprintln!("{} {err:#}", "error:".red().bold());
        if let Some(tune) = err.downcast_ref::<TuneError>() {
            if let Some(hint) = tune.remediation() {
                eprintln!("{} {hint}", "hint:".yellow().bold());
            }
        }
        std::process::exit(1);
    }
}
