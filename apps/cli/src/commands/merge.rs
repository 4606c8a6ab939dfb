//! Offline adapter merge command.

use anyhow::Result;
use colored::Colorize;
use loam_core::merge_adapter;
use std::path::{Path, PathBuf};

pub fn execute(model_dir: &Path, output: Option<PathBuf>) -> Result<()> {
    let out_dir = output.unwrap_or_else(|| {
        let mut name = model_dir.as_os_str().to_os_string();
        name.push("-merged");
        PathBuf::from(name)
    });

    let config = merge_adapter(model_dir, &out_dir)?;

    println!();
    println!("{}", "Merge complete".bold().green());
    println!("  Base model: {}", config.base_model_name_or_path.cyan());
    println!("  Merged from rank: {}", config.merged_from_rank);
    println!("  Output: {}", out_dir.display().to_string().dimmed());
    println!();
    Ok(())
}
