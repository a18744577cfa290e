//! Build command implementation.

use anyhow::{Context, Result};
use console::style;
use std::fs;

use super::common::load_demo;

/// Execute the build command.
pub fn execute(demo: &str, format: &str, output: Option<&str>) -> Result<()> {
    let program = load_demo(demo)?;

    let text = match format {
        "json" => program.to_json_pretty()?,
        // Through a JSON value: YAML cannot tag an enum nested directly in another.
        "yaml" => serde_yaml_ng::to_string(&serde_json::to_value(&program)?)
            .context("YAML serialization failed")?,
        other => anyhow::bail!("Unknown format: '{other}'. Available: json, yaml"),
    };

    match output {
        Some(path) => {
            fs::write(path, &text).with_context(|| format!("Failed to write {path}"))?;
            eprintln!(
                "{} Wrote {} ({} statements, {} results) to {}",
                style("✓").green().bold(),
                style(demo).green(),
                program.statements().len(),
                program.sinks().len(),
                style(path).cyan()
            );
        }
        None => println!("{text}"),
    }

    Ok(())
}
