//! Shared helpers for CLI commands.

use anyhow::{Context, Result};
use console::style;

use qpulse_hal::{ClientConfig, FetchedResult, HardwareConfig, JobResults, ResultValue};
use qpulse_ir::Program;

use crate::demos;

/// Values printed per result before eliding the rest.
const PREVIEW_LEN: usize = 8;

/// Build a demo program by name.
pub fn load_demo(name: &str) -> Result<Program> {
    let demo = demos::find(name).ok_or_else(|| {
        anyhow::anyhow!(
            "Unknown demo: '{name}'. Available: {}",
            demos::names().join(", ")
        )
    })?;
    demo.build()
        .with_context(|| format!("Failed to build demo '{name}'"))
}

/// Client configuration from `$QPULSE_CONFIG` or `~/.qpulse/config.yaml`.
pub fn load_client_config() -> Result<ClientConfig> {
    ClientConfig::load_default().context("Failed to load client configuration")
}

/// Hardware configuration from a YAML or JSON file, empty when omitted.
pub fn load_hardware(path: Option<&str>) -> Result<HardwareConfig> {
    match path {
        Some(path) => HardwareConfig::load(path)
            .with_context(|| format!("Failed to load hardware configuration: {path}")),
        None => Ok(HardwareConfig::empty()),
    }
}

/// Print every fetched result in schema order.
pub async fn print_results(results: &JobResults) -> Result<()> {
    println!(
        "\n{} Results ({}):",
        style("✓").green().bold(),
        results.len()
    );

    for (name, handle) in results.iter() {
        let fetched = handle
            .fetch_all()
            .await
            .with_context(|| format!("Failed to fetch result '{name}'"))?;
        let header = handle.header().await?;
        let kind = if handle.is_single() { "single" } else { "all" };

        println!(
            "  {} {} [{}, {}] {} item(s){}",
            style("●").cyan(),
            style(name).bold(),
            kind,
            style(handle.dtype()).dim(),
            header.count_so_far,
            if header.has_dataloss {
                style(" (data loss)").red().to_string()
            } else {
                String::new()
            }
        );
        println!("    {}", preview(&fetched));
        if let Some(mean) = mean(&fetched) {
            println!("    mean: {mean:.4}");
        }
    }

    Ok(())
}

/// Results as a JSON object keyed by result name.
pub async fn results_json(results: &JobResults) -> Result<serde_json::Value> {
    let mut out = serde_json::Map::new();
    for (name, handle) in results.iter() {
        let fetched = handle.fetch_all().await?;
        out.insert(name.to_string(), serde_json::to_value(&fetched)?);
    }
    Ok(serde_json::Value::Object(out))
}

fn preview(fetched: &FetchedResult) -> String {
    match fetched {
        FetchedResult::Single(None) => "-".to_string(),
        FetchedResult::Single(Some(value)) => value.to_string(),
        FetchedResult::Values(values) => {
            let mut shown: Vec<String> = values
                .iter()
                .take(PREVIEW_LEN)
                .map(ToString::to_string)
                .collect();
            if values.len() > PREVIEW_LEN {
                shown.push(format!("... {} more", values.len() - PREVIEW_LEN));
            }
            format!("[{}]", shown.join(", "))
        }
    }
}

/// Mean of scalar values, if every value is scalar.
fn mean(fetched: &FetchedResult) -> Option<f64> {
    let FetchedResult::Values(values) = fetched else {
        return None;
    };
    if values.is_empty() {
        return None;
    }
    let sum = values
        .iter()
        .map(ResultValue::as_f64)
        .sum::<Option<f64>>()?;
    Some(sum / values.len() as f64)
}
