//! Run command implementation.

use anyhow::{Context, Result};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::time::Duration;

use qpulse_adapter_sim::SimulatorBackend;
use qpulse_hal::Machine;

use super::common::{load_client_config, load_demo, load_hardware, print_results, results_json};

/// Execute the run command.
pub async fn execute(
    demo: &str,
    timeout: Option<f64>,
    values: usize,
    hardware: Option<&str>,
    format: &str,
) -> Result<()> {
    println!(
        "{} Running {} on {} ({} synthetic values per result)",
        style("→").cyan().bold(),
        style(demo).green(),
        style("simulator").yellow(),
        values
    );

    let program = load_demo(demo)?;
    println!(
        "  Built: {} statements, {} results",
        program.statements().len(),
        program.sinks().len()
    );

    let config = load_client_config()?;
    let timeout = timeout
        .map(Duration::from_secs_f64)
        .or_else(|| config.default_timeout());
    let sim = Arc::new(SimulatorBackend::new());
    let machine = Machine::new(sim.clone(), load_hardware(hardware)?).with_config(config);

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")
            .context("Invalid spinner template")?,
    );
    spinner.set_message("Executing program...");
    spinner.enable_steady_tick(Duration::from_millis(100));

    let job = machine.execute(&program).await?;
    if job.is_paused().await? {
        spinner.set_message(format!("Resuming paused job {}...", job.id()));
        job.resume().await?;
    }

    spinner.set_message(format!("Waiting for job {}...", job.id()));
    sim.fill_synthetic(job.id(), values)?;
    sim.finish(job.id())?;

    let results = job.result_handles().await?;
    let done = results.wait_for_all_values(timeout).await?;
    spinner.finish_and_clear();

    if !done {
        eprintln!(
            "{} Job {} closed before all results were done",
            style("!").yellow().bold(),
            job.id()
        );
    }

    match format {
        "json" => {
            let json = serde_json::to_string_pretty(&results_json(results).await?)
                .context("JSON serialization failed")?;
            println!("{json}");
        }
        _ => print_results(results).await?,
    }

    Ok(())
}
