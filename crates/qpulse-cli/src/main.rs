//! QPulse Command-Line Interface
//!
//! The main entry point for the `qpulse` tool: build demo programs, print
//! their serialized form, and run them against the scripted simulator.

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use clap::{Parser, Subcommand};
use console::style;
use tracing_subscriber::EnvFilter;

mod commands;
mod demos;

use commands::{build, demos as demo_list, run, version};

/// QPulse - pulse-sequencing programs and their results
#[derive(Parser)]
#[command(name = "qpulse")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a demo program and print its serialized form
    Build {
        /// Demo name (see `qpulse demos`)
        #[arg(short, long)]
        demo: String,

        /// Output format (json, yaml)
        #[arg(short, long, default_value = "json")]
        format: String,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Run a demo program on the simulator and print its results
    Run {
        /// Demo name (see `qpulse demos`)
        #[arg(short, long)]
        demo: String,

        /// Timeout in seconds for all results to be done
        #[arg(short, long)]
        timeout: Option<f64>,

        /// Synthetic values pushed into each result
        #[arg(long, default_value = "100")]
        values: usize,

        /// Hardware configuration file (YAML or JSON)
        #[arg(long)]
        hardware: Option<String>,

        /// Output format (table, json)
        #[arg(short, long, default_value = "table")]
        format: String,
    },

    /// List available demo programs
    Demos,

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .init();

    // Execute command
    let result = match cli.command {
        Commands::Build {
            demo,
            format,
            output,
        } => build::execute(&demo, &format, output.as_deref()),

        Commands::Run {
            demo,
            timeout,
            values,
            hardware,
            format,
        } => run::execute(&demo, timeout, values, hardware.as_deref(), &format).await,

        Commands::Demos => demo_list::execute(),

        Commands::Version => {
            version::execute();
            Ok(())
        }
    };

    // Handle errors
    if let Err(e) = result {
        eprintln!("{} {:#}", style("Error:").red().bold(), e);
        std::process::exit(1);
    }

    Ok(())
}
