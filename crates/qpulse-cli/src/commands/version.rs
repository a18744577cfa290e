//! Version command implementation.

use console::style;

/// Execute the version command.
pub fn execute() {
    let version = env!("CARGO_PKG_VERSION");

    println!(
        "{} {} - pulse-sequencing programs and results",
        style("QPulse").cyan().bold(),
        style(format!("v{version}")).yellow()
    );
    println!();
    println!("Components:");
    println!("  qpulse-ir           Program builder and intermediate representation");
    println!("  qpulse-hal          Execution backends and results client");
    println!("  qpulse-adapter-sim  Scripted in-memory backend");
    println!("  qpulse-cli          Command-line interface");
    println!();
    println!("License:    {}", style("Apache-2.0").dim());
}
