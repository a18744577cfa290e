//! Demos command implementation.

use anyhow::{Context, Result};
use console::style;

use crate::demos::DEMOS;

/// Execute the demos command.
pub fn execute() -> Result<()> {
    println!("{} Available demos:\n", style("QPulse").cyan().bold());

    for demo in DEMOS {
        let program = demo
            .build()
            .with_context(|| format!("Failed to build demo '{}'", demo.name))?;
        println!("  {} {}", style("●").green(), style(demo.name).bold());
        println!("    {}", demo.description);
        println!(
            "    Statements: {}, results: {}",
            program.statements().len(),
            program
                .sinks()
                .iter()
                .map(|s| s.tag.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
        println!();
    }

    Ok(())
}
