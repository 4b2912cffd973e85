//! Shared result printing.

use colored::Colorize;
use serde::Serialize;
use shapegen_mesh::RepairWarning;

use crate::OutputFormat;

/// Print `value` as pretty JSON. Text output is left to each command.
pub fn print<T: Serialize>(value: &T, format: OutputFormat, quiet: bool) {
    if quiet {
        return;
    }
    if let OutputFormat::Json = format {
        match serde_json::to_string_pretty(value) {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("{}: failed to serialize output: {}", "Error".red().bold(), e),
        }
    }
}

/// Skipped repair steps, one per line.
pub fn print_warnings(warnings: &[RepairWarning], quiet: bool) {
    if quiet || warnings.is_empty() {
        return;
    }
    println!("  {}:", "Skipped steps".yellow());
    for warning in warnings {
        println!("    {} {}", "!".yellow(), warning);
    }
}

/// Fixed-precision float for text output.
pub fn gb(value: f64) -> String {
    format!("{:.2} GB", value)
}
