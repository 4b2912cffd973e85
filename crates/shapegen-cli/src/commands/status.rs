//! shapegen status command - probe the compute device.

use anyhow::Result;
use colored::Colorize;
use serde::Serialize;
use shapegen::{DeviceContext, DeviceKind, DevicePreference};

use crate::{Cli, OutputFormat, output};

#[derive(Serialize)]
struct StatusReport {
    requested: DevicePreference,
    device: String,
    kind: DeviceKind,
    accelerated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    backend: Option<String>,
    gpu_used_gb: f64,
    gpu_total_gb: f64,
}

pub fn run(preference: DevicePreference, cli: &Cli) -> Result<()> {
    let device = DeviceContext::probe(preference)?;
    let memory = device.memory_info();
    let report = StatusReport {
        requested: preference,
        device: device.name().to_string(),
        kind: device.kind(),
        accelerated: device.kind().is_accelerator(),
        backend: device.adapter_info().map(|info| info.backend.clone()),
        gpu_used_gb: memory.used_gb,
        gpu_total_gb: memory.total_gb,
    };

    match cli.format {
        OutputFormat::Json => output::print(&report, cli.format, cli.quiet),
        OutputFormat::Text => {
            if !cli.quiet {
                println!("{}", "Device Status".bold().underline());
                println!("  {}: {}", "Requested".cyan(), report.requested);
                println!("  {}: {} ({})", "Device".cyan(), report.device, report.kind);
                if let Some(backend) = &report.backend {
                    println!("  {}: {}", "Backend".cyan(), backend);
                }
                if report.accelerated {
                    println!(
                        "  {}: {} / {}",
                        "Memory".cyan(),
                        output::gb(report.gpu_used_gb),
                        output::gb(report.gpu_total_gb)
                    );
                } else {
                    println!("  {}: {}", "Memory".cyan(), "n/a (cpu)".dimmed());
                }
            }
        }
    }

    Ok(())
}
