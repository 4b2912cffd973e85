//! shapegen stats command - mesh size and topology.

use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;
use serde::Serialize;
use shapegen_mesh::{MeshStats, load_mesh, mesh_stats};

use crate::{Cli, OutputFormat, output};

#[derive(Serialize)]
struct StatsReport {
    path: String,
    #[serde(flatten)]
    stats: MeshStats,
    extents: [f64; 3],
}

pub fn run(input: &Path, cli: &Cli) -> Result<()> {
    let mesh = load_mesh(input).with_context(|| format!("Failed to load mesh from {:?}", input))?;
    let stats = mesh_stats(&mesh);
    let report = StatsReport {
        path: input.display().to_string(),
        extents: stats.extents(),
        stats,
    };

    match cli.format {
        OutputFormat::Json => output::print(&report, cli.format, cli.quiet),
        OutputFormat::Text => {
            if !cli.quiet {
                println!("{}", "Mesh Statistics".bold().underline());
                println!("  {}: {}", "File".cyan(), report.path);
                println!("  {}: {}", "Vertices".cyan(), report.stats.vertices);
                println!("  {}: {}", "Faces".cyan(), report.stats.faces);
                println!("  {}: {}", "Edges".cyan(), report.stats.edges);
                println!("  {}: {}", "Euler number".cyan(), report.stats.euler_number);
                let [x, y, z] = report.extents;
                println!("  {}: {:.3} x {:.3} x {:.3}", "Extents".cyan(), x, y, z);
                println!(
                    "  {}: {}",
                    "Watertight".cyan(),
                    yes_no(report.stats.is_watertight)
                );
                println!(
                    "  {}: {}",
                    "Consistent winding".cyan(),
                    yes_no(report.stats.is_winding_consistent)
                );
            }
        }
    }

    Ok(())
}

pub(crate) fn yes_no(value: bool) -> colored::ColoredString {
    if value { "yes".green() } else { "no".yellow() }
}
