//! shapegen optimize command - basic and advanced repair stages.

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use colored::Colorize;
use serde::Serialize;
use shapegen::{GenerationConfig, post_process};
use shapegen_mesh::{ExportFormat, RepairWarning, load_mesh, mesh_stats, save_mesh_as};

use super::convert::resolve_format;
use super::stats::yes_no;
use crate::{Cli, OutputFormat, output};

/// Command-line overrides on top of the config file.
pub struct Options {
    pub config: Option<PathBuf>,
    pub to: Option<ExportFormat>,
    pub max_faces: Option<usize>,
    pub no_basic: bool,
    pub fill_holes: bool,
    pub max_hole_size: Option<usize>,
    pub watertight: bool,
    pub smooth: bool,
    pub smooth_iterations: Option<usize>,
    pub normals: bool,
}

impl Options {
    fn generation_config(&self, format: ExportFormat) -> Result<GenerationConfig> {
        let mut config = match &self.config {
            Some(path) => GenerationConfig::from_toml_file(path)?,
            None => GenerationConfig::default(),
        };
        config.output_format = format;
        if let Some(max_faces) = self.max_faces {
            config.max_faces = max_faces;
        }
        if self.no_basic {
            config.optimize_mesh = false;
        }
        let repair = &mut config.repair;
        repair.fill_holes |= self.fill_holes;
        repair.make_watertight |= self.watertight;
        repair.smooth_surface |= self.smooth;
        repair.recalculate_normals |= self.normals;
        if let Some(size) = self.max_hole_size {
            repair.max_hole_size = size;
        }
        if let Some(iterations) = self.smooth_iterations {
            repair.smooth_iterations = iterations;
        }
        config.validate()?;
        Ok(config)
    }
}

#[derive(Serialize)]
struct OptimizeResult {
    input: String,
    output: String,
    format: ExportFormat,
    input_vertices: usize,
    input_faces: usize,
    output_vertices: usize,
    output_faces: usize,
    watertight: bool,
    elapsed_ms: u64,
    warnings: Vec<RepairWarning>,
}

pub fn run(input: &Path, output_path: &Path, options: &Options, cli: &Cli) -> Result<()> {
    let format = resolve_format(output_path, options.to)?;
    let config = options.generation_config(format)?;

    let mesh = load_mesh(input).with_context(|| format!("Failed to load mesh from {:?}", input))?;
    let input_vertices = mesh.vertex_count();
    let input_faces = mesh.face_count();

    let start = Instant::now();
    let outcome = post_process(mesh, &config);
    let elapsed_ms = start.elapsed().as_millis() as u64;

    save_mesh_as(&outcome.mesh, output_path, format)
        .with_context(|| format!("Failed to write {:?}", output_path))?;

    let result = OptimizeResult {
        input: input.display().to_string(),
        output: output_path.display().to_string(),
        format,
        input_vertices,
        input_faces,
        output_vertices: outcome.mesh.vertex_count(),
        output_faces: outcome.mesh.face_count(),
        watertight: mesh_stats(&outcome.mesh).is_watertight,
        elapsed_ms,
        warnings: outcome.warnings,
    };

    match cli.format {
        OutputFormat::Json => output::print(&result, cli.format, cli.quiet),
        OutputFormat::Text => {
            if !cli.quiet {
                let status = if result.warnings.is_empty() {
                    "Optimized".green().bold()
                } else {
                    "Optimized with warnings".yellow().bold()
                };
                println!("{} {} -> {}", status, result.input, result.output);
                println!(
                    "  {}: {} -> {}",
                    "Vertices".cyan(),
                    result.input_vertices,
                    result.output_vertices
                );
                println!(
                    "  {}: {} -> {}",
                    "Faces".cyan(),
                    result.input_faces,
                    result.output_faces
                );
                println!("  {}: {}", "Watertight".cyan(), yes_no(result.watertight));
                println!("  {}: {} ms", "Time".cyan(), result.elapsed_ms);
                output::print_warnings(&result.warnings, cli.quiet);
            }
        }
    }

    Ok(())
}
