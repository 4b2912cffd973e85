//! shapegen convert command - re-encode a mesh.

use std::path::Path;

use anyhow::{Context, Result, anyhow};
use colored::Colorize;
use serde::Serialize;
use shapegen_mesh::{ExportFormat, load_mesh, save_mesh_as};

use crate::{Cli, OutputFormat, output};

#[derive(Serialize)]
struct ConvertResult {
    input: String,
    output: String,
    format: ExportFormat,
    vertices: usize,
    faces: usize,
}

/// Explicit format, else the output extension.
pub(crate) fn resolve_format(output: &Path, to: Option<ExportFormat>) -> Result<ExportFormat> {
    match to {
        Some(format) => Ok(format),
        None => ExportFormat::from_path(output).ok_or_else(|| {
            anyhow!(
                "Cannot tell the output format from {:?}; pass --to (one of {})",
                output,
                ExportFormat::ALL.map(|f| f.extension()).join(", ")
            )
        }),
    }
}

pub fn run(input: &Path, output_path: &Path, to: Option<ExportFormat>, cli: &Cli) -> Result<()> {
    let format = resolve_format(output_path, to)?;
    let mesh = load_mesh(input).with_context(|| format!("Failed to load mesh from {:?}", input))?;
    save_mesh_as(&mesh, output_path, format)
        .with_context(|| format!("Failed to write {:?}", output_path))?;

    let result = ConvertResult {
        input: input.display().to_string(),
        output: output_path.display().to_string(),
        format,
        vertices: mesh.vertex_count(),
        faces: mesh.face_count(),
    };

    match cli.format {
        OutputFormat::Json => output::print(&result, cli.format, cli.quiet),
        OutputFormat::Text => {
            if !cli.quiet {
                println!(
                    "{} {} -> {} ({}, {} faces)",
                    "Converted".green().bold(),
                    result.input,
                    result.output,
                    format.extension(),
                    result.faces
                );
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_extension_or_flag() {
        assert_eq!(
            resolve_format(Path::new("out.stl"), None).unwrap(),
            ExportFormat::Stl
        );
        assert_eq!(
            resolve_format(Path::new("out.bin"), Some(ExportFormat::Ply)).unwrap(),
            ExportFormat::Ply
        );
        assert!(resolve_format(Path::new("out.bin"), None).is_err());
    }
}
