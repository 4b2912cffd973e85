//! shapegen normalize command - match lighting across views.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use colored::Colorize;
use serde::Serialize;
use shapegen::views::load_rgba;
use shapegen::{LightingConfig, LightingMethod, LightingNormalizer, ViewName};

use crate::{Cli, OutputFormat, output};

#[derive(Serialize)]
struct NormalizeResult {
    method: LightingMethod,
    /// `None` when fewer than two views were given.
    reference: Option<ViewName>,
    outputs: BTreeMap<ViewName, String>,
}

pub fn run(
    views: &[(ViewName, PathBuf)],
    output_dir: &Path,
    method: LightingMethod,
    reference: ViewName,
    strength: f32,
    cli: &Cli,
) -> Result<()> {
    let lighting = LightingConfig {
        method,
        reference_view: reference,
        strength,
        ..Default::default()
    };
    lighting.validate()?;

    let mut images = BTreeMap::new();
    for (name, path) in views {
        images.insert(*name, load_rgba(path)?);
    }

    let used_reference = if images.len() > 1 {
        LightingNormalizer::from_config(&lighting).normalize_views(&mut images)
    } else {
        None
    };

    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create {:?}", output_dir))?;
    let mut outputs = BTreeMap::new();
    for (name, image) in &images {
        let path = output_dir.join(format!("{}.png", name));
        image
            .save(&path)
            .with_context(|| format!("Failed to write {:?}", path))?;
        outputs.insert(*name, path.display().to_string());
    }

    let result = NormalizeResult {
        method,
        reference: used_reference,
        outputs,
    };

    match cli.format {
        OutputFormat::Json => output::print(&result, cli.format, cli.quiet),
        OutputFormat::Text => {
            if !cli.quiet {
                match result.reference {
                    Some(reference) => println!(
                        "{} {} views to '{}' ({})",
                        "Normalized".green().bold(),
                        result.outputs.len(),
                        reference,
                        result.method
                    ),
                    None => println!(
                        "{} single view, nothing to match",
                        "Copied".yellow().bold()
                    ),
                }
                for (name, path) in &result.outputs {
                    println!("  {}: {}", name.as_str().cyan(), path);
                }
            }
        }
    }

    Ok(())
}
