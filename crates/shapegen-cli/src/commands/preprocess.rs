//! shapegen preprocess command - single-image preparation.

use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;
use serde::Serialize;
use shapegen::{GenerationConfig, ImageEnhancer, ImageSource, Preprocessor};

use crate::{Cli, OutputFormat, output};

pub struct Options {
    pub remove_background: bool,
    pub brightness: f32,
    pub contrast: f32,
    pub sharpness: f32,
    pub denoise: bool,
    pub exposure: bool,
}

impl Options {
    fn generation_config(&self) -> Result<GenerationConfig> {
        let enhancer = ImageEnhancer {
            brightness: self.brightness,
            contrast: self.contrast,
            sharpness: self.sharpness,
            denoise: self.denoise,
        };
        let mut config = GenerationConfig {
            remove_background: self.remove_background,
            enhance: (!enhancer.is_identity()).then_some(enhancer),
            ..Default::default()
        };
        config.lighting.single_image_exposure = self.exposure;
        config.validate()?;
        Ok(config)
    }
}

#[derive(Serialize)]
struct PreprocessResult {
    input: String,
    output: String,
    width: u32,
    height: u32,
    enhanced: bool,
    segmented: bool,
    /// Fraction of pixels kept by the mask.
    #[serde(skip_serializing_if = "Option::is_none")]
    foreground: Option<f64>,
}

pub fn run(input: &Path, output_path: &Path, options: &Options, cli: &Cli) -> Result<()> {
    let config = options.generation_config()?;
    let prepared = Preprocessor::default().prepare_image(&ImageSource::from(input), &config)?;
    prepared
        .image
        .save(output_path)
        .with_context(|| format!("Failed to write {:?}", output_path))?;

    let foreground = prepared.mask.as_ref().map(|mask| {
        let kept = mask.pixels().filter(|p| p.0[0] > 0).count();
        kept as f64 / (mask.width() as f64 * mask.height() as f64).max(1.0)
    });
    let result = PreprocessResult {
        input: input.display().to_string(),
        output: output_path.display().to_string(),
        width: prepared.image.width(),
        height: prepared.image.height(),
        enhanced: config.enhance.is_some(),
        segmented: prepared.mask.is_some(),
        foreground,
    };

    match cli.format {
        OutputFormat::Json => output::print(&result, cli.format, cli.quiet),
        OutputFormat::Text => {
            if !cli.quiet {
                println!(
                    "{} {} -> {} ({}x{})",
                    "Prepared".green().bold(),
                    result.input,
                    result.output,
                    result.width,
                    result.height
                );
                if let Some(fraction) = result.foreground {
                    println!("  {}: {:.1}%", "Foreground".cyan(), fraction * 100.0);
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_enhancer_is_dropped() {
        let opts = Options {
            remove_background: false,
            brightness: 1.0,
            contrast: 1.0,
            sharpness: 1.0,
            denoise: false,
            exposure: true,
        };
        let config = opts.generation_config().unwrap();
        assert!(config.enhance.is_none());
        assert!(config.lighting.single_image_exposure);

        let opts = Options {
            brightness: 1.2,
            ..opts
        };
        assert!(opts.generation_config().unwrap().enhance.is_some());
    }
}
