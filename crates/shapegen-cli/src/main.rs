//! shapegen: command-line front end for the image and mesh stages.
//!
//! Everything here runs without the generative models: mesh repair and
//! export, view preprocessing and lighting normalization, and device probing.
//!
//! # Logging
//!
//! Set the `RUST_LOG` environment variable to control log output:
//! - `RUST_LOG=shapegen=info` - Request and model lifecycle logging
//! - `RUST_LOG=shapegen_mesh=debug` - Per-step mesh repair detail
//! - `RUST_LOG=shapegen_mesh::timing=debug` - Stage timing
//!
//! # Example
//!
//! ```bash
//! shapegen optimize raw.obj -o clean.glb --max-faces 20000 --fill-holes
//! shapegen normalize --view front=f.png --view left=l.png -o normalized/
//! shapegen views --view front=f.png --view left=l.png
//! shapegen --format json status --device cpu
//! ```

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use miette::Diagnostic;
use shapegen::{DevicePreference, LightingMethod, ShapeError, ViewName};
use shapegen_mesh::{ExportFormat, MeshError};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod commands;
mod output;

use commands::{convert, normalize, optimize, preprocess, stats, status, views};

/// shapegen - image-to-mesh preprocessing and mesh repair tools.
#[derive(Parser)]
#[command(name = "shapegen")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format for results
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Suppress all non-error output
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Increase output verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(long, short, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for scripting
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Show mesh statistics
    Stats {
        /// Input mesh file
        input: PathBuf,
    },

    /// Run the basic and advanced repair stages on a mesh
    Optimize {
        /// Input mesh file
        input: PathBuf,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,

        /// Generation config (TOML); flags below override it
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output format (default: from the output extension)
        #[arg(long)]
        to: Option<ExportFormat>,

        /// Face budget for decimation
        #[arg(long)]
        max_faces: Option<usize>,

        /// Skip cleanup, floater removal and decimation
        #[arg(long)]
        no_basic: bool,

        /// Fill boundary loops
        #[arg(long)]
        fill_holes: bool,

        /// Largest hole to fill, in boundary edges
        #[arg(long)]
        max_hole_size: Option<usize>,

        /// Make the mesh watertight
        #[arg(long)]
        watertight: bool,

        /// Smooth the surface
        #[arg(long)]
        smooth: bool,

        /// Smoothing iterations
        #[arg(long)]
        smooth_iterations: Option<usize>,

        /// Recompute normals and orient faces
        #[arg(long)]
        normals: bool,
    },

    /// Convert a mesh between formats
    Convert {
        /// Input mesh file
        input: PathBuf,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,

        /// Output format (default: from the output extension)
        #[arg(long)]
        to: Option<ExportFormat>,
    },

    /// Prepare a single image: enhance, remove background, correct exposure
    Preprocess {
        /// Input image
        input: PathBuf,

        /// Output PNG
        #[arg(short, long)]
        output: PathBuf,

        /// Keep the background instead of masking it out
        #[arg(long)]
        keep_background: bool,

        /// Brightness factor (1.0 = unchanged)
        #[arg(long, default_value = "1.0")]
        brightness: f32,

        /// Contrast factor (1.0 = unchanged)
        #[arg(long, default_value = "1.0")]
        contrast: f32,

        /// Sharpness factor (1.0 = unchanged)
        #[arg(long, default_value = "1.0")]
        sharpness: f32,

        /// Apply a 3x3 median filter
        #[arg(long)]
        denoise: bool,

        /// Apply adaptive exposure correction
        #[arg(long)]
        exposure: bool,
    },

    /// Normalize lighting across a set of views
    Normalize {
        /// View image as NAME=PATH (front, left, back, right)
        #[arg(long = "view", value_parser = parse_view, required = true)]
        views: Vec<(ViewName, PathBuf)>,

        /// Output directory; views are written as NAME.png
        #[arg(short, long)]
        output: PathBuf,

        /// histogram_matching, color_transfer or auto_exposure
        #[arg(long, default_value = "histogram_matching")]
        method: LightingMethod,

        /// View the others are matched to
        #[arg(long, default_value = "front")]
        reference: ViewName,

        /// Correction strength, 0.0 to 1.0
        #[arg(long, default_value = "1.0")]
        strength: f32,
    },

    /// Check a multi-view input set: known names, front present, images readable
    Views {
        /// View image as NAME=PATH
        #[arg(long = "view", required = true)]
        views: Vec<String>,
    },

    /// Probe the compute device and report memory
    Status {
        /// auto, gpu, metal or cpu
        #[arg(long, default_value = "auto")]
        device: DevicePreference,
    },
}

fn parse_view(s: &str) -> std::result::Result<(ViewName, PathBuf), String> {
    let (name, path) = s
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=PATH, got '{}'", s))?;
    let name = name.trim().parse::<ViewName>().map_err(|e| e.to_string())?;
    Ok((name, PathBuf::from(path)))
}

/// Initialize the tracing subscriber based on verbosity level.
fn init_tracing(verbose: u8, quiet: bool) {
    if quiet {
        return;
    }

    // RUST_LOG wins over -v flags
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match verbose {
            0 => "warn",
            1 => "shapegen=info,shapegen_mesh=info,shapegen_gpu=info",
            2 => "shapegen=debug,shapegen_mesh=debug,shapegen_gpu=debug",
            _ => "trace",
        };
        EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .with(filter)
        .init();
}

fn report(e: &anyhow::Error) {
    let (code, help) = if let Some(err) = e.downcast_ref::<ShapeError>() {
        (Some(err.code().to_string()), err.help().map(|h| h.to_string()))
    } else if let Some(err) = e.downcast_ref::<MeshError>() {
        (
            Some(err.code().to_string()),
            Some(err.recovery_suggestion().to_string()),
        )
    } else {
        (None, None)
    };

    eprintln!("{}: {}", "Error".red().bold(), e);
    for cause in e.chain().skip(1) {
        eprintln!("  {}: {}", "Caused by".yellow(), cause);
    }
    if let Some(code) = code {
        eprintln!("  {}: {}", "Code".cyan(), code);
    }
    if let Some(help) = help {
        eprintln!("  {}: {}", "Suggestion".green(), help);
    }
}

fn main() -> Result<()> {
    #[cfg(debug_assertions)]
    miette::set_panic_hook();

    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    let result = match &cli.command {
        Commands::Stats { input } => stats::run(input, &cli),
        Commands::Optimize {
            input,
            output,
            config,
            to,
            max_faces,
            no_basic,
            fill_holes,
            max_hole_size,
            watertight,
            smooth,
            smooth_iterations,
            normals,
        } => optimize::run(
            input,
            output,
            &optimize::Options {
                config: config.clone(),
                to: *to,
                max_faces: *max_faces,
                no_basic: *no_basic,
                fill_holes: *fill_holes,
                max_hole_size: *max_hole_size,
                watertight: *watertight,
                smooth: *smooth,
                smooth_iterations: *smooth_iterations,
                normals: *normals,
            },
            &cli,
        ),
        Commands::Convert { input, output, to } => convert::run(input, output, *to, &cli),
        Commands::Preprocess {
            input,
            output,
            keep_background,
            brightness,
            contrast,
            sharpness,
            denoise,
            exposure,
        } => preprocess::run(
            input,
            output,
            &preprocess::Options {
                remove_background: !keep_background,
                brightness: *brightness,
                contrast: *contrast,
                sharpness: *sharpness,
                denoise: *denoise,
                exposure: *exposure,
            },
            &cli,
        ),
        Commands::Normalize {
            views,
            output,
            method,
            reference,
            strength,
        } => normalize::run(views, output, *method, *reference, *strength, &cli),
        Commands::Views { views: pairs } => views::run(pairs, &cli),
        Commands::Status { device } => status::run(*device, &cli),
    };

    if let Err(e) = &result {
        if !cli.quiet {
            report(e);
        }
        std::process::exit(1);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_view() {
        let (name, path) = parse_view("left=/tmp/l.png").unwrap();
        assert_eq!(name, ViewName::Left);
        assert_eq!(path, PathBuf::from("/tmp/l.png"));
        assert!(parse_view("top=/tmp/t.png").is_err());
        assert!(parse_view("front").is_err());
    }
}
