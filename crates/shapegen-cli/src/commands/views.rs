//! shapegen views command - validate a multi-view input set.

use std::path::PathBuf;

use anyhow::{Result, anyhow};
use colored::Colorize;
use serde::Serialize;
use shapegen::{ImageSource, ViewName, ViewSet};

use crate::{Cli, OutputFormat, output};

#[derive(Serialize)]
struct ViewInfo {
    name: ViewName,
    path: String,
    width: u32,
    height: u32,
}

#[derive(Serialize)]
struct ViewsReport {
    valid: bool,
    views: Vec<ViewInfo>,
    missing: Vec<ViewName>,
}

/// Split `NAME=PATH` pairs without interpreting the name.
fn split_pairs(raw: &[String]) -> Result<Vec<(String, ImageSource)>> {
    raw.iter()
        .map(|pair| {
            let (name, path) = pair
                .split_once('=')
                .ok_or_else(|| anyhow!("expected NAME=PATH, got '{}'", pair))?;
            Ok((name.trim().to_string(), ImageSource::Path(PathBuf::from(path))))
        })
        .collect()
}

pub fn run(raw: &[String], cli: &Cli) -> Result<()> {
    let set = ViewSet::from_named(split_pairs(raw)?)?;
    set.require_front()?;

    let mut views = Vec::with_capacity(set.len());
    for (name, source) in set.iter() {
        let image = source.load_rgba()?;
        let path = match source {
            ImageSource::Path(path) => path.display().to_string(),
            ImageSource::Decoded(_) => String::from("<decoded>"),
        };
        views.push(ViewInfo {
            name,
            path,
            width: image.width(),
            height: image.height(),
        });
    }
    let present = set.available_views();
    let report = ViewsReport {
        valid: true,
        missing: ViewName::ALL
            .into_iter()
            .filter(|v| !present.contains(v))
            .collect(),
        views,
    };

    match cli.format {
        OutputFormat::Json => output::print(&report, cli.format, cli.quiet),
        OutputFormat::Text => {
            if !cli.quiet {
                println!(
                    "{} {} view(s)",
                    "Valid view set:".green().bold(),
                    report.views.len()
                );
                for view in &report.views {
                    println!(
                        "  {}: {} ({}x{})",
                        view.name.as_str().cyan(),
                        view.path,
                        view.width,
                        view.height
                    );
                }
                if !report.missing.is_empty() {
                    let missing: Vec<&str> = report.missing.iter().map(|v| v.as_str()).collect();
                    println!("  {}: {}", "Not provided".dimmed(), missing.join(", "));
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
    fn test_split_pairs_keeps_raw_names() {
        let pairs = split_pairs(&["top=/tmp/a.png".to_string()]).unwrap();
        assert_eq!(pairs[0].0, "top");
        assert!(split_pairs(&["front".to_string()]).is_err());
    }
}
