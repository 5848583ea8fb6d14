#![forbid(unsafe_code)]

//! Static viewer generation: every summary is embedded as a JSON array into
//! the HTML template.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, bail};
use walkdir::WalkDir;

use crate::summary::{Summary, parse_summary_file};

/// Literal token in the template replaced by the summaries array.
pub const DATA_PLACEHOLDER: &str = "/*SUMMARIES_DATA*/[]";

#[derive(Debug, Clone)]
pub struct ViewerPaths {
    pub summaries: PathBuf,
    pub template: PathBuf,
    pub output: PathBuf,
}

#[derive(Debug, Clone)]
pub struct BuildReport {
    pub scanned: usize,
    pub embedded: usize,
    pub output: PathBuf,
}

/// Regenerates the viewer page. Nothing is written when the summaries
/// directory or the template is missing.
pub fn build_viewer(paths: &ViewerPaths) -> Result<BuildReport> {
    if !paths.summaries.is_dir() {
        bail!(
            "summaries directory not found: {}",
            paths.summaries.display()
        );
    }
    if !paths.template.is_file() {
        bail!("template file not found: {}", paths.template.display());
    }

    let files = summary_files(&paths.summaries);
    let summaries: Vec<Summary> = files
        .iter()
        .filter_map(|path| {
            log::debug!("parsing {}", path.display());
            parse_summary_file(path)
        })
        .collect();

    let template = fs::read_to_string(&paths.template)
        .with_context(|| format!("reading {}", paths.template.display()))?;
    let html = render(&template, &summaries)?;
    fs::write(&paths.output, html)
        .with_context(|| format!("writing {}", paths.output.display()))?;

    log::info!(
        "embedded {} of {} summaries into {}",
        summaries.len(),
        files.len(),
        paths.output.display()
    );

    Ok(BuildReport {
        scanned: files.len(),
        embedded: summaries.len(),
        output: paths.output.clone(),
    })
}

/// `*.md` files directly inside `dir`, newest date prefix first.
fn summary_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| entry.path().extension().and_then(|ext| ext.to_str()) == Some("md"))
        .map(|entry| entry.into_path())
        .collect();
    files.reverse();
    files
}

fn render(template: &str, summaries: &[Summary]) -> Result<String> {
    // `</` would let a summary terminate the surrounding <script> element.
    let data = serde_json::to_string(summaries)
        .context("serializing summaries")?
        .replace("</", "<\\/");
    Ok(template.replace(DATA_PLACEHOLDER, &data))
}
