#![forbid(unsafe_code)]

//! Regenerates `index.html` from the summaries folder and the viewer
//! template.

use std::{path::PathBuf, process::ExitCode};

use anyhow::Result;
use clap::Parser;
use transcript_viewer::{
    config::{RuntimeOverrides, resolve_runtime_config},
    library::Library,
    viewer::build_viewer,
};

#[derive(Debug, Parser)]
#[command(name = "build_viewer", about = "Build the static transcript summary viewer")]
struct BuildArgs {
    /// Library root holding summaries/ and viewer/template.html.
    #[arg(long)]
    root: Option<PathBuf>,
    /// Dotenv file consulted for TRANSCRIPTS_ROOT.
    #[arg(long)]
    env_file: Option<PathBuf>,
}

impl BuildArgs {
    fn library(self) -> Result<Library> {
        let runtime = resolve_runtime_config(RuntimeOverrides {
            root: self.root,
            env_path: self.env_file,
            ..RuntimeOverrides::default()
        })?;
        Ok(Library::new(runtime.root))
    }
}

fn main() -> Result<ExitCode> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let library = BuildArgs::parse().library()?;
    let paths = library.viewer_paths();

    println!("Building transcript viewer...");
    println!("  Summaries: {}", paths.summaries.display());
    println!("  Template:  {}", paths.template.display());
    println!("  Output:    {}", paths.output.display());

    match build_viewer(&paths) {
        Ok(report) => {
            println!();
            println!(
                "Parsed {} of {} summary files.",
                report.embedded, report.scanned
            );
            println!("Viewer built: {}", report.output.display());
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            eprintln!("Error: {err:#}");
            Ok(ExitCode::FAILURE)
        }
    }
}
