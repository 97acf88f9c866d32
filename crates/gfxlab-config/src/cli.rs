//! Command-line interface of the `gfxlab` binary.

use std::path::PathBuf;

use clap::Parser;

use crate::Config;

/// `gfxlab [OPTIONS]`
///
/// Options that mirror a `config.ron` field win over the file. `--headless`
/// and `--frames` only affect this run and are never persisted.
#[derive(Parser, Debug)]
#[command(name = "gfxlab", about = "Multi-pass OpenGL scene renderer")]
pub struct CliArgs {
    /// Pipeline description file (RON).
    #[arg(value_name = "PIPELINE")]
    pub pipeline: Option<PathBuf>,

    /// Window width in pixels.
    #[arg(long)]
    pub width: Option<u32>,

    /// Window height in pixels.
    #[arg(long)]
    pub height: Option<u32>,

    /// State-callback library to bind (`lighting`, `nolight`).
    #[arg(long)]
    pub callbacks: Option<String>,

    /// Log filter level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Directory holding `config.ron`.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Assemble the pipeline without a window and record GPU calls instead.
    #[arg(long)]
    pub headless: bool,

    /// Frames drawn by a headless run.
    #[arg(long, default_value_t = 3)]
    pub frames: u32,
}

impl Config {
    /// Overwrite fields named on the command line.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(pipeline) = &args.pipeline {
            self.render.pipeline = Some(pipeline.clone());
        }
        if let Some(width) = args.width {
            self.window.width = width;
        }
        if let Some(height) = args.height {
            self.window.height = height;
        }
        if let Some(library) = &args.callbacks {
            self.callbacks.library = Some(library.clone());
        }
        if let Some(level) = &args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}
