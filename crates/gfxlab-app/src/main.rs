//! gfxlab command-line entry point.
//!
//! Loads the configuration and pipeline description, then either opens a
//! window and renders until it is closed, or with `--headless` assembles the
//! pipeline against the recording device and draws a few frames. The
//! headless run doubles as a validator for pipeline files.

mod scene;
mod setup;
mod window;

use std::error::Error;
use std::path::Path;
use std::process::ExitCode;

use clap::Parser;

use gfxlab_config::{CliArgs, Config, PipelineDesc};
use gfxlab_render::{GpuCommand, HeadlessDevice, RenderPipeline};

fn main() -> ExitCode {
    let args = CliArgs::parse();

    let config_dir = match args.config.clone().map_or_else(Config::default_dir, Ok) {
        Ok(dir) => dir,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let mut config = Config::load_or_create(&config_dir).unwrap_or_else(|e| {
        eprintln!("Failed to load config: {e}, using defaults");
        Config::default()
    });
    config.apply_cli_overrides(&args);

    let log_dir = config_dir.join("logs");
    gfxlab_log::init_logging(Some(&log_dir), cfg!(debug_assertions), Some(&config));

    let result = load_description(&config, &config_dir).and_then(|desc| {
        if args.headless {
            dry_run(&config, &desc, args.frames).map(|_| ())
        } else {
            window::run(config, desc)
        }
    });
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn load_description(config: &Config, config_dir: &Path) -> Result<PipelineDesc, Box<dyn Error>> {
    match config.pipeline_path(config_dir) {
        Some(path) => Ok(PipelineDesc::load(&path)?),
        None => {
            log::warn!("No pipeline configured, drawing the scene straight to the window");
            Ok(PipelineDesc::default())
        }
    }
}

/// Totals of a headless run.
#[derive(Debug, Default, PartialEq, Eq)]
struct DryRunReport {
    frames: u64,
    commands: usize,
    draws: usize,
    /// Commands still held by the device at the end.
    retained: usize,
    live_objects: usize,
}

/// Draw `frames` frames on the recording device, rotating the camera a
/// little between frames. Commands are drained every frame.
fn dry_run(
    config: &Config,
    desc: &PipelineDesc,
    frames: u32,
) -> Result<DryRunReport, Box<dyn Error>> {
    let mut pipeline = RenderPipeline::from_config(HeadlessDevice::new(), config);
    setup::assemble(&mut pipeline, config, desc)?;

    let mut report = DryRunReport {
        commands: pipeline.device_mut().take_commands().len(),
        ..Default::default()
    };
    for _ in 0..frames {
        pipeline.render_frame()?;
        let frame = pipeline.device_mut().take_commands();
        report.commands += frame.len();
        report.draws += frame
            .iter()
            .filter(|c| matches!(c, GpuCommand::DrawMesh(_)))
            .count();

        if let Some(camera) = pipeline.camera_mut() {
            camera.begin_drag();
            camera.drag(400.0, 300.0);
            camera.drag(420.0, 310.0);
            camera.end_drag();
        }
    }

    report.frames = pipeline.frame_count();
    report.retained = pipeline.device().commands().len();
    report.live_objects = pipeline.device().live_objects();
    log::info!(
        "Rendered {} frame(s): {} command(s), {} draw(s), {} live object(s)",
        report.frames,
        report.commands,
        report.draws,
        report.live_objects
    );
    Ok(report)
}
