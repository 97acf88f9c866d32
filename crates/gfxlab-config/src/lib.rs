//! Configuration system for gfxlab.
//!
//! Provides runtime settings that persist to disk as RON files, CLI overrides
//! via clap, hot-reload detection, and the RON description format from which
//! render pipelines are assembled.

mod cli;
mod config;
mod error;
mod pipeline;

pub use cli::CliArgs;
pub use config::{CallbackConfig, Config, DebugConfig, RenderConfig, WindowConfig};
pub use error::ConfigError;
pub use pipeline::{
    AttachmentDesc, AttachmentFormat, AttachmentKind, ChannelsDesc, FramebufferDesc,
    GeometrySelection, PassDesc, PipelineDesc, ProgramDesc,
};
