//! Error type shared by the device, resource and pipeline layers.

use std::path::PathBuf;

use crate::callbacks::CallbackError;
use crate::handles::FramebufferHandle;

/// Errors raised while creating GPU resources or rendering a frame.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    /// Framebuffer completeness check failed after attaching.
    #[error("framebuffer {framebuffer:?} is incomplete: {status}")]
    IncompleteFramebuffer {
        framebuffer: FramebufferHandle,
        status: String,
    },

    /// The driver refused to create an object.
    #[error("failed to create {what}: {message}")]
    ResourceCreation { what: &'static str, message: String },

    #[error("shader '{label}' failed to compile: {log}")]
    ShaderCompile { label: String, log: String },

    #[error("program '{label}' failed to link: {log}")]
    ProgramLink { label: String, log: String },

    /// Shader file suffix does not name a pipeline stage.
    #[error("cannot infer shader stage from '{file}'")]
    UnknownShaderStage { file: String },

    #[error("failed to load image {path}: {source}")]
    ImageLoad {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A framebuffer was requested without any attachment.
    #[error("framebuffer needs at least one attachment")]
    NoAttachments,

    /// A state callback aborted the frame.
    #[error(transparent)]
    Callback(#[from] CallbackError),
}
