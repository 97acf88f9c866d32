//! Multi-pass rasterization pipeline.
//!
//! A [`RenderPipeline`] runs an ordered list of [`RenderPass`]es against a
//! [`Scene`]. Passes render into offscreen framebuffers or the window; their
//! attachments are addressable by later passes as `fbo<N>.<slot>`. Shader
//! uniforms are supplied by [`StateCallbacks`] at four granularities: global,
//! per frame, per program and per geometry.
//!
//! GPU access goes through the [`RenderDevice`] trait, implemented by
//! [`GlDevice`] for OpenGL and [`HeadlessDevice`] for dry runs and tests.

pub mod attachment;
pub mod builder;
pub mod callbacks;
pub mod device;
mod error;
mod gl;
pub mod handles;
mod headless;
pub mod material;
pub mod mesh;
pub mod pass;
mod pipeline;
mod resources;
pub mod scene;
mod states;

pub use attachment::{AttachmentRegistry, AttachmentSlot, AttachmentTable, FboAttachment};
pub use builder::{BuildError, build_pipeline};
pub use callbacks::{
    CallbackError, CallbackKind, CallbackLibrary, CallbackSymbol, FrameStateFn, GeometryStateFn,
    GlobalStateFn, ProgramStateFn, StateCallbacks,
};
pub use device::{BufferChannels, MeshData, PixelFormat, RenderDevice, UniformValue};
pub use error::RenderError;
pub use gl::GlDevice;
pub use handles::{
    BufferHandle, FramebufferHandle, MeshHandle, ProgramHandle, TextureHandle, UniformLocation,
};
pub use headless::{GpuCommand, HeadlessDevice};
pub use material::Material;
pub use mesh::Mesh;
pub use pass::RenderPass;
pub use pipeline::RenderPipeline;
pub use resources::ResourceCache;
pub use scene::{Geometry, Light, LightKind, Scene};
pub use states::{ProgramRenderStates, RenderStates};
