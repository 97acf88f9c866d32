//! The GPU command surface the pipeline drives.
//!
//! [`RenderDevice`] is deliberately close to the OpenGL object model: bind
//! points, texture units, uniform locations. [`crate::GlDevice`] forwards to a
//! real context, [`crate::HeadlessDevice`] records the calls.

use glam::{Mat4, Vec3};

use gfxlab_config::{AttachmentFormat, ChannelsDesc};

use crate::attachment::{AttachmentSlot, FboAttachment};
use crate::error::RenderError;
use crate::handles::{
    BufferHandle, FramebufferHandle, MeshHandle, ProgramHandle, RenderbufferHandle, TextureHandle,
    UniformLocation,
};

/// Framebuffer channels a pass owns: cleared at first use, tested while drawing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct BufferChannels {
    pub color: bool,
    pub depth: bool,
    pub stencil: bool,
}

impl BufferChannels {
    pub const NONE: Self = Self {
        color: false,
        depth: false,
        stencil: false,
    };
    pub const COLOR: Self = Self {
        color: true,
        depth: false,
        stencil: false,
    };
    pub const COLOR_DEPTH: Self = Self {
        color: true,
        depth: true,
        stencil: false,
    };
    pub const ALL: Self = Self {
        color: true,
        depth: true,
        stencil: true,
    };

    pub fn is_empty(self) -> bool {
        !(self.color || self.depth || self.stencil)
    }
}

impl From<ChannelsDesc> for BufferChannels {
    fn from(desc: ChannelsDesc) -> Self {
        Self {
            color: desc.color,
            depth: desc.depth,
            stencil: desc.stencil,
        }
    }
}

/// Pixel storage of textures and renderbuffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    Rgb8,
    Rgba8,
    Rgba16F,
    Rgba32F,
    Depth24,
    Depth32F,
    Stencil8,
    Depth24Stencil8,
}

impl PixelFormat {
    pub fn has_depth(self) -> bool {
        matches!(self, Self::Depth24 | Self::Depth32F | Self::Depth24Stencil8)
    }

    pub fn has_stencil(self) -> bool {
        matches!(self, Self::Stencil8 | Self::Depth24Stencil8)
    }

    pub fn is_color(self) -> bool {
        !(self.has_depth() || self.has_stencil())
    }
}

impl From<AttachmentFormat> for PixelFormat {
    fn from(format: AttachmentFormat) -> Self {
        match format {
            AttachmentFormat::Rgba8 => Self::Rgba8,
            AttachmentFormat::Rgba16F => Self::Rgba16F,
            AttachmentFormat::Rgba32F => Self::Rgba32F,
            AttachmentFormat::Depth24 => Self::Depth24,
            AttachmentFormat::Depth32F => Self::Depth32F,
            AttachmentFormat::Stencil8 => Self::Stencil8,
            AttachmentFormat::Depth24Stencil8 => Self::Depth24Stencil8,
        }
    }
}

/// Size and format of a 2D texture or renderbuffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureDesc {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    /// Repeat-wrapped with a generated mip chain (image textures); otherwise
    /// clamped and linearly filtered (render targets).
    pub mipmapped: bool,
}

impl TextureDesc {
    pub fn render_target(width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            width,
            height,
            format,
            mipmapped: false,
        }
    }
}

/// Programmable pipeline stage of a shader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
    Geometry,
    TessControl,
    TessEvaluation,
    Compute,
}

impl ShaderStage {
    /// Infer the stage from a file name suffix (`quad.vs`, `blur.frag`, ...).
    pub fn from_file_name(file: &str) -> Option<Self> {
        let (_, suffix) = file.rsplit_once('.')?;
        match suffix {
            "vs" | "vert" => Some(Self::Vertex),
            "fs" | "frag" => Some(Self::Fragment),
            "gs" | "geom" => Some(Self::Geometry),
            "tesc" => Some(Self::TessControl),
            "tese" => Some(Self::TessEvaluation),
            "comp" => Some(Self::Compute),
            _ => None,
        }
    }
}

/// One shader stage's source text.
#[derive(Debug, Clone, Copy)]
pub struct ShaderSource<'a> {
    pub stage: ShaderStage,
    pub source: &'a str,
    /// Used in diagnostics; usually the file name.
    pub label: &'a str,
}

/// Value written to a uniform location of the bound program.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Int(i32),
    Float(f32),
    Vec3(Vec3),
    Mat4(Mat4),
}

/// Float vertex attribute bound to a shader input location.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexAttribute {
    pub location: u32,
    pub components: u32,
}

/// Interleaved `f32` vertex data plus `u32` triangle indices.
#[derive(Debug, Clone, Copy)]
pub struct MeshData<'a> {
    pub vertices: &'a [f32],
    pub layout: &'a [VertexAttribute],
    pub indices: &'a [u32],
}

impl MeshData<'_> {
    /// Floats per vertex.
    pub fn stride(&self) -> usize {
        self.layout.iter().map(|a| a.components as usize).sum()
    }

    pub fn vertex_count(&self) -> usize {
        match self.stride() {
            0 => 0,
            stride => self.vertices.len() / stride,
        }
    }

    /// Positions, taken from the first three floats of every vertex.
    pub fn positions(&self) -> impl Iterator<Item = Vec3> + '_ {
        let stride = self.stride().max(3);
        self.vertices
            .chunks_exact(stride)
            .map(|v| Vec3::new(v[0], v[1], v[2]))
    }
}

/// Outcome of a framebuffer completeness check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FramebufferStatus {
    Complete,
    Incomplete(String),
}

/// GPU operations used by passes, resources, callbacks and geometry.
///
/// Object-safe so callbacks and geometry can take `&mut dyn RenderDevice`.
/// Methods touching "the bound framebuffer" or "the bound program" act on
/// whatever the last `bind_framebuffer`/`use_program` selected.
pub trait RenderDevice {
    fn create_framebuffer(&mut self) -> Result<FramebufferHandle, RenderError>;
    fn delete_framebuffer(&mut self, framebuffer: FramebufferHandle);
    /// Bind for drawing and reading. [`FramebufferHandle::SCREEN`] selects the window.
    fn bind_framebuffer(&mut self, framebuffer: FramebufferHandle);
    /// Attach to the bound framebuffer.
    fn attach(&mut self, slot: AttachmentSlot, attachment: FboAttachment);
    /// Enable colour slots `0..count` for drawing; zero disables colour draw and read.
    fn set_color_targets(&mut self, count: u32);
    fn framebuffer_status(&mut self) -> FramebufferStatus;

    fn set_viewport(&mut self, width: u32, height: u32);
    fn set_clear_color(&mut self, rgba: [f32; 4]);
    fn clear(&mut self, channels: BufferChannels);
    fn set_depth_test(&mut self, enabled: bool);
    fn set_stencil_test(&mut self, enabled: bool);

    fn create_texture(
        &mut self,
        desc: &TextureDesc,
        pixels: Option<&[u8]>,
    ) -> Result<TextureHandle, RenderError>;
    fn delete_texture(&mut self, texture: TextureHandle);
    /// Bind to a 2D texture unit. A null handle unbinds the unit.
    fn bind_texture(&mut self, unit: u32, texture: TextureHandle);
    fn create_renderbuffer(&mut self, desc: &TextureDesc)
    -> Result<RenderbufferHandle, RenderError>;
    fn delete_renderbuffer(&mut self, renderbuffer: RenderbufferHandle);

    /// Compile every stage and link them. Stage objects do not outlive the call.
    fn compile_program(
        &mut self,
        label: &str,
        shaders: &[ShaderSource<'_>],
    ) -> Result<ProgramHandle, RenderError>;
    fn delete_program(&mut self, program: ProgramHandle);
    /// A null handle unbinds.
    fn use_program(&mut self, program: ProgramHandle);
    /// `None` when the program has no active uniform of that name.
    fn uniform_location(&mut self, program: ProgramHandle, name: &str) -> Option<UniformLocation>;
    /// Write to the bound program.
    fn set_uniform(&mut self, location: UniformLocation, value: UniformValue);

    fn create_uniform_buffer(&mut self, size: usize) -> Result<BufferHandle, RenderError>;
    fn write_uniform_buffer(&mut self, buffer: BufferHandle, offset: usize, data: &[u8]);
    fn bind_uniform_buffer(&mut self, binding: u32, buffer: BufferHandle);
    /// Point the named uniform block of `program` at `binding`. `false` if the
    /// program has no such block.
    fn bind_uniform_block(&mut self, program: ProgramHandle, block: &str, binding: u32) -> bool;
    fn delete_buffer(&mut self, buffer: BufferHandle);

    fn create_mesh(&mut self, data: &MeshData<'_>) -> Result<MeshHandle, RenderError>;
    /// Indexed triangle draw of the whole mesh.
    fn draw_mesh(&mut self, mesh: MeshHandle);
    fn delete_mesh(&mut self, mesh: MeshHandle);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shader_stage_from_suffix() {
        assert_eq!(ShaderStage::from_file_name("quad.vs"), Some(ShaderStage::Vertex));
        assert_eq!(ShaderStage::from_file_name("blur.frag"), Some(ShaderStage::Fragment));
        assert_eq!(ShaderStage::from_file_name("normals.gs"), Some(ShaderStage::Geometry));
        assert_eq!(ShaderStage::from_file_name("patch.tesc"), Some(ShaderStage::TessControl));
        assert_eq!(ShaderStage::from_file_name("patch.tese"), Some(ShaderStage::TessEvaluation));
        assert_eq!(ShaderStage::from_file_name("cull.comp"), Some(ShaderStage::Compute));
    }

    #[test]
    fn test_shader_stage_rejects_unknown_suffix() {
        assert_eq!(ShaderStage::from_file_name("quad.glsl"), None);
        assert_eq!(ShaderStage::from_file_name("quad"), None);
        assert_eq!(ShaderStage::from_file_name("lib/quad.vs.bak"), None);
    }

    #[test]
    fn test_pixel_format_classes() {
        assert!(PixelFormat::Rgba16F.is_color());
        assert!(PixelFormat::Depth24.has_depth());
        assert!(!PixelFormat::Depth24.has_stencil());
        assert!(PixelFormat::Depth24Stencil8.has_depth());
        assert!(PixelFormat::Depth24Stencil8.has_stencil());
        assert!(!PixelFormat::Stencil8.is_color());
    }

    #[test]
    fn test_mesh_data_positions() {
        let layout = [
            VertexAttribute {
                location: 0,
                components: 3,
            },
            VertexAttribute {
                location: 1,
                components: 2,
            },
        ];
        let vertices = [1.0, 2.0, 3.0, 0.0, 0.0, -1.0, -2.0, -3.0, 1.0, 1.0];
        let data = MeshData {
            vertices: &vertices,
            layout: &layout,
            indices: &[0, 1, 0],
        };
        assert_eq!(data.stride(), 5);
        assert_eq!(data.vertex_count(), 2);
        let positions: Vec<_> = data.positions().collect();
        assert_eq!(positions, vec![Vec3::new(1.0, 2.0, 3.0), Vec3::new(-1.0, -2.0, -3.0)]);
    }

    #[test]
    fn test_channels_from_desc() {
        let channels = BufferChannels::from(ChannelsDesc {
            color: false,
            depth: true,
            stencil: false,
        });
        assert!(!channels.color && channels.depth && !channels.stencil);
        assert!(BufferChannels::NONE.is_empty());
        assert!(!BufferChannels::COLOR.is_empty());
    }
}
