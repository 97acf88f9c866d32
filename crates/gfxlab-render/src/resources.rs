//! GPU resource cache: shader programs, image textures, attachments, meshes.
//!
//! Everything created through the cache is owned by it and released by
//! [`ResourceCache::release`]. Programs are keyed by their sorted shader file
//! list and image textures by path, so repeated requests share one object.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use gfxlab_config::{AttachmentFormat, AttachmentKind};

use crate::attachment::FboAttachment;
use crate::device::{
    MeshData, PixelFormat, RenderDevice, ShaderSource, ShaderStage, TextureDesc, VertexAttribute,
};
use crate::error::RenderError;
use crate::handles::{MeshHandle, ProgramHandle, TextureHandle};

/// Full-screen quad: position (location 0) and texture coordinate (location 1).
#[rustfmt::skip]
const SCREEN_QUAD_VERTICES: [f32; 20] = [
    -1.0, -1.0, 0.0,  0.0, 0.0,
     1.0, -1.0, 0.0,  1.0, 0.0,
     1.0,  1.0, 0.0,  1.0, 1.0,
    -1.0,  1.0, 0.0,  0.0, 1.0,
];
const SCREEN_QUAD_INDICES: [u32; 6] = [0, 1, 2, 0, 2, 3];
const SCREEN_QUAD_LAYOUT: [VertexAttribute; 2] = [
    VertexAttribute {
        location: 0,
        components: 3,
    },
    VertexAttribute {
        location: 1,
        components: 2,
    },
];

/// Owner of long-lived GPU resources.
#[derive(Debug, Default)]
pub struct ResourceCache {
    shader_dir: PathBuf,
    texture_dir: PathBuf,
    programs: HashMap<String, ProgramHandle>,
    images: HashMap<PathBuf, TextureHandle>,
    attachments: Vec<FboAttachment>,
    meshes: Vec<MeshHandle>,
    screen_quad: Option<MeshHandle>,
}

impl ResourceCache {
    pub fn new(shader_dir: impl Into<PathBuf>, texture_dir: impl Into<PathBuf>) -> Self {
        Self {
            shader_dir: shader_dir.into(),
            texture_dir: texture_dir.into(),
            ..Default::default()
        }
    }

    pub fn shader_dir(&self) -> &Path {
        &self.shader_dir
    }

    pub fn texture_dir(&self) -> &Path {
        &self.texture_dir
    }

    /// Create a render-target texture or renderbuffer.
    pub fn create_attachment(
        &mut self,
        device: &mut dyn RenderDevice,
        kind: AttachmentKind,
        format: AttachmentFormat,
        width: u32,
        height: u32,
    ) -> Result<FboAttachment, RenderError> {
        let desc = TextureDesc::render_target(width, height, PixelFormat::from(format));
        let attachment = match kind {
            AttachmentKind::Texture => FboAttachment::Texture(device.create_texture(&desc, None)?),
            AttachmentKind::Renderbuffer => {
                FboAttachment::Renderbuffer(device.create_renderbuffer(&desc)?)
            }
        };
        log::debug!("Created {kind:?} attachment {format:?} {width}x{height}");
        self.attachments.push(attachment);
        Ok(attachment)
    }

    /// Decode an image file into an RGBA8 texture. Relative paths are taken
    /// from the texture directory.
    pub fn load_image_texture(
        &mut self,
        device: &mut dyn RenderDevice,
        path: &Path,
    ) -> Result<TextureHandle, RenderError> {
        let path = resolve(&self.texture_dir, path);
        if let Some(texture) = self.images.get(&path) {
            return Ok(*texture);
        }

        let image = image::open(&path)
            .map_err(|source| RenderError::ImageLoad {
                path: path.clone(),
                source,
            })?
            .to_rgba8();
        let desc = TextureDesc {
            width: image.width(),
            height: image.height(),
            format: PixelFormat::Rgba8,
            mipmapped: true,
        };
        let texture = device.create_texture(&desc, Some(image.as_raw()))?;
        log::info!(
            "Loaded texture {} ({}x{})",
            path.display(),
            desc.width,
            desc.height
        );
        self.images.insert(path, texture);
        Ok(texture)
    }

    /// The shared full-screen quad, created on first use.
    pub fn screen_quad(&mut self, device: &mut dyn RenderDevice) -> Result<MeshHandle, RenderError> {
        if let Some(quad) = self.screen_quad {
            return Ok(quad);
        }
        let quad = device.create_mesh(&MeshData {
            vertices: &SCREEN_QUAD_VERTICES,
            layout: &SCREEN_QUAD_LAYOUT,
            indices: &SCREEN_QUAD_INDICES,
        })?;
        self.screen_quad = Some(quad);
        Ok(quad)
    }

    /// Compile and link a program from shader files, or return the cached one.
    ///
    /// The stage of each file comes from its suffix; see
    /// [`ShaderStage::from_file_name`].
    pub fn create_program(
        &mut self,
        device: &mut dyn RenderDevice,
        files: &[String],
    ) -> Result<ProgramHandle, RenderError> {
        let mut sorted: Vec<&str> = files.iter().map(String::as_str).collect();
        sorted.sort_unstable();
        let key = sorted.concat();
        if let Some(program) = self.programs.get(&key) {
            return Ok(*program);
        }

        let mut sources = Vec::with_capacity(sorted.len());
        for file in &sorted {
            let stage =
                ShaderStage::from_file_name(file).ok_or_else(|| RenderError::UnknownShaderStage {
                    file: file.to_string(),
                })?;
            let path = resolve(&self.shader_dir, Path::new(file));
            let text = std::fs::read_to_string(&path)
                .map_err(|source| RenderError::Io { path, source })?;
            sources.push((stage, text, *file));
        }
        let shaders: Vec<ShaderSource<'_>> = sources
            .iter()
            .map(|(stage, text, label)| ShaderSource {
                stage: *stage,
                source: text,
                label,
            })
            .collect();

        let label = sorted.join("+");
        let program = device
            .compile_program(&label, &shaders)
            .inspect_err(|e| log::error!("{e}"))?;
        log::info!("Created program {label} ({program:?})");
        self.programs.insert(key, program);
        Ok(program)
    }

    /// Upload mesh data owned by the cache.
    pub fn create_mesh(
        &mut self,
        device: &mut dyn RenderDevice,
        data: &MeshData<'_>,
    ) -> Result<MeshHandle, RenderError> {
        let mesh = device.create_mesh(data)?;
        self.meshes.push(mesh);
        Ok(mesh)
    }

    /// Delete every object the cache created. The cache is empty afterwards.
    pub fn release(&mut self, device: &mut dyn RenderDevice) {
        for (_, program) in self.programs.drain() {
            device.delete_program(program);
        }
        for (_, texture) in self.images.drain() {
            device.delete_texture(texture);
        }
        for attachment in self.attachments.drain(..) {
            match attachment {
                FboAttachment::Texture(texture) => device.delete_texture(texture),
                FboAttachment::Renderbuffer(rb) => device.delete_renderbuffer(rb),
            }
        }
        for mesh in self.meshes.drain(..).chain(self.screen_quad.take()) {
            device.delete_mesh(mesh);
        }
    }
}

fn resolve(dir: &Path, path: &Path) -> PathBuf {
    if path.is_relative() {
        dir.join(path)
    } else {
        path.to_path_buf()
    }
}
