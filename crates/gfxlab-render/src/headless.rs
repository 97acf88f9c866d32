//! A [`RenderDevice`] without a GPU.
//!
//! Allocates sequential object names, tracks which objects are alive, and
//! records every state-changing call as a [`GpuCommand`]. Used for dry runs of
//! a pipeline description and throughout the test suite.

use std::collections::{HashMap, HashSet};

use crate::attachment::{AttachmentSlot, FboAttachment};
use crate::device::{
    BufferChannels, FramebufferStatus, MeshData, RenderDevice, ShaderSource, TextureDesc,
    UniformValue,
};
use crate::error::RenderError;
use crate::handles::{
    BufferHandle, FramebufferHandle, MeshHandle, ProgramHandle, RenderbufferHandle, TextureHandle,
    UniformLocation,
};

/// One recorded device call.
#[derive(Debug, Clone, PartialEq)]
pub enum GpuCommand {
    CreateFramebuffer(FramebufferHandle),
    DeleteFramebuffer(FramebufferHandle),
    BindFramebuffer(FramebufferHandle),
    Attach {
        framebuffer: FramebufferHandle,
        slot: AttachmentSlot,
        attachment: FboAttachment,
    },
    ColorTargets(u32),
    Viewport(u32, u32),
    ClearColor([f32; 4]),
    Clear(BufferChannels),
    DepthTest(bool),
    StencilTest(bool),
    CreateTexture(TextureHandle, TextureDesc),
    DeleteTexture(TextureHandle),
    BindTexture { unit: u32, texture: TextureHandle },
    CreateRenderbuffer(RenderbufferHandle, TextureDesc),
    DeleteRenderbuffer(RenderbufferHandle),
    CreateProgram(ProgramHandle, String),
    DeleteProgram(ProgramHandle),
    UseProgram(ProgramHandle),
    SetUniform {
        program: ProgramHandle,
        name: String,
        value: UniformValue,
    },
    CreateBuffer(BufferHandle, usize),
    WriteBuffer {
        buffer: BufferHandle,
        offset: usize,
        len: usize,
    },
    BindUniformBuffer { binding: u32, buffer: BufferHandle },
    BindUniformBlock {
        program: ProgramHandle,
        block: String,
        binding: u32,
    },
    DeleteBuffer(BufferHandle),
    CreateMesh(MeshHandle, usize),
    DrawMesh(MeshHandle),
    DeleteMesh(MeshHandle),
}

/// Recording device. See the module docs.
#[derive(Debug, Default)]
pub struct HeadlessDevice {
    commands: Vec<GpuCommand>,
    next_name: u32,
    live: HashSet<u32>,
    bound_framebuffer: FramebufferHandle,
    bound_program: ProgramHandle,
    framebuffer_attachments: HashMap<FramebufferHandle, usize>,
    /// (program, uniform name) -> location, plus the reverse map for recording.
    locations: HashMap<(ProgramHandle, String), UniformLocation>,
    location_names: HashMap<UniformLocation, (ProgramHandle, String)>,
    hidden_uniforms: HashSet<String>,
    blocks: HashSet<String>,
    force_incomplete: bool,
}

impl HeadlessDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every framebuffer completeness check fails from now on.
    pub fn fail_framebuffers(&mut self) {
        self.force_incomplete = true;
    }

    /// Programs report no active uniform called `name`.
    pub fn hide_uniform(&mut self, name: &str) {
        self.hidden_uniforms.insert(name.to_string());
    }

    /// Programs expose a uniform block called `name`.
    pub fn expose_uniform_block(&mut self, name: &str) {
        self.blocks.insert(name.to_string());
    }

    pub fn commands(&self) -> &[GpuCommand] {
        &self.commands
    }

    /// Drain the recorded commands.
    pub fn take_commands(&mut self) -> Vec<GpuCommand> {
        std::mem::take(&mut self.commands)
    }

    /// Number of created objects not yet deleted.
    pub fn live_objects(&self) -> usize {
        self.live.len()
    }

    pub fn is_live(&self, name: u32) -> bool {
        self.live.contains(&name)
    }

    pub fn bound_framebuffer(&self) -> FramebufferHandle {
        self.bound_framebuffer
    }

    pub fn bound_program(&self) -> ProgramHandle {
        self.bound_program
    }

    /// Count recorded commands matching a predicate.
    pub fn count(&self, predicate: impl Fn(&GpuCommand) -> bool) -> usize {
        self.commands.iter().filter(|c| predicate(c)).count()
    }

    fn allocate(&mut self) -> u32 {
        self.next_name += 1;
        self.live.insert(self.next_name);
        self.next_name
    }

    fn release(&mut self, name: u32) {
        if !self.live.remove(&name) {
            log::warn!("headless: object {name} released twice or never created");
        }
    }
}

impl RenderDevice for HeadlessDevice {
    fn create_framebuffer(&mut self) -> Result<FramebufferHandle, RenderError> {
        let framebuffer = FramebufferHandle(self.allocate());
        self.framebuffer_attachments.insert(framebuffer, 0);
        self.commands.push(GpuCommand::CreateFramebuffer(framebuffer));
        Ok(framebuffer)
    }

    fn delete_framebuffer(&mut self, framebuffer: FramebufferHandle) {
        self.release(framebuffer.0);
        self.framebuffer_attachments.remove(&framebuffer);
        if self.bound_framebuffer == framebuffer {
            self.bound_framebuffer = FramebufferHandle::SCREEN;
        }
        self.commands.push(GpuCommand::DeleteFramebuffer(framebuffer));
    }

    fn bind_framebuffer(&mut self, framebuffer: FramebufferHandle) {
        self.bound_framebuffer = framebuffer;
        self.commands.push(GpuCommand::BindFramebuffer(framebuffer));
    }

    fn attach(&mut self, slot: AttachmentSlot, attachment: FboAttachment) {
        let framebuffer = self.bound_framebuffer;
        if let Some(count) = self.framebuffer_attachments.get_mut(&framebuffer) {
            *count += 1;
        }
        self.commands.push(GpuCommand::Attach {
            framebuffer,
            slot,
            attachment,
        });
    }

    fn set_color_targets(&mut self, count: u32) {
        self.commands.push(GpuCommand::ColorTargets(count));
    }

    fn framebuffer_status(&mut self) -> FramebufferStatus {
        if self.bound_framebuffer.is_null() {
            return FramebufferStatus::Complete;
        }
        if self.force_incomplete {
            return FramebufferStatus::Incomplete("FRAMEBUFFER_UNSUPPORTED".to_string());
        }
        match self.framebuffer_attachments.get(&self.bound_framebuffer) {
            Some(0) | None => {
                FramebufferStatus::Incomplete("FRAMEBUFFER_INCOMPLETE_MISSING_ATTACHMENT".into())
            }
            Some(_) => FramebufferStatus::Complete,
        }
    }

    fn set_viewport(&mut self, width: u32, height: u32) {
        self.commands.push(GpuCommand::Viewport(width, height));
    }

    fn set_clear_color(&mut self, rgba: [f32; 4]) {
        self.commands.push(GpuCommand::ClearColor(rgba));
    }

    fn clear(&mut self, channels: BufferChannels) {
        self.commands.push(GpuCommand::Clear(channels));
    }

    fn set_depth_test(&mut self, enabled: bool) {
        self.commands.push(GpuCommand::DepthTest(enabled));
    }

    fn set_stencil_test(&mut self, enabled: bool) {
        self.commands.push(GpuCommand::StencilTest(enabled));
    }

    fn create_texture(
        &mut self,
        desc: &TextureDesc,
        pixels: Option<&[u8]>,
    ) -> Result<TextureHandle, RenderError> {
        if desc.width == 0 || desc.height == 0 {
            return Err(RenderError::ResourceCreation {
                what: "texture",
                message: format!("zero-sized {}x{}", desc.width, desc.height),
            });
        }
        if let Some(pixels) = pixels
            && pixels.is_empty()
        {
            return Err(RenderError::ResourceCreation {
                what: "texture",
                message: "empty pixel data".to_string(),
            });
        }
        let texture = TextureHandle(self.allocate());
        self.commands.push(GpuCommand::CreateTexture(texture, *desc));
        Ok(texture)
    }

    fn delete_texture(&mut self, texture: TextureHandle) {
        self.release(texture.0);
        self.commands.push(GpuCommand::DeleteTexture(texture));
    }

    fn bind_texture(&mut self, unit: u32, texture: TextureHandle) {
        self.commands.push(GpuCommand::BindTexture { unit, texture });
    }

    fn create_renderbuffer(
        &mut self,
        desc: &TextureDesc,
    ) -> Result<RenderbufferHandle, RenderError> {
        if desc.width == 0 || desc.height == 0 {
            return Err(RenderError::ResourceCreation {
                what: "renderbuffer",
                message: format!("zero-sized {}x{}", desc.width, desc.height),
            });
        }
        let renderbuffer = RenderbufferHandle(self.allocate());
        self.commands
            .push(GpuCommand::CreateRenderbuffer(renderbuffer, *desc));
        Ok(renderbuffer)
    }

    fn delete_renderbuffer(&mut self, renderbuffer: RenderbufferHandle) {
        self.release(renderbuffer.0);
        self.commands.push(GpuCommand::DeleteRenderbuffer(renderbuffer));
    }

    fn compile_program(
        &mut self,
        label: &str,
        shaders: &[ShaderSource<'_>],
    ) -> Result<ProgramHandle, RenderError> {
        if let Some(empty) = shaders.iter().find(|s| s.source.trim().is_empty()) {
            return Err(RenderError::ShaderCompile {
                label: empty.label.to_string(),
                log: "empty shader source".to_string(),
            });
        }
        if shaders.is_empty() {
            return Err(RenderError::ProgramLink {
                label: label.to_string(),
                log: "no shader stages".to_string(),
            });
        }
        let program = ProgramHandle(self.allocate());
        self.commands
            .push(GpuCommand::CreateProgram(program, label.to_string()));
        Ok(program)
    }

    fn delete_program(&mut self, program: ProgramHandle) {
        self.release(program.0);
        self.commands.push(GpuCommand::DeleteProgram(program));
    }

    fn use_program(&mut self, program: ProgramHandle) {
        self.bound_program = program;
        self.commands.push(GpuCommand::UseProgram(program));
    }

    fn uniform_location(&mut self, program: ProgramHandle, name: &str) -> Option<UniformLocation> {
        if program.is_null() || self.hidden_uniforms.contains(name) {
            return None;
        }
        let key = (program, name.to_string());
        if let Some(location) = self.locations.get(&key) {
            return Some(*location);
        }
        let location = UniformLocation(self.location_names.len() as u32);
        self.location_names.insert(location, key.clone());
        self.locations.insert(key, location);
        Some(location)
    }

    fn set_uniform(&mut self, location: UniformLocation, value: UniformValue) {
        let Some((program, name)) = self.location_names.get(&location).cloned() else {
            log::warn!("headless: uniform location {location:?} was never queried");
            return;
        };
        if program != self.bound_program {
            log::warn!(
                "headless: uniform '{name}' of {program:?} set while {:?} is bound",
                self.bound_program
            );
        }
        self.commands.push(GpuCommand::SetUniform {
            program,
            name,
            value,
        });
    }

    fn create_uniform_buffer(&mut self, size: usize) -> Result<BufferHandle, RenderError> {
        let buffer = BufferHandle(self.allocate());
        self.commands.push(GpuCommand::CreateBuffer(buffer, size));
        Ok(buffer)
    }

    fn write_uniform_buffer(&mut self, buffer: BufferHandle, offset: usize, data: &[u8]) {
        self.commands.push(GpuCommand::WriteBuffer {
            buffer,
            offset,
            len: data.len(),
        });
    }

    fn bind_uniform_buffer(&mut self, binding: u32, buffer: BufferHandle) {
        self.commands
            .push(GpuCommand::BindUniformBuffer { binding, buffer });
    }

    fn bind_uniform_block(&mut self, program: ProgramHandle, block: &str, binding: u32) -> bool {
        if !self.blocks.contains(block) {
            return false;
        }
        self.commands.push(GpuCommand::BindUniformBlock {
            program,
            block: block.to_string(),
            binding,
        });
        true
    }

    fn delete_buffer(&mut self, buffer: BufferHandle) {
        self.release(buffer.0);
        self.commands.push(GpuCommand::DeleteBuffer(buffer));
    }

    fn create_mesh(&mut self, data: &MeshData<'_>) -> Result<MeshHandle, RenderError> {
        if data.stride() == 0 || data.vertices.len() % data.stride() != 0 {
            return Err(RenderError::ResourceCreation {
                what: "mesh",
                message: format!(
                    "{} floats do not divide into vertices of {}",
                    data.vertices.len(),
                    data.stride()
                ),
            });
        }
        let mesh = MeshHandle(self.allocate());
        self.commands
            .push(GpuCommand::CreateMesh(mesh, data.indices.len()));
        Ok(mesh)
    }

    fn draw_mesh(&mut self, mesh: MeshHandle) {
        self.commands.push(GpuCommand::DrawMesh(mesh));
    }

    fn delete_mesh(&mut self, mesh: MeshHandle) {
        self.release(mesh.0);
        self.commands.push(GpuCommand::DeleteMesh(mesh));
    }
}
