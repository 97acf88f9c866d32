//! OpenGL implementation of [`RenderDevice`] on top of `glow`.
//!
//! The caller owns the window and must keep the context current on the
//! calling thread for as long as the device is used.

use std::collections::HashMap;
use std::num::NonZeroU32;

use glow::HasContext;

use crate::attachment::{AttachmentSlot, FboAttachment};
use crate::device::{
    BufferChannels, FramebufferStatus, MeshData, PixelFormat, RenderDevice, ShaderSource,
    ShaderStage, TextureDesc, UniformValue,
};
use crate::error::RenderError;
use crate::handles::{
    BufferHandle, FramebufferHandle, MeshHandle, ProgramHandle, RenderbufferHandle, TextureHandle,
    UniformLocation,
};

/// Buffers behind one [`MeshHandle`]. The handle is the vertex array name.
#[derive(Debug)]
struct GlMesh {
    vao: glow::NativeVertexArray,
    vbo: glow::NativeBuffer,
    ibo: glow::NativeBuffer,
    index_count: i32,
}

pub struct GlDevice {
    gl: glow::Context,
    meshes: HashMap<MeshHandle, GlMesh>,
}

impl GlDevice {
    pub fn new(gl: glow::Context) -> Self {
        // SAFETY: the caller guarantees a current context.
        let version = unsafe { gl.get_parameter_string(glow::VERSION) };
        log::info!("OpenGL {version}");
        Self {
            gl,
            meshes: HashMap::new(),
        }
    }

    /// Raw context, for calls the device does not wrap.
    pub fn gl(&self) -> &glow::Context {
        &self.gl
    }
}

/// (internal format, pixel format, component type) for `tex_image_2d`.
fn texture_format(format: PixelFormat) -> (u32, u32, u32) {
    match format {
        PixelFormat::Rgb8 => (glow::RGB8, glow::RGB, glow::UNSIGNED_BYTE),
        PixelFormat::Rgba8 => (glow::RGBA8, glow::RGBA, glow::UNSIGNED_BYTE),
        PixelFormat::Rgba16F => (glow::RGBA16F, glow::RGBA, glow::HALF_FLOAT),
        PixelFormat::Rgba32F => (glow::RGBA32F, glow::RGBA, glow::FLOAT),
        PixelFormat::Depth24 => (
            glow::DEPTH_COMPONENT24,
            glow::DEPTH_COMPONENT,
            glow::UNSIGNED_INT,
        ),
        PixelFormat::Depth32F => (glow::DEPTH_COMPONENT32F, glow::DEPTH_COMPONENT, glow::FLOAT),
        PixelFormat::Stencil8 => (glow::STENCIL_INDEX8, glow::STENCIL_INDEX, glow::UNSIGNED_BYTE),
        PixelFormat::Depth24Stencil8 => (
            glow::DEPTH24_STENCIL8,
            glow::DEPTH_STENCIL,
            glow::UNSIGNED_INT_24_8,
        ),
    }
}

fn attachment_point(slot: AttachmentSlot) -> u32 {
    match slot {
        AttachmentSlot::Color(index) => glow::COLOR_ATTACHMENT0 + index,
        AttachmentSlot::Depth => glow::DEPTH_ATTACHMENT,
        AttachmentSlot::Stencil => glow::STENCIL_ATTACHMENT,
        AttachmentSlot::DepthStencil => glow::DEPTH_STENCIL_ATTACHMENT,
    }
}

fn shader_type(stage: ShaderStage) -> u32 {
    match stage {
        ShaderStage::Vertex => glow::VERTEX_SHADER,
        ShaderStage::Fragment => glow::FRAGMENT_SHADER,
        ShaderStage::Geometry => glow::GEOMETRY_SHADER,
        ShaderStage::TessControl => glow::TESS_CONTROL_SHADER,
        ShaderStage::TessEvaluation => glow::TESS_EVALUATION_SHADER,
        ShaderStage::Compute => glow::COMPUTE_SHADER,
    }
}

fn clear_mask(channels: BufferChannels) -> u32 {
    let mut mask = 0;
    if channels.color {
        mask |= glow::COLOR_BUFFER_BIT;
    }
    if channels.depth {
        mask |= glow::DEPTH_BUFFER_BIT;
    }
    if channels.stencil {
        mask |= glow::STENCIL_BUFFER_BIT;
    }
    mask
}

fn status_name(status: u32) -> String {
    let name = match status {
        glow::FRAMEBUFFER_UNDEFINED => "FRAMEBUFFER_UNDEFINED",
        glow::FRAMEBUFFER_INCOMPLETE_ATTACHMENT => "FRAMEBUFFER_INCOMPLETE_ATTACHMENT",
        glow::FRAMEBUFFER_INCOMPLETE_MISSING_ATTACHMENT => {
            "FRAMEBUFFER_INCOMPLETE_MISSING_ATTACHMENT"
        }
        glow::FRAMEBUFFER_INCOMPLETE_DRAW_BUFFER => "FRAMEBUFFER_INCOMPLETE_DRAW_BUFFER",
        glow::FRAMEBUFFER_INCOMPLETE_READ_BUFFER => "FRAMEBUFFER_INCOMPLETE_READ_BUFFER",
        glow::FRAMEBUFFER_UNSUPPORTED => "FRAMEBUFFER_UNSUPPORTED",
        glow::FRAMEBUFFER_INCOMPLETE_MULTISAMPLE => "FRAMEBUFFER_INCOMPLETE_MULTISAMPLE",
        glow::FRAMEBUFFER_INCOMPLETE_LAYER_TARGETS => "FRAMEBUFFER_INCOMPLETE_LAYER_TARGETS",
        other => return format!("0x{other:x}"),
    };
    name.to_string()
}

fn creation_error(what: &'static str) -> impl FnOnce(String) -> RenderError {
    move |message| RenderError::ResourceCreation { what, message }
}

fn native<T>(name: u32, wrap: fn(NonZeroU32) -> T) -> Option<T> {
    NonZeroU32::new(name).map(wrap)
}

impl RenderDevice for GlDevice {
    fn create_framebuffer(&mut self) -> Result<FramebufferHandle, RenderError> {
        let framebuffer = unsafe { self.gl.create_framebuffer() }
            .map_err(creation_error("framebuffer"))?;
        Ok(FramebufferHandle(framebuffer.0.get()))
    }

    fn delete_framebuffer(&mut self, framebuffer: FramebufferHandle) {
        if let Some(fbo) = native(framebuffer.0, glow::NativeFramebuffer) {
            unsafe { self.gl.delete_framebuffer(fbo) };
        }
    }

    fn bind_framebuffer(&mut self, framebuffer: FramebufferHandle) {
        let fbo = native(framebuffer.0, glow::NativeFramebuffer);
        unsafe { self.gl.bind_framebuffer(glow::FRAMEBUFFER, fbo) };
    }

    fn attach(&mut self, slot: AttachmentSlot, attachment: FboAttachment) {
        let point = attachment_point(slot);
        unsafe {
            match attachment {
                FboAttachment::Texture(texture) => self.gl.framebuffer_texture_2d(
                    glow::FRAMEBUFFER,
                    point,
                    glow::TEXTURE_2D,
                    native(texture.0, glow::NativeTexture),
                    0,
                ),
                FboAttachment::Renderbuffer(renderbuffer) => self.gl.framebuffer_renderbuffer(
                    glow::FRAMEBUFFER,
                    point,
                    glow::RENDERBUFFER,
                    native(renderbuffer.0, glow::NativeRenderbuffer),
                ),
            }
        }
    }

    fn set_color_targets(&mut self, count: u32) {
        unsafe {
            if count == 0 {
                self.gl.draw_buffer(glow::NONE);
                self.gl.read_buffer(glow::NONE);
            } else {
                let targets: Vec<u32> = (0..count).map(|i| glow::COLOR_ATTACHMENT0 + i).collect();
                self.gl.draw_buffers(&targets);
            }
        }
    }

    fn framebuffer_status(&mut self) -> FramebufferStatus {
        let status = unsafe { self.gl.check_framebuffer_status(glow::FRAMEBUFFER) };
        if status == glow::FRAMEBUFFER_COMPLETE {
            FramebufferStatus::Complete
        } else {
            FramebufferStatus::Incomplete(status_name(status))
        }
    }

    fn set_viewport(&mut self, width: u32, height: u32) {
        unsafe { self.gl.viewport(0, 0, width as i32, height as i32) };
    }

    fn set_clear_color(&mut self, [r, g, b, a]: [f32; 4]) {
        unsafe { self.gl.clear_color(r, g, b, a) };
    }

    fn clear(&mut self, channels: BufferChannels) {
        let mask = clear_mask(channels);
        if mask != 0 {
            unsafe { self.gl.clear(mask) };
        }
    }

    fn set_depth_test(&mut self, enabled: bool) {
        unsafe {
            if enabled {
                self.gl.enable(glow::DEPTH_TEST);
            } else {
                self.gl.disable(glow::DEPTH_TEST);
            }
        }
    }

    fn set_stencil_test(&mut self, enabled: bool) {
        unsafe {
            if enabled {
                self.gl.enable(glow::STENCIL_TEST);
            } else {
                self.gl.disable(glow::STENCIL_TEST);
            }
        }
    }

    fn create_texture(
        &mut self,
        desc: &TextureDesc,
        pixels: Option<&[u8]>,
    ) -> Result<TextureHandle, RenderError> {
        let (internal, format, ty) = texture_format(desc.format);
        let (wrap, min_filter) = if desc.mipmapped {
            (glow::REPEAT, glow::LINEAR_MIPMAP_LINEAR)
        } else {
            (glow::CLAMP_TO_EDGE, glow::LINEAR)
        };
        unsafe {
            let texture = self.gl.create_texture().map_err(creation_error("texture"))?;
            self.gl.bind_texture(glow::TEXTURE_2D, Some(texture));
            self.gl
                .tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_WRAP_S, wrap as i32);
            self.gl
                .tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_WRAP_T, wrap as i32);
            self.gl
                .tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MIN_FILTER, min_filter as i32);
            self.gl
                .tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MAG_FILTER, glow::LINEAR as i32);
            self.gl.tex_image_2d(
                glow::TEXTURE_2D,
                0,
                internal as i32,
                desc.width as i32,
                desc.height as i32,
                0,
                format,
                ty,
                pixels,
            );
            if desc.mipmapped {
                self.gl.generate_mipmap(glow::TEXTURE_2D);
            }
            self.gl.bind_texture(glow::TEXTURE_2D, None);
            Ok(TextureHandle(texture.0.get()))
        }
    }

    fn delete_texture(&mut self, texture: TextureHandle) {
        if let Some(texture) = native(texture.0, glow::NativeTexture) {
            unsafe { self.gl.delete_texture(texture) };
        }
    }

    fn bind_texture(&mut self, unit: u32, texture: TextureHandle) {
        unsafe {
            self.gl.active_texture(glow::TEXTURE0 + unit);
            self.gl
                .bind_texture(glow::TEXTURE_2D, native(texture.0, glow::NativeTexture));
        }
    }

    fn create_renderbuffer(
        &mut self,
        desc: &TextureDesc,
    ) -> Result<RenderbufferHandle, RenderError> {
        let (internal, _, _) = texture_format(desc.format);
        unsafe {
            let renderbuffer = self
                .gl
                .create_renderbuffer()
                .map_err(creation_error("renderbuffer"))?;
            self.gl.bind_renderbuffer(glow::RENDERBUFFER, Some(renderbuffer));
            self.gl.renderbuffer_storage(
                glow::RENDERBUFFER,
                internal,
                desc.width as i32,
                desc.height as i32,
            );
            self.gl.bind_renderbuffer(glow::RENDERBUFFER, None);
            Ok(RenderbufferHandle(renderbuffer.0.get()))
        }
    }

    fn delete_renderbuffer(&mut self, renderbuffer: RenderbufferHandle) {
        if let Some(renderbuffer) = native(renderbuffer.0, glow::NativeRenderbuffer) {
            unsafe { self.gl.delete_renderbuffer(renderbuffer) };
        }
    }

    fn compile_program(
        &mut self,
        label: &str,
        shaders: &[ShaderSource<'_>],
    ) -> Result<ProgramHandle, RenderError> {
        let gl = &self.gl;
        unsafe {
            let mut compiled = Vec::with_capacity(shaders.len());
            for shader in shaders {
                let object = match gl.create_shader(shader_type(shader.stage)) {
                    Ok(object) => object,
                    Err(message) => {
                        compiled.into_iter().for_each(|s| gl.delete_shader(s));
                        return Err(RenderError::ResourceCreation {
                            what: "shader",
                            message,
                        });
                    }
                };
                gl.shader_source(object, shader.source);
                gl.compile_shader(object);
                if !gl.get_shader_compile_status(object) {
                    let log = gl.get_shader_info_log(object);
                    gl.delete_shader(object);
                    compiled.into_iter().for_each(|s| gl.delete_shader(s));
                    return Err(RenderError::ShaderCompile {
                        label: shader.label.to_string(),
                        log,
                    });
                }
                compiled.push(object);
            }

            let program = match gl.create_program() {
                Ok(program) => program,
                Err(message) => {
                    compiled.into_iter().for_each(|s| gl.delete_shader(s));
                    return Err(RenderError::ResourceCreation {
                        what: "program",
                        message,
                    });
                }
            };
            for shader in &compiled {
                gl.attach_shader(program, *shader);
            }
            gl.link_program(program);
            for shader in compiled {
                gl.detach_shader(program, shader);
                gl.delete_shader(shader);
            }

            if !gl.get_program_link_status(program) {
                let log = gl.get_program_info_log(program);
                gl.delete_program(program);
                return Err(RenderError::ProgramLink {
                    label: label.to_string(),
                    log,
                });
            }
            Ok(ProgramHandle(program.0.get()))
        }
    }

    fn delete_program(&mut self, program: ProgramHandle) {
        if let Some(program) = native(program.0, glow::NativeProgram) {
            unsafe { self.gl.delete_program(program) };
        }
    }

    fn use_program(&mut self, program: ProgramHandle) {
        unsafe { self.gl.use_program(native(program.0, glow::NativeProgram)) };
    }

    fn uniform_location(&mut self, program: ProgramHandle, name: &str) -> Option<UniformLocation> {
        let program = native(program.0, glow::NativeProgram)?;
        unsafe { self.gl.get_uniform_location(program, name) }.map(|l| UniformLocation(l.0))
    }

    fn set_uniform(&mut self, location: UniformLocation, value: UniformValue) {
        let location = glow::NativeUniformLocation(location.0);
        let location = Some(&location);
        unsafe {
            match value {
                UniformValue::Int(v) => self.gl.uniform_1_i32(location, v),
                UniformValue::Float(v) => self.gl.uniform_1_f32(location, v),
                UniformValue::Vec3(v) => self.gl.uniform_3_f32_slice(location, &v.to_array()),
                UniformValue::Mat4(m) => {
                    self.gl
                        .uniform_matrix_4_f32_slice(location, false, &m.to_cols_array())
                }
            }
        }
    }

    fn create_uniform_buffer(&mut self, size: usize) -> Result<BufferHandle, RenderError> {
        unsafe {
            let buffer = self
                .gl
                .create_buffer()
                .map_err(creation_error("uniform buffer"))?;
            self.gl.bind_buffer(glow::UNIFORM_BUFFER, Some(buffer));
            self.gl
                .buffer_data_size(glow::UNIFORM_BUFFER, size as i32, glow::STATIC_DRAW);
            self.gl.bind_buffer(glow::UNIFORM_BUFFER, None);
            Ok(BufferHandle(buffer.0.get()))
        }
    }

    fn write_uniform_buffer(&mut self, buffer: BufferHandle, offset: usize, data: &[u8]) {
        let Some(buffer) = native(buffer.0, glow::NativeBuffer) else {
            return;
        };
        unsafe {
            self.gl.bind_buffer(glow::UNIFORM_BUFFER, Some(buffer));
            self.gl
                .buffer_sub_data_u8_slice(glow::UNIFORM_BUFFER, offset as i32, data);
            self.gl.bind_buffer(glow::UNIFORM_BUFFER, None);
        }
    }

    fn bind_uniform_buffer(&mut self, binding: u32, buffer: BufferHandle) {
        let buffer = native(buffer.0, glow::NativeBuffer);
        unsafe { self.gl.bind_buffer_base(glow::UNIFORM_BUFFER, binding, buffer) };
    }

    fn bind_uniform_block(&mut self, program: ProgramHandle, block: &str, binding: u32) -> bool {
        let Some(program) = native(program.0, glow::NativeProgram) else {
            return false;
        };
        unsafe {
            match self.gl.get_uniform_block_index(program, block) {
                Some(index) => {
                    self.gl.uniform_block_binding(program, index, binding);
                    true
                }
                None => false,
            }
        }
    }

    fn delete_buffer(&mut self, buffer: BufferHandle) {
        if let Some(buffer) = native(buffer.0, glow::NativeBuffer) {
            unsafe { self.gl.delete_buffer(buffer) };
        }
    }

    fn create_mesh(&mut self, data: &MeshData<'_>) -> Result<MeshHandle, RenderError> {
        let stride = (data.stride() * size_of::<f32>()) as i32;
        unsafe {
            let vao = self
                .gl
                .create_vertex_array()
                .map_err(creation_error("vertex array"))?;
            let vbo = match self.gl.create_buffer() {
                Ok(vbo) => vbo,
                Err(e) => {
                    self.gl.delete_vertex_array(vao);
                    return Err(creation_error("vertex buffer")(e));
                }
            };
            let ibo = match self.gl.create_buffer() {
                Ok(ibo) => ibo,
                Err(e) => {
                    self.gl.delete_buffer(vbo);
                    self.gl.delete_vertex_array(vao);
                    return Err(creation_error("index buffer")(e));
                }
            };

            self.gl.bind_vertex_array(Some(vao));
            self.gl.bind_buffer(glow::ARRAY_BUFFER, Some(vbo));
            self.gl.buffer_data_u8_slice(
                glow::ARRAY_BUFFER,
                bytemuck::cast_slice(data.vertices),
                glow::STATIC_DRAW,
            );
            self.gl.bind_buffer(glow::ELEMENT_ARRAY_BUFFER, Some(ibo));
            self.gl.buffer_data_u8_slice(
                glow::ELEMENT_ARRAY_BUFFER,
                bytemuck::cast_slice(data.indices),
                glow::STATIC_DRAW,
            );

            let mut offset = 0;
            for attribute in data.layout {
                self.gl.enable_vertex_attrib_array(attribute.location);
                self.gl.vertex_attrib_pointer_f32(
                    attribute.location,
                    attribute.components as i32,
                    glow::FLOAT,
                    false,
                    stride,
                    offset,
                );
                offset += (attribute.components as usize * size_of::<f32>()) as i32;
            }
            self.gl.bind_vertex_array(None);
            self.gl.bind_buffer(glow::ARRAY_BUFFER, None);

            let handle = MeshHandle(vao.0.get());
            self.meshes.insert(
                handle,
                GlMesh {
                    vao,
                    vbo,
                    ibo,
                    index_count: data.indices.len() as i32,
                },
            );
            Ok(handle)
        }
    }

    fn draw_mesh(&mut self, mesh: MeshHandle) {
        let Some(mesh) = self.meshes.get(&mesh) else {
            log::warn!("draw of unknown mesh {mesh:?}");
            return;
        };
        unsafe {
            self.gl.bind_vertex_array(Some(mesh.vao));
            self.gl
                .draw_elements(glow::TRIANGLES, mesh.index_count, glow::UNSIGNED_INT, 0);
            self.gl.bind_vertex_array(None);
        }
    }

    fn delete_mesh(&mut self, mesh: MeshHandle) {
        if let Some(mesh) = self.meshes.remove(&mesh) {
            unsafe {
                self.gl.delete_vertex_array(mesh.vao);
                self.gl.delete_buffer(mesh.vbo);
                self.gl.delete_buffer(mesh.ibo);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_stencil_format() {
        assert_eq!(
            texture_format(PixelFormat::Depth24Stencil8),
            (glow::DEPTH24_STENCIL8, glow::DEPTH_STENCIL, glow::UNSIGNED_INT_24_8)
        );
        assert_eq!(texture_format(PixelFormat::Rgba16F).2, glow::HALF_FLOAT);
    }

    #[test]
    fn test_color_slots_are_consecutive() {
        assert_eq!(attachment_point(AttachmentSlot::Color(0)), glow::COLOR_ATTACHMENT0);
        assert_eq!(attachment_point(AttachmentSlot::Color(3)), glow::COLOR_ATTACHMENT3);
        assert_eq!(
            attachment_point(AttachmentSlot::DepthStencil),
            glow::DEPTH_STENCIL_ATTACHMENT
        );
    }

    #[test]
    fn test_clear_mask() {
        assert_eq!(clear_mask(BufferChannels::NONE), 0);
        assert_eq!(
            clear_mask(BufferChannels::COLOR_DEPTH),
            glow::COLOR_BUFFER_BIT | glow::DEPTH_BUFFER_BIT
        );
    }

    #[test]
    fn test_status_names() {
        assert_eq!(status_name(glow::FRAMEBUFFER_UNSUPPORTED), "FRAMEBUFFER_UNSUPPORTED");
        assert_eq!(status_name(0x1234), "0x1234");
    }
}
