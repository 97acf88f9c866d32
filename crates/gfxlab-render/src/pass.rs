//! A single render pass: target, program, geometry and input textures.
//!
//! Passes come in three shapes:
//!
//! - whole scene: every scene geometry, grouped by its own program unless the
//!   pass fixes one;
//! - explicit: caller-supplied geometry lists, one per program;
//! - blit: no geometry, a texture copied to the visible framebuffer through
//!   the shared screen quad.

use std::rc::Rc;

use crate::attachment::{AttachmentSlot, AttachmentTable};
use crate::callbacks::StateCallbacks;
use crate::device::{BufferChannels, FramebufferStatus, RenderDevice};
use crate::error::RenderError;
use crate::handles::{FramebufferHandle, MeshHandle, ProgramHandle, TextureHandle};
use crate::scene::{Geometry, Scene};
use crate::states::{ProgramRenderStates, RenderStates};

/// Geometries drawn with one program.
#[derive(Debug, Clone)]
pub struct DrawGroup {
    pub program: ProgramHandle,
    pub geometries: Vec<Rc<dyn Geometry>>,
}

#[derive(Debug, Clone)]
enum GeometrySet {
    Scene { program: Option<ProgramHandle> },
    Explicit(Vec<DrawGroup>),
    Blit { source: TextureHandle, quad: MeshHandle },
}

/// Everything a pass needs from the pipeline while drawing.
pub struct FrameContext<'a> {
    pub device: &'a mut dyn RenderDevice,
    pub scene: &'a Scene,
    pub states: &'a mut RenderStates,
    pub callbacks: &'a mut StateCallbacks,
    /// Window size, used by passes drawing to the screen.
    pub viewport: (u32, u32),
    pub clear_color: [f32; 4],
}

#[derive(Debug)]
pub struct RenderPass {
    target: FramebufferHandle,
    target_size: Option<(u32, u32)>,
    owns_target: bool,
    attachments: AttachmentTable,
    program: ProgramHandle,
    geometries: GeometrySet,
    inputs: Vec<TextureHandle>,
    channels: BufferChannels,
    channels_overridden: bool,
}

impl RenderPass {
    fn with_geometries(geometries: GeometrySet, channels: BufferChannels) -> Self {
        Self {
            target: FramebufferHandle::SCREEN,
            target_size: None,
            owns_target: false,
            attachments: AttachmentTable::default(),
            program: ProgramHandle::NULL,
            geometries,
            inputs: Vec::new(),
            channels,
            channels_overridden: false,
        }
    }

    /// Draw every scene geometry with its own program.
    pub fn scene() -> Self {
        Self::with_geometries(GeometrySet::Scene { program: None }, BufferChannels::COLOR_DEPTH)
    }

    /// Draw every scene geometry with `program`.
    pub fn scene_with_program(program: ProgramHandle) -> Self {
        let mut pass = Self::with_geometries(
            GeometrySet::Scene {
                program: Some(program),
            },
            BufferChannels::COLOR_DEPTH,
        );
        pass.program = program;
        pass
    }

    /// Draw only the groups added with [`set_program_for_geometries`](Self::set_program_for_geometries).
    pub fn explicit() -> Self {
        Self::with_geometries(GeometrySet::Explicit(Vec::new()), BufferChannels::COLOR_DEPTH)
    }

    /// Copy `source` to the visible framebuffer with `program`.
    pub fn blit(program: ProgramHandle, source: TextureHandle, quad: MeshHandle) -> Self {
        let mut pass =
            Self::with_geometries(GeometrySet::Blit { source, quad }, BufferChannels::COLOR);
        pass.program = program;
        pass
    }

    /// Allocate and validate the pass's offscreen target.
    ///
    /// Colour attachments go to slots 0.. in order; without any, colour
    /// draw and read are disabled. On failure nothing is left allocated and
    /// the pass keeps drawing to its previous target.
    pub fn create_framebuffer(
        &mut self,
        device: &mut dyn RenderDevice,
        size: (u32, u32),
        table: AttachmentTable,
    ) -> Result<FramebufferHandle, RenderError> {
        if table.is_empty() {
            return Err(RenderError::NoAttachments);
        }

        let framebuffer = device.create_framebuffer()?;
        device.bind_framebuffer(framebuffer);
        for (slot, attachment) in table.iter() {
            device.attach(slot, attachment);
        }
        device.set_color_targets(table.color.len() as u32);
        let status = device.framebuffer_status();
        device.bind_framebuffer(FramebufferHandle::SCREEN);

        if let FramebufferStatus::Incomplete(status) = status {
            log::error!("framebuffer {framebuffer:?} incomplete: {status}");
            device.delete_framebuffer(framebuffer);
            return Err(RenderError::IncompleteFramebuffer {
                framebuffer,
                status,
            });
        }

        if !self.channels_overridden {
            self.channels = channels_for(&table);
        }
        self.release(device);
        self.target = framebuffer;
        self.target_size = Some(size);
        self.owns_target = true;
        self.attachments = table;
        log::debug!(
            "Created framebuffer {framebuffer:?} {}x{} with {} attachment(s)",
            size.0,
            size.1,
            self.attachments.len()
        );
        Ok(framebuffer)
    }

    /// Draw into a framebuffer owned by another pass.
    pub fn targeting(mut self, framebuffer: FramebufferHandle, size: (u32, u32)) -> Self {
        self.target = framebuffer;
        self.target_size = Some(size);
        self.owns_target = false;
        self
    }

    /// Textures bound to units 0.. before drawing.
    pub fn set_input_textures(&mut self, textures: Vec<TextureHandle>) {
        self.inputs = textures;
    }

    /// Turn the pass into a blit of `source`.
    pub fn set_display_image(&mut self, source: TextureHandle, quad: MeshHandle) {
        self.geometries = GeometrySet::Blit { source, quad };
        if !self.channels_overridden {
            self.channels = BufferChannels::COLOR;
        }
    }

    /// Program used by whole-scene and blit passes.
    pub fn set_program(&mut self, program: ProgramHandle) {
        self.program = program;
        if let GeometrySet::Scene { program: fixed } = &mut self.geometries {
            *fixed = (!program.is_null()).then_some(program);
        }
    }

    /// Draw `geometries` with `program`, replacing any earlier group for it.
    /// Switches a whole-scene pass to explicit groups.
    pub fn set_program_for_geometries(
        &mut self,
        program: ProgramHandle,
        geometries: Vec<Rc<dyn Geometry>>,
    ) {
        if !matches!(self.geometries, GeometrySet::Explicit(_)) {
            self.geometries = GeometrySet::Explicit(Vec::new());
        }
        let GeometrySet::Explicit(groups) = &mut self.geometries else {
            return;
        };
        match groups.iter_mut().find(|g| g.program == program) {
            Some(group) => group.geometries = geometries,
            None => groups.push(DrawGroup {
                program,
                geometries,
            }),
        }
    }

    /// Override which channels the pass clears and tests.
    pub fn set_channels(&mut self, channels: BufferChannels) {
        self.channels = channels;
        self.channels_overridden = true;
    }

    /// The pass's own framebuffer, or [`FramebufferHandle::SCREEN`].
    pub fn target(&self) -> FramebufferHandle {
        self.target
    }

    /// Framebuffer this pass draws into. Blits always draw to the screen,
    /// whatever framebuffer the pass still holds.
    pub fn draw_target(&self) -> FramebufferHandle {
        if self.is_blit() {
            FramebufferHandle::SCREEN
        } else {
            self.target
        }
    }

    pub fn attachments(&self) -> &AttachmentTable {
        &self.attachments
    }

    pub fn program(&self) -> ProgramHandle {
        self.program
    }

    pub fn inputs(&self) -> &[TextureHandle] {
        &self.inputs
    }

    pub fn channels(&self) -> BufferChannels {
        self.channels
    }

    pub fn is_blit(&self) -> bool {
        matches!(self.geometries, GeometrySet::Blit { .. })
    }

    pub fn owns_framebuffer(&self) -> bool {
        self.owns_target
    }

    /// Draw groups for this frame, in draw order.
    pub fn draw_groups(&self, scene: &Scene) -> Vec<DrawGroup> {
        match &self.geometries {
            GeometrySet::Scene {
                program: Some(program),
            } => vec![DrawGroup {
                program: *program,
                geometries: scene.geometries().to_vec(),
            }],
            GeometrySet::Scene { program: None } => group_by_program(scene.geometries()),
            GeometrySet::Explicit(groups) => groups.clone(),
            GeometrySet::Blit { .. } => Vec::new(),
        }
    }

    /// Execute the pass. `needs_clear` is set for the first pass to touch
    /// this target in the current frame.
    pub fn render(&self, ctx: &mut FrameContext<'_>, needs_clear: bool) -> Result<(), RenderError> {
        if let GeometrySet::Blit { source, quad } = self.geometries {
            self.render_blit(ctx, source, quad, needs_clear);
            return Ok(());
        }

        for (unit, texture) in self.inputs.iter().enumerate() {
            ctx.device.bind_texture(unit as u32, *texture);
        }
        ctx.device.bind_framebuffer(self.target);
        let (width, height) = self.target_size.unwrap_or(ctx.viewport);
        ctx.device.set_viewport(width, height);
        if self.channels.depth {
            ctx.device.set_depth_test(true);
        }
        if self.channels.stencil {
            ctx.device.set_stencil_test(true);
        }
        if needs_clear && !self.channels.is_empty() {
            if self.channels.color {
                ctx.device.set_clear_color(ctx.clear_color);
            }
            ctx.device.clear(self.channels);
        }

        let result = self.draw(ctx);

        ctx.device.use_program(ProgramHandle::NULL);
        if self.channels.depth {
            ctx.device.set_depth_test(false);
        }
        if self.channels.stencil {
            ctx.device.set_stencil_test(false);
        }
        for unit in 0..self.inputs.len() {
            ctx.device.bind_texture(unit as u32, TextureHandle::NULL);
        }
        result
    }

    fn draw(&self, ctx: &mut FrameContext<'_>) -> Result<(), RenderError> {
        for group in self.draw_groups(ctx.scene) {
            ctx.device.use_program(group.program);

            let mut program_states = ctx.states.take_program_states(group.program);
            let result = draw_group(ctx, &group, &mut program_states);
            ctx.states
                .restore_program_states(group.program, program_states);
            result?;
        }
        Ok(())
    }

    fn render_blit(
        &self,
        ctx: &mut FrameContext<'_>,
        source: TextureHandle,
        quad: MeshHandle,
        needs_clear: bool,
    ) {
        let device = &mut *ctx.device;
        device.bind_framebuffer(FramebufferHandle::SCREEN);
        device.set_viewport(ctx.viewport.0, ctx.viewport.1);
        if needs_clear && self.channels.color {
            device.set_clear_color(ctx.clear_color);
            device.clear(BufferChannels::COLOR);
        }
        device.set_depth_test(false);
        device.use_program(self.program);
        device.bind_texture(0, source);
        device.draw_mesh(quad);
        device.bind_texture(0, TextureHandle::NULL);
        device.use_program(ProgramHandle::NULL);
    }

    /// Delete the pass's framebuffer. Attachments belong to the resource cache.
    pub fn release(&mut self, device: &mut dyn RenderDevice) {
        if self.owns_target {
            device.delete_framebuffer(self.target);
            self.target = FramebufferHandle::SCREEN;
            self.target_size = None;
            self.owns_target = false;
            self.attachments = AttachmentTable::default();
        }
    }
}

fn draw_group(
    ctx: &mut FrameContext<'_>,
    group: &DrawGroup,
    program_states: &mut ProgramRenderStates,
) -> Result<(), RenderError> {
    ctx.callbacks.run_program(
        ctx.scene,
        group.program,
        ctx.states,
        program_states,
        ctx.device,
    )?;
    for geometry in &group.geometries {
        ctx.callbacks
            .run_geometry(geometry.as_ref(), program_states, ctx.device)?;
        geometry.draw(ctx.device);
    }
    Ok(())
}

/// Group geometries by program, groups ordered by first appearance.
fn group_by_program(geometries: &[Rc<dyn Geometry>]) -> Vec<DrawGroup> {
    let mut groups: Vec<DrawGroup> = Vec::new();
    for geometry in geometries {
        let program = geometry.shader_program();
        match groups.iter_mut().find(|g| g.program == program) {
            Some(group) => group.geometries.push(Rc::clone(geometry)),
            None => groups.push(DrawGroup {
                program,
                geometries: vec![Rc::clone(geometry)],
            }),
        }
    }
    groups
}

/// Channels implied by a framebuffer's attachments.
fn channels_for(table: &AttachmentTable) -> BufferChannels {
    let has = |slot| table.get(slot).is_some();
    BufferChannels {
        color: !table.color.is_empty(),
        depth: has(AttachmentSlot::Depth) || has(AttachmentSlot::DepthStencil),
        stencil: has(AttachmentSlot::Stencil) || has(AttachmentSlot::DepthStencil),
    }
}
