//! The multi-pass render pipeline.
//!
//! [`RenderPipeline`] owns the device, the scene, the resource cache and an
//! ordered list of [`RenderPass`]es. A frame runs the per-frame callbacks once
//! and then every pass in order. The first pass to target a framebuffer in a
//! frame clears it; later passes on the same target draw on top.

use std::collections::HashSet;
use std::path::Path;

use gfxlab_camera::TrackballCamera;
use gfxlab_config::CallbackConfig;

use crate::attachment::{AttachmentRegistry, TextureRef};
use crate::callbacks::{CallbackLibrary, StateCallbacks};
use crate::device::RenderDevice;
use crate::error::RenderError;
use crate::handles::{FramebufferHandle, ProgramHandle, TextureHandle};
use crate::pass::{FrameContext, RenderPass};
use crate::resources::ResourceCache;
use crate::scene::Scene;
use crate::states::RenderStates;

pub struct RenderPipeline<D: RenderDevice> {
    device: D,
    resources: ResourceCache,
    scene: Scene,
    passes: Vec<RenderPass>,
    registry: AttachmentRegistry,
    states: RenderStates,
    callbacks: StateCallbacks,
    initialized: bool,
    /// Targets already drawn to this frame.
    cleared: HashSet<FramebufferHandle>,
    viewport: (u32, u32),
    clear_color: [f32; 4],
    frame: u64,
}

impl<D: RenderDevice> RenderPipeline<D> {
    pub fn new(device: D, resources: ResourceCache, width: u32, height: u32) -> Self {
        Self {
            device,
            resources,
            scene: Scene::new(),
            passes: Vec::new(),
            registry: AttachmentRegistry::new(),
            states: RenderStates::new(),
            callbacks: StateCallbacks::new(),
            initialized: false,
            cleared: HashSet::new(),
            viewport: (width, height),
            clear_color: [0.0, 0.0, 0.0, 1.0],
            frame: 0,
        }
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn scene_mut(&mut self) -> &mut Scene {
        &mut self.scene
    }

    pub fn set_scene(&mut self, scene: Scene) {
        self.scene = scene;
    }

    /// Split borrow for creating scene content: device, resource cache and scene.
    pub fn parts_mut(&mut self) -> (&mut dyn RenderDevice, &mut ResourceCache, &mut Scene) {
        (&mut self.device, &mut self.resources, &mut self.scene)
    }

    pub fn camera_mut(&mut self) -> Option<&mut TrackballCamera> {
        self.scene.camera_mut()
    }

    pub fn states(&self) -> &RenderStates {
        &self.states
    }

    pub fn callbacks_mut(&mut self) -> &mut StateCallbacks {
        &mut self.callbacks
    }

    /// Bind callbacks from `library` as listed in `config`.
    pub fn bind_callbacks(&mut self, library: &CallbackLibrary, config: &CallbackConfig) -> usize {
        self.callbacks.bind_library(library, config)
    }

    pub fn set_clear_color(&mut self, rgba: [f32; 4]) {
        self.clear_color = rgba;
    }

    pub fn viewport(&self) -> (u32, u32) {
        self.viewport
    }

    pub fn passes(&self) -> &[RenderPass] {
        &self.passes
    }

    pub fn registry(&self) -> &AttachmentRegistry {
        &self.registry
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Frames rendered successfully so far.
    pub fn frame_count(&self) -> u64 {
        self.frame
    }

    /// Compile a program from shader files and register it under `name`.
    pub fn create_program(
        &mut self,
        name: &str,
        files: &[String],
    ) -> Result<ProgramHandle, RenderError> {
        let program = self.resources.create_program(&mut self.device, files)?;
        self.states.add_shader_program(name, program);
        Ok(program)
    }

    /// Register an existing program under `name`.
    pub fn add_shader_program(&mut self, name: &str, program: ProgramHandle) {
        self.states.add_shader_program(name, program);
    }

    /// Create a render-target attachment owned by the resource cache.
    pub fn create_attachment(
        &mut self,
        kind: gfxlab_config::AttachmentKind,
        format: gfxlab_config::AttachmentFormat,
        width: u32,
        height: u32,
    ) -> Result<crate::attachment::FboAttachment, RenderError> {
        self.resources
            .create_attachment(&mut self.device, kind, format, width, height)
    }

    /// Run `build` against a pass with access to the device. Used to create
    /// framebuffers before the pass is added.
    pub fn with_device<R>(&mut self, build: impl FnOnce(&mut dyn RenderDevice) -> R) -> R {
        let device: &mut dyn RenderDevice = &mut self.device;
        build(device)
    }

    /// The shared full-screen quad.
    pub fn screen_quad(&mut self) -> Result<crate::handles::MeshHandle, RenderError> {
        self.resources.screen_quad(&mut self.device)
    }

    /// Append a pass. A pass that owns a framebuffer becomes `fbo<N>`, N being
    /// the number of framebuffer-owning passes added before it.
    pub fn add_pass(&mut self, pass: RenderPass) -> usize {
        if pass.owns_framebuffer() {
            let index = self.registry.register(pass.attachments().clone());
            log::debug!("pass {} registered as fbo{index}", self.passes.len());
        }
        self.passes.push(pass);
        self.passes.len() - 1
    }

    /// Resolve a texture name: `fbo<N>.<slot>` through the attachment
    /// registry, anything else as an image file. Failures are logged.
    pub fn resolve_texture(&mut self, name: &str) -> Option<TextureHandle> {
        match TextureRef::parse(name) {
            TextureRef::Attachment { framebuffer, slot } => self.registry.lookup(framebuffer, slot),
            TextureRef::Malformed(name) => {
                log::warn!("'{name}' is not a valid attachment name");
                None
            }
            TextureRef::Image(path) => self
                .resources
                .load_image_texture(&mut self.device, Path::new(path))
                .inspect_err(|e| log::warn!("{e}"))
                .ok(),
        }
    }

    /// Run the global callbacks. Happens at most once; later calls are no-ops.
    pub fn initialize(&mut self) -> Result<(), RenderError> {
        if self.initialized {
            return Ok(());
        }
        self.initialized = true;
        log::info!(
            "Initializing pipeline: {} pass(es), {} program(s)",
            self.passes.len(),
            self.states.programs().count()
        );
        self.device.set_viewport(self.viewport.0, self.viewport.1);
        self.callbacks
            .run_global(&self.scene, &mut self.states, &mut self.device)?;
        Ok(())
    }

    /// Draw one frame. Program and framebuffer bindings are reset to zero
    /// afterwards, also when a pass or callback fails. No buffer swap.
    pub fn render_frame(&mut self) -> Result<(), RenderError> {
        self.cleared.clear();

        let result = self.initialize().and_then(|()| self.draw_passes());

        self.device.use_program(ProgramHandle::NULL);
        self.device.bind_framebuffer(FramebufferHandle::SCREEN);
        if result.is_ok() {
            self.frame += 1;
        }
        result
    }

    fn draw_passes(&mut self) -> Result<(), RenderError> {
        self.callbacks
            .run_frame(&self.scene, &mut self.states, &mut self.device)?;

        let mut ctx = FrameContext {
            device: &mut self.device,
            scene: &self.scene,
            states: &mut self.states,
            callbacks: &mut self.callbacks,
            viewport: self.viewport,
            clear_color: self.clear_color,
        };
        for (index, pass) in self.passes.iter().enumerate() {
            let target = pass.draw_target();
            let needs_clear = self.cleared.insert(target);
            log::trace!("pass {index}: target {target:?}, clear {needs_clear}");
            pass.render(&mut ctx, needs_clear)
                .inspect_err(|e| log::error!("pass {index} failed: {e}"))?;
        }
        Ok(())
    }

    /// Track a new window size; also resizes the scene camera.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.viewport = (width, height);
        self.device.set_viewport(width, height);
        if let Some(camera) = self.scene.camera_mut() {
            camera.resize(width, height);
        }
    }

    /// Delete pass framebuffers, callback uniform buffers and cached resources.
    /// Called on drop; safe to call more than once.
    pub fn release(&mut self) {
        for pass in &mut self.passes {
            pass.release(&mut self.device);
        }
        for buffer in self.states.uniform_buffers.drain(..) {
            self.device.delete_buffer(buffer);
        }
        self.resources.release(&mut self.device);
        self.registry.clear();
    }
}

impl<D: RenderDevice> Drop for RenderPipeline<D> {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attachment::{AttachmentSlot, AttachmentTable, FboAttachment};
    use crate::callbacks::CallbackError;
    use crate::device::{BufferChannels, UniformValue};
    use crate::headless::{GpuCommand, HeadlessDevice};
    use crate::test_support::TestGeometry;
    use gfxlab_config::{AttachmentFormat, AttachmentKind};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn pipeline() -> RenderPipeline<HeadlessDevice> {
        RenderPipeline::new(HeadlessDevice::new(), ResourceCache::default(), 800, 600)
    }

    fn color_target(pipeline: &mut RenderPipeline<HeadlessDevice>) -> AttachmentTable {
        let color = pipeline
            .create_attachment(AttachmentKind::Texture, AttachmentFormat::Rgba8, 64, 64)
            .unwrap();
        AttachmentTable {
            color: vec![color],
            ..Default::default()
        }
    }

    fn offscreen_pass(pipeline: &mut RenderPipeline<HeadlessDevice>) -> RenderPass {
        let table = color_target(pipeline);
        let mut pass = RenderPass::scene();
        pipeline
            .with_device(|device| pass.create_framebuffer(device, (64, 64), table))
            .unwrap();
        pass
    }

    /// Records callback invocations as strings.
    fn trace_callbacks(pipeline: &mut RenderPipeline<HeadlessDevice>) -> Rc<RefCell<Vec<String>>> {
        let log = Rc::new(RefCell::new(Vec::new()));
        let callbacks = pipeline.callbacks_mut();

        let l = Rc::clone(&log);
        callbacks.add_global(move |_, _, _| {
            l.borrow_mut().push("global".into());
            Ok(())
        });
        let l = Rc::clone(&log);
        callbacks.add_frame(move |_, _, _| {
            l.borrow_mut().push("frame".into());
            Ok(())
        });
        let l = Rc::clone(&log);
        callbacks.add_program(move |_, program, _, _, _| {
            l.borrow_mut().push(format!("program {}", program.0));
            Ok(())
        });
        let l = Rc::clone(&log);
        callbacks.add_geometry(move |geometry, _, _| {
            l.borrow_mut().push(format!("geometry {}", geometry.name()));
            Ok(())
        });
        log
    }

    #[test]
    fn test_single_screen_pass_scenario() {
        let mut pipeline = pipeline();
        let program = ProgramHandle(100);
        pipeline.add_shader_program("p", program);
        pipeline.scene_mut().add_geometry(TestGeometry::new("a", program, 1));
        pipeline.scene_mut().add_geometry(TestGeometry::new("b", program, 2));
        pipeline.add_pass(RenderPass::scene());
        let log = trace_callbacks(&mut pipeline);

        pipeline.render_frame().unwrap();

        let device = pipeline.device();
        assert_eq!(device.count(|c| matches!(c, GpuCommand::Clear(_))), 1);
        assert_eq!(
            device.count(|c| matches!(c, GpuCommand::UseProgram(p) if *p == program)),
            1
        );
        assert_eq!(
            *log.borrow(),
            ["global", "frame", "program 100", "geometry a", "geometry b"]
        );

        // Per-geometry callback, then its draw, in scene order.
        let draws: Vec<_> = device
            .commands()
            .iter()
            .filter_map(|c| match c {
                GpuCommand::DrawMesh(mesh) => Some(mesh.0),
                _ => None,
            })
            .collect();
        assert_eq!(draws, [1, 2]);
    }

    #[test]
    fn test_callback_precedes_its_draw() {
        let mut pipeline = pipeline();
        let program = ProgramHandle(100);
        pipeline.add_shader_program("p", program);
        pipeline.scene_mut().add_geometry(TestGeometry::new("a", program, 1));
        pipeline.scene_mut().add_geometry(TestGeometry::new("b", program, 2));
        pipeline.add_pass(RenderPass::scene());
        pipeline.callbacks_mut().add_geometry(|geometry, states, device| {
            let location = states.cache_location(device, ProgramHandle(100), "model");
            assert!(location.is_some());
            states.set(device, "model", UniformValue::Mat4(geometry.transform()))
        });

        pipeline.render_frame().unwrap();

        let sequence: Vec<_> = pipeline
            .device()
            .commands()
            .iter()
            .filter(|c| matches!(c, GpuCommand::SetUniform { .. } | GpuCommand::DrawMesh(_)))
            .map(|c| matches!(c, GpuCommand::DrawMesh(_)))
            .collect();
        assert_eq!(sequence, [false, true, false, true]);
    }

    #[test]
    fn test_shared_target_clears_once() {
        let mut pipeline = pipeline();
        let program = ProgramHandle(100);
        pipeline.scene_mut().add_geometry(TestGeometry::new("a", program, 1));

        let first = offscreen_pass(&mut pipeline);
        let target = first.target();
        let channels = first.channels();
        pipeline.add_pass(first);

        // Second pass renders into the same framebuffer without owning it.
        let mut second = RenderPass::scene_with_program(program).targeting(target, (64, 64));
        second.set_channels(channels);
        pipeline.add_pass(second);
        assert_eq!(pipeline.registry().len(), 1);

        pipeline.device_mut().take_commands();
        pipeline.render_frame().unwrap();

        let clears_on: Vec<_> = clears_per_target(pipeline.device().commands());
        assert_eq!(clears_on, [(target, true), (target, false)]);

        // Tracking is per frame.
        pipeline.device_mut().take_commands();
        pipeline.render_frame().unwrap();
        assert_eq!(
            clears_per_target(pipeline.device().commands()),
            [(target, true), (target, false)]
        );
    }

    /// For every framebuffer bind issued by a pass, whether a clear followed
    /// before the next bind.
    fn clears_per_target(commands: &[GpuCommand]) -> Vec<(FramebufferHandle, bool)> {
        let mut out: Vec<(FramebufferHandle, bool)> = Vec::new();
        for command in commands {
            match command {
                GpuCommand::BindFramebuffer(fb) => out.push((*fb, false)),
                GpuCommand::Clear(_) => {
                    if let Some(last) = out.last_mut() {
                        last.1 = true;
                    }
                }
                _ => {}
            }
        }
        // The trailing reset bind is not a pass.
        out.pop();
        out
    }

    #[test]
    fn test_screen_target_is_tracked() {
        let mut pipeline = pipeline();
        pipeline.add_pass(RenderPass::scene());
        pipeline.add_pass(RenderPass::scene());
        pipeline.render_frame().unwrap();
        assert_eq!(
            pipeline.device().count(|c| matches!(c, GpuCommand::Clear(_))),
            1
        );
    }

    #[test]
    fn test_global_callbacks_run_once() {
        let mut pipeline = pipeline();
        let log = trace_callbacks(&mut pipeline);
        pipeline.render_frame().unwrap();
        pipeline.render_frame().unwrap();
        pipeline.initialize().unwrap();
        let globals = log.borrow().iter().filter(|s| *s == "global").count();
        let frames = log.borrow().iter().filter(|s| *s == "frame").count();
        assert_eq!((globals, frames), (1, 2));
        assert_eq!(pipeline.frame_count(), 2);
    }

    #[test]
    fn test_callback_error_resets_bindings() {
        let mut pipeline = pipeline();
        let program = ProgramHandle(100);
        pipeline.scene_mut().add_geometry(TestGeometry::new("a", program, 1));
        let pass = offscreen_pass(&mut pipeline);
        pipeline.add_pass(pass);
        pipeline
            .callbacks_mut()
            .add_geometry(|_, _, _| Err(CallbackError::MissingCamera));

        let err = pipeline.render_frame().unwrap_err();
        assert!(matches!(err, RenderError::Callback(CallbackError::MissingCamera)));
        assert_eq!(pipeline.device().bound_program(), ProgramHandle::NULL);
        assert_eq!(pipeline.device().bound_framebuffer(), FramebufferHandle::SCREEN);
        assert_eq!(pipeline.frame_count(), 0);
        // Program state cache survives the failed frame.
        assert!(pipeline.states().program_states(program).is_some());
    }

    #[test]
    fn test_registry_follows_declaration_order() {
        let mut pipeline = pipeline();
        pipeline.add_pass(RenderPass::scene());
        let first = offscreen_pass(&mut pipeline);
        let first_color = first.attachments().get(AttachmentSlot::Color(0));
        pipeline.add_pass(first);

        assert_eq!(
            pipeline.resolve_texture("fbo0.color0"),
            first_color.and_then(FboAttachment::texture)
        );
        assert_eq!(pipeline.resolve_texture("fbo1.color0"), None);

        let second = offscreen_pass(&mut pipeline);
        let second_color = second.attachments().get(AttachmentSlot::Color(0));
        pipeline.add_pass(second);
        assert_eq!(
            pipeline.resolve_texture("fbo1.color0"),
            second_color.and_then(FboAttachment::texture)
        );
        assert_eq!(pipeline.resolve_texture("fbo0.depth"), None);
        assert_eq!(pipeline.resolve_texture("fbo0.albedo"), None);
    }

    #[test]
    fn test_blit_pass() {
        let mut pipeline = pipeline();
        let pass = offscreen_pass(&mut pipeline);
        pipeline.add_pass(pass);
        let source = pipeline.resolve_texture("fbo0.color0").unwrap();
        let quad = pipeline.screen_quad().unwrap();
        pipeline.add_pass(RenderPass::blit(ProgramHandle(7), source, quad));
        let log = trace_callbacks(&mut pipeline);

        pipeline.device_mut().take_commands();
        pipeline.render_frame().unwrap();

        let commands = pipeline.device().commands();
        let blit_start = commands
            .iter()
            .rposition(|c| *c == GpuCommand::BindFramebuffer(FramebufferHandle::SCREEN))
            .map(|i| {
                // Skip the trailing reset bind.
                commands[..i]
                    .iter()
                    .rposition(|c| *c == GpuCommand::BindFramebuffer(FramebufferHandle::SCREEN))
                    .unwrap_or(i)
            })
            .unwrap();
        let blit = &commands[blit_start..];
        assert!(blit.contains(&GpuCommand::Clear(BufferChannels::COLOR)));
        assert!(blit.contains(&GpuCommand::DepthTest(false)));
        assert!(blit.contains(&GpuCommand::UseProgram(ProgramHandle(7))));
        assert!(blit.contains(&GpuCommand::BindTexture {
            unit: 0,
            texture: source
        }));
        assert!(blit.contains(&GpuCommand::DrawMesh(quad)));
        // Only the offscreen pass has draw groups; the scene is empty.
        assert!(!log.borrow().iter().any(|s| s.starts_with("program")));
    }

    #[test]
    fn test_converted_blit_does_not_clear_screen_twice() {
        let mut pipeline = pipeline();
        pipeline
            .scene_mut()
            .add_geometry(TestGeometry::new("a", ProgramHandle(100), 1));
        pipeline.add_pass(RenderPass::scene());

        let source = pipeline
            .create_attachment(AttachmentKind::Texture, AttachmentFormat::Rgba8, 64, 64)
            .unwrap()
            .texture()
            .unwrap();
        let quad = pipeline.screen_quad().unwrap();
        let mut display = offscreen_pass(&mut pipeline);
        display.set_display_image(source, quad);
        assert!(display.owns_framebuffer());
        assert_eq!(display.draw_target(), FramebufferHandle::SCREEN);
        pipeline.add_pass(display);

        pipeline.device_mut().take_commands();
        pipeline.render_frame().unwrap();

        let clears = pipeline
            .device()
            .count(|c| matches!(c, GpuCommand::Clear(_)));
        assert_eq!(clears, 1);
        assert!(
            pipeline
                .device()
                .commands()
                .contains(&GpuCommand::DrawMesh(quad))
        );
    }

    #[test]
    fn test_failed_initialize_resets_bindings() {
        let mut pipeline = pipeline();
        pipeline.add_pass(RenderPass::scene());
        pipeline.callbacks_mut().add_global(|_, _, device| {
            device.use_program(ProgramHandle(5));
            device.bind_framebuffer(FramebufferHandle(3));
            Err(CallbackError::Custom("no lights".into()))
        });

        let err = pipeline.render_frame().unwrap_err();
        assert!(matches!(err, RenderError::Callback(CallbackError::Custom(_))));
        assert_eq!(pipeline.device().bound_program(), ProgramHandle::NULL);
        assert_eq!(pipeline.device().bound_framebuffer(), FramebufferHandle::SCREEN);
        assert_eq!(pipeline.frame_count(), 0);

        // Global callbacks are not retried; the next frame draws.
        assert!(pipeline.is_initialized());
        pipeline.render_frame().unwrap();
        assert_eq!(pipeline.frame_count(), 1);
    }

    #[test]
    fn test_zero_size_resize_keeps_camera_finite() {
        let mut pipeline = pipeline();
        pipeline.scene_mut().set_camera(TrackballCamera::new(800, 600));
        pipeline.resize(0, 0);
        assert_eq!(pipeline.viewport(), (0, 0));

        let camera = pipeline.camera_mut().unwrap();
        assert!(camera.projection_matrix().is_finite());
        camera.begin_drag();
        camera.drag(0.0, 0.0);
        camera.drag(1.0, 1.0);
        assert!(camera.position().is_finite());
    }

    #[test]
    fn test_resize_updates_camera() {
        let mut pipeline = pipeline();
        pipeline.scene_mut().set_camera(TrackballCamera::new(800, 600));
        let view = pipeline.camera_mut().unwrap().view_matrix();
        pipeline.resize(1024, 512);
        assert_eq!(pipeline.viewport(), (1024, 512));
        let camera = pipeline.camera_mut().unwrap();
        assert!((camera.aspect_ratio() - 2.0).abs() < 1e-6);
        assert_eq!(camera.view_matrix(), view);
        assert!(
            pipeline
                .device()
                .commands()
                .contains(&GpuCommand::Viewport(1024, 512))
        );
    }

    #[test]
    fn test_release_frees_everything() {
        let mut pipeline = pipeline();
        let pass = offscreen_pass(&mut pipeline);
        pipeline.add_pass(pass);
        pipeline.screen_quad().unwrap();
        pipeline.callbacks_mut().add_global(|_, states, device| {
            let buffer = device
                .create_uniform_buffer(128)
                .map_err(|e| CallbackError::Custom(e.to_string()))?;
            states.uniform_buffers.push(buffer);
            Ok(())
        });
        pipeline.render_frame().unwrap();
        assert!(pipeline.device().live_objects() > 0);

        pipeline.release();
        assert_eq!(pipeline.device().live_objects(), 0);
        assert!(pipeline.registry().is_empty());
    }
}
