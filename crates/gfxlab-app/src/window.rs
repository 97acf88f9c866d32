//! Windowed run: a winit window with an OpenGL 3.3 core context driving
//! [`GlDevice`].
//!
//! The pipeline is assembled once the event loop hands out the first
//! `resumed`, and redrawn continuously until the window closes. The left
//! mouse button rotates the trackball, the wheel zooms and WASD reach the
//! camera's pan keys.

use std::error::Error;
use std::ffi::CString;
use std::num::NonZeroU32;

use glutin::config::{ConfigTemplateBuilder, GlConfig};
use glutin::context::{
    ContextApi, ContextAttributesBuilder, GlProfile, NotCurrentGlContext, PossiblyCurrentContext,
    Version,
};
use glutin::display::{Display, DisplayApiPreference, GlDisplay};
use glutin::surface::{GlSurface, Surface, SurfaceAttributesBuilder, SwapInterval, WindowSurface};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle, RawWindowHandle};
use winit::application::ApplicationHandler;
use winit::dpi::{LogicalSize, PhysicalSize};
use winit::event::{ElementState, KeyEvent, MouseButton, MouseScrollDelta, WindowEvent};
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowAttributes, WindowId};

use gfxlab_camera::CameraKey;
use gfxlab_config::{Config, PipelineDesc};
use gfxlab_render::{GlDevice, RenderPipeline};

use crate::setup;

/// Pixel scroll distance counted as one wheel notch.
const PIXELS_PER_LINE: f64 = 20.0;

/// Open the window and render until it is closed.
pub fn run(config: Config, desc: PipelineDesc) -> Result<(), Box<dyn Error>> {
    let event_loop = EventLoop::new()?;
    let mut app = ViewerApp {
        config,
        desc,
        viewer: None,
        error: None,
    };
    event_loop.run_app(&mut app)?;
    app.error.map_or(Ok(()), Err)
}

fn window_attributes(config: &Config) -> WindowAttributes {
    WindowAttributes::default()
        .with_title(config.window.title.clone())
        .with_inner_size(LogicalSize::new(
            f64::from(config.window.width),
            f64::from(config.window.height),
        ))
}

/// Native GL API per platform. Windows needs the window up front for WGL.
fn api_preference(window: RawWindowHandle) -> DisplayApiPreference {
    #[cfg(target_os = "windows")]
    {
        DisplayApiPreference::Wgl(Some(window))
    }
    #[cfg(target_os = "macos")]
    {
        let _ = window;
        DisplayApiPreference::Cgl
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        let _ = window;
        DisplayApiPreference::Egl
    }
}

fn non_zero(pixels: u32) -> NonZeroU32 {
    NonZeroU32::new(pixels).unwrap_or(NonZeroU32::MIN)
}

/// Map a physical key to the camera's pan keys.
pub fn camera_key(code: KeyCode) -> Option<CameraKey> {
    match code {
        KeyCode::KeyA => Some(CameraKey::Left),
        KeyCode::KeyD => Some(CameraKey::Right),
        KeyCode::KeyW => Some(CameraKey::Forward),
        KeyCode::KeyS => Some(CameraKey::Backward),
        _ => None,
    }
}

/// Wheel movement in notches, positive away from the user.
pub fn scroll_lines(delta: MouseScrollDelta) -> f32 {
    match delta {
        MouseScrollDelta::LineDelta(_, y) => y,
        MouseScrollDelta::PixelDelta(position) => (position.y / PIXELS_PER_LINE) as f32,
    }
}

/// Window, GL context and the pipeline drawing into it.
///
/// Fields drop in declaration order, so the pipeline releases its GL objects
/// while the context is still current.
struct Viewer {
    pipeline: RenderPipeline<GlDevice>,
    surface: Surface<WindowSurface>,
    context: PossiblyCurrentContext,
    window: Window,
}

impl Viewer {
    fn new(
        event_loop: &ActiveEventLoop,
        config: &Config,
        desc: &PipelineDesc,
    ) -> Result<Self, Box<dyn Error>> {
        let window = event_loop.create_window(window_attributes(config))?;
        let raw_window = window.window_handle()?.as_raw();
        let raw_display = window.display_handle()?.as_raw();

        // SAFETY: both handles come from `window`, which outlives the display.
        let gl_display = unsafe { Display::new(raw_display, api_preference(raw_window))? };
        let template = ConfigTemplateBuilder::new()
            .with_depth_size(24)
            .with_stencil_size(8)
            .compatible_with_native_window(raw_window)
            .build();
        // SAFETY: as above.
        let gl_config = unsafe { gl_display.find_configs(template)? }
            .reduce(|best, c| {
                if c.num_samples() > best.num_samples() {
                    c
                } else {
                    best
                }
            })
            .ok_or("no GL config matches the window")?;

        let context_attributes = ContextAttributesBuilder::new()
            .with_profile(GlProfile::Core)
            .with_context_api(ContextApi::OpenGl(Some(Version::new(3, 3))))
            .build(Some(raw_window));
        // SAFETY: the raw handle belongs to `window`, which outlives the context.
        let context = unsafe { gl_display.create_context(&gl_config, &context_attributes)? };

        let size = window.inner_size();
        let surface_attributes = SurfaceAttributesBuilder::<WindowSurface>::new().build(
            raw_window,
            non_zero(size.width),
            non_zero(size.height),
        );
        // SAFETY: as above, the surface never outlives `window`.
        let surface = unsafe { gl_display.create_window_surface(&gl_config, &surface_attributes)? };
        let context = context.make_current(&surface)?;
        if let Err(e) = surface.set_swap_interval(&context, SwapInterval::Wait(NonZeroU32::MIN)) {
            log::warn!("vsync unavailable: {e}");
        }

        // SAFETY: the context was made current on this thread above.
        let gl = unsafe {
            glow::Context::from_loader_function(|name| {
                CString::new(name).map_or(std::ptr::null(), |name| {
                    gl_display.get_proc_address(name.as_c_str())
                })
            })
        };

        let mut pipeline = RenderPipeline::from_config(GlDevice::new(gl), config);
        pipeline.resize(size.width, size.height);
        setup::assemble(&mut pipeline, config, desc)?;

        Ok(Self {
            pipeline,
            surface,
            context,
            window,
        })
    }

    fn resize(&mut self, size: PhysicalSize<u32>) {
        if let (Some(width), Some(height)) =
            (NonZeroU32::new(size.width), NonZeroU32::new(size.height))
        {
            self.surface.resize(&self.context, width, height);
        }
        self.pipeline.resize(size.width, size.height);
        log::debug!("Window resized to {}x{}", size.width, size.height);
    }

    fn redraw(&mut self) -> Result<(), Box<dyn Error>> {
        self.pipeline.render_frame()?;
        self.surface.swap_buffers(&self.context)?;
        Ok(())
    }

    fn on_input(&mut self, event: &WindowEvent) {
        let Some(camera) = self.pipeline.camera_mut() else {
            return;
        };
        match event {
            WindowEvent::CursorMoved { position, .. } => {
                camera.drag(position.x as f32, position.y as f32);
            }
            WindowEvent::MouseInput {
                state,
                button: MouseButton::Left,
                ..
            } => match state {
                ElementState::Pressed => camera.begin_drag(),
                ElementState::Released => camera.end_drag(),
            },
            WindowEvent::MouseWheel { delta, .. } => camera.zoom(scroll_lines(*delta)),
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(code),
                        state: ElementState::Pressed,
                        ..
                    },
                ..
            } => {
                if let Some(key) = camera_key(*code) {
                    camera.on_key(key);
                }
            }
            _ => {}
        }
    }
}

struct ViewerApp {
    config: Config,
    desc: PipelineDesc,
    viewer: Option<Viewer>,
    error: Option<Box<dyn Error>>,
}

impl ViewerApp {
    fn fail(&mut self, event_loop: &ActiveEventLoop, error: Box<dyn Error>) {
        log::error!("{error}");
        self.error = Some(error);
        event_loop.exit();
    }
}

impl ApplicationHandler for ViewerApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.viewer.is_some() || self.error.is_some() {
            return;
        }
        match Viewer::new(event_loop, &self.config, &self.desc) {
            Ok(viewer) => {
                log::info!(
                    "Window open: {} pass(es)",
                    viewer.pipeline.passes().len()
                );
                viewer.window.request_redraw();
                self.viewer = Some(viewer);
            }
            Err(e) => self.fail(event_loop, e),
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        let Some(viewer) = &mut self.viewer else {
            return;
        };
        match event {
            WindowEvent::CloseRequested
            | WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(KeyCode::Escape),
                        state: ElementState::Pressed,
                        ..
                    },
                ..
            } => {
                log::info!("Close requested after {} frame(s)", viewer.pipeline.frame_count());
                event_loop.exit();
            }
            WindowEvent::Resized(size) => viewer.resize(size),
            WindowEvent::RedrawRequested => {
                if let Err(e) = viewer.redraw() {
                    self.fail(event_loop, e);
                }
            }
            other => viewer.on_input(&other),
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(viewer) = &self.viewer {
            viewer.window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        // Free GL objects before the context goes away.
        self.viewer = None;
    }
}
