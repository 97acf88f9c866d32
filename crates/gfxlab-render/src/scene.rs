//! Scene contents consumed by the pipeline: geometry, lights and the camera.

use std::fmt;
use std::rc::Rc;

use glam::{Mat4, Vec3};

use gfxlab_camera::TrackballCamera;

use crate::device::RenderDevice;
use crate::handles::ProgramHandle;
use crate::material::Material;

/// Something a pass can draw.
pub trait Geometry {
    fn name(&self) -> &str;
    /// Program the geometry is drawn with when a pass does not override it.
    fn shader_program(&self) -> ProgramHandle;
    fn transform(&self) -> Mat4;
    fn uses_texture(&self) -> bool;
    fn material(&self) -> Material {
        Material::default()
    }
    /// Opacity in 0..=1.
    fn transparency(&self) -> f32 {
        1.0
    }
    /// Issue the draw. The pass has already bound the program and run the
    /// per-geometry callbacks.
    fn draw(&self, device: &mut dyn RenderDevice);
}

impl fmt::Debug for dyn Geometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Geometry")
            .field("name", &self.name())
            .field("program", &self.shader_program())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightKind {
    Point,
    Directional,
}

/// A point or directional light with Phong terms and distance attenuation.
#[derive(Debug, Clone, PartialEq)]
pub struct Light {
    pub kind: LightKind,
    pub position: Vec3,
    pub direction: Vec3,
    pub ambient: Vec3,
    pub diffuse: Vec3,
    pub specular: Vec3,
    pub constant: f32,
    pub linear: f32,
    pub quadratic: f32,
}

impl Default for Light {
    fn default() -> Self {
        Self {
            kind: LightKind::Point,
            position: Vec3::ZERO,
            direction: Vec3::NEG_Z,
            ambient: Vec3::splat(0.2),
            diffuse: Vec3::splat(0.5),
            specular: Vec3::ONE,
            constant: 1.0,
            linear: 0.09,
            quadratic: 0.032,
        }
    }
}

impl Light {
    pub fn point(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    pub fn directional(direction: Vec3) -> Self {
        Self {
            kind: LightKind::Directional,
            direction,
            ..Default::default()
        }
    }
}

/// Camera, lights and geometry. Not mutated while a frame is drawn.
#[derive(Debug, Default)]
pub struct Scene {
    camera: Option<TrackballCamera>,
    geometries: Vec<Rc<dyn Geometry>>,
    lights: Vec<Light>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_camera(&mut self, camera: TrackballCamera) {
        self.camera = Some(camera);
    }

    pub fn camera(&self) -> Option<&TrackballCamera> {
        self.camera.as_ref()
    }

    pub fn camera_mut(&mut self) -> Option<&mut TrackballCamera> {
        self.camera.as_mut()
    }

    pub fn add_geometry(&mut self, geometry: impl Geometry + 'static) -> Rc<dyn Geometry> {
        let geometry: Rc<dyn Geometry> = Rc::new(geometry);
        self.geometries.push(Rc::clone(&geometry));
        geometry
    }

    pub fn geometries(&self) -> &[Rc<dyn Geometry>] {
        &self.geometries
    }

    /// First geometry with the given name.
    pub fn geometry(&self, name: &str) -> Option<&Rc<dyn Geometry>> {
        self.geometries.iter().find(|g| g.name() == name)
    }

    pub fn add_light(&mut self, light: Light) {
        self.lights.push(light);
    }

    pub fn lights(&self) -> &[Light] {
        &self.lights
    }
}
