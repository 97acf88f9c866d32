//! Trackball orbit camera.

use std::f32::consts::{FRAC_PI_4, PI};

use glam::{Mat4, Vec3};

use crate::trackball::{map_to_trackball, rotation_between};

/// Keys the camera reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraKey {
    Left,
    Right,
    Forward,
    Backward,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum DragState {
    Idle,
    /// Rotating; holds the previous trackball sample once one exists.
    Rotating { last: Option<Vec3> },
}

/// A camera orbiting the world origin at a fixed radius.
///
/// View and projection matrices are recomputed eagerly, so the accessors are
/// plain reads.
#[derive(Debug, Clone)]
pub struct TrackballCamera {
    width: u32,
    height: u32,
    radius: f32,
    fov_y: f32,
    position: Vec3,
    up: Vec3,
    view: Mat4,
    projection: Mat4,
    drag: DragState,
}

impl TrackballCamera {
    pub const NEAR: f32 = 0.1;
    pub const FAR: f32 = 1000.0;
    pub const DEFAULT_FOV: f32 = FRAC_PI_4;
    pub const MIN_FOV: f32 = 0.3;
    pub const MAX_FOV: f32 = PI;

    /// A camera for a `width` x `height` viewport, one unit in front of the
    /// origin along +z. Call [`look_at`](Self::look_at) to place it.
    pub fn new(width: u32, height: u32) -> Self {
        let mut camera = Self {
            width: width.max(1),
            height: height.max(1),
            radius: 1.0,
            fov_y: Self::DEFAULT_FOV,
            position: Vec3::Z,
            up: Vec3::Y,
            view: Mat4::look_at_rh(Vec3::Z, Vec3::ZERO, Vec3::Y),
            projection: Mat4::IDENTITY,
            drag: DragState::Idle,
        };
        camera.update_projection();
        camera
    }

    /// Place the camera. The orbit radius becomes the distance to `focus`.
    pub fn look_at(&mut self, position: Vec3, focus: Vec3, up: Vec3) {
        self.position = position;
        self.up = up;
        self.view = Mat4::look_at_rh(position, focus, up);
        self.radius = (position - focus).length();
    }

    pub fn begin_drag(&mut self) {
        self.drag = DragState::Rotating { last: None };
    }

    /// Feed a pointer position in window pixels. Ignored unless dragging.
    pub fn drag(&mut self, x: f32, y: f32) {
        let DragState::Rotating { last } = &mut self.drag else {
            return;
        };

        let current = map_to_trackball(x, y, self.width as f32, self.height as f32);
        let Some(previous) = last.replace(current) else {
            // First sample only anchors the drag.
            return;
        };

        let rotation = rotation_between(previous, current);
        self.position = (rotation * self.position).normalize() * self.radius;
        self.up = rotation * self.up;
        self.view = Mat4::look_at_rh(self.position, Vec3::ZERO, self.up);
    }

    pub fn end_drag(&mut self) {
        self.drag = DragState::Idle;
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self.drag, DragState::Rotating { .. })
    }

    /// Narrow (positive `delta`) or widen the field of view.
    pub fn zoom(&mut self, delta: f32) {
        self.fov_y = (self.fov_y - delta / 10.0).clamp(Self::MIN_FOV, Self::MAX_FOV);
        self.update_projection();
    }

    /// Track a new viewport size. The view matrix is untouched. Both sides
    /// are clamped to at least one pixel.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.width = width.max(1);
        self.height = height.max(1);
        self.update_projection();
    }

    // Translation is not wired up yet; the orbit always centres on the origin.
    pub fn pan_left(&mut self) {
        log::trace!("camera pan left ignored");
    }

    pub fn pan_right(&mut self) {
        log::trace!("camera pan right ignored");
    }

    pub fn pan_forward(&mut self) {
        log::trace!("camera pan forward ignored");
    }

    pub fn pan_backward(&mut self) {
        log::trace!("camera pan backward ignored");
    }

    pub fn on_key(&mut self, key: CameraKey) {
        match key {
            CameraKey::Left => self.pan_left(),
            CameraKey::Right => self.pan_right(),
            CameraKey::Forward => self.pan_forward(),
            CameraKey::Backward => self.pan_backward(),
        }
    }

    pub fn view_matrix(&self) -> Mat4 {
        self.view
    }

    pub fn projection_matrix(&self) -> Mat4 {
        self.projection
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn up(&self) -> Vec3 {
        self.up
    }

    pub fn fov_y(&self) -> f32 {
        self.fov_y
    }

    pub fn radius(&self) -> f32 {
        self.radius
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.width as f32 / self.height as f32
    }

    fn update_projection(&mut self) {
        self.projection =
            Mat4::perspective_rh_gl(self.fov_y, self.aspect_ratio(), Self::NEAR, Self::FAR);
    }
}
