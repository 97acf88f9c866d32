//! Orbit camera driven by a virtual trackball.
//!
//! [`TrackballCamera`] keeps its view and projection matrices current on every
//! mutation. Pointer drags are mapped onto a unit hemisphere and turned into
//! great-circle rotations by the helpers in [`trackball`].

mod camera;
pub mod trackball;

pub use camera::{CameraKey, TrackballCamera};
pub use trackball::{map_to_trackball, orthogonal_to, rotation_between};
