//! Reference state-callback libraries.
//!
//! Each library exports the four standard symbols (`set_global_states`,
//! `set_per_frame_states`, `set_per_program_states`,
//! `set_per_geometry_states`) and is selected by name from the callback
//! configuration.
//!
//! - [`lighting`]: Phong lights on the `lighting` program, camera matrices in
//!   a `Matrices` uniform buffer.
//! - [`nolight`]: plain `model`/`view`/`projection` uniforms on every program.

pub mod lighting;
pub mod nolight;

use gfxlab_render::CallbackLibrary;

/// Look a library up by the name used in configuration files.
pub fn library(name: &str) -> Option<CallbackLibrary> {
    match name {
        "lighting" => Some(lighting::library()),
        "nolight" => Some(nolight::library()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_lookup() {
        assert_eq!(library("lighting").map(|l| l.len()), Some(4));
        assert_eq!(library("nolight").unwrap().name(), "nolight");
        assert!(library("pbr").is_none());
    }
}
