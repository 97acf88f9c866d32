//! Unlit callbacks: `model`, `view` and `projection` as plain uniforms.

use gfxlab_render::{
    CallbackError, CallbackLibrary, CallbackSymbol, Geometry, ProgramHandle, ProgramRenderStates,
    RenderDevice, RenderStates, Scene, UniformValue,
};

const MATRIX_UNIFORMS: [&str; 3] = ["model", "view", "projection"];

pub fn library() -> CallbackLibrary {
    CallbackLibrary::new("nolight")
        .with("set_global_states", CallbackSymbol::Global(set_global_states))
        .with("set_per_program_states", CallbackSymbol::Program(set_per_program_states))
        .with("set_per_geometry_states", CallbackSymbol::Geometry(set_per_geometry_states))
}

/// Look up the matrix uniforms of every registered program.
pub fn set_global_states(
    _scene: &Scene,
    states: &mut RenderStates,
    device: &mut dyn RenderDevice,
) -> Result<(), CallbackError> {
    let programs: Vec<ProgramHandle> = states.programs().map(|(_, program)| program).collect();
    for program in programs {
        let cache = states.program_states_mut(program);
        for name in MATRIX_UNIFORMS {
            cache.cache_location(device, program, name);
        }
    }
    Ok(())
}

pub fn set_per_program_states(
    scene: &Scene,
    _program: ProgramHandle,
    _states: &RenderStates,
    cache: &mut ProgramRenderStates,
    device: &mut dyn RenderDevice,
) -> Result<(), CallbackError> {
    let camera = scene.camera().ok_or(CallbackError::MissingCamera)?;
    cache.set(device, "view", UniformValue::Mat4(camera.view_matrix()))?;
    cache.set(device, "projection", UniformValue::Mat4(camera.projection_matrix()))
}

pub fn set_per_geometry_states(
    geometry: &dyn Geometry,
    cache: &mut ProgramRenderStates,
    device: &mut dyn RenderDevice,
) -> Result<(), CallbackError> {
    cache.set(device, "model", UniformValue::Mat4(geometry.transform()))
}
