//! Phong lighting callbacks.
//!
//! Lights are uploaded once to the program registered as `lighting`. Camera
//! matrices live in a uniform buffer bound to the `Matrices` block of every
//! program at binding 0, rewritten each frame.

use bytemuck::{Pod, Zeroable};

use gfxlab_render::{
    CallbackError, CallbackLibrary, CallbackSymbol, Geometry, Light, LightKind, ProgramHandle,
    ProgramRenderStates, RenderDevice, RenderStates, Scene, UniformValue,
};

/// Name the lit program must be registered under.
pub const LIGHTING_PROGRAM: &str = "lighting";
/// Uniform block holding the camera matrices.
pub const MATRICES_BLOCK: &str = "Matrices";
pub const MATRICES_BINDING: u32 = 0;

/// Layout of the `Matrices` block (std140): projection, then view.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct MatricesUniform {
    pub projection: [f32; 16],
    pub view: [f32; 16],
}

impl MatricesUniform {
    pub const SIZE: usize = size_of::<Self>();
    pub const VIEW_OFFSET: usize = std::mem::offset_of!(Self, view);
}

pub fn library() -> CallbackLibrary {
    CallbackLibrary::new("lighting")
        .with("set_global_states", CallbackSymbol::Global(set_global_states))
        .with("set_per_frame_states", CallbackSymbol::Frame(set_per_frame_states))
        .with("set_per_program_states", CallbackSymbol::Program(set_per_program_states))
        .with("set_per_geometry_states", CallbackSymbol::Geometry(set_per_geometry_states))
}

/// Upload the scene lights and create the matrices buffer.
pub fn set_global_states(
    scene: &Scene,
    states: &mut RenderStates,
    device: &mut dyn RenderDevice,
) -> Result<(), CallbackError> {
    init_lights(scene, states, device)?;
    init_uniform_buffers(states, device)
}

fn init_lights(
    scene: &Scene,
    states: &mut RenderStates,
    device: &mut dyn RenderDevice,
) -> Result<(), CallbackError> {
    let program = states
        .program(LIGHTING_PROGRAM)
        .ok_or_else(|| CallbackError::MissingProgram {
            name: LIGHTING_PROGRAM.to_string(),
        })?;
    let cache = states.program_states_mut(program);

    let (points, directionals): (Vec<&Light>, Vec<&Light>) = scene
        .lights()
        .iter()
        .partition(|light| light.kind == LightKind::Point);

    let mut uniforms = Vec::new();
    for (i, light) in points.iter().enumerate() {
        let prefix = format!("pointLights[{i}]");
        uniforms.push((format!("{prefix}.position"), UniformValue::Vec3(light.position)));
        uniforms.extend(phong_terms(&prefix, light));
        uniforms.push((format!("{prefix}.constant"), UniformValue::Float(light.constant)));
        uniforms.push((format!("{prefix}.linear"), UniformValue::Float(light.linear)));
        uniforms.push((format!("{prefix}.quadratic"), UniformValue::Float(light.quadratic)));
    }
    for (i, light) in directionals.iter().enumerate() {
        let prefix = format!("dirLights[{i}]");
        uniforms.push((format!("{prefix}.direction"), UniformValue::Vec3(light.direction)));
        uniforms.extend(phong_terms(&prefix, light));
    }
    uniforms.push(("numPointLights".to_string(), UniformValue::Int(points.len() as i32)));
    uniforms.push(("numDirLights".to_string(), UniformValue::Int(directionals.len() as i32)));

    // Written once, so cache and set in one go.
    device.use_program(program);
    let result = uniforms.iter().try_for_each(|(name, value)| {
        cache.cache_location(device, program, name);
        cache.set(device, name, *value)
    });
    device.use_program(ProgramHandle::NULL);
    result?;

    log::debug!(
        "uploaded {} point and {} directional light(s)",
        points.len(),
        directionals.len()
    );
    Ok(())
}

fn phong_terms(prefix: &str, light: &Light) -> [(String, UniformValue); 3] {
    [
        (format!("{prefix}.ambient"), UniformValue::Vec3(light.ambient)),
        (format!("{prefix}.diffuse"), UniformValue::Vec3(light.diffuse)),
        (format!("{prefix}.specular"), UniformValue::Vec3(light.specular)),
    ]
}

fn init_uniform_buffers(
    states: &mut RenderStates,
    device: &mut dyn RenderDevice,
) -> Result<(), CallbackError> {
    let programs: Vec<(String, ProgramHandle)> = states
        .programs()
        .map(|(name, program)| (name.to_string(), program))
        .collect();
    for (name, program) in programs {
        if !device.bind_uniform_block(program, MATRICES_BLOCK, MATRICES_BINDING) {
            log::debug!("program '{name}' has no {MATRICES_BLOCK} block");
        }
    }

    let buffer = device
        .create_uniform_buffer(MatricesUniform::SIZE)
        .map_err(|e| CallbackError::Custom(e.to_string()))?;
    device.bind_uniform_buffer(MATRICES_BINDING, buffer);
    states.uniform_buffers.push(buffer);
    Ok(())
}

/// Write the camera's projection and view into the matrices buffer.
pub fn set_per_frame_states(
    scene: &Scene,
    states: &mut RenderStates,
    device: &mut dyn RenderDevice,
) -> Result<(), CallbackError> {
    let camera = scene.camera().ok_or(CallbackError::MissingCamera)?;
    let buffer = states.uniform_buffer(0)?;
    let matrices = MatricesUniform {
        projection: camera.projection_matrix().to_cols_array(),
        view: camera.view_matrix().to_cols_array(),
    };
    device.write_uniform_buffer(buffer, 0, bytemuck::bytes_of(&matrices));
    Ok(())
}

/// On the lighting program: cache the per-object uniforms and set `viewPos`.
pub fn set_per_program_states(
    scene: &Scene,
    program: ProgramHandle,
    states: &RenderStates,
    cache: &mut ProgramRenderStates,
    device: &mut dyn RenderDevice,
) -> Result<(), CallbackError> {
    if states.program_name(program) != Some(LIGHTING_PROGRAM) {
        return Ok(());
    }
    for name in ["objectColor", "model", "viewPos", "useTexture"] {
        cache.cache_location(device, program, name);
    }
    let camera = scene.camera().ok_or(CallbackError::MissingCamera)?;
    cache.set(device, "viewPos", UniformValue::Vec3(camera.position()))
}

/// Set `model`, `objectColor` and `useTexture` for geometry drawn with the
/// lighting program. The object colour is the material's diffuse term.
pub fn set_per_geometry_states(
    geometry: &dyn Geometry,
    cache: &mut ProgramRenderStates,
    device: &mut dyn RenderDevice,
) -> Result<(), CallbackError> {
    if !cache.is_cached("useTexture") {
        return Ok(());
    }
    cache.set(device, "model", UniformValue::Mat4(geometry.transform()))?;
    cache.set(
        device,
        "objectColor",
        UniformValue::Vec3(geometry.material().diffuse),
    )?;
    cache.set(
        device,
        "useTexture",
        UniformValue::Int(i32::from(geometry.uses_texture())),
    )
}
