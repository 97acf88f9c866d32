//! Pipeline assembly shared by the windowed and headless runs.

use std::error::Error;

use gfxlab_config::{Config, PipelineDesc};
use gfxlab_render::{ProgramHandle, RenderDevice, RenderPass, RenderPipeline, build_pipeline};

use crate::scene;

/// Program the demo geometry is drawn with when the description defines it.
const MAIN_PROGRAM: &str = "lighting";

/// Fill the scene, build `desc` and bind the configured callback library.
pub fn assemble<D: RenderDevice>(
    pipeline: &mut RenderPipeline<D>,
    config: &Config,
    desc: &PipelineDesc,
) -> Result<(), Box<dyn Error>> {
    // Programs first, so the demo geometry can reference them by handle.
    let mut main_program = ProgramHandle::NULL;
    for program in &desc.programs {
        let handle = pipeline.create_program(&program.name, &program.shaders)?;
        if main_program.is_null() || program.name == MAIN_PROGRAM {
            main_program = handle;
        }
    }
    let viewport = pipeline.viewport();
    let (device, resources, scene) = pipeline.parts_mut();
    scene::populate(scene, device, resources, main_program, viewport)?;

    if desc.passes.is_empty() {
        pipeline.add_pass(RenderPass::scene());
    }
    build_pipeline(pipeline, desc)?;

    if let Some(name) = &config.callbacks.library {
        match gfxlab_statecbs::library(name) {
            Some(library) => {
                pipeline.bind_callbacks(&library, &config.callbacks);
            }
            None => log::warn!("Unknown state-callback library '{name}'"),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use gfxlab_render::{GpuCommand, HeadlessDevice};

    #[test]
    fn test_empty_description_draws_scene_to_window() {
        let config = Config::default();
        let mut pipeline = RenderPipeline::from_config(HeadlessDevice::new(), &config);

        assemble(&mut pipeline, &config, &PipelineDesc::default()).unwrap();
        assert_eq!(pipeline.passes().len(), 1);
        assert_eq!(pipeline.scene().geometries().len(), 2);
        assert!(pipeline.scene().camera().is_some());

        pipeline.render_frame().unwrap();
        let device = pipeline.device();
        assert_eq!(device.count(|c| matches!(c, GpuCommand::DrawMesh(_))), 2);
    }

    #[test]
    fn test_unknown_library_is_not_fatal() {
        let mut config = Config::default();
        config.callbacks.library = Some("phong".to_string());
        let mut pipeline = RenderPipeline::from_config(HeadlessDevice::new(), &config);
        assert!(assemble(&mut pipeline, &config, &PipelineDesc::default()).is_ok());
    }
}
