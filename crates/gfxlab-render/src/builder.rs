//! Assemble a [`RenderPipeline`] from a [`PipelineDesc`].
//!
//! Programs are created and registered first, then passes in declaration
//! order. A pass that owns a framebuffer is added right after its framebuffer
//! is created, so `fbo<N>` names only ever refer to earlier passes.

use std::rc::Rc;

use gfxlab_config::{
    AttachmentDesc, Config, FramebufferDesc, GeometrySelection, PassDesc, PipelineDesc,
};

use crate::attachment::{AttachmentTable, FboAttachment};
use crate::device::{BufferChannels, RenderDevice};
use crate::error::RenderError;
use crate::handles::{ProgramHandle, TextureHandle};
use crate::pass::RenderPass;
use crate::pipeline::RenderPipeline;
use crate::resources::ResourceCache;
use crate::scene::Geometry;

/// Reasons a pipeline description could not be assembled.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("invalid pipeline description: {0}")]
    Invalid(String),

    #[error("pass {pass}: unknown program '{name}'")]
    UnknownProgram { pass: usize, name: String },

    #[error("pass {pass}: scene has no geometry named '{name}'")]
    UnknownGeometry { pass: usize, name: String },

    #[error("pass {pass}: cannot resolve texture '{name}'")]
    UnresolvedTexture { pass: usize, name: String },

    #[error("pass {pass}: blit pass has no program")]
    MissingBlitProgram { pass: usize },

    #[error("failed to build program '{name}': {source}")]
    Program {
        name: String,
        #[source]
        source: RenderError,
    },

    #[error("pass {pass}: {source}")]
    Pass {
        pass: usize,
        #[source]
        source: RenderError,
    },
}

impl<D: RenderDevice> RenderPipeline<D> {
    /// Empty pipeline using the window size, clear colour and asset
    /// directories from `config`.
    pub fn from_config(device: D, config: &Config) -> Self {
        let resources = ResourceCache::new(
            config.render.shader_dir.clone(),
            config.render.texture_dir.clone(),
        );
        let mut pipeline =
            RenderPipeline::new(device, resources, config.window.width, config.window.height);
        pipeline.set_clear_color(config.render.clear_color);
        pipeline
    }
}

/// Create the programs and passes of `desc` on `pipeline`.
///
/// The scene must already hold every geometry a pass names. On error the
/// pipeline keeps whatever was built before the failing step; all of it is
/// still released with the pipeline.
pub fn build_pipeline<D: RenderDevice>(
    pipeline: &mut RenderPipeline<D>,
    desc: &PipelineDesc,
) -> Result<(), BuildError> {
    desc.validate().map_err(BuildError::Invalid)?;

    for program in &desc.programs {
        pipeline
            .create_program(&program.name, &program.shaders)
            .map_err(|source| BuildError::Program {
                name: program.name.clone(),
                source,
            })?;
    }

    for (index, pass_desc) in desc.passes.iter().enumerate() {
        let pass = build_pass(pipeline, index, pass_desc)?;
        pipeline.add_pass(pass);
    }

    log::info!(
        "Built pipeline: {} program(s), {} pass(es), {} framebuffer(s)",
        desc.programs.len(),
        pipeline.passes().len(),
        pipeline.registry().len()
    );
    Ok(())
}

fn build_pass<D: RenderDevice>(
    pipeline: &mut RenderPipeline<D>,
    index: usize,
    desc: &PassDesc,
) -> Result<RenderPass, BuildError> {
    let program = match &desc.program {
        Some(name) => Some(pipeline.states().program(name).ok_or_else(|| {
            BuildError::UnknownProgram {
                pass: index,
                name: name.clone(),
            }
        })?),
        None => None,
    };

    let inputs = desc
        .inputs
        .iter()
        .map(|name| resolve(pipeline, index, name))
        .collect::<Result<Vec<_>, _>>()?;

    let mut pass = if let Some(display) = &desc.display {
        let program = program.ok_or(BuildError::MissingBlitProgram { pass: index })?;
        let source = resolve(pipeline, index, display)?;
        let quad = pipeline
            .screen_quad()
            .map_err(|source| BuildError::Pass { pass: index, source })?;
        RenderPass::blit(program, source, quad)
    } else {
        select_geometry(pipeline, index, desc, program)?
    };
    pass.set_input_textures(inputs);
    if let Some(channels) = desc.channels {
        pass.set_channels(BufferChannels::from(channels));
    }

    if let Some(framebuffer) = &desc.framebuffer {
        let size = framebuffer.size.unwrap_or(pipeline.viewport());
        let table = create_attachments(pipeline, framebuffer, size)
            .map_err(|source| BuildError::Pass { pass: index, source })?;
        pipeline
            .with_device(|device| pass.create_framebuffer(device, size, table))
            .map_err(|source| BuildError::Pass { pass: index, source })?;
    }
    Ok(pass)
}

fn select_geometry<D: RenderDevice>(
    pipeline: &RenderPipeline<D>,
    index: usize,
    desc: &PassDesc,
    program: Option<ProgramHandle>,
) -> Result<RenderPass, BuildError> {
    let names = match &desc.geometries {
        GeometrySelection::Scene => {
            return Ok(match program {
                Some(program) => RenderPass::scene_with_program(program),
                None => RenderPass::scene(),
            });
        }
        GeometrySelection::Named(names) => names,
    };

    let mut geometries: Vec<Rc<dyn Geometry>> = Vec::with_capacity(names.len());
    for name in names {
        let geometry = pipeline.scene().geometry(name).ok_or_else(|| {
            BuildError::UnknownGeometry {
                pass: index,
                name: name.clone(),
            }
        })?;
        geometries.push(Rc::clone(geometry));
    }

    let mut pass = RenderPass::explicit();
    match program {
        Some(program) => {
            pass.set_program(program);
            pass.set_program_for_geometries(program, geometries);
        }
        None => {
            // Keep the listed order inside each program's group.
            let mut groups: Vec<(ProgramHandle, Vec<Rc<dyn Geometry>>)> = Vec::new();
            for geometry in geometries {
                let program = geometry.shader_program();
                match groups.iter_mut().find(|(p, _)| *p == program) {
                    Some((_, list)) => list.push(geometry),
                    None => groups.push((program, vec![geometry])),
                }
            }
            for (program, list) in groups {
                pass.set_program_for_geometries(program, list);
            }
        }
    }
    Ok(pass)
}

fn create_attachments<D: RenderDevice>(
    pipeline: &mut RenderPipeline<D>,
    desc: &FramebufferDesc,
    (width, height): (u32, u32),
) -> Result<AttachmentTable, RenderError> {
    let mut create = |attachment: &AttachmentDesc| -> Result<FboAttachment, RenderError> {
        pipeline.create_attachment(attachment.kind, attachment.format, width, height)
    };

    let mut table = AttachmentTable::default();
    for color in &desc.color {
        table.color.push(create(color)?);
    }
    table.depth = desc.depth.as_ref().map(&mut create).transpose()?;
    table.stencil = desc.stencil.as_ref().map(&mut create).transpose()?;
    table.depth_stencil = desc.depth_stencil.as_ref().map(&mut create).transpose()?;
    Ok(table)
}

fn resolve<D: RenderDevice>(
    pipeline: &mut RenderPipeline<D>,
    index: usize,
    name: &str,
) -> Result<TextureHandle, BuildError> {
    pipeline
        .resolve_texture(name)
        .ok_or_else(|| BuildError::UnresolvedTexture {
            pass: index,
            name: name.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attachment::AttachmentSlot;
    use crate::headless::{GpuCommand, HeadlessDevice};
    use crate::test_support::TestGeometry;

    const DEFERRED: &str = r#"(
        programs: [
            (name: "gbuffer", shaders: ["gbuffer.vs", "gbuffer.fs"]),
            (name: "display", shaders: ["quad.vs", "quad.fs"]),
        ],
        passes: [
            (
                program: Some("gbuffer"),
                framebuffer: Some((
                    size: Some((256, 128)),
                    color: [
                        (kind: Texture, format: Rgba16F),
                        (kind: Texture, format: Rgba8),
                    ],
                    depth: Some((kind: Renderbuffer, format: Depth24)),
                )),
            ),
            (
                program: Some("display"),
                inputs: ["fbo0.color1"],
                display: Some("fbo0.color0"),
            ),
        ],
    )"#;

    fn setup() -> (tempfile::TempDir, RenderPipeline<HeadlessDevice>) {
        let dir = tempfile::tempdir().unwrap();
        for file in ["gbuffer.vs", "gbuffer.fs", "quad.vs", "quad.fs"] {
            std::fs::write(dir.path().join(file), "void main() {}").unwrap();
        }
        let mut config = Config::default();
        config.render.shader_dir = dir.path().to_path_buf();
        config.render.texture_dir = dir.path().to_path_buf();
        let mut pipeline = RenderPipeline::from_config(HeadlessDevice::new(), &config);
        let scene = pipeline.scene_mut();
        scene.add_geometry(TestGeometry::new("floor", ProgramHandle(90), 1));
        scene.add_geometry(TestGeometry::new("cube", ProgramHandle(91), 2));
        scene.add_geometry(TestGeometry::new("lamp", ProgramHandle(90), 3));
        (dir, pipeline)
    }

    #[test]
    fn test_build_deferred_pipeline() {
        let (_dir, mut pipeline) = setup();
        let desc = PipelineDesc::from_ron(DEFERRED).unwrap();
        build_pipeline(&mut pipeline, &desc).unwrap();

        assert_eq!(pipeline.passes().len(), 2);
        assert_eq!(pipeline.registry().len(), 1);
        let gbuffer = &pipeline.passes()[0];
        assert!(gbuffer.owns_framebuffer());
        assert_eq!(gbuffer.program(), pipeline.states().program("gbuffer").unwrap());
        assert_eq!(gbuffer.channels(), BufferChannels::COLOR_DEPTH);
        assert!(matches!(
            gbuffer.attachments().get(AttachmentSlot::Depth),
            Some(FboAttachment::Renderbuffer(_))
        ));

        let display = &pipeline.passes()[1];
        assert!(display.is_blit());
        assert_eq!(
            display.inputs(),
            [pipeline.registry().lookup(0, AttachmentSlot::Color(1)).unwrap()]
        );

        let sized = pipeline
            .device()
            .count(|c| matches!(c, GpuCommand::CreateTexture(_, d) if (d.width, d.height) == (256, 128)));
        assert_eq!(sized, 2);
        assert_eq!(pipeline.device().count(|c| matches!(c, GpuCommand::ColorTargets(2))), 1);
    }

    #[test]
    fn test_attachment_size_defaults_to_window() {
        let (_dir, mut pipeline) = setup();
        let desc = PipelineDesc::from_ron(
            r#"(passes: [(framebuffer: Some((depth: Some((kind: Texture, format: Depth32F)))))])"#,
        )
        .unwrap();
        build_pipeline(&mut pipeline, &desc).unwrap();
        assert_eq!(
            pipeline
                .device()
                .count(|c| matches!(c, GpuCommand::CreateTexture(_, d) if (d.width, d.height) == (800, 600))),
            1
        );
        // Depth-only target.
        assert_eq!(pipeline.device().count(|c| matches!(c, GpuCommand::ColorTargets(0))), 1);
        assert_eq!(pipeline.passes()[0].channels(), BufferChannels {
            color: false,
            depth: true,
            stencil: false,
        });
    }

    #[test]
    fn test_named_geometries_group_by_program() {
        let (_dir, mut pipeline) = setup();
        let desc = PipelineDesc::from_ron(
            r#"(passes: [(geometries: Named(["lamp", "cube", "floor"]))])"#,
        )
        .unwrap();
        build_pipeline(&mut pipeline, &desc).unwrap();

        let groups = pipeline.passes()[0].draw_groups(pipeline.scene());
        let names: Vec<(u32, Vec<&str>)> = groups
            .iter()
            .map(|g| (g.program.0, g.geometries.iter().map(|g| g.name()).collect()))
            .collect();
        assert_eq!(names, [(90, vec!["lamp", "floor"]), (91, vec!["cube"])]);
    }

    #[test]
    fn test_named_geometries_with_program_override() {
        let (_dir, mut pipeline) = setup();
        let desc = PipelineDesc::from_ron(
            r#"(
                programs: [(name: "gbuffer", shaders: ["gbuffer.vs", "gbuffer.fs"])],
                passes: [(program: Some("gbuffer"), geometries: Named(["cube", "floor"]))],
            )"#,
        )
        .unwrap();
        build_pipeline(&mut pipeline, &desc).unwrap();
        let program = pipeline.states().program("gbuffer").unwrap();
        let groups = pipeline.passes()[0].draw_groups(pipeline.scene());
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].program, program);
        assert_eq!(groups[0].geometries.len(), 2);
    }

    #[test]
    fn test_unknown_geometry_is_fatal() {
        let (_dir, mut pipeline) = setup();
        let desc =
            PipelineDesc::from_ron(r#"(passes: [(geometries: Named(["teapot"]))])"#).unwrap();
        let err = build_pipeline(&mut pipeline, &desc).unwrap_err();
        assert!(matches!(err, BuildError::UnknownGeometry { pass: 0, name } if name == "teapot"));
    }

    #[test]
    fn test_forward_reference_is_unresolved() {
        let (_dir, mut pipeline) = setup();
        let desc = PipelineDesc::from_ron(
            r#"(passes: [
                (inputs: ["fbo0.color0"]),
                (framebuffer: Some((color: [(kind: Texture, format: Rgba8)]))),
            ])"#,
        )
        .unwrap();
        let err = build_pipeline(&mut pipeline, &desc).unwrap_err();
        assert!(matches!(err, BuildError::UnresolvedTexture { pass: 0, .. }));
    }

    #[test]
    fn test_invalid_description_is_rejected() {
        let (_dir, mut pipeline) = setup();
        let desc = PipelineDesc::from_ron(r#"(passes: [(program: Some("nope"))])"#).unwrap();
        assert!(matches!(
            build_pipeline(&mut pipeline, &desc),
            Err(BuildError::Invalid(_))
        ));
    }

    #[test]
    fn test_incomplete_framebuffer_aborts() {
        let (_dir, mut pipeline) = setup();
        pipeline.device_mut().fail_framebuffers();
        let desc = PipelineDesc::from_ron(
            r#"(passes: [(framebuffer: Some((color: [(kind: Texture, format: Rgba8)])))])"#,
        )
        .unwrap();
        let err = build_pipeline(&mut pipeline, &desc).unwrap_err();
        assert!(matches!(
            err,
            BuildError::Pass {
                pass: 0,
                source: RenderError::IncompleteFramebuffer { .. }
            }
        ));
        assert!(pipeline.passes().is_empty());
        // The half-built framebuffer is gone; only the attachment texture remains.
        assert_eq!(pipeline.device().live_objects(), 1);
    }

    #[test]
    fn test_shader_failure_names_program() {
        let (dir, mut pipeline) = setup();
        std::fs::write(dir.path().join("broken.fs"), "   ").unwrap();
        let desc = PipelineDesc::from_ron(
            r#"(programs: [(name: "broken", shaders: ["quad.vs", "broken.fs"])])"#,
        )
        .unwrap();
        let err = build_pipeline(&mut pipeline, &desc).unwrap_err();
        assert!(matches!(
            err,
            BuildError::Program { name, source: RenderError::ShaderCompile { .. } } if name == "broken"
        ));
    }
}
