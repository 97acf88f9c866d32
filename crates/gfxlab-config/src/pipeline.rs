//! RON description of a render pipeline: shader programs and an ordered pass list.
//!
//! Texture references inside a pass (`inputs`, `display`) are either symbolic
//! attachment names of the form `fbo<N>.<slot>` or image paths. They are kept
//! as plain strings here and resolved while the pipeline is assembled.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Complete pipeline description.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineDesc {
    /// Shader programs, registered by name before any pass is built.
    pub programs: Vec<ProgramDesc>,
    /// Passes in submission order.
    pub passes: Vec<PassDesc>,
}

/// A named shader program built from a list of shader files.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProgramDesc {
    pub name: String,
    /// Shader file names; the stage is taken from each file's suffix.
    pub shaders: Vec<String>,
}

/// Which geometry a pass draws.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub enum GeometrySelection {
    /// Every geometry in the scene.
    #[default]
    Scene,
    /// Only the scene geometries with these names, in this order.
    Named(Vec<String>),
}

/// One pass of the pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PassDesc {
    /// Program override. Without one, scene geometry is drawn with its own program.
    pub program: Option<String>,
    pub geometries: GeometrySelection,
    /// Offscreen target. `None` renders to the visible framebuffer.
    pub framebuffer: Option<FramebufferDesc>,
    /// Textures bound to units 0.. in order.
    pub inputs: Vec<String>,
    /// Blit source. A pass with a display image draws no geometry.
    pub display: Option<String>,
    /// Overrides which buffer channels the pass owns.
    pub channels: Option<ChannelsDesc>,
}

/// Attachments of an offscreen target.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FramebufferDesc {
    /// Target size in pixels; defaults to the window size.
    pub size: Option<(u32, u32)>,
    /// Color attachments, bound to color slots 0.. in order.
    pub color: Vec<AttachmentDesc>,
    pub depth: Option<AttachmentDesc>,
    pub stencil: Option<AttachmentDesc>,
    pub depth_stencil: Option<AttachmentDesc>,
}

/// A single attachment: storage kind plus pixel format.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct AttachmentDesc {
    pub kind: AttachmentKind,
    pub format: AttachmentFormat,
}

/// Storage backing an attachment.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AttachmentKind {
    /// Sampleable by later passes.
    Texture,
    /// Render-only storage.
    Renderbuffer,
}

/// Pixel formats available for attachments.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AttachmentFormat {
    Rgba8,
    Rgba16F,
    Rgba32F,
    Depth24,
    Depth32F,
    Stencil8,
    Depth24Stencil8,
}

/// Buffer channels a pass owns (clears and tests).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChannelsDesc {
    pub color: bool,
    pub depth: bool,
    pub stencil: bool,
}

impl FramebufferDesc {
    /// Number of attachments of any kind.
    pub fn attachment_count(&self) -> usize {
        self.color.len()
            + usize::from(self.depth.is_some())
            + usize::from(self.stencil.is_some())
            + usize::from(self.depth_stencil.is_some())
    }
}

impl PipelineDesc {
    /// Parse a pipeline description from RON source.
    pub fn from_ron(source: &str) -> Result<Self, ConfigError> {
        ron::from_str(source).map_err(ConfigError::ParseError)
    }

    /// Load and validate a pipeline description file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        let desc = Self::from_ron(&contents)?;
        desc.validate().map_err(|reason| ConfigError::InvalidPipeline {
            path: path.to_path_buf(),
            reason,
        })?;
        log::info!(
            "Loaded pipeline from {} ({} programs, {} passes)",
            path.display(),
            desc.programs.len(),
            desc.passes.len()
        );
        Ok(desc)
    }

    /// Structural checks that do not need a GPU.
    pub fn validate(&self) -> Result<(), String> {
        let mut names = HashSet::new();
        for program in &self.programs {
            if !names.insert(program.name.as_str()) {
                return Err(format!("program '{}' declared twice", program.name));
            }
            if program.shaders.is_empty() {
                return Err(format!("program '{}' has no shaders", program.name));
            }
        }

        for (index, pass) in self.passes.iter().enumerate() {
            if let Some(program) = &pass.program
                && !names.contains(program.as_str())
            {
                return Err(format!("pass {index} uses undeclared program '{program}'"));
            }
            if let Some(fb) = &pass.framebuffer {
                if fb.attachment_count() == 0 {
                    return Err(format!("pass {index} framebuffer has no attachments"));
                }
                if fb.depth_stencil.is_some() && (fb.depth.is_some() || fb.stencil.is_some()) {
                    return Err(format!(
                        "pass {index} combines a depth-stencil attachment with depth or stencil"
                    ));
                }
            }
            if pass.display.is_some() {
                if pass.framebuffer.is_some() {
                    return Err(format!("blit pass {index} cannot own a framebuffer"));
                }
                if pass.program.is_none() {
                    return Err(format!("blit pass {index} needs a display program"));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_PASS: &str = r#"(
        programs: [
            (name: "gbuffer", shaders: ["gbuffer.vs", "gbuffer.fs"]),
            (name: "display", shaders: ["quad.vs", "quad.fs"]),
        ],
        passes: [
            (
                program: Some("gbuffer"),
                framebuffer: Some((
                    color: [(kind: Texture, format: Rgba16F)],
                    depth: Some((kind: Renderbuffer, format: Depth24)),
                )),
            ),
            (program: Some("display"), display: Some("fbo0.color0")),
        ],
    )"#;

    #[test]
    fn test_parse_two_pass_pipeline() {
        let desc = PipelineDesc::from_ron(TWO_PASS).unwrap();
        assert_eq!(desc.programs.len(), 2);
        assert_eq!(desc.passes.len(), 2);

        let fb = desc.passes[0].framebuffer.as_ref().unwrap();
        assert_eq!(fb.color[0].format, AttachmentFormat::Rgba16F);
        assert_eq!(fb.depth.unwrap().kind, AttachmentKind::Renderbuffer);
        assert_eq!(fb.attachment_count(), 2);
        assert_eq!(desc.passes[0].geometries, GeometrySelection::Scene);
        assert_eq!(desc.passes[1].display.as_deref(), Some("fbo0.color0"));
        assert!(desc.validate().is_ok());
    }

    #[test]
    fn test_named_geometry_selection() {
        let desc =
            PipelineDesc::from_ron(r#"(passes: [(geometries: Named(["cube", "floor"]))])"#)
                .unwrap();
        assert_eq!(
            desc.passes[0].geometries,
            GeometrySelection::Named(vec!["cube".to_string(), "floor".to_string()])
        );
    }

    #[test]
    fn test_validate_rejects_undeclared_program() {
        let desc = PipelineDesc::from_ron(r#"(passes: [(program: Some("missing"))])"#).unwrap();
        assert!(desc.validate().unwrap_err().contains("missing"));
    }

    #[test]
    fn test_validate_rejects_empty_framebuffer() {
        let desc = PipelineDesc::from_ron(r#"(passes: [(framebuffer: Some(()))])"#).unwrap();
        assert!(desc.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_blit_without_program() {
        let desc = PipelineDesc::from_ron(r#"(passes: [(display: Some("fbo0.color0"))])"#).unwrap();
        assert!(desc.validate().unwrap_err().contains("display program"));
    }

    #[test]
    fn test_validate_rejects_duplicate_program() {
        let desc = PipelineDesc::from_ron(
            r#"(programs: [(name: "a", shaders: ["a.vs"]), (name: "a", shaders: ["b.vs"])])"#,
        )
        .unwrap();
        assert!(desc.validate().is_err());
    }

    #[test]
    fn test_load_reports_invalid_pipeline() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.ron");
        std::fs::write(&path, r#"(passes: [(program: Some("nope"))])"#).unwrap();
        assert!(matches!(
            PipelineDesc::load(&path),
            Err(ConfigError::InvalidPipeline { .. })
        ));
    }

    #[test]
    fn test_load_valid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("two_pass.ron");
        std::fs::write(&path, TWO_PASS).unwrap();
        let desc = PipelineDesc::load(&path).unwrap();
        assert_eq!(desc.passes.len(), 2);
    }
}
