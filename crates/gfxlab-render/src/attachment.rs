//! Framebuffer attachments and the symbolic `fbo<N>.<slot>` registry.
//!
//! Every framebuffer-owning pass records an [`AttachmentTable`] when it is
//! added to the pipeline; the N-th table is addressed as `fbo<N>`. Later passes
//! name their inputs through this registry, so a name can only refer to a
//! framebuffer declared before it.

use std::fmt;

use gfxlab_config::AttachmentKind;

use crate::handles::{RenderbufferHandle, TextureHandle};

/// A texture or renderbuffer bound (or bindable) to a framebuffer slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FboAttachment {
    Texture(TextureHandle),
    Renderbuffer(RenderbufferHandle),
}

impl FboAttachment {
    pub fn kind(self) -> AttachmentKind {
        match self {
            Self::Texture(_) => AttachmentKind::Texture,
            Self::Renderbuffer(_) => AttachmentKind::Renderbuffer,
        }
    }

    /// The sampleable texture, if this attachment is one.
    pub fn texture(self) -> Option<TextureHandle> {
        match self {
            Self::Texture(texture) => Some(texture),
            Self::Renderbuffer(_) => None,
        }
    }
}

/// Framebuffer attachment point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttachmentSlot {
    Color(u32),
    Depth,
    Stencil,
    DepthStencil,
}

impl AttachmentSlot {
    /// Parse the slot part of a symbolic name: `color<i>`, `depth`, `stencil`, `ds`.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "depth" => Some(Self::Depth),
            "stencil" => Some(Self::Stencil),
            "ds" => Some(Self::DepthStencil),
            _ => {
                let index = s.strip_prefix("color")?;
                if index.is_empty() || !index.bytes().all(|b| b.is_ascii_digit()) {
                    return None;
                }
                index.parse().ok().map(Self::Color)
            }
        }
    }
}

impl fmt::Display for AttachmentSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Color(i) => write!(f, "color{i}"),
            Self::Depth => f.write_str("depth"),
            Self::Stencil => f.write_str("stencil"),
            Self::DepthStencil => f.write_str("ds"),
        }
    }
}

/// A texture reference as written in a pass description.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureRef<'a> {
    /// `fbo<N>.<slot>`.
    Attachment {
        framebuffer: usize,
        slot: AttachmentSlot,
    },
    /// Starts like an attachment name but the slot is unknown.
    Malformed(&'a str),
    /// Anything else is an image path.
    Image(&'a str),
}

impl<'a> TextureRef<'a> {
    pub fn parse(name: &'a str) -> Self {
        let Some(rest) = name.strip_prefix("fbo") else {
            return Self::Image(name);
        };
        let Some((index, slot)) = rest.split_once('.') else {
            return Self::Image(name);
        };
        if index.is_empty() || !index.bytes().all(|b| b.is_ascii_digit()) {
            return Self::Image(name);
        }
        match (index.parse(), AttachmentSlot::parse(slot)) {
            (Ok(framebuffer), Some(slot)) => Self::Attachment { framebuffer, slot },
            _ => Self::Malformed(name),
        }
    }
}

/// Attachments of one framebuffer, by slot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttachmentTable {
    pub color: Vec<FboAttachment>,
    pub depth: Option<FboAttachment>,
    pub stencil: Option<FboAttachment>,
    pub depth_stencil: Option<FboAttachment>,
}

impl AttachmentTable {
    pub fn get(&self, slot: AttachmentSlot) -> Option<FboAttachment> {
        match slot {
            AttachmentSlot::Color(i) => self.color.get(i as usize).copied(),
            AttachmentSlot::Depth => self.depth,
            AttachmentSlot::Stencil => self.stencil,
            AttachmentSlot::DepthStencil => self.depth_stencil,
        }
    }

    /// Every occupied slot, colour slots first in index order.
    pub fn iter(&self) -> impl Iterator<Item = (AttachmentSlot, FboAttachment)> + '_ {
        let color = self
            .color
            .iter()
            .enumerate()
            .map(|(i, a)| (AttachmentSlot::Color(i as u32), *a));
        let rest = [
            (AttachmentSlot::Depth, self.depth),
            (AttachmentSlot::Stencil, self.stencil),
            (AttachmentSlot::DepthStencil, self.depth_stencil),
        ]
        .into_iter()
        .filter_map(|(slot, a)| a.map(|a| (slot, a)));
        color.chain(rest)
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Append-only list of attachment tables, indexed by declaration order.
#[derive(Debug, Default)]
pub struct AttachmentRegistry {
    tables: Vec<AttachmentTable>,
}

impl AttachmentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a table; returns its `fbo<N>` index.
    pub fn register(&mut self, table: AttachmentTable) -> usize {
        self.tables.push(table);
        self.tables.len() - 1
    }

    pub fn table(&self, framebuffer: usize) -> Option<&AttachmentTable> {
        self.tables.get(framebuffer)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Texture behind `fbo<framebuffer>.<slot>`. Misses are logged, not fatal.
    pub fn lookup(&self, framebuffer: usize, slot: AttachmentSlot) -> Option<TextureHandle> {
        let Some(table) = self.tables.get(framebuffer) else {
            log::warn!(
                "fbo{framebuffer}.{slot}: only {} framebuffer(s) declared so far",
                self.tables.len()
            );
            return None;
        };
        match table.get(slot) {
            Some(FboAttachment::Texture(texture)) => Some(texture),
            Some(FboAttachment::Renderbuffer(_)) => {
                log::warn!("fbo{framebuffer}.{slot} is a renderbuffer and cannot be sampled");
                None
            }
            None => {
                log::warn!("fbo{framebuffer} has no {slot} attachment");
                None
            }
        }
    }

    pub fn clear(&mut self) {
        self.tables.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gbuffer() -> AttachmentTable {
        AttachmentTable {
            color: vec![
                FboAttachment::Texture(TextureHandle(10)),
                FboAttachment::Texture(TextureHandle(11)),
            ],
            depth: Some(FboAttachment::Renderbuffer(RenderbufferHandle(3))),
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_slots() {
        assert_eq!(AttachmentSlot::parse("color0"), Some(AttachmentSlot::Color(0)));
        assert_eq!(AttachmentSlot::parse("color12"), Some(AttachmentSlot::Color(12)));
        assert_eq!(AttachmentSlot::parse("depth"), Some(AttachmentSlot::Depth));
        assert_eq!(AttachmentSlot::parse("stencil"), Some(AttachmentSlot::Stencil));
        assert_eq!(AttachmentSlot::parse("ds"), Some(AttachmentSlot::DepthStencil));
        assert_eq!(AttachmentSlot::parse("color"), None);
        assert_eq!(AttachmentSlot::parse("color-1"), None);
        assert_eq!(AttachmentSlot::parse("normal"), None);
    }

    #[test]
    fn test_slot_display_round_trips() {
        for slot in [
            AttachmentSlot::Color(2),
            AttachmentSlot::Depth,
            AttachmentSlot::Stencil,
            AttachmentSlot::DepthStencil,
        ] {
            assert_eq!(AttachmentSlot::parse(&slot.to_string()), Some(slot));
        }
    }

    #[test]
    fn test_parse_texture_refs() {
        assert_eq!(
            TextureRef::parse("fbo0.color0"),
            TextureRef::Attachment {
                framebuffer: 0,
                slot: AttachmentSlot::Color(0)
            }
        );
        assert_eq!(
            TextureRef::parse("fbo3.ds"),
            TextureRef::Attachment {
                framebuffer: 3,
                slot: AttachmentSlot::DepthStencil
            }
        );
        assert_eq!(TextureRef::parse("fbo1.albedo"), TextureRef::Malformed("fbo1.albedo"));
        assert_eq!(TextureRef::parse("brick.png"), TextureRef::Image("brick.png"));
        assert_eq!(TextureRef::parse("fbox.color0"), TextureRef::Image("fbox.color0"));
        assert_eq!(TextureRef::parse("fbo.png"), TextureRef::Image("fbo.png"));
    }

    #[test]
    fn test_table_iteration_order() {
        let slots: Vec<_> = gbuffer().iter().map(|(slot, _)| slot).collect();
        assert_eq!(
            slots,
            vec![
                AttachmentSlot::Color(0),
                AttachmentSlot::Color(1),
                AttachmentSlot::Depth
            ]
        );
        assert_eq!(gbuffer().len(), 3);
        assert!(AttachmentTable::default().is_empty());
    }

    #[test]
    fn test_lookup_resolves_textures() {
        let mut registry = AttachmentRegistry::new();
        assert_eq!(registry.register(gbuffer()), 0);
        assert_eq!(
            registry.lookup(0, AttachmentSlot::Color(0)),
            Some(TextureHandle(10))
        );
        assert_eq!(
            registry.lookup(0, AttachmentSlot::Color(1)),
            Some(TextureHandle(11))
        );
    }

    #[test]
    fn test_lookup_misses() {
        let mut registry = AttachmentRegistry::new();
        registry.register(gbuffer());
        // Renderbuffers are not sampleable.
        assert_eq!(registry.lookup(0, AttachmentSlot::Depth), None);
        assert_eq!(registry.lookup(0, AttachmentSlot::Color(2)), None);
        assert_eq!(registry.lookup(0, AttachmentSlot::Stencil), None);
        // No forward references.
        assert_eq!(registry.lookup(1, AttachmentSlot::Color(0)), None);
    }

    #[test]
    fn test_attachment_kind() {
        let texture = FboAttachment::Texture(TextureHandle(1));
        let renderbuffer = FboAttachment::Renderbuffer(RenderbufferHandle(1));
        assert_eq!(texture.kind(), AttachmentKind::Texture);
        assert_eq!(renderbuffer.kind(), AttachmentKind::Renderbuffer);
        assert_eq!(texture.texture(), Some(TextureHandle(1)));
        assert_eq!(renderbuffer.texture(), None);
    }
}
