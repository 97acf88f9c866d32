//! Indexed triangle mesh, the stock [`Geometry`] implementation.

use glam::{Mat4, Vec3};

use crate::device::{MeshData, RenderDevice, VertexAttribute};
use crate::error::RenderError;
use crate::handles::{MeshHandle, ProgramHandle, TextureHandle};
use crate::material::Material;
use crate::resources::ResourceCache;
use crate::scene::Geometry;

/// Vertex layout for lit meshes: position, normal, texture coordinate.
pub const POSITION_NORMAL_UV: [VertexAttribute; 3] = [
    VertexAttribute {
        location: 0,
        components: 3,
    },
    VertexAttribute {
        location: 1,
        components: 3,
    },
    VertexAttribute {
        location: 2,
        components: 2,
    },
];

/// Axis-aligned bounds of a mesh's positions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min: Vec3,
    pub max: Vec3,
    /// Mean of all positions, not the box midpoint.
    pub center: Vec3,
}

impl BoundingBox {
    /// `None` for an empty position set.
    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> Option<Self> {
        let mut count = 0usize;
        let mut sum = Vec3::ZERO;
        let mut min = Vec3::splat(f32::MAX);
        let mut max = Vec3::splat(f32::MIN);
        for p in points {
            count += 1;
            sum += p;
            min = min.min(p);
            max = max.max(p);
        }
        (count > 0).then(|| Self {
            min,
            max,
            center: sum / count as f32,
        })
    }

    /// Transform that recentres the mesh and scales each axis to span 2 units.
    /// Flat axes keep unit scale.
    pub fn normalizing_transform(&self) -> Mat4 {
        let extent = self.max - self.min;
        let scale = Vec3::select(extent.cmpgt(Vec3::ZERO), 2.0 / extent, Vec3::ONE);
        Mat4::from_translation(-self.center) * Mat4::from_scale(scale)
    }
}

#[derive(Debug, Clone)]
pub struct Mesh {
    name: String,
    handle: MeshHandle,
    program: ProgramHandle,
    texture: TextureHandle,
    transform: Mat4,
    bounds: Option<BoundingBox>,
    material: Material,
    transparency: f32,
}

impl Mesh {
    /// Upload `data` through the resource cache, which keeps ownership of the
    /// GPU buffers.
    pub fn upload(
        device: &mut dyn RenderDevice,
        resources: &mut ResourceCache,
        name: impl Into<String>,
        data: &MeshData<'_>,
    ) -> Result<Self, RenderError> {
        let handle = resources.create_mesh(device, data)?;
        Ok(Self::from_handle(name, handle, BoundingBox::from_points(data.positions())))
    }

    pub fn from_handle(
        name: impl Into<String>,
        handle: MeshHandle,
        bounds: Option<BoundingBox>,
    ) -> Self {
        Self {
            name: name.into(),
            handle,
            program: ProgramHandle::NULL,
            texture: TextureHandle::NULL,
            transform: Mat4::IDENTITY,
            bounds,
            material: Material::default(),
            transparency: 1.0,
        }
    }

    pub fn with_program(mut self, program: ProgramHandle) -> Self {
        self.program = program;
        self
    }

    pub fn with_texture(mut self, texture: TextureHandle) -> Self {
        self.texture = texture;
        self
    }

    pub fn with_transform(mut self, transform: Mat4) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_material(mut self, material: Material) -> Self {
        self.material = material;
        self
    }

    /// Opacity, clamped to 0..=1.
    pub fn with_transparency(mut self, transparency: f32) -> Self {
        self.transparency = transparency.clamp(0.0, 1.0);
        self
    }

    /// Post-multiply the model transform.
    pub fn apply_transform(&mut self, transform: Mat4) {
        self.transform *= transform;
    }

    /// Replace the transform with one fitting the mesh into [-1, 1]³.
    pub fn normalize(&mut self) {
        if let Some(bounds) = &self.bounds {
            self.transform = bounds.normalizing_transform();
        }
    }

    pub fn handle(&self) -> MeshHandle {
        self.handle
    }

    pub fn texture(&self) -> TextureHandle {
        self.texture
    }

    pub fn bounds(&self) -> Option<&BoundingBox> {
        self.bounds.as_ref()
    }
}

impl Geometry for Mesh {
    fn name(&self) -> &str {
        &self.name
    }

    fn shader_program(&self) -> ProgramHandle {
        self.program
    }

    fn transform(&self) -> Mat4 {
        self.transform
    }

    fn uses_texture(&self) -> bool {
        !self.texture.is_null()
    }

    fn material(&self) -> Material {
        self.material
    }

    fn transparency(&self) -> f32 {
        self.transparency
    }

    fn draw(&self, device: &mut dyn RenderDevice) {
        if !self.texture.is_null() {
            device.bind_texture(0, self.texture);
        }
        device.draw_mesh(self.handle);
    }
}
