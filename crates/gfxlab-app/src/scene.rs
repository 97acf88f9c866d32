//! Demo scene: a unit cube, a ground plane, two lights and a trackball camera.

use glam::{Mat4, Vec3};

use gfxlab_camera::TrackballCamera;
use gfxlab_render::mesh::POSITION_NORMAL_UV;
use gfxlab_render::{
    Light, Mesh, MeshData, ProgramHandle, RenderDevice, RenderError, ResourceCache, Scene,
};

/// Interleaved position/normal/uv for an axis-aligned cube of half-size 1.
pub fn cube() -> (Vec<f32>, Vec<u32>) {
    let faces = [Vec3::X, Vec3::NEG_X, Vec3::Y, Vec3::NEG_Y, Vec3::Z, Vec3::NEG_Z];
    let mut vertices = Vec::with_capacity(faces.len() * 4 * 8);
    let mut indices = Vec::with_capacity(faces.len() * 6);

    for normal in faces {
        // Tangent frame of the face; u × v points along the normal.
        let u = if normal.y.abs() > 0.5 {
            Vec3::X
        } else {
            Vec3::Y.cross(normal)
        };
        let v = normal.cross(u);
        let base = (vertices.len() / 8) as u32;
        for (s, t) in [(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)] {
            let p = normal + u * (s * 2.0 - 1.0) + v * (t * 2.0 - 1.0);
            vertices.extend_from_slice(&[p.x, p.y, p.z, normal.x, normal.y, normal.z, s, t]);
        }
        indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }
    (vertices, indices)
}

/// Upload the demo geometry and fill `scene`.
pub fn populate(
    scene: &mut Scene,
    device: &mut dyn RenderDevice,
    resources: &mut ResourceCache,
    program: ProgramHandle,
    (width, height): (u32, u32),
) -> Result<(), RenderError> {
    let (vertices, indices) = cube();
    let data = MeshData {
        vertices: &vertices,
        layout: &POSITION_NORMAL_UV,
        indices: &indices,
    };

    let cube = Mesh::upload(device, resources, "cube", &data)?.with_program(program);
    let mut floor = Mesh::upload(device, resources, "floor", &data)?.with_program(program);
    floor.apply_transform(Mat4::from_translation(Vec3::new(0.0, -1.5, 0.0)));
    floor.apply_transform(Mat4::from_scale(Vec3::new(5.0, 0.1, 5.0)));

    scene.add_geometry(cube);
    scene.add_geometry(floor);
    scene.add_light(Light::point(Vec3::new(2.0, 3.0, 2.0)));
    scene.add_light(Light::directional(Vec3::new(-0.3, -1.0, -0.5).normalize()));

    let mut camera = TrackballCamera::new(width, height);
    camera.look_at(Vec3::new(0.0, 2.0, 6.0), Vec3::ZERO, Vec3::Y);
    scene.set_camera(camera);
    Ok(())
}
