//! Virtual trackball math: pointer-to-sphere mapping and minimal rotations.

use glam::{Quat, Vec3};

/// Below this cross-product length two unit vectors count as (anti)parallel.
const PARALLEL_EPSILON: f32 = 1e-3;

/// Map a pointer position in window pixels onto the unit hemisphere facing the viewer.
///
/// `x` grows rightwards and `y` downwards, as window systems report them.
/// Points outside the inscribed disk land on the sphere's rim (z = 0).
pub fn map_to_trackball(x: f32, y: f32, width: f32, height: f32) -> Vec3 {
    let px = (2.0 * x - width) / width;
    let py = (height - 2.0 * y) / height;

    let len_sq = px * px + py * py;
    let pz = if len_sq > 1.0 {
        0.0
    } else {
        (1.0 - len_sq).sqrt()
    };

    Vec3::new(px, py, pz).normalize()
}

/// Smallest rotation taking direction `start` onto direction `end`.
///
/// Parallel inputs give the identity. Antiparallel inputs give a half turn
/// about an axis orthogonal to `start` picked by [`orthogonal_to`].
pub fn rotation_between(start: Vec3, end: Vec3) -> Quat {
    let s = start.normalize();
    let t = end.normalize();
    let axis = s.cross(t);
    let cos_angle = s.dot(t);

    if axis.length() <= PARALLEL_EPSILON {
        if (1.0 - cos_angle).abs() <= PARALLEL_EPSILON {
            return Quat::IDENTITY;
        }
        let half_turn_axis = s.cross(orthogonal_to(s)).normalize();
        return Quat::from_xyzw(half_turn_axis.x, half_turn_axis.y, half_turn_axis.z, 0.0);
    }

    // 2·cos(θ/2)
    let twice_cos_half = (2.0 * (1.0 + cos_angle)).sqrt();
    let v = axis / twice_cos_half;
    Quat::from_xyzw(v.x, v.y, v.z, twice_cos_half * 0.5).normalize()
}

/// A unit vector orthogonal to `v`, built from the coordinate of `v` with the
/// smallest magnitude.
///
/// Ties fall through to the z rule; when that degenerates (`v` along z) the
/// x rule is used instead.
pub fn orthogonal_to(v: Vec3) -> Vec3 {
    let (ax, ay, az) = (v.x.abs(), v.y.abs(), v.z.abs());

    let u = if ax < ay && ax < az {
        Vec3::new(0.0, -v.z, v.y)
    } else if ay < ax && ay < az {
        Vec3::new(-v.z, 0.0, v.x)
    } else {
        Vec3::new(-v.y, v.x, 0.0)
    };

    u.try_normalize()
        .unwrap_or_else(|| Vec3::new(0.0, -v.z, v.y).normalize())
}
