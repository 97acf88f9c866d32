//! Phong surface materials and the classic preset table.

use glam::Vec3;

/// Phong reflectance terms of a surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Material {
    pub ambient: Vec3,
    pub diffuse: Vec3,
    pub specular: Vec3,
    /// Fraction of 128 in the usual preset tables.
    pub shininess: f32,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            ambient: Vec3::splat(0.2),
            diffuse: Vec3::splat(0.8),
            specular: Vec3::splat(0.5),
            shininess: 0.25,
        }
    }
}

const fn preset(ambient: [f32; 3], diffuse: [f32; 3], specular: [f32; 3], shininess: f32) -> Material {
    Material {
        ambient: Vec3::from_array(ambient),
        diffuse: Vec3::from_array(diffuse),
        specular: Vec3::from_array(specular),
        shininess,
    }
}

impl Material {
    pub const EMERALD: Self = preset(
        [0.0215, 0.1745, 0.0215],
        [0.07568, 0.61424, 0.07568],
        [0.633, 0.727811, 0.633],
        0.6,
    );
    pub const JADE: Self = preset(
        [0.135, 0.2225, 0.1575],
        [0.54, 0.89, 0.63],
        [0.316228, 0.316228, 0.316228],
        0.1,
    );
    pub const PEARL: Self = preset(
        [0.25, 0.20725, 0.20725],
        [1.0, 0.829, 0.829],
        [0.296648, 0.296648, 0.296648],
        0.088,
    );
    pub const RUBY: Self = preset(
        [0.1745, 0.01175, 0.01175],
        [0.61424, 0.04136, 0.04136],
        [0.727811, 0.626959, 0.626959],
        0.6,
    );
    pub const BRASS: Self = preset(
        [0.329412, 0.223529, 0.027451],
        [0.780392, 0.568627, 0.113725],
        [0.992157, 0.941176, 0.807843],
        0.21794872,
    );
    pub const BRONZE: Self = preset(
        [0.2125, 0.1275, 0.054],
        [0.714, 0.4284, 0.18144],
        [0.393548, 0.271906, 0.16672],
        0.2,
    );
    pub const SILVER: Self = preset(
        [0.19225, 0.19225, 0.19225],
        [0.50754, 0.50754, 0.50754],
        [0.508273, 0.508273, 0.508273],
        0.4,
    );
    pub const GOLD: Self = preset(
        [0.24725, 0.1995, 0.0745],
        [0.75164, 0.60648, 0.22648],
        [0.628281, 0.555802, 0.366065],
        0.4,
    );

    /// Look up a preset by its lowercase name.
    pub fn preset(name: &str) -> Option<Self> {
        let material = match name {
            "emerald" => Self::EMERALD,
            "jade" => Self::JADE,
            "pearl" => Self::PEARL,
            "ruby" => Self::RUBY,
            "brass" => Self::BRASS,
            "bronze" => Self::BRONZE,
            "silver" => Self::SILVER,
            "gold" => Self::GOLD,
            _ => return None,
        };
        Some(material)
    }

    /// Specular exponent for the shader, from the 0..1 table value.
    pub fn exponent(&self) -> f32 {
        self.shininess * 128.0
    }
}
