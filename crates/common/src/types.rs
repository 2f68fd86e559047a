use glam::{DMat4, DVec4};
use serde::{Deserialize, Serialize};
use std::ops::Mul;

/// Relative tolerance under which two motions are considered the same.
///
/// Adjacency motions computed along different paths through the cell graph
/// differ by floating noise; anything closer than this is one table entry.
pub const MOTION_TOLERANCE: f64 = 1e-5;

/// Rigid motion of the ambient model, stored as a 4x4 matrix in f64.
///
/// Points and tangent vectors are homogeneous `DVec4`s whose meaning depends
/// on the geometry (hyperboloid, unit sphere, affine chart, group chart).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Motion(pub DMat4);

impl Motion {
    pub const IDENTITY: Motion = Motion(DMat4::IDENTITY);

    pub fn new(matrix: DMat4) -> Self {
        Self(matrix)
    }

    pub fn matrix(&self) -> DMat4 {
        self.0
    }

    pub fn inverse(&self) -> Self {
        Self(self.0.inverse())
    }

    pub fn apply(&self, v: DVec4) -> DVec4 {
        self.0 * v
    }

    /// Largest absolute entry difference, scaled by the larger of the two
    /// matrices so that far-away hyperbolic motions compare sensibly.
    pub fn approx_eq(&self, other: &Motion, tolerance: f64) -> bool {
        let a = self.0.to_cols_array();
        let b = other.0.to_cols_array();
        let scale = a
            .iter()
            .chain(b.iter())
            .fold(1.0_f64, |acc, x| acc.max(x.abs()));
        a.iter()
            .zip(b.iter())
            .all(|(x, y)| (x - y).abs() <= tolerance * scale)
    }

    /// Column-major f32 matrix, the layout WGSL `mat4x4<f32>` expects.
    pub fn to_gpu(&self) -> [[f32; 4]; 4] {
        self.0.as_mat4().to_cols_array_2d()
    }
}

impl Default for Motion {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Mul for Motion {
    type Output = Motion;

    fn mul(self, rhs: Motion) -> Motion {
        Motion(self.0 * rhs.0)
    }
}

impl Mul<DVec4> for Motion {
    type Output = DVec4;

    fn mul(self, rhs: DVec4) -> DVec4 {
        self.0 * rhs
    }
}

/// Packed `0xRRGGBBAA` color, the format world materials and options use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Rgba(pub u32);

impl Rgba {
    pub const TRANSPARENT: Rgba = Rgba(0);
    pub const BLACK: Rgba = Rgba(0x0000_00FF);

    /// Build from a `0xRRGGBB` color and a separate alpha byte.
    pub fn from_rgb(rgb: u32, alpha: u8) -> Self {
        Self(((rgb & 0x00FF_FFFF) << 8) | alpha as u32)
    }

    pub fn r(self) -> u8 {
        (self.0 >> 24) as u8
    }

    pub fn g(self) -> u8 {
        (self.0 >> 16) as u8
    }

    pub fn b(self) -> u8 {
        (self.0 >> 8) as u8
    }

    pub fn a(self) -> u8 {
        self.0 as u8
    }

    pub fn with_alpha(self, alpha: u8) -> Self {
        Self((self.0 & 0xFFFF_FF00) | alpha as u32)
    }

    pub fn is_transparent(self) -> bool {
        self.0 == 0
    }

    /// Channels as floats in `[0, 1]`.
    pub fn to_array(self) -> [f32; 4] {
        [
            self.r() as f32 / 255.0,
            self.g() as f32 / 255.0,
            self.b() as f32 / 255.0,
            self.a() as f32 / 255.0,
        ]
    }

    /// Channels with the color part multiplied by `factor`; alpha untouched.
    pub fn shaded(self, factor: f32) -> [f32; 4] {
        let [r, g, b, a] = self.to_array();
        [r * factor, g * factor, b * factor, a]
    }
}

impl std::ops::BitOr for Rgba {
    type Output = Rgba;

    fn bitor(self, rhs: Rgba) -> Rgba {
        Rgba(self.0 | rhs.0)
    }
}

impl std::fmt::Display for Rgba {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{:08X}", self.0)
    }
}
