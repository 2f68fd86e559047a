use curvecast_common::{Curvature, GeometryKind, Motion};
use glam::{DMat4, DVec3, DVec4};
use std::f64::consts::PI;

/// Constant-curvature ambient model.
///
/// Points live in the hyperboloid (`B(p, p) = -1`), the unit sphere, or the
/// affine chart (`p[axis] = 1`), where `axis` is the time-like coordinate:
/// 3 for the three-dimensional spaces and 2 for the base of a product.
/// Coordinates past `axis` are unused and stay zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConstantModel {
    curvature: Curvature,
    axis: usize,
}

impl ConstantModel {
    pub const fn new(curvature: Curvature, axis: usize) -> Self {
        Self { curvature, axis }
    }

    /// The round three-sphere; also the ambient of the stretched sphere.
    pub const SPHERE: ConstantModel = ConstantModel::new(Curvature::Positive, 3);

    pub fn for_kind(kind: GeometryKind) -> Option<Self> {
        let curvature = kind.curvature()?;
        let axis = if kind.is_product() { 2 } else { 3 };
        Some(Self::new(curvature, axis))
    }

    pub fn curvature(&self) -> Curvature {
        self.curvature
    }

    pub fn axis(&self) -> usize {
        self.axis
    }

    pub fn origin(&self) -> DVec4 {
        let mut o = DVec4::ZERO;
        o[self.axis] = 1.0;
        o
    }

    /// Bilinear form of the ambient space (Minkowski for hyperbolic).
    pub fn form(&self, a: DVec4, b: DVec4) -> f64 {
        match self.curvature {
            Curvature::Negative => a.dot(b) - 2.0 * a[self.axis] * b[self.axis],
            _ => a.dot(b),
        }
    }

    /// Unit tangent at the origin pointing along the spatial direction `dir`.
    /// Product bases only see the first two components.
    pub fn tangent(&self, dir: DVec3) -> DVec4 {
        let mut t = DVec4::ZERO;
        for i in 0..self.axis {
            t[i] = dir[i];
        }
        let len = t.length();
        if len > 0.0 { t / len } else { t }
    }

    /// Parametric distance along the geodesic `(p, t)` to the wall that the
    /// motion `wall` maps onto the bisector between the origin and the
    /// neighboring center. `None` when the geodesic never crosses the wall
    /// outward. The result can be slightly negative when `p` has drifted
    /// past the wall; callers clamp it.
    pub fn exit_distance(&self, p: DVec4, t: DVec4, wall: &DMat4) -> Option<f64> {
        let a = self.axis;
        let mp = *wall * p;
        let mt = *wall * t;
        match self.curvature {
            Curvature::Negative => {
                let v = (p - mp)[a] / (mt - t)[a];
                if !(v.abs() < 1.0) {
                    return None;
                }
                let d = v.atanh();
                let nt = p * d.sinh() + t * d.cosh();
                if nt[a] < (*wall * nt)[a] {
                    return None;
                }
                Some(d)
            }
            Curvature::Positive => {
                let v = (p - mp)[a] / (mt - t)[a];
                if v.is_nan() {
                    return None;
                }
                let mut d = v.atan();
                let nt = t * d.cos() - p * d.sin();
                if nt[a] > (*wall * nt)[a] {
                    // the other root, half a great circle later
                    d += PI;
                }
                Some(d)
            }
            Curvature::Zero => {
                let deno = p.dot(t) - mp.dot(mt);
                if deno.abs() < 1e-6 {
                    return None;
                }
                let d = (mp.dot(mp) - p.dot(p)) / 2.0 / deno;
                if d < 0.0 {
                    return None;
                }
                let np = p + t * d;
                if np.dot(t) < (*wall * np).dot(mt) {
                    return None;
                }
                Some(d)
            }
        }
    }

    /// Exact isometric transport of a unit-speed geodesic by distance `d`.
    pub fn transport(&self, p: DVec4, t: DVec4, d: f64) -> (DVec4, DVec4) {
        match self.curvature {
            Curvature::Negative => {
                let (ch, sh) = (d.cosh(), d.sinh());
                (p * ch + t * sh, t * ch + p * sh)
            }
            Curvature::Positive => {
                let (c, s) = (d.cos(), d.sin());
                (p * c + t * s, t * c - p * s)
            }
            Curvature::Zero => (p + t * d, t),
        }
    }

    /// Pull a drifted `(p, t)` back onto the model.
    pub fn renormalize(&self, p: DVec4, t: DVec4) -> (DVec4, DVec4) {
        match self.curvature {
            Curvature::Negative => {
                let p = p / (-self.form(p, p)).sqrt();
                let t = t + p * self.form(p, t);
                (p, t / self.form(t, t).sqrt())
            }
            Curvature::Positive => {
                let p = p / p.length();
                let t = t - p * p.dot(t);
                (p, t / t.length())
            }
            Curvature::Zero => {
                let p = p / p[self.axis];
                let mut t = t;
                t[self.axis] = 0.0;
                (p, t)
            }
        }
    }

    /// Distance from the origin to `p`.
    pub fn origin_distance(&self, p: DVec4) -> f64 {
        let a = self.axis;
        match self.curvature {
            Curvature::Negative => p[a].max(1.0).acosh(),
            Curvature::Positive => p[a].clamp(-1.0, 1.0).acos(),
            Curvature::Zero => {
                let spatial: f64 = (0..a).map(|i| p[i] * p[i]).sum();
                spatial.sqrt() / p[a]
            }
        }
    }

    /// Translation by `d` along spatial coordinate `dir`.
    pub fn push(&self, dir: usize, d: f64) -> Motion {
        let a = self.axis;
        let mut m = DMat4::IDENTITY.to_cols_array_2d();
        match self.curvature {
            Curvature::Negative => {
                let (ch, sh) = (d.cosh(), d.sinh());
                m[dir][dir] = ch;
                m[dir][a] = sh;
                m[a][dir] = sh;
                m[a][a] = ch;
            }
            Curvature::Positive => {
                let (c, s) = (d.cos(), d.sin());
                m[dir][dir] = c;
                m[dir][a] = -s;
                m[a][dir] = s;
                m[a][a] = c;
            }
            Curvature::Zero => {
                m[a][dir] = d;
            }
        }
        Motion::new(DMat4::from_cols_array_2d(&m))
    }

    /// Reflection in the bisector of the origin and `center`; swaps the two.
    pub fn bisector_mirror(&self, center: DVec4) -> Motion {
        let a = self.axis;
        match self.curvature {
            Curvature::Negative => {
                let n = self.origin() - center;
                let mut nu = n;
                nu[a] = -nu[a];
                reflection(nu, n)
            }
            Curvature::Positive => {
                let n = self.origin() - center;
                reflection(n, n)
            }
            Curvature::Zero => {
                let c = center / center[a];
                let mut u = c;
                u[a] = 0.0;
                let mut nu = u;
                nu[a] = -u.dot(u) / 2.0;
                reflection(nu, u)
            }
        }
    }

    /// Center of the neighbor reached by walking `2 * inradius` along
    /// `±dir`: the neighbor of a regular cell across that face.
    pub fn face_center(&self, dir: usize, sign: f64, inradius: f64) -> DVec4 {
        self.push(dir, sign * 2.0 * inradius).apply(self.origin())
    }

    /// Chart coordinate of the face plane at distance `d` (gnomonic for the
    /// sphere, Klein for hyperbolic space).
    pub fn chart_coordinate(&self, d: f64) -> f64 {
        match self.curvature {
            Curvature::Negative => d.tanh(),
            Curvature::Positive => d.tan(),
            Curvature::Zero => d,
        }
    }
}

/// `I - 2 n νᵀ / ν(n)`: reflection fixing the hyperplane `ν = 0`.
fn reflection(nu: DVec4, n: DVec4) -> Motion {
    let s = nu.dot(n);
    let mut cols = [[0.0; 4]; 4];
    for (c, col) in cols.iter_mut().enumerate() {
        let mut e = DVec4::ZERO;
        e[c] = 1.0;
        *col = (e - n * (2.0 * nu[c] / s)).to_array();
    }
    Motion::new(DMat4::from_cols_array_2d(&cols))
}

/// Inradius of the regular cube whose dihedral angle is `2π / q`.
pub fn cube_inradius(curvature: Curvature, q: u32) -> f64 {
    let c = (2.0 * PI / q as f64).cos();
    match curvature {
        Curvature::Negative => c.max(0.0).sqrt().asinh(),
        Curvature::Positive => (-c).max(0.0).sqrt().asin(),
        Curvature::Zero => 0.5,
    }
}

/// Inradius of the regular square whose vertex angle is `2π / q`.
pub fn square_inradius(curvature: Curvature, q: u32) -> f64 {
    let c = std::f64::consts::SQRT_2 * (PI / q as f64).cos();
    match curvature {
        Curvature::Negative => c.max(1.0).acosh(),
        Curvature::Positive => c.clamp(-1.0, 1.0).acos(),
        Curvature::Zero => 0.5,
    }
}
