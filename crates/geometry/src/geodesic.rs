use curvecast_common::{GeometryKind, Motion};
use glam::{DMat4, DVec4};

/// Geodesic flow of a space without a closed-form ray solve.
///
/// Positions and velocities are `DVec4`s in the geometry's chart: the group
/// chart `(x, y, z, 1)` for Nil and Solv, unit quaternions for the
/// stretched sphere.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Geodesic {
    /// Metric `dx² + dy² + (dz - x dy)²`.
    Nil,
    /// Metric `e^{2z} dx² + e^{-2z} dy² + dz²`.
    Solv,
    /// Berger sphere: the fiber direction is scaled by `sqrt(1 + factor)`.
    Stretched { factor: f64 },
}

impl Geodesic {
    pub fn for_kind(kind: GeometryKind, stretch_factor: f64) -> Option<Self> {
        match kind {
            GeometryKind::Nil => Some(Geodesic::Nil),
            GeometryKind::Solv => Some(Geodesic::Solv),
            GeometryKind::Stretched => Some(Geodesic::Stretched {
                factor: stretch_factor,
            }),
            _ => None,
        }
    }

    pub fn origin(&self) -> DVec4 {
        DVec4::W
    }

    /// Second derivative of position along the geodesic through `x` with
    /// velocity `v`.
    pub fn acceleration(&self, x: DVec4, v: DVec4) -> DVec4 {
        match *self {
            Geodesic::Nil => {
                let px = x.x;
                DVec4::new(
                    px * v.y * v.y - v.y * v.z,
                    -px * v.x * v.y + v.x * v.z,
                    -(px * px - 1.0) * v.x * v.y + px * v.x * v.z,
                    0.0,
                )
            }
            Geodesic::Solv => DVec4::new(
                -2.0 * v.x * v.z,
                2.0 * v.y * v.z,
                (2.0 * x.z).exp() * v.x * v.x - (-2.0 * x.z).exp() * v.y * v.y,
                0.0,
            ),
            Geodesic::Stretched { factor } => {
                let frame = s_itranslate(x) * v;
                let turn = DVec4::new(
                    -2.0 * factor * frame.y * frame.z,
                    2.0 * factor * frame.x * frame.z,
                    0.0,
                    0.0,
                );
                s_translate(x) * turn - x * v.length_squared()
            }
        }
    }

    /// One classical Runge-Kutta step of the first-order system
    /// `x' = v, v' = acceleration(x, v)`.
    pub fn rk4(&self, x: DVec4, v: DVec4, h: f64) -> (DVec4, DVec4) {
        let k1x = v;
        let k1v = self.acceleration(x, v);
        let k2x = v + k1v * (h / 2.0);
        let k2v = self.acceleration(x + k1x * (h / 2.0), k2x);
        let k3x = v + k2v * (h / 2.0);
        let k3v = self.acceleration(x + k2x * (h / 2.0), k3x);
        let k4x = v + k3v * h;
        let k4v = self.acceleration(x + k3x * h, k4x);
        let nx = x + (k1x + k2x * 2.0 + k3x * 2.0 + k4x) * (h / 6.0);
        let nv = v + (k1v + k2v * 2.0 + k3v * 2.0 + k4v) * (h / 6.0);
        self.settle(nx, nv)
    }

    /// Project an integrated state back onto the space.
    pub fn settle(&self, x: DVec4, v: DVec4) -> (DVec4, DVec4) {
        match *self {
            Geodesic::Stretched { factor } => {
                let x = x / x.length();
                let mut frame = s_itranslate(x) * v;
                frame.w = 0.0;
                let speed2 = frame.x * frame.x + frame.y * frame.y + (1.0 + factor) * frame.z * frame.z;
                (x, s_translate(x) * (frame / speed2.sqrt()))
            }
            _ => (x, v),
        }
    }

    /// Turn a unit chart direction at `x` into a unit-speed velocity.
    pub fn launch(&self, x: DVec4, v: DVec4) -> DVec4 {
        match *self {
            Geodesic::Stretched { factor } => {
                let mut frame = s_itranslate(x) * v;
                frame.z /= (1.0 + factor).sqrt();
                s_translate(x) * frame
            }
            _ => v,
        }
    }

    /// Left translation moving the origin along the first chart axis by `d`.
    pub fn push_x(&self, d: f64) -> Motion {
        match *self {
            Geodesic::Nil => nil_translate(d, 0.0, 0.0),
            Geodesic::Solv => Motion::new(DMat4::from_translation(glam::DVec3::new(d, 0.0, 0.0))),
            Geodesic::Stretched { .. } => {
                Motion::new(s_translate(DVec4::new(d.sin(), 0.0, 0.0, d.cos())))
            }
        }
    }

    /// Approximate distance from the origin, used to compare candidate cells.
    pub fn origin_distance(&self, p: DVec4) -> f64 {
        match *self {
            Geodesic::Stretched { .. } => p.w.clamp(-1.0, 1.0).acos(),
            _ => p.truncate().length() / p.w,
        }
    }
}

/// Quaternion translation taking the identity to `h`.
pub fn s_translate(h: DVec4) -> DMat4 {
    DMat4::from_cols(
        DVec4::new(h.w, h.z, -h.y, -h.x),
        DVec4::new(-h.z, h.w, h.x, -h.y),
        DVec4::new(h.y, -h.x, h.w, -h.z),
        DVec4::new(h.x, h.y, h.z, h.w),
    )
}

pub fn s_itranslate(h: DVec4) -> DMat4 {
    s_translate(DVec4::new(-h.x, -h.y, -h.z, h.w))
}

/// Nil left translation by the group element `(a, b, c)`.
pub fn nil_translate(a: f64, b: f64, c: f64) -> Motion {
    Motion::new(DMat4::from_cols(
        DVec4::X,
        DVec4::new(0.0, 1.0, a, 0.0),
        DVec4::Z,
        DVec4::new(a, b, c, 1.0),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nil_speed2(x: DVec4, v: DVec4) -> f64 {
        let w = v.z - x.x * v.y;
        v.x * v.x + v.y * v.y + w * w
    }

    fn solv_speed2(x: DVec4, v: DVec4) -> f64 {
        (2.0 * x.z).exp() * v.x * v.x + (-2.0 * x.z).exp() * v.y * v.y + v.z * v.z
    }

    #[test]
    fn nil_flow_conserves_speed() {
        let g = Geodesic::Nil;
        let (mut x, mut v) = (DVec4::W, DVec4::new(0.6, 0.48, 0.64, 0.0));
        for _ in 0..200 {
            (x, v) = g.rk4(x, v, 0.01);
        }
        assert!((nil_speed2(x, v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn solv_flow_conserves_speed() {
        let g = Geodesic::Solv;
        let (mut x, mut v) = (DVec4::W, DVec4::new(0.6, 0.0, 0.8, 0.0));
        for _ in 0..200 {
            (x, v) = g.rk4(x, v, 0.01);
        }
        assert!((solv_speed2(x, v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn nil_vertical_lines_are_geodesics() {
        let (x, v) = Geodesic::Nil.rk4(DVec4::W, DVec4::Z, 0.3);
        assert!((x - DVec4::new(0.0, 0.0, 0.3, 1.0)).length() < 1e-12);
        assert!((v - DVec4::Z).length() < 1e-12);
    }

    #[test]
    fn unstretched_sphere_follows_great_circles() {
        let g = Geodesic::Stretched { factor: 0.0 };
        let (mut x, mut v) = (DVec4::W, DVec4::X);
        let h = 0.05;
        for _ in 0..20 {
            (x, v) = g.rk4(x, v, h);
        }
        let expected = DVec4::new(1.0_f64.sin(), 0.0, 0.0, 1.0_f64.cos());
        assert!((x - expected).length() < 1e-6);
        assert!((v.length() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn quaternion_translation_is_orthogonal() {
        let h = DVec4::new(0.1, -0.3, 0.5, 0.0).normalize() * 0.6 + DVec4::W * 0.8;
        let h = h / h.length();
        let m = s_translate(h) * s_itranslate(h);
        assert!(Motion::new(m).approx_eq(&Motion::IDENTITY, 1e-12));
        assert!((s_translate(h) * DVec4::W - h).length() < 1e-12);
    }

    #[test]
    fn nil_translation_preserves_metric_form() {
        let m = nil_translate(0.7, -0.2, 0.4);
        let x = DVec4::new(0.1, 0.2, 0.3, 1.0);
        let v = DVec4::new(0.3, -0.5, 0.2, 0.0);
        let (mx, mv) = (m.apply(x), m.apply(v));
        assert!((nil_speed2(x, v) - nil_speed2(mx, mv)).abs() < 1e-12);
    }
}
