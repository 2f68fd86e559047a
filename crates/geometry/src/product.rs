use crate::constant::ConstantModel;
use curvecast_common::{Curvature, Motion, ProductBase};
use glam::{DMat4, DVec3, DVec4};

/// Which horizontal boundary of a layer a ray leaves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelSide {
    /// The second-to-last side.
    Floor,
    /// The last side.
    Ceiling,
}

impl LevelSide {
    pub fn side(self, degree: usize) -> usize {
        match self {
            LevelSide::Floor => degree - 2,
            LevelSide::Ceiling => degree - 1,
        }
    }
}

/// `B² × E`: a constant-curvature base plus a level coordinate.
///
/// Layers are `2 * plevel` thick; a cell's level coordinate runs over
/// `[-plevel, plevel]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProductModel {
    base: ConstantModel,
    plevel: f64,
}

/// Ray state in a product space. `tangent` is the unit base direction;
/// the actual velocity splits into `xspeed` along the base and `zspeed`
/// along the level.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProductRay {
    pub position: DVec4,
    pub tangent: DVec4,
    pub zpos: f64,
    pub xspeed: f64,
    pub zspeed: f64,
}

impl ProductModel {
    pub fn new(base: ProductBase, plevel: f64) -> Self {
        let curvature = match base {
            ProductBase::Hyperbolic => Curvature::Negative,
            ProductBase::Spherical => Curvature::Positive,
            ProductBase::Euclidean => Curvature::Zero,
        };
        Self {
            base: ConstantModel::new(curvature, 2),
            plevel,
        }
    }

    pub fn base(&self) -> &ConstantModel {
        &self.base
    }

    pub fn plevel(&self) -> f64 {
        self.plevel
    }

    /// Start a ray at `start · origin` on level `level`. `dir` is in the
    /// viewer frame with `y` vertical; `x` and `z` span the base.
    pub fn launch(&self, start: &Motion, level: f64, dir: DVec3) -> ProductRay {
        let dir = dir.normalize();
        let xspeed = (dir.x * dir.x + dir.z * dir.z).sqrt();
        let local = if xspeed > 1e-9 {
            DVec4::new(dir.x / xspeed, dir.z / xspeed, 0.0, 0.0)
        } else {
            DVec4::X
        };
        ProductRay {
            position: start.apply(self.base.origin()),
            tangent: start.apply(local),
            zpos: level,
            xspeed,
            zspeed: dir.y,
        }
    }

    /// Distance along the full ray to a side wall of the base polygon.
    pub fn exit_distance(&self, ray: &ProductRay, wall: &DMat4) -> Option<f64> {
        if ray.xspeed <= 1e-9 {
            return None;
        }
        self.base
            .exit_distance(ray.position, ray.tangent, wall)
            .map(|d| d / ray.xspeed)
    }

    /// Distance to the floor or ceiling of the current layer.
    pub fn level_exit(&self, ray: &ProductRay) -> Option<(f64, LevelSide)> {
        if ray.zspeed > 0.0 {
            Some(((self.plevel - ray.zpos) / ray.zspeed, LevelSide::Ceiling))
        } else if ray.zspeed < 0.0 {
            Some(((-self.plevel - ray.zpos) / ray.zspeed, LevelSide::Floor))
        } else {
            None
        }
    }

    pub fn transport(&self, ray: &mut ProductRay, d: f64) {
        let (p, t) = self
            .base
            .transport(ray.position, ray.tangent, d * ray.xspeed);
        let (p, t) = self.base.renormalize(p, t);
        ray.position = p;
        ray.tangent = t;
        ray.zpos += d * ray.zspeed;
    }

    /// Re-express the level coordinate in the layer across `side`.
    pub fn cross_level(&self, ray: &mut ProductRay, side: LevelSide) {
        match side {
            LevelSide::Floor => ray.zpos += 2.0 * self.plevel,
            LevelSide::Ceiling => ray.zpos -= 2.0 * self.plevel,
        }
    }

    /// Distance from the origin of the cell, counting both factors.
    pub fn origin_distance(&self, position: DVec4, zpos: f64) -> f64 {
        self.base.origin_distance(position).hypot(zpos)
    }
}
