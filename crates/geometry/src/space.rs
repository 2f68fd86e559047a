use crate::constant::ConstantModel;
use crate::geodesic::Geodesic;
use crate::product::ProductModel;
use curvecast_common::{GeometryKind, Motion};
use glam::DVec4;

/// The ambient model of a geometry, whichever way its rays are solved.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Space {
    Constant(ConstantModel),
    Product(ProductModel),
    Stepped(Geodesic),
}

impl Space {
    /// `None` for geometries the raycaster does not model.
    pub fn for_kind(kind: GeometryKind, plevel: f64, stretch_factor: f64) -> Option<Self> {
        match kind {
            GeometryKind::Product(base) => Some(Space::Product(ProductModel::new(base, plevel))),
            GeometryKind::Hyperbolic | GeometryKind::Spherical | GeometryKind::Euclidean => {
                ConstantModel::for_kind(kind).map(Space::Constant)
            }
            GeometryKind::Nil | GeometryKind::Solv | GeometryKind::Stretched => {
                Geodesic::for_kind(kind, stretch_factor).map(Space::Stepped)
            }
            GeometryKind::Other => None,
        }
    }

    pub fn origin(&self) -> DVec4 {
        match self {
            Space::Constant(model) => model.origin(),
            Space::Product(model) => model.base().origin(),
            Space::Stepped(geodesic) => geodesic.origin(),
        }
    }

    /// Distance of `p` (on level `level` for products) from the origin.
    pub fn origin_distance(&self, p: DVec4, level: f64) -> f64 {
        match self {
            Space::Constant(model) => model.origin_distance(p),
            Space::Product(model) => model.origin_distance(p, level),
            Space::Stepped(geodesic) => geodesic.origin_distance(p),
        }
    }

    /// Motion moving the viewer sideways by `d`; used for stereo eyes.
    pub fn push_x(&self, d: f64) -> Motion {
        match self {
            Space::Constant(model) => model.push(0, d),
            Space::Product(model) => model.base().push(0, d),
            Space::Stepped(geodesic) => geodesic.push_x(d),
        }
    }
}
