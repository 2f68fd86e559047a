//! Geometry: ambient models the tracer moves rays through.
//!
//! Constant-curvature spaces and products are solved in closed form; Nil,
//! Solv and the stretched sphere are integrated with an adaptive RK4 step.
//!
//! # Invariants
//! - Transport keeps `(position, tangent)` on the model up to renormalization.
//! - Every accepted adaptive step lies in `[minstep, maxstep]`.
//! - Wall motions map the neighboring center to the origin of the model.

mod constant;
mod geodesic;
mod marcher;
mod product;
mod space;

pub use constant::{ConstantModel, cube_inradius, square_inradius};
pub use geodesic::{Geodesic, nil_translate, s_itranslate, s_translate};
pub use marcher::{AdaptiveMarcher, Chart, MarchExit, StepLimits, StepOutcome};
pub use product::{LevelSide, ProductModel, ProductRay};
pub use space::Space;

pub fn crate_info() -> &'static str {
    "curvecast-geometry v0.1.0"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_loads() {
        assert!(crate_info().contains("geometry"));
    }
}
