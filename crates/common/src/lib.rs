//! Common: shared vocabulary of the curvecast workspace.
//!
//! # Invariants
//! - Motions are stored in f64 and converted to f32 only at upload time.
//! - `RayOptions` is validated before any frame consumes it.

mod geometry_kind;
mod options;
mod types;

pub use geometry_kind::{Curvature, GeometryKind, MarchFamily, ProductBase, UnknownGeometry};
pub use options::{OptionsError, RayOptions, RaycasterUsage};
pub use types::{MOTION_TOLERANCE, Motion, Rgba};

pub fn crate_info() -> &'static str {
    "curvecast-common v0.1.0"
}
