//! World: the cell-graph surface the raycaster reads, and reference worlds.
//!
//! # Invariants
//! - Side `i` of a cell is bounded by wall `wall_offset + i` of the shape table.
//! - `crossing(c, i)` maps coordinates local to `c` into the neighbor's frame.
//! - Seeded worlds are reproducible: same seed and same walk, same cells.

mod graph;
mod honeycomb;
mod nil;
mod population;
mod shape;

pub use graph::{AtlasPlacement, CellGraph, CellId, Material, SIDE_DARKNESS};
pub use honeycomb::{DEFAULT_STRETCH, PRODUCT_PLEVEL, ReflectionHoneycomb, WorldError};
pub use nil::NilLattice;
pub use population::{Population, splitmix64};
pub use shape::{Shape, ShapeTable, WallTriangle, face_axis};

use curvecast_common::GeometryKind;

/// Reference world for any supported geometry, boxed behind the graph trait.
pub fn reference_world(
    kind: GeometryKind,
    population: Population,
) -> Result<Box<dyn CellGraph>, WorldError> {
    match kind {
        GeometryKind::Nil => Ok(Box::new(NilLattice::new(population))),
        _ => Ok(Box::new(ReflectionHoneycomb::for_kind(kind, population)?)),
    }
}

pub fn crate_info() -> &'static str {
    "curvecast-world v0.1.0"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_loads() {
        assert!(crate_info().contains("world"));
    }

    #[test]
    fn reference_worlds_cover_the_marchable_kinds() {
        for kind in GeometryKind::ALL {
            let world = reference_world(kind, Population::default());
            let expected = !matches!(kind, GeometryKind::Solv | GeometryKind::Other);
            assert_eq!(world.is_ok(), expected, "{kind}");
            if let Ok(world) = world {
                assert_eq!(world.kind(), kind);
                assert_eq!(world.degree(world.root()), 6);
            }
        }
    }
}
