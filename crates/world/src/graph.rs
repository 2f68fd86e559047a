use crate::shape::ShapeTable;
use curvecast_common::{GeometryKind, Motion, Rgba};
use serde::{Deserialize, Serialize};

/// Opaque handle of a cell in a world graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellId(pub u32);

impl CellId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for CellId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "cell#{}", self.0)
    }
}

/// Where a wall texture sits in the atlas: tile center and half size, in
/// normalized atlas coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AtlasPlacement {
    pub u: f32,
    pub v: f32,
    pub scale: f32,
}

/// What fills a cell, as seen by rays arriving from a neighbor.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum Material {
    /// Passable and invisible.
    #[default]
    Empty,
    /// Passable; boundaries into it are drawn with this color's alpha.
    Tinted(Rgba),
    /// Opaque wall.
    Solid {
        color: Rgba,
        texture: Option<AtlasPlacement>,
    },
}

impl Material {
    pub fn is_solid(&self) -> bool {
        matches!(self, Material::Solid { .. })
    }

    /// Boundary color contributed by a passable cell; transparent for empty
    /// and solid cells.
    pub fn tint(&self) -> Rgba {
        match self {
            Material::Tinted(c) => *c,
            _ => Rgba::TRANSPARENT,
        }
    }
}

/// Darkness levels (out of 16) applied to walls by side, so that
/// neighboring faces of a solid cell read apart.
pub const SIDE_DARKNESS: [u8; 6] = [0, 4, 8, 2, 6, 10];

/// Read-only query surface of a tessellated world, plus the optional
/// on-demand materialization of neighbors.
///
/// Side `i` of a cell is bounded by the wall `shapes().walls()[wall_offset + i]`,
/// the motion that maps the neighbor's center (seen from this cell) onto
/// this cell's origin.
pub trait CellGraph {
    fn kind(&self) -> GeometryKind;

    fn shapes(&self) -> &ShapeTable;

    /// Index of the cell's shape in [`CellGraph::shapes`].
    fn shape_of(&self, cell: CellId) -> usize;

    /// Cell the viewer starts in.
    fn root(&self) -> CellId;

    fn degree(&self, cell: CellId) -> usize {
        self.shapes().shape(self.shape_of(cell)).degree()
    }

    fn wall_offset(&self, cell: CellId) -> usize {
        self.shapes().wall_offset(self.shape_of(cell))
    }

    fn material(&self, cell: CellId) -> Material;

    /// Neighbor across `side`, if it has been generated.
    fn neighbor(&self, cell: CellId, side: usize) -> Option<CellId>;

    /// Neighbor across `side`, generating it when the world supports that.
    fn materialize(&mut self, cell: CellId, side: usize) -> Option<CellId> {
        self.neighbor(cell, side)
    }

    /// Motion taking coordinates local to `cell` into coordinates local to
    /// its neighbor across `side`.
    fn crossing(&self, cell: CellId, side: usize) -> Motion;

    fn darkness(&self, _cell: CellId, side: usize) -> u8 {
        SIDE_DARKNESS[side % SIDE_DARKNESS.len()]
    }

    /// Fog color and density (alpha) inside the cell, when it has any.
    fn fog(&self, _cell: CellId) -> Option<Rgba> {
        None
    }

    /// Extra planes that only turn rays around.
    fn ultra_mirrors(&self) -> &[Motion] {
        &[]
    }

    /// Half thickness of a layer in product spaces.
    fn plevel(&self) -> f64 {
        0.0
    }

    fn stretch_factor(&self) -> f64 {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tint_only_for_tinted_cells() {
        let c = Rgba(0x2040_6080);
        assert_eq!(Material::Tinted(c).tint(), c);
        assert_eq!(Material::Empty.tint(), Rgba::TRANSPARENT);
        let solid = Material::Solid {
            color: c,
            texture: None,
        };
        assert!(solid.is_solid());
        assert_eq!(solid.tint(), Rgba::TRANSPARENT);
    }

    #[test]
    fn cell_id_display() {
        assert_eq!(CellId(7).to_string(), "cell#7");
        assert_eq!(CellId(7).index(), 7);
    }
}
