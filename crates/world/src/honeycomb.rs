use crate::graph::{CellGraph, CellId, Material};
use crate::population::Population;
use crate::shape::{Shape, ShapeTable};
use curvecast_common::{Curvature, GeometryKind, Motion, ProductBase, Rgba};
use curvecast_geometry::{ConstantModel, cube_inradius, square_inradius};
use glam::DVec4;
use std::collections::HashMap;
use tracing::{debug, trace};

#[derive(Debug, thiserror::Error)]
pub enum WorldError {
    #[error("no reference world for geometry {0}")]
    NoReferenceWorld(GeometryKind),
}

/// Layer half thickness of the reference product worlds.
pub const PRODUCT_PLEVEL: f64 = 0.5;
pub const DEFAULT_STRETCH: f64 = 0.25;

#[derive(Debug, Clone)]
struct HoneyCell {
    /// Motion taking this cell's local coordinates to the root's.
    frame: Motion,
    level: i64,
    neighbors: Vec<Option<CellId>>,
    material: Material,
}

/// Spatial hash of cell centers in the root frame. Centers are binned with
/// `floor`; lookups also probe the adjacent bin on any coordinate that sits
/// near a bin boundary, so floating noise never splits one cell in two.
#[derive(Debug, Clone, Default)]
struct CenterIndex {
    bins: HashMap<[i64; 5], Vec<CellId>>,
}

const BIN_SCALE: f64 = 4.0;

impl CenterIndex {
    fn bin(p: DVec4, level: i64) -> ([i64; 5], [f64; 4]) {
        let mut key = [0; 5];
        let mut frac = [0.0; 4];
        for i in 0..4 {
            let s = p[i] * BIN_SCALE;
            key[i] = s.floor() as i64;
            frac[i] = s - s.floor();
        }
        key[4] = level;
        (key, frac)
    }

    fn insert(&mut self, p: DVec4, level: i64, id: CellId) {
        self.bins.entry(Self::bin(p, level).0).or_default().push(id);
    }

    fn find(&self, p: DVec4, level: i64, center_of: impl Fn(CellId) -> DVec4) -> Option<CellId> {
        let (key, frac) = Self::bin(p, level);
        let mut candidates = vec![key];
        for i in 0..4 {
            let shift = if frac[i] < 0.25 {
                -1
            } else if frac[i] > 0.75 {
                1
            } else {
                continue;
            };
            let more: Vec<_> = candidates
                .iter()
                .map(|k| {
                    let mut k = *k;
                    k[i] += shift;
                    k
                })
                .collect();
            candidates.extend(more);
        }
        let tolerance = 1e-6 * p.length().max(1.0);
        candidates
            .iter()
            .filter_map(|k| self.bins.get(k))
            .flatten()
            .copied()
            .find(|id| (center_of(*id) - p).length() < tolerance)
    }
}

/// Honeycomb generated by reflecting a regular cell in its own walls.
///
/// Covers the cube honeycombs {4,3,5}, {4,3,3} and {4,3,4}, the stretched
/// sphere on the {4,3,3} cells, and square-prism products. Cells are created
/// on demand as the encoder walks outward.
#[derive(Debug, Clone)]
pub struct ReflectionHoneycomb {
    kind: GeometryKind,
    model: ConstantModel,
    shapes: ShapeTable,
    cells: Vec<HoneyCell>,
    index: CenterIndex,
    population: Population,
    fog_density: Option<u8>,
    ultra: Vec<Motion>,
    plevel: f64,
    stretch: f64,
}

impl ReflectionHoneycomb {
    pub fn for_kind(kind: GeometryKind, population: Population) -> Result<Self, WorldError> {
        let (model, shape, plevel) = match kind {
            GeometryKind::Hyperbolic | GeometryKind::Spherical | GeometryKind::Euclidean => {
                let curvature = kind.curvature().ok_or(WorldError::NoReferenceWorld(kind))?;
                let q = match curvature {
                    Curvature::Negative => 5,
                    Curvature::Positive => 3,
                    Curvature::Zero => 4,
                };
                let model = ConstantModel::new(curvature, 3);
                (model, Shape::cube(&model, cube_inradius(curvature, q)), 0.0)
            }
            GeometryKind::Stretched => {
                let model = ConstantModel::SPHERE;
                let d = cube_inradius(Curvature::Positive, 3);
                (model, Shape::cube(&model, d), 0.0)
            }
            GeometryKind::Product(base) => {
                let (curvature, q) = match base {
                    ProductBase::Hyperbolic => (Curvature::Negative, 5),
                    ProductBase::Spherical => (Curvature::Positive, 3),
                    ProductBase::Euclidean => (Curvature::Zero, 4),
                };
                let model = ConstantModel::new(curvature, 2);
                let d = square_inradius(curvature, q);
                (
                    model,
                    Shape::square_prism(&model, d, PRODUCT_PLEVEL),
                    PRODUCT_PLEVEL,
                )
            }
            _ => return Err(WorldError::NoReferenceWorld(kind)),
        };
        let ultra = if kind == GeometryKind::Hyperbolic {
            corner_mirrors(&model, cube_inradius(Curvature::Negative, 5))
        } else {
            Vec::new()
        };
        let degree = shape.degree();
        let mut world = Self {
            kind,
            model,
            shapes: ShapeTable::single(shape),
            cells: Vec::new(),
            index: CenterIndex::default(),
            population,
            fog_density: None,
            ultra,
            plevel,
            stretch: if kind == GeometryKind::Stretched {
                DEFAULT_STRETCH
            } else {
                0.0
            },
        };
        world.push_cell(Motion::IDENTITY, 0, degree);
        world.cells[0].material = Material::Empty;
        debug!(%kind, degree, "honeycomb created");
        Ok(world)
    }

    pub fn with_stretch_factor(mut self, factor: f64) -> Self {
        if self.kind == GeometryKind::Stretched {
            self.stretch = factor;
        }
        self
    }

    /// Give every cell a seeded random fog color of the given density.
    pub fn with_random_fog(mut self, density: u8) -> Self {
        self.fog_density = Some(density);
        self
    }

    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    pub fn frame(&self, cell: CellId) -> Motion {
        self.cells[cell.index()].frame
    }

    pub fn level(&self, cell: CellId) -> i64 {
        self.cells[cell.index()].level
    }

    pub fn set_material(&mut self, cell: CellId, material: Material) {
        self.cells[cell.index()].material = material;
    }

    /// Generate cells breadth-first from the root until at least `count`
    /// exist or the world is closed.
    pub fn grow(&mut self, count: usize) {
        let mut cursor = 0;
        while self.cells.len() < count && cursor < self.cells.len() {
            let cell = CellId(cursor as u32);
            for side in 0..self.cells[cursor].neighbors.len() {
                self.materialize(cell, side);
            }
            cursor += 1;
        }
    }

    fn is_level_side(&self, side: usize) -> bool {
        self.kind.is_product() && side >= 4
    }

    fn center(&self, cell: &HoneyCell) -> DVec4 {
        cell.frame.apply(self.model.origin())
    }

    fn push_cell(&mut self, frame: Motion, level: i64, degree: usize) -> CellId {
        let id = CellId(self.cells.len() as u32);
        let key = id.0 as u64;
        let cell = HoneyCell {
            frame,
            level,
            neighbors: vec![None; degree],
            material: self.population.material(key),
        };
        let center = self.center(&cell);
        self.index.insert(center, level, id);
        self.cells.push(cell);
        trace!(%id, level, "cell generated");
        id
    }

    /// Frame and level of the neighbor across `side` as seen from `cell`.
    fn placement(&self, cell: CellId, side: usize) -> (Motion, i64) {
        let c = &self.cells[cell.index()];
        if self.is_level_side(side) {
            let dl = if side == 4 { -1 } else { 1 };
            (c.frame, c.level + dl)
        } else {
            let wall = self.shapes.shape(0).walls()[side];
            (c.frame * wall.inverse(), c.level)
        }
    }

    fn find(&self, p: DVec4, level: i64) -> Option<CellId> {
        self.index
            .find(p, level, |id| self.center(&self.cells[id.index()]))
    }

    fn link_back(&mut self, from: CellId, to: CellId) {
        let origin = self.center(&self.cells[from.index()]);
        let level = self.cells[from.index()].level;
        for j in 0..self.cells[to.index()].neighbors.len() {
            if self.cells[to.index()].neighbors[j].is_some() {
                continue;
            }
            let (frame, l) = self.placement(to, j);
            let p = frame.apply(self.model.origin());
            if l == level && (p - origin).length() < 1e-6 * origin.length().max(1.0) {
                self.cells[to.index()].neighbors[j] = Some(from);
                return;
            }
        }
    }
}

/// Mirrors cutting each corner of the hyperbolic cube, perpendicular to the
/// vertex direction at nine tenths of the vertex distance.
fn corner_mirrors(model: &ConstantModel, inradius: f64) -> Vec<Motion> {
    let k = model.chart_coordinate(inradius);
    let vertex = (k * 3f64.sqrt()).atanh();
    let r = 0.9 * vertex;
    let mut out = Vec::with_capacity(8);
    for bits in 0..8u32 {
        let s = |b: u32| if bits & b == 0 { 1.0 } else { -1.0 };
        let u = glam::DVec3::new(s(1), s(2), s(4)).normalize();
        let center = (u * (2.0 * r).sinh()).extend((2.0 * r).cosh());
        out.push(model.bisector_mirror(center));
    }
    out
}

impl CellGraph for ReflectionHoneycomb {
    fn kind(&self) -> GeometryKind {
        self.kind
    }

    fn shapes(&self) -> &ShapeTable {
        &self.shapes
    }

    fn shape_of(&self, _cell: CellId) -> usize {
        0
    }

    fn root(&self) -> CellId {
        CellId(0)
    }

    fn material(&self, cell: CellId) -> Material {
        self.cells[cell.index()].material
    }

    fn neighbor(&self, cell: CellId, side: usize) -> Option<CellId> {
        self.cells[cell.index()].neighbors[side]
    }

    fn materialize(&mut self, cell: CellId, side: usize) -> Option<CellId> {
        if let Some(n) = self.neighbor(cell, side) {
            return Some(n);
        }
        let (frame, level) = self.placement(cell, side);
        let center = frame.apply(self.model.origin());
        let n = match self.find(center, level) {
            Some(n) => n,
            None => {
                let degree = self.shapes.shape(0).degree();
                self.push_cell(frame, level, degree)
            }
        };
        self.cells[cell.index()].neighbors[side] = Some(n);
        self.link_back(cell, n);
        Some(n)
    }

    fn crossing(&self, cell: CellId, side: usize) -> Motion {
        if self.is_level_side(side) {
            return Motion::IDENTITY;
        }
        match self.neighbor(cell, side) {
            Some(n) => self.frame(n).inverse() * self.frame(cell),
            None => self.shapes.shape(0).walls()[side],
        }
    }

    fn fog(&self, cell: CellId) -> Option<Rgba> {
        self.fog_density
            .map(|density| self.population.fog(cell.0 as u64, density))
    }

    fn ultra_mirrors(&self) -> &[Motion] {
        &self.ultra
    }

    fn plevel(&self) -> f64 {
        self.plevel
    }

    fn stretch_factor(&self) -> f64 {
        self.stretch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use curvecast_common::MOTION_TOLERANCE;

    fn empty_world(kind: GeometryKind) -> ReflectionHoneycomb {
        let population = Population {
            solid_per_mille: 0,
            ..Population::default()
        };
        ReflectionHoneycomb::for_kind(kind, population).unwrap()
    }

    #[test]
    fn spherical_honeycomb_closes_with_eight_cells() {
        let mut world = empty_world(GeometryKind::Spherical);
        world.grow(100);
        assert_eq!(world.cell_count(), 8);
        for c in 0..8 {
            for side in 0..6 {
                assert!(world.neighbor(CellId(c), side).is_some());
            }
        }
    }

    #[test]
    fn neighbors_link_back() {
        let mut world = empty_world(GeometryKind::Hyperbolic);
        world.grow(40);
        for c in 0..world.cell_count() as u32 {
            for side in 0..6 {
                if let Some(n) = world.neighbor(CellId(c), side) {
                    assert!(
                        (0..6).any(|j| world.neighbor(n, j) == Some(CellId(c))),
                        "{c} -> {n} has no back link"
                    );
                }
            }
        }
    }

    #[test]
    fn euclidean_cells_are_shared_between_paths() {
        let mut world = empty_world(GeometryKind::Euclidean);
        let root = world.root();
        let a = world.materialize(root, 0).unwrap();
        let ab = world.materialize(a, 1).unwrap();
        let b = world.materialize(root, 1).unwrap();
        let ba = world.materialize(b, 0).unwrap();
        assert_eq!(ab, ba);
        assert_eq!(world.cell_count(), 4);
    }

    #[test]
    fn crossing_is_wall_motion_for_direct_neighbors() {
        let mut world = empty_world(GeometryKind::Hyperbolic);
        let root = world.root();
        world.materialize(root, 2);
        let wall = world.shapes().shape(0).walls()[2];
        assert!(world.crossing(root, 2).approx_eq(&wall, MOTION_TOLERANCE));
    }

    #[test]
    fn product_levels_stack() {
        let mut world = empty_world(GeometryKind::Product(ProductBase::Hyperbolic));
        let root = world.root();
        let up = world.materialize(root, 5).unwrap();
        assert_eq!(world.level(up), 1);
        assert_eq!(world.materialize(up, 4), Some(root));
        assert_eq!(world.crossing(root, 5), Motion::IDENTITY);
        assert_eq!(world.plevel(), PRODUCT_PLEVEL);
    }

    #[test]
    fn ultra_mirrors_only_in_hyperbolic_space() {
        assert_eq!(empty_world(GeometryKind::Hyperbolic).ultra_mirrors().len(), 8);
        assert!(empty_world(GeometryKind::Euclidean).ultra_mirrors().is_empty());
    }

    #[test]
    fn root_is_always_passable() {
        let population = Population {
            solid_per_mille: 1000,
            ..Population::default()
        };
        let world = ReflectionHoneycomb::for_kind(GeometryKind::Spherical, population).unwrap();
        assert_eq!(world.material(world.root()), Material::Empty);
    }

    #[test]
    fn random_fog_is_seeded() {
        let world = empty_world(GeometryKind::Euclidean).with_random_fog(20);
        let fog = world.fog(world.root()).unwrap();
        assert_eq!(fog.a(), 20);
        assert_eq!(world.fog(world.root()), Some(fog));
    }

    #[test]
    fn unsupported_kinds_have_no_honeycomb() {
        assert!(ReflectionHoneycomb::for_kind(GeometryKind::Nil, Population::default()).is_err());
    }
}
