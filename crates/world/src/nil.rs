use crate::graph::{CellGraph, CellId, Material};
use crate::population::{Population, splitmix64};
use crate::shape::{Shape, ShapeTable};
use curvecast_common::{GeometryKind, Motion, Rgba};
use std::collections::HashMap;

/// Integer Heisenberg lattice: one unit box per group element `(a, b, c)`,
/// with `(a, b, c) * (x, y, z) = (a + x, b + y, c + z + a y)`.
#[derive(Debug, Clone)]
pub struct NilLattice {
    shapes: ShapeTable,
    coords: Vec<[i64; 3]>,
    index: HashMap<[i64; 3], CellId>,
    population: Population,
    fog_density: Option<u8>,
}

impl NilLattice {
    pub fn new(population: Population) -> Self {
        let mut lattice = Self {
            shapes: ShapeTable::single(Shape::nil_box()),
            coords: Vec::new(),
            index: HashMap::new(),
            population,
            fog_density: None,
        };
        lattice.insert([0, 0, 0]);
        lattice
    }

    pub fn with_random_fog(mut self, density: u8) -> Self {
        self.fog_density = Some(density);
        self
    }

    pub fn cell_count(&self) -> usize {
        self.coords.len()
    }

    pub fn coordinates(&self, cell: CellId) -> [i64; 3] {
        self.coords[cell.index()]
    }

    pub fn cell_at(&self, coords: [i64; 3]) -> Option<CellId> {
        self.index.get(&coords).copied()
    }

    /// Group element of the neighbor across `side`.
    pub fn step(coords: [i64; 3], side: usize) -> [i64; 3] {
        let [a, b, c] = coords;
        match side {
            0 => [a + 1, b, c],
            1 => [a, b + 1, c + a],
            2 => [a, b, c + 1],
            3 => [a - 1, b, c],
            4 => [a, b - 1, c - a],
            _ => [a, b, c - 1],
        }
    }

    fn key(coords: [i64; 3]) -> u64 {
        coords
            .iter()
            .fold(0x6e69_6c00_u64, |h, &x| splitmix64(h ^ x as u64))
    }

    fn insert(&mut self, coords: [i64; 3]) -> CellId {
        let id = CellId(self.coords.len() as u32);
        self.coords.push(coords);
        self.index.insert(coords, id);
        id
    }
}

impl CellGraph for NilLattice {
    fn kind(&self) -> GeometryKind {
        GeometryKind::Nil
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
        let coords = self.coordinates(cell);
        if coords == [0, 0, 0] {
            return Material::Empty;
        }
        self.population.material(Self::key(coords))
    }

    fn neighbor(&self, cell: CellId, side: usize) -> Option<CellId> {
        self.cell_at(Self::step(self.coordinates(cell), side))
    }

    fn materialize(&mut self, cell: CellId, side: usize) -> Option<CellId> {
        let coords = Self::step(self.coordinates(cell), side);
        Some(match self.cell_at(coords) {
            Some(n) => n,
            None => self.insert(coords),
        })
    }

    /// Every crossing is the left translation by the inverse step, which is
    /// exactly the wall motion of that side.
    fn crossing(&self, _cell: CellId, side: usize) -> Motion {
        self.shapes.shape(0).walls()[side]
    }

    fn fog(&self, cell: CellId) -> Option<Rgba> {
        self.fog_density
            .map(|d| self.population.fog(Self::key(self.coordinates(cell)), d))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use curvecast_geometry::nil_translate;

    #[test]
    fn steps_follow_the_group_law() {
        assert_eq!(NilLattice::step([2, 0, 0], 1), [2, 1, 2]);
        assert_eq!(NilLattice::step([2, 1, 2], 4), [2, 0, 0]);
        for side in 0..6 {
            let there = NilLattice::step([3, -1, 4], side);
            let back = NilLattice::step(there, (side + 3) % 6);
            assert_eq!(back, [3, -1, 4]);
        }
    }

    #[test]
    fn crossing_matches_lattice_positions() {
        let lattice = NilLattice::new(Population::default());
        for side in 0..6 {
            let [a, b, c] = NilLattice::step([0, 0, 0], side);
            let neighbor_center = nil_translate(a as f64, b as f64, c as f64).apply(glam::DVec4::W);
            let seen = lattice.crossing(CellId(0), side).apply(neighbor_center);
            assert!((seen - glam::DVec4::W).length() < 1e-12);
        }
    }

    #[test]
    fn materialize_reuses_cells() {
        let mut lattice = NilLattice::new(Population::default());
        let root = lattice.root();
        let x = lattice.materialize(root, 0).unwrap();
        let back = lattice.materialize(x, 3).unwrap();
        assert_eq!(back, root);
        assert_eq!(lattice.cell_count(), 2);
        assert_eq!(lattice.material(root), Material::Empty);
    }

    #[test]
    fn materials_do_not_depend_on_generation_order() {
        let p = Population::with_seed(5);
        let mut a = NilLattice::new(p);
        let mut b = NilLattice::new(p);
        let ax = a.materialize(a.root(), 0).unwrap();
        let axy = a.materialize(ax, 1).unwrap();
        // z, x, y, -z reaches the same element through different cells
        let mut cell = b.root();
        for side in [2, 0, 1, 5] {
            cell = b.materialize(cell, side).unwrap();
        }
        assert_eq!(a.coordinates(axy), [1, 1, 1]);
        assert_eq!(b.coordinates(cell), [1, 1, 1]);
        assert_eq!(a.material(axy), b.material(cell));
    }
}
