use curvecast_common::{GeometryKind, Motion};
use curvecast_geometry::{Chart, ConstantModel, nil_translate};
use glam::{DMat4, DVec2, DVec3, DVec4};

/// One triangle of a wall polygon, stored as the two rows of the inverse of
/// `[a b c n]`: `x · p` and `y · p` are the barycentric weights of the outer
/// corners `a` and `b` for a chart point `p`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WallTriangle {
    pub side: usize,
    pub x: DVec4,
    pub y: DVec4,
}

impl WallTriangle {
    fn new(side: usize, a: DVec4, b: DVec4, c: DVec4) -> Option<Self> {
        let n = (a - c).truncate().cross((b - c).truncate());
        let m = DMat4::from_cols(a, b, c, n.extend(0.0));
        if m.determinant().abs() < 1e-12 {
            return None;
        }
        let inv = m.inverse();
        Some(Self {
            side,
            x: inv.row(0),
            y: inv.row(1),
        })
    }

    /// In-face coordinates of `p`: `x` runs from 0 at the polygon center to 1
    /// on its edge, `y` across the triangle. `None` when `p` projects outside.
    pub fn inface(&self, p: DVec4) -> Option<DVec2> {
        const SLACK: f64 = 1e-9;
        let v = DVec2::new(self.x.dot(p), self.y.dot(p));
        if v.x >= -SLACK && v.y >= -SLACK && v.x + v.y <= 1.0 + SLACK {
            Some(DVec2::new(v.x + v.y, v.x - v.y))
        } else {
            None
        }
    }
}

/// Cell shape: wall motions, wall polygons, and the half extents of its
/// box chart.
///
/// Polygon vertices live in the texture chart of the geometry: the
/// projective chart `p / p[axis]` for constant curvature, `(x, y, level, 1)`
/// for products, the group chart for Nil and Solv.
#[derive(Debug, Clone, PartialEq)]
pub struct Shape {
    walls: Vec<Motion>,
    polygons: Vec<Vec<DVec4>>,
    half: DVec3,
}

impl Shape {
    pub fn new(walls: Vec<Motion>, polygons: Vec<Vec<DVec4>>, half: DVec3) -> Self {
        debug_assert_eq!(walls.len(), polygons.len());
        Self {
            walls,
            polygons,
            half,
        }
    }

    /// Regular cube of inradius `inradius`, faces numbered
    /// `0:+x 1:+y 2:+z 3:-x 4:-y 5:-z`.
    pub fn cube(model: &ConstantModel, inradius: f64) -> Self {
        let k = model.chart_coordinate(inradius);
        let mut walls = Vec::with_capacity(6);
        let mut polygons = Vec::with_capacity(6);
        for face in 0..6 {
            let (axis, sign) = face_axis(face, 3);
            walls.push(model.bisector_mirror(model.face_center(axis, sign, inradius)));
            polygons.push(box_face(axis, sign, DVec3::splat(k)));
        }
        Self::new(walls, polygons, DVec3::splat(k))
    }

    /// Square prism of a product space: sides `0:+x 1:+y 2:-x 3:-y` in the
    /// base, then floor and ceiling.
    pub fn square_prism(base: &ConstantModel, inradius: f64, plevel: f64) -> Self {
        let k = base.chart_coordinate(inradius);
        let half = DVec3::new(k, k, plevel);
        let mut walls = Vec::with_capacity(6);
        let mut polygons = Vec::with_capacity(6);
        for face in 0..4 {
            let (axis, sign) = face_axis(face, 2);
            walls.push(base.bisector_mirror(base.face_center(axis, sign, inradius)));
            polygons.push(box_face(axis, sign, half));
        }
        for sign in [-1.0, 1.0] {
            walls.push(Motion::IDENTITY);
            polygons.push(box_face(2, sign, half));
        }
        Self::new(walls, polygons, half)
    }

    /// Unit box of the integer Heisenberg lattice.
    pub fn nil_box() -> Self {
        let half = DVec3::splat(0.5);
        let mut walls = Vec::with_capacity(6);
        let mut polygons = Vec::with_capacity(6);
        for face in 0..6 {
            let (axis, sign) = face_axis(face, 3);
            let mut step = DVec3::ZERO;
            step[axis] = -sign;
            walls.push(nil_translate(step.x, step.y, step.z));
            polygons.push(box_face(axis, sign, half));
        }
        Self::new(walls, polygons, half)
    }

    pub fn degree(&self) -> usize {
        self.walls.len()
    }

    pub fn walls(&self) -> &[Motion] {
        &self.walls
    }

    pub fn polygon(&self, side: usize) -> &[DVec4] {
        &self.polygons[side]
    }

    pub fn half_extents(&self) -> DVec3 {
        self.half
    }

    /// Fan every wall polygon around its centroid.
    pub fn triangles(&self) -> Vec<WallTriangle> {
        let mut out = Vec::new();
        for (side, poly) in self.polygons.iter().enumerate() {
            if poly.len() < 3 {
                continue;
            }
            let c = poly.iter().copied().sum::<DVec4>() / poly.len() as f64;
            for j in 0..poly.len() {
                let (a, b) = (poly[j], poly[(j + 1) % poly.len()]);
                if let Some(t) = WallTriangle::new(side, a, b, c) {
                    out.push(t);
                }
            }
        }
        out
    }
}

/// Axis and direction of box face `face` in a `dims`-dimensional box.
pub fn face_axis(face: usize, dims: usize) -> (usize, f64) {
    let sign = if face < dims { 1.0 } else { -1.0 };
    (face % dims, sign)
}

fn box_face(axis: usize, sign: f64, half: DVec3) -> Vec<DVec4> {
    let (j, l) = ((axis + 1) % 3, (axis + 2) % 3);
    [(1.0, 1.0), (-1.0, 1.0), (-1.0, -1.0), (1.0, -1.0)]
        .into_iter()
        .map(|(a, b)| {
            let mut v = DVec4::W;
            v[axis] = sign * half[axis];
            v[j] = a * half[j];
            v[l] = b * half[l];
            v
        })
        .collect()
}

/// All shapes of a world, with walls laid out back to back.
#[derive(Debug, Clone, PartialEq)]
pub struct ShapeTable {
    shapes: Vec<Shape>,
    offsets: Vec<usize>,
}

impl ShapeTable {
    pub fn new(shapes: Vec<Shape>) -> Self {
        let mut offsets = Vec::with_capacity(shapes.len());
        let mut total = 0;
        for s in &shapes {
            offsets.push(total);
            total += s.degree();
        }
        Self { shapes, offsets }
    }

    pub fn single(shape: Shape) -> Self {
        Self::new(vec![shape])
    }

    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }

    pub fn shape(&self, index: usize) -> &Shape {
        &self.shapes[index]
    }

    pub fn shapes(&self) -> &[Shape] {
        &self.shapes
    }

    pub fn wall_offset(&self, index: usize) -> usize {
        self.offsets[index]
    }

    pub fn total_walls(&self) -> usize {
        self.shapes.iter().map(Shape::degree).sum()
    }

    pub fn max_degree(&self) -> usize {
        self.shapes.iter().map(Shape::degree).max().unwrap_or(0)
    }

    /// Every wall motion in table order.
    pub fn walls(&self) -> impl Iterator<Item = &Motion> {
        self.shapes.iter().flat_map(|s| s.walls.iter())
    }

    /// Triangles of every wall in table order, with the index of each wall's
    /// first triangle (one entry per wall plus a final end marker).
    pub fn triangles(&self) -> (Vec<WallTriangle>, Vec<usize>) {
        let mut all = Vec::new();
        let mut starts = Vec::with_capacity(self.total_walls() + 1);
        for shape in &self.shapes {
            let tris = shape.triangles();
            for side in 0..shape.degree() {
                starts.push(all.len());
                all.extend(tris.iter().filter(|t| t.side == side).copied());
            }
        }
        starts.push(all.len());
        (all, starts)
    }

    /// Validity chart of a shape for the step-based geometries.
    pub fn chart(&self, kind: GeometryKind, index: usize) -> Option<Chart> {
        let shape = &self.shapes[index];
        match kind {
            GeometryKind::Nil => Some(Chart::nil()),
            GeometryKind::Solv => Some(Chart::Box {
                half: shape.half,
                twisted: false,
            }),
            GeometryKind::Stretched => Some(Chart::Voronoi {
                walls: shape.walls.iter().map(Motion::matrix).collect(),
            }),
            _ => None,
        }
    }
}
