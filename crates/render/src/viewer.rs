use crate::classifier::ProjectionMode;
use curvecast_common::{GeometryKind, Motion};
use curvecast_geometry::{LevelSide, Space};
use curvecast_world::{CellGraph, CellId};
use glam::{DMat3, DVec2, DVec3};
use tracing::{debug, warn};

/// Corrections allowed per frame before the frame is abandoned.
pub const MAX_CORRECTIONS: u32 = 100;

/// Relative slack below which a wall does not count as closer.
const CLOSER_EPS: f64 = 1e-9;

/// Where the viewer is: a cell, the motion from viewer-local to cell-local
/// coordinates, and (in product spaces) the level coordinate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewerPose {
    pub cell: CellId,
    pub view: Motion,
    pub level: f64,
    /// Eye orientation relative to the view frame. Products keep pitch here
    /// since `view` only moves the base.
    pub look: DMat3,
}

impl ViewerPose {
    pub fn at(cell: CellId) -> Self {
        Self {
            cell,
            view: Motion::IDENTITY,
            level: 0.0,
            look: DMat3::IDENTITY,
        }
    }

    pub fn with_view(mut self, view: Motion) -> Self {
        self.view = view;
        self
    }

    pub fn with_level(mut self, level: f64) -> Self {
        self.level = level;
        self
    }

    pub fn with_look(mut self, look: DMat3) -> Self {
        self.look = look;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Eye {
    #[default]
    Mono,
    Left,
    Right,
}

impl Eye {
    pub fn sign(self) -> f64 {
        match self {
            Eye::Mono => 0.0,
            Eye::Left => -1.0,
            Eye::Right => 1.0,
        }
    }
}

/// Screen mapping of one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projection {
    pub mode: ProjectionMode,
    /// Horizontal field of view.
    pub fov_degrees: f64,
    pub width: u32,
    pub height: u32,
    /// Center of projection in normalized device coordinates.
    pub screen_center: DVec2,
    pub eye: Eye,
    /// Distance between the eyes, in world units.
    pub ipd: f64,
    /// Per-eye frustum shift, in tangent units at unit depth.
    pub eye_shift: f64,
    pub near: f64,
    pub far: f64,
}

impl Default for Projection {
    fn default() -> Self {
        Self {
            mode: ProjectionMode::Perspective,
            fov_degrees: 90.0,
            width: 640,
            height: 480,
            screen_center: DVec2::ZERO,
            eye: Eye::Mono,
            ipd: 0.05,
            eye_shift: 0.03,
            near: 0.01,
            far: 100.0,
        }
    }
}

impl Projection {
    pub fn sized(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..Default::default()
        }
    }

    /// Half-screen tangents `(x, y)`.
    pub fn fov_tangents(&self) -> DVec2 {
        let t = (self.fov_degrees.to_radians() / 2.0).tan();
        let aspect = self.height.max(1) as f64 / self.width.max(1) as f64;
        DVec2::new(t, t * aspect)
    }

    pub fn stereo(&self) -> bool {
        self.eye != Eye::Mono
    }

    /// Frustum shift added to the horizontal ray tangent.
    pub fn shift(&self) -> f64 {
        -self.eye.sign() * self.eye_shift
    }

    /// Unnormalized view-frame direction through `ndc`, the way the screen
    /// stage computes it.
    pub fn direction(&self, ndc: DVec2) -> DVec3 {
        let mut at = (ndc - self.screen_center) * self.fov_tangents();
        if self.stereo() {
            at.x += self.shift();
        }
        at.extend(1.0)
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CorrectionError {
    #[error("viewer still outside its cell after {steps} corrections")]
    Exhausted { steps: u32 },
    #[error("viewer belongs across side {side} of {cell}, which has no neighbor")]
    NoNeighbor { cell: CellId, side: usize },
    #[error("no ambient model for geometry {0}")]
    Unsupported(GeometryKind),
}

/// Side whose neighbor center is closer to the viewer than the current
/// cell's center, if any. Product levels take precedence.
fn closer_side<W: CellGraph + ?Sized>(world: &W, space: &Space, pose: &ViewerPose) -> Option<usize> {
    let kind = world.kind();
    let degree = world.degree(pose.cell);
    if kind.is_product() {
        let plevel = world.plevel();
        if pose.level > plevel {
            return Some(LevelSide::Ceiling.side(degree));
        }
        if pose.level < -plevel {
            return Some(LevelSide::Floor.side(degree));
        }
    }
    let p = pose.view.apply(space.origin());
    let here = space.origin_distance(p, pose.level);
    let lateral = if kind.is_product() { degree - 2 } else { degree };
    let offset = world.wall_offset(pose.cell);
    let walls = world.shapes().walls().skip(offset).take(lateral);
    walls.enumerate().find_map(|(side, wall)| {
        let there = space.origin_distance(wall.apply(p), pose.level);
        (there < here - CLOSER_EPS * here.max(1.0)).then_some(side)
    })
}

/// Move the viewer into whichever cell it actually stands in, returning
/// the number of corrections applied.
///
/// Each correction steps into the neighbor whose center is closer and
/// rewrites `view` through the crossing motion. After
/// [`MAX_CORRECTIONS`], or when the closer neighbor does not exist, the
/// pose is left as it is and the frame should be abandoned.
pub fn correct_viewer<W: CellGraph + ?Sized>(
    world: &mut W,
    pose: &mut ViewerPose,
) -> Result<u32, CorrectionError> {
    let kind = world.kind();
    let plevel = world.plevel();
    let space = Space::for_kind(kind, plevel, world.stretch_factor())
        .ok_or(CorrectionError::Unsupported(kind))?;

    let mut steps = 0;
    while let Some(side) = closer_side(&*world, &space, pose) {
        if steps == MAX_CORRECTIONS {
            warn!(cell = %pose.cell, steps, "self-correction did not settle, dropping frame");
            return Err(CorrectionError::Exhausted { steps });
        }
        let degree = world.degree(pose.cell);
        let Some(next) = world.materialize(pose.cell, side) else {
            warn!(cell = %pose.cell, side, "no neighbor to correct into, dropping frame");
            return Err(CorrectionError::NoNeighbor {
                cell: pose.cell,
                side,
            });
        };
        pose.view = world.crossing(pose.cell, side) * pose.view;
        if kind.is_product() {
            if side == LevelSide::Floor.side(degree) {
                pose.level += 2.0 * plevel;
            } else if side == LevelSide::Ceiling.side(degree) {
                pose.level -= 2.0 * plevel;
            }
        }
        debug!(from = %pose.cell, to = %next, side, "viewer corrected");
        pose.cell = next;
        steps += 1;
    }
    Ok(steps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use curvecast_common::{Curvature, ProductBase, Rgba};
    use curvecast_geometry::{ConstantModel, square_inradius};
    use curvecast_world::{Material, Population, ReflectionHoneycomb, Shape, ShapeTable};
    use glam::DVec4;

    fn empty(kind: GeometryKind) -> ReflectionHoneycomb {
        let population = Population {
            solid_per_mille: 0,
            ..Population::default()
        };
        ReflectionHoneycomb::for_kind(kind, population).unwrap()
    }

    #[test]
    fn one_step_past_a_wall_takes_one_correction() {
        let mut world = empty(GeometryKind::Euclidean);
        let model = ConstantModel::new(Curvature::Zero, 3);
        let mut pose = ViewerPose::at(world.root()).with_view(model.push(0, 0.7));
        assert_eq!(correct_viewer(&mut world, &mut pose), Ok(1));
        assert_ne!(pose.cell, world.root());
        let p = pose.view.apply(model.origin());
        assert!((model.origin_distance(p) - 0.3).abs() < 1e-9);
    }

    #[test]
    fn corrected_pose_is_stable() {
        let mut world = empty(GeometryKind::Hyperbolic);
        let model = ConstantModel::new(Curvature::Negative, 3);
        let mut pose =
            ViewerPose::at(world.root()).with_view(model.push(0, 1.5) * model.push(1, 0.8));
        let steps = correct_viewer(&mut world, &mut pose).unwrap();
        assert!(steps >= 1);
        assert_eq!(correct_viewer(&mut world, &mut pose), Ok(0));
    }

    #[test]
    fn inside_viewer_is_left_alone() {
        let mut world = empty(GeometryKind::Spherical);
        let mut pose = ViewerPose::at(world.root());
        assert_eq!(correct_viewer(&mut world, &mut pose), Ok(0));
        assert_eq!(pose.view, Motion::IDENTITY);
    }

    #[test]
    fn product_level_overflow_moves_up_a_layer() {
        let mut world = empty(GeometryKind::Product(ProductBase::Hyperbolic));
        let mut pose = ViewerPose::at(world.root()).with_level(0.7);
        assert_eq!(correct_viewer(&mut world, &mut pose), Ok(1));
        assert!((pose.level + 0.3).abs() < 1e-12);
        assert_eq!(world.level(pose.cell), 1);
    }

    /// A world whose single wall always looks closer and whose crossing
    /// never moves the viewer.
    struct Treadmill {
        shapes: ShapeTable,
    }

    impl Treadmill {
        fn new() -> Self {
            let model = ConstantModel::new(Curvature::Zero, 3);
            let shape = Shape::new(vec![model.push(0, -1.0)], vec![Vec::new()], DVec3::splat(0.5));
            Self {
                shapes: ShapeTable::single(shape),
            }
        }
    }

    impl CellGraph for Treadmill {
        fn kind(&self) -> GeometryKind {
            GeometryKind::Euclidean
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
        fn material(&self, _cell: CellId) -> Material {
            Material::Tinted(Rgba::TRANSPARENT)
        }
        fn neighbor(&self, _cell: CellId, _side: usize) -> Option<CellId> {
            Some(CellId(0))
        }
        fn crossing(&self, _cell: CellId, _side: usize) -> Motion {
            Motion::IDENTITY
        }
    }

    #[test]
    fn runaway_correction_gives_up_after_the_limit() {
        let mut world = Treadmill::new();
        let model = ConstantModel::new(Curvature::Zero, 3);
        let mut pose = ViewerPose::at(CellId(0)).with_view(model.push(0, 1.0));
        assert_eq!(
            correct_viewer(&mut world, &mut pose),
            Err(CorrectionError::Exhausted {
                steps: MAX_CORRECTIONS
            })
        );
        assert_eq!(pose.view.apply(DVec4::W), model.push(0, 1.0).apply(DVec4::W));
    }

    /// Product world whose root is a seven-sided prism and whose other
    /// cells are square prisms, stacked with identity crossings.
    struct MixedPrisms {
        shapes: ShapeTable,
    }

    impl MixedPrisms {
        fn new() -> Self {
            let model = ConstantModel::new(Curvature::Zero, 2);
            let square = Shape::square_prism(&model, square_inradius(Curvature::Zero, 4), 0.5);
            let mut walls = square.walls().to_vec();
            walls.insert(4, model.push(0, 3.0));
            let polygons = vec![Vec::new(); walls.len()];
            let wide = Shape::new(walls, polygons, square.half_extents());
            assert_eq!(wide.degree(), 7);
            Self {
                shapes: ShapeTable::new(vec![wide, square]),
            }
        }
    }

    impl CellGraph for MixedPrisms {
        fn kind(&self) -> GeometryKind {
            GeometryKind::Product(ProductBase::Euclidean)
        }
        fn shapes(&self) -> &ShapeTable {
            &self.shapes
        }
        fn shape_of(&self, cell: CellId) -> usize {
            usize::from(cell != CellId(0))
        }
        fn root(&self) -> CellId {
            CellId(0)
        }
        fn material(&self, _cell: CellId) -> Material {
            Material::Tinted(Rgba::TRANSPARENT)
        }
        fn neighbor(&self, cell: CellId, _side: usize) -> Option<CellId> {
            Some(CellId(cell.0 + 1))
        }
        fn crossing(&self, _cell: CellId, _side: usize) -> Motion {
            Motion::IDENTITY
        }
        fn plevel(&self) -> f64 {
            0.5
        }
    }

    #[test]
    fn level_sides_follow_the_current_cell_shape() {
        let mut world = MixedPrisms::new();
        let mut pose = ViewerPose::at(world.root()).with_level(1.7);
        assert_eq!(correct_viewer(&mut world, &mut pose), Ok(2));
        assert!((pose.level + 0.3).abs() < 1e-12);
        assert_eq!(pose.cell, CellId(2));
    }

    /// Euclidean cube world where nothing has a neighbor.
    struct Island {
        shapes: ShapeTable,
    }

    impl CellGraph for Island {
        fn kind(&self) -> GeometryKind {
            GeometryKind::Euclidean
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
        fn material(&self, _cell: CellId) -> Material {
            Material::Tinted(Rgba::TRANSPARENT)
        }
        fn neighbor(&self, _cell: CellId, _side: usize) -> Option<CellId> {
            None
        }
        fn crossing(&self, _cell: CellId, _side: usize) -> Motion {
            Motion::IDENTITY
        }
    }

    #[test]
    fn missing_neighbor_abandons_the_frame() {
        let model = ConstantModel::new(Curvature::Zero, 3);
        let mut world = Island {
            shapes: ShapeTable::single(Shape::cube(&model, 0.5)),
        };
        let start = model.push(0, 0.7);
        let mut pose = ViewerPose::at(world.root()).with_view(start);
        assert_eq!(
            correct_viewer(&mut world, &mut pose),
            Err(CorrectionError::NoNeighbor {
                cell: CellId(0),
                side: 0
            })
        );
        assert_eq!(pose.cell, CellId(0));
        assert_eq!(pose.view, start);
    }

    #[test]
    fn stereo_shift_opposes_the_eye() {
        let mut projection = Projection::sized(200, 100);
        assert!((projection.fov_tangents().x - 1.0).abs() < 1e-12);
        assert!((projection.fov_tangents().y - 0.5).abs() < 1e-12);
        let mono = projection.direction(DVec2::ZERO);
        assert_eq!(mono, DVec3::Z);
        projection.eye = Eye::Right;
        assert!(projection.direction(DVec2::ZERO).x < 0.0);
        projection.eye = Eye::Left;
        assert!(projection.direction(DVec2::ZERO).x > 0.0);
    }
}
