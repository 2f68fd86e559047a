use crate::viewer::{Projection, ViewerPose};
use curvecast_common::{GeometryKind, Motion, RayOptions, Rgba};
use curvecast_geometry::Space;
use curvecast_shader::FeatureFlags;
use curvecast_world::CellGraph;
use glam::{DMat4, DVec2, DVec3};

/// Per-frame scalars shared by the GPU uniform block and the CPU tracer,
/// kept in f64 until upload.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameSetup {
    pub kind: GeometryKind,
    pub flags: FeatureFlags,
    /// Eye motion in the viewer's cell.
    pub start: Motion,
    /// Eye orientation applied to screen directions.
    pub lp: DMat4,
    pub fov: DVec2,
    pub screen_pos: DVec2,
    pub shift: f64,
    pub linear_sight_range: f64,
    pub exp_start: f64,
    pub exp_decay: f64,
    pub hard_limit: Option<f64>,
    pub maxstep: f64,
    pub minstep: f64,
    pub level_lines: f64,
    /// Zero unless reflection is compiled in.
    pub reflectivity: f64,
    pub plevel: f64,
    pub start_level: f64,
    pub near: f64,
    pub far: f64,
    pub chart_half: DVec3,
    pub stretch: f64,
    pub fog_color: Rgba,
    pub start_wall_offset: usize,
    pub start_sides: usize,
    pub max_iterations: u32,
}

impl FrameSetup {
    pub fn new<W: CellGraph + ?Sized>(
        world: &W,
        options: &RayOptions,
        flags: FeatureFlags,
        pose: &ViewerPose,
        projection: &Projection,
    ) -> Self {
        let kind = world.kind();
        let stretch = world.stretch_factor();
        let eye = match (projection.stereo(), Space::for_kind(kind, world.plevel(), stretch)) {
            (true, Some(space)) => space.push_x(projection.eye.sign() * projection.ipd / 2.0),
            _ => Motion::IDENTITY,
        };
        let shape = world.shapes().shape(world.shape_of(pose.cell));
        Self {
            kind,
            flags,
            start: pose.view * eye,
            lp: DMat4::from_mat3(pose.look),
            fov: projection.fov_tangents(),
            screen_pos: projection.screen_center,
            shift: projection.shift(),
            linear_sight_range: options.linear_sight_range,
            exp_start: options.exp_start,
            exp_decay: options.exp_decay_for(kind),
            hard_limit: options.hard_limit,
            maxstep: options.maxstep_for(kind),
            minstep: options.minstep,
            level_lines: options.level_lines,
            reflectivity: if flags.reflect { options.reflectivity } else { 0.0 },
            plevel: world.plevel(),
            start_level: pose.level,
            near: projection.near,
            far: projection.far,
            chart_half: shape.half_extents(),
            stretch,
            fog_color: options.fog_color,
            start_wall_offset: world.wall_offset(pose.cell),
            start_sides: shape.degree(),
            max_iterations: options.max_iterations_for(kind),
        }
    }

    /// Depth-buffer value of a hit at view-space depth `z`.
    pub fn perspective_depth(&self, z: f64) -> f64 {
        let (n, f) = (self.near, self.far);
        let d = ((-n - f) + 2.0 * n * f / z) / (n - f);
        ((d + 1.0) / 2.0).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::viewer::Eye;
    use curvecast_common::Curvature;
    use curvecast_geometry::ConstantModel;
    use curvecast_world::{CellId, Population, ReflectionHoneycomb};

    fn world(kind: GeometryKind) -> ReflectionHoneycomb {
        ReflectionHoneycomb::for_kind(kind, Population::default()).unwrap()
    }

    #[test]
    fn options_flow_into_the_setup() {
        let w = world(GeometryKind::Hyperbolic);
        let options = RayOptions {
            reflectivity: 0.3,
            hard_limit: Some(4.0),
            ..RayOptions::default()
        };
        let flags = FeatureFlags::from_options(&options, false, false);
        let setup = FrameSetup::new(&w, &options, flags, &ViewerPose::at(CellId(0)), &Projection::default());
        assert_eq!(setup.exp_decay, options.exp_decay_exponential);
        assert_eq!(setup.reflectivity, 0.3);
        assert_eq!(setup.hard_limit, Some(4.0));
        assert_eq!(setup.start_sides, 6);
        assert_eq!(setup.max_iterations, options.max_iterations_closed);
    }

    #[test]
    fn reflectivity_needs_the_feature() {
        let w = world(GeometryKind::Euclidean);
        let options = RayOptions {
            reflectivity: 0.3,
            level_lines: 2.0,
            ..RayOptions::default()
        };
        let flags = FeatureFlags::from_options(&options, false, false);
        let setup = FrameSetup::new(&w, &options, flags, &ViewerPose::at(CellId(0)), &Projection::default());
        assert_eq!(setup.reflectivity, 0.0);
    }

    #[test]
    fn stereo_eyes_sit_apart() {
        let w = world(GeometryKind::Euclidean);
        let options = RayOptions::default();
        let flags = FeatureFlags::from_options(&options, false, true);
        let model = ConstantModel::new(Curvature::Zero, 3);
        let mut projection = Projection {
            eye: Eye::Left,
            ipd: 0.2,
            ..Projection::default()
        };
        let left = FrameSetup::new(&w, &options, flags, &ViewerPose::at(CellId(0)), &projection);
        projection.eye = Eye::Right;
        let right = FrameSetup::new(&w, &options, flags, &ViewerPose::at(CellId(0)), &projection);
        let a = left.start.apply(model.origin());
        let b = right.start.apply(model.origin());
        assert!(((a - b).length() - 0.2).abs() < 1e-12);
    }

    #[test]
    fn depth_spans_near_to_far() {
        let w = world(GeometryKind::Euclidean);
        let options = RayOptions::default();
        let flags = FeatureFlags::default();
        let setup = FrameSetup::new(&w, &options, flags, &ViewerPose::at(CellId(0)), &Projection::default());
        assert!(setup.perspective_depth(setup.near).abs() < 1e-9);
        assert!((setup.perspective_depth(setup.far) - 1.0).abs() < 1e-9);
        assert!(setup.perspective_depth(1.0) < setup.perspective_depth(2.0));
    }
}
