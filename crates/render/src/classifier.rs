use curvecast_common::{GeometryKind, RaycasterUsage};

/// How the host maps view directions to the screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProjectionMode {
    #[default]
    Perspective,
    /// Directions follow geodesics of a nonisotropic space.
    Geodesic,
    /// Any other model projection (Poincaré ball, half-space, ...).
    Other,
}

/// Geometry and render-mode state the classifier looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassifierInput {
    pub kind: GeometryKind,
    pub projection: ProjectionMode,
    /// Dimension of the rendered world.
    pub dimension: u8,
    pub gpu: bool,
    /// The geometry can only be drawn by ray marching.
    pub ray_only: bool,
    /// Another texture pipeline owns the frame.
    pub texture_mode: bool,
    pub quotient: bool,
    pub racing: bool,
    /// A wrapped geometry imitating another.
    pub wrapped: bool,
}

impl ClassifierInput {
    pub fn new(kind: GeometryKind) -> Self {
        let projection = if matches!(kind, GeometryKind::Nil | GeometryKind::Solv) {
            ProjectionMode::Geodesic
        } else {
            ProjectionMode::Perspective
        };
        Self {
            kind,
            projection,
            dimension: 3,
            gpu: true,
            ray_only: false,
            texture_mode: false,
            quotient: false,
            racing: false,
            wrapped: false,
        }
    }
}

/// Whether a tracer exists for this geometry and projection at all.
pub fn available(input: &ClassifierInput) -> bool {
    if !input.gpu || input.dimension != 3 {
        return false;
    }
    match input.kind {
        GeometryKind::Hyperbolic
        | GeometryKind::Spherical
        | GeometryKind::Euclidean
        | GeometryKind::Stretched => input.projection == ProjectionMode::Perspective,
        GeometryKind::Nil | GeometryKind::Solv => input.projection == ProjectionMode::Geodesic,
        GeometryKind::Product(_) => true,
        GeometryKind::Other => false,
    }
}

/// Decides whether ray marching should engage this frame.
pub trait EngagementPolicy {
    fn requested(&self, input: &ClassifierInput, usage: RaycasterUsage) -> bool;
}

/// The stock heuristic: forced geometries always engage, `never` and
/// foreign texture modes never do, `always` engages wherever available, and
/// `smart` only where the polygon renderer is known to struggle (quotient
/// spaces, racing, wrapped geometries).
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultPolicy;

impl EngagementPolicy for DefaultPolicy {
    fn requested(&self, input: &ClassifierInput, usage: RaycasterUsage) -> bool {
        if input.ray_only || input.kind == GeometryKind::Stretched {
            return true;
        }
        if usage == RaycasterUsage::Never || input.texture_mode || !available(input) {
            return false;
        }
        match usage {
            RaycasterUsage::Always => true,
            _ => input.racing || input.quotient || input.wrapped,
        }
    }
}

impl<F> EngagementPolicy for F
where
    F: Fn(&ClassifierInput, RaycasterUsage) -> bool,
{
    fn requested(&self, input: &ClassifierInput, usage: RaycasterUsage) -> bool {
        self(input, usage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use curvecast_common::ProductBase;

    #[test]
    fn availability_by_geometry_and_projection() {
        for kind in [
            GeometryKind::Hyperbolic,
            GeometryKind::Spherical,
            GeometryKind::Euclidean,
            GeometryKind::Nil,
            GeometryKind::Solv,
            GeometryKind::Product(ProductBase::Spherical),
            GeometryKind::Stretched,
        ] {
            assert!(available(&ClassifierInput::new(kind)), "{kind}");
        }
        assert!(!available(&ClassifierInput::new(GeometryKind::Other)));

        let mut nil = ClassifierInput::new(GeometryKind::Nil);
        nil.projection = ProjectionMode::Perspective;
        assert!(!available(&nil));

        let mut h = ClassifierInput::new(GeometryKind::Hyperbolic);
        h.projection = ProjectionMode::Other;
        assert!(!available(&h));
        h.projection = ProjectionMode::Perspective;
        h.dimension = 2;
        assert!(!available(&h));
    }

    #[test]
    fn products_ignore_projection() {
        let mut p = ClassifierInput::new(GeometryKind::Product(ProductBase::Euclidean));
        p.projection = ProjectionMode::Other;
        assert!(available(&p));
    }

    #[test]
    fn default_policy_layers_usage_on_availability() {
        let policy = DefaultPolicy;
        let e = ClassifierInput::new(GeometryKind::Euclidean);
        assert!(policy.requested(&e, RaycasterUsage::Always));
        assert!(!policy.requested(&e, RaycasterUsage::Smart));
        assert!(!policy.requested(&e, RaycasterUsage::Never));

        let quotient = ClassifierInput {
            quotient: true,
            ..e
        };
        assert!(policy.requested(&quotient, RaycasterUsage::Smart));

        let textured = ClassifierInput {
            texture_mode: true,
            ..e
        };
        assert!(!policy.requested(&textured, RaycasterUsage::Always));
    }

    #[test]
    fn forced_geometries_override_usage() {
        let policy = DefaultPolicy;
        let stretched = ClassifierInput::new(GeometryKind::Stretched);
        assert!(policy.requested(&stretched, RaycasterUsage::Never));
        let forced = ClassifierInput {
            ray_only: true,
            ..ClassifierInput::new(GeometryKind::Hyperbolic)
        };
        assert!(policy.requested(&forced, RaycasterUsage::Never));
    }

    #[test]
    fn closures_are_policies() {
        let never = |_: &ClassifierInput, _: RaycasterUsage| false;
        assert!(!never.requested(&ClassifierInput::new(GeometryKind::Euclidean), RaycasterUsage::Always));
    }
}
