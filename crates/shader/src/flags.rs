use curvecast_common::{GeometryKind, RayOptions};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Structural features compiled into a tracer program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct FeatureFlags {
    pub reflect: bool,
    pub volumetric: bool,
    pub level_lines: bool,
    /// Per-cell wall offset and side count are re-read on every crossing.
    pub multi_shape: bool,
    pub ultra_mirrors: bool,
    pub stereo: bool,
    pub hard_limit: bool,
}

impl FeatureFlags {
    pub fn from_options(options: &RayOptions, multi_shape: bool, stereo: bool) -> Self {
        Self {
            // level lines and mirrors both claim the first opaque hit
            reflect: options.reflective() && options.level_lines <= 0.0,
            volumetric: options.volumetric,
            level_lines: options.level_lines > 0.0,
            multi_shape,
            ultra_mirrors: options.ultra_mirrors,
            stereo,
            hard_limit: options.hard_limit.is_some(),
        }
    }

    /// Drop features the geometry cannot express: Nil walls do not
    /// reflect, and ultra-mirrors exist only in hyperbolic space.
    pub fn normalized(mut self, kind: GeometryKind) -> Self {
        if kind == GeometryKind::Nil {
            self.reflect = false;
        }
        if kind != GeometryKind::Hyperbolic {
            self.ultra_mirrors = false;
        }
        self
    }

    /// Whether the transform table carries a mirror block.
    pub fn needs_mirrors(&self) -> bool {
        self.reflect || self.ultra_mirrors
    }

    fn names(&self) -> impl Iterator<Item = &'static str> {
        [
            (self.reflect, "reflect"),
            (self.volumetric, "volumetric"),
            (self.level_lines, "levels"),
            (self.multi_shape, "multi"),
            (self.ultra_mirrors, "ultra"),
            (self.stereo, "stereo"),
            (self.hard_limit, "limit"),
        ]
        .into_iter()
        .filter_map(|(on, name)| on.then_some(name))
    }
}

/// Everything a tracer program is specialized on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgramSpec {
    pub kind: GeometryKind,
    pub flags: FeatureFlags,
    /// Wall motions across all shapes.
    pub walls: usize,
    /// Wall-polygon triangles across all shapes.
    pub triangles: usize,
    pub max_iterations: u32,
    pub transform_limit: usize,
}

impl ProgramSpec {
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint {
            kind: self.kind,
            flags: self.flags.normalized(self.kind),
            walls: self.walls,
            triangles: self.triangles,
            max_iterations: self.max_iterations,
            transform_limit: self.transform_limit,
        }
    }
}

/// Structural key of a program variant. Two frames with equal fingerprints
/// can share a compiled program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    pub kind: GeometryKind,
    pub flags: FeatureFlags,
    pub walls: usize,
    pub triangles: usize,
    pub max_iterations: u32,
    pub transform_limit: usize,
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        for name in self.flags.names() {
            write!(f, "+{name}")?;
        }
        write!(
            f,
            "/w{}/t{}/i{}/l{}",
            self.walls, self.triangles, self.max_iterations, self.transform_limit
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(kind: GeometryKind, flags: FeatureFlags) -> ProgramSpec {
        ProgramSpec {
            kind,
            flags,
            walls: 6,
            triangles: 24,
            max_iterations: 60,
            transform_limit: 110,
        }
    }

    #[test]
    fn nil_never_reflects() {
        let flags = FeatureFlags {
            reflect: true,
            ultra_mirrors: true,
            ..Default::default()
        };
        let n = flags.normalized(GeometryKind::Nil);
        assert!(!n.reflect);
        assert!(!n.ultra_mirrors);
        let h = flags.normalized(GeometryKind::Hyperbolic);
        assert!(h.reflect && h.ultra_mirrors);
    }

    #[test]
    fn irrelevant_flags_do_not_split_fingerprints() {
        let a = spec(GeometryKind::Euclidean, FeatureFlags::default());
        let b = spec(
            GeometryKind::Euclidean,
            FeatureFlags {
                ultra_mirrors: true,
                ..Default::default()
            },
        );
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn fingerprint_display_lists_features() {
        let fp = spec(
            GeometryKind::Hyperbolic,
            FeatureFlags {
                reflect: true,
                volumetric: true,
                ..Default::default()
            },
        )
        .fingerprint();
        assert_eq!(fp.to_string(), "h3+reflect+volumetric/w6/t24/i60/l110");
    }

    #[test]
    fn options_drive_flags() {
        let options = RayOptions {
            reflectivity: 0.3,
            hard_limit: Some(5.0),
            ..RayOptions::default()
        };
        let flags = FeatureFlags::from_options(&options, false, true);
        assert!(flags.reflect && flags.hard_limit && flags.stereo);
        assert!(!flags.volumetric && !flags.level_lines);

        let lined = RayOptions {
            level_lines: 2.0,
            ..options
        };
        assert!(!FeatureFlags::from_options(&lined, false, false).reflect);
    }
}
