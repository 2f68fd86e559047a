use crate::flags::{Fingerprint, ProgramSpec};
use crate::fragments as frag;
use curvecast_common::{GeometryKind, MarchFamily, ProductBase};
use sha2::{Digest, Sha256};
use tracing::debug;

/// Largest uniform binding the backend guarantees.
pub const MAX_UNIFORM_BYTES: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ShaderError {
    #[error("no tracer exists for geometry {0}")]
    UnsupportedGeometry(GeometryKind),
    #[error("{table} needs {bytes} bytes, over the {MAX_UNIFORM_BYTES}-byte uniform limit")]
    TableTooLarge { table: &'static str, bytes: usize },
    #[error("the shape table has no walls")]
    EmptyWallTable,
}

/// Generated program: a shared prelude, the screen-filling vertex stage and
/// the per-pixel tracer stage.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgramSource {
    pub fingerprint: Fingerprint,
    pub prelude: String,
    pub screen_stage: String,
    pub tracer_stage: String,
}

impl ProgramSource {
    pub const VERTEX_ENTRY: &'static str = "vs_screen";
    pub const FRAGMENT_ENTRY: &'static str = "fs_trace";

    /// One WGSL module holding both stages.
    pub fn wgsl(&self) -> String {
        let mut out =
            String::with_capacity(self.prelude.len() + self.screen_stage.len() + self.tracer_stage.len());
        out.push_str(&self.prelude);
        out.push_str(&self.screen_stage);
        out.push_str(&self.tracer_stage);
        out
    }

    /// Hex SHA-256 of the module text.
    pub fn digest(&self) -> String {
        let hash = Sha256::digest(self.wgsl().as_bytes());
        hash.iter().map(|b| format!("{b:02x}")).collect()
    }
}

/// Walls uniform sizes: triangle rows and packed start indices.
fn wall_block_dims(spec: &ProgramSpec) -> (usize, usize) {
    (spec.triangles.max(1), (spec.walls + 1).div_ceil(4))
}

/// Assembles a [`ProgramSource`] from the fragment table.
pub struct ProgramBuilder {
    spec: ProgramSpec,
    fingerprint: Fingerprint,
}

impl ProgramBuilder {
    pub fn new(spec: ProgramSpec) -> Self {
        Self {
            fingerprint: spec.fingerprint(),
            spec,
        }
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    pub fn build(&self) -> Result<ProgramSource, ShaderError> {
        let _span = tracing::debug_span!("synthesize", fingerprint = %self.fingerprint).entered();
        self.check_limits()?;

        let source = ProgramSource {
            fingerprint: self.fingerprint,
            prelude: self.prelude(),
            screen_stage: self.screen_stage(),
            tracer_stage: self.tracer_stage(),
        };
        debug!(
            bytes = source.prelude.len() + source.screen_stage.len() + source.tracer_stage.len(),
            "program assembled"
        );
        Ok(source)
    }

    fn check_limits(&self) -> Result<(), ShaderError> {
        let kind = self.fingerprint.kind;
        if kind.family() == MarchFamily::Unsupported {
            return Err(ShaderError::UnsupportedGeometry(kind));
        }
        if self.spec.walls == 0 {
            return Err(ShaderError::EmptyWallTable);
        }
        let transforms = self.spec.transform_limit * 64;
        if transforms > MAX_UNIFORM_BYTES {
            return Err(ShaderError::TableTooLarge {
                table: "transform table",
                bytes: transforms,
            });
        }
        let (triangles, starts) = wall_block_dims(&self.spec);
        let walls = triangles * 32 + starts * 16;
        if walls > MAX_UNIFORM_BYTES {
            return Err(ShaderError::TableTooLarge {
                table: "wall-polygon table",
                bytes: walls,
            });
        }
        Ok(())
    }

    fn prelude(&self) -> String {
        let (triangles, starts) = wall_block_dims(&self.spec);
        frag::PRELUDE
            .replace("{MAX_ITER}", &self.spec.max_iterations.to_string())
            .replace("{LIMIT}", &self.spec.transform_limit.to_string())
            .replace("{TRIANGLES}", &triangles.to_string())
            .replace("{STARTS}", &starts.to_string())
    }

    fn screen_stage(&self) -> String {
        let shift = if self.fingerprint.flags.stereo {
            frag::STEREO_SHIFT
        } else {
            ""
        };
        frag::SCREEN_STAGE.replace("{STEREO}", shift)
    }

    /// Geometry-specific functions: the closed-form solver templated on the
    /// time-like axis, or the flow of a step-based space plus its chart.
    fn geometry_functions(&self) -> String {
        let kind = self.fingerprint.kind;
        let timelike = if kind.is_product() { "z" } else { "w" };
        match kind {
            GeometryKind::Hyperbolic | GeometryKind::Product(ProductBase::Hyperbolic) => {
                frag::HYPERBOLIC.replace("{A}", timelike)
            }
            GeometryKind::Spherical | GeometryKind::Product(ProductBase::Spherical) => {
                frag::SPHERICAL.replace("{A}", timelike)
            }
            GeometryKind::Euclidean | GeometryKind::Product(ProductBase::Euclidean) => {
                frag::EUCLIDEAN.to_string()
            }
            GeometryKind::Nil => [
                frag::FLOW,
                frag::NIL_FLOW,
                frag::BOX_CHART.replace("{TWIST}", frag::NIL_TWIST).as_str(),
            ]
            .concat(),
            GeometryKind::Solv => [
                frag::FLOW,
                frag::SOLV_FLOW,
                frag::BOX_CHART.replace("{TWIST}", "").as_str(),
            ]
            .concat(),
            GeometryKind::Stretched => [frag::FLOW, frag::STRETCHED_FLOW, frag::VORONOI_CHART].concat(),
            GeometryKind::Other => String::new(),
        }
    }

    fn tracer_stage(&self) -> String {
        let kind = self.fingerprint.kind;
        let flags = self.fingerprint.flags;
        let product = kind.is_product();
        let stepped = kind.is_step_based();

        let mut out = self.geometry_functions();
        out.push_str(frag::TRACER_HEAD);
        out.push_str(if stepped {
            frag::LAUNCH_STEP
        } else if product {
            frag::LAUNCH_PRODUCT
        } else {
            frag::LAUNCH_CONSTANT
        });
        out.push_str(frag::LOOP_HEAD);

        // exit side and distance
        if stepped {
            out.push_str(frag::EXIT_STEP);
        } else {
            out.push_str(if product {
                frag::EXIT_PRODUCT
            } else {
                frag::EXIT_CONSTANT
            });
            if flags.ultra_mirrors {
                out.push_str(frag::EXIT_ULTRA);
            }
            out.push_str(frag::EXIT_CLOSE);
        }

        if flags.volumetric {
            let (guard, clip) = if flags.hard_limit {
                (frag::HL_GUARD, frag::HL_CLIP)
            } else {
                ("", "")
            };
            out.push_str(&frag::VOLUMETRIC.replace("{HL_GUARD}", guard).replace("{HL_CLIP}", clip));
        }

        out.push_str(if stepped {
            frag::ADVANCE_STEP
        } else if product {
            frag::ADVANCE_PRODUCT
        } else {
            frag::ADVANCE_CONSTANT
        });
        if flags.ultra_mirrors {
            out.push_str(frag::ULTRA_TURN);
        }

        self.push_hit(&mut out);

        if flags.reflect {
            out.push_str(if product {
                frag::REFLECT_PRODUCT
            } else if kind == GeometryKind::Solv {
                frag::REFLECT_AXIS_FLIP
            } else {
                frag::REFLECT_MIRROR
            });
        }

        out.push_str(frag::CROSS_HEAD);
        if product {
            out.push_str(frag::CROSS_LEVEL);
        }
        out.push_str(frag::CROSS_APPLY);
        if flags.multi_shape {
            out.push_str(frag::CROSS_SHAPE);
        }
        out.push_str(frag::TRACER_TAIL);
        out
    }

    /// Wall color lookup, shading and front-to-back compositing.
    fn push_hit(&self, out: &mut String) {
        let kind = self.fingerprint.kind;
        let flags = self.fingerprint.flags;
        let hyperbolic = kind == GeometryKind::Hyperbolic;

        out.push_str(frag::HIT_HEAD);
        if flags.hard_limit {
            out.push_str(frag::HARD_LIMIT_STOP);
        }
        let chart_pos = if kind.is_product() {
            "vec4<f32>(pos.x / pos.z, pos.y / pos.z, zpos, 1.0)"
        } else {
            "pos / pos.w"
        };
        out.push_str(&frag::TEXTURE.replace("{CHART_POS}", chart_pos));
        if !flags.volumetric {
            out.push_str(frag::SIGHT_SHADE);
        }
        if kind == GeometryKind::Nil {
            out.push_str(frag::NIL_DIAGONALS);
        }
        out.push_str(frag::OPAQUE);
        if flags.reflect {
            out.push_str(frag::REFLECT_MARK);
        }

        let depth_z = if hyperbolic {
            "at0.z * sinh(go)"
        } else {
            "at0.z * go"
        };
        let lines = if flags.level_lines {
            let level_z = if hyperbolic { "z / cosh(go)" } else { "z" };
            frag::LEVEL_LINES.replace("{LEVEL_Z}", level_z)
        } else {
            String::new()
        };
        out.push_str(
            &frag::COMPOSITE
                .replace("{DEPTH_Z}", depth_z)
                .replace("{LEVEL_LINES}", &lines),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flags::FeatureFlags;

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

    fn build(kind: GeometryKind, flags: FeatureFlags) -> ProgramSource {
        ProgramBuilder::new(spec(kind, flags)).build().unwrap()
    }

    #[test]
    fn every_supported_kind_builds_with_both_entry_points() {
        for kind in GeometryKind::ALL {
            let result = ProgramBuilder::new(spec(kind, FeatureFlags::default())).build();
            if kind == GeometryKind::Other {
                assert_eq!(result, Err(ShaderError::UnsupportedGeometry(kind)));
                continue;
            }
            let wgsl = result.unwrap().wgsl();
            assert!(wgsl.contains("fn vs_screen("), "{kind}");
            assert!(wgsl.contains("fn fs_trace("), "{kind}");
        }
    }

    /// No flags, each flag alone, and every flag at once.
    fn flag_sets() -> Vec<FeatureFlags> {
        let none = FeatureFlags::default();
        vec![
            none,
            FeatureFlags { reflect: true, ..none },
            FeatureFlags { volumetric: true, ..none },
            FeatureFlags { level_lines: true, ..none },
            FeatureFlags { multi_shape: true, ..none },
            FeatureFlags { ultra_mirrors: true, ..none },
            FeatureFlags { stereo: true, ..none },
            FeatureFlags { hard_limit: true, ..none },
            FeatureFlags {
                reflect: true,
                volumetric: true,
                level_lines: true,
                multi_shape: true,
                ultra_mirrors: true,
                stereo: true,
                hard_limit: true,
            },
        ]
    }

    #[test]
    fn every_variant_is_valid_wgsl() {
        let mut checked = 0;
        for kind in GeometryKind::ALL {
            if kind == GeometryKind::Other {
                continue;
            }
            for flags in flag_sets() {
                let flags = flags.normalized(kind);
                let wgsl = build(kind, flags).wgsl();
                let module = naga::front::wgsl::parse_str(&wgsl).unwrap_or_else(|e| {
                    panic!("{kind} {flags:?}: {}", e.emit_to_string(&wgsl))
                });
                naga::valid::Validator::new(
                    naga::valid::ValidationFlags::all(),
                    naga::valid::Capabilities::default(),
                )
                .validate(&module)
                .unwrap_or_else(|e| panic!("{kind} {flags:?}: {e:?}"));
                checked += 1;
            }
        }
        assert_eq!(checked, 9 * flag_sets().len());
    }

    #[test]
    fn placeholders_are_fully_substituted() {
        let all = FeatureFlags {
            reflect: true,
            volumetric: true,
            level_lines: true,
            multi_shape: true,
            ultra_mirrors: true,
            stereo: true,
            hard_limit: true,
        };
        for kind in GeometryKind::ALL {
            if kind == GeometryKind::Other {
                continue;
            }
            let wgsl = build(kind, all).wgsl();
            for marker in [
                "{A}",
                "{MAX_ITER}",
                "{LIMIT}",
                "{TRIANGLES}",
                "{STARTS}",
                "{STEREO}",
                "{TWIST}",
                "{HL_GUARD}",
                "{HL_CLIP}",
                "{CHART_POS}",
                "{DEPTH_Z}",
                "{LEVEL_LINES}",
                "{LEVEL_Z}",
            ] {
                assert!(!wgsl.contains(marker), "{kind}: {marker}");
            }
        }
    }

    #[test]
    fn families_get_their_own_solvers() {
        let h = build(GeometryKind::Hyperbolic, FeatureFlags::default()).wgsl();
        assert!(h.contains("fn mink(") && h.contains("atanh"));
        assert!(h.contains("at0.z * sinh(go)"));
        assert!(!h.contains("fn rk4("));

        let hxe = build(GeometryKind::Product(ProductBase::Hyperbolic), FeatureFlags::default()).wgsl();
        assert!(hxe.contains("a.z * b.z"));
        assert!(hxe.contains("zpos"));
        assert!(hxe.contains("at0.z * go"));

        let nil = build(GeometryKind::Nil, FeatureFlags::default()).wgsl();
        assert!(nil.contains("fn rk4(") && nil.contains("fn exit_face("));
        assert!(nil.contains("c.z = c.z - c.x * c.y"));
        assert!(nil.contains("abs(abs(pos.x) - abs(pos.y))"));

        let solv = build(GeometryKind::Solv, FeatureFlags::default()).wgsl();
        assert!(solv.contains("exp(2.0 * x.z)"));
        assert!(!solv.contains("c.z = c.z - c.x * c.y"));

        let berger = build(GeometryKind::Stretched, FeatureFlags::default()).wgsl();
        assert!(berger.contains("fn s_translate(") && berger.contains("transforms.m[wo + i] * p"));
    }

    #[test]
    fn flags_gate_fragments() {
        let plain = build(GeometryKind::Hyperbolic, FeatureFlags::default()).wgsl();
        assert!(!plain.contains("textureLoad(volumetric"));
        assert!(!plain.contains("reflecting = true"));
        assert!(!plain.contains("frame.shift"));
        assert!(!plain.contains("frame.hard_limit"));
        assert!(!plain.contains("wall_offset = i32(conn.z)"));
        assert!(plain.contains("frame.linear_sight_range"));

        let rich = build(
            GeometryKind::Hyperbolic,
            FeatureFlags {
                reflect: true,
                volumetric: true,
                multi_shape: true,
                ultra_mirrors: true,
                stereo: true,
                hard_limit: true,
                ..Default::default()
            },
        )
        .wgsl();
        assert!(rich.contains("textureLoad(volumetric"));
        assert!(rich.contains("reflecting = true"));
        assert!(rich.contains("frame.shift"));
        assert!(rich.contains("go < frame.hard_limit"));
        assert!(rich.contains("wall_offset = i32(conn.z)"));
        assert!(rich.contains("which = sides + k"));
        // fog replaces the sight-range blend
        assert!(!rich.contains("frame.linear_sight_range"));
    }

    #[test]
    fn reflection_formula_follows_the_family() {
        let flags = FeatureFlags {
            reflect: true,
            ..Default::default()
        };
        let product = build(GeometryKind::Product(ProductBase::Euclidean), flags).wgsl();
        assert!(product.contains("zspeed = -zspeed"));
        let solv = build(GeometryKind::Solv, flags).wgsl();
        assert!(solv.contains("tangent.y = -tangent.y"));
        let nil = build(GeometryKind::Nil, flags).wgsl();
        assert!(!nil.contains("reflecting = true"));
    }

    #[test]
    fn digest_is_stable_and_tracks_content() {
        let a = build(GeometryKind::Euclidean, FeatureFlags::default());
        let b = build(GeometryKind::Euclidean, FeatureFlags::default());
        assert_eq!(a.digest(), b.digest());
        assert_eq!(a.digest().len(), 64);
        let c = build(
            GeometryKind::Euclidean,
            FeatureFlags {
                stereo: true,
                ..Default::default()
            },
        );
        assert_ne!(a.digest(), c.digest());
    }

    #[test]
    fn sizes_land_in_the_prelude() {
        let mut s = spec(GeometryKind::Spherical, FeatureFlags::default());
        s.walls = 9;
        s.triangles = 40;
        s.max_iterations = 77;
        let prelude = ProgramBuilder::new(s).build().unwrap().prelude;
        assert!(prelude.contains("const MAX_ITER: i32 = 77;"));
        assert!(prelude.contains("array<mat4x4<f32>, 110>"));
        assert!(prelude.contains("array<vec4<f32>, 40>"));
        assert!(prelude.contains("array<vec4<i32>, 3>"));
    }

    #[test]
    fn oversized_tables_are_rejected() {
        let mut s = spec(GeometryKind::Hyperbolic, FeatureFlags::default());
        s.transform_limit = 2000;
        assert!(matches!(
            ProgramBuilder::new(s).build(),
            Err(ShaderError::TableTooLarge { table: "transform table", .. })
        ));
        let mut s = spec(GeometryKind::Hyperbolic, FeatureFlags::default());
        s.walls = 0;
        assert_eq!(ProgramBuilder::new(s).build(), Err(ShaderError::EmptyWallTable));
    }
}
