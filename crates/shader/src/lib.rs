//! Shader: synthesizes the two-stage WGSL tracer program and caches it.
//!
//! The program is assembled from a fragment table selected by geometry
//! family and [`FeatureFlags`]; the builder never touches a GPU, so every
//! variant can be generated and inspected on the CPU.
//!
//! # Invariants
//! - The marching loop is bounded by the `MAX_ITER` constant baked into the
//!   source.
//! - Two specs with equal [`Fingerprint`]s produce identical source text.
//! - [`ProgramCache`] rebuilds iff the requested fingerprint differs from
//!   the live one.

mod builder;
mod cache;
mod flags;
mod fragments;

pub use builder::{MAX_UNIFORM_BYTES, ProgramBuilder, ProgramSource, ShaderError};
pub use cache::ProgramCache;
pub use flags::{FeatureFlags, Fingerprint, ProgramSpec};

/// Byte size of the frame uniform block declared in the prelude.
pub const FRAME_UNIFORM_BYTES: usize = 304;

/// Binding slots of group 0.
pub mod bindings {
    pub const FRAME: u32 = 0;
    pub const TRANSFORMS: u32 = 1;
    pub const WALLS: u32 = 2;
    pub const CONNECTIONS: u32 = 3;
    pub const WALL_COLORS: u32 = 4;
    pub const TEXTURE_MAP: u32 = 5;
    pub const VOLUMETRIC: u32 = 6;
    pub const ATLAS: u32 = 7;
    pub const ATLAS_SAMPLER: u32 = 8;
}

/// Synthesize the program for `spec`.
pub fn synthesize(spec: ProgramSpec) -> Result<ProgramSource, ShaderError> {
    ProgramBuilder::new(spec).build()
}

pub fn crate_info() -> &'static str {
    "curvecast-shader v0.1.0"
}

#[cfg(test)]
mod tests {
    use super::*;
    use curvecast_common::GeometryKind;

    #[test]
    fn crate_loads() {
        assert!(crate_info().contains("shader"));
    }

    #[test]
    fn bindings_match_declarations() {
        let source = synthesize(ProgramSpec {
            kind: GeometryKind::Euclidean,
            flags: FeatureFlags::default(),
            walls: 6,
            triangles: 24,
            max_iterations: 60,
            transform_limit: 110,
        })
        .unwrap();
        for (binding, name) in [
            (bindings::FRAME, "frame"),
            (bindings::TRANSFORMS, "transforms"),
            (bindings::WALLS, "walls"),
            (bindings::CONNECTIONS, "connections"),
            (bindings::WALL_COLORS, "wall_colors"),
            (bindings::TEXTURE_MAP, "texture_map"),
            (bindings::VOLUMETRIC, "volumetric"),
            (bindings::ATLAS, "atlas"),
            (bindings::ATLAS_SAMPLER, "atlas_sampler"),
        ] {
            let decl = format!("@binding({binding})\nvar");
            let at = source.prelude.find(&decl).unwrap();
            let line = &source.prelude[at..].lines().nth(1).unwrap();
            assert!(line.contains(&format!(" {name}:")), "{binding}: {line}");
        }
    }
}
