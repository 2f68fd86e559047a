//! wgpu backend for the curved-space raycaster.
//!
//! Implements [`curvecast_render::GraphicsDriver`]: generated WGSL programs
//! become render pipelines, frame tables become uniform buffers and
//! float textures, and each frame is one full-screen pass into an offscreen
//! color and depth target that can be read back.
//!
//! # Invariants
//! - Table textures are re-created only when the table layout changes.
//! - The bind group always matches the last upload; drawing before any
//!   upload is an error, never a stale frame.

mod gpu;

pub use gpu::{COLOR_FORMAT, DEPTH_FORMAT, TracerProgram, WgpuRaycaster, padded_bytes_per_row};

pub fn crate_info() -> &'static str {
    "curvecast-render-wgpu v0.1.0"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_loads() {
        assert!(crate_info().contains("wgpu"));
    }
}
