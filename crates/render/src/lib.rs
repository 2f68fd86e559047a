//! Render: decides when to ray-march, keeps the viewer inside its cell,
//! and drives one frame through a graphics backend.
//!
//! The backend is reached only through [`GraphicsDriver`]; everything else
//! (classification, self-correction, encoding, program caching, uniform
//! packing) runs on the CPU. [`CpuTracer`] replays the generated tracer in
//! f64 over the same tables, for headless output and for tests.
//!
//! # Invariants
//! - A frame is encoded only after the viewer has been corrected into the
//!   cell that contains it.
//! - Self-correction stops after [`MAX_CORRECTIONS`] steps and the frame is
//!   abandoned.
//! - The program is rebuilt exactly when the frame's fingerprint differs
//!   from the cached one.

mod classifier;
mod dispatcher;
mod driver;
mod setup;
mod tracer;
mod uniforms;
mod viewer;

pub use classifier::{ClassifierInput, DefaultPolicy, EngagementPolicy, ProjectionMode, available};
pub use dispatcher::{
    DispatchError, FrameDispatcher, FrameOutcome, FrameReport, PreparedFrame, ProgramError,
    prepare_frame,
};
pub use driver::{DriverError, FrameUpload, GraphicsDriver};
pub use setup::FrameSetup;
pub use tracer::{CpuTracer, Hit, TraceEnd, TraceResult, TracedImage};
pub use uniforms::FrameUniforms;
pub use viewer::{
    CorrectionError, Eye, MAX_CORRECTIONS, Projection, ViewerPose, correct_viewer,
};

pub fn crate_info() -> &'static str {
    "curvecast-render v0.1.0"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_loads() {
        assert!(crate_info().contains("render"));
    }
}
