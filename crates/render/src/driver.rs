use crate::uniforms::FrameUniforms;
use curvecast_encode::EncodedFrame;
use curvecast_shader::ProgramSource;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DriverError {
    #[error("no usable graphics device: {0}")]
    Device(String),
    #[error("program failed to compile: {0}")]
    Compile(String),
    #[error("upload rejected: {0}")]
    Upload(String),
    #[error("draw failed: {0}")]
    Draw(String),
}

/// Everything uploaded for one frame.
#[derive(Debug, Clone, Copy)]
pub struct FrameUpload<'a> {
    pub uniforms: &'a FrameUniforms,
    pub frame: &'a EncodedFrame,
}

/// The narrow surface the dispatcher needs from a graphics backend:
/// compile a generated program, upload a frame's tables, draw.
pub trait GraphicsDriver {
    /// Backend handle of a compiled program.
    type Program;

    fn compile(&mut self, source: &ProgramSource) -> Result<Self::Program, DriverError>;

    fn upload(&mut self, upload: &FrameUpload<'_>) -> Result<(), DriverError>;

    /// Draw the full-screen pass with `program` over the last upload.
    fn draw(&mut self, program: &Self::Program) -> Result<(), DriverError>;
}
