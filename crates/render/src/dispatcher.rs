use crate::classifier::{ClassifierInput, DefaultPolicy, EngagementPolicy, available};
use crate::driver::{DriverError, FrameUpload, GraphicsDriver};
use crate::setup::FrameSetup;
use crate::uniforms::FrameUniforms;
use crate::viewer::{CorrectionError, Projection, ViewerPose, correct_viewer};
use curvecast_common::{GeometryKind, OptionsError, RayOptions};
use curvecast_encode::{CellEncoder, EncodeError, EncodeStats, EncodedFrame};
use curvecast_shader::{FeatureFlags, Fingerprint, ProgramCache, ProgramSpec, ShaderError, synthesize};
use curvecast_world::{CellGraph, CellId};
use tracing::{debug, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum ProgramError {
    #[error(transparent)]
    Shader(#[from] ShaderError),
    #[error(transparent)]
    Driver(#[from] DriverError),
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("raycasting is unavailable for {0}")]
    Unsupported(GeometryKind),
    #[error("topology too complex: more than {limit} distinct transforms")]
    TopologyOverflow { limit: usize },
    #[error("viewer self-correction gave up after {steps} steps")]
    SelfCorrectionExhausted { steps: u32 },
    #[error("viewer outside {cell} across side {side}, where no neighbor exists")]
    ViewerDesync { cell: CellId, side: usize },
    #[error("program build failed: {0}")]
    ProgramBuild(#[from] ProgramError),
    #[error(transparent)]
    Encode(EncodeError),
    #[error(transparent)]
    Driver(#[from] DriverError),
    #[error(transparent)]
    Options(#[from] OptionsError),
}

impl From<EncodeError> for DispatchError {
    fn from(e: EncodeError) -> Self {
        match e {
            EncodeError::TopologyOverflow { limit } => DispatchError::TopologyOverflow { limit },
            other => DispatchError::Encode(other),
        }
    }
}

impl From<CorrectionError> for DispatchError {
    fn from(e: CorrectionError) -> Self {
        match e {
            CorrectionError::Exhausted { steps } => DispatchError::SelfCorrectionExhausted { steps },
            CorrectionError::NoNeighbor { cell, side } => DispatchError::ViewerDesync { cell, side },
            CorrectionError::Unsupported(kind) => DispatchError::Unsupported(kind),
        }
    }
}

/// A frame ready for any tracer: corrected pose, encoded tables, frame
/// scalars and the program it needs.
#[derive(Debug, Clone)]
pub struct PreparedFrame {
    pub pose: ViewerPose,
    pub corrections: u32,
    pub encoded: EncodedFrame,
    pub setup: FrameSetup,
    pub spec: ProgramSpec,
}

impl PreparedFrame {
    pub fn uniforms(&self) -> FrameUniforms {
        FrameUniforms::new(&self.setup, &self.encoded)
    }
}

/// Correct the viewer, encode the visible cells and derive the program
/// spec. Updates `pose` in place.
pub fn prepare_frame<W: CellGraph + ?Sized>(
    world: &mut W,
    options: &RayOptions,
    pose: &mut ViewerPose,
    projection: &Projection,
) -> Result<PreparedFrame, DispatchError> {
    let kind = world.kind();
    let corrections = correct_viewer(world, pose)?;
    let encoded = CellEncoder::new(options).encode(world, pose.cell)?;
    let multi_shape = world.shapes().len() > 1;
    let flags = FeatureFlags::from_options(options, multi_shape, projection.stereo()).normalized(kind);
    let spec = ProgramSpec {
        kind,
        flags,
        walls: encoded.total_walls,
        triangles: encoded.walls.triangle_rows(),
        max_iterations: options.max_iterations_for(kind),
        transform_limit: options.transform_limit,
    };
    let setup = FrameSetup::new(&*world, options, flags, pose, projection);
    Ok(PreparedFrame {
        pose: *pose,
        corrections,
        encoded,
        setup,
        spec,
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct FrameReport {
    pub fingerprint: Fingerprint,
    /// The program was (re)built for this frame.
    pub rebuilt: bool,
    pub corrections: u32,
    pub stats: EncodeStats,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FrameOutcome {
    /// The policy left this frame to another renderer.
    Declined,
    Drawn(FrameReport),
}

/// Per-frame orchestration over a [`GraphicsDriver`]: classify, correct,
/// encode, fetch or build the program, upload, draw.
pub struct FrameDispatcher<D: GraphicsDriver, P = DefaultPolicy> {
    driver: D,
    policy: P,
    options: RayOptions,
    cache: ProgramCache<D::Program>,
    frames: u64,
}

impl<D: GraphicsDriver> FrameDispatcher<D> {
    pub fn new(driver: D, options: RayOptions) -> Result<Self, DispatchError> {
        Self::with_policy(driver, options, DefaultPolicy)
    }
}

impl<D: GraphicsDriver, P: EngagementPolicy> FrameDispatcher<D, P> {
    pub fn with_policy(driver: D, options: RayOptions, policy: P) -> Result<Self, DispatchError> {
        options.validate()?;
        Ok(Self {
            driver,
            policy,
            options,
            cache: ProgramCache::new(),
            frames: 0,
        })
    }

    pub fn options(&self) -> &RayOptions {
        &self.options
    }

    /// Replace the options. Changes that alter the program fingerprint
    /// trigger a rebuild on the next frame.
    pub fn set_options(&mut self, options: RayOptions) -> Result<(), DispatchError> {
        options.validate()?;
        self.options = options;
        Ok(())
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    /// Programs built so far.
    pub fn program_builds(&self) -> u64 {
        self.cache.builds()
    }

    /// Forget the compiled program, e.g. after the device was recreated.
    pub fn invalidate_program(&mut self) {
        self.cache.invalidate();
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn dispatch<W: CellGraph + ?Sized>(
        &mut self,
        world: &mut W,
        input: &ClassifierInput,
        pose: &mut ViewerPose,
        projection: &Projection,
    ) -> Result<FrameOutcome, DispatchError> {
        let kind = world.kind();
        let _span = tracing::info_span!("frame", %kind, n = self.frames).entered();
        if !self.policy.requested(input, self.options.usage) {
            debug!("raycaster not engaged");
            return Ok(FrameOutcome::Declined);
        }
        if !available(input) {
            warn!(%kind, projection = ?input.projection, "raycaster requested but unavailable");
            return Err(DispatchError::Unsupported(kind));
        }

        let prepared = prepare_frame(world, &self.options, pose, projection)?;
        let fingerprint = prepared.spec.fingerprint();
        let mut rebuilt = false;
        let driver = &mut self.driver;
        let program = self.cache.get_or_build(fingerprint, || -> Result<_, ProgramError> {
            let source = synthesize(prepared.spec)?;
            info!(%fingerprint, digest = %source.digest(), "compiling tracer program");
            rebuilt = true;
            Ok(driver.compile(&source)?)
        })?;

        let uniforms = prepared.uniforms();
        let upload = FrameUpload {
            uniforms: &uniforms,
            frame: &prepared.encoded,
        };
        self.driver.upload(&upload)?;
        self.driver.draw(program)?;
        self.frames += 1;

        debug!(
            cells = prepared.encoded.stats.cells,
            transforms = prepared.encoded.stats.transforms,
            corrections = prepared.corrections,
            rebuilt,
            "frame drawn"
        );
        Ok(FrameOutcome::Drawn(FrameReport {
            fingerprint,
            rebuilt,
            corrections: prepared.corrections,
            stats: prepared.encoded.stats,
        }))
    }
}
