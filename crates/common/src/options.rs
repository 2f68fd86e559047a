use crate::geometry_kind::GeometryKind;
use crate::types::Rgba;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// User preference for engaging the raycaster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RaycasterUsage {
    Never,
    #[default]
    Smart,
    Always,
}

#[derive(Debug, thiserror::Error)]
pub enum OptionsError {
    #[error("{name} must be positive, got {value}")]
    NonPositiveStep { name: &'static str, value: f64 },
    #[error("minstep {minstep} exceeds maxstep {maxstep}")]
    StepOrder { minstep: f64, maxstep: f64 },
    #[error("{0} must be nonzero")]
    ZeroBudget(&'static str),
    #[error("reflectivity must lie in [0, 1], got {0}")]
    Reflectivity(f64),
    #[error("invalid options JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to read options from {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Policy values for one frame of raycasting.
///
/// Immutable while a frame is prepared; the synthesizer, encoder and
/// dispatcher all take it by reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RayOptions {
    pub usage: RaycasterUsage,
    /// Brightness at distance zero of the exponential falloff.
    pub exp_start: f64,
    /// Falloff length in spaces whose volume grows exponentially.
    pub exp_decay_exponential: f64,
    /// Falloff length everywhere else.
    pub exp_decay_polynomial: f64,
    /// Distance at which the linear falloff reaches zero.
    pub linear_sight_range: f64,
    /// Walls beyond this distance are not drawn.
    pub hard_limit: Option<f64>,
    /// Reflectivity of opaque walls, in `[0, 1]`.
    pub reflectivity: f64,
    pub maxstep_solv: f64,
    pub maxstep_nil: f64,
    pub minstep: f64,
    pub max_iterations_step: u32,
    pub max_iterations_closed: u32,
    pub max_cells: usize,
    pub generate_on_demand: bool,
    pub out_of_range: Rgba,
    pub fog_color: Rgba,
    pub volumetric: bool,
    pub volumetric_intensity: u32,
    /// Density of depth bands; 0 disables them.
    pub level_lines: f64,
    pub ultra_mirrors: bool,
    /// Capacity of the transform table.
    pub transform_limit: usize,
}

impl Default for RayOptions {
    fn default() -> Self {
        Self {
            usage: RaycasterUsage::Smart,
            exp_start: 1.0,
            exp_decay_exponential: 4.0,
            exp_decay_polynomial: 10.0,
            linear_sight_range: 10.0,
            hard_limit: None,
            reflectivity: 0.0,
            maxstep_solv: 0.05,
            maxstep_nil: 0.1,
            minstep: 0.001,
            max_iterations_step: 600,
            max_iterations_closed: 60,
            max_cells: 2048,
            generate_on_demand: true,
            out_of_range: Rgba(0x0F08_00FF),
            fog_color: Rgba::BLACK,
            volumetric: false,
            volumetric_intensity: 16,
            level_lines: 0.0,
            ultra_mirrors: false,
            transform_limit: 110,
        }
    }
}

impl RayOptions {
    pub fn validate(&self) -> Result<(), OptionsError> {
        for (name, value) in [
            ("maxstep_solv", self.maxstep_solv),
            ("maxstep_nil", self.maxstep_nil),
            ("minstep", self.minstep),
            ("exp_decay_exponential", self.exp_decay_exponential),
            ("exp_decay_polynomial", self.exp_decay_polynomial),
            ("linear_sight_range", self.linear_sight_range),
        ] {
            if !(value > 0.0) {
                return Err(OptionsError::NonPositiveStep { name, value });
            }
        }
        let maxstep = self.maxstep_solv.min(self.maxstep_nil);
        if self.minstep > maxstep {
            return Err(OptionsError::StepOrder {
                minstep: self.minstep,
                maxstep,
            });
        }
        if self.max_cells == 0 {
            return Err(OptionsError::ZeroBudget("max_cells"));
        }
        if self.transform_limit == 0 {
            return Err(OptionsError::ZeroBudget("transform_limit"));
        }
        if self.max_iterations_step == 0 || self.max_iterations_closed == 0 {
            return Err(OptionsError::ZeroBudget("max_iterations"));
        }
        if !(0.0..=1.0).contains(&self.reflectivity) {
            return Err(OptionsError::Reflectivity(self.reflectivity));
        }
        Ok(())
    }

    /// Parse and validate. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, OptionsError> {
        let options: RayOptions = serde_json::from_str(json)?;
        options.validate()?;
        Ok(options)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, OptionsError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| OptionsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    pub fn exp_decay_for(&self, kind: GeometryKind) -> f64 {
        if kind.exponential_growth() {
            self.exp_decay_exponential
        } else {
            self.exp_decay_polynomial
        }
    }

    /// Largest step the adaptive integrator may take.
    pub fn maxstep_for(&self, kind: GeometryKind) -> f64 {
        match kind {
            GeometryKind::Nil => self.maxstep_nil,
            _ => self.maxstep_solv,
        }
    }

    pub fn max_iterations_for(&self, kind: GeometryKind) -> u32 {
        if kind.is_step_based() {
            self.max_iterations_step
        } else {
            self.max_iterations_closed
        }
    }

    pub fn reflective(&self) -> bool {
        self.reflectivity > 0.0
    }
}
