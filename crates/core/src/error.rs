//! Configuration errors
//!
//! Every error here is raised while a run is being assembled, before the first
//! step. The per-step arithmetic never fails; instability shows up in
//! [`crate::solver::StepDiagnostics`] instead.

use crate::solver::StabilityViolation;

/// Reasons a scenario configuration is rejected
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Grid must be at least 3x3 for the 5-point stencil
    GridTooSmall { width: usize, height: usize },
    /// Grid spacing must be finite and positive
    NonPositiveSpacing { dx: f32, dy: f32 },
    /// Fixed time step must be finite and positive
    NonPositiveTimeStep(f32),
    /// A physical parameter is negative or not finite
    InvalidParameter { name: &'static str, value: f32 },
    /// Random obstacle bounds can't be satisfied on this grid
    InvalidObstacleBounds(String),
    /// Per-cell wind arrays don't match the grid
    WindShapeMismatch { expected: usize, actual: usize },
    /// No emission points configured
    NoSources,
    /// Emission point lies outside the grid
    SourceOutOfBounds { x: usize, y: usize },
    /// Emission point lies on a solid obstacle
    SourceInObstacle { x: usize, y: usize },
    /// Emission point lies on the absorbing edge ring, which is never updated
    SourceOnBoundary { x: usize, y: usize },
    /// Two emission points share a cell
    DuplicateSource { x: usize, y: usize },
    /// Accumulating and fixed emission points in the same run
    MixedEmissionModes,
    /// Emission value is negative or not finite
    InvalidEmission { x: usize, y: usize, value: f32 },
    /// Relocation found no free interior cell
    NoFreeCellForSource { x: usize, y: usize },
    /// Fixed time step breaks a stability bound
    UnstableTimeStep(StabilityViolation),
    /// Alert thresholds must satisfy `0 <= attention <= danger`
    InvalidAlertThresholds { attention: f32, danger: f32 },
    /// Sampling interval must be at least one step
    InvalidSampleInterval,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::GridTooSmall { width, height } => {
                write!(f, "Grid {width}x{height} is too small, need at least 3x3")
            }
            ConfigError::NonPositiveSpacing { dx, dy } => {
                write!(f, "Grid spacing must be positive (dx={dx}, dy={dy})")
            }
            ConfigError::NonPositiveTimeStep(dt) => {
                write!(f, "Time step must be positive (dt={dt})")
            }
            ConfigError::InvalidParameter { name, value } => {
                write!(f, "Parameter '{name}' must be finite and non-negative (got {value})")
            }
            ConfigError::InvalidObstacleBounds(msg) => write!(f, "Invalid obstacle bounds: {msg}"),
            ConfigError::WindShapeMismatch { expected, actual } => {
                write!(f, "Wind field has {actual} cells, grid has {expected}")
            }
            ConfigError::NoSources => write!(f, "No emission points configured"),
            ConfigError::SourceOutOfBounds { x, y } => {
                write!(f, "Emission point ({x}, {y}) is outside the grid")
            }
            ConfigError::SourceInObstacle { x, y } => {
                write!(f, "Emission point ({x}, {y}) is inside an obstacle")
            }
            ConfigError::SourceOnBoundary { x, y } => {
                write!(f, "Emission point ({x}, {y}) is on the absorbing boundary")
            }
            ConfigError::DuplicateSource { x, y } => {
                write!(f, "More than one emission point at ({x}, {y})")
            }
            ConfigError::MixedEmissionModes => {
                write!(f, "Accumulating and fixed emission points can't share a run")
            }
            ConfigError::InvalidEmission { x, y, value } => {
                write!(f, "Emission point ({x}, {y}) has invalid value {value}")
            }
            ConfigError::NoFreeCellForSource { x, y } => {
                write!(f, "No free cell to relocate emission point ({x}, {y})")
            }
            ConfigError::UnstableTimeStep(violation) => {
                write!(f, "Unstable time step: {violation}")
            }
            ConfigError::InvalidAlertThresholds { attention, danger } => write!(
                f,
                "Alert thresholds must satisfy 0 <= attention <= danger (attention={attention}, danger={danger})"
            ),
            ConfigError::InvalidSampleInterval => {
                write!(f, "Sample interval must be at least one step")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<StabilityViolation> for ConfigError {
    fn from(violation: StabilityViolation) -> Self {
        ConfigError::UnstableTimeStep(violation)
    }
}

/// Check that a physical parameter is finite and non-negative
pub(crate) fn non_negative(name: &'static str, value: f32) -> Result<f32, ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(ConfigError::InvalidParameter { name, value })
    }
}
