//! Emission points and release policies
//!
//! A run has one release policy for all of its points:
//!
//! - **Accumulating**: `value` is a rate; each step adds `value * dt` to the
//!   cell. Without removal the total grows without bound.
//! - **Fixed**: `value` is a concentration the cell is pinned to every step,
//!   overriding the stencil result (a Dirichlet condition). Used for
//!   steady-state scenarios.
//!
//! The two give physically different meanings to the same number, so a run
//! mixing them is rejected.

use crate::error::ConfigError;
use crate::grid::ObstacleMask;
use crate::solver::{BoundaryCondition, ConcentrationField};
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Release policy for an emission point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmissionMode {
    /// Add `rate * dt` each step
    #[default]
    Accumulating,
    /// Pin the cell to a constant each step
    Fixed,
}

/// One emission point in grid cells
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EmissionPoint {
    pub x: usize,
    pub y: usize,
    /// Rate per second (accumulating) or pinned concentration (fixed)
    pub value: f32,
    #[serde(default)]
    pub mode: EmissionMode,
}

impl EmissionPoint {
    /// Continuous release of `rate` per second
    #[must_use]
    pub fn accumulating(x: usize, y: usize, rate: f32) -> Self {
        Self {
            x,
            y,
            value: rate,
            mode: EmissionMode::Accumulating,
        }
    }

    /// Cell held at `value`
    #[must_use]
    pub fn fixed(x: usize, y: usize, value: f32) -> Self {
        Self {
            x,
            y,
            value,
            mode: EmissionMode::Fixed,
        }
    }
}

/// What to do with an emission point that lands inside a building
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourcePlacement {
    /// Fail configuration
    #[default]
    Reject,
    /// Move to the nearest free interior cell
    RelocateToNearestFree,
}

/// All emission points of a run
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Source {
    pub points: Vec<EmissionPoint>,
}

impl Source {
    /// Wrap a list of points without validation
    #[must_use]
    pub fn new(points: Vec<EmissionPoint>) -> Self {
        Self { points }
    }

    /// Release policy shared by every point, `None` when empty
    #[must_use]
    pub fn mode(&self) -> Option<EmissionMode> {
        self.points.first().map(|p| p.mode)
    }

    /// Check the source against the grid and return the points to use
    ///
    /// # Errors
    ///
    /// Rejects empty sources, out-of-grid points, invalid values, mixed
    /// modes, points on the absorbing edge ring, duplicate cells, and points
    /// inside obstacles unless `placement` allows relocation.
    pub fn validate(
        &self,
        mask: &ObstacleMask,
        boundary: BoundaryCondition,
        placement: SourcePlacement,
    ) -> Result<Source, ConfigError> {
        let Some(mode) = self.mode() else {
            return Err(ConfigError::NoSources);
        };
        let (width, height) = (mask.width(), mask.height());
        let on_edge = |x: usize, y: usize| x == 0 || y == 0 || x + 1 == width || y + 1 == height;
        let absorbing = boundary == BoundaryCondition::Absorbing;

        let mut seen = FxHashSet::default();
        let mut points = Vec::with_capacity(self.points.len());
        for point in &self.points {
            let EmissionPoint { x, y, value, .. } = *point;
            if point.mode != mode {
                return Err(ConfigError::MixedEmissionModes);
            }
            if x >= width || y >= height {
                return Err(ConfigError::SourceOutOfBounds { x, y });
            }
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidEmission { x, y, value });
            }

            let (px, py) = if mask.is_obstacle(x, y) {
                match placement {
                    SourcePlacement::Reject => return Err(ConfigError::SourceInObstacle { x, y }),
                    SourcePlacement::RelocateToNearestFree => {
                        let (nx, ny) = mask
                            .nearest_free_cell(x, y, absorbing)
                            .ok_or(ConfigError::NoFreeCellForSource { x, y })?;
                        warn!(
                            "Emission point ({}, {}) is inside an obstacle, moved to ({}, {})",
                            x, y, nx, ny
                        );
                        (nx, ny)
                    }
                }
            } else {
                (x, y)
            };

            if absorbing && on_edge(px, py) {
                return Err(ConfigError::SourceOnBoundary { x: px, y: py });
            }
            if !seen.insert((px, py)) {
                return Err(ConfigError::DuplicateSource { x: px, y: py });
            }
            points.push(EmissionPoint {
                x: px,
                y: py,
                ..*point
            });
        }
        Ok(Source { points })
    }

    /// Inject emissions into `field` for one step of length `dt`
    pub fn apply(&self, field: &mut ConcentrationField, dt: f32) {
        for point in &self.points {
            if point.x >= field.width || point.y >= field.height {
                continue;
            }
            let idx = field.index(point.x, point.y);
            match point.mode {
                EmissionMode::Accumulating => field.data[idx] += point.value * dt,
                EmissionMode::Fixed => field.data[idx] = point.value,
            }
        }
    }
}
