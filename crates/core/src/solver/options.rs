//! Stepper configuration switches

use serde::{Deserialize, Serialize};

/// How the Laplacian treats obstacle neighbours
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffusionBoundaryPolicy {
    /// Obstacle neighbours count as zero concentration. Walls act as sinks,
    /// so diffusion next to buildings is overestimated toward the wall and the
    /// plume loses mass there.
    Naive,
    /// Obstacle neighbours are left out of the stencil, so no flux crosses a
    /// wall face (insulating wall).
    #[default]
    FluxCorrected,
}

/// Treatment of the outermost ring of cells
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryCondition {
    /// Edge cells are never updated and stay at zero; pollutant reaching them
    /// leaves the domain
    #[default]
    Absorbing,
    /// Stencil indices wrap around. Pollutant leaving one side re-enters on
    /// the other, which an open-air domain doesn't do; kept for comparison runs.
    Periodic,
}

/// Switches for one stepper instance
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverOptions {
    pub diffusion_policy: DiffusionBoundaryPolicy,
    pub boundary: BoundaryCondition,
    /// Optional physical ceiling applied during clamping
    pub upper_bound: Option<f32>,
}
