//! Scenario configuration
//!
//! Everything a run needs, built once from the caller (JSON file, CLI, UI).
//! Every field has a default, so a partial JSON document is a valid scenario.
//! The defaults describe a 50×50 street grid with a 1.5 m/s easterly wind and
//! a continuous release at (10, 25).

use super::report::AlertThresholds;
use crate::grid::{DeflectionRule, ObstaclePlacement, WindSpec};
use crate::solver::{RemovalModel, SolverOptions, TimeStep};
use crate::source::{EmissionPoint, SourcePlacement};
use serde::{Deserialize, Serialize};

/// Diffusivity used when neither the scenario nor its `WindSpec` sets one (m²/s)
pub const DEFAULT_DIFFUSIVITY: f32 = 1.0;

/// Ground elevation for display
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GroundSpec {
    Flat {
        elevation: f32,
    },
    Hill {
        base_elevation: f32,
        hill_height: f32,
        /// Radius in cells
        hill_radius: f32,
    },
}

impl Default for GroundSpec {
    fn default() -> Self {
        GroundSpec::Flat { elevation: 0.0 }
    }
}

/// Complete description of one dispersion run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioConfig {
    /// Grid width in cells
    pub width: usize,
    /// Grid height in cells
    pub height: usize,
    /// Cell size along x in meters
    pub dx: f32,
    /// Cell size along y in meters
    pub dy: f32,
    pub obstacles: ObstaclePlacement,
    pub ground: GroundSpec,
    pub wind: WindSpec,
    pub deflection: DeflectionRule,
    /// Overrides the diffusivity implied by `wind`
    pub diffusivity: Option<f32>,
    pub removal: RemovalModel,
    pub sources: Vec<EmissionPoint>,
    pub source_placement: SourcePlacement,
    pub time_step: TimeStep,
    /// Reject fixed time steps that break a stability bound
    pub enforce_stability: bool,
    /// Number of steps to run
    pub iterations: usize,
    /// Hand a snapshot to the observer every this many steps
    pub sample_interval: usize,
    /// Stop early once no cell changes by more than this in one step
    pub convergence_tolerance: Option<f32>,
    pub solver: SolverOptions,
    pub alert: AlertThresholds,
    /// Rescale the reported field so its maximum equals this (presentation only)
    pub calibration_peak: Option<f32>,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            width: 50,
            height: 50,
            dx: 1.0,
            dy: 1.0,
            obstacles: ObstaclePlacement::default(),
            ground: GroundSpec::default(),
            wind: WindSpec::default(),
            deflection: DeflectionRule::None,
            diffusivity: None,
            removal: RemovalModel::default(),
            sources: vec![EmissionPoint::accumulating(10, 25, 100.0)],
            source_placement: SourcePlacement::Reject,
            time_step: TimeStep::Fixed { dt: 0.02 },
            enforce_stability: true,
            iterations: 150,
            sample_interval: 1,
            convergence_tolerance: None,
            solver: SolverOptions::default(),
            alert: AlertThresholds::default(),
            calibration_peak: None,
        }
    }
}

impl ScenarioConfig {
    /// Diffusivity for the run: explicit value, then the stability class, then the default
    #[must_use]
    pub fn effective_diffusivity(&self) -> f32 {
        self.diffusivity
            .or_else(|| self.wind.implied_diffusivity())
            .unwrap_or(DEFAULT_DIFFUSIVITY)
    }
}
