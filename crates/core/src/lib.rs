//! Urban Pollutant Dispersion Core Library
//!
//! Computes how an airborne pollutant spreads over a 2-D street grid under
//! wind transport, turbulent diffusion, first-order removal, and solid
//! buildings, by stepping the advection-diffusion-reaction equation
//!
//! ```text
//! ∂C/∂t = K∇²C − u·∇C − σC + S
//! ```
//!
//! with an explicit finite-difference scheme on a masked regular grid.
//!
//! ## Layout
//!
//! - [`grid`]: obstacle mask, display elevation, wind field with deflection
//! - [`source`]: emission points and their release policy
//! - [`solver`]: concentration field, ADR stepper, stability limits, removal
//! - [`simulation`]: scenario config, run loop, outbound reports
//!
//! ## Example
//!
//! ```rust
//! use plume_sim_core::{DispersionRun, NullObserver, ScenarioConfig};
//!
//! let mut run = DispersionRun::new(ScenarioConfig::default()).expect("valid scenario");
//! let summary = run.run(&mut NullObserver);
//! assert_eq!(summary.steps, 150);
//! assert!(summary.peak > 0.0);
//! ```

pub mod error;
pub mod grid;
pub mod simulation;
pub mod solver;
pub mod source;

// Re-export core types
pub use error::ConfigError;
pub use grid::{
    DeflectionRule, ElevationMap, ObstacleMask, ObstaclePlacement, ObstacleRect, StabilityClass,
    WindField, WindSpec,
};
pub use simulation::{
    AlertLevel, AlertThresholds, ConcentrationRecord, DispersionRun, NullObserver, RunObserver,
    RunSummary, ScenarioConfig, Snapshot, Termination,
};
pub use solver::{
    AdrParams, AdrStepper, BoundaryCondition, ConcentrationField, DiffusionBoundaryPolicy,
    RemovalModel, SolverOptions, StepDiagnostics, TimeStep,
};
pub use source::{EmissionMode, EmissionPoint, Source, SourcePlacement};
