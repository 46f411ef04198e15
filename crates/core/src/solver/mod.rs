//! Numerical core for pollutant transport
//!
//! - [`ConcentrationField`]: row-major grid storage, double-buffered by the run
//! - [`AdrStepper`]: one explicit advection-diffusion-reaction step
//! - [`StabilityLimits`] / [`TimeStep`]: time step derivation and checks
//! - [`RemovalModel`]: decay, deposition, and rain washout folded into one rate
//!
//! # Example
//!
//! ```rust
//! use nalgebra::Vector2;
//! use plume_sim_core::grid::{ObstacleMask, WindField};
//! use plume_sim_core::solver::{AdrParams, AdrStepper, ConcentrationField, SolverOptions};
//! use plume_sim_core::source::{EmissionPoint, Source};
//!
//! let mask = ObstacleMask::empty(20, 20);
//! let wind = WindField::uniform(20, 20, Vector2::new(1.0, 0.0));
//! let source = Source::new(vec![EmissionPoint::accumulating(5, 10, 10.0)]);
//! let params = AdrParams { dt: 0.05, dx: 1.0, dy: 1.0, diffusivity: 1.0, removal_rate: 0.0 };
//! let stepper = AdrStepper::new(params, SolverOptions::default());
//!
//! let mut current = ConcentrationField::new(20, 20);
//! let mut next = ConcentrationField::new(20, 20);
//! for _ in 0..10 {
//!     stepper.step(&current, &mut next, &mask, &wind, &source);
//!     std::mem::swap(&mut current, &mut next);
//! }
//! assert!(current.get(5, 10) > 0.0);
//! ```

mod adr;
mod fields;
mod options;
mod removal;
mod stability;

// Re-exports
pub use adr::{mask_and_clamp, step_adr_cpu, AdrParams, AdrStepper, StepDiagnostics};
pub use fields::ConcentrationField;
pub use options::{BoundaryCondition, DiffusionBoundaryPolicy, SolverOptions};
pub use removal::{RemovalModel, DEFAULT_WASHOUT_EXPONENT, DEFAULT_WASHOUT_SCALE};
pub use stability::{
    ResolvedTimeStep, StabilityBound, StabilityLimits, StabilityViolation, TimeStep,
    DEFAULT_SAFETY_FACTOR,
};
