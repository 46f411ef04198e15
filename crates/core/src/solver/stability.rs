//! Time step limits for the explicit scheme
//!
//! Each process has its own bound, and the explicit update needs all of
//! them at once:
//!
//! ```text
//! diffusive:  dt ≤ 1 / (2K (1/dx² + 1/dy²))     (= dx²/4K on square cells)
//! advective:  dt ≤ 1 / max(|u|/dx + |v|/dy)     (= dx/u for wind along x)
//! removal:    dt ≤ 1 / σ
//! combined:   dt ≤ 1 / (2K (1/dx² + 1/dy²) + max(|u|/dx + |v|/dy) + σ)
//! ```
//!
//! The combined bound keeps the centre coefficient of the update,
//! `1 − dt (2K (1/dx² + 1/dy²) + |u|/dx + |v|/dy + σ)`, non-negative. With
//! every coefficient non-negative the step is a weighted average and cannot
//! overshoot. It is never looser than any single bound.
//!
//! A derived step takes the combined bound times a safety factor. A fixed
//! step is checked against every bound.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Safety margin applied to the tightest bound
pub const DEFAULT_SAFETY_FACTOR: f32 = 0.8;

/// Which bound a time step broke
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StabilityBound {
    Diffusive,
    Advective,
    Removal,
    Combined,
}

impl std::fmt::Display for StabilityBound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StabilityBound::Diffusive => write!(f, "diffusive"),
            StabilityBound::Advective => write!(f, "advective (CFL)"),
            StabilityBound::Removal => write!(f, "removal"),
            StabilityBound::Combined => write!(f, "combined diffusion-advection-removal"),
        }
    }
}

/// A time step above one of the stability bounds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StabilityViolation {
    pub bound: StabilityBound,
    pub dt: f32,
    pub limit: f32,
}

impl std::fmt::Display for StabilityViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "dt={} exceeds the {} limit {:.6}",
            self.dt, self.bound, self.limit
        )
    }
}

impl std::error::Error for StabilityViolation {}

/// Largest stable time step for each process, `f32::INFINITY` when inactive
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StabilityLimits {
    pub diffusive: f32,
    pub advective: f32,
    pub removal: f32,
    /// All processes acting together
    pub combined: f32,
}

impl StabilityLimits {
    /// Compute the limits for a grid and set of rates
    ///
    /// # Arguments
    ///
    /// * `dx`, `dy` - Grid spacing in meters
    /// * `diffusivity` - K in m²/s
    /// * `advective_rate` - `max(|u|/dx + |v|/dy)` over the wind field, 1/s
    /// * `removal_rate` - σ in 1/s
    #[must_use]
    pub fn compute(
        dx: f32,
        dy: f32,
        diffusivity: f32,
        advective_rate: f32,
        removal_rate: f32,
    ) -> Self {
        let inverse_or_inf = |rate: f32| if rate > 0.0 { 1.0 / rate } else { f32::INFINITY };
        let diffusive_rate = 2.0 * diffusivity * (1.0 / (dx * dx) + 1.0 / (dy * dy));
        Self {
            diffusive: inverse_or_inf(diffusive_rate),
            advective: inverse_or_inf(advective_rate),
            removal: inverse_or_inf(removal_rate),
            combined: inverse_or_inf(diffusive_rate + advective_rate + removal_rate),
        }
    }

    fn bounds(&self) -> [(StabilityBound, f32); 4] {
        [
            (StabilityBound::Diffusive, self.diffusive),
            (StabilityBound::Advective, self.advective),
            (StabilityBound::Removal, self.removal),
            (StabilityBound::Combined, self.combined),
        ]
    }

    /// Tightest bound and which one sets it
    ///
    /// A single active process ties with the combined bound and is reported
    /// by name.
    #[must_use]
    pub fn tightest(&self) -> (StabilityBound, f32) {
        self.bounds()
            .into_iter()
            .fold((StabilityBound::Diffusive, f32::INFINITY), |best, cur| {
                if cur.1 < best.1 {
                    cur
                } else {
                    best
                }
            })
    }

    /// Safety-scaled step, `None` when nothing limits it
    #[must_use]
    pub fn derive_time_step(&self, safety: f32) -> Option<f32> {
        let (_, limit) = self.tightest();
        limit.is_finite().then_some(safety * limit)
    }

    /// Check a caller-supplied step against every bound
    ///
    /// # Errors
    ///
    /// Returns the first bound `dt` exceeds, checked in diffusive, advective,
    /// removal, combined order.
    pub fn validate(&self, dt: f32) -> Result<(), StabilityViolation> {
        for (bound, limit) in self.bounds() {
            if dt > limit {
                return Err(StabilityViolation { bound, dt, limit });
            }
        }
        Ok(())
    }
}

/// How a run chooses its time step
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TimeStep {
    /// Caller-supplied step, checked against the limits
    Fixed { dt: f32 },
    /// `safety × combined limit`, capped at `max_dt`
    Derived { safety: f32, max_dt: f32 },
}

impl Default for TimeStep {
    fn default() -> Self {
        TimeStep::Derived {
            safety: DEFAULT_SAFETY_FACTOR,
            max_dt: 1.0,
        }
    }
}

/// Step chosen for a run and the bound it breaks, if any
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedTimeStep {
    pub dt: f32,
    pub violation: Option<StabilityViolation>,
}

impl TimeStep {
    /// Pick the step for a run
    ///
    /// With `enforce` off, an unstable fixed step is logged and returned with
    /// its violation instead of failing.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NonPositiveTimeStep`] for non-positive steps,
    /// [`ConfigError::InvalidParameter`] for a safety factor outside `(0, 1]`,
    /// and [`ConfigError::UnstableTimeStep`] when enforcing.
    pub fn resolve(
        &self,
        limits: &StabilityLimits,
        enforce: bool,
    ) -> Result<ResolvedTimeStep, ConfigError> {
        match *self {
            TimeStep::Fixed { dt } => {
                if !(dt.is_finite() && dt > 0.0) {
                    return Err(ConfigError::NonPositiveTimeStep(dt));
                }
                match limits.validate(dt) {
                    Ok(()) => Ok(ResolvedTimeStep { dt, violation: None }),
                    Err(violation) if enforce => Err(violation.into()),
                    Err(violation) => {
                        warn!("Stability check disabled, running anyway: {}", violation);
                        Ok(ResolvedTimeStep {
                            dt,
                            violation: Some(violation),
                        })
                    }
                }
            }
            TimeStep::Derived { safety, max_dt } => {
                if !(safety.is_finite() && safety > 0.0 && safety <= 1.0) {
                    return Err(ConfigError::InvalidParameter {
                        name: "time_step.safety",
                        value: safety,
                    });
                }
                if !(max_dt.is_finite() && max_dt > 0.0) {
                    return Err(ConfigError::NonPositiveTimeStep(max_dt));
                }
                let dt = limits
                    .derive_time_step(safety)
                    .map_or(max_dt, |dt| dt.min(max_dt));
                Ok(ResolvedTimeStep { dt, violation: None })
            }
        }
    }
}
