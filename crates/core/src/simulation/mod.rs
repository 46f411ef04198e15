//! Dispersion run context and time integration loop
//!
//! A [`DispersionRun`] owns everything for one scenario: the immutable grid,
//! wind, and source it was built from, plus the double-buffered
//! concentration field. It is built once from a [`ScenarioConfig`], runs,
//! and is dropped. A changed configuration means a new run starting from
//! zero.

mod config;
mod report;

pub use config::{GroundSpec, ScenarioConfig, DEFAULT_DIFFUSIVITY};
pub use report::{
    peak_over, records_above, AlertLevel, AlertThresholds, ConcentrationRecord, RunSummary,
    Snapshot, Termination,
};

use crate::error::{non_negative, ConfigError};
use crate::grid::{ElevationMap, ObstacleMask, ObstacleRect, WindField, WindSpec};
use crate::solver::{
    AdrParams, AdrStepper, BoundaryCondition, ConcentrationField, StabilityLimits,
    StabilityViolation, StepDiagnostics,
};
use crate::source::Source;
use std::ops::ControlFlow;
use tracing::{debug, info, warn};

// Helper to convert usize to f32, centralizing the intentional precision loss
#[inline]
#[expect(clippy::cast_precision_loss)]
fn usize_to_f32(v: usize) -> f32 {
    v as f32
}

/// Receives sampled snapshots from [`DispersionRun::run`]
pub trait RunObserver {
    /// Called every `sample_interval` steps and after the last step
    ///
    /// Returning `ControlFlow::Break(())` stops the run.
    fn on_sample(&mut self, snapshot: &Snapshot<'_>) -> ControlFlow<()>;

    /// Checked once before every step; `true` stops the run
    fn should_abort(&self) -> bool {
        false
    }
}

impl<F> RunObserver for F
where
    F: FnMut(&Snapshot<'_>) -> ControlFlow<()>,
{
    fn on_sample(&mut self, snapshot: &Snapshot<'_>) -> ControlFlow<()> {
        self(snapshot)
    }
}

/// Observer that ignores every sample
#[derive(Debug, Clone, Copy, Default)]
pub struct NullObserver;

impl RunObserver for NullObserver {
    fn on_sample(&mut self, _snapshot: &Snapshot<'_>) -> ControlFlow<()> {
        ControlFlow::Continue(())
    }
}

/// One dispersion scenario being integrated
pub struct DispersionRun {
    config: ScenarioConfig,

    // Static inputs (never change during the run)
    mask: ObstacleMask,
    buildings: Vec<ObstacleRect>,
    elevation: ElevationMap,
    wind: WindField,
    source: Source,
    stepper: AdrStepper,
    near_obstacle_cells: Vec<usize>,
    stability_violation: Option<StabilityViolation>,

    // Ping-pong buffers (read from one, write to other, then swap)
    concentration: ConcentrationField,
    concentration_back: ConcentrationField,

    // Progress
    step_index: usize,
    clamped_steps: usize,
    last_step: Option<StepDiagnostics>,
}

impl DispersionRun {
    /// Validate a scenario and set up its run
    ///
    /// # Errors
    ///
    /// Returns the first configuration problem found; nothing is stepped
    /// until the whole scenario checks out.
    pub fn new(config: ScenarioConfig) -> Result<Self, ConfigError> {
        let (width, height) = (config.width, config.height);
        if width < 3 || height < 3 {
            return Err(ConfigError::GridTooSmall { width, height });
        }
        let spacing_ok = |d: f32| d.is_finite() && d > 0.0;
        if !spacing_ok(config.dx) || !spacing_ok(config.dy) {
            return Err(ConfigError::NonPositiveSpacing {
                dx: config.dx,
                dy: config.dy,
            });
        }
        if config.sample_interval == 0 {
            return Err(ConfigError::InvalidSampleInterval);
        }
        config.alert.validate()?;
        if let Some(tolerance) = config.convergence_tolerance {
            non_negative("convergence_tolerance", tolerance)?;
        }
        if let Some(ceiling) = config.solver.upper_bound {
            non_negative("solver.upper_bound", ceiling)?;
        }
        if let Some(target) = config.calibration_peak {
            non_negative("calibration_peak", target)?;
        }

        // Buildings and display elevation
        let (mask, buildings) = ObstacleMask::from_placement(width, height, &config.obstacles)?;
        let ground = match config.ground {
            GroundSpec::Flat { elevation } => ElevationMap::flat(width, height, elevation),
            GroundSpec::Hill {
                base_elevation,
                hill_height,
                hill_radius,
            } => ElevationMap::single_hill(width, height, base_elevation, hill_height, hill_radius),
        };
        let elevation = ground.with_buildings(&buildings);

        // Wind
        config.deflection.validate()?;
        let wind = match (&config.wind, config.wind.base_wind()) {
            (WindSpec::PerCell { u, v }, _) => {
                WindField::from_components(width, height, u.clone(), v.clone())?
            }
            (_, Some(base)) => {
                for component in [base.x, base.y] {
                    if !component.is_finite() {
                        return Err(ConfigError::InvalidParameter {
                            name: "wind",
                            value: component,
                        });
                    }
                }
                WindField::with_obstacles(base, &mask, config.deflection)
            }
            (_, None) => WindField::uniform(width, height, nalgebra::Vector2::zeros()),
        };

        // Rates and time step
        let diffusivity = non_negative("diffusivity", config.effective_diffusivity())?;
        let removal_rate = config.removal.validate()?;
        let limits = StabilityLimits::compute(
            config.dx,
            config.dy,
            diffusivity,
            wind.max_advective_rate(config.dx, config.dy),
            removal_rate,
        );
        let resolved = config.time_step.resolve(&limits, config.enforce_stability)?;

        // Emissions
        let source = Source::new(config.sources.clone()).validate(
            &mask,
            config.solver.boundary,
            config.source_placement,
        )?;

        if config.solver.boundary == BoundaryCondition::Periodic {
            warn!("Periodic boundary wraps pollutant back into the domain; not physical for open air");
        }

        let stepper = AdrStepper::new(
            AdrParams {
                dt: resolved.dt,
                dx: config.dx,
                dy: config.dy,
                diffusivity,
                removal_rate,
            },
            config.solver,
        );

        info!(
            "Dispersion run initialized: {}x{} grid, {} obstacle cells, {} sources ({:?}), K={:.3}, sigma={:.5}, dt={:.4}s",
            width,
            height,
            mask.obstacle_count(),
            source.points.len(),
            source.mode(),
            diffusivity,
            removal_rate,
            resolved.dt
        );

        Ok(Self {
            near_obstacle_cells: mask.obstacle_adjacent_indices(),
            concentration: ConcentrationField::new(width, height),
            concentration_back: ConcentrationField::new(width, height),
            mask,
            buildings,
            elevation,
            wind,
            source,
            stepper,
            stability_violation: resolved.violation,
            step_index: 0,
            clamped_steps: 0,
            last_step: None,
            config,
        })
    }

    /// Advance one time step
    pub fn step(&mut self) -> StepDiagnostics {
        let diagnostics = self.stepper.step(
            &self.concentration,
            &mut self.concentration_back,
            &self.mask,
            &self.wind,
            &self.source,
        );

        // Swap buffers
        std::mem::swap(&mut self.concentration, &mut self.concentration_back);
        self.step_index += 1;

        if diagnostics.clamped() {
            if self.clamped_steps == 0 {
                warn!(
                    "Clamping triggered at step {}: {} cells, pre-clamp range [{:.4}, {:.4}]",
                    self.step_index,
                    diagnostics.clamped_cells,
                    diagnostics.pre_clamp_min,
                    diagnostics.pre_clamp_max
                );
            }
            self.clamped_steps += 1;
        }
        self.last_step = Some(diagnostics);
        diagnostics
    }

    /// Run the configured number of steps
    ///
    /// Stops early when the observer aborts or, with a convergence tolerance
    /// set, when the field stops changing.
    pub fn run<O: RunObserver + ?Sized>(&mut self, observer: &mut O) -> RunSummary {
        let iterations = self.config.iterations;
        let interval = self.config.sample_interval;
        let tolerance = self.config.convergence_tolerance;
        let mut termination = Termination::Completed;

        while self.step_index < iterations {
            if observer.should_abort() {
                termination = Termination::Aborted;
                break;
            }

            let diagnostics = self.step();
            let converged = tolerance.is_some_and(|tol| diagnostics.max_change < tol);
            let last = self.step_index == iterations;

            let mut stop = false;
            if self.step_index % interval == 0 || converged || last {
                let snapshot = self.snapshot();
                debug!(
                    "Step {}: t={:.2}s, peak={:.4}, near obstacles={:.4}, alert={}",
                    snapshot.step,
                    snapshot.time,
                    snapshot.peak,
                    snapshot.peak_near_obstacles,
                    snapshot.alert
                );
                stop = observer.on_sample(&snapshot).is_break();
            }

            if converged {
                termination = Termination::Converged;
                break;
            }
            // A stop on the final sample cuts nothing short
            if stop {
                if !last {
                    termination = Termination::Aborted;
                }
                break;
            }
        }

        let summary = self.summary(termination);
        info!(
            "Dispersion run finished ({:?}) after {} steps: peak={:.4}, near obstacles={:.4}, clamped steps={}",
            summary.termination,
            summary.steps,
            summary.peak,
            summary.peak_near_obstacles,
            summary.clamped_steps
        );
        summary
    }

    /// Current state for the reporting layer
    #[must_use]
    pub fn snapshot(&self) -> Snapshot<'_> {
        let peak = self.concentration.peak();
        Snapshot {
            step: self.step_index,
            time: self.elapsed(),
            field: &self.concentration,
            peak,
            peak_near_obstacles: peak_over(&self.concentration, &self.near_obstacle_cells),
            alert: self.config.alert.classify(peak),
            clamped: self.last_step.is_some_and(|d| d.clamped()),
            stability_warning: self.stability_warning(),
        }
    }

    /// Totals so far
    #[must_use]
    pub fn summary(&self, termination: Termination) -> RunSummary {
        let snapshot = self.snapshot();
        RunSummary {
            steps: self.step_index,
            simulated_time: snapshot.time,
            dt: self.dt(),
            termination,
            peak: snapshot.peak,
            peak_near_obstacles: snapshot.peak_near_obstacles,
            alert: snapshot.alert,
            total_mass: self.concentration.total_mass(),
            clamped_steps: self.clamped_steps,
            stability_warning: snapshot.stability_warning,
        }
    }

    /// Clamping has fired, or the time step breaks a bound
    #[must_use]
    pub fn stability_warning(&self) -> bool {
        self.clamped_steps > 0 || self.stability_violation.is_some()
    }

    /// Bound broken by an unenforced fixed time step
    #[must_use]
    pub fn stability_violation(&self) -> Option<StabilityViolation> {
        self.stability_violation
    }

    /// Simulated seconds so far
    #[must_use]
    pub fn elapsed(&self) -> f32 {
        usize_to_f32(self.step_index) * self.dt()
    }

    /// Time step in use
    #[must_use]
    pub fn dt(&self) -> f32 {
        self.stepper.params().dt
    }

    /// Steps completed
    #[must_use]
    pub fn step_index(&self) -> usize {
        self.step_index
    }

    /// Diagnostics of the latest step
    #[must_use]
    pub fn last_step(&self) -> Option<StepDiagnostics> {
        self.last_step
    }

    /// Current concentration
    #[must_use]
    pub fn field(&self) -> &ConcentrationField {
        &self.concentration
    }

    /// Field rescaled to the configured calibration peak, if any
    ///
    /// Presentation only: the run keeps integrating the unscaled field.
    #[must_use]
    pub fn calibrated_field(&self) -> ConcentrationField {
        match self.config.calibration_peak {
            Some(target) => self.concentration.scaled_to_peak(target),
            None => self.concentration.clone(),
        }
    }

    /// Export rows above a visibility cutoff from the calibrated field
    #[must_use]
    pub fn records_above(&self, cutoff: f32) -> Vec<ConcentrationRecord> {
        records_above(&self.calibrated_field(), cutoff)
    }

    /// Scenario this run was built from
    #[must_use]
    pub fn config(&self) -> &ScenarioConfig {
        &self.config
    }

    /// Obstacle mask
    #[must_use]
    pub fn mask(&self) -> &ObstacleMask {
        &self.mask
    }

    /// Building footprints behind the mask
    #[must_use]
    pub fn buildings(&self) -> &[ObstacleRect] {
        &self.buildings
    }

    /// Display elevation with buildings
    #[must_use]
    pub fn elevation(&self) -> &ElevationMap {
        &self.elevation
    }

    /// Wind field
    #[must_use]
    pub fn wind(&self) -> &WindField {
        &self.wind
    }

    /// Validated source (after any relocation)
    #[must_use]
    pub fn source(&self) -> &Source {
        &self.source
    }
}
