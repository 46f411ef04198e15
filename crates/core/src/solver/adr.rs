//! Advection-diffusion-reaction stepper
//!
//! Advances the concentration field one explicit Euler step of
//!
//! ```text
//! ∂C/∂t = K∇²C − u·∇C − σC + S
//! ```
//!
//! on a masked regular grid:
//!
//! 1. Stencil pass (row-parallel): 5-point Laplacian, first-order upwind
//!    advection with the per-cell wind, linear removal. Reads only the
//!    previous field.
//! 2. Source pass: emissions injected into the new field.
//! 3. Mask and clamp pass (parallel): obstacles forced to zero, then every
//!    value clipped to `[0, upper_bound]`. Diagnostics record what the
//!    clamp had to fix.
//!
//! Obstacle cells are read as zero by their neighbours whatever they hold, so
//! a wall never feeds concentration back into the street.

use super::fields::ConcentrationField;
use super::options::{BoundaryCondition, DiffusionBoundaryPolicy, SolverOptions};
use crate::grid::{ObstacleMask, WindField};
use crate::source::Source;
use rayon::prelude::*;

/// Physical and numerical constants for one step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdrParams {
    /// Timestep in seconds
    pub dt: f32,
    /// Cell size along x in meters
    pub dx: f32,
    /// Cell size along y in meters
    pub dy: f32,
    /// Eddy diffusivity K (m²/s)
    pub diffusivity: f32,
    /// Combined removal rate σ (1/s)
    pub removal_rate: f32,
}

/// What the clamp pass saw after one step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepDiagnostics {
    /// Smallest value before clamping
    pub pre_clamp_min: f32,
    /// Largest value before clamping
    pub pre_clamp_max: f32,
    /// Cells the clamp changed (negative, above the ceiling, or non-finite)
    pub clamped_cells: usize,
    /// Largest absolute change from the previous field
    pub max_change: f32,
}

impl StepDiagnostics {
    /// Whether the clamp had to intervene
    #[must_use]
    pub fn clamped(&self) -> bool {
        self.clamped_cells > 0
    }

    fn identity() -> Self {
        Self {
            pre_clamp_min: f32::INFINITY,
            pre_clamp_max: f32::NEG_INFINITY,
            clamped_cells: 0,
            max_change: 0.0,
        }
    }

    fn merge(self, other: Self) -> Self {
        Self {
            pre_clamp_min: self.pre_clamp_min.min(other.pre_clamp_min),
            pre_clamp_max: self.pre_clamp_max.max(other.pre_clamp_max),
            clamped_cells: self.clamped_cells + other.clamped_cells,
            max_change: self.max_change.max(other.max_change),
        }
    }
}

#[inline]
fn wrap_dec(c: usize, n: usize) -> usize {
    if c == 0 {
        n - 1
    } else {
        c - 1
    }
}

#[inline]
fn wrap_inc(c: usize, n: usize) -> usize {
    if c + 1 == n {
        0
    } else {
        c + 1
    }
}

/// Stencil pass: fill `next` from `current` without sources or clamping
///
/// With an absorbing boundary the outer ring keeps its current value (zero
/// in a normal run). With a periodic boundary every cell is updated and
/// indices wrap.
///
/// # Arguments
///
/// * `current` - Concentration at step n, row-major
/// * `next` - Output buffer for step n+1, row-major
/// * `mask` - Obstacle mask
/// * `wind` - Per-cell wind
/// * `params` - Time step, spacing, and rates
/// * `options` - Diffusion and boundary policies
///
/// # Panics
///
/// Panics if the buffers, mask, and wind field differ in shape
pub fn step_adr_cpu(
    current: &[f32],
    next: &mut [f32],
    mask: &ObstacleMask,
    wind: &WindField,
    params: AdrParams,
    options: &SolverOptions,
) {
    let width = mask.width();
    let height = mask.height();
    let cells = width * height;
    assert!(
        current.len() == cells
            && next.len() == cells
            && wind.width() == width
            && wind.height() == height,
        "Field, mask and wind shapes differ"
    );

    let solid = mask.as_slice();
    let (wind_u, wind_v) = (wind.u(), wind.v());
    let periodic = options.boundary == BoundaryCondition::Periodic;
    let inv_dx2 = 1.0 / (params.dx * params.dx);
    let inv_dy2 = 1.0 / (params.dy * params.dy);

    // Obstacles read as empty from the outside
    let value = |idx: usize| if solid[idx] { 0.0 } else { current[idx] };

    next.par_chunks_mut(width)
        .enumerate()
        .for_each(|(y, row)| {
            for (x, cell) in row.iter_mut().enumerate() {
                let idx = y * width + x;
                if solid[idx] {
                    *cell = 0.0;
                    continue;
                }

                let on_edge = x == 0 || y == 0 || x == width - 1 || y == height - 1;
                if on_edge && !periodic {
                    *cell = current[idx];
                    continue;
                }

                let center = current[idx];
                let left = y * width + wrap_dec(x, width);
                let right = y * width + wrap_inc(x, width);
                let down = wrap_dec(y, height) * width + x;
                let up = wrap_inc(y, height) * width + x;

                // 1. Diffusion (5-point Laplacian)
                let laplacian = match options.diffusion_policy {
                    DiffusionBoundaryPolicy::Naive => {
                        (value(left) + value(right) - 2.0 * center) * inv_dx2
                            + (value(down) + value(up) - 2.0 * center) * inv_dy2
                    }
                    DiffusionBoundaryPolicy::FluxCorrected => {
                        let mut sum = 0.0;
                        let mut free = 0;
                        for (neighbor, weight) in
                            [(left, inv_dx2), (right, inv_dx2), (down, inv_dy2), (up, inv_dy2)]
                        {
                            if !solid[neighbor] {
                                sum += (current[neighbor] - center) * weight;
                                free += 1;
                            }
                        }
                        // Fully enclosed cell: nothing to exchange with
                        if free == 0 {
                            0.0
                        } else {
                            sum
                        }
                    }
                };
                let diffusion = params.diffusivity * laplacian;

                // 2. Advection (first-order upwind)
                let u = wind_u[idx];
                let v = wind_v[idx];
                let mut advection = 0.0;
                if u > 0.0 {
                    advection -= u * (center - value(left)) / params.dx;
                } else if u < 0.0 {
                    advection -= u * (value(right) - center) / params.dx;
                }
                if v > 0.0 {
                    advection -= v * (center - value(down)) / params.dy;
                } else if v < 0.0 {
                    advection -= v * (value(up) - center) / params.dy;
                }

                // 3. Removal
                let reaction = -params.removal_rate * center;

                *cell = center + params.dt * (diffusion + advection + reaction);
            }
        });
}

/// Mask and clamp pass over a freshly stepped field
///
/// Obstacle cells become exactly zero. Everything else is clipped to
/// `[0, upper_bound]`; NaN becomes zero and +∞ becomes the ceiling
/// (or `f32::MAX` without one).
pub fn mask_and_clamp(
    previous: &[f32],
    next: &mut [f32],
    mask: &ObstacleMask,
    upper_bound: Option<f32>,
) -> StepDiagnostics {
    let ceiling = upper_bound.unwrap_or(f32::MAX);

    next.par_iter_mut()
        .zip(mask.as_slice().par_iter())
        .zip(previous.par_iter())
        .map(|((cell, &solid), &prev)| {
            if solid {
                *cell = 0.0;
            }
            let raw = *cell;
            let clamped = if raw.is_nan() { 0.0 } else { raw.clamp(0.0, ceiling) };
            *cell = clamped;

            StepDiagnostics {
                pre_clamp_min: raw,
                pre_clamp_max: raw,
                clamped_cells: usize::from(clamped != raw || raw.is_nan()),
                max_change: (clamped - prev).abs(),
            }
        })
        .reduce(StepDiagnostics::identity, StepDiagnostics::merge)
}

/// Explicit ADR stepper with fixed parameters and options
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdrStepper {
    params: AdrParams,
    options: SolverOptions,
}

impl AdrStepper {
    /// Create a stepper
    #[must_use]
    pub fn new(params: AdrParams, options: SolverOptions) -> Self {
        Self { params, options }
    }

    /// Step parameters
    #[must_use]
    pub fn params(&self) -> &AdrParams {
        &self.params
    }

    /// Policy switches
    #[must_use]
    pub fn options(&self) -> &SolverOptions {
        &self.options
    }

    /// Compute `next` from `current`: stencil, sources, mask, clamp
    ///
    /// `current` is never written; callers swap the buffers afterwards.
    ///
    /// # Panics
    ///
    /// Panics if the fields, mask, and wind field differ in shape
    pub fn step(
        &self,
        current: &ConcentrationField,
        next: &mut ConcentrationField,
        mask: &ObstacleMask,
        wind: &WindField,
        source: &Source,
    ) -> StepDiagnostics {
        step_adr_cpu(
            current.as_slice(),
            next.as_mut_slice(),
            mask,
            wind,
            self.params,
            &self.options,
        );
        source.apply(next, self.params.dt);
        mask_and_clamp(
            current.as_slice(),
            next.as_mut_slice(),
            mask,
            self.options.upper_bound,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::ObstacleRect;
    use crate::source::EmissionPoint;
    use approx::assert_relative_eq;
    use nalgebra::Vector2;

    fn params(dt: f32, diffusivity: f32) -> AdrParams {
        AdrParams {
            dt,
            dx: 1.0,
            dy: 1.0,
            diffusivity,
            removal_rate: 0.0,
        }
    }

    fn still_air(n: usize) -> WindField {
        WindField::uniform(n, n, Vector2::zeros())
    }

    #[test]
    fn test_point_diffuses_to_neighbors() {
        let n = 7;
        let mask = ObstacleMask::empty(n, n);
        let mut current = ConcentrationField::new(n, n);
        current.set(3, 3, 1.0);
        let mut next = ConcentrationField::new(n, n);

        step_adr_cpu(
            current.as_slice(),
            next.as_mut_slice(),
            &mask,
            &still_air(n),
            params(0.1, 1.0),
            &SolverOptions::default(),
        );

        assert_relative_eq!(next.get(3, 3), 0.6);
        assert_relative_eq!(next.get(2, 3), 0.1);
        assert_relative_eq!(next.get(3, 4), 0.1);
        assert_eq!(next.get(2, 2), 0.0);
    }

    #[test]
    fn test_wind_advection_pushes_downwind() {
        let n = 9;
        let mask = ObstacleMask::empty(n, n);
        let wind = WindField::uniform(n, n, Vector2::new(2.0, 0.0));
        let mut current = ConcentrationField::new(n, n);
        current.set(4, 4, 1.0);
        let mut next = ConcentrationField::new(n, n);

        step_adr_cpu(
            current.as_slice(),
            next.as_mut_slice(),
            &mask,
            &wind,
            params(0.1, 0.0),
            &SolverOptions::default(),
        );

        assert_relative_eq!(next.get(4, 4), 0.8);
        assert_relative_eq!(next.get(5, 4), 0.2);
        assert_eq!(next.get(3, 4), 0.0);
    }

    #[test]
    fn test_negative_wind_reads_other_side() {
        let n = 9;
        let mask = ObstacleMask::empty(n, n);
        let wind = WindField::uniform(n, n, Vector2::new(0.0, -2.0));
        let mut current = ConcentrationField::new(n, n);
        current.set(4, 4, 1.0);
        let mut next = ConcentrationField::new(n, n);

        step_adr_cpu(
            current.as_slice(),
            next.as_mut_slice(),
            &mask,
            &wind,
            params(0.1, 0.0),
            &SolverOptions::default(),
        );

        assert_relative_eq!(next.get(4, 3), 0.2);
        assert_eq!(next.get(4, 5), 0.0);
    }

    #[test]
    fn test_removal_decays_linearly() {
        let n = 5;
        let mask = ObstacleMask::empty(n, n);
        let current = ConcentrationField::with_value(n, n, 2.0);
        let mut next = ConcentrationField::new(n, n);
        let p = AdrParams {
            removal_rate: 0.5,
            ..params(0.1, 0.0)
        };

        step_adr_cpu(
            current.as_slice(),
            next.as_mut_slice(),
            &mask,
            &still_air(n),
            p,
            &SolverOptions::default(),
        );
        assert_relative_eq!(next.get(2, 2), 1.9);
    }

    #[test]
    fn test_absorbing_edges_keep_their_value() {
        let n = 5;
        let mask = ObstacleMask::empty(n, n);
        let mut current = ConcentrationField::new(n, n);
        current.set(1, 2, 1.0);
        let mut next = ConcentrationField::new(n, n);

        step_adr_cpu(
            current.as_slice(),
            next.as_mut_slice(),
            &mask,
            &still_air(n),
            params(0.1, 1.0),
            &SolverOptions::default(),
        );
        assert_eq!(next.get(0, 2), 0.0);
    }

    #[test]
    fn test_periodic_wraps_stencil() {
        let n = 5;
        let mask = ObstacleMask::empty(n, n);
        let mut current = ConcentrationField::new(n, n);
        current.set(0, 2, 1.0);
        let mut next = ConcentrationField::new(n, n);
        let options = SolverOptions {
            boundary: BoundaryCondition::Periodic,
            ..SolverOptions::default()
        };

        step_adr_cpu(
            current.as_slice(),
            next.as_mut_slice(),
            &mask,
            &still_air(n),
            params(0.1, 1.0),
            &options,
        );
        assert_relative_eq!(next.get(4, 2), 0.1);
        assert_relative_eq!(next.get(0, 2), 0.6);
    }

    #[test]
    fn test_flux_corrected_vs_naive_next_to_wall() {
        let n = 7;
        let mask = ObstacleMask::from_rects(n, n, &[ObstacleRect::new(4, 3, 1, 1)]);
        let mut current = ConcentrationField::new(n, n);
        current.set(3, 3, 1.0);

        let run = |policy| {
            let mut next = ConcentrationField::new(n, n);
            let options = SolverOptions {
                diffusion_policy: policy,
                ..SolverOptions::default()
            };
            step_adr_cpu(
                current.as_slice(),
                next.as_mut_slice(),
                &mask,
                &still_air(n),
                params(0.1, 1.0),
                &options,
            );
            next
        };

        let naive = run(DiffusionBoundaryPolicy::Naive);
        let corrected = run(DiffusionBoundaryPolicy::FluxCorrected);

        // Naive loses a share into the wall; corrected keeps it in the street
        assert_relative_eq!(naive.get(3, 3), 0.6);
        assert_relative_eq!(corrected.get(3, 3), 0.7);
        assert_relative_eq!(corrected.total_mass(), 1.0, epsilon = 1e-6);
        assert!(naive.total_mass() < 1.0 - 1e-3);
        assert_eq!(corrected.get(4, 3), 0.0);
    }

    #[test]
    fn test_enclosed_cell_has_no_diffusion() {
        let n = 5;
        let rects = [
            ObstacleRect::new(1, 2, 1, 1),
            ObstacleRect::new(3, 2, 1, 1),
            ObstacleRect::new(2, 1, 1, 1),
            ObstacleRect::new(2, 3, 1, 1),
        ];
        let mask = ObstacleMask::from_rects(n, n, &rects);
        let mut current = ConcentrationField::new(n, n);
        current.set(2, 2, 5.0);
        let mut next = ConcentrationField::new(n, n);

        step_adr_cpu(
            current.as_slice(),
            next.as_mut_slice(),
            &mask,
            &still_air(n),
            params(0.1, 1.0),
            &SolverOptions::default(),
        );
        assert_eq!(next.get(2, 2), 5.0);
        assert!(next.as_slice().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_mask_and_clamp_reports_fixes() {
        let mask = ObstacleMask::from_rects(3, 1, &[ObstacleRect::new(2, 0, 1, 1)]);
        let previous = [0.0, 0.0, 0.0];
        let mut next = [-0.5, 12.0, 3.0];

        let diag = mask_and_clamp(&previous, &mut next, &mask, Some(10.0));
        assert_eq!(next, [0.0, 10.0, 0.0]);
        assert_eq!(diag.pre_clamp_min, -0.5);
        assert_eq!(diag.pre_clamp_max, 12.0);
        assert_eq!(diag.clamped_cells, 2);
        assert!(diag.clamped());
        assert_eq!(diag.max_change, 10.0);
    }

    #[test]
    fn test_mask_and_clamp_replaces_nan() {
        let mask = ObstacleMask::empty(2, 1);
        let mut next = [f32::NAN, 1.0];
        let diag = mask_and_clamp(&[0.0, 0.0], &mut next, &mask, None);
        assert_eq!(next, [0.0, 1.0]);
        assert_eq!(diag.clamped_cells, 1);
    }

    #[test]
    fn test_stepper_masks_source_inside_obstacle() {
        let n = 6;
        let mask = ObstacleMask::from_rects(n, n, &[ObstacleRect::new(2, 2, 2, 2)]);
        let source = Source::new(vec![EmissionPoint::accumulating(2, 2, 50.0)]);
        let stepper = AdrStepper::new(params(0.1, 1.0), SolverOptions::default());
        let current = ConcentrationField::new(n, n);
        let mut next = ConcentrationField::new(n, n);

        stepper.step(&current, &mut next, &mask, &still_air(n), &source);
        assert_eq!(next.get(2, 2), 0.0);
    }
}
