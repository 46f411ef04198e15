//! Numerical properties of the dispersion solver
//!
//! Positivity, obstacle masking, mass balance under both boundary
//! conditions, the steady state of a fixed source, the upwind CFL limit,
//! and wall-driven stagnation under the lateral deflection rule.
//!
//! Run tests with: cargo test --test `dispersion_properties`

use std::ops::ControlFlow;

use approx::assert_relative_eq;
use nalgebra::Vector2;
use plume_sim_core::{
    AdrParams, AdrStepper, BoundaryCondition, ConcentrationField, ConfigError, DeflectionRule,
    DispersionRun, EmissionPoint, NullObserver, ObstacleMask, ObstaclePlacement, ObstacleRect,
    ScenarioConfig, Snapshot, SolverOptions, Source, SourcePlacement, StabilityClass, Termination,
    TimeStep, WindField, WindSpec,
};

#[ctor::ctor]
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn random_blocks(seed: u64) -> ObstaclePlacement {
    ObstaclePlacement::Random {
        seed,
        count: 6,
        min_size: 2,
        max_size: 5,
        margin: 3,
        min_height: 5.0,
        max_height: 20.0,
    }
}

fn still_stepper(dt: f32, diffusivity: f32, boundary: BoundaryCondition) -> AdrStepper {
    AdrStepper::new(
        AdrParams {
            dt,
            dx: 1.0,
            dy: 1.0,
            diffusivity,
            removal_rate: 0.0,
        },
        SolverOptions {
            boundary,
            ..SolverOptions::default()
        },
    )
}

// ═══════════════════════════════════════════════════════════════════════════════
// Positivity and masking
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_field_non_negative_and_obstacles_empty_every_step() {
    let config = ScenarioConfig {
        obstacles: random_blocks(7),
        deflection: DeflectionRule::lateral(),
        source_placement: SourcePlacement::RelocateToNearestFree,
        ..ScenarioConfig::default()
    };
    let mut run = DispersionRun::new(config).unwrap();
    let mask = run.mask().clone();
    assert!(mask.obstacle_count() > 0);

    let mut sampled = 0;
    let summary = run.run(&mut |s: &Snapshot<'_>| {
        sampled += 1;
        assert!(s.field.minimum() >= 0.0, "negative value at step {}", s.step);
        for (value, &solid) in s.field.as_slice().iter().zip(mask.as_slice()) {
            if solid {
                assert_eq!(*value, 0.0, "obstacle holds pollutant at step {}", s.step);
            }
        }
        ControlFlow::Continue(())
    });

    assert_eq!(sampled, 150);
    assert_eq!(summary.clamped_steps, 0);
    assert!(summary.peak > 0.0);
}

#[test]
fn test_random_obstacles_reproducible_from_seed() {
    let build = |seed| {
        let config = ScenarioConfig {
            obstacles: random_blocks(seed),
            source_placement: SourcePlacement::RelocateToNearestFree,
            ..ScenarioConfig::default()
        };
        DispersionRun::new(config).unwrap()
    };

    let first = build(42);
    let second = build(42);
    assert_eq!(first.mask().as_slice(), second.mask().as_slice());
    assert_eq!(first.buildings(), second.buildings());

    let other = build(43);
    assert_ne!(first.buildings(), other.buildings());
}

// ═══════════════════════════════════════════════════════════════════════════════
// Mass balance
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_accumulating_source_mass_grows_every_step() {
    let config = ScenarioConfig {
        width: 41,
        height: 41,
        sources: vec![EmissionPoint::accumulating(10, 20, 100.0)],
        iterations: 60,
        ..ScenarioConfig::default()
    };
    let mut run = DispersionRun::new(config).unwrap();

    let mut previous = run.field().total_mass();
    for _ in 0..60 {
        run.step();
        let mass = run.field().total_mass();
        assert!(mass > previous, "mass fell from {previous} to {mass}");
        previous = mass;
    }
}

#[test]
fn test_periodic_boundary_conserves_mass() {
    let n = 9;
    let mask = ObstacleMask::empty(n, n);
    let wind = WindField::uniform(n, n, Vector2::new(1.0, 0.5));
    let stepper = still_stepper(0.1, 1.0, BoundaryCondition::Periodic);
    let source = Source::new(Vec::new());

    let mut current = ConcentrationField::new(n, n);
    current.set(4, 4, 1.0);
    let mut next = ConcentrationField::new(n, n);

    for _ in 0..50 {
        stepper.step(&current, &mut next, &mask, &wind, &source);
        std::mem::swap(&mut current, &mut next);
    }
    assert_relative_eq!(current.total_mass(), 1.0, max_relative = 1e-4);
    // Blob has wrapped across the seam
    assert!(current.get(0, 4) > 0.0);
}

#[test]
fn test_absorbing_boundary_loses_mass() {
    let n = 9;
    let mask = ObstacleMask::empty(n, n);
    let wind = WindField::uniform(n, n, Vector2::zeros());
    let stepper = still_stepper(0.1, 1.0, BoundaryCondition::Absorbing);
    let source = Source::new(Vec::new());

    let mut current = ConcentrationField::new(n, n);
    current.set(2, 4, 1.0);
    let mut next = ConcentrationField::new(n, n);

    for _ in 0..50 {
        stepper.step(&current, &mut next, &mask, &wind, &source);
        std::mem::swap(&mut current, &mut next);
    }
    let mass = current.total_mass();
    assert!(mass > 0.0 && mass < 0.95, "mass {mass}");
    // Edge ring never holds pollutant
    for i in 0..n {
        assert_eq!(current.get(0, i), 0.0);
        assert_eq!(current.get(n - 1, i), 0.0);
        assert_eq!(current.get(i, 0), 0.0);
        assert_eq!(current.get(i, n - 1), 0.0);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Fixed source steady state
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_fixed_source_reaches_harmonic_steady_state() {
    let n = 15;
    let config = ScenarioConfig {
        width: n,
        height: n,
        wind: WindSpec::Components { u: 0.0, v: 0.0 },
        sources: vec![EmissionPoint::fixed(7, 7, 10.0)],
        time_step: TimeStep::Fixed { dt: 0.2 },
        iterations: 1500,
        ..ScenarioConfig::default()
    };
    let mut run = DispersionRun::new(config).unwrap();

    // Filling from zero is monotone while the field is still far from steady
    let mut previous_mass = 0.0;
    for step in 0..1500 {
        run.step();
        assert_eq!(run.field().get(7, 7), 10.0);
        let mass = run.field().total_mass();
        if step < 100 {
            assert!(mass > previous_mass);
        }
        previous_mass = mass;
    }

    let field = run.field();
    assert!(run.last_step().unwrap().max_change < 1e-4);
    assert_eq!(field.peak_location().map(|(x, y, _)| (x, y)), Some((7, 7)));

    // Discrete Laplace equation holds away from the source
    for y in 1..n - 1 {
        for x in 1..n - 1 {
            if (x, y) == (7, 7) {
                continue;
            }
            let residual = field.get(x - 1, y) + field.get(x + 1, y) + field.get(x, y - 1)
                + field.get(x, y + 1)
                - 4.0 * field.get(x, y);
            assert!(residual.abs() < 1e-3, "residual {residual} at ({x}, {y})");
        }
    }

    // Still air gives a symmetric field
    for y in 0..n {
        for x in 0..n {
            assert_relative_eq!(field.get(x, y), field.get(n - 1 - x, y), epsilon = 1e-4);
            assert_relative_eq!(field.get(x, y), field.get(y, x), epsilon = 1e-4);
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Stability
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_upwind_overshoots_only_past_cfl_limit() {
    let n = 9;
    let mask = ObstacleMask::empty(n, n);
    let source = Source::new(Vec::new());
    let stepper = still_stepper(0.1, 0.0, BoundaryCondition::Absorbing);

    let mut current = ConcentrationField::new(n, n);
    current.set(4, 4, 1.0);

    // Courant number 1.5
    let fast = WindField::uniform(n, n, Vector2::new(15.0, 0.0));
    let mut next = ConcentrationField::new(n, n);
    let diag = stepper.step(&current, &mut next, &mask, &fast, &source);
    assert!(diag.pre_clamp_min < 0.0);
    assert!(diag.clamped());
    assert!(next.minimum() >= 0.0);

    // Courant number 0.8
    let slow = WindField::uniform(n, n, Vector2::new(8.0, 0.0));
    let mut next = ConcentrationField::new(n, n);
    let diag = stepper.step(&current, &mut next, &mask, &slow, &source);
    assert!(diag.pre_clamp_min >= 0.0);
    assert!(!diag.clamped());
    assert_relative_eq!(next.get(4, 4), 0.2, epsilon = 1e-6);
    assert_relative_eq!(next.get(5, 4), 0.8, epsilon = 1e-6);
}

#[test]
fn test_unenforced_unstable_run_reports_warning() {
    let config = ScenarioConfig {
        wind: WindSpec::Components { u: 200.0, v: 0.0 },
        time_step: TimeStep::Fixed { dt: 0.02 },
        enforce_stability: false,
        iterations: 20,
        ..ScenarioConfig::default()
    };
    let mut run = DispersionRun::new(config).unwrap();
    assert!(run.stability_violation().is_some());

    let summary = run.run(&mut NullObserver);
    assert!(summary.stability_warning);
    assert!(summary.clamped_steps > 0);
}

#[test]
fn test_derived_time_step_respects_limits() {
    let config = ScenarioConfig {
        wind: WindSpec::Components { u: 20.0, v: 0.0 },
        time_step: TimeStep::default(),
        iterations: 200,
        ..ScenarioConfig::default()
    };
    let mut run = DispersionRun::new(config).unwrap();
    // Combined limit 1/(4K + u) = 1/24 s, safety 0.8
    assert_relative_eq!(run.dt(), 0.8 / 24.0, epsilon = 1e-6);

    let summary = run.run(&mut NullObserver);
    assert!(!summary.stability_warning);
    assert_eq!(summary.clamped_steps, 0);
}

#[test]
fn test_derived_step_converges_when_diffusion_and_advection_compete() {
    let config = ScenarioConfig {
        width: 40,
        height: 40,
        wind: WindSpec::Components { u: 2.0, v: 0.0 },
        sources: vec![EmissionPoint::fixed(10, 20, 10.0)],
        time_step: TimeStep::default(),
        iterations: 2000,
        ..ScenarioConfig::default()
    };
    let mut run = DispersionRun::new(config).unwrap();
    // Each limit alone would allow 0.8 * 0.25 = 0.2 s
    assert!(run.dt() < 1.0 / 6.0);

    let mut early_change = 0.0;
    for step in 0..2000 {
        let diagnostics = run.step();
        assert!(!diagnostics.clamped(), "clamped at step {step}");
        if step == 10 {
            early_change = diagnostics.max_change;
        }
    }

    let late_change = run.last_step().unwrap().max_change;
    assert!(late_change.is_finite());
    assert!(
        late_change < early_change * 1e-3,
        "max change went from {early_change} to {late_change}"
    );
    assert_eq!(run.field().peak(), 10.0);

    let summary = run.summary(Termination::Completed);
    assert_eq!(summary.clamped_steps, 0);
    assert!(!summary.stability_warning);
}

#[test]
fn test_every_stability_class_runs_clean_with_derived_step() {
    for class in StabilityClass::ALL {
        let config = ScenarioConfig {
            wind: WindSpec::Stability {
                class,
                direction_deg: 0.0,
            },
            time_step: TimeStep::default(),
            iterations: 300,
            ..ScenarioConfig::default()
        };
        let mut run = DispersionRun::new(config).unwrap();
        let summary = run.run(&mut NullObserver);

        assert_eq!(summary.clamped_steps, 0, "class {class:?} clamped");
        assert!(!summary.stability_warning, "class {class:?} flagged");
        assert!(summary.peak.is_finite() && summary.peak > 0.0);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Wall deflection
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_lateral_deflection_raises_upwind_wall_concentration() {
    let wall = ObstacleRect::new(15, 20, 1, 7);
    let run_with = |deflection| {
        let config = ScenarioConfig {
            obstacles: ObstaclePlacement::Fixed(vec![wall]),
            deflection,
            sources: vec![EmissionPoint::accumulating(10, 23, 100.0)],
            iterations: 300,
            ..ScenarioConfig::default()
        };
        let mut run = DispersionRun::new(config).unwrap();
        run.run(&mut NullObserver);
        run
    };

    let straight = run_with(DeflectionRule::None);
    let deflected = run_with(DeflectionRule::lateral());

    let (u, v) = deflected.wind().at(14, 23);
    assert_relative_eq!(u, 0.15, epsilon = 1e-6);
    assert!(v.abs() > 0.5);

    assert!(deflected.field().get(14, 23) > straight.field().get(14, 23));
    for y in 20..27 {
        assert_eq!(deflected.field().get(15, y), 0.0);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Configuration checks
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_source_inside_obstacle_rejected_or_relocated() {
    let block = ObstaclePlacement::Fixed(vec![ObstacleRect::new(8, 23, 5, 5)]);
    let rejected = ScenarioConfig {
        obstacles: block.clone(),
        ..ScenarioConfig::default()
    };
    assert!(matches!(
        DispersionRun::new(rejected),
        Err(ConfigError::SourceInObstacle { x: 10, y: 25 })
    ));

    let relocated = ScenarioConfig {
        obstacles: block,
        source_placement: SourcePlacement::RelocateToNearestFree,
        ..ScenarioConfig::default()
    };
    let run = DispersionRun::new(relocated).unwrap();
    let point = run.source().points[0];
    assert!(!run.mask().is_obstacle(point.x, point.y));
    // Nearest free cells are three steps out of the block
    assert_eq!(point.x.abs_diff(10) + point.y.abs_diff(25), 3);
}

#[test]
fn test_mixed_modes_and_bad_sources_rejected() {
    let with_sources = |sources| ScenarioConfig {
        sources,
        ..ScenarioConfig::default()
    };

    assert!(matches!(
        DispersionRun::new(with_sources(vec![
            EmissionPoint::accumulating(10, 25, 100.0),
            EmissionPoint::fixed(20, 25, 5.0),
        ])),
        Err(ConfigError::MixedEmissionModes)
    ));
    assert!(matches!(
        DispersionRun::new(with_sources(Vec::new())),
        Err(ConfigError::NoSources)
    ));
    assert!(matches!(
        DispersionRun::new(with_sources(vec![EmissionPoint::accumulating(0, 25, 1.0)])),
        Err(ConfigError::SourceOnBoundary { x: 0, y: 25 })
    ));
    assert!(matches!(
        DispersionRun::new(with_sources(vec![EmissionPoint::accumulating(60, 25, 1.0)])),
        Err(ConfigError::SourceOutOfBounds { x: 60, y: 25 })
    ));
    assert!(matches!(
        DispersionRun::new(with_sources(vec![
            EmissionPoint::accumulating(10, 25, 1.0),
            EmissionPoint::accumulating(10, 25, 2.0),
        ])),
        Err(ConfigError::DuplicateSource { x: 10, y: 25 })
    ));
}
