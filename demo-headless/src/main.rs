use clap::Parser;
use plume_sim_core::{
    DispersionRun, ObstaclePlacement, ScenarioConfig, Snapshot, SourcePlacement, StabilityClass,
    WindSpec,
};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info};

/// Urban pollutant dispersion run with configurable parameters
#[derive(Parser, Debug)]
#[command(name = "plume-sim-headless")]
#[command(about = "Headless urban pollutant dispersion run", long_about = None)]
struct Args {
    /// Scenario file (JSON); missing fields take their defaults
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of time steps
    #[arg(short, long)]
    steps: Option<usize>,

    /// Pasquill stability class (A-F), sets wind speed and diffusivity
    #[arg(long, conflicts_with = "wind_speed")]
    stability: Option<StabilityClass>,

    /// Wind speed in m/s
    #[arg(short, long)]
    wind_speed: Option<f32>,

    /// Direction the wind blows toward, degrees counter-clockwise from +x
    #[arg(long)]
    wind_direction: Option<f32>,

    /// Number of randomly placed buildings
    #[arg(short, long)]
    obstacles: Option<usize>,

    /// Seed for building placement
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Report every this many steps
    #[arg(short, long)]
    report_interval: Option<usize>,

    /// Write cells above the cutoff to this CSV file at the end
    #[arg(long)]
    csv: Option<PathBuf>,

    /// Visibility cutoff for the CSV export
    #[arg(long, default_value_t = 0.1)]
    cutoff: f32,
}

fn load_config(args: &Args) -> Result<ScenarioConfig, String> {
    let mut config = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .map_err(|e| format!("cannot read {}: {e}", path.display()))?;
            serde_json::from_str(&text)
                .map_err(|e| format!("cannot parse {}: {e}", path.display()))?
        }
        None => ScenarioConfig::default(),
    };

    if let Some(steps) = args.steps {
        config.iterations = steps;
    }
    if let Some(interval) = args.report_interval {
        config.sample_interval = interval;
    }

    let current_direction = match config.wind {
        WindSpec::Explicit { direction_deg, .. } | WindSpec::Stability { direction_deg, .. } => {
            direction_deg
        }
        _ => config
            .wind
            .base_wind()
            .map_or(0.0, |w| w.y.atan2(w.x).to_degrees()),
    };
    let direction_deg = args.wind_direction.unwrap_or(current_direction);

    if let Some(class) = args.stability {
        config.wind = WindSpec::Stability {
            class,
            direction_deg,
        };
    } else if let Some(speed) = args.wind_speed {
        config.wind = WindSpec::Explicit {
            speed,
            direction_deg,
        };
    } else if args.wind_direction.is_some() {
        let speed = config.wind.base_wind().map_or(0.0, |w| w.norm());
        config.wind = WindSpec::Explicit {
            speed,
            direction_deg,
        };
    }

    if let Some(count) = args.obstacles {
        config.obstacles = ObstaclePlacement::Random {
            seed: args.seed,
            count,
            min_size: 2,
            max_size: 6,
            margin: 3,
            min_height: 10.0,
            max_height: 40.0,
        };
        config.source_placement = SourcePlacement::RelocateToNearestFree;
    }

    Ok(config)
}

fn write_csv(run: &DispersionRun, path: &Path, cutoff: f32) -> std::io::Result<usize> {
    let rows = run.records_above(cutoff);
    let mut out = BufWriter::new(File::create(path)?);
    writeln!(out, "x,y,concentration")?;
    for row in &rows {
        writeln!(out, "{},{},{}", row.x, row.y, row.concentration)?;
    }
    out.flush()?;
    Ok(rows.len())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(message) => {
            error!("{}", message);
            return ExitCode::FAILURE;
        }
    };

    println!("=== Urban Plume Dispersion ===\n");
    println!(
        "Grid: {}x{} cells at {:.2}x{:.2} m, {} steps",
        config.width, config.height, config.dx, config.dy, config.iterations
    );

    let mut run = match DispersionRun::new(config) {
        Ok(run) => run,
        Err(e) => {
            error!("Rejected scenario: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let (u, v) = run.wind().at(run.config().width / 2, run.config().height / 2);
    println!(
        "Wind: ({:.2}, {:.2}) m/s, K: {:.3} m²/s, dt: {:.4} s, buildings: {}\n",
        u,
        v,
        run.config().effective_diffusivity(),
        run.dt(),
        run.buildings().len()
    );
    if let Some(violation) = run.stability_violation() {
        println!("WARNING: {violation}\n");
    }

    println!(
        "{:>7} {:>9} {:>11} {:>13} {:>10} {:>6}",
        "step", "time (s)", "peak", "near bldgs", "alert", "warn"
    );
    let summary = run.run(&mut |s: &Snapshot<'_>| {
        println!(
            "{:>7} {:>9.2} {:>11.4} {:>13.4} {:>10} {:>6}",
            s.step,
            s.time,
            s.peak,
            s.peak_near_obstacles,
            s.alert,
            if s.stability_warning { "yes" } else { "-" }
        );
        ControlFlow::Continue(())
    });

    println!("\n=== Summary ===");
    println!(
        "Termination: {:?} after {} steps ({:.2} s)",
        summary.termination, summary.steps, summary.simulated_time
    );
    println!("Peak: {:.4} ({})", summary.peak, summary.alert);
    println!("Peak near buildings: {:.4}", summary.peak_near_obstacles);
    println!("Total mass: {:.3}", summary.total_mass);
    if summary.stability_warning {
        println!(
            "Stability warning: clamping fired on {} steps",
            summary.clamped_steps
        );
    }

    if let Some(path) = &args.csv {
        match write_csv(&run, path, args.cutoff) {
            Ok(rows) => info!("Wrote {} rows to {}", rows, path.display()),
            Err(e) => {
                error!("Failed to write {}: {}", path.display(), e);
                return ExitCode::FAILURE;
            }
        }
    }

    ExitCode::SUCCESS
}
