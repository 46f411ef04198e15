//! Street-level wind field with obstacle deflection
//!
//! The wind is a fixed 2-D vector field for the whole run. It starts from a
//! uniform base wind and is then adjusted cell by cell next to buildings with
//! one of two heuristics:
//!
//! - **Lateral**: a cell whose downstream neighbour is solid sees its
//!   streamwise speed cut (stagnation against the wall) and gains a
//!   cross-stream component steering the flow toward the nearer end of the wall.
//! - **Venturi**: a cell whose upstream neighbour is solid sees its streamwise
//!   speed raised, modelling channelling between buildings.
//!
//! Neither is a solved flow field. Both are deterministic given the mask and
//! base wind.

use super::obstacles::ObstacleMask;
use crate::error::ConfigError;
use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

/// Default streamwise attenuation in front of a wall
pub const DEFAULT_WALL_ATTENUATION: f32 = 0.1;

/// Default cross-stream push, as a fraction of the base wind speed
pub const DEFAULT_LATERAL_FACTOR: f32 = 0.4;

/// Default streamwise acceleration behind a building edge
pub const DEFAULT_VENTURI_ACCELERATION: f32 = 1.5;

/// Pasquill-Gifford atmospheric stability classes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StabilityClass {
    /// A: Very unstable (strong solar heating, light winds)
    A,
    /// B: Moderately unstable
    B,
    /// C: Slightly unstable
    C,
    /// D: Neutral (overcast or high winds)
    D,
    /// E: Slightly stable
    E,
    /// F: Very stable (nighttime, light winds)
    F,
}

/// `(wind speed m/s, eddy diffusivity m²/s)` per class, indexed A..F
///
/// Unstable air mixes strongly under light wind; stable night air barely
/// mixes at all.
const STABILITY_TABLE: [(f32, f32); 6] = [
    (1.0, 2.5),
    (2.0, 2.0),
    (3.0, 1.5),
    (5.0, 1.0),
    (3.0, 0.5),
    (2.0, 0.2),
];

impl StabilityClass {
    /// All classes from most to least unstable
    pub const ALL: [StabilityClass; 6] = [
        StabilityClass::A,
        StabilityClass::B,
        StabilityClass::C,
        StabilityClass::D,
        StabilityClass::E,
        StabilityClass::F,
    ];

    fn table_index(self) -> usize {
        match self {
            StabilityClass::A => 0,
            StabilityClass::B => 1,
            StabilityClass::C => 2,
            StabilityClass::D => 3,
            StabilityClass::E => 4,
            StabilityClass::F => 5,
        }
    }

    /// Representative wind speed in m/s
    #[must_use]
    pub fn wind_speed(self) -> f32 {
        STABILITY_TABLE[self.table_index()].0
    }

    /// Representative eddy diffusivity in m²/s
    #[must_use]
    pub fn diffusivity(self) -> f32 {
        STABILITY_TABLE[self.table_index()].1
    }
}

impl std::str::FromStr for StabilityClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "A" => Ok(StabilityClass::A),
            "B" => Ok(StabilityClass::B),
            "C" => Ok(StabilityClass::C),
            "D" => Ok(StabilityClass::D),
            "E" => Ok(StabilityClass::E),
            "F" => Ok(StabilityClass::F),
            other => Err(format!("unknown stability class '{other}', expected A-F")),
        }
    }
}

/// How the base wind is specified
///
/// Directions are the heading the wind blows toward, in degrees
/// counter-clockwise from +x.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WindSpec {
    /// Raw components in m/s
    Components { u: f32, v: f32 },
    /// Speed in m/s and heading in degrees
    Explicit { speed: f32, direction_deg: f32 },
    /// Speed from a stability class lookup
    Stability {
        class: StabilityClass,
        direction_deg: f32,
    },
    /// Precomputed per-cell components, row-major
    PerCell { u: Vec<f32>, v: Vec<f32> },
}

impl Default for WindSpec {
    fn default() -> Self {
        WindSpec::Components { u: 1.5, v: 0.0 }
    }
}

fn heading(speed: f32, direction_deg: f32) -> Vector2<f32> {
    let theta = direction_deg.to_radians();
    Vector2::new(speed * theta.cos(), speed * theta.sin())
}

impl WindSpec {
    /// Uniform base wind, `None` for per-cell fields
    #[must_use]
    pub fn base_wind(&self) -> Option<Vector2<f32>> {
        match self {
            WindSpec::Components { u, v } => Some(Vector2::new(*u, *v)),
            WindSpec::Explicit {
                speed,
                direction_deg,
            } => Some(heading(*speed, *direction_deg)),
            WindSpec::Stability {
                class,
                direction_deg,
            } => Some(heading(class.wind_speed(), *direction_deg)),
            WindSpec::PerCell { .. } => None,
        }
    }

    /// Diffusivity implied by a stability class, if this is one
    #[must_use]
    pub fn implied_diffusivity(&self) -> Option<f32> {
        match self {
            WindSpec::Stability { class, .. } => Some(class.diffusivity()),
            _ => None,
        }
    }
}

/// Obstacle deflection heuristic
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum DeflectionRule {
    /// Uniform wind, obstacles only zero their own cells
    #[default]
    None,
    /// Slow down in front of walls and push sideways around them
    Lateral {
        attenuation: f32,
        lateral_factor: f32,
    },
    /// Speed up downstream of building edges
    Venturi { acceleration: f32 },
}

impl DeflectionRule {
    /// Lateral rule with the default multipliers
    #[must_use]
    pub fn lateral() -> Self {
        DeflectionRule::Lateral {
            attenuation: DEFAULT_WALL_ATTENUATION,
            lateral_factor: DEFAULT_LATERAL_FACTOR,
        }
    }

    /// Venturi rule with the default multiplier
    #[must_use]
    pub fn venturi() -> Self {
        DeflectionRule::Venturi {
            acceleration: DEFAULT_VENTURI_ACCELERATION,
        }
    }

    /// Check the multipliers are finite and non-negative
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidParameter`] naming the bad multiplier.
    pub fn validate(&self) -> Result<(), ConfigError> {
        use crate::error::non_negative;
        match *self {
            DeflectionRule::None => {}
            DeflectionRule::Lateral {
                attenuation,
                lateral_factor,
            } => {
                non_negative("deflection.attenuation", attenuation)?;
                non_negative("deflection.lateral_factor", lateral_factor)?;
            }
            DeflectionRule::Venturi { acceleration } => {
                non_negative("deflection.acceleration", acceleration)?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    X,
    Y,
}

/// Per-cell wind components, constant for a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindField {
    u: Vec<f32>,
    v: Vec<f32>,
    width: usize,
    height: usize,
}

impl WindField {
    /// The same wind everywhere
    #[must_use]
    pub fn uniform(width: usize, height: usize, wind: Vector2<f32>) -> Self {
        Self {
            u: vec![wind.x; width * height],
            v: vec![wind.y; width * height],
            width,
            height,
        }
    }

    /// Wrap caller-supplied arrays
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::WindShapeMismatch`] when either array is not
    /// `width * height` long, or [`ConfigError::InvalidParameter`] for
    /// non-finite components.
    pub fn from_components(
        width: usize,
        height: usize,
        u: Vec<f32>,
        v: Vec<f32>,
    ) -> Result<Self, ConfigError> {
        let expected = width * height;
        for arr in [&u, &v] {
            if arr.len() != expected {
                return Err(ConfigError::WindShapeMismatch {
                    expected,
                    actual: arr.len(),
                });
            }
        }
        if let Some(&bad) = u.iter().chain(v.iter()).find(|c| !c.is_finite()) {
            return Err(ConfigError::InvalidParameter {
                name: "wind component",
                value: bad,
            });
        }
        Ok(Self {
            u,
            v,
            width,
            height,
        })
    }

    /// Base wind deflected around the obstacles in `mask`
    ///
    /// The streamwise axis is whichever base component is larger in magnitude
    /// (x on ties). Solid cells get zero wind.
    #[must_use]
    pub fn with_obstacles(base: Vector2<f32>, mask: &ObstacleMask, rule: DeflectionRule) -> Self {
        let (width, height) = (mask.width(), mask.height());
        let mut field = Self::uniform(width, height, base);
        let speed = base.norm();

        let (axis, sign) = if base.x.abs() >= base.y.abs() {
            (Axis::X, base.x.signum())
        } else {
            (Axis::Y, base.y.signum())
        };

        for y in 0..height {
            for x in 0..width {
                let idx = y * width + x;
                if mask.is_obstacle(x, y) {
                    field.u[idx] = 0.0;
                    field.v[idx] = 0.0;
                    continue;
                }
                if speed == 0.0 {
                    continue;
                }

                let (mut along, mut across) = match axis {
                    Axis::X => (base.x, base.y),
                    Axis::Y => (base.y, base.x),
                };

                match rule {
                    DeflectionRule::None => {}
                    DeflectionRule::Lateral {
                        attenuation,
                        lateral_factor,
                    } => {
                        if let Some((dx, dy)) = offset(x, y, axis, sign, width, height) {
                            if mask.is_obstacle(dx, dy) {
                                along *= attenuation;
                                across += escape_sign(mask, dx, dy, axis) * lateral_factor * speed;
                            }
                        }
                    }
                    DeflectionRule::Venturi { acceleration } => {
                        if let Some((ux, uy)) = offset(x, y, axis, -sign, width, height) {
                            if mask.is_obstacle(ux, uy) {
                                along *= acceleration;
                            }
                        }
                    }
                }

                let (u, v) = match axis {
                    Axis::X => (along, across),
                    Axis::Y => (across, along),
                };
                field.u[idx] = u;
                field.v[idx] = v;
            }
        }
        field
    }

    /// Grid width in cells
    #[must_use]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Grid height in cells
    #[must_use]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Wind `(u, v)` at a cell
    ///
    /// # Panics
    ///
    /// Panics if coordinates are out of bounds
    #[must_use]
    pub fn at(&self, x: usize, y: usize) -> (f32, f32) {
        assert!(
            x < self.width && y < self.height,
            "Coordinates out of bounds"
        );
        let idx = y * self.width + x;
        (self.u[idx], self.v[idx])
    }

    /// x components, row-major
    #[must_use]
    pub fn u(&self) -> &[f32] {
        &self.u
    }

    /// y components, row-major
    #[must_use]
    pub fn v(&self) -> &[f32] {
        &self.v
    }

    /// Largest `|u|/dx + |v|/dy` over the grid, in 1/s
    ///
    /// The explicit upwind scheme needs `dt` times this to stay at or below 1.
    #[must_use]
    pub fn max_advective_rate(&self, dx: f32, dy: f32) -> f32 {
        self.u
            .iter()
            .zip(&self.v)
            .map(|(u, v)| u.abs() / dx + v.abs() / dy)
            .fold(0.0, f32::max)
    }
}

/// Neighbour one cell along `axis` in direction `sign`, if on the grid
fn offset(
    x: usize,
    y: usize,
    axis: Axis,
    sign: f32,
    width: usize,
    height: usize,
) -> Option<(usize, usize)> {
    let step = |c: usize, limit: usize| {
        if sign > 0.0 {
            (c + 1 < limit).then_some(c + 1)
        } else if sign < 0.0 {
            c.checked_sub(1)
        } else {
            None
        }
    };
    match axis {
        Axis::X => Some((step(x, width)?, y)),
        Axis::Y => Some((x, step(y, height)?)),
    }
}

/// Cross-stream direction (+1 or -1) toward the nearer free end of the wall
/// containing `(x, y)`
///
/// Walks the solid run across the stream both ways; a side that reaches the
/// grid edge without finding a free cell is never chosen over one that does.
/// Ties go positive.
fn escape_sign(mask: &ObstacleMask, x: usize, y: usize, axis: Axis) -> f32 {
    let (pos, len) = match axis {
        Axis::X => (y, mask.height()),
        Axis::Y => (x, mask.width()),
    };
    let solid = |c: usize| match axis {
        Axis::X => mask.is_obstacle(x, c),
        Axis::Y => mask.is_obstacle(c, y),
    };

    let up = (pos + 1..len).find(|&c| !solid(c)).map(|c| c - pos);
    let down = (0..pos).rev().find(|&c| !solid(c)).map(|c| pos - c);

    match (up, down) {
        (Some(up_gap), Some(down_gap)) if down_gap < up_gap => -1.0,
        (None, Some(_)) => -1.0,
        _ => 1.0,
    }
}
