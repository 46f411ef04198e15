//! Outbound results handed to the reporting layer

use crate::error::ConfigError;
use crate::solver::ConcentrationField;
use serde::{Deserialize, Serialize};

/// Alert classification of a peak concentration
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertLevel {
    Safe,
    Attention,
    Danger,
}

impl std::fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertLevel::Safe => write!(f, "SAFE"),
            AlertLevel::Attention => write!(f, "ATTENTION"),
            AlertLevel::Danger => write!(f, "DANGER"),
        }
    }
}

/// Concentration levels separating the alert classes
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertThresholds {
    /// At or above this the peak is `Attention`
    pub attention: f32,
    /// At or above this the peak is `Danger`
    pub danger: f32,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            attention: 50.0,
            danger: 100.0,
        }
    }
}

impl AlertThresholds {
    /// Check `0 <= attention <= danger`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidAlertThresholds`] otherwise.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let ordered = self.attention.is_finite()
            && self.danger.is_finite()
            && self.attention >= 0.0
            && self.attention <= self.danger;
        if ordered {
            Ok(())
        } else {
            Err(ConfigError::InvalidAlertThresholds {
                attention: self.attention,
                danger: self.danger,
            })
        }
    }

    /// Classify a concentration
    #[must_use]
    pub fn classify(&self, concentration: f32) -> AlertLevel {
        if concentration >= self.danger {
            AlertLevel::Danger
        } else if concentration >= self.attention {
            AlertLevel::Attention
        } else {
            AlertLevel::Safe
        }
    }
}

/// One exported cell
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConcentrationRecord {
    pub x: usize,
    pub y: usize,
    pub concentration: f32,
}

/// Cells strictly above `cutoff`, in row-major order
#[must_use]
pub fn records_above(field: &ConcentrationField, cutoff: f32) -> Vec<ConcentrationRecord> {
    field
        .as_slice()
        .iter()
        .enumerate()
        .filter(|(_, &c)| c > cutoff)
        .map(|(idx, &concentration)| ConcentrationRecord {
            x: idx % field.width,
            y: idx / field.width,
            concentration,
        })
        .collect()
}

/// Largest value among the given cell indices (0 when empty)
#[must_use]
pub fn peak_over(field: &ConcentrationField, indices: &[usize]) -> f32 {
    indices
        .iter()
        .filter_map(|&idx| field.as_slice().get(idx).copied())
        .fold(0.0, f32::max)
}

/// State exposed to the observer after a sampled step
#[derive(Debug, Clone, Copy)]
pub struct Snapshot<'a> {
    /// Steps completed so far
    pub step: usize,
    /// Simulated time in seconds
    pub time: f32,
    /// Current concentration field
    pub field: &'a ConcentrationField,
    /// Global peak concentration
    pub peak: f32,
    /// Peak over free cells touching a building
    pub peak_near_obstacles: f32,
    /// Alert class of the global peak
    pub alert: AlertLevel,
    /// The clamp changed cells on this step
    pub clamped: bool,
    /// The clamp changed cells on some step so far, or the time step breaks a
    /// stability bound
    pub stability_warning: bool,
}

impl Snapshot<'_> {
    /// Export rows above a visibility cutoff
    #[must_use]
    pub fn records_above(&self, cutoff: f32) -> Vec<ConcentrationRecord> {
        records_above(self.field, cutoff)
    }
}

/// Why a run stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// All configured iterations ran
    Completed,
    /// Largest per-step change fell below the tolerance
    Converged,
    /// The observer asked to stop
    Aborted,
}

/// Totals at the end of a run
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub steps: usize,
    pub simulated_time: f32,
    pub dt: f32,
    pub termination: Termination,
    pub peak: f32,
    pub peak_near_obstacles: f32,
    pub alert: AlertLevel,
    pub total_mass: f64,
    /// Steps on which the clamp changed at least one cell
    pub clamped_steps: usize,
    pub stability_warning: bool,
}
