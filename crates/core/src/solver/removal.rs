//! Linear removal rate
//!
//! All removal processes are first order in concentration and add up to a
//! single rate `σ` (1/s):
//!
//! ```text
//! σ = chemical_decay + dry_deposition + solubility × washout_scale × rain_rate^washout_exponent
//! ```
//!
//! The washout power law is an empirical fit; scale and exponent are tuning
//! constants, not derived physics.

use crate::error::{non_negative, ConfigError};
use serde::{Deserialize, Serialize};

/// Default washout coefficient (1/s per (mm/h)^exponent)
pub const DEFAULT_WASHOUT_SCALE: f32 = 1.0e-4;

/// Default washout exponent
pub const DEFAULT_WASHOUT_EXPONENT: f32 = 0.8;

/// Sources of first-order removal
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemovalModel {
    /// Chemical decay rate (1/s)
    pub chemical_decay: f32,
    /// Dry deposition rate (1/s)
    pub dry_deposition: f32,
    /// Rain intensity (mm/h)
    pub rain_rate: f32,
    /// Washout coefficient
    pub washout_scale: f32,
    /// Washout exponent on rain intensity
    pub washout_exponent: f32,
    /// Fraction of the species taken up by rain drops (0-1)
    pub solubility: f32,
}

impl Default for RemovalModel {
    fn default() -> Self {
        Self {
            chemical_decay: 0.0,
            dry_deposition: 0.0,
            rain_rate: 0.0,
            washout_scale: DEFAULT_WASHOUT_SCALE,
            washout_exponent: DEFAULT_WASHOUT_EXPONENT,
            solubility: 1.0,
        }
    }
}

impl RemovalModel {
    /// A single constant removal rate, no rain
    #[must_use]
    pub fn constant(rate: f32) -> Self {
        Self {
            chemical_decay: rate,
            ..Self::default()
        }
    }

    /// Rain washout contribution (1/s)
    #[must_use]
    pub fn washout_rate(&self) -> f32 {
        if self.rain_rate <= 0.0 {
            return 0.0;
        }
        self.solubility * self.washout_scale * self.rain_rate.powf(self.washout_exponent)
    }

    /// Combined removal rate `σ` (1/s)
    #[must_use]
    pub fn total_rate(&self) -> f32 {
        self.chemical_decay + self.dry_deposition + self.washout_rate()
    }

    /// Check every input and return `σ`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidParameter`] for negative or non-finite
    /// inputs, or a solubility above 1.
    pub fn validate(&self) -> Result<f32, ConfigError> {
        non_negative("removal.chemical_decay", self.chemical_decay)?;
        non_negative("removal.dry_deposition", self.dry_deposition)?;
        non_negative("removal.rain_rate", self.rain_rate)?;
        non_negative("removal.washout_scale", self.washout_scale)?;
        non_negative("removal.washout_exponent", self.washout_exponent)?;
        let solubility = non_negative("removal.solubility", self.solubility)?;
        if solubility > 1.0 {
            return Err(ConfigError::InvalidParameter {
                name: "removal.solubility",
                value: solubility,
            });
        }
        non_negative("removal rate", self.total_rate())
    }
}
