//! Concentration field storage
//!
//! The solver keeps one `ConcentrationField` per buffer (current and back) and
//! swaps them after every step, so the stencil never reads a value written
//! during the same step.

use serde::{Deserialize, Serialize};

/// Pollutant concentration over the simulation grid
///
/// Stores values as a flat `Vec<f32>` in row-major order (`y * width + x`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConcentrationField {
    /// Concentration values in row-major order (y * width + x)
    pub data: Vec<f32>,
    /// Grid width in cells
    pub width: usize,
    /// Grid height in cells
    pub height: usize,
}

impl ConcentrationField {
    /// Create a zero-filled field
    ///
    /// # Arguments
    ///
    /// * `width` - Grid width in cells
    /// * `height` - Grid height in cells
    #[must_use]
    pub fn new(width: usize, height: usize) -> Self {
        Self::with_value(width, height, 0.0)
    }

    /// Create a field with every cell set to `value`
    #[must_use]
    pub fn with_value(width: usize, height: usize, value: f32) -> Self {
        Self {
            data: vec![value; width * height],
            width,
            height,
        }
    }

    /// Row-major index of `(x, y)`
    #[inline]
    #[must_use]
    pub fn index(&self, x: usize, y: usize) -> usize {
        y * self.width + x
    }

    /// Get reference to field data
    #[must_use]
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Get mutable reference to field data
    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Get value at grid position
    ///
    /// # Panics
    ///
    /// Panics if coordinates are out of bounds
    #[must_use]
    pub fn get(&self, x: usize, y: usize) -> f32 {
        assert!(
            x < self.width && y < self.height,
            "Coordinates out of bounds"
        );
        self.data[y * self.width + x]
    }

    /// Set value at grid position
    ///
    /// # Panics
    ///
    /// Panics if coordinates are out of bounds
    pub fn set(&mut self, x: usize, y: usize, value: f32) {
        assert!(
            x < self.width && y < self.height,
            "Coordinates out of bounds"
        );
        self.data[y * self.width + x] = value;
    }

    /// Largest concentration in the field (0 for an empty grid)
    #[must_use]
    pub fn peak(&self) -> f32 {
        self.data.iter().copied().fold(0.0, f32::max)
    }

    /// Position and value of the largest concentration
    ///
    /// Ties resolve to the first cell in row-major order.
    #[must_use]
    pub fn peak_location(&self) -> Option<(usize, usize, f32)> {
        let mut best: Option<(usize, f32)> = None;
        for (idx, &value) in self.data.iter().enumerate() {
            match best {
                Some((_, current)) if value <= current => {}
                _ => best = Some((idx, value)),
            }
        }
        best.map(|(idx, value)| (idx % self.width, idx / self.width, value))
    }

    /// Smallest concentration in the field
    #[must_use]
    pub fn minimum(&self) -> f32 {
        self.data.iter().copied().fold(f32::INFINITY, f32::min)
    }

    /// Sum of all cell values
    ///
    /// Accumulates in `f64` so long runs on large grids don't lose the
    /// small contributions at the plume edge.
    #[must_use]
    pub fn total_mass(&self) -> f64 {
        self.data.iter().map(|&v| f64::from(v)).sum()
    }

    /// Copy of the field rescaled so its maximum equals `target`
    ///
    /// Presentation only. An all-zero field is returned unchanged.
    #[must_use]
    pub fn scaled_to_peak(&self, target: f32) -> Self {
        let peak = self.peak();
        if peak <= 0.0 {
            return self.clone();
        }
        let factor = target / peak;
        Self {
            data: self.data.iter().map(|&v| v * factor).collect(),
            width: self.width,
            height: self.height,
        }
    }
}
