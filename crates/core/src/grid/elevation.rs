//! Display elevation for the urban grid
//!
//! Heights here are decoration for 3-D views: ground elevation plus building
//! heights stamped on top. The stepper never reads them.

use super::obstacles::ObstacleRect;
use serde::{Deserialize, Serialize};

// Helper for explicit, documented usize -> f32 conversions
#[inline]
#[expect(clippy::cast_precision_loss)]
fn usize_to_f32(v: usize) -> f32 {
    v as f32
}

/// Per-cell height in meters, row-major like the concentration field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElevationMap {
    heights: Vec<f32>,
    width: usize,
    height: usize,
    min_height: f32,
    max_height: f32,
}

impl ElevationMap {
    /// Flat ground at a constant elevation
    #[must_use]
    pub fn flat(width: usize, height: usize, elevation: f32) -> Self {
        Self {
            heights: vec![elevation; width * height],
            width,
            height,
            min_height: elevation,
            max_height: elevation,
        }
    }

    /// Ground with a single Gaussian hill centred on the grid
    ///
    /// `hill_radius` is in cells.
    #[must_use]
    pub fn single_hill(
        width: usize,
        height: usize,
        base_elevation: f32,
        hill_height: f32,
        hill_radius: f32,
    ) -> Self {
        let center_x = usize_to_f32(width) / 2.0;
        let center_y = usize_to_f32(height) / 2.0;
        let radius_sq = (hill_radius * hill_radius).max(f32::EPSILON);

        let mut heights = Vec::with_capacity(width * height);
        for iy in 0..height {
            for ix in 0..width {
                let dx = usize_to_f32(ix) - center_x;
                let dy = usize_to_f32(iy) - center_y;
                let height_factor = (-(dx * dx + dy * dy) / radius_sq).exp();
                heights.push(base_elevation + hill_height * height_factor);
            }
        }

        let mut map = Self {
            heights,
            width,
            height,
            min_height: 0.0,
            max_height: 0.0,
        };
        map.refresh_range();
        map
    }

    /// Stamp building heights on top of the ground
    ///
    /// Where footprints overlap the taller building wins.
    #[must_use]
    pub fn with_buildings(mut self, rects: &[ObstacleRect]) -> Self {
        let ground = self.heights.clone();
        for rect in rects {
            let x1 = rect.x.saturating_add(rect.width).min(self.width);
            let y1 = rect.y.saturating_add(rect.height).min(self.height);
            for y in rect.y.min(self.height)..y1 {
                for x in rect.x.min(self.width)..x1 {
                    let idx = y * self.width + x;
                    let roof = ground[idx] + rect.building_height;
                    self.heights[idx] = self.heights[idx].max(roof);
                }
            }
        }
        self.refresh_range();
        self
    }

    fn refresh_range(&mut self) {
        let (min, max) = self
            .heights
            .iter()
            .fold((f32::MAX, f32::MIN), |(lo, hi), &h| (lo.min(h), hi.max(h)));
        if self.heights.is_empty() {
            self.min_height = 0.0;
            self.max_height = 0.0;
        } else {
            self.min_height = min;
            self.max_height = max;
        }
    }

    /// Height at a cell, `None` outside the grid
    #[must_use]
    pub fn height_at(&self, x: usize, y: usize) -> Option<f32> {
        (x < self.width && y < self.height).then(|| self.heights[y * self.width + x])
    }

    /// Row-major heights
    #[must_use]
    pub fn as_slice(&self) -> &[f32] {
        &self.heights
    }

    /// Lowest height on the map
    #[must_use]
    pub fn min_height(&self) -> f32 {
        self.min_height
    }

    /// Highest height on the map
    #[must_use]
    pub fn max_height(&self) -> f32 {
        self.max_height
    }
}
