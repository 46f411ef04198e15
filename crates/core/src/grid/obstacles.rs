//! Building footprints and the obstacle mask
//!
//! Obstacles are axis-aligned rectangles in grid cells. They are either listed
//! explicitly or drawn from a seeded generator; either way the resulting mask
//! is a union of the rectangles clipped to the grid, and the same inputs always
//! produce the same mask.

use crate::error::ConfigError;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// A rectangular building footprint in grid cells
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ObstacleRect {
    /// Left column
    pub x: usize,
    /// Bottom row
    pub y: usize,
    /// Extent in cells along x
    pub width: usize,
    /// Extent in cells along y
    pub height: usize,
    /// Building height in meters (display only)
    #[serde(default)]
    pub building_height: f32,
}

impl ObstacleRect {
    /// Create a footprint with zero display height
    #[must_use]
    pub fn new(x: usize, y: usize, width: usize, height: usize) -> Self {
        Self {
            x,
            y,
            width,
            height,
            building_height: 0.0,
        }
    }

    /// Set the display height
    #[must_use]
    pub fn with_building_height(mut self, building_height: f32) -> Self {
        self.building_height = building_height;
        self
    }

    /// Cell ranges covered by this rectangle after clipping to the grid
    fn clipped(&self, nx: usize, ny: usize) -> (std::ops::Range<usize>, std::ops::Range<usize>) {
        let x0 = self.x.min(nx);
        let y0 = self.y.min(ny);
        let x1 = self.x.saturating_add(self.width).min(nx);
        let y1 = self.y.saturating_add(self.height).min(ny);
        (x0..x1, y0..y1)
    }
}

/// How buildings are placed on the grid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObstaclePlacement {
    /// Explicit list of footprints
    Fixed(Vec<ObstacleRect>),
    /// `count` footprints drawn from a seeded generator
    Random {
        seed: u64,
        count: usize,
        /// Smallest side length in cells
        min_size: usize,
        /// Largest side length in cells
        max_size: usize,
        /// Cells kept free along every grid edge
        margin: usize,
        /// Display height range in meters
        min_height: f32,
        max_height: f32,
    },
}

impl Default for ObstaclePlacement {
    fn default() -> Self {
        ObstaclePlacement::Fixed(Vec::new())
    }
}

impl ObstaclePlacement {
    /// Expand the placement into concrete rectangles
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidObstacleBounds`] when the random bounds
    /// can't fit on an `nx × ny` grid.
    pub fn rectangles(&self, nx: usize, ny: usize) -> Result<Vec<ObstacleRect>, ConfigError> {
        match self {
            ObstaclePlacement::Fixed(rects) => Ok(rects.clone()),
            ObstaclePlacement::Random {
                seed,
                count,
                min_size,
                max_size,
                margin,
                min_height,
                max_height,
            } => {
                if *min_size == 0 || min_size > max_size {
                    return Err(ConfigError::InvalidObstacleBounds(format!(
                        "size range {min_size}..={max_size} is empty"
                    )));
                }
                let usable_x = nx.saturating_sub(margin.saturating_mul(2));
                let usable_y = ny.saturating_sub(margin.saturating_mul(2));
                if usable_x < *min_size || usable_y < *min_size {
                    return Err(ConfigError::InvalidObstacleBounds(format!(
                        "margin {margin} leaves {usable_x}x{usable_y} cells, need at least {min_size}"
                    )));
                }
                if !(min_height.is_finite() && max_height.is_finite())
                    || *min_height < 0.0
                    || min_height > max_height
                {
                    return Err(ConfigError::InvalidObstacleBounds(format!(
                        "height range {min_height}..={max_height} is invalid"
                    )));
                }

                let mut rng = ChaCha8Rng::seed_from_u64(*seed);
                let mut rects = Vec::with_capacity(*count);
                for _ in 0..*count {
                    let width = rng.random_range(*min_size..=*max_size).min(usable_x);
                    let height = rng.random_range(*min_size..=*max_size).min(usable_y);
                    let x = rng.random_range(*margin..=margin + usable_x - width);
                    let y = rng.random_range(*margin..=margin + usable_y - height);
                    let building_height = rng.random_range(*min_height..=*max_height);
                    rects.push(ObstacleRect {
                        x,
                        y,
                        width,
                        height,
                        building_height,
                    });
                }
                Ok(rects)
            }
        }
    }
}

/// Cells occupied by solid obstacles
///
/// Row-major like the concentration field. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObstacleMask {
    cells: Vec<bool>,
    width: usize,
    height: usize,
}

impl ObstacleMask {
    /// Mask with no obstacles
    #[must_use]
    pub fn empty(width: usize, height: usize) -> Self {
        Self {
            cells: vec![false; width * height],
            width,
            height,
        }
    }

    /// Union of the given rectangles, clipped to the grid
    #[must_use]
    pub fn from_rects(width: usize, height: usize, rects: &[ObstacleRect]) -> Self {
        let mut mask = Self::empty(width, height);
        for rect in rects {
            let (xs, ys) = rect.clipped(width, height);
            for y in ys {
                for x in xs.clone() {
                    mask.cells[y * width + x] = true;
                }
            }
        }
        mask
    }

    /// Build the mask for a placement, returning the rectangles used
    ///
    /// # Errors
    ///
    /// Propagates [`ObstaclePlacement::rectangles`] errors.
    pub fn from_placement(
        width: usize,
        height: usize,
        placement: &ObstaclePlacement,
    ) -> Result<(Self, Vec<ObstacleRect>), ConfigError> {
        let rects = placement.rectangles(width, height)?;
        Ok((Self::from_rects(width, height, &rects), rects))
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

    /// Raw row-major cells
    #[must_use]
    pub fn as_slice(&self) -> &[bool] {
        &self.cells
    }

    /// Mask as 0/1 bytes, for comparison and export
    #[must_use]
    pub fn as_bytes(&self) -> Vec<u8> {
        self.cells.iter().map(|&solid| u8::from(solid)).collect()
    }

    /// Whether `(x, y)` is solid; out-of-grid positions are not
    #[inline]
    #[must_use]
    pub fn is_obstacle(&self, x: usize, y: usize) -> bool {
        x < self.width && y < self.height && self.cells[y * self.width + x]
    }

    /// Number of solid cells
    #[must_use]
    pub fn obstacle_count(&self) -> usize {
        self.cells.iter().filter(|&&solid| solid).count()
    }

    fn neighbors(&self, x: usize, y: usize) -> impl Iterator<Item = (usize, usize)> {
        let (w, h) = (self.width, self.height);
        [
            (x.checked_sub(1), Some(y)),
            ((x + 1 < w).then_some(x + 1), Some(y)),
            (Some(x), y.checked_sub(1)),
            (Some(x), (y + 1 < h).then_some(y + 1)),
        ]
        .into_iter()
        .filter_map(|(nx, ny)| Some((nx?, ny?)))
    }

    /// Free cell touching at least one obstacle along a grid axis
    #[must_use]
    pub fn is_obstacle_adjacent(&self, x: usize, y: usize) -> bool {
        !self.is_obstacle(x, y)
            && self
                .neighbors(x, y)
                .any(|(nx, ny)| self.is_obstacle(nx, ny))
    }

    /// Row-major indices of every obstacle-adjacent cell
    #[must_use]
    pub fn obstacle_adjacent_indices(&self) -> Vec<usize> {
        (0..self.height)
            .flat_map(|y| (0..self.width).map(move |x| (x, y)))
            .filter(|&(x, y)| self.is_obstacle_adjacent(x, y))
            .map(|(x, y)| y * self.width + x)
            .collect()
    }

    /// Nearest free cell to `(x, y)` by 4-connected grid distance
    ///
    /// With `interior_only` the outermost ring is skipped as a target. Search
    /// order is fixed, so the answer is deterministic.
    #[must_use]
    pub fn nearest_free_cell(
        &self,
        x: usize,
        y: usize,
        interior_only: bool,
    ) -> Option<(usize, usize)> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let is_target = |cx: usize, cy: usize| {
            !self.is_obstacle(cx, cy)
                && (!interior_only
                    || (cx > 0 && cy > 0 && cx + 1 < self.width && cy + 1 < self.height))
        };

        let mut visited = vec![false; self.cells.len()];
        let mut queue = VecDeque::from([(x, y)]);
        visited[y * self.width + x] = true;
        while let Some((cx, cy)) = queue.pop_front() {
            if is_target(cx, cy) {
                return Some((cx, cy));
            }
            for (nx, ny) in self.neighbors(cx, cy) {
                let idx = ny * self.width + nx;
                if !visited[idx] {
                    visited[idx] = true;
                    queue.push_back((nx, ny));
                }
            }
        }
        None
    }
}
