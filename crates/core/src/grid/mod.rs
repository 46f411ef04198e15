//! Spatial domain: obstacles, display elevation, and wind

pub mod elevation;
pub mod obstacles;
pub mod wind_field;

// Re-export main types
pub use elevation::ElevationMap;
pub use obstacles::{ObstacleMask, ObstaclePlacement, ObstacleRect};
pub use wind_field::{DeflectionRule, StabilityClass, WindField, WindSpec};
