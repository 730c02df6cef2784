//! Layered costmap engine for navigation.
//!
//! Provides:
//! - A fixed-resolution 2D cost grid with world/cell mapping and PGM export
//! - Footprint geometry and polygon rasterisation
//! - Stackable layers (static map, obstacles, inflation) composed by a
//!   [`LayeredCostmap`] with bounded incremental updates
//!
//! The master grid is shared as `Arc<Mutex<CostGrid>>`; one lock hold covers
//! a full composite update, and planners take the same lock while reading.

use thiserror::Error;

mod footprint;
mod grid;
mod layered;
pub mod layers;

pub use footprint::{
    calculate_min_and_max_distances, fill_cells, footprint_cells, footprint_from_radius,
    footprint_from_string, line_cells, pad_footprint, polygon_outline_cells, transform_footprint,
};
pub use grid::{CostGrid, SharedGrid};
pub use layered::LayeredCostmap;
pub use layers::{Bounds, Layer};

#[derive(Error, Debug)]
pub enum CostmapError {
    #[error("Point out of bounds: ({x}, {y})")]
    OutOfBounds { x: f64, y: f64 },
    #[error("Invalid footprint: {0}")]
    InvalidFootprint(String),
    #[error("Map I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Cost values for costmap cells.
pub mod costs {
    /// Nothing known to be in the way.
    pub const FREE: u8 = 0;
    /// The robot footprint is guaranteed to collide if centred here.
    pub const INSCRIBED: u8 = 253;
    /// An observed obstacle occupies this cell.
    pub const LETHAL: u8 = 254;
    /// No sensor or map information for this cell.
    pub const NO_INFORMATION: u8 = 255;
}
