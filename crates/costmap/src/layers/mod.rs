//! Stackable costmap layers.
//!
//! A layer declares the world-space window it intends to modify
//! (`update_bounds`) and then rewrites master cells inside the cell window
//! the [`LayeredCostmap`](crate::LayeredCostmap) derives from the union of
//! all declared bounds. The layer set is closed at build time: static map,
//! obstacles, inflation — inflation always last.

use nalgebra::Point2;
use types::Pose;

use crate::grid::CostGrid;

mod inflation;
mod obstacle;
mod static_layer;

pub use inflation::InflationLayer;
pub use obstacle::{Observation, ObservationBuffer, ObstacleLayer};
pub use static_layer::StaticLayer;

/// World-space bounding box accumulated across layers each update cycle.
#[derive(Debug, Clone, Copy)]
pub struct Bounds {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Bounds {
    /// The empty box: touching any point makes it non-empty.
    pub fn empty() -> Self {
        Self {
            min_x: f64::INFINITY,
            min_y: f64::INFINITY,
            max_x: f64::NEG_INFINITY,
            max_y: f64::NEG_INFINITY,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.min_x > self.max_x || self.min_y > self.max_y
    }

    /// Grow the box to include a world point.
    pub fn touch(&mut self, x: f64, y: f64) {
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
    }

    /// Grow a non-empty box outward by `margin` meters on every side.
    pub fn expand(&mut self, margin: f64) {
        if !self.is_empty() {
            self.min_x -= margin;
            self.min_y -= margin;
            self.max_x += margin;
            self.max_y += margin;
        }
    }
}

impl Default for Bounds {
    fn default() -> Self {
        Self::empty()
    }
}

/// A named costmap modifier.
///
/// Cell windows are half-open: `[x0, xn) x [y0, yn)`.
pub trait Layer: Send {
    fn name(&self) -> &str;

    /// Declare the world-space window this layer wants to rewrite this
    /// cycle, given the robot pose.
    fn update_bounds(&mut self, robot_pose: &Pose, bounds: &mut Bounds);

    /// Rewrite master cells within the window. Layers may read the current
    /// master contents (earlier layers have already run).
    fn update_costs(&mut self, master: &mut CostGrid, x0: usize, y0: usize, xn: usize, yn: usize);

    /// Footprint geometry changed (new spec, padding, or radii).
    fn on_footprint_changed(
        &mut self,
        footprint: &[Point2<f64>],
        inscribed_radius: f64,
        circumscribed_radius: f64,
    ) {
        let _ = (footprint, inscribed_radius, circumscribed_radius);
    }

    /// Master grid geometry changed.
    fn on_resize(&mut self, master: &CostGrid) {
        let _ = master;
    }
}

#[inline]
pub(crate) fn in_window(
    mx: usize,
    my: usize,
    x0: usize,
    y0: usize,
    xn: usize,
    yn: usize,
) -> bool {
    mx >= x0 && mx < xn && my >= y0 && my < yn
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds_empty_then_touch() {
        let mut b = Bounds::empty();
        assert!(b.is_empty());
        b.touch(1.0, -2.0);
        assert!(!b.is_empty());
        b.touch(-1.0, 3.0);
        assert_eq!(b.min_x, -1.0);
        assert_eq!(b.max_x, 1.0);
        assert_eq!(b.min_y, -2.0);
        assert_eq!(b.max_y, 3.0);
    }

    #[test]
    fn test_bounds_expand() {
        let mut b = Bounds::empty();
        b.expand(0.5); // no-op on empty
        assert!(b.is_empty());

        b.touch(0.0, 0.0);
        b.expand(0.5);
        assert_eq!(b.min_x, -0.5);
        assert_eq!(b.max_y, 0.5);
    }
}
