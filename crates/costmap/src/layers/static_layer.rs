//! Static map layer.

use nalgebra::Point2;
use tracing::info;
use types::{GridData, Pose};

use super::{in_window, Bounds, Layer};
use crate::costs;
use crate::grid::CostGrid;

/// Occupancy value at or above which a static cell is lethal.
const LETHAL_THRESHOLD: i8 = 100;

/// Copies an externally supplied occupancy grid into the master.
///
/// The full map extent is declared as bounds once per received map; within
/// any later update window the layer re-applies its values so that window
/// resets never erase static content.
pub struct StaticLayer {
    map: Option<GridData>,
    track_unknown: bool,
    bounds_pending: bool,
}

impl StaticLayer {
    pub fn new(track_unknown: bool) -> Self {
        Self {
            map: None,
            track_unknown,
            bounds_pending: false,
        }
    }

    /// Install a new static map; the next cycle re-declares the full extent.
    pub fn set_map(&mut self, map: GridData) {
        info!(
            width = map.width,
            height = map.height,
            resolution = map.resolution,
            "Static layer received map"
        );
        self.map = Some(map);
        self.bounds_pending = true;
    }

    pub fn has_map(&self) -> bool {
        self.map.is_some()
    }

    /// Translate an occupancy value (-1..100) onto the cost lattice.
    fn translate(&self, value: i8) -> u8 {
        if value < 0 {
            if self.track_unknown {
                costs::NO_INFORMATION
            } else {
                costs::FREE
            }
        } else if value >= LETHAL_THRESHOLD {
            costs::LETHAL
        } else if value == 0 {
            costs::FREE
        } else {
            // Graded occupancy scales into the inflatable band
            let scaled = value as f64 / LETHAL_THRESHOLD as f64 * (costs::INSCRIBED - 1) as f64;
            scaled as u8
        }
    }
}

impl Layer for StaticLayer {
    fn name(&self) -> &str {
        "static"
    }

    fn update_bounds(&mut self, _robot_pose: &Pose, bounds: &mut Bounds) {
        if !self.bounds_pending {
            return;
        }
        if let Some(map) = &self.map {
            bounds.touch(map.origin_x, map.origin_y);
            bounds.touch(
                map.origin_x + map.width as f64 * map.resolution,
                map.origin_y + map.height as f64 * map.resolution,
            );
            self.bounds_pending = false;
        }
    }

    fn update_costs(&mut self, master: &mut CostGrid, x0: usize, y0: usize, xn: usize, yn: usize) {
        let Some(map) = &self.map else {
            return;
        };

        // Master geometry is matched to the static map when it is installed;
        // index directly and clip to whichever extent is smaller.
        for my in y0..yn.min(master.size_y()).min(map.height) {
            for mx in x0..xn.min(master.size_x()).min(map.width) {
                if let Some(value) = map.get(mx, my) {
                    if in_window(mx, my, x0, y0, xn, yn) {
                        master.set_cost(mx, my, self.translate(value));
                    }
                }
            }
        }
    }

    fn on_footprint_changed(
        &mut self,
        _footprint: &[Point2<f64>],
        _inscribed_radius: f64,
        _circumscribed_radius: f64,
    ) {
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_map() -> GridData {
        let mut map = GridData::empty(10, 10, 0.1, 0.0, 0.0);
        map.set(4, 4, 100);
        map.set(5, 4, 100);
        map.set(2, 2, -1);
        map.set(7, 7, 50);
        map
    }

    #[test]
    fn test_declares_full_extent_once() {
        let mut layer = StaticLayer::new(true);
        layer.set_map(make_map());

        let pose = Pose::default();
        let mut bounds = Bounds::empty();
        layer.update_bounds(&pose, &mut bounds);
        assert!(!bounds.is_empty());
        assert_eq!(bounds.max_x, 1.0);

        let mut bounds2 = Bounds::empty();
        layer.update_bounds(&pose, &mut bounds2);
        assert!(bounds2.is_empty());
    }

    #[test]
    fn test_translation_tracking_unknown() {
        let mut layer = StaticLayer::new(true);
        layer.set_map(make_map());
        let mut master = CostGrid::new(10, 10, 0.1, 0.0, 0.0, costs::NO_INFORMATION);

        layer.update_costs(&mut master, 0, 0, 10, 10);
        assert_eq!(master.cost(4, 4), costs::LETHAL);
        assert_eq!(master.cost(2, 2), costs::NO_INFORMATION);
        assert_eq!(master.cost(0, 0), costs::FREE);
        // Graded value lands strictly below the inscribed band
        assert!(master.cost(7, 7) > 0 && master.cost(7, 7) < costs::INSCRIBED);
    }

    #[test]
    fn test_translation_not_tracking_unknown() {
        let mut layer = StaticLayer::new(false);
        layer.set_map(make_map());
        let mut master = CostGrid::new(10, 10, 0.1, 0.0, 0.0, costs::FREE);

        layer.update_costs(&mut master, 0, 0, 10, 10);
        assert_eq!(master.cost(2, 2), costs::FREE);
    }

    #[test]
    fn test_writes_only_inside_window() {
        let mut layer = StaticLayer::new(true);
        layer.set_map(make_map());
        let mut master = CostGrid::new(10, 10, 0.1, 0.0, 0.0, costs::NO_INFORMATION);

        layer.update_costs(&mut master, 0, 0, 4, 4);
        // (4,4) is lethal in the map but outside the half-open window
        assert_eq!(master.cost(4, 4), costs::NO_INFORMATION);
        assert_eq!(master.cost(3, 3), costs::FREE);
    }
}
