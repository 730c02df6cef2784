//! Inflation layer: cost halo around lethal cells.

use std::collections::VecDeque;

use nalgebra::Point2;
use types::Pose;

use super::{in_window, Bounds, Layer};
use crate::costs;
use crate::grid::CostGrid;

/// Writes a monotonically decreasing cost halo around every LETHAL cell out
/// to `inflation_radius`:
///
/// `cost(d) = weight * exp(-decay * (d - inscribed_radius))`, clamped to
/// `[0, INSCRIBED - 1]`, with `cost = INSCRIBED` wherever
/// `d <= inscribed_radius`. Always the last layer in the stack.
pub struct InflationLayer {
    inflation_radius: f64,
    decay: f64,
    weight: f64,
    inscribed_radius: f64,
}

impl InflationLayer {
    pub fn new(inflation_radius: f64, decay: f64) -> Self {
        Self {
            inflation_radius,
            decay,
            weight: (costs::INSCRIBED - 1) as f64,
            inscribed_radius: 0.0,
        }
    }

    pub fn inflation_radius(&self) -> f64 {
        self.inflation_radius
    }

    /// Cost for a cell at distance `d` meters from the nearest lethal cell.
    fn cost_for_distance(&self, d: f64) -> u8 {
        if d <= self.inscribed_radius {
            costs::INSCRIBED
        } else {
            let cost = self.weight * (-self.decay * (d - self.inscribed_radius)).exp();
            cost.clamp(0.0, (costs::INSCRIBED - 1) as f64) as u8
        }
    }
}

impl Layer for InflationLayer {
    fn name(&self) -> &str {
        "inflation"
    }

    fn update_bounds(&mut self, _robot_pose: &Pose, bounds: &mut Bounds) {
        // Halos extend past whatever the earlier layers touched
        bounds.expand(self.inflation_radius);
    }

    fn update_costs(&mut self, master: &mut CostGrid, x0: usize, y0: usize, xn: usize, yn: usize) {
        if master.size_x() == 0 || master.size_y() == 0 {
            return;
        }
        let size_x = master.size_x();
        let size_y = master.size_y();
        let resolution = master.resolution();
        let cell_radius = master.cell_distance(self.inflation_radius);

        // Lethal sources just outside the window still throw halos into it
        let sx0 = x0.saturating_sub(cell_radius);
        let sy0 = y0.saturating_sub(cell_radius);
        let sxn = (xn + cell_radius).min(size_x);
        let syn = (yn + cell_radius).min(size_y);

        let mut seen = vec![false; size_x * size_y];
        let mut queue: VecDeque<(usize, usize, usize, usize)> = VecDeque::new();

        for my in sy0..syn {
            for mx in sx0..sxn {
                if master.cost(mx, my) == costs::LETHAL {
                    seen[my * size_x + mx] = true;
                    queue.push_back((mx, my, mx, my));
                }
            }
        }

        while let Some((mx, my, src_x, src_y)) = queue.pop_front() {
            let dx = mx as f64 - src_x as f64;
            let dy = my as f64 - src_y as f64;
            let dist = dx.hypot(dy) * resolution;
            if dist > self.inflation_radius {
                continue;
            }

            if in_window(mx, my, x0, y0, xn, yn) {
                let cost = self.cost_for_distance(dist);
                if cost > master.cost(mx, my) {
                    master.set_cost(mx, my, cost);
                }
            }

            let neighbours = [
                (mx.wrapping_sub(1), my),
                (mx + 1, my),
                (mx, my.wrapping_sub(1)),
                (mx, my + 1),
            ];
            for (nx, ny) in neighbours {
                if nx < size_x && ny < size_y && !seen[ny * size_x + nx] {
                    seen[ny * size_x + nx] = true;
                    queue.push_back((nx, ny, src_x, src_y));
                }
            }
        }
    }

    fn on_footprint_changed(
        &mut self,
        _footprint: &[Point2<f64>],
        inscribed_radius: f64,
        _circumscribed_radius: f64,
    ) {
        self.inscribed_radius = inscribed_radius;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inflate(master: &mut CostGrid, inscribed: f64, radius: f64) {
        let mut layer = InflationLayer::new(radius, 5.0);
        layer.on_footprint_changed(&[], inscribed, inscribed * 2.0);
        let (sx, sy) = (master.size_x(), master.size_y());
        layer.update_costs(master, 0, 0, sx, sy);
    }

    #[test]
    fn test_inscribed_band_and_decay() {
        let mut master = CostGrid::new(21, 21, 0.1, 0.0, 0.0, costs::FREE);
        master.set_cost(10, 10, costs::LETHAL);
        inflate(&mut master, 0.2, 0.8);

        // Source stays lethal
        assert_eq!(master.cost(10, 10), costs::LETHAL);
        // Within the inscribed radius: guaranteed collision
        assert_eq!(master.cost(11, 10), costs::INSCRIBED);
        assert_eq!(master.cost(12, 10), costs::INSCRIBED);
        // Beyond it: strictly decaying
        let c3 = master.cost(13, 10);
        let c5 = master.cost(15, 10);
        let c7 = master.cost(17, 10);
        assert!(c3 < costs::INSCRIBED);
        assert!(c3 > c5 && c5 > c7, "{c3} > {c5} > {c7}");
    }

    #[test]
    fn test_halo_stops_at_radius() {
        let mut master = CostGrid::new(21, 21, 0.1, 0.0, 0.0, costs::FREE);
        master.set_cost(10, 10, costs::LETHAL);
        inflate(&mut master, 0.1, 0.4);

        // 0.6m away: untouched
        assert_eq!(master.cost(16, 10), costs::FREE);
    }

    #[test]
    fn test_does_not_lower_existing_costs(){
        let mut master = CostGrid::new(21, 21, 0.1, 0.0, 0.0, costs::FREE);
        master.set_cost(10, 10, costs::LETHAL);
        master.set_cost(14, 10, 200);
        inflate(&mut master, 0.1, 0.8);

        assert!(master.cost(14, 10) >= 200);
    }

    #[test]
    fn test_source_outside_window_inflates_into_it() {
        let mut master = CostGrid::new(21, 21, 0.1, 0.0, 0.0, costs::FREE);
        master.set_cost(10, 10, costs::LETHAL);

        let mut layer = InflationLayer::new(0.5, 5.0);
        layer.on_footprint_changed(&[], 0.2, 0.4);
        // Window excludes the source column entirely
        layer.update_costs(&mut master, 11, 0, 21, 21);

        assert_eq!(master.cost(11, 10), costs::INSCRIBED);
        // Source cell itself was outside the window: unchanged
        assert_eq!(master.cost(10, 10), costs::LETHAL);
        assert_eq!(master.cost(9, 10), costs::FREE);
    }

    #[test]
    fn test_bounds_expansion() {
        let mut layer = InflationLayer::new(0.5, 5.0);
        let mut bounds = Bounds::empty();
        bounds.touch(1.0, 1.0);
        layer.update_bounds(&Pose::default(), &mut bounds);
        assert_eq!(bounds.min_x, 0.5);
        assert_eq!(bounds.max_y, 1.5);
    }
}
