//! Obstacle layer fed by range-sensor observations.

use std::sync::{Arc, Mutex};

use nalgebra::Point2;
use tracing::debug;
use types::Pose;

use super::{in_window, Bounds, Layer};
use crate::costs;
use crate::footprint::line_cells;
use crate::grid::CostGrid;

/// One batch of sensed obstacle points, already in the map frame.
#[derive(Debug, Clone)]
pub struct Observation {
    /// Sensor origin in the map frame
    pub origin: Point2<f64>,
    /// Obstacle endpoints in the map frame
    pub points: Vec<Point2<f64>>,
    /// Points beyond this range from the origin are not marked lethal
    pub obstacle_range: f64,
    /// Free space is cleared along rays out to this range
    pub raytrace_range: f64,
}

/// Shared queue of observations between the sensor side and the updater
/// thread. Sensor callbacks push; the layer drains once per update cycle.
#[derive(Debug, Clone, Default)]
pub struct ObservationBuffer {
    inner: Arc<Mutex<Vec<Observation>>>,
}

impl ObservationBuffer {
    pub fn push(&self, observation: Observation) {
        self.inner.lock().unwrap().push(observation);
    }

    fn drain(&self) -> Vec<Observation> {
        std::mem::take(&mut *self.inner.lock().unwrap())
    }
}

/// Marks LETHAL cells at observed points and clears FREE cells along the
/// rays from the sensor origin to each point.
pub struct ObstacleLayer {
    buffer: ObservationBuffer,
    pending: Vec<Observation>,
}

impl ObstacleLayer {
    pub fn new() -> Self {
        Self {
            buffer: ObservationBuffer::default(),
            pending: Vec::new(),
        }
    }

    /// Handle for sensor callbacks to feed this layer.
    pub fn buffer(&self) -> ObservationBuffer {
        self.buffer.clone()
    }

    fn clear_ray(
        master: &mut CostGrid,
        origin: Point2<f64>,
        point: Point2<f64>,
        raytrace_range: f64,
        window: (usize, usize, usize, usize),
    ) {
        let (x0, y0, xn, yn) = window;

        // Shorten the ray to the raytrace range
        let dx = point.x - origin.x;
        let dy = point.y - origin.y;
        let dist = dx.hypot(dy);
        let end = if dist > raytrace_range && dist > 0.0 {
            let scale = raytrace_range / dist;
            Point2::new(origin.x + dx * scale, origin.y + dy * scale)
        } else {
            point
        };

        let Some((ox, oy)) = master.world_to_map(origin.x, origin.y) else {
            return;
        };
        let (ex, ey) = master.world_to_map_signed(end.x, end.y);

        let cells = line_cells(ox as i64, oy as i64, ex, ey);
        // The endpoint itself is the obstacle; clear only the cells before it
        for &(cx, cy) in &cells[..cells.len().saturating_sub(1)] {
            if cx < 0 || cy < 0 {
                continue;
            }
            let (mx, my) = (cx as usize, cy as usize);
            if mx < master.size_x()
                && my < master.size_y()
                && in_window(mx, my, x0, y0, xn, yn)
            {
                master.set_cost(mx, my, costs::FREE);
            }
        }
    }
}

impl Default for ObstacleLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl Layer for ObstacleLayer {
    fn name(&self) -> &str {
        "obstacles"
    }

    fn update_bounds(&mut self, _robot_pose: &Pose, bounds: &mut Bounds) {
        let fresh = self.buffer.drain();
        for obs in &fresh {
            bounds.touch(obs.origin.x, obs.origin.y);
            for p in &obs.points {
                let range = (p.x - obs.origin.x).hypot(p.y - obs.origin.y);
                if range <= obs.obstacle_range.max(obs.raytrace_range) {
                    bounds.touch(p.x, p.y);
                }
            }
        }
        if !fresh.is_empty() {
            debug!(observations = fresh.len(), "Obstacle layer bounds");
        }
        self.pending.extend(fresh);
    }

    fn update_costs(&mut self, master: &mut CostGrid, x0: usize, y0: usize, xn: usize, yn: usize) {
        for obs in self.pending.drain(..) {
            // Clear free space first so marking wins where rays overlap
            for p in &obs.points {
                Self::clear_ray(master, obs.origin, *p, obs.raytrace_range, (x0, y0, xn, yn));
            }
            for p in &obs.points {
                let range = (p.x - obs.origin.x).hypot(p.y - obs.origin.y);
                if range > obs.obstacle_range {
                    continue;
                }
                if let Some((mx, my)) = master.world_to_map(p.x, p.y) {
                    if in_window(mx, my, x0, y0, xn, yn) {
                        master.set_cost(mx, my, costs::LETHAL);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn observation(points: Vec<Point2<f64>>) -> Observation {
        Observation {
            origin: Point2::new(0.05, 0.05),
            points,
            obstacle_range: 5.0,
            raytrace_range: 5.0,
        }
    }

    fn update(layer: &mut ObstacleLayer, master: &mut CostGrid) {
        let pose = Pose::default();
        let mut bounds = Bounds::empty();
        layer.update_bounds(&pose, &mut bounds);
        assert!(!bounds.is_empty());
        let (x0, y0) = master.world_to_map_clamped(bounds.min_x, bounds.min_y);
        let (x1, y1) = master.world_to_map_clamped(bounds.max_x, bounds.max_y);
        layer.update_costs(master, x0, y0, x1 + 1, y1 + 1);
    }

    #[test]
    fn test_marks_endpoint_and_clears_ray() {
        let mut master = CostGrid::new(10, 10, 0.1, 0.0, 0.0, costs::NO_INFORMATION);
        let mut layer = ObstacleLayer::new();

        layer.buffer().push(observation(vec![Point2::new(0.85, 0.05)]));
        update(&mut layer, &mut master);

        assert_eq!(master.cost(8, 0), costs::LETHAL);
        for mx in 0..8 {
            assert_eq!(master.cost(mx, 0), costs::FREE, "ray cell {mx}");
        }
        // Off-ray cells untouched
        assert_eq!(master.cost(5, 5), costs::NO_INFORMATION);
    }

    #[test]
    fn test_point_beyond_obstacle_range_not_marked() {
        let mut master = CostGrid::new(10, 10, 0.1, 0.0, 0.0, costs::NO_INFORMATION);
        let mut layer = ObstacleLayer::new();

        let mut obs = observation(vec![Point2::new(0.85, 0.05)]);
        obs.obstacle_range = 0.5;
        layer.buffer().push(obs);
        update(&mut layer, &mut master);

        assert_ne!(master.cost(8, 0), costs::LETHAL);
    }

    #[test]
    fn test_raytrace_range_limits_clearing() {
        let mut master = CostGrid::new(10, 10, 0.1, 0.0, 0.0, costs::NO_INFORMATION);
        let mut layer = ObstacleLayer::new();

        let mut obs = observation(vec![Point2::new(0.85, 0.05)]);
        obs.raytrace_range = 0.3;
        layer.buffer().push(obs);
        update(&mut layer, &mut master);

        // Clearing stops near 0.3m out; far cells keep their prior value
        assert_eq!(master.cost(1, 0), costs::FREE);
        assert_eq!(master.cost(6, 0), costs::NO_INFORMATION);
        // Endpoint is still marked (within obstacle range)
        assert_eq!(master.cost(8, 0), costs::LETHAL);
    }

    #[test]
    fn test_buffer_drained_once() {
        let mut master = CostGrid::new(10, 10, 0.1, 0.0, 0.0, costs::NO_INFORMATION);
        let mut layer = ObstacleLayer::new();

        layer.buffer().push(observation(vec![Point2::new(0.85, 0.05)]));
        update(&mut layer, &mut master);

        // Nothing pending: a second cycle declares no bounds
        let mut bounds = Bounds::empty();
        layer.update_bounds(&Pose::default(), &mut bounds);
        assert!(bounds.is_empty());
    }
}
