//! Layer composition over the shared master grid.

use std::sync::{Arc, Mutex};

use nalgebra::Point2;
use tracing::{debug, info};
use types::Pose;

use crate::footprint::calculate_min_and_max_distances;
use crate::grid::{CostGrid, SharedGrid};
use crate::layers::{Bounds, Layer};

/// Owns the master cost grid and an ordered stack of layers.
///
/// One `update_map` call is a composite cycle: collect the union of layer
/// bounds, then — under a single master lock hold — reset that window to the
/// default value and let every layer rewrite it in order.
pub struct LayeredCostmap {
    master: SharedGrid,
    layers: Vec<Box<dyn Layer>>,
    /// Cell window of the last update, half-open
    bounds: (usize, usize, usize, usize),
    initialized: bool,
    size_locked: bool,
    footprint: Vec<Point2<f64>>,
    inscribed_radius: f64,
    circumscribed_radius: f64,
}

impl LayeredCostmap {
    pub fn new(track_unknown: bool) -> Self {
        let default_value = if track_unknown {
            crate::costs::NO_INFORMATION
        } else {
            crate::costs::FREE
        };
        Self {
            master: Arc::new(Mutex::new(CostGrid::new(0, 0, 1.0, 0.0, 0.0, default_value))),
            layers: Vec::new(),
            bounds: (0, 0, 0, 0),
            initialized: false,
            size_locked: false,
            footprint: Vec::new(),
            inscribed_radius: 0.0,
            circumscribed_radius: 0.0,
        }
    }

    /// Append a layer; order is application order, inflation goes last.
    pub fn add_layer(&mut self, layer: Box<dyn Layer>) {
        info!(layer = layer.name(), "Adding costmap layer");
        self.layers.push(layer);
    }

    /// Handle to the master grid shared with planners.
    pub fn master(&self) -> SharedGrid {
        Arc::clone(&self.master)
    }

    /// Mutable access to a layer by name (for map installs, observation
    /// buffer wiring).
    pub fn layer_mut(&mut self, name: &str) -> Option<&mut Box<dyn Layer>> {
        self.layers.iter_mut().find(|l| l.name() == name)
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn is_size_locked(&self) -> bool {
        self.size_locked
    }

    pub fn is_tracking_unknown(&self) -> bool {
        self.master.lock().unwrap().default_value() == crate::costs::NO_INFORMATION
    }

    /// Cell window touched by the last `update_map`, half-open.
    pub fn updated_bounds(&self) -> (usize, usize, usize, usize) {
        self.bounds
    }

    pub fn footprint(&self) -> &[Point2<f64>] {
        &self.footprint
    }

    pub fn inscribed_radius(&self) -> f64 {
        self.inscribed_radius
    }

    pub fn circumscribed_radius(&self) -> f64 {
        self.circumscribed_radius
    }

    /// Run one composite update cycle around the given robot pose.
    pub fn update_map(&mut self, robot_x: f64, robot_y: f64, robot_yaw: f64) {
        if self.layers.is_empty() {
            return;
        }
        {
            let master = self.master.lock().unwrap();
            if master.size_x() == 0 || master.size_y() == 0 {
                return;
            }
        }

        let pose = Pose::new(robot_x, robot_y, robot_yaw);
        let mut bounds = Bounds::empty();
        for layer in &mut self.layers {
            layer.update_bounds(&pose, &mut bounds);
        }
        if bounds.is_empty() {
            self.bounds = (0, 0, 0, 0);
            return;
        }

        let mut master = self.master.lock().unwrap();
        let (x0, y0) = master.world_to_map_clamped(bounds.min_x, bounds.min_y);
        let (x1, y1) = master.world_to_map_clamped(bounds.max_x, bounds.max_y);
        let (xn, yn) = (x1 + 1, y1 + 1);

        debug!(x0, y0, xn, yn, "Costmap update window");
        master.reset_region(x0, y0, xn, yn);
        for layer in &mut self.layers {
            layer.update_costs(&mut master, x0, y0, xn, yn);
        }
        drop(master);

        self.bounds = (x0, y0, xn, yn);
        self.initialized = true;
    }

    /// Propagate new geometry to the master grid and every layer.
    /// A size-locked costmap ignores resize requests.
    pub fn resize_map(
        &mut self,
        size_x: usize,
        size_y: usize,
        resolution: f64,
        origin_x: f64,
        origin_y: f64,
        size_locked: bool,
    ) {
        if self.size_locked {
            return;
        }
        self.size_locked = size_locked;

        let mut master = self.master.lock().unwrap();
        master.resize(size_x, size_y, resolution, origin_x, origin_y);
        for layer in &mut self.layers {
            layer.on_resize(&master);
        }
    }

    /// Install a new footprint, recompute the radii, and notify layers.
    pub fn set_footprint(&mut self, footprint: Vec<Point2<f64>>) {
        let (inscribed, circumscribed) = calculate_min_and_max_distances(&footprint);
        self.footprint = footprint;
        self.inscribed_radius = inscribed;
        self.circumscribed_radius = circumscribed;
        info!(
            inscribed_radius = inscribed,
            circumscribed_radius = circumscribed,
            "Footprint updated"
        );
        for layer in &mut self.layers {
            layer.on_footprint_changed(&self.footprint, inscribed, circumscribed);
        }
    }
}
