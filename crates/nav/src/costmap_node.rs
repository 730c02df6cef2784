//! Costmap node: owns the layered costmap and its updater thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use costmap::layers::{InflationLayer, ObservationBuffer, ObstacleLayer, StaticLayer};
use costmap::{CostGrid, LayeredCostmap, SharedGrid};
use nalgebra::Point2;
use tracing::{info, warn};
use types::Pose;

use crate::{MapService, NavConfig, NavError, PoseSource};

/// Attempts made against the map service before giving up.
const MAP_FETCH_ATTEMPTS: usize = 10;

/// Builds the layer stack, fetches the static map, and runs the
/// `map_update_frequency` update loop.
pub struct CostmapNode {
    layered: Arc<Mutex<LayeredCostmap>>,
    master: SharedGrid,
    pose_source: Arc<dyn PoseSource>,
    observations: ObservationBuffer,
    update_frequency: f64,
    footprint: Vec<Point2<f64>>,
    inscribed_radius: f64,
}

impl CostmapNode {
    /// Construct the stack: static, obstacles, inflation (always last).
    ///
    /// The static map is requested up to [`MAP_FETCH_ATTEMPTS`] times; a
    /// final failure is fatal to startup.
    pub fn new(
        config: &NavConfig,
        pose_source: Arc<dyn PoseSource>,
        map_service: &dyn MapService,
    ) -> Result<Self, NavError> {
        let mut static_layer = StaticLayer::new(config.track_unknown_space);
        let mut map = None;
        for attempt in 1..=MAP_FETCH_ATTEMPTS {
            match map_service.fetch_map() {
                Ok(m) => {
                    map = Some(m);
                    break;
                }
                Err(e) => {
                    warn!(attempt, error = %e, "Static map fetch failed");
                }
            }
        }
        let map = map.ok_or(NavError::MapUnavailable {
            attempts: MAP_FETCH_ATTEMPTS,
        })?;

        let (size_x, size_y) = (map.width, map.height);
        let (resolution, origin_x, origin_y) = (map.resolution, map.origin_x, map.origin_y);
        static_layer.set_map(map);

        let obstacle_layer = ObstacleLayer::new();
        let observations = obstacle_layer.buffer();

        let mut layered = LayeredCostmap::new(config.track_unknown_space);
        layered.add_layer(Box::new(static_layer));
        layered.add_layer(Box::new(obstacle_layer));
        layered.add_layer(Box::new(InflationLayer::new(
            config.inflation_radius,
            config.inflation_decay,
        )));
        layered.resize_map(size_x, size_y, resolution, origin_x, origin_y, false);

        let footprint = config.footprint_points()?;
        layered.set_footprint(footprint.clone());
        let inscribed_radius = layered.inscribed_radius();
        info!(
            size_x,
            size_y, resolution, "Costmap ready"
        );

        let master = layered.master();
        Ok(Self {
            layered: Arc::new(Mutex::new(layered)),
            master,
            pose_source,
            observations,
            update_frequency: config.map_update_frequency,
            footprint,
            inscribed_radius,
        })
    }

    /// Handle to the master grid for planners.
    pub fn master(&self) -> SharedGrid {
        Arc::clone(&self.master)
    }

    /// Queue for sensor observations feeding the obstacle layer.
    pub fn observations(&self) -> ObservationBuffer {
        self.observations.clone()
    }

    pub fn footprint(&self) -> &[Point2<f64>] {
        &self.footprint
    }

    pub fn inscribed_radius(&self) -> f64 {
        self.inscribed_radius
    }

    /// Robot pose in the map frame from the pose source.
    pub fn robot_pose(&self) -> Result<Pose, NavError> {
        let base = self.pose_source.base_in_odom()?;
        let correction = self.pose_source.odom_in_map()?;
        Ok(correction.compose(&base).to_pose())
    }

    /// Copy of the master grid taken under its lock.
    pub fn snapshot(&self) -> CostGrid {
        self.master.lock().unwrap().clone()
    }

    /// Run one composite update against the current robot pose. Skips the
    /// cycle (with a warning) when the pose is unavailable.
    pub fn update_once(&self) {
        match self.robot_pose() {
            Ok(pose) => {
                self.layered.lock().unwrap().update_map(pose.x, pose.y, pose.theta);
            }
            Err(e) => {
                warn!(error = %e, "Skipping costmap update, no robot pose");
            }
        }
    }

    /// Spawn the updater thread ticking at `map_update_frequency`.
    pub fn spawn_updater(self: &Arc<Self>, running: Arc<AtomicBool>) -> JoinHandle<()> {
        let node = Arc::clone(self);
        let period = Duration::from_secs_f64(1.0 / node.update_frequency.max(0.1));
        std::thread::Builder::new()
            .name("costmap-updater".to_string())
            .spawn(move || {
                info!("Costmap updater running");
                let mut last_tick = Instant::now();
                while running.load(Ordering::SeqCst) {
                    node.update_once();

                    let elapsed = last_tick.elapsed();
                    if elapsed < period {
                        std::thread::sleep(period - elapsed);
                    }
                    last_tick = Instant::now();
                }
                info!("Costmap updater stopped");
            })
            .expect("failed to spawn costmap updater")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use transforms::Transform2D;
    use types::{GridData, Twist};

    struct FixedPose;

    impl PoseSource for FixedPose {
        fn base_in_odom(&self) -> Result<Transform2D, NavError> {
            Ok(Transform2D::new(1.0, 1.0, 0.0))
        }
        fn odom_in_map(&self) -> Result<Transform2D, NavError> {
            Ok(Transform2D::identity())
        }
        fn velocity(&self) -> Result<Twist, NavError> {
            Ok(Twist::zero())
        }
    }

    struct FlakyMap {
        failures: std::sync::atomic::AtomicUsize,
    }

    impl MapService for FlakyMap {
        fn fetch_map(&self) -> Result<GridData, NavError> {
            let n = self.failures.fetch_sub(1, Ordering::SeqCst);
            if n > 1 {
                Err(NavError::Transform("not yet".into()))
            } else {
                Ok(GridData::empty(40, 40, 0.05, 0.0, 0.0))
            }
        }
    }

    struct DeadMap;

    impl MapService for DeadMap {
        fn fetch_map(&self) -> Result<GridData, NavError> {
            Err(NavError::Transform("down".into()))
        }
    }

    #[test]
    fn test_map_fetch_retries() {
        let node = CostmapNode::new(
            &NavConfig::default(),
            Arc::new(FixedPose),
            &FlakyMap {
                failures: std::sync::atomic::AtomicUsize::new(4),
            },
        )
        .unwrap();
        let grid = node.snapshot();
        assert_eq!(grid.size_x(), 40);
    }

    #[test]
    fn test_map_fetch_gives_up() {
        let result = CostmapNode::new(&NavConfig::default(), Arc::new(FixedPose), &DeadMap);
        assert!(matches!(result, Err(NavError::MapUnavailable { .. })));
    }

    #[test]
    fn test_robot_pose_composition() {
        let node = CostmapNode::new(
            &NavConfig::default(),
            Arc::new(FixedPose),
            &FlakyMap {
                failures: std::sync::atomic::AtomicUsize::new(1),
            },
        )
        .unwrap();
        let pose = node.robot_pose().unwrap();
        assert!((pose.x - 1.0).abs() < 1e-9);
        assert!((pose.y - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_update_once_applies_static_map() {
        let node = CostmapNode::new(
            &NavConfig::default(),
            Arc::new(FixedPose),
            &FlakyMap {
                failures: std::sync::atomic::AtomicUsize::new(1),
            },
        )
        .unwrap();
        node.update_once();
        let grid = node.snapshot();
        assert!(grid.data().iter().all(|&c| c == costmap::costs::FREE));
    }
}
