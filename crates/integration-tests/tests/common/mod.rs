//! Shared helpers for the navigation integration tests.

use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::time::{Duration, Instant};

use costmap::layers::ObservationBuffer;
use nav::NavConfig;
use sim::SimBus;
use types::GoalStatus;

/// Test configuration: fast loops, small robot, tight map.
pub fn test_config() -> NavConfig {
    let mut config = NavConfig {
        controller_frequency: 20.0,
        map_update_frequency: 10.0,
        planner_frequency: 0.0,
        footprint_radius: 0.08,
        inflation_radius: 0.15,
        xy_goal_tolerance: 0.15,
        yaw_goal_tolerance: 0.2,
        ..Default::default()
    };
    config.limits.max_vel_x = 0.3;
    config
}

/// Tick the simulation until a terminal goal status arrives or the
/// timeout expires. Optionally feeds sensor sweeps to the obstacle layer.
pub fn drive_until_done(
    bus: &Arc<SimBus>,
    status_rx: &Receiver<GoalStatus>,
    observations: Option<&ObservationBuffer>,
    timeout: Duration,
) -> Option<GoalStatus> {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        bus.tick(0.05);
        if let Some(buffer) = observations {
            bus.sense(buffer);
        }
        while let Ok(status) = status_rx.try_recv() {
            if status.is_terminal() {
                return Some(status);
            }
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    None
}
