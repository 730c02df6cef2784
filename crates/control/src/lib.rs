//! Local planning: trajectory rollout and velocity command generation.
//!
//! [`TrajectoryPlanner`] samples the reachable velocity window, forward
//! simulates each candidate over the costmap, and scores legal trajectories
//! against BFS distance maps seeded from the pruned global plan and the
//! goal. [`LocalPlanner`] wraps it with plan pruning and the goal-approach
//! rotate/stop behaviour.

use thiserror::Error;

mod planner;
mod trajectory;

pub use planner::{LocalPlanner, LocalPlannerConfig};
pub use trajectory::{Trajectory, TrajectoryConfig, TrajectoryPlanner};

#[derive(Error, Debug)]
pub enum ControlError {
    #[error("no plan has been set")]
    EmptyPlan,
    #[error("robot pose ({x:.2}, {y:.2}) is outside the costmap")]
    OffMap { x: f64, y: f64 },
    #[error("no legal trajectory this cycle")]
    NoValidTrajectory,
}
