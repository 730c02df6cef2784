//! Local planner wrapper: plan pruning and goal-approach behaviour.

use costmap::{costs, footprint_cells, CostGrid};
use tracing::{debug, info};
use transforms::{angle_diff, normalize_angle};
use types::{Pose, Twist};

use crate::trajectory::TrajectoryPlanner;
use crate::ControlError;

#[derive(Debug, Clone)]
pub struct LocalPlannerConfig {
    /// Planar distance at which the goal position counts as reached
    pub xy_goal_tolerance: f64,
    /// Heading error at which the goal orientation counts as reached
    pub yaw_goal_tolerance: f64,
    /// Once inside the xy tolerance, stay latched until a new plan arrives
    pub latch_xy_goal_tolerance: bool,
    /// Angular speed below which the base counts as stopped, rad/s
    pub rot_stopped_velocity: f64,
    /// Linear speed below which the base counts as stopped, m/s
    pub trans_stopped_velocity: f64,
    /// Extra plan length kept ahead of the rollout reach, meters
    pub prune_margin: f64,
}

impl Default for LocalPlannerConfig {
    fn default() -> Self {
        Self {
            xy_goal_tolerance: 0.1,
            yaw_goal_tolerance: 0.1,
            latch_xy_goal_tolerance: false,
            rot_stopped_velocity: 0.1,
            trans_stopped_velocity: 0.1,
            prune_margin: 1.0,
        }
    }
}

/// Follows the current global plan, handing velocity generation to the
/// trajectory planner and taking over near the goal for the final
/// rotate-and-stop.
pub struct LocalPlanner {
    config: LocalPlannerConfig,
    trajectory_planner: TrajectoryPlanner,
    plan: Vec<Pose>,
    goal: Option<Pose>,
    reached_goal: bool,
    xy_tolerance_latch: bool,
}

impl LocalPlanner {
    pub fn new(config: LocalPlannerConfig, trajectory_planner: TrajectoryPlanner) -> Self {
        Self {
            config,
            trajectory_planner,
            plan: Vec::new(),
            goal: None,
            reached_goal: false,
            xy_tolerance_latch: false,
        }
    }

    /// Install a new global plan to follow; resets goal-reached state.
    pub fn set_plan(&mut self, plan: Vec<Pose>) -> Result<(), ControlError> {
        if plan.is_empty() {
            return Err(ControlError::EmptyPlan);
        }
        self.goal = plan.last().copied();
        self.plan = plan;
        self.reached_goal = false;
        self.xy_tolerance_latch = false;
        debug!(poses = self.plan.len(), "Local planner received plan");
        Ok(())
    }

    /// Whether the last plan's goal has been reached. Stays true until the
    /// next `set_plan`.
    pub fn is_goal_reached(&self) -> bool {
        self.reached_goal
    }

    pub fn set_footprint(&mut self, footprint: Vec<nalgebra::Point2<f64>>) {
        self.trajectory_planner.set_footprint(footprint);
    }

    /// Compute the next velocity command.
    ///
    /// `grid` is the master costmap held under its lock by the caller,
    /// `pose` the robot pose in the map frame, `vel` the current base
    /// velocity.
    pub fn compute_velocity_commands(
        &mut self,
        grid: &CostGrid,
        pose: &Pose,
        vel: &Twist,
    ) -> Result<Twist, ControlError> {
        let goal = self.goal.ok_or(ControlError::EmptyPlan)?;
        if self.plan.is_empty() {
            return Err(ControlError::EmptyPlan);
        }

        self.prune_plan(pose);

        if pose.distance(&goal) <= self.config.xy_goal_tolerance || self.xy_tolerance_latch {
            if self.config.latch_xy_goal_tolerance {
                self.xy_tolerance_latch = true;
            }
            let yaw_error = angle_diff(pose.theta, goal.theta);
            if yaw_error.abs() <= self.config.yaw_goal_tolerance {
                if vel.angular.abs() < self.config.rot_stopped_velocity
                    && vel.linear.abs() < self.config.trans_stopped_velocity
                {
                    info!("Goal reached");
                    self.reached_goal = true;
                    return Ok(Twist::zero());
                }
                return Ok(self.stop_with_acc_limits(vel));
            }
            return self.rotate_to_goal(grid, pose, vel, yaw_error);
        }

        let trajectory =
            self.trajectory_planner
                .find_best_trajectory(grid, pose, vel, &goal, &self.plan)?;
        Ok(Twist::new(trajectory.vx, trajectory.vtheta))
    }

    /// Drop plan poses the robot has passed and truncate to the rollout
    /// reach plus a margin.
    fn prune_plan(&mut self, pose: &Pose) {
        let mut nearest = 0;
        let mut nearest_dist = f64::INFINITY;
        for (i, p) in self.plan.iter().enumerate() {
            let d = p.distance(pose);
            if d < nearest_dist {
                nearest_dist = d;
                nearest = i;
            }
        }
        if nearest > 0 {
            self.plan.drain(..nearest);
        }

        let cfg = self.trajectory_planner.config();
        let keep_ahead = cfg.sim_time * cfg.limits.max_vel_x + self.config.prune_margin;
        let mut travelled = 0.0;
        let mut cut = self.plan.len();
        for i in 0..self.plan.len().saturating_sub(1) {
            travelled += self.plan[i].distance(&self.plan[i + 1]);
            if travelled > keep_ahead {
                cut = i + 1;
                break;
            }
        }
        self.plan.truncate(cut);
    }

    /// In-place rotation toward the goal heading, respecting angular
    /// acceleration and the minimum in-place speed.
    fn rotate_to_goal(
        &self,
        grid: &CostGrid,
        pose: &Pose,
        vel: &Twist,
        yaw_error: f64,
    ) -> Result<Twist, ControlError> {
        let cfg = self.trajectory_planner.config();
        let limits = &cfg.limits;
        let period = cfg.sim_period;

        // Speed we can still stop from without overshooting the heading
        let stopping = (2.0 * limits.acc_lim_theta * yaw_error.abs()).sqrt();
        let desired = yaw_error.signum()
            * stopping.clamp(limits.min_in_place_vel_theta, limits.max_vel_theta);
        let vtheta = desired.clamp(
            vel.angular - limits.acc_lim_theta * period,
            vel.angular + limits.acc_lim_theta * period,
        );

        // The footprint sweeps in place; reject the command if any swept
        // pose clips an obstacle
        let steps = 4;
        let dt = period / steps as f64;
        let mut theta = pose.theta;
        for _ in 0..steps {
            theta = normalize_angle(theta + vtheta * dt);
            let cells = footprint_cells(
                pose.x,
                pose.y,
                theta,
                self.footprint(),
                grid,
                false,
            )
            .ok_or(ControlError::NoValidTrajectory)?;
            for (mx, my) in cells {
                let cost = grid.cost(mx, my);
                if cost == costs::LETHAL
                    || (cost == costs::NO_INFORMATION && !cfg.allow_unknown)
                {
                    return Err(ControlError::NoValidTrajectory);
                }
            }
        }

        Ok(Twist::new(0.0, vtheta))
    }

    /// Decelerate both axes toward zero within the acceleration limits.
    fn stop_with_acc_limits(&self, vel: &Twist) -> Twist {
        let cfg = self.trajectory_planner.config();
        let limits = &cfg.limits;
        let period = cfg.sim_period;

        let vx = vel.linear.signum()
            * (vel.linear.abs() - limits.acc_lim_x * period).max(0.0);
        let vtheta = vel.angular.signum()
            * (vel.angular.abs() - limits.acc_lim_theta * period).max(0.0);
        Twist::new(vx, vtheta)
    }

    fn footprint(&self) -> &[nalgebra::Point2<f64>] {
        self.trajectory_planner.footprint()
    }
}
