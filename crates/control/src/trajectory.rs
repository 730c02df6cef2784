//! Trajectory rollout and scoring.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use costmap::{costs, footprint_cells, CostGrid};
use nalgebra::Point2;
use tracing::{debug, trace};
use types::{Limits, Pose, Twist};

use crate::ControlError;

/// Parameters for trajectory generation and scoring.
#[derive(Debug, Clone)]
pub struct TrajectoryConfig {
    pub limits: Limits,
    /// Forward-simulation horizon in seconds
    pub sim_time: f64,
    /// Simulation step in seconds
    pub sim_granularity: f64,
    /// Control period used for the reachable velocity window, seconds
    pub sim_period: f64,
    /// Linear velocity samples across the window
    pub vx_samples: usize,
    /// Angular velocity samples across the window
    pub vtheta_samples: usize,
    /// Weight on distance to the pruned global plan
    pub path_distance_bias: f64,
    /// Weight on distance to the goal
    pub goal_distance_bias: f64,
    /// Weight on the worst obstacle cost along the trajectory
    pub occdist_scale: f64,
    /// Distance ahead on the plan used to pick the rotation sample heading
    pub heading_lookahead: f64,
    /// Whether trajectories may cross NO_INFORMATION cells
    pub allow_unknown: bool,
}

impl Default for TrajectoryConfig {
    fn default() -> Self {
        Self {
            limits: Limits::default(),
            sim_time: 1.5,
            sim_granularity: 0.05,
            sim_period: 0.2,
            vx_samples: 6,
            vtheta_samples: 20,
            path_distance_bias: 0.6,
            goal_distance_bias: 0.8,
            occdist_scale: 0.01,
            heading_lookahead: 0.325,
            allow_unknown: false,
        }
    }
}

/// One simulated candidate and its score.
#[derive(Debug, Clone)]
pub struct Trajectory {
    /// First-step linear velocity
    pub vx: f64,
    /// First-step angular velocity
    pub vtheta: f64,
    /// Combined score, lower is better
    pub cost: f64,
    /// Simulated poses at each step
    pub points: Vec<Pose>,
}

/// Cell distance field over a window of the grid, Dijkstra-propagated from
/// a seed set. Distances are in cells.
struct DistanceMap {
    size_x: usize,
    dist: Vec<f64>,
}

#[derive(Debug, PartialEq)]
struct QueueCell {
    dist: f64,
    index: usize,
}

impl Eq for QueueCell {}

impl Ord for QueueCell {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .dist
            .total_cmp(&self.dist)
            .then(other.index.cmp(&self.index))
    }
}

impl PartialOrd for QueueCell {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl DistanceMap {
    /// Propagate from `seeds` inside the half-open window.
    ///
    /// With `walls_block`, cells at or above the inscribed threshold stop
    /// propagation entirely; otherwise they are crossed with their cost
    /// added as a penalty.
    fn compute(
        grid: &CostGrid,
        window: (usize, usize, usize, usize),
        seeds: &[(usize, usize)],
        walls_block: bool,
    ) -> Self {
        let size_x = grid.size_x();
        let size_y = grid.size_y();
        let (x0, y0, xn, yn) = window;
        let mut dist = vec![f64::INFINITY; size_x * size_y];
        let mut heap = BinaryHeap::new();

        for &(mx, my) in seeds {
            if mx >= x0 && mx < xn && my >= y0 && my < yn {
                let idx = my * size_x + mx;
                dist[idx] = 0.0;
                heap.push(QueueCell { dist: 0.0, index: idx });
            }
        }

        while let Some(QueueCell { dist: d, index }) = heap.pop() {
            if d > dist[index] {
                continue;
            }
            let mx = index % size_x;
            let my = index / size_x;

            let neighbours = [
                (mx.wrapping_sub(1), my),
                (mx + 1, my),
                (mx, my.wrapping_sub(1)),
                (mx, my + 1),
            ];
            for (nx, ny) in neighbours {
                if nx < x0 || nx >= xn.min(size_x) || ny < y0 || ny >= yn.min(size_y) {
                    continue;
                }
                let cell_cost = grid.cost(nx, ny);
                let step = if cell_cost >= costs::INSCRIBED {
                    if walls_block {
                        continue;
                    }
                    1.0 + cell_cost as f64 / 50.0
                } else {
                    1.0
                };
                let nidx = ny * size_x + nx;
                let nd = d + step;
                if nd < dist[nidx] {
                    dist[nidx] = nd;
                    heap.push(QueueCell { dist: nd, index: nidx });
                }
            }
        }

        Self { size_x, dist }
    }

    fn get(&self, mx: usize, my: usize) -> f64 {
        self.dist[my * self.size_x + mx]
    }
}

/// Samples and scores velocity candidates for one control cycle.
#[derive(Debug, Clone)]
pub struct TrajectoryPlanner {
    config: TrajectoryConfig,
    footprint: Vec<Point2<f64>>,
}

impl TrajectoryPlanner {
    pub fn new(config: TrajectoryConfig, footprint: Vec<Point2<f64>>) -> Self {
        Self { config, footprint }
    }

    pub fn config(&self) -> &TrajectoryConfig {
        &self.config
    }

    pub fn set_footprint(&mut self, footprint: Vec<Point2<f64>>) {
        self.footprint = footprint;
    }

    pub fn footprint(&self) -> &[Point2<f64>] {
        &self.footprint
    }

    /// Reachable velocity window around the current velocity.
    fn velocity_window(&self, vel: &Twist) -> (f64, f64, f64, f64) {
        let l = &self.config.limits;
        let t = self.config.sim_period;
        let min_x = (vel.linear - l.acc_lim_x * t).max(l.min_vel_x);
        let max_x = (vel.linear + l.acc_lim_x * t).min(l.max_vel_x);
        let min_th = (vel.angular - l.acc_lim_theta * t).max(l.min_vel_theta);
        let max_th = (vel.angular + l.acc_lim_theta * t).min(l.max_vel_theta);
        // A velocity outside the limits can invert the window transiently
        (min_x.min(max_x), max_x, min_th.min(max_th), max_th)
    }

    /// Candidate first-step velocities for this cycle.
    fn sample_velocities(&self, vel: &Twist, rotation_direction: f64) -> Vec<(f64, f64)> {
        let (min_x, max_x, min_th, max_th) = self.velocity_window(vel);
        let nx = self.config.vx_samples.max(1);
        let nth = self.config.vtheta_samples.max(1);

        let dx = if nx > 1 { (max_x - min_x) / (nx - 1) as f64 } else { 0.0 };
        let dth = if nth > 1 { (max_th - min_th) / (nth - 1) as f64 } else { 0.0 };

        let mut samples = Vec::with_capacity(nx * nth + 2);
        for i in 0..nx {
            for j in 0..nth {
                samples.push((min_x + dx * i as f64, min_th + dth * j as f64));
            }
        }
        // Always consider holding still and turning in place
        samples.push((0.0, 0.0));
        let rot = rotation_direction * self.config.limits.min_in_place_vel_theta;
        samples.push((0.0, rot.clamp(min_th, max_th)));
        samples
    }

    /// Forward-simulate one candidate; returns the trajectory with its
    /// accumulated worst footprint cost, or None when illegal.
    fn simulate(&self, grid: &CostGrid, start: &Pose, vx: f64, vtheta: f64) -> Option<(Vec<Pose>, f64)> {
        let steps = (self.config.sim_time / self.config.sim_granularity).ceil().max(1.0) as usize;
        let dt = self.config.sim_time / steps as f64;

        let mut pose = *start;
        let mut points = Vec::with_capacity(steps);
        let mut max_cost = 0.0f64;

        for _ in 0..steps {
            pose.x += vx * pose.theta.cos() * dt;
            pose.y += vx * pose.theta.sin() * dt;
            pose.theta = transforms::normalize_angle(pose.theta + vtheta * dt);

            let cells = footprint_cells(pose.x, pose.y, pose.theta, &self.footprint, grid, false)?;
            for (mx, my) in cells {
                let cost = grid.cost(mx, my);
                if cost == costs::LETHAL
                    || (cost == costs::NO_INFORMATION && !self.config.allow_unknown)
                {
                    return None;
                }
                max_cost = max_cost.max(cost as f64);
            }
            points.push(pose);
        }

        Some((points, max_cost))
    }

    /// Find the minimum-score legal trajectory for this cycle.
    ///
    /// `plan` is the pruned global plan in the map frame; the distance maps
    /// are recomputed over its cell window each call.
    pub fn find_best_trajectory(
        &self,
        grid: &CostGrid,
        pose: &Pose,
        vel: &Twist,
        goal: &Pose,
        plan: &[Pose],
    ) -> Result<Trajectory, ControlError> {
        if plan.is_empty() {
            return Err(ControlError::EmptyPlan);
        }
        grid.world_to_map(pose.x, pose.y)
            .ok_or(ControlError::OffMap { x: pose.x, y: pose.y })?;

        // Window: plan, robot and goal cells, padded by the rollout reach
        let cells: Vec<(usize, usize)> = plan
            .iter()
            .filter_map(|p| grid.world_to_map(p.x, p.y))
            .collect();
        if cells.is_empty() {
            return Err(ControlError::NoValidTrajectory);
        }
        let goal_cell = grid.world_to_map(goal.x, goal.y);
        let robot_cell = grid.world_to_map(pose.x, pose.y);

        let margin = grid.cell_distance(
            self.config.sim_time * self.config.limits.max_vel_x + 1.0,
        );
        let mut min_x = usize::MAX;
        let mut min_y = usize::MAX;
        let mut max_x = 0usize;
        let mut max_y = 0usize;
        for &(mx, my) in cells.iter().chain(goal_cell.iter()).chain(robot_cell.iter()) {
            min_x = min_x.min(mx);
            min_y = min_y.min(my);
            max_x = max_x.max(mx);
            max_y = max_y.max(my);
        }
        let window = (
            min_x.saturating_sub(margin),
            min_y.saturating_sub(margin),
            (max_x + margin + 1).min(grid.size_x()),
            (max_y + margin + 1).min(grid.size_y()),
        );

        let path_map = DistanceMap::compute(grid, window, &cells, true);
        let goal_seeds: Vec<(usize, usize)> = goal_cell.into_iter().collect();
        let goal_map = DistanceMap::compute(grid, window, &goal_seeds, false);

        // Rotation sample turns toward the plan heading a lookahead ahead
        let heading_target = lookahead_pose(plan, pose, self.config.heading_lookahead);
        let bearing = (heading_target.y - pose.y).atan2(heading_target.x - pose.x);
        let rotation_direction = transforms::angle_diff(pose.theta, bearing).signum();

        let mut best: Option<Trajectory> = None;
        let mut evaluated = 0usize;

        for (vx, vtheta) in self.sample_velocities(vel, rotation_direction) {
            let Some((points, occ_cost)) = self.simulate(grid, pose, vx, vtheta) else {
                continue;
            };
            evaluated += 1;

            let end = points.last().copied().unwrap_or(*pose);
            let Some((ex, ey)) = grid.world_to_map(end.x, end.y) else {
                continue;
            };
            let pdist = path_map.get(ex, ey);
            let gdist = goal_map.get(ex, ey);
            if !pdist.is_finite() || !gdist.is_finite() {
                continue;
            }

            let score = self.config.path_distance_bias * pdist
                + self.config.goal_distance_bias * gdist
                + self.config.occdist_scale * occ_cost;
            trace!(vx, vtheta, score, "Trajectory scored");

            let candidate = Trajectory {
                vx,
                vtheta,
                cost: score,
                points,
            };
            best = Some(match best.take() {
                None => candidate,
                Some(current) => pick_better(current, candidate),
            });
        }

        debug!(evaluated, "Trajectory candidates evaluated");
        best.ok_or(ControlError::NoValidTrajectory)
    }
}

/// Prefer lower score; on ties prefer lower |vtheta|, then larger vx.
fn pick_better(a: Trajectory, b: Trajectory) -> Trajectory {
    const EPS: f64 = 1e-9;
    if b.cost < a.cost - EPS {
        return b;
    }
    if b.cost > a.cost + EPS {
        return a;
    }
    if b.vtheta.abs() < a.vtheta.abs() - EPS {
        return b;
    }
    if b.vtheta.abs() > a.vtheta.abs() + EPS {
        return a;
    }
    if b.vx > a.vx {
        b
    } else {
        a
    }
}

/// Plan pose roughly `lookahead` meters ahead of the robot.
fn lookahead_pose(plan: &[Pose], robot: &Pose, lookahead: f64) -> Pose {
    let mut nearest = 0;
    let mut nearest_dist = f64::INFINITY;
    for (i, p) in plan.iter().enumerate() {
        let d = p.distance(robot);
        if d < nearest_dist {
            nearest_dist = d;
            nearest = i;
        }
    }
    let mut travelled = 0.0;
    for i in nearest..plan.len() - 1 {
        travelled += plan[i].distance(&plan[i + 1]);
        if travelled >= lookahead {
            return plan[i + 1];
        }
    }
    *plan.last().unwrap_or(robot)
}
