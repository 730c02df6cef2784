//! Navigation state machine and its planner/controller threads.
//!
//! Three long-lived threads: the planner (parked on a condition variable),
//! the controller (rate loop at `controller_frequency`), and the costmap
//! updater owned by [`CostmapNode`]. Goal arrival runs on the caller's
//! thread and is confined to a brief critical section under the plan lock.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use control::{LocalPlanner, LocalPlannerConfig, TrajectoryConfig, TrajectoryPlanner};
use planning::GridPlanner;
use tracing::{debug, error, info, warn};
use types::{GoalStatus, Pose, Twist};

use crate::{CostmapNode, NavConfig, NavError, PoseSource, VelocitySink};

/// Coordinator states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavState {
    /// Waiting for or computing a global plan
    Planning,
    /// Following the current plan
    Controlling,
    /// Running recovery after persistent control failure
    Clearing,
}

/// State shared between the goal callback and both loops, all guarded by
/// one mutex so a plan handoff and its flags are never observed torn.
struct Shared {
    state: NavState,
    goal: Option<Pose>,
    new_goal: bool,
    run_planner: bool,
    new_global_plan: bool,
    latest_plan: Vec<Pose>,
    running: bool,
}

type SharedHandle = Arc<(Mutex<Shared>, Condvar)>;

/// Optional recovery behaviour invoked in the Clearing state.
pub type RecoveryHook = Box<dyn FnMut() + Send>;

/// The navigation coordinator.
pub struct NavServer {
    config: NavConfig,
    costmap: Arc<CostmapNode>,
    pose_source: Arc<dyn PoseSource>,
    velocity_sink: Arc<dyn VelocitySink>,
    status_tx: Sender<GoalStatus>,
    shared: SharedHandle,
    running: Arc<AtomicBool>,
    threads: Vec<JoinHandle<()>>,
    recovery: Option<RecoveryHook>,
}

impl NavServer {
    pub fn new(
        config: NavConfig,
        costmap: CostmapNode,
        pose_source: Arc<dyn PoseSource>,
        velocity_sink: Arc<dyn VelocitySink>,
        status_tx: Sender<GoalStatus>,
    ) -> Self {
        let shared = Arc::new((
            Mutex::new(Shared {
                state: NavState::Planning,
                goal: None,
                new_goal: false,
                run_planner: false,
                new_global_plan: false,
                latest_plan: Vec::new(),
                running: false,
            }),
            Condvar::new(),
        ));
        Self {
            config,
            costmap: Arc::new(costmap),
            pose_source,
            velocity_sink,
            status_tx,
            shared,
            running: Arc::new(AtomicBool::new(false)),
            threads: Vec::new(),
            recovery: None,
        }
    }

    /// Install a recovery behaviour for the Clearing state. The default is
    /// inert: the transition is logged and planning resumes.
    pub fn set_recovery(&mut self, hook: RecoveryHook) {
        self.recovery = Some(hook);
    }

    pub fn state(&self) -> NavState {
        self.shared.0.lock().unwrap().state
    }

    /// The costmap node this coordinator runs.
    pub fn costmap(&self) -> Arc<CostmapNode> {
        Arc::clone(&self.costmap)
    }

    /// Spawn the costmap updater, planner, and controller threads.
    pub fn start(&mut self) {
        self.running.store(true, Ordering::SeqCst);
        {
            let mut s = self.shared.0.lock().unwrap();
            s.running = true;
            s.state = NavState::Planning;
        }

        self.threads
            .push(self.costmap.spawn_updater(Arc::clone(&self.running)));

        let global_planner = match self.config.global_planner_type.as_str() {
            "grid_planner" => GridPlanner::new(self.config.path_cost_factor),
            other => {
                warn!(name = other, "Unknown global planner type, using grid_planner");
                GridPlanner::new(self.config.path_cost_factor)
            }
        };
        if self.config.local_planner_type != "trajectory_planner" {
            warn!(
                name = %self.config.local_planner_type,
                "Unknown local planner type, using trajectory_planner"
            );
        }

        let trajectory_config = TrajectoryConfig {
            limits: self.config.limits,
            sim_time: self.config.trajectory.sim_time,
            sim_granularity: self.config.trajectory.sim_granularity,
            sim_period: 1.0 / self.config.controller_frequency.max(0.1),
            vx_samples: self.config.trajectory.vx_samples,
            vtheta_samples: self.config.trajectory.vtheta_samples,
            path_distance_bias: self.config.trajectory.path_distance_bias,
            goal_distance_bias: self.config.trajectory.goal_distance_bias,
            occdist_scale: self.config.trajectory.occdist_scale,
            heading_lookahead: self.config.trajectory.heading_lookahead,
            allow_unknown: false,
        };
        let local_config = LocalPlannerConfig {
            xy_goal_tolerance: self.config.xy_goal_tolerance,
            yaw_goal_tolerance: self.config.yaw_goal_tolerance,
            latch_xy_goal_tolerance: self.config.latch_xy_goal_tolerance,
            ..Default::default()
        };
        let local_planner = LocalPlanner::new(
            local_config,
            TrajectoryPlanner::new(trajectory_config, self.costmap.footprint().to_vec()),
        );

        let shared = Arc::clone(&self.shared);
        let costmap = Arc::clone(&self.costmap);
        let status_tx = self.status_tx.clone();
        let planner_frequency = self.config.planner_frequency;
        self.threads.push(
            std::thread::Builder::new()
                .name("nav-planner".to_string())
                .spawn(move || {
                    planner_loop(shared, costmap, global_planner, status_tx, planner_frequency)
                })
                .expect("failed to spawn planner thread"),
        );

        let params = ControllerParams {
            frequency: self.config.controller_frequency,
            patience: self.config.controller_patience,
            oscillation_distance: self.config.oscillation_distance,
        };
        let shared = Arc::clone(&self.shared);
        let costmap = Arc::clone(&self.costmap);
        let pose_source = Arc::clone(&self.pose_source);
        let velocity_sink = Arc::clone(&self.velocity_sink);
        let status_tx = self.status_tx.clone();
        let recovery = self.recovery.take();
        self.threads.push(
            std::thread::Builder::new()
                .name("nav-controller".to_string())
                .spawn(move || {
                    controller_loop(
                        shared,
                        costmap,
                        local_planner,
                        pose_source,
                        velocity_sink,
                        status_tx,
                        recovery,
                        params,
                    )
                })
                .expect("failed to spawn controller thread"),
        );

        info!("Navigation coordinator running");
    }

    /// Goal callback. Transforms the goal into the map frame, supersedes
    /// any in-flight goal, and wakes the planner. Returns whether the goal
    /// was accepted.
    pub fn send_goal(&self, goal: Pose) -> bool {
        let goal_map = match self.goal_to_map_frame(&goal) {
            Ok(g) => g,
            Err(e) => {
                error!(error = %e, "Rejecting goal, cannot transform into map frame");
                return false;
            }
        };

        {
            let (lock, cvar) = &*self.shared;
            let mut s = lock.lock().unwrap();
            info!(
                x = goal_map.x,
                y = goal_map.y,
                theta = goal_map.theta,
                "Goal accepted"
            );
            s.goal = Some(goal_map);
            s.new_goal = true;
            s.state = NavState::Planning;
            cvar.notify_one();
        }
        let _ = self.status_tx.send(GoalStatus::Accepted);
        true
    }

    /// Compose `T_map_odom * T_odom_base * goal`.
    fn goal_to_map_frame(&self, goal: &Pose) -> Result<Pose, NavError> {
        let base_in_odom = self.pose_source.base_in_odom()?;
        let odom_in_map = self.pose_source.odom_in_map()?;
        Ok(odom_in_map.compose(&base_in_odom).transform_pose(goal))
    }

    /// Stop all three threads and publish a final zero velocity.
    pub fn shutdown(&mut self) {
        info!("Navigation coordinator shutting down");
        self.running.store(false, Ordering::SeqCst);
        {
            let (lock, cvar) = &*self.shared;
            let mut s = lock.lock().unwrap();
            s.running = false;
            cvar.notify_all();
        }
        for handle in self.threads.drain(..) {
            let _ = handle.join();
        }
        self.velocity_sink.publish(Twist::zero());
    }
}

impl Drop for NavServer {
    fn drop(&mut self) {
        if !self.threads.is_empty() {
            self.shutdown();
        }
    }
}

struct ControllerParams {
    frequency: f64,
    patience: f64,
    oscillation_distance: f64,
}

fn planner_loop(
    shared: SharedHandle,
    costmap: Arc<CostmapNode>,
    planner: GridPlanner,
    status_tx: Sender<GoalStatus>,
    frequency: f64,
) {
    info!("Planner loop running");
    let period = (frequency > 0.0).then(|| Duration::from_secs_f64(1.0 / frequency));
    let (lock, cvar) = &*shared;

    loop {
        let goal = {
            let mut s = lock.lock().unwrap();
            while s.running && !s.new_goal && !s.run_planner {
                s = cvar.wait(s).unwrap();
            }
            if !s.running {
                break;
            }
            // Consume the trigger before planning so a goal arriving
            // mid-plan is seen on the next wake
            s.new_goal = false;
            s.goal
        };
        let Some(goal) = goal else {
            // Nothing to plan against; disarm until the next goal
            let mut s = lock.lock().unwrap();
            s.run_planner = false;
            continue;
        };

        let started = Instant::now();
        let plan = match costmap.robot_pose() {
            Ok(pose) => {
                let master = costmap.master();
                let grid = master.lock().unwrap();
                planner
                    .make_plan(&grid, &pose, &goal)
                    .map_err(|e| e.to_string())
            }
            Err(e) => Err(e.to_string()),
        };

        match plan {
            Ok(plan) => {
                debug!(poses = plan.len(), "Publishing global plan");
                let mut s = lock.lock().unwrap();
                s.latest_plan = plan;
                s.new_global_plan = true;
                s.state = NavState::Controlling;
                if frequency == 0.0 {
                    // One-shot per trigger
                    s.run_planner = false;
                }
            }
            Err(reason) => {
                warn!(error = %reason, "Global planning failed, aborting goal");
                {
                    let mut s = lock.lock().unwrap();
                    // A goal that arrived mid-plan stays live
                    if !s.new_goal {
                        s.goal = None;
                        s.run_planner = false;
                        s.state = NavState::Planning;
                    }
                }
                let _ = status_tx.send(GoalStatus::Aborted { reason });
                continue;
            }
        }

        if let Some(period) = period {
            let elapsed = started.elapsed();
            if elapsed < period {
                std::thread::sleep(period - elapsed);
            }
        }
    }
    info!("Planner loop stopped");
}

#[allow(clippy::too_many_arguments)]
fn controller_loop(
    shared: SharedHandle,
    costmap: Arc<CostmapNode>,
    mut local_planner: LocalPlanner,
    pose_source: Arc<dyn PoseSource>,
    velocity_sink: Arc<dyn VelocitySink>,
    status_tx: Sender<GoalStatus>,
    mut recovery: Option<RecoveryHook>,
    params: ControllerParams,
) {
    info!("Controller loop running");
    let period = Duration::from_secs_f64(1.0 / params.frequency.max(0.1));
    let (lock, cvar) = &*shared;

    let mut last_valid_control = Instant::now();
    let mut oscillation_anchor: Option<Pose> = None;
    let mut last_tick = Instant::now();

    loop {
        {
            let s = lock.lock().unwrap();
            if !s.running {
                break;
            }
        }

        // Hand any freshly published plan to the local planner
        let new_plan = {
            let mut s = lock.lock().unwrap();
            if s.new_global_plan {
                s.new_global_plan = false;
                Some(std::mem::take(&mut s.latest_plan))
            } else {
                None
            }
        };
        if let Some(plan) = new_plan {
            match local_planner.set_plan(plan) {
                Ok(()) => last_valid_control = Instant::now(),
                Err(e) => {
                    error!(error = %e, "Local planner rejected plan");
                    velocity_sink.publish(Twist::zero());
                    let mut s = lock.lock().unwrap();
                    s.state = NavState::Planning;
                    s.run_planner = false;
                }
            }
        }

        match costmap.robot_pose() {
            Ok(pose) => {
                // Oscillation anchor moves with net progress; recovery on
                // oscillation is a hook that stays inert in this core
                match oscillation_anchor {
                    Some(anchor) if pose.distance(&anchor) < params.oscillation_distance => {}
                    _ => oscillation_anchor = Some(pose),
                }

                let state = { lock.lock().unwrap().state };
                match state {
                    NavState::Planning => {
                        let mut s = lock.lock().unwrap();
                        s.run_planner = true;
                        cvar.notify_one();
                    }
                    NavState::Controlling => {
                        if local_planner.is_goal_reached() {
                            info!("Goal reached");
                            velocity_sink.publish(Twist::zero());
                            {
                                let mut s = lock.lock().unwrap();
                                s.state = NavState::Planning;
                                s.run_planner = false;
                                s.goal = None;
                            }
                            let _ = status_tx.send(GoalStatus::Succeeded);
                        } else {
                            let vel = pose_source.velocity().unwrap_or_default();
                            let cmd = {
                                let master = costmap.master();
                                let grid = master.lock().unwrap();
                                local_planner.compute_velocity_commands(&grid, &pose, &vel)
                            };
                            match cmd {
                                Ok(cmd) => {
                                    debug!(
                                        linear = cmd.linear,
                                        angular = cmd.angular,
                                        "Velocity command"
                                    );
                                    velocity_sink.publish(cmd);
                                    last_valid_control = Instant::now();
                                }
                                Err(e) => {
                                    warn!(error = %e, "No valid velocity command");
                                    velocity_sink.publish(Twist::zero());
                                    if last_valid_control.elapsed().as_secs_f64()
                                        > params.patience
                                    {
                                        warn!("Controller patience exhausted");
                                        let mut s = lock.lock().unwrap();
                                        s.state = NavState::Clearing;
                                    } else {
                                        let mut s = lock.lock().unwrap();
                                        s.state = NavState::Planning;
                                        s.run_planner = true;
                                        cvar.notify_one();
                                    }
                                }
                            }
                        }
                    }
                    NavState::Clearing => {
                        match recovery.as_mut() {
                            Some(hook) => hook(),
                            None => info!("Recovery requested, no behaviours configured"),
                        }
                        let mut s = lock.lock().unwrap();
                        s.state = NavState::Planning;
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "No robot pose this cycle");
                if last_valid_control.elapsed().as_secs_f64() > params.patience {
                    velocity_sink.publish(Twist::zero());
                    let mut s = lock.lock().unwrap();
                    if s.state == NavState::Controlling {
                        s.state = NavState::Clearing;
                    }
                }
            }
        }

        let elapsed = last_tick.elapsed();
        if elapsed < period {
            std::thread::sleep(period - elapsed);
        }
        last_tick = Instant::now();
    }
    info!("Controller loop stopped");
}
