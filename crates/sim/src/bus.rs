//! Simulation-backed implementations of the nav collaborator traits.

use std::sync::Mutex;

use costmap::layers::ObservationBuffer;
use nav::{MapService, NavError, PoseSource, VelocitySink};
use tracing::debug;
use transforms::Transform2D;
use types::{GridData, Pose, Twist};

use crate::physics::Robot;
use crate::sensor::RangeSensor;
use crate::world::World;

/// In-process stand-in for the robot's bus: velocity commands drive the
/// kinematic model, the pose source reports its ground truth through the
/// odom/map chain, and the map service rasterises the world.
pub struct SimBus {
    robot: Mutex<Robot>,
    command: Mutex<Twist>,
    world: World,
    sensor: RangeSensor,
    map_resolution: f64,
    /// Reported odom-in-map correction (identity = drift-free odometry)
    odom_in_map: Mutex<Transform2D>,
}

impl SimBus {
    pub fn new(world: World, start: Pose, map_resolution: f64) -> Self {
        Self {
            robot: Mutex::new(Robot::new(start.x, start.y, start.theta)),
            command: Mutex::new(Twist::zero()),
            world,
            sensor: RangeSensor::default(),
            map_resolution,
            odom_in_map: Mutex::new(Transform2D::identity()),
        }
    }

    pub fn with_sensor(mut self, sensor: RangeSensor) -> Self {
        self.sensor = sensor;
        self
    }

    /// Match the kinematic collision radius to the planner's footprint.
    pub fn with_robot_radius(self, radius: f64) -> Self {
        {
            let mut robot = self.robot.lock().unwrap();
            let pose = robot.pose();
            *robot = Robot::new(pose.x, pose.y, pose.theta).with_collision_radius(radius);
        }
        self
    }

    /// Inject odometry drift: the pose source keeps reporting ground truth
    /// split across the odom and map links.
    pub fn set_odom_drift(&self, odom_in_map: Transform2D) {
        *self.odom_in_map.lock().unwrap() = odom_in_map;
    }

    /// Advance the simulation by `dt` under the last published command.
    pub fn tick(&self, dt: f64) {
        let command = *self.command.lock().unwrap();
        let mut robot = self.robot.lock().unwrap();
        robot.set_velocity(command);
        let result = robot.step(dt, Some(&self.world));
        if result.is_collision() {
            debug!(?result, "Simulated robot collided");
        }
    }

    /// Ground-truth robot pose.
    pub fn pose(&self) -> Pose {
        self.robot.lock().unwrap().pose()
    }

    /// Run one sensor sweep and feed it to the obstacle layer.
    pub fn sense(&self, buffer: &ObservationBuffer) {
        let pose = self.pose();
        buffer.push(self.sensor.observe(&self.world, &pose));
    }

    pub fn world(&self) -> &World {
        &self.world
    }
}

impl VelocitySink for SimBus {
    fn publish(&self, twist: Twist) {
        *self.command.lock().unwrap() = twist;
    }
}

impl PoseSource for SimBus {
    fn base_in_odom(&self) -> Result<Transform2D, NavError> {
        // Ground truth is map-frame; report base = map_correction^-1 * truth
        let truth = Transform2D::from_pose(&self.pose());
        let correction = *self.odom_in_map.lock().unwrap();
        Ok(correction.inverse().compose(&truth))
    }

    fn odom_in_map(&self) -> Result<Transform2D, NavError> {
        Ok(*self.odom_in_map.lock().unwrap())
    }

    fn velocity(&self) -> Result<Twist, NavError> {
        Ok(self.robot.lock().unwrap().velocity())
    }
}

impl MapService for SimBus {
    fn fetch_map(&self) -> Result<GridData, NavError> {
        Ok(self.world.to_grid(self.map_resolution))
    }
}
