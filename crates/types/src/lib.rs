//! Shared types and message definitions for the navigation stack.

use serde::{Deserialize, Serialize};

/// 2D pose in a named planar frame (meters, radians).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    /// X position in meters (positive = forward at theta=0)
    pub x: f64,
    /// Y position in meters (positive = left at theta=0)
    pub y: f64,
    /// Heading in radians (positive = counter-clockwise from X axis)
    pub theta: f64,
}

impl Pose {
    pub fn new(x: f64, y: f64, theta: f64) -> Self {
        Self { x, y, theta }
    }

    /// Planar distance to another pose, ignoring heading.
    pub fn distance(&self, other: &Pose) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// Velocity command: linear (m/s) and angular (rad/s).
///
/// The platform is differential drive; there is no lateral component.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Twist {
    /// Linear velocity in m/s (positive = forward)
    pub linear: f64,
    /// Angular velocity in rad/s (positive = counter-clockwise)
    pub angular: f64,
}

impl Twist {
    pub fn new(linear: f64, angular: f64) -> Self {
        Self { linear, angular }
    }

    /// The all-stop command.
    pub fn zero() -> Self {
        Self::default()
    }
}

/// Velocity and acceleration bounds for the drive base.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Minimum linear velocity in m/s (0 forbids reversing)
    pub min_vel_x: f64,
    /// Maximum linear velocity in m/s
    pub max_vel_x: f64,
    /// Minimum angular velocity in rad/s
    pub min_vel_theta: f64,
    /// Maximum angular velocity in rad/s
    pub max_vel_theta: f64,
    /// Smallest angular speed that still turns the base in place, rad/s
    pub min_in_place_vel_theta: f64,
    /// Linear acceleration limit in m/s^2
    pub acc_lim_x: f64,
    /// Angular acceleration limit in rad/s^2
    pub acc_lim_theta: f64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            min_vel_x: 0.0,
            max_vel_x: 0.5,
            min_vel_theta: -1.0,
            max_vel_theta: 1.0,
            min_in_place_vel_theta: 0.4,
            acc_lim_x: 2.5,
            acc_lim_theta: 3.2,
        }
    }
}

/// Terminal and intermediate states of a navigation goal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GoalStatus {
    /// Goal accepted, navigation in progress
    Accepted,
    /// Robot reached the goal within tolerances
    Succeeded,
    /// Goal abandoned
    Aborted { reason: String },
}

impl GoalStatus {
    /// Whether this status ends the goal's lifecycle.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, GoalStatus::Accepted)
    }
}

/// Static occupancy map payload as delivered by the map service.
///
/// Occupancy values follow the usual convention: -1 = unknown,
/// 0 = free, 100 = occupied, intermediate values are graded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridData {
    /// Width in cells
    pub width: usize,
    /// Height in cells
    pub height: usize,
    /// Cell size in meters
    pub resolution: f64,
    /// World X of the lower-left corner of cell (0,0)
    pub origin_x: f64,
    /// World Y of the lower-left corner of cell (0,0)
    pub origin_y: f64,
    /// Row-major occupancy values, length = width * height
    pub data: Vec<i8>,
}

impl GridData {
    /// An all-free map, useful for tests and simulation bring-up.
    pub fn empty(width: usize, height: usize, resolution: f64, origin_x: f64, origin_y: f64) -> Self {
        Self {
            width,
            height,
            resolution,
            origin_x,
            origin_y,
            data: vec![0; width * height],
        }
    }

    /// Occupancy value at a cell, if in bounds.
    pub fn get(&self, mx: usize, my: usize) -> Option<i8> {
        if mx < self.width && my < self.height {
            Some(self.data[my * self.width + mx])
        } else {
            None
        }
    }

    /// Set the occupancy value at a cell. Out-of-bounds writes are ignored.
    pub fn set(&mut self, mx: usize, my: usize, value: i8) {
        if mx < self.width && my < self.height {
            self.data[my * self.width + mx] = value;
        }
    }
}
