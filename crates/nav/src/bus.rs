//! Narrow interfaces to the external collaborators.
//!
//! The navigation core neither owns a transport nor a localisation stack;
//! it talks to them through these traits. The daemon wires in the
//! simulation implementations, tests use in-memory fakes.

use transforms::Transform2D;
use types::{GridData, Twist};

use crate::NavError;

/// Where velocity commands go (the `VEL` publication).
pub trait VelocitySink: Send + Sync {
    fn publish(&self, twist: Twist);
}

/// Robot state as reported by odometry and localisation.
pub trait PoseSource: Send + Sync {
    /// base_link in the odom frame (the `BASE_ODOM_TF` call)
    fn base_in_odom(&self) -> Result<Transform2D, NavError>;

    /// odom in the map frame (the `ODOM_MAP_TF` call)
    fn odom_in_map(&self) -> Result<Transform2D, NavError>;

    /// Current base velocity, for the trajectory rollout seed
    fn velocity(&self) -> Result<Twist, NavError>;
}

/// Provider of the initial static map (the `MAP` call).
pub trait MapService: Send + Sync {
    fn fetch_map(&self) -> Result<GridData, NavError>;
}
