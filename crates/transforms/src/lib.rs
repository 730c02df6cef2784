//! Coordinate frame management for the navigation stack.
//!
//! The frame hierarchy is fixed:
//!
//! ```text
//! map <- odom <- base_link <- laser
//! ```
//!
//! `map` is the global frame the costmap and plans live in, `odom` drifts
//! continuously with wheel odometry, `base_link` is the robot body
//! (X forward, Y left), and `laser` is the range sensor mount.
//! Localisation corrects the odom link discontinuously; everything else is
//! continuous.

use nalgebra::{Isometry2, Point2, Vector2};
use std::f64::consts::PI;
use types::Pose;

/// Coordinate frame identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameId {
    /// Global/map frame (fixed, localisation-corrected)
    Map,
    /// Odometry frame (continuous, drifts over time)
    Odom,
    /// Robot body frame (X forward, Y left)
    BaseLink,
    /// Range sensor frame (fixed transform from base_link)
    Laser,
}

/// A planar rigid-body transform.
///
/// Wraps `nalgebra::Isometry2`; a value read as "child expressed in
/// parent", so applying it takes child-frame coordinates to the parent
/// frame.
#[derive(Debug, Clone, Copy)]
pub struct Transform2D {
    inner: Isometry2<f64>,
}

impl Transform2D {
    pub fn identity() -> Self {
        Self {
            inner: Isometry2::identity(),
        }
    }

    pub fn new(x: f64, y: f64, theta: f64) -> Self {
        Self {
            inner: Isometry2::new(Vector2::new(x, y), theta),
        }
    }

    /// Treat a pose as the transform placing its frame at that pose.
    pub fn from_pose(pose: &Pose) -> Self {
        Self::new(pose.x, pose.y, pose.theta)
    }

    /// The pose of the child frame's origin in the parent frame.
    pub fn to_pose(&self) -> Pose {
        let t = self.translation();
        Pose {
            x: t.x,
            y: t.y,
            theta: self.rotation(),
        }
    }

    pub fn translation(&self) -> Vector2<f64> {
        self.inner.translation.vector
    }

    /// Rotation angle in radians, in (-PI, PI].
    pub fn rotation(&self) -> f64 {
        self.inner.rotation.angle()
    }

    pub fn inverse(&self) -> Self {
        Self {
            inner: self.inner.inverse(),
        }
    }

    /// Chain two transforms: with `self` taking B to A and `other` taking
    /// C to B, the result takes C to A.
    pub fn compose(&self, other: &Transform2D) -> Transform2D {
        Transform2D {
            inner: self.inner * other.inner,
        }
    }

    /// Map child-frame coordinates into the parent frame.
    pub fn transform_point(&self, point: Vector2<f64>) -> Vector2<f64> {
        (self.inner * Point2::from(point)).coords
    }

    /// Map a child-frame pose into the parent frame. An isometry moves the
    /// position and adds its rotation to the heading.
    pub fn transform_pose(&self, pose: &Pose) -> Pose {
        let position = self.inner * Point2::new(pose.x, pose.y);
        Pose {
            x: position.x,
            y: position.y,
            theta: normalize_angle(self.rotation() + pose.theta),
        }
    }
}

impl Default for Transform2D {
    fn default() -> Self {
        Self::identity()
    }
}

/// The three live links of the frame hierarchy.
///
/// Lookups walk the chain, so any frame pair resolves without enumerating
/// the pairs by hand. The chain is closed and fully connected, which keeps
/// every lookup total.
#[derive(Debug, Clone)]
pub struct TransformTree {
    /// odom -> map correction (updated by localisation)
    odom_to_map: Transform2D,
    /// base_link -> odom (updated by odometry)
    base_to_odom: Transform2D,
    /// laser -> base_link (static, from mounting calibration)
    laser_to_base: Transform2D,
}

impl TransformTree {
    /// A tree with identity odometry/localisation links and the given
    /// sensor mount.
    pub fn new(laser_to_base: Transform2D) -> Self {
        Self {
            odom_to_map: Transform2D::identity(),
            base_to_odom: Transform2D::identity(),
            laser_to_base,
        }
    }

    /// Update base_link pose in odom frame (from wheel odometry).
    pub fn update_odom(&mut self, base_in_odom: Transform2D) {
        self.base_to_odom = base_in_odom;
    }

    /// Update odom to map correction (from localisation).
    pub fn update_map_correction(&mut self, odom_to_map: Transform2D) {
        self.odom_to_map = odom_to_map;
    }

    pub fn base_in_odom(&self) -> Transform2D {
        self.base_to_odom
    }

    pub fn odom_in_map(&self) -> Transform2D {
        self.odom_to_map
    }

    pub fn base_in_map(&self) -> Transform2D {
        self.to_map(FrameId::BaseLink)
    }

    pub fn laser_in_map(&self) -> Transform2D {
        self.to_map(FrameId::Laser)
    }

    /// The link from a frame to its parent, or None at the root.
    fn parent_link(&self, frame: FrameId) -> Option<(FrameId, Transform2D)> {
        match frame {
            FrameId::Map => None,
            FrameId::Odom => Some((FrameId::Map, self.odom_to_map)),
            FrameId::BaseLink => Some((FrameId::Odom, self.base_to_odom)),
            FrameId::Laser => Some((FrameId::BaseLink, self.laser_to_base)),
        }
    }

    /// Accumulate links from `frame` up to the map root.
    fn to_map(&self, frame: FrameId) -> Transform2D {
        let mut tf = Transform2D::identity();
        let mut current = frame;
        while let Some((parent, link)) = self.parent_link(current) {
            tf = link.compose(&tf);
            current = parent;
        }
        tf
    }

    /// Transform taking coordinates in `from` to coordinates in `to`.
    ///
    /// Both frames are lifted to the map root and the target side is
    /// inverted: `T_to_from = T_map_to^-1 * T_map_from`.
    pub fn lookup(&self, from: FrameId, to: FrameId) -> Transform2D {
        self.to_map(to).inverse().compose(&self.to_map(from))
    }

    /// Re-express a pose given in `from` in the `to` frame.
    pub fn transform_pose(&self, pose: &Pose, from: FrameId, to: FrameId) -> Pose {
        self.lookup(from, to).transform_pose(pose)
    }
}

impl Default for TransformTree {
    fn default() -> Self {
        Self::new(Transform2D::identity())
    }
}

/// Wrap an angle into [-PI, PI).
pub fn normalize_angle(angle: f64) -> f64 {
    (angle + PI).rem_euclid(2.0 * PI) - PI
}

/// Shortest signed rotation taking heading `from` to heading `to`.
pub fn angle_diff(from: f64, to: f64) -> f64 {
    normalize_angle(to - from)
}
