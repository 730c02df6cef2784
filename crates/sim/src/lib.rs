//! Kinematic simulation for the navigation stack.
//!
//! Provides a differential-drive robot model, a rectangle-obstacle world,
//! a synthetic range sensor, and a [`SimBus`] that implements the nav
//! collaborator traits so the whole stack can run without hardware.

mod bus;
mod physics;
mod sensor;
mod world;

pub use bus::SimBus;
pub use physics::{CollisionResult, Robot};
pub use sensor::RangeSensor;
pub use world::{Rect, World};
