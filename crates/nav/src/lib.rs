//! Navigation coordination: configuration, external collaborator traits,
//! the costmap updater node, and the planner/controller state machine.

use thiserror::Error;

mod bus;
mod config;
mod costmap_node;
mod coordinator;

pub use bus::{MapService, PoseSource, VelocitySink};
pub use config::NavConfig;
pub use costmap_node::CostmapNode;
pub use coordinator::{NavServer, NavState, RecoveryHook};

#[derive(Error, Debug)]
pub enum NavError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("static map unavailable after {attempts} attempts")]
    MapUnavailable { attempts: usize },
    #[error("transform unavailable: {0}")]
    Transform(String),
    #[error("costmap error: {0}")]
    Costmap(#[from] costmap::CostmapError),
}
