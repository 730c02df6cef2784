//! Navigation configuration (nav.toml).

use nalgebra::Point2;
use serde::Deserialize;
use tracing::warn;
use types::Limits;

use crate::NavError;

/// Top-level configuration, loaded once at startup.
///
/// Scalar keys sit at the top level of the file; velocity limits and
/// trajectory scoring have their own sections:
///
/// ```toml
/// controller_frequency = 10.0
/// footprint = "[[0.2, 0.15], [0.2, -0.15], [-0.2, -0.15], [-0.2, 0.15]]"
///
/// [limits]
/// max_vel_x = 0.5
///
/// [trajectory]
/// sim_time = 1.5
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NavConfig {
    /// Global planner implementation name
    pub global_planner_type: String,
    /// Local planner implementation name
    pub local_planner_type: String,
    /// Hz; 0 means one-shot planning per trigger
    pub planner_frequency: f64,
    /// Hz for the control loop
    pub controller_frequency: f64,
    /// Seconds of invalid commands tolerated before recovery
    pub controller_patience: f64,
    /// Hz for layered costmap updates
    pub map_update_frequency: f64,

    /// Master grid width in meters (used until a static map arrives)
    pub map_width_meters: f64,
    /// Master grid height in meters
    pub map_height_meters: f64,
    /// Meters per cell
    pub resolution: f64,
    /// World X of the grid's lower-left corner
    pub origin_x: f64,
    /// World Y of the grid's lower-left corner
    pub origin_y: f64,
    /// Default cells to NO_INFORMATION instead of FREE
    pub track_unknown_space: bool,

    /// Footprint polygon string `[[x, y], ...]`; empty selects the radius
    pub footprint: String,
    /// Circular footprint radius, used when `footprint` is empty
    pub footprint_radius: f64,
    /// Meters added outward to every footprint point
    pub footprint_padding: f64,

    /// Goal position tolerance in meters
    pub xy_goal_tolerance: f64,
    /// Goal heading tolerance in radians
    pub yaw_goal_tolerance: f64,
    /// Keep the xy tolerance latched once entered
    pub latch_xy_goal_tolerance: bool,
    /// Oscillation detection distance in meters
    pub oscillation_distance: f64,

    /// Obstacle inflation radius in meters
    pub inflation_radius: f64,
    /// Inflation cost decay rate
    pub inflation_decay: f64,
    /// Global planner weight of cell cost against distance
    pub path_cost_factor: f64,

    /// Velocity and acceleration limits
    pub limits: Limits,
    /// Trajectory rollout parameters
    pub trajectory: TrajectorySection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrajectorySection {
    pub sim_time: f64,
    pub sim_granularity: f64,
    pub vx_samples: usize,
    pub vtheta_samples: usize,
    pub path_distance_bias: f64,
    pub goal_distance_bias: f64,
    pub occdist_scale: f64,
    pub heading_lookahead: f64,
}

impl Default for TrajectorySection {
    fn default() -> Self {
        Self {
            sim_time: 1.5,
            sim_granularity: 0.05,
            vx_samples: 6,
            vtheta_samples: 20,
            path_distance_bias: 0.6,
            goal_distance_bias: 0.8,
            occdist_scale: 0.01,
            heading_lookahead: 0.325,
        }
    }
}

impl Default for NavConfig {
    fn default() -> Self {
        Self {
            global_planner_type: "grid_planner".to_string(),
            local_planner_type: "trajectory_planner".to_string(),
            planner_frequency: 0.0,
            controller_frequency: 5.0,
            controller_patience: 5.0,
            map_update_frequency: 2.0,

            map_width_meters: 10.0,
            map_height_meters: 10.0,
            resolution: 0.05,
            origin_x: 0.0,
            origin_y: 0.0,
            track_unknown_space: false,

            footprint: String::new(),
            footprint_radius: 0.15,
            footprint_padding: 0.0,

            xy_goal_tolerance: 0.1,
            yaw_goal_tolerance: 0.1,
            latch_xy_goal_tolerance: false,
            oscillation_distance: 0.5,

            inflation_radius: 0.55,
            inflation_decay: 10.0,
            path_cost_factor: 0.02,

            limits: Limits::default(),
            trajectory: TrajectorySection::default(),
        }
    }
}

impl NavConfig {
    /// Load configuration from a TOML file. A missing file logs a warning
    /// and falls back to defaults; an unparseable file is a startup error.
    pub fn load(path: &std::path::Path) -> Result<Self, NavError> {
        if !path.exists() {
            warn!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| NavError::Config(format!("{}: {e}", path.display())))?;
        Self::from_str(&content)
    }

    /// Parse configuration from TOML text.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, NavError> {
        toml::from_str(content).map_err(|e| NavError::Config(e.to_string()))
    }

    /// Resolve the padded footprint polygon from the configured string or
    /// radius.
    pub fn footprint_points(&self) -> Result<Vec<Point2<f64>>, NavError> {
        let mut points = if self.footprint.trim().is_empty() {
            costmap::footprint_from_radius(self.footprint_radius)
        } else {
            costmap::footprint_from_string(&self.footprint)?
        };
        costmap::pad_footprint(&mut points, self.footprint_padding);
        Ok(points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = NavConfig::default();
        assert_eq!(config.global_planner_type, "grid_planner");
        assert_eq!(config.planner_frequency, 0.0);
        assert!(config.controller_frequency > 0.0);
        assert!(!config.track_unknown_space);
    }

    #[test]
    fn test_parse_partial_file() {
        let config = NavConfig::from_str(
            r#"
            controller_frequency = 10.0
            track_unknown_space = true
            xy_goal_tolerance = 0.25

            [limits]
            max_vel_x = 1.2

            [trajectory]
            sim_time = 2.0
            "#,
        )
        .unwrap();

        assert_eq!(config.controller_frequency, 10.0);
        assert!(config.track_unknown_space);
        assert_eq!(config.xy_goal_tolerance, 0.25);
        assert_eq!(config.limits.max_vel_x, 1.2);
        // Unset keys keep their defaults
        assert_eq!(config.limits.acc_lim_theta, 3.2);
        assert_eq!(config.trajectory.sim_time, 2.0);
        assert_eq!(config.trajectory.vx_samples, 6);
    }

    #[test]
    fn test_parse_error_is_config_error() {
        let result = NavConfig::from_str("controller_frequency = \"fast\"");
        assert!(matches!(result, Err(NavError::Config(_))));
    }

    #[test]
    fn test_footprint_from_radius_default() {
        let config = NavConfig::default();
        let points = config.footprint_points().unwrap();
        assert_eq!(points.len(), 16);
    }

    #[test]
    fn test_footprint_string_with_padding() {
        let config = NavConfig {
            footprint: "[[0.2, 0.1], [0.2, -0.1], [-0.2, -0.1], [-0.2, 0.1]]".to_string(),
            footprint_padding: 0.05,
            ..Default::default()
        };
        let points = config.footprint_points().unwrap();
        assert_eq!(points.len(), 4);
        assert!((points[0].x - 0.25).abs() < 1e-9);
        assert!((points[0].y - 0.15).abs() < 1e-9);
    }

    #[test]
    fn test_bad_footprint_string() {
        let config = NavConfig {
            footprint: "[[0.2, 0.1], [0.2, -0.1]]".to_string(),
            ..Default::default()
        };
        assert!(config.footprint_points().is_err());
    }
}
