//! Synthetic range sensor.

use costmap::layers::Observation;
use nalgebra::Point2;
use rand::Rng;
use types::Pose;

use crate::world::World;

/// Casts evenly spaced rays into the world and packages the hits as an
/// obstacle-layer observation.
#[derive(Debug, Clone)]
pub struct RangeSensor {
    pub num_rays: usize,
    pub max_range: f64,
    /// Range limit for marking obstacles
    pub obstacle_range: f64,
    /// Range limit for clearing free space
    pub raytrace_range: f64,
    /// Uniform range noise amplitude in meters (0 disables)
    pub noise: f64,
}

impl Default for RangeSensor {
    fn default() -> Self {
        Self {
            num_rays: 90,
            max_range: 6.0,
            obstacle_range: 5.0,
            raytrace_range: 5.5,
            noise: 0.0,
        }
    }
}

impl RangeSensor {
    /// One full sweep from the given pose.
    pub fn observe(&self, world: &World, pose: &Pose) -> Observation {
        let mut rng = rand::thread_rng();
        let mut points = Vec::new();

        for i in 0..self.num_rays {
            let angle =
                pose.theta + i as f64 * 2.0 * std::f64::consts::PI / self.num_rays as f64;
            if let Some(mut range) = world.raycast(pose.x, pose.y, angle, self.max_range, 0.01)
            {
                if self.noise > 0.0 {
                    range += rng.gen_range(-self.noise..self.noise);
                }
                points.push(Point2::new(
                    pose.x + range * angle.cos(),
                    pose.y + range * angle.sin(),
                ));
            }
        }

        Observation {
            origin: Point2::new(pose.x, pose.y),
            points,
            obstacle_range: self.obstacle_range,
            raytrace_range: self.raytrace_range,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::Rect;

    #[test]
    fn test_observation_sees_obstacle() {
        let mut world = World::new(-5.0, -5.0, 5.0, 5.0);
        world.add_obstacle(Rect::new(1.0, -0.5, 1.5, 0.5));

        let sensor = RangeSensor {
            num_rays: 360,
            ..Default::default()
        };
        let obs = sensor.observe(&world, &Pose::default());

        assert!(!obs.points.is_empty());
        // The forward ray hits the obstacle's front face near x = 1.0
        let front = obs
            .points
            .iter()
            .find(|p| p.y.abs() < 0.02 && p.x > 0.0)
            .expect("no forward hit");
        assert!((front.x - 1.0).abs() < 0.05, "front hit at {}", front.x);
    }

    #[test]
    fn test_empty_world_sees_only_walls() {
        let world = World::new(-1.0, -1.0, 1.0, 1.0);
        let sensor = RangeSensor {
            num_rays: 8,
            max_range: 10.0,
            ..Default::default()
        };
        let obs = sensor.observe(&world, &Pose::default());
        // Every ray terminates on the world edge
        assert_eq!(obs.points.len(), 8);
        for p in &obs.points {
            assert!(p.x.abs() <= 1.02 && p.y.abs() <= 1.02);
        }
    }
}
