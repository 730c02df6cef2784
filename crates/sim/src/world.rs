//! Rectangle-obstacle world.

use types::GridData;

/// Axis-aligned obstacle.
#[derive(Debug, Clone, Copy)]
pub struct Rect {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Rect {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    /// Whether a circle intersects this rectangle.
    pub fn intersects_circle(&self, cx: f64, cy: f64, radius: f64) -> bool {
        let nearest_x = cx.clamp(self.min_x, self.max_x);
        let nearest_y = cy.clamp(self.min_y, self.max_y);
        (cx - nearest_x).hypot(cy - nearest_y) <= radius
    }
}

/// Bounded 2D world populated with rectangular obstacles.
#[derive(Debug, Clone)]
pub struct World {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
    obstacles: Vec<Rect>,
}

impl World {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
            obstacles: Vec::new(),
        }
    }

    pub fn add_obstacle(&mut self, rect: Rect) {
        self.obstacles.push(rect);
    }

    pub fn obstacles(&self) -> &[Rect] {
        &self.obstacles
    }

    pub fn in_bounds(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    pub fn point_blocked(&self, x: f64, y: f64) -> bool {
        self.obstacles.iter().any(|r| r.contains(x, y))
    }

    pub fn circle_collides(&self, cx: f64, cy: f64, radius: f64) -> bool {
        self.obstacles
            .iter()
            .any(|r| r.intersects_circle(cx, cy, radius))
    }

    /// March a ray from `(x, y)` along `angle`, returning the range to the
    /// first obstacle or world edge within `max_range`.
    pub fn raycast(&self, x: f64, y: f64, angle: f64, max_range: f64, step: f64) -> Option<f64> {
        let (dx, dy) = (angle.cos(), angle.sin());
        let mut range = step;
        while range <= max_range {
            let (px, py) = (x + dx * range, y + dy * range);
            if !self.in_bounds(px, py) || self.point_blocked(px, py) {
                return Some(range);
            }
            range += step;
        }
        None
    }

    /// Rasterise the world into a static occupancy map.
    pub fn to_grid(&self, resolution: f64) -> GridData {
        let width = ((self.max_x - self.min_x) / resolution).ceil() as usize;
        let height = ((self.max_y - self.min_y) / resolution).ceil() as usize;
        let mut map = GridData::empty(width, height, resolution, self.min_x, self.min_y);
        for my in 0..height {
            for mx in 0..width {
                let x = self.min_x + (mx as f64 + 0.5) * resolution;
                let y = self.min_y + (my as f64 + 0.5) * resolution;
                if self.point_blocked(x, y) {
                    map.set(mx, my, 100);
                }
            }
        }
        map
    }
}
