//! Global path planning over the inflated costmap.
//!
//! A* over the cell grid, 8-connected, with step cost
//! `step_distance * (1 + cost_factor * cell_cost)`. Cells at or above the
//! inscribed threshold are impassable. The caller holds the costmap mutex
//! for the duration of a plan, so the search sees a consistent snapshot.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use costmap::{costs, CostGrid};
use thiserror::Error;
use tracing::{debug, warn};
use types::Pose;

#[derive(Error, Debug)]
pub enum PlanError {
    #[error("start pose ({x:.2}, {y:.2}) is outside the costmap")]
    StartOutOfBounds { x: f64, y: f64 },
    #[error("goal pose ({x:.2}, {y:.2}) is outside the costmap")]
    GoalOutOfBounds { x: f64, y: f64 },
    #[error("goal pose ({x:.2}, {y:.2}) is inside an obstacle")]
    GoalBlocked { x: f64, y: f64 },
    #[error("no path from start to goal")]
    NoPath,
}

/// Grid A* planner.
#[derive(Debug, Clone)]
pub struct GridPlanner {
    /// Weight of cell cost relative to travelled distance
    cost_factor: f64,
}

impl Default for GridPlanner {
    fn default() -> Self {
        Self::new(0.02)
    }
}

/// Open-list entry; ordering makes `BinaryHeap` a min-heap on f, breaking
/// ties on lower heuristic then lower cell index.
#[derive(Debug, PartialEq)]
struct OpenCell {
    f: f64,
    h: f64,
    index: usize,
}

impl Eq for OpenCell {}

impl Ord for OpenCell {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .f
            .total_cmp(&self.f)
            .then(other.h.total_cmp(&self.h))
            .then(other.index.cmp(&self.index))
    }
}

impl PartialOrd for OpenCell {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl GridPlanner {
    pub fn new(cost_factor: f64) -> Self {
        Self { cost_factor }
    }

    /// Plan from `start` to `goal` over the given grid snapshot.
    ///
    /// The returned plan starts at exactly `start` and ends at exactly
    /// `goal`; intermediate poses are cell centres headed toward their
    /// successor.
    pub fn make_plan(
        &self,
        grid: &CostGrid,
        start: &Pose,
        goal: &Pose,
    ) -> Result<Vec<Pose>, PlanError> {
        let (sx, sy) = grid
            .world_to_map(start.x, start.y)
            .ok_or(PlanError::StartOutOfBounds {
                x: start.x,
                y: start.y,
            })?;
        let (gx, gy) = grid
            .world_to_map(goal.x, goal.y)
            .ok_or(PlanError::GoalOutOfBounds {
                x: goal.x,
                y: goal.y,
            })?;

        if grid.cost(gx, gy) >= costs::INSCRIBED {
            warn!(x = goal.x, y = goal.y, "Goal cell is blocked");
            return Err(PlanError::GoalBlocked {
                x: goal.x,
                y: goal.y,
            });
        }

        if (sx, sy) == (gx, gy) {
            return Ok(vec![*start, *goal]);
        }

        let size_x = grid.size_x();
        let size_y = grid.size_y();
        let n = size_x * size_y;
        let start_idx = sy * size_x + sx;
        let goal_idx = gy * size_x + gx;

        let mut g_score = vec![f64::INFINITY; n];
        let mut parent = vec![usize::MAX; n];
        let mut closed = vec![false; n];
        let mut open = BinaryHeap::new();

        let heuristic = |idx: usize| -> f64 {
            let (cx, cy) = (idx % size_x, idx / size_x);
            let dx = cx as f64 - gx as f64;
            let dy = cy as f64 - gy as f64;
            dx.hypot(dy)
        };

        g_score[start_idx] = 0.0;
        open.push(OpenCell {
            f: heuristic(start_idx),
            h: heuristic(start_idx),
            index: start_idx,
        });

        const SQRT2: f64 = std::f64::consts::SQRT_2;
        let neighbours: [(i64, i64, f64); 8] = [
            (1, 0, 1.0),
            (-1, 0, 1.0),
            (0, 1, 1.0),
            (0, -1, 1.0),
            (1, 1, SQRT2),
            (1, -1, SQRT2),
            (-1, 1, SQRT2),
            (-1, -1, SQRT2),
        ];

        while let Some(OpenCell { index, .. }) = open.pop() {
            if closed[index] {
                continue;
            }
            closed[index] = true;

            if index == goal_idx {
                break;
            }

            let cx = (index % size_x) as i64;
            let cy = (index / size_x) as i64;

            for &(dx, dy, dist) in &neighbours {
                let nx = cx + dx;
                let ny = cy + dy;
                if nx < 0 || ny < 0 || nx >= size_x as i64 || ny >= size_y as i64 {
                    continue;
                }
                let (nx, ny) = (nx as usize, ny as usize);
                let nidx = ny * size_x + nx;
                if closed[nidx] {
                    continue;
                }

                let cell_cost = grid.cost(nx, ny);
                if cell_cost >= costs::INSCRIBED {
                    continue;
                }

                let step = dist * (1.0 + self.cost_factor * cell_cost as f64);
                let tentative = g_score[index] + step;
                if tentative < g_score[nidx] {
                    g_score[nidx] = tentative;
                    parent[nidx] = index;
                    let h = heuristic(nidx);
                    open.push(OpenCell {
                        f: tentative + h,
                        h,
                        index: nidx,
                    });
                }
            }
        }

        if !closed[goal_idx] {
            return Err(PlanError::NoPath);
        }

        // Back-trace parents from goal to start, then reverse
        let mut cells = Vec::new();
        let mut idx = goal_idx;
        while idx != usize::MAX {
            cells.push(idx);
            if idx == start_idx {
                break;
            }
            idx = parent[idx];
        }
        cells.reverse();

        let mut plan: Vec<Pose> = cells
            .iter()
            .map(|&i| {
                let (wx, wy) = grid.map_to_world(i % size_x, i / size_x);
                Pose::new(wx, wy, 0.0)
            })
            .collect();

        // Intermediate headings point at the successor pose
        for i in 0..plan.len().saturating_sub(1) {
            let dx = plan[i + 1].x - plan[i].x;
            let dy = plan[i + 1].y - plan[i].y;
            plan[i].theta = dy.atan2(dx);
        }

        // Pin the endpoints to the exact requested poses
        plan[0] = *start;
        *plan.last_mut().unwrap() = *goal;

        debug!(poses = plan.len(), "Global plan computed");
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn free_grid() -> CostGrid {
        CostGrid::new(10, 10, 0.1, 0.0, 0.0, costs::FREE)
    }

    #[test]
    fn test_plan_on_free_grid() {
        let grid = free_grid();
        let start = Pose::new(0.05, 0.05, 0.0);
        let goal = Pose::new(0.85, 0.85, 0.0);
        let plan = GridPlanner::default().make_plan(&grid, &start, &goal).unwrap();

        assert!(!plan.is_empty());
        assert_eq!(plan[0], start);
        assert_eq!(*plan.last().unwrap(), goal);

        // Monotone progress toward the goal cell on a free diagonal
        let mut last = f64::INFINITY;
        for pose in &plan {
            let d = pose.distance(&goal);
            assert!(d <= last + 1e-9, "distance to goal increased");
            last = d;
        }
    }

    #[test]
    fn test_plan_avoids_lethal_corridor() {
        let mut grid = free_grid();
        // Wall spanning mx in [4,5] with a gap nowhere: block only rows 0..8
        for my in 0..10 {
            for mx in 4..=5 {
                grid.set_cost(mx, my, costs::LETHAL);
            }
        }
        // Open the top of the wall
        for mx in 4..=5 {
            grid.set_cost(mx, 9, costs::FREE);
        }

        let start = Pose::new(0.05, 0.05, 0.0);
        let goal = Pose::new(0.85, 0.05, 0.0);
        let plan = GridPlanner::default().make_plan(&grid, &start, &goal).unwrap();

        for pose in &plan {
            let (mx, my) = grid.world_to_map(pose.x, pose.y).unwrap();
            assert!(grid.cost(mx, my) < costs::INSCRIBED, "pose on blocked cell");
            // Never inside the closed part of the corridor
            assert!(!(0.4..0.6).contains(&pose.x) || my == 9);
        }
    }

    #[test]
    fn test_no_path_through_full_wall() {
        let mut grid = free_grid();
        for my in 0..10 {
            grid.set_cost(5, my, costs::LETHAL);
        }
        let start = Pose::new(0.05, 0.05, 0.0);
        let goal = Pose::new(0.95, 0.05, 0.0);
        let result = GridPlanner::default().make_plan(&grid, &start, &goal);
        assert!(matches!(result, Err(PlanError::NoPath)));
    }

    #[test]
    fn test_goal_outside_grid() {
        let grid = free_grid();
        let start = Pose::new(0.05, 0.05, 0.0);
        let goal = Pose::new(5.0, 5.0, 0.0);
        let result = GridPlanner::default().make_plan(&grid, &start, &goal);
        assert!(matches!(result, Err(PlanError::GoalOutOfBounds { .. })));
    }

    #[test]
    fn test_goal_blocked() {
        let mut grid = free_grid();
        grid.set_cost(8, 8, costs::LETHAL);
        let start = Pose::new(0.05, 0.05, 0.0);
        let goal = Pose::new(0.85, 0.85, 0.0);
        let result = GridPlanner::default().make_plan(&grid, &start, &goal);
        assert!(matches!(result, Err(PlanError::GoalBlocked { .. })));
    }

    #[test]
    fn test_start_equals_goal_cell() {
        let grid = free_grid();
        let start = Pose::new(0.52, 0.52, 0.0);
        let goal = Pose::new(0.55, 0.55, 1.0);
        let plan = GridPlanner::default().make_plan(&grid, &start, &goal).unwrap();
        assert_eq!(plan.len(), 2);
        assert_eq!(plan[0], start);
        assert_eq!(plan[1], goal);
    }

    #[test]
    fn test_prefers_low_cost_cells() {
        let mut grid = free_grid();
        // Expensive band across the middle except the top row
        for my in 0..9 {
            for mx in 4..=5 {
                grid.set_cost(mx, my, 200);
            }
        }
        let start = Pose::new(0.05, 0.05, 0.0);
        let goal = Pose::new(0.95, 0.05, 0.0);
        let plan = GridPlanner::new(0.5).make_plan(&grid, &start, &goal).unwrap();

        // With a strong cost factor the plan detours around the band
        let crosses_band = plan.iter().any(|p| {
            let (mx, my) = grid.world_to_map(p.x, p.y).unwrap();
            (4..=5).contains(&mx) && my < 9
        });
        assert!(!crosses_band);
    }
}
