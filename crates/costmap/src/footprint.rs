//! Robot footprint geometry and polygon rasterisation.

use nalgebra::Point2;

use crate::grid::CostGrid;
use crate::CostmapError;

/// Build the oriented footprint of the robot at the given pose.
///
/// Each footprint point `(px, py)` in the robot frame is rotated by `theta`
/// and translated by `(x, y)`.
pub fn transform_footprint(x: f64, y: f64, theta: f64, spec: &[Point2<f64>]) -> Vec<Point2<f64>> {
    let cos_t = theta.cos();
    let sin_t = theta.sin();
    spec.iter()
        .map(|p| Point2::new(x + p.x * cos_t - p.y * sin_t, y + p.x * sin_t + p.y * cos_t))
        .collect()
}

/// Pad the footprint outward by `padding` meters, in place.
///
/// Each coordinate moves away from the robot origin; coordinates that are
/// exactly zero stay put.
pub fn pad_footprint(footprint: &mut [Point2<f64>], padding: f64) {
    for p in footprint.iter_mut() {
        p.x += sign0(p.x) * padding;
        p.y += sign0(p.y) * padding;
    }
}

fn sign0(x: f64) -> f64 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        0.0
    }
}

/// Extreme distances of the footprint polygon from the robot origin.
///
/// Returns `(min, max)` where `min` is the smallest perpendicular distance
/// from the origin to any edge (the inscribed radius) and `max` is the
/// largest vertex distance (the circumscribed radius).
pub fn calculate_min_and_max_distances(footprint: &[Point2<f64>]) -> (f64, f64) {
    if footprint.len() < 2 {
        return (0.0, 0.0);
    }

    let mut min_dist = f64::MAX;
    let mut max_dist = 0.0f64;

    for i in 0..footprint.len() {
        let a = footprint[i];
        let b = footprint[(i + 1) % footprint.len()];
        max_dist = max_dist.max(a.x.hypot(a.y));
        min_dist = min_dist.min(distance_to_segment(0.0, 0.0, a.x, a.y, b.x, b.y));
    }

    (min_dist, max_dist)
}

/// Distance from point `(px, py)` to the segment `(x0, y0)-(x1, y1)`.
fn distance_to_segment(px: f64, py: f64, x0: f64, y0: f64, x1: f64, y1: f64) -> f64 {
    let a = px - x0;
    let b = py - y0;
    let c = x1 - x0;
    let d = y1 - y0;

    let dot = a * c + b * d;
    let len_sq = c * c + d * d;
    let param = if len_sq > 0.0 { dot / len_sq } else { 0.0 };

    let (xx, yy) = if param < 0.0 {
        (x0, y0)
    } else if param > 1.0 {
        (x1, y1)
    } else {
        (x0 + param * c, y0 + param * d)
    };

    (px - xx).hypot(py - yy)
}

/// Approximate a circular footprint with a regular 16-gon.
pub fn footprint_from_radius(radius: f64) -> Vec<Point2<f64>> {
    const N: usize = 16;
    (0..N)
        .map(|i| {
            let angle = i as f64 * 2.0 * std::f64::consts::PI / N as f64;
            Point2::new(radius * angle.cos(), radius * angle.sin())
        })
        .collect()
}

/// Parse a footprint string of the form `[[x1, y1], [x2, y2], ...]`.
///
/// Whitespace is tolerated anywhere; at least three points are required.
pub fn footprint_from_string(s: &str) -> Result<Vec<Point2<f64>>, CostmapError> {
    let compact: String = s.chars().filter(|c| !c.is_whitespace()).collect();
    let inner = compact
        .strip_prefix("[[")
        .and_then(|rest| rest.strip_suffix("]]"))
        .ok_or_else(|| CostmapError::InvalidFootprint(format!("expected [[x,y],...]: {s}")))?;

    let mut points = Vec::new();
    for pair in inner.split("],[") {
        let mut coords = pair.split(',');
        let x = parse_coord(coords.next(), s)?;
        let y = parse_coord(coords.next(), s)?;
        if coords.next().is_some() {
            return Err(CostmapError::InvalidFootprint(format!(
                "point with more than two coordinates: {s}"
            )));
        }
        points.push(Point2::new(x, y));
    }

    if points.len() < 3 {
        return Err(CostmapError::InvalidFootprint(format!(
            "footprint needs at least 3 points, got {}",
            points.len()
        )));
    }
    Ok(points)
}

fn parse_coord(token: Option<&str>, full: &str) -> Result<f64, CostmapError> {
    token
        .and_then(|t| t.parse::<f64>().ok())
        .ok_or_else(|| CostmapError::InvalidFootprint(format!("bad coordinate in: {full}")))
}

/// Cells on the line between two cells, endpoints included (Bresenham).
pub fn line_cells(x0: i64, y0: i64, x1: i64, y1: i64) -> Vec<(i64, i64)> {
    let mut cells = Vec::new();

    let dx = (x1 - x0).abs();
    let dy = (y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx - dy;

    let mut x = x0;
    let mut y = y0;

    loop {
        cells.push((x, y));
        if x == x1 && y == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 > -dy {
            err -= dy;
            x += sx;
        }
        if e2 < dx {
            err += dx;
            y += sy;
        }
    }

    cells
}

/// Trace the outline of a polygon given its vertex cells, closing the loop.
pub fn polygon_outline_cells(vertices: &[(i64, i64)]) -> Vec<(i64, i64)> {
    let mut cells = Vec::new();
    if vertices.is_empty() {
        return cells;
    }
    for i in 0..vertices.len() {
        let (x0, y0) = vertices[i];
        let (x1, y1) = vertices[(i + 1) % vertices.len()];
        let segment = line_cells(x0, y0, x1, y1);
        // Skip the shared endpoint so the outline has no duplicates
        cells.extend(&segment[..segment.len() - 1]);
    }
    cells
}

/// Fill a rasterised polygon outline, returning outline plus interior cells.
///
/// Sorts the outline by x (simple bubble sort, the lists are tiny), then for
/// each x-column walks y between the extreme outline cells of that column.
pub fn fill_cells(outline: Vec<(i64, i64)>) -> Vec<(i64, i64)> {
    if outline.is_empty() {
        return outline;
    }

    let mut cells = outline;
    let mut i = 0;
    while i < cells.len() - 1 {
        if cells[i].0 > cells[i + 1].0 {
            cells.swap(i, i + 1);
            if i > 0 {
                i -= 1;
            }
        } else {
            i += 1;
        }
    }

    let mut filled = Vec::with_capacity(cells.len());
    let mut idx = 0;
    while idx < cells.len() {
        let x = cells[idx].0;
        let mut min_y = cells[idx].1;
        let mut max_y = cells[idx].1;
        while idx < cells.len() && cells[idx].0 == x {
            min_y = min_y.min(cells[idx].1);
            max_y = max_y.max(cells[idx].1);
            filled.push(cells[idx]);
            idx += 1;
        }
        for y in min_y + 1..max_y {
            if !filled.iter().any(|&(cx, cy)| cx == x && cy == y) {
                filled.push((x, y));
            }
        }
    }
    filled
}

/// Cells covered by the robot footprint at a pose.
///
/// Transforms the footprint, maps each vertex into the grid, and rasterises
/// the outline (and interior when `fill` is set). Returns `None` when any
/// vertex falls outside the grid, which callers treat as an illegal pose.
pub fn footprint_cells(
    x: f64,
    y: f64,
    theta: f64,
    spec: &[Point2<f64>],
    grid: &CostGrid,
    fill: bool,
) -> Option<Vec<(usize, usize)>> {
    let oriented = transform_footprint(x, y, theta, spec);

    let mut vertices = Vec::with_capacity(oriented.len());
    for p in &oriented {
        let (mx, my) = grid.world_to_map(p.x, p.y)?;
        vertices.push((mx as i64, my as i64));
    }

    let outline = polygon_outline_cells(&vertices);
    let cells = if fill { fill_cells(outline) } else { outline };

    // Bresenham between in-bounds vertices stays in bounds, but clip anyway
    Some(
        cells
            .into_iter()
            .filter(|&(cx, cy)| {
                cx >= 0 && cy >= 0 && (cx as usize) < grid.size_x() && (cy as usize) < grid.size_y()
            })
            .map(|(cx, cy)| (cx as usize, cy as usize))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::costs;
    use approx::assert_relative_eq;

    fn rectangle() -> Vec<Point2<f64>> {
        vec![
            Point2::new(0.2, 0.1),
            Point2::new(0.2, -0.1),
            Point2::new(-0.2, -0.1),
            Point2::new(-0.2, 0.1),
        ]
    }

    #[test]
    fn test_transform_identity_is_noop() {
        let spec = rectangle();
        let out = transform_footprint(0.0, 0.0, 0.0, &spec);
        for (a, b) in spec.iter().zip(&out) {
            assert_relative_eq!(a.x, b.x, epsilon = 1e-12);
            assert_relative_eq!(a.y, b.y, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_transform_rotation_and_translation() {
        let spec = vec![Point2::new(1.0, 0.0)];
        let out = transform_footprint(2.0, 3.0, std::f64::consts::FRAC_PI_2, &spec);
        assert_relative_eq!(out[0].x, 2.0, epsilon = 1e-12);
        assert_relative_eq!(out[0].y, 4.0, epsilon = 1e-12);
    }

    #[test]
    fn test_pad_footprint_moves_outward() {
        let mut spec = rectangle();
        pad_footprint(&mut spec, 0.05);
        assert_relative_eq!(spec[0].x, 0.25, epsilon = 1e-12);
        assert_relative_eq!(spec[0].y, 0.15, epsilon = 1e-12);
        assert_relative_eq!(spec[2].x, -0.25, epsilon = 1e-12);
        assert_relative_eq!(spec[2].y, -0.15, epsilon = 1e-12);
    }

    #[test]
    fn test_min_max_distances_padded_rectangle() {
        let mut spec = rectangle();
        pad_footprint(&mut spec, 0.05);
        let (min_dist, max_dist) = calculate_min_and_max_distances(&spec);
        assert_relative_eq!(min_dist, 0.15, epsilon = 1e-9);
        assert_relative_eq!(max_dist, 0.25f64.hypot(0.15), epsilon = 1e-9);
    }

    #[test]
    fn test_footprint_from_radius() {
        let spec = footprint_from_radius(0.3);
        assert_eq!(spec.len(), 16);
        for p in &spec {
            assert_relative_eq!(p.x.hypot(p.y), 0.3, epsilon = 1e-9);
        }
        let (min_dist, max_dist) = calculate_min_and_max_distances(&spec);
        assert!(min_dist > 0.29 * (std::f64::consts::PI / 16.0).cos());
        assert_relative_eq!(max_dist, 0.3, epsilon = 1e-9);
    }

    #[test]
    fn test_footprint_from_string() {
        let spec =
            footprint_from_string(" [ [0.2, 0.1] , [0.2, -0.1], [-0.2, -0.1], [-0.2, 0.1] ] ")
                .unwrap();
        assert_eq!(spec.len(), 4);
        assert_relative_eq!(spec[1].y, -0.1, epsilon = 1e-12);
    }

    #[test]
    fn test_footprint_from_string_rejects_bad_input() {
        assert!(footprint_from_string("[[1,2],[3,4]]").is_err()); // too few points
        assert!(footprint_from_string("1,2,3").is_err());
        assert!(footprint_from_string("[[a,b],[1,2],[3,4]]").is_err());
    }

    #[test]
    fn test_line_cells_endpoints_and_connectivity() {
        let cells = line_cells(0, 0, 5, 3);
        assert_eq!(*cells.first().unwrap(), (0, 0));
        assert_eq!(*cells.last().unwrap(), (5, 3));
        for pair in cells.windows(2) {
            let (ax, ay) = pair[0];
            let (bx, by) = pair[1];
            assert!((ax - bx).abs() <= 1 && (ay - by).abs() <= 1);
        }
    }

    #[test]
    fn test_polygon_outline_closes_loop() {
        let outline = polygon_outline_cells(&[(0, 0), (4, 0), (4, 4), (0, 4)]);
        assert!(outline.contains(&(2, 0)));
        assert!(outline.contains(&(4, 2)));
        assert!(outline.contains(&(0, 2))); // closing edge
        assert!(!outline.contains(&(2, 2)));
    }

    #[test]
    fn test_fill_cells_covers_interior() {
        let outline = polygon_outline_cells(&[(0, 0), (4, 0), (4, 4), (0, 4)]);
        let filled = fill_cells(outline);
        for x in 1..4 {
            for y in 1..4 {
                assert!(filled.contains(&(x, y)), "missing interior cell ({x},{y})");
            }
        }
    }

    #[test]
    fn test_footprint_cells_on_grid() {
        let grid = CostGrid::new(100, 100, 0.05, -2.5, -2.5, costs::FREE);
        let cells = footprint_cells(0.0, 0.0, 0.0, &rectangle(), &grid, true).unwrap();
        assert!(!cells.is_empty());
        // Robot centre cell must be covered when filling
        let centre = grid.world_to_map(0.0, 0.0).unwrap();
        assert!(cells.contains(&centre));
    }

    #[test]
    fn test_footprint_cells_off_grid() {
        let grid = CostGrid::new(10, 10, 0.05, 0.0, 0.0, costs::FREE);
        // Footprint sticks out past the origin corner
        assert!(footprint_cells(0.0, 0.0, 0.0, &rectangle(), &grid, false).is_none());
    }
}
