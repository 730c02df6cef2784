//! Fixed-resolution 2D cost grid.

use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::CostmapError;

/// Handle to a grid shared between the costmap updater and the planners.
///
/// Bulk rewrites and batched cell access both happen inside a single lock
/// hold; readers see a consistent snapshot for the duration of their guard.
pub type SharedGrid = Arc<Mutex<CostGrid>>;

/// Row-major byte grid with a world anchor at the lower-left corner of
/// cell (0,0).
#[derive(Debug, Clone)]
pub struct CostGrid {
    size_x: usize,
    size_y: usize,
    resolution: f64,
    origin_x: f64,
    origin_y: f64,
    default_value: u8,
    cells: Vec<u8>,
}

impl CostGrid {
    pub fn new(
        size_x: usize,
        size_y: usize,
        resolution: f64,
        origin_x: f64,
        origin_y: f64,
        default_value: u8,
    ) -> Self {
        Self {
            size_x,
            size_y,
            resolution,
            origin_x,
            origin_y,
            default_value,
            cells: vec![default_value; size_x * size_y],
        }
    }

    pub fn size_x(&self) -> usize {
        self.size_x
    }

    pub fn size_y(&self) -> usize {
        self.size_y
    }

    pub fn resolution(&self) -> f64 {
        self.resolution
    }

    pub fn origin_x(&self) -> f64 {
        self.origin_x
    }

    pub fn origin_y(&self) -> f64 {
        self.origin_y
    }

    pub fn default_value(&self) -> u8 {
        self.default_value
    }

    /// Raw row-major cell data.
    pub fn data(&self) -> &[u8] {
        &self.cells
    }

    /// Metric width of the grid.
    pub fn size_meters_x(&self) -> f64 {
        self.size_x as f64 * self.resolution
    }

    /// Metric height of the grid.
    pub fn size_meters_y(&self) -> f64 {
        self.size_y as f64 * self.resolution
    }

    #[inline]
    pub fn index(&self, mx: usize, my: usize) -> usize {
        my * self.size_x + mx
    }

    #[inline]
    pub fn cost(&self, mx: usize, my: usize) -> u8 {
        self.cells[self.index(mx, my)]
    }

    #[inline]
    pub fn set_cost(&mut self, mx: usize, my: usize, value: u8) {
        let idx = self.index(mx, my);
        self.cells[idx] = value;
    }

    /// Convert a world distance to a cell count, rounding up.
    pub fn cell_distance(&self, world_dist: f64) -> usize {
        (world_dist.max(0.0) / self.resolution).ceil() as usize
    }

    /// Convert world coordinates to the containing cell, if inside the grid.
    pub fn world_to_map(&self, wx: f64, wy: f64) -> Option<(usize, usize)> {
        let (mx, my) = self.world_to_map_signed(wx, wy);
        if mx >= 0 && my >= 0 && (mx as usize) < self.size_x && (my as usize) < self.size_y {
            Some((mx as usize, my as usize))
        } else {
            None
        }
    }

    /// Cell coordinates without the bounds check; may be negative or past
    /// the far edge.
    pub fn world_to_map_signed(&self, wx: f64, wy: f64) -> (i64, i64) {
        (
            ((wx - self.origin_x) / self.resolution).floor() as i64,
            ((wy - self.origin_y) / self.resolution).floor() as i64,
        )
    }

    /// Cell coordinates clamped onto the grid, for converting world-space
    /// update windows into cell windows.
    pub fn world_to_map_clamped(&self, wx: f64, wy: f64) -> (usize, usize) {
        let (mx, my) = self.world_to_map_signed(wx, wy);
        (
            mx.clamp(0, self.size_x.saturating_sub(1) as i64) as usize,
            my.clamp(0, self.size_y.saturating_sub(1) as i64) as usize,
        )
    }

    /// World coordinates of a cell's centre.
    pub fn map_to_world(&self, mx: usize, my: usize) -> (f64, f64) {
        (
            self.origin_x + (mx as f64 + 0.5) * self.resolution,
            self.origin_y + (my as f64 + 0.5) * self.resolution,
        )
    }

    /// Reset every cell to the default value.
    pub fn reset_all(&mut self) {
        self.cells.fill(self.default_value);
    }

    /// Reset the half-open cell window `[x0, xn) x [y0, yn)` to the default
    /// value, leaving every other cell untouched.
    pub fn reset_region(&mut self, x0: usize, y0: usize, xn: usize, yn: usize) {
        let xn = xn.min(self.size_x);
        let yn = yn.min(self.size_y);
        if x0 >= xn || y0 >= yn {
            return;
        }
        let default = self.default_value;
        for y in y0..yn {
            let row = y * self.size_x;
            self.cells[row + x0..row + xn].fill(default);
        }
    }

    /// Reallocate the grid with new geometry; all cells reset to default.
    pub fn resize(
        &mut self,
        size_x: usize,
        size_y: usize,
        resolution: f64,
        origin_x: f64,
        origin_y: f64,
    ) {
        self.size_x = size_x;
        self.size_y = size_y;
        self.resolution = resolution;
        self.origin_x = origin_x;
        self.origin_y = origin_y;
        self.cells = vec![self.default_value; size_x * size_y];
    }

    /// Shift the grid so `(new_origin_x, new_origin_y)` becomes the new
    /// lower-left corner, preserving cells whose world position lies in
    /// both the old and new extents. The new origin is snapped to the cell
    /// lattice of the old grid.
    pub fn update_origin(&mut self, new_origin_x: f64, new_origin_y: f64) {
        // Project the requested origin onto the cell lattice
        let cell_ox = ((new_origin_x - self.origin_x) / self.resolution) as i64;
        let cell_oy = ((new_origin_y - self.origin_y) / self.resolution) as i64;

        let new_grid_ox = self.origin_x + cell_ox as f64 * self.resolution;
        let new_grid_oy = self.origin_y + cell_oy as f64 * self.resolution;

        let size_x = self.size_x as i64;
        let size_y = self.size_y as i64;

        // Overlap of the old and new windows, in old-grid cells
        let lower_left_x = cell_ox.clamp(0, size_x);
        let lower_left_y = cell_oy.clamp(0, size_y);
        let upper_right_x = (cell_ox + size_x).clamp(0, size_x);
        let upper_right_y = (cell_oy + size_y).clamp(0, size_y);

        let cell_size_x = (upper_right_x - lower_left_x) as usize;
        let cell_size_y = (upper_right_y - lower_left_y) as usize;

        let mut scratch = vec![0u8; cell_size_x * cell_size_y];
        copy_region(
            &self.cells,
            lower_left_x as usize,
            lower_left_y as usize,
            self.size_x,
            &mut scratch,
            0,
            0,
            cell_size_x,
            cell_size_x,
            cell_size_y,
        );

        self.reset_all();
        self.origin_x = new_grid_ox;
        self.origin_y = new_grid_oy;

        // Blit the overlap back at its position in the shifted grid
        let start_x = lower_left_x - cell_ox;
        let start_y = lower_left_y - cell_oy;
        copy_region(
            &scratch,
            0,
            0,
            cell_size_x,
            &mut self.cells,
            start_x as usize,
            start_y as usize,
            self.size_x,
            cell_size_x,
            cell_size_y,
        );
    }

    /// Rebuild this grid as a metric window into `src`. Fails if the window
    /// does not fit inside the source extent.
    pub fn copy_window(
        &mut self,
        src: &CostGrid,
        win_origin_x: f64,
        win_origin_y: f64,
        win_size_x: f64,
        win_size_y: f64,
    ) -> bool {
        let Some((lower_left_x, lower_left_y)) = src.world_to_map(win_origin_x, win_origin_y)
        else {
            return false;
        };
        let Some((upper_right_x, upper_right_y)) =
            src.world_to_map(win_origin_x + win_size_x, win_origin_y + win_size_y)
        else {
            return false;
        };

        self.size_x = upper_right_x - lower_left_x;
        self.size_y = upper_right_y - lower_left_y;
        self.resolution = src.resolution;
        self.origin_x = win_origin_x;
        self.origin_y = win_origin_y;
        self.cells = vec![self.default_value; self.size_x * self.size_y];

        copy_region(
            &src.cells,
            lower_left_x,
            lower_left_y,
            src.size_x,
            &mut self.cells,
            0,
            0,
            self.size_x,
            self.size_x,
            self.size_y,
        );
        true
    }

    /// Write the grid as an ASCII PGM (P2) image: header
    /// `P2\n<W>\n<H>\n255\n` followed by row-major decimal cost values.
    pub fn save_pgm<P: AsRef<Path>>(&self, path: P) -> Result<(), CostmapError> {
        let mut file = std::fs::File::create(path)?;
        write!(file, "P2\n{}\n{}\n255\n", self.size_x, self.size_y)?;
        for my in 0..self.size_y {
            let row = my * self.size_x;
            let line: Vec<String> = self.cells[row..row + self.size_x]
                .iter()
                .map(|c| c.to_string())
                .collect();
            writeln!(file, "{}", line.join(" "))?;
        }
        Ok(())
    }
}

/// Copy a `region_size_x` x `region_size_y` block between two row-major
/// buffers, given each buffer's stride and the block's lower-left corner in
/// each.
#[allow(clippy::too_many_arguments)]
fn copy_region(
    src: &[u8],
    src_x: usize,
    src_y: usize,
    src_stride: usize,
    dst: &mut [u8],
    dst_x: usize,
    dst_y: usize,
    dst_stride: usize,
    region_size_x: usize,
    region_size_y: usize,
) {
    for row in 0..region_size_y {
        let s = (src_y + row) * src_stride + src_x;
        let d = (dst_y + row) * dst_stride + dst_x;
        dst[d..d + region_size_x].copy_from_slice(&src[s..s + region_size_x]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::costs;

    fn grid() -> CostGrid {
        CostGrid::new(10, 10, 0.1, 0.0, 0.0, costs::FREE)
    }

    #[test]
    fn test_world_map_roundtrip_cells() {
        let g = grid();
        for my in 0..10 {
            for mx in 0..10 {
                let (wx, wy) = g.map_to_world(mx, my);
                assert_eq!(g.world_to_map(wx, wy), Some((mx, my)));
            }
        }
    }

    #[test]
    fn test_world_to_map_bounds() {
        let g = grid();
        assert_eq!(g.world_to_map(0.0, 0.0), Some((0, 0)));
        assert_eq!(g.world_to_map(0.95, 0.95), Some((9, 9)));
        assert_eq!(g.world_to_map(-0.01, 0.5), None);
        assert_eq!(g.world_to_map(1.05, 0.5), None);
    }

    #[test]
    fn test_world_to_map_negative_origin() {
        let g = CostGrid::new(10, 10, 1.0, -5.0, -5.0, costs::FREE);
        assert_eq!(g.world_to_map(0.0, 0.0), Some((5, 5)));
        assert_eq!(g.world_to_map(-4.5, 4.5), Some((0, 9)));
    }

    #[test]
    fn test_reset_region_exact() {
        let mut g = grid();
        for my in 0..10 {
            for mx in 0..10 {
                g.set_cost(mx, my, 40);
            }
        }
        g.reset_region(2, 3, 5, 7);
        for my in 0..10 {
            for mx in 0..10 {
                let inside = (2..5).contains(&mx) && (3..7).contains(&my);
                let expected = if inside { costs::FREE } else { 40 };
                assert_eq!(g.cost(mx, my), expected, "cell ({mx},{my})");
            }
        }
    }

    #[test]
    fn test_reset_region_clips_to_grid() {
        let mut g = grid();
        g.set_cost(9, 9, 40);
        g.reset_region(8, 8, 50, 50);
        assert_eq!(g.cost(9, 9), costs::FREE);
    }

    #[test]
    fn test_update_origin_preserves_overlap() {
        let mut g = grid();
        g.set_cost(5, 5, costs::LETHAL);
        let (wx, wy) = g.map_to_world(5, 5);

        // Shift by exactly two cells in each direction
        g.update_origin(0.2, 0.2);

        assert!((g.origin_x() - 0.2).abs() < 1e-9);
        let (mx, my) = g.world_to_map(wx, wy).unwrap();
        assert_eq!((mx, my), (3, 3));
        assert_eq!(g.cost(3, 3), costs::LETHAL);

        // Cells shifted in from outside the old extent are default
        assert_eq!(g.cost(9, 9), costs::FREE);
    }

    #[test]
    fn test_update_origin_snaps_to_lattice() {
        let mut g = grid();
        g.update_origin(0.27, 0.05);
        assert!((g.origin_x() - 0.2).abs() < 1e-9);
        assert!((g.origin_y() - 0.0).abs() < 1e-9);
    }

    #[test]
    fn test_copy_window() {
        let mut src = grid();
        src.set_cost(4, 4, costs::LETHAL);

        let mut dst = CostGrid::new(0, 0, 0.1, 0.0, 0.0, costs::FREE);
        assert!(dst.copy_window(&src, 0.2, 0.2, 0.52, 0.52));
        assert_eq!(dst.size_x(), 5);
        assert_eq!(dst.size_y(), 5);
        // (4,4) in src is (2,2) in the window
        assert_eq!(dst.cost(2, 2), costs::LETHAL);
    }

    #[test]
    fn test_copy_window_outside_fails() {
        let src = grid();
        let mut dst = CostGrid::new(0, 0, 0.1, 0.0, 0.0, costs::FREE);
        assert!(!dst.copy_window(&src, -1.0, 0.0, 0.5, 0.5));
    }

    #[test]
    fn test_resize_resets() {
        let mut g = grid();
        g.set_cost(1, 1, 99);
        g.resize(20, 30, 0.05, -1.0, -2.0);
        assert_eq!(g.size_x(), 20);
        assert_eq!(g.size_y(), 30);
        assert_eq!(g.data().len(), 600);
        assert!(g.data().iter().all(|&c| c == costs::FREE));
    }

    #[test]
    fn test_save_pgm_roundtrip() {
        let mut g = grid();
        g.set_cost(2, 7, costs::LETHAL);
        g.set_cost(9, 0, 128);

        let dir = std::env::temp_dir().join("costmap_grid_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("map.pgm");
        g.save_pgm(&path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let mut tokens = content.split_whitespace();
        assert_eq!(tokens.next(), Some("P2"));
        let w: usize = tokens.next().unwrap().parse().unwrap();
        let h: usize = tokens.next().unwrap().parse().unwrap();
        let maxval: usize = tokens.next().unwrap().parse().unwrap();
        assert_eq!((w, h, maxval), (10, 10, 255));

        let values: Vec<u8> = tokens.map(|t| t.parse().unwrap()).collect();
        assert_eq!(values.len(), 100);
        assert_eq!(values, g.data());
    }
}
