//! Dense terrain height maps.

use serde::{Deserialize, Serialize};

use crate::error::{RasterError, Result};
use crate::grid::{check_step, Aabb, GridRect, GridSpec};
use crate::triangle::Extremum;

/// Marker stored in cells with no surface. Never a valid height.
pub const EMPTY_Z: f32 = -1.0e30;

/// True for the empty marker (and for NaN, which is never a usable height).
#[inline]
pub fn is_empty_z(z: f32) -> bool {
    !(z > EMPTY_Z)
}

/// Dense grid of heights, row-major (Y outer, X inner).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeightMap {
    grid: GridSpec,
    z: Vec<f32>,
    min_z: f32,
    max_z: f32,
}

impl HeightMap {
    /// A map with every cell empty.
    pub fn empty(grid: GridSpec) -> Self {
        Self {
            grid,
            z: vec![EMPTY_Z; grid.cell_count()],
            min_z: f32::INFINITY,
            max_z: f32::NEG_INFINITY,
        }
    }

    /// Wrap an existing height buffer laid out on `grid`.
    ///
    /// Panics if the buffer length does not match the grid.
    pub fn from_heights(grid: GridSpec, z: Vec<f32>) -> Self {
        assert_eq!(z.len(), grid.cell_count(), "height buffer does not match grid");
        let mut map = Self {
            grid,
            z,
            min_z: f32::INFINITY,
            max_z: f32::NEG_INFINITY,
        };
        map.refresh_range();
        map
    }

    fn refresh_range(&mut self) {
        let (lo, hi) = self
            .z
            .iter()
            .filter(|z| !is_empty_z(**z))
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &z| (lo.min(z), hi.max(z)));
        self.min_z = lo;
        self.max_z = hi;
    }

    /// The lattice this map is laid out on.
    pub fn grid(&self) -> &GridSpec {
        &self.grid
    }

    /// Number of columns.
    pub fn width(&self) -> usize {
        self.grid.width
    }

    /// Number of rows.
    pub fn height(&self) -> usize {
        self.grid.height
    }

    /// Raw heights including empty markers.
    pub fn heights(&self) -> &[f32] {
        &self.z
    }

    /// Lowest stored height (`+inf` if the map is empty).
    pub fn min_z(&self) -> f32 {
        self.min_z
    }

    /// Highest stored height (`-inf` if the map is empty).
    pub fn max_z(&self) -> f32 {
        self.max_z
    }

    /// Flat index of (x, y).
    #[inline]
    pub fn index(&self, x: usize, y: usize) -> usize {
        y * self.grid.width + x
    }

    /// Height at a cell, or `None` if outside the map or empty.
    #[inline]
    pub fn get(&self, x: i64, y: i64) -> Option<f32> {
        if x < 0 || y < 0 || x >= self.grid.width as i64 || y >= self.grid.height as i64 {
            return None;
        }
        let z = self.z[self.index(x as usize, y as usize)];
        (!is_empty_z(z)).then_some(z)
    }

    /// Merge a height into a cell, keeping the chosen extremum.
    pub fn merge(&mut self, x: usize, y: usize, z: f32, keep: Extremum) {
        if is_empty_z(z) {
            return;
        }
        let idx = self.index(x, y);
        let current = self.z[idx];
        let stored = if is_empty_z(current) { z } else { keep.pick(current, z) };
        if stored == current {
            return;
        }
        self.z[idx] = stored;
        if !is_empty_z(current) && (current == self.min_z || current == self.max_z) {
            // The replaced height may have been the only one at a bound.
            self.refresh_range();
        } else {
            self.min_z = self.min_z.min(stored);
            self.max_z = self.max_z.max(stored);
        }
    }

    /// Number of non-empty cells.
    pub fn occupied(&self) -> usize {
        self.z.iter().filter(|z| !is_empty_z(**z)).count()
    }

    /// Fraction of cells holding a height.
    pub fn density(&self) -> f32 {
        if self.z.is_empty() {
            0.0
        } else {
            self.occupied() as f32 / self.z.len() as f32
        }
    }

    /// Place xyz points on the lattice, keeping `keep` where points collide.
    ///
    /// Points that round outside the map are ignored. Returns how many landed.
    pub fn ingest_points(&mut self, points: &[f32], keep: Extremum) -> usize {
        let mut placed = 0;
        for p in points.chunks_exact(3) {
            let (gx, gy) = self.grid.index_of(p[0], p[1]);
            if gx >= 0 && gy >= 0 && (gx as usize) < self.grid.width && (gy as usize) < self.grid.height {
                self.merge(gx as usize, gy as usize, p[2], keep);
                placed += 1;
            }
        }
        placed
    }

    /// Copy a window of the map. The window is clipped to the map first.
    pub fn window(&self, rect: &GridRect) -> HeightMap {
        let rect = rect.intersect(&self.grid.rect());
        let grid = self.grid.window(&rect);
        let mut z = Vec::with_capacity(rect.cell_count());
        for y in rect.y0..rect.y1 {
            let row = self.index(rect.x0 as usize, y as usize);
            z.extend_from_slice(&self.z[row..row + rect.width()]);
        }
        HeightMap::from_heights(grid, z)
    }

    /// Non-empty cells as world-space xyz triples.
    pub fn to_points(&self) -> Vec<f32> {
        let mut points = Vec::with_capacity(self.occupied() * 3);
        for gy in 0..self.grid.height {
            for gx in 0..self.grid.width {
                let z = self.z[self.index(gx, gy)];
                if !is_empty_z(z) {
                    points.extend_from_slice(&[
                        self.grid.x_at(gx as i64),
                        self.grid.y_at(gy as i64),
                        z,
                    ]);
                }
            }
        }
        points
    }
}

/// Build a dense map directly from an xyz point grid.
///
/// Bounds default to the points' own extent; the lattice has
/// `round((max - min) / step) + 1` samples per axis. Where two points fall on
/// the same cell the higher one wins. An empty point list yields a 0x0 map.
/// Caller-supplied bounds must be non-empty on X and Y.
pub fn create_height_map_from_points(
    points: &[f32],
    step: f32,
    bounds: Option<Aabb>,
) -> Result<HeightMap> {
    if points.len() % 3 != 0 {
        return Err(RasterError::MalformedPoints(points.len()));
    }
    check_step(step)?;

    if let Some(bounds) = &bounds {
        bounds.validate_xy()?;
    }
    let Some(bounds) = bounds.or_else(|| Aabb::from_points(points)) else {
        return Ok(HeightMap::empty(GridSpec {
            min_x: 0.0,
            min_y: 0.0,
            step,
            width: 0,
            height: 0,
        }));
    };

    let mut map = HeightMap::empty(GridSpec::from_bounds(&bounds, step)?);
    map.ingest_points(points, Extremum::Max);
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn regular_points(w: usize, h: usize, step: f32, z: impl Fn(usize, usize) -> f32) -> Vec<f32> {
        let mut pts = Vec::new();
        for y in 0..h {
            for x in 0..w {
                pts.extend_from_slice(&[1.5 + x as f32 * step, -2.0 + y as f32 * step, z(x, y)]);
            }
        }
        pts
    }

    #[test]
    fn test_round_trip_grid_dims() {
        for (w, h, step) in [(1, 1, 1.0), (7, 3, 0.25), (40, 55, 0.1), (128, 9, 2.5)] {
            let pts = regular_points(w, h, step, |x, y| (x + y) as f32);
            let map = create_height_map_from_points(&pts, step, None).unwrap();
            assert_eq!((map.width(), map.height()), (w, h), "step {step}");
            assert_eq!(map.occupied(), w * h);
        }
    }

    #[test]
    fn test_points_keep_max_on_collision() {
        let pts = [0.0, 0.0, 1.0, 1.0, 0.0, 2.0, 0.0, 0.0, 3.0, 1.0, 0.0, -4.0];
        let map = create_height_map_from_points(&pts, 1.0, None).unwrap();
        assert_eq!(map.get(0, 0), Some(3.0));
        assert_eq!(map.get(1, 0), Some(2.0));
        // Losing heights (1.0 and -4.0) do not widen the range.
        assert_eq!(map.min_z(), 2.0);
        assert_eq!(map.max_z(), 3.0);
    }

    #[test]
    fn test_range_follows_stored_heights() {
        let pts = [0.0, 0.0, 1.0, 1.0, 0.0, 2.0, 0.0, 0.0, 3.0];
        let map = create_height_map_from_points(&pts, 1.0, None).unwrap();
        let stored: Vec<f32> = map.heights().iter().copied().filter(|z| !is_empty_z(*z)).collect();
        assert_eq!(stored, vec![3.0, 2.0]);
        assert_eq!(map.min_z(), 2.0);
        assert_eq!(map.max_z(), 3.0);

        let grid = GridSpec {
            min_x: 0.0,
            min_y: 0.0,
            step: 1.0,
            width: 2,
            height: 1,
        };
        let mut low = HeightMap::empty(grid);
        low.merge(0, 0, 5.0, Extremum::Min);
        low.merge(1, 0, 7.0, Extremum::Min);
        low.merge(1, 0, 6.0, Extremum::Min);
        assert_eq!((low.min_z(), low.max_z()), (5.0, 6.0));
    }

    #[test]
    fn test_inverted_bounds_rejected() {
        let pts = [1.0, 1.0, 0.0, 2.0, 2.0, 0.0];
        let inverted = Aabb::new([5.0, 5.0, 0.0], [0.0, 0.0, 0.0]);
        assert!(matches!(
            create_height_map_from_points(&pts, 1.0, Some(inverted)),
            Err(RasterError::InvalidBounds { axis: "x", .. })
        ));
        let flat_y = Aabb::new([0.0, 3.0, 0.0], [4.0, 3.0, 0.0]);
        assert!(matches!(
            create_height_map_from_points(&pts, 1.0, Some(flat_y)),
            Err(RasterError::InvalidBounds { axis: "y", .. })
        ));

        // A single point defines its own 1x1 lattice.
        let single = create_height_map_from_points(&[2.0, 2.0, 7.0], 1.0, None).unwrap();
        assert_eq!((single.width(), single.height()), (1, 1));
        assert_eq!(single.get(0, 0), Some(7.0));
    }

    #[test]
    fn test_empty_points() {
        let map = create_height_map_from_points(&[], 1.0, None).unwrap();
        assert_eq!(map.width(), 0);
        assert_eq!(map.occupied(), 0);
        assert_eq!(map.density(), 0.0);
        assert!(create_height_map_from_points(&[0.0, 1.0], 1.0, None).is_err());
    }

    #[test]
    fn test_get_out_of_bounds_and_empty() {
        let grid = GridSpec {
            min_x: 0.0,
            min_y: 0.0,
            step: 1.0,
            width: 3,
            height: 2,
        };
        let mut map = HeightMap::empty(grid);
        map.merge(1, 1, 4.0, Extremum::Max);
        assert_eq!(map.get(1, 1), Some(4.0));
        assert_eq!(map.get(0, 0), None);
        assert_eq!(map.get(-1, 0), None);
        assert_eq!(map.get(3, 0), None);
        assert!((map.density() - 1.0 / 6.0).abs() < 1e-6);
    }

    #[test]
    fn test_window_copy() {
        let pts = regular_points(6, 5, 1.0, |x, y| (y * 10 + x) as f32);
        let map = create_height_map_from_points(&pts, 1.0, None).unwrap();
        let win = map.window(&GridRect::new(2, 1, 8, 3));
        assert_eq!((win.width(), win.height()), (4, 2));
        assert_eq!(win.get(0, 0), Some(12.0));
        assert_eq!(win.get(3, 1), Some(25.0));
        assert_eq!(win.grid().min_x, map.grid().x_at(2));
    }

    #[test]
    fn test_to_points_round_trip() {
        let pts = regular_points(4, 4, 0.5, |x, _| x as f32);
        let map = create_height_map_from_points(&pts, 0.5, None).unwrap();
        let again = create_height_map_from_points(&map.to_points(), 0.5, None).unwrap();
        assert_eq!(map, again);
    }
}
