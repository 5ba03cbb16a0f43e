//! Vertical ray-cast rasterization of a mesh onto a lattice.
//!
//! The lattice is cut into overlapping windows, each rasterized on a rayon
//! worker against its own window-local [`SpatialGrid`], then merged by
//! keeping the filter's extremum wherever windows overlap.

use log::{debug, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::grid::{check_step, Aabb, GridRect, GridSpec};
use crate::heightmap::{is_empty_z, HeightMap, EMPTY_Z};
use crate::spatial::SpatialGrid;
use crate::triangle::{FaceFilter, Mesh};

/// Samples per side of one parallel rasterization window.
pub(crate) const WINDOW_SIZE: usize = 256;

/// Extra samples shared between neighbouring windows.
const WINDOW_OVERLAP: usize = 1;

/// Sparse result of [`rasterize`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RasterOutput {
    /// Hit samples as xyz triples.
    pub points: Vec<f32>,
    /// Scanned XY bounds with the Z range of the hits, `None` if nothing was hit.
    pub bounds: Option<Aabb>,
}

impl RasterOutput {
    /// Number of hit samples.
    pub fn point_count(&self) -> usize {
        self.points.len() / 3
    }
}

/// Lattice that `rasterize` would scan for this mesh.
///
/// Uses `bounds` when given, otherwise the mesh bounds. Returns `None` for an
/// empty mesh without override bounds.
pub fn lattice_for(mesh: &Mesh, step: f32, bounds: Option<Aabb>) -> Result<Option<GridSpec>> {
    check_step(step)?;
    let Some(bounds) = bounds.or(mesh.bounds()) else {
        return Ok(None);
    };
    bounds.validate_xy()?;
    GridSpec::from_bounds(&bounds, step).map(Some)
}

/// Rasterize one window of a global lattice.
///
/// Sample coordinates come from `grid`, so the result is bit-identical to the
/// same cells of a full-lattice rasterization. `rect` is clipped to the grid.
pub fn rasterize_window(mesh: &Mesh, filter: FaceFilter, grid: &GridSpec, rect: &GridRect) -> HeightMap {
    let rect = rect.intersect(&grid.rect());
    let window = grid.window(&rect);
    let Some(mesh_bounds) = mesh.bounds() else {
        return HeightMap::empty(window);
    };
    if rect.is_empty() {
        return HeightMap::empty(window);
    }

    let index = SpatialGrid::build(mesh.triangles(), filter, &grid.world_bounds(&rect));
    let triangles = mesh.triangles();
    let keep = filter.extremum();
    let origin_z = mesh_bounds.min[2] - 1.0;

    let mut z = Vec::with_capacity(rect.cell_count());
    for gy in rect.y0..rect.y1 {
        let y = grid.y_at(gy);
        for gx in rect.x0..rect.x1 {
            let x = grid.x_at(gx);
            let mut best = EMPTY_Z;
            for &i in index.candidates(x, y) {
                if let Some(hit) = triangles[i as usize].z_at(x, y, origin_z) {
                    best = if is_empty_z(best) { hit } else { keep.pick(best, hit) };
                }
            }
            z.push(best);
        }
    }

    HeightMap::from_heights(window, z)
}

/// Rasterize the whole lattice into a dense height map.
pub fn rasterize_height_map(mesh: &Mesh, filter: FaceFilter, grid: &GridSpec) -> HeightMap {
    rasterize_region(mesh, filter, grid, &grid.rect())
}

/// Rasterize a sub-rectangle of the lattice in parallel windows.
///
/// The returned map covers `rect` (clipped to the grid) only.
pub fn rasterize_region(mesh: &Mesh, filter: FaceFilter, grid: &GridSpec, rect: &GridRect) -> HeightMap {
    let rect = rect.intersect(&grid.rect());
    let windows = rect.overlapping_windows(WINDOW_SIZE, WINDOW_OVERLAP);
    debug!(
        "rasterizing {}x{} samples in {} windows ({} triangles, {:?})",
        rect.width(),
        rect.height(),
        windows.len(),
        mesh.len(),
        filter
    );

    if windows.len() == 1 {
        return rasterize_window(mesh, filter, grid, &rect);
    }

    let parts: Vec<(GridRect, HeightMap)> = windows
        .par_iter()
        .map(|w| (*w, rasterize_window(mesh, filter, grid, w)))
        .collect();

    let keep = filter.extremum();
    let mut map = HeightMap::empty(grid.window(&rect));
    for (w, part) in &parts {
        for (row, gy) in (w.y0..w.y1).enumerate() {
            for (col, gx) in (w.x0..w.x1).enumerate() {
                let z = part.heights()[part.index(col, row)];
                map.merge((gx - rect.x0) as usize, (gy - rect.y0) as usize, z, keep);
            }
        }
    }
    map
}

/// Rasterize a flat triangle buffer into a compacted list of hit points.
///
/// An empty buffer yields an empty output rather than an error.
pub fn rasterize(
    triangles: &[f32],
    step: f32,
    filter: FaceFilter,
    bounds: Option<Aabb>,
) -> Result<RasterOutput> {
    let mesh = Mesh::from_flat(triangles)?;
    check_step(step)?;
    if mesh.is_empty() {
        warn!("rasterize called with no triangles");
        return Ok(RasterOutput::default());
    }

    let Some(grid) = lattice_for(&mesh, step, bounds)? else {
        return Ok(RasterOutput::default());
    };
    let map = rasterize_height_map(&mesh, filter, &grid);
    let points = map.to_points();

    let bounds = (!points.is_empty()).then(|| {
        let scanned = grid.world_bounds(&grid.rect());
        Aabb::new(
            [scanned.min[0], scanned.min[1], map.min_z()],
            [scanned.max[0], scanned.max[1], map.max_z()],
        )
    });
    Ok(RasterOutput { points, bounds })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Two upward triangles covering [x0, x1] x [y0, y1] at height `z`.
    pub(crate) fn plane(x0: f32, y0: f32, x1: f32, y1: f32, z: f32) -> Vec<f32> {
        vec![
            x0, y0, z, x1, y0, z, x1, y1, z, //
            x0, y0, z, x1, y1, z, x0, y1, z,
        ]
    }

    fn flipped(buffer: &[f32]) -> Vec<f32> {
        buffer
            .chunks_exact(9)
            .flat_map(|c| [c[0], c[1], c[2], c[6], c[7], c[8], c[3], c[4], c[5]])
            .collect()
    }

    #[test]
    fn test_flat_plane_grid() {
        let out = rasterize(&plane(0.0, 0.0, 10.0, 10.0, 5.0), 1.0, FaceFilter::UpwardFacing, None).unwrap();
        assert_eq!(out.point_count(), 121);
        assert!(out.points.chunks_exact(3).all(|p| p[2] == 5.0));
        let bounds = out.bounds.unwrap();
        assert_eq!(bounds.min, [0.0, 0.0, 5.0]);
        assert_eq!(bounds.max, [10.0, 10.0, 5.0]);
    }

    #[test]
    fn test_filter_picks_extremum() {
        let mut up = plane(0.0, 0.0, 4.0, 4.0, 1.0);
        up.extend(plane(0.0, 0.0, 4.0, 4.0, 3.0));
        let down = flipped(&up);

        let top = rasterize(&up, 1.0, FaceFilter::UpwardFacing, None).unwrap();
        assert!(top.points.chunks_exact(3).all(|p| p[2] == 3.0));

        let bottom = rasterize(&down, 1.0, FaceFilter::DownwardFacing, None).unwrap();
        assert!(bottom.points.chunks_exact(3).all(|p| p[2] == 1.0));

        // Downward triangles are invisible to the terrain filter.
        let none = rasterize(&down, 1.0, FaceFilter::UpwardFacing, None).unwrap();
        assert!(none.points.is_empty());
        assert!(none.bounds.is_none());
    }

    #[test]
    fn test_empty_and_malformed_input() {
        let out = rasterize(&[], 1.0, FaceFilter::UpwardFacing, None).unwrap();
        assert!(out.points.is_empty());
        assert!(rasterize(&[0.0; 8], 1.0, FaceFilter::UpwardFacing, None).is_err());
        assert!(rasterize(&plane(0.0, 0.0, 1.0, 1.0, 0.0), -1.0, FaceFilter::None, None).is_err());
    }

    #[test]
    fn test_bounds_override() {
        let tris = plane(0.0, 0.0, 10.0, 10.0, 2.0);
        let clipped = Aabb::new([2.0, 2.0, 0.0], [4.0, 6.0, 0.0]);
        let out = rasterize(&tris, 1.0, FaceFilter::UpwardFacing, Some(clipped)).unwrap();
        assert_eq!(out.point_count(), 3 * 5);

        let inverted = Aabb::new([4.0, 2.0, 0.0], [2.0, 6.0, 0.0]);
        assert!(rasterize(&tris, 1.0, FaceFilter::UpwardFacing, Some(inverted)).is_err());

        let outside = Aabb::new([20.0, 20.0, 0.0], [30.0, 30.0, 0.0]);
        let out = rasterize(&tris, 1.0, FaceFilter::UpwardFacing, Some(outside)).unwrap();
        assert!(out.points.is_empty());
    }

    #[test]
    fn test_window_matches_full_map() {
        let mut tris = plane(0.0, 0.0, 20.0, 20.0, 0.0);
        // A ramp on top of part of the plane.
        tris.extend_from_slice(&[5.0, 5.0, 1.0, 15.0, 5.0, 3.0, 15.0, 15.0, 7.0]);
        let mesh = Mesh::from_flat(&tris).unwrap();
        let grid = lattice_for(&mesh, 0.5, None).unwrap().unwrap();
        let full = rasterize_height_map(&mesh, FaceFilter::UpwardFacing, &grid);

        let rect = GridRect::new(7, 9, 30, 33);
        let window = rasterize_window(&mesh, FaceFilter::UpwardFacing, &grid, &rect);
        assert_eq!(window, full.window(&rect));
    }

    #[test]
    fn test_parallel_windows_cover_lattice() {
        let width = (WINDOW_SIZE + 40) as f32;
        let mesh = Mesh::from_flat(&plane(0.0, 0.0, width, 12.0, 4.0)).unwrap();
        let grid = lattice_for(&mesh, 1.0, None).unwrap().unwrap();
        let map = rasterize_height_map(&mesh, FaceFilter::UpwardFacing, &grid);
        assert_eq!(map.width(), WINDOW_SIZE + 41);
        assert_eq!(map.occupied(), map.width() * map.height());
        assert_eq!(map.min_z(), 4.0);

        let again = rasterize_height_map(&mesh, FaceFilter::UpwardFacing, &grid);
        assert_eq!(map, again);
    }

    #[test]
    fn test_region_is_window_of_full() {
        let mesh = Mesh::from_flat(&plane(0.0, 0.0, 300.0, 4.0, 1.5)).unwrap();
        let grid = lattice_for(&mesh, 1.0, None).unwrap().unwrap();
        let full = rasterize_height_map(&mesh, FaceFilter::UpwardFacing, &grid);
        let rect = GridRect::new(250, 1, 290, 4);
        assert_eq!(rasterize_region(&mesh, FaceFilter::UpwardFacing, &grid, &rect), full.window(&rect));
    }
}
