//! Memory-bounded tiling of planar jobs.
//!
//! The output domain is split into square tiles of output points. Each tile
//! is solved against a terrain window holding every cell its tool centers can
//! reach, and only the tile's core is copied back, so the stitched result is
//! identical to a single pass.

use heightcut_raster::GridRect;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{PathError, Result};
use crate::scan::ScanGrid;
use crate::settings::TilingConfig;

/// Device bytes per terrain cell: height plus validity.
pub const TERRAIN_CELL_BYTES: u64 = 8;

/// Device bytes per output point.
pub const OUTPUT_CELL_BYTES: u64 = 4;

/// Below this occupancy tiling is skipped: most tiles would be empty.
pub const MIN_TILING_DENSITY: f32 = 0.3;

/// Projected size of a planar job.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MemoryEstimate {
    /// Terrain cells uploaded.
    pub terrain_cells: u64,
    /// Output points produced.
    pub output_cells: u64,
    /// Occupied fraction of the terrain, when known.
    pub density: Option<f32>,
}

impl MemoryEstimate {
    /// Bytes the job would need in one pass.
    pub fn projected_bytes(&self) -> u64 {
        self.terrain_cells * TERRAIN_CELL_BYTES + self.output_cells * OUTPUT_CELL_BYTES
    }
}

/// Usable bytes per dispatch: the smaller of the budget and the backend's
/// binding limit, scaled by the safety margin.
pub fn effective_limit(config: &TilingConfig, binding_limit: Option<u64>) -> u64 {
    let cap = binding_limit.map_or(config.memory_budget_bytes, |limit| {
        limit.min(config.memory_budget_bytes)
    });
    (cap as f64 * config.safety_margin as f64) as u64
}

/// Whether a job must be split to fit `limit`.
pub fn needs_tiling(estimate: &MemoryEstimate, limit: u64) -> bool {
    if estimate.projected_bytes() <= limit {
        return false;
    }
    match estimate.density {
        Some(density) if density < MIN_TILING_DENSITY => {
            debug!("terrain density {density:.2} too low to tile");
            false
        }
        _ => true,
    }
}

/// One unit of tiled work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tile {
    /// Output points this tile owns. Cores never overlap.
    pub core: GridRect,
    /// Terrain cells the core's tool centers can reach, clipped to the terrain.
    pub extended: GridRect,
}

/// Tiles covering a scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TilePlan {
    /// Tile side in output points.
    pub tile_size: usize,
    /// Tiles in row-major order.
    pub tiles: Vec<Tile>,
}

/// Projected bytes of a `size` x `size` tile.
pub fn tile_bytes(size: usize, step: [u32; 2], reach: (usize, usize)) -> u64 {
    let size = size as u64;
    let span = |step: u32, reach: usize| size.saturating_sub(1) * step as u64 + 1 + 2 * reach as u64;
    span(step[0], reach.0) * span(step[1], reach.1) * TERRAIN_CELL_BYTES
        + size * size * OUTPUT_CELL_BYTES
}

/// Pick the largest square tile that fits `limit` and split the scan.
///
/// `terrain` is the full terrain rectangle; `reach` the tool's largest
/// offsets from its center.
pub fn plan_tiles(
    scan: &ScanGrid,
    terrain: &GridRect,
    reach: (usize, usize),
    limit: u64,
    min_tile_size: usize,
) -> Result<TilePlan> {
    let min_size = min_tile_size.max(1);
    let smallest = tile_bytes(min_size, scan.step, reach);
    if smallest > limit {
        return Err(PathError::Capacity {
            what: "minimum tile",
            requested: smallest,
            limit,
        });
    }

    let out = scan.output_rect();
    let max_size = out.width().max(out.height()).max(min_size);

    // Largest size in [min_size, max_size] that fits.
    let (mut lo, mut hi) = (min_size, max_size);
    while lo < hi {
        let mid = lo + (hi - lo).div_ceil(2);
        if tile_bytes(mid, scan.step, reach) <= limit {
            lo = mid;
        } else {
            hi = mid - 1;
        }
    }
    let tile_size = lo;

    let (rx, ry) = (reach.0 as i64, reach.1 as i64);
    let tiles: Vec<Tile> = out
        .overlapping_windows(tile_size, 0)
        .into_iter()
        .map(|core| Tile {
            core,
            extended: scan
                .centers_rect(&core)
                .expand(rx, rx, ry, ry)
                .intersect(terrain),
        })
        .collect();

    debug!(
        "tile plan: {} tiles of {}x{} points ({} bytes each, limit {})",
        tiles.len(),
        tile_size,
        tile_size,
        tile_bytes(tile_size, scan.step, reach),
        limit
    );

    Ok(TilePlan { tile_size, tiles })
}

/// Copy a tile's core results into the row-major output of width `out_width`.
pub fn stitch(out: &mut [f32], out_width: usize, core: &GridRect, values: &[f32]) {
    let width = core.width();
    debug_assert_eq!(values.len(), core.cell_count());
    for (row, src) in values.chunks_exact(width.max(1)).enumerate() {
        let start = (core.y0 as usize + row) * out_width + core.x0 as usize;
        out[start..start + width].copy_from_slice(src);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use heightcut_raster::GridSpec;

    fn config(budget: u64) -> TilingConfig {
        TilingConfig {
            memory_budget_bytes: budget,
            safety_margin: 0.5,
            min_tile_size: 4,
            auto_tiling: true,
        }
    }

    fn scan(w: usize, h: usize) -> ScanGrid {
        let grid = GridSpec {
            min_x: 0.0,
            min_y: 0.0,
            step: 1.0,
            width: w,
            height: h,
        };
        ScanGrid::new(&grid, 1, 1, None).unwrap()
    }

    #[test]
    fn test_effective_limit() {
        assert_eq!(effective_limit(&config(1000), None), 500);
        assert_eq!(effective_limit(&config(1000), Some(400)), 200);
        assert_eq!(effective_limit(&config(1000), Some(4000)), 500);
    }

    #[test]
    fn test_needs_tiling() {
        let estimate = MemoryEstimate {
            terrain_cells: 100,
            output_cells: 100,
            density: None,
        };
        assert_eq!(estimate.projected_bytes(), 1200);
        assert!(!needs_tiling(&estimate, 1200));
        assert!(needs_tiling(&estimate, 1199));

        let sparse = MemoryEstimate {
            density: Some(0.1),
            ..estimate
        };
        assert!(!needs_tiling(&sparse, 10));
        let dense = MemoryEstimate {
            density: Some(0.9),
            ..estimate
        };
        assert!(needs_tiling(&dense, 10));
    }

    #[test]
    fn test_tile_bytes() {
        // 1x1 tile, no reach: one terrain cell and one output point.
        assert_eq!(tile_bytes(1, [1, 1], (0, 0)), 12);
        // 4x4 tile, step 2, reach 1: terrain span 3*2+1+2 = 9.
        assert_eq!(tile_bytes(4, [2, 2], (1, 1)), 9 * 9 * 8 + 16 * 4);
    }

    #[test]
    fn test_plan_covers_output_once() {
        let scan = scan(50, 37);
        let terrain = GridRect::new(0, 0, 50, 37);
        let limit = tile_bytes(12, scan.step, (2, 2));
        let plan = plan_tiles(&scan, &terrain, (2, 2), limit, 4).unwrap();
        assert_eq!(plan.tile_size, 12);

        let mut hits = vec![0u8; scan.len()];
        for tile in &plan.tiles {
            for y in tile.core.y0..tile.core.y1 {
                for x in tile.core.x0..tile.core.x1 {
                    hits[y as usize * 50 + x as usize] += 1;
                }
            }
            assert_eq!(tile.extended, tile.extended.intersect(&terrain));
        }
        assert!(hits.iter().all(|&h| h == 1));
    }

    #[test]
    fn test_extended_region_adds_reach() {
        let scan = scan(40, 40);
        let terrain = GridRect::new(0, 0, 40, 40);
        let limit = tile_bytes(10, scan.step, (3, 1));
        let plan = plan_tiles(&scan, &terrain, (3, 1), limit, 4).unwrap();
        let interior = plan
            .tiles
            .iter()
            .find(|t| t.core == GridRect::new(10, 10, 20, 20))
            .unwrap();
        assert_eq!(interior.extended, GridRect::new(7, 9, 23, 21));
        // Exterior edges are clipped to the terrain.
        assert_eq!(plan.tiles[0].extended, GridRect::new(0, 0, 13, 11));
    }

    #[test]
    fn test_minimum_tile_must_fit() {
        let scan = scan(100, 100);
        let terrain = GridRect::new(0, 0, 100, 100);
        let err = plan_tiles(&scan, &terrain, (5, 5), 100, 8).unwrap_err();
        assert!(matches!(
            err,
            PathError::Capacity {
                what: "minimum tile",
                limit: 100,
                ..
            }
        ));
    }

    #[test]
    fn test_stitch_places_core() {
        let mut out = vec![0.0; 5 * 4];
        let core = GridRect::new(1, 2, 4, 4);
        stitch(&mut out, 5, &core, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(&out[10..15], &[0.0, 1.0, 2.0, 3.0, 0.0]);
        assert_eq!(&out[15..20], &[0.0, 4.0, 5.0, 6.0, 0.0]);
        assert!(out[..10].iter().all(|&v| v == 0.0));
    }
}
