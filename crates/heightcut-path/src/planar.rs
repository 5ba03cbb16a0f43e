//! Planar (XY scan) path generation.

use std::borrow::Cow;

use heightcut_raster::{
    rasterize_height_map, rasterize_region, Aabb, FaceFilter, GridRect, GridSpec, HeightMap, Mesh,
    SparseTool,
};
use log::{info, warn};

use crate::dispatch::{tracked, ComputeBackend, DispatchTracker, PlanarJob};
use crate::error::{PathError, Result};
use crate::progress::{CancelToken, Progress};
use crate::scan::ScanGrid;
use crate::settings::TilingConfig;
use crate::tiling::{effective_limit, needs_tiling, plan_tiles, stitch, MemoryEstimate};
use crate::toolpath::{GenerationReport, ToolPath};

/// Where terrain heights come from.
#[derive(Debug, Clone, Copy)]
pub enum TerrainSource<'a> {
    /// An existing height map. Tiles copy windows out of it.
    Map(&'a HeightMap),
    /// A mesh sampled on `grid`. Tiles rasterize only their own window.
    Mesh {
        /// Terrain mesh.
        mesh: &'a Mesh,
        /// Faces that count as terrain.
        filter: FaceFilter,
        /// Global lattice.
        grid: GridSpec,
    },
}

impl TerrainSource<'_> {
    /// The terrain lattice.
    pub fn grid(&self) -> GridSpec {
        match self {
            TerrainSource::Map(map) => *map.grid(),
            TerrainSource::Mesh { grid, .. } => *grid,
        }
    }

    /// Occupied fraction, if known without rasterizing.
    pub fn density(&self) -> Option<f32> {
        match self {
            TerrainSource::Map(map) => Some(map.density()),
            TerrainSource::Mesh { .. } => None,
        }
    }

    /// True if there is no terrain to solve against.
    pub fn is_empty(&self) -> bool {
        match self {
            TerrainSource::Map(map) => map.grid().cell_count() == 0,
            TerrainSource::Mesh { mesh, grid, .. } => mesh.is_empty() || grid.cell_count() == 0,
        }
    }

    fn full(&self) -> Cow<'_, HeightMap> {
        match self {
            TerrainSource::Map(map) => Cow::Borrowed(*map),
            TerrainSource::Mesh { mesh, filter, grid } => {
                Cow::Owned(rasterize_height_map(mesh, *filter, grid))
            }
        }
    }

    fn window(&self, rect: &GridRect) -> HeightMap {
        match self {
            TerrainSource::Map(map) => map.window(rect),
            TerrainSource::Mesh { mesh, filter, grid } => rasterize_region(mesh, *filter, grid, rect),
        }
    }
}

/// Scan parameters of one planar request.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PlanarScan {
    pub x_step: u32,
    pub y_step: u32,
    pub oob_z: f32,
    pub bounds: Option<Aabb>,
}

/// Memory policy and cancellation for a request that may be tiled.
pub(crate) struct Budget<'a> {
    pub tiling: &'a TilingConfig,
    pub cancel: &'a CancelToken,
}

/// Solve a full height map in a single dispatch.
///
/// Tool centers run every `x_step`/`y_step` cells over `bounds` (or the whole
/// terrain). Points where the tool meets no terrain hold `oob_z`. An empty
/// terrain or tool yields an empty path.
pub fn generate_path(
    backend: &dyn ComputeBackend,
    terrain: &HeightMap,
    tool: &SparseTool,
    x_step: u32,
    y_step: u32,
    oob_z: f32,
    bounds: Option<Aabb>,
) -> Result<ToolPath> {
    let scan = PlanarScan {
        x_step,
        y_step,
        oob_z,
        bounds,
    };
    planar_path(backend, &TerrainSource::Map(terrain), tool, &scan, None, &mut |_| {})
}

pub(crate) fn planar_path(
    backend: &dyn ComputeBackend,
    terrain: &TerrainSource<'_>,
    tool: &SparseTool,
    params: &PlanarScan,
    budget: Option<Budget<'_>>,
    progress: &mut dyn FnMut(Progress),
) -> Result<ToolPath> {
    let grid = terrain.grid();
    let scan = ScanGrid::new(&grid, params.x_step, params.y_step, params.bounds)?;
    let mut tracker = DispatchTracker::new("planar");

    if terrain.is_empty() || tool.is_empty() || scan.is_empty() {
        warn!(
            "planar job is empty (terrain {}x{}, {} tool samples, {} scan points)",
            grid.width,
            grid.height,
            tool.count(),
            scan.len()
        );
        tracker.finish();
        return Ok(ToolPath::empty(GenerationReport::new(backend.name(), 0, tool, &tracker)));
    }

    let tile_limit = match &budget {
        Some(budget) => {
            let estimate = MemoryEstimate {
                terrain_cells: grid.cell_count() as u64,
                output_cells: scan.len() as u64,
                density: terrain.density(),
            };
            let limit = effective_limit(budget.tiling, backend.binding_limit());
            if !needs_tiling(&estimate, limit) {
                None
            } else if budget.tiling.auto_tiling {
                Some(limit)
            } else {
                return Err(PathError::Capacity {
                    what: "planar job",
                    requested: estimate.projected_bytes(),
                    limit,
                });
            }
        }
        None => None,
    };
    let cancel = budget.as_ref().map(|b| b.cancel);
    let min_tile = budget.as_ref().map_or(1, |b| b.tiling.min_tile_size);

    let (data, tiles) = tracked(&mut tracker, |tracker| {
        let Some(limit) = tile_limit else {
            if let Some(cancel) = cancel {
                cancel.check()?;
            }
            let map = terrain.full();
            let job = PlanarJob {
                terrain: &map,
                tool,
                scan,
                oob_z: params.oob_z,
            };
            let data = backend.solve_planar(&job, tracker)?;
            progress(Progress {
                completed: 1,
                total: 1,
            });
            return Ok((data, 1));
        };

        let plan = plan_tiles(&scan, &grid.rect(), tool.reach(), limit, min_tile)?;
        let total = plan.tiles.len();
        let mut out = vec![params.oob_z; scan.len()];
        for (n, tile) in plan.tiles.iter().enumerate() {
            if let Some(cancel) = cancel {
                cancel.check()?;
            }
            // No terrain within reach: the core stays at oob_z.
            if !tile.extended.is_empty() {
                let window = terrain.window(&tile.extended);
                let job = PlanarJob {
                    terrain: &window,
                    tool,
                    scan: scan.restrict(&tile.core, &tile.extended),
                    oob_z: params.oob_z,
                };
                let values = backend.solve_planar(&job, tracker)?;
                stitch(&mut out, scan.points_per_line, &tile.core, &values);
            }
            progress(Progress {
                completed: n + 1,
                total,
            });
        }
        Ok((out, total))
    })?;
    tracker.finish();

    info!(
        "planar path: {}x{} points, {} tile(s), {} dispatch(es) on {}",
        scan.points_per_line,
        scan.scanlines,
        tiles,
        tracker.dispatches(),
        backend.name()
    );

    Ok(ToolPath {
        data,
        scanlines: scan.scanlines,
        points_per_line: scan.points_per_line,
        report: GenerationReport::new(backend.name(), tiles, tool, &tracker),
    })
}
