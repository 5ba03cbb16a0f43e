//! Sparse tool model.
//!
//! A tool only touches a fraction of its bounding square (a ball nose or a
//! v-bit), and the collision solver is linear in tool samples, so the dense
//! tool grid is compacted into parallel offset arrays.

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::error::{RasterError, Result};
use crate::grid::{check_step, Aabb, GridSpec};
use crate::heightmap::{is_empty_z, HeightMap};
use crate::triangle::Extremum;

/// Tool samples relative to the tool's grid center and tip.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SparseTool {
    x_offsets: Vec<i32>,
    y_offsets: Vec<i32>,
    z_offsets: Vec<f32>,
    grid_width: usize,
    grid_height: usize,
}

impl SparseTool {
    /// Compact a dense tool height map.
    ///
    /// The lowest Z becomes the tip (offset 0); X/Y offsets are relative to
    /// cell `(width / 2, height / 2)`.
    pub fn from_height_map(map: &HeightMap) -> Self {
        let (w, h) = (map.width(), map.height());
        let tip = map.min_z();
        let (cx, cy) = ((w / 2) as i32, (h / 2) as i32);

        let mut tool = SparseTool {
            grid_width: w,
            grid_height: h,
            ..Default::default()
        };
        for gy in 0..h {
            for gx in 0..w {
                let z = map.heights()[map.index(gx, gy)];
                if is_empty_z(z) {
                    continue;
                }
                tool.x_offsets.push(gx as i32 - cx);
                tool.y_offsets.push(gy as i32 - cy);
                tool.z_offsets.push(z - tip);
            }
        }
        tool
    }

    /// Number of samples.
    pub fn count(&self) -> usize {
        self.z_offsets.len()
    }

    /// True if the tool has no samples.
    pub fn is_empty(&self) -> bool {
        self.z_offsets.is_empty()
    }

    /// Column offsets from the tool center.
    pub fn x_offsets(&self) -> &[i32] {
        &self.x_offsets
    }

    /// Row offsets from the tool center.
    pub fn y_offsets(&self) -> &[i32] {
        &self.y_offsets
    }

    /// Heights above the tip.
    pub fn z_offsets(&self) -> &[f32] {
        &self.z_offsets
    }

    /// Iterate samples as (dx, dy, dz).
    pub fn iter(&self) -> impl Iterator<Item = (i32, i32, f32)> + '_ {
        self.x_offsets
            .iter()
            .zip(&self.y_offsets)
            .zip(&self.z_offsets)
            .map(|((&dx, &dy), &dz)| (dx, dy, dz))
    }

    /// Width of the dense grid the tool was compacted from.
    pub fn grid_width(&self) -> usize {
        self.grid_width
    }

    /// Height of the dense grid the tool was compacted from.
    pub fn grid_height(&self) -> usize {
        self.grid_height
    }

    /// Cells in the dense tool grid.
    pub fn dense_cells(&self) -> usize {
        self.grid_width * self.grid_height
    }

    /// Largest |dx| and |dy| over all samples, in cells.
    pub fn reach(&self) -> (usize, usize) {
        let rx = self.x_offsets.iter().map(|d| d.unsigned_abs()).max().unwrap_or(0);
        let ry = self.y_offsets.iter().map(|d| d.unsigned_abs()).max().unwrap_or(0);
        (rx as usize, ry as usize)
    }
}

/// Build a sparse tool from the xyz points of its lower surface.
///
/// Points sharing a cell keep the lowest Z. No points yields an empty tool.
pub fn build_sparse_tool(tool_points: &[f32], step: f32) -> Result<SparseTool> {
    if tool_points.len() % 3 != 0 {
        return Err(RasterError::MalformedPoints(tool_points.len()));
    }
    if tool_points.is_empty() {
        warn!("building sparse tool from zero points");
    }

    check_step(step)?;
    let map = match Aabb::from_points(tool_points) {
        Some(bounds) => {
            let mut map = HeightMap::empty(GridSpec::from_bounds(&bounds, step)?);
            map.ingest_points(tool_points, Extremum::Min);
            map
        }
        None => HeightMap::empty(GridSpec {
            min_x: 0.0,
            min_y: 0.0,
            step,
            width: 0,
            height: 0,
        }),
    };

    let tool = SparseTool::from_height_map(&map);
    debug!(
        "sparse tool: {} of {} cells ({}x{})",
        tool.count(),
        tool.dense_cells(),
        tool.grid_width(),
        tool.grid_height()
    );
    Ok(tool)
}
