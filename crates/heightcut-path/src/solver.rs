//! Tool/terrain collision solver (CPU reference).
//!
//! For a tool center, the safe tool-tip height is the smallest lift that
//! keeps every tool sample at or above the terrain under it:
//! `-min(dz - terrain_z)` over samples that land on terrain.

use std::ops::Range;

use heightcut_raster::{HeightMap, SparseTool};

use crate::scan::ScanGrid;

/// Highest non-penetrating tip height with the tool centered on cell (cx, cy).
///
/// Samples outside the terrain or on empty cells do not constrain the tool.
/// If none lands on terrain the result is `oob_z`, unchanged.
#[inline]
pub fn solve(terrain: &HeightMap, tool: &SparseTool, cx: i64, cy: i64, oob_z: f32) -> f32 {
    let mut min_delta = f32::MAX;
    let mut found = false;
    for (dx, dy, dz) in tool.iter() {
        if let Some(z) = terrain.get(cx + dx as i64, cy + dy as i64) {
            min_delta = min_delta.min(dz - z);
            found = true;
        }
    }
    if found {
        -min_delta
    } else {
        oob_z
    }
}

/// Solve a range of scanlines, row-major.
pub fn solve_rows(
    terrain: &HeightMap,
    tool: &SparseTool,
    scan: &ScanGrid,
    rows: Range<usize>,
    oob_z: f32,
) -> Vec<f32> {
    let mut out = Vec::with_capacity(rows.len() * scan.points_per_line);
    for j in rows {
        for i in 0..scan.points_per_line {
            let (cx, cy) = scan.center(i as i64, j as i64);
            out.push(solve(terrain, tool, cx, cy, oob_z));
        }
    }
    out
}

/// Solve along the centre row of a radial strip every `x_step` columns.
///
/// Only columns in `centers` become output points; the rest of the strip is
/// terrain the tool may still touch.
pub fn solve_strip(
    strip: &HeightMap,
    tool: &SparseTool,
    centers: Range<usize>,
    x_step: u32,
    oob_z: f32,
) -> Vec<f32> {
    let cy = (strip.height() / 2) as i64;
    centers
        .step_by(x_step.max(1) as usize)
        .map(|cx| solve(strip, tool, cx as i64, cy, oob_z))
        .collect()
}
