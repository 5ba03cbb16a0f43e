//! Generated path buffers.

use heightcut_raster::SparseTool;
use serde::{Deserialize, Serialize};

use crate::dispatch::{DispatchState, DispatchTracker};

/// How a path was produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationReport {
    /// Backend that solved the job.
    pub backend: String,
    /// Tiles (planar) or angle batches (radial).
    pub tiles: usize,
    /// Launches submitted.
    pub dispatches: usize,
    /// Final dispatch state.
    pub state: DispatchState,
    /// Cells of the dense tool grid.
    pub dense_tool_cells: usize,
    /// Tool samples after compaction.
    pub sparse_tool_cells: usize,
}

impl GenerationReport {
    pub(crate) fn new(backend: &str, tiles: usize, tool: &SparseTool, tracker: &DispatchTracker) -> Self {
        Self {
            backend: backend.to_string(),
            tiles,
            dispatches: tracker.dispatches(),
            state: tracker.state(),
            dense_tool_cells: tool.dense_cells(),
            sparse_tool_cells: tool.count(),
        }
    }
}

/// Tool-center heights of a planar scan, row-major by scanline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolPath {
    /// `scanlines * points_per_line` heights.
    pub data: Vec<f32>,
    /// Number of scanlines.
    pub scanlines: usize,
    /// Points per scanline.
    pub points_per_line: usize,
    /// Generation details.
    pub report: GenerationReport,
}

impl ToolPath {
    pub(crate) fn empty(report: GenerationReport) -> Self {
        Self {
            data: Vec::new(),
            scanlines: 0,
            points_per_line: 0,
            report,
        }
    }

    /// Height at point `i` of scanline `j`.
    pub fn get(&self, i: usize, j: usize) -> Option<f32> {
        if i < self.points_per_line && j < self.scanlines {
            Some(self.data[j * self.points_per_line + i])
        } else {
            None
        }
    }

    /// True if no points were generated.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// One scanline.
    pub fn scanline(&self, j: usize) -> &[f32] {
        &self.data[j * self.points_per_line..(j + 1) * self.points_per_line]
    }
}

/// Tool-center heights of a rotary scan, one row per angle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RadialToolPath {
    /// `rotations * points_per_line` heights, angle-major.
    pub data: Vec<f32>,
    /// Number of angles.
    pub rotations: usize,
    /// Points per angle along X.
    pub points_per_line: usize,
    /// Degrees between rows.
    pub angle_step_deg: f32,
    /// Generation details.
    pub report: GenerationReport,
}

impl RadialToolPath {
    /// Height at point `i` of rotation `r`.
    pub fn get(&self, i: usize, r: usize) -> Option<f32> {
        if i < self.points_per_line && r < self.rotations {
            Some(self.data[r * self.points_per_line + i])
        } else {
            None
        }
    }

    /// True if no points were generated.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Angle of rotation `r` in degrees.
    pub fn angle_deg(&self, r: usize) -> f32 {
        r as f32 * self.angle_step_deg
    }
}
