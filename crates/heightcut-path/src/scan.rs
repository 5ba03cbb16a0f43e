//! Output sampling grids in terrain-index space.

use heightcut_raster::{Aabb, GridRect, GridSpec};
use serde::{Deserialize, Serialize};

use crate::error::{PathError, Result};

/// Tool-center positions of a planar job.
///
/// Output point `(i, j)` sits on terrain cell
/// `(origin[0] + i * step[0], origin[1] + j * step[1])`. The origin may lie
/// outside the terrain when the scan bounds are larger than the terrain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanGrid {
    /// Terrain cell of output point (0, 0).
    pub origin: [i64; 2],
    /// Terrain cells between output points along X and Y.
    pub step: [u32; 2],
    /// Output points per scanline.
    pub points_per_line: usize,
    /// Number of scanlines.
    pub scanlines: usize,
}

impl ScanGrid {
    /// Scan covering `bounds` (or the whole terrain) every `x_step`/`y_step` cells.
    pub fn new(terrain: &GridSpec, x_step: u32, y_step: u32, bounds: Option<Aabb>) -> Result<Self> {
        if x_step == 0 || y_step == 0 {
            return Err(PathError::InvalidSettings(
                "x_step and y_step must be at least 1".into(),
            ));
        }

        let (x0, y0, x1, y1) = match bounds {
            Some(b) => {
                b.validate_xy()?;
                let (x0, y0) = terrain.index_of(b.min[0], b.min[1]);
                let (x1, y1) = terrain.index_of(b.max[0], b.max[1]);
                (x0, y0, x1, y1)
            }
            None => (0, 0, terrain.width as i64 - 1, terrain.height as i64 - 1),
        };

        Ok(Self {
            origin: [x0, y0],
            step: [x_step, y_step],
            points_per_line: samples(x0, x1, x_step),
            scanlines: samples(y0, y1, y_step),
        })
    }

    /// Number of output values.
    pub fn len(&self) -> usize {
        self.points_per_line * self.scanlines
    }

    /// True if the scan has no points.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Terrain cell under output point (i, j).
    #[inline]
    pub fn center(&self, i: i64, j: i64) -> (i64, i64) {
        (
            self.origin[0] + i * self.step[0] as i64,
            self.origin[1] + j * self.step[1] as i64,
        )
    }

    /// The output domain as a rectangle.
    pub fn output_rect(&self) -> GridRect {
        GridRect::new(0, 0, self.points_per_line as i64, self.scanlines as i64)
    }

    /// Terrain cells holding the tool centers of an output rectangle.
    pub fn centers_rect(&self, out: &GridRect) -> GridRect {
        if out.is_empty() {
            return GridRect::new(0, 0, 0, 0);
        }
        let (x0, y0) = self.center(out.x0, out.y0);
        let (x1, y1) = self.center(out.x1 - 1, out.y1 - 1);
        GridRect::new(x0, y0, x1 + 1, y1 + 1)
    }

    /// The scan of an output sub-rectangle against a terrain window whose
    /// first cell is `window.x0, window.y0`.
    pub fn restrict(&self, out: &GridRect, window: &GridRect) -> ScanGrid {
        let (cx, cy) = self.center(out.x0, out.y0);
        ScanGrid {
            origin: [cx - window.x0, cy - window.y0],
            step: self.step,
            points_per_line: out.width(),
            scanlines: out.height(),
        }
    }
}

fn samples(first: i64, last: i64, step: u32) -> usize {
    if last < first {
        0
    } else {
        ((last - first) / step as i64 + 1) as usize
    }
}
