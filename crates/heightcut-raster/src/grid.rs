//! Bounding boxes and lattice geometry shared by every grid in the pipeline.

use serde::{Deserialize, Serialize};

use crate::error::{RasterError, Result};

/// Axis-aligned bounding box in world space (mm).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    /// Minimum corner [x, y, z].
    pub min: [f32; 3],
    /// Maximum corner [x, y, z].
    pub max: [f32; 3],
}

impl Aabb {
    /// Create a bounding box from its corners.
    pub fn new(min: [f32; 3], max: [f32; 3]) -> Self {
        Self { min, max }
    }

    /// An inverted box that any included point will replace.
    pub fn empty() -> Self {
        Self {
            min: [f32::INFINITY; 3],
            max: [f32::NEG_INFINITY; 3],
        }
    }

    /// Grow the box to contain `p`.
    pub fn include(&mut self, p: [f32; 3]) {
        for axis in 0..3 {
            self.min[axis] = self.min[axis].min(p[axis]);
            self.max[axis] = self.max[axis].max(p[axis]);
        }
    }

    /// Bounds of a flat xyz point buffer, or `None` if it holds no points.
    pub fn from_points(points: &[f32]) -> Option<Self> {
        let mut bounds = Self::empty();
        for p in points.chunks_exact(3) {
            bounds.include([p[0], p[1], p[2]]);
        }
        (!bounds.is_empty()).then_some(bounds)
    }

    /// True if no point has been included.
    pub fn is_empty(&self) -> bool {
        self.min[0] > self.max[0]
    }

    /// Reject boxes that are empty or inverted on X or Y.
    ///
    /// Z is not checked: a flat terrain has `min.z == max.z`.
    pub fn validate_xy(&self) -> Result<()> {
        for (axis, name) in [(0, "x"), (1, "y")] {
            // Written as a negated comparison so NaN bounds are rejected too.
            if !(self.min[axis] < self.max[axis]) {
                return Err(RasterError::InvalidBounds {
                    axis: name,
                    min: self.min[axis],
                    max: self.max[axis],
                });
            }
        }
        Ok(())
    }

    /// Check overlap with a 2D box laid out as [min_x, max_x, min_y, max_y].
    pub fn overlaps_xy(&self, bbox: [f32; 4]) -> bool {
        !(bbox[1] < self.min[0]
            || bbox[0] > self.max[0]
            || bbox[3] < self.min[1]
            || bbox[2] > self.max[1])
    }
}

/// A regular XY lattice anchored at (`min_x`, `min_y`).
///
/// World coordinates are always derived as `min + index * step` from the
/// global lattice, never re-derived from a window's own origin, so windows and
/// tiles sample bit-identical positions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    /// X coordinate of column 0.
    pub min_x: f32,
    /// Y coordinate of row 0.
    pub min_y: f32,
    /// Sample spacing (mm).
    pub step: f32,
    /// Number of columns.
    pub width: usize,
    /// Number of rows.
    pub height: usize,
}

impl GridSpec {
    /// Lattice covering `bounds` with `round((max - min) / step) + 1` samples per axis.
    pub fn from_bounds(bounds: &Aabb, step: f32) -> Result<Self> {
        check_step(step)?;
        Ok(Self {
            min_x: bounds.min[0],
            min_y: bounds.min[1],
            step,
            width: samples_along(bounds.min[0], bounds.max[0], step),
            height: samples_along(bounds.min[1], bounds.max[1], step),
        })
    }

    /// World X of column `gx`.
    #[inline]
    pub fn x_at(&self, gx: i64) -> f32 {
        self.min_x + gx as f32 * self.step
    }

    /// World Y of row `gy`.
    #[inline]
    pub fn y_at(&self, gy: i64) -> f32 {
        self.min_y + gy as f32 * self.step
    }

    /// Nearest lattice index of a world position.
    #[inline]
    pub fn index_of(&self, x: f32, y: f32) -> (i64, i64) {
        (
            ((x - self.min_x) / self.step).round() as i64,
            ((y - self.min_y) / self.step).round() as i64,
        )
    }

    /// The whole lattice as a rectangle.
    pub fn rect(&self) -> GridRect {
        GridRect::new(0, 0, self.width as i64, self.height as i64)
    }

    /// Total number of samples.
    pub fn cell_count(&self) -> usize {
        self.width * self.height
    }

    /// World-space XY bounds of a window (z left unbounded).
    pub fn world_bounds(&self, rect: &GridRect) -> Aabb {
        Aabb::new(
            [self.x_at(rect.x0), self.y_at(rect.y0), f32::NEG_INFINITY],
            [self.x_at(rect.x1 - 1), self.y_at(rect.y1 - 1), f32::INFINITY],
        )
    }

    /// The lattice describing a window of this one.
    pub fn window(&self, rect: &GridRect) -> GridSpec {
        GridSpec {
            min_x: self.x_at(rect.x0),
            min_y: self.y_at(rect.y0),
            step: self.step,
            width: rect.width(),
            height: rect.height(),
        }
    }
}

pub(crate) fn check_step(step: f32) -> Result<()> {
    if step > 0.0 && step.is_finite() {
        Ok(())
    } else {
        Err(RasterError::InvalidStep(step))
    }
}

fn samples_along(min: f32, max: f32, step: f32) -> usize {
    let n = ((max - min) / step).round();
    if n.is_finite() && n > 0.0 {
        n as usize + 1
    } else {
        1
    }
}

/// Half-open rectangle `[x0, x1) x [y0, y1)` in lattice-index space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridRect {
    /// First column.
    pub x0: i64,
    /// First row.
    pub y0: i64,
    /// One past the last column.
    pub x1: i64,
    /// One past the last row.
    pub y1: i64,
}

impl GridRect {
    /// Create a rectangle from its corners.
    pub fn new(x0: i64, y0: i64, x1: i64, y1: i64) -> Self {
        Self { x0, y0, x1, y1 }
    }

    /// Number of columns (0 if empty).
    pub fn width(&self) -> usize {
        (self.x1 - self.x0).max(0) as usize
    }

    /// Number of rows (0 if empty).
    pub fn height(&self) -> usize {
        (self.y1 - self.y0).max(0) as usize
    }

    /// Number of cells.
    pub fn cell_count(&self) -> usize {
        self.width() * self.height()
    }

    /// True if the rectangle covers no cells.
    pub fn is_empty(&self) -> bool {
        self.x1 <= self.x0 || self.y1 <= self.y0
    }

    /// Check whether a cell lies inside.
    pub fn contains(&self, x: i64, y: i64) -> bool {
        x >= self.x0 && x < self.x1 && y >= self.y0 && y < self.y1
    }

    /// Overlap of two rectangles (possibly empty).
    pub fn intersect(&self, other: &GridRect) -> GridRect {
        GridRect::new(
            self.x0.max(other.x0),
            self.y0.max(other.y0),
            self.x1.min(other.x1),
            self.y1.min(other.y1),
        )
    }

    /// Grow each edge outward by the given number of cells.
    pub fn expand(&self, left: i64, right: i64, bottom: i64, top: i64) -> GridRect {
        GridRect::new(self.x0 - left, self.y0 - bottom, self.x1 + right, self.y1 + top)
    }

    /// Split into windows of at most `size` cells per side, each grown by
    /// `overlap` on every edge and clipped back to `self`.
    pub fn overlapping_windows(&self, size: usize, overlap: usize) -> Vec<GridRect> {
        let size = size.max(1) as i64;
        let overlap = overlap as i64;
        let mut windows = Vec::new();
        let mut y = self.y0;
        while y < self.y1 {
            let mut x = self.x0;
            while x < self.x1 {
                let core = GridRect::new(x, y, (x + size).min(self.x1), (y + size).min(self.y1));
                windows.push(core.expand(overlap, overlap, overlap, overlap).intersect(self));
                x += size;
            }
            y += size;
        }
        windows
    }
}
