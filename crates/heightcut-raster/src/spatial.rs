//! Uniform-grid spatial indices for ray candidate lookup.
//!
//! Both indices store their cells in CSR form (a start offset per cell plus
//! one flat triangle-index array) so they can be uploaded to a GPU as-is.

use crate::grid::Aabb;
use crate::triangle::{FaceFilter, Triangle};

/// Preferred cell edge length (mm).
pub const TARGET_CELL_SIZE: f32 = 5.0;

/// Minimum cells per axis.
pub const MIN_RESOLUTION: usize = 10;

/// Maximum cells per axis.
pub const MAX_RESOLUTION: usize = 100;

fn resolution_for(extent: f32) -> usize {
    let cells = (extent / TARGET_CELL_SIZE).ceil();
    let cells = if cells.is_finite() && cells > 0.0 { cells as usize } else { 0 };
    cells.clamp(MIN_RESOLUTION, MAX_RESOLUTION)
}

/// One axis of a uniform grid.
#[derive(Debug, Clone, Copy)]
struct Axis {
    origin: f32,
    cell: f32,
    res: usize,
}

impl Axis {
    fn new(min: f32, max: f32) -> Self {
        let extent = (max - min).max(0.0);
        let res = resolution_for(extent);
        let cell = if extent > 0.0 { extent / res as f32 } else { 1.0 };
        Self {
            origin: min,
            cell,
            res,
        }
    }

    /// Containing cell, clamped to the grid.
    #[inline]
    fn cell_of(&self, v: f32) -> usize {
        let c = ((v - self.origin) / self.cell).floor() as i64;
        c.clamp(0, self.res as i64 - 1) as usize
    }
}

/// Flat cell -> triangle-index table.
#[derive(Debug, Clone, Default)]
struct Csr {
    start: Vec<u32>,
    indices: Vec<u32>,
}

impl Csr {
    /// `spans` holds (triangle, [x0, x1, y0, y1]) with inclusive cell ranges.
    fn build(res_x: usize, cells: usize, spans: &[(u32, [usize; 4])]) -> Self {
        let mut start = vec![0u32; cells + 1];
        for (_, [x0, x1, y0, y1]) in spans {
            for y in *y0..=*y1 {
                for x in *x0..=*x1 {
                    start[y * res_x + x + 1] += 1;
                }
            }
        }
        for i in 0..cells {
            start[i + 1] += start[i];
        }

        let mut cursor = start.clone();
        let mut indices = vec![0u32; start[cells] as usize];
        for (tri, [x0, x1, y0, y1]) in spans {
            for y in *y0..=*y1 {
                for x in *x0..=*x1 {
                    let cell = y * res_x + x;
                    indices[cursor[cell] as usize] = *tri;
                    cursor[cell] += 1;
                }
            }
        }

        Self { start, indices }
    }

    #[inline]
    fn cell(&self, cell: usize) -> &[u32] {
        &self.indices[self.start[cell] as usize..self.start[cell + 1] as usize]
    }
}

/// 2D grid over XY binning triangles by their bounding boxes.
#[derive(Debug, Clone)]
pub struct SpatialGrid {
    x: Axis,
    y: Axis,
    table: Csr,
    triangle_count: usize,
}

impl SpatialGrid {
    /// Bin every triangle accepted by `filter` whose bbox overlaps `bounds`.
    ///
    /// A triangle lands in every cell its bbox touches, so lookups are
    /// conservative.
    pub fn build(triangles: &[Triangle], filter: FaceFilter, bounds: &Aabb) -> Self {
        let x = Axis::new(bounds.min[0], bounds.max[0]);
        let y = Axis::new(bounds.min[1], bounds.max[1]);

        let spans: Vec<(u32, [usize; 4])> = triangles
            .iter()
            .enumerate()
            .filter(|(_, tri)| filter.accepts(tri.normal_z) && bounds.overlaps_xy(tri.bbox))
            .map(|(i, tri)| {
                (
                    i as u32,
                    [
                        x.cell_of(tri.bbox[0]),
                        x.cell_of(tri.bbox[1]),
                        y.cell_of(tri.bbox[2]),
                        y.cell_of(tri.bbox[3]),
                    ],
                )
            })
            .collect();

        let table = Csr::build(x.res, x.res * y.res, &spans);
        Self {
            x,
            y,
            table,
            triangle_count: spans.len(),
        }
    }

    /// Triangles that may cover the sample (x, y).
    #[inline]
    pub fn candidates(&self, x: f32, y: f32) -> &[u32] {
        self.table
            .cell(self.y.cell_of(y) * self.x.res + self.x.cell_of(x))
    }

    /// Cells per axis.
    pub fn resolution(&self) -> [usize; 2] {
        [self.x.res, self.y.res]
    }

    /// Cell edge lengths.
    pub fn cell_size(&self) -> [f32; 2] {
        [self.x.cell, self.y.cell]
    }

    /// Number of distinct triangles binned.
    pub fn triangle_count(&self) -> usize {
        self.triangle_count
    }

    /// Total cell entries, counting duplicates across cells.
    pub fn entry_count(&self) -> usize {
        self.table.indices.len()
    }
}

/// 1D grid over X for rays that keep X constant (radial sampling).
#[derive(Debug, Clone)]
pub struct XBuckets {
    x: Axis,
    table: Csr,
}

impl XBuckets {
    /// Bin every triangle by its X extent.
    pub fn build(triangles: &[Triangle], min_x: f32, max_x: f32) -> Self {
        let x = Axis::new(min_x, max_x);
        let spans: Vec<(u32, [usize; 4])> = triangles
            .iter()
            .enumerate()
            .filter(|(_, tri)| !(tri.bbox[1] < min_x || tri.bbox[0] > max_x))
            .map(|(i, tri)| (i as u32, [x.cell_of(tri.bbox[0]), x.cell_of(tri.bbox[1]), 0, 0]))
            .collect();
        let table = Csr::build(x.res, x.res, &spans);
        Self { x, table }
    }

    /// Triangles whose X extent may contain `x`.
    #[inline]
    pub fn candidates(&self, x: f32) -> &[u32] {
        self.table.cell(self.x.cell_of(x))
    }

    /// X of the first bucket edge.
    pub fn min_x(&self) -> f32 {
        self.x.origin
    }

    /// Bucket width.
    pub fn bucket_width(&self) -> f32 {
        self.x.cell
    }

    /// Number of buckets.
    pub fn bucket_count(&self) -> usize {
        self.x.res
    }

    /// CSR start offsets (`bucket_count + 1` entries).
    pub fn offsets(&self) -> &[u32] {
        &self.table.start
    }

    /// CSR triangle indices.
    pub fn indices(&self) -> &[u32] {
        &self.table.indices
    }
}
