//! Rasterization of a mesh rotated about the X axis.
//!
//! Instead of rotating the triangles for every angle, each ray is rotated
//! into mesh space. A sample (x, y') of the frame rotated by θ becomes the
//! ray
//!
//! ```text
//! origin = (x, y' cos θ + z0 sin θ, -y' sin θ + z0 cos θ)
//! dir    = (0, sin θ, cos θ)
//! ```
//!
//! with `z0` below the mesh's largest radius about X. The hit height in the
//! rotated frame is `z0 + t`. Rays keep X constant, so candidates come from
//! a 1D [`XBuckets`] index.

use rayon::prelude::*;

use crate::grid::GridSpec;
use crate::heightmap::{is_empty_z, HeightMap, EMPTY_Z};
use crate::spatial::XBuckets;
use crate::triangle::Mesh;

/// Clearance between the ray origin and the mesh's outer radius.
const ORIGIN_CLEARANCE: f32 = 1.0;

/// Mesh prepared for rotated sampling.
#[derive(Debug, Clone)]
pub struct RadialTerrain {
    mesh: Mesh,
    buckets: XBuckets,
    max_radius: f32,
}

impl RadialTerrain {
    /// Index a mesh by X and measure its radius about the X axis.
    pub fn new(mesh: Mesh) -> Self {
        let (min_x, max_x) = mesh
            .bounds()
            .map(|b| (b.min[0], b.max[0]))
            .unwrap_or((0.0, 0.0));
        let buckets = XBuckets::build(mesh.triangles(), min_x, max_x);
        let max_radius = mesh
            .triangles()
            .iter()
            .flat_map(|t| t.v.iter())
            .map(|v| (v[1] * v[1] + v[2] * v[2]).sqrt())
            .fold(0.0f32, f32::max);
        Self {
            mesh,
            buckets,
            max_radius,
        }
    }

    /// The underlying mesh.
    pub fn mesh(&self) -> &Mesh {
        &self.mesh
    }

    /// X bucket index.
    pub fn buckets(&self) -> &XBuckets {
        &self.buckets
    }

    /// Largest vertex distance from the X axis.
    pub fn max_radius(&self) -> f32 {
        self.max_radius
    }

    /// Ray start height `z0` in every rotated frame.
    pub fn ray_origin_z(&self) -> f32 {
        -(self.max_radius + ORIGIN_CLEARANCE)
    }

    /// Rasterize the strip described by `frame` at one angle.
    ///
    /// Every triangle takes part and the outermost hit is kept: facing flips
    /// with the angle, so no face filter applies.
    pub fn rasterize_strip(&self, angle_deg: f32, frame: &StripFrame) -> HeightMap {
        let grid = frame.grid();
        let (sin, cos) = angle_deg.to_radians().sin_cos();
        let z0 = self.ray_origin_z();
        let dir = [0.0, sin, cos];
        let triangles = self.mesh.triangles();

        let mut z = Vec::with_capacity(grid.cell_count());
        for row in 0..grid.height as i64 {
            let yp = grid.y_at(row);
            let oy = yp * cos + z0 * sin;
            let oz = -yp * sin + z0 * cos;
            for col in 0..grid.width as i64 {
                let x = grid.x_at(col);
                let mut best = EMPTY_Z;
                for &i in self.buckets.candidates(x) {
                    if let Some(hit) = triangles[i as usize].intersect([x, oy, oz], dir) {
                        let h = z0 + hit.t;
                        if is_empty_z(best) || h > best {
                            best = h;
                        }
                    }
                }
                z.push(best);
            }
        }
        HeightMap::from_heights(grid, z)
    }

    /// Rasterize one strip per angle in parallel.
    pub fn rasterize_strips(&self, angles_deg: &[f32], frame: &StripFrame) -> Vec<HeightMap> {
        angles_deg
            .par_iter()
            .map(|&a| self.rasterize_strip(a, frame))
            .collect()
    }
}

/// Sampling window of one rotated strip.
///
/// Columns run along X; rows are centred on y' = 0 with `center_row = rows / 2`,
/// matching the tool's own grid center.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StripFrame {
    /// X of column 0.
    pub min_x: f32,
    /// Sample spacing (mm) along both axes.
    pub step: f32,
    /// Number of columns.
    pub columns: usize,
    /// Number of rows.
    pub rows: usize,
}

impl StripFrame {
    /// Row whose y' is zero.
    pub fn center_row(&self) -> usize {
        self.rows / 2
    }

    /// The strip as a lattice.
    pub fn grid(&self) -> GridSpec {
        GridSpec {
            min_x: self.min_x,
            min_y: -(self.center_row() as f32) * self.step,
            step: self.step,
            width: self.columns,
            height: self.rows,
        }
    }
}

/// Angles sampled for a full turn: `ceil(360 / step)` of them, `i * step` apart.
pub fn rotation_angles(angle_step_deg: f32) -> Vec<f32> {
    let count = (360.0 / angle_step_deg).ceil();
    let count = if count.is_finite() && count > 0.0 { count as usize } else { 0 };
    (0..count).map(|i| i as f32 * angle_step_deg).collect()
}
