//! Triangle preprocessing: per-triangle 2D bounds, facing, and ray tests.

use serde::{Deserialize, Serialize};

use crate::error::{RasterError, Result};
use crate::grid::Aabb;

/// Near-parallel rejection threshold for ray/triangle tests.
pub const RAY_EPSILON: f32 = 1e-7;

/// Slack on barycentric bounds so samples on shared edges are not lost.
pub const EDGE_TOLERANCE: f32 = 1e-6;

/// Which triangles take part in rasterization, by the sign of their normal Z.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FaceFilter {
    /// Keep triangles facing +Z and the highest hit (terrain top surface).
    UpwardFacing,
    /// Keep triangles facing -Z and the lowest hit (tool tip).
    DownwardFacing,
    /// Keep every triangle and the highest hit.
    None,
}

/// Which hit survives when several triangles cover one sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extremum {
    /// Keep the largest Z.
    Max,
    /// Keep the smallest Z.
    Min,
}

impl Extremum {
    /// Combine a candidate with the current best.
    #[inline]
    pub fn pick(self, current: f32, candidate: f32) -> f32 {
        match self {
            Extremum::Max => current.max(candidate),
            Extremum::Min => current.min(candidate),
        }
    }
}

impl FaceFilter {
    /// Decode the numeric mode used by callers (0 = up, 1 = down, 2 = none).
    pub fn from_mode(mode: u32) -> Option<Self> {
        match mode {
            0 => Some(FaceFilter::UpwardFacing),
            1 => Some(FaceFilter::DownwardFacing),
            2 => Some(FaceFilter::None),
            _ => None,
        }
    }

    /// Check whether a triangle with the given signed normal Z passes.
    #[inline]
    pub fn accepts(self, normal_z: f32) -> bool {
        match self {
            FaceFilter::UpwardFacing => normal_z > 0.0,
            FaceFilter::DownwardFacing => normal_z < 0.0,
            FaceFilter::None => true,
        }
    }

    /// The hit kept per sample under this filter.
    pub fn extremum(self) -> Extremum {
        match self {
            FaceFilter::DownwardFacing => Extremum::Min,
            FaceFilter::UpwardFacing | FaceFilter::None => Extremum::Max,
        }
    }
}

/// Ray/triangle hit in barycentric form.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    /// Ray parameter of the hit.
    pub t: f32,
    /// Barycentric weight of `v[1]`.
    pub u: f32,
    /// Barycentric weight of `v[2]`.
    pub v: f32,
}

/// A mesh triangle with precomputed culling data.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Triangle {
    /// Vertex positions.
    pub v: [[f32; 3]; 3],
    /// 2D bounding box [min_x, max_x, min_y, max_y].
    pub bbox: [f32; 4],
    /// Z component of (v1 - v0) x (v2 - v0).
    pub normal_z: f32,
}

impl Triangle {
    /// Create a triangle from vertices.
    pub fn new(v0: [f32; 3], v1: [f32; 3], v2: [f32; 3]) -> Self {
        let e1 = sub(v1, v0);
        let e2 = sub(v2, v0);
        let normal_z = e1[0] * e2[1] - e1[1] * e2[0];

        let bbox = [
            v0[0].min(v1[0]).min(v2[0]),
            v0[0].max(v1[0]).max(v2[0]),
            v0[1].min(v1[1]).min(v2[1]),
            v0[1].max(v1[1]).max(v2[1]),
        ];

        Self {
            v: [v0, v1, v2],
            bbox,
            normal_z,
        }
    }

    /// Möller–Trumbore intersection with an arbitrary ray.
    ///
    /// Returns `None` for near-parallel rays, misses, and hits at or behind
    /// the origin. NaN vertices fail every comparison and miss.
    pub fn intersect(&self, origin: [f32; 3], dir: [f32; 3]) -> Option<Hit> {
        let e1 = sub(self.v[1], self.v[0]);
        let e2 = sub(self.v[2], self.v[0]);
        let h = cross(dir, e2);
        let a = dot(e1, h);
        if !(a.abs() > RAY_EPSILON) {
            return None;
        }

        let f = 1.0 / a;
        let s = sub(origin, self.v[0]);
        let u = f * dot(s, h);
        if !(-EDGE_TOLERANCE..=1.0 + EDGE_TOLERANCE).contains(&u) {
            return None;
        }

        let q = cross(s, e1);
        let v = f * dot(dir, q);
        if !(v >= -EDGE_TOLERANCE && u + v <= 1.0 + EDGE_TOLERANCE) {
            return None;
        }

        let t = f * dot(e2, q);
        (t > RAY_EPSILON).then_some(Hit { t, u, v })
    }

    /// Height of the triangle under a vertical ray through (x, y).
    ///
    /// The Z value is interpolated from the barycentric weights so it does
    /// not depend on where the ray starts, and is exact on flat triangles.
    #[inline]
    pub fn z_at(&self, x: f32, y: f32, origin_z: f32) -> Option<f32> {
        let hit = self.intersect([x, y, origin_z], [0.0, 0.0, 1.0])?;
        let [z0, z1, z2] = [self.v[0][2], self.v[1][2], self.v[2][2]];
        Some(z0 + hit.u * (z1 - z0) + hit.v * (z2 - z0))
    }
}

#[inline]
fn sub(a: [f32; 3], b: [f32; 3]) -> [f32; 3] {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

#[inline]
fn dot(a: [f32; 3], b: [f32; 3]) -> f32 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

#[inline]
fn cross(a: [f32; 3], b: [f32; 3]) -> [f32; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

/// Preprocessed triangle soup with its bounds.
#[derive(Debug, Clone, Default)]
pub struct Mesh {
    triangles: Vec<Triangle>,
    bounds: Option<Aabb>,
}

impl Mesh {
    /// Build from a flat buffer of nine floats per triangle.
    pub fn from_flat(buffer: &[f32]) -> Result<Self> {
        if buffer.len() % 9 != 0 {
            return Err(RasterError::MalformedBuffer(buffer.len()));
        }

        let mut bounds = Aabb::empty();
        let triangles: Vec<Triangle> = buffer
            .chunks_exact(9)
            .map(|c| {
                let v0 = [c[0], c[1], c[2]];
                let v1 = [c[3], c[4], c[5]];
                let v2 = [c[6], c[7], c[8]];
                bounds.include(v0);
                bounds.include(v1);
                bounds.include(v2);
                Triangle::new(v0, v1, v2)
            })
            .collect();

        Ok(Self {
            triangles,
            bounds: (!bounds.is_empty()).then_some(bounds),
        })
    }

    /// All triangles, filtered or not.
    pub fn triangles(&self) -> &[Triangle] {
        &self.triangles
    }

    /// Number of triangles.
    pub fn len(&self) -> usize {
        self.triangles.len()
    }

    /// True if the mesh holds no triangles.
    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    /// Bounds of every vertex, or `None` for an empty mesh.
    pub fn bounds(&self) -> Option<Aabb> {
        self.bounds
    }

    /// Count of triangles passing a filter.
    pub fn count_accepted(&self, filter: FaceFilter) -> usize {
        self.triangles
            .iter()
            .filter(|t| filter.accepts(t.normal_z))
            .count()
    }
}
