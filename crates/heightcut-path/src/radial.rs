//! Rotary (4th-axis) path generation.
//!
//! The terrain turns about the X axis. For each angle a strip as tall as the
//! tool is rasterized around y' = 0 and the tool is solved along its centre
//! row. Angles are processed in batches sized to the memory limit.

use heightcut_raster::{rotation_angles, Aabb, Mesh, RadialTerrain, SparseTool, StripFrame};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::dispatch::{tracked, ComputeBackend, DispatchTracker, RadialJob};
use crate::error::{PathError, Result};
use crate::progress::{CancelToken, Progress};
use crate::settings::validate_angle_step;
use crate::toolpath::{GenerationReport, RadialToolPath};

/// Parameters of a rotary scan.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RadialParams {
    /// Degrees between scanlines.
    pub angle_step_deg: f32,
    /// Strip columns between output points.
    pub x_step: u32,
    /// Height reported where the tool meets no terrain.
    pub z_floor: f32,
    /// Sample spacing (mm); must match the tool's step.
    pub grid_step: f32,
    /// X range to scan; defaults to the mesh's X extent.
    pub bounds: Option<Aabb>,
}

impl RadialParams {
    fn validate(&self) -> Result<()> {
        validate_angle_step(self.angle_step_deg)?;
        if self.x_step == 0 {
            return Err(PathError::InvalidSettings("x_step must be at least 1".into()));
        }
        if !(self.grid_step > 0.0 && self.grid_step.is_finite()) {
            return Err(PathError::InvalidSettings("grid_step must be positive".into()));
        }
        if !self.z_floor.is_finite() {
            return Err(PathError::InvalidSettings("z_floor must be finite".into()));
        }
        Ok(())
    }
}

/// How angles may be grouped into dispatches.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Batching<'a> {
    /// Bytes one dispatch may use.
    pub limit: Option<u64>,
    /// Split into several batches when the whole turn does not fit.
    pub split: bool,
    /// Checked before every batch.
    pub cancel: Option<&'a CancelToken>,
}

/// Generate a rotary path from a terrain triangle buffer.
///
/// Produces `ceil(360 / angle_step_deg)` rows; row `r` is the terrain turned
/// by `r * angle_step_deg`. Progress is reported once per angle batch.
pub fn generate_radial_path(
    backend: &dyn ComputeBackend,
    terrain_triangles: &[f32],
    tool: &SparseTool,
    params: &RadialParams,
    progress: &mut dyn FnMut(Progress),
) -> Result<RadialToolPath> {
    let batching = Batching {
        limit: backend.binding_limit(),
        split: true,
        cancel: None,
    };
    radial_path(backend, terrain_triangles, tool, params, batching, progress)
}

pub(crate) fn radial_path(
    backend: &dyn ComputeBackend,
    terrain_triangles: &[f32],
    tool: &SparseTool,
    params: &RadialParams,
    batching: Batching<'_>,
    progress: &mut dyn FnMut(Progress),
) -> Result<RadialToolPath> {
    params.validate()?;
    let mesh = Mesh::from_flat(terrain_triangles)?;
    let mut tracker = DispatchTracker::new("radial");

    let mesh_bounds = match mesh.bounds() {
        Some(bounds) if !tool.is_empty() => bounds,
        _ => {
            warn!(
                "radial job is empty ({} triangles, {} tool samples)",
                mesh.len(),
                tool.count()
            );
            tracker.finish();
            return Ok(RadialToolPath {
                data: Vec::new(),
                rotations: 0,
                points_per_line: 0,
                angle_step_deg: params.angle_step_deg,
                report: GenerationReport::new(backend.name(), 0, tool, &tracker),
            });
        }
    };

    let (min_x, max_x) = match params.bounds {
        Some(bounds) => {
            bounds.validate_xy()?;
            (bounds.min[0], bounds.max[0])
        }
        None => (mesh_bounds.min[0], mesh_bounds.max[0]),
    };
    // The strip extends past the scanned range by the tool's reach so samples
    // beyond either end still meet the terrain there.
    let step = params.grid_step;
    let reach = tool.reach().0;
    let left = margin_columns(min_x - mesh_bounds.min[0], step, reach);
    let right = margin_columns(mesh_bounds.max[0] - max_x, step, reach);
    let out_columns = columns_between(min_x, max_x, step);
    let frame = StripFrame {
        min_x: min_x - left as f32 * step,
        step,
        columns: left + out_columns + right,
        rows: tool.grid_height().max(1),
    };
    let out_start = column_index("radial strip start", left)?;
    let out_columns = column_index("radial strip columns", out_columns)?;
    let terrain = RadialTerrain::new(mesh);

    let rotations = rotation_angles(params.angle_step_deg).len();
    let out_width = (out_columns as usize).div_ceil(params.x_step as usize);
    let angle_bytes = ((frame.columns * frame.rows + out_width) * 4) as u64;
    let mut batch_size = batch_size(rotations, angle_bytes, &batching)?;
    if let Some(max) = backend.max_batch_angles() {
        batch_size = batch_size.min(max.max(1));
    }
    let batches = rotations.div_ceil(batch_size);
    debug!(
        "radial: {rotations} angles x {out_width} points, strip {}x{} (margins {left}/{right}), {batches} batch(es) of {batch_size}",
        frame.columns, frame.rows
    );

    let data = tracked(&mut tracker, |tracker| {
        let mut data = Vec::with_capacity(rotations * out_width);
        for (n, first) in (0..rotations).step_by(batch_size).enumerate() {
            if let Some(cancel) = batching.cancel {
                cancel.check()?;
            }
            let job = RadialJob {
                terrain: &terrain,
                tool,
                frame,
                first_angle: first as u32,
                angle_count: batch_size.min(rotations - first) as u32,
                angle_step_deg: params.angle_step_deg,
                out_start,
                out_columns,
                x_step: params.x_step,
                oob_z: params.z_floor,
            };
            data.extend_from_slice(&backend.solve_radial(&job, tracker)?);
            progress(Progress {
                completed: n + 1,
                total: batches,
            });
        }
        Ok(data)
    })?;
    tracker.finish();

    info!(
        "radial path: {rotations} rotations x {out_width} points, {} dispatch(es) on {}",
        tracker.dispatches(),
        backend.name()
    );

    Ok(RadialToolPath {
        data,
        rotations,
        points_per_line: out_width,
        angle_step_deg: params.angle_step_deg,
        report: GenerationReport::new(backend.name(), batches, tool, &tracker),
    })
}

fn columns_between(min_x: f32, max_x: f32, step: f32) -> usize {
    let n = ((max_x - min_x) / step).round();
    if n.is_finite() && n > 0.0 {
        n as usize + 1
    } else {
        1
    }
}

/// Whole lattice columns that fit in `room` (mm), at most `reach`.
fn margin_columns(room: f32, step: f32, reach: usize) -> usize {
    let n = (room / step + 1e-4).floor();
    if n.is_finite() && n > 0.0 {
        (n as usize).min(reach)
    } else {
        0
    }
}

fn column_index(what: &'static str, value: usize) -> Result<u32> {
    u32::try_from(value).map_err(|_| PathError::Capacity {
        what,
        requested: value as u64,
        limit: u32::MAX as u64,
    })
}

fn batch_size(rotations: usize, angle_bytes: u64, batching: &Batching<'_>) -> Result<usize> {
    let rotations = rotations.max(1);
    let Some(limit) = batching.limit else {
        return Ok(rotations);
    };
    let whole = angle_bytes * rotations as u64;
    if whole <= limit {
        return Ok(rotations);
    }
    if !batching.split {
        return Err(PathError::Capacity {
            what: "radial job",
            requested: whole,
            limit,
        });
    }
    if angle_bytes > limit {
        return Err(PathError::Capacity {
            what: "radial angle",
            requested: angle_bytes,
            limit,
        });
    }
    Ok(((limit / angle_bytes) as usize).clamp(1, rotations))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use heightcut_raster::build_sparse_tool;

    use crate::worker::WorkerBackend;

    /// Closed tube of `facets` quads around the X axis from x0 to x1.
    fn cylinder(radius: f32, x0: f32, x1: f32, facets: usize) -> Vec<f32> {
        let mut tris = Vec::new();
        let at = |x: f32, i: usize| {
            let a = i as f32 / facets as f32 * std::f32::consts::TAU;
            [x, radius * a.sin(), radius * a.cos()]
        };
        for i in 0..facets {
            let (a, b, c, d) = (at(x0, i), at(x1, i), at(x1, i + 1), at(x0, i + 1));
            for v in [a, b, c, a, c, d] {
                tris.extend_from_slice(&v);
            }
        }
        tris
    }

    fn params() -> RadialParams {
        RadialParams {
            angle_step_deg: 30.0,
            x_step: 1,
            z_floor: -50.0,
            grid_step: 1.0,
            bounds: Some(Aabb::new([1.0, -6.0, -6.0], [9.0, 6.0, 6.0])),
        }
    }

    #[test]
    fn test_cylinder_radius_at_every_angle() {
        let tris = cylinder(5.0, 0.0, 10.0, 64);
        let tool = build_sparse_tool(&[0.0, 0.0, 0.0], 1.0).unwrap();
        let mut calls = 0;
        let path = generate_radial_path(
            &WorkerBackend::new(3),
            &tris,
            &tool,
            &params(),
            &mut |_| calls += 1,
        )
        .unwrap();

        assert_eq!(path.rotations, 12);
        assert_eq!(path.points_per_line, 9);
        assert_eq!(calls, 1);
        let inner = 5.0 * (std::f32::consts::PI / 64.0).cos();
        for &z in &path.data {
            assert!(z >= inner - 1e-3 && z <= 5.0 + 1e-3, "radius {z}");
        }
    }

    #[test]
    fn test_wide_tool_rides_on_top() {
        let tris = cylinder(5.0, 0.0, 10.0, 64);
        // Flat 3x3 tool: its outer rows meet the tube lower than the centre.
        let mut pts = Vec::new();
        for y in -1..=1 {
            for x in -1..=1 {
                pts.extend_from_slice(&[x as f32, y as f32, 0.0]);
            }
        }
        let tool = build_sparse_tool(&pts, 1.0).unwrap();
        let path = generate_radial_path(&WorkerBackend::new(2), &tris, &tool, &params(), &mut |_| {}).unwrap();
        for &z in &path.data {
            assert_relative_eq!(z, 5.0, epsilon = 0.01);
        }
    }

    #[test]
    fn test_batches_match_single_pass() {
        let tris = cylinder(4.0, 0.0, 10.0, 24);
        let tool = build_sparse_tool(&[0.0, 0.0, 0.0], 1.0).unwrap();
        let backend = WorkerBackend::new(2);
        let single = generate_radial_path(&backend, &tris, &tool, &params(), &mut |_| {}).unwrap();

        // 9 columns x 1 row + 9 outputs = 72 bytes per angle: 5 angles per batch.
        let batching = Batching {
            limit: Some(72 * 5),
            split: true,
            cancel: None,
        };
        let mut seen = Vec::new();
        let batched = radial_path(&backend, &tris, &tool, &params(), batching, &mut |p| seen.push(p)).unwrap();

        assert_eq!(batched.data, single.data);
        assert_eq!(batched.report.tiles, 3);
        assert_eq!(batched.report.dispatches, 3);
        assert_eq!(seen.last(), Some(&Progress { completed: 3, total: 3 }));

        let whole = Batching {
            split: false,
            ..batching
        };
        let err = radial_path(&backend, &tris, &tool, &params(), whole, &mut |_| {}).unwrap_err();
        assert!(matches!(err, PathError::Capacity { what: "radial job", .. }));
    }

    #[test]
    fn test_cancelled_between_batches() {
        let tris = cylinder(4.0, 0.0, 10.0, 24);
        let tool = build_sparse_tool(&[0.0, 0.0, 0.0], 1.0).unwrap();
        let cancel = CancelToken::new();
        let batching = Batching {
            limit: Some(72),
            split: true,
            cancel: Some(&cancel),
        };
        let result = radial_path(&WorkerBackend::new(1), &tris, &tool, &params(), batching, &mut |p| {
            if p.completed == 2 {
                cancel.cancel();
            }
        });
        assert!(matches!(result, Err(PathError::Cancelled)));
    }

    #[test]
    fn test_empty_inputs() {
        let tool = build_sparse_tool(&[0.0, 0.0, 0.0], 1.0).unwrap();
        let path = generate_radial_path(&WorkerBackend::new(1), &[], &tool, &params(), &mut |_| {}).unwrap();
        assert!(path.is_empty());

        let mut bad = params();
        bad.angle_step_deg = 0.0;
        assert!(generate_radial_path(&WorkerBackend::new(1), &[], &tool, &bad, &mut |_| {}).is_err());
    }

    #[test]
    fn test_margin_columns() {
        assert_eq!(margin_columns(5.5, 1.0, 2), 2);
        assert_eq!(margin_columns(1.0, 1.0, 2), 1);
        assert_eq!(margin_columns(0.5, 1.0, 2), 0);
        assert_eq!(margin_columns(-3.0, 1.0, 2), 0);
        assert_eq!(margin_columns(10.0, 0.5, 0), 0);
    }

    #[test]
    fn test_batches_capped_by_backend() {
        struct Capped(WorkerBackend);

        impl ComputeBackend for Capped {
            fn name(&self) -> &str {
                "capped"
            }
            fn binding_limit(&self) -> Option<u64> {
                None
            }
            fn max_batch_angles(&self) -> Option<usize> {
                Some(5)
            }
            fn solve_planar(
                &self,
                job: &crate::dispatch::PlanarJob<'_>,
                tracker: &mut DispatchTracker,
            ) -> Result<Vec<f32>> {
                self.0.solve_planar(job, tracker)
            }
            fn solve_radial(&self, job: &RadialJob<'_>, tracker: &mut DispatchTracker) -> Result<Vec<f32>> {
                assert!(job.angle_count <= 5);
                self.0.solve_radial(job, tracker)
            }
        }

        let tris = cylinder(4.0, 0.0, 10.0, 24);
        let tool = build_sparse_tool(&[0.0, 0.0, 0.0], 1.0).unwrap();
        let capped = generate_radial_path(&Capped(WorkerBackend::new(2)), &tris, &tool, &params(), &mut |_| {})
            .unwrap();
        let single = generate_radial_path(&WorkerBackend::new(2), &tris, &tool, &params(), &mut |_| {}).unwrap();
        assert_eq!(capped.report.tiles, 3);
        assert_eq!(capped.data, single.data);
    }

    #[test]
    fn test_columns_between() {
        assert_eq!(columns_between(0.0, 10.0, 1.0), 11);
        assert_eq!(columns_between(2.0, 2.0, 0.5), 1);
        assert_eq!(columns_between(0.0, 1.0, 0.3), 4);
    }
}
