//! wgpu backend: one compute dispatch per job.

use std::time::Duration;

use heightcut_gpu::{GpuContext, PlanarGrid, PlanarKernel, RadialBatch, RadialKernel};
use log::debug;

use crate::dispatch::{ComputeBackend, DispatchTracker, PlanarJob, RadialJob};
use crate::error::{PathError, Result};

/// Runs jobs on the shared GPU context.
pub struct GpuBackend {
    ctx: &'static GpuContext,
    planar: PlanarKernel,
    radial: RadialKernel,
    timeout: Duration,
    name: String,
}

impl GpuBackend {
    /// Compile the kernels on an initialized context.
    pub fn new(ctx: &'static GpuContext, readback_timeout: Duration) -> Self {
        Self {
            ctx,
            planar: PlanarKernel::new(ctx),
            radial: RadialKernel::new(ctx),
            timeout: readback_timeout,
            name: format!("gpu ({})", ctx.adapter_name),
        }
    }

    /// Initialize the GPU context if needed and compile the kernels.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn init(readback_timeout: Duration) -> Result<Self> {
        let ctx = GpuContext::init_blocking()?;
        Ok(Self::new(ctx, readback_timeout))
    }
}

fn to_u32(what: &'static str, value: usize) -> Result<u32> {
    u32::try_from(value).map_err(|_| PathError::Capacity {
        what,
        requested: value as u64,
        limit: u32::MAX as u64,
    })
}

fn to_i32(what: &'static str, value: i64) -> Result<i32> {
    i32::try_from(value).map_err(|_| PathError::Capacity {
        what,
        requested: value.unsigned_abs(),
        limit: i32::MAX as u64,
    })
}

impl ComputeBackend for GpuBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn binding_limit(&self) -> Option<u64> {
        Some(self.ctx.max_binding_size())
    }

    fn max_batch_angles(&self) -> Option<usize> {
        // Angles are a workgroup dimension in both radial passes.
        Some(self.ctx.limits.max_compute_workgroups_per_dimension as usize)
    }

    fn solve_planar(&self, job: &PlanarJob<'_>, tracker: &mut DispatchTracker) -> Result<Vec<f32>> {
        let grid = PlanarGrid {
            origin: [
                to_i32("scan origin", job.scan.origin[0])?,
                to_i32("scan origin", job.scan.origin[1])?,
            ],
            step: job.scan.step,
            size: [
                to_u32("points per line", job.scan.points_per_line)?,
                to_u32("scanlines", job.scan.scanlines)?,
            ],
            oob_z: job.oob_z,
        };

        let readback = self.planar.dispatch(self.ctx, job.terrain, job.tool, &grid)?;
        tracker.dispatched();
        debug!("planar dispatch: {} points", readback.len());

        let out = readback.wait(self.ctx, self.timeout)?;
        tracker.read_back();
        Ok(out)
    }

    fn solve_radial(&self, job: &RadialJob<'_>, tracker: &mut DispatchTracker) -> Result<Vec<f32>> {
        let batch = RadialBatch {
            frame: job.frame,
            first_angle: job.first_angle,
            angle_count: job.angle_count,
            angle_step_deg: job.angle_step_deg,
            out_start: job.out_start,
            out_columns: job.out_columns,
            x_step: job.x_step,
            oob_z: job.oob_z,
        };

        let readback = self.radial.dispatch(self.ctx, job.terrain, job.tool, &batch)?;
        tracker.dispatched();
        debug!(
            "radial dispatch: angles {}..{}",
            job.first_angle,
            job.first_angle + job.angle_count
        );

        let out = readback.wait(self.ctx, self.timeout)?;
        tracker.read_back();
        Ok(out)
    }
}
