//! Radial kernels: strip rasterization and collision for a batch of angles.
//!
//! Both passes are encoded into one command buffer, so a batch of angles is
//! a single submission with a single readback.

use heightcut_raster::{RadialTerrain, SparseTool, StripFrame};

use crate::buffers::{self, Readback};
use crate::context::{GpuContext, GpuError};
use crate::layout::{byte_len, tool_points, triangle_floats, RadialUniforms};

/// Angle batch and output sampling of one radial dispatch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RadialBatch {
    /// Strip sampling shared by every angle.
    pub frame: StripFrame,
    /// Global index of the first angle.
    pub first_angle: u32,
    /// Angles in this batch.
    pub angle_count: u32,
    /// Degrees between consecutive angles.
    pub angle_step_deg: f32,
    /// Strip column of the first output point.
    pub out_start: u32,
    /// Strip columns eligible as tool centers, from `out_start`.
    pub out_columns: u32,
    /// Strip columns between output points.
    pub x_step: u32,
    /// Value for points with no terrain under the tool.
    pub oob_z: f32,
}

impl RadialBatch {
    /// Output points per angle.
    pub fn out_width(&self) -> u32 {
        self.out_columns.div_ceil(self.x_step.max(1))
    }

    /// Bytes of strip storage this batch needs on the device.
    pub fn strip_bytes(&self) -> u64 {
        (self.frame.columns * self.frame.rows) as u64 * self.angle_count as u64 * 4
    }
}

/// Compiled radial pipelines.
pub struct RadialKernel {
    rasterize: wgpu::ComputePipeline,
    solve: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
}

impl RadialKernel {
    /// Compile both radial entry points.
    pub fn new(ctx: &GpuContext) -> Self {
        let shader = ctx.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Radial Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/radial.wgsl").into()),
        });

        let bind_group_layout = ctx.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Radial Bind Group Layout"),
            entries: &[
                buffers::storage_entry(0, true),
                buffers::storage_entry(1, true),
                buffers::storage_entry(2, true),
                buffers::storage_entry(3, true),
                buffers::storage_entry(4, false),
                buffers::storage_entry(5, false),
                buffers::uniform_entry(6),
            ],
        });

        let pipeline_layout = ctx.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Radial Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = |label: &str, entry_point: &str| {
            ctx.device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(label),
                layout: Some(&pipeline_layout),
                module: &shader,
                entry_point: Some(entry_point),
                compilation_options: Default::default(),
                cache: None,
            })
        };

        Self {
            rasterize: pipeline("Radial Strip Pipeline", "rasterize_strips"),
            solve: pipeline("Radial Solve Pipeline", "solve_radial"),
            bind_group_layout,
        }
    }

    /// Upload inputs and submit both passes for one angle batch.
    ///
    /// The readback holds `angle_count * out_width` values, angle-major.
    pub fn dispatch(
        &self,
        ctx: &GpuContext,
        terrain: &RadialTerrain,
        tool: &SparseTool,
        batch: &RadialBatch,
    ) -> Result<Readback, GpuError> {
        let triangles = triangle_floats(terrain.mesh());
        let points = tool_points(tool);
        let buckets = terrain.buckets();
        let out_width = batch.out_width();
        let out_len = out_width as usize * batch.angle_count as usize;
        let out_bytes = (out_len * std::mem::size_of::<f32>()) as u64;

        ctx.check_capacity("triangles", byte_len(&triangles))?;
        ctx.check_capacity("bucket indices", byte_len(buckets.indices()))?;
        ctx.check_capacity("strips", batch.strip_bytes())?;
        ctx.check_capacity("path", out_bytes)?;

        let columns = batch.frame.columns as u32;
        let rows = batch.frame.rows as u32;
        let strip_groups = [columns.div_ceil(64), rows, batch.angle_count];
        let solve_groups = [out_width.div_ceil(64), batch.angle_count, 1];
        ctx.check_workgroups("radial strips", strip_groups)?;
        ctx.check_workgroups("radial solve", solve_groups)?;

        let triangle_buffer = buffers::storage(ctx, "triangles", bytemuck::cast_slice(&triangles))?;
        let start_buffer = buffers::storage(ctx, "bucket offsets", bytemuck::cast_slice(buckets.offsets()))?;
        let index_buffer = buffers::storage(ctx, "bucket indices", bytemuck::cast_slice(buckets.indices()))?;
        let tool_buffer = buffers::storage(ctx, "tool", bytemuck::cast_slice(&points))?;
        let strip_buffer = buffers::output(ctx, "strips", batch.strip_bytes())?;
        let path_buffer = buffers::output(ctx, "path", out_bytes)?;

        let params = RadialUniforms {
            columns,
            rows,
            angle_count: batch.angle_count,
            triangle_count: terrain.mesh().len() as u32,
            min_x: batch.frame.min_x,
            step: batch.frame.step,
            angle_step_deg: batch.angle_step_deg,
            origin_z: terrain.ray_origin_z(),
            bucket_min_x: buckets.min_x(),
            bucket_width: buckets.bucket_width(),
            bucket_count: buckets.bucket_count() as u32,
            tool_count: points.len() as u32,
            x_step: batch.x_step.max(1),
            out_width,
            first_angle: batch.first_angle,
            oob_z: batch.oob_z,
            out_start: batch.out_start,
            _padding: [0; 3],
        };
        let params_buffer = buffers::uniform(ctx, "Radial Params", &params);

        let resources = [
            &triangle_buffer,
            &start_buffer,
            &index_buffer,
            &tool_buffer,
            &strip_buffer,
            &path_buffer,
            &params_buffer,
        ];
        let entries: Vec<wgpu::BindGroupEntry> = resources
            .iter()
            .enumerate()
            .map(|(i, buffer)| wgpu::BindGroupEntry {
                binding: i as u32,
                resource: buffer.as_entire_binding(),
            })
            .collect();
        let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Radial Bind Group"),
            layout: &self.bind_group_layout,
            entries: &entries,
        });

        let mut encoder = ctx.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Radial Encoder"),
        });

        // Pass 1: strips over (column, row, angle)
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Radial Strip Pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.rasterize);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(strip_groups[0], strip_groups[1], strip_groups[2]);
        }

        // Pass 2: collision over (output column, angle)
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Radial Solve Pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.solve);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(solve_groups[0], solve_groups[1], solve_groups[2]);
        }

        let readback = Readback::copy_from(ctx, &mut encoder, &path_buffer, out_len);
        ctx.queue.submit(std::iter::once(encoder.finish()));
        log::debug!(
            "radial dispatch: angles {}..{}, {} columns x {} rows",
            batch.first_angle,
            batch.first_angle + batch.angle_count,
            params.columns,
            params.rows
        );
        Ok(readback)
    }
}
