//! Planar collision kernel: the whole scan grid in one dispatch.

use heightcut_raster::{HeightMap, SparseTool};

use crate::buffers::{self, Readback};
use crate::context::{GpuContext, GpuError};
use crate::layout::{byte_len, tool_points, PlanarUniforms};

/// Output grid of one planar dispatch, in terrain-index space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlanarGrid {
    /// Terrain cell under output point (0, 0).
    pub origin: [i32; 2],
    /// Terrain cells between output points along X and Y.
    pub step: [u32; 2],
    /// Output points per scanline and scanline count.
    pub size: [u32; 2],
    /// Value for points with no terrain under the tool.
    pub oob_z: f32,
}

impl PlanarGrid {
    /// Number of output values.
    pub fn len(&self) -> usize {
        self.size[0] as usize * self.size[1] as usize
    }

    /// True if the grid has no points.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Compiled planar pipeline.
pub struct PlanarKernel {
    pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
}

impl PlanarKernel {
    /// Compile the planar shader.
    pub fn new(ctx: &GpuContext) -> Self {
        let shader = ctx.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Planar Solve Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/planar.wgsl").into()),
        });

        let bind_group_layout = ctx.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Planar Bind Group Layout"),
            entries: &[
                buffers::storage_entry(0, true),
                buffers::storage_entry(1, true),
                buffers::storage_entry(2, false),
                buffers::uniform_entry(3),
            ],
        });

        let pipeline_layout = ctx.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Planar Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = ctx.device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("Planar Solve Pipeline"),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: Some("solve_planar"),
            compilation_options: Default::default(),
            cache: None,
        });

        Self {
            pipeline,
            bind_group_layout,
        }
    }

    /// Upload inputs and submit one dispatch covering every output point.
    ///
    /// Buffers over the device binding limit fail before anything is allocated.
    pub fn dispatch(
        &self,
        ctx: &GpuContext,
        terrain: &HeightMap,
        tool: &SparseTool,
        grid: &PlanarGrid,
    ) -> Result<Readback, GpuError> {
        let points = tool_points(tool);
        let out_bytes = (grid.len() * std::mem::size_of::<f32>()) as u64;
        ctx.check_capacity("terrain", byte_len(terrain.heights()))?;
        ctx.check_capacity("tool", byte_len(&points))?;
        ctx.check_capacity("path", out_bytes)?;
        let groups = [grid.size[0].div_ceil(8), grid.size[1].div_ceil(8), 1];
        ctx.check_workgroups("planar solve", groups)?;

        let terrain_buffer = buffers::storage(ctx, "terrain", bytemuck::cast_slice(terrain.heights()))?;
        let tool_buffer = buffers::storage(ctx, "tool", bytemuck::cast_slice(&points))?;
        let path_buffer = buffers::output(ctx, "path", out_bytes)?;

        let params = PlanarUniforms {
            terrain_width: terrain.width() as u32,
            terrain_height: terrain.height() as u32,
            out_width: grid.size[0],
            out_height: grid.size[1],
            x_step: grid.step[0],
            y_step: grid.step[1],
            origin_x: grid.origin[0],
            origin_y: grid.origin[1],
            tool_count: points.len() as u32,
            oob_z: grid.oob_z,
            _padding: [0; 2],
        };
        let params_buffer = buffers::uniform(ctx, "Planar Params", &params);

        let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Planar Bind Group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: terrain_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: tool_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: path_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: params_buffer.as_entire_binding(),
                },
            ],
        });

        let mut encoder = ctx.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Planar Solve Encoder"),
        });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Planar Solve Pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(groups[0], groups[1], groups[2]);
        }

        let readback = Readback::copy_from(ctx, &mut encoder, &path_buffer, grid.len());
        ctx.queue.submit(std::iter::once(encoder.finish()));
        log::debug!(
            "planar dispatch: {}x{} points, {} tool samples",
            grid.size[0],
            grid.size[1],
            points.len()
        );
        Ok(readback)
    }
}
