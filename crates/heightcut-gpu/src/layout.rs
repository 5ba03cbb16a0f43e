//! Host-side mirrors of the WGSL buffer layouts.
//!
//! Every struct here is bound as-is, so sizes are pinned at compile time.

use bytemuck::{Pod, Zeroable};
use heightcut_raster::{Mesh, SparseTool};

/// Uniforms for the planar collision kernel.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct PlanarUniforms {
    /// Terrain columns.
    pub terrain_width: u32,
    /// Terrain rows.
    pub terrain_height: u32,
    /// Output points per scanline.
    pub out_width: u32,
    /// Output scanlines.
    pub out_height: u32,
    /// Terrain columns between output points.
    pub x_step: u32,
    /// Terrain rows between scanlines.
    pub y_step: u32,
    /// Terrain column of output point 0 (may be negative).
    pub origin_x: i32,
    /// Terrain row of scanline 0 (may be negative).
    pub origin_y: i32,
    /// Number of tool samples.
    pub tool_count: u32,
    /// Value written where no tool sample meets terrain.
    pub oob_z: f32,
    /// Padding to 16 bytes.
    pub _padding: [u32; 2],
}

/// Uniforms shared by the radial strip and solve kernels.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct RadialUniforms {
    /// Strip columns (X samples).
    pub columns: u32,
    /// Strip rows, centred on y' = 0.
    pub rows: u32,
    /// Angles in this dispatch.
    pub angle_count: u32,
    /// Triangles in the mesh buffer.
    pub triangle_count: u32,
    /// X of column 0.
    pub min_x: f32,
    /// Sample spacing (mm).
    pub step: f32,
    /// Degrees between angles.
    pub angle_step_deg: f32,
    /// Ray start height in the rotated frame.
    pub origin_z: f32,
    /// X of the first bucket edge.
    pub bucket_min_x: f32,
    /// Bucket width (mm).
    pub bucket_width: f32,
    /// Number of X buckets.
    pub bucket_count: u32,
    /// Number of tool samples.
    pub tool_count: u32,
    /// Strip columns between output points.
    pub x_step: u32,
    /// Output points per angle.
    pub out_width: u32,
    /// Global index of the first angle.
    pub first_angle: u32,
    /// Value written where no tool sample meets terrain.
    pub oob_z: f32,
    /// Strip column of output point 0.
    pub out_start: u32,
    /// Padding to 16 bytes.
    pub _padding: [u32; 3],
}

/// One sparse tool sample as seen by the kernels.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct ToolPoint {
    /// Column offset.
    pub dx: i32,
    /// Row offset.
    pub dy: i32,
    /// Height above the tip.
    pub dz: f32,
    /// Padding to 16 bytes.
    pub _padding: u32,
}

const _: () = assert!(std::mem::size_of::<PlanarUniforms>() == 48);
const _: () = assert!(std::mem::size_of::<RadialUniforms>() == 80);
const _: () = assert!(std::mem::size_of::<ToolPoint>() == 16);
const _: () = assert!(std::mem::align_of::<PlanarUniforms>() == 4);
const _: () = assert!(std::mem::align_of::<RadialUniforms>() == 4);

/// Pack a sparse tool for upload.
pub fn tool_points(tool: &SparseTool) -> Vec<ToolPoint> {
    tool.iter()
        .map(|(dx, dy, dz)| ToolPoint {
            dx,
            dy,
            dz,
            _padding: 0,
        })
        .collect()
}

/// Flatten a mesh to nine floats per triangle.
pub fn triangle_floats(mesh: &Mesh) -> Vec<f32> {
    mesh.triangles()
        .iter()
        .flat_map(|t| t.v.iter().flatten().copied())
        .collect()
}

/// Byte size of a slice as the u64 wgpu expects.
pub(crate) fn byte_len<T>(items: &[T]) -> u64 {
    std::mem::size_of_val(items) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use heightcut_raster::build_sparse_tool;

    #[test]
    fn test_tool_points_packed() {
        let tool = build_sparse_tool(&[0.0, 0.0, 1.0, 1.0, 0.0, 3.0], 1.0).unwrap();
        let packed = tool_points(&tool);
        assert_eq!(packed.len(), 2);
        assert_eq!(packed[1], ToolPoint { dx: 0, dy: 0, dz: 2.0, _padding: 0 });
        assert_eq!(bytemuck::cast_slice::<ToolPoint, u8>(&packed).len(), 32);
    }

    #[test]
    fn test_triangle_floats_order() {
        let flat = [0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0];
        let mesh = Mesh::from_flat(&flat).unwrap();
        assert_eq!(triangle_floats(&mesh), flat.to_vec());
    }

    #[test]
    fn test_params_bytes() {
        let params = PlanarUniforms {
            oob_z: -100.0,
            ..Default::default()
        };
        let bytes = bytemuck::bytes_of(&params);
        assert_eq!(bytes.len(), 48);
        assert_eq!(&bytes[36..40], &(-100.0f32).to_le_bytes());
    }
}
