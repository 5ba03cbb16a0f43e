//! GPU compute kernels for heightcut.
//!
//! This crate runs the tool/terrain collision solver as wgpu compute shaders:
//! - Planar scans: every (x, y) output point in one dispatch
//! - Radial scans: strip rasterization and solving for a batch of angles

#![warn(missing_docs)]

mod buffers;
mod context;
mod layout;
mod planar;
mod radial;

pub use buffers::Readback;
pub use context::{binding_limit, check_workgroup_counts, GpuContext, GpuError};
pub use layout::{tool_points, triangle_floats, PlanarUniforms, RadialUniforms, ToolPoint};
pub use planar::{PlanarGrid, PlanarKernel};
pub use radial::{RadialBatch, RadialKernel};
