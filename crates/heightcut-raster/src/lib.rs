#![warn(missing_docs)]

//! Height-map rasterization for heightcut.
//!
//! Turns triangle meshes into dense height maps by casting vertical rays
//! through a uniform spatial grid, and compacts tool surfaces into sparse
//! offset lists for the collision solver.
//!
//! # Example
//!
//! ```ignore
//! use heightcut_raster::{rasterize, build_sparse_tool, FaceFilter};
//!
//! let terrain = rasterize(&terrain_triangles, 0.1, FaceFilter::UpwardFacing, None)?;
//! let tool_surface = rasterize(&tool_triangles, 0.1, FaceFilter::DownwardFacing, None)?;
//! let tool = build_sparse_tool(&tool_surface.points, 0.1)?;
//! println!("{} terrain samples, {} tool samples", terrain.point_count(), tool.count());
//! ```

pub mod error;
pub mod grid;
pub mod heightmap;
pub mod radial;
pub mod rasterize;
pub mod spatial;
pub mod tool;
pub mod triangle;

pub use error::{RasterError, Result};
pub use grid::{Aabb, GridRect, GridSpec};
pub use heightmap::{create_height_map_from_points, is_empty_z, HeightMap, EMPTY_Z};
pub use radial::{rotation_angles, RadialTerrain, StripFrame};
pub use rasterize::{
    lattice_for, rasterize, rasterize_height_map, rasterize_region, rasterize_window, RasterOutput,
};
pub use spatial::{SpatialGrid, XBuckets};
pub use tool::{build_sparse_tool, SparseTool};
pub use triangle::{Extremum, FaceFilter, Mesh, Triangle};
