#![warn(missing_docs)]

//! Collision-safe height toolpaths.
//!
//! Given a terrain height map and a sparse tool, this crate computes for
//! every sampled tool position the highest tool-tip Z that does not
//! penetrate the terrain.
//!
//! # Architecture
//!
//! - [`solver`] - CPU reference collision solver
//! - [`dispatch`] - [`ComputeBackend`] seam and per-request state tracking
//! - [`worker`] - thread-pool backend
//! - [`tiling`] - memory-bounded tiling and stitching
//! - [`planar`] / [`radial`] - XY and rotary path generation
//! - [`PathGenerator`] - settings-driven facade over all of the above
//!
//! The `gpu` feature adds [`GpuBackend`], which runs each job as a single
//! wgpu compute dispatch.
//!
//! # Example
//!
//! ```ignore
//! use heightcut_path::{PathGenerator, PathSettings, TerrainSource, WorkerBackend};
//!
//! let generator = PathGenerator::new(WorkerBackend::new(4), settings)?;
//! let tool = generator.build_tool(&tool_triangles)?;
//! let path = generator.generate(&TerrainSource::Map(&terrain), &tool, None, &mut |p| {
//!     println!("{:.0}%", p.fraction() * 100.0);
//! })?;
//! ```

pub mod dispatch;
pub mod error;
pub mod planar;
pub mod progress;
pub mod radial;
pub mod scan;
pub mod settings;
pub mod solver;
pub mod tiling;
pub mod worker;

mod generator;
mod toolpath;

#[cfg(feature = "gpu")]
mod gpu_backend;

pub use dispatch::{ComputeBackend, DispatchState, DispatchTracker, PlanarJob, RadialJob};
pub use error::{PathError, Result};
pub use generator::PathGenerator;
pub use planar::{generate_path, TerrainSource};
pub use progress::{CancelToken, Progress};
pub use radial::{generate_radial_path, RadialParams};
pub use scan::ScanGrid;
pub use settings::{PathSettings, TilingConfig};
pub use solver::solve;
pub use tiling::{needs_tiling, MemoryEstimate, Tile, TilePlan};
pub use toolpath::{GenerationReport, RadialToolPath, ToolPath};
pub use worker::{WorkerBackend, WorkerPool};

#[cfg(feature = "gpu")]
pub use gpu_backend::GpuBackend;
