//! Configured entry point for the whole pipeline.

use heightcut_raster::{
    build_sparse_tool, lattice_for, rasterize, Aabb, FaceFilter, GridSpec, Mesh, SparseTool,
};

use crate::dispatch::ComputeBackend;
use crate::error::Result;
use crate::planar::{planar_path, Budget, PlanarScan, TerrainSource};
use crate::progress::{CancelToken, Progress};
use crate::radial::{radial_path, Batching, RadialParams};
use crate::settings::PathSettings;
use crate::tiling::effective_limit;
use crate::toolpath::{RadialToolPath, ToolPath};

/// Runs planar and radial jobs with fixed settings on one backend.
///
/// Planar jobs are tiled when they exceed the memory budget; radial jobs are
/// split into angle batches. Both check the cancel token between units of
/// work and report progress after each one.
pub struct PathGenerator<B> {
    backend: B,
    settings: PathSettings,
    cancel: CancelToken,
}

impl<B: ComputeBackend> PathGenerator<B> {
    /// Create a generator. Fails if the settings are invalid.
    pub fn new(backend: B, settings: PathSettings) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            backend,
            settings,
            cancel: CancelToken::new(),
        })
    }

    /// Use an existing cancel token.
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that cancels this generator's jobs.
    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Active settings.
    pub fn settings(&self) -> &PathSettings {
        &self.settings
    }

    /// The compute backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Rasterize a tool mesh's lower surface and compact it.
    pub fn build_tool(&self, tool_triangles: &[f32]) -> Result<SparseTool> {
        let step = self.settings.grid_step;
        let surface = rasterize(tool_triangles, step, FaceFilter::DownwardFacing, None)?;
        Ok(build_sparse_tool(&surface.points, step)?)
    }

    /// Planar path over `bounds` (or the whole terrain).
    pub fn generate(
        &self,
        terrain: &TerrainSource<'_>,
        tool: &SparseTool,
        bounds: Option<Aabb>,
        progress: &mut dyn FnMut(Progress),
    ) -> Result<ToolPath> {
        let scan = PlanarScan {
            x_step: self.settings.x_step,
            y_step: self.settings.y_step,
            oob_z: self.settings.oob_z,
            bounds,
        };
        let budget = Budget {
            tiling: &self.settings.tiling,
            cancel: &self.cancel,
        };
        planar_path(&self.backend, terrain, tool, &scan, Some(budget), progress)
    }

    /// Planar path straight from terrain and tool triangle buffers.
    ///
    /// Terrain is rasterized per tile rather than all at once.
    pub fn generate_from_meshes(
        &self,
        terrain_triangles: &[f32],
        tool_triangles: &[f32],
        bounds: Option<Aabb>,
        progress: &mut dyn FnMut(Progress),
    ) -> Result<ToolPath> {
        let mesh = Mesh::from_flat(terrain_triangles)?;
        let tool = self.build_tool(tool_triangles)?;
        let grid = lattice_for(&mesh, self.settings.grid_step, None)?.unwrap_or(GridSpec {
            min_x: 0.0,
            min_y: 0.0,
            step: self.settings.grid_step,
            width: 0,
            height: 0,
        });
        let terrain = TerrainSource::Mesh {
            mesh: &mesh,
            filter: FaceFilter::UpwardFacing,
            grid,
        };
        self.generate(&terrain, &tool, bounds, progress)
    }

    /// Rotary path; `bounds` limits the X range.
    pub fn generate_radial(
        &self,
        terrain_triangles: &[f32],
        tool: &SparseTool,
        bounds: Option<Aabb>,
        progress: &mut dyn FnMut(Progress),
    ) -> Result<RadialToolPath> {
        let params = RadialParams {
            angle_step_deg: self.settings.angle_step_deg,
            x_step: self.settings.x_step,
            z_floor: self.settings.oob_z,
            grid_step: self.settings.grid_step,
            bounds,
        };
        let batching = Batching {
            limit: Some(effective_limit(
                &self.settings.tiling,
                self.backend.binding_limit(),
            )),
            split: self.settings.tiling.auto_tiling,
            cancel: Some(&self.cancel),
        };
        radial_path(&self.backend, terrain_triangles, tool, &params, batching, progress)
    }
}
