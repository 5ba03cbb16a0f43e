//! Batched dispatch: job descriptions, the backend seam, and per-request state.
//!
//! A job is one launch: every output point of a planar job (or every
//! angle/column pair of a radial job) is an independent invocation.

use std::ops::Range;

use heightcut_raster::{HeightMap, RadialTerrain, SparseTool, StripFrame};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::scan::ScanGrid;

/// Lifecycle of one generation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DispatchState {
    /// Nothing submitted yet.
    Unscanned,
    /// A launch is in flight.
    Dispatched,
    /// The last launch's results are on the host.
    ReadBack,
    /// All results collected.
    Done,
    /// A launch or readback failed.
    Failed,
}

impl DispatchState {
    /// Whether `next` may follow `self`.
    ///
    /// `ReadBack -> Dispatched` is the next tile or batch of the same request;
    /// `Unscanned -> Done` is a request with nothing to compute.
    pub fn can_advance_to(self, next: DispatchState) -> bool {
        use DispatchState::*;
        matches!(
            (self, next),
            (Unscanned, Dispatched)
                | (Dispatched, ReadBack)
                | (ReadBack, Dispatched)
                | (ReadBack, Done)
                | (Unscanned, Done)
                | (Unscanned | Dispatched | ReadBack, Failed)
        )
    }

    /// True for `Done` and `Failed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, DispatchState::Done | DispatchState::Failed)
    }
}

/// Tracks the state of one request and counts its launches.
#[derive(Debug)]
pub struct DispatchTracker {
    label: String,
    state: DispatchState,
    dispatches: usize,
}

impl DispatchTracker {
    /// A tracker in `Unscanned`.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            state: DispatchState::Unscanned,
            dispatches: 0,
        }
    }

    /// Current state.
    pub fn state(&self) -> DispatchState {
        self.state
    }

    /// Launches submitted so far.
    pub fn dispatches(&self) -> usize {
        self.dispatches
    }

    /// A launch was submitted.
    pub fn dispatched(&mut self) {
        self.advance(DispatchState::Dispatched);
        self.dispatches += 1;
    }

    /// The launch's results reached the host.
    pub fn read_back(&mut self) {
        self.advance(DispatchState::ReadBack);
    }

    /// The request completed.
    pub fn finish(&mut self) {
        self.advance(DispatchState::Done);
    }

    /// The request failed. No-op once terminal.
    pub fn fail(&mut self) {
        if !self.state.is_terminal() {
            self.advance(DispatchState::Failed);
        }
    }

    fn advance(&mut self, next: DispatchState) {
        debug_assert!(
            self.state.can_advance_to(next),
            "{}: invalid transition {:?} -> {:?}",
            self.label,
            self.state,
            next
        );
        debug!("{}: {:?} -> {:?}", self.label, self.state, next);
        self.state = next;
    }
}

/// Run `f`, moving the tracker to `Failed` if it errors.
pub fn tracked<T>(
    tracker: &mut DispatchTracker,
    f: impl FnOnce(&mut DispatchTracker) -> Result<T>,
) -> Result<T> {
    let result = f(tracker);
    if result.is_err() {
        tracker.fail();
    }
    result
}

/// One planar launch: solve every point of `scan` against `terrain`.
#[derive(Debug, Clone, Copy)]
pub struct PlanarJob<'a> {
    /// Dense terrain (the whole map or a tile's extended window).
    pub terrain: &'a HeightMap,
    /// Sparse tool.
    pub tool: &'a SparseTool,
    /// Tool centers, in `terrain`'s index space.
    pub scan: ScanGrid,
    /// Value where the tool meets no terrain.
    pub oob_z: f32,
}

/// One radial launch: a contiguous batch of angles.
#[derive(Debug, Clone, Copy)]
pub struct RadialJob<'a> {
    /// Indexed terrain mesh.
    pub terrain: &'a RadialTerrain,
    /// Sparse tool.
    pub tool: &'a SparseTool,
    /// Strip sampling shared by every angle.
    pub frame: StripFrame,
    /// Global index of the first angle in the batch.
    pub first_angle: u32,
    /// Angles in the batch.
    pub angle_count: u32,
    /// Degrees between angles.
    pub angle_step_deg: f32,
    /// Strip column of the first output point.
    pub out_start: u32,
    /// Strip columns eligible as tool centers, from `out_start`.
    pub out_columns: u32,
    /// Strip columns between output points.
    pub x_step: u32,
    /// Value where the tool meets no terrain.
    pub oob_z: f32,
}

impl RadialJob<'_> {
    /// Output points per angle.
    pub fn out_width(&self) -> usize {
        (self.out_columns as usize).div_ceil(self.x_step.max(1) as usize)
    }

    /// Strip columns solved as tool centers.
    pub fn out_range(&self) -> Range<usize> {
        let start = self.out_start as usize;
        start..start + self.out_columns as usize
    }

    /// Angle in degrees of batch entry `i`.
    pub fn angle_deg(&self, i: u32) -> f32 {
        (self.first_angle + i) as f32 * self.angle_step_deg
    }

    /// Number of output values, angle-major.
    pub fn len(&self) -> usize {
        self.out_width() * self.angle_count as usize
    }

    /// True if the batch produces nothing.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Executes collision jobs.
///
/// Implementations call [`DispatchTracker::dispatched`] when a launch is
/// submitted and [`DispatchTracker::read_back`] once its results are on the
/// host; the caller owns `finish` and `fail`.
pub trait ComputeBackend {
    /// Short name for logs and reports.
    fn name(&self) -> &str;

    /// Largest single buffer the backend can bind, if it has such a limit.
    fn binding_limit(&self) -> Option<u64>;

    /// Most angles one radial launch may carry, if the backend is limited.
    fn max_batch_angles(&self) -> Option<usize> {
        None
    }

    /// Solve a planar job. Returns `scanlines * points_per_line` values, row-major.
    fn solve_planar(&self, job: &PlanarJob<'_>, tracker: &mut DispatchTracker) -> Result<Vec<f32>>;

    /// Solve a radial batch. Returns `angle_count * out_width` values, angle-major.
    fn solve_radial(&self, job: &RadialJob<'_>, tracker: &mut DispatchTracker) -> Result<Vec<f32>>;
}

impl<B: ComputeBackend + ?Sized> ComputeBackend for Box<B> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn binding_limit(&self) -> Option<u64> {
        (**self).binding_limit()
    }

    fn max_batch_angles(&self) -> Option<usize> {
        (**self).max_batch_angles()
    }

    fn solve_planar(&self, job: &PlanarJob<'_>, tracker: &mut DispatchTracker) -> Result<Vec<f32>> {
        (**self).solve_planar(job, tracker)
    }

    fn solve_radial(&self, job: &RadialJob<'_>, tracker: &mut DispatchTracker) -> Result<Vec<f32>> {
        (**self).solve_radial(job, tracker)
    }
}
