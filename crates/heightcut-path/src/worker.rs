//! CPU fallback: a small pool of OS threads that share nothing.
//!
//! Each task receives owned inputs and sends its block of results back over
//! a channel; the coordinator copies the blocks into place in order.

use std::any::Any;
use std::ops::Range;
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use heightcut_raster::SparseTool;
use log::debug;

use crate::dispatch::{ComputeBackend, DispatchTracker, PlanarJob, RadialJob};
use crate::error::{PathError, Result};
use crate::solver::{solve_rows, solve_strip};

/// Spawns one named thread per submitted task.
#[derive(Debug, Clone, Copy)]
pub struct WorkerPool {
    threads: usize,
}

impl WorkerPool {
    /// A pool that splits work `threads` ways (at least one).
    pub fn new(threads: usize) -> Self {
        Self {
            threads: threads.max(1),
        }
    }

    /// Number of parts work is split into.
    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Run `work` on its own thread.
    pub fn submit<T, F>(&self, name: &str, work: F) -> Result<TaskHandle<T>>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        let thread = thread::Builder::new()
            .name(format!("heightcut-{name}"))
            .spawn(move || {
                // The receiver only disappears if the handle was dropped.
                let _ = tx.send(work());
            })
            .map_err(|e| PathError::Worker(format!("failed to spawn {name}: {e}")))?;
        Ok(TaskHandle {
            name: name.to_string(),
            rx,
            thread,
        })
    }

    /// Split `total` items into contiguous ranges, one per task.
    pub fn partition(&self, total: usize) -> Vec<Range<usize>> {
        partition_scanlines(total, self.threads)
    }
}

/// Result channel of one submitted task.
#[must_use = "a task's result is lost unless it is joined"]
pub struct TaskHandle<T> {
    name: String,
    rx: Receiver<T>,
    thread: JoinHandle<()>,
}

impl<T> TaskHandle<T> {
    /// Wait for the task. A panic in the task becomes [`PathError::Worker`].
    pub fn join(self) -> Result<T> {
        let joined = self.thread.join();
        match self.rx.recv() {
            Ok(value) => Ok(value),
            Err(_) => {
                let reason = match joined {
                    Err(payload) => panic_message(payload.as_ref()),
                    Ok(()) => "no result".to_string(),
                };
                Err(PathError::Worker(format!("{}: {}", self.name, reason)))
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panicked".to_string()
    }
}

/// Contiguous, near-equal ranges covering `0..total`, at most `parts` of them.
pub fn partition_scanlines(total: usize, parts: usize) -> Vec<Range<usize>> {
    if total == 0 {
        return Vec::new();
    }
    let chunk = total.div_ceil(parts.max(1));
    (0..total)
        .step_by(chunk)
        .map(|start| start..(start + chunk).min(total))
        .collect()
}

/// Runs jobs with the CPU solver on a [`WorkerPool`].
#[derive(Debug, Clone, Copy)]
pub struct WorkerBackend {
    pool: WorkerPool,
}

impl WorkerBackend {
    /// A backend with `threads` workers.
    pub fn new(threads: usize) -> Self {
        Self {
            pool: WorkerPool::new(threads),
        }
    }

    /// The underlying pool.
    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }
}

impl ComputeBackend for WorkerBackend {
    fn name(&self) -> &str {
        "cpu"
    }

    fn binding_limit(&self) -> Option<u64> {
        None
    }

    fn solve_planar(&self, job: &PlanarJob<'_>, tracker: &mut DispatchTracker) -> Result<Vec<f32>> {
        let terrain = Arc::new(job.terrain.clone());
        let tool = Arc::new(job.tool.clone());
        let scan = job.scan;
        let oob_z = job.oob_z;

        let ranges = self.pool.partition(scan.scanlines);
        debug!(
            "planar: {} scanlines over {} tasks",
            scan.scanlines,
            ranges.len()
        );

        tracker.dispatched();
        let mut handles = Vec::with_capacity(ranges.len());
        for (i, rows) in ranges.into_iter().enumerate() {
            let terrain = Arc::clone(&terrain);
            let tool = Arc::clone(&tool);
            handles.push(self.pool.submit(&format!("planar-{i}"), move || {
                solve_rows(&terrain, &tool, &scan, rows, oob_z)
            })?);
        }

        let out = collect(handles, scan.len())?;
        tracker.read_back();
        Ok(out)
    }

    fn solve_radial(&self, job: &RadialJob<'_>, tracker: &mut DispatchTracker) -> Result<Vec<f32>> {
        let terrain = Arc::new(job.terrain.clone());
        let tool: Arc<SparseTool> = Arc::new(job.tool.clone());
        let frame = job.frame;
        let centers = job.out_range();
        let x_step = job.x_step;
        let oob_z = job.oob_z;
        let angles: Vec<f32> = (0..job.angle_count).map(|i| job.angle_deg(i)).collect();

        tracker.dispatched();
        let mut handles = Vec::new();
        for (i, range) in self.pool.partition(angles.len()).into_iter().enumerate() {
            let terrain = Arc::clone(&terrain);
            let tool = Arc::clone(&tool);
            let batch = angles[range].to_vec();
            let centers = centers.clone();
            handles.push(self.pool.submit(&format!("radial-{i}"), move || {
                batch
                    .iter()
                    .flat_map(|&angle| {
                        let strip = terrain.rasterize_strip(angle, &frame);
                        solve_strip(&strip, &tool, centers.clone(), x_step, oob_z)
                    })
                    .collect::<Vec<f32>>()
            })?);
        }

        let out = collect(handles, job.len())?;
        tracker.read_back();
        Ok(out)
    }
}

fn collect(handles: Vec<TaskHandle<Vec<f32>>>, len: usize) -> Result<Vec<f32>> {
    let mut out = Vec::with_capacity(len);
    // Join every task before reporting the first failure.
    let results: Vec<Result<Vec<f32>>> = handles.into_iter().map(TaskHandle::join).collect();
    for block in results {
        out.extend_from_slice(&block?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::DispatchState;
    use crate::scan::ScanGrid;
    use heightcut_raster::{build_sparse_tool, create_height_map_from_points};

    #[test]
    fn test_partition_covers_range() {
        assert!(partition_scanlines(0, 4).is_empty());
        assert_eq!(partition_scanlines(10, 4), vec![0..3, 3..6, 6..9, 9..10]);
        assert_eq!(partition_scanlines(3, 8), vec![0..1, 1..2, 2..3]);
        assert_eq!(partition_scanlines(5, 0), vec![0..5]);
    }

    #[test]
    fn test_submit_and_join() {
        let pool = WorkerPool::new(2);
        let handle = pool.submit("sum", || (1..=10).sum::<u32>()).unwrap();
        assert_eq!(handle.join().unwrap(), 55);
    }

    #[test]
    fn test_panic_becomes_worker_error() {
        let pool = WorkerPool::new(1);
        let handle = pool
            .submit("boom", || -> u32 { panic!("tile exploded") })
            .unwrap();
        match handle.join() {
            Err(PathError::Worker(msg)) => {
                assert!(msg.contains("boom"));
                assert!(msg.contains("tile exploded"));
            }
            other => panic!("expected worker error, got {other:?}"),
        }
    }

    #[test]
    fn test_planar_matches_sequential() {
        let mut pts = Vec::new();
        for y in 0..13 {
            for x in 0..17 {
                pts.extend_from_slice(&[x as f32, y as f32, ((x * 7 + y * 3) % 5) as f32]);
            }
        }
        let terrain = create_height_map_from_points(&pts, 1.0, None).unwrap();
        let tool = build_sparse_tool(&[0.0, 0.0, 0.0, 1.0, 0.0, 0.5, 0.0, 1.0, 0.5], 1.0).unwrap();
        let scan = ScanGrid::new(terrain.grid(), 2, 1, None).unwrap();
        let job = PlanarJob {
            terrain: &terrain,
            tool: &tool,
            scan,
            oob_z: -9.0,
        };
        let expected = solve_rows(&terrain, &tool, &scan, 0..scan.scanlines, -9.0);

        for threads in [1, 3, 4, 32] {
            let mut tracker = DispatchTracker::new("test");
            let out = WorkerBackend::new(threads).solve_planar(&job, &mut tracker).unwrap();
            assert_eq!(out, expected, "threads {threads}");
            assert_eq!(tracker.state(), DispatchState::ReadBack);
        }
    }
}
