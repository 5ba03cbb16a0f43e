//! Error types for path generation.

use heightcut_raster::RasterError;
use thiserror::Error;

/// Errors that can occur while generating a toolpath.
#[derive(Error, Debug)]
pub enum PathError {
    /// Rasterization rejected its input.
    #[error(transparent)]
    Raster(#[from] RasterError),

    /// Settings failed validation.
    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    /// A buffer does not fit the memory budget or device limit.
    #[error("{what} needs {requested} bytes, limit is {limit}; increase the step size or shrink the bounds")]
    Capacity {
        /// What was being allocated.
        what: &'static str,
        /// Requested size in bytes.
        requested: u64,
        /// Applicable limit in bytes.
        limit: u64,
    },

    /// The caller cancelled the job.
    #[error("generation cancelled")]
    Cancelled,

    /// A worker thread failed.
    #[error("worker failed: {0}")]
    Worker(String),

    /// GPU failure other than capacity.
    #[cfg(feature = "gpu")]
    #[error("GPU error: {0}")]
    Gpu(heightcut_gpu::GpuError),
}

#[cfg(feature = "gpu")]
impl From<heightcut_gpu::GpuError> for PathError {
    fn from(err: heightcut_gpu::GpuError) -> Self {
        match err {
            heightcut_gpu::GpuError::Capacity {
                buffer,
                requested,
                limit,
            } => PathError::Capacity {
                what: buffer,
                requested,
                limit,
            },
            other => PathError::Gpu(other),
        }
    }
}

/// Result type for path operations.
pub type Result<T> = std::result::Result<T, PathError>;
