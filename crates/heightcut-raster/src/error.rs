//! Error types for rasterization.

use thiserror::Error;

/// Errors that can occur while rasterizing meshes or building height maps.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RasterError {
    /// Triangle buffer length is not a multiple of nine floats.
    #[error("triangle buffer has {0} floats, expected a multiple of 9")]
    MalformedBuffer(usize),

    /// Point buffer length is not a multiple of three floats.
    #[error("point buffer has {0} floats, expected a multiple of 3")]
    MalformedPoints(usize),

    /// Bounds are empty or inverted on an axis.
    #[error("invalid bounds on {axis} axis: min {min} >= max {max}")]
    InvalidBounds {
        /// Axis name ("x" or "y").
        axis: &'static str,
        /// Lower bound.
        min: f32,
        /// Upper bound.
        max: f32,
    },

    /// Step size is zero, negative or not finite.
    #[error("invalid step size: {0}")]
    InvalidStep(f32),
}

/// Result type for raster operations.
pub type Result<T> = std::result::Result<T, RasterError>;
