//! Job settings.
//!
//! Every field is supplied by the caller; there are no built-in defaults.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{PathError, Result};

/// Memory-bounded tiling parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TilingConfig {
    /// Memory budget for one dispatch (bytes).
    pub memory_budget_bytes: u64,
    /// Fraction of the budget actually used (0 to 1].
    pub safety_margin: f32,
    /// Smallest tile side, in output points.
    pub min_tile_size: usize,
    /// Split oversized jobs into tiles instead of failing.
    pub auto_tiling: bool,
}

/// Path generation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathSettings {
    /// Rasterization step (mm).
    pub grid_step: f32,
    /// Grid cells between points along a scanline.
    pub x_step: u32,
    /// Grid cells between scanlines.
    pub y_step: u32,
    /// Degrees between radial scanlines.
    pub angle_step_deg: f32,
    /// Height reported where the tool meets no terrain.
    pub oob_z: f32,
    /// Tiling parameters.
    pub tiling: TilingConfig,
    /// Threads in the CPU worker pool.
    pub workers: usize,
    /// GPU readback timeout (ms).
    pub readback_timeout_ms: u64,
}

impl PathSettings {
    /// Validate settings.
    pub fn validate(&self) -> Result<()> {
        if !(self.grid_step > 0.0 && self.grid_step.is_finite()) {
            return Err(PathError::InvalidSettings(
                "grid_step must be positive".into(),
            ));
        }
        if self.x_step == 0 || self.y_step == 0 {
            return Err(PathError::InvalidSettings(
                "x_step and y_step must be at least 1".into(),
            ));
        }
        validate_angle_step(self.angle_step_deg)?;
        if !self.oob_z.is_finite() {
            return Err(PathError::InvalidSettings("oob_z must be finite".into()));
        }
        self.tiling.validate()?;
        if self.workers == 0 {
            return Err(PathError::InvalidSettings(
                "workers must be at least 1".into(),
            ));
        }
        if self.readback_timeout_ms == 0 {
            return Err(PathError::InvalidSettings(
                "readback_timeout_ms must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Readback timeout as a duration.
    pub fn readback_timeout(&self) -> Duration {
        Duration::from_millis(self.readback_timeout_ms)
    }
}

impl TilingConfig {
    /// Validate tiling parameters.
    pub fn validate(&self) -> Result<()> {
        if !(self.safety_margin > 0.0 && self.safety_margin <= 1.0) {
            return Err(PathError::InvalidSettings(
                "safety_margin must be in (0, 1]".into(),
            ));
        }
        if self.memory_budget_bytes == 0 {
            return Err(PathError::InvalidSettings(
                "memory_budget_bytes must be positive".into(),
            ));
        }
        if self.min_tile_size == 0 {
            return Err(PathError::InvalidSettings(
                "min_tile_size must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

pub(crate) fn validate_angle_step(angle_step_deg: f32) -> Result<()> {
    if angle_step_deg > 0.0 && angle_step_deg <= 360.0 {
        Ok(())
    } else {
        Err(PathError::InvalidSettings(
            "angle_step_deg must be in (0, 360]".into(),
        ))
    }
}
