//! Job files: meshes, bounds and optional settings as JSON.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use heightcut_path::PathSettings;
use heightcut_raster::Aabb;
use serde::Deserialize;

/// One generation request.
#[derive(Debug, Deserialize)]
pub struct Job {
    /// Terrain triangles, 9 floats each.
    pub terrain: Vec<f32>,
    /// Tool triangles, 9 floats each.
    pub tool: Vec<f32>,
    /// Scan bounds; the whole terrain when absent.
    #[serde(default)]
    pub bounds: Option<Aabb>,
    /// Settings embedded in the job.
    #[serde(default)]
    pub settings: Option<PathSettings>,
}

impl Job {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read job {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("invalid job {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Settings from `config` if given, else from the job itself.
    pub fn settings(&self, config: Option<&Path>) -> Result<PathSettings> {
        match (config, &self.settings) {
            (Some(path), _) => load_settings(path),
            (None, Some(settings)) => Ok(settings.clone()),
            (None, None) => {
                anyhow::bail!("no settings: pass --config or add \"settings\" to the job")
            }
        }
    }
}

pub fn load_settings(path: &Path) -> Result<PathSettings> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read settings {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("invalid settings {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const JOB: &str = r#"{
        "terrain": [0, 0, 0, 1, 0, 0, 1, 1, 0],
        "tool": [],
        "bounds": { "min": [0, 0, 0], "max": [1, 1, 0] },
        "settings": {
            "grid_step": 0.5,
            "x_step": 1,
            "y_step": 1,
            "angle_step_deg": 10.0,
            "oob_z": -10.0,
            "tiling": {
                "memory_budget_bytes": 1048576,
                "safety_margin": 0.8,
                "min_tile_size": 16,
                "auto_tiling": true
            },
            "workers": 2,
            "readback_timeout_ms": 5000
        }
    }"#;

    #[test]
    fn test_parse_job_with_settings() {
        let job = Job::parse(JOB).unwrap();
        assert_eq!(job.terrain.len(), 9);
        assert!(job.tool.is_empty());
        assert_eq!(job.bounds.unwrap().max, [1.0, 1.0, 0.0]);
        let settings = job.settings(None).unwrap();
        assert_eq!(settings.grid_step, 0.5);
        assert_eq!(settings.workers, 2);
    }

    #[test]
    fn test_missing_settings() {
        let job = Job::parse(r#"{ "terrain": [], "tool": [] }"#).unwrap();
        assert!(job.bounds.is_none());
        assert!(job.settings(None).is_err());
    }
}
