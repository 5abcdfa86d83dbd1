//! Tracker configuration
//!
//! Loaded from `config.json` in the platform configuration directory:
//! - macOS: ~/Library/Application Support/satvis/
//! - Linux: ~/.config/satvis/
//! - Windows: %APPDATA%\satvis\config\
//!
//! Every field is optional in the file; missing values fall back to defaults.

use anyhow::{Context, Result};
use bevy::prelude::*;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Sliding sample window parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    /// Spacing between samples in seconds
    pub step_secs: f64,
    /// Samples before the reference epoch
    pub backward_steps: u32,
    /// Samples after the reference epoch
    pub forward_steps: u32,
    /// Drift from the reference epoch that forces a rebuild
    pub refresh_threshold_secs: f64,
    /// Upper bound of the random offset added to each refresh
    pub max_jitter_secs: f64,
    /// Fixed seed for the jitter source (deterministic runs)
    pub jitter_seed: Option<u64>,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            step_secs: 30.0,
            backward_steps: 120,
            forward_steps: 150,
            refresh_threshold_secs: 15.0 * 60.0,
            max_jitter_secs: 15.0 * 60.0,
            jitter_seed: None,
        }
    }
}

/// Visibility search parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransitConfig {
    /// Coarse scan step in seconds
    pub coarse_step_secs: f64,
    /// Target precision of rise/set/culmination times in seconds
    pub precision_secs: f64,
    /// Passes shorter than this are discarded as grazes
    pub min_duration_secs: f64,
    pub min_elevation_deg: f64,
    /// Objects with a longer period never set and yield no transits
    pub geostationary_period_hours: f64,
    /// Cached range kept behind "now"
    pub lookbehind_secs: f64,
    /// Cached range kept ahead of "now"
    pub lookahead_secs: f64,
}

impl Default for TransitConfig {
    fn default() -> Self {
        Self {
            coarse_step_secs: 60.0,
            precision_secs: 1.0,
            min_duration_secs: 5.0,
            min_elevation_deg: 0.0,
            geostationary_period_hours: 12.0,
            lookbehind_secs: 86_400.0,
            lookahead_secs: 7.0 * 86_400.0,
        }
    }
}

/// Shared primitive construction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Members folded into the pending primitive per clock tick
    pub members_per_step: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            members_per_step: 256,
        }
    }
}

/// Label placement in screen pixels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelConfig {
    pub offset_px: [f32; 2],
    /// Offset used while a 3D model is shown for the same object
    pub model_offset_px: [f32; 2],
}

impl Default for LabelConfig {
    fn default() -> Self {
        Self {
            offset_px: [15.0, 0.0],
            model_offset_px: [30.0, -10.0],
        }
    }
}

/// Top-level tracker configuration resource
#[derive(Resource, Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub sampling: SamplingConfig,
    pub transits: TransitConfig,
    pub batching: BatchConfig,
    pub labels: LabelConfig,
}

impl TrackerConfig {
    /// Default configuration file location
    pub fn default_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("", "", "satvis")
            .ok_or_else(|| anyhow::anyhow!("Failed to resolve config directory"))?;
        Ok(proj_dirs.config_dir().join("config.json"))
    }

    /// Load from the platform config directory, falling back to defaults when
    /// no file exists.
    pub fn load() -> Result<Self> {
        let path = Self::default_path()?;
        if !path.exists() {
            info!("no config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: TrackerConfig = serde_json::from_str(&contents)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn unique_temp_dir(test_name: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        std::env::temp_dir().join(format!(
            "satvis-config-{}-{}-{}",
            test_name,
            std::process::id(),
            nanos
        ))
    }

    #[test]
    fn test_defaults_match_window_layout() {
        let config = TrackerConfig::default();
        assert_eq!(config.sampling.step_secs, 30.0);
        assert_eq!(config.sampling.backward_steps, 120);
        assert_eq!(config.sampling.forward_steps, 150);
        assert_eq!(config.sampling.refresh_threshold_secs, 900.0);
        assert!(config.transits.precision_secs <= 10.0);
    }

    #[test]
    fn test_partial_file_fills_missing_fields() {
        let config: TrackerConfig =
            serde_json::from_str(r#"{ "sampling": { "step_secs": 60.0 } }"#).unwrap();
        assert_eq!(config.sampling.step_secs, 60.0);
        assert_eq!(config.sampling.forward_steps, 150);
        assert_eq!(config.transits, TransitConfig::default());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = unique_temp_dir("roundtrip");
        let path = dir.join("config.json");
        let mut config = TrackerConfig::default();
        config.sampling.jitter_seed = Some(7);
        config.transits.min_elevation_deg = 10.0;

        config.save_to(&path).expect("save");
        let loaded = TrackerConfig::load_from(&path).expect("load");
        assert_eq!(loaded, config);

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_load_from_reports_malformed_json() {
        let dir = unique_temp_dir("malformed");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.json");
        fs::write(&path, "{ not json").unwrap();

        let err = TrackerConfig::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("parsing config"));

        let _ = fs::remove_dir_all(dir);
    }
}
