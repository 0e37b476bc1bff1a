use anyhow::{Context, Result};
use directories::ProjectDirs;
use log::debug;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use voxshift_core::ParameterSnapshot;

/// Startup settings. Read once, never written back.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct AppConfig {
    #[serde(default = "default_input")]
    pub input: String,
    #[serde(default = "default_sink")]
    pub sink: String,
    #[serde(default)]
    pub gain_db: f32,
    #[serde(default = "default_pitch")]
    pub pitch: f32,
    #[serde(default)]
    pub eq_low_db: f32,
    #[serde(default)]
    pub eq_mid_db: f32,
    #[serde(default)]
    pub eq_high_db: f32,
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    #[serde(default = "default_control")]
    pub control: bool,
}

fn default_input() -> String {
    "default".to_string()
}

fn default_sink() -> String {
    "stdout".to_string()
}

fn default_pitch() -> f32 {
    1.0
}

fn default_read_timeout_ms() -> u64 {
    20 // one frame
}

fn default_control() -> bool {
    true
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            input: default_input(),
            sink: default_sink(),
            gain_db: 0.0,
            pitch: default_pitch(),
            eq_low_db: 0.0,
            eq_mid_db: 0.0,
            eq_high_db: 0.0,
            read_timeout_ms: default_read_timeout_ms(),
            control: default_control(),
        }
    }
}

impl AppConfig {
    /// Loads `explicit` if given (it must exist), else the per-user config
    /// file if present, else defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        match config_path() {
            Some(path) if path.exists() => Self::from_file(&path),
            _ => {
                debug!("No config file, using defaults");
                Ok(Self::default())
            }
        }
    }

    fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config = serde_json::from_str(&content)
            .with_context(|| format!("Invalid config {}", path.display()))?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn initial_parameters(&self) -> ParameterSnapshot {
        ParameterSnapshot {
            gain: db_to_linear(self.gain_db),
            pitch_factor: self.pitch,
            eq_low_db: self.eq_low_db,
            eq_mid_db: self.eq_mid_db,
            eq_high_db: self.eq_high_db,
        }
    }
}

pub fn db_to_linear(db: f32) -> f32 {
    10.0_f32.powf(db / 20.0)
}

fn config_path() -> Option<PathBuf> {
    ProjectDirs::from("com", "voxshift", "voxshift").map(|dirs| dirs.config_dir().join("config.json"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        let config = AppConfig::default();
        assert_eq!(config.input, "default");
        assert_eq!(config.sink, "stdout");
        assert_eq!(config.gain_db, 0.0);
        assert_eq!(config.pitch, 1.0);
        assert_eq!(config.read_timeout_ms, 20);
        assert!(config.control);
    }

    #[test]
    fn test_config_deserialization_with_defaults() {
        // Minimal JSON - should fill in defaults
        let json = r#"{"input":"USB Mic","eq_low_db":4.5}"#;
        let config: AppConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.input, "USB Mic");
        assert_eq!(config.eq_low_db, 4.5);
        assert_eq!(config.sink, "stdout"); // Default
        assert_eq!(config.pitch, 1.0); // Default
    }

    #[test]
    fn test_initial_parameters() {
        let config = AppConfig {
            gain_db: 20.0,
            pitch: 1.5,
            eq_mid_db: -3.0,
            ..AppConfig::default()
        };
        let params = config.initial_parameters();
        assert!((params.gain - 10.0).abs() < 1e-4);
        assert_eq!(params.pitch_factor, 1.5);
        assert_eq!(params.eq_mid_db, -3.0);

        let unity = AppConfig::default().initial_parameters();
        assert_eq!(unity.gain, 1.0);
    }

    #[test]
    fn test_db_to_linear() {
        assert_eq!(db_to_linear(0.0), 1.0);
        assert!((db_to_linear(6.0) - 1.9953).abs() < 1e-3);
        assert!((db_to_linear(-20.0) - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_load_explicit_file() {
        let path = std::env::temp_dir().join(format!("voxshift-config-{}.json", std::process::id()));
        fs::write(&path, r#"{"sink":"wav:/tmp/take.wav","pitch":0.5}"#).unwrap();

        let config = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(config.sink, "wav:/tmp/take.wav");
        assert_eq!(config.pitch, 0.5);

        fs::write(&path, "not json").unwrap();
        assert!(AppConfig::load(Some(&path)).is_err());
        let _ = fs::remove_file(&path);

        assert!(AppConfig::load(Some(&path)).is_err());
    }
}
