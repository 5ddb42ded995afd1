//! Editor configuration
//!
//! Read from `flowplan.json` in a configuration directory. Every section
//! and field is optional; missing values fall back to the defaults in
//! `constants`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants::{autosave, canvas, config, history};
use crate::layout::LayoutConfig;

/// Undo/redo settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HistoryConfig {
    /// Commands kept on the undo stack; older ones are evicted
    pub capacity: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            capacity: history::CAPACITY,
        }
    }
}

/// Viewport limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CanvasConfig {
    pub min_zoom: f64,
    pub max_zoom: f64,
    pub default_zoom: f64,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            min_zoom: canvas::MIN_ZOOM,
            max_zoom: canvas::MAX_ZOOM,
            default_zoom: canvas::DEFAULT_ZOOM,
        }
    }
}

/// Autosave settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AutosaveConfig {
    pub enabled: bool,
    /// Quiet period after the last change before a save
    pub interval_ms: u64,
    /// Directory for the autosave file; in-memory storage when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// Upper bound on the stored size in bytes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quota_bytes: Option<usize>,
    /// zstd-compress the saved document
    pub compress: bool,
}

impl Default for AutosaveConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: autosave::INTERVAL_MS,
            path: None,
            quota_bytes: None,
            compress: false,
        }
    }
}

/// Full editor configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EditorConfig {
    pub history: HistoryConfig,
    pub layout: LayoutConfig,
    pub canvas: CanvasConfig,
    pub autosave: AutosaveConfig,
}

impl EditorConfig {
    /// Load configuration from `dir`, or defaults if no file exists
    pub fn load(dir: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config_path = dir.as_ref().join(config::FILE_NAME);

        if !config_path.exists() {
            log::debug!("No configuration at {:?}, using defaults", config_path);
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(&config_path)?;
        let loaded: Self = serde_json::from_str(&contents).map_err(ConfigError::Parse)?;
        log::info!("Configuration loaded from {:?}", config_path);
        Ok(loaded.sanitized())
    }

    /// Save configuration to `dir`, creating it if needed
    pub fn save(&self, dir: impl AsRef<Path>) -> Result<PathBuf, ConfigError> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;

        let config_path = dir.join(config::FILE_NAME);
        let contents = serde_json::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        std::fs::write(&config_path, contents)?;

        log::info!("Configuration saved to {:?}", config_path);
        Ok(config_path)
    }

    /// Clamp values that would make the editor unusable
    fn sanitized(mut self) -> Self {
        if self.history.capacity == 0 {
            log::warn!("history.capacity must be at least 1, using {}", history::CAPACITY);
            self.history.capacity = history::CAPACITY;
        }
        let canvas = &self.canvas;
        let unusable = [canvas.min_zoom, canvas.max_zoom, canvas.default_zoom]
            .iter()
            .any(|zoom| !zoom.is_finite());
        if unusable || canvas.min_zoom <= 0.0 || canvas.max_zoom < canvas.min_zoom {
            log::warn!("Invalid zoom limits, using defaults");
            self.canvas = CanvasConfig::default();
        }
        self.canvas.default_zoom = self
            .canvas
            .default_zoom
            .clamp(self.canvas.min_zoom, self.canvas.max_zoom);
        self
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(serde_json::Error),
    #[error("Failed to serialize config: {0}")]
    Serialize(serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = EditorConfig::load(dir.path()).unwrap();
        assert_eq!(config, EditorConfig::default());
        assert_eq!(config.history.capacity, 50);
        assert_eq!(config.autosave.interval_ms, 5000);
        assert_eq!(config.layout.vertical_spacing, 120.0);
    }

    #[test]
    fn test_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("flowplan.json"),
            r#"{"history": {"capacity": 10}, "layout": {"padding": 40}, "autosave": {"compress": true}}"#,
        )
        .unwrap();

        let config = EditorConfig::load(dir.path()).unwrap();
        assert_eq!(config.history.capacity, 10);
        assert_eq!(config.layout.padding, 40.0);
        assert_eq!(config.layout.horizontal_spacing, 150.0);
        assert!(config.autosave.compress);
        assert!(config.autosave.enabled);
        assert_eq!(config.canvas, CanvasConfig::default());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = EditorConfig::default();
        config.autosave.path = Some(dir.path().join("saves"));
        config.autosave.quota_bytes = Some(4096);
        config.canvas.max_zoom = 2.0;

        let path = config.save(dir.path().join("conf")).unwrap();
        assert!(path.ends_with("flowplan.json"));
        assert_eq!(EditorConfig::load(dir.path().join("conf")).unwrap(), config);
    }

    #[test]
    fn test_unusable_values_are_clamped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("flowplan.json"),
            r#"{"history": {"capacity": 0}, "canvas": {"minZoom": 2.0, "maxZoom": 1.0}}"#,
        )
        .unwrap();

        let config = EditorConfig::load(dir.path()).unwrap();
        assert_eq!(config.history.capacity, 50);
        assert_eq!(config.canvas, CanvasConfig::default());
    }

    #[test]
    fn test_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("flowplan.json"), "{").unwrap();
        assert!(matches!(
            EditorConfig::load(dir.path()),
            Err(ConfigError::Parse(_))
        ));
    }
}
