use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::pdf::ZoomLimits;

const SETTINGS_FILENAME: &str = "config.yaml";
const APP_NAME: &str = "pageturn";

/// Page presentation mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ViewerMode {
    /// All pages stacked vertically, rendered as they scroll into view
    #[default]
    Continuous,
    /// One page at a time with a cross-fade between pages
    SinglePage,
}

impl ViewerMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViewerMode::Continuous => "continuous",
            ViewerMode::SinglePage => "single_page",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("failed to read settings file {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to write settings file {path:?}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse settings file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("failed to serialize settings: {0}")]
    Serialize(#[from] serde_yaml::Error),

    #[error("invalid setting: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewerSettings {
    #[serde(default)]
    pub mode: ViewerMode,

    /// Maximum number of rendered pages kept in the page buffer
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,

    /// Pages on each side of the current page that survive eviction
    #[serde(default = "default_protect_radius")]
    pub protect_radius: usize,

    #[serde(default = "default_min_zoom")]
    pub min_zoom: f32,

    #[serde(default = "default_max_zoom")]
    pub max_zoom: f32,

    #[serde(default = "default_zoom_step")]
    pub zoom_step: f32,

    /// Start rendering pages this far before they scroll into view
    #[serde(default = "default_lookahead_px")]
    pub lookahead_px: f32,

    /// Release a page's pixels once it is this far from the viewport
    #[serde(default = "default_clear_distance_px")]
    pub clear_distance_px: f32,

    #[serde(default = "default_page_gap_px")]
    pub page_gap_px: f32,

    #[serde(default = "default_scroll_throttle_ms")]
    pub scroll_throttle_ms: u64,

    /// Delay before the single automatic render retry
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Cross-fade duration in single-page mode
    #[serde(default = "default_transition_ms")]
    pub transition_ms: u64,
}

fn default_buffer_capacity() -> usize {
    10
}

fn default_protect_radius() -> usize {
    2
}

fn default_min_zoom() -> f32 {
    0.5
}

fn default_max_zoom() -> f32 {
    3.0
}

fn default_zoom_step() -> f32 {
    0.25
}

fn default_lookahead_px() -> f32 {
    200.0
}

fn default_clear_distance_px() -> f32 {
    1000.0
}

fn default_page_gap_px() -> f32 {
    10.0
}

fn default_scroll_throttle_ms() -> u64 {
    100
}

fn default_retry_delay_ms() -> u64 {
    250
}

fn default_transition_ms() -> u64 {
    150
}

impl Default for ViewerSettings {
    fn default() -> Self {
        Self {
            mode: ViewerMode::default(),
            buffer_capacity: default_buffer_capacity(),
            protect_radius: default_protect_radius(),
            min_zoom: default_min_zoom(),
            max_zoom: default_max_zoom(),
            zoom_step: default_zoom_step(),
            lookahead_px: default_lookahead_px(),
            clear_distance_px: default_clear_distance_px(),
            page_gap_px: default_page_gap_px(),
            scroll_throttle_ms: default_scroll_throttle_ms(),
            retry_delay_ms: default_retry_delay_ms(),
            transition_ms: default_transition_ms(),
        }
    }
}

pub fn preferred_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|config| config.join(APP_NAME).join(SETTINGS_FILENAME))
}

impl ViewerSettings {
    /// Load from the user config directory, writing defaults on first run
    pub fn load() -> Result<Self, SettingsError> {
        let Some(path) = preferred_config_path() else {
            warn!("Could not determine config directory, using default settings");
            return Ok(Self::default());
        };

        if path.exists() {
            return Self::load_from(&path);
        }

        info!("Settings file not found, creating with defaults at {path:?}");
        let settings = Self::default();
        if let Err(e) = settings.save_to(&path) {
            warn!("{e}");
        }
        Ok(settings)
    }

    pub fn load_from(path: &Path) -> Result<Self, SettingsError> {
        let content = fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let settings: Self =
            serde_yaml::from_str(&content).map_err(|source| SettingsError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        settings.validate()?;
        debug!("Loaded settings from {path:?}");
        Ok(settings)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(|source| SettingsError::Write {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        let content = serde_yaml::to_string(self)?;
        fs::write(path, content).map_err(|source| SettingsError::Write {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("Saved settings to {path:?}");
        Ok(())
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.buffer_capacity == 0 {
            return Err(SettingsError::Invalid(
                "buffer_capacity must be at least 1".to_string(),
            ));
        }
        if !(self.min_zoom > 0.0 && self.min_zoom <= self.max_zoom) {
            return Err(SettingsError::Invalid(format!(
                "zoom range [{}, {}] is empty or not positive",
                self.min_zoom, self.max_zoom
            )));
        }
        if !(self.zoom_step.is_finite() && self.zoom_step > 0.0) {
            return Err(SettingsError::Invalid(format!(
                "zoom_step {} must be positive",
                self.zoom_step
            )));
        }
        if self.lookahead_px < 0.0 || self.clear_distance_px < 0.0 || self.page_gap_px < 0.0 {
            return Err(SettingsError::Invalid(
                "pixel distances must not be negative".to_string(),
            ));
        }
        Ok(())
    }

    pub fn zoom_limits(&self) -> ZoomLimits {
        ZoomLimits {
            min: self.min_zoom,
            max: self.max_zoom,
            step: self.zoom_step,
        }
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn scroll_throttle(&self) -> Duration {
        Duration::from_millis(self.scroll_throttle_ms)
    }

    pub fn transition(&self) -> Duration {
        Duration::from_millis(self.transition_ms)
    }
}
