//! Application settings structs, defaults and TOML persistence.
//!
//! Every section uses `#[serde(default)]` so a partial `settings.toml` (or
//! one written by an older version) still loads.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::meter::OverflowPolicy;

use super::AppPaths;

// ---------------------------------------------------------------------------
// AudioConfig
// ---------------------------------------------------------------------------

/// Capture settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Name of the input device to preselect on launch. `None` selects the
    /// first device reported by the host.
    pub preferred_device: Option<String>,
    /// Open the default output device alongside the input and feed it
    /// silence.
    pub passthrough_output: bool,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            preferred_device: None,
            passthrough_output: true,
        }
    }
}

// ---------------------------------------------------------------------------
// MeterConfig
// ---------------------------------------------------------------------------

/// Brightness mapping settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeterConfig {
    /// How cubic results above 255 are folded into a byte.
    pub overflow: OverflowPolicy,
}

// ---------------------------------------------------------------------------
// UiConfig
// ---------------------------------------------------------------------------

/// Window and UI-loop settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    /// Initial inner window size in logical pixels.
    pub window_size: (f32, f32),
    /// Keep the window above all others.
    pub always_on_top: bool,
    /// Repaint interval while capture is running, in milliseconds.
    pub repaint_interval_ms: u64,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            window_size: (360.0, 220.0),
            always_on_top: false,
            repaint_interval_ms: 16,
        }
    }
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level application configuration, serialised as `settings.toml`.
///
/// ```rust,no_run
/// use peak_meter::config::AppConfig;
///
/// // Load (returns Default when file is missing)
/// let mut config = AppConfig::load().unwrap();
/// config.audio.preferred_device = Some("USB Mic".into());
/// config.save().unwrap();
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub audio: AudioConfig,
    pub meter: MeterConfig,
    pub ui: UiConfig,
}

impl AppConfig {
    /// Load configuration from the platform-appropriate `settings.toml`.
    ///
    /// Returns `Ok(AppConfig::default())` when the file does not exist yet.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    /// Load from an explicit path (useful for tests).
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config.sanitized())
    }

    /// Save configuration to the platform-appropriate `settings.toml`,
    /// creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&AppPaths::new().settings_file)
    }

    /// Save to an explicit path (useful for tests).
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Replace values that would break the UI loop with their defaults.
    fn sanitized(mut self) -> Self {
        if self.ui.repaint_interval_ms == 0 {
            let fallback = UiConfig::default().repaint_interval_ms;
            log::warn!("ui.repaint_interval_ms must be > 0; using {fallback}");
            self.ui.repaint_interval_ms = fallback;
        }
        self
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
