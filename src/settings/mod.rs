use anyhow::{Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::audio::engine::{MAX_GAIN_DB, MIN_GAIN_DB};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioSettings {
    pub sample_rate: u32,
    pub block_size: u32,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            block_size: 256,
        }
    }
}

impl AudioSettings {
    /// Whether audio at `sample_rate` can run without resampling at the configured rate.
    pub const fn matches_sample_rate(&self, sample_rate: u32) -> bool {
        self.sample_rate == sample_rate
    }
}

impl std::fmt::Display for AudioSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Sample Rate: {}", self.sample_rate)?;
        writeln!(f, "Block Size: {}", self.block_size)?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub audio: AudioSettings,
    pub preset_dir: String,
    pub input_gain_db: f32,
    pub output_gain_db: f32,
    pub selected_preset: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            audio: AudioSettings::default(),
            preset_dir: "./presets".to_string(),
            input_gain_db: 0.0,
            output_gain_db: 0.0,
            selected_preset: None,
        }
    }
}

impl std::fmt::Display for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "------------------------------")?;
        writeln!(f, "Audio Settings:")?;
        writeln!(f, "{}", self.audio)?;
        writeln!(f, "Preset Directory: {}", self.preset_dir)?;
        writeln!(f, "Input Gain: {} dB", self.input_gain_db)?;
        writeln!(f, "Output Gain: {} dB", self.output_gain_db)?;
        writeln!(
            f,
            "Selected Preset: {}",
            self.selected_preset.as_deref().unwrap_or("None")
        )?;
        Ok(())
    }
}

impl Settings {
    /// Load from the user config directory, writing defaults there if nothing exists yet.
    pub fn load() -> Result<Self> {
        let settings_path = Self::get_settings_path();

        if settings_path.exists() {
            Self::load_from(&settings_path)
        } else {
            info!("No settings file found, using defaults");
            let settings = Self::default();
            // Try to save defaults, but don't fail if we can't
            let _ = settings.save();
            Ok(settings)
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).context("Failed to read settings file")?;
        let settings: Self = serde_json::from_str(&contents).context("Failed to parse settings")?;
        debug!("Loaded settings from {}", path.display());
        Ok(settings.clamped())
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::get_settings_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let json = serde_json::to_string_pretty(self).context("Failed to serialize settings")?;
        fs::write(path, json).context("Failed to write settings file")?;

        debug!("Saved settings to {}", path.display());
        Ok(())
    }

    /// Preset to load when none is named explicitly. Blank names count as none.
    pub fn default_preset(&self) -> Option<&str> {
        self.selected_preset
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }

    /// Gains pulled into the supported range.
    fn clamped(mut self) -> Self {
        self.input_gain_db = self.input_gain_db.clamp(MIN_GAIN_DB, MAX_GAIN_DB);
        self.output_gain_db = self.output_gain_db.clamp(MIN_GAIN_DB, MAX_GAIN_DB);
        self
    }

    pub fn get_settings_path() -> PathBuf {
        const SETTINGS_FILENAME: &str = "settings.json";

        if let Ok(config_dir) = std::env::var("XDG_CONFIG_HOME") {
            PathBuf::from(config_dir)
                .join("pedalboard")
                .join(SETTINGS_FILENAME)
        } else if let Ok(home) = std::env::var("HOME") {
            PathBuf::from(home)
                .join(".config")
                .join("pedalboard")
                .join(SETTINGS_FILENAME)
        } else {
            PathBuf::from(".").join(SETTINGS_FILENAME)
        }
    }
}
