use std::path::{Path, PathBuf};
use std::time::Duration;

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::slot::{ConflictPolicy, PickerRequest};

/// Save behaviour settings, read from a TOML file. Every field has a
/// default, so an empty file is a valid configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SaveConfig {
    /// Reserved name of the automatic slot.
    pub autosave_slot: String,
    pub autosave_interval_secs: f64,
    pub conflict_policy: ConflictPolicy,
    /// Prefix for generated manual slot names.
    pub manual_slot_prefix: String,
    pub picker: PickerConfig,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PickerConfig {
    pub save_title: String,
    pub load_title: String,
    pub max_slots: u32,
    pub allow_delete: bool,
}

impl Default for SaveConfig {
    fn default() -> Self {
        Self {
            autosave_slot: "AutoSave".to_string(),
            autosave_interval_secs: 30.0,
            conflict_policy: ConflictPolicy::LongestPlaytime,
            manual_slot_prefix: "Save".to_string(),
            picker: PickerConfig::default(),
        }
    }
}

impl Default for PickerConfig {
    fn default() -> Self {
        Self {
            save_title: "Save game".to_string(),
            load_title: "Load game".to_string(),
            max_slots: 4,
            allow_delete: true,
        }
    }
}

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("config file not found at {0}")]
    #[diagnostic(code(config::not_found))]
    NotFound(PathBuf),

    #[error("failed to parse config: {0}")]
    #[diagnostic(code(config::parse_error))]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    #[diagnostic(code(config::invalid))]
    Invalid(String),

    #[error("io error: {0}")]
    #[diagnostic(code(config::io_error))]
    Io(#[from] std::io::Error),
}

impl SaveConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Reads `path` when it exists, defaults otherwise.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        match Self::load(path) {
            Err(ConfigError::NotFound(_)) => Ok(Self::default()),
            other => other,
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: SaveConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.autosave_slot.trim().is_empty() {
            return Err(ConfigError::Invalid("autosave_slot is empty".to_string()));
        }
        if !self.autosave_interval_secs.is_finite() || self.autosave_interval_secs < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "autosave_interval_secs must be a non-negative number, got {}",
                self.autosave_interval_secs
            )));
        }
        if self.manual_slot_prefix.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "manual_slot_prefix is empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn autosave_interval(&self) -> Duration {
        Duration::try_from_secs_f64(self.autosave_interval_secs).unwrap_or(Duration::MAX)
    }

    pub fn is_automatic_slot(&self, name: &str) -> bool {
        name == self.autosave_slot
    }

    pub(crate) fn save_picker(&self) -> PickerRequest {
        PickerRequest {
            title: self.picker.save_title.clone(),
            max_slots: self.picker.max_slots,
            allow_create: true,
            allow_delete: self.picker.allow_delete,
        }
    }

    pub(crate) fn load_picker(&self) -> PickerRequest {
        PickerRequest {
            title: self.picker.load_title.clone(),
            max_slots: self.picker.max_slots,
            allow_create: false,
            allow_delete: self.picker.allow_delete,
        }
    }
}
