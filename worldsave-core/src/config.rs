//! Configuration for the save system
//!
//! [`SaveConfig`] selects where saves live, how they are named and how they
//! are encoded. It is usually loaded from a JSON file shipped with the game
//! and validated before a service is built from it.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::codec::SnapshotCodec;
use crate::compression::{GzipCompressor, NoCompression};
use crate::rotation::{AutoSaveTimer, RotationPolicy};
use crate::storage::local::DEFAULT_EXTENSION;
use crate::storage::validate_save_name;
use crate::{Result, SaveError};

/// Compression stage applied to encoded snapshots
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "algorithm", rename_all = "snake_case")]
pub enum CompressionConfig {
    #[default]
    None,
    Gzip { level: u32 },
}

/// Save system settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SaveConfig {
    /// Directory holding one file per save
    pub save_dir: PathBuf,
    /// File extension appended to save names
    pub extension: String,
    /// Reserved name used by quick save and quick load
    pub quick_save_name: String,
    pub autosave_prefix: String,
    /// Number of auto-saves retained
    pub autosave_slots: u32,
    /// Seconds of unpaused play between auto-saves; `0` disables the timer
    pub autosave_interval_secs: f64,
    pub compression: CompressionConfig,
    /// Game version stamped into every save
    pub version_tag: String,
}

impl Default for SaveConfig {
    fn default() -> Self {
        Self {
            save_dir: PathBuf::from("saves"),
            extension: DEFAULT_EXTENSION.to_string(),
            quick_save_name: "quicksave".to_string(),
            autosave_prefix: "autosave".to_string(),
            autosave_slots: 3,
            autosave_interval_secs: 300.0,
            compression: CompressionConfig::None,
            version_tag: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl SaveConfig {
    /// Default settings rooted at `save_dir`
    pub fn with_save_dir<P: AsRef<Path>>(save_dir: P) -> Self {
        Self {
            save_dir: save_dir.as_ref().to_path_buf(),
            ..Self::default()
        }
    }

    /// Load and validate a JSON config file; missing keys take defaults
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| {
            SaveError::storage(format!("Failed to read config {}: {}", path.display(), e))
        })?;
        let config: SaveConfig = serde_json::from_slice(&bytes)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.save_dir.as_os_str().is_empty() {
            return Err(SaveError::validation("save_dir cannot be empty"));
        }
        if self.extension.contains(['/', '\\']) {
            return Err(SaveError::validation(format!(
                "extension '{}' must not contain path separators",
                self.extension
            )));
        }
        validate_save_name(&self.quick_save_name)?;
        validate_save_name(&self.autosave_prefix)?;
        if self.autosave_slots == 0 {
            return Err(SaveError::validation("autosave_slots must be at least 1"));
        }
        if !self.autosave_interval_secs.is_finite() || self.autosave_interval_secs < 0.0 {
            return Err(SaveError::validation(format!(
                "autosave_interval_secs must be a non-negative number, got {}",
                self.autosave_interval_secs
            )));
        }
        if let CompressionConfig::Gzip { level } = self.compression {
            if level > 9 {
                return Err(SaveError::validation(format!(
                    "gzip level must be between 0 and 9, got {level}"
                )));
            }
        }
        if self.version_tag.trim().is_empty() {
            return Err(SaveError::validation("version_tag cannot be empty"));
        }
        Ok(())
    }

    pub fn build_codec(&self) -> SnapshotCodec {
        match self.compression {
            CompressionConfig::None => SnapshotCodec::with_compressor(NoCompression::new()),
            CompressionConfig::Gzip { level } => {
                SnapshotCodec::with_compressor(GzipCompressor::with_level(level))
            }
        }
    }

    pub fn build_rotation(&self) -> Result<RotationPolicy> {
        RotationPolicy::new(self.autosave_prefix.clone(), self.autosave_slots)
    }

    pub fn build_timer(&self) -> AutoSaveTimer {
        AutoSaveTimer::new(self.autosave_interval_secs)
    }
}
