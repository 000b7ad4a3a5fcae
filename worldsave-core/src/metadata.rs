/*!
Save metadata and the on-disk header.
*/

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::{Result, SaveError};

/// Current on-disk format version
pub const SAVE_FORMAT_VERSION: u8 = 1;

/// How a save was requested.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SaveKind {
    #[default]
    Manual,
    Auto,
    Quick,
}

impl SaveKind {
    pub fn from_flags(is_auto: bool, is_quick: bool) -> Self {
        match (is_auto, is_quick) {
            (true, _) => SaveKind::Auto,
            (false, true) => SaveKind::Quick,
            (false, false) => SaveKind::Manual,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SaveKind::Manual => "manual",
            SaveKind::Auto => "auto",
            SaveKind::Quick => "quick",
        }
    }
}

/// Descriptive metadata carried inside every snapshot.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SaveMetadata {
    /// Save name the snapshot was written under
    pub save_name: String,

    /// When the snapshot was collected
    pub created_at: DateTime<Utc>,

    /// Elapsed play time in seconds
    pub play_time_seconds: f64,

    /// Version tag of the build that produced the save
    pub version: String,

    pub kind: SaveKind,

    /// Unique identifier for this specific snapshot
    pub snapshot_id: String,
}

impl SaveMetadata {
    /// Create metadata stamped with the current time and a fresh snapshot id.
    ///
    /// # Example
    /// ```rust
    /// use worldsave_core::{SaveKind, SaveMetadata};
    ///
    /// let metadata = SaveMetadata::new("campaign_1", SaveKind::Manual, 90.0, "0.1.0");
    /// assert_eq!(metadata.save_name, "campaign_1");
    /// ```
    pub fn new<S1, S2>(save_name: S1, kind: SaveKind, play_time_seconds: f64, version: S2) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
    {
        Self {
            save_name: save_name.into(),
            created_at: Utc::now(),
            play_time_seconds,
            version: version.into(),
            kind,
            snapshot_id: Uuid::new_v4().to_string(),
        }
    }

    /// Validate that all required fields are properly set
    pub fn validate(&self) -> Result<()> {
        if self.save_name.is_empty() {
            return Err(SaveError::validation("save_name cannot be empty"));
        }
        if self.version.is_empty() {
            return Err(SaveError::validation("version cannot be empty"));
        }
        if !self.play_time_seconds.is_finite() || self.play_time_seconds < 0.0 {
            return Err(SaveError::validation(format!(
                "play_time_seconds must be a non-negative number, got {}",
                self.play_time_seconds
            )));
        }
        Ok(())
    }
}

/// Envelope header written ahead of the snapshot body.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SaveHeader {
    pub format_version: u8,

    /// SHA-256 of the compact JSON encoding of the snapshot body
    pub content_hash: String,

    pub uncompressed_size: usize,
    pub compression: String,
    pub encryption: String,
}

impl SaveHeader {
    pub fn for_body(body: &[u8], compression: &str, encryption: &str) -> Self {
        Self {
            format_version: SAVE_FORMAT_VERSION,
            content_hash: Self::compute_hash(body),
            uncompressed_size: body.len(),
            compression: compression.to_string(),
            encryption: encryption.to_string(),
        }
    }

    /// Hexadecimal SHA-256 of `data`
    pub fn compute_hash(data: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(data);
        format!("{:x}", hasher.finalize())
    }

    /// Ok if `body` hashes to the stored value
    pub fn verify_integrity(&self, body: &[u8]) -> Result<()> {
        let computed_hash = Self::compute_hash(body);
        if computed_hash == self.content_hash {
            Ok(())
        } else {
            Err(SaveError::IntegrityCheckFailed {
                expected: self.content_hash.clone(),
                actual: computed_hash,
            })
        }
    }

    /// Check if this header was written by a format this build can read
    pub fn is_compatible(&self) -> bool {
        self.format_version <= SAVE_FORMAT_VERSION
    }
}
