/*!
Storage adapters for save files.

This module defines the store abstraction (port) and its adapters. A store is
keyed by save name; how a name maps to a physical location is the adapter's
business.
*/

pub mod local;

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use crate::{Result, SaveError};

pub use local::DirectoryStore;

/// Size and modification time of a stored save.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveStat {
    pub size_bytes: u64,
    pub modified: DateTime<Utc>,
}

/// Name-keyed durable byte store
///
/// Implementations must not create any backing resource on read-only calls
/// (`read`, `exists`, `list`, `stat`, `delete`).
#[cfg_attr(test, mockall::automock)]
pub trait StorageAdapter {
    /// Write (or overwrite) the bytes stored under `name`
    fn write(&self, name: &str, data: &[u8]) -> Result<()>;

    /// Read the bytes stored under `name`
    ///
    /// # Errors
    /// * `SaveError::NotFound` - nothing is stored under `name`
    fn read(&self, name: &str) -> Result<Vec<u8>>;

    /// Delete `name`, returning whether anything was removed
    fn delete(&self, name: &str) -> Result<bool>;

    /// Names of every stored save, in no particular order
    fn list(&self) -> Result<Vec<String>>;

    fn exists(&self, name: &str) -> bool;

    fn stat(&self, name: &str) -> Result<SaveStat>;
}

/// Reject names that cannot map onto a single flat file.
pub fn validate_save_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(SaveError::validation("save name cannot be empty"));
    }
    if name.starts_with('.') {
        return Err(SaveError::validation(format!(
            "save name '{name}' cannot start with a dot"
        )));
    }
    if name.contains(['/', '\\', '\0']) || name.contains("..") {
        return Err(SaveError::validation(format!(
            "save name '{name}' must not contain path separators"
        )));
    }
    Ok(())
}

/// In-memory store for tests, benchmarks and headless tools.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, (Vec<u8>, DateTime<Utc>)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> Result<MutexGuard<'_, BTreeMap<String, (Vec<u8>, DateTime<Utc>)>>> {
        self.entries
            .lock()
            .map_err(|_| SaveError::storage("memory store lock poisoned"))
    }
}

impl StorageAdapter for MemoryStore {
    fn write(&self, name: &str, data: &[u8]) -> Result<()> {
        validate_save_name(name)?;
        self.entries()?
            .insert(name.to_string(), (data.to_vec(), Utc::now()));
        Ok(())
    }

    fn read(&self, name: &str) -> Result<Vec<u8>> {
        self.entries()?
            .get(name)
            .map(|(data, _)| data.clone())
            .ok_or_else(|| SaveError::not_found(name))
    }

    fn delete(&self, name: &str) -> Result<bool> {
        Ok(self.entries()?.remove(name).is_some())
    }

    fn list(&self) -> Result<Vec<String>> {
        Ok(self.entries()?.keys().cloned().collect())
    }

    fn exists(&self, name: &str) -> bool {
        self.entries()
            .map(|entries| entries.contains_key(name))
            .unwrap_or(false)
    }

    fn stat(&self, name: &str) -> Result<SaveStat> {
        self.entries()?
            .get(name)
            .map(|(data, modified)| SaveStat {
                size_bytes: data.len() as u64,
                modified: *modified,
            })
            .ok_or_else(|| SaveError::not_found(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_name_validation() {
        assert!(validate_save_name("campaign_1").is_ok());
        assert!(validate_save_name("Quick Save").is_ok());

        for bad in ["", "   ", "../escape", "a/b", "a\\b", ".hidden"] {
            assert!(
                matches!(validate_save_name(bad), Err(SaveError::Validation(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_memory_store() {
        let storage = MemoryStore::new();

        storage.write("slot", b"bytes").unwrap();
        assert!(storage.exists("slot"));
        assert_eq!(storage.read("slot").unwrap(), b"bytes");
        assert_eq!(storage.stat("slot").unwrap().size_bytes, 5);
        assert_eq!(storage.list().unwrap(), vec!["slot".to_string()]);

        assert!(storage.delete("slot").unwrap());
        assert!(!storage.delete("slot").unwrap());
        assert!(!storage.exists("slot"));
        assert!(matches!(storage.read("slot"), Err(SaveError::NotFound(_))));
    }
}
