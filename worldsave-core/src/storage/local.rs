/*!
Directory-backed store: one flat directory, one file per save.
*/

use chrono::{DateTime, Utc};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use super::{validate_save_name, SaveStat, StorageAdapter};
use crate::{Result, SaveError};

/// Default save file extension
pub const DEFAULT_EXTENSION: &str = ".wsave";

/// Directory store
///
/// A save named `campaign` lives at `<dir>/campaign<extension>`. The
/// directory is created on the first write; nothing else creates it.
///
/// # Example
/// ```rust
/// use worldsave_core::storage::{DirectoryStore, StorageAdapter};
///
/// let dir = tempfile::tempdir()?;
/// let store = DirectoryStore::new(dir.path().join("saves"), ".wsave");
/// store.write("campaign", b"snapshot bytes")?;
/// assert!(dir.path().join("saves/campaign.wsave").exists());
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    dir: PathBuf,
    extension: String,
}

impl DirectoryStore {
    /// Create a store rooted at `dir`; a missing leading dot is added to
    /// `extension`
    pub fn new<P: AsRef<Path>, S: Into<String>>(dir: P, extension: S) -> Self {
        let extension = extension.into();
        let extension = if extension.is_empty() || extension.starts_with('.') {
            extension
        } else {
            format!(".{extension}")
        };
        Self {
            dir: dir.as_ref().to_path_buf(),
            extension,
        }
    }

    /// Store using [`DEFAULT_EXTENSION`]
    pub fn with_default_extension<P: AsRef<Path>>(dir: P) -> Self {
        Self::new(dir, DEFAULT_EXTENSION)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Resolve the file path for a save name
    pub fn path_for(&self, name: &str) -> Result<PathBuf> {
        validate_save_name(name)?;
        Ok(self.dir.join(format!("{name}{}", self.extension)))
    }

    fn ensure_dir(&self) -> Result<()> {
        if !self.dir.exists() {
            fs::create_dir_all(&self.dir).map_err(|e| {
                SaveError::storage(format!(
                    "Failed to create save directory {}: {}",
                    self.dir.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    fn name_from_file(&self, file_name: &str) -> Option<String> {
        let name = file_name.strip_suffix(self.extension.as_str())?;
        validate_save_name(name).ok()?;
        Some(name.to_string())
    }
}

impl StorageAdapter for DirectoryStore {
    fn write(&self, name: &str, data: &[u8]) -> Result<()> {
        let full_path = self.path_for(name)?;
        self.ensure_dir()?;

        // Write beside the target and rename so readers never see a torn file.
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(data)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&full_path).map_err(|e| {
            SaveError::storage(format!(
                "Failed to write save to {}: {}",
                full_path.display(),
                e.error
            ))
        })?;

        Ok(())
    }

    fn read(&self, name: &str) -> Result<Vec<u8>> {
        let full_path = self.path_for(name)?;

        fs::read(&full_path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => SaveError::not_found(name),
            _ => SaveError::storage(format!(
                "Failed to read save from {}: {}",
                full_path.display(),
                e
            )),
        })
    }

    fn delete(&self, name: &str) -> Result<bool> {
        let full_path = self.path_for(name)?;

        match fs::remove_file(&full_path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(SaveError::storage(format!(
                "Failed to delete save {}: {}",
                full_path.display(),
                e
            ))),
        }
    }

    fn list(&self) -> Result<Vec<String>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut names = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(name) = entry
                .file_name()
                .to_str()
                .and_then(|file_name| self.name_from_file(file_name))
            {
                names.push(name);
            }
        }
        Ok(names)
    }

    fn exists(&self, name: &str) -> bool {
        self.path_for(name).map(|p| p.is_file()).unwrap_or(false)
    }

    fn stat(&self, name: &str) -> Result<SaveStat> {
        let full_path = self.path_for(name)?;
        let meta = fs::metadata(&full_path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => SaveError::not_found(name),
            _ => SaveError::from(e),
        })?;

        Ok(SaveStat {
            size_bytes: meta.len(),
            modified: DateTime::<Utc>::from(meta.modified()?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_directory_store_basic_operations() {
        let temp_dir = TempDir::new().unwrap();
        let storage = DirectoryStore::new(temp_dir.path(), ".wsave");

        storage.write("campaign", b"snapshot").unwrap();
        assert!(storage.exists("campaign"));
        assert!(temp_dir.path().join("campaign.wsave").is_file());
        assert_eq!(storage.read("campaign").unwrap(), b"snapshot");

        let stat = storage.stat("campaign").unwrap();
        assert_eq!(stat.size_bytes, 8);

        assert!(storage.delete("campaign").unwrap());
        assert!(!storage.exists("campaign"));
        assert!(!storage.delete("campaign").unwrap());
    }

    #[test]
    fn test_directory_is_created_lazily() {
        let temp_dir = TempDir::new().unwrap();
        let save_dir = temp_dir.path().join("nested").join("saves");
        let storage = DirectoryStore::with_default_extension(&save_dir);

        assert!(storage.list().unwrap().is_empty());
        assert!(!storage.exists("anything"));
        assert!(matches!(storage.read("anything"), Err(SaveError::NotFound(_))));
        assert!(!storage.delete("anything").unwrap());
        assert!(!save_dir.exists());

        storage.write("first", b"1").unwrap();
        assert!(save_dir.is_dir());
    }

    #[test]
    fn test_overwrite_replaces_contents() {
        let temp_dir = TempDir::new().unwrap();
        let storage = DirectoryStore::new(temp_dir.path(), "wsave");
        assert_eq!(storage.extension(), ".wsave");

        storage.write("slot", b"first version").unwrap();
        storage.write("slot", b"second").unwrap();
        assert_eq!(storage.read("slot").unwrap(), b"second");
        assert_eq!(storage.list().unwrap(), vec!["slot".to_string()]);
    }

    #[test]
    fn test_list_only_reports_matching_extension() {
        let temp_dir = TempDir::new().unwrap();
        let storage = DirectoryStore::new(temp_dir.path(), ".wsave");

        storage.write("alpha", b"a").unwrap();
        storage.write("beta", b"b").unwrap();
        fs::write(temp_dir.path().join("notes.txt"), b"ignore me").unwrap();
        fs::create_dir(temp_dir.path().join("dir.wsave")).unwrap();

        let mut names = storage.list().unwrap();
        names.sort();
        assert_eq!(names, vec!["alpha".to_string(), "beta".to_string()]);
    }

    #[test]
    fn test_invalid_names_are_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let storage = DirectoryStore::new(temp_dir.path(), ".wsave");

        assert!(matches!(
            storage.write("../outside", b"x"),
            Err(SaveError::Validation(_))
        ));
        assert!(!storage.exists("../outside"));
    }
}
