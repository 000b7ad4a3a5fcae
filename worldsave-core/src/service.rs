/*!
Persistence façade.

[`PersistenceService`] is the one entry point the game talks to. It wires the
collector, codec, store, restorer and auto-save rotation together. The plain
operations never panic or propagate errors: failures are logged and reported
as `false` or `None`. Tools and tests that want the cause use the `try_*`
variants, which return [`Result`].
*/

use chrono::{DateTime, Utc};
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::codec::SnapshotCodec;
use crate::collector::SnapshotCollector;
use crate::config::SaveConfig;
use crate::metadata::SaveKind;
use crate::ports::{SessionPort, Shared, WorldHandles};
use crate::resolver::AssetResolver;
use crate::restore::{RestoreReport, Restorer};
use crate::rotation::{AutoSaveName, AutoSaveTimer, RotationPolicy};
use crate::storage::{validate_save_name, DirectoryStore, StorageAdapter};
use crate::{Result, SaveError};

#[cfg(feature = "metrics")]
use crate::observability::OperationTimer;

/// Metadata-only view of a stored save.
#[derive(Debug, Clone, PartialEq)]
pub struct SaveInfo {
    pub name: String,
    pub date: DateTime<Utc>,
    pub play_time_seconds: f64,
    pub version: String,
    pub size_bytes: u64,
    pub kind: SaveKind,
}

/// Save/load façade over one store and one world
///
/// Holds single-threaded world handles, so it is neither `Send` nor `Sync`.
/// Every mutating operation takes `&mut self`, which rules out overlapping
/// saves and loads.
///
/// # Example
/// ```rust
/// use worldsave_core::memory::MemoryWorld;
/// use worldsave_core::resolver::{AssetResolver, GlobalRegistry, TemplateDefinition};
/// use worldsave_core::storage::MemoryStore;
/// use worldsave_core::{PersistenceService, SaveConfig, SnapshotCodec};
///
/// let world = MemoryWorld::shared();
/// let resolver = AssetResolver::new().with_strategy(GlobalRegistry::from_definitions([
///     TemplateDefinition::building("Barracks"),
/// ]));
/// let mut service = PersistenceService::new(
///     MemoryStore::new(),
///     SnapshotCodec::new(),
///     MemoryWorld::handles(&world),
///     resolver,
///     &SaveConfig::default(),
/// )?;
///
/// assert!(service.save_game("campaign", false, false));
/// assert!(service.load_game("campaign"));
/// assert!(!service.load_game("does-not-exist"));
/// # Ok::<(), worldsave_core::SaveError>(())
/// ```
pub struct PersistenceService<S: StorageAdapter> {
    store: S,
    codec: SnapshotCodec,
    collector: SnapshotCollector,
    restorer: Restorer,
    session: Shared<dyn SessionPort>,
    rotation: RotationPolicy,
    timer: AutoSaveTimer,
    quick_save_name: String,
}

impl<S: StorageAdapter> PersistenceService<S> {
    /// Build a service and recover the auto-save rotation from `store`
    pub fn new(
        store: S,
        codec: SnapshotCodec,
        handles: WorldHandles,
        resolver: AssetResolver,
        config: &SaveConfig,
    ) -> Result<Self> {
        config.validate()?;

        let mut rotation = config.build_rotation()?;
        match store.list() {
            Ok(names) => rotation.recover(&names),
            Err(e) => warn!(error = %e, "Could not list saves, starting rotation fresh"),
        }

        Ok(Self {
            store,
            codec,
            collector: SnapshotCollector::new(handles.clone(), config.version_tag.clone()),
            session: handles.session.clone(),
            restorer: Restorer::new(handles, resolver),
            rotation,
            timer: config.build_timer(),
            quick_save_name: config.quick_save_name.clone(),
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn codec(&self) -> &SnapshotCodec {
        &self.codec
    }

    pub fn rotation(&self) -> &RotationPolicy {
        &self.rotation
    }

    pub fn timer(&self) -> &AutoSaveTimer {
        &self.timer
    }

    pub fn resolver_mut(&mut self) -> &mut AssetResolver {
        self.restorer.resolver_mut()
    }

    pub fn quick_save_name(&self) -> &str {
        &self.quick_save_name
    }

    /// Collect, encode and write the world under `name`. Returns whether the
    /// save was written.
    pub fn save_game(&mut self, name: &str, is_auto: bool, is_quick: bool) -> bool {
        #[cfg(feature = "metrics")]
        let op_timer = OperationTimer::start_save();

        let result = self.try_save_game(name, is_auto, is_quick);

        #[cfg(feature = "metrics")]
        match &result {
            Ok(size) => op_timer.finish(*size),
            Err(_) => op_timer.finish_with_error(),
        }

        match result {
            Ok(_) => true,
            Err(e) => {
                error!(save_name = name, error = %e, "Save failed");
                false
            }
        }
    }

    /// Like [`save_game`](Self::save_game), returning the encoded size
    ///
    /// # Errors
    /// * `SaveError::Validation` - bad name, a manual save named like an
    ///   auto-save, or a world holding a NaN or infinite value
    pub fn try_save_game(&mut self, name: &str, is_auto: bool, is_quick: bool) -> Result<usize> {
        validate_save_name(name)?;
        if !is_auto && AutoSaveName::parse(name, self.rotation.prefix()).is_some() {
            return Err(SaveError::validation(format!(
                "save name '{name}' is reserved for auto-saves"
            )));
        }
        let started = Instant::now();

        let kind = SaveKind::from_flags(is_auto, is_quick);
        let snapshot = self.collector.collect(name, kind);
        // Nothing is written for a world that cannot be read back.
        snapshot.validate()?;
        let bytes = self.codec.encode(&snapshot)?;
        self.store.write(name, &bytes)?;

        info!(
            save_name = name,
            kind = kind.as_str(),
            entities = snapshot.entity_count(),
            size_bytes = bytes.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Saved game"
        );
        Ok(bytes.len())
    }

    /// Read, decode and restore `name`. Returns `false` when the save is
    /// missing, corrupt or could not be restored.
    pub fn load_game(&mut self, name: &str) -> bool {
        #[cfg(feature = "metrics")]
        let op_timer = OperationTimer::start_load();

        let result = self.load_inner(name);

        #[cfg(feature = "metrics")]
        match &result {
            Ok((_, size)) => op_timer.finish(*size),
            Err(_) => op_timer.finish_with_error(),
        }

        match result {
            Ok(_) => true,
            Err(SaveError::NotFound(_)) => {
                warn!(save_name = name, "Save not found");
                false
            }
            Err(e) => {
                error!(save_name = name, error = %e, "Load failed");
                false
            }
        }
    }

    /// Like [`load_game`](Self::load_game), returning the restore report
    pub fn try_load_game(&mut self, name: &str) -> Result<RestoreReport> {
        self.load_inner(name).map(|(report, _)| report)
    }

    fn load_inner(&mut self, name: &str) -> Result<(RestoreReport, usize)> {
        validate_save_name(name)?;
        let started = Instant::now();

        let bytes = self.store.read(name)?;
        let snapshot = self.codec.decode(&bytes)?;
        debug!(
            save_name = name,
            version = snapshot.metadata.version.as_str(),
            entities = snapshot.entity_count(),
            "Decoded snapshot"
        );
        let report = self.restorer.restore(snapshot)?;
        self.timer.reset();

        info!(
            save_name = name,
            size_bytes = bytes.len(),
            created = report.entities_created(),
            skipped = report.skipped.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Loaded game"
        );
        Ok((report, bytes.len()))
    }

    pub fn quick_save(&mut self) -> bool {
        let name = self.quick_save_name.clone();
        self.save_game(&name, false, true)
    }

    pub fn quick_load(&mut self) -> bool {
        let name = self.quick_save_name.clone();
        self.load_game(&name)
    }

    /// Write the next rotating auto-save and prune the oldest ones.
    pub fn auto_save(&mut self) -> bool {
        match self.try_auto_save() {
            Ok(_) => true,
            Err(e) => {
                error!(error = %e, "Auto-save failed");
                false
            }
        }
    }

    pub fn try_auto_save(&mut self) -> Result<AutoSaveName> {
        let name = self.rotation.next_save_name(Utc::now());
        let formatted = name.format();
        self.try_save_game(&formatted, true, false)?;

        if let Err(e) = self.rotation.after_save(&name, &self.store) {
            warn!(save_name = formatted.as_str(), error = %e, "Failed to prune old auto-saves");
        }
        Ok(name)
    }

    /// Advance the auto-save timer by `dt` seconds. Returns `None` when no
    /// save was due, otherwise whether the auto-save succeeded. Time spent
    /// paused does not count.
    pub fn tick_autosave(&mut self, dt: f64) -> Option<bool> {
        let paused = self.session.borrow().world_state().paused;
        if !self.timer.tick(dt, paused) {
            return None;
        }
        Some(self.auto_save())
    }

    pub fn delete_save(&mut self, name: &str) -> bool {
        match self.try_delete_save(name) {
            Ok(deleted) => {
                if deleted {
                    info!(save_name = name, "Deleted save");
                }
                deleted
            }
            Err(e) => {
                error!(save_name = name, error = %e, "Delete failed");
                false
            }
        }
    }

    pub fn try_delete_save(&mut self, name: &str) -> Result<bool> {
        validate_save_name(name)?;
        self.store.delete(name)
    }

    /// Every stored save, most recently modified first.
    pub fn get_all_saves(&self) -> Vec<String> {
        self.try_get_all_saves().unwrap_or_else(|e| {
            error!(error = %e, "Failed to list saves");
            Vec::new()
        })
    }

    pub fn try_get_all_saves(&self) -> Result<Vec<String>> {
        let mut saves: Vec<(String, DateTime<Utc>)> = Vec::new();
        for name in self.store.list()? {
            match self.store.stat(&name) {
                Ok(stat) => saves.push((name, stat.modified)),
                Err(e) => warn!(save_name = name.as_str(), error = %e, "Skipping unreadable save"),
            }
        }
        saves.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        Ok(saves.into_iter().map(|(name, _)| name).collect())
    }

    pub fn save_exists(&self, name: &str) -> bool {
        validate_save_name(name).is_ok() && self.store.exists(name)
    }

    /// Metadata of `name` without restoring it; `None` if missing or corrupt.
    pub fn get_save_info(&self, name: &str) -> Option<SaveInfo> {
        match self.try_get_save_info(name) {
            Ok(info) => Some(info),
            Err(SaveError::NotFound(_)) => None,
            Err(e) => {
                warn!(save_name = name, error = %e, "Could not read save info");
                None
            }
        }
    }

    pub fn try_get_save_info(&self, name: &str) -> Result<SaveInfo> {
        validate_save_name(name)?;
        let bytes = self.store.read(name)?;
        let summary = self.codec.decode_header(&bytes)?;
        let stat = self.store.stat(name)?;

        Ok(SaveInfo {
            name: name.to_string(),
            date: summary.metadata.created_at,
            play_time_seconds: summary.metadata.play_time_seconds,
            version: summary.metadata.version,
            size_bytes: stat.size_bytes,
            kind: summary.metadata.kind,
        })
    }
}

/// Build a directory-backed service from `config`
///
/// # Example
/// ```rust
/// use worldsave_core::memory::MemoryWorld;
/// use worldsave_core::resolver::AssetResolver;
/// use worldsave_core::{create_service_from_config, SaveConfig};
///
/// let dir = tempfile::tempdir()?;
/// let world = MemoryWorld::shared();
/// let config = SaveConfig::with_save_dir(dir.path().join("saves"));
/// let mut service =
///     create_service_from_config(&config, MemoryWorld::handles(&world), AssetResolver::new())?;
///
/// assert!(service.quick_save());
/// assert!(dir.path().join("saves/quicksave.wsave").exists());
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn create_service_from_config(
    config: &SaveConfig,
    handles: WorldHandles,
    resolver: AssetResolver,
) -> Result<PersistenceService<DirectoryStore>> {
    config.validate()?;
    let store = DirectoryStore::new(&config.save_dir, config.extension.clone());
    PersistenceService::new(store, config.build_codec(), handles, resolver, config)
}
