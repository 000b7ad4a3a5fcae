/*!
# Worldsave Core

Save and restore the complete state of a running game world.

The core captures every subsystem into a self-contained [`Snapshot`], encodes
it into a single save file, and later rebuilds an equivalent world from it.

- Subsystems are reached through small ports injected at construction
- Entities get snapshot-local ids; references survive a round trip
- Templates are resolved through an ordered chain of lookup strategies
- Save files carry a format version and a content hash
- Auto-saves rotate through a bounded set of slots

## Architecture

The core follows hexagonal architecture principles:
- Collection, restoration and rotation are pure domain logic
- Storage, compression and encryption are adapters behind traits
- The game implements the ports in [`ports`]; [`memory::MemoryWorld`] is a
  complete in-memory implementation

## Usage

```rust
use worldsave_core::memory::MemoryWorld;
use worldsave_core::resolver::{AssetResolver, GlobalRegistry, TemplateDefinition};
use worldsave_core::{create_service_from_config, SaveConfig};

let dir = tempfile::tempdir()?;
let world = MemoryWorld::shared();
let resolver = AssetResolver::new().with_strategy(GlobalRegistry::from_definitions([
    TemplateDefinition::building("Barracks"),
    TemplateDefinition::unit("Footman"),
]));

let config = SaveConfig::with_save_dir(dir.path());
let mut service = create_service_from_config(&config, MemoryWorld::handles(&world), resolver)?;

assert!(service.save_game("campaign", false, false));
assert!(service.load_game("campaign"));
assert_eq!(service.get_all_saves(), vec!["campaign"]);
# Ok::<(), worldsave_core::SaveError>(())
```
*/

pub mod codec;
pub mod collector;
pub mod compression;
pub mod config;
pub mod encryption;
pub mod error;
pub mod memory;
pub mod metadata;
pub mod model;
pub mod observability;
pub mod ports;
pub mod resolver;
pub mod restore;
pub mod rotation;
pub mod service;
pub mod storage;

#[cfg(test)]
mod metadata_tests;

pub use codec::{SnapshotCodec, SnapshotSummary};
pub use collector::SnapshotCollector;
pub use compression::{CompressionAdapter, GzipCompressor, NoCompression};
pub use config::{CompressionConfig, SaveConfig};
pub use error::{Result, SaveError};
pub use metadata::{SaveHeader, SaveKind, SaveMetadata, SAVE_FORMAT_VERSION};
pub use model::{RecordId, Snapshot};
pub use ports::WorldHandles;
pub use resolver::{AssetResolver, TemplateDefinition, TemplateKind};
pub use restore::{RestoreReport, Restorer};
pub use rotation::{AutoSaveName, AutoSaveTimer, RotationPolicy};
pub use service::{create_service_from_config, PersistenceService, SaveInfo};
pub use storage::{DirectoryStore, MemoryStore, StorageAdapter};
