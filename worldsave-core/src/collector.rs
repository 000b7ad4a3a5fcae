/*!
Snapshot collection.

The [`SnapshotCollector`] reads every subsystem through its port and builds a
self-contained [`Snapshot`]. Entities get fresh snapshot-local ids from an
[`IdAllocator`]; references between entities are rewritten from runtime
handles into those ids.
*/

use std::collections::HashMap;
use tracing::debug;

use crate::metadata::{SaveKind, SaveMetadata};
use crate::model::{BuildingRecord, RecordId, Snapshot, UnitLinks, UnitRecord};
use crate::ports::{EntityHandle, WorldHandles};

/// Mints record ids for one collection pass.
#[derive(Debug, Default)]
pub struct IdAllocator {
    last: u32,
    assigned: HashMap<EntityHandle, RecordId>,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Id for `handle`, minting one on first sight. Ids start at 1.
    pub fn assign(&mut self, handle: EntityHandle) -> RecordId {
        if let Some(id) = self.assigned.get(&handle) {
            return *id;
        }
        self.last += 1;
        let id = RecordId(self.last);
        self.assigned.insert(handle, id);
        id
    }

    pub fn get(&self, handle: EntityHandle) -> Option<RecordId> {
        self.assigned.get(&handle).copied()
    }

    pub fn len(&self) -> usize {
        self.assigned.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assigned.is_empty()
    }
}

pub struct SnapshotCollector {
    handles: WorldHandles,
    version_tag: String,
}

impl SnapshotCollector {
    pub fn new<S: Into<String>>(handles: WorldHandles, version_tag: S) -> Self {
        Self {
            handles,
            version_tag: version_tag.into(),
        }
    }

    pub fn version_tag(&self) -> &str {
        &self.version_tag
    }

    /// Build a snapshot of the current world. Reads only.
    pub fn collect(&self, save_name: &str, kind: SaveKind) -> Snapshot {
        // Ports may share one cell, so each borrow ends with its statement.
        let play_time = self.handles.session.borrow().play_time_seconds();
        let world = self.handles.session.borrow().world_state();
        let economy = self.handles.economy.borrow().counters();
        let morale = self.handles.morale.borrow().morale();
        let clock = self.handles.clock.borrow().clock();
        let population = self
            .handles
            .population
            .as_ref()
            .map(|port| port.borrow().population());
        let reputation = self
            .handles
            .reputation
            .as_ref()
            .map(|port| port.borrow().reputation());
        let camera = self.handles.camera.borrow().camera();
        let live_buildings = self.handles.entities.borrow().buildings();
        let live_units = self.handles.entities.borrow().units();

        let mut ids = IdAllocator::new();
        let buildings: Vec<BuildingRecord> = live_buildings
            .into_iter()
            .map(|(handle, view)| BuildingRecord {
                id: ids.assign(handle),
                template: view.template,
                state: view.state,
            })
            .collect();
        let unit_ids: Vec<RecordId> = live_units
            .iter()
            .map(|(handle, _)| ids.assign(*handle))
            .collect();

        let units: Vec<UnitRecord> = live_units
            .into_iter()
            .zip(unit_ids)
            .map(|((_, view), id)| UnitRecord {
                id,
                links: UnitLinks {
                    combat_target: translate(&ids, id, "combat_target", view.combat_target),
                    forced_move_target: translate(
                        &ids,
                        id,
                        "forced_move_target",
                        view.forced_move_target,
                    ),
                },
                template: view.template,
                state: view.state,
            })
            .collect();

        debug!(
            save_name,
            buildings = buildings.len(),
            units = units.len(),
            "Collected world snapshot"
        );

        Snapshot {
            metadata: SaveMetadata::new(save_name, kind, play_time, self.version_tag.as_str()),
            world,
            economy,
            morale,
            clock,
            population,
            reputation,
            buildings,
            units,
            camera,
        }
    }
}

fn translate(
    ids: &IdAllocator,
    owner: RecordId,
    field: &'static str,
    target: Option<EntityHandle>,
) -> Option<RecordId> {
    let handle = target?;
    let id = ids.get(handle);
    if id.is_none() {
        debug!(
            %owner,
            field,
            handle = handle.0,
            "Reference target is not being saved, dropping it"
        );
    }
    id
}
