/*!
Snapshot restoration.

Restoring is a full replace in strict order:

1. **Clear** - resolver caches are refreshed, then every live building and
   unit is destroyed. Failure here aborts the restore.
2. **Create** - scalar blocks are applied, then each record is resolved to a
   template and spawned. Records whose template cannot be found are skipped.
   References between records are queued in a [`PendingReferences`] table
   instead of being wired immediately, since the target may not exist yet.
3. **Link** - queued references are resolved through the record id to entity
   handle map. A target that was never created leaves the reference unset.

Derived morale bonuses are recomputed from the restored buildings last.
There is no rollback: if a later step fails the world stays partially
restored.
*/

use std::collections::HashMap;
use std::fmt;
use tracing::{debug, info, warn};

use crate::model::{RecordId, Snapshot};
use crate::ports::{EntityHandle, WorldHandles};
use crate::resolver::{AssetResolver, TemplateKind};
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferenceKind {
    CombatTarget,
    ForcedMoveTarget,
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReferenceKind::CombatTarget => f.write_str("combat_target"),
            ReferenceKind::ForcedMoveTarget => f.write_str("forced_move_target"),
        }
    }
}

/// One reference waiting for the link pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingReference {
    pub owner: EntityHandle,
    pub owner_id: RecordId,
    pub kind: ReferenceKind,
    pub target: RecordId,
}

#[derive(Debug, Default)]
pub struct PendingReferences {
    entries: Vec<PendingReference>,
}

impl PendingReferences {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `target` unless it is the "no reference" sentinel.
    pub fn queue(
        &mut self,
        owner: EntityHandle,
        owner_id: RecordId,
        kind: ReferenceKind,
        target: Option<RecordId>,
    ) {
        if let Some(target) = target {
            self.entries.push(PendingReference {
                owner,
                owner_id,
                kind,
                target,
            });
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PendingReference> {
        self.entries.iter()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    UnresolvedTemplate,
    DuplicateId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedRecord {
    pub id: RecordId,
    pub kind: TemplateKind,
    pub template: String,
    pub reason: SkipReason,
}

/// Outcome of a successful restore.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreReport {
    pub buildings_created: usize,
    pub units_created: usize,
    pub skipped: Vec<SkippedRecord>,
    pub references_linked: usize,
    pub references_dangling: usize,
}

impl RestoreReport {
    pub fn entities_created(&self) -> usize {
        self.buildings_created + self.units_created
    }
}

pub struct Restorer {
    handles: WorldHandles,
    resolver: AssetResolver,
}

impl Restorer {
    pub fn new(handles: WorldHandles, resolver: AssetResolver) -> Self {
        Self { handles, resolver }
    }

    pub fn resolver(&self) -> &AssetResolver {
        &self.resolver
    }

    pub fn resolver_mut(&mut self) -> &mut AssetResolver {
        &mut self.resolver
    }

    /// Replace the live world with `snapshot`
    ///
    /// # Errors
    /// Clearing the world, spawning an entity or wiring a reference failed.
    /// Missing templates and dangling references are not errors; they are
    /// counted in the returned [`RestoreReport`].
    pub fn restore(&mut self, snapshot: Snapshot) -> Result<RestoreReport> {
        self.resolver.refresh();
        self.handles.entities.borrow_mut().clear()?;

        self.apply_scalars(&snapshot);

        let mut report = RestoreReport::default();
        let mut spawned: HashMap<RecordId, EntityHandle> = HashMap::new();
        let mut pending = PendingReferences::new();
        let mut building_templates = Vec::with_capacity(snapshot.buildings.len());

        for record in snapshot.buildings {
            if spawned.contains_key(&record.id) {
                report.skip(record.id, TemplateKind::Building, record.template, SkipReason::DuplicateId);
                continue;
            }
            let template = match self.resolver.resolve(TemplateKind::Building, &record.template) {
                Ok(template) => template,
                Err(_) => {
                    report.skip(
                        record.id,
                        TemplateKind::Building,
                        record.template,
                        SkipReason::UnresolvedTemplate,
                    );
                    continue;
                }
            };
            building_templates.push(template.name.clone());
            let handle = self
                .handles
                .entities
                .borrow_mut()
                .spawn_building(template, record.state)?;
            spawned.insert(record.id, handle);
            report.buildings_created += 1;
        }

        for record in snapshot.units {
            if spawned.contains_key(&record.id) {
                report.skip(record.id, TemplateKind::Unit, record.template, SkipReason::DuplicateId);
                continue;
            }
            let template = match self.resolver.resolve(TemplateKind::Unit, &record.template) {
                Ok(template) => template,
                Err(_) => {
                    report.skip(
                        record.id,
                        TemplateKind::Unit,
                        record.template,
                        SkipReason::UnresolvedTemplate,
                    );
                    continue;
                }
            };
            let handle = self
                .handles
                .entities
                .borrow_mut()
                .spawn_unit(template, record.state)?;
            spawned.insert(record.id, handle);
            report.units_created += 1;

            pending.queue(handle, record.id, ReferenceKind::CombatTarget, record.links.combat_target);
            pending.queue(
                handle,
                record.id,
                ReferenceKind::ForcedMoveTarget,
                record.links.forced_move_target,
            );
        }

        self.link(&pending, &spawned, &mut report)?;

        self.handles
            .morale
            .borrow_mut()
            .recompute_bonuses(&building_templates);

        info!(
            buildings = report.buildings_created,
            units = report.units_created,
            skipped = report.skipped.len(),
            linked = report.references_linked,
            dangling = report.references_dangling,
            "Restored world"
        );
        Ok(report)
    }

    fn apply_scalars(&self, snapshot: &Snapshot) {
        self.handles
            .session
            .borrow_mut()
            .apply_world_state(&snapshot.world);
        self.handles
            .economy
            .borrow_mut()
            .replace_counters(snapshot.economy);
        self.handles.morale.borrow_mut().apply_morale(&snapshot.morale);
        self.handles.clock.borrow_mut().apply_clock(&snapshot.clock);

        match (&self.handles.population, &snapshot.population) {
            (Some(port), Some(population)) => port.borrow_mut().apply_population(population),
            (None, Some(_)) => debug!("No population subsystem, ignoring saved block"),
            _ => {}
        }
        match (&self.handles.reputation, &snapshot.reputation) {
            (Some(port), Some(reputation)) => port.borrow_mut().apply_reputation(reputation),
            (None, Some(_)) => debug!("No reputation subsystem, ignoring saved block"),
            _ => {}
        }

        self.handles.camera.borrow_mut().apply_camera(&snapshot.camera);
    }

    fn link(
        &self,
        pending: &PendingReferences,
        spawned: &HashMap<RecordId, EntityHandle>,
        report: &mut RestoreReport,
    ) -> Result<()> {
        for reference in pending.iter() {
            let Some(target) = spawned.get(&reference.target).copied() else {
                warn!(
                    owner = %reference.owner_id,
                    target = %reference.target,
                    kind = %reference.kind,
                    "Reference target was not restored, leaving it unset"
                );
                report.references_dangling += 1;
                continue;
            };

            let mut entities = self.handles.entities.borrow_mut();
            match reference.kind {
                ReferenceKind::CombatTarget => {
                    entities.set_combat_target(reference.owner, Some(target))?
                }
                ReferenceKind::ForcedMoveTarget => {
                    entities.set_forced_move_target(reference.owner, Some(target))?
                }
            }
            report.references_linked += 1;
        }
        Ok(())
    }
}

impl RestoreReport {
    fn skip(&mut self, id: RecordId, kind: TemplateKind, template: String, reason: SkipReason) {
        match reason {
            SkipReason::DuplicateId => {
                warn!(%id, %kind, template = template.as_str(), "Duplicate record id, keeping the first")
            }
            SkipReason::UnresolvedTemplate => {
                warn!(%id, %kind, template = template.as_str(), "Template not found, skipping record")
            }
        }
        self.skipped.push(SkippedRecord {
            id,
            kind,
            template,
            reason,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::SnapshotCollector;
    use crate::memory::MemoryWorld;
    use crate::metadata::{SaveKind, SaveMetadata};
    use crate::model::{
        BuildingRecord, BuildingState, CameraState, ClockState, Health, MoraleState,
        PopulationState, ReputationState, ResourceCounters, UnitLinks, UnitRecord, UnitState,
        WorldState,
    };
    use crate::ports::EntityPort;
    use crate::resolver::{GlobalRegistry, TemplateDefinition};
    use crate::SaveError;
    use std::sync::Arc;

    fn registry() -> GlobalRegistry {
        GlobalRegistry::from_definitions([
            TemplateDefinition::building("Barracks"),
            TemplateDefinition::building("Tavern"),
            TemplateDefinition::unit("Footman"),
            TemplateDefinition::unit("Archer").with_max_health(60.0),
        ])
    }

    fn restorer_for(world: &std::rc::Rc<std::cell::RefCell<MemoryWorld>>) -> Restorer {
        Restorer::new(
            MemoryWorld::handles(world),
            AssetResolver::new().with_strategy(registry()),
        )
    }

    fn unit(id: u32, template: &str, links: UnitLinks) -> UnitRecord {
        UnitRecord {
            id: RecordId(id),
            template: template.to_string(),
            state: UnitState::default(),
            links,
        }
    }

    fn building(id: u32, template: &str) -> BuildingRecord {
        BuildingRecord {
            id: RecordId(id),
            template: template.to_string(),
            state: BuildingState::default(),
        }
    }

    fn snapshot(buildings: Vec<BuildingRecord>, units: Vec<UnitRecord>) -> Snapshot {
        Snapshot {
            metadata: SaveMetadata::new("test", SaveKind::Manual, 0.0, "dev"),
            world: WorldState::default(),
            economy: ResourceCounters {
                wood: 10,
                stone: 20,
                gold: 30,
                food: 40,
            },
            morale: MoraleState {
                happiness: 0.7,
                tax_level: 0.2,
            },
            clock: ClockState::default(),
            population: Some(PopulationState {
                current: 12,
                capacity: 20,
                idle_workers: 3,
            }),
            reputation: Some(ReputationState {
                score: 42.0,
                title: "Baron".to_string(),
            }),
            buildings,
            units,
            camera: CameraState::default(),
        }
    }

    #[test]
    fn test_references_survive_round_trip() {
        let world = MemoryWorld::shared();
        let (a, b) = {
            let mut w = world.borrow_mut();
            let footman = Arc::new(TemplateDefinition::unit("Footman"));
            let a = w.spawn_unit(Arc::clone(&footman), UnitState::default()).unwrap();
            let b = w.spawn_unit(footman, UnitState::default()).unwrap();
            w.set_combat_target(a, Some(b)).unwrap();
            w.set_forced_move_target(b, Some(a)).unwrap();
            (a, b)
        };
        let snap = SnapshotCollector::new(MemoryWorld::handles(&world), "dev")
            .collect("refs", SaveKind::Manual);

        let report = restorer_for(&world).restore(snap).unwrap();
        assert_eq!(report.units_created, 2);
        assert_eq!(report.references_linked, 2);
        assert_eq!(report.references_dangling, 0);

        let w = world.borrow();
        assert!(w.unit(a).is_none() && w.unit(b).is_none());
        let restored = w.unit_handles();
        let first = w.unit(restored[0]).unwrap();
        let second = w.unit(restored[1]).unwrap();
        assert_eq!(first.combat_target, Some(restored[1]));
        assert_eq!(second.forced_move_target, Some(restored[0]));
    }

    #[test]
    fn test_dangling_reference_is_left_unset() {
        let world = MemoryWorld::shared();
        let snap = snapshot(
            vec![],
            vec![unit(
                1,
                "Footman",
                UnitLinks {
                    combat_target: Some(RecordId(99)),
                    forced_move_target: None,
                },
            )],
        );

        let report = restorer_for(&world).restore(snap).unwrap();
        assert_eq!(report.units_created, 1);
        assert_eq!(report.references_dangling, 1);
        assert_eq!(report.references_linked, 0);

        let w = world.borrow();
        let handle = w.unit_handles()[0];
        assert_eq!(w.unit(handle).unwrap().combat_target, None);
    }

    #[test]
    fn test_unresolvable_template_is_skipped() {
        let world = MemoryWorld::shared();
        let snap = snapshot(
            vec![building(1, "Barracks"), building(2, "Wonder")],
            vec![
                unit(3, "Dragon", UnitLinks::default()),
                unit(
                    4,
                    "Footman",
                    UnitLinks {
                        combat_target: Some(RecordId(3)),
                        forced_move_target: None,
                    },
                ),
            ],
        );

        let report = restorer_for(&world).restore(snap).unwrap();
        assert_eq!(report.buildings_created, 1);
        assert_eq!(report.units_created, 1);
        assert_eq!(report.skipped.len(), 2);
        assert!(report
            .skipped
            .iter()
            .all(|s| s.reason == SkipReason::UnresolvedTemplate));
        // The footman pointed at the dragon that never came back.
        assert_eq!(report.references_dangling, 1);
        assert_eq!(world.borrow().unit_count(), 1);
    }

    #[test]
    fn test_duplicate_ids_keep_first_record() {
        let world = MemoryWorld::shared();
        let snap = snapshot(
            vec![building(5, "Barracks")],
            vec![unit(5, "Footman", UnitLinks::default()), unit(6, "Archer", UnitLinks::default())],
        );

        let report = restorer_for(&world).restore(snap).unwrap();
        assert_eq!(report.buildings_created, 1);
        assert_eq!(report.units_created, 1);
        assert_eq!(
            report.skipped,
            vec![SkippedRecord {
                id: RecordId(5),
                kind: TemplateKind::Unit,
                template: "Footman".to_string(),
                reason: SkipReason::DuplicateId,
            }]
        );
    }

    #[test]
    fn test_restore_replaces_world_and_scalars() {
        let world = MemoryWorld::shared();
        {
            let mut w = world.borrow_mut();
            for _ in 0..5 {
                w.spawn_unit(Arc::new(TemplateDefinition::unit("Peasant")), UnitState::default())
                    .unwrap();
            }
            w.economy.gold = 9999;
        }

        let mut archer = unit(2, "Archer", UnitLinks::default());
        archer.state.health = Health {
            current: 35.0,
            max: 60.0,
            dead: false,
        };
        let snap = snapshot(vec![building(1, "Barracks")], vec![archer]);

        restorer_for(&world).restore(snap).unwrap();

        let w = world.borrow();
        assert_eq!(w.unit_count(), 1);
        assert_eq!(w.building_count(), 1);
        assert_eq!(w.economy.gold, 30);
        assert_eq!(w.morale.happiness, 0.7);
        assert_eq!(w.population.capacity, 20);
        assert_eq!(w.reputation.title, "Baron");
        let archer = w.unit(w.units_of("Archer")[0]).unwrap();
        assert_eq!(archer.state.health.current, 35.0);
        assert_eq!(archer.template.max_health, 60.0);
    }

    #[test]
    fn test_morale_bonuses_follow_restored_buildings() {
        let world = MemoryWorld::shared();
        world
            .borrow_mut()
            .bonus_table
            .insert("Tavern".to_string(), 0.15);
        let snap = snapshot(vec![building(1, "Tavern"), building(2, "Tavern")], vec![]);

        restorer_for(&world).restore(snap).unwrap();
        assert!((world.borrow().morale_bonus - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_clear_failure_is_fatal() {
        let world = MemoryWorld::shared();
        world.borrow_mut().refuse_clear();

        let err = restorer_for(&world)
            .restore(snapshot(vec![building(1, "Barracks")], vec![]))
            .unwrap_err();
        assert!(matches!(err, SaveError::Restore(_)));
        assert_eq!(world.borrow().economy.gold, 0);
        assert_eq!(world.borrow().building_count(), 0);
    }

    #[test]
    fn test_missing_optional_ports_ignore_saved_blocks() {
        let world = MemoryWorld::shared();
        let mut restorer = Restorer::new(
            MemoryWorld::core_handles(&world),
            AssetResolver::new().with_strategy(registry()),
        );

        restorer.restore(snapshot(vec![], vec![])).unwrap();
        assert_eq!(world.borrow().population, PopulationState::default());
        assert_eq!(world.borrow().economy.food, 40);
    }

    #[test]
    fn test_pending_table_ignores_sentinel() {
        let mut pending = PendingReferences::new();
        pending.queue(EntityHandle(1), RecordId(1), ReferenceKind::CombatTarget, None);
        pending.queue(
            EntityHandle(1),
            RecordId(1),
            ReferenceKind::ForcedMoveTarget,
            Some(RecordId(2)),
        );
        assert_eq!(pending.len(), 1);
        assert_eq!(
            pending.iter().next().unwrap().kind,
            ReferenceKind::ForcedMoveTarget
        );
    }
}
