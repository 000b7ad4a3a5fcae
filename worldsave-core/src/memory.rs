/*!
In-memory reference world.

[`MemoryWorld`] implements every subsystem port on one plain struct. It backs
the crate's tests and benchmarks and is usable as a headless world by tools.
*/

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;
use std::sync::Arc;

use crate::model::{
    BuildingState, CameraState, ClockState, MoraleState, PopulationState, ReputationState,
    ResourceCounters, UnitState, WorldState,
};
use crate::ports::{
    BuildingView, CameraPort, ClockPort, EconomyPort, EntityHandle, EntityPort, MoralePort,
    PopulationPort, ReputationPort, SessionPort, Shared, UnitView, WorldHandles,
};
use crate::resolver::TemplateDefinition;
use crate::{Result, SaveError};

#[derive(Debug, Clone, PartialEq)]
pub struct LiveBuilding {
    pub template: Arc<TemplateDefinition>,
    pub state: BuildingState,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LiveUnit {
    pub template: Arc<TemplateDefinition>,
    pub state: UnitState,
    pub combat_target: Option<EntityHandle>,
    pub forced_move_target: Option<EntityHandle>,
}

#[derive(Debug, Default)]
pub struct MemoryWorld {
    pub world: WorldState,
    pub play_time_seconds: f64,
    pub economy: ResourceCounters,
    pub morale: MoraleState,
    /// Derived from buildings present, see [`MoralePort::recompute_bonuses`].
    pub morale_bonus: f32,
    /// Happiness bonus contributed by each building template.
    pub bonus_table: HashMap<String, f32>,
    pub clock: ClockState,
    pub population: PopulationState,
    pub reputation: ReputationState,
    pub camera: CameraState,
    next_handle: u64,
    buildings: BTreeMap<EntityHandle, LiveBuilding>,
    units: BTreeMap<EntityHandle, LiveUnit>,
    refuse_clear: bool,
    spawn_limit: Option<usize>,
}

impl MemoryWorld {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Shared<Self> {
        Rc::new(RefCell::new(Self::new()))
    }

    /// Handles to every port, optional subsystems included.
    pub fn handles(world: &Shared<Self>) -> WorldHandles {
        let mut handles = Self::core_handles(world);
        handles.population = Some(world.clone());
        handles.reputation = Some(world.clone());
        handles
    }

    /// Handles without the optional population and reputation subsystems.
    pub fn core_handles(world: &Shared<Self>) -> WorldHandles {
        WorldHandles {
            session: world.clone(),
            economy: world.clone(),
            morale: world.clone(),
            clock: world.clone(),
            population: None,
            reputation: None,
            camera: world.clone(),
            entities: world.clone(),
        }
    }

    /// Make every later [`EntityPort::clear`] fail, as a world whose teardown
    /// is broken would.
    pub fn refuse_clear(&mut self) {
        self.refuse_clear = true;
    }

    /// Make spawning fail once the world holds `limit` entities, as a world
    /// that runs out of room mid-restore would.
    pub fn refuse_spawn_after(&mut self, limit: usize) {
        self.spawn_limit = Some(limit);
    }

    pub fn building(&self, handle: EntityHandle) -> Option<&LiveBuilding> {
        self.buildings.get(&handle)
    }

    pub fn unit(&self, handle: EntityHandle) -> Option<&LiveUnit> {
        self.units.get(&handle)
    }

    pub fn unit_mut(&mut self, handle: EntityHandle) -> Option<&mut LiveUnit> {
        self.units.get_mut(&handle)
    }

    pub fn building_count(&self) -> usize {
        self.buildings.len()
    }

    pub fn unit_count(&self) -> usize {
        self.units.len()
    }

    pub fn building_handles(&self) -> Vec<EntityHandle> {
        self.buildings.keys().copied().collect()
    }

    pub fn unit_handles(&self) -> Vec<EntityHandle> {
        self.units.keys().copied().collect()
    }

    /// Handles of every unit spawned from `template`, oldest first.
    pub fn units_of(&self, template: &str) -> Vec<EntityHandle> {
        self.units
            .iter()
            .filter(|(_, unit)| unit.template.name == template)
            .map(|(handle, _)| *handle)
            .collect()
    }

    pub fn buildings_of(&self, template: &str) -> Vec<EntityHandle> {
        self.buildings
            .iter()
            .filter(|(_, building)| building.template.name == template)
            .map(|(handle, _)| *handle)
            .collect()
    }

    fn mint_handle(&mut self) -> Result<EntityHandle> {
        if let Some(limit) = self.spawn_limit {
            if self.buildings.len() + self.units.len() >= limit {
                return Err(SaveError::restore(format!(
                    "world refused to spawn beyond {limit} entities"
                )));
            }
        }
        self.next_handle += 1;
        Ok(EntityHandle(self.next_handle))
    }

    fn live_unit_mut(&mut self, handle: EntityHandle) -> Result<&mut LiveUnit> {
        self.units
            .get_mut(&handle)
            .ok_or_else(|| SaveError::restore(format!("no live unit with handle {}", handle.0)))
    }
}

impl SessionPort for MemoryWorld {
    fn world_state(&self) -> WorldState {
        self.world
    }

    fn apply_world_state(&mut self, state: &WorldState) {
        self.world = *state;
    }

    fn play_time_seconds(&self) -> f64 {
        self.play_time_seconds
    }
}

impl EconomyPort for MemoryWorld {
    fn counters(&self) -> ResourceCounters {
        self.economy
    }

    fn replace_counters(&mut self, counters: ResourceCounters) {
        self.economy = counters;
    }
}

impl MoralePort for MemoryWorld {
    fn morale(&self) -> MoraleState {
        self.morale
    }

    fn apply_morale(&mut self, morale: &MoraleState) {
        self.morale = *morale;
    }

    fn recompute_bonuses(&mut self, building_templates: &[String]) {
        self.morale_bonus = building_templates
            .iter()
            .filter_map(|name| self.bonus_table.get(name))
            .sum();
    }
}

impl ClockPort for MemoryWorld {
    fn clock(&self) -> ClockState {
        self.clock
    }

    fn apply_clock(&mut self, clock: &ClockState) {
        self.clock = *clock;
    }
}

impl PopulationPort for MemoryWorld {
    fn population(&self) -> PopulationState {
        self.population
    }

    fn apply_population(&mut self, population: &PopulationState) {
        self.population = *population;
    }
}

impl ReputationPort for MemoryWorld {
    fn reputation(&self) -> ReputationState {
        self.reputation.clone()
    }

    fn apply_reputation(&mut self, reputation: &ReputationState) {
        self.reputation = reputation.clone();
    }
}

impl CameraPort for MemoryWorld {
    fn camera(&self) -> CameraState {
        self.camera
    }

    fn apply_camera(&mut self, camera: &CameraState) {
        self.camera = *camera;
    }
}

impl EntityPort for MemoryWorld {
    fn buildings(&self) -> Vec<(EntityHandle, BuildingView)> {
        self.buildings
            .iter()
            .map(|(handle, building)| {
                (
                    *handle,
                    BuildingView {
                        template: building.template.name.clone(),
                        state: building.state.clone(),
                    },
                )
            })
            .collect()
    }

    fn units(&self) -> Vec<(EntityHandle, UnitView)> {
        self.units
            .iter()
            .map(|(handle, unit)| {
                (
                    *handle,
                    UnitView {
                        template: unit.template.name.clone(),
                        state: unit.state.clone(),
                        combat_target: unit.combat_target,
                        forced_move_target: unit.forced_move_target,
                    },
                )
            })
            .collect()
    }

    fn live_templates(&self) -> Vec<Arc<TemplateDefinition>> {
        let mut seen: Vec<Arc<TemplateDefinition>> = Vec::new();
        let templates = self
            .buildings
            .values()
            .map(|b| &b.template)
            .chain(self.units.values().map(|u| &u.template));
        for template in templates {
            if !seen
                .iter()
                .any(|s| s.kind == template.kind && s.name == template.name)
            {
                seen.push(Arc::clone(template));
            }
        }
        seen
    }

    fn clear(&mut self) -> Result<()> {
        if self.refuse_clear {
            return Err(SaveError::restore("world refused to clear its entities"));
        }
        self.buildings.clear();
        self.units.clear();
        Ok(())
    }

    fn spawn_building(
        &mut self,
        template: Arc<TemplateDefinition>,
        state: BuildingState,
    ) -> Result<EntityHandle> {
        let handle = self.mint_handle()?;
        self.buildings
            .insert(handle, LiveBuilding { template, state });
        Ok(handle)
    }

    fn spawn_unit(
        &mut self,
        template: Arc<TemplateDefinition>,
        state: UnitState,
    ) -> Result<EntityHandle> {
        let handle = self.mint_handle()?;
        self.units.insert(
            handle,
            LiveUnit {
                template,
                state,
                combat_target: None,
                forced_move_target: None,
            },
        );
        Ok(handle)
    }

    fn set_combat_target(
        &mut self,
        unit: EntityHandle,
        target: Option<EntityHandle>,
    ) -> Result<()> {
        self.live_unit_mut(unit)?.combat_target = target;
        Ok(())
    }

    fn set_forced_move_target(
        &mut self,
        unit: EntityHandle,
        target: Option<EntityHandle>,
    ) -> Result<()> {
        self.live_unit_mut(unit)?.forced_move_target = target;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handles_share_one_world() {
        let world = MemoryWorld::shared();
        let handles = MemoryWorld::handles(&world);

        handles.economy.borrow_mut().replace_counters(ResourceCounters {
            gold: 50,
            ..Default::default()
        });
        assert_eq!(world.borrow().economy.gold, 50);
        assert!(handles.population.is_some());
        assert!(MemoryWorld::core_handles(&world).reputation.is_none());
    }

    #[test]
    fn test_handles_are_fresh_after_clear() {
        let mut world = MemoryWorld::new();
        let footman = Arc::new(TemplateDefinition::unit("Footman"));
        let first = world
            .spawn_unit(Arc::clone(&footman), UnitState::default())
            .unwrap();
        world.clear().unwrap();
        let second = world.spawn_unit(footman, UnitState::default()).unwrap();

        assert_ne!(first, second);
        assert!(world.unit(first).is_none());
    }

    #[test]
    fn test_spawn_limit_counts_live_entities() {
        let mut world = MemoryWorld::new();
        world.refuse_spawn_after(2);
        let barracks = Arc::new(TemplateDefinition::building("Barracks"));
        let footman = Arc::new(TemplateDefinition::unit("Footman"));

        world
            .spawn_building(barracks.clone(), BuildingState::default())
            .unwrap();
        world.spawn_unit(footman.clone(), UnitState::default()).unwrap();
        assert!(matches!(
            world.spawn_unit(footman.clone(), UnitState::default()),
            Err(SaveError::Restore(_))
        ));
        assert_eq!(world.unit_count(), 1);

        world.clear().unwrap();
        assert!(world.spawn_building(barracks, BuildingState::default()).is_ok());
    }

    #[test]
    fn test_targeting_unknown_unit_fails() {
        let mut world = MemoryWorld::new();
        assert!(world
            .set_combat_target(EntityHandle(99), Some(EntityHandle(1)))
            .is_err());
    }

    #[test]
    fn test_bonus_recompute_uses_table() {
        let mut world = MemoryWorld::new();
        world.bonus_table.insert("Tavern".to_string(), 0.1);
        world.bonus_table.insert("Church".to_string(), 0.25);

        world.recompute_bonuses(&[
            "Tavern".to_string(),
            "Tavern".to_string(),
            "Church".to_string(),
            "Barracks".to_string(),
        ]);
        assert!((world.morale_bonus - 0.45).abs() < 1e-6);
    }

    #[test]
    fn test_live_templates_are_unique() {
        let mut world = MemoryWorld::new();
        let footman = Arc::new(TemplateDefinition::unit("Footman"));
        world
            .spawn_unit(Arc::clone(&footman), UnitState::default())
            .unwrap();
        world.spawn_unit(footman, UnitState::default()).unwrap();
        world
            .spawn_building(
                Arc::new(TemplateDefinition::building("Farm")),
                BuildingState::default(),
            )
            .unwrap();

        assert_eq!(world.live_templates().len(), 2);
    }
}
