/*!
Subsystem ports.

The persistence core never reaches into game subsystems directly. Each
subsystem is seen through a small get-state / set-state port, and the
collector and restorer receive a [`WorldHandles`] bundle at construction.
Handles are `Rc<RefCell<..>>`: the world lives on a single thread and a port
is only borrowed for the duration of one call.
*/

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use crate::model::{
    BuildingState, CameraState, ClockState, MoraleState, PopulationState, ReputationState,
    ResourceCounters, UnitState, WorldState,
};
use crate::resolver::TemplateDefinition;
use crate::Result;

/// Shared single-threaded handle to a port.
pub type Shared<T> = Rc<RefCell<T>>;

/// Runtime identity of a live entity. Not stable across a restore.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityHandle(pub u64);

/// Game state machine, pause flag and session play time.
#[cfg_attr(test, mockall::automock)]
pub trait SessionPort {
    fn world_state(&self) -> WorldState;
    fn apply_world_state(&mut self, state: &WorldState);
    fn play_time_seconds(&self) -> f64;
}

#[cfg_attr(test, mockall::automock)]
pub trait EconomyPort {
    fn counters(&self) -> ResourceCounters;
    fn replace_counters(&mut self, counters: ResourceCounters);
}

pub trait MoralePort {
    fn morale(&self) -> MoraleState;
    fn apply_morale(&mut self, morale: &MoraleState);
    /// Rebuild derived bonuses from the templates of the buildings present.
    fn recompute_bonuses(&mut self, building_templates: &[String]);
}

pub trait ClockPort {
    fn clock(&self) -> ClockState;
    fn apply_clock(&mut self, clock: &ClockState);
}

/// Optional subsystem; applying is best-effort.
pub trait PopulationPort {
    fn population(&self) -> PopulationState;
    fn apply_population(&mut self, population: &PopulationState);
}

/// Optional subsystem; applying is best-effort.
pub trait ReputationPort {
    fn reputation(&self) -> ReputationState;
    fn apply_reputation(&mut self, reputation: &ReputationState);
}

pub trait CameraPort {
    fn camera(&self) -> CameraState;
    fn apply_camera(&mut self, camera: &CameraState);
}

/// Read view of a live building.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildingView {
    pub template: String,
    pub state: BuildingState,
}

/// Read view of a live unit, references expressed as runtime handles.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitView {
    pub template: String,
    pub state: UnitState,
    pub combat_target: Option<EntityHandle>,
    pub forced_move_target: Option<EntityHandle>,
}

/// Live entity registry of the world.
pub trait EntityPort {
    /// Every live building, in a stable order for the current frame.
    fn buildings(&self) -> Vec<(EntityHandle, BuildingView)>;

    fn units(&self) -> Vec<(EntityHandle, UnitView)>;

    /// Template definitions referenced by live instances.
    fn live_templates(&self) -> Vec<Arc<TemplateDefinition>>;

    /// Destroy every live building and unit.
    fn clear(&mut self) -> Result<()>;

    fn spawn_building(
        &mut self,
        template: Arc<TemplateDefinition>,
        state: BuildingState,
    ) -> Result<EntityHandle>;

    fn spawn_unit(&mut self, template: Arc<TemplateDefinition>, state: UnitState)
        -> Result<EntityHandle>;

    fn set_combat_target(&mut self, unit: EntityHandle, target: Option<EntityHandle>)
        -> Result<()>;

    fn set_forced_move_target(
        &mut self,
        unit: EntityHandle,
        target: Option<EntityHandle>,
    ) -> Result<()>;
}

/// Constructor-injected handles to every subsystem the core touches.
#[derive(Clone)]
pub struct WorldHandles {
    pub session: Shared<dyn SessionPort>,
    pub economy: Shared<dyn EconomyPort>,
    pub morale: Shared<dyn MoralePort>,
    pub clock: Shared<dyn ClockPort>,
    pub population: Option<Shared<dyn PopulationPort>>,
    pub reputation: Option<Shared<dyn ReputationPort>>,
    pub camera: Shared<dyn CameraPort>,
    pub entities: Shared<dyn EntityPort>,
}

impl std::fmt::Debug for WorldHandles {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorldHandles")
            .field("population", &self.population.is_some())
            .field("reputation", &self.reputation.is_some())
            .finish_non_exhaustive()
    }
}
