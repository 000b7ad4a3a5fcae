/*!
Snapshot data model.

A [`Snapshot`] is the complete, self-contained serializable picture of a world
at one instant. Everything here is plain data: transforms are float triples and
quads, entity references are snapshot-local [`RecordId`]s, and nothing holds a
runtime handle.
*/

use serde::{Deserialize, Serialize};

use crate::metadata::SaveMetadata;
use crate::{Result, SaveError};

/// Three-component float vector.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3::new(0.0, 0.0, 0.0);
    pub const ONE: Vec3 = Vec3::new(1.0, 1.0, 1.0);

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn to_array(self) -> [f32; 3] {
        [self.x, self.y, self.z]
    }
}

/// Rotation quaternion, stored as written by the host engine.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Quat {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Quat {
    pub const IDENTITY: Quat = Quat {
        x: 0.0,
        y: 0.0,
        z: 0.0,
        w: 1.0,
    };

    pub fn to_array(self) -> [f32; 4] {
        [self.x, self.y, self.z, self.w]
    }
}

impl Default for Quat {
    fn default() -> Self {
        Self::IDENTITY
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Transform {
    pub fn at(position: Vec3) -> Self {
        Self {
            position,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

/// Identifier unique only within one snapshot.
///
/// Minted at collection time and meaningless outside the snapshot that holds
/// it; never derived from a runtime handle.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct RecordId(pub u32);

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Top-level game state machine.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum GameState {
    MainMenu,
    #[default]
    Playing,
    Victory,
    Defeat,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct WorldState {
    pub game_state: GameState,
    pub paused: bool,
    pub time_scale: f32,
}

impl Default for WorldState {
    fn default() -> Self {
        Self {
            game_state: GameState::Playing,
            paused: false,
            time_scale: 1.0,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Wood,
    Stone,
    Gold,
    Food,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 4] = [
        ResourceKind::Wood,
        ResourceKind::Stone,
        ResourceKind::Gold,
        ResourceKind::Food,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Wood => "wood",
            ResourceKind::Stone => "stone",
            ResourceKind::Gold => "gold",
            ResourceKind::Food => "food",
        }
    }
}

/// The fixed set of economy counters.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResourceCounters {
    pub wood: i64,
    pub stone: i64,
    pub gold: i64,
    pub food: i64,
}

impl ResourceCounters {
    pub fn get(&self, kind: ResourceKind) -> i64 {
        match kind {
            ResourceKind::Wood => self.wood,
            ResourceKind::Stone => self.stone,
            ResourceKind::Gold => self.gold,
            ResourceKind::Food => self.food,
        }
    }
}

/// Persisted morale inputs. Building bonuses are derived and never stored.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
pub struct MoraleState {
    pub happiness: f32,
    pub tax_level: f32,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct ClockState {
    /// Hours since midnight, `0.0..24.0`.
    pub time_of_day: f32,
    pub day: u32,
    /// Normalized progress through the current day, `0.0..1.0`.
    pub day_progress: f32,
    pub time_scale: f32,
}

impl Default for ClockState {
    fn default() -> Self {
        Self {
            time_of_day: 6.0,
            day: 1,
            day_progress: 0.25,
            time_scale: 1.0,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PopulationState {
    pub current: u32,
    pub capacity: u32,
    pub idle_workers: u32,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct ReputationState {
    pub score: f32,
    pub title: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct CameraState {
    pub position: Vec3,
    pub rotation: Quat,
    pub field_of_view: f32,
    pub ortho_size: f32,
    pub orthographic: bool,
}

impl Default for CameraState {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 20.0, -20.0),
            rotation: Quat::IDENTITY,
            field_of_view: 60.0,
            ortho_size: 10.0,
            orthographic: false,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Construction {
    pub constructed: bool,
    /// `0.0..=1.0`; `1.0` once constructed.
    pub progress: f32,
}

impl Default for Construction {
    fn default() -> Self {
        Self {
            constructed: true,
            progress: 1.0,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Ownership {
    pub team: u32,
    pub player_owned: bool,
}

/// Everything about a building except its identity.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct BuildingState {
    pub transform: Transform,
    pub construction: Construction,
    pub ownership: Ownership,
    pub layer: String,
    pub tag: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct BuildingRecord {
    pub id: RecordId,
    pub template: String,
    #[serde(flatten)]
    pub state: BuildingState,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Health {
    pub current: f32,
    pub max: f32,
    pub dead: bool,
}

impl Health {
    pub fn full(max: f32) -> Self {
        Self {
            current: max,
            max,
            dead: false,
        }
    }
}

impl Default for Health {
    fn default() -> Self {
        Self::full(100.0)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
pub struct Movement {
    pub speed: f32,
    pub moving: bool,
    /// Last known destination. Best-effort: hosts may not expose it.
    pub destination: Option<Vec3>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
pub struct CombatStats {
    pub damage: f32,
    pub range: f32,
    /// Attacks per second.
    pub rate: f32,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AiState {
    /// State-machine tag, e.g. `idle`, `attacking`.
    pub state: String,
    pub aggro_origin: Option<Vec3>,
    pub forced_move_destination: Option<Vec3>,
}

impl Default for AiState {
    fn default() -> Self {
        Self {
            state: "idle".to_string(),
            aggro_origin: None,
            forced_move_destination: None,
        }
    }
}

/// Everything about a unit except its identity and entity references.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct UnitState {
    pub transform: Transform,
    pub health: Health,
    pub movement: Movement,
    pub combat: CombatStats,
    pub ai: AiState,
}

/// Entity references held by a unit. `None` is the "no reference" sentinel.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UnitLinks {
    pub combat_target: Option<RecordId>,
    pub forced_move_target: Option<RecordId>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct UnitRecord {
    pub id: RecordId,
    pub template: String,
    #[serde(flatten)]
    pub state: UnitState,
    #[serde(default)]
    pub links: UnitLinks,
}

/// Root value of a save.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub metadata: SaveMetadata,
    pub world: WorldState,
    pub economy: ResourceCounters,
    pub morale: MoraleState,
    pub clock: ClockState,
    pub population: Option<PopulationState>,
    pub reputation: Option<ReputationState>,
    pub buildings: Vec<BuildingRecord>,
    pub units: Vec<UnitRecord>,
    pub camera: CameraState,
}

impl Snapshot {
    pub fn entity_count(&self) -> usize {
        self.buildings.len() + self.units.len()
    }

    /// Check that the snapshot can be written and read back.
    ///
    /// JSON has no encoding for NaN or infinity; serde_json writes them as
    /// `null`, which no longer parses as a float on load.
    ///
    /// # Errors
    /// * `SaveError::Validation` - invalid metadata or a non-finite float
    pub fn validate(&self) -> Result<()> {
        self.metadata.validate()?;

        ensure_finite(|| "world".to_string(), "time scale", &[self.world.time_scale])?;
        ensure_finite(
            || "morale".to_string(),
            "inputs",
            &[self.morale.happiness, self.morale.tax_level],
        )?;
        ensure_finite(
            || "clock".to_string(),
            "time",
            &[self.clock.time_of_day, self.clock.day_progress, self.clock.time_scale],
        )?;
        if let Some(reputation) = &self.reputation {
            ensure_finite(|| "reputation".to_string(), "score", &[reputation.score])?;
        }
        ensure_finite(|| "camera".to_string(), "position", &self.camera.position.to_array())?;
        ensure_finite(|| "camera".to_string(), "rotation", &self.camera.rotation.to_array())?;
        ensure_finite(
            || "camera".to_string(),
            "projection",
            &[self.camera.field_of_view, self.camera.ortho_size],
        )?;

        for building in &self.buildings {
            let owner = || format!("building {} ({})", building.id, building.template);
            ensure_transform(owner, &building.state.transform)?;
            ensure_finite(
                owner,
                "construction progress",
                &[building.state.construction.progress],
            )?;
        }

        for unit in &self.units {
            let owner = || format!("unit {} ({})", unit.id, unit.template);
            let state = &unit.state;
            ensure_transform(owner, &state.transform)?;
            ensure_finite(owner, "health", &[state.health.current, state.health.max])?;
            ensure_finite(owner, "speed", &[state.movement.speed])?;
            ensure_finite(
                owner,
                "combat stats",
                &[state.combat.damage, state.combat.range, state.combat.rate],
            )?;
            let points = [
                ("destination", state.movement.destination),
                ("aggro origin", state.ai.aggro_origin),
                ("forced-move destination", state.ai.forced_move_destination),
            ];
            for (field, point) in points {
                if let Some(point) = point {
                    ensure_finite(owner, field, &point.to_array())?;
                }
            }
        }
        Ok(())
    }
}

fn ensure_finite<F>(owner: F, field: &str, values: &[f32]) -> Result<()>
where
    F: Fn() -> String,
{
    match values.iter().find(|value| !value.is_finite()) {
        None => Ok(()),
        Some(value) => Err(SaveError::validation(format!(
            "{} has a non-finite {field} ({value})",
            owner()
        ))),
    }
}

fn ensure_transform<F>(owner: F, transform: &Transform) -> Result<()>
where
    F: Fn() -> String,
{
    ensure_finite(&owner, "position", &transform.position.to_array())?;
    ensure_finite(&owner, "rotation", &transform.rotation.to_array())?;
    ensure_finite(&owner, "scale", &transform.scale.to_array())
}
