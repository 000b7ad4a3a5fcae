/*!
Template resolution.

Records only carry a template name. The [`AssetResolver`] turns that name back
into a [`TemplateDefinition`] by trying an ordered chain of [`TemplateLookup`]
strategies, cheap indexed lookups first and full scans last. Templates may
legitimately live outside every registry (reachable only through an existing
instance), so no single strategy is authoritative.
*/

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use crate::ports::{EntityPort, Shared};
use crate::{Result, SaveError};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TemplateKind {
    Building,
    Unit,
}

impl fmt::Display for TemplateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemplateKind::Building => f.write_str("building"),
            TemplateKind::Unit => f.write_str("unit"),
        }
    }
}

fn default_max_health() -> f32 {
    100.0
}

/// Immutable "type" data an instance is created from.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TemplateDefinition {
    pub name: String,
    pub kind: TemplateKind,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default = "default_max_health")]
    pub max_health: f32,
}

impl TemplateDefinition {
    pub fn new<S: Into<String>>(name: S, kind: TemplateKind) -> Self {
        Self {
            name: name.into(),
            kind,
            category: None,
            aliases: Vec::new(),
            max_health: default_max_health(),
        }
    }

    pub fn building<S: Into<String>>(name: S) -> Self {
        Self::new(name, TemplateKind::Building)
    }

    pub fn unit<S: Into<String>>(name: S) -> Self {
        Self::new(name, TemplateKind::Unit)
    }

    pub fn with_category<S: Into<String>>(mut self, category: S) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_alias<S: Into<String>>(mut self, alias: S) -> Self {
        self.aliases.push(alias.into());
        self
    }

    pub fn with_max_health(mut self, max_health: f32) -> Self {
        self.max_health = max_health;
        self
    }

    /// Case-insensitive match against the name or any alias.
    pub fn answers_to(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
            || self.aliases.iter().any(|a| a.eq_ignore_ascii_case(name))
    }
}

/// One resolution strategy in the chain.
pub trait TemplateLookup {
    fn strategy_name(&self) -> &'static str;

    fn lookup(&self, kind: TemplateKind, name: &str) -> Option<Arc<TemplateDefinition>>;

    /// Called before the world is cleared for a restore. Strategies that read
    /// live world state cache what they need here.
    fn refresh(&mut self) {}
}

type TemplateIndex = HashMap<(TemplateKind, String), Arc<TemplateDefinition>>;

fn index_of<I>(definitions: I) -> TemplateIndex
where
    I: IntoIterator<Item = TemplateDefinition>,
{
    definitions
        .into_iter()
        .map(|def| ((def.kind, def.name.clone()), Arc::new(def)))
        .collect()
}

/// Global name → definition registry.
#[derive(Debug, Default, Clone)]
pub struct GlobalRegistry {
    index: TemplateIndex,
}

impl GlobalRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_definitions<I>(definitions: I) -> Self
    where
        I: IntoIterator<Item = TemplateDefinition>,
    {
        Self {
            index: index_of(definitions),
        }
    }

    pub fn register(&mut self, definition: TemplateDefinition) {
        self.index
            .insert((definition.kind, definition.name.clone()), Arc::new(definition));
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

impl TemplateLookup for GlobalRegistry {
    fn strategy_name(&self) -> &'static str {
        "global_registry"
    }

    fn lookup(&self, kind: TemplateKind, name: &str) -> Option<Arc<TemplateDefinition>> {
        self.index.get(&(kind, name.to_string())).cloned()
    }
}

/// Well-known category sub-registries, searched in insertion order.
#[derive(Debug, Default, Clone)]
pub struct CategoryRegistries {
    categories: Vec<(String, TemplateIndex)>,
}

impl CategoryRegistries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_category<S, I>(mut self, category: S, definitions: I) -> Self
    where
        S: Into<String>,
        I: IntoIterator<Item = TemplateDefinition>,
    {
        self.categories
            .push((category.into(), index_of(definitions)));
        self
    }

    pub fn category_names(&self) -> impl Iterator<Item = &str> {
        self.categories.iter().map(|(name, _)| name.as_str())
    }
}

impl TemplateLookup for CategoryRegistries {
    fn strategy_name(&self) -> &'static str {
        "category_registries"
    }

    fn lookup(&self, kind: TemplateKind, name: &str) -> Option<Arc<TemplateDefinition>> {
        let key = (kind, name.to_string());
        self.categories
            .iter()
            .find_map(|(_, index)| index.get(&key).cloned())
    }
}

/// Definitions referenced by live instances in the world.
pub struct LiveInstanceLookup {
    entities: Shared<dyn EntityPort>,
    cached: Vec<Arc<TemplateDefinition>>,
}

impl LiveInstanceLookup {
    pub fn new(entities: Shared<dyn EntityPort>) -> Self {
        Self {
            entities,
            cached: Vec::new(),
        }
    }
}

impl TemplateLookup for LiveInstanceLookup {
    fn strategy_name(&self) -> &'static str {
        "live_instances"
    }

    fn lookup(&self, kind: TemplateKind, name: &str) -> Option<Arc<TemplateDefinition>> {
        let matches = |def: &Arc<TemplateDefinition>| def.kind == kind && def.name == name;

        if let Some(def) = self.cached.iter().find(|def| matches(def)) {
            return Some(Arc::clone(def));
        }
        self.entities
            .borrow()
            .live_templates()
            .into_iter()
            .find(|def| matches(def))
    }

    fn refresh(&mut self) {
        self.cached = self.entities.borrow().live_templates();
    }
}

/// Full scan over every loaded definition, matching names and aliases
/// case-insensitively.
#[derive(Debug, Default, Clone)]
pub struct DefinitionScan {
    definitions: Vec<Arc<TemplateDefinition>>,
}

impl DefinitionScan {
    pub fn new<I>(definitions: I) -> Self
    where
        I: IntoIterator<Item = TemplateDefinition>,
    {
        Self {
            definitions: definitions.into_iter().map(Arc::new).collect(),
        }
    }

    /// Load a JSON array of definitions
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| {
            SaveError::storage(format!(
                "Failed to read definitions from {}: {}",
                path.display(),
                e
            ))
        })?;
        let definitions: Vec<TemplateDefinition> = serde_json::from_slice(&bytes)?;
        Ok(Self::new(definitions))
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

impl TemplateLookup for DefinitionScan {
    fn strategy_name(&self) -> &'static str {
        "definition_scan"
    }

    fn lookup(&self, kind: TemplateKind, name: &str) -> Option<Arc<TemplateDefinition>> {
        self.definitions
            .iter()
            .find(|def| def.kind == kind && def.answers_to(name))
            .cloned()
    }
}

/// Ordered chain of lookup strategies
///
/// # Example
/// ```rust
/// use worldsave_core::resolver::{
///     AssetResolver, DefinitionScan, GlobalRegistry, TemplateDefinition, TemplateKind,
/// };
///
/// let resolver = AssetResolver::new()
///     .with_strategy(GlobalRegistry::from_definitions([TemplateDefinition::building("Barracks")]))
///     .with_strategy(DefinitionScan::new([
///         TemplateDefinition::unit("Footman").with_alias("footsoldier"),
///     ]));
///
/// assert!(resolver.resolve(TemplateKind::Building, "Barracks").is_ok());
/// assert_eq!(resolver.resolve(TemplateKind::Unit, "FootSoldier")?.name, "Footman");
/// # Ok::<(), worldsave_core::SaveError>(())
/// ```
#[derive(Default)]
pub struct AssetResolver {
    chain: Vec<Box<dyn TemplateLookup>>,
}

impl AssetResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// The four standard strategies in their canonical order.
    pub fn standard(
        global: GlobalRegistry,
        categories: CategoryRegistries,
        entities: Shared<dyn EntityPort>,
        scan: DefinitionScan,
    ) -> Self {
        Self::new()
            .with_strategy(global)
            .with_strategy(categories)
            .with_strategy(LiveInstanceLookup::new(entities))
            .with_strategy(scan)
    }

    pub fn with_strategy<L>(mut self, strategy: L) -> Self
    where
        L: TemplateLookup + 'static,
    {
        self.chain.push(Box::new(strategy));
        self
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.chain.iter().map(|s| s.strategy_name()).collect()
    }

    /// Resolve a template by trying each strategy in order
    ///
    /// # Errors
    /// * `SaveError::TemplateNotFound` - every strategy missed
    pub fn resolve(&self, kind: TemplateKind, name: &str) -> Result<Arc<TemplateDefinition>> {
        for strategy in &self.chain {
            if let Some(def) = strategy.lookup(kind, name) {
                debug!(
                    strategy = strategy.strategy_name(),
                    %kind,
                    template = name,
                    "Resolved template"
                );
                return Ok(def);
            }
        }
        Err(SaveError::TemplateNotFound {
            kind,
            name: name.to_string(),
        })
    }

    pub fn refresh(&mut self) {
        for strategy in &mut self.chain {
            strategy.refresh();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryWorld;
    use crate::model::{BuildingState, UnitState};
    use crate::ports::EntityPort;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_registry_wins_over_scan() {
        let resolver = AssetResolver::new()
            .with_strategy(GlobalRegistry::from_definitions([
                TemplateDefinition::unit("Footman").with_max_health(120.0),
            ]))
            .with_strategy(DefinitionScan::new([
                TemplateDefinition::unit("Footman").with_max_health(1.0),
            ]));

        let def = resolver.resolve(TemplateKind::Unit, "Footman").unwrap();
        assert_eq!(def.max_health, 120.0);
    }

    #[test]
    fn test_category_registries_in_order() {
        let categories = CategoryRegistries::new()
            .with_category(
                "military",
                [TemplateDefinition::building("Tower").with_category("military")],
            )
            .with_category(
                "defense",
                [TemplateDefinition::building("Tower").with_category("defense")],
            );
        assert_eq!(
            categories.category_names().collect::<Vec<_>>(),
            vec!["military", "defense"]
        );

        let def = categories.lookup(TemplateKind::Building, "Tower").unwrap();
        assert_eq!(def.category.as_deref(), Some("military"));
        assert!(categories.lookup(TemplateKind::Unit, "Tower").is_none());
    }

    #[test]
    fn test_scan_matches_aliases_case_insensitively() {
        let scan = DefinitionScan::new([TemplateDefinition::unit("Footman").with_alias("Grunt")]);
        assert_eq!(scan.lookup(TemplateKind::Unit, "grunt").unwrap().name, "Footman");
        assert_eq!(scan.lookup(TemplateKind::Unit, "FOOTMAN").unwrap().name, "Footman");
        assert!(scan.lookup(TemplateKind::Building, "Footman").is_none());
    }

    #[test]
    fn test_live_instances_survive_clear_after_refresh() {
        let world = Rc::new(RefCell::new(MemoryWorld::new()));
        let hermit = Arc::new(TemplateDefinition::unit("Hermit"));
        world
            .borrow_mut()
            .spawn_unit(Arc::clone(&hermit), UnitState::default())
            .unwrap();
        world
            .borrow_mut()
            .spawn_building(
                Arc::new(TemplateDefinition::building("Shrine")),
                BuildingState::default(),
            )
            .unwrap();

        let entities: Shared<dyn EntityPort> = world.clone();
        let mut lookup = LiveInstanceLookup::new(entities);
        assert!(lookup.lookup(TemplateKind::Unit, "Hermit").is_some());

        lookup.refresh();
        world.borrow_mut().clear().unwrap();

        assert_eq!(lookup.lookup(TemplateKind::Unit, "Hermit").unwrap(), hermit);
        assert!(lookup.lookup(TemplateKind::Building, "Shrine").is_some());
        assert!(lookup.lookup(TemplateKind::Unit, "Shrine").is_none());
    }

    #[test]
    fn test_not_found_when_every_strategy_misses() {
        let resolver = AssetResolver::new()
            .with_strategy(GlobalRegistry::new())
            .with_strategy(DefinitionScan::default());

        let err = resolver.resolve(TemplateKind::Building, "Wonder").unwrap_err();
        match err {
            SaveError::TemplateNotFound { kind, name } => {
                assert_eq!(kind, TemplateKind::Building);
                assert_eq!(name, "Wonder");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_standard_chain_order() {
        let world = Rc::new(RefCell::new(MemoryWorld::new()));
        let resolver = AssetResolver::standard(
            GlobalRegistry::new(),
            CategoryRegistries::new(),
            world,
            DefinitionScan::default(),
        );
        assert_eq!(
            resolver.strategy_names(),
            vec![
                "global_registry",
                "category_registries",
                "live_instances",
                "definition_scan"
            ]
        );
    }

    #[test]
    fn test_definitions_load_from_json() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("definitions.json");
        std::fs::write(
            &path,
            r#"[
                {"name": "Farm", "kind": "building"},
                {"name": "Archer", "kind": "unit", "aliases": ["bowman"], "max_health": 60.0}
            ]"#,
        )
        .unwrap();

        let scan = DefinitionScan::from_json_file(&path).unwrap();
        assert_eq!(scan.len(), 2);
        let archer = scan.lookup(TemplateKind::Unit, "Bowman").unwrap();
        assert_eq!(archer.max_health, 60.0);
        assert_eq!(
            scan.lookup(TemplateKind::Building, "farm").unwrap().max_health,
            100.0
        );
    }
}
