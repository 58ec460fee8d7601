//! Scenario plans and battle materialization.
//!
//! A [`ScenarioPlan`] is what an asset loader hands the core: layered
//! terrain, unit definitions with stat overrides, markers and regions,
//! placements, objectives, and settings. `materialize` resolves all of it
//! into a ready [`GameState`] - after that the simulation never sees a
//! marker or region again. Every problem in the plan surfaces as a
//! [`ScenarioError`] before any battle state exists.

use crate::components::*;
use crate::error::ScenarioError;
use crate::map::{MapLayer, Tile, TileMap, Tileset};
use crate::rng::setup_stream;
use crate::state::{GameState, Hazard, HazardKind, UnitSpawn};
use crate::timeline::{EntryKind, HazardId, Tick, Weight};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Optional stat overrides layered over class defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UnitOverrides {
    pub hp_max: Option<i32>,
    pub strength: Option<i32>,
    pub defense: Option<i32>,
    pub range_min: Option<u32>,
    pub range_max: Option<u32>,
    pub crit_chance: Option<u32>,
    pub accuracy: Option<u32>,
    pub movement_points: Option<u32>,
    pub speed: Option<u32>,
    pub morale: Option<i32>,
    pub personality: Option<Personality>,
}

/// One unit the scenario fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitDef {
    pub name: String,
    pub class: UnitClass,
    pub team: Team,
    #[serde(default)]
    pub overrides: UnitOverrides,
}

/// How a placement target lands on the map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Placement {
    At(Vector2),
    AtMarker(String),
    AtRegion { region: String, policy: RegionPolicy },
}

/// Closed set of region placement policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegionPolicy {
    RandomFreeTile,
    SpreadEvenly,
}

/// Binds a named unit (or object) to a placement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlacementDef {
    pub target: String,
    pub placement: Placement,
}

/// A non-unit object the scenario drops on the map. Hazards are the only
/// kind the core materializes today.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectDef {
    pub name: String,
    pub kind: HazardKind,
    pub damage: i32,
    /// Ticks between pulses.
    pub period: Weight,
    pub placement: Placement,
}

/// Victory and defeat predicate buckets.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObjectiveSpec {
    pub victory: Vec<crate::managers::objective::ObjectivePredicate>,
    pub defeat: Vec<crate::managers::objective::ObjectivePredicate>,
}

/// Battle-wide knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioSettings {
    /// Seed for every deterministic stream in the battle.
    pub seed: u64,
    /// Team whose units are scheduled first on equal footing.
    pub starting_team: Team,
    /// Optional defeat-by-clock, in ticks.
    pub turn_limit: Option<Tick>,
    /// When false, every timeline intent renders as fully visible.
    pub fog_of_war: bool,
}

impl Default for ScenarioSettings {
    fn default() -> Self {
        Self {
            seed: 0,
            starting_team: Team::Player,
            turn_limit: None,
            fog_of_war: true,
        }
    }
}

/// Everything an asset loader produces for one battle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioPlan {
    pub name: String,
    pub width: usize,
    pub height: usize,
    pub map_layers: Vec<MapLayer>,
    pub tileset: Tileset,
    pub unit_defs: Vec<UnitDef>,
    #[serde(default)]
    pub objects: Vec<ObjectDef>,
    #[serde(default)]
    pub markers: HashMap<String, Vector2>,
    #[serde(default)]
    pub regions: HashMap<String, Rect>,
    pub placements: Vec<PlacementDef>,
    #[serde(default)]
    pub objectives: ObjectiveSpec,
    #[serde(default)]
    pub settings: ScenarioSettings,
    /// Tile patches applied after layer composition.
    #[serde(default)]
    pub overrides: Vec<(Vector2, Tile)>,
}

/// What `materialize` reports back for the `ScenarioLoaded` event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioSummary {
    pub name: String,
    pub units: usize,
}

/// Resolves a plan into battle-ready state.
pub fn materialize(plan: ScenarioPlan) -> Result<(GameState, ScenarioSummary), ScenarioError> {
    if plan.map_layers.is_empty() {
        return Err(ScenarioError::NoLayers);
    }
    let mut map = TileMap::compose(plan.width, plan.height, &plan.map_layers, &plan.tileset)?;
    for (pos, tile) in &plan.overrides {
        map.apply_override(*pos, *tile)?;
    }

    validate_objectives(&plan)?;

    let mut state = GameState::new(map, plan.settings.seed);
    state.fog_of_war = plan.settings.fog_of_war;
    state.objectives.victory = plan.objectives.victory.clone();
    state.objectives.defeat = plan.objectives.defeat.clone();
    if let Some(limit) = plan.settings.turn_limit {
        state
            .objectives
            .defeat
            .push(crate::managers::objective::ObjectivePredicate::TurnLimit { tick: limit });
    }

    let mut resolver = PlacementResolver::new(&plan);

    // Starting team deploys first: with equal speeds, earlier scheduling
    // means earlier sequence numbers and therefore earlier activations.
    let mut defs: Vec<&UnitDef> = plan.unit_defs.iter().collect();
    defs.sort_by_key(|d| d.team != plan.settings.starting_team);

    for def in defs {
        let position = resolver.resolve_unit(&mut state, def)?;
        let spawn = spawn_from_def(def, position);
        let speed = spawn.speed;
        let unit = state.spawn_unit(spawn);
        state
            .timeline
            .schedule(EntryKind::Unit(unit), Tick::from(speed), None);
    }

    for (index, object) in plan.objects.iter().enumerate() {
        let position = resolver.resolve_object(&mut state, object)?;
        let id = HazardId(index as u32);
        state.hazards.insert(
            id,
            Hazard {
                kind: object.kind,
                position,
                damage: object.damage,
                period: object.period,
            },
        );
        state
            .timeline
            .schedule(EntryKind::Hazard(id), Tick::from(object.period), None);
    }

    let summary = ScenarioSummary {
        name: plan.name.clone(),
        units: plan.unit_defs.len(),
    };
    Ok((state, summary))
}

fn spawn_from_def(def: &UnitDef, position: Vector2) -> UnitSpawn {
    let mut spawn = UnitSpawn::new(def.name.clone(), def.class, def.team, position);
    let o = &def.overrides;
    if let Some(v) = o.hp_max {
        spawn.hp_max = v;
    }
    if let Some(v) = o.strength {
        spawn.strength = v;
    }
    if let Some(v) = o.defense {
        spawn.defense = v;
    }
    if let Some(v) = o.range_min {
        spawn.range_min = v;
    }
    if let Some(v) = o.range_max {
        spawn.range_max = v;
    }
    if let Some(v) = o.crit_chance {
        spawn.crit_chance = v;
    }
    if let Some(v) = o.accuracy {
        spawn.accuracy = v;
    }
    if let Some(v) = o.movement_points {
        spawn.movement_points = v;
    }
    if let Some(v) = o.speed {
        spawn.speed = v;
    }
    spawn.morale = o.morale;
    // Enemy and neutral units default to AI control.
    spawn.personality = o.personality.or(match def.team {
        Team::Player => None,
        Team::Enemy | Team::Neutral => Some(Personality::Balanced),
    });
    spawn
}

/// Resolves placements, tracking per-region counters for spreading.
struct PlacementResolver<'a> {
    plan: &'a ScenarioPlan,
    /// Per region: how many SpreadEvenly targets it will receive in total.
    spread_totals: HashMap<String, usize>,
    /// Per region: how many have been placed so far.
    spread_done: HashMap<String, usize>,
    /// Salt for random placements, bumped per draw.
    draw: u64,
}

impl<'a> PlacementResolver<'a> {
    fn new(plan: &'a ScenarioPlan) -> Self {
        let mut spread_totals: HashMap<String, usize> = HashMap::new();
        for p in &plan.placements {
            if let Placement::AtRegion {
                region,
                policy: RegionPolicy::SpreadEvenly,
            } = &p.placement
            {
                *spread_totals.entry(region.clone()).or_default() += 1;
            }
        }
        Self {
            plan,
            spread_totals,
            spread_done: HashMap::new(),
            draw: 0,
        }
    }

    fn placement_for(&self, target: &str) -> Result<&'a Placement, ScenarioError> {
        self.plan
            .placements
            .iter()
            .find(|p| p.target == target)
            .map(|p| &p.placement)
            .ok_or_else(|| ScenarioError::UnknownUnit {
                name: target.to_string(),
            })
    }

    fn resolve_unit(
        &mut self,
        state: &mut GameState,
        def: &UnitDef,
    ) -> Result<Vector2, ScenarioError> {
        let placement = self.placement_for(&def.name)?.clone();
        self.resolve(state, &def.name, &placement, true)
    }

    fn resolve_object(
        &mut self,
        state: &mut GameState,
        object: &ObjectDef,
    ) -> Result<Vector2, ScenarioError> {
        // Objects may share tiles with units; only passability matters.
        let placement = object.placement.clone();
        self.resolve(state, &object.name, &placement, false)
    }

    fn resolve(
        &mut self,
        state: &mut GameState,
        name: &str,
        placement: &Placement,
        exclusive: bool,
    ) -> Result<Vector2, ScenarioError> {
        match placement {
            Placement::At(pos) => {
                self.check_tile(state, name, *pos, exclusive)?;
                Ok(*pos)
            }
            Placement::AtMarker(marker) => {
                let pos = self
                    .plan
                    .markers
                    .get(marker)
                    .copied()
                    .ok_or_else(|| ScenarioError::UnknownMarker {
                        name: marker.clone(),
                    })?;
                self.check_tile(state, name, pos, exclusive)?;
                Ok(pos)
            }
            Placement::AtRegion { region, policy } => {
                let rect = self
                    .plan
                    .regions
                    .get(region)
                    .copied()
                    .ok_or_else(|| ScenarioError::UnknownRegion {
                        name: region.clone(),
                    })?;
                let free: Vec<Vector2> = rect
                    .tiles()
                    .into_iter()
                    .filter(|&p| {
                        state.map.entry_cost(p).is_some()
                            && (!exclusive || !state.occupancy.is_occupied(p))
                    })
                    .collect();
                if free.is_empty() {
                    return Err(ScenarioError::RegionFull {
                        name: region.clone(),
                    });
                }
                let pos = match policy {
                    RegionPolicy::RandomFreeTile => {
                        let mut rng = setup_stream(state.game_seed, self.draw);
                        self.draw += 1;
                        free[rng.random_range(0..free.len())]
                    }
                    RegionPolicy::SpreadEvenly => {
                        let total = self.spread_totals.get(region).copied().unwrap_or(1).max(1);
                        let done = self.spread_done.entry(region.clone()).or_default();
                        let index = (*done * free.len()) / total;
                        *done += 1;
                        free[index.min(free.len() - 1)]
                    }
                };
                Ok(pos)
            }
        }
    }

    fn check_tile(
        &self,
        state: &GameState,
        name: &str,
        pos: Vector2,
        exclusive: bool,
    ) -> Result<(), ScenarioError> {
        let passable = state.map.entry_cost(pos).is_some();
        let blocked = exclusive && state.occupancy.is_occupied(pos);
        if !passable || blocked {
            return Err(ScenarioError::PlacementBlocked {
                name: name.to_string(),
                x: pos.x,
                y: pos.y,
            });
        }
        Ok(())
    }
}

/// Objectives may only reference units the plan defines.
fn validate_objectives(plan: &ScenarioPlan) -> Result<(), ScenarioError> {
    use crate::managers::objective::ObjectivePredicate as P;
    let known: Vec<&str> = plan.unit_defs.iter().map(|d| d.name.as_str()).collect();
    for predicate in plan
        .objectives
        .victory
        .iter()
        .chain(plan.objectives.defeat.iter())
    {
        let referenced = match predicate {
            P::ReachPosition { unit, .. } | P::DefeatUnit { unit } | P::ProtectUnit { unit } => {
                Some(unit.as_str())
            }
            _ => None,
        };
        if let Some(name) = referenced {
            if !known.contains(&name) {
                return Err(ScenarioError::ObjectiveUnknownUnit {
                    name: name.to_string(),
                });
            }
        }
    }
    Ok(())
}

/// A compact two-sided skirmish used by the demo and the test suite.
pub fn skirmish_plan(seed: u64) -> ScenarioPlan {
    let width = 10;
    let height = 8;
    let ground = MapLayer {
        tile_ids: vec![1; width * height],
    };
    // A loose forest line down the middle.
    let mut features = MapLayer {
        tile_ids: vec![0; width * height],
    };
    for y in [1usize, 3, 4, 6] {
        features.tile_ids[y * width + 5] = 2;
    }

    ScenarioPlan {
        name: "Skirmish at the Ford".to_string(),
        width,
        height,
        map_layers: vec![ground, features],
        tileset: Tileset::standard(),
        unit_defs: vec![
            UnitDef {
                name: "Edda".to_string(),
                class: UnitClass::Knight,
                team: Team::Player,
                overrides: UnitOverrides {
                    morale: Some(100),
                    ..Default::default()
                },
            },
            UnitDef {
                name: "Wren".to_string(),
                class: UnitClass::Archer,
                team: Team::Player,
                overrides: UnitOverrides {
                    morale: Some(100),
                    ..Default::default()
                },
            },
            UnitDef {
                name: "Rask".to_string(),
                class: UnitClass::Brigand,
                team: Team::Enemy,
                overrides: UnitOverrides {
                    morale: Some(90),
                    personality: Some(Personality::Aggressive),
                    ..Default::default()
                },
            },
            UnitDef {
                name: "Morn".to_string(),
                class: UnitClass::Warrior,
                team: Team::Enemy,
                overrides: UnitOverrides {
                    morale: Some(90),
                    personality: Some(Personality::Defensive),
                    ..Default::default()
                },
            },
        ],
        objects: Vec::new(),
        markers: HashMap::from([("ford".to_string(), Vector2::new(5, 2))]),
        regions: HashMap::from([(
            "east_bank".to_string(),
            Rect::new(Vector2::new(7, 1), Vector2::new(9, 6)),
        )]),
        placements: vec![
            PlacementDef {
                target: "Edda".to_string(),
                placement: Placement::At(Vector2::new(1, 3)),
            },
            PlacementDef {
                target: "Wren".to_string(),
                placement: Placement::At(Vector2::new(1, 5)),
            },
            PlacementDef {
                target: "Rask".to_string(),
                placement: Placement::AtRegion {
                    region: "east_bank".to_string(),
                    policy: RegionPolicy::SpreadEvenly,
                },
            },
            PlacementDef {
                target: "Morn".to_string(),
                placement: Placement::AtRegion {
                    region: "east_bank".to_string(),
                    policy: RegionPolicy::SpreadEvenly,
                },
            },
        ],
        objectives: ObjectiveSpec {
            victory: vec![crate::managers::objective::ObjectivePredicate::DefeatAllEnemies],
            defeat: vec![crate::managers::objective::ObjectivePredicate::AllUnitsDefeated],
        },
        settings: ScenarioSettings {
            seed,
            ..Default::default()
        },
        overrides: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::managers::objective::ObjectivePredicate;

    #[test]
    fn test_materialize_skirmish() {
        let (state, summary) = materialize(skirmish_plan(7)).unwrap();
        assert_eq!(summary.units, 4);
        assert_eq!(state.unit_count(), 4);
        assert_eq!(state.alive_units_of(Team::Player).len(), 2);
        assert_eq!(state.alive_units_of(Team::Enemy).len(), 2);
        // Every unit is on the timeline.
        assert_eq!(state.timeline.live_len(), 4);
        // Enemies landed inside the east bank region.
        for enemy in state.alive_units_of(Team::Enemy) {
            let pos = state.position_of(enemy).unwrap();
            assert!(pos.x >= 7, "enemy at {pos} outside region");
        }
    }

    #[test]
    fn test_materialize_is_deterministic() {
        let (a, _) = materialize(skirmish_plan(7)).unwrap();
        let (b, _) = materialize(skirmish_plan(7)).unwrap();
        for id in a.unit_ids() {
            assert_eq!(a.position_of(id), b.position_of(id));
            assert_eq!(a.name_of(id), b.name_of(id));
        }
    }

    #[test]
    fn test_marker_placement_and_unknown_marker() {
        let mut plan = skirmish_plan(1);
        plan.placements[0].placement = Placement::AtMarker("ford".to_string());
        let (state, _) = materialize(plan).unwrap();
        let edda = state.unit_by_name("Edda").unwrap();
        assert_eq!(state.position_of(edda), Some(Vector2::new(5, 2)));

        let mut plan = skirmish_plan(1);
        plan.placements[0].placement = Placement::AtMarker("nowhere".to_string());
        assert!(matches!(
            materialize(plan),
            Err(ScenarioError::UnknownMarker { .. })
        ));
    }

    #[test]
    fn test_blocked_fixed_placement_is_an_error() {
        let mut plan = skirmish_plan(1);
        // Two units on the same tile.
        plan.placements[1].placement = Placement::At(Vector2::new(1, 3));
        assert!(matches!(
            materialize(plan),
            Err(ScenarioError::PlacementBlocked { .. })
        ));
    }

    #[test]
    fn test_missing_placement_is_an_error() {
        let mut plan = skirmish_plan(1);
        plan.placements.remove(0);
        assert!(matches!(
            materialize(plan),
            Err(ScenarioError::UnknownUnit { .. })
        ));
    }

    #[test]
    fn test_objective_referencing_unknown_unit() {
        let mut plan = skirmish_plan(1);
        plan.objectives.victory = vec![ObjectivePredicate::DefeatUnit {
            unit: "Ghost".to_string(),
        }];
        assert!(matches!(
            materialize(plan),
            Err(ScenarioError::ObjectiveUnknownUnit { .. })
        ));
    }

    #[test]
    fn test_turn_limit_setting_becomes_a_defeat_predicate() {
        let mut plan = skirmish_plan(1);
        plan.settings.turn_limit = Some(900);
        let (state, _) = materialize(plan).unwrap();
        assert!(state
            .objectives
            .defeat
            .contains(&ObjectivePredicate::TurnLimit { tick: 900 }));
    }

    #[test]
    fn test_spread_evenly_separates_units() {
        let (state, _) = materialize(skirmish_plan(3)).unwrap();
        let enemies = state.alive_units_of(Team::Enemy);
        let a = state.position_of(enemies[0]).unwrap();
        let b = state.position_of(enemies[1]).unwrap();
        assert_ne!(a, b);
        assert!(a.manhattan(b) >= 3, "spread placements are {a} and {b}");
    }

    #[test]
    fn test_hazard_object_schedules_pulses() {
        let mut plan = skirmish_plan(1);
        plan.objects.push(ObjectDef {
            name: "brazier".to_string(),
            kind: HazardKind::Fire,
            damage: 2,
            period: 90,
            placement: Placement::At(Vector2::new(5, 0)),
        });
        let (state, _) = materialize(plan).unwrap();
        assert_eq!(state.hazards.len(), 1);
        assert_eq!(state.timeline.live_len(), 5);
    }
}
