//! The root state container.
//!
//! `GameState` exclusively owns everything a battle is: the composed map,
//! the ECS world of unit entities, the occupancy index, the timeline, the
//! objective book-keeping, the rolling log, and the UI-facing scratch
//! state that the renderer pulls. Managers receive a mutable borrow for
//! the duration of one event-handler invocation and never store it.

use crate::components::*;
use crate::managers::objective::ObjectiveStatus;
use crate::map::TileMap;
use crate::phase::{BattlePhase, GamePhase};
use crate::spatial::OccupancyGrid;
use crate::timeline::{HazardId, Timeline, Weight};
use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

// ============================================================================
// LOG RING
// ============================================================================

/// Rolling battle log. Oldest lines fall off the back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRing {
    entries: VecDeque<String>,
    capacity: usize,
}

impl Default for LogRing {
    fn default() -> Self {
        Self::with_capacity(100)
    }
}

impl LogRing {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, line: impl Into<String>) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(line.into());
    }

    pub fn lines(&self) -> Vec<&str> {
        self.entries.iter().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ============================================================================
// UI-FACING SCRATCH STATE
// ============================================================================

/// One entry of the action menu.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuItem {
    pub label: String,
    pub enabled: bool,
    pub shortcut: Option<char>,
}

/// A menu the renderer should draw.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuModel {
    pub title: String,
    pub items: Vec<MenuItem>,
    pub selected: usize,
}

/// Snapshot of the actor taken when its activation opens, for cancel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveSnapshot {
    pub position: Vector2,
    pub facing: Facing,
    pub movement_points: u32,
}

/// Targeting scratch owned by the combat manager.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetingState {
    /// Candidate targets in deterministic order.
    pub candidates: Vec<UnitId>,
    /// Index of the highlighted candidate.
    pub index: usize,
    /// Set after the first confirm on a friendly target; the next confirm
    /// commits.
    pub awaiting_friendly_confirm: bool,
}

/// Everything the renderer needs that is not derivable from components.
/// Managers write here; `build_render_context` reads.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UiState {
    pub cursor: Vector2,
    /// Reachable destinations with their path costs.
    pub reachable: Vec<(Vector2, u32)>,
    /// Tiles inside the pending action's range band.
    pub attack_tiles: Vec<Vector2>,
    /// Tiles threatened by enemies, for the danger-zone overlay.
    pub danger_tiles: Vec<Vector2>,
    pub menu: Option<MenuModel>,
    pub pre_move: Option<MoveSnapshot>,
    /// Whether a move was committed this activation (drives the reversing
    /// move event on cancel).
    pub move_committed: bool,
    pub targeting: TargetingState,
    pub pending_action: Option<crate::actions::ActionKind>,
    pub forecast: Option<crate::battle::Forecast>,
    /// Phase to return to when inspect mode closes.
    pub inspect_return: Option<BattlePhase>,
}

// ============================================================================
// HAZARDS
// ============================================================================

/// Kind of environmental hazard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HazardKind {
    Fire,
    SpikeTrap,
}

/// An environmental hazard that pulses on the timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hazard {
    pub kind: HazardKind,
    pub position: Vector2,
    pub damage: i32,
    /// Ticks between pulses.
    pub period: Weight,
}

// ============================================================================
// UNIT SPAWNING
// ============================================================================

/// Declarative unit description consumed by [`GameState::spawn_unit`].
/// Starts from class defaults; fields are public for overrides.
#[derive(Debug, Clone)]
pub struct UnitSpawn {
    pub name: String,
    pub class: UnitClass,
    pub team: Team,
    pub position: Vector2,
    pub hp_max: i32,
    pub strength: i32,
    pub defense: i32,
    pub range_min: u32,
    pub range_max: u32,
    pub crit_chance: u32,
    pub accuracy: u32,
    pub movement_points: u32,
    pub speed: u32,
    /// Starting morale; `None` spawns without a morale component.
    pub morale: Option<i32>,
    /// AI personality; `None` spawns a human-controlled unit.
    pub personality: Option<Personality>,
}

impl UnitSpawn {
    pub fn new(
        name: impl Into<String>,
        class: UnitClass,
        team: Team,
        position: Vector2,
    ) -> Self {
        let (hp, strength, defense, range_min, range_max, crit, mp, speed) = match class {
            UnitClass::Knight => (24, 8, 6, 1, 1, 5, 4, 20),
            UnitClass::Warrior => (20, 7, 4, 1, 1, 5, 5, 10),
            UnitClass::Archer => (16, 6, 2, 2, 3, 10, 5, 10),
            UnitClass::Mage => (14, 7, 1, 1, 2, 5, 4, 15),
            UnitClass::Healer => (14, 3, 2, 1, 2, 0, 5, 10),
            UnitClass::Brigand => (18, 6, 2, 1, 1, 15, 6, 5),
        };
        Self {
            name: name.into(),
            class,
            team,
            position,
            hp_max: hp,
            strength,
            defense,
            range_min,
            range_max,
            crit_chance: crit,
            accuracy: 85,
            movement_points: mp,
            speed,
            morale: None,
            personality: None,
        }
    }
}

// ============================================================================
// GAME STATE
// ============================================================================

/// The one aggregate all managers operate on.
pub struct GameState {
    /// Entity-component storage for units.
    pub world: World,
    pub map: TileMap,
    pub occupancy: OccupancyGrid,
    pub timeline: Timeline,
    /// Battle seed for every deterministic stream.
    pub game_seed: u64,
    pub objectives: ObjectiveStatus,
    pub log: LogRing,
    pub ui: UiState,
    pub hazards: HashMap<HazardId, Hazard>,
    /// Unit whose activation is currently open.
    pub active_unit: Option<UnitId>,
    /// Defeated units awaiting removal at the end of the activation.
    pub pending_despawn: Vec<UnitId>,
    /// When false, enemy intents on the timeline render fully visible.
    pub fog_of_war: bool,
    phase: GamePhase,
    battle_phase: BattlePhase,
    unit_index: HashMap<UnitId, Entity>,
    next_unit_id: u32,
}

impl GameState {
    pub fn new(map: TileMap, game_seed: u64) -> Self {
        Self {
            world: World::new(),
            map,
            occupancy: OccupancyGrid::new(),
            timeline: Timeline::new(),
            game_seed,
            objectives: ObjectiveStatus::default(),
            log: LogRing::default(),
            ui: UiState::default(),
            hazards: HashMap::new(),
            active_unit: None,
            pending_despawn: Vec::new(),
            fog_of_war: true,
            phase: GamePhase::Battle,
            battle_phase: BattlePhase::TimelineProcessing,
            unit_index: HashMap::new(),
            next_unit_id: 1,
        }
    }

    // ------------------------------------------------------------------
    // Phases
    // ------------------------------------------------------------------

    pub fn game_phase(&self) -> GamePhase {
        self.phase
    }

    pub fn battle_phase(&self) -> BattlePhase {
        self.battle_phase
    }

    pub(crate) fn set_game_phase(&mut self, phase: GamePhase) {
        self.phase = phase;
    }

    pub(crate) fn set_battle_phase(&mut self, phase: BattlePhase) {
        self.battle_phase = phase;
    }

    // ------------------------------------------------------------------
    // Units
    // ------------------------------------------------------------------

    /// Spawns a unit and registers it in the occupancy index. The caller
    /// schedules its first activation.
    pub fn spawn_unit(&mut self, spawn: UnitSpawn) -> UnitId {
        let id = UnitId(self.next_unit_id);
        self.next_unit_id += 1;

        let mut entity = self.world.spawn(UnitBundle {
            id,
            actor: Actor::new(spawn.name, spawn.class),
            team: spawn.team,
            health: Health::new(spawn.hp_max),
            movement: Movement::new(spawn.position, spawn.movement_points, spawn.speed),
            combat: Combat {
                strength: spawn.strength,
                defense: spawn.defense,
                range_min: spawn.range_min,
                range_max: spawn.range_max,
                crit_chance: spawn.crit_chance,
                accuracy: spawn.accuracy,
            },
            status: Status::default(),
        });
        if let Some(value) = spawn.morale {
            entity.insert(Morale::new(value));
        }
        if let Some(personality) = spawn.personality {
            entity.insert(AiProfile::new(personality));
        }
        let entity = entity.id();

        self.unit_index.insert(id, entity);
        self.occupancy.insert(id, spawn.position);
        id
    }

    /// Removes a unit entirely. Timeline tombstoning happens on the defeat
    /// event; this is the corpse sweep.
    pub fn despawn_unit(&mut self, id: UnitId) {
        if let Some(entity) = self.unit_index.remove(&id) {
            self.world.despawn(entity);
        }
        self.occupancy.remove(id);
        self.timeline.cancel(id);
    }

    pub fn entity(&self, id: UnitId) -> Option<Entity> {
        self.unit_index.get(&id).copied()
    }

    pub fn unit_count(&self) -> usize {
        self.unit_index.len()
    }

    /// All known unit ids, sorted for deterministic iteration.
    pub fn unit_ids(&self) -> Vec<UnitId> {
        let mut ids: Vec<UnitId> = self.unit_index.keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn is_alive(&self, id: UnitId) -> bool {
        self.entity(id)
            .and_then(|e| self.world.get::<Health>(e))
            .map(Health::is_alive)
            .unwrap_or(false)
    }

    pub fn is_ai_controlled(&self, id: UnitId) -> bool {
        self.entity(id)
            .map(|e| self.world.get::<AiProfile>(e).is_some())
            .unwrap_or(false)
    }

    pub fn position_of(&self, id: UnitId) -> Option<Vector2> {
        self.entity(id)
            .and_then(|e| self.world.get::<Movement>(e))
            .map(|m| m.position)
    }

    pub fn team_of(&self, id: UnitId) -> Option<Team> {
        self.entity(id).and_then(|e| self.world.get::<Team>(e).copied())
    }

    pub fn name_of(&self, id: UnitId) -> String {
        self.entity(id)
            .and_then(|e| self.world.get::<Actor>(e))
            .map(|a| a.name.clone())
            .unwrap_or_else(|| format!("{id}"))
    }

    /// Alive units, sorted by id.
    pub fn alive_units(&self) -> Vec<UnitId> {
        self.unit_ids()
            .into_iter()
            .filter(|&id| self.is_alive(id))
            .collect()
    }

    /// Alive units on one team, sorted by id.
    pub fn alive_units_of(&self, team: Team) -> Vec<UnitId> {
        self.alive_units()
            .into_iter()
            .filter(|&id| self.team_of(id) == Some(team))
            .collect()
    }

    /// Finds a unit by display name. Scenario objectives address units this
    /// way; names are unique per scenario by authoring convention.
    pub fn unit_by_name(&self, name: &str) -> Option<UnitId> {
        self.unit_ids()
            .into_iter()
            .find(|&id| self.name_of(id) == name)
    }

    // ------------------------------------------------------------------
    // Save/restore plumbing
    // ------------------------------------------------------------------

    pub(crate) fn index_unit(&mut self, id: UnitId, entity: Entity) {
        self.unit_index.insert(id, entity);
    }

    pub(crate) fn next_unit_id(&self) -> u32 {
        self.next_unit_id
    }

    pub(crate) fn set_next_unit_id(&mut self, next: u32) {
        self.next_unit_id = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::{Terrain, Tile, TileMap};

    fn plain_map() -> TileMap {
        TileMap::filled(8, 8, Tile::from_terrain(1, &Terrain::open("Plain")))
    }

    fn knight(pos: Vector2) -> UnitSpawn {
        UnitSpawn::new("Edda", UnitClass::Knight, Team::Player, pos)
    }

    #[test]
    fn test_spawn_registers_everywhere() {
        let mut state = GameState::new(plain_map(), 1);
        let id = state.spawn_unit(knight(Vector2::new(2, 2)));

        assert!(state.is_alive(id));
        assert_eq!(state.position_of(id), Some(Vector2::new(2, 2)));
        assert_eq!(state.occupancy.unit_at(Vector2::new(2, 2)), Some(id));
        assert_eq!(state.team_of(id), Some(Team::Player));
        assert!(!state.is_ai_controlled(id));
    }

    #[test]
    fn test_spawn_with_optional_components() {
        let mut state = GameState::new(plain_map(), 1);
        let mut spawn = knight(Vector2::new(0, 0));
        spawn.morale = Some(80);
        spawn.personality = Some(Personality::Defensive);
        let id = state.spawn_unit(spawn);

        assert!(state.is_ai_controlled(id));
        let entity = state.entity(id).unwrap();
        assert_eq!(state.world.get::<Morale>(entity).unwrap().value, 80);
    }

    #[test]
    fn test_despawn_clears_index_and_occupancy() {
        let mut state = GameState::new(plain_map(), 1);
        let id = state.spawn_unit(knight(Vector2::new(2, 2)));
        state.despawn_unit(id);

        assert!(!state.is_alive(id));
        assert_eq!(state.occupancy.unit_at(Vector2::new(2, 2)), None);
        assert_eq!(state.unit_count(), 0);
    }

    #[test]
    fn test_unit_ids_are_sorted_and_stable() {
        let mut state = GameState::new(plain_map(), 1);
        let a = state.spawn_unit(knight(Vector2::new(0, 0)));
        let b = state.spawn_unit(UnitSpawn::new(
            "Rask",
            UnitClass::Brigand,
            Team::Enemy,
            Vector2::new(1, 0),
        ));
        assert!(a < b);
        assert_eq!(state.unit_ids(), vec![a, b]);
        assert_eq!(state.alive_units_of(Team::Enemy), vec![b]);
        assert_eq!(state.unit_by_name("Rask"), Some(b));
    }

    #[test]
    fn test_log_ring_rolls_over() {
        let mut log = LogRing::with_capacity(3);
        for i in 0..5 {
            log.push(format!("line {i}"));
        }
        assert_eq!(log.lines(), vec!["line 2", "line 3", "line 4"]);
    }
}
