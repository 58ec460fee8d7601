//! Save state - full round-trip serialization of a battle.
//!
//! A save captures units with all components, the composed map, the
//! pending timeline, phases, objectives, hazards, the log, and the seed.
//! Restoring produces a simulation that continues identically; the
//! format (JSON through serde) is an implementation detail, the
//! round-trip guarantee is the contract.

use crate::components::*;
use crate::managers::objective::ObjectiveStatus;
use crate::map::TileMap;
use crate::phase::{BattlePhase, GamePhase};
use crate::state::{GameState, Hazard, LogRing, UiState};
use crate::timeline::{HazardId, Tick, Timeline, TimelineEntry};
use serde::{Deserialize, Serialize};

/// One unit with every component it carried.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitSave {
    pub id: UnitId,
    pub actor: Actor,
    pub team: Team,
    pub health: Health,
    pub movement: Movement,
    pub combat: Combat,
    pub status: Status,
    pub morale: Option<Morale>,
    pub wounds: Option<Wounds>,
    pub interrupt: Option<Interrupt>,
    pub ai: Option<AiProfile>,
}

/// A complete battle, serializable and restorable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveState {
    pub game_seed: u64,
    pub now: Tick,
    pub next_seq: u64,
    pub timeline: Vec<TimelineEntry>,
    pub map: TileMap,
    pub units: Vec<UnitSave>,
    pub next_unit_id: u32,
    pub phase: GamePhase,
    pub battle_phase: BattlePhase,
    pub objectives: ObjectiveStatus,
    pub hazards: Vec<(HazardId, Hazard)>,
    pub log: LogRing,
    pub ui: UiState,
    pub active_unit: Option<UnitId>,
    pub pending_despawn: Vec<UnitId>,
    pub fog_of_war: bool,
    /// Timeline sequence of the open activation, if any. Restored by the
    /// battle facade so resumed combat rolls stay on the same stream.
    #[serde(default)]
    pub active_seq: u64,
}

/// Captures the current state. Read-only.
pub fn capture(state: &GameState) -> SaveState {
    let units = state
        .unit_ids()
        .into_iter()
        .filter_map(|id| {
            let entity = state.entity(id)?;
            Some(UnitSave {
                id,
                actor: state.world.get::<Actor>(entity)?.clone(),
                team: *state.world.get::<Team>(entity)?,
                health: *state.world.get::<Health>(entity)?,
                movement: *state.world.get::<Movement>(entity)?,
                combat: *state.world.get::<Combat>(entity)?,
                status: state.world.get::<Status>(entity)?.clone(),
                morale: state.world.get::<Morale>(entity).cloned(),
                wounds: state.world.get::<Wounds>(entity).cloned(),
                interrupt: state.world.get::<Interrupt>(entity).copied(),
                ai: state.world.get::<AiProfile>(entity).copied(),
            })
        })
        .collect();

    let mut hazards: Vec<(HazardId, Hazard)> =
        state.hazards.iter().map(|(&id, &h)| (id, h)).collect();
    hazards.sort_by_key(|&(id, _)| id);

    SaveState {
        game_seed: state.game_seed,
        now: state.timeline.now(),
        next_seq: state.timeline.next_seq(),
        timeline: state.timeline.live_entries(),
        map: state.map.clone(),
        units,
        next_unit_id: state.next_unit_id(),
        phase: state.game_phase(),
        battle_phase: state.battle_phase(),
        objectives: state.objectives.clone(),
        hazards,
        log: state.log.clone(),
        ui: state.ui.clone(),
        active_unit: state.active_unit,
        pending_despawn: state.pending_despawn.clone(),
        fog_of_war: state.fog_of_war,
        active_seq: 0,
    }
}

/// Rebuilds a battle from a save.
pub fn restore(save: SaveState) -> GameState {
    let mut state = GameState::new(save.map, save.game_seed);

    for unit in save.units {
        let position = unit.movement.position;
        let alive = unit.health.is_alive();
        let mut entity = state.world.spawn(UnitBundle {
            id: unit.id,
            actor: unit.actor,
            team: unit.team,
            health: unit.health,
            movement: unit.movement,
            combat: unit.combat,
            status: unit.status,
        });
        if let Some(morale) = unit.morale {
            entity.insert(morale);
        }
        if let Some(wounds) = unit.wounds {
            entity.insert(wounds);
        }
        if let Some(interrupt) = unit.interrupt {
            entity.insert(interrupt);
        }
        if let Some(ai) = unit.ai {
            entity.insert(ai);
        }
        let entity = entity.id();
        state.index_unit(unit.id, entity);
        if alive {
            state.occupancy.insert(unit.id, position);
        }
    }

    state.set_next_unit_id(save.next_unit_id);
    state.timeline = Timeline::restore(save.now, save.next_seq, save.timeline);
    state.set_game_phase(save.phase);
    state.set_battle_phase(save.battle_phase);
    state.objectives = save.objectives;
    state.hazards = save.hazards.into_iter().collect();
    state.log = save.log;
    state.ui = save.ui;
    state.active_unit = save.active_unit;
    state.pending_despawn = save.pending_despawn;
    state.fog_of_war = save.fog_of_war;
    state
}

/// JSON surface used by hosts and the determinism tests.
pub fn to_json(save: &SaveState) -> Result<String, serde_json::Error> {
    serde_json::to_string(save)
}

pub fn from_json(data: &str) -> Result<SaveState, serde_json::Error> {
    serde_json::from_str(data)
}
