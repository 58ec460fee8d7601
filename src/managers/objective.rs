//! Objective manager - victory and defeat predicates.
//!
//! Objectives are two buckets of predicates evaluated on the events that
//! can change their answer, never polled. The first victory predicate to
//! pass ends the battle with `ObjectiveCompleted`; the first defeat
//! predicate with `ObjectiveFailed`. The phase machine reacts by moving to
//! game over.

use crate::components::{Team, UnitId, Vector2};
use crate::events::{EventBus, EventKind, EventSink, GameEvent};
use crate::state::GameState;
use crate::timeline::Tick;
use serde::{Deserialize, Serialize};

/// Ticks a tile must be held for `PositionCaptured`: one Normal action.
pub const CAPTURE_HOLD_TICKS: Tick = 100;

/// The closed predicate set. Units are addressed by scenario name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectivePredicate {
    /// No unit with team Enemy remains alive.
    DefeatAllEnemies,
    /// The clock reached this tick.
    SurviveTurns { target_tick: Tick },
    /// A named unit stands on a specific tile.
    ReachPosition { unit: String, position: Vector2 },
    /// A named unit went down.
    DefeatUnit { unit: String },
    /// A player unit held a tile for a full turn.
    PositionCaptured { position: Vector2 },
    /// No unit with team Player remains alive.
    AllUnitsDefeated,
    /// A named unit went down (defeat bucket: passing means failure).
    ProtectUnit { unit: String },
    /// The clock ran out.
    TurnLimit { tick: Tick },
}

impl ObjectivePredicate {
    /// One-line description for events and the log.
    pub fn describe(&self) -> String {
        match self {
            ObjectivePredicate::DefeatAllEnemies => "defeat all enemies".to_string(),
            ObjectivePredicate::SurviveTurns { target_tick } => {
                format!("survive until tick {target_tick}")
            }
            ObjectivePredicate::ReachPosition { unit, position } => {
                format!("{unit} reaches {position}")
            }
            ObjectivePredicate::DefeatUnit { unit } => format!("defeat {unit}"),
            ObjectivePredicate::PositionCaptured { position } => {
                format!("capture {position}")
            }
            ObjectivePredicate::AllUnitsDefeated => "all player units defeated".to_string(),
            ObjectivePredicate::ProtectUnit { unit } => format!("{unit} has fallen"),
            ObjectivePredicate::TurnLimit { tick } => format!("turn limit {tick} reached"),
        }
    }

    /// Which events can flip this predicate.
    fn reacts_to(&self, kind: EventKind) -> bool {
        match self {
            ObjectivePredicate::DefeatAllEnemies
            | ObjectivePredicate::DefeatUnit { .. }
            | ObjectivePredicate::AllUnitsDefeated
            | ObjectivePredicate::ProtectUnit { .. } => kind == EventKind::UnitDefeated,
            ObjectivePredicate::SurviveTurns { .. } | ObjectivePredicate::TurnLimit { .. } => {
                kind == EventKind::TurnEnded
            }
            ObjectivePredicate::ReachPosition { .. } => kind == EventKind::UnitMoved,
            ObjectivePredicate::PositionCaptured { .. } => {
                kind == EventKind::UnitMoved || kind == EventKind::TurnEnded
            }
        }
    }

    /// Evaluates against current state. Pure.
    fn passes(&self, state: &GameState) -> bool {
        match self {
            ObjectivePredicate::DefeatAllEnemies => state.alive_units_of(Team::Enemy).is_empty(),
            ObjectivePredicate::SurviveTurns { target_tick } => {
                state.timeline.now() >= *target_tick
            }
            ObjectivePredicate::ReachPosition { unit, position } => state
                .unit_by_name(unit)
                .filter(|&id| state.is_alive(id))
                .and_then(|id| state.position_of(id))
                .map(|p| p == *position)
                .unwrap_or(false),
            ObjectivePredicate::DefeatUnit { unit } => state
                .unit_by_name(unit)
                .map(|id| !state.is_alive(id))
                .unwrap_or(true),
            ObjectivePredicate::PositionCaptured { position } => state
                .objectives
                .capture_progress
                .iter()
                .find(|c| c.position == *position)
                .map(|c| {
                    state.is_alive(c.unit) && state.timeline.now() >= c.since + CAPTURE_HOLD_TICKS
                })
                .unwrap_or(false),
            ObjectivePredicate::AllUnitsDefeated => state.alive_units_of(Team::Player).is_empty(),
            ObjectivePredicate::ProtectUnit { unit } => state
                .unit_by_name(unit)
                .map(|id| !state.is_alive(id))
                .unwrap_or(true),
            ObjectivePredicate::TurnLimit { tick } => state.timeline.now() >= *tick,
        }
    }
}

/// How the battle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BattleOutcome {
    Victory,
    Defeat,
}

/// A player unit holding a capture tile since some tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureProgress {
    pub position: Vector2,
    pub unit: UnitId,
    pub since: Tick,
}

/// Objective book-keeping inside `GameState`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObjectiveStatus {
    pub victory: Vec<ObjectivePredicate>,
    pub defeat: Vec<ObjectivePredicate>,
    pub outcome: Option<BattleOutcome>,
    /// Per capture tile: the player unit holding it and since when.
    pub capture_progress: Vec<CaptureProgress>,
}

pub fn register(bus: &mut EventBus) {
    // Below the phase handler, above the log.
    bus.subscribe(EventKind::UnitDefeated, 10, objective_handler);
    bus.subscribe(EventKind::TurnEnded, 10, objective_handler);
    bus.subscribe(EventKind::UnitMoved, 10, objective_handler);
}

fn objective_handler(event: &GameEvent, state: &mut GameState, sink: &mut EventSink) {
    if state.objectives.outcome.is_some() {
        return;
    }

    // Keep capture progress current before evaluating.
    if let GameEvent::UnitMoved { unit, from, to, .. } = event {
        update_capture_progress(state, *unit, *from, *to);
    }

    let kind = event.kind();

    let victory_hit = state
        .objectives
        .victory
        .iter()
        .find(|p| p.reacts_to(kind) && p.passes(state))
        .cloned();
    if let Some(predicate) = victory_hit {
        state.objectives.outcome = Some(BattleOutcome::Victory);
        sink.publish(GameEvent::ObjectiveCompleted {
            description: predicate.describe(),
        });
        return;
    }

    let defeat_hit = state
        .objectives
        .defeat
        .iter()
        .find(|p| p.reacts_to(kind) && p.passes(state))
        .cloned();
    if let Some(predicate) = defeat_hit {
        state.objectives.outcome = Some(BattleOutcome::Defeat);
        sink.publish(GameEvent::ObjectiveFailed {
            description: predicate.describe(),
        });
    }
}

/// Tracks which player unit is standing on each capture tile and since
/// which tick. Leaving the tile resets the clock.
fn update_capture_progress(state: &mut GameState, unit: UnitId, from: Vector2, to: Vector2) {
    let capture_tiles: Vec<Vector2> = state
        .objectives
        .victory
        .iter()
        .filter_map(|p| match p {
            ObjectivePredicate::PositionCaptured { position } => Some(*position),
            _ => None,
        })
        .collect();
    if capture_tiles.is_empty() {
        return;
    }

    let now = state.timeline.now();
    let is_player = state.team_of(unit) == Some(Team::Player);
    for tile in capture_tiles {
        if from == tile {
            state
                .objectives
                .capture_progress
                .retain(|c| c.position != tile);
        }
        if to == tile && is_player {
            state
                .objectives
                .capture_progress
                .retain(|c| c.position != tile);
            state.objectives.capture_progress.push(CaptureProgress {
                position: tile,
                unit,
                since: now,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{UnitClass, Vector2};
    use crate::map::{Terrain, Tile, TileMap};
    use crate::state::{GameState, UnitSpawn};

    fn state_with_sides() -> (GameState, UnitId, UnitId) {
        let tile = Tile::from_terrain(1, &Terrain::open("Plain"));
        let mut state = GameState::new(TileMap::filled(16, 4, tile), 5);
        let runner = state.spawn_unit(UnitSpawn::new(
            "Runner",
            UnitClass::Warrior,
            Team::Player,
            Vector2::new(0, 0),
        ));
        let foe = state.spawn_unit(UnitSpawn::new(
            "Foe",
            UnitClass::Brigand,
            Team::Enemy,
            Vector2::new(3, 3),
        ));
        (state, runner, foe)
    }

    #[test]
    fn test_reach_position_completes_on_move() {
        let (mut state, runner, _) = state_with_sides();
        state.objectives.victory = vec![ObjectivePredicate::ReachPosition {
            unit: "Runner".to_string(),
            position: Vector2::new(14, 0),
        }];

        let mut bus = EventBus::new();
        crate::phase::register(&mut bus);
        register(&mut bus);

        // An unrelated move does nothing.
        let entity = state.entity(runner).unwrap();
        state
            .world
            .get_mut::<crate::components::Movement>(entity)
            .unwrap()
            .position = Vector2::new(5, 0);
        state.occupancy.move_unit(runner, Vector2::new(5, 0));
        bus.publish(
            GameEvent::UnitMoved {
                unit: runner,
                from: Vector2::new(0, 0),
                to: Vector2::new(5, 0),
                path: vec![],
                cost: 5,
            },
            &mut state,
        )
        .unwrap();
        assert!(state.objectives.outcome.is_none());

        // Stepping onto the goal tile ends the battle.
        state
            .world
            .get_mut::<crate::components::Movement>(state.entity(runner).unwrap())
            .unwrap()
            .position = Vector2::new(14, 0);
        state.occupancy.move_unit(runner, Vector2::new(14, 0));
        bus.publish(
            GameEvent::UnitMoved {
                unit: runner,
                from: Vector2::new(5, 0),
                to: Vector2::new(14, 0),
                path: vec![],
                cost: 9,
            },
            &mut state,
        )
        .unwrap();
        assert_eq!(state.objectives.outcome, Some(BattleOutcome::Victory));
        assert_eq!(state.game_phase(), crate::phase::GamePhase::GameOver);
    }

    #[test]
    fn test_defeat_all_enemies() {
        let (mut state, _, foe) = state_with_sides();
        state.objectives.victory = vec![ObjectivePredicate::DefeatAllEnemies];
        let mut bus = EventBus::new();
        register(&mut bus);

        let entity = state.entity(foe).unwrap();
        state
            .world
            .get_mut::<crate::components::Health>(entity)
            .unwrap()
            .current = 0;
        bus.publish(
            GameEvent::UnitDefeated {
                unit: foe,
                killer: None,
                at_tick: 0,
            },
            &mut state,
        )
        .unwrap();
        assert_eq!(state.objectives.outcome, Some(BattleOutcome::Victory));
    }

    #[test]
    fn test_protect_unit_fails_on_its_death() {
        let (mut state, runner, _) = state_with_sides();
        state.objectives.defeat = vec![ObjectivePredicate::ProtectUnit {
            unit: "Runner".to_string(),
        }];
        let mut bus = EventBus::new();
        register(&mut bus);

        let entity = state.entity(runner).unwrap();
        state
            .world
            .get_mut::<crate::components::Health>(entity)
            .unwrap()
            .current = 0;
        bus.publish(
            GameEvent::UnitDefeated {
                unit: runner,
                killer: None,
                at_tick: 0,
            },
            &mut state,
        )
        .unwrap();
        assert_eq!(state.objectives.outcome, Some(BattleOutcome::Defeat));
    }

    #[test]
    fn test_turn_limit_on_turn_ended() {
        let (mut state, runner, _) = state_with_sides();
        state.objectives.defeat = vec![ObjectivePredicate::TurnLimit { tick: 50 }];
        let mut bus = EventBus::new();
        register(&mut bus);

        state.timeline.schedule(
            crate::timeline::EntryKind::Unit(runner),
            60,
            None,
        );
        state.timeline.pop().unwrap();
        bus.publish(
            GameEvent::TurnEnded {
                unit: runner,
                tick: 60,
            },
            &mut state,
        )
        .unwrap();
        assert_eq!(state.objectives.outcome, Some(BattleOutcome::Defeat));
    }

    #[test]
    fn test_position_captured_needs_a_full_hold() {
        let (mut state, runner, _) = state_with_sides();
        let tile = Vector2::new(2, 0);
        state.objectives.victory = vec![ObjectivePredicate::PositionCaptured { position: tile }];
        let mut bus = EventBus::new();
        register(&mut bus);

        // Enter the tile at tick 0.
        bus.publish(
            GameEvent::UnitMoved {
                unit: runner,
                from: Vector2::new(0, 0),
                to: tile,
                path: vec![],
                cost: 2,
            },
            &mut state,
        )
        .unwrap();
        assert!(state.objectives.outcome.is_none());

        // A turn ends before the hold completes: still nothing.
        bus.publish(GameEvent::TurnEnded { unit: runner, tick: 40 }, &mut state)
            .unwrap();
        assert!(state.objectives.outcome.is_none());

        // Advance the clock past the hold and end another turn.
        state
            .timeline
            .schedule(crate::timeline::EntryKind::Unit(runner), 120, None);
        state.timeline.pop().unwrap();
        bus.publish(GameEvent::TurnEnded { unit: runner, tick: 120 }, &mut state)
            .unwrap();
        assert_eq!(state.objectives.outcome, Some(BattleOutcome::Victory));
    }
}
