//! Selection manager - cursor, reachable set, and cancel restore.
//!
//! Opens each activation: resets turn-scoped flags, snapshots the actor
//! for cancellation, and keeps the reachable set and the action menu in
//! `GameState::ui` current. Cancelling out of the action menu restores the
//! pre-move position and emits a reversing move event only if a move was
//! actually committed.

use crate::actions::{validate, ActionKind};
use crate::components::{InterruptTrigger, Movement, Status, Team, UnitId, Vector2};
use crate::events::{EventBus, EventKind, EventSink, GameEvent};
use crate::managers::combat::attack_candidates;
use crate::pathfinding::reachable_set;
use crate::phase::BattlePhase;
use crate::state::{GameState, MenuItem, MenuModel, MoveSnapshot};

pub fn register(bus: &mut EventBus) {
    bus.subscribe(EventKind::TurnStarted, 50, on_turn_started);
    bus.subscribe(EventKind::UnitMoved, 50, on_unit_moved);
    bus.subscribe(EventKind::MovementCompleted, 50, on_movement_completed);
    bus.subscribe(EventKind::SelectionCancelled, 50, on_cancelled);
}

/// Recomputes `ui.reachable` from the unit's current position and budget.
fn refresh_reachable(state: &mut GameState, unit: UnitId) {
    let Some(entity) = state.entity(unit) else {
        return;
    };
    let Some(movement) = state.world.get::<Movement>(entity) else {
        return;
    };
    let set = reachable_set(
        &state.map,
        &state.occupancy,
        movement.position,
        movement.movement_points,
    );
    state.ui.reachable = set.destinations();
}

/// Tiles any living enemy could reach and strike this cycle. Coarse
/// Manhattan estimate, display only.
fn refresh_danger_zone(state: &mut GameState) {
    let mut tiles: Vec<Vector2> = Vec::new();
    for enemy in state.alive_units_of(Team::Enemy) {
        let Some(pos) = state.position_of(enemy) else {
            continue;
        };
        let Some(entity) = state.entity(enemy) else {
            continue;
        };
        let reach = state
            .world
            .get::<Movement>(entity)
            .map(|m| m.movement_points)
            .unwrap_or(0);
        let range = state
            .world
            .get::<crate::components::Combat>(entity)
            .map(|c| c.range_max)
            .unwrap_or(0);
        let radius = reach + range;
        for (tile, _) in state.map.iter() {
            if pos.manhattan(tile) <= radius {
                tiles.push(tile);
            }
        }
    }
    tiles.sort_by_key(|p| (p.y, p.x));
    tiles.dedup();
    state.ui.danger_tiles = tiles;
}

/// The post-move action menu. Disabled entries stay visible so the player
/// sees what the position denies them.
fn build_menu(state: &GameState, unit: UnitId) -> MenuModel {
    let has_target = !attack_candidates(state, unit).is_empty();
    let can_prepare = validate(
        state,
        unit,
        &ActionKind::PrepareInterrupt {
            trigger: InterruptTrigger::EnemyEntersRange(1),
        },
    )
    .is_ok();

    MenuModel {
        title: state.name_of(unit),
        items: vec![
            MenuItem {
                label: "Attack".to_string(),
                enabled: has_target,
                shortcut: Some('a'),
            },
            MenuItem {
                label: "Quick Strike".to_string(),
                enabled: has_target,
                shortcut: Some('q'),
            },
            MenuItem {
                label: "Power Attack".to_string(),
                enabled: has_target,
                shortcut: Some('p'),
            },
            MenuItem {
                label: "Prepare".to_string(),
                enabled: can_prepare,
                shortcut: Some('r'),
            },
            MenuItem {
                label: "Wait".to_string(),
                enabled: true,
                shortcut: Some('w'),
            },
        ],
        selected: 0,
    }
}

fn on_turn_started(event: &GameEvent, state: &mut GameState, _sink: &mut EventSink) {
    let GameEvent::TurnStarted { unit, .. } = event else {
        return;
    };
    let now = state.timeline.now();
    let Some(entity) = state.entity(*unit) else {
        return;
    };
    if let Some(mut status) = state.world.get_mut::<Status>(entity) {
        status.begin_turn(now);
    }

    // Fresh activation scratch.
    state.ui.menu = None;
    state.ui.move_committed = false;
    state.ui.pre_move = state.world.get::<Movement>(entity).map(|m| MoveSnapshot {
        position: m.position,
        facing: m.facing,
        movement_points: m.movement_points,
    });
    if let Some(pos) = state.position_of(*unit) {
        state.ui.cursor = pos;
    }
    refresh_reachable(state, *unit);
    refresh_danger_zone(state);
}

fn on_unit_moved(event: &GameEvent, state: &mut GameState, _sink: &mut EventSink) {
    let GameEvent::UnitMoved { unit, cost, .. } = event else {
        return;
    };
    // Zero-cost notifications are cancel reversals, not commitments.
    if state.active_unit != Some(*unit) || *cost == 0 {
        return;
    }
    state.ui.move_committed = true;
    refresh_reachable(state, *unit);
}

fn on_movement_completed(event: &GameEvent, state: &mut GameState, _sink: &mut EventSink) {
    let GameEvent::MovementCompleted { unit } = event else {
        return;
    };
    if state.active_unit != Some(*unit) {
        return;
    }
    state.ui.menu = Some(build_menu(state, *unit));
}

fn on_cancelled(event: &GameEvent, state: &mut GameState, sink: &mut EventSink) {
    let GameEvent::SelectionCancelled { unit } = event else {
        return;
    };
    // The phase handler has already transitioned; the new phase tells us
    // which cancel this was.
    match state.battle_phase() {
        // Backed out of the action menu: undo the move.
        BattlePhase::UnitMoving => {
            let Some(snapshot) = state.ui.pre_move else {
                return;
            };
            let committed = state.ui.move_committed;
            let Some(entity) = state.entity(*unit) else {
                return;
            };
            let from = {
                let Some(mut movement) = state.world.get_mut::<Movement>(entity) else {
                    return;
                };
                let from = movement.position;
                movement.position = snapshot.position;
                movement.facing = snapshot.facing;
                movement.movement_points = snapshot.movement_points;
                from
            };
            if let Some(mut status) = state.world.get_mut::<Status>(entity) {
                status.has_moved = false;
            }
            state.occupancy.move_unit(*unit, snapshot.position);
            state.ui.menu = None;
            state.ui.move_committed = false;
            state.ui.cursor = snapshot.position;
            refresh_reachable(state, *unit);
            // Narrate the reversal only when a move had been committed.
            if committed && from != snapshot.position {
                sink.publish(GameEvent::UnitMoved {
                    unit: *unit,
                    from,
                    to: snapshot.position,
                    path: vec![from, snapshot.position],
                    cost: 0,
                });
            }
        }
        // Backed out of targeting: drop the staged attack, reopen the menu.
        BattlePhase::ActionSelection => {
            state.ui.targeting = Default::default();
            state.ui.forecast = None;
            state.ui.attack_tiles.clear();
            state.ui.pending_action = None;
            state.ui.menu = Some(build_menu(state, *unit));
        }
        _ => {}
    }
}
