//! Combat manager - targeting state and the exposed forecast.
//!
//! Owns the candidate list and highlighted target while the battle is in
//! the targeting phase, and keeps `GameState::ui.forecast` current so the
//! renderer and the AI scorer read the same prediction. Execution itself
//! happens in the action module; this manager only stages it.

use crate::actions::ActionKind;
use crate::battle::BattleCalculator;
use crate::components::UnitId;
use crate::events::{EventBus, EventKind, EventSink, GameEvent};
use crate::pathfinding::range_band;
use crate::state::GameState;

pub fn register(bus: &mut EventBus) {
    bus.subscribe(EventKind::ActionSelected, 40, on_action_selected);
    bus.subscribe(EventKind::TargetConfirmed, 40, on_target_confirmed);
    bus.subscribe(EventKind::ActionExecuted, 40, on_action_executed);
}

/// Alive hostile units inside the actor's range band, sorted by
/// (distance, id) so cycling order is deterministic.
pub fn attack_candidates(state: &GameState, actor: UnitId) -> Vec<UnitId> {
    let Some(actor_pos) = state.position_of(actor) else {
        return Vec::new();
    };
    let Some(entity) = state.entity(actor) else {
        return Vec::new();
    };
    let Some(combat) = state.world.get::<crate::components::Combat>(entity) else {
        return Vec::new();
    };
    let mut out: Vec<(u32, UnitId)> = state
        .alive_units()
        .into_iter()
        .filter(|&other| other != actor)
        .filter_map(|other| {
            let pos = state.position_of(other)?;
            let dist = actor_pos.manhattan(pos);
            combat.in_range(dist).then_some((dist, other))
        })
        .collect();
    out.sort();
    out.into_iter().map(|(_, id)| id).collect()
}

/// Rewrites an attack action onto a new target, leaving other variants
/// untouched.
pub fn with_target(action: ActionKind, target: UnitId) -> ActionKind {
    match action {
        ActionKind::StandardAttack { .. } => ActionKind::StandardAttack { target },
        ActionKind::QuickStrike { .. } => ActionKind::QuickStrike { target },
        ActionKind::PowerAttack { .. } => ActionKind::PowerAttack { target },
        other => other,
    }
}

/// Refreshes the forecast for the currently highlighted candidate.
pub fn refresh_forecast(state: &mut GameState, actor: UnitId) {
    let action = state.ui.pending_action;
    let target = state
        .ui
        .targeting
        .candidates
        .get(state.ui.targeting.index)
        .copied();
    state.ui.forecast = match (action, target) {
        (Some(action), Some(target)) => action
            .attack_style()
            .map(|style| BattleCalculator::forecast(state, actor, target, style)),
        _ => None,
    };
}

fn on_action_selected(event: &GameEvent, state: &mut GameState, _sink: &mut EventSink) {
    let GameEvent::ActionSelected { unit, action } = event else {
        return;
    };
    state.ui.pending_action = Some(*action);
    state.ui.targeting.awaiting_friendly_confirm = false;

    if action.attack_style().is_some() {
        let candidates = attack_candidates(state, *unit);
        state.ui.targeting.index = action
            .target()
            .and_then(|t| candidates.iter().position(|&c| c == t))
            .unwrap_or(0);
        state.ui.targeting.candidates = candidates;

        if let Some(pos) = state.position_of(*unit) {
            if let Some(entity) = state.entity(*unit) {
                if let Some(combat) = state.world.get::<crate::components::Combat>(entity) {
                    state.ui.attack_tiles =
                        range_band(&state.map, pos, combat.range_min, combat.range_max);
                }
            }
        }
        if let Some(target) = state.ui.targeting.candidates.first().copied() {
            state.ui.cursor = state.position_of(target).unwrap_or(state.ui.cursor);
        }
        refresh_forecast(state, *unit);
    } else {
        state.ui.targeting = Default::default();
        state.ui.attack_tiles.clear();
        state.ui.forecast = None;
    }
}

fn on_target_confirmed(event: &GameEvent, state: &mut GameState, _sink: &mut EventSink) {
    let GameEvent::TargetConfirmed { unit, target } = event else {
        return;
    };
    if let Some(action) = state.ui.pending_action {
        state.ui.pending_action = Some(with_target(action, *target));
    }
    state.ui.targeting.awaiting_friendly_confirm = false;
    refresh_forecast(state, *unit);
}

fn on_action_executed(event: &GameEvent, state: &mut GameState, _sink: &mut EventSink) {
    let GameEvent::ActionExecuted { .. } = event else {
        return;
    };
    state.ui.pending_action = None;
    state.ui.forecast = None;
    state.ui.targeting = Default::default();
    state.ui.attack_tiles.clear();
    state.ui.menu = None;
}
