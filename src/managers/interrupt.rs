//! Interrupt manager - fires prepared reactions.
//!
//! A prepared action sits on its owner's `Interrupt` slot until a matching
//! trigger: a hostile ending a move inside the watched radius, or an
//! attack against the owner. The stored response resolves as a quick
//! strike, spends the single use, and clears the slot.

use crate::battle::{AttackStyle, CombatResolver};
use crate::components::{Combat, Interrupt, InterruptTrigger, UnitId};
use crate::events::{EventBus, EventKind, EventSink, GameEvent};
use crate::state::GameState;

/// Sequence salt for interrupt resolutions, outside the range real
/// timeline entries occupy.
const INTERRUPT_SEQ_SALT: u64 = u64::MAX;

pub fn register(bus: &mut EventBus) {
    bus.subscribe(EventKind::UnitMoved, 15, on_unit_moved);
    bus.subscribe(EventKind::UnitAttacked, 15, on_unit_attacked);
}

/// Owners with a live prepared action, sorted by (priority desc, id) so
/// simultaneous triggers fire deterministically.
fn armed_owners(state: &GameState) -> Vec<(UnitId, crate::components::PreparedAction)> {
    let mut out: Vec<(UnitId, crate::components::PreparedAction)> = state
        .alive_units()
        .into_iter()
        .filter_map(|id| {
            let entity = state.entity(id)?;
            let slot = state.world.get::<Interrupt>(entity)?;
            let prepared = slot.prepared?;
            (prepared.uses_left > 0).then_some((id, prepared))
        })
        .collect();
    out.sort_by_key(|&(id, p)| (-p.priority, id));
    out
}

/// Spends the use and resolves the stored response against `target`.
fn fire(state: &mut GameState, sink: &mut EventSink, owner: UnitId, target: UnitId) {
    if let Some(entity) = state.entity(owner) {
        if let Some(mut slot) = state.world.get_mut::<Interrupt>(entity) {
            match slot.prepared.as_mut() {
                Some(p) if p.uses_left > 0 => {
                    p.uses_left -= 1;
                    if p.uses_left == 0 {
                        slot.prepared = None;
                    }
                }
                _ => return,
            }
        }
    }
    sink.publish(GameEvent::InterruptTriggered {
        unit: owner,
        against: target,
    });

    // The response strike still needs the target inside the owner's band.
    let in_band = crate::battle::distance_between(state, owner, target)
        .zip(state.entity(owner).and_then(|e| state.world.get::<Combat>(e)))
        .map(|(dist, combat)| combat.in_range(dist))
        .unwrap_or(false);
    if in_band && state.is_alive(owner) && state.is_alive(target) {
        CombatResolver::resolve_exchange(
            state,
            sink,
            owner,
            target,
            AttackStyle::Quick,
            INTERRUPT_SEQ_SALT,
        );
    }
}

fn on_unit_moved(event: &GameEvent, state: &mut GameState, sink: &mut EventSink) {
    let GameEvent::UnitMoved { unit: mover, to, .. } = event else {
        return;
    };
    let Some(mover_team) = state.team_of(*mover) else {
        return;
    };
    for (owner, prepared) in armed_owners(state) {
        if owner == *mover {
            continue;
        }
        let InterruptTrigger::EnemyEntersRange(radius) = prepared.trigger else {
            continue;
        };
        let hostile = state
            .team_of(owner)
            .map(|t| t.is_hostile_to(mover_team))
            .unwrap_or(false);
        let in_watch = state
            .position_of(owner)
            .map(|p| p.manhattan(*to) <= radius)
            .unwrap_or(false);
        if hostile && in_watch {
            fire(state, sink, owner, *mover);
        }
    }
}

fn on_unit_attacked(event: &GameEvent, state: &mut GameState, sink: &mut EventSink) {
    let GameEvent::UnitAttacked {
        attacker,
        defender,
        counter,
    } = event
    else {
        return;
    };
    // Counters do not re-trigger reactions.
    if *counter {
        return;
    }
    let armed = armed_owners(state)
        .into_iter()
        .find(|(id, p)| id == defender && p.trigger == InterruptTrigger::SelfAttacked);
    if armed.is_some() && state.is_alive(*defender) {
        fire(state, sink, *defender, *attacker);
    }
}
