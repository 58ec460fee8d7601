//! Morale manager - swings morale on combat events.
//!
//! Only units carrying the optional `Morale` component react. Taking
//! damage and wounds drain morale in proportion to severity; seeing an
//! ally fall nearby is worse; making a kill restores some. Band changes
//! are narrated, with rout and rally called out separately.

use crate::components::{Health, Morale, MoraleSource, MoraleState, UnitId, WoundSeverity};
use crate::events::{EventBus, EventKind, EventSink, GameEvent};
use crate::state::GameState;

/// Morale lost by allies within this Manhattan radius of a fallen unit.
const ALLY_FALLEN_RADIUS: u32 = 5;
const ALLY_FALLEN_PENALTY: i32 = -15;
/// Morale a killer regains.
const KILL_REWARD: i32 = 10;
/// Recorded swings kept per unit.
const MODIFIER_MEMORY: usize = 20;

pub fn register(bus: &mut EventBus) {
    bus.subscribe(EventKind::UnitTookDamage, 20, on_damage);
    bus.subscribe(EventKind::UnitWounded, 20, on_wounded);
    bus.subscribe(EventKind::UnitDefeated, 20, on_defeated);
}

/// Applies a swing and narrates band changes. No-op for units without the
/// morale component.
fn apply_morale(
    state: &mut GameState,
    sink: &mut EventSink,
    unit: UnitId,
    amount: i32,
    source: MoraleSource,
) {
    let Some(entity) = state.entity(unit) else {
        return;
    };
    let Some(mut morale) = state.world.get_mut::<Morale>(entity) else {
        return;
    };
    let before = morale.adjust(amount, source);
    let after = morale.state;
    let value = morale.value;
    if morale.modifiers.len() > MODIFIER_MEMORY {
        let excess = morale.modifiers.len() - MODIFIER_MEMORY;
        morale.modifiers.drain(..excess);
    }

    if after != before {
        sink.publish(GameEvent::MoraleChanged {
            unit,
            from: before,
            to: after,
            value,
        });
        if after == MoraleState::Routed {
            sink.publish(GameEvent::UnitRouted { unit });
        } else if before <= MoraleState::Panicked && after >= MoraleState::Shaken {
            sink.publish(GameEvent::UnitRallied { unit });
        }
    }
}

fn on_damage(event: &GameEvent, state: &mut GameState, sink: &mut EventSink) {
    let GameEvent::UnitTookDamage { unit, amount, .. } = event else {
        return;
    };
    let Some(hp_max) = state
        .entity(*unit)
        .and_then(|e| state.world.get::<Health>(e))
        .map(|h| h.max)
    else {
        return;
    };
    // Scaled to the blow: a quarter-health hit costs about six morale.
    let delta = -(amount * 25 / hp_max.max(1)).max(1);
    apply_morale(state, sink, *unit, delta, MoraleSource::DamageTaken);
}

fn on_wounded(event: &GameEvent, state: &mut GameState, sink: &mut EventSink) {
    let GameEvent::UnitWounded { unit, severity, .. } = event else {
        return;
    };
    let delta = match severity {
        WoundSeverity::Minor => -5,
        WoundSeverity::Moderate => -8,
        WoundSeverity::Severe => -12,
        WoundSeverity::Critical => -18,
        WoundSeverity::Mortal => -25,
    };
    apply_morale(state, sink, *unit, delta, MoraleSource::Wounded);
}

fn on_defeated(event: &GameEvent, state: &mut GameState, sink: &mut EventSink) {
    let GameEvent::UnitDefeated { unit, killer, .. } = event else {
        return;
    };

    if let Some(killer) = killer {
        apply_morale(state, sink, *killer, KILL_REWARD, MoraleSource::EnemySlain);
    }

    // The fallen unit still occupies its tile until the activation sweep.
    let Some(pos) = state.position_of(*unit) else {
        return;
    };
    let fallen_team = state.team_of(*unit);
    let nearby = state.occupancy.units_within(pos, ALLY_FALLEN_RADIUS);
    for (ally, _) in nearby {
        if state.team_of(ally) == fallen_team && state.is_alive(ally) {
            apply_morale(state, sink, ally, ALLY_FALLEN_PENALTY, MoraleSource::AllyFallen);
        }
    }
}
