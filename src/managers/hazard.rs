//! Hazard manager - environmental damage pulses.
//!
//! Hazards live in `GameState::hazards` and pulse through ordinary
//! timeline entries. When one surfaces, whoever stands on its tile takes
//! flat damage, and the hazard re-arms itself one period later. Spreading
//! is not modeled yet; a hazard stays on its tile.

use crate::components::Health;
use crate::events::{EventBus, EventKind, EventSink, GameEvent, VarianceBucket};
use crate::state::GameState;
use crate::timeline::EntryKind;

pub fn register(bus: &mut EventBus) {
    bus.subscribe(EventKind::HazardTriggered, 15, on_hazard_triggered);
}

fn on_hazard_triggered(event: &GameEvent, state: &mut GameState, sink: &mut EventSink) {
    let GameEvent::HazardTriggered { hazard, position } = event else {
        return;
    };
    let Some(def) = state.hazards.get(hazard).copied() else {
        return;
    };

    if let Some(victim) = state.occupancy.unit_at(*position) {
        if state.is_alive(victim) {
            let entity = state.entity(victim).expect("occupancy tracks live units");
            let resulting_hp = {
                let mut hp = state
                    .world
                    .get_mut::<Health>(entity)
                    .expect("units carry a health component");
                hp.damage(def.damage);
                hp.current
            };
            sink.publish(GameEvent::UnitTookDamage {
                unit: victim,
                amount: def.damage,
                variance_bucket: VarianceBucket::Mid,
                resulting_hp,
            });
            if resulting_hp <= 0 {
                state.pending_despawn.push(victim);
                sink.publish(GameEvent::UnitDefeated {
                    unit: victim,
                    killer: None,
                    at_tick: state.timeline.now(),
                });
            }
        }
    }

    // Re-arm for the next pulse.
    state
        .timeline
        .schedule(EntryKind::Hazard(*hazard), state.timeline.now() + u64::from(def.period), None);
}
