//! Scheduler manager - keeps the timeline consistent with unit lifecycles.
//!
//! The one rule: a defeated unit must be tombstoned before the next pop.
//! Everything else about scheduling (reinsertion after an action, initial
//! placement) is driven by the activation loop and scenario setup.

use crate::events::{EventBus, EventKind, EventSink, GameEvent};
use crate::state::GameState;

pub fn register(bus: &mut EventBus) {
    // High priority: tombstone before anyone else reacts to the death.
    bus.subscribe(EventKind::UnitDefeated, 90, on_unit_defeated);
}

fn on_unit_defeated(event: &GameEvent, state: &mut GameState, _sink: &mut EventSink) {
    if let GameEvent::UnitDefeated { unit, .. } = event {
        state.timeline.cancel(*unit);
    }
}
