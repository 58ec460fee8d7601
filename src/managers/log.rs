//! Log manager - narrates events into the rolling battle log.
//!
//! Subscribed at the lowest priority so its lines reflect the settled
//! outcome of each event. Formatting is plain text; the renderer owns any
//! styling.

use crate::events::{EventBus, EventKind, EventSink, GameEvent};
use crate::state::GameState;

pub fn register(bus: &mut EventBus) {
    for kind in [
        EventKind::TurnStarted,
        EventKind::UnitMoved,
        EventKind::UnitAttacked,
        EventKind::UnitTookDamage,
        EventKind::UnitWounded,
        EventKind::UnitDefeated,
        EventKind::UnitRouted,
        EventKind::UnitRallied,
        EventKind::InterruptPrepared,
        EventKind::InterruptTriggered,
        EventKind::HazardTriggered,
        EventKind::ObjectiveCompleted,
        EventKind::ObjectiveFailed,
        EventKind::LogMessage,
    ] {
        bus.subscribe(kind, -100, log_handler);
    }
}

fn log_handler(event: &GameEvent, state: &mut GameState, _sink: &mut EventSink) {
    let line = match event {
        GameEvent::TurnStarted { unit, tick } => {
            format!("[{tick}] {} acts.", state.name_of(*unit))
        }
        GameEvent::UnitMoved { unit, from, to, .. } => {
            format!("{} moves {from} -> {to}.", state.name_of(*unit))
        }
        GameEvent::UnitAttacked {
            attacker,
            defender,
            counter,
        } => {
            if *counter {
                format!(
                    "{} counters {}!",
                    state.name_of(*attacker),
                    state.name_of(*defender)
                )
            } else {
                format!(
                    "{} attacks {}.",
                    state.name_of(*attacker),
                    state.name_of(*defender)
                )
            }
        }
        GameEvent::UnitTookDamage {
            unit,
            amount,
            resulting_hp,
            ..
        } => format!(
            "{} takes {amount} damage ({} hp left).",
            state.name_of(*unit),
            (*resulting_hp).max(0)
        ),
        GameEvent::UnitWounded {
            unit,
            severity,
            body_part,
        } => format!(
            "{} suffers a {severity:?} wound to the {body_part:?}.",
            state.name_of(*unit)
        ),
        GameEvent::UnitDefeated { unit, killer, .. } => match killer {
            Some(killer) => format!(
                "{} falls to {}.",
                state.name_of(*unit),
                state.name_of(*killer)
            ),
            None => format!("{} falls.", state.name_of(*unit)),
        },
        GameEvent::UnitRouted { unit } => format!("{} routs!", state.name_of(*unit)),
        GameEvent::UnitRallied { unit } => format!("{} rallies.", state.name_of(*unit)),
        GameEvent::InterruptPrepared { unit } => {
            format!("{} readies a reaction.", state.name_of(*unit))
        }
        GameEvent::InterruptTriggered { unit, against } => format!(
            "{} springs a prepared strike at {}!",
            state.name_of(*unit),
            state.name_of(*against)
        ),
        GameEvent::HazardTriggered { position, .. } => {
            format!("The ground erupts at {position}.")
        }
        GameEvent::ObjectiveCompleted { description } => {
            format!("Objective complete: {description}.")
        }
        GameEvent::ObjectiveFailed { description } => {
            format!("Objective failed: {description}.")
        }
        GameEvent::LogMessage { text } => text.clone(),
        _ => return,
    };
    state.log.push(line);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{Team, UnitClass, Vector2};
    use crate::events::VarianceBucket;
    use crate::map::{Terrain, Tile, TileMap};
    use crate::state::{GameState, UnitSpawn};

    #[test]
    fn test_lines_are_written_in_event_order() {
        let tile = Tile::from_terrain(1, &Terrain::open("Plain"));
        let mut state = GameState::new(TileMap::filled(4, 4, tile), 1);
        let a = state.spawn_unit(UnitSpawn::new(
            "Aldric",
            UnitClass::Knight,
            Team::Player,
            Vector2::new(0, 0),
        ));
        let b = state.spawn_unit(UnitSpawn::new(
            "Bram",
            UnitClass::Brigand,
            Team::Enemy,
            Vector2::new(1, 0),
        ));

        let mut bus = EventBus::new();
        register(&mut bus);
        bus.publish(
            GameEvent::UnitAttacked {
                attacker: a,
                defender: b,
                counter: false,
            },
            &mut state,
        )
        .unwrap();
        bus.publish(
            GameEvent::UnitTookDamage {
                unit: b,
                amount: 7,
                variance_bucket: VarianceBucket::Mid,
                resulting_hp: 11,
            },
            &mut state,
        )
        .unwrap();

        let lines = state.log.lines();
        assert_eq!(lines[0], "Aldric attacks Bram.");
        assert_eq!(lines[1], "Bram takes 7 damage (11 hp left).");
    }
}
