//! Wound manager - bleeding at the start of each activation.
//!
//! Wound creation lives in the combat resolver; this manager only charges
//! bleeding wounds when their carrier's turn opens. A unit can bleed out,
//! which ends the battle for it before it gets to act.

use crate::components::Health;
use crate::events::{EventBus, EventKind, EventSink, GameEvent, VarianceBucket};
use crate::state::GameState;

pub fn register(bus: &mut EventBus) {
    bus.subscribe(EventKind::TurnStarted, 30, on_turn_started);
}

fn on_turn_started(event: &GameEvent, state: &mut GameState, sink: &mut EventSink) {
    let GameEvent::TurnStarted { unit, .. } = event else {
        return;
    };
    let Some(entity) = state.entity(*unit) else {
        return;
    };
    let bleed = state
        .world
        .get::<crate::components::Wounds>(entity)
        .map(|w| w.bleed_per_turn())
        .unwrap_or(0);
    if bleed == 0 || !state.is_alive(*unit) {
        return;
    }

    let resulting_hp = {
        let mut hp = state
            .world
            .get_mut::<Health>(entity)
            .expect("units carry a health component");
        hp.damage(bleed);
        hp.current
    };
    sink.publish(GameEvent::UnitTookDamage {
        unit: *unit,
        amount: bleed,
        variance_bucket: VarianceBucket::Mid,
        resulting_hp,
    });
    if resulting_hp <= 0 {
        state.pending_despawn.push(*unit);
        sink.publish(GameEvent::UnitDefeated {
            unit: *unit,
            killer: None,
            at_tick: state.timeline.now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::*;
    use crate::map::{Terrain, Tile, TileMap};
    use crate::state::{GameState, UnitSpawn};

    fn bleeding_unit(hp: i32) -> (GameState, crate::events::EventBus, UnitId) {
        let tile = Tile::from_terrain(1, &Terrain::open("Plain"));
        let mut state = GameState::new(TileMap::filled(4, 4, tile), 1);
        let mut spawn = UnitSpawn::new("Gash", UnitClass::Warrior, Team::Player, Vector2::new(0, 0));
        spawn.hp_max = hp;
        let unit = state.spawn_unit(spawn);
        let entity = state.entity(unit).unwrap();
        state.world.entity_mut(entity).insert(Wounds {
            list: vec![Wound {
                severity: WoundSeverity::Severe,
                body_part: BodyPart::Torso,
                penalties: StatPenalties::default(),
                bleeding: true,
                permanent: false,
            }],
        });
        let mut bus = crate::events::EventBus::new();
        register(&mut bus);
        (state, bus, unit)
    }

    #[test]
    fn test_bleeding_charges_at_turn_start() {
        let (mut state, mut bus, unit) = bleeding_unit(10);
        bus.publish(GameEvent::TurnStarted { unit, tick: 0 }, &mut state)
            .unwrap();

        let hp = state
            .world
            .get::<Health>(state.entity(unit).unwrap())
            .unwrap();
        assert_eq!(hp.current, 9);
        assert!(bus
            .trace()
            .iter()
            .any(|e| matches!(e, GameEvent::UnitTookDamage { amount: 1, .. })));
    }

    #[test]
    fn test_bleeding_out_is_a_defeat() {
        let (mut state, mut bus, unit) = bleeding_unit(1);
        bus.publish(GameEvent::TurnStarted { unit, tick: 0 }, &mut state)
            .unwrap();

        assert!(!state.is_alive(unit));
        assert_eq!(state.pending_despawn, vec![unit]);
        assert!(bus
            .trace()
            .iter()
            .any(|e| matches!(e, GameEvent::UnitDefeated { killer: None, .. })));
    }
}
