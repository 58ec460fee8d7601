//! Battle phase state machine.
//!
//! Phases form a closed automaton driven purely by bus events; the phase
//! handler is the only code that writes `GameState::battle_phase` (the
//! field is private to the state module and mutated through a crate-only
//! setter). Events that do not match the current phase are ignored.

use crate::actions::ActionKind;
use crate::events::{EventBus, EventKind, EventSink, GameEvent};
use crate::state::GameState;
use serde::{Deserialize, Serialize};

/// Top-level mode of the program.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum GamePhase {
    MainMenu,
    #[default]
    Battle,
    GameOver,
}

/// Where inside an activation the battle currently is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BattlePhase {
    /// Between activations; the scheduler decides who acts next.
    #[default]
    TimelineProcessing,
    /// A player unit surfaced and awaits selection.
    UnitSelection,
    /// The player steers the cursor inside the reachable set.
    UnitMoving,
    /// The post-move action menu is open.
    ActionSelection,
    /// The player picks a target inside the attack range.
    ActionTargeting,
    /// An action is resolving; no input is accepted.
    ActionExecuting,
    /// Free camera inspection; the previous phase is stashed.
    Inspect,
}

/// Registers the phase handler. Runs at the highest priority so every other
/// manager observes the post-transition phase.
pub fn register(bus: &mut EventBus) {
    for kind in [
        EventKind::TurnStarted,
        EventKind::UnitSelected,
        EventKind::MovementCompleted,
        EventKind::ActionSelected,
        EventKind::TargetConfirmed,
        EventKind::SelectionCancelled,
        EventKind::ActionExecuted,
        EventKind::TurnEnded,
        EventKind::ObjectiveCompleted,
        EventKind::ObjectiveFailed,
        EventKind::InspectToggled,
    ] {
        bus.subscribe(kind, 100, phase_handler);
    }
}

/// The transition table. Returns the next phase, or `None` when the event
/// does not transition out of `current`.
fn next_phase(current: BattlePhase, event: &GameEvent, state: &GameState) -> Option<BattlePhase> {
    use BattlePhase::*;
    match (current, event) {
        (TimelineProcessing, GameEvent::TurnStarted { unit, .. }) => {
            if state.is_ai_controlled(*unit) {
                Some(ActionExecuting)
            } else {
                Some(UnitSelection)
            }
        }
        (UnitSelection, GameEvent::UnitSelected { .. }) => Some(UnitMoving),
        (UnitMoving, GameEvent::MovementCompleted { .. }) => Some(ActionSelection),
        (UnitMoving, GameEvent::ActionSelected { action, .. }) => match action {
            ActionKind::Wait => Some(ActionExecuting),
            ActionKind::QuickStrike { .. } => Some(ActionTargeting),
            _ => None,
        },
        (ActionSelection, GameEvent::ActionSelected { action, .. }) => match action {
            ActionKind::Wait | ActionKind::PrepareInterrupt { .. } => Some(ActionExecuting),
            ActionKind::StandardAttack { .. }
            | ActionKind::QuickStrike { .. }
            | ActionKind::PowerAttack { .. } => Some(ActionTargeting),
            ActionKind::Move { .. } => None,
        },
        (ActionSelection, GameEvent::SelectionCancelled { .. }) => Some(UnitMoving),
        (ActionTargeting, GameEvent::TargetConfirmed { .. }) => Some(ActionExecuting),
        (ActionTargeting, GameEvent::SelectionCancelled { .. }) => Some(ActionSelection),
        (ActionExecuting, GameEvent::ActionExecuted { .. }) => Some(TimelineProcessing),
        // A turn can end without an executed action (the actor bled out at
        // turn start); whatever phase the activation reached, its end
        // always lands back between activations.
        (phase, GameEvent::TurnEnded { .. }) if phase != TimelineProcessing => {
            Some(TimelineProcessing)
        }
        _ => None,
    }
}

fn phase_handler(event: &GameEvent, state: &mut GameState, sink: &mut EventSink) {
    if state.game_phase() != GamePhase::Battle {
        return;
    }
    let current = state.battle_phase();

    // Game-over and inspect cut across the per-phase table.
    match event {
        GameEvent::ObjectiveCompleted { .. } | GameEvent::ObjectiveFailed { .. } => {
            state.set_game_phase(GamePhase::GameOver);
            return;
        }
        GameEvent::InspectToggled => {
            let to = if current == BattlePhase::Inspect {
                state.ui.inspect_return.take().unwrap_or_default()
            } else {
                state.ui.inspect_return = Some(current);
                BattlePhase::Inspect
            };
            state.set_battle_phase(to);
            sink.publish(GameEvent::BattlePhaseChanged { from: current, to });
            return;
        }
        _ => {}
    }

    if let Some(to) = next_phase(current, event, state) {
        state.set_battle_phase(to);
        sink.publish(GameEvent::BattlePhaseChanged { from: current, to });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{Team, UnitClass, Vector2};
    use crate::map::{Terrain, Tile, TileMap};
    use crate::state::{GameState, UnitSpawn};

    fn test_state() -> GameState {
        let tile = Tile::from_terrain(1, &Terrain::open("Plain"));
        GameState::new(TileMap::filled(5, 5, tile), 1)
    }

    #[test]
    fn test_turn_started_branches_on_controller() {
        let mut state = test_state();
        let player = state.spawn_unit(UnitSpawn::new(
            "Elise",
            UnitClass::Knight,
            Team::Player,
            Vector2::new(0, 0),
        ));
        let mut enemy_spawn = UnitSpawn::new(
            "Ghoul",
            UnitClass::Brigand,
            Team::Enemy,
            Vector2::new(4, 4),
        );
        enemy_spawn.personality = Some(crate::components::Personality::Aggressive);
        let enemy = state.spawn_unit(enemy_spawn);

        let ev = GameEvent::TurnStarted {
            unit: player,
            tick: 0,
        };
        assert_eq!(
            next_phase(BattlePhase::TimelineProcessing, &ev, &state),
            Some(BattlePhase::UnitSelection)
        );

        let ev = GameEvent::TurnStarted {
            unit: enemy,
            tick: 0,
        };
        assert_eq!(
            next_phase(BattlePhase::TimelineProcessing, &ev, &state),
            Some(BattlePhase::ActionExecuting)
        );
    }

    #[test]
    fn test_cancel_paths() {
        let state = test_state();
        let cancel = GameEvent::SelectionCancelled {
            unit: crate::components::UnitId(1),
        };
        assert_eq!(
            next_phase(BattlePhase::ActionSelection, &cancel, &state),
            Some(BattlePhase::UnitMoving)
        );
        assert_eq!(
            next_phase(BattlePhase::ActionTargeting, &cancel, &state),
            Some(BattlePhase::ActionSelection)
        );
        // Cancel has no meaning mid-execution.
        assert_eq!(
            next_phase(BattlePhase::ActionExecuting, &cancel, &state),
            None
        );
    }

    #[test]
    fn test_quick_strike_from_moving_goes_to_targeting() {
        let state = test_state();
        let ev = GameEvent::ActionSelected {
            unit: crate::components::UnitId(1),
            action: ActionKind::QuickStrike {
                target: crate::components::UnitId(2),
            },
        };
        assert_eq!(
            next_phase(BattlePhase::UnitMoving, &ev, &state),
            Some(BattlePhase::ActionTargeting)
        );
    }

    #[test]
    fn test_inspect_round_trip() {
        let mut state = test_state();
        let mut bus = EventBus::new();
        register(&mut bus);

        state.set_battle_phase(BattlePhase::UnitMoving);
        bus.publish(GameEvent::InspectToggled, &mut state).unwrap();
        assert_eq!(state.battle_phase(), BattlePhase::Inspect);

        bus.publish(GameEvent::InspectToggled, &mut state).unwrap();
        assert_eq!(state.battle_phase(), BattlePhase::UnitMoving);
    }

    #[test]
    fn test_objective_events_end_the_game() {
        let mut state = test_state();
        let mut bus = EventBus::new();
        register(&mut bus);

        bus.publish(
            GameEvent::ObjectiveCompleted {
                description: "rout the enemy".to_string(),
            },
            &mut state,
        )
        .unwrap();
        assert_eq!(state.game_phase(), GamePhase::GameOver);
    }
}
