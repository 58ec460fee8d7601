//! AI controller - synchronous, personality-weighted decisions.
//!
//! The controller sees the same read-only state a player sees, scores
//! candidates through the public validation path and the battle
//! calculator, and returns one action per call. Non-terminating choices
//! (a move) mean the activation driver will ask again. No hidden
//! information, no private attack math.

use crate::actions::{effective_weight, validate, ActionKind};
use crate::battle::BattleCalculator;
use crate::components::{AiProfile, Personality, Team, UnitId, Vector2};
use crate::pathfinding::reachable_set;
use crate::state::GameState;

/// Scoring weights per personality: damage dealt, kill shots, own safety.
#[derive(Debug, Clone, Copy)]
struct ScoreWeights {
    damage: f32,
    kill: f32,
    safety: f32,
}

impl ScoreWeights {
    fn for_personality(personality: Personality) -> Self {
        match personality {
            Personality::Aggressive => ScoreWeights {
                damage: 1.5,
                kill: 40.0,
                safety: 0.3,
            },
            Personality::Defensive => ScoreWeights {
                damage: 0.8,
                kill: 25.0,
                safety: 1.5,
            },
            Personality::Opportunistic => ScoreWeights {
                damage: 1.0,
                kill: 100.0,
                safety: 0.8,
            },
            Personality::Balanced => ScoreWeights {
                damage: 1.0,
                kill: 40.0,
                safety: 1.0,
            },
        }
    }
}

/// Picks the next action for an AI unit. Always returns something that
/// validates: at worst, a wait.
pub fn decide(state: &GameState, unit: UnitId) -> ActionKind {
    let personality = state
        .entity(unit)
        .and_then(|e| state.world.get::<AiProfile>(e))
        .map(|p| p.personality)
        .unwrap_or_default();
    let weights = ScoreWeights::for_personality(personality);

    if let Some(attack) = best_attack(state, unit, weights) {
        return attack;
    }
    if let Some(advance) = approach_move(state, unit) {
        return advance;
    }
    ActionKind::Wait
}

/// Best-scoring validated attack, if any target is in range.
fn best_attack(state: &GameState, unit: UnitId, weights: ScoreWeights) -> Option<ActionKind> {
    let my_team = state.team_of(unit)?;
    let mut best: Option<(f32, UnitId, ActionKind)> = None;

    for target in state.alive_units() {
        let hostile = state
            .team_of(target)
            .map(|t| my_team.is_hostile_to(t))
            .unwrap_or(false);
        if !hostile {
            continue;
        }
        for action in [
            ActionKind::StandardAttack { target },
            ActionKind::QuickStrike { target },
            ActionKind::PowerAttack { target },
        ] {
            if validate(state, unit, &action).is_err() {
                continue;
            }
            let style = action.attack_style().expect("attack variants have a style");
            let forecast = BattleCalculator::forecast(state, unit, target, style);

            let expected = (forecast.damage_min + forecast.damage_max) as f32 / 2.0;
            let mut score = expected * weights.damage;
            if forecast.will_kill {
                score += weights.kill;
            }
            if let Some(counter) = &forecast.counter_forecast {
                let risk = (counter.damage_min + counter.damage_max) as f32 / 2.0;
                score -= risk * weights.safety;
            }
            // Tempo matters: normalize lightly by weight so a quick strike
            // wins when damage is comparable.
            score -= effective_weight(state, unit, &action) as f32 * 0.02;

            let better = match &best {
                None => true,
                Some((best_score, best_target, _)) => {
                    score > *best_score || (score == *best_score && target < *best_target)
                }
            };
            if better {
                best = Some((score, target, action));
            }
        }
    }

    best.map(|(_, _, action)| action)
}

/// A validated move that closes the distance to the nearest hostile.
/// `None` when already moved, boxed in, or no improvement exists.
fn approach_move(state: &GameState, unit: UnitId) -> Option<ActionKind> {
    let my_pos = state.position_of(unit)?;
    let my_team = state.team_of(unit)?;
    let enemy_goal = nearest_hostile_position(state, unit, my_team)?;

    let entity = state.entity(unit)?;
    let movement = state.world.get::<crate::components::Movement>(entity)?;
    if state
        .world
        .get::<crate::components::Status>(entity)
        .map(|s| s.has_moved)
        .unwrap_or(true)
    {
        return None;
    }

    let set = reachable_set(
        &state.map,
        &state.occupancy,
        my_pos,
        movement.movement_points,
    );
    let mut best: Option<(u32, Vector2)> = None;
    for (dest, _) in set.destinations() {
        let dist = dest.manhattan(enemy_goal);
        let better = match best {
            None => true,
            // destinations() is (y, x)-sorted, so first-wins on ties keeps
            // the choice deterministic.
            Some((best_dist, _)) => dist < best_dist,
        };
        if better {
            best = Some((dist, dest));
        }
    }

    let (best_dist, dest) = best?;
    if best_dist >= my_pos.manhattan(enemy_goal) {
        return None; // no closing move available
    }
    let action = ActionKind::Move { dest };
    validate(state, unit, &action).ok().map(|_| action)
}

fn nearest_hostile_position(state: &GameState, unit: UnitId, my_team: Team) -> Option<Vector2> {
    let my_pos = state.position_of(unit)?;
    state
        .alive_units()
        .into_iter()
        .filter(|&other| {
            other != unit
                && state
                    .team_of(other)
                    .map(|t| my_team.is_hostile_to(t))
                    .unwrap_or(false)
        })
        .filter_map(|other| state.position_of(other).map(|p| (my_pos.manhattan(p), other, p)))
        .min_by_key(|&(dist, id, _)| (dist, id))
        .map(|(_, _, pos)| pos)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{Health, UnitClass};
    use crate::map::{Terrain, Tile, TileMap};
    use crate::state::{GameState, UnitSpawn};

    fn battlefield(personality: Personality) -> (GameState, UnitId, UnitId) {
        let tile = Tile::from_terrain(1, &Terrain::open("Plain"));
        let mut state = GameState::new(TileMap::filled(10, 10, tile), 13);
        let mut ai = UnitSpawn::new("Hound", UnitClass::Brigand, Team::Enemy, Vector2::new(2, 2));
        ai.personality = Some(personality);
        let ai = state.spawn_unit(ai);
        let prey = state.spawn_unit(UnitSpawn::new(
            "Prey",
            UnitClass::Warrior,
            Team::Player,
            Vector2::new(3, 2),
        ));
        (state, ai, prey)
    }

    #[test]
    fn test_attacks_adjacent_enemy() {
        let (state, ai, prey) = battlefield(Personality::Aggressive);
        let action = decide(&state, ai);
        assert_eq!(action.target(), Some(prey));
        assert!(validate(&state, ai, &action).is_ok());
    }

    #[test]
    fn test_opportunist_takes_the_kill_shot() {
        let (mut state, ai, prey) = battlefield(Personality::Opportunistic);
        // Wound the prey into guaranteed-kill range for any attack.
        let e = state.entity(prey).unwrap();
        state.world.get_mut::<Health>(e).unwrap().current = 2;
        let action = decide(&state, ai);
        assert_eq!(action.target(), Some(prey));
        let style = action.attack_style().unwrap();
        let f = BattleCalculator::forecast(&state, ai, prey, style);
        assert!(f.will_kill);
    }

    #[test]
    fn test_moves_toward_distant_enemy() {
        let (mut state, ai, prey) = battlefield(Personality::Balanced);
        // Push the prey far out of reach.
        let e = state.entity(prey).unwrap();
        state
            .world
            .get_mut::<crate::components::Movement>(e)
            .unwrap()
            .position = Vector2::new(9, 9);
        state.occupancy.move_unit(prey, Vector2::new(9, 9));

        let action = decide(&state, ai);
        let ActionKind::Move { dest } = action else {
            panic!("expected a move, got {action:?}");
        };
        let before = Vector2::new(2, 2).manhattan(Vector2::new(9, 9));
        assert!(dest.manhattan(Vector2::new(9, 9)) < before);
    }

    #[test]
    fn test_waits_when_nothing_to_do() {
        let tile = Tile::from_terrain(1, &Terrain::open("Plain"));
        let mut state = GameState::new(TileMap::filled(4, 4, tile), 13);
        let mut ai = UnitSpawn::new("Alone", UnitClass::Brigand, Team::Enemy, Vector2::new(1, 1));
        ai.personality = Some(Personality::Balanced);
        let ai = state.spawn_unit(ai);
        assert_eq!(decide(&state, ai), ActionKind::Wait);
    }

    #[test]
    fn test_decision_is_deterministic() {
        let (state, ai, _) = battlefield(Personality::Balanced);
        assert_eq!(decide(&state, ai), decide(&state, ai));
    }
}
