//! Action catalog - validated, weight-bearing operations.
//!
//! Every operation a unit can take is a variant of [`ActionKind`] with a
//! category and base weight. `validate` is pure and returns a value, never
//! panics or throws; `execute` mutates state and narrates onto the sink,
//! and must only run after a successful validation of the same
//! `(actor, action, state)`. Human input and AI planning go through the
//! identical pair - there is no separate AI path.

use crate::battle::{AttackStyle, CombatResolver};
use crate::components::*;
use crate::error::ValidationError;
use crate::events::{EventSink, GameEvent};
use crate::pathfinding::reachable_set;
use crate::state::GameState;
use crate::timeline::{Weight, MAX_WEIGHT};
use serde::{Deserialize, Serialize};

/// Budget used to probe whether a destination is reachable at all, for the
/// insufficient-movement vs. blocked distinction in errors.
const PROBE_BUDGET: u32 = 1 << 20;

/// Tempo class of an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionCategory {
    Quick,
    Normal,
    Heavy,
    Prepared,
}

/// Everything a unit can do with its activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionKind {
    /// Reposition within the reachable set. Does not end the activation.
    Move { dest: Vector2 },
    /// The baseline blow. Exposes the actor to a counter.
    StandardAttack { target: UnitId },
    /// Lighter, faster, and safe from retaliation.
    QuickStrike { target: UnitId },
    /// Slow haymaker.
    PowerAttack { target: UnitId },
    /// Stores a reaction that fires before the owner's next activation.
    PrepareInterrupt { trigger: InterruptTrigger },
    /// End the activation cheaply.
    Wait,
}

impl ActionKind {
    pub fn category(&self) -> ActionCategory {
        match self {
            ActionKind::Move { .. } => ActionCategory::Quick,
            ActionKind::StandardAttack { .. } => ActionCategory::Normal,
            ActionKind::QuickStrike { .. } => ActionCategory::Quick,
            ActionKind::PowerAttack { .. } => ActionCategory::Heavy,
            ActionKind::PrepareInterrupt { .. } => ActionCategory::Prepared,
            ActionKind::Wait => ActionCategory::Quick,
        }
    }

    /// Ticks this action adds before modifiers. Movement is folded into
    /// the activation and carries no weight of its own.
    pub fn base_weight(&self) -> Weight {
        match self {
            ActionKind::Move { .. } => 0,
            ActionKind::StandardAttack { .. } => 100,
            ActionKind::QuickStrike { .. } => 60,
            ActionKind::PowerAttack { .. } => 180,
            ActionKind::PrepareInterrupt { .. } => 130,
            ActionKind::Wait => 50,
        }
    }

    /// Whether choosing this action ends the activation.
    pub fn is_terminating(&self) -> bool {
        !matches!(self, ActionKind::Move { .. })
    }

    pub fn target(&self) -> Option<UnitId> {
        match self {
            ActionKind::StandardAttack { target }
            | ActionKind::QuickStrike { target }
            | ActionKind::PowerAttack { target } => Some(*target),
            _ => None,
        }
    }

    pub fn attack_style(&self) -> Option<AttackStyle> {
        match self {
            ActionKind::StandardAttack { .. } => Some(AttackStyle::Standard),
            ActionKind::QuickStrike { .. } => Some(AttackStyle::Quick),
            ActionKind::PowerAttack { .. } => Some(AttackStyle::Power),
            _ => None,
        }
    }

    /// Menu and log label.
    pub fn label(&self) -> &'static str {
        match self {
            ActionKind::Move { .. } => "Move",
            ActionKind::StandardAttack { .. } => "Attack",
            ActionKind::QuickStrike { .. } => "Quick Strike",
            ActionKind::PowerAttack { .. } => "Power Attack",
            ActionKind::PrepareInterrupt { .. } => "Prepare",
            ActionKind::Wait => "Wait",
        }
    }
}

/// Weight after wound and morale modifiers, clamped into the weight
/// domain. Non-terminating actions stay free.
pub fn effective_weight(state: &GameState, actor: UnitId, action: &ActionKind) -> Weight {
    let base = action.base_weight();
    if base == 0 {
        return 0;
    }
    let mut weight = base as i32;
    if let Some(entity) = state.entity(actor) {
        if let Some(wounds) = state.world.get::<Wounds>(entity) {
            weight += wounds.total_weight_penalty();
        }
        if let Some(morale) = state.world.get::<Morale>(entity) {
            weight += morale.state.weight_penalty();
        }
    }
    weight.clamp(1, MAX_WEIGHT as i32) as Weight
}

/// Proof of validation, carrying the derived costs `execute` needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedAction {
    pub action: ActionKind,
    /// Effective weight the activation will spend if this terminates it.
    pub weight: Weight,
    /// Move only: full path origin..=dest.
    pub path: Vec<Vector2>,
    /// Move only: movement points the path consumes.
    pub move_cost: u32,
}

/// Checks every precondition of `action` for `actor`. Pure.
pub fn validate(
    state: &GameState,
    actor: UnitId,
    action: &ActionKind,
) -> Result<ValidatedAction, ValidationError> {
    let actor_entity = state.entity(actor).ok_or(ValidationError::TargetInvalid)?;

    let mut validated = ValidatedAction {
        action: *action,
        weight: effective_weight(state, actor, action),
        path: Vec::new(),
        move_cost: 0,
    };

    match action {
        ActionKind::Move { dest } => {
            let status = state
                .world
                .get::<Status>(actor_entity)
                .ok_or(ValidationError::TargetInvalid)?;
            if status.has_moved {
                return Err(ValidationError::AlreadyMoved);
            }
            if !state.map.in_bounds(*dest) {
                return Err(ValidationError::OutOfBounds {
                    x: dest.x,
                    y: dest.y,
                });
            }
            if state.map.entry_cost(*dest).is_none() {
                return Err(ValidationError::DestinationImpassable);
            }
            if state.occupancy.is_occupied(*dest) {
                return Err(ValidationError::DestinationOccupied);
            }
            let movement = state
                .world
                .get::<Movement>(actor_entity)
                .ok_or(ValidationError::TargetInvalid)?;
            let set = reachable_set(
                &state.map,
                &state.occupancy,
                movement.position,
                movement.movement_points,
            );
            match set.cost(*dest) {
                Some(cost) => {
                    validated.path = set.path_to(*dest).unwrap_or_default();
                    validated.move_cost = cost;
                }
                None => {
                    // Distinguish "too far" from "walled off".
                    let probe =
                        reachable_set(&state.map, &state.occupancy, movement.position, PROBE_BUDGET);
                    return match probe.cost(*dest) {
                        Some(cost) => Err(ValidationError::InsufficientMovement {
                            cost,
                            budget: movement.movement_points,
                        }),
                        None => Err(ValidationError::Unreachable),
                    };
                }
            }
        }
        ActionKind::StandardAttack { target }
        | ActionKind::QuickStrike { target }
        | ActionKind::PowerAttack { target } => {
            if *target == actor {
                return Err(ValidationError::SelfTarget);
            }
            let target_entity = state.entity(*target).ok_or(ValidationError::TargetInvalid)?;
            let alive = state
                .world
                .get::<Health>(target_entity)
                .map(Health::is_alive)
                .unwrap_or(false);
            if !alive {
                return Err(ValidationError::TargetDead);
            }
            let combat = state
                .world
                .get::<Combat>(actor_entity)
                .ok_or(ValidationError::TargetInvalid)?;
            let distance = crate::battle::distance_between(state, actor, *target)
                .ok_or(ValidationError::TargetInvalid)?;
            if !combat.in_range(distance) {
                return Err(ValidationError::OutOfRange {
                    distance,
                    range_min: combat.range_min,
                    range_max: combat.range_max,
                });
            }
        }
        ActionKind::PrepareInterrupt { .. } => {
            let already = state
                .world
                .get::<Interrupt>(actor_entity)
                .map(|i| i.prepared.is_some())
                .unwrap_or(false);
            if already {
                return Err(ValidationError::InterruptAlreadyPrepared);
            }
        }
        ActionKind::Wait => {}
    }

    Ok(validated)
}

/// What an execution did, for the activation driver and AI scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionReport {
    pub weight_spent: Weight,
    pub damage_done: Option<i32>,
    pub wounds_inflicted: Option<u32>,
}

/// Applies a validated action. Mutates state, narrates onto `sink`.
///
/// `seq` is the acting unit's timeline sequence number, used to salt the
/// combat stream. Callers uphold the validate-before-execute contract; the
/// derived path and costs come from the proof.
pub fn execute(
    state: &mut GameState,
    sink: &mut EventSink,
    actor: UnitId,
    validated: &ValidatedAction,
    seq: u64,
) -> ActionReport {
    let mut report = ActionReport {
        weight_spent: validated.weight,
        damage_done: None,
        wounds_inflicted: None,
    };

    match &validated.action {
        ActionKind::Move { dest } => {
            let entity = state.entity(actor).expect("validated actor exists");
            let from = {
                let mut movement = state
                    .world
                    .get_mut::<Movement>(entity)
                    .expect("units carry a movement component");
                let from = movement.position;
                movement.position = *dest;
                movement.facing = Facing::toward(from, *dest);
                movement.movement_points =
                    movement.movement_points.saturating_sub(validated.move_cost);
                from
            };
            if let Some(mut status) = state.world.get_mut::<Status>(entity) {
                status.has_moved = true;
            }
            state.occupancy.move_unit(actor, *dest);
            sink.publish(GameEvent::UnitMoved {
                unit: actor,
                from,
                to: *dest,
                path: validated.path.clone(),
                cost: validated.move_cost,
            });
            sink.publish(GameEvent::MovementCompleted { unit: actor });
        }
        ActionKind::StandardAttack { target }
        | ActionKind::QuickStrike { target }
        | ActionKind::PowerAttack { target } => {
            let style = validated
                .action
                .attack_style()
                .expect("attack variants have a style");
            let summary =
                CombatResolver::resolve_exchange(state, sink, actor, *target, style, seq);
            report.damage_done = Some(summary.damage_done);
            report.wounds_inflicted = Some(summary.wounds_inflicted);
        }
        ActionKind::PrepareInterrupt { trigger } => {
            let entity = state.entity(actor).expect("validated actor exists");
            let prepared = PreparedAction {
                trigger: *trigger,
                response: InterruptResponse::Strike,
                priority: 0,
                uses_left: 1,
            };
            match state.world.get_mut::<Interrupt>(entity) {
                Some(mut slot) => slot.prepared = Some(prepared),
                None => {
                    state.world.entity_mut(entity).insert(Interrupt {
                        prepared: Some(prepared),
                    });
                }
            }
            sink.publish(GameEvent::InterruptPrepared { unit: actor });
        }
        ActionKind::Wait => {}
    }

    if validated.action.is_terminating() {
        if let Some(entity) = state.entity(actor) {
            if let Some(mut status) = state.world.get_mut::<Status>(entity) {
                status.has_acted = true;
            }
        }
    }

    report
}
