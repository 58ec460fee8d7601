//! Public API for the tactical core.
//!
//! [`BattleWorld`] is what a host program drives: build it from a
//! [`ScenarioPlan`], call [`BattleWorld::advance`] to run the timeline
//! until the simulation needs input, feed it abstract [`InputEvent`]s, and
//! pull a render context each frame. Device decoding, frame pacing, and
//! drawing all live on the host side of this seam.
//!
//! ## Control flow
//!
//! One activation: the scheduler pops the earliest entry; a unit entry
//! opens with `TurnStarted` and either waits for player input or runs the
//! AI synchronously; the chosen action validates, executes, and the actor
//! is reinserted at `now + speed + weight`; `TurnEnded` closes the
//! activation, deferred events flush, and corpses sweep. No other
//! activation observes partial state.

use crate::actions::{self, ActionKind, ValidatedAction};
use crate::ai;
use crate::components::{AiProfile, InterruptTrigger, UnitId, Vector2};
use crate::error::{BattleError, FatalError};
use crate::events::{EventBus, EventSink, GameEvent};
use crate::managers::{self, combat::attack_candidates};
use crate::phase::{BattlePhase, GamePhase};
use crate::render::{build_render_context, RenderContext};
use crate::save::{capture, restore, SaveState};
use crate::scenario::ScenarioPlan;
use crate::state::GameState;
use crate::timeline::{EntryKind, Weight};
use serde::{Deserialize, Serialize};

/// Abstract input the core consumes. Device decoders map keys, pads, or
/// scripts onto these; the core never sees raw keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InputEvent {
    MoveCursor(i32, i32),
    Confirm,
    Cancel,
    QuickWait,
    QuickAttack,
    ToggleInspect,
    EndTurn,
    Quit,
}

/// Where control sits after stepping the simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// A player unit's activation is open and waiting on input.
    AwaitingInput,
    /// An objective resolved; the battle is decided.
    BattleOver,
    /// The host asked to quit.
    Quit,
}

/// The battle simulation and its event bus, behind one facade.
pub struct BattleWorld {
    state: GameState,
    bus: EventBus,
    /// Timeline sequence of the open activation; salts combat streams.
    active_seq: u64,
    quit: bool,
}

impl BattleWorld {
    /// Materializes a scenario and wires up every manager.
    pub fn new(plan: ScenarioPlan) -> Result<Self, BattleError> {
        let (mut state, summary) = crate::scenario::materialize(plan)?;
        let mut bus = EventBus::new();
        managers::register_all(&mut bus);
        bus.publish(
            GameEvent::ScenarioLoaded {
                name: summary.name,
                units: summary.units,
            },
            &mut state,
        )?;
        Ok(Self {
            state,
            bus,
            active_seq: 0,
            quit: false,
        })
    }

    /// Read access for hosts and tests.
    pub fn state(&self) -> &GameState {
        &self.state
    }

    /// Every event dispatched so far, in order.
    pub fn event_trace(&self) -> &[GameEvent] {
        self.bus.trace()
    }

    /// Pull-mode frame snapshot.
    pub fn render_context(&mut self) -> RenderContext {
        build_render_context(&mut self.state)
    }

    /// Serializable snapshot of the whole battle.
    pub fn to_save(&self) -> SaveState {
        let mut save = capture(&self.state);
        save.active_seq = self.active_seq;
        save
    }

    /// Rebuilds a battle from a save with a freshly wired bus.
    pub fn from_save(save: SaveState) -> Self {
        let active_seq = save.active_seq;
        let state = restore(save);
        let mut bus = EventBus::new();
        managers::register_all(&mut bus);
        Self {
            state,
            bus,
            active_seq,
            quit: false,
        }
    }

    /// Runs the timeline until input is needed, the battle is decided, or
    /// the host quit.
    pub fn advance(&mut self) -> Result<Flow, FatalError> {
        loop {
            if self.quit {
                return Ok(Flow::Quit);
            }
            if self.state.game_phase() != GamePhase::Battle {
                return Ok(Flow::BattleOver);
            }
            if self.state.battle_phase() != BattlePhase::TimelineProcessing {
                return Ok(Flow::AwaitingInput);
            }
            self.process_next_entry()?;
        }
    }

    /// Pops one timeline entry and runs it to its suspension point.
    fn process_next_entry(&mut self) -> Result<(), FatalError> {
        let entry = self.state.timeline.pop()?;
        match entry.kind {
            EntryKind::Unit(unit) => {
                if !self.state.is_alive(unit) {
                    return Err(FatalError::DeadUnitOnTimeline {
                        unit,
                        tick: self.state.timeline.now(),
                    });
                }
                self.state.active_unit = Some(unit);
                self.active_seq = entry.seq;
                self.bus.publish(
                    GameEvent::TurnStarted {
                        unit,
                        tick: self.state.timeline.now(),
                    },
                    &mut self.state,
                )?;

                if !self.state.is_alive(unit) {
                    // Bled out on its own turn: close without an action.
                    self.close_activation(unit)?;
                } else if self.state.is_ai_controlled(unit) {
                    self.run_ai_activation(unit)?;
                }
                // A player unit now sits in UnitSelection awaiting input.
            }
            EntryKind::Hazard(id) => {
                if let Some(hazard) = self.state.hazards.get(&id).copied() {
                    self.bus.publish(
                        GameEvent::HazardTriggered {
                            hazard: id,
                            position: hazard.position,
                        },
                        &mut self.state,
                    )?;
                }
                self.bus.drain(&mut self.state)?;
                self.sweep_corpses();
            }
            EntryKind::Scheduled(id) => {
                self.bus.publish(
                    GameEvent::LogMessage {
                        text: format!("Scheduled event {} fires.", id.0),
                    },
                    &mut self.state,
                )?;
            }
        }
        Ok(())
    }

    /// Synchronous AI activation: decide, execute, repeat until a
    /// terminating action closes the turn.
    fn run_ai_activation(&mut self, unit: UnitId) -> Result<(), FatalError> {
        // A move plus a terminating action is the most a turn holds; the
        // bound only guards against a non-terminating decision loop.
        for _ in 0..4 {
            if !self.state.is_alive(unit) || self.state.game_phase() != GamePhase::Battle {
                break;
            }
            let decided = ai::decide(&self.state, unit);
            let validated = match actions::validate(&self.state, unit, &decided) {
                Ok(v) => v,
                Err(_) => actions::validate(&self.state, unit, &ActionKind::Wait)
                    .expect("wait always validates"),
            };
            let action = validated.action;
            let report = self.execute_action(unit, &validated)?;

            if action.is_terminating() {
                if let Some(target) = action.target() {
                    self.remember_target(unit, target);
                }
                self.finish_activation(unit, action, report.weight_spent)?;
                return Ok(());
            }
        }
        // Nothing terminating happened (or the unit died mid-turn).
        if self.state.active_unit == Some(unit) {
            self.close_activation(unit)?;
        }
        Ok(())
    }

    fn remember_target(&mut self, unit: UnitId, target: UnitId) {
        if let Some(entity) = self.state.entity(unit) {
            if let Some(mut profile) = self.state.world.get_mut::<AiProfile>(entity) {
                profile.last_target = Some(target);
            }
        }
    }

    /// Executes a validated action and publishes its events in emission
    /// order; deferred events park on the bus queue.
    fn execute_action(
        &mut self,
        unit: UnitId,
        validated: &ValidatedAction,
    ) -> Result<actions::ActionReport, FatalError> {
        let mut sink = EventSink::default();
        let report = actions::execute(&mut self.state, &mut sink, unit, validated, self.active_seq);
        let (immediate, deferred) = sink.take();
        for event in immediate {
            self.bus.publish(event, &mut self.state)?;
        }
        for event in deferred {
            self.bus.enqueue(event);
        }
        Ok(report)
    }

    /// Reinserts the actor, announces the executed action, and closes.
    fn finish_activation(
        &mut self,
        unit: UnitId,
        action: ActionKind,
        weight_spent: Weight,
    ) -> Result<(), FatalError> {
        if self.state.is_alive(unit) {
            let delta = weight_spent + crate::battle::effective_speed(&self.state, unit);
            // AI units declare their last action as the visible intent.
            let intent = self
                .state
                .is_ai_controlled(unit)
                .then_some(action);
            self.state
                .timeline
                .reschedule(EntryKind::Unit(unit), delta, intent);
        }
        self.bus.publish(
            GameEvent::ActionExecuted {
                unit,
                action,
                weight_spent,
            },
            &mut self.state,
        )?;
        self.close_activation(unit)
    }

    /// `TurnEnded`, deferred flush, corpse sweep.
    fn close_activation(&mut self, unit: UnitId) -> Result<(), FatalError> {
        self.bus.publish(
            GameEvent::TurnEnded {
                unit,
                tick: self.state.timeline.now(),
            },
            &mut self.state,
        )?;
        self.bus.drain(&mut self.state)?;
        self.sweep_corpses();
        self.state.active_unit = None;
        Ok(())
    }

    /// Removes defeated units after the activation fully resolves.
    fn sweep_corpses(&mut self) {
        let mut fallen = std::mem::take(&mut self.state.pending_despawn);
        fallen.sort();
        fallen.dedup();
        for unit in fallen {
            self.state.despawn_unit(unit);
        }
    }

    // ------------------------------------------------------------------
    // Input handling
    // ------------------------------------------------------------------

    /// Feeds one abstract input, then advances to the next suspension
    /// point.
    pub fn handle_input(&mut self, input: InputEvent) -> Result<Flow, FatalError> {
        if input == InputEvent::Quit {
            self.quit = true;
            return Ok(Flow::Quit);
        }
        if self.state.game_phase() != GamePhase::Battle {
            return Ok(Flow::BattleOver);
        }

        match self.state.battle_phase() {
            BattlePhase::UnitSelection => self.input_unit_selection(input)?,
            BattlePhase::UnitMoving => self.input_unit_moving(input)?,
            BattlePhase::ActionSelection => self.input_action_selection(input)?,
            BattlePhase::ActionTargeting => self.input_action_targeting(input)?,
            BattlePhase::Inspect => self.input_inspect(input)?,
            BattlePhase::TimelineProcessing | BattlePhase::ActionExecuting => {}
        }

        // A flow event may have landed us in the execution phase; run the
        // staged action for the active player unit.
        if self.state.game_phase() == GamePhase::Battle
            && self.state.battle_phase() == BattlePhase::ActionExecuting
        {
            if let Some(unit) = self.state.active_unit {
                if !self.state.is_ai_controlled(unit) {
                    self.execute_staged_action(unit)?;
                }
            }
        }

        self.advance()
    }

    fn active_unit_or_skip(&self) -> Option<UnitId> {
        self.state.active_unit
    }

    fn input_unit_selection(&mut self, input: InputEvent) -> Result<(), FatalError> {
        let Some(unit) = self.active_unit_or_skip() else {
            return Ok(());
        };
        match input {
            InputEvent::Confirm => {
                self.bus
                    .publish(GameEvent::UnitSelected { unit }, &mut self.state)?;
            }
            InputEvent::MoveCursor(dx, dy) => self.move_cursor_free(dx, dy),
            InputEvent::QuickWait | InputEvent::EndTurn => {
                // Select and immediately stand down.
                self.bus
                    .publish(GameEvent::UnitSelected { unit }, &mut self.state)?;
                self.bus.publish(
                    GameEvent::ActionSelected {
                        unit,
                        action: ActionKind::Wait,
                    },
                    &mut self.state,
                )?;
            }
            InputEvent::ToggleInspect => {
                self.bus.publish(GameEvent::InspectToggled, &mut self.state)?;
            }
            _ => {}
        }
        Ok(())
    }

    fn input_unit_moving(&mut self, input: InputEvent) -> Result<(), FatalError> {
        let Some(unit) = self.active_unit_or_skip() else {
            return Ok(());
        };
        match input {
            InputEvent::MoveCursor(dx, dy) => {
                // Cursor is clamped to the reachable set (plus standing still).
                let next = Vector2::new(self.state.ui.cursor.x + dx, self.state.ui.cursor.y + dy);
                let own = self.state.position_of(unit);
                let reachable = self.state.ui.reachable.iter().any(|&(p, _)| p == next);
                if reachable || own == Some(next) {
                    self.state.ui.cursor = next;
                }
            }
            InputEvent::Confirm => {
                let dest = self.state.ui.cursor;
                if self.state.position_of(unit) == Some(dest) {
                    // Standing still is a completed zero-length move.
                    self.bus
                        .publish(GameEvent::MovementCompleted { unit }, &mut self.state)?;
                } else {
                    let action = ActionKind::Move { dest };
                    match actions::validate(&self.state, unit, &action) {
                        Ok(validated) => {
                            self.execute_action(unit, &validated)?;
                        }
                        Err(reason) => {
                            self.bus.publish(
                                GameEvent::LogMessage {
                                    text: format!("Cannot move there: {reason}."),
                                },
                                &mut self.state,
                            )?;
                        }
                    }
                }
            }
            InputEvent::QuickWait | InputEvent::EndTurn => {
                self.bus.publish(
                    GameEvent::ActionSelected {
                        unit,
                        action: ActionKind::Wait,
                    },
                    &mut self.state,
                )?;
            }
            InputEvent::QuickAttack => self.quick_attack(unit)?,
            InputEvent::ToggleInspect => {
                self.bus.publish(GameEvent::InspectToggled, &mut self.state)?;
            }
            _ => {}
        }
        Ok(())
    }

    fn input_action_selection(&mut self, input: InputEvent) -> Result<(), FatalError> {
        let Some(unit) = self.active_unit_or_skip() else {
            return Ok(());
        };
        match input {
            InputEvent::MoveCursor(_, dy) => {
                if let Some(menu) = self.state.ui.menu.as_mut() {
                    let len = menu.items.len();
                    if len > 0 {
                        menu.selected = if dy >= 0 {
                            (menu.selected + 1) % len
                        } else {
                            (menu.selected + len - 1) % len
                        };
                    }
                }
            }
            InputEvent::Confirm => {
                let Some(menu) = self.state.ui.menu.clone() else {
                    return Ok(());
                };
                let Some(item) = menu.items.get(menu.selected) else {
                    return Ok(());
                };
                if !item.enabled {
                    self.bus.publish(
                        GameEvent::LogMessage {
                            text: format!("{} is not possible here.", item.label),
                        },
                        &mut self.state,
                    )?;
                    return Ok(());
                }
                let action = match item.label.as_str() {
                    "Attack" => self
                        .first_candidate(unit)
                        .map(|target| ActionKind::StandardAttack { target }),
                    "Quick Strike" => self
                        .first_candidate(unit)
                        .map(|target| ActionKind::QuickStrike { target }),
                    "Power Attack" => self
                        .first_candidate(unit)
                        .map(|target| ActionKind::PowerAttack { target }),
                    "Prepare" => Some(ActionKind::PrepareInterrupt {
                        trigger: InterruptTrigger::EnemyEntersRange(1),
                    }),
                    "Wait" => Some(ActionKind::Wait),
                    _ => None,
                };
                if let Some(action) = action {
                    self.bus.publish(
                        GameEvent::ActionSelected { unit, action },
                        &mut self.state,
                    )?;
                }
            }
            InputEvent::QuickAttack => self.quick_attack(unit)?,
            InputEvent::QuickWait | InputEvent::EndTurn => {
                self.bus.publish(
                    GameEvent::ActionSelected {
                        unit,
                        action: ActionKind::Wait,
                    },
                    &mut self.state,
                )?;
            }
            InputEvent::Cancel => {
                self.bus
                    .publish(GameEvent::SelectionCancelled { unit }, &mut self.state)?;
            }
            InputEvent::ToggleInspect => {
                self.bus.publish(GameEvent::InspectToggled, &mut self.state)?;
            }
            _ => {}
        }
        Ok(())
    }

    fn input_action_targeting(&mut self, input: InputEvent) -> Result<(), FatalError> {
        let Some(unit) = self.active_unit_or_skip() else {
            return Ok(());
        };
        match input {
            InputEvent::MoveCursor(dx, dy) => {
                let len = self.state.ui.targeting.candidates.len();
                if len > 0 {
                    let index = self.state.ui.targeting.index;
                    let forward = dx + dy >= 0;
                    self.state.ui.targeting.index = if forward {
                        (index + 1) % len
                    } else {
                        (index + len - 1) % len
                    };
                    self.state.ui.targeting.awaiting_friendly_confirm = false;
                    if let Some(&target) = self
                        .state
                        .ui
                        .targeting
                        .candidates
                        .get(self.state.ui.targeting.index)
                    {
                        if let Some(pos) = self.state.position_of(target) {
                            self.state.ui.cursor = pos;
                        }
                    }
                    managers::combat::refresh_forecast(&mut self.state, unit);
                }
            }
            InputEvent::Confirm => {
                let Some(&target) = self
                    .state
                    .ui
                    .targeting
                    .candidates
                    .get(self.state.ui.targeting.index)
                else {
                    return Ok(());
                };
                // Friendly fire asks twice.
                let hostile = match (self.state.team_of(unit), self.state.team_of(target)) {
                    (Some(a), Some(b)) => a.is_hostile_to(b),
                    _ => false,
                };
                if !hostile && !self.state.ui.targeting.awaiting_friendly_confirm {
                    self.state.ui.targeting.awaiting_friendly_confirm = true;
                    self.bus.publish(
                        GameEvent::LogMessage {
                            text: format!(
                                "{} is not an enemy. Confirm again to strike.",
                                self.state.name_of(target)
                            ),
                        },
                        &mut self.state,
                    )?;
                    return Ok(());
                }
                self.bus
                    .publish(GameEvent::TargetConfirmed { unit, target }, &mut self.state)?;
            }
            InputEvent::Cancel => {
                self.bus
                    .publish(GameEvent::SelectionCancelled { unit }, &mut self.state)?;
            }
            InputEvent::ToggleInspect => {
                self.bus.publish(GameEvent::InspectToggled, &mut self.state)?;
            }
            _ => {}
        }
        Ok(())
    }

    fn input_inspect(&mut self, input: InputEvent) -> Result<(), FatalError> {
        match input {
            InputEvent::MoveCursor(dx, dy) => self.move_cursor_free(dx, dy),
            InputEvent::ToggleInspect | InputEvent::Cancel => {
                self.bus.publish(GameEvent::InspectToggled, &mut self.state)?;
            }
            _ => {}
        }
        Ok(())
    }

    fn move_cursor_free(&mut self, dx: i32, dy: i32) {
        let next = Vector2::new(self.state.ui.cursor.x + dx, self.state.ui.cursor.y + dy);
        if self.state.map.in_bounds(next) {
            self.state.ui.cursor = next;
        }
    }

    /// Shortcut into a quick strike on the nearest candidate.
    fn quick_attack(&mut self, unit: UnitId) -> Result<(), FatalError> {
        match self.first_candidate(unit) {
            Some(target) => self.bus.publish(
                GameEvent::ActionSelected {
                    unit,
                    action: ActionKind::QuickStrike { target },
                },
                &mut self.state,
            ),
            None => self.bus.publish(
                GameEvent::LogMessage {
                    text: "No target in range.".to_string(),
                },
                &mut self.state,
            ),
        }
    }

    fn first_candidate(&self, unit: UnitId) -> Option<UnitId> {
        attack_candidates(&self.state, unit).into_iter().next()
    }

    /// Runs the action staged by the selection flow. The action was
    /// validated when staged; it is validated again here so execution
    /// never runs on stale preconditions.
    fn execute_staged_action(&mut self, unit: UnitId) -> Result<(), FatalError> {
        let staged = self.state.ui.pending_action.unwrap_or(ActionKind::Wait);
        let validated = match actions::validate(&self.state, unit, &staged) {
            Ok(v) => v,
            Err(reason) => {
                // A prepared target can vanish between staging and commit
                // (an interrupt killed it). Degrade to a wait.
                self.bus.publish(
                    GameEvent::LogMessage {
                        text: format!("{} falters: {reason}.", self.state.name_of(unit)),
                    },
                    &mut self.state,
                )?;
                actions::validate(&self.state, unit, &ActionKind::Wait)
                    .expect("wait always validates")
            }
        };
        let action = validated.action;
        let report = self.execute_action(unit, &validated)?;
        self.finish_activation(unit, action, report.weight_spent)
    }
}
