//! Event bus - typed publish/subscribe mediator between managers.
//!
//! Every manager communicates exclusively through this bus; no manager
//! holds a reference to another. Handlers are plain functions receiving the
//! event, mutable game state, and a sink for follow-up events. For one
//! publish, all direct handlers run to completion before any event they
//! raised is dispatched; nested events then go out in publish order.
//! Runaway event loops are cut off by a recursion cap.

use crate::components::{BodyPart, MoraleState, UnitId, Vector2, WoundSeverity};
use crate::phase::BattlePhase;
use crate::state::GameState;
use crate::timeline::{HazardId, Tick, Weight};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

/// Nested publishes beyond this depth abort the simulation.
pub const RECURSION_LIMIT: u32 = 16;

/// Where a damage roll landed inside its variance band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VarianceBucket {
    Low,
    Mid,
    High,
}

/// Everything that can happen in a battle. Closed set; payloads reference
/// units by [`UnitId`] so traces serialize and replays stay stable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GameEvent {
    TurnStarted {
        unit: UnitId,
        tick: Tick,
    },
    TurnEnded {
        unit: UnitId,
        tick: Tick,
    },
    UnitSelected {
        unit: UnitId,
    },
    UnitMoved {
        unit: UnitId,
        from: Vector2,
        to: Vector2,
        path: Vec<Vector2>,
        cost: u32,
    },
    MovementCompleted {
        unit: UnitId,
    },
    ActionSelected {
        unit: UnitId,
        action: crate::actions::ActionKind,
    },
    TargetConfirmed {
        unit: UnitId,
        target: UnitId,
    },
    SelectionCancelled {
        unit: UnitId,
    },
    ActionExecuted {
        unit: UnitId,
        action: crate::actions::ActionKind,
        weight_spent: Weight,
    },
    UnitAttacked {
        attacker: UnitId,
        defender: UnitId,
        counter: bool,
    },
    UnitTookDamage {
        unit: UnitId,
        amount: i32,
        variance_bucket: VarianceBucket,
        resulting_hp: i32,
    },
    UnitWounded {
        unit: UnitId,
        severity: WoundSeverity,
        body_part: BodyPart,
    },
    UnitDefeated {
        unit: UnitId,
        killer: Option<UnitId>,
        at_tick: Tick,
    },
    BattlePhaseChanged {
        from: BattlePhase,
        to: BattlePhase,
    },
    InspectToggled,
    InterruptPrepared {
        unit: UnitId,
    },
    InterruptTriggered {
        unit: UnitId,
        against: UnitId,
    },
    ObjectiveCompleted {
        description: String,
    },
    ObjectiveFailed {
        description: String,
    },
    ScenarioLoaded {
        name: String,
        units: usize,
    },
    LogMessage {
        text: String,
    },
    HazardTriggered {
        hazard: HazardId,
        position: Vector2,
    },
    MoraleChanged {
        unit: UnitId,
        from: MoraleState,
        to: MoraleState,
        value: i32,
    },
    UnitRallied {
        unit: UnitId,
    },
    UnitRouted {
        unit: UnitId,
    },
}

/// Subscription key: the discriminant of [`GameEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    TurnStarted,
    TurnEnded,
    UnitSelected,
    UnitMoved,
    MovementCompleted,
    ActionSelected,
    TargetConfirmed,
    SelectionCancelled,
    ActionExecuted,
    UnitAttacked,
    UnitTookDamage,
    UnitWounded,
    UnitDefeated,
    BattlePhaseChanged,
    InspectToggled,
    InterruptPrepared,
    InterruptTriggered,
    ObjectiveCompleted,
    ObjectiveFailed,
    ScenarioLoaded,
    LogMessage,
    HazardTriggered,
    MoraleChanged,
    UnitRallied,
    UnitRouted,
}

impl GameEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            GameEvent::TurnStarted { .. } => EventKind::TurnStarted,
            GameEvent::TurnEnded { .. } => EventKind::TurnEnded,
            GameEvent::UnitSelected { .. } => EventKind::UnitSelected,
            GameEvent::UnitMoved { .. } => EventKind::UnitMoved,
            GameEvent::MovementCompleted { .. } => EventKind::MovementCompleted,
            GameEvent::ActionSelected { .. } => EventKind::ActionSelected,
            GameEvent::TargetConfirmed { .. } => EventKind::TargetConfirmed,
            GameEvent::SelectionCancelled { .. } => EventKind::SelectionCancelled,
            GameEvent::ActionExecuted { .. } => EventKind::ActionExecuted,
            GameEvent::UnitAttacked { .. } => EventKind::UnitAttacked,
            GameEvent::UnitTookDamage { .. } => EventKind::UnitTookDamage,
            GameEvent::UnitWounded { .. } => EventKind::UnitWounded,
            GameEvent::UnitDefeated { .. } => EventKind::UnitDefeated,
            GameEvent::BattlePhaseChanged { .. } => EventKind::BattlePhaseChanged,
            GameEvent::InspectToggled => EventKind::InspectToggled,
            GameEvent::InterruptPrepared { .. } => EventKind::InterruptPrepared,
            GameEvent::InterruptTriggered { .. } => EventKind::InterruptTriggered,
            GameEvent::ObjectiveCompleted { .. } => EventKind::ObjectiveCompleted,
            GameEvent::ObjectiveFailed { .. } => EventKind::ObjectiveFailed,
            GameEvent::ScenarioLoaded { .. } => EventKind::ScenarioLoaded,
            GameEvent::LogMessage { .. } => EventKind::LogMessage,
            GameEvent::HazardTriggered { .. } => EventKind::HazardTriggered,
            GameEvent::MoraleChanged { .. } => EventKind::MoraleChanged,
            GameEvent::UnitRallied { .. } => EventKind::UnitRallied,
            GameEvent::UnitRouted { .. } => EventKind::UnitRouted,
        }
    }
}

/// Collector handed to every handler for follow-up events.
///
/// `publish` dispatches after the current event's direct handlers finish;
/// `defer` parks the event on the bus queue until the next [`EventBus::drain`]
/// (end of activation).
#[derive(Debug, Default)]
pub struct EventSink {
    immediate: Vec<GameEvent>,
    deferred: Vec<GameEvent>,
}

impl EventSink {
    pub fn publish(&mut self, event: GameEvent) {
        self.immediate.push(event);
    }

    pub fn defer(&mut self, event: GameEvent) {
        self.deferred.push(event);
    }

    /// Splits the sink into (immediate, deferred) event lists. Used by the
    /// activation driver to publish an action's events in emission order.
    pub(crate) fn take(self) -> (Vec<GameEvent>, Vec<GameEvent>) {
        (self.immediate, self.deferred)
    }
}

/// Handler signature. Free functions only; any state a handler needs lives
/// in [`GameState`], which keeps dispatch order the only ordering that
/// matters.
pub type HandlerFn = fn(&GameEvent, &mut GameState, &mut EventSink);

#[derive(Clone, Copy)]
struct Subscription {
    priority: i32,
    order: u64,
    handler: HandlerFn,
}

use crate::error::FatalError;

/// The mediator. Owns subscriptions, the deferred queue, and the event
/// trace used by determinism checks.
#[derive(Default)]
pub struct EventBus {
    subs: HashMap<EventKind, Vec<Subscription>>,
    next_order: u64,
    deferred: VecDeque<GameEvent>,
    trace: Vec<GameEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler for one event kind. Handlers of the same kind
    /// run in descending priority, ties broken by subscription order.
    pub fn subscribe(&mut self, kind: EventKind, priority: i32, handler: HandlerFn) {
        let sub = Subscription {
            priority,
            order: self.next_order,
            handler,
        };
        self.next_order += 1;
        let list = self.subs.entry(kind).or_default();
        let at = list
            .iter()
            .position(|s| (-s.priority, s.order) > (-sub.priority, sub.order))
            .unwrap_or(list.len());
        list.insert(at, sub);
    }

    /// Publishes immediately: all direct handlers run before this returns,
    /// then any events they raised, in order, up to the recursion cap.
    pub fn publish(&mut self, event: GameEvent, state: &mut GameState) -> Result<(), FatalError> {
        self.dispatch(event, state, 0)
    }

    fn dispatch(
        &mut self,
        event: GameEvent,
        state: &mut GameState,
        depth: u32,
    ) -> Result<(), FatalError> {
        if depth >= RECURSION_LIMIT {
            return Err(FatalError::EventRecursionLimit {
                limit: RECURSION_LIMIT,
            });
        }
        self.trace.push(event.clone());

        let handlers: Vec<HandlerFn> = self
            .subs
            .get(&event.kind())
            .map(|list| list.iter().map(|s| s.handler).collect())
            .unwrap_or_default();

        let mut sink = EventSink::default();
        for handler in handlers {
            handler(&event, state, &mut sink);
        }

        self.deferred.extend(sink.deferred.drain(..));
        for nested in sink.immediate {
            self.dispatch(nested, state, depth + 1)?;
        }
        Ok(())
    }

    /// Parks an event for the next [`Self::drain`].
    pub fn enqueue(&mut self, event: GameEvent) {
        self.deferred.push_back(event);
    }

    /// Dispatches everything parked on the deferred queue, including events
    /// deferred while draining.
    pub fn drain(&mut self, state: &mut GameState) -> Result<(), FatalError> {
        while let Some(event) = self.deferred.pop_front() {
            self.dispatch(event, state, 0)?;
        }
        Ok(())
    }

    /// Every event dispatched so far, in order. The determinism property
    /// compares this trace across runs.
    pub fn trace(&self) -> &[GameEvent] {
        &self.trace
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::{Terrain, Tile, TileMap};
    use crate::state::GameState;

    fn test_state() -> GameState {
        let tile = Tile::from_terrain(1, &Terrain::open("Plain"));
        GameState::new(TileMap::filled(3, 3, tile), 7)
    }

    fn mark_a(_: &GameEvent, state: &mut GameState, _: &mut EventSink) {
        state.log.push("a");
    }

    fn mark_b(_: &GameEvent, state: &mut GameState, _: &mut EventSink) {
        state.log.push("b");
    }

    fn mark_then_nest(_: &GameEvent, state: &mut GameState, sink: &mut EventSink) {
        state.log.push("outer");
        sink.publish(GameEvent::LogMessage {
            text: "nested".to_string(),
        });
    }

    fn mark_nested(event: &GameEvent, state: &mut GameState, _: &mut EventSink) {
        if let GameEvent::LogMessage { text } = event {
            state.log.push(text.clone());
        }
    }

    fn republish_forever(_: &GameEvent, _: &mut GameState, sink: &mut EventSink) {
        sink.publish(GameEvent::InspectToggled);
    }

    #[test]
    fn test_priority_order_then_subscription_order() {
        let mut bus = EventBus::new();
        let mut state = test_state();
        // b subscribes first but at lower priority.
        bus.subscribe(EventKind::InspectToggled, 0, mark_b);
        bus.subscribe(EventKind::InspectToggled, 10, mark_a);

        bus.publish(GameEvent::InspectToggled, &mut state).unwrap();
        assert_eq!(state.log.lines(), vec!["a", "b"]);
    }

    #[test]
    fn test_nested_events_run_after_direct_handlers() {
        let mut bus = EventBus::new();
        let mut state = test_state();
        bus.subscribe(EventKind::InspectToggled, 10, mark_then_nest);
        bus.subscribe(EventKind::InspectToggled, 0, mark_a);
        bus.subscribe(EventKind::LogMessage, 0, mark_nested);

        bus.publish(GameEvent::InspectToggled, &mut state).unwrap();
        // Both direct handlers before the nested event.
        assert_eq!(state.log.lines(), vec!["outer", "a", "nested"]);
    }

    #[test]
    fn test_recursion_limit_is_fatal() {
        let mut bus = EventBus::new();
        let mut state = test_state();
        bus.subscribe(EventKind::InspectToggled, 0, republish_forever);

        let err = bus.publish(GameEvent::InspectToggled, &mut state);
        assert!(matches!(
            err,
            Err(FatalError::EventRecursionLimit { limit: 16 })
        ));
    }

    #[test]
    fn test_enqueue_and_drain() {
        let mut bus = EventBus::new();
        let mut state = test_state();
        bus.subscribe(EventKind::InspectToggled, 0, mark_a);

        bus.enqueue(GameEvent::InspectToggled);
        bus.enqueue(GameEvent::InspectToggled);
        assert!(state.log.lines().is_empty());

        bus.drain(&mut state).unwrap();
        assert_eq!(state.log.lines(), vec!["a", "a"]);
    }

    #[test]
    fn test_trace_records_dispatch_order() {
        let mut bus = EventBus::new();
        let mut state = test_state();
        bus.subscribe(EventKind::InspectToggled, 0, mark_then_nest);

        bus.publish(GameEvent::InspectToggled, &mut state).unwrap();
        assert_eq!(bus.trace().len(), 2);
        assert_eq!(bus.trace()[0].kind(), EventKind::InspectToggled);
        assert_eq!(bus.trace()[1].kind(), EventKind::LogMessage);
    }
}
