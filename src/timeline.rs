//! Timeline scheduler - the discrete-tick time axis of the battle.
//!
//! A min-priority queue of [`TimelineEntry`] ordered strictly by
//! `(ready_tick, seq)`. Unit activations, hazard pulses, and scheduled
//! events share the one queue; nothing is special-cased by kind, so runs
//! are deterministic by construction.
//!
//! Cancellation is lazy: a cancelled entry stays in the heap and is
//! discarded when it surfaces. Liveness is tracked out-of-band, one live
//! sequence number per unit (a unit never has two pending activations) and
//! one per hazard or scheduled event.

use crate::actions::ActionKind;
use crate::components::UnitId;
use crate::error::FatalError;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

/// Simulation time. Advances only when the timeline pops.
pub type Tick = u64;

/// Ticks an action adds to its actor's next ready-time.
pub type Weight = u32;

/// Upper bound of the weight domain.
pub const MAX_WEIGHT: Weight = 1000;

/// Identity of an environmental hazard on the timeline.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct HazardId(pub u32);

/// Identity of a scheduled one-shot event on the timeline.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct ScheduledId(pub u32);

/// What an entry activates when it surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryKind {
    Unit(UnitId),
    Hazard(HazardId),
    Scheduled(ScheduledId),
}

/// One scheduled activation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub ready_tick: Tick,
    /// Session-unique, monotonically increasing. Breaks every tie.
    pub seq: u64,
    pub kind: EntryKind,
    /// Declared intent, shown in the timeline preview for AI units.
    pub scheduled_action: Option<ActionKind>,
}

impl PartialOrd for TimelineEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimelineEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.ready_tick, self.seq).cmp(&(other.ready_tick, other.seq))
    }
}

/// The battle's priority queue over ticks.
#[derive(Debug, Default)]
pub struct Timeline {
    heap: BinaryHeap<Reverse<TimelineEntry>>,
    now: Tick,
    next_seq: u64,
    /// Live entry per unit; entries whose seq is absent here are tombstones.
    live_units: HashMap<UnitId, u64>,
    /// Live entry per hazard / scheduled event.
    live_other: HashMap<EntryKind, u64>,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current simulation tick.
    pub fn now(&self) -> Tick {
        self.now
    }

    /// Next sequence number to be assigned. Save-file surface.
    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }

    /// Number of live entries still pending.
    pub fn live_len(&self) -> usize {
        self.live_units.len() + self.live_other.len()
    }

    fn is_live(&self, entry: &TimelineEntry) -> bool {
        match entry.kind {
            EntryKind::Unit(unit) => self.live_units.get(&unit) == Some(&entry.seq),
            kind => self.live_other.get(&kind) == Some(&entry.seq),
        }
    }

    /// Schedules an activation and returns its sequence number.
    ///
    /// A unit's previous live entry (if any) is tombstoned first, so at most
    /// one activation per unit is ever pending. Same rule per hazard id and
    /// scheduled-event id.
    pub fn schedule(
        &mut self,
        kind: EntryKind,
        ready_tick: Tick,
        scheduled_action: Option<ActionKind>,
    ) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        match kind {
            EntryKind::Unit(unit) => {
                self.live_units.insert(unit, seq);
            }
            other => {
                self.live_other.insert(other, seq);
            }
        }
        self.heap.push(Reverse(TimelineEntry {
            ready_tick,
            seq,
            kind,
            scheduled_action,
        }));
        seq
    }

    /// Tombstones every live entry referencing `unit`.
    pub fn cancel(&mut self, unit: UnitId) {
        self.live_units.remove(&unit);
    }

    /// Tombstones a hazard or scheduled-event entry.
    pub fn cancel_entry(&mut self, kind: EntryKind) {
        match kind {
            EntryKind::Unit(unit) => self.cancel(unit),
            other => {
                self.live_other.remove(&other);
            }
        }
    }

    /// Cancel-existing + schedule at `now + delta`.
    pub fn reschedule(
        &mut self,
        kind: EntryKind,
        delta: Weight,
        scheduled_action: Option<ActionKind>,
    ) -> u64 {
        self.cancel_entry(kind);
        self.schedule(kind, self.now + Tick::from(delta), scheduled_action)
    }

    /// The next live entry without consuming it. Tombstoned heads are
    /// discarded on the way.
    pub fn peek(&mut self) -> Option<&TimelineEntry> {
        while let Some(Reverse(head)) = self.heap.peek() {
            if self.is_live(head) {
                break;
            }
            self.heap.pop();
        }
        self.heap.peek().map(|Reverse(e)| e)
    }

    /// Removes and returns the earliest live entry, advancing `now`.
    ///
    /// Erring here means the battle is still running with nothing left to
    /// activate, which is a scheduling bug somewhere upstream.
    pub fn pop(&mut self) -> Result<TimelineEntry, FatalError> {
        while let Some(Reverse(entry)) = self.heap.pop() {
            if !self.is_live(&entry) {
                continue;
            }
            match entry.kind {
                EntryKind::Unit(unit) => {
                    self.live_units.remove(&unit);
                }
                kind => {
                    self.live_other.remove(&kind);
                }
            }
            self.now = self.now.max(entry.ready_tick);
            return Ok(entry);
        }
        Err(FatalError::EmptyTimeline { now: self.now })
    }

    /// The next `k` live entries in activation order, without mutation.
    /// Bounded scan over a heap clone; used for the upcoming-turns display.
    pub fn preview(&self, k: usize) -> Vec<TimelineEntry> {
        let mut scratch = self.heap.clone();
        let mut out = Vec::with_capacity(k);
        while out.len() < k {
            match scratch.pop() {
                Some(Reverse(entry)) if self.is_live(&entry) => out.push(entry),
                Some(_) => {}
                None => break,
            }
        }
        out
    }

    /// Whether `unit` currently has a live entry pending.
    pub fn has_live_entry(&self, unit: UnitId) -> bool {
        self.live_units.contains_key(&unit)
    }

    /// All live entries in activation order. Save-file surface.
    pub fn live_entries(&self) -> Vec<TimelineEntry> {
        self.preview(self.heap.len())
    }

    /// Rebuilds a timeline from saved state.
    pub fn restore(now: Tick, next_seq: u64, entries: Vec<TimelineEntry>) -> Self {
        let mut tl = Self {
            now,
            next_seq,
            ..Self::default()
        };
        for entry in entries {
            match entry.kind {
                EntryKind::Unit(unit) => {
                    tl.live_units.insert(unit, entry.seq);
                }
                kind => {
                    tl.live_other.insert(kind, entry.seq);
                }
            }
            tl.heap.push(Reverse(entry));
        }
        tl
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pop_orders_by_tick_then_seq() {
        let mut tl = Timeline::new();
        tl.schedule(EntryKind::Unit(UnitId(1)), 100, None);
        tl.schedule(EntryKind::Unit(UnitId(2)), 50, None);
        tl.schedule(EntryKind::Hazard(HazardId(1)), 50, None);

        // Tick 50 entries first, and among those the earlier seq (unit 2).
        let a = tl.pop().unwrap();
        assert_eq!(a.kind, EntryKind::Unit(UnitId(2)));
        let b = tl.pop().unwrap();
        assert_eq!(b.kind, EntryKind::Hazard(HazardId(1)));
        assert_eq!(tl.now(), 50);
        let c = tl.pop().unwrap();
        assert_eq!(c.kind, EntryKind::Unit(UnitId(1)));
        assert_eq!(tl.now(), 100);
    }

    #[test]
    fn test_pop_never_rewinds_now() {
        let mut tl = Timeline::new();
        tl.schedule(EntryKind::Unit(UnitId(1)), 100, None);
        tl.pop().unwrap();
        // A later schedule at an earlier tick surfaces immediately but must
        // not move time backwards.
        tl.schedule(EntryKind::Unit(UnitId(2)), 10, None);
        let e = tl.pop().unwrap();
        assert_eq!(e.ready_tick, 10);
        assert_eq!(tl.now(), 100);
    }

    #[test]
    fn test_empty_pop_is_fatal() {
        let mut tl = Timeline::new();
        assert!(matches!(
            tl.pop(),
            Err(FatalError::EmptyTimeline { now: 0 })
        ));
    }

    #[test]
    fn test_cancel_tombstones_lazily() {
        let mut tl = Timeline::new();
        tl.schedule(EntryKind::Unit(UnitId(1)), 10, None);
        tl.schedule(EntryKind::Unit(UnitId(2)), 20, None);
        tl.cancel(UnitId(1));

        assert_eq!(tl.live_len(), 1);
        let e = tl.pop().unwrap();
        assert_eq!(e.kind, EntryKind::Unit(UnitId(2)));
    }

    #[test]
    fn test_schedule_replaces_live_entry_for_same_unit() {
        let mut tl = Timeline::new();
        tl.schedule(EntryKind::Unit(UnitId(1)), 10, None);
        tl.schedule(EntryKind::Unit(UnitId(1)), 30, None);

        assert_eq!(tl.live_len(), 1);
        let e = tl.pop().unwrap();
        assert_eq!(e.ready_tick, 30);
        assert!(tl.pop().is_err());
    }

    #[test]
    fn test_reschedule_equals_cancel_plus_schedule() {
        // Two timelines driven identically must produce the same entry.
        let mut direct = Timeline::new();
        direct.schedule(EntryKind::Unit(UnitId(1)), 0, None);
        direct.pop().unwrap();
        direct.schedule(EntryKind::Unit(UnitId(1)), 40, None);
        let seq_direct = direct.reschedule(EntryKind::Unit(UnitId(1)), 60, None);

        let mut manual = Timeline::new();
        manual.schedule(EntryKind::Unit(UnitId(1)), 0, None);
        manual.pop().unwrap();
        manual.schedule(EntryKind::Unit(UnitId(1)), 40, None);
        manual.cancel(UnitId(1));
        let seq_manual = manual.schedule(EntryKind::Unit(UnitId(1)), manual.now() + 60, None);

        let d = direct.pop().unwrap();
        let m = manual.pop().unwrap();
        assert_eq!(d.ready_tick, m.ready_tick);
        assert_eq!(seq_direct, seq_manual);
    }

    #[test]
    fn test_preview_is_non_consuming_and_skips_tombstones() {
        let mut tl = Timeline::new();
        tl.schedule(EntryKind::Unit(UnitId(1)), 10, None);
        tl.schedule(EntryKind::Unit(UnitId(2)), 20, None);
        tl.schedule(EntryKind::Unit(UnitId(3)), 30, None);
        tl.cancel(UnitId(2));

        let ahead = tl.preview(5);
        assert_eq!(ahead.len(), 2);
        assert_eq!(ahead[0].kind, EntryKind::Unit(UnitId(1)));
        assert_eq!(ahead[1].kind, EntryKind::Unit(UnitId(3)));
        // Nothing consumed.
        assert_eq!(tl.live_len(), 2);
        assert_eq!(tl.now(), 0);
    }

    #[test]
    fn test_seq_is_unique_across_session() {
        let mut tl = Timeline::new();
        let a = tl.schedule(EntryKind::Unit(UnitId(1)), 10, None);
        tl.cancel(UnitId(1));
        let b = tl.schedule(EntryKind::Unit(UnitId(1)), 10, None);
        assert_ne!(a, b);
        let entries = tl.live_entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].seq, b);
    }

    #[test]
    fn test_restore_round_trip() {
        let mut tl = Timeline::new();
        tl.schedule(EntryKind::Unit(UnitId(1)), 10, None);
        tl.schedule(EntryKind::Hazard(HazardId(7)), 25, None);
        tl.pop().unwrap();

        let entries = tl.live_entries();
        let mut restored = Timeline::restore(tl.now(), 99, entries);
        assert_eq!(restored.now(), 10);
        let e = restored.pop().unwrap();
        assert_eq!(e.kind, EntryKind::Hazard(HazardId(7)));
        let seq = restored.schedule(EntryKind::Unit(UnitId(2)), 30, None);
        assert_eq!(seq, 99);
    }
}
