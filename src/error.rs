//! Error taxonomy of the tactical core.
//!
//! Three families with different policies:
//! - [`ValidationError`] is an ordinary value returned from action
//!   validation. The UI shows the reason and awaits the next input; AI
//!   planners skip the candidate.
//! - [`FatalError`] signals a logic bug (drained timeline mid-battle, dead
//!   unit surfacing from the queue, runaway event recursion). It aborts the
//!   simulation and carries enough context to reproduce.
//! - [`ScenarioError`] is reported to the host before battle init; the
//!   battle never starts.

use crate::components::UnitId;
use crate::timeline::Tick;
use thiserror::Error;

/// Why an action failed its preconditions. Never raised, always returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("target at distance {distance} is outside range {range_min}..={range_max}")]
    OutOfRange {
        distance: u32,
        range_min: u32,
        range_max: u32,
    },
    #[error("destination {x},{y} is outside the map")]
    OutOfBounds { x: i32, y: i32 },
    #[error("destination is impassable")]
    DestinationImpassable,
    #[error("destination is occupied")]
    DestinationOccupied,
    #[error("path costs {cost} but only {budget} movement points remain")]
    InsufficientMovement { cost: u32, budget: u32 },
    #[error("no reachable path to the destination")]
    Unreachable,
    #[error("unit has already moved this activation")]
    AlreadyMoved,
    #[error("target unit does not exist")]
    TargetInvalid,
    #[error("target unit is already down")]
    TargetDead,
    #[error("a unit cannot target itself")]
    SelfTarget,
    #[error("an interrupt is already prepared")]
    InterruptAlreadyPrepared,
}

/// Unrecoverable simulation faults. Each indicates a programming error in
/// the core or a manager, never bad player input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FatalError {
    #[error("timeline drained at tick {now} while the battle is still running")]
    EmptyTimeline { now: Tick },
    #[error("dead unit {unit} surfaced from the timeline at tick {tick}")]
    DeadUnitOnTimeline { unit: UnitId, tick: Tick },
    #[error("event recursion exceeded depth {limit}")]
    EventRecursionLimit { limit: u32 },
    #[error("invariant violated: {0}")]
    InvariantViolation(String),
}

/// Anything battle construction or stepping can surface to the host.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BattleError {
    #[error(transparent)]
    Scenario(#[from] ScenarioError),
    #[error(transparent)]
    Fatal(#[from] FatalError),
}

/// Malformed scenario plans, surfaced before any battle state exists.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScenarioError {
    #[error("map has zero width or height")]
    EmptyMap,
    #[error("scenario has no map layers")]
    NoLayers,
    #[error("layer {layer} has {got} cells, expected {expected}")]
    LayerSizeMismatch {
        layer: usize,
        expected: usize,
        got: usize,
    },
    #[error("no layer covers cell {x},{y}")]
    UncoveredCell { x: i32, y: i32 },
    #[error("terrain id {id} is not in the tileset")]
    UnknownTerrain { id: u16 },
    #[error("tile override at {x},{y} is outside the map")]
    OverrideOutOfBounds { x: i32, y: i32 },
    #[error("placement references unknown unit '{name}'")]
    UnknownUnit { name: String },
    #[error("placement references unknown marker '{name}'")]
    UnknownMarker { name: String },
    #[error("placement references unknown region '{name}'")]
    UnknownRegion { name: String },
    #[error("placement for '{name}' targets blocked tile {x},{y}")]
    PlacementBlocked { name: String, x: i32, y: i32 },
    #[error("region '{name}' has no free tile left")]
    RegionFull { name: String },
    #[error("objective references unknown unit '{name}'")]
    ObjectiveUnknownUnit { name: String },
}
