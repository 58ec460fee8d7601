//! Duskfall - Tactical Combat Core
//!
//! A deterministic, event-driven simulation for a grid-based tactical RPG.
//! Time is a discrete-tick timeline: every action carries a weight that
//! delays its actor's next activation, so light actions trade damage for
//! tempo against heavy ones. Unit storage rides on `bevy_ecs`; everything
//! else flows through the event bus.

pub mod actions;
pub mod ai;
pub mod api;
pub mod battle;
pub mod components;
pub mod error;
pub mod events;
pub mod managers;
pub mod map;
pub mod pathfinding;
pub mod phase;
pub mod render;
pub mod rng;
pub mod save;
pub mod scenario;
pub mod spatial;
pub mod state;
pub mod timeline;

pub use actions::{ActionCategory, ActionKind};
pub use api::{BattleWorld, Flow, InputEvent};
pub use battle::{AttackStyle, BattleCalculator, CombatResolver, Forecast};
pub use components::*;
pub use error::{BattleError, FatalError, ScenarioError, ValidationError};
pub use events::{EventBus, EventKind, GameEvent};
pub use map::{MapLayer, Terrain, Tile, TileMap, Tileset};
pub use phase::{BattlePhase, GamePhase};
pub use render::{build_render_context, RenderContext};
pub use save::SaveState;
pub use scenario::{Placement, RegionPolicy, ScenarioPlan};
pub use spatial::OccupancyGrid;
pub use state::{GameState, UnitSpawn};
pub use timeline::{EntryKind, Tick, Timeline, TimelineEntry, Weight};
