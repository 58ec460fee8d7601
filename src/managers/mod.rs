//! Event-driven managers.
//!
//! Each manager is a set of free-function handlers registered on the
//! [`EventBus`](crate::events::EventBus). Managers never reference each
//! other; the bus is the only seam, and any state a manager needs between
//! events lives in [`GameState`](crate::state::GameState).
//!
//! Dispatch priorities, highest first:
//!
//! | Priority | Handler set | Reacts to |
//! |----------|-------------|-----------|
//! | 100 | phase machine | flow events, objectives, inspect |
//! | 90 | scheduler | `UnitDefeated` (tombstoning) |
//! | 50 | selection | `TurnStarted`, moves, cancel restore |
//! | 40 | combat | `ActionSelected`, `TargetConfirmed`, cleanup |
//! | 30 | wounds | `TurnStarted` (bleeding) |
//! | 20 | morale | damage, wounds, defeats |
//! | 15 | interrupt, hazard | `UnitMoved`/`UnitAttacked`, hazard pulses |
//! | 10 | objective | `UnitDefeated`, `TurnEnded`, `UnitMoved` |
//! | -100 | log | everything worth narrating |

pub mod combat;
pub mod hazard;
pub mod interrupt;
pub mod log;
pub mod morale;
pub mod objective;
pub mod scheduler;
pub mod selection;
pub mod wounds;

use crate::events::EventBus;

/// Registers the phase machine and every manager on a fresh bus.
pub fn register_all(bus: &mut EventBus) {
    crate::phase::register(bus);
    scheduler::register(bus);
    selection::register(bus);
    combat::register(bus);
    wounds::register(bus);
    morale::register(bus);
    interrupt::register(bus);
    hazard::register(bus);
    objective::register(bus);
    log::register(bus);
}
