//! ECS components for the Duskfall tactical core.
//!
//! Components are pure data containers attached to unit entities.
//! All game logic lives in the managers and resolvers that query them.
//! Required components are spawned through [`UnitBundle`]; the optional
//! ones (`Morale`, `Wounds`, `Interrupt`, `AiProfile`) are inserted per
//! unit as the scenario demands.

use crate::timeline::Tick;
use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};

// ============================================================================
// SPATIAL PRIMITIVES
// ============================================================================

/// Integer tile coordinate (x = east/west, y = north/south).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct Vector2 {
    pub x: i32,
    pub y: i32,
}

impl Vector2 {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Grid distance along axes only. The core's range metric.
    pub fn manhattan(&self, other: Vector2) -> u32 {
        self.x.abs_diff(other.x) + self.y.abs_diff(other.y)
    }

    /// King-move distance. Exposed for scenario tooling, not used by combat.
    pub fn chebyshev(&self, other: Vector2) -> u32 {
        self.x.abs_diff(other.x).max(self.y.abs_diff(other.y))
    }

    /// The four orthogonal neighbors, in deterministic (y, x) order.
    pub fn neighbors(&self) -> [Vector2; 4] {
        [
            Vector2::new(self.x, self.y - 1),
            Vector2::new(self.x - 1, self.y),
            Vector2::new(self.x + 1, self.y),
            Vector2::new(self.x, self.y + 1),
        ]
    }
}

impl std::ops::Add for Vector2 {
    type Output = Vector2;

    fn add(self, rhs: Vector2) -> Vector2 {
        Vector2::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl std::ops::Sub for Vector2 {
    type Output = Vector2;

    fn sub(self, rhs: Vector2) -> Vector2 {
        Vector2::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl std::fmt::Display for Vector2 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Inclusive axis-aligned rectangle of tiles. Used by scenario regions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub min: Vector2,
    pub max: Vector2,
}

impl Rect {
    pub fn new(min: Vector2, max: Vector2) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, p: Vector2) -> bool {
        p.x >= self.min.x && p.x <= self.max.x && p.y >= self.min.y && p.y <= self.max.y
    }

    /// All tiles in the rectangle, row-major.
    pub fn tiles(&self) -> Vec<Vector2> {
        let mut out = Vec::new();
        for y in self.min.y..=self.max.y {
            for x in self.min.x..=self.max.x {
                out.push(Vector2::new(x, y));
            }
        }
        out
    }
}

/// Cardinal facing of a unit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Facing {
    North,
    East,
    #[default]
    South,
    West,
}

impl Facing {
    /// Facing that points from `from` toward `to` (dominant axis wins,
    /// horizontal on ties).
    pub fn toward(from: Vector2, to: Vector2) -> Self {
        let d = to - from;
        if d.x.abs() >= d.y.abs() {
            if d.x >= 0 {
                Facing::East
            } else {
                Facing::West
            }
        } else if d.y >= 0 {
            Facing::South
        } else {
            Facing::North
        }
    }
}

// ============================================================================
// IDENTITY COMPONENTS
// ============================================================================

/// Stable public identity of a unit. Events, timeline entries, and saves
/// reference units by this id, never by raw ECS entity.
#[derive(
    Component, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct UnitId(pub u32);

impl std::fmt::Display for UnitId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl Default for UnitId {
    fn default() -> Self {
        Self(0)
    }
}

/// Allegiance of a unit.
#[derive(Component, Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Team {
    #[default]
    Player,
    Enemy,
    Neutral,
}

impl Team {
    pub fn is_hostile_to(&self, other: Team) -> bool {
        matches!(
            (self, other),
            (Team::Player, Team::Enemy) | (Team::Enemy, Team::Player) | (Team::Enemy, Team::Neutral)
        )
    }
}

/// Combat role of a unit. Drives default stats and render class tags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnitClass {
    #[default]
    Warrior,
    Knight,
    Archer,
    Mage,
    Healer,
    Brigand,
}

/// Name and class of a unit.
#[derive(Component, Debug, Clone, Default, Serialize, Deserialize)]
pub struct Actor {
    pub name: String,
    pub class: UnitClass,
}

impl Actor {
    pub fn new(name: impl Into<String>, class: UnitClass) -> Self {
        Self {
            name: name.into(),
            class,
        }
    }
}

// ============================================================================
// COMBAT COMPONENTS
// ============================================================================

/// Hit points of a unit.
#[derive(Component, Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Health {
    pub current: i32,
    pub max: i32,
}

impl Health {
    pub fn new(max: i32) -> Self {
        Self { current: max, max }
    }

    pub fn is_alive(&self) -> bool {
        self.current > 0
    }

    pub fn fraction(&self) -> f32 {
        if self.max <= 0 {
            0.0
        } else {
            (self.current as f32 / self.max as f32).clamp(0.0, 1.0)
        }
    }

    pub fn damage(&mut self, amount: i32) {
        self.current -= amount.max(0);
    }

    pub fn heal(&mut self, amount: i32) {
        self.current = (self.current + amount.max(0)).min(self.max);
    }
}

impl Default for Health {
    fn default() -> Self {
        Self::new(20)
    }
}

/// Position, facing, and movement budget of a unit.
///
/// The position stored here is authoritative; the occupancy index mirrors it
/// and is kept consistent by the movement path.
#[derive(Component, Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Movement {
    pub position: Vector2,
    pub facing: Facing,
    /// Tiles of movement-cost budget per activation.
    pub movement_points: u32,
    /// Baseline tick cost added to every action weight on reschedule.
    pub speed: u32,
}

impl Movement {
    pub fn new(position: Vector2, movement_points: u32, speed: u32) -> Self {
        Self {
            position,
            facing: Facing::default(),
            movement_points,
            speed,
        }
    }
}

/// Offensive and defensive statistics.
///
/// `accuracy` is a display metric only; the damage model guarantees hits.
#[derive(Component, Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Combat {
    pub strength: i32,
    pub defense: i32,
    pub range_min: u32,
    pub range_max: u32,
    /// Percent chance to double damage, 0..=100.
    pub crit_chance: u32,
    pub accuracy: u32,
}

impl Combat {
    /// Whether `distance` falls inside this unit's attack band.
    pub fn in_range(&self, distance: u32) -> bool {
        distance >= self.range_min && distance <= self.range_max
    }
}

impl Default for Combat {
    fn default() -> Self {
        Self {
            strength: 5,
            defense: 2,
            range_min: 1,
            range_max: 1,
            crit_chance: 5,
            accuracy: 85,
        }
    }
}

/// Which statistic a temporary modifier touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatKind {
    Strength,
    Defense,
    Speed,
}

/// A timed stat adjustment. Expired modifiers are swept at turn start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TempModifier {
    pub stat: StatKind,
    pub amount: i32,
    pub expires_at: Tick,
}

/// Turn-scoped flags and temporary modifiers.
#[derive(Component, Debug, Clone, Default, Serialize, Deserialize)]
pub struct Status {
    pub has_moved: bool,
    pub has_acted: bool,
    pub modifiers: Vec<TempModifier>,
}

impl Status {
    /// Clears turn-scoped flags and drops modifiers that expired at or
    /// before `now`.
    pub fn begin_turn(&mut self, now: Tick) {
        self.has_moved = false;
        self.has_acted = false;
        self.modifiers.retain(|m| m.expires_at > now);
    }

    pub fn stat_bonus(&self, stat: StatKind) -> i32 {
        self.modifiers
            .iter()
            .filter(|m| m.stat == stat)
            .map(|m| m.amount)
            .sum()
    }
}

// ============================================================================
// MORALE (optional)
// ============================================================================

/// Coarse morale bands. Derived from the numeric value, never set directly.
/// Declaration order is the band order, worst first.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum MoraleState {
    Routed,
    Panicked,
    Shaken,
    #[default]
    Normal,
    Confident,
    Heroic,
}

impl MoraleState {
    /// Band for a morale value in 0..=150.
    pub fn for_value(value: i32) -> Self {
        match value {
            v if v < 20 => MoraleState::Routed,
            v if v < 40 => MoraleState::Panicked,
            v if v < 60 => MoraleState::Shaken,
            v if v < 100 => MoraleState::Normal,
            v if v < 120 => MoraleState::Confident,
            _ => MoraleState::Heroic,
        }
    }

    /// Additional action weight for this band.
    pub fn weight_penalty(&self) -> i32 {
        match self {
            MoraleState::Routed => 40,
            MoraleState::Panicked => 25,
            MoraleState::Shaken => 10,
            MoraleState::Normal | MoraleState::Confident => 0,
            MoraleState::Heroic => -10,
        }
    }
}

/// What caused a morale swing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MoraleSource {
    DamageTaken,
    Wounded,
    AllyFallen,
    EnemySlain,
    Rally,
}

/// One recorded morale swing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoraleModifier {
    pub amount: i32,
    pub source: MoraleSource,
}

/// Morale of a unit, 0..=150. Optional component.
#[derive(Component, Debug, Clone, Serialize, Deserialize)]
pub struct Morale {
    pub value: i32,
    pub state: MoraleState,
    /// Recent swings, oldest first. Bounded by the morale manager.
    pub modifiers: Vec<MoraleModifier>,
}

impl Default for Morale {
    fn default() -> Self {
        Self::new(100)
    }
}

impl Morale {
    pub fn new(value: i32) -> Self {
        let value = value.clamp(0, 150);
        Self {
            value,
            state: MoraleState::for_value(value),
            modifiers: Vec::new(),
        }
    }

    /// Applies a swing and returns the previous band.
    pub fn adjust(&mut self, amount: i32, source: MoraleSource) -> MoraleState {
        let before = self.state;
        self.value = (self.value + amount).clamp(0, 150);
        self.state = MoraleState::for_value(self.value);
        self.modifiers.push(MoraleModifier { amount, source });
        before
    }
}

// ============================================================================
// WOUNDS (optional)
// ============================================================================

/// Severity ladder for lasting injuries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum WoundSeverity {
    Minor,
    Moderate,
    Severe,
    Critical,
    Mortal,
}

impl WoundSeverity {
    /// Additional action weight while carrying a wound of this severity.
    pub fn weight_penalty(&self) -> i32 {
        match self {
            WoundSeverity::Minor => 5,
            WoundSeverity::Moderate => 10,
            WoundSeverity::Severe => 20,
            WoundSeverity::Critical => 35,
            WoundSeverity::Mortal => 50,
        }
    }
}

/// Where a wound landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BodyPart {
    Head,
    Torso,
    LeftArm,
    RightArm,
    LeftLeg,
    RightLeg,
}

/// Flat stat penalties carried by a wound.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatPenalties {
    pub strength: i32,
    pub defense: i32,
    pub speed: i32,
}

/// A single lasting injury.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wound {
    pub severity: WoundSeverity,
    pub body_part: BodyPart,
    pub penalties: StatPenalties,
    /// Bleeding wounds cost hp at the start of each activation.
    pub bleeding: bool,
    /// Permanent wounds survive the battle (persistence is host concern).
    pub permanent: bool,
}

/// Wound list of a unit. Optional component.
#[derive(Component, Debug, Clone, Default, Serialize, Deserialize)]
pub struct Wounds {
    pub list: Vec<Wound>,
}

impl Wounds {
    pub fn total_weight_penalty(&self) -> i32 {
        self.list.iter().map(|w| w.severity.weight_penalty()).sum()
    }

    pub fn total_penalties(&self) -> StatPenalties {
        let mut out = StatPenalties::default();
        for w in &self.list {
            out.strength += w.penalties.strength;
            out.defense += w.penalties.defense;
            out.speed += w.penalties.speed;
        }
        out
    }

    pub fn bleed_per_turn(&self) -> i32 {
        self.list.iter().filter(|w| w.bleeding).count() as i32
    }
}

// ============================================================================
// INTERRUPTS (optional)
// ============================================================================

/// Condition under which a prepared action fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InterruptTrigger {
    /// A hostile unit ends a move within this many tiles.
    EnemyEntersRange(u32),
    /// The owner is the target of an attack.
    SelfAttacked,
}

/// What the interrupt does when it fires. Kept to a quick retaliation for
/// now; the trigger/response split leaves room for richer reactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InterruptResponse {
    Strike,
}

/// A stored reaction, at most one per unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreparedAction {
    pub trigger: InterruptTrigger,
    pub response: InterruptResponse,
    pub priority: i32,
    pub uses_left: u8,
}

/// Interrupt slot of a unit. Optional component.
#[derive(Component, Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Interrupt {
    pub prepared: Option<PreparedAction>,
}

// ============================================================================
// AI (optional)
// ============================================================================

/// Decision-weighting personality for AI-controlled units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Personality {
    Aggressive,
    Defensive,
    Opportunistic,
    #[default]
    Balanced,
}

/// Marks a unit as AI-controlled and carries its target memory.
#[derive(Component, Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct AiProfile {
    pub personality: Personality,
    pub last_target: Option<UnitId>,
}

impl AiProfile {
    pub fn new(personality: Personality) -> Self {
        Self {
            personality,
            last_target: None,
        }
    }
}

// ============================================================================
// BUNDLE HELPERS
// ============================================================================

/// Bundle of the components every unit carries.
#[derive(Bundle, Default)]
pub struct UnitBundle {
    pub id: UnitId,
    pub actor: Actor,
    pub team: Team,
    pub health: Health,
    pub movement: Movement,
    pub combat: Combat,
    pub status: Status,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manhattan_and_chebyshev() {
        let a = Vector2::new(1, 1);
        let b = Vector2::new(4, 3);
        assert_eq!(a.manhattan(b), 5);
        assert_eq!(a.chebyshev(b), 3);
    }

    #[test]
    fn test_health_floor_is_not_clamped() {
        // Overkill drives current below zero; death handling belongs to the
        // resolver, not the component.
        let mut hp = Health::new(10);
        hp.damage(14);
        assert_eq!(hp.current, -4);
        assert!(!hp.is_alive());
    }

    #[test]
    fn test_morale_bands() {
        assert_eq!(MoraleState::for_value(0), MoraleState::Routed);
        assert_eq!(MoraleState::for_value(45), MoraleState::Shaken);
        assert_eq!(MoraleState::for_value(100), MoraleState::Confident);
        assert_eq!(MoraleState::for_value(150), MoraleState::Heroic);
    }

    #[test]
    fn test_morale_adjust_clamps_and_records() {
        let mut m = Morale::new(100);
        let before = m.adjust(-90, MoraleSource::DamageTaken);
        assert_eq!(before, MoraleState::Confident);
        assert_eq!(m.value, 10);
        assert_eq!(m.state, MoraleState::Routed);
        assert_eq!(m.modifiers.len(), 1);
    }

    #[test]
    fn test_status_begin_turn_sweeps_expired_modifiers() {
        let mut s = Status {
            has_moved: true,
            has_acted: true,
            modifiers: vec![
                TempModifier {
                    stat: StatKind::Strength,
                    amount: 2,
                    expires_at: 100,
                },
                TempModifier {
                    stat: StatKind::Strength,
                    amount: 1,
                    expires_at: 300,
                },
            ],
        };
        s.begin_turn(100);
        assert!(!s.has_moved && !s.has_acted);
        assert_eq!(s.stat_bonus(StatKind::Strength), 1);
    }

    #[test]
    fn test_wound_penalties_accumulate() {
        let wounds = Wounds {
            list: vec![
                Wound {
                    severity: WoundSeverity::Minor,
                    body_part: BodyPart::LeftArm,
                    penalties: StatPenalties {
                        strength: -1,
                        defense: 0,
                        speed: 0,
                    },
                    bleeding: false,
                    permanent: false,
                },
                Wound {
                    severity: WoundSeverity::Severe,
                    body_part: BodyPart::Torso,
                    penalties: StatPenalties {
                        strength: -2,
                        defense: -2,
                        speed: -5,
                    },
                    bleeding: true,
                    permanent: false,
                },
            ],
        };
        assert_eq!(wounds.total_weight_penalty(), 25);
        assert_eq!(wounds.total_penalties().strength, -3);
        assert_eq!(wounds.bleed_per_turn(), 1);
    }
}
