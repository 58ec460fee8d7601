//! Occupancy index - which unit stands on which tile.
//!
//! The authoritative position lives on the `Movement` component; this index
//! mirrors it for O(1) tile lookups and is kept consistent by the spawn,
//! movement, and despawn paths. One unit per tile.

use crate::components::{UnitId, Vector2};
use std::collections::HashMap;

/// Bidirectional `position <-> unit` index over the battle map.
#[derive(Debug, Clone, Default)]
pub struct OccupancyGrid {
    by_tile: HashMap<Vector2, UnitId>,
    by_unit: HashMap<UnitId, Vector2>,
}

impl OccupancyGrid {
    pub fn new() -> Self {
        Self::default()
    }

    /// Places a unit. Replaces any stale entry for the same unit; the
    /// target tile must be free.
    pub fn insert(&mut self, unit: UnitId, pos: Vector2) {
        debug_assert!(
            !self.by_tile.contains_key(&pos) || self.by_tile[&pos] == unit,
            "occupancy collision at {pos}"
        );
        if let Some(old) = self.by_unit.insert(unit, pos) {
            self.by_tile.remove(&old);
        }
        self.by_tile.insert(pos, unit);
    }

    pub fn remove(&mut self, unit: UnitId) {
        if let Some(pos) = self.by_unit.remove(&unit) {
            self.by_tile.remove(&pos);
        }
    }

    /// Moves a unit to a new tile. Same contract as [`Self::insert`].
    pub fn move_unit(&mut self, unit: UnitId, to: Vector2) {
        self.insert(unit, to);
    }

    pub fn unit_at(&self, pos: Vector2) -> Option<UnitId> {
        self.by_tile.get(&pos).copied()
    }

    pub fn position_of(&self, unit: UnitId) -> Option<Vector2> {
        self.by_unit.get(&unit).copied()
    }

    pub fn is_occupied(&self, pos: Vector2) -> bool {
        self.by_tile.contains_key(&pos)
    }

    pub fn len(&self) -> usize {
        self.by_unit.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_unit.is_empty()
    }

    /// Units within `radius` Manhattan tiles of `center`, excluding any unit
    /// standing exactly on `center`. Sorted by (distance, unit id) so
    /// callers iterate deterministically.
    pub fn units_within(&self, center: Vector2, radius: u32) -> Vec<(UnitId, Vector2)> {
        let mut out: Vec<(UnitId, Vector2)> = self
            .by_unit
            .iter()
            .filter(|(_, &pos)| pos != center && center.manhattan(pos) <= radius)
            .map(|(&unit, &pos)| (unit, pos))
            .collect();
        out.sort_by_key(|&(unit, pos)| (center.manhattan(pos), unit));
        out
    }

    /// All placements, sorted by unit id for deterministic iteration.
    pub fn iter_sorted(&self) -> Vec<(UnitId, Vector2)> {
        let mut out: Vec<(UnitId, Vector2)> =
            self.by_unit.iter().map(|(&u, &p)| (u, p)).collect();
        out.sort_by_key(|&(u, _)| u);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_lookup() {
        let mut grid = OccupancyGrid::new();
        grid.insert(UnitId(1), Vector2::new(2, 3));
        grid.insert(UnitId(2), Vector2::new(4, 3));

        assert_eq!(grid.unit_at(Vector2::new(2, 3)), Some(UnitId(1)));
        assert_eq!(grid.position_of(UnitId(2)), Some(Vector2::new(4, 3)));
        assert!(grid.is_occupied(Vector2::new(4, 3)));
        assert!(!grid.is_occupied(Vector2::new(0, 0)));
    }

    #[test]
    fn test_move_clears_old_tile() {
        let mut grid = OccupancyGrid::new();
        grid.insert(UnitId(1), Vector2::new(0, 0));
        grid.move_unit(UnitId(1), Vector2::new(5, 5));

        assert!(!grid.is_occupied(Vector2::new(0, 0)));
        assert_eq!(grid.unit_at(Vector2::new(5, 5)), Some(UnitId(1)));
        assert_eq!(grid.len(), 1);
    }

    #[test]
    fn test_remove() {
        let mut grid = OccupancyGrid::new();
        grid.insert(UnitId(7), Vector2::new(1, 1));
        grid.remove(UnitId(7));
        assert!(grid.is_empty());
        assert_eq!(grid.unit_at(Vector2::new(1, 1)), None);
    }

    #[test]
    fn test_units_within_sorted_by_distance() {
        let mut grid = OccupancyGrid::new();
        grid.insert(UnitId(1), Vector2::new(0, 0));
        grid.insert(UnitId(2), Vector2::new(3, 0));
        grid.insert(UnitId(3), Vector2::new(1, 0));

        let near = grid.units_within(Vector2::new(0, 0), 3);
        assert_eq!(near.len(), 2);
        assert_eq!(near[0].0, UnitId(3));
        assert_eq!(near[1].0, UnitId(2));
    }
}
