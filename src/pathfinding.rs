//! Reachability and range queries over the battle map.
//!
//! Movement uses Dijkstra over per-tile entry costs, bounded by the
//! actor's movement points. Occupied tiles block traversal regardless of
//! the occupant's team; attack ranges ignore occupancy entirely. All
//! distances are Manhattan. Ties resolve toward lower y, then lower x, so
//! equal-cost paths are deterministic.

use crate::components::Vector2;
use crate::map::TileMap;
use crate::spatial::OccupancyGrid;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

/// Result of one reachability sweep from an origin tile.
#[derive(Debug, Clone)]
pub struct ReachableSet {
    origin: Vector2,
    costs: HashMap<Vector2, u32>,
    prev: HashMap<Vector2, Vector2>,
}

impl ReachableSet {
    pub fn origin(&self) -> Vector2 {
        self.origin
    }

    /// Whether `pos` can be reached within the budget. The origin itself
    /// counts as reachable at cost 0.
    pub fn contains(&self, pos: Vector2) -> bool {
        self.costs.contains_key(&pos)
    }

    pub fn cost(&self, pos: Vector2) -> Option<u32> {
        self.costs.get(&pos).copied()
    }

    /// Full path origin..=pos, or `None` if unreachable.
    pub fn path_to(&self, pos: Vector2) -> Option<Vec<Vector2>> {
        if !self.contains(pos) {
            return None;
        }
        let mut path = vec![pos];
        let mut cur = pos;
        while cur != self.origin {
            cur = self.prev[&cur];
            path.push(cur);
        }
        path.reverse();
        Some(path)
    }

    /// Reachable destinations with costs, sorted by (y, x). Excludes the
    /// origin.
    pub fn destinations(&self) -> Vec<(Vector2, u32)> {
        let mut out: Vec<(Vector2, u32)> = self
            .costs
            .iter()
            .filter(|(&p, _)| p != self.origin)
            .map(|(&p, &c)| (p, c))
            .collect();
        out.sort_by_key(|&(p, _)| (p.y, p.x));
        out
    }
}

/// Dijkstra sweep from `origin` bounded by `budget` movement points.
///
/// Any occupied tile other than the origin is non-traversable; destination
/// filtering (cannot *end* on a unit) is already implied.
pub fn reachable_set(
    map: &TileMap,
    occupancy: &OccupancyGrid,
    origin: Vector2,
    budget: u32,
) -> ReachableSet {
    let mut costs: HashMap<Vector2, u32> = HashMap::new();
    let mut prev: HashMap<Vector2, Vector2> = HashMap::new();
    let mut heap: BinaryHeap<Reverse<(u32, i32, i32)>> = BinaryHeap::new();

    costs.insert(origin, 0);
    heap.push(Reverse((0, origin.y, origin.x)));

    while let Some(Reverse((cost, y, x))) = heap.pop() {
        let here = Vector2::new(x, y);
        if costs.get(&here) != Some(&cost) {
            continue; // stale heap entry
        }
        for next in here.neighbors() {
            let Some(entry_cost) = map.entry_cost(next) else {
                continue;
            };
            if occupancy.is_occupied(next) {
                continue;
            }
            let next_cost = cost.saturating_add(entry_cost);
            if next_cost > budget {
                continue;
            }
            match costs.get(&next) {
                Some(&known) if next_cost > known => {}
                Some(&known) if next_cost == known => {
                    // Equal-cost path: keep the predecessor with lower (y, x).
                    let old = prev[&next];
                    if (here.y, here.x) < (old.y, old.x) {
                        prev.insert(next, here);
                    }
                }
                _ => {
                    costs.insert(next, next_cost);
                    prev.insert(next, here);
                    heap.push(Reverse((next_cost, next.y, next.x)));
                }
            }
        }
    }

    ReachableSet {
        origin,
        costs,
        prev,
    }
}

/// In-bounds tiles whose Manhattan distance from `from` lies in
/// `range_min..=range_max`, sorted by (y, x). Occupancy and vision are
/// ignored; melee does not care and ranged arcs over terrain.
pub fn range_band(map: &TileMap, from: Vector2, range_min: u32, range_max: u32) -> Vec<Vector2> {
    let r = range_max as i32;
    let mut out = Vec::new();
    for dy in -r..=r {
        for dx in -r..=r {
            let pos = Vector2::new(from.x + dx, from.y + dy);
            let dist = from.manhattan(pos);
            if dist >= range_min && dist <= range_max && map.in_bounds(pos) {
                out.push(pos);
            }
        }
    }
    out.sort_by_key(|p| (p.y, p.x));
    out
}
