//! Tileset and map - terrain properties and layered composition.
//!
//! Maps are authored as stacked layers (ground, walls, features) of terrain
//! ids. Layers are composed *before* runtime into a single effective
//! [`Tile`] per cell; the simulation only ever sees the composed map.
//! Terrain affects movement cost, defense, and vision.

use crate::components::Vector2;
use crate::error::ScenarioError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Movement cost marking a tile as impassable.
pub const IMPASSABLE: u32 = u32::MAX;

/// Properties of one terrain kind in a tileset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Terrain {
    pub name: String,
    /// Cost to enter a tile of this terrain, [`IMPASSABLE`] to forbid entry.
    pub movement_cost: u32,
    /// Flat damage reduction for a defender standing here.
    pub defense_bonus: i32,
    /// Display-only dodge bonus, 0..=100.
    pub avoid_bonus: u32,
    pub blocks_vision: bool,
    pub blocks_movement: bool,
}

impl Terrain {
    pub fn open(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            movement_cost: 1,
            defense_bonus: 0,
            avoid_bonus: 0,
            blocks_vision: false,
            blocks_movement: false,
        }
    }

    pub fn rough(name: impl Into<String>, movement_cost: u32, defense_bonus: i32) -> Self {
        Self {
            name: name.into(),
            movement_cost,
            defense_bonus,
            avoid_bonus: 0,
            blocks_vision: false,
            blocks_movement: false,
        }
    }

    pub fn wall(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            movement_cost: IMPASSABLE,
            defense_bonus: 0,
            avoid_bonus: 0,
            blocks_vision: true,
            blocks_movement: true,
        }
    }
}

/// Terrain definitions keyed by 16-bit terrain id. Id 0 is reserved as the
/// "empty" layer marker and never resolves to a terrain.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Tileset {
    terrains: HashMap<u16, Terrain>,
}

impl Tileset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: u16, terrain: Terrain) {
        self.terrains.insert(id, terrain);
    }

    pub fn get(&self, id: u16) -> Option<&Terrain> {
        if id == 0 {
            None
        } else {
            self.terrains.get(&id)
        }
    }

    /// A small baseline tileset: plain, forest, hills, water, wall, road.
    pub fn standard() -> Self {
        let mut ts = Self::new();
        ts.insert(1, Terrain::open("Plain"));
        ts.insert(
            2,
            Terrain {
                avoid_bonus: 20,
                blocks_vision: true,
                ..Terrain::rough("Forest", 2, 1)
            },
        );
        ts.insert(
            3,
            Terrain {
                avoid_bonus: 10,
                ..Terrain::rough("Hills", 2, 2)
            },
        );
        ts.insert(
            4,
            Terrain {
                name: "Water".to_string(),
                movement_cost: IMPASSABLE,
                defense_bonus: 0,
                avoid_bonus: 0,
                blocks_vision: false,
                blocks_movement: true,
            },
        );
        ts.insert(5, Terrain::wall("Wall"));
        ts.insert(6, Terrain::open("Road"));
        ts
    }
}

/// Effective per-cell tile after layer composition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tile {
    pub terrain_id: u16,
    pub movement_cost: u32,
    pub defense_bonus: i32,
    pub avoid_bonus: u32,
    pub blocks_vision: bool,
    pub blocks_movement: bool,
}

impl Tile {
    pub fn from_terrain(id: u16, terrain: &Terrain) -> Self {
        Self {
            terrain_id: id,
            movement_cost: terrain.movement_cost,
            defense_bonus: terrain.defense_bonus,
            avoid_bonus: terrain.avoid_bonus,
            blocks_vision: terrain.blocks_vision,
            blocks_movement: terrain.blocks_movement,
        }
    }

    pub fn is_passable(&self) -> bool {
        !self.blocks_movement && self.movement_cost != IMPASSABLE
    }
}

/// One authoring layer: a `width * height` grid of terrain ids, row-major.
/// Id 0 means "nothing on this layer here".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapLayer {
    pub tile_ids: Vec<u16>,
}

/// The composed battle map: a rectangular grid of effective tiles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TileMap {
    width: usize,
    height: usize,
    /// Composed cells, row-major.
    tiles: Vec<Tile>,
}

impl TileMap {
    /// Uniform map of one terrain. Mostly a test and demo convenience.
    pub fn filled(width: usize, height: usize, tile: Tile) -> Self {
        Self {
            width,
            height,
            tiles: vec![tile; width * height],
        }
    }

    /// Composes authoring layers bottom-up into effective tiles.
    ///
    /// The lowest layer must cover every cell; higher layers override
    /// wherever their id is non-zero. Unknown terrain ids are a scenario
    /// load error.
    pub fn compose(
        width: usize,
        height: usize,
        layers: &[MapLayer],
        tileset: &Tileset,
    ) -> Result<Self, ScenarioError> {
        if width == 0 || height == 0 {
            return Err(ScenarioError::EmptyMap);
        }
        let cell_count = width * height;
        let mut tiles = Vec::with_capacity(cell_count);

        for idx in 0..cell_count {
            let mut effective: Option<u16> = None;
            for (layer_no, layer) in layers.iter().enumerate() {
                if layer.tile_ids.len() != cell_count {
                    return Err(ScenarioError::LayerSizeMismatch {
                        layer: layer_no,
                        expected: cell_count,
                        got: layer.tile_ids.len(),
                    });
                }
                let id = layer.tile_ids[idx];
                if id != 0 {
                    effective = Some(id);
                }
            }
            let id = effective.ok_or(ScenarioError::UncoveredCell {
                x: (idx % width) as i32,
                y: (idx / width) as i32,
            })?;
            let terrain = tileset
                .get(id)
                .ok_or(ScenarioError::UnknownTerrain { id })?;
            tiles.push(Tile::from_terrain(id, terrain));
        }

        Ok(Self {
            width,
            height,
            tiles,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn in_bounds(&self, pos: Vector2) -> bool {
        pos.x >= 0 && pos.y >= 0 && (pos.x as usize) < self.width && (pos.y as usize) < self.height
    }

    fn cell_index(&self, pos: Vector2) -> Option<usize> {
        if self.in_bounds(pos) {
            Some(pos.y as usize * self.width + pos.x as usize)
        } else {
            None
        }
    }

    pub fn tile(&self, pos: Vector2) -> Option<&Tile> {
        self.cell_index(pos).map(|i| &self.tiles[i])
    }

    /// Cost to enter `pos`, or `None` when out of bounds or impassable.
    pub fn entry_cost(&self, pos: Vector2) -> Option<u32> {
        let tile = self.tile(pos)?;
        if tile.is_passable() {
            Some(tile.movement_cost)
        } else {
            None
        }
    }

    /// Flat damage reduction for a defender at `pos`.
    pub fn defense_bonus_at(&self, pos: Vector2) -> i32 {
        self.tile(pos).map(|t| t.defense_bonus).unwrap_or(0)
    }

    /// Applies a scenario tile patch. Out-of-bounds patches are a load error.
    pub fn apply_override(&mut self, pos: Vector2, tile: Tile) -> Result<(), ScenarioError> {
        let idx = self
            .cell_index(pos)
            .ok_or(ScenarioError::OverrideOutOfBounds { x: pos.x, y: pos.y })?;
        self.tiles[idx] = tile;
        Ok(())
    }

    /// All in-bounds tiles with their coordinates, row-major.
    pub fn iter(&self) -> impl Iterator<Item = (Vector2, &Tile)> {
        self.tiles.iter().enumerate().map(|(i, t)| {
            (
                Vector2::new((i % self.width) as i32, (i / self.width) as i32),
                t,
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain() -> Tile {
        Tile::from_terrain(1, &Terrain::open("Plain"))
    }

    #[test]
    fn test_filled_map_bounds() {
        let map = TileMap::filled(5, 4, plain());
        assert!(map.in_bounds(Vector2::new(0, 0)));
        assert!(map.in_bounds(Vector2::new(4, 3)));
        assert!(!map.in_bounds(Vector2::new(5, 0)));
        assert!(!map.in_bounds(Vector2::new(0, 4)));
        assert!(!map.in_bounds(Vector2::new(-1, 0)));
    }

    #[test]
    fn test_compose_higher_layer_overrides() {
        let tileset = Tileset::standard();
        let ground = MapLayer {
            tile_ids: vec![1; 9],
        };
        let mut walls = MapLayer {
            tile_ids: vec![0; 9],
        };
        walls.tile_ids[4] = 5; // wall at (1, 1)

        let map = TileMap::compose(3, 3, &[ground, walls], &tileset).unwrap();
        assert_eq!(map.tile(Vector2::new(0, 0)).unwrap().terrain_id, 1);
        let center = map.tile(Vector2::new(1, 1)).unwrap();
        assert_eq!(center.terrain_id, 5);
        assert!(!center.is_passable());
        assert_eq!(map.entry_cost(Vector2::new(1, 1)), None);
    }

    #[test]
    fn test_compose_rejects_uncovered_cell() {
        let tileset = Tileset::standard();
        let sparse = MapLayer {
            tile_ids: vec![1, 1, 0, 1],
        };
        let err = TileMap::compose(2, 2, &[sparse], &tileset).unwrap_err();
        assert!(matches!(err, ScenarioError::UncoveredCell { x: 0, y: 1 }));
    }

    #[test]
    fn test_compose_rejects_unknown_terrain() {
        let tileset = Tileset::standard();
        let ground = MapLayer {
            tile_ids: vec![99; 4],
        };
        let err = TileMap::compose(2, 2, &[ground], &tileset).unwrap_err();
        assert!(matches!(err, ScenarioError::UnknownTerrain { id: 99 }));
    }

    #[test]
    fn test_override_patch() {
        let tileset = Tileset::standard();
        let mut map = TileMap::filled(3, 3, plain());
        let forest = Tile::from_terrain(2, tileset.get(2).unwrap());
        map.apply_override(Vector2::new(2, 2), forest).unwrap();
        assert_eq!(map.tile(Vector2::new(2, 2)).unwrap().movement_cost, 2);
        assert!(map
            .apply_override(Vector2::new(3, 3), forest)
            .is_err());
    }
}
