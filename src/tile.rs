//! Tile model - the world grid and its cells

use std::fmt;

use serde::{Deserialize, Serialize};

/// Offsets of the Moore neighborhood, row by row starting bottom-left.
pub const MOORE_OFFSETS: [(i32, i32); 8] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (-1, 0),
    (1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

/// A single grid cell. Two tiles with the same coordinates are the same tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Tile {
    pub x: i32,
    pub y: i32,
}

impl Tile {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn offset(self, dx: i32, dy: i32) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }

    /// The 8 surrounding coordinates, unbounded. Use [`TileGrid::moore_neighbors`]
    /// to restrict them to a grid.
    pub fn moore_neighbors(self) -> impl Iterator<Item = Tile> {
        MOORE_OFFSETS
            .into_iter()
            .map(move |(dx, dy)| self.offset(dx, dy))
    }

    pub fn is_adjacent(self, other: Tile) -> bool {
        self != other && (self.x - other.x).abs() <= 1 && (self.y - other.y).abs() <= 1
    }

    /// Manhattan distance
    pub fn manhattan(self, other: Tile) -> u32 {
        self.x.abs_diff(other.x) + self.y.abs_diff(other.y)
    }

    /// Straight-line distance
    pub fn euclidean(self, other: Tile) -> f64 {
        let dx = f64::from(self.x - other.x);
        let dy = f64::from(self.y - other.y);
        dx.hypot(dy)
    }
}

impl fmt::Display for Tile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Dense rectangular grid of tiles, indexed row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileGrid {
    width: u32,
    height: u32,
}

impl TileGrid {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn tile_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn contains(&self, tile: Tile) -> bool {
        tile.x >= 0 && tile.y >= 0 && (tile.x as u32) < self.width && (tile.y as u32) < self.height
    }

    /// Returns `None` for out-of-range coordinates.
    pub fn tile_at(&self, x: i32, y: i32) -> Option<Tile> {
        let tile = Tile::new(x, y);
        self.contains(tile).then_some(tile)
    }

    /// Convert a tile to its row-major index
    pub fn index(&self, tile: Tile) -> Option<usize> {
        if self.contains(tile) {
            Some(tile.y as usize * self.width as usize + tile.x as usize)
        } else {
            None
        }
    }

    /// Convert a row-major index back to a tile
    /// Every tile, row by row from the bottom-left corner.
    pub fn tiles(&self) -> impl Iterator<Item = Tile> + '_ {
        (0..self.height as i32)
            .flat_map(move |y| (0..self.width as i32).map(move |x| Tile::new(x, y)))
    }

    /// In-range neighbors (8-connectivity)
    pub fn moore_neighbors(&self, tile: Tile) -> impl Iterator<Item = Tile> + '_ {
        tile.moore_neighbors().filter(move |t| self.contains(*t))
    }

    pub fn center(&self) -> Tile {
        Tile::new((self.width / 2) as i32, (self.height / 2) as i32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tile_grid() {
        let grid = TileGrid::new(10, 5);

        assert_eq!(grid.width(), 10);
        assert_eq!(grid.height(), 5);
        assert_eq!(grid.tile_count(), 50);
        assert_eq!(grid.tiles().count(), 50);
    }

    #[test]
    fn test_tile_lookup_out_of_range() {
        let grid = TileGrid::new(3, 3);

        assert_eq!(grid.tile_at(2, 2), Some(Tile::new(2, 2)));
        assert_eq!(grid.tile_at(3, 0), None);
        assert_eq!(grid.tile_at(0, 3), None);
        assert_eq!(grid.tile_at(-1, 1), None);
    }

    #[test]
    fn test_index_conversion() {
        let grid = TileGrid::new(10, 5);

        let tile = Tile::new(3, 2);
        let index = grid.index(tile).unwrap();
        assert_eq!(index, 23); // 2 * 10 + 3
        assert_eq!(grid.index(Tile::new(10, 0)), None);
    }

    #[test]
    fn test_moore_neighbors() {
        let grid = TileGrid::new(10, 5);

        // Corner tile
        assert_eq!(grid.moore_neighbors(Tile::new(0, 0)).count(), 3);
        // Edge tile
        assert_eq!(grid.moore_neighbors(Tile::new(5, 0)).count(), 5);
        // Middle tile
        assert_eq!(grid.moore_neighbors(Tile::new(5, 2)).count(), 8);
    }

    #[test]
    fn test_distances() {
        let a = Tile::new(0, 0);
        let b = Tile::new(3, 4);

        assert_eq!(a.manhattan(b), 7);
        assert!((a.euclidean(b) - 5.0).abs() < 1e-12);
        assert!(a.is_adjacent(Tile::new(1, 1)));
        assert!(!a.is_adjacent(a));
        assert!(!a.is_adjacent(Tile::new(2, 0)));
    }
}
