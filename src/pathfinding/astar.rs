use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

use serde::{Deserialize, Serialize};

use super::graph::TileGraph;
use crate::tile::Tile;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Heuristic {
    /// `|dx| + |dy|`. Not admissible once diagonal steps cost less than one,
    /// so paths may be suboptimal.
    #[default]
    Manhattan,
    /// Always zero: plain Dijkstra, optimal but explores more.
    Zero,
}

impl Heuristic {
    pub fn estimate(self, from: Tile, goal: Tile) -> f64 {
        match self {
            Heuristic::Manhattan => f64::from(from.manhattan(goal)),
            Heuristic::Zero => 0.0,
        }
    }
}

/// Tiles from the goal back to the start. Consumers pop from the end to get
/// the next step.
#[derive(Debug, Clone, PartialEq)]
pub struct Path {
    tiles: Vec<Tile>,
    cost: f64,
}

impl Path {
    fn single(tile: Tile) -> Self {
        Self {
            tiles: vec![tile],
            cost: 0.0,
        }
    }

    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    pub fn goal(&self) -> Tile {
        self.tiles[0]
    }

    pub fn start(&self) -> Tile {
        self.tiles[self.tiles.len() - 1]
    }

    /// Summed edge cost of the walkable portion of the path.
    pub fn cost(&self) -> f64 {
        self.cost
    }

    /// Number of tiles, start and goal included. Never zero.
    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    /// Start to goal.
    pub fn forward(&self) -> impl Iterator<Item = Tile> + '_ {
        self.tiles.iter().rev().copied()
    }

    /// The stack of tiles still to visit once standing on the start tile.
    pub fn into_waypoints(mut self) -> Vec<Tile> {
        self.tiles.pop();
        self.tiles
    }
}

#[derive(Debug, Clone, Copy)]
struct OpenEntry {
    f_score: f64,
    sequence: u64,
    tile: Tile,
}

impl PartialEq for OpenEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for OpenEntry {}

impl PartialOrd for OpenEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OpenEntry {
    // Reversed so the max-heap pops the lowest f-score, oldest entry first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .f_score
            .total_cmp(&self.f_score)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

/// A* search over a [`TileGraph`] snapshot.
pub struct AStar<'g> {
    graph: &'g TileGraph,
    heuristic: Heuristic,
}

impl<'g> AStar<'g> {
    pub fn new(graph: &'g TileGraph) -> Self {
        Self {
            graph,
            heuristic: Heuristic::default(),
        }
    }

    pub fn with_heuristic(mut self, heuristic: Heuristic) -> Self {
        self.heuristic = heuristic;
        self
    }

    /// Path between two walkable tiles, or `None` when either tile is not in
    /// the graph or no route connects them.
    pub fn search(&self, start: Tile, goal: Tile) -> Option<Path> {
        if !self.graph.contains(start) || !self.graph.contains(goal) {
            return None;
        }
        self.run(&[start], &[goal], goal)
    }

    /// Like [`AStar::search`], but a start or goal that is not walkable is
    /// left or entered through its walkable neighbors. Adjacent endpoints are
    /// always one step apart.
    pub fn search_reaching(&self, start: Tile, goal: Tile) -> Option<Path> {
        if start == goal {
            return Some(Path::single(start));
        }
        let start_walkable = self.graph.contains(start);
        let goal_walkable = self.graph.contains(goal);
        if start_walkable && goal_walkable {
            return self.search(start, goal);
        }
        if start.is_adjacent(goal) {
            return Some(Path {
                tiles: vec![goal, start],
                cost: 0.0,
            });
        }

        let sources = self.entry_tiles(start, start_walkable);
        let targets = self.entry_tiles(goal, goal_walkable);
        if sources.is_empty() || targets.is_empty() {
            return None;
        }

        let mut path = self.run(&sources, &targets, goal)?;
        if !goal_walkable {
            path.tiles.insert(0, goal);
        }
        if !start_walkable {
            path.tiles.push(start);
        }
        Some(path)
    }

    fn entry_tiles(&self, tile: Tile, walkable: bool) -> Vec<Tile> {
        if walkable {
            vec![tile]
        } else {
            tile.moore_neighbors()
                .filter(|neighbor| self.graph.contains(*neighbor))
                .collect()
        }
    }

    fn run(&self, sources: &[Tile], targets: &[Tile], goal: Tile) -> Option<Path> {
        let mut open_set = BinaryHeap::new();
        let mut sequence = 0_u64;
        let mut came_from: HashMap<Tile, Tile> = HashMap::new();
        let mut g_score: HashMap<Tile, f64> = HashMap::new();

        for &source in sources {
            g_score.insert(source, 0.0);
            open_set.push(OpenEntry {
                f_score: self.heuristic.estimate(source, goal),
                sequence,
                tile: source,
            });
            sequence += 1;
        }

        while let Some(OpenEntry {
            f_score,
            tile: current,
            ..
        }) = open_set.pop()
        {
            let current_g = g_score.get(&current).copied().unwrap_or(f64::INFINITY);
            if f_score > current_g + self.heuristic.estimate(current, goal) {
                // Superseded by a cheaper entry for the same tile.
                continue;
            }

            if targets.contains(&current) {
                return Some(Self::reconstruct_path(&came_from, current, current_g));
            }

            for edge in self.graph.edges(current) {
                let tentative = current_g + edge.cost;
                let known = g_score.get(&edge.to).copied().unwrap_or(f64::INFINITY);
                if tentative < known {
                    came_from.insert(edge.to, current);
                    g_score.insert(edge.to, tentative);
                    open_set.push(OpenEntry {
                        f_score: tentative + self.heuristic.estimate(edge.to, goal),
                        sequence,
                        tile: edge.to,
                    });
                    sequence += 1;
                }
            }
        }

        None
    }

    fn reconstruct_path(came_from: &HashMap<Tile, Tile>, end: Tile, cost: f64) -> Path {
        let mut tiles = vec![end];
        let mut current = end;
        while let Some(&previous) = came_from.get(&current) {
            tiles.push(previous);
            current = previous;
        }
        Path { tiles, cost }
    }
}
