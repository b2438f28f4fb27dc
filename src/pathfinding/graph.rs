use std::collections::BTreeMap;

use tracing::debug;

use crate::structure::Structure;
use crate::tile::Tile;
use crate::world::World;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Edge {
    pub to: Tile,
    pub cost: f64,
}

/// A walkable tile and its outgoing edges, in Moore-neighborhood order.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub tile: Tile,
    /// Traversal cost of this tile alone, clamped at zero.
    pub tile_cost: f64,
    pub edges: Vec<Edge>,
}

impl Node {
    pub fn edge_to(&self, tile: Tile) -> Option<&Edge> {
        self.edges.iter().find(|edge| edge.to == tile)
    }
}

/// Walkability graph derived from the structures in a [`World`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TileGraph {
    nodes: BTreeMap<Tile, Node>,
}

/// A tile is walkable when something is built on it and nothing there blocks
/// movement.
pub fn is_walkable(structures: &[Structure]) -> bool {
    !structures.is_empty() && !structures.iter().any(Structure::is_impassable)
}

/// `1 - Σ movement_speed`, never below zero so A* keeps non-negative weights.
pub fn tile_cost(structures: &[Structure]) -> f64 {
    let speed: f64 = structures.iter().map(|s| s.movement_speed).sum();
    (1.0 - speed).max(0.0)
}

/// Operands are ordered first so both directions of an edge compute the
/// exact same value.
fn edge_cost(a: f64, b: f64) -> f64 {
    let (low, high) = if a <= b { (a, b) } else { (b, a) };
    (low + high) / 2.0
}

impl TileGraph {
    /// Full rebuild from the world's current structures.
    pub fn build(world: &World) -> Self {
        let mut graph = Self::default();
        for tile in world.tiles() {
            graph.refresh_node(world, tile);
        }
        let tiles: Vec<Tile> = graph.nodes.keys().copied().collect();
        for tile in tiles {
            graph.refresh_edges(tile);
        }
        graph.debug_assert_symmetric();
        debug!(
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            "tile_graph_built"
        );
        graph
    }

    /// Recomputes `tile` and the edges of its 3x3 neighborhood after the
    /// structures on `tile` changed. Equivalent to a full rebuild.
    pub fn refresh_around(&mut self, world: &World, tile: Tile) {
        self.refresh_node(world, tile);
        self.refresh_edges(tile);
        for neighbor in tile.moore_neighbors() {
            self.refresh_edges(neighbor);
        }
        self.debug_assert_symmetric();
    }

    fn debug_assert_symmetric(&self) {
        if cfg!(debug_assertions) {
            for node in self.nodes.values() {
                for edge in &node.edges {
                    debug_assert_eq!(
                        self.cost(edge.to, node.tile),
                        Some(edge.cost),
                        "asymmetric edge {} -> {}",
                        node.tile,
                        edge.to
                    );
                }
            }
        }
    }

    fn refresh_node(&mut self, world: &World, tile: Tile) {
        let structures = world.structures_at(tile);
        if is_walkable(structures) {
            let tile_cost = tile_cost(structures);
            self.nodes
                .entry(tile)
                .and_modify(|node| node.tile_cost = tile_cost)
                .or_insert_with(|| Node {
                    tile,
                    tile_cost,
                    edges: Vec::new(),
                });
        } else {
            self.nodes.remove(&tile);
        }
    }

    fn refresh_edges(&mut self, tile: Tile) {
        let Some(source_cost) = self.nodes.get(&tile).map(|node| node.tile_cost) else {
            return;
        };
        let edges: Vec<Edge> = tile
            .moore_neighbors()
            .filter_map(|to| {
                self.nodes.get(&to).map(|neighbor| Edge {
                    to,
                    cost: edge_cost(source_cost, neighbor.tile_cost),
                })
            })
            .collect();
        if let Some(node) = self.nodes.get_mut(&tile) {
            node.edges = edges;
        }
    }

    pub fn contains(&self, tile: Tile) -> bool {
        self.nodes.contains_key(&tile)
    }

    pub fn node(&self, tile: Tile) -> Option<&Node> {
        self.nodes.get(&tile)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn edges(&self, tile: Tile) -> &[Edge] {
        self.nodes
            .get(&tile)
            .map(|node| node.edges.as_slice())
            .unwrap_or(&[])
    }

    pub fn cost(&self, from: Tile, to: Tile) -> Option<f64> {
        self.nodes
            .get(&from)
            .and_then(|node| node.edge_to(to))
            .map(|edge| edge.cost)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.nodes.values().map(|node| node.edges.len()).sum()
    }
}
