//! Pathfinding - walkability graph and A* search

mod astar;
mod graph;

pub use astar::{AStar, Heuristic, Path};
pub use graph::{is_walkable, tile_cost, Edge, Node, TileGraph};
