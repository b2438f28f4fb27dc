pub mod character;
pub mod engine;
pub mod events;
pub mod job;
pub mod pathfinding;
pub mod rng;
pub mod scenario;
pub mod structure;
pub mod tile;
pub mod world;

pub use character::{Character, CharacterId, CharacterState};
pub use engine::{Engine, EngineBuilder, EngineSettings, RunSummary, TickReport};
pub use job::{Job, JobId, JobOutcome, JobState};
pub use pathfinding::{AStar, Heuristic, Path, TileGraph};
pub use scenario::{Scenario, ScenarioLoader};
pub use structure::{Blueprint, BlueprintRegistry, Structure, StructureType};
pub use tile::Tile;
pub use world::{JobOrder, World, WorldConfig, WorldError};
