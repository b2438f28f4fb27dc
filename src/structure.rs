//! Structures, their blueprints and placement rules

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::tile::Tile;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StructureType {
    Floor,
    Wall,
}

impl StructureType {
    pub const ALL: [StructureType; 2] = [StructureType::Floor, StructureType::Wall];

    pub fn name(self) -> &'static str {
        match self {
            StructureType::Floor => "floor",
            StructureType::Wall => "wall",
        }
    }
}

impl fmt::Display for StructureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown structure type '{0}'")]
pub struct UnknownStructureType(pub String);

impl FromStr for StructureType {
    type Err = UnknownStructureType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StructureType::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownStructureType(s.to_string()))
    }
}

/// What must already be on a tile before a blueprint can be placed there.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Placement {
    /// The tile must hold no structures at all.
    Empty,
    /// Every listed type must already be present.
    Requires(Vec<StructureType>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PlacementError {
    #[error("tile is not empty")]
    TileOccupied,
    #[error("a {0} already occupies the tile")]
    DuplicateType(StructureType),
    #[error("requires a {0} underneath")]
    MissingPrerequisite(StructureType),
}

/// A built object occupying one tile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Structure {
    pub kind: StructureType,
    /// Movement multiplier. `0.0` makes the tile impassable.
    pub movement_speed: f64,
    pub connected_texture: bool,
    pub build_time: f64,
    pub tile: Tile,
}

impl Structure {
    pub fn is_impassable(&self) -> bool {
        self.movement_speed == 0.0
    }
}

/// Prototype used to validate and instantiate structures.
#[derive(Debug, Clone, PartialEq)]
pub struct Blueprint {
    pub kind: StructureType,
    pub movement_speed: f64,
    pub connected_texture: bool,
    pub build_time: f64,
    pub placement: Placement,
}

impl Blueprint {
    pub fn new(kind: StructureType, placement: Placement) -> Self {
        Self {
            kind,
            movement_speed: 0.0,
            connected_texture: false,
            build_time: 10.0,
            placement,
        }
    }

    pub fn with_movement_speed(mut self, movement_speed: f64) -> Self {
        self.movement_speed = movement_speed;
        self
    }

    pub fn with_connected_texture(mut self, connected_texture: bool) -> Self {
        self.connected_texture = connected_texture;
        self
    }

    pub fn with_build_time(mut self, build_time: f64) -> Self {
        self.build_time = build_time.max(0.0);
        self
    }

    /// Checks the placement rule against the structures already on a tile.
    pub fn check_position(&self, structures_at_tile: &[Structure]) -> Result<(), PlacementError> {
        let required = match &self.placement {
            Placement::Empty => {
                return if structures_at_tile.is_empty() {
                    Ok(())
                } else {
                    Err(PlacementError::TileOccupied)
                };
            }
            Placement::Requires(required) => required,
        };

        if structures_at_tile.iter().any(|s| s.kind == self.kind) {
            return Err(PlacementError::DuplicateType(self.kind));
        }

        if let Some(missing) = required
            .iter()
            .find(|kind| !structures_at_tile.iter().any(|s| s.kind == **kind))
        {
            return Err(PlacementError::MissingPrerequisite(*missing));
        }

        Ok(())
    }

    pub fn is_valid_position(&self, structures_at_tile: &[Structure]) -> bool {
        self.check_position(structures_at_tile).is_ok()
    }

    /// Instantiates a structure bound to `tile`. The caller owns inserting it
    /// into the world.
    pub fn build(&self, tile: Tile) -> Structure {
        Structure {
            kind: self.kind,
            movement_speed: self.movement_speed,
            connected_texture: self.connected_texture,
            build_time: self.build_time,
            tile,
        }
    }
}

/// Blueprints keyed by structure type.
#[derive(Debug, Clone, PartialEq)]
pub struct BlueprintRegistry {
    blueprints: BTreeMap<StructureType, Blueprint>,
}

impl BlueprintRegistry {
    pub fn empty() -> Self {
        Self {
            blueprints: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, blueprint: Blueprint) -> Option<Blueprint> {
        self.blueprints.insert(blueprint.kind, blueprint)
    }

    pub fn get(&self, kind: StructureType) -> Option<&Blueprint> {
        self.blueprints.get(&kind)
    }

    pub fn get_mut(&mut self, kind: StructureType) -> Option<&mut Blueprint> {
        self.blueprints.get_mut(&kind)
    }
}

impl Default for BlueprintRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.insert(
            Blueprint::new(StructureType::Floor, Placement::Empty)
                .with_movement_speed(0.5)
                .with_build_time(10.0),
        );
        registry.insert(
            Blueprint::new(
                StructureType::Wall,
                Placement::Requires(vec![StructureType::Floor]),
            )
            .with_movement_speed(0.0)
            .with_connected_texture(true)
            .with_build_time(20.0),
        );
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn floor_at(tile: Tile) -> Structure {
        BlueprintRegistry::default()
            .get(StructureType::Floor)
            .unwrap()
            .build(tile)
    }

    #[test]
    fn test_parse_structure_type() {
        assert_eq!("floor".parse::<StructureType>(), Ok(StructureType::Floor));
        assert_eq!(" Wall ".parse::<StructureType>(), Ok(StructureType::Wall));
        assert!("door".parse::<StructureType>().is_err());
        assert_eq!(StructureType::Wall.to_string(), "wall");
    }

    #[test]
    fn test_empty_rule() {
        let registry = BlueprintRegistry::default();
        let floor = registry.get(StructureType::Floor).unwrap();
        let tile = Tile::new(1, 1);

        assert!(floor.is_valid_position(&[]));
        assert_eq!(
            floor.check_position(&[floor_at(tile)]),
            Err(PlacementError::TileOccupied)
        );
    }

    #[test]
    fn test_required_underlying_type() {
        let registry = BlueprintRegistry::default();
        let wall = registry.get(StructureType::Wall).unwrap();
        let tile = Tile::new(0, 0);

        assert_eq!(
            wall.check_position(&[]),
            Err(PlacementError::MissingPrerequisite(StructureType::Floor))
        );
        assert!(wall.is_valid_position(&[floor_at(tile)]));

        let stack = vec![floor_at(tile), wall.build(tile)];
        assert_eq!(
            wall.check_position(&stack),
            Err(PlacementError::DuplicateType(StructureType::Wall))
        );
    }

    #[test]
    fn test_requires_nothing_still_rejects_duplicates() {
        let blueprint = Blueprint::new(StructureType::Floor, Placement::Requires(Vec::new()));
        let tile = Tile::new(2, 3);

        assert!(blueprint.is_valid_position(&[]));
        assert!(!blueprint.is_valid_position(&[blueprint.build(tile)]));
    }

    #[test]
    fn test_build_copies_blueprint() {
        let registry = BlueprintRegistry::default();
        let wall = registry.get(StructureType::Wall).unwrap();
        let structure = wall.build(Tile::new(4, 5));

        assert_eq!(structure.kind, StructureType::Wall);
        assert_eq!(structure.tile, Tile::new(4, 5));
        assert!(structure.connected_texture);
        assert!(structure.is_impassable());
        assert_eq!(structure.build_time, wall.build_time);
    }
}
