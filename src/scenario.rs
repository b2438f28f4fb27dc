use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rand::seq::SliceRandom;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::{
    engine::{System, SystemContext},
    rng::{RngManager, RngStream},
    structure::{BlueprintRegistry, StructureType},
    tile::Tile,
    world::{World, WorldConfig, WorldError},
};

fn default_dt() -> f64 {
    1.0 / 60.0
}

fn default_character_count() -> u32 {
    1
}

fn default_speed() -> f64 {
    10.0
}

fn default_build_speed() -> f64 {
    10.0
}

fn default_extent() -> u32 {
    1
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    pub name: String,
    pub description: Option<String>,
    pub seed: u64,
    #[serde(default = "default_dt")]
    pub dt: f64,
    #[serde(default)]
    pub ticks: Option<u64>,
    #[serde(default)]
    pub world: WorldConfig,
    #[serde(default)]
    pub characters: CharacterSpec,
    #[serde(default)]
    pub blueprints: BTreeMap<StructureType, BlueprintOverride>,
    #[serde(default)]
    pub prebuilt: Vec<Area>,
    #[serde(default)]
    pub orders: Vec<Order>,
    #[serde(default)]
    pub logging: LoggingSpec,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CharacterSpec {
    #[serde(default = "default_character_count")]
    pub count: u32,
    #[serde(default = "default_speed")]
    pub speed: f64,
    #[serde(default = "default_build_speed")]
    pub build_speed: f64,
}

impl Default for CharacterSpec {
    fn default() -> Self {
        Self {
            count: default_character_count(),
            speed: default_speed(),
            build_speed: default_build_speed(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BlueprintOverride {
    pub movement_speed: Option<f64>,
    pub build_time: Option<f64>,
    pub connected_texture: Option<bool>,
}

/// Axis-aligned rectangle of one structure kind, `x`/`y` being its lowest
/// corner.
#[derive(Debug, Clone, Deserialize)]
pub struct Area {
    pub kind: StructureType,
    pub x: i32,
    pub y: i32,
    #[serde(default = "default_extent")]
    pub width: u32,
    #[serde(default = "default_extent")]
    pub height: u32,
}

impl Area {
    /// Row-major, lowest row first.
    pub fn tiles(&self) -> impl Iterator<Item = Tile> + '_ {
        (0..self.height as i32).flat_map(move |dy| {
            (0..self.width as i32).map(move |dx| Tile::new(self.x + dx, self.y + dy))
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Order {
    #[serde(flatten)]
    pub area: Area,
    /// Completed ticks before the order is issued.
    #[serde(default)]
    pub at_tick: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSpec {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingSpec {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

pub struct ScenarioLoader {
    base_dir: PathBuf,
}

impl ScenarioLoader {
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
        }
    }

    pub fn load(&self, file: impl AsRef<Path>) -> Result<Scenario> {
        let path = self.base_dir.join(file);
        let data = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read scenario file {}", path.display()))?;
        let scenario: Scenario = serde_yaml::from_str(&data)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        scenario
            .validate()
            .with_context(|| format!("Invalid scenario {}", path.display()))?;
        Ok(scenario)
    }
}

impl Scenario {
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.world.width > 0 && self.world.height > 0,
            "world must be at least 1x1, got {}x{}",
            self.world.width,
            self.world.height
        );
        anyhow::ensure!(
            self.dt.is_finite() && self.dt > 0.0,
            "dt must be positive, got {}",
            self.dt
        );
        anyhow::ensure!(
            self.characters.speed >= 0.0 && self.characters.build_speed >= 0.0,
            "character speeds must not be negative"
        );
        Ok(())
    }

    pub fn blueprint_registry(&self) -> BlueprintRegistry {
        let mut registry = BlueprintRegistry::default();
        for (kind, changes) in &self.blueprints {
            let Some(blueprint) = registry.get_mut(*kind) else {
                continue;
            };
            if let Some(speed) = changes.movement_speed {
                blueprint.movement_speed = speed;
            }
            if let Some(build_time) = changes.build_time {
                blueprint.build_time = build_time.max(0.0);
            }
            if let Some(connected) = changes.connected_texture {
                blueprint.connected_texture = connected;
            }
        }
        registry
    }

    /// Lays out the prebuilt structures and spawns the characters on randomly
    /// chosen walkable tiles. Orders are left to [`OrderSystem`].
    pub fn build_world(&self) -> Result<World> {
        let mut world = World::with_blueprints(self.world.clone(), self.blueprint_registry());
        for area in &self.prebuilt {
            for tile in area.tiles() {
                world
                    .place_prebuilt(tile, area.kind)
                    .with_context(|| format!("Failed to place prebuilt {} at {}", area.kind, tile))?;
            }
        }

        let mut rng = RngManager::new(self.seed);
        let mut spawn = rng.stream("spawn");
        let walkable: Vec<Tile> = world.graph().nodes().map(|node| node.tile).collect();
        for _ in 0..self.characters.count {
            let tile = walkable
                .choose(&mut spawn)
                .copied()
                .unwrap_or_else(|| world.grid().center());
            world
                .spawn_character(tile, self.characters.speed, self.characters.build_speed)
                .with_context(|| format!("Failed to spawn character at {tile}"))?;
        }

        info!(
            scenario = %self.name,
            structures = world.summary().structures.values().sum::<usize>(),
            characters = world.characters().len(),
            "scenario_loaded"
        );
        Ok(world)
    }

    pub fn order_system(&self) -> OrderSystem {
        OrderSystem::new(self.orders.clone())
    }

    pub fn ticks(&self, override_ticks: Option<u64>) -> u64 {
        override_ticks.or(self.ticks).unwrap_or(600)
    }

    pub fn dt(&self, override_dt: Option<f64>) -> f64 {
        override_dt.unwrap_or(self.dt)
    }
}

/// Issues scheduled build orders as jobs once their tick comes up.
pub struct OrderSystem {
    /// Sorted by `at_tick`, latest first, so due orders pop off the end.
    pending: Vec<Order>,
    issued: usize,
    skipped: usize,
}

impl OrderSystem {
    pub fn new(mut orders: Vec<Order>) -> Self {
        orders.reverse();
        orders.sort_by(|a, b| b.at_tick.cmp(&a.at_tick));
        Self {
            pending: orders,
            issued: 0,
            skipped: 0,
        }
    }

    pub fn issued(&self) -> usize {
        self.issued
    }

    pub fn skipped(&self) -> usize {
        self.skipped
    }

    pub fn remaining(&self) -> usize {
        self.pending.len()
    }

    fn issue(&mut self, world: &mut World, area: &Area) {
        for tile in area.tiles() {
            match world.create_job(tile, area.kind) {
                Ok(_) => self.issued += 1,
                Err(err @ (WorldError::OutOfBounds { .. }
                | WorldError::InvalidPlacement { .. }
                | WorldError::JobAlreadyQueued(_))) => {
                    self.skipped += 1;
                    debug!(tile = %tile, kind = %area.kind, reason = %err, "order_skipped");
                }
                Err(err) => {
                    self.skipped += 1;
                    warn!(tile = %tile, kind = %area.kind, error = %err, "order_failed");
                }
            }
        }
    }
}

impl System for OrderSystem {
    fn name(&self) -> &str {
        "orders"
    }

    fn run(
        &mut self,
        ctx: &SystemContext,
        world: &mut World,
        _rng: &mut RngStream<'_>,
    ) -> Result<()> {
        while self
            .pending
            .last()
            .is_some_and(|order| order.at_tick <= ctx.tick)
        {
            let Some(order) = self.pending.pop() else {
                break;
            };
            self.issue(world, &order.area);
            info!(
                tick = ctx.tick,
                kind = %order.area.kind,
                issued = self.issued,
                skipped = self.skipped,
                "orders_issued"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
name: minimal
seed: 3
"#;

    #[test]
    fn test_defaults() {
        let scenario: Scenario = serde_yaml::from_str(MINIMAL).unwrap();
        assert_eq!(scenario.world.width, 32);
        assert_eq!(scenario.world.height, 32);
        assert_eq!(scenario.characters.count, 1);
        assert_eq!(scenario.characters.speed, 10.0);
        assert_eq!(scenario.ticks(None), 600);
        assert_eq!(scenario.ticks(Some(5)), 5);
        assert!((scenario.dt(None) - 1.0 / 60.0).abs() < 1e-12);
        assert_eq!(scenario.logging.level, "info");
        scenario.validate().unwrap();
    }

    #[test]
    fn test_blueprint_overrides() {
        let scenario: Scenario = serde_yaml::from_str(
            r#"
name: fast
seed: 1
blueprints:
  wall:
    build_time: 2.5
  floor:
    movement_speed: 0.9
"#,
        )
        .unwrap();
        let registry = scenario.blueprint_registry();
        let wall = registry.get(StructureType::Wall).unwrap();
        assert_eq!(wall.build_time, 2.5);
        assert!(wall.connected_texture);
        assert_eq!(
            registry.get(StructureType::Floor).unwrap().movement_speed,
            0.9
        );
    }

    #[test]
    fn test_area_tiles_are_row_major() {
        let area = Area {
            kind: StructureType::Floor,
            x: 1,
            y: 2,
            width: 2,
            height: 2,
        };
        let tiles: Vec<Tile> = area.tiles().collect();
        assert_eq!(
            tiles,
            vec![
                Tile::new(1, 2),
                Tile::new(2, 2),
                Tile::new(1, 3),
                Tile::new(2, 3)
            ]
        );
    }

    #[test]
    fn test_characters_spawn_on_prebuilt_floor() {
        let scenario: Scenario = serde_yaml::from_str(
            r#"
name: spawn
seed: 11
world: { width: 8, height: 8 }
characters: { count: 3 }
prebuilt:
  - { kind: floor, x: 2, y: 2, width: 2, height: 2 }
"#,
        )
        .unwrap();
        let world = scenario.build_world().unwrap();
        assert_eq!(world.characters().len(), 3);
        for character in world.characters() {
            assert!(world.graph().contains(character.current_tile()));
        }

        let again = scenario.build_world().unwrap();
        let tiles = |world: &World| -> Vec<Tile> {
            world.characters().iter().map(|c| c.current_tile()).collect()
        };
        assert_eq!(tiles(&world), tiles(&again));
    }

    #[test]
    fn test_spawn_falls_back_to_center() {
        let world = serde_yaml::from_str::<Scenario>(
            "name: bare\nseed: 1\nworld: { width: 6, height: 4 }\n",
        )
        .unwrap()
        .build_world()
        .unwrap();
        assert_eq!(world.characters()[0].current_tile(), Tile::new(3, 2));
    }

    #[test]
    fn test_invalid_prebuilt_is_an_error() {
        let scenario: Scenario = serde_yaml::from_str(
            r#"
name: broken
seed: 1
prebuilt:
  - { kind: wall, x: 0, y: 0 }
"#,
        )
        .unwrap();
        let err = scenario.build_world().unwrap_err();
        assert!(format!("{err:#}").contains("wall"));
    }

    #[test]
    fn test_order_system_issues_when_due() {
        let scenario: Scenario = serde_yaml::from_str(
            r#"
name: orders
seed: 1
world: { width: 4, height: 4 }
orders:
  - { kind: floor, x: 0, y: 0, width: 2 }
  - { kind: wall, x: 3, y: 3, at_tick: 2 }
  - { kind: floor, x: 3, y: 3, at_tick: 1 }
"#,
        )
        .unwrap();
        let mut world = World::new(scenario.world.clone());
        let mut system = scenario.order_system();
        let mut rng = RngManager::new(1);

        for tick in 0..3 {
            let ctx = SystemContext {
                tick,
                dt: 0.1,
                scenario_name: "orders",
            };
            system
                .run(&ctx, &mut world, &mut rng.stream("orders"))
                .unwrap();
        }

        assert_eq!(system.remaining(), 0);
        assert_eq!(system.issued(), 3);
        // The wall is refused: the tile already has a job.
        assert_eq!(system.skipped(), 1);
        assert_eq!(world.job_count(), 3);
    }
}
