//! Characters: agents that walk to job sites and work on them

use std::fmt;

use serde::Serialize;

use crate::job::JobId;
use crate::pathfinding::Path;
use crate::tile::Tile;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct CharacterId(u32);

impl CharacterId {
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for CharacterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "character#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CharacterState {
    Idle,
    Traveling,
    Working,
    /// Has a job but no way to reach it; the world must plan a new route.
    Stalled,
}

/// What a character did during one update, for the world to act on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CharacterAction {
    Idle,
    Moved,
    Arrived(Tile),
    Work(f64),
    NeedsPath,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Assignment {
    pub job: JobId,
    pub tile: Tile,
}

#[derive(Debug, Clone)]
pub struct Character {
    id: CharacterId,
    current_tile: Tile,
    destination_tile: Option<Tile>,
    movement_percentage: f64,
    speed: f64,
    build_speed: f64,
    assignment: Option<Assignment>,
    /// Remaining waypoints, next one last.
    path: Vec<Tile>,
    route_epoch: u64,
}

impl Character {
    pub fn new(id: CharacterId, tile: Tile, speed: f64, build_speed: f64) -> Self {
        Self {
            id,
            current_tile: tile,
            destination_tile: None,
            movement_percentage: 0.0,
            speed,
            build_speed,
            assignment: None,
            path: Vec::new(),
            route_epoch: 0,
        }
    }

    pub fn id(&self) -> CharacterId {
        self.id
    }

    pub fn current_tile(&self) -> Tile {
        self.current_tile
    }

    pub fn destination_tile(&self) -> Option<Tile> {
        self.destination_tile
    }

    pub fn movement_percentage(&self) -> f64 {
        self.movement_percentage
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn build_speed(&self) -> f64 {
        self.build_speed
    }

    pub fn assignment(&self) -> Option<Assignment> {
        self.assignment
    }

    pub fn job(&self) -> Option<JobId> {
        self.assignment.map(|a| a.job)
    }

    pub fn path(&self) -> &[Tile] {
        &self.path
    }

    pub fn route_epoch(&self) -> u64 {
        self.route_epoch
    }

    pub fn is_idle(&self) -> bool {
        self.assignment.is_none()
    }

    /// True while walking from `current_tile` toward another tile.
    pub fn is_between_tiles(&self) -> bool {
        matches!(self.destination_tile, Some(dest) if dest != self.current_tile)
    }

    /// Standing exactly on `current_tile`.
    pub fn is_at_rest(&self) -> bool {
        self.movement_percentage == 0.0
    }

    pub fn state(&self) -> CharacterState {
        match self.assignment {
            None => CharacterState::Idle,
            Some(a) if a.tile == self.current_tile => CharacterState::Working,
            Some(_) if self.path.is_empty() && !self.is_between_tiles() => {
                CharacterState::Stalled
            }
            Some(_) => CharacterState::Traveling,
        }
    }

    /// Interpolated world position.
    pub fn position(&self) -> (f64, f64) {
        let from = self.current_tile;
        let to = self.destination_tile.unwrap_or(from);
        let t = self.movement_percentage;
        (
            lerp(f64::from(from.x), f64::from(to.x), t),
            lerp(f64::from(from.y), f64::from(to.y), t),
        )
    }

    pub fn assign_job(&mut self, job: JobId, tile: Tile, route: Path, epoch: u64) {
        self.assignment = Some(Assignment { job, tile });
        self.set_route(route, epoch);
    }

    /// Replaces the remaining route. Only valid while at rest.
    pub fn set_route(&mut self, route: Path, epoch: u64) {
        self.path = route.into_waypoints();
        self.destination_tile = None;
        self.movement_percentage = 0.0;
        self.route_epoch = epoch;
    }

    /// Drops the current job. A step already under way is still finished; a
    /// waypoint that was only picked is forgotten.
    pub fn clear_job(&mut self) -> Option<Assignment> {
        self.path.clear();
        if self.is_at_rest() {
            self.destination_tile = None;
        }
        self.assignment.take()
    }

    pub fn update(&mut self, dt: f64) -> CharacterAction {
        let Some(assignment) = self.assignment else {
            return if self.is_between_tiles() {
                self.step(dt)
            } else {
                CharacterAction::Idle
            };
        };

        if self.current_tile == assignment.tile && !self.is_between_tiles() {
            self.destination_tile = None;
            return CharacterAction::Work(self.build_speed * dt);
        }

        if !self.is_between_tiles() {
            loop {
                match self.path.pop() {
                    Some(next) if next == self.current_tile => continue,
                    Some(next) => {
                        self.destination_tile = Some(next);
                        break;
                    }
                    None => {
                        self.destination_tile = None;
                        return CharacterAction::NeedsPath;
                    }
                }
            }
        }

        self.step(dt)
    }

    fn step(&mut self, dt: f64) -> CharacterAction {
        let Some(destination) = self.destination_tile else {
            return CharacterAction::Idle;
        };
        let distance = self.current_tile.euclidean(destination);
        if distance > 0.0 {
            self.movement_percentage += (self.speed * dt) / distance;
        } else {
            self.movement_percentage = 1.0;
        }

        if self.movement_percentage < 1.0 {
            return CharacterAction::Moved;
        }

        self.current_tile = destination;
        self.movement_percentage = 0.0;
        self.destination_tile = self.path.pop();
        CharacterAction::Arrived(destination)
    }
}

fn lerp(from: f64, to: f64, t: f64) -> f64 {
    t * to + (1.0 - t) * from
}
