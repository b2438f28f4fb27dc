use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::character::{Character, CharacterAction, CharacterId, CharacterState};
use crate::events::{EventChannel, SubscriptionId};
use crate::job::{Job, JobId, JobOutcome, JobState};
use crate::pathfinding::{AStar, Heuristic, Path, TileGraph};
use crate::structure::{BlueprintRegistry, PlacementError, Structure, StructureType};
use crate::tile::{Tile, TileGrid};

fn default_width() -> u32 {
    32
}

fn default_height() -> u32 {
    32
}

/// Which end of the job queue idle characters take from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobOrder {
    /// Most recently queued job first.
    #[default]
    Lifo,
    Fifo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldConfig {
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default)]
    pub job_order: JobOrder,
    #[serde(default)]
    pub heuristic: Heuristic,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            job_order: JobOrder::default(),
            heuristic: Heuristic::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum WorldError {
    #[error("tile ({x}, {y}) is outside the world")]
    OutOfBounds { x: i32, y: i32 },
    #[error("no blueprint registered for {0}")]
    UnknownBlueprint(StructureType),
    #[error("cannot place {kind} at {tile}: {reason}")]
    InvalidPlacement {
        kind: StructureType,
        tile: Tile,
        #[source]
        reason: PlacementError,
    },
    #[error("a job already targets {0}")]
    JobAlreadyQueued(Tile),
    #[error("unknown {0}")]
    UnknownJob(JobId),
}

enum WorldEvent {
    StructureChanged { tile: Tile, layer: usize },
    JobCreated(JobId),
    JobCompleted(Job),
    JobCanceled(Job),
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CharacterSnapshot {
    pub id: u32,
    pub x: f64,
    pub y: f64,
    pub state: String,
    pub job: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WorldSummary {
    pub tick: u64,
    pub width: u32,
    pub height: u32,
    pub structures: BTreeMap<String, usize>,
    pub walkable_tiles: usize,
    /// Open jobs: queued, assigned and in progress.
    pub jobs_open: usize,
    pub jobs_queued: usize,
    /// Held by a character that has not started working yet.
    pub jobs_assigned: usize,
    /// Held by a character with some work done.
    pub jobs_in_progress: usize,
    pub jobs_completed: u64,
    pub jobs_canceled: u64,
    pub characters: Vec<CharacterSnapshot>,
}

/// Owns the grid, the structures built on it, the job board and the
/// characters working it. Events raised while mutating are queued and
/// delivered once the mutation is complete.
pub struct World {
    grid: TileGrid,
    structures: Vec<Vec<Structure>>,
    blueprints: BlueprintRegistry,
    jobs: BTreeMap<JobId, Job>,
    job_sites: HashMap<Tile, JobId>,
    queue: VecDeque<JobId>,
    job_order: JobOrder,
    heuristic: Heuristic,
    next_job: u64,
    characters: Vec<Character>,
    graph: TileGraph,
    graph_epoch: u64,
    tick: u64,
    jobs_completed: u64,
    jobs_canceled: u64,
    pending_events: VecDeque<WorldEvent>,
    structure_changed: EventChannel<Structure>,
    job_created: EventChannel<Job>,
    job_completed: EventChannel<Job>,
    job_canceled: EventChannel<Job>,
}

impl World {
    pub fn new(config: WorldConfig) -> Self {
        Self::with_blueprints(config, BlueprintRegistry::default())
    }

    pub fn with_blueprints(config: WorldConfig, blueprints: BlueprintRegistry) -> Self {
        let grid = TileGrid::new(config.width, config.height);
        let structures = vec![Vec::new(); grid.tile_count()];
        info!(
            width = config.width,
            height = config.height,
            job_order = ?config.job_order,
            "world_created"
        );
        Self {
            grid,
            structures,
            blueprints,
            jobs: BTreeMap::new(),
            job_sites: HashMap::new(),
            queue: VecDeque::new(),
            job_order: config.job_order,
            heuristic: config.heuristic,
            next_job: 0,
            characters: Vec::new(),
            graph: TileGraph::default(),
            graph_epoch: 0,
            tick: 0,
            jobs_completed: 0,
            jobs_canceled: 0,
            pending_events: VecDeque::new(),
            structure_changed: EventChannel::new("structure_changed"),
            job_created: EventChannel::new("job_created"),
            job_completed: EventChannel::new("job_completed"),
            job_canceled: EventChannel::new("job_canceled"),
        }
    }

    pub fn width(&self) -> u32 {
        self.grid.width()
    }

    pub fn height(&self) -> u32 {
        self.grid.height()
    }

    pub fn grid(&self) -> &TileGrid {
        &self.grid
    }

    pub fn tiles(&self) -> impl Iterator<Item = Tile> + '_ {
        self.grid.tiles()
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Returns `None` for coordinates outside the grid.
    pub fn get_tile_at(&self, x: i32, y: i32) -> Option<Tile> {
        self.grid.tile_at(x, y)
    }

    /// Bottom-most first. Empty for tiles outside the grid.
    pub fn structures_at(&self, tile: Tile) -> &[Structure] {
        self.grid
            .index(tile)
            .map(|index| self.structures[index].as_slice())
            .unwrap_or(&[])
    }

    pub fn blueprints(&self) -> &BlueprintRegistry {
        &self.blueprints
    }

    pub fn graph(&self) -> &TileGraph {
        &self.graph
    }

    /// Bumped every time the graph changes.
    pub fn graph_epoch(&self) -> u64 {
        self.graph_epoch
    }

    pub fn heuristic(&self) -> Heuristic {
        self.heuristic
    }

    pub fn characters(&self) -> &[Character] {
        &self.characters
    }

    pub fn character(&self, id: CharacterId) -> Option<&Character> {
        self.characters.get(id.raw() as usize)
    }

    pub fn job(&self, id: JobId) -> Option<&Job> {
        self.jobs.get(&id)
    }

    pub fn job_mut(&mut self, id: JobId) -> Option<&mut Job> {
        self.jobs.get_mut(&id)
    }

    pub fn job_at(&self, tile: Tile) -> Option<&Job> {
        self.job_sites.get(&tile).and_then(|id| self.jobs.get(id))
    }

    /// Jobs waiting for a character, in the order they will be handed out.
    pub fn queued_jobs(&self) -> Vec<JobId> {
        match self.job_order {
            JobOrder::Lifo => self.queue.iter().rev().copied().collect(),
            JobOrder::Fifo => self.queue.iter().copied().collect(),
        }
    }

    /// Open jobs: queued, assigned or in progress.
    pub fn job_count(&self) -> usize {
        self.jobs.len()
    }

    pub fn jobs_completed(&self) -> u64 {
        self.jobs_completed
    }

    pub fn subscribe_on_structure_changed(
        &mut self,
        callback: impl FnMut(&Structure) + 'static,
    ) -> SubscriptionId {
        self.structure_changed.subscribe(callback)
    }

    pub fn unsubscribe_on_structure_changed(&mut self, id: SubscriptionId) -> bool {
        self.structure_changed.unsubscribe(id)
    }

    pub fn subscribe_on_job_created(&mut self, callback: impl FnMut(&Job) + 'static) -> SubscriptionId {
        self.job_created.subscribe(callback)
    }

    pub fn unsubscribe_on_job_created(&mut self, id: SubscriptionId) -> bool {
        self.job_created.unsubscribe(id)
    }

    pub fn subscribe_on_job_completed(
        &mut self,
        callback: impl FnMut(&Job) + 'static,
    ) -> SubscriptionId {
        self.job_completed.subscribe(callback)
    }

    pub fn unsubscribe_on_job_completed(&mut self, id: SubscriptionId) -> bool {
        self.job_completed.unsubscribe(id)
    }

    pub fn subscribe_on_job_canceled(
        &mut self,
        callback: impl FnMut(&Job) + 'static,
    ) -> SubscriptionId {
        self.job_canceled.subscribe(callback)
    }

    pub fn unsubscribe_on_job_canceled(&mut self, id: SubscriptionId) -> bool {
        self.job_canceled.unsubscribe(id)
    }

    pub fn spawn_character(
        &mut self,
        tile: Tile,
        speed: f64,
        build_speed: f64,
    ) -> Result<CharacterId, WorldError> {
        if !self.grid.contains(tile) {
            return Err(WorldError::OutOfBounds {
                x: tile.x,
                y: tile.y,
            });
        }
        let id = CharacterId::new(self.characters.len() as u32);
        self.characters
            .push(Character::new(id, tile, speed, build_speed));
        debug!(character = %id, tile = %tile, "character_spawned");
        Ok(id)
    }

    pub fn check_structure_position(
        &self,
        kind: StructureType,
        tile: Tile,
    ) -> Result<(), WorldError> {
        let index = self.grid.index(tile).ok_or(WorldError::OutOfBounds {
            x: tile.x,
            y: tile.y,
        })?;
        let blueprint = self
            .blueprints
            .get(kind)
            .ok_or(WorldError::UnknownBlueprint(kind))?;
        blueprint
            .check_position(&self.structures[index])
            .map_err(|reason| WorldError::InvalidPlacement { kind, tile, reason })
    }

    pub fn is_structure_valid_position(&self, kind: StructureType, tile: Tile) -> bool {
        self.check_structure_position(kind, tile).is_ok()
    }

    /// Queues construction of `kind` on `tile`. Declines without side effects
    /// when the tile already has a job or the placement is invalid.
    pub fn create_job(&mut self, tile: Tile, kind: StructureType) -> Result<JobId, WorldError> {
        if self.job_sites.contains_key(&tile) {
            return Err(WorldError::JobAlreadyQueued(tile));
        }
        self.check_structure_position(kind, tile)?;
        let blueprint = self
            .blueprints
            .get(kind)
            .ok_or(WorldError::UnknownBlueprint(kind))?;

        let id = JobId::new(self.next_job);
        self.next_job += 1;
        self.jobs.insert(id, Job::from_blueprint(id, tile, blueprint));
        self.job_sites.insert(tile, id);
        self.queue.push_back(id);
        info!(job = %id, tile = %tile, kind = %kind, "job_created");

        self.pending_events.push_back(WorldEvent::JobCreated(id));
        self.flush_events();
        Ok(id)
    }

    /// Builds the job's structure on its tile and notifies the new structure
    /// and every structure around it.
    pub fn place_structure(&mut self, job: &Job) -> Result<&Structure, WorldError> {
        self.place(job.kind(), job.tile())
    }

    /// Places a structure immediately, without a job. Used to lay out the
    /// starting colony.
    pub fn place_prebuilt(
        &mut self,
        tile: Tile,
        kind: StructureType,
    ) -> Result<&Structure, WorldError> {
        self.place(kind, tile)
    }

    fn place(&mut self, kind: StructureType, tile: Tile) -> Result<&Structure, WorldError> {
        let (index, layer) = self.build_structure(kind, tile)?;
        self.flush_events();
        Ok(&self.structures[index][layer])
    }

    fn build_structure(
        &mut self,
        kind: StructureType,
        tile: Tile,
    ) -> Result<(usize, usize), WorldError> {
        self.check_structure_position(kind, tile)?;
        let (Some(index), Some(blueprint)) = (self.grid.index(tile), self.blueprints.get(kind))
        else {
            return Err(WorldError::UnknownBlueprint(kind));
        };

        self.structures[index].push(blueprint.build(tile));
        let layer = self.structures[index].len() - 1;
        self.pending_events
            .push_back(WorldEvent::StructureChanged { tile, layer });

        let neighbors: Vec<Tile> = self.grid.moore_neighbors(tile).collect();
        for neighbor in neighbors {
            for layer in 0..self.structures_at(neighbor).len() {
                self.pending_events.push_back(WorldEvent::StructureChanged {
                    tile: neighbor,
                    layer,
                });
            }
        }

        let mut graph = std::mem::take(&mut self.graph);
        graph.refresh_around(self, tile);
        self.graph = graph;
        self.graph_epoch += 1;
        debug!(
            tile = %tile,
            kind = %kind,
            epoch = self.graph_epoch,
            nodes = self.graph.node_count(),
            "structure_placed"
        );
        Ok((index, layer))
    }

    /// Removes a queued or in-progress job and frees its character.
    pub fn cancel_job(&mut self, id: JobId) -> Result<(), WorldError> {
        let mut job = self.jobs.remove(&id).ok_or(WorldError::UnknownJob(id))?;
        self.job_sites.remove(&job.tile());
        self.queue.retain(|queued| *queued != id);
        for character in &mut self.characters {
            if character.job() == Some(id) {
                character.clear_job();
            }
        }
        job.cancel();
        self.jobs_canceled += 1;
        info!(job = %id, tile = %job.tile(), "job_canceled");

        self.pending_events.push_back(WorldEvent::JobCanceled(job));
        self.flush_events();
        Ok(())
    }

    /// Route from `start` to `goal` on the current graph. Either end may be a
    /// tile that is not walkable yet, as long as it borders a walkable one.
    pub fn plan_route(&self, start: Tile, goal: Tile) -> Option<Path> {
        AStar::new(&self.graph)
            .with_heuristic(self.heuristic)
            .search_reaching(start, goal)
    }

    /// Advances the simulation by `dt` seconds.
    pub fn update(&mut self, dt: f64) {
        self.tick += 1;
        self.assign_idle_characters();

        let mut finished = Vec::new();
        for index in 0..self.characters.len() {
            self.refresh_stale_route(index);
            match self.characters[index].update(dt) {
                CharacterAction::Work(amount) => {
                    let Some(job_id) = self.characters[index].job() else {
                        continue;
                    };
                    let outcome = match self.jobs.get_mut(&job_id) {
                        Some(job) => job.do_work(amount),
                        None => {
                            self.characters[index].clear_job();
                            continue;
                        }
                    };
                    if outcome == Some(JobOutcome::Completed) {
                        self.characters[index].clear_job();
                        finished.push(job_id);
                    }
                }
                CharacterAction::NeedsPath => self.replan(index),
                CharacterAction::Idle | CharacterAction::Moved | CharacterAction::Arrived(_) => {}
            }
        }

        for job_id in finished {
            self.finish_job(job_id);
        }
        self.flush_events();
    }

    fn pop_job(&mut self) -> Option<JobId> {
        match self.job_order {
            JobOrder::Lifo => self.queue.pop_back(),
            JobOrder::Fifo => self.queue.pop_front(),
        }
    }

    /// Puts a job back so that it is handed out after everything else queued.
    fn requeue(&mut self, id: JobId) {
        match self.job_order {
            JobOrder::Lifo => self.queue.push_front(id),
            JobOrder::Fifo => self.queue.push_back(id),
        }
    }

    fn assign_idle_characters(&mut self) {
        for index in 0..self.characters.len() {
            let character = &self.characters[index];
            if !character.is_idle() || character.is_between_tiles() {
                continue;
            }
            let start = character.current_tile();
            let Some(job_id) = self.pop_job() else {
                break;
            };
            let Some(site) = self.jobs.get(&job_id).map(Job::tile) else {
                continue;
            };
            match self.plan_route(start, site) {
                Some(route) => {
                    debug!(
                        character = %self.characters[index].id(),
                        job = %job_id,
                        steps = route.len() - 1,
                        "job_assigned"
                    );
                    let epoch = self.graph_epoch;
                    self.characters[index].assign_job(job_id, site, route, epoch);
                }
                None => {
                    debug!(job = %job_id, from = %start, to = %site, "job_unreachable");
                    self.requeue(job_id);
                }
            }
        }
    }

    fn refresh_stale_route(&mut self, index: usize) {
        let character = &self.characters[index];
        let stale = match character.assignment() {
            Some(assignment) => {
                character.route_epoch() != self.graph_epoch
                    && character.is_at_rest()
                    && character.current_tile() != assignment.tile
            }
            None => false,
        };
        if stale {
            self.replan(index);
        }
    }

    fn replan(&mut self, index: usize) {
        let character = &self.characters[index];
        let Some(assignment) = character.assignment() else {
            return;
        };
        let start = character.current_tile();
        match self.plan_route(start, assignment.tile) {
            Some(route) => {
                let epoch = self.graph_epoch;
                self.characters[index].set_route(route, epoch);
            }
            None => {
                warn!(
                    character = %self.characters[index].id(),
                    job = %assignment.job,
                    from = %start,
                    "job_released"
                );
                self.characters[index].clear_job();
                self.requeue(assignment.job);
            }
        }
    }

    fn finish_job(&mut self, id: JobId) {
        let Some(job) = self.jobs.remove(&id) else {
            return;
        };
        self.job_sites.remove(&job.tile());
        if let Err(err) = self.build_structure(job.kind(), job.tile()) {
            warn!(job = %id, error = %err, "job_completed_without_structure");
        }
        self.jobs_completed += 1;
        info!(job = %id, tile = %job.tile(), kind = %job.kind(), "job_completed");
        self.pending_events.push_back(WorldEvent::JobCompleted(job));
    }

    fn flush_events(&mut self) {
        while let Some(event) = self.pending_events.pop_front() {
            match event {
                WorldEvent::StructureChanged { tile, layer } => {
                    let structure = self
                        .grid
                        .index(tile)
                        .and_then(|index| self.structures[index].get(layer));
                    if let Some(structure) = structure {
                        self.structure_changed.emit(structure);
                    }
                }
                WorldEvent::JobCreated(id) => {
                    if let Some(job) = self.jobs.get(&id) {
                        self.job_created.emit(job);
                    }
                }
                WorldEvent::JobCompleted(job) => {
                    self.job_completed.emit(&job);
                }
                WorldEvent::JobCanceled(job) => {
                    self.job_canceled.emit(&job);
                }
            }
        }
    }

    pub fn summary(&self) -> WorldSummary {
        let mut structures = BTreeMap::new();
        for structure in self.structures.iter().flatten() {
            *structures.entry(structure.kind.to_string()).or_insert(0) += 1;
        }
        let queued: HashSet<JobId> = self.queue.iter().copied().collect();
        let (mut jobs_assigned, mut jobs_in_progress) = (0, 0);
        for job in self.jobs.values().filter(|job| !queued.contains(&job.id())) {
            if job.state() == JobState::InProgress {
                jobs_in_progress += 1;
            } else {
                jobs_assigned += 1;
            }
        }
        let characters = self
            .characters
            .iter()
            .map(|character| {
                let (x, y) = character.position();
                CharacterSnapshot {
                    id: character.id().raw(),
                    x,
                    y,
                    state: state_name(character.state()).to_string(),
                    job: character.job().map(JobId::raw),
                }
            })
            .collect();
        WorldSummary {
            tick: self.tick,
            width: self.width(),
            height: self.height(),
            structures,
            walkable_tiles: self.graph.node_count(),
            jobs_open: self.jobs.len(),
            jobs_queued: self.queue.len(),
            jobs_assigned,
            jobs_in_progress,
            jobs_completed: self.jobs_completed,
            jobs_canceled: self.jobs_canceled,
            characters,
        }
    }
}

impl fmt::Debug for World {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("World")
            .field("width", &self.width())
            .field("height", &self.height())
            .field("tick", &self.tick)
            .field("jobs", &self.jobs.len())
            .field("characters", &self.characters.len())
            .field("graph_epoch", &self.graph_epoch)
            .finish_non_exhaustive()
    }
}

fn state_name(state: CharacterState) -> &'static str {
    match state {
        CharacterState::Idle => "idle",
        CharacterState::Traveling => "traveling",
        CharacterState::Working => "working",
        CharacterState::Stalled => "stalled",
    }
}
