use anyhow::Result;
use serde::Serialize;
use tracing::{debug, info};

use crate::{
    rng::{RngManager, RngStream},
    world::World,
};

pub struct EngineSettings {
    pub scenario_name: String,
    pub seed: u64,
    /// Seconds of simulated time per tick.
    pub dt: f64,
}

pub struct EngineBuilder {
    settings: EngineSettings,
    systems: Vec<Box<dyn System>>,
}

impl EngineBuilder {
    pub fn new(settings: EngineSettings) -> Self {
        Self {
            settings,
            systems: Vec::new(),
        }
    }

    pub fn with_system(mut self, system: impl System + 'static) -> Self {
        self.systems.push(Box::new(system));
        self
    }

    pub fn push_system(&mut self, system: impl System + 'static) {
        self.systems.push(Box::new(system));
    }

    pub fn build(self) -> Engine {
        Engine {
            rng: RngManager::new(self.settings.seed),
            systems: self.systems,
            settings: self.settings,
        }
    }
}

/// State of the world right after a tick.
#[derive(Debug, Clone, Serialize)]
pub struct TickReport {
    pub tick: u64,
    pub jobs_open: usize,
    pub jobs_completed: u64,
    pub graph_epoch: u64,
}

impl TickReport {
    fn capture(world: &World) -> Self {
        Self {
            tick: world.tick(),
            jobs_open: world.job_count(),
            jobs_completed: world.jobs_completed(),
            graph_epoch: world.graph_epoch(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub scenario: String,
    pub ticks: u64,
    pub simulated_seconds: f64,
    pub last: TickReport,
}

/// Fixed-step driver: every tick runs the registered systems in order, then
/// advances the world by `dt`.
pub struct Engine {
    rng: RngManager,
    systems: Vec<Box<dyn System>>,
    settings: EngineSettings,
}

impl Engine {
    pub fn run(&mut self, world: &mut World, ticks: u64) -> Result<RunSummary> {
        self.run_with_hook(world, ticks, |_| {})
    }

    pub fn run_with_hook(
        &mut self,
        world: &mut World,
        ticks: u64,
        mut hook: impl FnMut(&TickReport),
    ) -> Result<RunSummary> {
        info!(
            scenario = %self.settings.scenario_name,
            ticks,
            dt = self.settings.dt,
            "run_started"
        );
        let mut last = TickReport::capture(world);
        for _ in 0..ticks {
            let ctx = SystemContext {
                tick: world.tick(),
                dt: self.settings.dt,
                scenario_name: &self.settings.scenario_name,
            };
            for system in &mut self.systems {
                let mut rng_stream = self.rng.stream(system.name());
                system.run(&ctx, world, &mut rng_stream)?;
            }
            world.update(self.settings.dt);

            last = TickReport::capture(world);
            debug!(tick = last.tick, jobs_open = last.jobs_open, "tick_finished");
            hook(&last);
        }

        let summary = RunSummary {
            scenario: self.settings.scenario_name.clone(),
            ticks,
            simulated_seconds: ticks as f64 * self.settings.dt,
            last,
        };
        info!(
            scenario = %summary.scenario,
            ticks,
            jobs_completed = summary.last.jobs_completed,
            jobs_open = summary.last.jobs_open,
            "run_finished"
        );
        Ok(summary)
    }
}

pub struct SystemContext<'a> {
    /// Ticks completed before this one.
    pub tick: u64,
    pub dt: f64,
    pub scenario_name: &'a str,
}

/// Work the engine performs on the world at the start of every tick.
pub trait System {
    fn name(&self) -> &str;
    fn run(
        &mut self,
        ctx: &SystemContext,
        world: &mut World,
        rng: &mut RngStream<'_>,
    ) -> Result<()>;
}
