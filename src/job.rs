//! Construction jobs and their lifecycle

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::events::{EventChannel, SubscriptionId};
use crate::structure::{Blueprint, StructureType};
use crate::tile::Tile;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct JobId(u64);

impl JobId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    InProgress,
    Completed,
    Canceled,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Completed | JobState::Canceled)
    }
}

/// How a job left the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobOutcome {
    Completed,
    Canceled,
}

#[derive(Debug)]
pub struct Job {
    id: JobId,
    tile: Tile,
    kind: StructureType,
    work_required: f64,
    work_remaining: f64,
    state: JobState,
    on_finished: EventChannel<Job>,
}

impl Job {
    pub fn new(id: JobId, tile: Tile, kind: StructureType, work_required: f64) -> Self {
        let work_required = work_required.max(0.0);
        Self {
            id,
            tile,
            kind,
            work_required,
            work_remaining: work_required,
            state: JobState::Pending,
            on_finished: EventChannel::new("job_finished"),
        }
    }

    pub fn from_blueprint(id: JobId, tile: Tile, blueprint: &Blueprint) -> Self {
        Self::new(id, tile, blueprint.kind, blueprint.build_time)
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn tile(&self) -> Tile {
        self.tile
    }

    pub fn kind(&self) -> StructureType {
        self.kind
    }

    pub fn work_required(&self) -> f64 {
        self.work_required
    }

    pub fn work_remaining(&self) -> f64 {
        self.work_remaining
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn outcome(&self) -> Option<JobOutcome> {
        match self.state {
            JobState::Completed => Some(JobOutcome::Completed),
            JobState::Canceled => Some(JobOutcome::Canceled),
            JobState::Pending | JobState::InProgress => None,
        }
    }

    /// Fraction of the work already done, in `[0, 1]`.
    pub fn progress(&self) -> f64 {
        if self.work_required <= 0.0 {
            return if self.state == JobState::Completed { 1.0 } else { 0.0 };
        }
        (1.0 - self.work_remaining / self.work_required).clamp(0.0, 1.0)
    }

    /// Registers a callback that runs once when the job completes or is
    /// canceled. Inspect [`Job::outcome`] to tell the two apart.
    pub fn subscribe_on_finished(&mut self, callback: impl FnMut(&Job) + 'static) -> SubscriptionId {
        self.on_finished.subscribe(callback)
    }

    pub fn unsubscribe_on_finished(&mut self, id: SubscriptionId) -> bool {
        self.on_finished.unsubscribe(id)
    }

    /// Applies `amount` of work. Returns `Some(JobOutcome::Completed)` only on
    /// the call that finishes the job.
    pub fn do_work(&mut self, amount: f64) -> Option<JobOutcome> {
        if self.state.is_terminal() {
            return None;
        }
        self.work_remaining -= amount.max(0.0);
        if self.work_remaining <= 0.0 {
            self.finish(JobState::Completed);
            return Some(JobOutcome::Completed);
        }
        if self.work_remaining < self.work_required {
            self.state = JobState::InProgress;
        }
        None
    }

    pub fn cancel(&mut self) -> Option<JobOutcome> {
        if self.state.is_terminal() {
            return None;
        }
        self.finish(JobState::Canceled);
        Some(JobOutcome::Canceled)
    }

    fn finish(&mut self, state: JobState) {
        self.state = state;
        // Subscribers borrow the job, so the channel is detached while they run.
        let mut listeners = std::mem::take(&mut self.on_finished);
        listeners.emit(self);
        self.on_finished = listeners;
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;

    fn wall_job(work: f64) -> Job {
        Job::new(JobId::new(1), Tile::new(2, 2), StructureType::Wall, work)
    }

    #[test]
    fn test_completion_fires_once() {
        let mut job = wall_job(10.0);
        let calls = Rc::new(RefCell::new(0));
        {
            let calls = Rc::clone(&calls);
            job.subscribe_on_finished(move |_| *calls.borrow_mut() += 1);
        }

        assert_eq!(job.do_work(6.0), None);
        assert_eq!(job.state(), JobState::InProgress);
        assert_eq!(*calls.borrow(), 0);

        assert_eq!(job.do_work(6.0), Some(JobOutcome::Completed));
        assert_eq!(*calls.borrow(), 1);

        assert_eq!(job.do_work(1.0), None);
        assert_eq!(*calls.borrow(), 1);
        assert_eq!(job.state(), JobState::Completed);
    }

    #[test]
    fn test_state_progression() {
        let mut job = wall_job(4.0);
        assert_eq!(job.state(), JobState::Pending);
        assert_eq!(job.progress(), 0.0);

        job.do_work(0.0);
        assert_eq!(job.state(), JobState::Pending);

        job.do_work(1.0);
        assert_eq!(job.state(), JobState::InProgress);
        assert!((job.progress() - 0.25).abs() < 1e-12);

        job.do_work(-5.0);
        assert_eq!(job.work_remaining(), 3.0);
    }

    #[test]
    fn test_cancel_is_distinguishable() {
        let mut job = wall_job(10.0);
        let outcomes = Rc::new(RefCell::new(Vec::new()));
        {
            let outcomes = Rc::clone(&outcomes);
            job.subscribe_on_finished(move |job| outcomes.borrow_mut().push(job.outcome()));
        }

        assert_eq!(job.cancel(), Some(JobOutcome::Canceled));
        assert_eq!(job.cancel(), None);
        assert_eq!(job.do_work(100.0), None);
        assert_eq!(*outcomes.borrow(), vec![Some(JobOutcome::Canceled)]);
    }

    #[test]
    fn test_zero_work_job_completes_on_first_call() {
        let mut job = wall_job(0.0);
        assert_eq!(job.do_work(0.0), Some(JobOutcome::Completed));
        assert_eq!(job.progress(), 1.0);
    }
}
