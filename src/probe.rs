use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{PairKey, state::Observation};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// A probe the scheduler decided to run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbeTask {
    pub id: TaskId,
    pub key: PairKey,
    pub expected_gain: f64,
    pub cost: f64,
    pub created_at: DateTime<Utc>,
}

/// A task handed to the executor, together with the time it must resolve by.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dispatch {
    pub task: ProbeTask,
    pub deadline: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum ProbeResult {
    Completed(Observation),
    /// The executor could not reach the entity or failed internally
    Failed(String),
    TimedOut,
}

/// Result of a dispatched task, consumed exactly once by the fusion unit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbeOutcome {
    pub task_id: TaskId,
    pub key: PairKey,
    pub result: ProbeResult,
    pub completed_at: DateTime<Utc>,
}

impl ProbeOutcome {
    pub fn new(task: &ProbeTask, result: ProbeResult, completed_at: DateTime<Utc>) -> Self {
        Self {
            task_id: task.id,
            key: task.key.clone(),
            result,
            completed_at,
        }
    }

    pub fn timed_out(task_id: TaskId, key: PairKey, at: DateTime<Utc>) -> Self {
        Self {
            task_id,
            key,
            result: ProbeResult::TimedOut,
            completed_at: at,
        }
    }
}
