//! Task decomposition state for executing queries.
//!
//! A CREATED query is broken into remotely executable units ("tasks")
//! claimed by executor workers. This crate never executes tasks; it tracks
//! their readiness so the next-page assembler can tell "still producing"
//! apart from "finished/disowned".

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use uuid::Uuid;

/// Identifier of one executable unit of a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskKey {
    pub query_id: Uuid,
    pub task_id: u32,
}

/// Readiness phase of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPhase {
    /// Waiting to be claimed by a worker.
    Ready,
    /// Claimed and executing.
    Running,
    Completed,
    Failed,
}

impl TaskPhase {
    /// Whether a task in this phase may still produce results.
    pub fn is_unfinished(&self) -> bool {
        matches!(self, Self::Ready | Self::Running)
    }
}

impl fmt::Display for TaskPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready => write!(f, "ready"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Per-query set of task ids keyed by phase.
///
/// Created only when a query transitions into CREATED; absence signals
/// "not yet executing" or "finished/disowned".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskStates {
    pub query_id: Uuid,
    pub task_states: HashMap<TaskPhase, HashSet<u32>>,
}

impl TaskStates {
    /// Allocate task states for a newly created query, with `num_tasks`
    /// tasks in the READY phase.
    pub fn allocate(query_id: Uuid, num_tasks: u32) -> Self {
        let mut task_states = HashMap::new();
        task_states.insert(TaskPhase::Ready, (0..num_tasks).collect());
        Self {
            query_id,
            task_states,
        }
    }

    /// Move a task into a phase, removing it from every other phase first.
    pub fn set_phase(&mut self, task_id: u32, phase: TaskPhase) {
        for tasks in self.task_states.values_mut() {
            tasks.remove(&task_id);
        }
        self.task_states.entry(phase).or_default().insert(task_id);
    }

    pub fn tasks_in_phase(&self, phase: TaskPhase) -> usize {
        self.task_states.get(&phase).map_or(0, HashSet::len)
    }

    /// Whether any task may still produce results.
    pub fn has_unfinished_work(&self) -> bool {
        self.task_states
            .iter()
            .any(|(phase, tasks)| phase.is_unfinished() && !tasks.is_empty())
    }

    /// All task keys, across every phase.
    pub fn task_keys(&self) -> Vec<TaskKey> {
        let mut keys: Vec<TaskKey> = self
            .task_states
            .values()
            .flatten()
            .map(|&task_id| TaskKey {
                query_id: self.query_id,
                task_id,
            })
            .collect();
        keys.sort_by_key(|k| k.task_id);
        keys
    }
}
