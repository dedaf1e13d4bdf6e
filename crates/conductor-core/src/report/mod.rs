//! Recommendation engine: read-only queries over the snapshot.
//!
//! Pure functions, single O(n) pass over a graph's tasks — never a rescan
//! of the outside world. That property is the whole reason the
//! ledger/snapshot split exists.

use serde::{Deserialize, Serialize};

use crate::domain::{Capability, ClauseId, GraphId, TaskId, TaskRecord, TaskStatus, WorkerId};
use crate::ledger::Snapshot;

/// Serializable view of one task for API responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskView {
    pub id: TaskId,
    pub title: String,
    pub capability: Capability,
    pub status: TaskStatus,
    pub priority: i32,
    pub attempt_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_worker: Option<WorkerId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub last_violation: Vec<ClauseId>,
}

impl From<&TaskRecord> for TaskView {
    fn from(task: &TaskRecord) -> Self {
        Self {
            id: task.id(),
            title: task.spec.title.clone(),
            capability: task.capability().clone(),
            status: task.status,
            priority: task.spec.priority,
            attempt_count: task.attempt_count,
            assigned_worker: task.assigned_worker.clone(),
            last_violation: task.last_violation.clone(),
        }
    }
}

/// Per-status counts for one graph.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub pending: usize,
    pub runnable: usize,
    pub dispatched: usize,
    pub validating: usize,
    pub completed: usize,
    pub failed: usize,
    pub blocked: usize,
}

impl StatusCounts {
    pub fn total(&self) -> usize {
        self.pending
            + self.runnable
            + self.dispatched
            + self.validating
            + self.completed
            + self.failed
            + self.blocked
    }
}

/// Graph-level summary for status queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    pub graph_id: GraphId,
    pub counts: StatusCounts,

    /// Completed tasks over total, 0.0..=100.0.
    pub percent_complete: f64,

    /// Terminal failures and their blocked dependents, for surfacing.
    pub failed: Vec<TaskView>,
    pub blocked: Vec<TaskView>,

    /// True once every task is terminal.
    pub settled: bool,
}

/// Tasks whose dependencies are satisfied right now, ordered by priority
/// desc then creation order asc (the same order the dispatcher uses).
pub fn next_actionable(snapshot: &Snapshot, graph_id: GraphId) -> Vec<TaskView> {
    let mut actionable: Vec<&TaskRecord> = snapshot
        .graph_tasks(graph_id)
        .into_iter()
        .filter(|t| t.status == TaskStatus::Runnable)
        .collect();
    actionable.sort_by(|a, b| {
        b.spec
            .priority
            .cmp(&a.spec.priority)
            .then_with(|| a.created_seq.cmp(&b.created_seq))
    });
    actionable.into_iter().map(TaskView::from).collect()
}

/// One-pass summary of a graph.
pub fn status_report(snapshot: &Snapshot, graph_id: GraphId) -> StatusReport {
    let mut counts = StatusCounts::default();
    let mut failed = Vec::new();
    let mut blocked = Vec::new();
    let mut settled = true;

    for task in snapshot.graph_tasks(graph_id) {
        match task.status {
            TaskStatus::Pending => counts.pending += 1,
            TaskStatus::Runnable => counts.runnable += 1,
            TaskStatus::Dispatched => counts.dispatched += 1,
            TaskStatus::Validating => counts.validating += 1,
            TaskStatus::Completed => counts.completed += 1,
            TaskStatus::Failed => {
                counts.failed += 1;
                failed.push(TaskView::from(task));
            }
            TaskStatus::Blocked => {
                counts.blocked += 1;
                blocked.push(TaskView::from(task));
            }
        }
        settled &= task.status.is_terminal();
    }

    let total = counts.total();
    let percent_complete = if total == 0 {
        0.0
    } else {
        counts.completed as f64 * 100.0 / total as f64
    };

    StatusReport {
        graph_id,
        counts,
        percent_complete,
        failed,
        blocked,
        settled,
    }
}
