//! Task spec and task record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::capability::Capability;
use super::ids::{GraphId, TaskId, WorkerId};
use super::outcome::{ClauseId, CorrectiveInstruction, Outcome};
use super::status::TaskStatus;

/// Immutable description of a unit of work, produced by the graph builder.
///
/// The id is allocated at build time so dependency edges can reference
/// sibling tasks before anything is committed to the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub id: TaskId,
    pub title: String,
    pub capability: Capability,

    /// Predecessor tasks that must reach Completed first.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub dependencies: BTreeSet<TaskId>,

    /// Higher runs first among simultaneously runnable tasks.
    #[serde(default)]
    pub priority: i32,

    /// Input handed to the worker.
    #[serde(default)]
    pub input: serde_json::Value,

    /// Retry budget for this task (from the capability policy).
    pub max_attempts: u32,
}

/// Mutable task state, materialized in the snapshot.
///
/// Design: the snapshot is the single source of truth for task state, and
/// every mutation here is driven by exactly one ledger record (the fold in
/// `ledger::snapshot`). Nothing outside the fold mutates a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub spec: TaskSpec,
    pub graph_id: GraphId,
    pub status: TaskStatus,

    /// Ledger sequence number of the creation record; the FIFO tiebreaker.
    pub created_seq: u64,

    /// Number of dispatches so far (incremented when Dispatched is recorded).
    pub attempt_count: u32,

    /// Worker currently (or last) assigned; cleared on retry.
    pub assigned_worker: Option<WorkerId>,

    /// Present only once the task is terminal or under validation.
    pub outcome: Option<Outcome>,

    /// Clauses violated by the most recent failed validation.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub last_violation: Vec<ClauseId>,

    /// All violations across every failed attempt, in attempt order.
    /// Surfaced whole on terminal failure.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub violation_history: Vec<ClauseId>,

    /// Instruction for the next attempt, built from the violation list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corrective: Option<CorrectiveInstruction>,

    /// Retry backoff gate: the scheduler skips this task until this instant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_eligible_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaskRecord {
    pub fn new(spec: TaskSpec, graph_id: GraphId, created_seq: u64, at: DateTime<Utc>) -> Self {
        Self {
            spec,
            graph_id,
            status: TaskStatus::Pending,
            created_seq,
            attempt_count: 0,
            assigned_worker: None,
            outcome: None,
            last_violation: Vec::new(),
            violation_history: Vec::new(),
            corrective: None,
            next_eligible_at: None,
            created_at: at,
            updated_at: at,
        }
    }

    pub fn id(&self) -> TaskId {
        self.spec.id
    }

    pub fn capability(&self) -> &Capability {
        &self.spec.capability
    }

    /// Is this task eligible for dispatch at `now` (runnable and past any
    /// retry backoff gate)?
    pub fn is_dispatchable(&self, now: DateTime<Utc>) -> bool {
        self.status.is_runnable() && self.next_eligible_at.is_none_or(|t| t <= now)
    }
}
