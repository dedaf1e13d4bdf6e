//! Snapshot: the materialized current state, derived from the record log.
//!
//! The snapshot is a pure left-fold of `LedgerRecord`s in sequence order.
//! It is a read-cache, never the primary store; replaying the log from
//! empty must reproduce it exactly (the replay-determinism law the tests
//! pin down). All mutation goes through `apply`.

use std::collections::HashMap;

use crate::domain::{GraphId, TaskId, TaskRecord, TaskStatus};
use crate::error::ConductorError;

use super::record::{LedgerRecord, TransitionPayload};

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Snapshot {
    tasks: HashMap<TaskId, TaskRecord>,

    /// Task ids per graph in creation order (the FIFO tiebreaker).
    graphs: HashMap<GraphId, Vec<TaskId>>,

    /// Sequence number of the last applied record.
    last_seq: u64,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one record into the snapshot.
    ///
    /// Records must arrive in sequence order and their `from_status` must
    /// match the task's current status; anything else means the log is
    /// corrupt (the live path never produces it because transitions are
    /// CAS-guarded before they are appended).
    pub fn apply(&mut self, record: &LedgerRecord) -> Result<(), ConductorError> {
        if record.sequence_no <= self.last_seq {
            return Err(ConductorError::Replay(format!(
                "out-of-order record {} after {}",
                record.sequence_no, self.last_seq
            )));
        }

        match &record.payload {
            TransitionPayload::Created { graph_id, spec } => {
                if record.from_status.is_some() {
                    return Err(ConductorError::Replay(format!(
                        "creation record {} has a from_status",
                        record.sequence_no
                    )));
                }
                let task = TaskRecord::new(
                    spec.clone(),
                    *graph_id,
                    record.sequence_no,
                    record.timestamp,
                );
                self.graphs.entry(*graph_id).or_default().push(spec.id);
                self.tasks.insert(spec.id, task);
            }
            payload => {
                let task = self.tasks.get_mut(&record.task_id).ok_or_else(|| {
                    ConductorError::Replay(format!(
                        "record {} references unknown task {}",
                        record.sequence_no, record.task_id
                    ))
                })?;
                if record.from_status != Some(task.status) {
                    return Err(ConductorError::Replay(format!(
                        "record {} expects {:?} but task {} is {:?}",
                        record.sequence_no, record.from_status, record.task_id, task.status
                    )));
                }

                task.status = record.to_status;
                task.updated_at = record.timestamp;
                match payload {
                    TransitionPayload::Promoted => {}
                    TransitionPayload::Assigned { worker, attempt } => {
                        task.assigned_worker = Some(worker.clone());
                        task.attempt_count = *attempt;
                        task.next_eligible_at = None;
                    }
                    TransitionPayload::OutcomeReceived { outcome, .. } => {
                        task.outcome = Some(outcome.clone());
                    }
                    TransitionPayload::Accepted => {}
                    TransitionPayload::RetryScheduled {
                        violations,
                        corrective,
                        next_eligible_at,
                    } => {
                        task.last_violation = violations.clone();
                        task.violation_history.extend(violations.iter().cloned());
                        task.corrective = Some(corrective.clone());
                        task.assigned_worker = None;
                        task.outcome = None;
                        task.next_eligible_at = Some(*next_eligible_at);
                    }
                    TransitionPayload::Exhausted { violations } => {
                        task.last_violation = violations.clone();
                        task.violation_history.extend(violations.iter().cloned());
                    }
                    TransitionPayload::BlockedBy { violations, .. } => {
                        task.last_violation = violations.clone();
                    }
                    TransitionPayload::Recovered => {
                        task.assigned_worker = None;
                        task.outcome = None;
                        task.next_eligible_at = None;
                    }
                    TransitionPayload::Created { .. } => unreachable!("matched above"),
                }
            }
        }

        self.last_seq = record.sequence_no;
        Ok(())
    }

    pub fn last_seq(&self) -> u64 {
        self.last_seq
    }

    pub fn task(&self, id: TaskId) -> Option<&TaskRecord> {
        self.tasks.get(&id)
    }

    pub fn contains_graph(&self, graph_id: GraphId) -> bool {
        self.graphs.contains_key(&graph_id)
    }

    /// Tasks of one graph in creation order.
    pub fn graph_tasks(&self, graph_id: GraphId) -> Vec<&TaskRecord> {
        self.graphs
            .get(&graph_id)
            .map(|ids| ids.iter().filter_map(|id| self.tasks.get(id)).collect())
            .unwrap_or_default()
    }

    pub fn tasks(&self) -> impl Iterator<Item = &TaskRecord> {
        self.tasks.values()
    }

    /// Direct dependents of `id` within the same graph.
    pub fn dependents_of(&self, id: TaskId) -> Vec<&TaskRecord> {
        let Some(task) = self.tasks.get(&id) else {
            return Vec::new();
        };
        self.graph_tasks(task.graph_id)
            .into_iter()
            .filter(|t| t.spec.dependencies.contains(&id))
            .collect()
    }

    /// Are all of `task`'s dependencies Completed?
    pub fn dependencies_satisfied(&self, task: &TaskRecord) -> bool {
        task.spec
            .dependencies
            .iter()
            .all(|dep| self.tasks.get(dep).is_some_and(|t| t.status == TaskStatus::Completed))
    }

    /// Is any dependency of `task` terminally failed or blocked? Returns
    /// the first such root for traceability.
    pub fn blocking_dependency(&self, task: &TaskRecord) -> Option<&TaskRecord> {
        task.spec
            .dependencies
            .iter()
            .filter_map(|dep| self.tasks.get(dep))
            .find(|t| t.status.blocks_dependents())
    }
}
