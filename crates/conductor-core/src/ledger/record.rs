//! Ledger records: immutable, timestamped status transitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{
    ClauseId, CorrectiveInstruction, GraphId, Outcome, TaskId, TaskSpec, TaskStatus, WorkerId,
};

/// One append-only transition record. The snapshot is the left-fold of
/// these in `sequence_no` order, so the payload must carry everything the
/// fold needs; nothing may depend on ambient state.
///
/// `from_status: None` encodes task creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerRecord {
    pub sequence_no: u64,
    pub timestamp: DateTime<Utc>,
    pub task_id: TaskId,
    pub from_status: Option<TaskStatus>,
    pub to_status: TaskStatus,
    pub payload: TransitionPayload,
}

/// Structured payload per transition kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransitionPayload {
    /// Task created by the graph builder (batch-committed).
    Created { graph_id: GraphId, spec: TaskSpec },

    /// All dependencies completed.
    Promoted,

    /// Capacity found; worker assigned. `attempt` is the absolute attempt
    /// number so replay never has to count.
    Assigned { worker: WorkerId, attempt: u32 },

    /// Worker reported an outcome; validation begins.
    OutcomeReceived { worker: WorkerId, outcome: Outcome },

    /// Validation passed.
    Accepted,

    /// Validation failed with attempts remaining; re-entering Runnable
    /// behind a backoff gate with a corrective instruction.
    RetryScheduled {
        violations: Vec<ClauseId>,
        corrective: CorrectiveInstruction,
        next_eligible_at: DateTime<Utc>,
    },

    /// Validation failed with the budget exhausted. `violations` is the
    /// final attempt's set; the fold concatenates it onto the history.
    Exhausted { violations: Vec<ClauseId> },

    /// An upstream dependency failed terminally; violations are copied from
    /// the root failure for traceability.
    BlockedBy {
        root: TaskId,
        violations: Vec<ClauseId>,
    },

    /// Crash recovery: a task that was in flight when the process died is
    /// re-entered as Runnable (its worker is gone).
    Recovered,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Capability;
    use std::collections::BTreeSet;

    #[test]
    fn record_roundtrips_through_json_line() {
        let spec = TaskSpec {
            id: TaskId::generate(),
            title: "t".into(),
            capability: Capability::new("write-tests"),
            dependencies: BTreeSet::new(),
            priority: 1,
            input: serde_json::json!({"goal": "g"}),
            max_attempts: 3,
        };
        let record = LedgerRecord {
            sequence_no: 1,
            timestamp: Utc::now(),
            task_id: spec.id,
            from_status: None,
            to_status: TaskStatus::Pending,
            payload: TransitionPayload::Created {
                graph_id: GraphId::generate(),
                spec,
            },
        };

        let line = serde_json::to_string(&record).unwrap();
        assert!(!line.contains('\n'));
        let back: LedgerRecord = serde_json::from_str(&line).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn creation_serializes_from_status_as_null() {
        let record = LedgerRecord {
            sequence_no: 7,
            timestamp: Utc::now(),
            task_id: TaskId::generate(),
            from_status: None,
            to_status: TaskStatus::Pending,
            payload: TransitionPayload::Promoted,
        };
        let v: serde_json::Value = serde_json::to_value(&record).unwrap();
        assert!(v["from_status"].is_null());
        assert_eq!(v["to_status"], "pending");
    }
}
