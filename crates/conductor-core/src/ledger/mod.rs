//! State ledger: the single source of truth.
//!
//! An append-only sequence of transition records plus the materialized
//! snapshot, both behind one lock so concurrent completions never
//! interleave into an inconsistent state. Every status change is a
//! compare-and-swap against the expected prior status: if the observed
//! status has already moved, the transition is silently skipped. That CAS
//! is what makes duplicate scheduler ticks idempotent — at most one
//! Dispatched record per attempt, no matter how many ticks race.

mod log;
mod record;
mod snapshot;

pub use log::RecordLog;
pub use record::{LedgerRecord, TransitionPayload};
pub use snapshot::Snapshot;

use chrono::Utc;
use std::path::Path;
use tokio::sync::{Notify, RwLock};
use tracing::{debug, info};

use crate::domain::{GraphId, TaskId, TaskStatus};
use crate::error::ConductorError;
use crate::graph::TaskSet;

struct LedgerState {
    snapshot: Snapshot,
    log: RecordLog,
}

pub struct Ledger {
    state: RwLock<LedgerState>,
    notify: Notify,
}

impl Ledger {
    /// Ephemeral ledger (tests, demos): no persisted log.
    pub fn in_memory() -> Self {
        Self {
            state: RwLock::new(LedgerState {
                snapshot: Snapshot::new(),
                log: RecordLog::in_memory(),
            }),
            notify: Notify::new(),
        }
    }

    /// Open a persisted ledger, replaying any existing log before new
    /// dispatches are accepted. Tasks that were in flight when the previous
    /// process died are re-entered as Runnable (their worker is gone).
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, ConductorError> {
        let records = RecordLog::read_all(&path)?;
        let mut snapshot = Snapshot::new();
        for record in &records {
            snapshot.apply(record)?;
        }
        if !records.is_empty() {
            info!(records = records.len(), "ledger replayed");
        }

        let ledger = Self {
            state: RwLock::new(LedgerState {
                snapshot,
                log: RecordLog::open(path)?,
            }),
            notify: Notify::new(),
        };
        ledger.recover_in_flight().await?;
        Ok(ledger)
    }

    async fn recover_in_flight(&self) -> Result<(), ConductorError> {
        let in_flight: Vec<(TaskId, TaskStatus)> = {
            let state = self.state.read().await;
            state
                .snapshot
                .tasks()
                .filter(|t| {
                    matches!(t.status, TaskStatus::Dispatched | TaskStatus::Validating)
                })
                .map(|t| (t.id(), t.status))
                .collect()
        };
        for (task_id, from) in in_flight {
            info!(%task_id, ?from, "recovering in-flight task");
            self.transition(task_id, from, TaskStatus::Runnable, TransitionPayload::Recovered)
                .await?;
        }
        Ok(())
    }

    /// Commit a built graph as one batch of creation records, so a
    /// partially-built graph is never partially visible.
    pub async fn commit_graph(
        &self,
        graph_id: GraphId,
        set: &TaskSet,
    ) -> Result<(), ConductorError> {
        let mut state = self.state.write().await;
        let now = Utc::now();
        for spec in &set.tasks {
            let record = LedgerRecord {
                sequence_no: state.snapshot.last_seq() + 1,
                timestamp: now,
                task_id: spec.id,
                from_status: None,
                to_status: TaskStatus::Pending,
                payload: TransitionPayload::Created {
                    graph_id,
                    spec: spec.clone(),
                },
            };
            state.log.append(&record)?;
            state.snapshot.apply(&record)?;
        }
        drop(state);
        self.notify.notify_waiters();
        Ok(())
    }

    /// Compare-and-swap a task's status.
    ///
    /// Returns `Ok(true)` if the record was appended, `Ok(false)` if the
    /// task was no longer in `expected_from` (skipped, not an error).
    pub async fn transition(
        &self,
        task_id: TaskId,
        expected_from: TaskStatus,
        to: TaskStatus,
        payload: TransitionPayload,
    ) -> Result<bool, ConductorError> {
        let mut state = self.state.write().await;
        let current = state
            .snapshot
            .task(task_id)
            .ok_or(ConductorError::UnknownTask(task_id))?
            .status;
        if current != expected_from {
            debug!(%task_id, ?expected_from, ?current, "transition skipped");
            return Ok(false);
        }

        let record = LedgerRecord {
            sequence_no: state.snapshot.last_seq() + 1,
            timestamp: Utc::now(),
            task_id,
            from_status: Some(expected_from),
            to_status: to,
            payload,
        };
        state.log.append(&record)?;
        state.snapshot.apply(&record)?;
        drop(state);
        self.notify.notify_waiters();
        Ok(true)
    }

    /// Run a read-only query against the current snapshot.
    pub async fn read<R>(&self, f: impl FnOnce(&Snapshot) -> R) -> R {
        let state = self.state.read().await;
        f(&state.snapshot)
    }

    /// Wait until some transition has been applied.
    pub async fn changed(&self) {
        self.notify.notified().await;
    }
}
