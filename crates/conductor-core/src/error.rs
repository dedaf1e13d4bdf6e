//! Error taxonomy.
//!
//! `GraphError` is rejected synchronously at submission and never reaches
//! the ledger. Validation failures and timeouts are *not* errors at this
//! level: they are persisted ledger transitions handled by the correction
//! loop. Only structural problems (unknown ids, duplicate registration,
//! ledger I/O) surface as `ConductorError`.

use thiserror::Error;

use crate::domain::{Capability, TaskId, WorkerId};

#[derive(Debug, Error)]
pub enum ConductorError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("unknown task {0}")]
    UnknownTask(TaskId),

    #[error("unknown graph {0}")]
    UnknownGraph(crate::domain::GraphId),

    #[error("worker {0} is already registered")]
    DuplicateWorker(WorkerId),

    #[error("ledger i/o: {0}")]
    Ledger(#[from] std::io::Error),

    #[error("ledger record decode: {0}")]
    RecordDecode(#[from] serde_json::Error),

    #[error("ledger replay: {0}")]
    Replay(String),
}

/// Structural defects in a submitted goal decomposition.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("dependency cycle: {}", format_cycle(.0))]
    Cycle(Vec<TaskId>),

    #[error("no registered worker provides capability {0}")]
    UnknownCapability(Capability),

    #[error("task \"{task}\" depends on unknown task \"{reference}\"")]
    UnknownDependency { task: String, reference: String },

    #[error("task \"{0}\" depends on itself")]
    SelfDependency(String),

    #[error("unknown template {0:?}")]
    UnknownTemplate(String),

    #[error("goal produced no tasks")]
    EmptyGraph,
}

fn format_cycle(ids: &[TaskId]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}
