//! Worker port: the seam between the orchestrator and capability providers.
//!
//! Workers are opaque: the engine knows only their declared capability set,
//! their concurrency limit, and this request/response contract. Domain
//! business logic lives entirely on the other side of the trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

use super::capability::Capability;
use super::ids::{GraphId, TaskId, WorkerId};
use super::outcome::{CorrectiveInstruction, Outcome};

/// Everything a worker needs to execute one attempt of a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub task_id: TaskId,
    pub graph_id: GraphId,
    pub capability: Capability,
    pub input: serde_json::Value,

    /// 1-based attempt number for this dispatch.
    pub attempt: u32,

    /// Present on retries: the violations the previous attempt must fix.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corrective: Option<CorrectiveInstruction>,
}

/// A worker could not produce an outcome at all (crash, lost connection).
/// Distinct from a validation failure, but handled through the same
/// correction loop so the retry budget still applies.
#[derive(Debug, Error)]
#[error("worker failed to produce an outcome: {0}")]
pub struct WorkerError(pub String);

impl WorkerError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// A capability provider.
///
/// Invocation is asynchronous and may run in parallel up to the declared
/// `max_concurrency`; the orchestrator does not assume reentrancy beyond
/// that limit.
#[async_trait]
pub trait Worker: Send + Sync {
    async fn perform(&self, assignment: Assignment) -> Result<Outcome, WorkerError>;
}

/// Registry-side view of a worker: identity, declared capabilities, and
/// current load accounting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerDescriptor {
    pub id: WorkerId,
    pub capabilities: BTreeSet<Capability>,
    pub max_concurrency: u32,
    pub current_load: u32,
}

impl WorkerDescriptor {
    pub fn remaining_capacity(&self) -> u32 {
        self.max_concurrency.saturating_sub(self.current_load)
    }

    pub fn has_capacity(&self) -> bool {
        self.remaining_capacity() > 0
    }
}
