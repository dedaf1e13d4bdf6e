//! Domain model (ids, capabilities, task records, outcomes, workers).

pub mod capability;
pub mod ids;
pub mod outcome;
pub mod status;
pub mod task;
pub mod worker;

pub use capability::Capability;
pub use ids::{GraphId, TaskId, WorkerId};
pub use outcome::{ClauseId, CorrectiveInstruction, Outcome, TIMEOUT_CLAUSE};
pub use status::TaskStatus;
pub use task::{TaskRecord, TaskSpec};
pub use worker::{Assignment, Worker, WorkerDescriptor, WorkerError};
