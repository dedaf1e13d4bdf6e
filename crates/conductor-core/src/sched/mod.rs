//! Scheduling: the dispatch loop, the correction loop, and retry backoff.

mod correction;
mod dispatcher;
mod retry;

pub use correction::{Correction, CorrectionLoop};
pub use dispatcher::{Scheduler, TickStats, WORKER_ERROR_CLAUSE};
pub use retry::RetryPolicy;
