//! conductor-core
//!
//! Core building blocks for the Conductor orchestration engine: goals are
//! decomposed into dependency-ordered task graphs, tasks are dispatched to
//! capability-matched workers, outcomes are validated against per-capability
//! policies, and failed validations feed a bounded corrective retry loop.
//! Every status change is an append-only ledger record; all queries derive
//! from the materialized snapshot.
//!
//! # Module layout
//! - **domain**: core types (ids, capability, status, task, outcome, worker)
//! - **graph**: goal decomposition and dependency verification
//! - **ledger**: append-only record log + derived snapshot
//! - **registry**: capability-to-worker resolution with load/latency accounting
//! - **policy**: outcome validation clauses per capability
//! - **sched**: the dispatch loop, correction loop, and retry backoff
//! - **report**: status and next-action queries over the snapshot
//! - **engine**: the [`Conductor`] facade wiring it all together

pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod graph;
pub mod ledger;
pub mod policy;
pub mod registry;
pub mod report;
pub mod sched;

pub use config::EngineConfig;
pub use engine::{Conductor, ConductorBuilder, SchedulerHandle};
pub use error::{ConductorError, GraphError};
