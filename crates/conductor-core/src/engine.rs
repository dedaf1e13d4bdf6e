//! Engine facade: wires the ledger, registry, policies, graph builder and
//! scheduler together and exposes the public operations.
//!
//! Submit a goal, register workers, query status and next actions, push
//! worker outcomes, cancel tasks. Everything else is internal machinery.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::EngineConfig;
use crate::domain::{Capability, GraphId, Outcome, TaskId, Worker, WorkerId};
use crate::error::ConductorError;
use crate::graph::{Goal, GraphBuilder, Template};
use crate::ledger::Ledger;
use crate::policy::{PolicySet, ValidationPolicy};
use crate::registry::CapabilityRegistry;
use crate::report::{self, StatusReport, TaskView};
use crate::sched::{Scheduler, TickStats};

/// Builder for a [`Conductor`]. Policies and templates are fixed at build
/// time; swapping either is an administrative restart, not a runtime
/// mutation.
pub struct ConductorBuilder {
    config: EngineConfig,
    policies: Vec<ValidationPolicy>,
    templates: Vec<Template>,
    ledger_path: Option<PathBuf>,
}

impl ConductorBuilder {
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
            policies: Vec::new(),
            templates: Vec::new(),
            ledger_path: None,
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_policy(mut self, policy: ValidationPolicy) -> Self {
        self.policies.push(policy);
        self
    }

    pub fn with_template(mut self, template: Template) -> Self {
        self.templates.push(template);
        self
    }

    /// Persist the ledger to a JSONL log at `path`. An existing log is
    /// replayed before the engine accepts work.
    pub fn persist_to(mut self, path: impl Into<PathBuf>) -> Self {
        self.ledger_path = Some(path.into());
        self
    }

    pub async fn build(self) -> Result<Conductor, ConductorError> {
        let ledger = match &self.ledger_path {
            Some(path) => Arc::new(Ledger::open(path).await?),
            None => Arc::new(Ledger::in_memory()),
        };

        let mut policies = PolicySet::new(self.config.default_max_attempts);
        for policy in self.policies {
            policies = policies.with_policy(policy);
        }
        let policies = Arc::new(policies);

        let mut builder = GraphBuilder::new();
        for template in self.templates {
            builder.register_template(template);
        }

        let registry = Arc::new(CapabilityRegistry::new());
        let scheduler = Arc::new(Scheduler::new(
            Arc::clone(&ledger),
            Arc::clone(&registry),
            Arc::clone(&policies),
            self.config,
        ));

        Ok(Conductor {
            scheduler,
            builder,
            policies,
        })
    }
}

impl Default for ConductorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// The orchestration engine.
pub struct Conductor {
    scheduler: Arc<Scheduler>,
    builder: GraphBuilder,
    policies: Arc<PolicySet>,
}

impl Conductor {
    pub fn builder() -> ConductorBuilder {
        ConductorBuilder::new()
    }

    /// Worker registration handshake.
    pub async fn register_worker(
        &self,
        id: WorkerId,
        capabilities: BTreeSet<Capability>,
        max_concurrency: u32,
        handle: Arc<dyn Worker>,
    ) -> Result<(), ConductorError> {
        info!(worker = %id, ?max_concurrency, "worker registered");
        self.scheduler
            .registry()
            .register(id, capabilities, max_concurrency, handle)
            .await
    }

    /// Submit a goal: decompose, verify, and commit the task graph as one
    /// batch. Graph defects are rejected here and never touch the ledger.
    pub async fn submit(&self, goal: &Goal) -> Result<GraphId, ConductorError> {
        let known = self.scheduler.registry().known_capabilities().await;
        let set = self.builder.build(
            goal,
            |capability| known.contains(capability),
            |capability| self.policies.max_attempts_for(capability),
        )?;

        let graph_id = GraphId::generate();
        self.scheduler.ledger().commit_graph(graph_id, &set).await?;
        info!(%graph_id, tasks = set.len(), "graph submitted");
        Ok(graph_id)
    }

    /// Snapshot summary for one graph.
    pub async fn status(&self, graph_id: GraphId) -> Result<StatusReport, ConductorError> {
        self.scheduler
            .ledger()
            .read(|snapshot| {
                if !snapshot.contains_graph(graph_id) {
                    return Err(ConductorError::UnknownGraph(graph_id));
                }
                Ok(report::status_report(snapshot, graph_id))
            })
            .await
    }

    /// "What's next": runnable tasks in dispatch order.
    pub async fn next_actions(&self, graph_id: GraphId) -> Result<Vec<TaskView>, ConductorError> {
        self.scheduler
            .ledger()
            .read(|snapshot| {
                if !snapshot.contains_graph(graph_id) {
                    return Err(ConductorError::UnknownGraph(graph_id));
                }
                Ok(report::next_actionable(snapshot, graph_id))
            })
            .await
    }

    /// Worker callback: an outcome for a dispatched task. Returns whether
    /// this submission settled the attempt.
    pub async fn submit_outcome(
        &self,
        task_id: TaskId,
        outcome: Outcome,
    ) -> Result<bool, ConductorError> {
        self.scheduler.submit_outcome(task_id, outcome).await
    }

    /// Cooperative cancellation of a dispatched task.
    pub async fn cancel(&self, task_id: TaskId) -> Result<(), ConductorError> {
        self.scheduler.cancel(task_id).await
    }

    /// One manual scheduling pass. Tests and single-threaded drivers use
    /// this; long-running processes use [`Conductor::spawn_scheduler`].
    pub async fn tick(&self) -> Result<TickStats, ConductorError> {
        self.scheduler.tick().await
    }

    /// Drive the engine until every task in `graph_id` is terminal, or
    /// until `deadline` elapses. Returns the final status either way.
    pub async fn run_until_settled(
        &self,
        graph_id: GraphId,
        deadline: Duration,
    ) -> Result<StatusReport, ConductorError> {
        let started = Instant::now();
        loop {
            self.tick().await?;
            let report = self.status(graph_id).await?;
            if report.settled || started.elapsed() >= deadline {
                return Ok(report);
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Spawn the background scheduler loop. Dropping the handle does not
    /// stop it; call [`SchedulerHandle::shutdown_and_join`].
    pub fn spawn_scheduler(&self) -> SchedulerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let scheduler = Arc::clone(&self.scheduler);
        let join = tokio::spawn(scheduler.run(shutdown_rx));
        SchedulerHandle { shutdown_tx, join }
    }
}

/// Handle to the background scheduler loop.
pub struct SchedulerHandle {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Stop taking new scheduling passes and wait for the loop to exit.
    /// In-flight worker invocations are not forcibly cancelled.
    pub async fn shutdown_and_join(self) {
        let _ = self.shutdown_tx.send(true);
        let _ = self.join.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Assignment, TaskStatus, WorkerError};
    use crate::graph::TaskBlueprint;
    use crate::policy::{Clause, ClauseCheck};
    use crate::sched::RetryPolicy;
    use async_trait::async_trait;
    use tokio::sync::Mutex;

    fn cap(s: &str) -> Capability {
        Capability::new(s)
    }

    fn caps(tags: &[&str]) -> BTreeSet<Capability> {
        tags.iter().map(|t| cap(t)).collect()
    }

    /// Test-friendly config: tiny backoff, tiny grace, fast ticks.
    fn fast_config() -> EngineConfig {
        EngineConfig {
            cancel_grace: Duration::from_millis(10),
            retry: RetryPolicy {
                base_delay: Duration::from_millis(5),
                multiplier: 1.0,
                max_delay: Duration::from_millis(5),
                jitter: 0.0,
            },
            ..EngineConfig::default()
        }
    }

    /// Returns a fixed outcome and logs the order tasks reached it.
    struct RecordingWorker {
        outcome: Outcome,
        seen: Arc<Mutex<Vec<TaskId>>>,
    }

    #[async_trait]
    impl Worker for RecordingWorker {
        async fn perform(&self, assignment: Assignment) -> Result<Outcome, WorkerError> {
            self.seen.lock().await.push(assignment.task_id);
            Ok(self.outcome.clone())
        }
    }

    /// Never responds; driven externally through `submit_outcome`.
    struct UnresponsiveWorker;

    #[async_trait]
    impl Worker for UnresponsiveWorker {
        async fn perform(&self, _assignment: Assignment) -> Result<Outcome, WorkerError> {
            std::future::pending::<()>().await;
            unreachable!()
        }
    }

    /// Produces a low coverage metric on every attempt.
    struct LowCoverageWorker;

    #[async_trait]
    impl Worker for LowCoverageWorker {
        async fn perform(&self, _assignment: Assignment) -> Result<Outcome, WorkerError> {
            Ok(Outcome::new().with_metric("coverage", 0.1))
        }
    }

    fn coverage_policy(capability: &str, max_attempts: u32) -> ValidationPolicy {
        ValidationPolicy::new(cap(capability), max_attempts).with_clause(Clause::new(
            "coverage-floor",
            ClauseCheck::MetricAtLeast {
                key: "coverage".into(),
                min: 0.8,
            },
        ))
    }

    fn chain_goal() -> Goal {
        // A <- B, A <- C (B and C wait on A).
        Goal::new("ship the widget")
            .with_task(TaskBlueprint::new("a", "extract", cap("build")))
            .with_task(TaskBlueprint::new("b", "wire up", cap("later")).depends_on("a"))
            .with_task(TaskBlueprint::new("c", "write tests", cap("later")).depends_on("a"))
    }

    async fn engine(config: EngineConfig) -> Conductor {
        Conductor::builder().with_config(config).build().await.unwrap()
    }

    #[tokio::test]
    async fn submit_rejects_unknown_capability_without_persisting() {
        let conductor = engine(fast_config()).await;
        conductor
            .register_worker(WorkerId::new("w"), caps(&["build"]), 1, Arc::new(UnresponsiveWorker))
            .await
            .unwrap();

        let goal = Goal::new("g").with_task(TaskBlueprint::new("x", "x", cap("unserved")));
        let err = conductor.submit(&goal).await.unwrap_err();
        assert!(matches!(
            err,
            ConductorError::Graph(crate::error::GraphError::UnknownCapability(_))
        ));
    }

    #[tokio::test]
    async fn happy_path_respects_dependency_order() {
        let conductor = engine(fast_config()).await;
        let seen = Arc::new(Mutex::new(Vec::new()));
        let worker = Arc::new(RecordingWorker {
            outcome: Outcome::new().with_summary("done"),
            seen: Arc::clone(&seen),
        });
        conductor
            .register_worker(WorkerId::new("w"), caps(&["build", "later"]), 4, worker)
            .await
            .unwrap();

        let graph = conductor.submit(&chain_goal()).await.unwrap();
        let report = conductor
            .run_until_settled(graph, Duration::from_secs(5))
            .await
            .unwrap();

        assert!(report.settled);
        assert_eq!(report.counts.completed, 3);
        assert_eq!(report.percent_complete, 100.0);

        let seen = seen.lock().await;
        let a = conductor
            .scheduler
            .ledger()
            .read(|s| {
                s.graph_tasks(graph)
                    .iter()
                    .find(|t| t.spec.title == "extract")
                    .map(|t| t.id())
                    .unwrap()
            })
            .await;
        // The dependency must have been performed strictly first.
        assert_eq!(seen[0], a);
        assert_eq!(seen.len(), 3);
    }

    #[tokio::test]
    async fn next_actionable_is_empty_until_dependency_completes() {
        let conductor = engine(fast_config()).await;
        conductor
            .register_worker(
                WorkerId::new("builder"),
                caps(&["build"]),
                1,
                Arc::new(UnresponsiveWorker),
            )
            .await
            .unwrap();
        // The "later" capability is registered but its only worker is
        // saturated by a decoy graph, so B and C stay Runnable.
        conductor
            .register_worker(
                WorkerId::new("later"),
                caps(&["later"]),
                1,
                Arc::new(UnresponsiveWorker),
            )
            .await
            .unwrap();
        let decoy = Goal::new("decoy").with_task(TaskBlueprint::new("d", "hold", cap("later")));
        let decoy_graph = conductor.submit(&decoy).await.unwrap();
        conductor.tick().await.unwrap();
        conductor.tick().await.unwrap();
        assert_eq!(
            conductor.status(decoy_graph).await.unwrap().counts.dispatched,
            1
        );

        let graph = conductor.submit(&chain_goal()).await.unwrap();
        conductor.tick().await.unwrap(); // A promoted
        conductor.tick().await.unwrap(); // A dispatched
        assert!(conductor.next_actions(graph).await.unwrap().is_empty());

        // A's worker answers; the attempt passes (no policy registered).
        let a = conductor
            .scheduler
            .ledger()
            .read(|s| {
                s.graph_tasks(graph)
                    .iter()
                    .find(|t| t.status == TaskStatus::Dispatched)
                    .map(|t| t.id())
                    .unwrap()
            })
            .await;
        assert!(conductor.submit_outcome(a, Outcome::new()).await.unwrap());

        conductor.tick().await.unwrap(); // B, C promoted; dispatch deferred
        let next = conductor.next_actions(graph).await.unwrap();
        let titles: Vec<&str> = next.iter().map(|v| v.title.as_str()).collect();
        assert_eq!(titles, vec!["wire up", "write tests"]);
    }

    #[tokio::test]
    async fn single_slot_capability_dispatches_exactly_one() {
        let conductor = engine(fast_config()).await;
        conductor
            .register_worker(
                WorkerId::new("solo"),
                caps(&["build"]),
                1,
                Arc::new(UnresponsiveWorker),
            )
            .await
            .unwrap();

        let goal = Goal::new("two at once")
            .with_task(TaskBlueprint::new("x", "x", cap("build")))
            .with_task(TaskBlueprint::new("y", "y", cap("build")));
        let graph = conductor.submit(&goal).await.unwrap();

        conductor.tick().await.unwrap(); // promote both
        conductor.tick().await.unwrap(); // dispatch one

        let report = conductor.status(graph).await.unwrap();
        assert_eq!(report.counts.dispatched, 1);
        assert_eq!(report.counts.runnable, 1);

        // Extra ticks must not sneak the second one in.
        conductor.tick().await.unwrap();
        let report = conductor.status(graph).await.unwrap();
        assert_eq!(report.counts.dispatched, 1);
        assert_eq!(report.counts.runnable, 1);

        // First completes; the freed slot goes to the second.
        let dispatched = conductor
            .scheduler
            .ledger()
            .read(|s| {
                s.graph_tasks(graph)
                    .iter()
                    .find(|t| t.status == TaskStatus::Dispatched)
                    .map(|t| t.id())
                    .unwrap()
            })
            .await;
        conductor.submit_outcome(dispatched, Outcome::new()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await; // cancel grace
        conductor.tick().await.unwrap();

        let report = conductor.status(graph).await.unwrap();
        assert_eq!(report.counts.completed, 1);
        assert_eq!(report.counts.dispatched, 1);
    }

    #[tokio::test]
    async fn failing_validation_exhausts_exactly_max_attempts() {
        let conductor = Conductor::builder()
            .with_config(fast_config())
            .with_policy(coverage_policy("write-tests", 3))
            .build()
            .await
            .unwrap();
        conductor
            .register_worker(
                WorkerId::new("sloppy"),
                caps(&["write-tests"]),
                1,
                Arc::new(LowCoverageWorker),
            )
            .await
            .unwrap();

        let goal = Goal::new("g").with_task(TaskBlueprint::new("t", "t", cap("write-tests")));
        let graph = conductor.submit(&goal).await.unwrap();
        let report = conductor
            .run_until_settled(graph, Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(report.counts.failed, 1);
        let task = conductor
            .scheduler
            .ledger()
            .read(|s| s.graph_tasks(graph)[0].clone())
            .await;
        assert_eq!(task.status, TaskStatus::Failed);
        // Exactly three failed validations, never two or four.
        assert_eq!(task.attempt_count, 3);
        // All three violation sets, concatenated across retries.
        assert_eq!(task.violation_history.len(), 3);
        assert!(task
            .violation_history
            .iter()
            .all(|c| c.as_str() == "coverage-floor"));
        assert!(task.outcome.is_some());
    }

    #[tokio::test]
    async fn retry_carries_corrective_instruction() {
        let conductor = Conductor::builder()
            .with_config(fast_config())
            .with_policy(coverage_policy("write-tests", 3))
            .build()
            .await
            .unwrap();

        /// Fails the coverage floor on attempt 1, then reads the corrective
        /// instruction and fixes what it names.
        struct CorrigibleWorker;

        #[async_trait]
        impl Worker for CorrigibleWorker {
            async fn perform(&self, assignment: Assignment) -> Result<Outcome, WorkerError> {
                match &assignment.corrective {
                    None => Ok(Outcome::new().with_metric("coverage", 0.2)),
                    Some(corrective) => {
                        assert_eq!(corrective.violations[0].as_str(), "coverage-floor");
                        assert_eq!(corrective.original_input, assignment.input);
                        Ok(Outcome::new().with_metric("coverage", 0.95))
                    }
                }
            }
        }

        conductor
            .register_worker(
                WorkerId::new("learner"),
                caps(&["write-tests"]),
                1,
                Arc::new(CorrigibleWorker),
            )
            .await
            .unwrap();

        let goal = Goal::new("g").with_task(TaskBlueprint::new("t", "t", cap("write-tests")));
        let graph = conductor.submit(&goal).await.unwrap();
        let report = conductor
            .run_until_settled(graph, Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(report.counts.completed, 1);
        let task = conductor
            .scheduler
            .ledger()
            .read(|s| s.graph_tasks(graph)[0].clone())
            .await;
        assert_eq!(task.attempt_count, 2);
    }

    #[tokio::test]
    async fn stale_cancelled_invocation_does_not_settle_newer_attempt() {
        let mut config = fast_config();
        config.cancel_grace = Duration::from_millis(200);
        let conductor = Conductor::builder()
            .with_config(config)
            .with_policy(coverage_policy("write-tests", 3))
            .build()
            .await
            .unwrap();
        // Two slots: attempt 2 must be dispatchable while attempt 1's slot
        // is still held through the cancel grace.
        conductor
            .register_worker(
                WorkerId::new("mute"),
                caps(&["write-tests"]),
                2,
                Arc::new(UnresponsiveWorker),
            )
            .await
            .unwrap();

        let goal = Goal::new("g").with_task(TaskBlueprint::new("t", "t", cap("write-tests")));
        let graph = conductor.submit(&goal).await.unwrap();
        conductor.tick().await.unwrap();

        let task_id = conductor
            .scheduler
            .ledger()
            .read(|s| s.graph_tasks(graph)[0].id())
            .await;
        // External outcome fails validation: retry scheduled, attempt 1's
        // pending invocation is cancelled and starts its grace window.
        assert!(conductor
            .submit_outcome(task_id, Outcome::new().with_metric("coverage", 0.1))
            .await
            .unwrap());

        // Backoff (5ms) expires long before the grace; attempt 2 goes out
        // while attempt 1's invocation is still unwinding.
        tokio::time::sleep(Duration::from_millis(20)).await;
        conductor.tick().await.unwrap();
        let task = conductor
            .scheduler
            .ledger()
            .read(|s| s.task(task_id).cloned())
            .await
            .unwrap();
        assert_eq!(task.attempt_count, 2);
        assert_eq!(task.status, TaskStatus::Dispatched);

        // The stale invocation finishes unwinding; attempt 2 is healthy and
        // far from its timeout, so nothing may settle it.
        tokio::time::sleep(Duration::from_millis(400)).await;
        let task = conductor
            .scheduler
            .ledger()
            .read(|s| s.task(task_id).cloned())
            .await
            .unwrap();
        assert_eq!(task.status, TaskStatus::Dispatched);
        assert_eq!(task.attempt_count, 2);
        assert!(task.last_violation.iter().all(|c| c.as_str() != "timeout"));
    }

    #[tokio::test]
    async fn erroring_worker_burns_budget_under_worker_error_clause() {
        /// Never produces an outcome at all.
        struct CrashingWorker;

        #[async_trait]
        impl Worker for CrashingWorker {
            async fn perform(&self, _assignment: Assignment) -> Result<Outcome, WorkerError> {
                Err(WorkerError::new("connection reset"))
            }
        }

        let conductor = Conductor::builder()
            .with_config(fast_config())
            .with_policy(ValidationPolicy::new(cap("build"), 2))
            .build()
            .await
            .unwrap();
        conductor
            .register_worker(
                WorkerId::new("flaky-net"),
                caps(&["build"]),
                1,
                Arc::new(CrashingWorker),
            )
            .await
            .unwrap();

        let goal = Goal::new("g").with_task(TaskBlueprint::new("t", "t", cap("build")));
        let graph = conductor.submit(&goal).await.unwrap();
        let report = conductor
            .run_until_settled(graph, Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(report.counts.failed, 1);
        let task = conductor
            .scheduler
            .ledger()
            .read(|s| s.graph_tasks(graph)[0].clone())
            .await;
        assert_eq!(task.status, TaskStatus::Failed);
        // Worker errors ride the same correction loop as validation
        // failures, so the budget applies uniformly.
        assert_eq!(task.attempt_count, 2);
        assert_eq!(task.violation_history.len(), 2);
        assert!(task
            .violation_history
            .iter()
            .all(|c| c.as_str() == "worker-error"));
        assert_eq!(
            task.outcome.unwrap().summary.as_deref(),
            Some("worker failed to produce an outcome: connection reset")
        );
    }

    #[tokio::test]
    async fn terminal_failure_blocks_dependents_transitively() {
        let conductor = Conductor::builder()
            .with_config(fast_config())
            .with_policy(coverage_policy("build", 1))
            .build()
            .await
            .unwrap();
        conductor
            .register_worker(
                WorkerId::new("sloppy"),
                caps(&["build", "later"]),
                4,
                Arc::new(LowCoverageWorker),
            )
            .await
            .unwrap();

        // A fails; B depends on A; C depends on B.
        let goal = Goal::new("doomed")
            .with_task(TaskBlueprint::new("a", "a", cap("build")))
            .with_task(TaskBlueprint::new("b", "b", cap("later")).depends_on("a"))
            .with_task(TaskBlueprint::new("c", "c", cap("later")).depends_on("b"));
        let graph = conductor.submit(&goal).await.unwrap();
        let report = conductor
            .run_until_settled(graph, Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(report.counts.failed, 1);
        assert_eq!(report.counts.blocked, 2);

        let tasks = conductor
            .scheduler
            .ledger()
            .read(|s| s.graph_tasks(graph).into_iter().cloned().collect::<Vec<_>>())
            .await;
        for task in tasks.iter().filter(|t| t.status == TaskStatus::Blocked) {
            // Blocked without ever being dispatched, violations traceable
            // to the root failure.
            assert_eq!(task.attempt_count, 0);
            assert_eq!(task.last_violation[0].as_str(), "coverage-floor");
        }
    }

    #[tokio::test]
    async fn unresponsive_worker_times_out_with_timeout_violation() {
        let mut config = fast_config();
        config.default_timeout = Duration::from_millis(20);
        let conductor = Conductor::builder()
            .with_config(config)
            .with_policy(ValidationPolicy::new(cap("build"), 1))
            .build()
            .await
            .unwrap();
        conductor
            .register_worker(
                WorkerId::new("mute"),
                caps(&["build"]),
                1,
                Arc::new(UnresponsiveWorker),
            )
            .await
            .unwrap();

        let goal = Goal::new("g").with_task(TaskBlueprint::new("t", "t", cap("build")));
        let graph = conductor.submit(&goal).await.unwrap();
        let report = conductor
            .run_until_settled(graph, Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(report.counts.failed, 1);
        assert_eq!(report.failed[0].last_violation[0].as_str(), "timeout");
        assert_eq!(report.failed[0].attempt_count, 1);
    }

    #[tokio::test]
    async fn cancellation_forces_timeout_failure() {
        let conductor = Conductor::builder()
            .with_config(fast_config())
            .with_policy(ValidationPolicy::new(cap("build"), 1))
            .build()
            .await
            .unwrap();
        conductor
            .register_worker(
                WorkerId::new("mute"),
                caps(&["build"]),
                1,
                Arc::new(UnresponsiveWorker),
            )
            .await
            .unwrap();

        let goal = Goal::new("g").with_task(TaskBlueprint::new("t", "t", cap("build")));
        let graph = conductor.submit(&goal).await.unwrap();
        conductor.tick().await.unwrap();
        conductor.tick().await.unwrap();

        let task_id = conductor
            .scheduler
            .ledger()
            .read(|s| s.graph_tasks(graph)[0].id())
            .await;
        conductor.cancel(task_id).await.unwrap();

        let report = conductor
            .run_until_settled(graph, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(report.counts.failed, 1);
        assert_eq!(report.failed[0].last_violation[0].as_str(), "timeout");
    }

    #[tokio::test]
    async fn background_scheduler_drives_a_graph_to_completion() {
        let conductor = engine(fast_config()).await;
        let seen = Arc::new(Mutex::new(Vec::new()));
        conductor
            .register_worker(
                WorkerId::new("w"),
                caps(&["build", "later"]),
                4,
                Arc::new(RecordingWorker {
                    outcome: Outcome::new(),
                    seen,
                }),
            )
            .await
            .unwrap();

        let handle = conductor.spawn_scheduler();
        let graph = conductor.submit(&chain_goal()).await.unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let report = conductor.status(graph).await.unwrap();
            if report.settled {
                assert_eq!(report.counts.completed, 3);
                break;
            }
            assert!(Instant::now() < deadline, "graph did not settle in time");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        handle.shutdown_and_join().await;
    }

    #[tokio::test]
    async fn status_on_unknown_graph_is_an_error() {
        let conductor = engine(fast_config()).await;
        let err = conductor.status(GraphId::generate()).await.unwrap_err();
        assert!(matches!(err, ConductorError::UnknownGraph(_)));
    }
}
