//! Scheduler/dispatcher: promotes, dispatches, and settles tasks.
//!
//! Each scheduling tick is idempotent: every status change is a CAS
//! against the ledger, so concurrent ticks (or a tick racing an outcome
//! callback) never double-dispatch a task. A task with no available
//! candidate simply stays Runnable and is retried on the next tick.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{TimeDelta, Utc};
use tokio::sync::{Mutex, watch};
use tracing::{debug, error, info, warn};

use crate::config::EngineConfig;
use crate::domain::{
    Assignment, Capability, ClauseId, Outcome, TaskId, TaskStatus, Worker, WorkerId,
    TIMEOUT_CLAUSE,
};
use crate::error::ConductorError;
use crate::ledger::{Ledger, TransitionPayload};
use crate::policy::PolicySet;
use crate::registry::CapabilityRegistry;

use super::correction::{Correction, CorrectionLoop};

/// Clause recorded when a worker errors instead of producing an outcome.
pub const WORKER_ERROR_CLAUSE: &str = "worker-error";

/// What one scheduling pass did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickStats {
    pub promoted: usize,
    pub blocked: usize,
    pub dispatched: usize,
}

enum InvokeResult {
    Finished(Result<Outcome, crate::domain::WorkerError>),
    TimedOut,
    Cancelled,
}

pub struct Scheduler {
    ledger: Arc<Ledger>,
    registry: Arc<CapabilityRegistry>,
    policies: Arc<PolicySet>,
    correction: CorrectionLoop,
    config: EngineConfig,

    /// Cancel signals for in-flight worker invocations, keyed by task with
    /// the attempt number the invocation belongs to.
    inflight: Mutex<HashMap<TaskId, (u32, watch::Sender<bool>)>>,
}

impl Scheduler {
    pub fn new(
        ledger: Arc<Ledger>,
        registry: Arc<CapabilityRegistry>,
        policies: Arc<PolicySet>,
        config: EngineConfig,
    ) -> Self {
        Self {
            ledger,
            registry,
            policies,
            correction: CorrectionLoop::new(config.retry.clone()),
            config,
            inflight: Mutex::new(HashMap::new()),
        }
    }

    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    pub fn registry(&self) -> &Arc<CapabilityRegistry> {
        &self.registry
    }

    /// One scheduling pass: cascade blocks, promote, dispatch.
    pub async fn tick(self: &Arc<Self>) -> Result<TickStats, ConductorError> {
        let mut stats = TickStats::default();

        // Phase 1: settle Pending tasks whose dependency sets have resolved.
        let (to_promote, to_block) = self
            .ledger
            .read(|snapshot| {
                let mut promote = Vec::new();
                let mut block = Vec::new();
                for task in snapshot.tasks() {
                    if task.status != TaskStatus::Pending {
                        continue;
                    }
                    if let Some(root) = snapshot.blocking_dependency(task) {
                        block.push((task.id(), root.id(), root.last_violation.clone()));
                    } else if snapshot.dependencies_satisfied(task) {
                        promote.push(task.id());
                    }
                }
                (promote, block)
            })
            .await;

        for (task_id, root, violations) in to_block {
            let applied = self
                .ledger
                .transition(
                    task_id,
                    TaskStatus::Pending,
                    TaskStatus::Blocked,
                    TransitionPayload::BlockedBy { root, violations },
                )
                .await?;
            if applied {
                warn!(%task_id, %root, "task blocked by upstream failure");
                stats.blocked += 1;
            }
        }
        for task_id in to_promote {
            if self
                .ledger
                .transition(
                    task_id,
                    TaskStatus::Pending,
                    TaskStatus::Runnable,
                    TransitionPayload::Promoted,
                )
                .await?
            {
                stats.promoted += 1;
            }
        }

        // Phase 2: dispatch runnable tasks, priority desc then FIFO.
        let now = Utc::now();
        let mut runnable = self
            .ledger
            .read(|snapshot| {
                snapshot
                    .tasks()
                    .filter(|t| t.is_dispatchable(now))
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .await;
        runnable.sort_by(|a, b| {
            b.spec
                .priority
                .cmp(&a.spec.priority)
                .then_with(|| a.created_seq.cmp(&b.created_seq))
        });

        for task in runnable {
            let candidates = self.registry.resolve_candidates(task.capability()).await;
            if candidates.is_empty() {
                // Capacity deferral: not an error, retried next tick.
                debug!(task_id = %task.id(), capability = %task.capability(), "no candidate, deferring");
                continue;
            }
            for candidate in candidates {
                let Some(handle) = self.registry.begin_dispatch(&candidate.id).await else {
                    continue;
                };
                let attempt = task.attempt_count + 1;
                let applied = self
                    .ledger
                    .transition(
                        task.id(),
                        TaskStatus::Runnable,
                        TaskStatus::Dispatched,
                        TransitionPayload::Assigned {
                            worker: candidate.id.clone(),
                            attempt,
                        },
                    )
                    .await?;
                if !applied {
                    // Another tick got here first; give the slot back.
                    self.registry.release(&candidate.id).await;
                    break;
                }

                info!(task_id = %task.id(), worker = %candidate.id, attempt, "dispatched");
                let assignment = Assignment {
                    task_id: task.id(),
                    graph_id: task.graph_id,
                    capability: task.capability().clone(),
                    input: task.spec.input.clone(),
                    attempt,
                    corrective: task.corrective.clone(),
                };
                self.spawn_invocation(candidate.id.clone(), handle, assignment)
                    .await;
                stats.dispatched += 1;
                break;
            }
        }

        Ok(stats)
    }

    async fn spawn_invocation(
        self: &Arc<Self>,
        worker_id: WorkerId,
        handle: Arc<dyn Worker>,
        assignment: Assignment,
    ) {
        let task_id = assignment.task_id;
        let attempt = assignment.attempt;
        let capability = assignment.capability.clone();
        let timeout = self.timeout_for(&capability).await;

        let (cancel_tx, cancel_rx) = watch::channel(false);
        self.inflight
            .lock()
            .await
            .insert(task_id, (attempt, cancel_tx));

        let scheduler = Arc::clone(self);
        tokio::spawn(async move {
            let started = Instant::now();
            let result = invoke(
                handle,
                assignment,
                timeout,
                scheduler.config.cancel_grace,
                cancel_rx,
            )
            .await;
            {
                // A newer attempt may have replaced our entry; only remove
                // our own.
                let mut inflight = scheduler.inflight.lock().await;
                if inflight.get(&task_id).is_some_and(|(a, _)| *a == attempt) {
                    inflight.remove(&task_id);
                }
            }
            scheduler
                .registry
                .finish_dispatch(&worker_id, &capability, started.elapsed())
                .await;

            let settled = match result {
                InvokeResult::Finished(Ok(outcome)) => {
                    scheduler.settle_attempt(task_id, attempt, outcome, None).await
                }
                InvokeResult::Finished(Err(err)) => {
                    warn!(%task_id, %err, "worker failed to produce an outcome");
                    scheduler
                        .settle_attempt(
                            task_id,
                            attempt,
                            Outcome::new().with_summary(err.to_string()),
                            Some(ClauseId::new(WORKER_ERROR_CLAUSE)),
                        )
                        .await
                }
                InvokeResult::TimedOut | InvokeResult::Cancelled => {
                    scheduler
                        .settle_attempt(
                            task_id,
                            attempt,
                            Outcome::new().with_summary("worker did not respond in time"),
                            Some(ClauseId::new(TIMEOUT_CLAUSE)),
                        )
                        .await
                }
            };
            if let Err(err) = settled {
                error!(%task_id, %err, "failed to settle attempt");
            }
        });
    }

    /// Outcome callback: validate and either accept, schedule a corrective
    /// retry, or fail terminally. `forced` bypasses the policy with a
    /// synthetic violation (timeout, worker error).
    ///
    /// `attempt` must match the task's current attempt: an invocation that
    /// outlives its attempt (cancelled, then the task re-dispatched) would
    /// otherwise observe the newer attempt's Dispatched status and pass the
    /// CAS. Returns whether this call settled the attempt (false = stale or
    /// someone else already did; the guards make duplicates harmless).
    pub async fn settle_attempt(
        &self,
        task_id: TaskId,
        attempt: u32,
        outcome: Outcome,
        forced: Option<ClauseId>,
    ) -> Result<bool, ConductorError> {
        let Some(task) = self.ledger.read(|s| s.task(task_id).cloned()).await else {
            return Err(ConductorError::UnknownTask(task_id));
        };
        if task.attempt_count != attempt {
            debug!(
                %task_id,
                attempt,
                current = task.attempt_count,
                "stale settlement ignored"
            );
            return Ok(false);
        }
        let Some(worker) = task.assigned_worker.clone() else {
            debug!(%task_id, "outcome for unassigned task ignored");
            return Ok(false);
        };

        let applied = self
            .ledger
            .transition(
                task_id,
                TaskStatus::Dispatched,
                TaskStatus::Validating,
                TransitionPayload::OutcomeReceived {
                    worker,
                    outcome: outcome.clone(),
                },
            )
            .await?;
        if !applied {
            return Ok(false);
        }

        let violations = match forced {
            Some(clause) => vec![clause],
            None => {
                self.policies
                    .validate(task.capability(), &outcome)
                    .violations
            }
        };

        if violations.is_empty() {
            self.ledger
                .transition(
                    task_id,
                    TaskStatus::Validating,
                    TaskStatus::Completed,
                    TransitionPayload::Accepted,
                )
                .await?;
            info!(%task_id, "completed");
            return Ok(true);
        }

        // Re-read so the correction loop sees the attempt we just recorded.
        let task = self
            .ledger
            .read(|s| s.task(task_id).cloned())
            .await
            .ok_or(ConductorError::UnknownTask(task_id))?;
        match self.correction.decide(&task, &violations) {
            Correction::Retry { delay, corrective } => {
                let next_eligible_at = Utc::now()
                    + TimeDelta::from_std(delay).unwrap_or(TimeDelta::MAX);
                info!(
                    %task_id,
                    attempt = task.attempt_count,
                    ?violations,
                    ?delay,
                    "validation failed, scheduling corrective retry"
                );
                self.ledger
                    .transition(
                        task_id,
                        TaskStatus::Validating,
                        TaskStatus::Runnable,
                        TransitionPayload::RetryScheduled {
                            violations,
                            corrective,
                            next_eligible_at,
                        },
                    )
                    .await?;
            }
            Correction::FailTerminally => {
                warn!(%task_id, attempts = task.attempt_count, "attempts exhausted, failing terminally");
                self.ledger
                    .transition(
                        task_id,
                        TaskStatus::Validating,
                        TaskStatus::Failed,
                        TransitionPayload::Exhausted { violations },
                    )
                    .await?;
            }
        }
        Ok(true)
    }

    /// External worker callback: the worker for `task_id` reports its
    /// outcome. If an in-process invocation is pending it is cancelled (it
    /// loses the CAS anyway and would otherwise idle until its timeout).
    pub async fn submit_outcome(
        &self,
        task_id: TaskId,
        outcome: Outcome,
    ) -> Result<bool, ConductorError> {
        let Some(attempt) = self
            .ledger
            .read(|s| s.task(task_id).map(|t| t.attempt_count))
            .await
        else {
            return Err(ConductorError::UnknownTask(task_id));
        };
        let settled = self.settle_attempt(task_id, attempt, outcome, None).await?;
        if settled
            && let Some((_, cancel)) = self.inflight.lock().await.get(&task_id)
        {
            let _ = cancel.send(true);
        }
        Ok(settled)
    }

    /// Cooperative cancellation of a dispatched task. The worker gets the
    /// configured grace period to respond; failing that, the attempt is
    /// forced to a `"timeout"` validation failure (counting against the
    /// retry budget).
    pub async fn cancel(&self, task_id: TaskId) -> Result<(), ConductorError> {
        if self.ledger.read(|s| s.task(task_id).cloned()).await.is_none() {
            return Err(ConductorError::UnknownTask(task_id));
        }
        if let Some((_, cancel)) = self.inflight.lock().await.get(&task_id) {
            info!(%task_id, "cancellation requested");
            let _ = cancel.send(true);
        }
        Ok(())
    }

    async fn timeout_for(&self, capability: &Capability) -> Duration {
        if let Some(timeout) = self.config.timeout_overrides.get(capability) {
            return *timeout;
        }
        if let Some(p95) = self
            .registry
            .capability_p95(capability, self.config.p95_min_samples)
            .await
        {
            return p95.mul_f64(self.config.p95_timeout_factor);
        }
        self.config.default_timeout
    }

    /// Scheduler loop: tick on ledger change notifications, and at least every
    /// `tick_interval` so backoff gates expire. Mirrors the worker-loop
    /// shutdown protocol: dropping or flipping the watch sender stops it.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                break;
            }
            if let Err(err) = self.tick().await {
                error!(%err, "scheduling tick failed");
            }
            tokio::select! {
                _ = shutdown.changed() => continue,
                _ = self.ledger.changed() => {}
                _ = tokio::time::sleep(self.config.tick_interval) => {}
            }
        }
        debug!("scheduler loop stopped");
    }
}

/// Drive one worker invocation under a timeout and a cancel signal.
///
/// Cancellation is cooperative: on a cancel signal the worker gets `grace`
/// to finish before the invocation is abandoned.
async fn invoke(
    worker: Arc<dyn Worker>,
    assignment: Assignment,
    timeout: Duration,
    grace: Duration,
    mut cancel_rx: watch::Receiver<bool>,
) -> InvokeResult {
    let perform = worker.perform(assignment);
    tokio::pin!(perform);
    tokio::select! {
        result = &mut perform => InvokeResult::Finished(result),
        _ = tokio::time::sleep(timeout) => InvokeResult::TimedOut,
        _ = cancel_rx.changed() => {
            tokio::select! {
                result = &mut perform => InvokeResult::Finished(result),
                _ = tokio::time::sleep(grace) => InvokeResult::Cancelled,
            }
        }
    }
}
