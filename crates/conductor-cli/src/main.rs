use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::time::{Duration, sleep};
use tracing::info;

use conductor_core::Conductor;
use conductor_core::domain::{Assignment, Capability, Outcome, Worker, WorkerError, WorkerId};
use conductor_core::graph::{Goal, TaskBlueprint, Template};
use conductor_core::policy::{Clause, ClauseCheck, ValidationPolicy};

#[derive(Debug, Deserialize)]
struct ComponentInput {
    goal: String,
}

/// Instant success for the "extract" and "ui" steps.
struct BuilderWorker;

#[async_trait]
impl Worker for BuilderWorker {
    async fn perform(&self, assignment: Assignment) -> Result<Outcome, WorkerError> {
        let input: ComponentInput = serde_json::from_value(assignment.input.clone())
            .map_err(|e| WorkerError::new(format!("input decode: {e}")))?;
        info!(task_id = %assignment.task_id, goal = %input.goal, "building");
        Ok(Outcome::new()
            .with_summary(format!("{} done", assignment.capability))
            .with_file("src/components/settings_form.rs"))
    }
}

/// Produces insufficient coverage for the first N attempts, then reads the
/// corrective instruction and fixes it.
struct FlakyTestWriter {
    remaining_failures: AtomicU32,
}

impl FlakyTestWriter {
    fn new(n: u32) -> Self {
        Self {
            remaining_failures: AtomicU32::new(n),
        }
    }
}

#[async_trait]
impl Worker for FlakyTestWriter {
    async fn perform(&self, assignment: Assignment) -> Result<Outcome, WorkerError> {
        let left = self.remaining_failures.load(Ordering::Relaxed);
        if left > 0 {
            self.remaining_failures.fetch_sub(1, Ordering::Relaxed);
            info!(attempt = assignment.attempt, left, "writing sloppy tests");
            return Ok(Outcome::new()
                .with_summary("tests written, coverage thin")
                .with_metric("coverage", 0.4));
        }
        if let Some(corrective) = &assignment.corrective {
            info!(violations = ?corrective.violations, "correcting per instruction");
        }
        Ok(Outcome::new()
            .with_summary("tests written with full coverage")
            .with_metric("coverage", 0.92))
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    // (A) Engine with a decomposition template and a coverage policy.
    let conductor = Conductor::builder()
        .with_template(Template {
            name: "component".into(),
            blueprints: vec![
                TaskBlueprint::new("extract", "extract the form", Capability::new("extract")),
                TaskBlueprint::new("ui", "wire up the ui", Capability::new("build-ui"))
                    .depends_on("extract"),
                TaskBlueprint::new("tests", "write tests", Capability::new("write-tests"))
                    .depends_on("extract")
                    .with_priority(1),
            ],
        })
        .with_policy(
            ValidationPolicy::new(Capability::new("write-tests"), 3).with_clause(Clause::new(
                "coverage-floor",
                ClauseCheck::MetricAtLeast {
                    key: "coverage".into(),
                    min: 0.8,
                },
            )),
        )
        .build()
        .await?;

    // (B) Workers register themselves under their capability tags.
    conductor
        .register_worker(
            WorkerId::new("builder-1"),
            BTreeSet::from([Capability::new("extract"), Capability::new("build-ui")]),
            2,
            Arc::new(BuilderWorker),
        )
        .await?;
    conductor
        .register_worker(
            WorkerId::new("tester-1"),
            BTreeSet::from([Capability::new("write-tests")]),
            1,
            Arc::new(FlakyTestWriter::new(1)),
        )
        .await?;

    // (C) Background scheduler, then submit the goal.
    let scheduler = conductor.spawn_scheduler();
    let goal = Goal::new("extract the settings form into a component").with_template("component");
    let graph_id = conductor.submit(&goal).await?;
    println!("submitted graph: {graph_id}");

    // (D) Poll until every task is terminal.
    loop {
        let report = conductor.status(graph_id).await?;
        if report.settled {
            println!(
                "settled: {} completed, {} failed, {} blocked ({:.0}% complete)",
                report.counts.completed,
                report.counts.failed,
                report.counts.blocked,
                report.percent_complete,
            );
            for view in report.failed.iter().chain(report.blocked.iter()) {
                println!(
                    "  {} [{}] {:?} violations={:?}",
                    view.id, view.title, view.status, view.last_violation
                );
            }
            break;
        }
        let next = conductor.next_actions(graph_id).await?;
        if !next.is_empty() {
            let titles: Vec<&str> = next.iter().map(|v| v.title.as_str()).collect();
            println!("runnable next: {titles:?}");
        }
        sleep(Duration::from_millis(100)).await;
    }

    scheduler.shutdown_and_join().await;
    Ok(())
}
