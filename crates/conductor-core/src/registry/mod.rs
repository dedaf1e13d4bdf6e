//! Capability registry: maps capability tags to the workers that serve
//! them, with load accounting and latency history.
//!
//! Built at startup and mutated only through load/latency bookkeeping at
//! dispatch boundaries. An empty candidate list is the capacity-deferral
//! signal — the scheduler defers the task, it does not fail it.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::debug;

use crate::domain::{Capability, Worker, WorkerDescriptor, WorkerId};
use crate::error::ConductorError;

/// Rolling latency window. Enough samples for a stable p95 without
/// unbounded growth.
const LATENCY_WINDOW: usize = 256;

#[derive(Debug, Default, Clone)]
struct LatencyStats {
    samples_secs: Vec<f64>,
}

impl LatencyStats {
    fn record(&mut self, elapsed: Duration) {
        if self.samples_secs.len() == LATENCY_WINDOW {
            self.samples_secs.remove(0);
        }
        self.samples_secs.push(elapsed.as_secs_f64());
    }

    fn len(&self) -> usize {
        self.samples_secs.len()
    }

    fn average(&self) -> Option<f64> {
        if self.samples_secs.is_empty() {
            return None;
        }
        Some(self.samples_secs.iter().sum::<f64>() / self.samples_secs.len() as f64)
    }

    fn p95(&self) -> Option<Duration> {
        if self.samples_secs.is_empty() {
            return None;
        }
        let mut sorted = self.samples_secs.clone();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let idx = ((sorted.len() as f64) * 0.95).ceil() as usize;
        Some(Duration::from_secs_f64(sorted[idx.min(sorted.len()) - 1]))
    }
}

struct WorkerEntry {
    capabilities: BTreeSet<Capability>,
    max_concurrency: u32,
    current_load: u32,
    handle: Arc<dyn Worker>,

    /// Per-capability latency for candidate ordering.
    latency: HashMap<Capability, LatencyStats>,
}

#[derive(Default)]
struct RegistryState {
    workers: HashMap<WorkerId, WorkerEntry>,

    /// Capability-wide latency, used to derive timeouts.
    capability_latency: HashMap<Capability, LatencyStats>,
}

pub struct CapabilityRegistry {
    state: Mutex<RegistryState>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RegistryState::default()),
        }
    }

    /// Register a worker under its declared capability set.
    pub async fn register(
        &self,
        id: WorkerId,
        capabilities: BTreeSet<Capability>,
        max_concurrency: u32,
        handle: Arc<dyn Worker>,
    ) -> Result<(), ConductorError> {
        let mut state = self.state.lock().await;
        if state.workers.contains_key(&id) {
            return Err(ConductorError::DuplicateWorker(id));
        }
        state.workers.insert(
            id,
            WorkerEntry {
                capabilities,
                max_concurrency: max_concurrency.max(1),
                current_load: 0,
                handle,
                latency: HashMap::new(),
            },
        );
        Ok(())
    }

    /// Does any worker serve this capability, regardless of current load?
    /// Used by graph submission to reject unresolvable capabilities.
    pub async fn has_capability(&self, capability: &Capability) -> bool {
        let state = self.state.lock().await;
        state
            .workers
            .values()
            .any(|w| w.capabilities.contains(capability))
    }

    /// Every capability served by at least one registered worker.
    /// Snapshotted by graph submission for capability resolution.
    pub async fn known_capabilities(&self) -> BTreeSet<Capability> {
        let state = self.state.lock().await;
        state
            .workers
            .values()
            .flat_map(|w| w.capabilities.iter().cloned())
            .collect()
    }

    /// Workers that can take this capability right now, best candidate
    /// first: most remaining capacity, then lowest average latency for the
    /// capability, then worker id for determinism. Empty means "defer".
    pub async fn resolve_candidates(&self, capability: &Capability) -> Vec<WorkerDescriptor> {
        let state = self.state.lock().await;
        let mut candidates: Vec<(f64, WorkerDescriptor)> = state
            .workers
            .iter()
            .filter(|(_, w)| w.capabilities.contains(capability))
            .map(|(id, w)| {
                let avg = w
                    .latency
                    .get(capability)
                    .and_then(LatencyStats::average)
                    .unwrap_or(f64::INFINITY);
                let descriptor = WorkerDescriptor {
                    id: id.clone(),
                    capabilities: w.capabilities.clone(),
                    max_concurrency: w.max_concurrency,
                    current_load: w.current_load,
                };
                (avg, descriptor)
            })
            .filter(|(_, d)| d.has_capacity())
            .collect();

        candidates.sort_by(|a, b| {
            b.1.remaining_capacity()
                .cmp(&a.1.remaining_capacity())
                .then_with(|| a.0.total_cmp(&b.0))
                .then_with(|| a.1.id.cmp(&b.1.id))
        });
        candidates.into_iter().map(|(_, d)| d).collect()
    }

    /// Claim one slot on a worker before invoking it. Returns the handle,
    /// or None if the worker is already at its limit (lost race).
    pub async fn begin_dispatch(&self, id: &WorkerId) -> Option<Arc<dyn Worker>> {
        let mut state = self.state.lock().await;
        let entry = state.workers.get_mut(id)?;
        if entry.current_load >= entry.max_concurrency {
            debug!(worker = %id, "dispatch lost capacity race");
            return None;
        }
        entry.current_load += 1;
        Some(Arc::clone(&entry.handle))
    }

    /// Release a slot and record the observed latency. Called on outcome
    /// receipt, success or failure alike.
    pub async fn finish_dispatch(
        &self,
        id: &WorkerId,
        capability: &Capability,
        elapsed: Duration,
    ) {
        let mut state = self.state.lock().await;
        if let Some(entry) = state.workers.get_mut(id) {
            entry.current_load = entry.current_load.saturating_sub(1);
            entry
                .latency
                .entry(capability.clone())
                .or_default()
                .record(elapsed);
        }
        state
            .capability_latency
            .entry(capability.clone())
            .or_default()
            .record(elapsed);
    }

    /// Release a claimed slot without a latency sample (dispatch CAS was
    /// skipped, the worker was never invoked).
    pub async fn release(&self, id: &WorkerId) {
        let mut state = self.state.lock().await;
        if let Some(entry) = state.workers.get_mut(id) {
            entry.current_load = entry.current_load.saturating_sub(1);
        }
    }

    /// Observed p95 latency for a capability, once at least `min_samples`
    /// exist. Feeds the default timeout derivation.
    pub async fn capability_p95(
        &self,
        capability: &Capability,
        min_samples: usize,
    ) -> Option<Duration> {
        let state = self.state.lock().await;
        let stats = state.capability_latency.get(capability)?;
        if stats.len() < min_samples {
            return None;
        }
        stats.p95()
    }
}

impl Default for CapabilityRegistry {
    fn default() -> Self {
        Self::new()
    }
}
