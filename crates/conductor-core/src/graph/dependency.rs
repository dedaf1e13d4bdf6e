//! Dependency graph over task ids.
//!
//! Design:
//! - Forward edges: task -> tasks it depends on (waits for)
//! - Reverse edges: task -> tasks that depend on it (waiting tasks)
//! - Invariant: edges and reverse_edges must be kept in sync

use std::collections::{HashMap, HashSet};

use crate::domain::TaskId;

/// Dependency graph for a single task graph.
///
/// Maintains both directions for efficient lookups:
/// - `edges`: TaskId -> set of TaskIds it depends on
/// - `reverse_edges`: TaskId -> set of TaskIds waiting for it
pub struct DependencyGraph {
    edges: HashMap<TaskId, HashSet<TaskId>>,
    reverse_edges: HashMap<TaskId, HashSet<TaskId>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self {
            edges: HashMap::new(),
            reverse_edges: HashMap::new(),
        }
    }

    /// Add a dependency: `task` depends on `depends_on`.
    ///
    /// Updates both directions to keep the invariant.
    pub fn add_dependency(&mut self, task: TaskId, depends_on: TaskId) {
        self.edges.entry(task).or_default().insert(depends_on);
        self.reverse_edges
            .entry(depends_on)
            .or_default()
            .insert(task);
    }

    /// Tasks that are waiting for `task`, directly.
    ///
    /// Note: a waiting task may have other unsatisfied dependencies; the
    /// caller must check the full set before promoting it.
    pub fn dependents_of(&self, task: TaskId) -> Vec<TaskId> {
        self.reverse_edges
            .get(&task)
            .map(|waiting| waiting.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn has_dependencies(&self, task: TaskId) -> bool {
        self.edges.get(&task).is_some_and(|deps| !deps.is_empty())
    }

    pub fn dependencies_of(&self, task: TaskId) -> Vec<TaskId> {
        self.edges
            .get(&task)
            .map(|deps| deps.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Detect a cycle, returning the offending path if one exists.
    ///
    /// Kahn's algorithm: repeatedly strip nodes with no unresolved
    /// dependencies; anything left over participates in a cycle. O(V + E),
    /// and the leftover set gives a concrete path to report.
    pub fn find_cycle(&self) -> Option<Vec<TaskId>> {
        let mut pending: HashMap<TaskId, usize> = HashMap::new();
        for (task, deps) in &self.edges {
            pending.insert(*task, deps.len());
        }
        for task in self.reverse_edges.keys() {
            pending.entry(*task).or_insert(0);
        }

        let mut frontier: Vec<TaskId> = pending
            .iter()
            .filter(|&(_, n)| *n == 0)
            .map(|(id, _)| *id)
            .collect();

        while let Some(done) = frontier.pop() {
            pending.remove(&done);
            for dependent in self.dependents_of(done) {
                if let Some(n) = pending.get_mut(&dependent) {
                    *n -= 1;
                    if *n == 0 {
                        frontier.push(dependent);
                    }
                }
            }
        }

        if pending.is_empty() {
            return None;
        }

        // Everything left depends (transitively) on itself. Walk forward
        // edges within the leftover set until a node repeats.
        let mut remaining: Vec<TaskId> = pending.keys().copied().collect();
        remaining.sort();
        let start = remaining[0];
        let mut path = vec![start];
        let mut seen: HashSet<TaskId> = HashSet::from([start]);
        let mut current = start;
        loop {
            let next = self
                .dependencies_of(current)
                .into_iter()
                .find(|d| pending.contains_key(d))?;
            path.push(next);
            if !seen.insert(next) {
                return Some(path);
            }
            current = next;
        }
    }
}

impl Default for DependencyGraph {
    fn default() -> Self {
        Self::new()
    }
}
