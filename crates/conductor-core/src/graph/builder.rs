//! Graph builder: turns a goal into a dependency-ordered set of task specs.
//!
//! Pure construction: nothing here touches the ledger. The engine commits
//! the returned `TaskSet` as one batch so a partially-built graph is never
//! partially visible.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

use super::dependency::DependencyGraph;
use crate::domain::{Capability, TaskId, TaskSpec};
use crate::error::GraphError;

/// A high-level goal: either an explicit decomposition, or a reference to a
/// named template that provides one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Goal {
    pub description: String,

    /// Named, pre-vetted decomposition pattern to expand.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,

    /// Explicit decomposition (ignored when a template is named).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tasks: Vec<TaskBlueprint>,
}

impl Goal {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            template: None,
            tasks: Vec::new(),
        }
    }

    pub fn with_template(mut self, name: impl Into<String>) -> Self {
        self.template = Some(name.into());
        self
    }

    pub fn with_task(mut self, task: TaskBlueprint) -> Self {
        self.tasks.push(task);
        self
    }
}

/// One task in a decomposition, before ids are allocated. Dependencies are
/// symbolic references to sibling blueprint names.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskBlueprint {
    /// Symbolic name, referenced by sibling `depends_on` entries.
    pub name: String,
    pub title: String,
    pub capability: Capability,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,

    #[serde(default)]
    pub priority: i32,

    /// Blueprint-specific parameters, merged with the goal description
    /// into the task input.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl TaskBlueprint {
    pub fn new(
        name: impl Into<String>,
        title: impl Into<String>,
        capability: Capability,
    ) -> Self {
        Self {
            name: name.into(),
            title: title.into(),
            capability,
            depends_on: Vec::new(),
            priority: 0,
            params: None,
        }
    }

    pub fn depends_on(mut self, name: impl Into<String>) -> Self {
        self.depends_on.push(name.into());
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_params(mut self, params: serde_json::Value) -> Self {
        self.params = Some(params);
        self
    }
}

/// A named, pre-vetted decomposition pattern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    pub name: String,
    pub blueprints: Vec<TaskBlueprint>,
}

/// The built graph: task specs in creation order. Nothing is persisted yet.
#[derive(Debug, Clone)]
pub struct TaskSet {
    pub tasks: Vec<TaskSpec>,
}

impl TaskSet {
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

/// Builds task sets from goals; holds the template library.
#[derive(Default)]
pub struct GraphBuilder {
    templates: HashMap<String, Template>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self {
            templates: HashMap::new(),
        }
    }

    /// Templates are an administrative concern; last registration wins.
    pub fn register_template(&mut self, template: Template) {
        self.templates.insert(template.name.clone(), template);
    }

    /// Build a task set from a goal.
    ///
    /// `has_capability` reports whether any registered worker serves a tag;
    /// `max_attempts_for` supplies the per-capability retry budget. Both are
    /// closures so the builder stays decoupled from registry and policy.
    pub fn build(
        &self,
        goal: &Goal,
        has_capability: impl Fn(&Capability) -> bool,
        max_attempts_for: impl Fn(&Capability) -> u32,
    ) -> Result<TaskSet, GraphError> {
        let blueprints: &[TaskBlueprint] = match &goal.template {
            Some(name) => {
                let template = self
                    .templates
                    .get(name)
                    .ok_or_else(|| GraphError::UnknownTemplate(name.clone()))?;
                &template.blueprints
            }
            None => &goal.tasks,
        };

        if blueprints.is_empty() {
            return Err(GraphError::EmptyGraph);
        }

        // Allocate ids first so dependency edges can point at siblings.
        let mut ids_by_name: HashMap<&str, TaskId> = HashMap::new();
        for bp in blueprints {
            ids_by_name.insert(bp.name.as_str(), TaskId::generate());
        }

        let mut deps = DependencyGraph::new();
        let mut tasks = Vec::with_capacity(blueprints.len());
        for bp in blueprints {
            if !has_capability(&bp.capability) {
                return Err(GraphError::UnknownCapability(bp.capability.clone()));
            }

            let id = ids_by_name[bp.name.as_str()];
            let mut dependencies = BTreeSet::new();
            for reference in &bp.depends_on {
                if reference == &bp.name {
                    return Err(GraphError::SelfDependency(bp.name.clone()));
                }
                let dep_id = ids_by_name.get(reference.as_str()).copied().ok_or_else(|| {
                    GraphError::UnknownDependency {
                        task: bp.name.clone(),
                        reference: reference.clone(),
                    }
                })?;
                dependencies.insert(dep_id);
                deps.add_dependency(id, dep_id);
            }

            tasks.push(TaskSpec {
                id,
                title: bp.title.clone(),
                capability: bp.capability.clone(),
                dependencies,
                priority: bp.priority,
                input: task_input(goal, bp),
                max_attempts: max_attempts_for(&bp.capability),
            });
        }

        if let Some(cycle) = deps.find_cycle() {
            return Err(GraphError::Cycle(cycle));
        }

        Ok(TaskSet { tasks })
    }
}

/// The worker sees the goal description plus the blueprint's own params.
fn task_input(goal: &Goal, bp: &TaskBlueprint) -> serde_json::Value {
    let mut input = serde_json::json!({ "goal": goal.description });
    if let Some(serde_json::Value::Object(params)) = &bp.params {
        let obj = input.as_object_mut().expect("input is an object");
        for (k, v) in params {
            obj.insert(k.clone(), v.clone());
        }
    }
    input
}
