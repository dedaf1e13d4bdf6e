//! Goal decomposition: templates, blueprints, and cycle checking.

mod builder;
mod dependency;

pub use builder::{Goal, GraphBuilder, TaskBlueprint, TaskSet, Template};
pub use dependency::DependencyGraph;
