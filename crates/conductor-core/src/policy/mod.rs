//! Validation policies: ordered pass/fail clauses per capability.
//!
//! A policy is an ordered list of named clauses, each a predicate over an
//! `Outcome`. Evaluation short-circuits only on *fatal* clauses (e.g. a
//! missing required field makes further checks meaningless); all non-fatal
//! clauses are evaluated so the correction loop gets one complete violation
//! list instead of iterating clause-by-clause.
//!
//! Policies are immutable at run time. Swapping one is an administrative
//! operation on the engine, not a task-time mutation.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::domain::{Capability, ClauseId, Outcome};

/// Predicate over an outcome. The built-in checks cover the common
/// contract shapes; `Custom` is the escape hatch.
#[derive(Clone)]
pub enum ClauseCheck {
    /// `metrics[key] >= min`.
    MetricAtLeast { key: String, min: f64 },

    /// A metadata key must be present.
    RequireMetadata { key: String },

    /// A narrative summary must be present and non-empty.
    RequireSummary,

    /// Every touched file must sit under one of the allowed path prefixes
    /// (no destructive edit outside the declared file set).
    FilesWithin { allowed: Vec<String> },

    /// Arbitrary predicate.
    Custom(Arc<dyn Fn(&Outcome) -> bool + Send + Sync>),
}

impl ClauseCheck {
    fn passes(&self, outcome: &Outcome) -> bool {
        match self {
            ClauseCheck::MetricAtLeast { key, min } => {
                outcome.metric(key).is_some_and(|v| v >= *min)
            }
            ClauseCheck::RequireMetadata { key } => outcome.metadata.contains_key(key),
            ClauseCheck::RequireSummary => {
                outcome.summary.as_deref().is_some_and(|s| !s.trim().is_empty())
            }
            ClauseCheck::FilesWithin { allowed } => outcome
                .files_touched
                .iter()
                .all(|f| allowed.iter().any(|prefix| f.starts_with(prefix))),
            ClauseCheck::Custom(f) => f(outcome),
        }
    }
}

impl fmt::Debug for ClauseCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClauseCheck::MetricAtLeast { key, min } => {
                write!(f, "MetricAtLeast({key} >= {min})")
            }
            ClauseCheck::RequireMetadata { key } => write!(f, "RequireMetadata({key})"),
            ClauseCheck::RequireSummary => write!(f, "RequireSummary"),
            ClauseCheck::FilesWithin { allowed } => write!(f, "FilesWithin({allowed:?})"),
            ClauseCheck::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

/// One named contract clause.
#[derive(Debug, Clone)]
pub struct Clause {
    pub id: ClauseId,
    pub fatal: bool,
    pub check: ClauseCheck,
}

impl Clause {
    pub fn new(id: impl Into<String>, check: ClauseCheck) -> Self {
        Self {
            id: ClauseId::new(id),
            fatal: false,
            check,
        }
    }

    pub fn fatal(mut self) -> Self {
        self.fatal = true;
        self
    }
}

/// The validator's answer: pass/fail plus every violated clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub pass: bool,
    pub violations: Vec<ClauseId>,
}

/// Validation policy for one capability.
#[derive(Debug, Clone)]
pub struct ValidationPolicy {
    pub capability: Capability,
    pub clauses: Vec<Clause>,

    /// Retry budget for tasks of this capability.
    pub max_attempts: u32,
}

impl ValidationPolicy {
    pub fn new(capability: Capability, max_attempts: u32) -> Self {
        Self {
            capability,
            clauses: Vec::new(),
            max_attempts,
        }
    }

    pub fn with_clause(mut self, clause: Clause) -> Self {
        self.clauses.push(clause);
        self
    }

    /// Apply the clause list in declaration order. A violated fatal clause
    /// short-circuits; non-fatal violations accumulate.
    pub fn validate(&self, outcome: &Outcome) -> Verdict {
        let mut violations = Vec::new();
        for clause in &self.clauses {
            if clause.check.passes(outcome) {
                continue;
            }
            violations.push(clause.id.clone());
            if clause.fatal {
                break;
            }
        }
        Verdict {
            pass: violations.is_empty(),
            violations,
        }
    }
}

/// All policies, keyed by capability. Capabilities without a policy get a
/// trivially-passing one with the default retry budget.
pub struct PolicySet {
    policies: HashMap<Capability, ValidationPolicy>,
    default_max_attempts: u32,
}

impl PolicySet {
    pub fn new(default_max_attempts: u32) -> Self {
        Self {
            policies: HashMap::new(),
            default_max_attempts,
        }
    }

    pub fn with_policy(mut self, policy: ValidationPolicy) -> Self {
        self.policies.insert(policy.capability.clone(), policy);
        self
    }

    pub fn max_attempts_for(&self, capability: &Capability) -> u32 {
        self.policies
            .get(capability)
            .map(|p| p.max_attempts)
            .unwrap_or(self.default_max_attempts)
    }

    pub fn validate(&self, capability: &Capability, outcome: &Outcome) -> Verdict {
        match self.policies.get(capability) {
            Some(policy) => policy.validate(outcome),
            None => Verdict {
                pass: true,
                violations: Vec::new(),
            },
        }
    }
}
