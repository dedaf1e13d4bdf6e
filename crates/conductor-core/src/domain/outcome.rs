//! Outcome model: the structured result a worker reports for one attempt.
//!
//! This module is architecture-agnostic: it does not assume schedulers,
//! registries, or persistence. It only defines the "shape" of results the
//! validator can judge and the ledger can record.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::capability::Capability;

/// Identifier of a validation-policy clause. Violations are reported as
/// ordered lists of these so a corrective instruction can cite the exact
/// contract clauses that were broken.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClauseId(String);

impl ClauseId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ClauseId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// The clause id recorded when a dispatched worker never responds.
pub const TIMEOUT_CLAUSE: &str = "timeout";

/// Structured result of a worker attempt.
///
/// Free-form key/value metadata plus the measurable facts the validator and
/// the recommendation engine care about: files touched, numeric metrics, a
/// narrative summary. BTreeMaps keep serialization order stable, which the
/// ledger replay tests rely on.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    /// Files the worker declares it created or modified.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files_touched: Vec<String>,

    /// Numeric measurements (coverage, latency, counts, ...).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metrics: BTreeMap<String, f64>,

    /// Free-form structured metadata.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,

    /// Narrative summary of what was done.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl Outcome {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    pub fn with_file(mut self, path: impl Into<String>) -> Self {
        self.files_touched.push(path.into());
        self
    }

    pub fn with_metric(mut self, key: impl Into<String>, value: f64) -> Self {
        self.metrics.insert(key.into(), value);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn metric(&self, key: &str) -> Option<f64> {
        self.metrics.get(key).copied()
    }
}

/// The instruction handed to the next attempt after a failed validation:
/// the capability, the original task input, and the ordered list of clauses
/// the previous attempt violated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectiveInstruction {
    pub capability: Capability,
    pub original_input: serde_json::Value,
    pub violations: Vec<ClauseId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_roundtrip_json() {
        let o = Outcome::new()
            .with_summary("extracted Button component")
            .with_file("src/components/button.rs")
            .with_metric("coverage", 0.91)
            .with_metadata("manifest", serde_json::json!({"exports": ["Button"]}));

        let s = serde_json::to_string(&o).unwrap();
        let back: Outcome = serde_json::from_str(&s).unwrap();
        assert_eq!(back, o);
        assert_eq!(back.metric("coverage"), Some(0.91));
    }

    #[test]
    fn empty_fields_are_omitted() {
        let s = serde_json::to_string(&Outcome::new()).unwrap();
        assert_eq!(s, "{}");
    }

    #[test]
    fn corrective_instruction_carries_ordered_violations() {
        let ci = CorrectiveInstruction {
            capability: Capability::new("write-tests"),
            original_input: serde_json::json!({"module": "auth"}),
            violations: vec![ClauseId::new("coverage-floor"), ClauseId::new("manifest")],
        };
        let s = serde_json::to_string(&ci).unwrap();
        let back: CorrectiveInstruction = serde_json::from_str(&s).unwrap();
        assert_eq!(back.violations[0].as_str(), "coverage-floor");
        assert_eq!(back.violations[1].as_str(), "manifest");
    }
}
