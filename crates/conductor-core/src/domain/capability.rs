//! Capability tags: the matchmaking key between tasks and workers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A named skill a worker declares it can perform (e.g. "extract-component",
/// "write-tests"). Tasks require exactly one capability tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Capability(String);

impl Capability {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
