//! Correction loop: what happens after a failed validation.
//!
//! Pure decision logic, no side effects: given the task record and the
//! violation list, return the next move. The dispatcher executes it. This
//! keeps the retry/fail judgment testable in isolation.

use std::time::Duration;

use crate::domain::{ClauseId, CorrectiveInstruction, TaskRecord};

use super::retry::RetryPolicy;

/// The next move for a task whose outcome violated policy.
#[derive(Debug, Clone, PartialEq)]
pub enum Correction {
    /// Re-enter Runnable after `delay`, carrying the corrective
    /// instruction for the next attempt.
    Retry {
        delay: Duration,
        corrective: CorrectiveInstruction,
    },

    /// Attempts exhausted: fail terminally. Dependents will cascade to
    /// Blocked.
    FailTerminally,
}

#[derive(Debug, Clone)]
pub struct CorrectionLoop {
    retry: RetryPolicy,
}

impl CorrectionLoop {
    pub fn new(retry: RetryPolicy) -> Self {
        Self { retry }
    }

    /// Decide retry or terminal failure.
    ///
    /// `task.attempt_count` already includes the attempt that just failed,
    /// so exhaustion is `attempt_count >= max_attempts` — a budget of N
    /// yields exactly N failed validations before Failed, never N+1.
    pub fn decide(&self, task: &TaskRecord, violations: &[ClauseId]) -> Correction {
        if task.attempt_count >= task.spec.max_attempts {
            return Correction::FailTerminally;
        }
        Correction::Retry {
            delay: self.retry.next_delay(task.attempt_count),
            corrective: CorrectiveInstruction {
                capability: task.spec.capability.clone(),
                original_input: task.spec.input.clone(),
                violations: violations.to_vec(),
            },
        }
    }
}
