//! Task status machine.

use serde::{Deserialize, Serialize};

/// Task status.
///
/// Transitions:
/// - Pending -> Runnable (all dependencies Completed)
/// - Pending -> Blocked (any dependency terminally Failed or Blocked)
/// - Runnable -> Dispatched (capacity found, worker assigned)
/// - Dispatched -> Validating (outcome received)
/// - Validating -> Completed (policy pass)
/// - Validating -> Runnable (policy fail, attempts remain)
/// - Validating -> Failed (policy fail, attempts exhausted)
///
/// Design note: Using an enum ensures exhaustive matching and prevents
/// invalid states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Waiting for dependencies to complete.
    Pending,

    /// All dependencies completed; eligible for dispatch.
    Runnable,

    /// Assigned to a worker, execution in flight.
    Dispatched,

    /// Outcome received, policy check in progress.
    Validating,

    /// Outcome accepted by the validation policy.
    Completed,

    /// Attempts exhausted, permanently failed.
    Failed,

    /// An upstream dependency failed terminally; never dispatched.
    Blocked,
}

impl TaskStatus {
    /// Terminal statuses admit no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Blocked
        )
    }

    /// Statuses that block dependents terminally.
    pub fn blocks_dependents(self) -> bool {
        matches!(self, TaskStatus::Failed | TaskStatus::Blocked)
    }

    /// Is this task eligible for a dispatch attempt?
    pub fn is_runnable(self) -> bool {
        matches!(self, TaskStatus::Runnable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::completed(TaskStatus::Completed)]
    #[case::failed(TaskStatus::Failed)]
    #[case::blocked(TaskStatus::Blocked)]
    fn terminal_statuses(#[case] status: TaskStatus) {
        assert!(status.is_terminal());
        assert!(!status.is_runnable());
    }

    #[rstest]
    #[case::pending(TaskStatus::Pending)]
    #[case::runnable(TaskStatus::Runnable)]
    #[case::dispatched(TaskStatus::Dispatched)]
    #[case::validating(TaskStatus::Validating)]
    fn live_statuses(#[case] status: TaskStatus) {
        assert!(!status.is_terminal());
    }

    #[test]
    fn only_failure_family_blocks_dependents() {
        assert!(TaskStatus::Failed.blocks_dependents());
        assert!(TaskStatus::Blocked.blocks_dependents());
        assert!(!TaskStatus::Completed.blocks_dependents());
    }

    #[test]
    fn status_serializes_snake_case() {
        let s = serde_json::to_string(&TaskStatus::Runnable).unwrap();
        assert_eq!(s, "\"runnable\"");
    }
}
