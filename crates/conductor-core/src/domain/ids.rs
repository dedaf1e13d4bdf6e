//! Strongly-typed identifiers.
//!
//! Graph and task ids are ULIDs behind a phantom-typed `Id<T>` so the two
//! can never be mixed up at a call site. ULIDs sort by creation time, which
//! gives us a free secondary ordering for audit output; scheduling order is
//! decided by the ledger sequence number, not the id.
//!
//! Worker ids are caller-chosen strings (workers register themselves under
//! whatever name they advertise), so `WorkerId` is a plain newtype.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use ulid::Ulid;

/// Marker trait providing the Display prefix for each id kind.
pub trait IdMarker: Send + Sync + 'static {
    fn prefix() -> &'static str;
}

#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Id<T: IdMarker> {
    ulid: Ulid,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    pub fn generate() -> Self {
        Self::from_ulid(Ulid::new())
    }

    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Graph {}

impl IdMarker for Graph {
    fn prefix() -> &'static str {
        "graph-"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Task {}

impl IdMarker for Task {
    fn prefix() -> &'static str {
        "task-"
    }
}

/// Identifier of a task graph (submit/status/next unit).
pub type GraphId = Id<Graph>;

/// Identifier of a task (schedulable unit within a graph).
pub type TaskId = Id<Task>;

/// Identifier of a registered worker. Chosen by the worker at registration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkerId(String);

impl WorkerId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_distinct_types() {
        let ulid = Ulid::new();
        let graph = GraphId::from_ulid(ulid);
        let task = TaskId::from_ulid(ulid);

        assert_eq!(graph.as_ulid(), ulid);
        assert_eq!(task.as_ulid(), ulid);

        assert!(graph.to_string().starts_with("graph-"));
        assert!(task.to_string().starts_with("task-"));

        // The whole point: you can't accidentally mix these types.
        // let _: GraphId = task; // <- does not compile
    }

    #[test]
    fn ids_sort_by_creation_time() {
        let a = TaskId::generate();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = TaskId::generate();
        assert!(a < b);
    }

    #[test]
    fn ids_roundtrip_through_json() {
        let id = TaskId::generate();
        let s = serde_json::to_string(&id).unwrap();
        let back: TaskId = serde_json::from_str(&s).unwrap();
        assert_eq!(id, back);
    }

    #[test]
    fn phantom_marker_is_zero_sized() {
        use std::mem::size_of;
        assert_eq!(size_of::<TaskId>(), size_of::<Ulid>());
        assert_eq!(size_of::<GraphId>(), size_of::<Ulid>());
    }
}
