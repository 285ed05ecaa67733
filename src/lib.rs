//! Devtrack: dependency-aware task tracking over a YAML status document.
//!
//! The whole document is loaded on open, queried or mutated in memory, and
//! written back in full after each state transition. Tasks move from
//! `blocked` to `ready` once every prerequisite listed in the dependency
//! graph is `completed`.
//!
//! # Example
//!
//! ```no_run
//! use devtrack::{Store, TaskStatus};
//! use std::path::Path;
//!
//! let mut store = Store::open(Path::new("DEVELOPMENT_STATUS.yaml")).unwrap();
//!
//! // Pick up the most urgent ready task
//! let id = store.next_available_task().map(|t| t.id).unwrap();
//! store.start_task(id, "worker-1").unwrap();
//!
//! // Finish it; dependents with all prerequisites done become ready
//! let done = store.complete_task(id, "worker-1", "3f9c2ab").unwrap();
//! for ready in done.unblocked {
//!     assert_eq!(store.find_task(ready).unwrap().status, TaskStatus::Ready);
//! }
//! ```

mod lock;
mod ordered;
mod storage;
mod store;
mod types;

// Re-export public API
pub use ordered::OrderedMap;
pub use storage::DEFAULT_STATUS_FILE;
pub use store::{Completion, Store, StoreError};
pub use types::{
    Action, ActivityEntry, DependencyEntry, DependencyGraph, StatusDocument, Task, TaskId, TaskStatus, ValidationError,
};
