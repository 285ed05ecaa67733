//! Shared test infrastructure for devtrack integration tests.
//!
//! Provides TestEnv helper for consistent test setup/teardown.

#![allow(dead_code)]

use devtrack::{StatusDocument, Store, StoreError, Task, TaskStatus};
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// Two tasks: 1 is ready, 2 is blocked on 1.
pub const SCENARIO: &str = r#"
next_available_tasks:
  - id: 1
    title: Set up workspace
    status: ready
    assigned_to: null
    priority: 1
  - id: 2
    title: Implement parser
    status: blocked
    assigned_to: null
    priority: 2
    prerequisites_met: false
    blocked_by: [1]
dependency_graph:
  phase_1:
    core:
      - id: 1
        dependencies: []
      - id: 2
        dependencies: [1]
"#;

/// A small project: a diamond (1 -> 2,3 -> 4) plus a chain (4 -> 5 -> 6)
/// and an independent task 7.
pub const PROJECT: &str = r#"
project:
  name: demo
  version: 0.3.0
next_available_tasks:
  - id: 1
    title: Foundation
    status: ready
    assigned_to: null
    priority: 1
  - id: 2
    title: Left
    status: blocked
    assigned_to: null
    priority: 2
    blocked_by: [1]
  - id: 3
    title: Right
    status: blocked
    assigned_to: null
    priority: 2
    blocked_by: [1]
  - id: 4
    title: Join
    status: blocked
    assigned_to: null
    priority: 3
    blocked_by: [2, 3]
  - id: 5
    title: Chain one
    status: blocked
    assigned_to: null
    priority: 4
    blocked_by: [4]
  - id: 6
    title: Chain two
    status: blocked
    assigned_to: null
    priority: 5
    blocked_by: [5]
  - id: 7
    title: Docs
    status: ready
    assigned_to: null
    priority: 3
dependency_graph:
  phase_1:
    core:
      - id: 1
        dependencies: []
      - id: 2
        dependencies: [1]
      - id: 3
        dependencies: [1]
  phase_2:
    integration:
      - id: 4
        dependencies: [2, 3]
    chain:
      - id: 5
        dependencies: [4]
      - id: 6
        dependencies: [5]
milestones:
  - name: alpha
    tasks: [1, 2, 3]
"#;

/// Test environment with automatic cleanup.
pub struct TestEnv {
    pub temp_dir: TempDir,
    pub path: PathBuf,
}

impl TestEnv {
    /// Create a test environment holding `contents` as the status document.
    pub fn with_document(contents: &str) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("DEVELOPMENT_STATUS.yaml");
        fs::write(&path, contents).expect("Failed to write status document");
        Self { temp_dir, path }
    }

    /// The two-task scenario document.
    pub fn scenario() -> Self {
        Self::with_document(SCENARIO)
    }

    /// The multi-phase project document.
    pub fn project() -> Self {
        Self::with_document(PROJECT)
    }

    /// Open (and lock) the document. Drop the store before opening another.
    pub fn open(&self) -> Store {
        Store::open(&self.path).expect("Failed to open store")
    }

    /// Raw document text on disk.
    pub fn raw(&self) -> String {
        fs::read_to_string(&self.path).expect("Failed to read status document")
    }

    /// Parse the document on disk without taking the lock.
    pub fn persisted(&self) -> StatusDocument {
        serde_yaml::from_str(&self.raw()).expect("Failed to parse status document")
    }

    /// The persisted copy of a task.
    pub fn persisted_task(&self, id: u64) -> Task {
        self.persisted()
            .tasks
            .into_iter()
            .find(|t| t.id == id)
            .unwrap_or_else(|| panic!("task {} missing from persisted document", id))
    }

    /// Start then complete a task as `worker`.
    pub fn finish(&self, store: &mut Store, id: u64, worker: &str) {
        store.start_task(id, worker).expect("Failed to start task");
        store
            .complete_task(id, worker, &format!("commit-{}", id))
            .expect("Failed to complete task");
    }
}

/// Assert that a task has the given status in the store.
pub fn assert_status(store: &Store, id: u64, status: TaskStatus) {
    let task = store.find_task(id).unwrap_or_else(|| panic!("task {} not found", id));
    assert_eq!(
        task.status, status,
        "Expected task {} to be {}, but it was {}",
        id, status, task.status
    );
}

/// Extract the StoreError carried by a report.
pub fn store_error(err: &eyre::Report) -> &StoreError {
    err.downcast_ref::<StoreError>()
        .unwrap_or_else(|| panic!("expected a StoreError, got: {:#}", err))
}
