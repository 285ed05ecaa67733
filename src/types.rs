//! Core data types for the development status document.

use crate::ordered::OrderedMap;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_yaml::Mapping;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// Task identifiers are plain integers assigned by whoever authors the document.
pub type TaskId = u64;

/// A unit of development work.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: TaskId,

    /// Current state
    pub status: TaskStatus,

    /// Worker holding the task; set iff status == InProgress
    #[serde(default)]
    pub assigned_to: Option<String>,

    /// Lower value = picked first
    pub priority: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_date: Option<NaiveDate>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prerequisites_met: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocked_by: Option<Vec<TaskId>>,

    /// Fields this tool does not interpret (title, description, ...), kept as written
    #[serde(flatten)]
    pub extra: Mapping,
}

impl Task {
    /// The task's `title` field, if the document carries one.
    pub fn title(&self) -> Option<&str> {
        self.extra.get("title").and_then(|v| v.as_str())
    }

    /// True if the task can be picked up right now.
    pub fn is_available(&self) -> bool {
        self.status == TaskStatus::Ready && self.assigned_to.is_none()
    }

    /// Check the assignment invariant for this task.
    pub fn validate(&self) -> Result<(), ValidationError> {
        match (&self.assigned_to, self.status) {
            (Some(_), TaskStatus::InProgress) | (None, TaskStatus::Ready | TaskStatus::Blocked | TaskStatus::Completed) => {
                Ok(())
            }
            (None, TaskStatus::InProgress) => Err(ValidationError::InProgressWithoutAssignee(self.id)),
            (Some(worker), status) => Err(ValidationError::AssignedOutsideProgress {
                id: self.id,
                worker: worker.clone(),
                status,
            }),
        }
    }
}

/// Task status states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Ready,
    InProgress,
    Blocked,
    Completed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Ready => "ready",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Blocked => "blocked",
            TaskStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ready" => Ok(TaskStatus::Ready),
            "in_progress" => Ok(TaskStatus::InProgress),
            "blocked" => Ok(TaskStatus::Blocked),
            "completed" => Ok(TaskStatus::Completed),
            other => Err(format!(
                "unknown status '{}' (expected ready, in_progress, blocked or completed)",
                other
            )),
        }
    }
}

/// One task's entry in the dependency graph.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DependencyEntry {
    pub id: TaskId,

    #[serde(default)]
    pub dependencies: Vec<TaskId>,

    #[serde(flatten)]
    pub extra: Mapping,
}

/// Prerequisites grouped as phase -> component -> entries.
///
/// Only consulted to resolve a task's prerequisite ids; never mutated.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct DependencyGraph(pub OrderedMap<OrderedMap<Vec<DependencyEntry>>>);

impl DependencyGraph {
    /// Prerequisite ids of a task: the first matching entry walking phases,
    /// then components, then entries. Empty when the task has no entry.
    pub fn dependencies_of(&self, id: TaskId) -> &[TaskId] {
        self.entries()
            .find(|entry| entry.id == id)
            .map(|entry| entry.dependencies.as_slice())
            .unwrap_or(&[])
    }

    /// All entries in document order.
    pub fn entries(&self) -> impl Iterator<Item = &DependencyEntry> {
        self.0
            .values()
            .flat_map(|components| components.values())
            .flat_map(|entries| entries.iter())
    }

    /// Phase names in document order.
    pub fn phases(&self) -> impl Iterator<Item = &str> {
        self.0.keys()
    }
}

/// What a worker did to a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Started,
    Completed,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Started => write!(f, "started"),
            Action::Completed => write!(f, "completed"),
        }
    }
}

/// Append-only record of a start or completion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActivityEntry {
    pub timestamp: NaiveDateTime,

    #[serde(rename = "ai_id")]
    pub worker_id: String,

    pub action: Action,

    pub task_id: TaskId,

    /// Commit that delivered the work (completions only)
    #[serde(rename = "commit_hash", default, skip_serializing_if = "Option::is_none")]
    pub commit_ref: Option<String>,
}

/// The whole persisted status document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusDocument {
    #[serde(rename = "next_available_tasks")]
    pub tasks: Vec<Task>,

    #[serde(default)]
    pub dependency_graph: DependencyGraph,

    /// Always present in memory; absent documents start with an empty log
    #[serde(rename = "ai_activity_log", default)]
    pub activity_log: Vec<ActivityEntry>,

    /// Other top-level sections (project metadata, milestones, ...)
    #[serde(flatten)]
    pub extra: Mapping,
}

impl StatusDocument {
    /// Check document-wide invariants: task ids are unique.
    ///
    /// Per-task assignment is checked on mutation, not here.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut seen = HashSet::new();
        for task in &self.tasks {
            if !seen.insert(task.id) {
                return Err(ValidationError::DuplicateTaskId(task.id));
            }
        }
        Ok(())
    }
}

/// Validation errors for documents and operation inputs.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    DuplicateTaskId(TaskId),
    InProgressWithoutAssignee(TaskId),
    AssignedOutsideProgress {
        id: TaskId,
        worker: String,
        status: TaskStatus,
    },
    EmptyWorkerId,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::DuplicateTaskId(id) => write!(f, "task id {} appears more than once", id),
            ValidationError::InProgressWithoutAssignee(id) => {
                write!(f, "task {} is in_progress but not assigned to anyone", id)
            }
            ValidationError::AssignedOutsideProgress { id, worker, status } => {
                write!(f, "task {} is assigned to {} but its status is {}", id, worker, status)
            }
            ValidationError::EmptyWorkerId => write!(f, "worker id cannot be empty"),
        }
    }
}

impl std::error::Error for ValidationError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_task(id: TaskId, status: TaskStatus) -> Task {
        Task {
            id,
            status,
            assigned_to: None,
            priority: 1,
            completion_date: None,
            prerequisites_met: None,
            blocked_by: None,
            extra: Mapping::new(),
        }
    }

    const GRAPH: &str = r#"
phase_1:
  core:
    - id: 1
      dependencies: []
    - id: 2
      dependencies: [1]
  cli:
    - id: 3
      dependencies: [1, 2]
phase_2:
  core:
    - id: 2
      dependencies: [9]
    - id: 4
"#;

    #[test]
    fn test_task_validation_valid() {
        assert!(make_task(1, TaskStatus::Ready).validate().is_ok());

        let mut task = make_task(1, TaskStatus::InProgress);
        task.assigned_to = Some("w1".to_string());
        assert!(task.validate().is_ok());
    }

    #[test]
    fn test_task_validation_in_progress_without_assignee() {
        let task = make_task(7, TaskStatus::InProgress);
        assert_eq!(task.validate(), Err(ValidationError::InProgressWithoutAssignee(7)));
    }

    #[test]
    fn test_task_validation_assigned_but_ready() {
        let mut task = make_task(3, TaskStatus::Ready);
        task.assigned_to = Some("w1".to_string());
        assert_eq!(
            task.validate(),
            Err(ValidationError::AssignedOutsideProgress {
                id: 3,
                worker: "w1".to_string(),
                status: TaskStatus::Ready,
            })
        );
    }

    #[test]
    fn test_document_validation_duplicate_id() {
        let doc = StatusDocument {
            tasks: vec![make_task(1, TaskStatus::Ready), make_task(1, TaskStatus::Blocked)],
            dependency_graph: DependencyGraph::default(),
            activity_log: vec![],
            extra: Mapping::new(),
        };
        assert_eq!(doc.validate(), Err(ValidationError::DuplicateTaskId(1)));
    }

    #[test]
    fn test_status_parse_and_display() {
        for status in [
            TaskStatus::Ready,
            TaskStatus::InProgress,
            TaskStatus::Blocked,
            TaskStatus::Completed,
        ] {
            assert_eq!(status.to_string().parse::<TaskStatus>(), Ok(status));
        }
        assert!("done".parse::<TaskStatus>().is_err());
    }

    #[test]
    fn test_dependencies_first_match_wins() {
        let graph: DependencyGraph = serde_yaml::from_str(GRAPH).unwrap();
        // phase_1 is searched before phase_2
        assert_eq!(graph.dependencies_of(2), &[1]);
        assert_eq!(graph.dependencies_of(3), &[1, 2]);
        assert_eq!(graph.phases().collect::<Vec<_>>(), vec!["phase_1", "phase_2"]);
    }

    #[test]
    fn test_dependencies_missing_entry_or_field() {
        let graph: DependencyGraph = serde_yaml::from_str(GRAPH).unwrap();
        assert!(graph.dependencies_of(4).is_empty());
        assert!(graph.dependencies_of(42).is_empty());
    }

    #[test]
    fn test_task_keeps_unknown_fields() {
        let yaml = "id: 5\nstatus: blocked\nassigned_to: null\npriority: 2\ntitle: Wire up parser\nestimate_hours: 4\nblocked_by:\n- 1\n";
        let task: Task = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(task.title(), Some("Wire up parser"));
        assert_eq!(task.blocked_by, Some(vec![1]));

        let out = serde_yaml::to_string(&task).unwrap();
        assert!(out.contains("title: Wire up parser"));
        assert!(out.contains("estimate_hours: 4"));
        assert!(out.contains("assigned_to: null"));
        assert!(!out.contains("completion_date"));
    }

    #[test]
    fn test_activity_entry_field_names() {
        let yaml = "timestamp: 2025-03-01T09:30:00.123456\nai_id: claude-1\naction: completed\ntask_id: 3\ncommit_hash: abc123\n";
        let entry: ActivityEntry = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(entry.worker_id, "claude-1");
        assert_eq!(entry.action, Action::Completed);
        assert_eq!(entry.commit_ref.as_deref(), Some("abc123"));

        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["ai_id"], "claude-1");
        assert_eq!(json["commit_hash"], "abc123");
    }
}
