//! High-level store API: queries and state transitions over the status document.

use crate::storage::Storage;
use crate::types::{Action, ActivityEntry, StatusDocument, Task, TaskId, TaskStatus, ValidationError};
use chrono::Local;
use eyre::{Context, Result};
use log::{info, warn};
use serde_yaml::Mapping;
use std::path::{Path, PathBuf};

/// Errors that can occur during store operations.
#[derive(Debug)]
pub enum StoreError {
    /// No document at the given path.
    MissingDocument(PathBuf),
    /// Document exists but could not be read.
    ReadFailed(PathBuf),
    /// Document could not be parsed or breaks a document invariant.
    MalformedDocument(PathBuf),
    /// Document could not be written back.
    WriteFailed(PathBuf),
    /// Another invocation holds the document lock.
    Locked(PathBuf),
    /// A mutation was attempted on a store opened read-only.
    ReadOnly(PathBuf),
    /// Task not found.
    TaskNotFound(TaskId),
    /// Task is not in the status the operation requires.
    InvalidState {
        id: TaskId,
        status: TaskStatus,
        expected: TaskStatus,
    },
    /// Task already has a worker.
    AlreadyAssigned { id: TaskId, worker: String },
    /// Task is not assigned to the worker trying to complete it.
    NotAssigned { id: TaskId, worker: String },
    /// Validation error.
    Validation(ValidationError),
}

impl StoreError {
    /// True for failures of the document itself rather than of an operation.
    pub fn is_storage(&self) -> bool {
        matches!(
            self,
            StoreError::MissingDocument(_)
                | StoreError::ReadFailed(_)
                | StoreError::MalformedDocument(_)
                | StoreError::WriteFailed(_)
                | StoreError::Locked(_)
                | StoreError::ReadOnly(_)
        )
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::MissingDocument(path) => write!(f, "status document not found: {}", path.display()),
            StoreError::ReadFailed(path) => write!(f, "failed to read status document: {}", path.display()),
            StoreError::MalformedDocument(path) => write!(f, "malformed status document: {}", path.display()),
            StoreError::WriteFailed(path) => write!(f, "failed to write status document: {}", path.display()),
            StoreError::Locked(path) => {
                write!(f, "status document is locked by another process: {}", path.display())
            }
            StoreError::ReadOnly(path) => write!(f, "status document is open read-only: {}", path.display()),
            StoreError::TaskNotFound(id) => write!(f, "task {} not found", id),
            StoreError::InvalidState { id, status, expected } => {
                write!(f, "task {} is {}, expected {}", id, status, expected)
            }
            StoreError::AlreadyAssigned { id, worker } => {
                write!(f, "task {} is already assigned to {}", id, worker)
            }
            StoreError::NotAssigned { id, worker } => write!(f, "task {} is not assigned to {}", id, worker),
            StoreError::Validation(e) => write!(f, "validation error: {}", e),
        }
    }
}

impl std::error::Error for StoreError {}

/// Result of completing a task.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    /// The task as persisted after completion
    pub task: Task,
    /// Tasks moved from blocked to ready by this completion
    pub unblocked: Vec<TaskId>,
}

/// The task store: one loaded status document plus its storage handle.
#[derive(Debug)]
pub struct Store {
    storage: Storage,
    raw: Mapping,
    doc: StatusDocument,
}

impl Store {
    /// Open the document at `path`, lock it and load it.
    pub fn open(path: &Path) -> Result<Self> {
        Self::load_from(Storage::open(path)?)
    }

    /// Open the document for queries only. Takes no lock; every mutation
    /// fails with [`StoreError::ReadOnly`].
    pub fn open_read_only(path: &Path) -> Result<Self> {
        Self::load_from(Storage::open_read_only(path)?)
    }

    fn load_from(storage: Storage) -> Result<Self> {
        let (raw, doc) = storage.read()?;
        Ok(Self { storage, raw, doc })
    }

    /// Re-read the document from disk, discarding unsaved changes.
    pub fn load(&mut self) -> Result<()> {
        (self.raw, self.doc) = self.storage.read()?;
        Ok(())
    }

    /// Write the in-memory state back, replacing the file.
    pub fn save(&mut self) -> Result<()> {
        self.raw = self.storage.write(&self.raw, &self.doc)?;
        Ok(())
    }

    /// False for a store opened with [`Store::open_read_only`].
    pub fn is_writable(&self) -> bool {
        self.storage.is_writable()
    }

    fn ensure_writable(&self) -> Result<()> {
        if !self.is_writable() {
            return Err(eyre::eyre!(StoreError::ReadOnly(self.path().to_path_buf())));
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        self.storage.path()
    }

    pub fn document(&self) -> &StatusDocument {
        &self.doc
    }

    /// All tasks in document order.
    pub fn tasks(&self) -> &[Task] {
        &self.doc.tasks
    }

    /// Tasks, optionally filtered by status.
    pub fn list(&self, status_filter: Option<TaskStatus>) -> Vec<&Task> {
        self.doc
            .tasks
            .iter()
            .filter(|task| status_filter.is_none_or(|status| task.status == status))
            .collect()
    }

    pub fn activity_log(&self) -> &[ActivityEntry] {
        &self.doc.activity_log
    }

    /// Log entries for one task, oldest first.
    pub fn activity_for(&self, id: TaskId) -> Vec<&ActivityEntry> {
        self.doc.activity_log.iter().filter(|entry| entry.task_id == id).collect()
    }

    /// The ready, unassigned task with the lowest priority value.
    /// Ties go to the task that appears first.
    pub fn next_available_task(&self) -> Option<&Task> {
        self.doc
            .tasks
            .iter()
            .filter(|task| task.is_available())
            .min_by_key(|task| task.priority)
    }

    pub fn find_task(&self, id: TaskId) -> Option<&Task> {
        self.doc.tasks.iter().find(|task| task.id == id)
    }

    fn find_task_mut(&mut self, id: TaskId) -> Option<&mut Task> {
        self.doc.tasks.iter_mut().find(|task| task.id == id)
    }

    /// Prerequisite ids of a task according to the dependency graph.
    pub fn task_dependencies(&self, id: TaskId) -> &[TaskId] {
        self.doc.dependency_graph.dependencies_of(id)
    }

    /// True if the task exists and every prerequisite is a completed task.
    pub fn check_dependencies(&self, id: TaskId) -> bool {
        if self.find_task(id).is_none() {
            return false;
        }

        self.task_dependencies(id).iter().all(|dep| {
            self.find_task(*dep)
                .is_some_and(|task| task.status == TaskStatus::Completed)
        })
    }

    /// Assign a ready task to a worker and persist.
    pub fn start_task(&mut self, id: TaskId, worker_id: &str) -> Result<Task> {
        self.ensure_writable()?;

        let task = self
            .find_task_mut(id)
            .ok_or_else(|| eyre::eyre!(StoreError::TaskNotFound(id)))?;

        if task.status != TaskStatus::Ready {
            return Err(eyre::eyre!(StoreError::InvalidState {
                id,
                status: task.status,
                expected: TaskStatus::Ready,
            }));
        }
        if let Some(worker) = &task.assigned_to {
            return Err(eyre::eyre!(StoreError::AlreadyAssigned {
                id,
                worker: worker.clone(),
            }));
        }
        if worker_id.is_empty() {
            return Err(eyre::eyre!(StoreError::Validation(ValidationError::EmptyWorkerId)));
        }

        task.status = TaskStatus::InProgress;
        task.assigned_to = Some(worker_id.to_string());
        let started = task.clone();

        self.record(worker_id, Action::Started, id, None);
        info!("Task {} started by {}", id, worker_id);

        self.save().context("Failed to persist task start")?;
        Ok(started)
    }

    /// Mark a task completed, unblock dependents whose prerequisites are
    /// now all complete, and persist.
    pub fn complete_task(&mut self, id: TaskId, worker_id: &str, commit_ref: &str) -> Result<Completion> {
        self.ensure_writable()?;

        let task = self
            .find_task_mut(id)
            .ok_or_else(|| eyre::eyre!(StoreError::TaskNotFound(id)))?;

        if task.assigned_to.as_deref() != Some(worker_id) {
            return Err(eyre::eyre!(StoreError::NotAssigned {
                id,
                worker: worker_id.to_string(),
            }));
        }

        task.status = TaskStatus::Completed;
        task.assigned_to = None;
        task.completion_date = Some(Local::now().date_naive());
        let completed = task.clone();

        let unblocked = self.update_blocked_tasks();

        self.record(worker_id, Action::Completed, id, Some(commit_ref));
        info!(
            "Task {} completed by {} at {} (unblocked: {:?})",
            id, worker_id, commit_ref, unblocked
        );

        self.save().context("Failed to persist task completion")?;
        Ok(Completion {
            task: completed,
            unblocked,
        })
    }

    /// Move every blocked task whose prerequisites are all completed to
    /// ready. Returns the ids that changed.
    ///
    /// One pass over the task list: a task unblocked here does not count as
    /// completed, so its own dependents wait for a later pass. A blocked task
    /// that still names a worker would break the assignment invariant as
    /// `ready`, so it is left blocked with a warning.
    pub fn update_blocked_tasks(&mut self) -> Vec<TaskId> {
        let satisfied: Vec<TaskId> = self
            .doc
            .tasks
            .iter()
            .filter(|task| task.status == TaskStatus::Blocked && self.check_dependencies(task.id))
            .map(|task| task.id)
            .collect();

        let mut unblocked = Vec::with_capacity(satisfied.len());
        for task in self.doc.tasks.iter_mut().filter(|t| satisfied.contains(&t.id)) {
            let mut ready = task.clone();
            ready.status = TaskStatus::Ready;
            ready.prerequisites_met = Some(true);
            ready.blocked_by = Some(Vec::new());

            if let Err(e) = ready.validate() {
                warn!("Leaving task {} blocked: {}", task.id, e);
                continue;
            }
            *task = ready;
            unblocked.push(task.id);
        }

        unblocked
    }

    /// Run an unblock pass and persist if anything changed.
    pub fn unblock(&mut self) -> Result<Vec<TaskId>> {
        self.ensure_writable()?;

        let unblocked = self.update_blocked_tasks();
        if !unblocked.is_empty() {
            info!("Unblocked tasks: {:?}", unblocked);
            self.save().context("Failed to persist unblocked tasks")?;
        }
        Ok(unblocked)
    }

    fn record(&mut self, worker_id: &str, action: Action, task_id: TaskId, commit_ref: Option<&str>) {
        self.doc.activity_log.push(ActivityEntry {
            timestamp: Local::now().naive_local(),
            worker_id: worker_id.to_string(),
            action,
            task_id,
            commit_ref: commit_ref.map(String::from),
        });
    }
}
