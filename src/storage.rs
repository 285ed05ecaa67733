//! Storage layer: the YAML status document on disk.
//!
//! The parsed YAML tree is kept next to the typed view. A save patches the
//! fields the store changes into that tree and writes it back, so keys this
//! crate does not touch stay where the author put them.

use crate::lock::{DocumentLock, LockAttempt};
use crate::store::StoreError;
use crate::types::StatusDocument;
use eyre::{Context, Result};
use log::debug;
use serde_yaml::{Mapping, Value};
use std::fs;
use std::path::{Path, PathBuf};

/// Default document name, looked up in the working directory.
pub const DEFAULT_STATUS_FILE: &str = "DEVELOPMENT_STATUS.yaml";

const TASKS_KEY: &str = "next_available_tasks";
const LOG_KEY: &str = "ai_activity_log";

/// Task fields written back on save. Everything else is left as read.
const TASK_STATE_FIELDS: [&str; 5] = [
    "status",
    "assigned_to",
    "completion_date",
    "prerequisites_met",
    "blocked_by",
];

/// Storage handle for one status document.
///
/// Holds the document lock when opened for writing.
#[derive(Debug)]
pub struct Storage {
    path: PathBuf,
    lock: Option<DocumentLock>,
}

impl Storage {
    /// Open storage for an existing document and take its lock.
    pub fn open(path: &Path) -> Result<Self> {
        Self::check_exists(path)?;

        let lock = match DocumentLock::try_acquire(path)? {
            LockAttempt::Acquired(lock) => lock,
            LockAttempt::Contended => {
                return Err(eyre::eyre!(StoreError::Locked(path.to_path_buf())));
            }
        };

        debug!("Opened {} (lock {})", path.display(), lock.path().display());
        Ok(Self {
            path: path.to_path_buf(),
            lock: Some(lock),
        })
    }

    /// Open storage for reading only. No lock file is created or taken.
    pub fn open_read_only(path: &Path) -> Result<Self> {
        Self::check_exists(path)?;

        debug!("Opened {} read-only", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            lock: None,
        })
    }

    fn check_exists(path: &Path) -> Result<()> {
        if !path.is_file() {
            return Err(eyre::eyre!(StoreError::MissingDocument(path.to_path_buf())));
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True if this handle holds the lock and may write.
    pub fn is_writable(&self) -> bool {
        self.lock.is_some()
    }

    /// Read and validate the whole document.
    ///
    /// Returns the YAML tree as written together with its typed view.
    pub fn read(&self) -> Result<(Mapping, StatusDocument)> {
        let contents = fs::read_to_string(&self.path)
            .with_context(|| StoreError::ReadFailed(self.path.clone()))?;

        let raw: Mapping =
            serde_yaml::from_str(&contents).with_context(|| StoreError::MalformedDocument(self.path.clone()))?;
        let doc: StatusDocument = serde_yaml::from_value(Value::Mapping(raw.clone()))
            .with_context(|| StoreError::MalformedDocument(self.path.clone()))?;

        doc.validate()
            .with_context(|| StoreError::MalformedDocument(self.path.clone()))?;

        debug!(
            "Loaded {}: {} tasks, {} log entries",
            self.path.display(),
            doc.tasks.len(),
            doc.activity_log.len()
        );
        Ok((raw, doc))
    }

    /// Write `doc` back over the document read as `raw`. Returns the tree
    /// that was written.
    ///
    /// Writes a temp file next to the real document (following a symlink)
    /// with the document's permissions, then renames it into place, so a
    /// reader never sees a half-written file.
    pub fn write(&self, raw: &Mapping, doc: &StatusDocument) -> Result<Mapping> {
        if !self.is_writable() {
            return Err(eyre::eyre!(StoreError::ReadOnly(self.path.clone())));
        }

        let merged = merge_document(raw, doc).context("Failed to serialize status document")?;
        let contents = serde_yaml::to_string(&merged).context("Failed to serialize status document")?;

        let target = fs::canonicalize(&self.path).with_context(|| StoreError::WriteFailed(self.path.clone()))?;
        let permissions = fs::metadata(&target)
            .with_context(|| StoreError::WriteFailed(self.path.clone()))?
            .permissions();

        let temp_path = temp_path(&target);
        let replaced = fs::write(&temp_path, contents)
            .and_then(|()| fs::set_permissions(&temp_path, permissions))
            .and_then(|()| fs::rename(&temp_path, &target));
        if let Err(err) = replaced {
            let _ = fs::remove_file(&temp_path);
            return Err(err).with_context(|| StoreError::WriteFailed(self.path.clone()));
        }

        debug!("Saved {}", target.display());
        Ok(merged)
    }
}

fn temp_path(target: &Path) -> PathBuf {
    let mut name = target.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    target.with_file_name(name)
}

/// Apply the typed document's state onto the tree it was read from.
///
/// Tasks are matched by position: the store never adds, removes or reorders
/// them. Only the log's new entries are serialized and appended.
fn merge_document(raw: &Mapping, doc: &StatusDocument) -> Result<Mapping, serde_yaml::Error> {
    let mut merged = raw.clone();

    if let Some(Value::Sequence(raw_tasks)) = merged.get_mut(TASKS_KEY) {
        for (raw_task, task) in raw_tasks.iter_mut().zip(&doc.tasks) {
            let (Value::Mapping(raw_task), Value::Mapping(state)) = (raw_task, serde_yaml::to_value(task)?) else {
                continue;
            };
            for field in TASK_STATE_FIELDS {
                if let Some(value) = state.get(field) {
                    patch_field(raw_task, field, value);
                }
            }
        }
    }

    match merged.get_mut(LOG_KEY) {
        Some(Value::Sequence(log)) => {
            let written = log.len();
            for entry in doc.activity_log.iter().skip(written) {
                log.push(serde_yaml::to_value(entry)?);
            }
        }
        _ => {
            let log = doc
                .activity_log
                .iter()
                .map(serde_yaml::to_value)
                .collect::<Result<Vec<_>, _>>()?;
            merged.insert(Value::from(LOG_KEY), Value::Sequence(log));
        }
    }

    Ok(merged)
}

/// Set `field` to `value` in place. A field the author left out stays out
/// while it is null.
fn patch_field(task: &mut Mapping, field: &str, value: &Value) {
    let current = task.get(field);
    if current == Some(value) || (current.is_none() && value.is_null()) {
        return;
    }
    task.insert(Value::from(field), value.clone());
}
