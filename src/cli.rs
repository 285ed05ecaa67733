//! CLI argument parsing for devtrack.

use clap::{Parser, Subcommand};
use devtrack::{TaskId, TaskStatus};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "dt",
    about = "Dependency-aware development task tracking",
    version,
    after_help = "Logs are written to: ~/.local/share/devtrack/logs/devtrack.log"
)]
pub struct Cli {
    /// Path to the status document (default: ./DEVELOPMENT_STATUS.yaml)
    #[arg(short = 'f', long, global = true, env = "DEVTRACK_FILE")]
    pub file: Option<PathBuf>,

    /// Print task records as JSON instead of YAML
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Show the highest-priority task that is ready and unassigned
    Next,

    /// Assign a ready task to a worker
    Start {
        /// Task ID
        #[arg(long)]
        task_id: TaskId,

        /// Worker (AI assistant) ID
        #[arg(long)]
        ai_id: String,
    },

    /// Complete a task and unblock its dependents
    Complete {
        /// Task ID
        #[arg(long)]
        task_id: TaskId,

        /// Worker (AI assistant) ID; must match the assignee
        #[arg(long)]
        ai_id: String,

        /// Commit that delivered the work
        #[arg(long)]
        commit_hash: String,
    },

    /// Show one task, or every task
    Status {
        /// Task ID
        #[arg(long)]
        task_id: Option<TaskId>,
    },

    /// List tasks, one per line
    List {
        /// Filter by status (ready, in_progress, blocked, completed)
        #[arg(short, long)]
        status: Option<TaskStatus>,
    },

    /// Show a task's prerequisites and whether they are met
    Check {
        /// Task ID
        #[arg(long)]
        task_id: TaskId,
    },

    /// Move blocked tasks whose prerequisites are complete to ready
    Unblock,

    /// Show the activity log
    Log {
        /// Only entries for this task
        #[arg(long)]
        task_id: Option<TaskId>,
    },
}

impl Command {
    /// True for commands that write the document and need its lock.
    pub fn mutates(&self) -> bool {
        matches!(self, Command::Start { .. } | Command::Complete { .. } | Command::Unblock)
    }
}
