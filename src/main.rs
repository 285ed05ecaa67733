//! Devtrack CLI - dependency-aware task tracking over a YAML status document.

use clap::Parser;
use colored::*;
use devtrack::{DEFAULT_STATUS_FILE, Store, Task, TaskStatus};
use eyre::{Context, Result};
use log::info;
use serde::Serialize;
use std::fs;
use std::path::PathBuf;

mod cli;

use cli::{Cli, Command};

fn setup_logging() -> Result<()> {
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("devtrack")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("devtrack.log");

    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

fn get_status_file(cli: &Cli) -> PathBuf {
    cli.file.clone().unwrap_or_else(|| {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(DEFAULT_STATUS_FILE)
    })
}

fn format_status(status: TaskStatus) -> ColoredString {
    match status {
        TaskStatus::Ready => "ready".green(),
        TaskStatus::InProgress => "in_progress".yellow(),
        TaskStatus::Blocked => "blocked".red(),
        TaskStatus::Completed => "completed".blue(),
    }
}

/// Print a record as YAML, or JSON with `--json`.
fn print_record<T: Serialize + ?Sized>(value: &T, json: bool) -> Result<()> {
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(value).context("Failed to render JSON")?
        );
    } else {
        print!("{}", serde_yaml::to_string(value).context("Failed to render YAML")?);
    }
    Ok(())
}

fn task_line(task: &Task) -> String {
    let assignee = task
        .assigned_to
        .as_ref()
        .map(|w| format!(" @{}", w))
        .unwrap_or_default();
    format!(
        "{} {} P{} {}{}",
        format_status(task.status),
        format!("#{}", task.id).cyan(),
        task.priority,
        task.title().unwrap_or(""),
        assignee.dimmed()
    )
}

fn run(cli: Cli) -> Result<()> {
    let status_file = get_status_file(&cli);
    let mut store = if cli.command.mutates() {
        Store::open(&status_file)
    } else {
        Store::open_read_only(&status_file)
    }
    .context("Failed to open status document")?;

    match cli.command {
        Command::Next => match store.next_available_task() {
            Some(task) => print_record(task, cli.json)?,
            None => println!("No tasks available"),
        },

        Command::Start { task_id, ai_id } => {
            let task = store.start_task(task_id, &ai_id).context("Failed to start task")?;
            println!(
                "{} Started task {} for {}",
                "→".blue(),
                task.id.to_string().cyan(),
                ai_id
            );
        }

        Command::Complete {
            task_id,
            ai_id,
            commit_hash,
        } => {
            let completion = store
                .complete_task(task_id, &ai_id, &commit_hash)
                .context("Failed to complete task")?;

            println!(
                "{} Completed task {} ({})",
                "✓".green(),
                completion.task.id.to_string().cyan(),
                commit_hash.dimmed()
            );
            for id in &completion.unblocked {
                println!("  {} task {} is now ready", "→".blue(), id.to_string().cyan());
            }
        }

        Command::Status { task_id: Some(id) } => match store.find_task(id) {
            Some(task) => print_record(task, cli.json)?,
            None => println!("Task {} not found", id),
        },

        Command::Status { task_id: None } => print_record(store.tasks(), cli.json)?,

        Command::List { status } => {
            let tasks = store.list(status);
            if tasks.is_empty() {
                println!("{}", "No tasks found".dimmed());
            } else {
                for task in tasks {
                    println!("{}", task_line(task));
                }
            }
        }

        Command::Check { task_id } => {
            let task = store
                .find_task(task_id)
                .ok_or_else(|| eyre::eyre!(devtrack::StoreError::TaskNotFound(task_id)))?;
            println!("{}", task_line(task));

            let deps = store.task_dependencies(task_id);
            if deps.is_empty() {
                println!("  {}", "no prerequisites".dimmed());
            }
            for dep in deps {
                match store.find_task(*dep) {
                    Some(dep_task) => println!("  requires {}", task_line(dep_task)),
                    None => println!("  requires {} {}", format!("#{}", dep).cyan(), "(unknown task)".red()),
                }
            }

            if store.check_dependencies(task_id) {
                println!("{} Prerequisites met", "✓".green());
            } else {
                println!("{} Prerequisites not met", "⊘".red());
            }
        }

        Command::Unblock => {
            let unblocked = store.unblock().context("Failed to unblock tasks")?;
            if unblocked.is_empty() {
                println!("{}", "No tasks unblocked".dimmed());
            } else {
                for id in unblocked {
                    println!("{} task {} is now ready", "→".blue(), id.to_string().cyan());
                }
            }
        }

        Command::Log { task_id } => {
            let entries: Vec<_> = match task_id {
                Some(id) => store.activity_for(id),
                None => store.activity_log().iter().collect(),
            };

            if entries.is_empty() {
                println!("{}", "No activity recorded".dimmed());
            } else if cli.json {
                print_record(&entries, true)?;
            } else {
                for entry in entries {
                    println!(
                        "{} {} {} {}{}",
                        entry.timestamp.format("%Y-%m-%d %H:%M:%S").to_string().dimmed(),
                        entry.worker_id,
                        entry.action,
                        format!("#{}", entry.task_id).cyan(),
                        entry
                            .commit_ref
                            .as_ref()
                            .map(|c| format!(" ({})", c))
                            .unwrap_or_default()
                    );
                }
            }
        }
    }

    Ok(())
}

fn main() -> Result<()> {
    setup_logging().context("Failed to setup logging")?;

    let cli = Cli::parse();
    info!("Command: {:?}", std::env::args().collect::<Vec<_>>());

    if let Err(e) = run(cli) {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }

    Ok(())
}
