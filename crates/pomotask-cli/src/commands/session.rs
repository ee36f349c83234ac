use clap::Subcommand;
use pomotask_core::{CreateOutcome, NewSession, SessionType, TickOutcome};
use serde_json::json;

use crate::context::{print_json, CliResult, Context};

#[derive(Subcommand)]
pub enum SessionAction {
    /// Create a session in WAITING state
    Create {
        /// focus, short-break, long-break or custom
        #[arg(default_value = "focus")]
        session_type: SessionType,
        /// Planned minutes (default: from settings)
        #[arg(long)]
        minutes: Option<u32>,
        #[arg(long)]
        notes: Option<String>,
        /// Abandon the active session instead of refusing
        #[arg(long)]
        replace: bool,
    },
    /// Start a waiting session or resume a paused one
    Start,
    /// Pause the running session
    Pause,
    /// Complete the current session
    Complete {
        #[arg(long)]
        notes: Option<String>,
    },
    /// Cancel the current session
    Stop {
        #[arg(long)]
        notes: Option<String>,
    },
    /// Print the current session and remaining time as JSON
    Status,
    /// Tick until the session stops running
    Watch,
    /// Replace the tasks linked to the current session
    Link {
        /// Task id (repeatable)
        #[arg(long = "task", required = true)]
        task_ids: Vec<String>,
        /// Task title, one per --task (repeatable)
        #[arg(long = "title")]
        titles: Vec<String>,
    },
    /// Mark a linked task completed and unlink it
    CompleteTask {
        task_id: String,
    },
    /// Recent sessions, or the sessions of one task
    History {
        #[arg(long)]
        task: Option<String>,
    },
}

pub async fn run(action: SessionAction, ctx: &Context) -> CliResult {
    let (mut driver, config) = ctx.driver().await?;

    match action {
        SessionAction::Create {
            session_type,
            minutes,
            notes,
            replace,
        } => {
            let minutes = minutes.or(
                (session_type == SessionType::Custom).then_some(config.defaults.custom_duration),
            );
            let mut request = NewSession::new(session_type);
            if let Some(minutes) = minutes {
                request = request.with_duration(minutes);
            }
            if let Some(notes) = notes {
                request = request.with_notes(notes);
            }

            match driver.create(request).await? {
                CreateOutcome::Created { session } => print_json(&session)?,
                CreateOutcome::NeedsConfirmation { active } if replace => {
                    tracing::info!(active_id = %active.id, "replacing active session");
                    let session = driver.confirm_replace().await?;
                    print_json(&session)?;
                }
                CreateOutcome::NeedsConfirmation { active } => {
                    driver.cancel_replace()?;
                    return Err(format!(
                        "session {} is still {}; pass --replace to abandon it",
                        active.id, active.status
                    )
                    .into());
                }
            }
        }
        SessionAction::Start => {
            let report = driver.start().await?;
            for failure in &report.tasks.failures {
                eprintln!("warning: task {} not moved: {}", failure.task_id, failure.error);
            }
            print_json(&report)?;
        }
        SessionAction::Pause => print_json(&driver.pause().await?)?,
        SessionAction::Complete { notes } => print_json(&driver.complete(notes).await?)?,
        SessionAction::Stop { notes } => print_json(&driver.stop(notes).await?)?,
        SessionAction::Status => {
            let remaining = driver.remaining();
            print_json(&json!({
                "session": driver.session(),
                "remaining": remaining,
                "clock": remaining.map(|r| r.clock()),
            }))?;
        }
        SessionAction::Watch => {
            while let Some(outcome) = driver.tick().await {
                match outcome? {
                    TickOutcome::Remaining { remaining } => eprint!("\r{}", remaining.clock()),
                    TickOutcome::AutoCompleted { session } => {
                        eprintln!();
                        print_json(&session)?;
                        break;
                    }
                    TickOutcome::Idle => break,
                }
            }
        }
        SessionAction::Link { task_ids, titles } => {
            let titles = if titles.is_empty() {
                task_ids.clone()
            } else {
                titles
            };
            print_json(&driver.link_tasks(&task_ids, &titles)?)?;
        }
        SessionAction::CompleteTask { task_id } => {
            print_json(&driver.complete_linked_task(&task_id).await?)?;
        }
        SessionAction::History { task } => match task {
            Some(task_id) => print_json(&driver.task_history(&task_id).await?)?,
            None => print_json(&driver.recent_sessions())?,
        },
    }

    driver.shutdown();
    Ok(())
}
