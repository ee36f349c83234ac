//! Task listing for choosing what to link.

use clap::Subcommand;
use pomotask_core::storage::Database;
use pomotask_core::{Config, TaskBackend, TaskLinkReconciler};

use crate::context::{print_json, CliResult, Context};

#[derive(Subcommand)]
pub enum TaskAction {
    /// List tasks that can be linked to a session
    List {
        /// Include completed tasks
        #[arg(long)]
        all: bool,
    },
}

pub async fn run(action: TaskAction, ctx: &Context) -> CliResult {
    let config = Config::load()?;
    let db = Database::open()?;
    let backends = ctx.backends(&config, &db)?;

    match action {
        TaskAction::List { all } => {
            let tasks = backends.tasks.list_tasks().await?;
            let tasks = if all {
                tasks
            } else {
                TaskLinkReconciler::selectable_tasks(&tasks)
            };
            print_json(&tasks)?;
        }
    }
    Ok(())
}
