use clap::Args;
use pomotask_core::storage::Database;

use crate::context::{print_json, CliResult};

#[derive(Args)]
pub struct EventsArgs {
    /// Only events with a sequence number above this cursor
    #[arg(long, default_value = "0")]
    since: i64,
    /// Maximum number of events
    #[arg(long, default_value = "100")]
    limit: usize,
}

pub fn run(args: EventsArgs) -> CliResult {
    let db = Database::open()?;
    let events = db.events_since(args.since, args.limit)?;
    print_json(&events)
}
