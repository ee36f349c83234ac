use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod context;

use context::Context;

/// Environment variable holding the log filter, e.g. `pomotask_core=debug`.
const LOG_ENV: &str = "POMOTASK_LOG";

#[derive(Parser)]
#[command(name = "pomotask", version, about = "Pomotask focus-session CLI")]
struct Cli {
    /// Work from the local cache only, without contacting the services
    #[arg(long, global = true)]
    offline: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Focus session control
    Session {
        #[command(subcommand)]
        action: commands::session::SessionAction,
    },
    /// Default session durations stored by the session service
    Settings {
        #[command(subcommand)]
        action: commands::settings::SettingsAction,
    },
    /// Tasks available for linking
    Task {
        #[command(subcommand)]
        action: commands::task::TaskAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
    /// Read the local event outbox
    Events(commands::events::EventsArgs),
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing();

    let ctx = Context {
        offline: cli.offline,
    };
    let result = match cli.command {
        Commands::Session { action } => commands::session::run(action, &ctx).await,
        Commands::Settings { action } => commands::settings::run(action, &ctx).await,
        Commands::Task { action } => commands::task::run(action, &ctx).await,
        Commands::Config { action } => commands::config::run(action),
        Commands::Events(args) => commands::events::run(args),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
