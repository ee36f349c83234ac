//! Wiring shared by the commands: config, local cache and backends.

use std::sync::Arc;

use pomotask_core::storage::Database;
use pomotask_core::{
    Config, DriverOptions, HttpSessionBackend, HttpTaskBackend, InMemoryBackend, SessionBackend,
    SessionDriver, TaskBackend,
};
use tracing::debug;

/// Snapshots replayed into the offline backend.
const OFFLINE_SEED_LIMIT: usize = 50;

pub type CliResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

pub struct Context {
    pub offline: bool,
}

pub struct Backends {
    pub sessions: Arc<dyn SessionBackend>,
    pub tasks: Arc<dyn TaskBackend>,
}

impl Context {
    /// HTTP clients for the configured services, or an in-process backend
    /// seeded from the local cache when offline.
    pub fn backends(&self, config: &Config, db: &Database) -> CliResult<Backends> {
        if self.offline {
            let backend = Arc::new(InMemoryBackend::new());
            let mut cached = db.list_snapshots(OFFLINE_SEED_LIMIT)?;
            // Oldest first so the newest snapshot wins recency ties.
            cached.reverse();
            debug!(count = cached.len(), "seeding offline backend");
            for session in cached {
                backend.seed_session(session);
            }
            backend.set_settings(config.fallback_settings());
            return Ok(Backends {
                sessions: backend.clone(),
                tasks: backend,
            });
        }

        let options = config.http_options();
        Ok(Backends {
            sessions: Arc::new(HttpSessionBackend::new(
                &config.backend.session_url,
                options.clone(),
            )?),
            tasks: Arc::new(HttpTaskBackend::new(&config.backend.task_url, options)?),
        })
    }

    /// A driver restored from the services (or the cache) and ready to use.
    pub async fn driver(&self) -> CliResult<(SessionDriver, Config)> {
        let config = Config::load()?;
        let db = Database::open()?;
        let backends = self.backends(&config, &db)?;
        let mut driver = SessionDriver::new(
            backends.sessions,
            backends.tasks,
            db,
            DriverOptions::from_config(&config),
        );
        driver.init().await?;
        Ok((driver, config))
    }
}

pub fn print_json<T: serde::Serialize>(value: &T) -> CliResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
