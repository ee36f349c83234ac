//! Inspect and edit `config.toml`.

use clap::Subcommand;
use pomotask_core::storage::TOKEN_ENV;
use pomotask_core::Config;
use serde_json::json;

use crate::context::{print_json, CliResult};

const MASKED: &str = "********";

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print one value by dotted key (e.g. "timer.tick_interval_ms")
    Get { key: String },
    /// Change one value by dotted key and save
    Set { key: String, value: String },
    /// Print the file location and every value, token masked
    List,
    /// Overwrite the file with defaults
    Reset,
}

pub fn run(action: ConfigAction) -> CliResult {
    match action {
        ConfigAction::Get { key } => {
            let config = Config::load()?;
            let value = config
                .get(&key)
                .ok_or_else(|| format!("unknown key: {key}"))?;
            println!("{value}");
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load()?;
            config.set(&key, &value)?;
            print_json(&json!({ "key": key, "value": config.get(&key) }))?;
        }
        ConfigAction::List => {
            let config = Config::load()?;
            let token_source = if std::env::var(TOKEN_ENV).is_ok_and(|t| !t.is_empty()) {
                Some(TOKEN_ENV)
            } else if config.backend.token.is_some() {
                Some("file")
            } else {
                None
            };
            let mut shown = config;
            if let Some(token) = shown.backend.token.as_mut() {
                *token = MASKED.to_string();
            }
            print_json(&json!({
                "path": Config::path()?,
                "token_source": token_source,
                "config": shown,
            }))?;
        }
        ConfigAction::Reset => {
            Config::default().save()?;
            print_json(&json!({ "path": Config::path()?, "reset": true }))?;
        }
    }
    Ok(())
}
