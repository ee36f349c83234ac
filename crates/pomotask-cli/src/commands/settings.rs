use clap::Subcommand;
use pomotask_core::UserSettings;

use crate::context::{print_json, CliResult, Context};

#[derive(Subcommand)]
pub enum SettingsAction {
    /// Print the current default durations
    Show,
    /// Change one or more default durations (minutes)
    Update {
        #[arg(long)]
        focus: Option<u32>,
        #[arg(long)]
        short_break: Option<u32>,
        #[arg(long)]
        long_break: Option<u32>,
    },
    /// Restore the service defaults
    Reset,
}

pub async fn run(action: SettingsAction, ctx: &Context) -> CliResult {
    let (mut driver, _) = ctx.driver().await?;

    let settings = match action {
        SettingsAction::Show => driver.settings(),
        SettingsAction::Update {
            focus,
            short_break,
            long_break,
        } => {
            let current = driver.settings();
            let next = UserSettings {
                focus_duration_minutes: focus.unwrap_or(current.focus_duration_minutes),
                short_break_duration_minutes: short_break
                    .unwrap_or(current.short_break_duration_minutes),
                long_break_duration_minutes: long_break
                    .unwrap_or(current.long_break_duration_minutes),
            };
            driver.update_settings(next).await?
        }
        SettingsAction::Reset => driver.reset_settings().await?,
    };

    print_json(&settings)?;
    driver.shutdown();
    Ok(())
}
