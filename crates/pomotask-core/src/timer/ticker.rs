//! Cancellable periodic tick bound to one session.
//!
//! The ticker never touches session state. It only posts the id of the
//! session it watches onto a channel owned by the driver, which decides
//! whether the signal is still relevant. Dropping the ticker aborts the
//! underlying task, so a ticker cannot outlive the driver slot holding it.

use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Default tick period.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(1);

/// One tick for the session with this id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickSignal {
    pub session_id: String,
}

#[derive(Debug)]
pub struct Ticker {
    session_id: String,
    handle: JoinHandle<()>,
}

impl Ticker {
    /// Spawn a ticker on the current tokio runtime.
    ///
    /// The first signal is sent one `period` after spawning.
    pub fn spawn(
        session_id: impl Into<String>,
        period: Duration,
        tx: UnboundedSender<TickSignal>,
    ) -> Self {
        let session_id = session_id.into();
        let watched = session_id.clone();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            interval.tick().await;
            loop {
                interval.tick().await;
                let signal = TickSignal {
                    session_id: watched.clone(),
                };
                if tx.send(signal).is_err() {
                    break;
                }
            }
        });
        tracing::debug!(session_id = %session_id, ?period, "ticker started");
        Self { session_id, handle }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.handle.abort();
        tracing::debug!(session_id = %self.session_id, "ticker cancelled");
    }
}
