//! Remaining-time reconstruction.
//!
//! The reconciler never counts down. Every call re-derives the remaining
//! time of a session from its absolute timestamps and accumulated pause
//! time, so missed ticks, suspended processes and restarts cannot cause
//! drift. It is stateless with respect to sessions and never mutates them.
//!
//! ## Timezone skew
//!
//! The session backend exchanges naive local-time strings. When such a
//! string has been read in the wrong zone, a `startTime` shows up in the
//! future. A raw elapsed time more negative than the skew threshold (60 s by
//! default) is treated as that defect: the timestamp is shifted backward by
//! the local offset (UTC minus local) and the computation is redone.
//! `pausedAt` gets the same correction independently.

use chrono::{DateTime, Duration, FixedOffset, Local, Offset, Utc};
use serde::{Deserialize, Serialize};

use crate::session::{minutes_between, Session, SessionStatus};

/// Default threshold beyond which negative elapsed time is treated as skew.
pub const DEFAULT_SKEW_THRESHOLD_SECS: i64 = 60;

/// Result of a remaining-time computation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Remaining {
    /// Fractional minutes left, clamped to `[0, planned]`.
    pub minutes: f64,
    /// The session is running and its time is up.
    pub auto_completed: bool,
}

impl Remaining {
    /// Whole seconds left, rounded up so a display never shows 00:00 early.
    pub fn whole_seconds(&self) -> u64 {
        (self.minutes * 60.0).ceil().max(0.0) as u64
    }

    /// `MM:SS` rendering of the remaining time.
    pub fn clock(&self) -> String {
        let secs = self.whole_seconds();
        format!("{:02}:{:02}", secs / 60, secs % 60)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TimeReconciler {
    local_offset: FixedOffset,
    skew_threshold: Duration,
}

impl TimeReconciler {
    /// Reconciler using the system's current local offset.
    pub fn local() -> Self {
        Self::with_offset(Local::now().offset().fix())
    }

    /// Reconciler for an explicit local offset.
    pub fn with_offset(local_offset: FixedOffset) -> Self {
        Self {
            local_offset,
            skew_threshold: Duration::seconds(DEFAULT_SKEW_THRESHOLD_SECS),
        }
    }

    pub fn with_skew_threshold(mut self, threshold: Duration) -> Self {
        self.skew_threshold = threshold;
        self
    }

    pub fn local_offset(&self) -> FixedOffset {
        self.local_offset
    }

    /// Undo a timezone misreading of `ts` when it lies too far in the future.
    pub fn correct_skew(&self, ts: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
        let raw_elapsed = now.signed_duration_since(ts);
        if raw_elapsed < -self.skew_threshold {
            // UTC minus local, the same sign convention browsers report.
            let tz_offset = Duration::seconds(-i64::from(self.local_offset.local_minus_utc()));
            ts - tz_offset
        } else {
            ts
        }
    }

    /// Remaining time of `session` as of `now`.
    pub fn remaining(&self, session: &Session, now: DateTime<Utc>) -> Remaining {
        let planned = f64::from(session.planned_duration_minutes);
        let Some(raw_start) = session.start_time else {
            return Remaining {
                minutes: planned,
                auto_completed: false,
            };
        };

        let start = self.correct_skew(raw_start, now);
        let paused = session.total_paused_minutes.max(0.0);

        let raw_remaining = match (session.status, session.paused_at) {
            (SessionStatus::Paused, Some(raw_paused_at)) => {
                // Frozen at the moment of pausing.
                let paused_at = self.correct_skew(raw_paused_at, now);
                let active = (minutes_between(start, paused_at) - paused).max(0.0);
                planned - active
            }
            (SessionStatus::Running | SessionStatus::Paused, _) => {
                let active = (minutes_between(start, now) - paused).max(0.0);
                planned - active
            }
            _ => planned,
        };

        Remaining {
            minutes: raw_remaining.clamp(0.0, planned),
            auto_completed: session.status == SessionStatus::Running && raw_remaining <= 0.0,
        }
    }
}

impl Default for TimeReconciler {
    fn default() -> Self {
        Self::local()
    }
}
