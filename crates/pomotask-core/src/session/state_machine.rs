//! Session state machine.
//!
//! Enforces the legal transitions between session statuses and applies the
//! timestamp side effects of each one. Every transition works on a copy: a
//! rejected event returns [`CoreError::InvalidTransition`] and the input
//! session is left as it was.
//!
//! ## Transitions
//!
//! ```text
//! WAITING --start--> RUNNING          (startTime = now)
//! PAUSED  --start--> RUNNING          (totalPaused += now - pausedAt)
//! RUNNING --pause--> PAUSED           (pausedAt = now)
//! RUNNING/PAUSED --complete--> COMPLETED
//! RUNNING/PAUSED --stop------> CANCELLED
//! RUNNING --auto-complete--> COMPLETED (fixed note)
//! ```

use chrono::{DateTime, Utc};

use super::model::{Session, SessionAction, SessionStatus};
use crate::error::{CoreError, Result};

/// Note attached to sessions completed by the timer reaching zero.
pub const AUTO_COMPLETE_NOTE: &str = "Auto-completed when timer reached zero";

/// Event fed into the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Start from `WAITING`, or resume from `PAUSED`.
    Start,
    Pause,
    Complete { notes: Option<String> },
    Stop { notes: Option<String> },
    /// Timer reached zero while running.
    AutoComplete,
}

impl SessionEvent {
    /// The remote action this event maps onto.
    pub fn action(&self) -> SessionAction {
        match self {
            SessionEvent::Start => SessionAction::Start,
            SessionEvent::Pause => SessionAction::Pause,
            SessionEvent::Complete { .. } | SessionEvent::AutoComplete => SessionAction::Complete,
            SessionEvent::Stop { .. } => SessionAction::Stop,
        }
    }

    /// Whether this event is legal from `status`.
    pub fn is_legal_from(&self, status: SessionStatus) -> bool {
        use SessionStatus::*;
        match self {
            SessionEvent::Start => matches!(status, Waiting | Paused),
            SessionEvent::Pause => status == Running,
            SessionEvent::Complete { .. } | SessionEvent::Stop { .. } => {
                matches!(status, Running | Paused)
            }
            SessionEvent::AutoComplete => status == Running,
        }
    }
}

/// Actions accepted from a given status, in display order.
pub fn valid_actions(status: SessionStatus) -> &'static [SessionAction] {
    match status {
        SessionStatus::Waiting => &[SessionAction::Start],
        SessionStatus::Running => &[
            SessionAction::Pause,
            SessionAction::Complete,
            SessionAction::Stop,
        ],
        SessionStatus::Paused => &[
            SessionAction::Start,
            SessionAction::Complete,
            SessionAction::Stop,
        ],
        SessionStatus::Completed | SessionStatus::Cancelled => &[],
    }
}

#[derive(Debug, Clone)]
pub struct SessionStateMachine {
    auto_complete_note: String,
}

impl Default for SessionStateMachine {
    fn default() -> Self {
        Self {
            auto_complete_note: AUTO_COMPLETE_NOTE.to_string(),
        }
    }
}

impl SessionStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_auto_complete_note(note: impl Into<String>) -> Self {
        Self {
            auto_complete_note: note.into(),
        }
    }

    pub fn auto_complete_note(&self) -> &str {
        &self.auto_complete_note
    }

    /// Apply `event` at `now`, returning the transitioned copy.
    ///
    /// # Errors
    /// Returns [`CoreError::InvalidTransition`] when the event is not legal
    /// for the session's current status.
    pub fn apply(
        &self,
        session: &Session,
        event: SessionEvent,
        now: DateTime<Utc>,
    ) -> Result<Session> {
        if !event.is_legal_from(session.status) {
            return Err(CoreError::InvalidTransition {
                from: session.status,
                action: event.action(),
            });
        }

        let mut next = session.clone();
        match event {
            SessionEvent::Start => {
                if session.status == SessionStatus::Paused {
                    if let Some(paused_at) = session.paused_at {
                        next.total_paused_minutes += minutes_between(paused_at, now);
                    }
                    next.paused_at = None;
                }
                if next.start_time.is_none() {
                    next.start_time = Some(now);
                }
                next.status = SessionStatus::Running;
            }
            SessionEvent::Pause => {
                next.status = SessionStatus::Paused;
                next.paused_at = Some(now);
            }
            SessionEvent::Complete { notes } => {
                finish(&mut next, SessionStatus::Completed, notes, now);
            }
            SessionEvent::Stop { notes } => {
                finish(&mut next, SessionStatus::Cancelled, notes, now);
            }
            SessionEvent::AutoComplete => {
                finish(
                    &mut next,
                    SessionStatus::Completed,
                    Some(self.auto_complete_note.clone()),
                    now,
                );
            }
        }
        Ok(next)
    }
}

fn finish(session: &mut Session, status: SessionStatus, notes: Option<String>, now: DateTime<Utc>) {
    session.status = status;
    session.end_time = Some(now);
    if let Some(notes) = notes.filter(|n| !n.trim().is_empty()) {
        session.notes = Some(notes);
    }
    if let Some(start) = session.start_time {
        let whole_minutes = now.signed_duration_since(start).num_minutes();
        let active = whole_minutes as f64 - session.total_paused_minutes;
        session.actual_duration_minutes = Some(active.max(0.0) as i64);
    }
}

/// Non-negative fractional minutes from `from` to `to`.
pub(crate) fn minutes_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    let ms = to.signed_duration_since(from).num_milliseconds();
    (ms.max(0) as f64) / 60_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionType;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 6, 9, 0, 0).unwrap()
    }

    fn waiting() -> Session {
        Session::new("s1", SessionType::Focus, 25, t0())
    }

    #[test]
    fn start_sets_start_time() {
        let sm = SessionStateMachine::new();
        let s = sm.apply(&waiting(), SessionEvent::Start, t0()).unwrap();
        assert_eq!(s.status, SessionStatus::Running);
        assert_eq!(s.start_time, Some(t0()));
    }

    #[test]
    fn resume_accumulates_pause_and_keeps_start_time() {
        let sm = SessionStateMachine::new();
        let s = sm.apply(&waiting(), SessionEvent::Start, t0()).unwrap();
        let s = sm
            .apply(&s, SessionEvent::Pause, t0() + Duration::minutes(10))
            .unwrap();
        assert_eq!(s.paused_at, Some(t0() + Duration::minutes(10)));

        let s = sm
            .apply(&s, SessionEvent::Start, t0() + Duration::minutes(40))
            .unwrap();
        assert_eq!(s.status, SessionStatus::Running);
        assert_eq!(s.start_time, Some(t0()));
        assert!(s.paused_at.is_none());
        assert!((s.total_paused_minutes - 30.0).abs() < 1e-9);
    }

    #[test]
    fn pause_accounting_only_grows() {
        let sm = SessionStateMachine::new();
        let mut s = sm.apply(&waiting(), SessionEvent::Start, t0()).unwrap();
        let mut last = 0.0;
        for i in 1..=3 {
            let at = t0() + Duration::minutes(i * 5);
            s = sm.apply(&s, SessionEvent::Pause, at).unwrap();
            s = sm.apply(&s, SessionEvent::Start, at + Duration::minutes(2)).unwrap();
            assert!(s.total_paused_minutes > last);
            last = s.total_paused_minutes;
        }
        assert!((last - 6.0).abs() < 1e-9);
    }

    #[test]
    fn complete_and_stop_set_end_time_and_notes() {
        let sm = SessionStateMachine::new();
        let running = sm.apply(&waiting(), SessionEvent::Start, t0()).unwrap();
        let end = t0() + Duration::minutes(12);

        let done = sm
            .apply(
                &running,
                SessionEvent::Complete {
                    notes: Some("shipped".into()),
                },
                end,
            )
            .unwrap();
        assert_eq!(done.status, SessionStatus::Completed);
        assert_eq!(done.end_time, Some(end));
        assert_eq!(done.notes.as_deref(), Some("shipped"));
        assert_eq!(done.actual_duration_minutes, Some(12));

        let paused = sm.apply(&running, SessionEvent::Pause, end).unwrap();
        let cancelled = sm
            .apply(&paused, SessionEvent::Stop { notes: None }, end)
            .unwrap();
        assert_eq!(cancelled.status, SessionStatus::Cancelled);
        assert_eq!(cancelled.end_time, Some(end));
    }

    #[test]
    fn blank_notes_do_not_overwrite() {
        let sm = SessionStateMachine::new();
        let mut running = sm.apply(&waiting(), SessionEvent::Start, t0()).unwrap();
        running.notes = Some("draft".into());
        let done = sm
            .apply(
                &running,
                SessionEvent::Complete {
                    notes: Some("   ".into()),
                },
                t0(),
            )
            .unwrap();
        assert_eq!(done.notes.as_deref(), Some("draft"));
    }

    #[test]
    fn auto_complete_uses_fixed_note() {
        let sm = SessionStateMachine::new();
        let running = sm.apply(&waiting(), SessionEvent::Start, t0()).unwrap();
        let done = sm
            .apply(&running, SessionEvent::AutoComplete, t0() + Duration::minutes(26))
            .unwrap();
        assert_eq!(done.status, SessionStatus::Completed);
        assert_eq!(done.notes.as_deref(), Some(AUTO_COMPLETE_NOTE));
    }

    #[test]
    fn illegal_events_are_rejected_without_mutation() {
        let sm = SessionStateMachine::new();
        let running = sm.apply(&waiting(), SessionEvent::Start, t0()).unwrap();
        let paused = sm.apply(&running, SessionEvent::Pause, t0()).unwrap();
        let done = sm
            .apply(&running, SessionEvent::Complete { notes: None }, t0())
            .unwrap();
        let cancelled = sm
            .apply(&running, SessionEvent::Stop { notes: None }, t0())
            .unwrap();

        let cases: Vec<(Session, SessionEvent)> = vec![
            (waiting(), SessionEvent::Pause),
            (waiting(), SessionEvent::Complete { notes: None }),
            (waiting(), SessionEvent::Stop { notes: None }),
            (waiting(), SessionEvent::AutoComplete),
            (running.clone(), SessionEvent::Start),
            (paused.clone(), SessionEvent::Pause),
            (paused.clone(), SessionEvent::AutoComplete),
            (done.clone(), SessionEvent::Start),
            (done.clone(), SessionEvent::Stop { notes: None }),
            (cancelled.clone(), SessionEvent::Complete { notes: None }),
            (cancelled.clone(), SessionEvent::Pause),
        ];

        for (session, event) in cases {
            let before = serde_json::to_string(&session).unwrap();
            let err = sm.apply(&session, event.clone(), t0()).unwrap_err();
            assert!(
                matches!(err, CoreError::InvalidTransition { from, .. } if from == session.status),
                "{event:?} from {} should be rejected",
                session.status
            );
            assert_eq!(serde_json::to_string(&session).unwrap(), before);
        }
    }

    #[test]
    fn valid_actions_match_legality() {
        for status in [
            SessionStatus::Waiting,
            SessionStatus::Running,
            SessionStatus::Paused,
            SessionStatus::Completed,
            SessionStatus::Cancelled,
        ] {
            let actions = valid_actions(status);
            assert_eq!(actions.contains(&SessionAction::Start), SessionEvent::Start.is_legal_from(status));
            assert_eq!(actions.contains(&SessionAction::Pause), SessionEvent::Pause.is_legal_from(status));
            assert_eq!(
                actions.contains(&SessionAction::Stop),
                SessionEvent::Stop { notes: None }.is_legal_from(status)
            );
        }
    }
}
