use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::task::TaskLinks;

/// Kind of focus-timer session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionType {
    Focus,
    ShortBreak,
    LongBreak,
    Custom,
}

impl SessionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionType::Focus => "FOCUS",
            SessionType::ShortBreak => "SHORT_BREAK",
            SessionType::LongBreak => "LONG_BREAK",
            SessionType::Custom => "CUSTOM",
        }
    }
}

impl fmt::Display for SessionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SessionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().replace('-', "_").as_str() {
            "FOCUS" => Ok(SessionType::Focus),
            "SHORT_BREAK" => Ok(SessionType::ShortBreak),
            "LONG_BREAK" => Ok(SessionType::LongBreak),
            "CUSTOM" => Ok(SessionType::Custom),
            other => Err(format!("unknown session type: {other}")),
        }
    }
}

/// Session lifecycle status.
///
/// ```text
/// WAITING -> RUNNING <-> PAUSED
///               |          |
///               +----+-----+
///                    v
///          COMPLETED | CANCELLED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SessionStatus {
    Waiting,
    Running,
    Paused,
    Completed,
    Cancelled,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Waiting => "WAITING",
            SessionStatus::Running => "RUNNING",
            SessionStatus::Paused => "PAUSED",
            SessionStatus::Completed => "COMPLETED",
            SessionStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Remote-visible transition requested on a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionAction {
    Start,
    Pause,
    Complete,
    Stop,
}

impl SessionAction {
    /// Path segment used by the session service (`/sessions/{id}/{action}`).
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionAction::Start => "start",
            SessionAction::Pause => "pause",
            SessionAction::Complete => "complete",
            SessionAction::Stop => "stop",
        }
    }

    pub fn carries_notes(&self) -> bool {
        matches!(self, SessionAction::Complete | SessionAction::Stop)
    }
}

impl fmt::Display for SessionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A focus-timer session.
///
/// Timestamps are absolute; remaining time is always re-derived from them
/// by the [`TimeReconciler`](crate::timer::TimeReconciler) rather than
/// stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    #[serde(rename = "type")]
    pub session_type: SessionType,
    pub status: SessionStatus,
    pub planned_duration_minutes: u32,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub paused_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub total_paused_minutes: f64,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub task_ids: Vec<String>,
    #[serde(default)]
    pub task_titles: Vec<String>,
    /// Legacy single-task link; mirrors `task_ids[0]`.
    #[serde(default)]
    pub task_id: Option<String>,
    /// Legacy single-task title; mirrors `task_titles[0]`.
    #[serde(default)]
    pub task_title: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub actual_duration_minutes: Option<i64>,
}

impl Session {
    /// A fresh session in `WAITING`.
    pub fn new(
        id: impl Into<String>,
        session_type: SessionType,
        planned_duration_minutes: u32,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            session_type,
            status: SessionStatus::Waiting,
            planned_duration_minutes,
            start_time: None,
            paused_at: None,
            total_paused_minutes: 0.0,
            end_time: None,
            notes: None,
            task_ids: Vec::new(),
            task_titles: Vec::new(),
            task_id: None,
            task_title: None,
            created_at: Some(created_at),
            actual_duration_minutes: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// `WAITING`, `RUNNING` or `PAUSED`.
    pub fn is_active(&self) -> bool {
        !self.status.is_terminal()
    }

    /// Current task-link metadata, with a legacy-only link lifted into the
    /// sequence form.
    pub fn task_links(&self) -> TaskLinks {
        if self.task_ids.is_empty() {
            if let Some(id) = &self.task_id {
                return TaskLinks {
                    task_ids: vec![id.clone()],
                    task_titles: vec![self.task_title.clone().unwrap_or_default()],
                    task_id: Some(id.clone()),
                    task_title: self.task_title.clone(),
                };
            }
        }
        TaskLinks {
            task_ids: self.task_ids.clone(),
            task_titles: self.task_titles.clone(),
            task_id: self.task_id.clone(),
            task_title: self.task_title.clone(),
        }
    }

    /// Overwrite all four link fields from `links`.
    pub fn set_task_links(&mut self, links: TaskLinks) {
        self.task_ids = links.task_ids;
        self.task_titles = links.task_titles;
        self.task_id = links.task_id;
        self.task_title = links.task_title;
    }

    pub fn has_linked_tasks(&self) -> bool {
        !self.task_ids.is_empty() || self.task_id.is_some()
    }

    /// Moment used to order sessions newest-first when several are active.
    pub fn recency_key(&self) -> Option<DateTime<Utc>> {
        self.created_at.or(self.start_time)
    }
}

/// Request to create a session. A missing duration is filled from
/// [`UserSettings`](super::UserSettings) by the driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSession {
    #[serde(rename = "type")]
    pub session_type: SessionType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_title: Option<String>,
}

impl NewSession {
    pub fn new(session_type: SessionType) -> Self {
        Self {
            session_type,
            duration_minutes: None,
            notes: None,
            task_id: None,
            task_title: None,
        }
    }

    pub fn with_duration(mut self, minutes: u32) -> Self {
        self.duration_minutes = Some(minutes);
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn with_task(mut self, id: impl Into<String>, title: impl Into<String>) -> Self {
        self.task_id = Some(id.into());
        self.task_title = Some(title.into());
        self
    }
}
