//! Tasks as seen from the focus-session engine.
//!
//! Tasks live in the external task service. The engine only reads their
//! status and moves it forward (`TODO -> IN_PROGRESS -> COMPLETED`) when a
//! linked session starts or a linked task is completed from a session.

mod link;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use link::{TaskLinkReconciler, TaskLinks, TaskSyncReport, TaskUpdateFailure};

/// Task status as exchanged with the task service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Todo,
    InProgress,
    Completed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Todo => "TODO",
            TaskStatus::InProgress => "IN_PROGRESS",
            TaskStatus::Completed => "COMPLETED",
        }
    }

    /// Board column label.
    pub fn label(&self) -> &'static str {
        match self {
            TaskStatus::Todo => "Pending",
            TaskStatus::InProgress => "In Progress",
            TaskStatus::Completed => "Done",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A task from the task service.
///
/// Fields the engine does not interpret are kept in `extra` so that a task
/// written back (the service replaces the whole object) loses nothing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub status: TaskStatus,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Task {
    pub fn new(id: impl Into<String>, title: impl Into<String>, status: TaskStatus) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            status,
            extra: serde_json::Map::new(),
        }
    }

    /// Copy of this task with a different status.
    pub fn with_status(&self, status: TaskStatus) -> Self {
        Self {
            status,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_fields_survive_a_round_trip() {
        let json = r#"{"id":"t1","title":"Write spec","status":"TODO","priority":"HIGH","userId":"u9"}"#;
        let task: Task = serde_json::from_str(json).unwrap();
        assert_eq!(task.status, TaskStatus::Todo);
        assert_eq!(task.extra["priority"], "HIGH");

        let moved = task.with_status(TaskStatus::InProgress);
        let back = serde_json::to_value(&moved).unwrap();
        assert_eq!(back["status"], "IN_PROGRESS");
        assert_eq!(back["priority"], "HIGH");
        assert_eq!(back["userId"], "u9");
    }

    #[test]
    fn status_labels_match_board_columns() {
        assert_eq!(TaskStatus::Todo.label(), "Pending");
        assert_eq!(TaskStatus::InProgress.label(), "In Progress");
        assert_eq!(TaskStatus::Completed.label(), "Done");
    }
}
