//! Session ↔ task linkage.
//!
//! A session links zero or more tasks, kept as two parallel sequences
//! (`taskIds`, `taskTitles`) in link order. The legacy single-task pair
//! (`taskId`, `taskTitle`) always mirrors element 0 so older readers keep
//! working.
//!
//! The reconciler works on copies of the session and never caches task
//! state: every mutation of an external task is preceded by a fresh read of
//! the task list, since other views may edit tasks at any time.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{Task, TaskStatus};
use crate::clock::Clock;
use crate::error::{CoreError, Result, ValidationError};
use crate::events::{Event, EventBus};
use crate::remote::TaskBackend;
use crate::session::Session;

/// Link metadata of one session, as cached locally by session id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskLinks {
    #[serde(default)]
    pub task_ids: Vec<String>,
    #[serde(default)]
    pub task_titles: Vec<String>,
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub task_title: Option<String>,
}

impl TaskLinks {
    /// Build links from parallel sequences, dropping repeated ids (first
    /// occurrence wins) and mirroring the legacy fields.
    ///
    /// # Errors
    /// Returns a validation error when the sequences differ in length.
    pub fn new(task_ids: &[String], titles: &[String]) -> Result<Self, ValidationError> {
        if task_ids.len() != titles.len() {
            return Err(ValidationError::LengthMismatch {
                left: "taskIds",
                left_len: task_ids.len(),
                right: "taskTitles",
                right_len: titles.len(),
            });
        }

        let mut ids: Vec<String> = Vec::with_capacity(task_ids.len());
        let mut kept_titles = Vec::with_capacity(titles.len());
        for (id, title) in task_ids.iter().zip(titles) {
            if ids.contains(id) {
                continue;
            }
            ids.push(id.clone());
            kept_titles.push(title.clone());
        }
        Ok(Self::from_sequences(ids, kept_titles))
    }

    fn from_sequences(task_ids: Vec<String>, task_titles: Vec<String>) -> Self {
        Self {
            task_id: task_ids.first().cloned(),
            task_title: task_titles.first().cloned(),
            task_ids,
            task_titles,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.task_ids.is_empty() && self.task_id.is_none()
    }

    pub fn contains(&self, task_id: &str) -> bool {
        self.task_ids.iter().any(|id| id == task_id)
    }

    pub fn title_of(&self, task_id: &str) -> Option<&str> {
        let idx = self.task_ids.iter().position(|id| id == task_id)?;
        self.task_titles.get(idx).map(String::as_str)
    }

    /// Copy without `task_id`, legacy fields re-mirrored.
    pub fn without(&self, task_id: &str) -> Self {
        let (ids, titles): (Vec<_>, Vec<_>) = self
            .task_ids
            .iter()
            .zip(&self.task_titles)
            .filter(|(id, _)| id.as_str() != task_id)
            .map(|(id, title)| (id.clone(), title.clone()))
            .unzip();
        Self::from_sequences(ids, titles)
    }
}

/// A linked task whose status update failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskUpdateFailure {
    pub task_id: String,
    pub error: String,
}

/// Aggregate outcome of moving linked tasks forward when a session starts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSyncReport {
    /// Tasks moved from TODO to IN_PROGRESS.
    pub moved: Vec<String>,
    /// Tasks already past TODO.
    pub skipped: Vec<String>,
    pub failures: Vec<TaskUpdateFailure>,
}

impl TaskSyncReport {
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}

pub struct TaskLinkReconciler {
    tasks: Arc<dyn TaskBackend>,
    events: EventBus,
    clock: Arc<dyn Clock>,
}

impl TaskLinkReconciler {
    pub fn new(tasks: Arc<dyn TaskBackend>, events: EventBus, clock: Arc<dyn Clock>) -> Self {
        Self {
            tasks,
            events,
            clock,
        }
    }

    /// Replace the session's links. An empty selection clears all four
    /// link fields.
    ///
    /// # Errors
    /// Returns a validation error when ids and titles differ in length.
    pub fn link_tasks(session: &Session, task_ids: &[String], titles: &[String]) -> Result<Session> {
        let links = TaskLinks::new(task_ids, titles)?;
        let mut next = session.clone();
        next.set_task_links(links);
        Ok(next)
    }

    /// Copy of `session` with `task_id` unlinked.
    pub fn unlink_task(session: &Session, task_id: &str) -> Session {
        let mut next = session.clone();
        next.set_task_links(session.task_links().without(task_id));
        next
    }

    /// Tasks a user may link: everything not yet completed.
    pub fn selectable_tasks(tasks: &[Task]) -> Vec<Task> {
        tasks
            .iter()
            .filter(|t| matches!(t.status, TaskStatus::Todo | TaskStatus::InProgress))
            .cloned()
            .collect()
    }

    /// Move every linked TODO task to IN_PROGRESS.
    ///
    /// Best effort: a failure on one task is recorded and the others are
    /// still attempted. Nothing here can fail the session start.
    pub async fn on_session_start(&self, session: &Session) -> TaskSyncReport {
        let links = session.task_links();
        let mut report = TaskSyncReport::default();
        if links.is_empty() {
            return report;
        }

        let tasks = match self.tasks.list_tasks().await {
            Ok(tasks) => tasks,
            Err(e) => {
                tracing::warn!(session_id = %session.id, error = %e, "could not fetch tasks for session start");
                report.failures = links
                    .task_ids
                    .iter()
                    .map(|id| TaskUpdateFailure {
                        task_id: id.clone(),
                        error: e.to_string(),
                    })
                    .collect();
                return report;
            }
        };

        for id in &links.task_ids {
            let Some(task) = tasks.iter().find(|t| &t.id == id) else {
                report.failures.push(TaskUpdateFailure {
                    task_id: id.clone(),
                    error: CoreError::NotFound {
                        kind: "task",
                        id: id.clone(),
                    }
                    .to_string(),
                });
                continue;
            };

            if task.status != TaskStatus::Todo {
                report.skipped.push(id.clone());
                continue;
            }

            match self.tasks.update_task_status(id, TaskStatus::InProgress).await {
                Ok(_) => {
                    tracing::info!(task_id = %id, "task moved to IN_PROGRESS");
                    self.events.publish(Event::TaskStatusChanged {
                        task_id: id.clone(),
                        new_status: TaskStatus::InProgress,
                        at: self.clock.now(),
                    });
                    report.moved.push(id.clone());
                }
                Err(e) => {
                    tracing::warn!(task_id = %id, error = %e, "failed to move task to IN_PROGRESS");
                    report.failures.push(TaskUpdateFailure {
                        task_id: id.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }
        report
    }

    /// Complete `task_id` in the task service and unlink it from the session.
    ///
    /// # Errors
    /// Returns `NotFound` if the task service no longer knows the task, or
    /// `Remote` if the update fails; the session is not touched in either
    /// case.
    pub async fn on_task_completed_from_session(
        &self,
        session: &Session,
        task_id: &str,
    ) -> Result<Session> {
        let tasks = self.tasks.list_tasks().await?;
        if !tasks.iter().any(|t| t.id == task_id) {
            return Err(CoreError::NotFound {
                kind: "task",
                id: task_id.to_string(),
            });
        }

        self.tasks
            .update_task_status(task_id, TaskStatus::Completed)
            .await?;
        let links = session.task_links();
        tracing::info!(
            task_id = %task_id,
            title = links.title_of(task_id).unwrap_or_default(),
            "task completed from session"
        );

        self.events.publish(Event::TaskStatusChanged {
            task_id: task_id.to_string(),
            new_status: TaskStatus::Completed,
            at: self.clock.now(),
        });

        Ok(Self::unlink_task(session, task_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::remote::InMemoryBackend;
    use crate::session::SessionType;
    use chrono::Utc;

    fn ids(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    fn session() -> Session {
        Session::new("s1", SessionType::Focus, 25, Utc::now())
    }

    fn reconciler(backend: &Arc<InMemoryBackend>) -> (TaskLinkReconciler, EventBus) {
        let bus = EventBus::new();
        let clock = Arc::new(ManualClock::new(Utc::now()));
        (
            TaskLinkReconciler::new(backend.clone(), bus.clone(), clock),
            bus,
        )
    }

    #[test]
    fn link_mirrors_legacy_fields() {
        let s = TaskLinkReconciler::link_tasks(
            &session(),
            &ids(&["a", "b"]),
            &ids(&["Write spec", "Review PR"]),
        )
        .unwrap();
        assert_eq!(s.task_ids, ids(&["a", "b"]));
        assert_eq!(s.task_titles, ids(&["Write spec", "Review PR"]));
        assert_eq!(s.task_id.as_deref(), Some("a"));
        assert_eq!(s.task_title.as_deref(), Some("Write spec"));
    }

    #[test]
    fn link_drops_duplicates_keeping_order() {
        let s = TaskLinkReconciler::link_tasks(
            &session(),
            &ids(&["b", "a", "b", "c"]),
            &ids(&["B", "A", "B again", "C"]),
        )
        .unwrap();
        assert_eq!(s.task_ids, ids(&["b", "a", "c"]));
        assert_eq!(s.task_titles, ids(&["B", "A", "C"]));
    }

    #[test]
    fn empty_selection_clears_all_fields() {
        let linked =
            TaskLinkReconciler::link_tasks(&session(), &ids(&["a"]), &ids(&["A"])).unwrap();
        let cleared = TaskLinkReconciler::link_tasks(&linked, &[], &[]).unwrap();
        assert!(cleared.task_ids.is_empty());
        assert!(cleared.task_titles.is_empty());
        assert!(cleared.task_id.is_none());
        assert!(cleared.task_title.is_none());
    }

    #[test]
    fn mismatched_titles_are_rejected() {
        let err = TaskLinkReconciler::link_tasks(&session(), &ids(&["a", "b"]), &ids(&["A"]))
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(ValidationError::LengthMismatch { .. })));
    }

    #[test]
    fn unlinking_first_task_promotes_next_into_legacy_fields() {
        let s = TaskLinkReconciler::link_tasks(&session(), &ids(&["a", "b"]), &ids(&["A", "B"]))
            .unwrap();
        let s = TaskLinkReconciler::unlink_task(&s, "a");
        assert_eq!(s.task_id.as_deref(), Some("b"));
        assert_eq!(s.task_title.as_deref(), Some("B"));

        let s = TaskLinkReconciler::unlink_task(&s, "b");
        assert!(!s.has_linked_tasks());
        assert!(s.task_title.is_none());
    }

    #[test]
    fn selectable_tasks_hides_completed() {
        let tasks = vec![
            Task::new("a", "A", TaskStatus::Todo),
            Task::new("b", "B", TaskStatus::Completed),
            Task::new("c", "C", TaskStatus::InProgress),
        ];
        let ids: Vec<_> = TaskLinkReconciler::selectable_tasks(&tasks)
            .into_iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[tokio::test]
    async fn session_start_moves_only_todo_tasks() {
        let backend = Arc::new(InMemoryBackend::new());
        backend.insert_task(Task::new("a", "A", TaskStatus::Todo));
        backend.insert_task(Task::new("b", "B", TaskStatus::InProgress));
        let (reconciler, bus) = reconciler(&backend);
        let mut rx = bus.subscribe();

        let s = TaskLinkReconciler::link_tasks(&session(), &ids(&["a", "b"]), &ids(&["A", "B"]))
            .unwrap();
        let report = reconciler.on_session_start(&s).await;

        assert_eq!(report.moved, ids(&["a"]));
        assert_eq!(report.skipped, ids(&["b"]));
        assert!(!report.has_failures());
        assert_eq!(backend.task("a").unwrap().status, TaskStatus::InProgress);
        assert!(matches!(
            rx.try_recv().unwrap(),
            Event::TaskStatusChanged { new_status: TaskStatus::InProgress, .. }
        ));
    }

    #[tokio::test]
    async fn session_start_collects_failures_without_stopping() {
        let backend = Arc::new(InMemoryBackend::new());
        backend.insert_task(Task::new("a", "A", TaskStatus::Todo));
        backend.insert_task(Task::new("c", "C", TaskStatus::Todo));
        backend.fail_task_updates_for("a");
        let (reconciler, _bus) = reconciler(&backend);

        let s = TaskLinkReconciler::link_tasks(
            &session(),
            &ids(&["a", "ghost", "c"]),
            &ids(&["A", "Ghost", "C"]),
        )
        .unwrap();
        let report = reconciler.on_session_start(&s).await;

        assert_eq!(report.moved, ids(&["c"]));
        let failed: Vec<_> = report.failures.iter().map(|f| f.task_id.as_str()).collect();
        assert_eq!(failed, vec!["a", "ghost"]);
        assert_eq!(backend.task("c").unwrap().status, TaskStatus::InProgress);
    }

    #[tokio::test]
    async fn completing_linked_task_unlinks_and_notifies() {
        let backend = Arc::new(InMemoryBackend::new());
        backend.insert_task(Task::new("a", "Write spec", TaskStatus::InProgress));
        backend.insert_task(Task::new("b", "Review PR", TaskStatus::InProgress));
        let (reconciler, bus) = reconciler(&backend);
        let mut rx = bus.subscribe();

        let s = TaskLinkReconciler::link_tasks(
            &session(),
            &ids(&["a", "b"]),
            &ids(&["Write spec", "Review PR"]),
        )
        .unwrap();
        let s = reconciler.on_task_completed_from_session(&s, "b").await.unwrap();

        assert_eq!(s.task_ids, ids(&["a"]));
        assert_eq!(s.task_titles, ids(&["Write spec"]));
        assert_eq!(s.task_id.as_deref(), Some("a"));
        assert_eq!(backend.task("b").unwrap().status, TaskStatus::Completed);
        match rx.try_recv().unwrap() {
            Event::TaskStatusChanged {
                task_id,
                new_status,
                ..
            } => {
                assert_eq!(task_id, "b");
                assert_eq!(new_status, TaskStatus::Completed);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn completing_unknown_task_leaves_session_alone() {
        let backend = Arc::new(InMemoryBackend::new());
        let (reconciler, _bus) = reconciler(&backend);
        let s = TaskLinkReconciler::link_tasks(&session(), &ids(&["a"]), &ids(&["A"])).unwrap();

        let err = reconciler
            .on_task_completed_from_session(&s, "a")
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound { kind: "task", .. }));
    }
}
