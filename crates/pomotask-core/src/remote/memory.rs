//! In-process backend.
//!
//! Behaves like the session and task services, applying transitions with
//! the same [`SessionStateMachine`] the driver uses. Failures can be
//! injected per call kind for exercising the driver's error paths.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use super::{SessionBackend, TaskBackend};
use crate::clock::{Clock, SystemClock};
use crate::error::RemoteError;
use crate::session::{
    NewSession, Session, SessionAction, SessionEvent, SessionStateMachine, SessionStatus,
    UserSettings,
};
use crate::task::{Task, TaskStatus};

#[derive(Debug, Default)]
struct MemoryState {
    sessions: Vec<Session>,
    settings: UserSettings,
    tasks: Vec<Task>,
    failing_tasks: HashSet<String>,
    failing_actions: HashSet<SessionAction>,
    offline: bool,
    transitions: Vec<(String, SessionAction)>,
}

pub struct InMemoryBackend {
    state: Mutex<MemoryState>,
    clock: Arc<dyn Clock>,
    machine: SessionStateMachine,
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            clock,
            machine: SessionStateMachine::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check_online(state: &MemoryState) -> Result<(), RemoteError> {
        if state.offline {
            Err(RemoteError::Transport("backend unreachable".into()))
        } else {
            Ok(())
        }
    }

    /// Insert or replace a session as-is.
    pub fn seed_session(&self, session: Session) {
        let mut state = self.lock();
        match state.sessions.iter_mut().find(|s| s.id == session.id) {
            Some(existing) => *existing = session,
            None => state.sessions.push(session),
        }
    }

    pub fn session(&self, id: &str) -> Option<Session> {
        self.lock().sessions.iter().find(|s| s.id == id).cloned()
    }

    pub fn insert_task(&self, task: Task) {
        let mut state = self.lock();
        match state.tasks.iter_mut().find(|t| t.id == task.id) {
            Some(existing) => *existing = task,
            None => state.tasks.push(task),
        }
    }

    pub fn task(&self, id: &str) -> Option<Task> {
        self.lock().tasks.iter().find(|t| t.id == id).cloned()
    }

    pub fn set_settings(&self, settings: UserSettings) {
        self.lock().settings = settings;
    }

    /// Make every status update of `task_id` fail.
    pub fn fail_task_updates_for(&self, task_id: &str) {
        self.lock().failing_tasks.insert(task_id.to_string());
    }

    /// Make every remote `action` fail until cleared.
    pub fn fail_transitions(&self, action: SessionAction, failing: bool) {
        let mut state = self.lock();
        if failing {
            state.failing_actions.insert(action);
        } else {
            state.failing_actions.remove(&action);
        }
    }

    /// Make every call fail with a transport error.
    pub fn set_offline(&self, offline: bool) {
        self.lock().offline = offline;
    }

    /// Transitions accepted so far, in order.
    pub fn transition_log(&self) -> Vec<(String, SessionAction)> {
        self.lock().transitions.clone()
    }
}

/// Later insertions win ties on the recency key.
fn newest_first(sessions: &[Session]) -> Vec<Session> {
    let mut out: Vec<Session> = sessions.iter().rev().cloned().collect();
    out.sort_by(|a, b| b.recency_key().cmp(&a.recency_key()));
    out
}

#[async_trait]
impl SessionBackend for InMemoryBackend {
    async fn create_session(&self, request: &NewSession) -> Result<Session, RemoteError> {
        let mut state = self.lock();
        Self::check_online(&state)?;
        let duration = request
            .duration_minutes
            .unwrap_or_else(|| state.settings.duration_for(request.session_type));
        let mut session = Session::new(
            uuid::Uuid::new_v4().to_string(),
            request.session_type,
            duration,
            self.clock.now(),
        );
        session.notes = request.notes.clone();
        session.task_id = request.task_id.clone();
        session.task_title = request.task_title.clone();
        state.sessions.push(session.clone());
        Ok(session)
    }

    async fn transition_session(
        &self,
        id: &str,
        action: SessionAction,
        notes: Option<&str>,
    ) -> Result<Session, RemoteError> {
        let mut state = self.lock();
        Self::check_online(&state)?;
        if state.failing_actions.contains(&action) {
            return Err(RemoteError::Status {
                status: 500,
                body: format!("{action} failed"),
            });
        }

        let Some(idx) = state.sessions.iter().position(|s| s.id == id) else {
            return Err(RemoteError::Status {
                status: 404,
                body: format!("session {id} not found"),
            });
        };

        let notes = notes.map(str::to_string);
        let event = match action {
            SessionAction::Start => SessionEvent::Start,
            SessionAction::Pause => SessionEvent::Pause,
            SessionAction::Complete => SessionEvent::Complete { notes },
            SessionAction::Stop => SessionEvent::Stop { notes },
        };
        let next = self
            .machine
            .apply(&state.sessions[idx], event, self.clock.now())
            .map_err(|e| RemoteError::Status {
                status: 400,
                body: e.to_string(),
            })?;
        state.sessions[idx] = next.clone();
        state.transitions.push((id.to_string(), action));
        Ok(next)
    }

    async fn current_session(&self) -> Result<Option<Session>, RemoteError> {
        let state = self.lock();
        Self::check_online(&state)?;
        let sessions = newest_first(&state.sessions);
        let with_status = |status| sessions.iter().find(|s| s.status == status).cloned();
        // WAITING sessions are never reported as current.
        Ok(with_status(SessionStatus::Running).or_else(|| with_status(SessionStatus::Paused)))
    }

    async fn list_sessions(&self) -> Result<Vec<Session>, RemoteError> {
        let state = self.lock();
        Self::check_online(&state)?;
        Ok(newest_first(&state.sessions))
    }

    async fn list_sessions_for_task(&self, task_id: &str) -> Result<Vec<Session>, RemoteError> {
        let state = self.lock();
        Self::check_online(&state)?;
        Ok(newest_first(&state.sessions)
            .into_iter()
            .filter(|s| s.task_id.as_deref() == Some(task_id))
            .collect())
    }

    async fn get_session(&self, id: &str) -> Result<Session, RemoteError> {
        let state = self.lock();
        Self::check_online(&state)?;
        state
            .sessions
            .iter()
            .find(|s| s.id == id)
            .cloned()
            .ok_or_else(|| RemoteError::Status {
                status: 404,
                body: format!("session {id} not found"),
            })
    }

    async fn get_settings(&self) -> Result<UserSettings, RemoteError> {
        let state = self.lock();
        Self::check_online(&state)?;
        Ok(state.settings)
    }

    async fn update_settings(&self, settings: &UserSettings) -> Result<UserSettings, RemoteError> {
        let mut state = self.lock();
        Self::check_online(&state)?;
        settings.validate().map_err(|e| RemoteError::Status {
            status: 400,
            body: e.to_string(),
        })?;
        state.settings = *settings;
        Ok(state.settings)
    }

    async fn reset_settings(&self) -> Result<UserSettings, RemoteError> {
        let mut state = self.lock();
        Self::check_online(&state)?;
        state.settings = UserSettings::default();
        Ok(state.settings)
    }
}

#[async_trait]
impl TaskBackend for InMemoryBackend {
    async fn list_tasks(&self) -> Result<Vec<Task>, RemoteError> {
        let state = self.lock();
        Self::check_online(&state)?;
        Ok(state.tasks.clone())
    }

    async fn update_task_status(&self, id: &str, status: TaskStatus) -> Result<Task, RemoteError> {
        let mut state = self.lock();
        Self::check_online(&state)?;
        if state.failing_tasks.contains(id) {
            return Err(RemoteError::Status {
                status: 500,
                body: format!("update of task {id} failed"),
            });
        }
        let task = state
            .tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| RemoteError::Status {
                status: 404,
                body: format!("task {id} not found"),
            })?;
        task.status = status;
        Ok(task.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionType;

    #[tokio::test]
    async fn create_uses_settings_when_duration_missing() {
        let backend = InMemoryBackend::new();
        backend.set_settings(UserSettings {
            focus_duration_minutes: 40,
            ..UserSettings::default()
        });
        let s = backend
            .create_session(&NewSession::new(SessionType::Focus))
            .await
            .unwrap();
        assert_eq!(s.planned_duration_minutes, 40);
        assert_eq!(s.status, SessionStatus::Waiting);

        let s = backend
            .create_session(&NewSession::new(SessionType::Custom).with_duration(7))
            .await
            .unwrap();
        assert_eq!(s.planned_duration_minutes, 7);
    }

    #[tokio::test]
    async fn illegal_remote_transition_is_a_client_error() {
        let backend = InMemoryBackend::new();
        let s = backend
            .create_session(&NewSession::new(SessionType::Focus))
            .await
            .unwrap();
        let err = backend
            .transition_session(&s.id, SessionAction::Pause, None)
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::Status { status: 400, .. }));
        assert!(backend.transition_log().is_empty());
    }

    #[tokio::test]
    async fn current_session_skips_terminal_ones() {
        let backend = InMemoryBackend::new();
        let first = backend
            .create_session(&NewSession::new(SessionType::Focus).with_task("t1", "Write"))
            .await
            .unwrap();
        backend
            .transition_session(&first.id, SessionAction::Start, None)
            .await
            .unwrap();
        backend
            .transition_session(&first.id, SessionAction::Stop, Some("done"))
            .await
            .unwrap();
        assert!(backend.current_session().await.unwrap().is_none());

        let second = backend
            .create_session(&NewSession::new(SessionType::ShortBreak))
            .await
            .unwrap();
        assert!(backend.current_session().await.unwrap().is_none());
        assert_eq!(backend.list_sessions().await.unwrap()[0].id, second.id);

        let for_task = backend.list_sessions_for_task("t1").await.unwrap();
        assert_eq!(for_task.len(), 1);
        assert_eq!(for_task[0].notes.as_deref(), Some("done"));
    }

    #[tokio::test]
    async fn current_session_prefers_running_over_paused() {
        let backend = InMemoryBackend::new();
        let running = backend
            .create_session(&NewSession::new(SessionType::Focus))
            .await
            .unwrap();
        backend
            .transition_session(&running.id, SessionAction::Start, None)
            .await
            .unwrap();
        let paused = backend
            .create_session(&NewSession::new(SessionType::Focus))
            .await
            .unwrap();
        backend
            .transition_session(&paused.id, SessionAction::Start, None)
            .await
            .unwrap();
        backend
            .transition_session(&paused.id, SessionAction::Pause, None)
            .await
            .unwrap();

        assert_eq!(backend.current_session().await.unwrap().unwrap().id, running.id);

        backend
            .transition_session(&running.id, SessionAction::Complete, None)
            .await
            .unwrap();
        assert_eq!(backend.current_session().await.unwrap().unwrap().id, paused.id);
    }

    #[tokio::test]
    async fn offline_backend_fails_every_call() {
        let backend = InMemoryBackend::new();
        backend.set_offline(true);
        assert!(matches!(
            backend.list_tasks().await.unwrap_err(),
            RemoteError::Transport(_)
        ));
        assert!(backend.get_settings().await.is_err());
    }
}
