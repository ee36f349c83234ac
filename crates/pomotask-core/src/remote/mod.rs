//! Backends the engine talks to.
//!
//! The session service and the task service are external collaborators.
//! Both are reached through the traits below so the driver can run against
//! the HTTP clients in [`http`] or the in-process [`memory`] backend.

pub mod http;
pub mod memory;
pub mod wire;

use async_trait::async_trait;

use crate::error::RemoteError;
use crate::session::{NewSession, Session, SessionAction, UserSettings};
use crate::task::{Task, TaskStatus};

pub use http::{HttpOptions, HttpSessionBackend, HttpTaskBackend};
pub use memory::InMemoryBackend;

/// The session service: source of truth for sessions and user settings.
#[async_trait]
pub trait SessionBackend: Send + Sync {
    async fn create_session(&self, request: &NewSession) -> Result<Session, RemoteError>;

    /// Apply `action` remotely. `notes` is only sent for complete/stop.
    async fn transition_session(
        &self,
        id: &str,
        action: SessionAction,
        notes: Option<&str>,
    ) -> Result<Session, RemoteError>;

    /// The user's non-terminal session, if any.
    async fn current_session(&self) -> Result<Option<Session>, RemoteError>;

    /// Sessions newest first.
    async fn list_sessions(&self) -> Result<Vec<Session>, RemoteError>;

    /// Sessions whose legacy `taskId` is `task_id`, newest first.
    async fn list_sessions_for_task(&self, task_id: &str) -> Result<Vec<Session>, RemoteError>;

    async fn get_session(&self, id: &str) -> Result<Session, RemoteError>;

    async fn get_settings(&self) -> Result<UserSettings, RemoteError>;

    async fn update_settings(&self, settings: &UserSettings) -> Result<UserSettings, RemoteError>;

    async fn reset_settings(&self) -> Result<UserSettings, RemoteError>;
}

/// The task service.
#[async_trait]
pub trait TaskBackend: Send + Sync {
    async fn list_tasks(&self) -> Result<Vec<Task>, RemoteError>;

    async fn update_task_status(&self, id: &str, status: TaskStatus) -> Result<Task, RemoteError>;
}
