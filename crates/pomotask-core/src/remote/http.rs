//! REST clients for the session and task services.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{FixedOffset, Local, Offset};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::debug;
use url::Url;

use super::wire::{decode_session, decode_sessions};
use super::{SessionBackend, TaskBackend};
use crate::error::{ConfigError, CoreError, RemoteError};
use crate::session::{NewSession, Session, SessionAction, UserSettings};
use crate::task::{Task, TaskStatus};

pub const DEFAULT_SESSION_URL: &str = "http://localhost:8082/api/pomodoro";
pub const DEFAULT_TASK_URL: &str = "http://localhost:8081/api";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection options shared by both clients.
#[derive(Debug, Clone)]
pub struct HttpOptions {
    /// Forwarded as a bearer token when set.
    pub token: Option<String>,
    pub timeout: Duration,
    /// Offset used to read timestamps that carry no zone.
    pub wire_offset: FixedOffset,
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self {
            token: None,
            timeout: DEFAULT_TIMEOUT,
            wire_offset: Local::now().offset().fix(),
        }
    }
}

#[derive(Debug, Clone)]
struct RestClient {
    base: String,
    client: Client,
    token: Option<String>,
}

impl RestClient {
    fn new(base_url: &str, options: &HttpOptions) -> Result<Self, CoreError> {
        let parsed = Url::parse(base_url).map_err(|e| ConfigError::InvalidValue {
            key: "backend url".to_string(),
            message: format!("{base_url}: {e}"),
        })?;
        let client = Client::builder()
            .timeout(options.timeout)
            .build()
            .map_err(RemoteError::from)?;
        Ok(Self {
            base: parsed.as_str().trim_end_matches('/').to_string(),
            client,
            token: options.token.clone().filter(|t| !t.is_empty()),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    fn request(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.request(self.client.get(self.url(path)))
    }

    fn post(&self, path: &str) -> RequestBuilder {
        self.request(self.client.post(self.url(path)))
    }

    fn put(&self, path: &str) -> RequestBuilder {
        self.request(self.client.put(self.url(path)))
    }
}

/// Send and turn any non-2xx answer into [`RemoteError::Status`].
async fn send(builder: RequestBuilder) -> Result<Response, RemoteError> {
    let response = builder.send().await?;
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(RemoteError::Status {
        status: status.as_u16(),
        body,
    })
}

async fn send_text(builder: RequestBuilder) -> Result<String, RemoteError> {
    let response = send(builder).await?;
    Ok(response.text().await?)
}

async fn send_json<T: DeserializeOwned>(builder: RequestBuilder) -> Result<T, RemoteError> {
    let body = send_text(builder).await?;
    serde_json::from_str(&body).map_err(|e| RemoteError::Decode(e.to_string()))
}

/// Client for the session service.
#[derive(Debug, Clone)]
pub struct HttpSessionBackend {
    rest: RestClient,
    wire_offset: FixedOffset,
}

impl HttpSessionBackend {
    /// # Errors
    /// Fails on an unparseable base URL or if the HTTP client cannot be built.
    pub fn new(base_url: &str, options: HttpOptions) -> Result<Self, CoreError> {
        Ok(Self {
            rest: RestClient::new(base_url, &options)?,
            wire_offset: options.wire_offset,
        })
    }
}

#[async_trait]
impl SessionBackend for HttpSessionBackend {
    async fn create_session(&self, request: &NewSession) -> Result<Session, RemoteError> {
        let body = send_text(self.rest.post("/sessions").json(request)).await?;
        decode_session(&body, self.wire_offset)
    }

    async fn transition_session(
        &self,
        id: &str,
        action: SessionAction,
        notes: Option<&str>,
    ) -> Result<Session, RemoteError> {
        let path = format!("/sessions/{id}/{}", action.as_str());
        let mut builder = self.rest.post(&path);
        if action.carries_notes() {
            builder = builder.json(&json!({ "notes": notes }));
        }
        debug!(session_id = id, %action, "remote transition");
        let body = send_text(builder).await?;
        decode_session(&body, self.wire_offset)
    }

    async fn current_session(&self) -> Result<Option<Session>, RemoteError> {
        let response = send(self.rest.get("/sessions/current")).await?;
        if response.status() == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        let body = response.text().await?;
        if body.trim().is_empty() {
            return Ok(None);
        }
        decode_session(&body, self.wire_offset).map(Some)
    }

    async fn list_sessions(&self) -> Result<Vec<Session>, RemoteError> {
        let body = send_text(self.rest.get("/sessions")).await?;
        decode_sessions(&body, self.wire_offset)
    }

    async fn list_sessions_for_task(&self, task_id: &str) -> Result<Vec<Session>, RemoteError> {
        let body = send_text(self.rest.get(&format!("/sessions/task/{task_id}"))).await?;
        decode_sessions(&body, self.wire_offset)
    }

    async fn get_session(&self, id: &str) -> Result<Session, RemoteError> {
        let body = send_text(self.rest.get(&format!("/sessions/{id}"))).await?;
        decode_session(&body, self.wire_offset)
    }

    async fn get_settings(&self) -> Result<UserSettings, RemoteError> {
        send_json(self.rest.get("/settings")).await
    }

    async fn update_settings(&self, settings: &UserSettings) -> Result<UserSettings, RemoteError> {
        send_json(self.rest.put("/settings").json(settings)).await
    }

    async fn reset_settings(&self) -> Result<UserSettings, RemoteError> {
        send_json(self.rest.post("/settings/reset")).await
    }
}

/// Client for the task service.
///
/// The service has no partial update: a status change reads the task list,
/// and writes the whole task back with the new status.
#[derive(Debug, Clone)]
pub struct HttpTaskBackend {
    rest: RestClient,
}

impl HttpTaskBackend {
    /// # Errors
    /// Fails on an unparseable base URL or if the HTTP client cannot be built.
    pub fn new(base_url: &str, options: HttpOptions) -> Result<Self, CoreError> {
        Ok(Self {
            rest: RestClient::new(base_url, &options)?,
        })
    }
}

#[async_trait]
impl TaskBackend for HttpTaskBackend {
    async fn list_tasks(&self) -> Result<Vec<Task>, RemoteError> {
        send_json(self.rest.get("/tasks")).await
    }

    async fn update_task_status(&self, id: &str, status: TaskStatus) -> Result<Task, RemoteError> {
        let current = self
            .list_tasks()
            .await?
            .into_iter()
            .find(|t| t.id == id)
            .ok_or_else(|| RemoteError::Status {
                status: StatusCode::NOT_FOUND.as_u16(),
                body: format!("task {id} not found"),
            })?;
        let updated = current.with_status(status);

        let body = send_text(self.rest.put(&format!("/tasks/edit/{id}")).json(&updated)).await?;
        if body.trim().is_empty() {
            return Ok(updated);
        }
        serde_json::from_str(&body).map_err(|e| RemoteError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn options() -> HttpOptions {
        HttpOptions {
            token: Some("secret".to_string()),
            timeout: Duration::from_secs(5),
            wire_offset: FixedOffset::east_opt(0).unwrap(),
        }
    }

    const SESSION: &str = r#"{
        "id": "s1",
        "type": "FOCUS",
        "status": "RUNNING",
        "plannedDurationMinutes": 25,
        "startTime": "2024-05-06T09:00:00",
        "totalPausedMinutes": 0
    }"#;

    #[tokio::test]
    async fn create_posts_request_with_bearer_token() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/pomodoro/sessions")
            .match_header("authorization", "Bearer secret")
            .match_body(Matcher::Json(json!({"type": "FOCUS", "durationMinutes": 25})))
            .with_status(201)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id":"s1","type":"FOCUS","status":"WAITING","plannedDurationMinutes":25}"#)
            .create_async()
            .await;

        let backend =
            HttpSessionBackend::new(&format!("{}/api/pomodoro/", server.url()), options()).unwrap();
        let session = backend
            .create_session(&NewSession::new(crate::session::SessionType::Focus).with_duration(25))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(session.id, "s1");
        assert!(session.start_time.is_none());
    }

    #[tokio::test]
    async fn complete_sends_notes_and_start_does_not() {
        let mut server = mockito::Server::new_async().await;
        let complete = server
            .mock("POST", "/sessions/s1/complete")
            .match_body(Matcher::Json(json!({"notes": "shipped"})))
            .with_status(200)
            .with_body(SESSION.replace("RUNNING", "COMPLETED"))
            .create_async()
            .await;
        let start = server
            .mock("POST", "/sessions/s1/start")
            .with_status(200)
            .with_body(SESSION)
            .create_async()
            .await;

        let backend = HttpSessionBackend::new(&server.url(), options()).unwrap();
        let done = backend
            .transition_session("s1", SessionAction::Complete, Some("shipped"))
            .await
            .unwrap();
        let running = backend
            .transition_session("s1", SessionAction::Start, None)
            .await
            .unwrap();

        complete.assert_async().await;
        start.assert_async().await;
        assert_eq!(done.status, crate::session::SessionStatus::Completed);
        assert_eq!(running.status, crate::session::SessionStatus::Running);
    }

    #[tokio::test]
    async fn non_success_status_is_reported_with_body() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/sessions/s1/pause")
            .with_status(400)
            .with_body("Session is not running")
            .create_async()
            .await;

        let backend = HttpSessionBackend::new(&server.url(), options()).unwrap();
        let err = backend
            .transition_session("s1", SessionAction::Pause, None)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            RemoteError::Status {
                status: 400,
                body: "Session is not running".to_string()
            }
        );
    }

    #[tokio::test]
    async fn no_content_means_no_current_session() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/sessions/current")
            .with_status(204)
            .create_async()
            .await;

        let backend = HttpSessionBackend::new(&server.url(), options()).unwrap();
        assert!(backend.current_session().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn malformed_body_is_a_decode_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/settings")
            .with_status(200)
            .with_body("<html>")
            .create_async()
            .await;

        let backend = HttpSessionBackend::new(&server.url(), options()).unwrap();
        assert!(matches!(
            backend.get_settings().await.unwrap_err(),
            RemoteError::Decode(_)
        ));
    }

    #[tokio::test]
    async fn task_update_writes_back_the_task_unchanged_but_for_status() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/tasks")
            .with_status(200)
            .with_body(r#"[{"id":"t1","title":"Write","status":"TODO","priority":"HIGH"}]"#)
            .create_async()
            .await;
        let put = server
            .mock("PUT", "/tasks/edit/t1")
            .match_body(Matcher::Json(json!({
                "id": "t1",
                "title": "Write",
                "status": "IN_PROGRESS",
                "priority": "HIGH"
            })))
            .with_status(200)
            .with_body(r#"{"id":"t1","title":"Write","status":"IN_PROGRESS","priority":"HIGH"}"#)
            .create_async()
            .await;

        let backend = HttpTaskBackend::new(&server.url(), options()).unwrap();
        let task = backend
            .update_task_status("t1", TaskStatus::InProgress)
            .await
            .unwrap();

        put.assert_async().await;
        assert_eq!(task.status, TaskStatus::InProgress);
        assert_eq!(task.extra["priority"], "HIGH");
    }

    #[tokio::test]
    async fn updating_an_unknown_task_is_not_found() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/tasks")
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;

        let backend = HttpTaskBackend::new(&server.url(), options()).unwrap();
        let err = backend
            .update_task_status("nope", TaskStatus::Completed)
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::Status { status: 404, .. }));
    }

    #[test]
    fn invalid_base_url_is_a_config_error() {
        let err = HttpTaskBackend::new("not a url", options()).unwrap_err();
        assert!(matches!(err, CoreError::Config(ConfigError::InvalidValue { .. })));
    }
}
