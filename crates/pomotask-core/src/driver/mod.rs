//! Session orchestration.
//!
//! [`SessionDriver`] is the single owner of the current session. Every
//! mutation goes through the [`SessionStateMachine`]; remaining time is
//! re-derived by the [`TimeReconciler`] on each tick rather than counted
//! down.
//!
//! ## Remote transitions
//!
//! A transition is applied locally first, then sent to the session
//! service. The backend's answer becomes the current session, except for
//! two fields: task links (the service keeps a single legacy task) and
//! `totalPausedMinutes`, which is never allowed to go down. If the call
//! fails, the local state is rolled back, except for auto-completion: the
//! time is up whether or not the backend heard about it, and the next
//! `init` against a still-running remote session completes it again.
//!
//! ## Ticks
//!
//! While the session is `RUNNING` a [`Ticker`] posts its session id onto a
//! channel owned by the driver. Callers pump it with [`SessionDriver::tick`].
//! Signals for a session that is no longer current are dropped.

mod pending;

pub use pending::{PendingGuard, PendingOps};

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::error::{CoreError, RemoteError, Result, ValidationError};
use crate::events::{Event, EventBus};
use crate::remote::{SessionBackend, TaskBackend};
use crate::session::{
    NewSession, Session, SessionEvent, SessionStateMachine, SessionStatus, UserSettings,
};
use crate::storage::{Config, Database};
use crate::task::{TaskLinkReconciler, TaskSyncReport};
use crate::timer::{Remaining, TickSignal, Ticker, TimeReconciler, DEFAULT_TICK_INTERVAL};

pub const DEFAULT_RECENT_SESSIONS: usize = 5;

/// Pending-operation key for requests not yet bound to a session id.
const NEW_SESSION_KEY: &str = "new";

#[derive(Clone)]
pub struct DriverOptions {
    pub tick_interval: Duration,
    /// Length of the history side channel.
    pub recent_sessions: usize,
    /// Settings used until the session service answers.
    pub fallback_settings: UserSettings,
    pub reconciler: TimeReconciler,
    pub state_machine: SessionStateMachine,
    pub clock: Arc<dyn Clock>,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            tick_interval: DEFAULT_TICK_INTERVAL,
            recent_sessions: DEFAULT_RECENT_SESSIONS,
            fallback_settings: UserSettings::default(),
            reconciler: TimeReconciler::local(),
            state_machine: SessionStateMachine::new(),
            clock: Arc::new(SystemClock),
        }
    }
}

impl DriverOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            tick_interval: config.tick_interval(),
            recent_sessions: config.timer.recent_sessions,
            fallback_settings: config.fallback_settings(),
            reconciler: TimeReconciler::local().with_skew_threshold(config.skew_threshold()),
            state_machine: SessionStateMachine::with_auto_complete_note(
                config.timer.auto_complete_note.clone(),
            ),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_reconciler(mut self, reconciler: TimeReconciler) -> Self {
        self.reconciler = reconciler;
        self
    }

    pub fn with_tick_interval(mut self, tick_interval: Duration) -> Self {
        self.tick_interval = tick_interval;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CreateOutcome {
    Created { session: Session },
    /// Another session is still active. Resolve with
    /// [`SessionDriver::confirm_replace`] or [`SessionDriver::cancel_replace`].
    NeedsConfirmation { active: Session },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StartReport {
    pub session: Session,
    pub remaining: Option<Remaining>,
    pub tasks: TaskSyncReport,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TickOutcome {
    Remaining { remaining: Remaining },
    AutoCompleted { session: Session },
    /// The session is current but not running.
    Idle,
}

pub struct SessionDriver {
    sessions: Arc<dyn SessionBackend>,
    links: TaskLinkReconciler,
    db: Database,
    events: EventBus,
    outbox: broadcast::Receiver<Event>,
    options: DriverOptions,
    settings: UserSettings,
    current: Option<Session>,
    remaining: Option<Remaining>,
    recent: Vec<Session>,
    ticker: Option<Ticker>,
    tick_tx: mpsc::UnboundedSender<TickSignal>,
    tick_rx: mpsc::UnboundedReceiver<TickSignal>,
    pending: PendingOps,
    pending_create: Option<NewSession>,
}

impl SessionDriver {
    pub fn new(
        sessions: Arc<dyn SessionBackend>,
        tasks: Arc<dyn TaskBackend>,
        db: Database,
        options: DriverOptions,
    ) -> Self {
        let events = EventBus::new();
        let outbox = events.subscribe();
        let (tick_tx, tick_rx) = mpsc::unbounded_channel();
        Self {
            sessions,
            links: TaskLinkReconciler::new(tasks, events.clone(), options.clock.clone()),
            db,
            events,
            outbox,
            settings: options.fallback_settings,
            options,
            current: None,
            remaining: None,
            recent: Vec::new(),
            ticker: None,
            tick_tx,
            tick_rx,
            pending: PendingOps::new(),
            pending_create: None,
        }
    }

    pub fn session(&self) -> Option<&Session> {
        self.current.as_ref()
    }

    /// Remaining time as of the last recomputation.
    pub fn remaining(&self) -> Option<Remaining> {
        self.remaining
    }

    pub fn settings(&self) -> UserSettings {
        self.settings
    }

    pub fn recent_sessions(&self) -> &[Session] {
        &self.recent
    }

    pub fn is_ticking(&self) -> bool {
        self.ticker.is_some()
    }

    /// The create request waiting for confirmation, if any.
    pub fn awaiting_confirmation(&self) -> Option<&NewSession> {
        self.pending_create.as_ref()
    }

    pub fn pending_ops(&self) -> PendingOps {
        self.pending.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    fn now(&self) -> DateTime<Utc> {
        self.options.clock.now()
    }

    /// Load settings and the current session, then recompute remaining
    /// time. A running session whose time ran out while nobody watched is
    /// completed here.
    ///
    /// # Errors
    /// Only fails if the backend is unreachable and the local cache cannot
    /// be read either.
    pub async fn init(&mut self) -> Result<Option<Session>> {
        if let Err(e) = self.refresh_settings().await {
            warn!(error = %e, "using fallback settings");
        }

        let restored = match self.sessions.current_session().await {
            Ok(Some(remote)) => Some(self.with_cached_state(remote)),
            Ok(None) => self.confirm_cached_session().await?,
            Err(e) => {
                warn!(error = %e, "session service unreachable, restoring cached session");
                self.cached_session()?
            }
        };

        match restored {
            Some(session) => {
                info!(session_id = %session.id, status = %session.status, "session restored");
                self.adopt(session);
                if self.remaining.is_some_and(|r| r.auto_completed) {
                    self.transition(SessionEvent::AutoComplete).await?;
                }
            }
            None => {
                self.current = None;
                self.remaining = None;
                self.sync_ticker();
                if let Err(e) = self.db.set_active_session_id(None) {
                    warn!(error = %e, "failed to clear active session id");
                }
            }
        }

        self.refresh_history().await;
        self.publish_snapshot();
        self.flush_outbox();
        Ok(self.current.clone())
    }

    /// Merge locally cached links and paused time into a remote session.
    fn with_cached_state(&self, mut session: Session) -> Session {
        match self.db.load_task_links(&session.id) {
            Ok(Some(links)) => session.set_task_links(links),
            Ok(None) => {}
            Err(e) => warn!(session_id = %session.id, error = %e, "failed to read cached links"),
        }
        if let Ok(Some(cached)) = self.db.load_snapshot(&session.id) {
            session.total_paused_minutes =
                session.total_paused_minutes.max(cached.total_paused_minutes);
        }
        session
    }

    /// The service only reports running or paused sessions as current, so
    /// a cached `WAITING` session is looked up by id instead.
    async fn confirm_cached_session(&self) -> Result<Option<Session>> {
        let Some(cached) = self.cached_session()? else {
            return Ok(None);
        };
        match self.sessions.get_session(&cached.id).await {
            Ok(remote) if remote.is_active() => Ok(Some(self.with_cached_state(remote))),
            Ok(remote) => {
                info!(session_id = %remote.id, status = %remote.status, "cached session ended remotely");
                self.persist(&self.with_cached_state(remote));
                Ok(None)
            }
            Err(RemoteError::Status { status: 404, .. }) => {
                info!(session_id = %cached.id, "cached session no longer exists");
                Ok(None)
            }
            Err(e) => {
                warn!(session_id = %cached.id, error = %e, "could not confirm cached session");
                Ok(Some(cached))
            }
        }
    }

    fn cached_session(&self) -> Result<Option<Session>> {
        let Some(id) = self.db.active_session_id()? else {
            return Ok(None);
        };
        Ok(self.db.load_snapshot(&id)?.filter(Session::is_active))
    }

    /// Create a session, or ask for confirmation if one is still active.
    ///
    /// # Errors
    /// Returns a validation error for a zero duration, or the remote error.
    pub async fn create(&mut self, request: NewSession) -> Result<CreateOutcome> {
        if let Some(active) = self.current.as_ref().filter(|s| s.is_active()) {
            info!(active_id = %active.id, "create needs confirmation");
            let active = active.clone();
            self.pending_create = Some(request);
            return Ok(CreateOutcome::NeedsConfirmation { active });
        }
        let session = self.create_now(request).await?;
        Ok(CreateOutcome::Created { session })
    }

    /// Abandon the active session and create the request awaiting
    /// confirmation.
    ///
    /// # Errors
    /// [`CoreError::NothingToConfirm`] if no create is waiting.
    pub async fn confirm_replace(&mut self) -> Result<Session> {
        let request = self
            .pending_create
            .take()
            .ok_or(CoreError::NothingToConfirm)?;
        self.create_now(request).await
    }

    /// Drop the request awaiting confirmation and keep the active session.
    ///
    /// # Errors
    /// [`CoreError::NothingToConfirm`] if no create is waiting.
    pub fn cancel_replace(&mut self) -> Result<NewSession> {
        self.pending_create.take().ok_or(CoreError::NothingToConfirm)
    }

    async fn create_now(&mut self, mut request: NewSession) -> Result<Session> {
        let duration = request
            .duration_minutes
            .unwrap_or_else(|| self.settings.duration_for(request.session_type));
        if duration == 0 {
            return Err(ValidationError::InvalidValue {
                field: "durationMinutes".to_string(),
                message: "must be a positive number of minutes".to_string(),
            }
            .into());
        }
        request.duration_minutes = Some(duration);

        let _guard = self.pending.begin(NEW_SESSION_KEY, "create")?;
        let mut session = self.sessions.create_session(&request).await?;
        let links = session.task_links();
        session.set_task_links(links);

        let now = self.now();
        if let Some(old) = self.current.take().filter(Session::is_active) {
            info!(session_id = %old.id, replaced_by = %session.id, "session superseded");
            self.events.publish(Event::SessionSuperseded {
                session_id: old.id,
                replaced_by: session.id.clone(),
                at: now,
            });
        }
        info!(session_id = %session.id, session_type = %session.session_type, planned = duration, "session created");
        self.events.publish(Event::SessionCreated {
            session_id: session.id.clone(),
            session_type: session.session_type,
            planned_minutes: session.planned_duration_minutes,
            at: now,
        });

        self.adopt(session.clone());
        self.refresh_history().await;
        self.flush_outbox();
        Ok(session)
    }

    /// Start a waiting session or resume a paused one, then move linked
    /// TODO tasks to IN_PROGRESS.
    ///
    /// # Errors
    /// `NoActiveSession`, `InvalidTransition`, `OperationPending`, or the
    /// remote error after rollback. Task failures are reported in
    /// [`StartReport::tasks`] and never fail the start.
    pub async fn start(&mut self) -> Result<StartReport> {
        let resuming = self.current_status()? == SessionStatus::Paused;
        let session = self.transition(SessionEvent::Start).await?;
        let remaining_minutes = self.remaining.map_or(0.0, |r| r.minutes);
        let at = self.now();
        self.events.publish(if resuming {
            Event::SessionResumed {
                session_id: session.id.clone(),
                remaining_minutes,
                at,
            }
        } else {
            Event::SessionStarted {
                session_id: session.id.clone(),
                remaining_minutes,
                at,
            }
        });

        let tasks = self.links.on_session_start(&session).await;
        if tasks.has_failures() {
            warn!(session_id = %session.id, failed = tasks.failures.len(), "some linked tasks were not moved");
        }
        self.flush_outbox();
        Ok(StartReport {
            session,
            remaining: self.remaining,
            tasks,
        })
    }

    /// # Errors
    /// Same as [`SessionDriver::start`].
    pub async fn pause(&mut self) -> Result<Session> {
        let session = self.transition(SessionEvent::Pause).await?;
        self.events.publish(Event::SessionPaused {
            session_id: session.id.clone(),
            remaining_minutes: self.remaining.map_or(0.0, |r| r.minutes),
            at: self.now(),
        });
        self.flush_outbox();
        Ok(session)
    }

    /// # Errors
    /// Same as [`SessionDriver::start`].
    pub async fn complete(&mut self, notes: Option<String>) -> Result<Session> {
        self.transition(SessionEvent::Complete { notes }).await
    }

    /// # Errors
    /// Same as [`SessionDriver::start`].
    pub async fn stop(&mut self, notes: Option<String>) -> Result<Session> {
        self.transition(SessionEvent::Stop { notes }).await
    }

    fn current_status(&self) -> Result<SessionStatus> {
        self.current
            .as_ref()
            .map(|s| s.status)
            .ok_or(CoreError::NoActiveSession)
    }

    async fn transition(&mut self, event: SessionEvent) -> Result<Session> {
        let previous = self.current.clone().ok_or(CoreError::NoActiveSession)?;
        let action = event.action();
        let automatic = event == SessionEvent::AutoComplete;
        let _guard = self.pending.begin(&previous.id, action.as_str())?;

        let notes = match &event {
            SessionEvent::Complete { notes } | SessionEvent::Stop { notes } => notes.clone(),
            SessionEvent::AutoComplete => {
                Some(self.options.state_machine.auto_complete_note().to_string())
            }
            SessionEvent::Start | SessionEvent::Pause => None,
        };
        let optimistic = self
            .options
            .state_machine
            .apply(&previous, event, self.now())?;
        self.set_local(optimistic.clone());

        let confirmed = match self
            .sessions
            .transition_session(&previous.id, action, notes.as_deref())
            .await
        {
            Ok(remote) => reconcile_remote(&optimistic, remote),
            Err(e) if automatic => {
                warn!(session_id = %previous.id, error = %e, "auto-completion not confirmed remotely");
                optimistic
            }
            Err(e) => {
                warn!(session_id = %previous.id, %action, error = %e, "remote transition failed, rolling back");
                self.set_local(previous);
                return Err(e.into());
            }
        };

        info!(session_id = %confirmed.id, %action, status = %confirmed.status, automatic, "transition applied");
        self.adopt(confirmed.clone());

        let at = self.now();
        match confirmed.status {
            SessionStatus::Completed => self.events.publish(Event::SessionCompleted {
                session_id: confirmed.id.clone(),
                automatic,
                at,
            }),
            SessionStatus::Cancelled => self.events.publish(Event::SessionCancelled {
                session_id: confirmed.id.clone(),
                at,
            }),
            _ => {}
        }
        if confirmed.is_terminal() {
            self.refresh_history().await;
            self.flush_outbox();
        }
        Ok(confirmed)
    }

    /// Wait for the next tick of the current session.
    ///
    /// Returns `None` right away when nothing is ticking. Signals left over
    /// from a superseded session are dropped.
    pub async fn next_tick(&mut self) -> Option<TickSignal> {
        loop {
            let watched = self.ticker.as_ref()?.session_id().to_string();
            let signal = self.tick_rx.recv().await?;
            if signal.session_id == watched {
                return Some(signal);
            }
            debug!(session_id = %signal.session_id, "dropping stale tick");
        }
    }

    /// Recompute remaining time for `signal`'s session and auto-complete
    /// it once its time is up.
    ///
    /// # Errors
    /// [`CoreError::StaleSession`] if the signal is for a session that is
    /// no longer current.
    pub async fn handle_tick(&mut self, signal: TickSignal) -> Result<TickOutcome> {
        let status = match self.current.as_ref() {
            Some(s) if s.id == signal.session_id => s.status,
            _ => {
                return Err(CoreError::StaleSession {
                    session_id: signal.session_id,
                })
            }
        };
        if status != SessionStatus::Running {
            return Ok(TickOutcome::Idle);
        }

        let remaining = self.refresh_remaining().unwrap_or(Remaining {
            minutes: 0.0,
            auto_completed: false,
        });
        debug!(session_id = %signal.session_id, remaining = remaining.minutes, "tick");
        self.publish_snapshot();

        if remaining.auto_completed {
            let session = self.transition(SessionEvent::AutoComplete).await?;
            return Ok(TickOutcome::AutoCompleted { session });
        }
        self.flush_outbox();
        Ok(TickOutcome::Remaining { remaining })
    }

    /// Wait for one tick and process it. `None` once nothing is ticking.
    pub async fn tick(&mut self) -> Option<Result<TickOutcome>> {
        let signal = self.next_tick().await?;
        Some(self.handle_tick(signal).await)
    }

    /// Replace the current session's task links.
    ///
    /// # Errors
    /// `NoActiveSession`, or a validation error when ids and titles differ
    /// in length.
    pub fn link_tasks(&mut self, task_ids: &[String], titles: &[String]) -> Result<Session> {
        let current = self.current.as_ref().ok_or(CoreError::NoActiveSession)?;
        let linked = TaskLinkReconciler::link_tasks(current, task_ids, titles)?;
        info!(session_id = %linked.id, count = linked.task_ids.len(), "tasks linked");
        self.events.publish(Event::TasksLinked {
            session_id: linked.id.clone(),
            task_ids: linked.task_ids.clone(),
            at: self.now(),
        });
        self.adopt(linked.clone());
        self.flush_outbox();
        Ok(linked)
    }

    /// Mark a linked task completed in the task service and unlink it.
    ///
    /// # Errors
    /// `NotFound` if the task is not linked or no longer exists, or the
    /// remote error. The session is unchanged on error.
    pub async fn complete_linked_task(&mut self, task_id: &str) -> Result<Session> {
        let current = self.current.clone().ok_or(CoreError::NoActiveSession)?;
        if !current.task_links().contains(task_id) {
            return Err(CoreError::NotFound {
                kind: "linked task",
                id: task_id.to_string(),
            });
        }
        let _guard = self
            .pending
            .begin(&current.id, &format!("complete-task:{task_id}"))?;
        let updated = self
            .links
            .on_task_completed_from_session(&current, task_id)
            .await?;
        self.adopt(updated.clone());
        self.flush_outbox();
        Ok(updated)
    }

    /// Fetch settings from the session service.
    ///
    /// # Errors
    /// The remote error; the previous settings are kept.
    pub async fn refresh_settings(&mut self) -> Result<UserSettings> {
        self.settings = self.sessions.get_settings().await?;
        Ok(self.settings)
    }

    /// # Errors
    /// A validation error for a zero duration, or the remote error.
    pub async fn update_settings(&mut self, settings: UserSettings) -> Result<UserSettings> {
        settings.validate()?;
        let _guard = self.pending.begin(NEW_SESSION_KEY, "update-settings")?;
        self.settings = self.sessions.update_settings(&settings).await?;
        info!(settings = ?self.settings, "settings updated");
        Ok(self.settings)
    }

    /// # Errors
    /// The remote error.
    pub async fn reset_settings(&mut self) -> Result<UserSettings> {
        let _guard = self.pending.begin(NEW_SESSION_KEY, "reset-settings")?;
        self.settings = self.sessions.reset_settings().await?;
        info!("settings reset");
        Ok(self.settings)
    }

    /// Reload the last few sessions. Failures are logged and the previous
    /// list is kept.
    pub async fn refresh_history(&mut self) -> &[Session] {
        match self.sessions.list_sessions().await {
            Ok(mut sessions) => {
                sessions.truncate(self.options.recent_sessions);
                self.recent = sessions;
            }
            Err(e) => warn!(error = %e, "failed to refresh session history"),
        }
        &self.recent
    }

    /// Sessions that worked on `task_id`, newest first.
    ///
    /// # Errors
    /// The remote error.
    pub async fn task_history(&self, task_id: &str) -> Result<Vec<Session>> {
        Ok(self.sessions.list_sessions_for_task(task_id).await?)
    }

    /// Stop ticking and flush pending events to the outbox.
    pub fn shutdown(&mut self) {
        self.ticker = None;
        self.flush_outbox();
        info!("driver shut down");
    }

    fn refresh_remaining(&mut self) -> Option<Remaining> {
        let now = self.now();
        self.remaining = self
            .current
            .as_ref()
            .map(|s| self.options.reconciler.remaining(s, now));
        self.remaining
    }

    /// Make `session` current in memory only.
    fn set_local(&mut self, session: Session) {
        self.current = Some(session);
        self.refresh_remaining();
        self.sync_ticker();
    }

    /// Make `session` current and write it to the local cache.
    fn adopt(&mut self, session: Session) {
        self.persist(&session);
        self.set_local(session);
    }

    fn persist(&self, session: &Session) {
        let result = self
            .db
            .save_snapshot(session)
            .and_then(|()| self.db.save_task_links(&session.id, &session.task_links()))
            .and_then(|()| {
                let active = session.is_active().then_some(session.id.as_str());
                Ok(self.db.set_active_session_id(active)?)
            });
        if let Err(e) = result {
            warn!(session_id = %session.id, error = %e, "failed to cache session");
        }
    }

    /// Tick exactly while the current session is running.
    fn sync_ticker(&mut self) {
        let watch = self
            .current
            .as_ref()
            .filter(|s| s.status == SessionStatus::Running)
            .map(|s| s.id.clone());
        match watch {
            Some(id)
                if self
                    .ticker
                    .as_ref()
                    .is_some_and(|t| t.session_id() == id && !t.is_finished()) => {}
            Some(id) => {
                self.ticker = Some(Ticker::spawn(
                    id,
                    self.options.tick_interval,
                    self.tick_tx.clone(),
                ));
            }
            None => self.ticker = None,
        }
    }

    fn publish_snapshot(&self) {
        if let (Some(session), Some(remaining)) = (&self.current, self.remaining) {
            self.events.publish(Event::StateSnapshot {
                session_id: session.id.clone(),
                status: session.status,
                remaining_minutes: remaining.minutes,
                planned_minutes: session.planned_duration_minutes,
                at: self.now(),
            });
        }
    }

    /// Relay bus events to the durable outbox. Snapshots are transient and
    /// stay on the bus.
    fn flush_outbox(&mut self) {
        loop {
            match self.outbox.try_recv() {
                Ok(Event::StateSnapshot { .. }) => {}
                Ok(event) => {
                    if let Err(e) = self.db.append_event(&event) {
                        warn!(kind = event.kind(), error = %e, "failed to append event to outbox");
                    }
                }
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "outbox relay lagged behind the event bus");
                }
                Err(_) => break,
            }
        }
    }
}

/// Fold the backend's answer into the locally transitioned session.
fn reconcile_remote(local: &Session, mut remote: Session) -> Session {
    remote.set_task_links(local.task_links());
    remote.total_paused_minutes = remote.total_paused_minutes.max(local.total_paused_minutes);
    if remote.notes.is_none() {
        remote.notes.clone_from(&local.notes);
    }
    remote
}
