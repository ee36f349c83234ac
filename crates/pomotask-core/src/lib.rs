//! # Pomotask Core Library
//!
//! Focus-session engine for a task-tracking client. Sessions and tasks live
//! in two REST services; this library keeps one session's lifecycle
//! consistent with them, reconstructs remaining time from absolute
//! timestamps, and propagates session progress to linked tasks.
//!
//! ## Architecture
//!
//! - **Time reconciler**: pure function from a session and "now" to the time
//!   left, tolerant of restarts and timezone-shifted timestamps
//! - **State machine**: the only way a session changes status
//! - **Task links**: multi-task linkage and task status propagation
//! - **Driver**: owns the current session, the tick, persistence and events
//! - **Storage**: SQLite session cache and event outbox, TOML configuration
//!
//! ## Key Components
//!
//! - [`SessionDriver`]: orchestration entry point
//! - [`TimeReconciler`]: remaining-time computation
//! - [`SessionStateMachine`]: legal transitions
//! - [`TaskLinkReconciler`]: session ↔ task bookkeeping
//! - [`SessionBackend`] / [`TaskBackend`]: the external services

pub mod clock;
pub mod driver;
pub mod error;
pub mod events;
pub mod remote;
pub mod session;
pub mod storage;
pub mod task;
pub mod timer;

pub use clock::{Clock, ManualClock, SystemClock};
pub use driver::{CreateOutcome, DriverOptions, SessionDriver, StartReport, TickOutcome};
pub use error::{ConfigError, CoreError, DatabaseError, RemoteError, ValidationError};
pub use events::{Event, EventBus};
pub use remote::{
    HttpOptions, HttpSessionBackend, HttpTaskBackend, InMemoryBackend, SessionBackend, TaskBackend,
};
pub use session::{
    NewSession, Session, SessionAction, SessionEvent, SessionStateMachine, SessionStatus,
    SessionType, UserSettings,
};
pub use storage::{Config, Database};
pub use task::{Task, TaskLinkReconciler, TaskLinks, TaskStatus, TaskSyncReport};
pub use timer::{Remaining, TimeReconciler};
