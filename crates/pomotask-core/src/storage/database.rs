//! SQLite-backed local cache and event outbox.
//!
//! Provides persistent storage for:
//! - The id of the session the driver is watching
//! - The last known snapshot of each session
//! - Multi-task links, which the session service cannot hold
//! - An append-only outbox of engine events

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use super::{data_dir, migrations};
use crate::error::{CoreError, DatabaseError, Result};
use crate::events::Event;
use crate::session::Session;
use crate::task::TaskLinks;

const ACTIVE_SESSION_KEY: &str = "active_session_id";

/// An event read back from the outbox.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEvent {
    pub seq: i64,
    pub event: Event,
    pub recorded_at: DateTime<Utc>,
}

/// SQLite database for the local session cache.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Get a reference to the underlying SQLite connection.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Open the database at `~/.config/pomotask/pomotask.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self> {
        let path = data_dir()?.join("pomotask.db");
        Ok(Self::open_at(&path)?)
    }

    /// Open (or create) the database at `path`.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open_at(path: &Path) -> Result<Self, DatabaseError> {
        let conn = Connection::open(path).map_err(|source| DatabaseError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Self::with_connection(conn)
    }

    /// Open an in-memory database.
    ///
    /// # Errors
    /// Returns an error if the schema cannot be created.
    pub fn open_memory() -> Result<Self, DatabaseError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, DatabaseError> {
        migrations::migrate(&conn).map_err(|e| DatabaseError::MigrationFailed(e.to_string()))?;
        Ok(Self { conn })
    }

    /// Get a value from the kv store.
    pub fn kv_get(&self, key: &str) -> Result<Option<String>, DatabaseError> {
        let mut stmt = self.conn.prepare("SELECT value FROM kv WHERE key = ?1")?;
        let result = stmt.query_row(params![key], |row| row.get::<_, String>(0));
        match result {
            Ok(v) => Ok(Some(v)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Set a value in the kv store.
    pub fn kv_set(&self, key: &str, value: &str) -> Result<(), DatabaseError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn kv_delete(&self, key: &str) -> Result<(), DatabaseError> {
        self.conn.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(())
    }

    pub fn active_session_id(&self) -> Result<Option<String>, DatabaseError> {
        self.kv_get(ACTIVE_SESSION_KEY)
    }

    pub fn set_active_session_id(&self, id: Option<&str>) -> Result<(), DatabaseError> {
        match id {
            Some(id) => self.kv_set(ACTIVE_SESSION_KEY, id),
            None => self.kv_delete(ACTIVE_SESSION_KEY),
        }
    }

    /// Store the full session, replacing any earlier snapshot of it.
    pub fn save_snapshot(&self, session: &Session) -> Result<()> {
        let payload = serde_json::to_string(session)?;
        self.conn.execute(
            "INSERT OR REPLACE INTO session_snapshots (session_id, status, payload, updated_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                session.id,
                session.status.as_str(),
                payload,
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }

    pub fn load_snapshot(&self, session_id: &str) -> Result<Option<Session>> {
        let payload: Option<String> = self
            .conn
            .query_row(
                "SELECT payload FROM session_snapshots WHERE session_id = ?1",
                params![session_id],
                |row| row.get(0),
            )
            .optional()?;
        payload
            .map(|p| serde_json::from_str(&p).map_err(CoreError::from))
            .transpose()
    }

    /// Snapshots, most recently written first.
    pub fn list_snapshots(&self, limit: usize) -> Result<Vec<Session>> {
        let mut stmt = self.conn.prepare(
            "SELECT payload FROM session_snapshots ORDER BY updated_at DESC, rowid DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| row.get::<_, String>(0))?;
        let mut sessions = Vec::new();
        for row in rows {
            sessions.push(serde_json::from_str(&row?)?);
        }
        Ok(sessions)
    }

    pub fn save_task_links(&self, session_id: &str, links: &TaskLinks) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO task_links (session_id, task_ids, task_titles, updated_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                session_id,
                serde_json::to_string(&links.task_ids)?,
                serde_json::to_string(&links.task_titles)?,
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }

    pub fn load_task_links(&self, session_id: &str) -> Result<Option<TaskLinks>> {
        let row: Option<(String, String)> = self
            .conn
            .query_row(
                "SELECT task_ids, task_titles FROM task_links WHERE session_id = ?1",
                params![session_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let Some((ids, titles)) = row else {
            return Ok(None);
        };
        let ids: Vec<String> = serde_json::from_str(&ids)?;
        let titles: Vec<String> = serde_json::from_str(&titles)?;
        Ok(Some(TaskLinks::new(&ids, &titles)?))
    }

    /// Append to the outbox and return the event's sequence number.
    pub fn append_event(&self, event: &Event) -> Result<i64> {
        let payload = serde_json::to_string(event)?;
        self.conn.execute(
            "INSERT INTO events (kind, session_id, payload, recorded_at) VALUES (?1, ?2, ?3, ?4)",
            params![event.kind(), event.session_id(), payload, Utc::now().to_rfc3339()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Outbox entries with `seq > after`, oldest first.
    pub fn events_since(&self, after: i64, limit: usize) -> Result<Vec<StoredEvent>> {
        let mut stmt = self.conn.prepare(
            "SELECT seq, payload, recorded_at FROM events WHERE seq > ?1 ORDER BY seq LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![after, limit as i64], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        let mut events = Vec::new();
        for row in rows {
            let (seq, payload, recorded_at) = row?;
            let recorded_at = DateTime::parse_from_rfc3339(&recorded_at)
                .map_err(|e| DatabaseError::QueryFailed(format!("bad recorded_at: {e}")))?
                .with_timezone(&Utc);
            events.push(StoredEvent {
                seq,
                event: serde_json::from_str(&payload)?,
                recorded_at,
            });
        }
        Ok(events)
    }
}
