//! Wire format of the session service.
//!
//! Sessions arrive as camelCase JSON whose timestamps usually carry no zone
//! designator (`2024-05-06T09:00:00.123`). Those are read as wall-clock time
//! in the configured offset. Zone-qualified RFC 3339 strings are taken as
//! they are, which leaves nothing for the skew heuristic to correct.

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use serde::Deserialize;

use crate::error::RemoteError;
use crate::session::{Session, SessionStatus, SessionType};

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Parse a backend timestamp, reading naive values as local time at `offset`.
///
/// # Errors
/// Returns [`RemoteError::Decode`] if the string matches no known format.
pub fn parse_wire_timestamp(raw: &str, offset: FixedOffset) -> Result<DateTime<Utc>, RemoteError> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return offset
                .from_local_datetime(&naive)
                .single()
                .map(|ts| ts.with_timezone(&Utc))
                .ok_or_else(|| RemoteError::Decode(format!("ambiguous timestamp: {raw}")));
        }
    }
    Err(RemoteError::Decode(format!("unrecognised timestamp: {raw}")))
}

fn parse_opt(raw: Option<String>, offset: FixedOffset) -> Result<Option<DateTime<Utc>>, RemoteError> {
    raw.filter(|s| !s.trim().is_empty())
        .map(|s| parse_wire_timestamp(&s, offset))
        .transpose()
}

/// Session as returned by the session service.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionDto {
    pub id: String,
    #[serde(rename = "type")]
    pub session_type: SessionType,
    pub status: SessionStatus,
    pub planned_duration_minutes: u32,
    #[serde(default)]
    pub actual_duration_minutes: Option<i64>,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
    #[serde(default)]
    pub paused_at: Option<String>,
    #[serde(default)]
    pub total_paused_minutes: Option<f64>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub task_title: Option<String>,
    #[serde(default)]
    pub task_ids: Vec<String>,
    #[serde(default)]
    pub task_titles: Vec<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl SessionDto {
    /// Convert into the engine's session, resolving timestamps at `offset`.
    ///
    /// # Errors
    /// Returns [`RemoteError::Decode`] for an unparseable timestamp.
    pub fn into_session(self, offset: FixedOffset) -> Result<Session, RemoteError> {
        Ok(Session {
            id: self.id,
            session_type: self.session_type,
            status: self.status,
            planned_duration_minutes: self.planned_duration_minutes,
            start_time: parse_opt(self.start_time, offset)?,
            paused_at: parse_opt(self.paused_at, offset)?,
            total_paused_minutes: self.total_paused_minutes.unwrap_or(0.0).max(0.0),
            end_time: parse_opt(self.end_time, offset)?,
            notes: self.notes,
            task_ids: self.task_ids,
            task_titles: self.task_titles,
            task_id: self.task_id,
            task_title: self.task_title,
            created_at: parse_opt(self.created_at, offset)?,
            actual_duration_minutes: self.actual_duration_minutes,
        })
    }
}

/// Decode a JSON session body.
///
/// # Errors
/// Returns [`RemoteError::Decode`] on malformed JSON or timestamps.
pub fn decode_session(body: &str, offset: FixedOffset) -> Result<Session, RemoteError> {
    let dto: SessionDto =
        serde_json::from_str(body).map_err(|e| RemoteError::Decode(e.to_string()))?;
    dto.into_session(offset)
}

/// Decode a JSON array of sessions.
///
/// # Errors
/// Returns [`RemoteError::Decode`] on malformed JSON or timestamps.
pub fn decode_sessions(body: &str, offset: FixedOffset) -> Result<Vec<Session>, RemoteError> {
    let dtos: Vec<SessionDto> =
        serde_json::from_str(body).map_err(|e| RemoteError::Decode(e.to_string()))?;
    dtos.into_iter().map(|d| d.into_session(offset)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    #[test]
    fn naive_timestamp_is_read_at_offset() {
        let brt = FixedOffset::west_opt(3 * 3600).unwrap();
        let ts = parse_wire_timestamp("2024-05-06T09:00:00", brt).unwrap();
        assert_eq!(ts.to_rfc3339(), "2024-05-06T12:00:00+00:00");
    }

    #[test]
    fn fractional_seconds_are_accepted() {
        let ts = parse_wire_timestamp("2024-05-06T09:00:00.123456", utc()).unwrap();
        assert_eq!(ts.timestamp_subsec_micros(), 123_456);
    }

    #[test]
    fn zone_qualified_timestamp_ignores_offset() {
        let brt = FixedOffset::west_opt(3 * 3600).unwrap();
        let ts = parse_wire_timestamp("2024-05-06T09:00:00Z", brt).unwrap();
        assert_eq!(ts.to_rfc3339(), "2024-05-06T09:00:00+00:00");
    }

    #[test]
    fn garbage_timestamp_is_a_decode_error() {
        let err = parse_wire_timestamp("yesterday", utc()).unwrap_err();
        assert!(matches!(err, RemoteError::Decode(_)));
    }

    #[test]
    fn decodes_backend_session_payload() {
        let body = r#"{
            "id": "7f1c",
            "userId": "u1",
            "username": "ana",
            "taskId": "t1",
            "taskTitle": "Write spec",
            "type": "FOCUS",
            "status": "PAUSED",
            "plannedDurationMinutes": 25,
            "actualDurationMinutes": null,
            "remainingMinutes": 15,
            "startTime": "2024-05-06T09:00:00",
            "endTime": null,
            "pausedAt": "2024-05-06T09:10:00",
            "totalPausedMinutes": 0.5,
            "notes": null,
            "createdAt": "2024-05-06T08:59:00",
            "updatedAt": "2024-05-06T09:10:00"
        }"#;
        let s = decode_session(body, utc()).unwrap();
        assert_eq!(s.status, SessionStatus::Paused);
        assert_eq!(s.task_id.as_deref(), Some("t1"));
        assert!(s.task_ids.is_empty());
        assert_eq!(s.total_paused_minutes, 0.5);
        assert_eq!(
            s.paused_at.unwrap() - s.start_time.unwrap(),
            chrono::Duration::minutes(10)
        );
    }

    #[test]
    fn missing_paused_total_defaults_to_zero() {
        let body = r#"[{"id":"a","type":"SHORT_BREAK","status":"WAITING","plannedDurationMinutes":5}]"#;
        let sessions = decode_sessions(body, utc()).unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].total_paused_minutes, 0.0);
        assert!(sessions[0].start_time.is_none());
    }
}
