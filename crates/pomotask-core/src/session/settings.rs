use serde::{Deserialize, Serialize};

use super::SessionType;
use crate::error::ValidationError;

/// Fallback duration for `CUSTOM` sessions created without one.
pub const DEFAULT_CUSTOM_DURATION_MIN: u32 = 25;

/// Per-user default durations, owned by the session backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSettings {
    pub focus_duration_minutes: u32,
    pub short_break_duration_minutes: u32,
    pub long_break_duration_minutes: u32,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            focus_duration_minutes: 25,
            short_break_duration_minutes: 5,
            long_break_duration_minutes: 15,
        }
    }
}

impl UserSettings {
    /// Every duration must be positive.
    ///
    /// # Errors
    /// Returns the first zero field.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let fields = [
            ("focusDurationMinutes", self.focus_duration_minutes),
            ("shortBreakDurationMinutes", self.short_break_duration_minutes),
            ("longBreakDurationMinutes", self.long_break_duration_minutes),
        ];
        for (field, value) in fields {
            if value == 0 {
                return Err(ValidationError::InvalidValue {
                    field: field.to_string(),
                    message: "must be a positive number of minutes".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Default planned duration for a new session of `session_type`.
    pub fn duration_for(&self, session_type: SessionType) -> u32 {
        match session_type {
            SessionType::Focus => self.focus_duration_minutes,
            SessionType::ShortBreak => self.short_break_duration_minutes,
            SessionType::LongBreak => self.long_break_duration_minutes,
            SessionType::Custom => DEFAULT_CUSTOM_DURATION_MIN,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations_follow_session_type() {
        let settings = UserSettings {
            focus_duration_minutes: 50,
            short_break_duration_minutes: 10,
            long_break_duration_minutes: 30,
        };
        assert_eq!(settings.duration_for(SessionType::Focus), 50);
        assert_eq!(settings.duration_for(SessionType::ShortBreak), 10);
        assert_eq!(settings.duration_for(SessionType::LongBreak), 30);
        assert_eq!(settings.duration_for(SessionType::Custom), 25);
    }

    #[test]
    fn zero_duration_is_rejected() {
        let settings = UserSettings {
            short_break_duration_minutes: 0,
            ..UserSettings::default()
        };
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("shortBreakDurationMinutes"));
        assert!(UserSettings::default().validate().is_ok());
    }
}
