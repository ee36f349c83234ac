mod model;
mod settings;
mod state_machine;

pub use model::{NewSession, Session, SessionAction, SessionStatus, SessionType};
pub use settings::{UserSettings, DEFAULT_CUSTOM_DURATION_MIN};
pub use state_machine::{
    valid_actions, SessionEvent, SessionStateMachine, AUTO_COMPLETE_NOTE,
};

pub(crate) use state_machine::minutes_between;
