pub mod config;
pub mod events;
pub mod session;
pub mod settings;
pub mod task;
