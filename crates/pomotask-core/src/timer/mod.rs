mod reconciler;
mod ticker;

pub use reconciler::{Remaining, TimeReconciler, DEFAULT_SKEW_THRESHOLD_SECS};
pub use ticker::{TickSignal, Ticker, DEFAULT_TICK_INTERVAL};
