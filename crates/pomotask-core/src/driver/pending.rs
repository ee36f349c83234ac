//! In-flight remote mutations.
//!
//! A view holding a clone of [`PendingOps`] can grey out a control while
//! the driver waits on the network for that same operation.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{CoreError, Result};

#[derive(Debug, Clone, Default)]
pub struct PendingOps {
    inner: Arc<Mutex<HashSet<String>>>,
}

fn key(session_id: &str, operation: &str) -> String {
    format!("{session_id}:{operation}")
}

impl PendingOps {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Mark `operation` on `session_id` as in flight until the guard drops.
    ///
    /// # Errors
    /// Returns [`CoreError::OperationPending`] if it already is.
    pub fn begin(&self, session_id: &str, operation: &str) -> Result<PendingGuard> {
        let key = key(session_id, operation);
        if !self.lock().insert(key.clone()) {
            return Err(CoreError::OperationPending {
                operation: operation.to_string(),
            });
        }
        Ok(PendingGuard {
            ops: self.clone(),
            key,
        })
    }

    pub fn is_pending(&self, session_id: &str, operation: &str) -> bool {
        self.lock().contains(&key(session_id, operation))
    }

    pub fn is_idle(&self) -> bool {
        self.lock().is_empty()
    }
}

/// Clears its entry on drop, including when the owning future is cancelled.
#[derive(Debug)]
pub struct PendingGuard {
    ops: PendingOps,
    key: String,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.ops.lock().remove(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_begin_of_same_operation_is_rejected() {
        let ops = PendingOps::new();
        let guard = ops.begin("s1", "pause").unwrap();
        assert!(ops.is_pending("s1", "pause"));
        assert!(matches!(
            ops.begin("s1", "pause"),
            Err(CoreError::OperationPending { .. })
        ));

        // Other operations and other sessions are independent.
        let _other = ops.begin("s1", "stop").unwrap();
        let _elsewhere = ops.begin("s2", "pause").unwrap();

        drop(guard);
        assert!(!ops.is_pending("s1", "pause"));
        assert!(ops.begin("s1", "pause").is_ok());
    }

    #[test]
    fn clones_share_state() {
        let ops = PendingOps::new();
        let view = ops.clone();
        let _guard = ops.begin("s1", "start").unwrap();
        assert!(view.is_pending("s1", "start"));
        assert!(!view.is_idle());
    }
}
