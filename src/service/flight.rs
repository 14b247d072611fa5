//! Per-credential single-flight guard for refresh calls.
//!
//! Two concurrent refreshes for the same credential would race the
//! provider with the same refresh token, and the loser comes back with an
//! expired-token denial (the provider rotates on first use). The gate
//! admits at most one in-flight refresh per credential id; later callers
//! fail fast instead of queueing.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// Tracks which credential ids currently have a refresh in flight.
#[derive(Clone, Default)]
pub struct RefreshGate {
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl RefreshGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims the slot for `id`. Returns `None` when a refresh for the
    /// same credential is already running; the permit releases the slot
    /// when dropped.
    pub fn try_acquire(&self, id: &str) -> Option<RefreshPermit> {
        let mut in_flight = self.in_flight.lock().unwrap();
        if !in_flight.insert(id.to_string()) {
            return None;
        }
        Some(RefreshPermit {
            in_flight: Arc::clone(&self.in_flight),
            id: id.to_string(),
        })
    }
}

/// RAII permit for one in-flight refresh.
pub struct RefreshPermit {
    in_flight: Arc<Mutex<HashSet<String>>>,
    id: String,
}

impl Drop for RefreshPermit {
    fn drop(&mut self) {
        self.in_flight.lock().unwrap().remove(&self.id);
    }
}
