//! Edge detection over the platform's online/offline signal.

use std::sync::{Mutex, PoisonError};

use tracing::debug;

/// Last known network state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connectivity {
    /// No signal received since launch
    Unknown,
    Online,
    Offline,
}

/// Tracks connectivity events and reports the transitions that matter
#[derive(Debug)]
pub struct ConnectivityMonitor {
    state: Mutex<Connectivity>,
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectivityMonitor {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(Connectivity::Unknown),
        }
    }

    pub fn current(&self) -> Connectivity {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_offline(&self) -> bool {
        self.current() == Connectivity::Offline
    }

    /// Record a signal; returns `true` on a transition into `Online`
    ///
    /// The first online signal after launch counts as a transition so a log
    /// left behind by a previous run gets drained.
    pub fn observe(&self, online: bool) -> bool {
        let next = if online {
            Connectivity::Online
        } else {
            Connectivity::Offline
        };

        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let previous = std::mem::replace(&mut *state, next);
        let came_online = next == Connectivity::Online && previous != Connectivity::Online;

        debug!(?previous, current = ?next, came_online, "Connectivity signal");
        came_online
    }
}
