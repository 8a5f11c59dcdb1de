//! Worker lifecycle states and transitions.

use std::fmt;
use std::sync::Mutex;

use serde::Serialize;

use crate::error::{OffcacheError, Result};

/// Lifecycle states of a worker version.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    /// Created, nothing dispatched yet.
    #[default]
    Parsed,
    /// Install event dispatched.
    Installing,
    /// Installed and waiting to activate.
    Installed,
    /// Activate event dispatched.
    Activating,
    /// Active and intercepting requests.
    Activated,
    /// Install or activation failed.
    Redundant,
}

impl WorkerState {
    /// Only an active worker intercepts requests.
    #[must_use]
    pub const fn can_intercept_fetch(self) -> bool {
        matches!(self, Self::Activated)
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Parsed => "parsed",
            Self::Installing => "installing",
            Self::Installed => "installed",
            Self::Activating => "activating",
            Self::Activated => "activated",
            Self::Redundant => "redundant",
        };
        f.write_str(name)
    }
}

/// Check if a state transition is valid.
#[must_use]
pub const fn is_valid_transition(from: WorkerState, to: WorkerState) -> bool {
    use WorkerState::{Activated, Activating, Installed, Installing, Parsed, Redundant};

    matches!(
        (from, to),
        (Parsed | Redundant, Installing)
            | (Installing, Installed | Redundant)
            | (Installed, Activating)
            | (Activating, Activated | Redundant)
            | (Activated, Redundant)
    )
}

#[derive(Debug, Default)]
struct LifecycleInner {
    state: WorkerState,
    skip_waiting: bool,
    clients_claimed: bool,
}

/// Tracks the worker's state plus the skip-waiting and claim flags.
#[derive(Debug, Default)]
pub struct Lifecycle {
    inner: Mutex<LifecycleInner>,
}

impl Lifecycle {
    /// Create a lifecycle in the `Parsed` state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn with<T>(&self, f: impl FnOnce(&mut LifecycleInner) -> T) -> T {
        match self.inner.lock() {
            Ok(mut guard) => f(&mut guard),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> WorkerState {
        self.with(|inner| inner.state)
    }

    /// Move to `to`, failing if the transition is not allowed.
    ///
    /// # Errors
    ///
    /// Returns [`OffcacheError::InvalidTransition`] for a disallowed move.
    pub fn transition(&self, to: WorkerState) -> Result<WorkerState> {
        self.with(|inner| {
            let from = inner.state;
            if !is_valid_transition(from, to) {
                return Err(OffcacheError::InvalidTransition { from, to });
            }
            inner.state = to;
            if to == WorkerState::Installing {
                inner.skip_waiting = false;
                inner.clients_claimed = false;
            }
            tracing::info!(%from, %to, "worker state changed");
            Ok(from)
        })
    }

    /// Mark the worker eligible for activation without waiting for pages to close.
    pub fn skip_waiting(&self) {
        self.with(|inner| inner.skip_waiting = true);
    }

    /// Whether waiting has been skipped.
    #[must_use]
    pub fn waiting_skipped(&self) -> bool {
        self.with(|inner| inner.skip_waiting)
    }

    /// Record that open clients are now controlled.
    pub fn mark_claimed(&self) {
        self.with(|inner| inner.clients_claimed = true);
    }

    /// Whether clients have been claimed.
    #[must_use]
    pub fn clients_claimed(&self) -> bool {
        self.with(|inner| inner.clients_claimed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normal_lifecycle_is_valid() {
        let lifecycle = Lifecycle::new();
        for state in [
            WorkerState::Installing,
            WorkerState::Installed,
            WorkerState::Activating,
            WorkerState::Activated,
        ] {
            lifecycle.transition(state).unwrap();
        }
        assert_eq!(lifecycle.state(), WorkerState::Activated);
        assert!(lifecycle.state().can_intercept_fetch());
    }

    #[test]
    fn cannot_skip_install() {
        let lifecycle = Lifecycle::new();
        let err = lifecycle.transition(WorkerState::Activated).unwrap_err();
        assert!(matches!(
            err,
            OffcacheError::InvalidTransition {
                from: WorkerState::Parsed,
                to: WorkerState::Activated
            }
        ));
        assert_eq!(lifecycle.state(), WorkerState::Parsed);
    }

    #[test]
    fn failed_install_can_retry() {
        assert!(is_valid_transition(WorkerState::Installing, WorkerState::Redundant));
        assert!(is_valid_transition(WorkerState::Redundant, WorkerState::Installing));
        assert!(!is_valid_transition(WorkerState::Redundant, WorkerState::Activated));
    }

    #[test]
    fn reinstall_resets_flags() {
        let lifecycle = Lifecycle::new();
        lifecycle.transition(WorkerState::Installing).unwrap();
        lifecycle.skip_waiting();
        lifecycle.mark_claimed();
        lifecycle.transition(WorkerState::Redundant).unwrap();
        lifecycle.transition(WorkerState::Installing).unwrap();
        assert!(!lifecycle.waiting_skipped());
        assert!(!lifecycle.clients_claimed());
    }

    #[test]
    fn only_activated_intercepts() {
        assert!(!WorkerState::Installed.can_intercept_fetch());
        assert!(!WorkerState::Redundant.can_intercept_fetch());
    }
}
