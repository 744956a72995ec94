//! Shared endpoint selection with sticky primary/standby failover.
//!
//! Every backend call asks the director for the active endpoint. The first
//! caller to report a connect or timeout failure against the primary flips
//! the whole process to the standby; the flip is permanent for the process
//! lifetime and there is no automatic failback. Both the active endpoint and
//! the failed-over flag live behind a single mutex so concurrent callers
//! observe one consistent transition and none can keep retrying a dead
//! primary.

use parking_lot::Mutex;

/// Which backend node an endpoint refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// The primary (master) node.
    Primary,
    /// The standby (backup) node.
    Standby,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Primary => write!(f, "primary"),
            Self::Standby => write!(f, "standby"),
        }
    }
}

struct DirectorState {
    active: Role,
    failed_over: bool,
}

/// Process-wide endpoint selector, shared by every backend call.
pub struct FailoverDirector {
    primary: String,
    standby: String,
    state: Mutex<DirectorState>,
}

impl FailoverDirector {
    /// Creates a director starting on the primary endpoint.
    #[must_use]
    pub fn new(primary: impl Into<String>, standby: impl Into<String>) -> Self {
        Self {
            primary: primary.into(),
            standby: standby.into(),
            state: Mutex::new(DirectorState {
                active: Role::Primary,
                failed_over: false,
            }),
        }
    }

    /// Returns the currently active endpoint address and its role.
    #[must_use]
    pub fn active(&self) -> (String, Role) {
        let state = self.state.lock();
        let addr = match state.active {
            Role::Primary => self.primary.clone(),
            Role::Standby => self.standby.clone(),
        };
        (addr, state.active)
    }

    /// Attempts to flip the active endpoint to the standby.
    ///
    /// Returns the standby address if this call performed the flip. Returns
    /// `None` when failover has already happened; the caller must then
    /// propagate its failure instead of retrying, which bounds every call
    /// to at most one retry.
    pub fn fail_over(&self) -> Option<String> {
        let mut state = self.state.lock();
        if state.failed_over {
            return None;
        }
        state.failed_over = true;
        state.active = Role::Standby;
        tracing::warn!(
            primary = %self.primary,
            standby = %self.standby,
            "primary backend failed, switching to standby"
        );
        Some(self.standby.clone())
    }

    /// Whether the process has switched to the standby.
    #[must_use]
    pub fn has_failed_over(&self) -> bool {
        self.state.lock().failed_over
    }
}
