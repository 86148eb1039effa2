//! Server instance handles and their lifecycle.
//!
//! An instance moves strictly forward through
//! `starting -> ready -> stopped -> removed`. `ready` may be skipped (an
//! instance that never became ready is still stopped and removed) but no
//! state is ever revisited.

use std::collections::BTreeMap;
use std::fmt;

use crate::errors::{Error, HarnessResult};

#[cfg(test)]
#[path = "instance_tests.rs"]
mod tests;

/// Runtime-assigned identifier of a started instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(String);

impl InstanceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle state of a server instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceState {
    /// Created and started; readiness signal not yet observed.
    Starting,
    /// Readiness signal observed in the logs.
    Ready,
    /// Process stopped; the container still exists.
    Stopped,
    /// Container removed from the runtime.
    Removed,
}

impl InstanceState {
    /// Check whether moving from `self` to `next` is allowed.
    pub fn can_transition_to(self, next: InstanceState) -> bool {
        use InstanceState::*;
        matches!(
            (self, next),
            (Starting, Ready)
                | (Starting, Stopped)
                | (Starting, Removed)
                | (Ready, Stopped)
                | (Ready, Removed)
                | (Stopped, Removed)
        )
    }
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InstanceState::Starting => "starting",
            InstanceState::Ready => "ready",
            InstanceState::Stopped => "stopped",
            InstanceState::Removed => "removed",
        };
        f.write_str(name)
    }
}

/// Handle to a server instance started by the harness.
#[derive(Debug, Clone)]
pub struct Instance {
    id: InstanceId,
    name: String,
    env: BTreeMap<String, String>,
    state: InstanceState,
}

impl Instance {
    /// Create a handle for an instance the runtime has just started.
    pub fn started(id: InstanceId, name: impl Into<String>, env: BTreeMap<String, String>) -> Self {
        Self {
            id,
            name: name.into(),
            env,
            state: InstanceState::Starting,
        }
    }

    pub fn id(&self) -> &InstanceId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> InstanceState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == InstanceState::Ready
    }

    /// Look up one of the configuration inputs the instance was started with.
    pub fn env(&self, key: &str) -> Option<&str> {
        self.env.get(key).map(String::as_str)
    }

    pub fn mark_ready(&mut self) -> HarnessResult<()> {
        self.transition(InstanceState::Ready)
    }

    pub fn mark_stopped(&mut self) -> HarnessResult<()> {
        self.transition(InstanceState::Stopped)
    }

    pub fn mark_removed(&mut self) -> HarnessResult<()> {
        self.transition(InstanceState::Removed)
    }

    fn transition(&mut self, next: InstanceState) -> HarnessResult<()> {
        if !self.state.can_transition_to(next) {
            return Err(Error::InvalidTransition {
                name: self.name.clone(),
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }
}
