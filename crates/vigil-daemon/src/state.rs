//! Lifecycle state and the transition table.
//!
//! [`LifecycleState::allowed_transitions`] is the only place that knows which
//! transitions are legal. [`LifecycleCell`] holds the current state of one
//! controller and enforces the table on every write.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::signal::Intent;

/// Lifecycle state of a controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum LifecycleState {
    Initializing = 0x01,
    Sleeping = 0x02,
    Idle = 0x03,
    Active = 0x04,
    StopRequested = 0x05,
    Stopping = 0x06,
    Stopped = 0x07,
}

impl LifecycleState {
    /// Every state, in discriminant order.
    pub const ALL: [LifecycleState; 7] = [
        LifecycleState::Initializing,
        LifecycleState::Sleeping,
        LifecycleState::Idle,
        LifecycleState::Active,
        LifecycleState::StopRequested,
        LifecycleState::Stopping,
        LifecycleState::Stopped,
    ];

    /// States reachable from `self` in one step.
    pub fn allowed_transitions(self) -> &'static [LifecycleState] {
        use LifecycleState::*;

        match self {
            Initializing => &[Active, Idle, Sleeping, StopRequested, Stopping],
            Sleeping => &[Active, Idle, StopRequested, Stopping],
            Idle => &[Active, Sleeping, StopRequested, Stopping],
            Active => &[Idle, Sleeping, StopRequested, Stopping],
            StopRequested => &[Stopping, Stopped],
            Stopping => &[Stopped],
            Stopped => &[],
        }
    }

    /// Whether `self -> next` is in the transition table.
    pub fn can_transition_to(self, next: LifecycleState) -> bool {
        self.allowed_transitions().contains(&next)
    }

    /// Initializing, idle or active.
    pub fn is_running(self) -> bool {
        matches!(
            self,
            LifecycleState::Initializing | LifecycleState::Idle | LifecycleState::Active
        )
    }

    pub fn is_sleeping(self) -> bool {
        self == LifecycleState::Sleeping
    }

    pub fn is_idle(self) -> bool {
        self == LifecycleState::Idle
    }

    pub fn is_active(self) -> bool {
        self == LifecycleState::Active
    }

    /// A stop was requested and an in-flight unit of work may still be draining.
    pub fn is_waiting_to_stop(self) -> bool {
        self == LifecycleState::StopRequested
    }

    pub fn is_stopping(self) -> bool {
        self == LifecycleState::Stopping
    }

    pub fn is_stopped(self) -> bool {
        self == LifecycleState::Stopped
    }

    /// No further transition is possible.
    pub fn is_terminal(self) -> bool {
        self.allowed_transitions().is_empty()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LifecycleState::Initializing => "initializing",
            LifecycleState::Sleeping => "sleeping",
            LifecycleState::Idle => "idle",
            LifecycleState::Active => "active",
            LifecycleState::StopRequested => "stop_requested",
            LifecycleState::Stopping => "stopping",
            LifecycleState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<u8> for LifecycleState {
    type Error = InvalidStateError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        LifecycleState::ALL
            .into_iter()
            .find(|state| *state as u8 == value)
            .ok_or_else(|| InvalidStateError(format!("{:#04x}", value)))
    }
}

impl FromStr for LifecycleState {
    type Err = InvalidStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        LifecycleState::ALL
            .into_iter()
            .find(|state| state.as_str() == wanted)
            .ok_or_else(|| InvalidStateError(s.to_string()))
    }
}

/// A value that does not name any lifecycle state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid runtime state: {0}")]
pub struct InvalidStateError(pub String);

/// An illegal transition refused under [`TransitionPolicy::Strict`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Illegal state transition from {from} to {to}")]
pub struct IllegalTransition {
    pub from: LifecycleState,
    pub to: LifecycleState,
}

/// What to do with a transition that is not in the table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TransitionPolicy {
    /// Report and ignore.
    #[default]
    Lenient,
    /// Report and return [`IllegalTransition`].
    Strict,
}

impl TransitionPolicy {
    pub fn from_strict(strict: bool) -> Self {
        if strict {
            TransitionPolicy::Strict
        } else {
            TransitionPolicy::Lenient
        }
    }
}

/// Outcome of a state write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Changed {
        from: LifecycleState,
        to: LifecycleState,
    },
    /// The requested state was already current.
    Unchanged(LifecycleState),
    /// Illegal under the lenient policy; the state was left as is.
    Rejected {
        from: LifecycleState,
        to: LifecycleState,
    },
}

impl Transition {
    pub fn is_changed(&self) -> bool {
        matches!(self, Transition::Changed { .. })
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, Transition::Rejected { .. })
    }

    /// The state after the write.
    pub fn current(&self) -> LifecycleState {
        match *self {
            Transition::Changed { to, .. } => to,
            Transition::Unchanged(state) => state,
            Transition::Rejected { from, .. } => from,
        }
    }
}

/// A successful transition, as published to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateChange {
    pub previous: LifecycleState,
    pub current: LifecycleState,
    /// Intent that triggered the transition, if any.
    pub intent: Option<Intent>,
    pub at: DateTime<Utc>,
}

const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// Current lifecycle state of one controller.
pub struct LifecycleCell {
    state: AtomicU8,
    strict: AtomicBool,
    changes: broadcast::Sender<StateChange>,
}

impl LifecycleCell {
    /// Create a cell in the `Initializing` state.
    pub fn new(policy: TransitionPolicy) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            state: AtomicU8::new(LifecycleState::Initializing as u8),
            strict: AtomicBool::new(policy == TransitionPolicy::Strict),
            changes,
        }
    }

    /// Get the current state.
    pub fn get(&self) -> LifecycleState {
        Self::decode(self.state.load(Ordering::SeqCst))
    }

    pub fn policy(&self) -> TransitionPolicy {
        TransitionPolicy::from_strict(self.strict.load(Ordering::SeqCst))
    }

    pub fn set_policy(&self, policy: TransitionPolicy) {
        self.strict
            .store(policy == TransitionPolicy::Strict, Ordering::SeqCst);
    }

    /// Subscribe to successful transitions.
    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.changes.subscribe()
    }

    /// Move to `next` if the table allows it.
    ///
    /// Callers must look at the returned [`Transition`] (or re-read the state)
    /// rather than assume the write happened.
    pub fn set(&self, next: LifecycleState) -> Result<Transition, IllegalTransition> {
        self.set_with_intent(next, None)
    }

    /// Like [`set`](Self::set), recording the intent that caused the write.
    pub fn set_with_intent(
        &self,
        next: LifecycleState,
        intent: Option<Intent>,
    ) -> Result<Transition, IllegalTransition> {
        let mut current = self.get();
        loop {
            if current == next {
                debug!(state = %current, "State already current, nothing to do");
                return Ok(Transition::Unchanged(current));
            }

            if !current.can_transition_to(next) {
                warn!(
                    previous = %current,
                    requested = %next,
                    intent = ?intent,
                    "Rejected illegal state transition"
                );
                return match self.policy() {
                    TransitionPolicy::Lenient => Ok(Transition::Rejected {
                        from: current,
                        to: next,
                    }),
                    TransitionPolicy::Strict => Err(IllegalTransition {
                        from: current,
                        to: next,
                    }),
                };
            }

            match self.state.compare_exchange(
                current as u8,
                next as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => break,
                Err(actual) => current = Self::decode(actual),
            }
        }

        info!(previous = %current, current = %next, intent = ?intent, "State changed");
        let _ = self.changes.send(StateChange {
            previous: current,
            current: next,
            intent,
            at: Utc::now(),
        });

        Ok(Transition::Changed {
            from: current,
            to: next,
        })
    }

    /// Write a raw state value, failing if it names no state.
    pub fn set_raw(&self, raw: u8) -> Result<Transition, crate::DaemonError> {
        let next = LifecycleState::try_from(raw)?;
        Ok(self.set(next)?)
    }

    // Only valid discriminants are ever stored.
    fn decode(raw: u8) -> LifecycleState {
        LifecycleState::try_from(raw).unwrap_or(LifecycleState::Stopped)
    }
}

impl Default for LifecycleCell {
    fn default() -> Self {
        Self::new(TransitionPolicy::default())
    }
}

impl fmt::Debug for LifecycleCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleCell")
            .field("state", &self.get())
            .field("policy", &self.policy())
            .finish()
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
