// ABOUTME: On/off lifecycle state for puppets with pending transitions.
// ABOUTME: Lets a second start() or stop() caller wait for an in-flight transition to settle.

use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Off,
    PendingOn,
    On,
    PendingOff,
}

impl LifecycleState {
    pub fn is_pending(self) -> bool {
        matches!(self, Self::PendingOn | Self::PendingOff)
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Off => write!(f, "off"),
            Self::PendingOn => write!(f, "pending_on"),
            Self::On => write!(f, "on"),
            Self::PendingOff => write!(f, "pending_off"),
        }
    }
}

/// Shared lifecycle switch
pub struct StateSwitch {
    tx: watch::Sender<LifecycleState>,
}

impl Default for StateSwitch {
    fn default() -> Self {
        Self::new()
    }
}

impl StateSwitch {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(LifecycleState::Off);
        Self { tx }
    }

    pub fn current(&self) -> LifecycleState {
        *self.tx.borrow()
    }

    /// True when on or turning on
    pub fn is_on(&self) -> bool {
        matches!(self.current(), LifecycleState::On | LifecycleState::PendingOn)
    }

    /// True when off or turning off
    pub fn is_off(&self) -> bool {
        matches!(self.current(), LifecycleState::Off | LifecycleState::PendingOff)
    }

    pub fn set(&self, state: LifecycleState) {
        let previous = self.tx.send_replace(state);
        if previous != state {
            tracing::debug!(from = %previous, to = %state, "Lifecycle state changed");
        }
    }

    /// Wait until no transition is pending and return the settled state
    pub async fn ready(&self) -> LifecycleState {
        let mut rx = self.tx.subscribe();
        let settled = match rx.wait_for(|state| !state.is_pending()).await {
            Ok(state) => *state,
            // Sender lives in self, so the channel cannot close while we borrow it
            Err(_) => self.current(),
        };
        settled
    }
}
