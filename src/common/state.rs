//! Measurement loop state machine
//!
//! ```text
//!   ┌──────┐  start ok   ┌───────────┐  item read   ┌──────────┐
//!   │ Idle │ ──────────► │ Measuring │ ───────────► │ Draining │
//!   └──────┘             └───────────┘              └──────────┘
//!                              ▲      restart (sentinel,  │
//!                              │       no stop requested) │
//!                              └───────────────────────────┤
//!                                                          │ sentinel,
//!                                                          │ stop requested
//!                                                          ▼
//!                                                    ┌─────────┐
//!                                                    │ Stopped │
//!                                                    └─────────┘
//!
//!   Any active state ──(driver failure / wedged driver)──► Error
//! ```
//!
//! `Stopped` and `Error` are terminal.

use serde::{Deserialize, Serialize};

/// State of the measurement loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum LoopState {
    /// No measurement started yet
    #[default]
    Idle,
    /// A measurement is started on the device; waiting for queue items
    Measuring,
    /// A queue item for the current cycle has been read; the restart/stop
    /// decision is pending until the sentinel is reached
    Draining,
    /// Clean termination after a fully drained cycle
    Stopped,
    /// Driver failure or producer/consumer desynchronization
    Error,
}

impl LoopState {
    /// Check if transition to target state is valid
    pub fn can_transition_to(&self, target: LoopState) -> bool {
        use LoopState::*;
        matches!(
            (self, target),
            // Normal flow
            (Idle, Measuring)        // start_measurement succeeded
            | (Measuring, Draining)  // first item of the cycle read
            | (Draining, Measuring)  // sentinel read, restart
            | (Draining, Stopped)    // sentinel read, stop requested
            // Failures can happen before or during a drain
            | (Idle, Error)
            | (Measuring, Error)
            | (Draining, Error)
        )
    }

    /// Whether the loop has finished (cleanly or not)
    pub fn is_terminal(&self) -> bool {
        matches!(self, LoopState::Stopped | LoopState::Error)
    }
}

impl std::fmt::Display for LoopState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoopState::Idle => write!(f, "Idle"),
            LoopState::Measuring => write!(f, "Measuring"),
            LoopState::Draining => write!(f, "Draining"),
            LoopState::Stopped => write!(f, "Stopped"),
            LoopState::Error => write!(f, "Error"),
        }
    }
}
