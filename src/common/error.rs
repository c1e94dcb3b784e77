//! Common error types for pipeline components
//!
//! # Design Principles (KISS)
//! - Provide common error variants used across multiple components
//! - Each component can wrap these or define additional variants
//! - Use thiserror for ergonomic error handling

use thiserror::Error;

/// Common pipeline errors shared across components
///
/// These errors represent common failure modes in the acquisition pipeline.
/// Components can either use these directly or wrap them in component-specific types.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Queue send failed (consumer dropped)
    #[error("Queue send failed: consumer dropped")]
    QueueSend,

    /// Queue receive failed (producer dropped)
    #[error("Queue receive failed: producer dropped")]
    QueueRecv,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Component not in expected state
    #[error("Invalid state: expected {expected}, got {actual}")]
    InvalidState { expected: String, actual: String },

    /// Payload columns in one batch must all have the same length
    #[error("Column length mismatch in field '{field}': expected {expected}, got {actual}")]
    ColumnMismatch {
        field: String,
        expected: usize,
        actual: usize,
    },

    /// Producer and consumer disagree on the data contract
    #[error("Protocol violation: {0}")]
    Protocol(String),

    /// Timeout waiting for operation
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl PipelineError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an invalid state error
    pub fn invalid_state(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::InvalidState {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Create a protocol violation error
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Create a timeout error
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Create a generic error
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }
}

/// Result type alias using PipelineError
pub type PipelineResult<T> = Result<T, PipelineError>;
