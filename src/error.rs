//! # Prediction Errors
//!
//! Error taxonomy shared by every prediction component.

use thiserror::Error;

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, PredictionError>;

/// Errors raised by the prediction engine and its components
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PredictionError {
    /// Command was never recorded or has already been retired
    #[error("command {0} is not in the command history")]
    CommandNotFound(u32),

    /// Commands must be recorded with strictly increasing sequence numbers
    #[error("command {got} recorded after command {last}")]
    CommandOutOfOrder { last: u32, got: u32 },

    /// Handle refers to an object that no longer exists
    #[error("object handle is stale or was never registered")]
    InvalidHandle,

    #[error("a primary object is already registered for this session")]
    PrimaryAlreadyRegistered,

    /// Snapshot slot outside the in-flight window
    #[error("snapshot slot {slot} exceeds ring capacity {capacity}")]
    SlotOutOfRange { slot: usize, capacity: usize },

    /// More unacknowledged commands than the replay window holds
    #[error("replay window of {requested} commands exceeds maximum of {max}")]
    WindowOverflow { requested: u32, max: u32 },

    #[error("prediction update invoked while a replay pass is in progress")]
    Reentrant,

    #[error("invalid prediction config: {0}")]
    Config(String),
}
