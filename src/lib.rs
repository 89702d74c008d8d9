//! # Predict Core - Client-Side Prediction Engine
//!
//! Hides network latency by simulating the local player (and other
//! predictable objects) ahead of the server, then reconciling against each
//! authoritative world update.
//!
//! ## Modules
//!
//! - **Command History**: Bounded, sequence-ordered record of user input
//! - **Registry**: Generation-checked arena of predictable objects
//! - **Snapshot Store**: Per-object ring of predicted states
//! - **Engine**: Rollback and replay of unacknowledged commands
//! - **Reconcile**: Error detection, teleport handling and smoothing
//! - **Collector**: Release of stale speculative objects
//!
//! ## Example
//!
//! ```no_run
//! use predict_core::{FrameRequest, PredictionConfig, PredictionEngine};
//! # use predict_core::{PredictedState, Simulator, StepInput, TouchList};
//! # struct Physics;
//! # impl Simulator for Physics {
//! #     fn simulate(&mut self, step: &StepInput<'_>, _t: &mut TouchList) -> PredictedState { *step.state() }
//! # }
//!
//! let mut engine = PredictionEngine::new(PredictionConfig::default())?;
//! let outcome = engine.update(&mut Physics, &FrameRequest::new(1, 0, 0))?;
//! assert!(!outcome.is_failure());
//! # Ok::<(), predict_core::PredictionError>(())
//! ```

pub mod command;
pub mod context;
pub mod engine;
pub mod error;
pub mod network;
pub mod registry;
pub mod simulation;
pub mod snapshot;

// Re-exports
pub use command::{Buttons, Command, CommandHistory, UserInput};
pub use context::PredictionContext;
pub use engine::{
    FieldTolerance, OptimizeLevel, PassKind, PredictionConfig, PredictionEngine, PredictionStats, ReplayWindow,
    UpdateOutcome,
};
pub use error::{PredictionError, Result};
pub use network::reconcile::{CheckReport, ErrorClass, ErrorDetector};
pub use network::{AuthoritativeState, FrameRequest, NetworkId, WorldSnapshot};
pub use registry::{
    ObjectClass, ObjectHandle, PredictableObject, Registry, ReleaseReason, ReleasedObject, Simulatable,
    StaleEntityCollector,
};
pub use simulation::{Simulator, StepInput, TouchList};
pub use snapshot::{FieldMask, PredictedState, SnapshotStore, StateFlags};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = "predict_core";

/// Install a `tracing` subscriber that prints to stdout.
///
/// Safe to call more than once; later calls are ignored.
pub fn init_logging() {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;

    let _ = tracing_subscriber::registry().with(fmt::layer()).try_init();
}
