//! # Network Interface
//!
//! Data the transport layer hands to the prediction engine: authoritative
//! world snapshots and the per-frame acknowledgement window.

pub mod reconcile;

use serde::{Deserialize, Serialize};

use crate::snapshot::PredictedState;

/// Server-assigned object identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NetworkId(pub u32);

/// Authoritative state for one object
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AuthoritativeState {
    pub id: NetworkId,
    pub state: PredictedState,
    /// Server no longer wants this object simulated locally
    #[serde(default)]
    pub dormant: bool,
}

/// A confirmed world update
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WorldSnapshot {
    /// Server frame this snapshot was taken at
    pub server_tick: u32,
    /// Server time in seconds
    pub server_time: f64,
    pub objects: Vec<AuthoritativeState>,
}

impl WorldSnapshot {
    pub fn new(server_tick: u32, server_time: f64) -> Self {
        Self {
            server_tick,
            server_time,
            objects: Vec::new(),
        }
    }

    /// Add an object's authoritative state
    pub fn with(mut self, id: NetworkId, state: PredictedState) -> Self {
        self.objects.push(AuthoritativeState {
            id,
            state,
            dormant: false,
        });
        self
    }

    /// Add an object the server has taken over
    pub fn with_dormant(mut self, id: NetworkId, state: PredictedState) -> Self {
        self.objects.push(AuthoritativeState {
            id,
            state,
            dormant: true,
        });
        self
    }
}

/// Per-frame inputs to [`crate::PredictionEngine::update`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameRequest {
    /// Server frame of the most recent world snapshot; unchanged means no new world update
    pub start_frame: u32,
    /// Whether the current frame holds usable world state
    pub valid_frame: bool,
    /// Last command the server has executed
    pub last_acknowledged_command: u32,
    /// Newest command sent to the server
    pub outgoing_command: u32,
}

impl FrameRequest {
    pub fn new(start_frame: u32, last_acknowledged_command: u32, outgoing_command: u32) -> Self {
        Self {
            start_frame,
            valid_frame: true,
            last_acknowledged_command,
            outgoing_command,
        }
    }

    /// Frame without usable world state
    pub fn invalid(self) -> Self {
        Self {
            valid_frame: false,
            ..self
        }
    }

    /// Commands not yet acknowledged by the server
    pub fn unacknowledged(&self) -> u32 {
        self.outgoing_command.saturating_sub(self.last_acknowledged_command)
    }
}
