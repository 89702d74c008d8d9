//! # Pass State
//!
//! Metadata describing one `update` pass and running engine statistics.

use crate::error::{PredictionError, Result};
use crate::network::reconcile::CheckReport;
use crate::registry::ReleasedObject;

/// How a pass chose its starting point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PassKind {
    /// Prediction globally disabled; authoritative state copied through
    #[default]
    Disabled,
    /// Frame had no usable world state; authoritative state copied through
    InvalidFrame,
    /// Nothing newly confirmed; continued from the last predicted command
    Continued,
    /// Server agreed with the stored trajectory; ring shifted forward
    Shifted,
    /// Replayed every unacknowledged command from authoritative state
    FullReplay,
    /// Too many unacknowledged commands; prediction abandoned this frame
    Overflow,
}

/// Ephemeral bookkeeping for a single reconciliation pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReplayWindow {
    pub kind: PassKind,
    /// First command simulated in this pass
    pub first_command_to_execute: u32,
    /// Ring base: slot 0 holds the state after this command + 1
    pub last_acknowledged_command: u32,
    pub outgoing_command: u32,
    /// Occupied ring slots after this pass
    pub commands_predicted_this_pass: u32,
    /// Errors detected in the stored trajectory that drove this pass
    pub previous_pass_had_errors: bool,
    /// The pass reached `outgoing_command`
    pub stored_final_tick: bool,
}

impl ReplayWindow {
    /// Reject a pass that would need more than `max` ring slots
    pub fn check_bounds(requested: u32, max: u32) -> Result<()> {
        if requested > max {
            return Err(PredictionError::WindowOverflow { requested, max });
        }
        Ok(())
    }

    /// Commands this pass actually simulated
    pub fn commands_simulated(&self) -> u32 {
        let first_slot = self.first_command_to_execute.saturating_sub(self.last_acknowledged_command);
        (self.commands_predicted_this_pass + 1).saturating_sub(first_slot)
    }
}

/// Result of one `update` call
#[derive(Debug, Clone, Default)]
pub struct UpdateOutcome {
    pub window: ReplayWindow,
    /// Reconciliation performed against the newly acknowledged command
    pub check: CheckReport,
    /// Speculative objects released at the end of the pass
    pub released: Vec<ReleasedObject>,
}

impl UpdateOutcome {
    pub fn kind(&self) -> PassKind {
        self.window.kind
    }

    /// Prediction was abandoned for this frame
    pub fn is_failure(&self) -> bool {
        self.window.kind == PassKind::Overflow
    }

    /// Simulation callbacks were driven this pass
    pub fn predicted(&self) -> bool {
        matches!(self.window.kind, PassKind::Continued | PassKind::Shifted | PassKind::FullReplay)
    }
}

/// Prediction statistics
#[derive(Debug, Default, Clone)]
pub struct PredictionStats {
    pub passes: u64,
    pub commands_simulated: u64,
    pub simulation_calls: u64,
    pub continued: u64,
    pub fast_path_shifts: u64,
    pub full_replays: u64,
    pub passthrough_frames: u64,
    pub soft_errors: u64,
    pub teleports: u64,
    pub overflows: u64,
    pub missing_commands: u64,
    pub speculative_confirmed: u64,
    pub speculative_abandoned: u64,
    pub avg_pass_time_us: f32,
}

impl PredictionStats {
    pub(crate) fn record_pass_time(&mut self, micros: f32) {
        if self.passes <= 1 {
            self.avg_pass_time_us = micros;
        } else {
            self.avg_pass_time_us = self.avg_pass_time_us * 0.9 + micros * 0.1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commands_simulated() {
        let window = ReplayWindow {
            kind: PassKind::FullReplay,
            first_command_to_execute: 103,
            last_acknowledged_command: 102,
            outgoing_command: 105,
            commands_predicted_this_pass: 3,
            ..Default::default()
        };
        assert_eq!(window.commands_simulated(), 3);

        let shifted = ReplayWindow {
            kind: PassKind::Shifted,
            first_command_to_execute: 106,
            ..window
        };
        assert_eq!(shifted.commands_simulated(), 0);
    }

    #[test]
    fn test_check_bounds() {
        assert!(ReplayWindow::check_bounds(90, 90).is_ok());
        assert_eq!(
            ReplayWindow::check_bounds(300, 100),
            Err(PredictionError::WindowOverflow { requested: 300, max: 100 })
        );
    }

    #[test]
    fn test_outcome_failure() {
        let mut outcome = UpdateOutcome::default();
        assert!(!outcome.is_failure());
        assert!(!outcome.predicted());

        outcome.window.kind = PassKind::Overflow;
        assert!(outcome.is_failure());
    }

    #[test]
    fn test_pass_time_average() {
        let mut stats = PredictionStats { passes: 1, ..Default::default() };
        stats.record_pass_time(100.0);
        assert_eq!(stats.avg_pass_time_us, 100.0);

        stats.passes = 2;
        stats.record_pass_time(200.0);
        assert!((stats.avg_pass_time_us - 110.0).abs() < 1e-3);
    }
}
