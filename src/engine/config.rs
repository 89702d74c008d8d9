//! # Prediction Configuration
//!
//! Configuration parsed from client-provided JSON.

use serde::{Deserialize, Serialize};

use crate::error::{PredictionError, Result};

/// How aggressively previously predicted work is reused
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OptimizeLevel {
    /// Always replay every unacknowledged command
    Off,
    /// Continue from the last predicted command when nothing new was confirmed
    SkipSettled,
    /// Also shift stored snapshots forward when the server agrees with them
    ShiftSnapshots,
}

impl Default for OptimizeLevel {
    fn default() -> Self {
        OptimizeLevel::ShiftSnapshots
    }
}

/// Per-field tolerances for fields other than origin
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct FieldTolerance {
    pub velocity: f32,
    /// Degrees
    pub angles: f32,
    #[serde(rename = "viewOffset")]
    pub view_offset: f32,
}

impl Default for FieldTolerance {
    fn default() -> Self {
        Self {
            velocity: 0.5,
            angles: 0.5,
            view_offset: 0.1,
        }
    }
}

/// Prediction configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PredictionConfig {
    /// Global prediction toggle
    pub enabled: bool,

    /// Reuse of previously predicted work
    pub optimize: OptimizeLevel,

    /// Maximum unacknowledged commands replayed in one pass
    #[serde(rename = "maxInFlightCommands")]
    pub max_in_flight_commands: u32,

    /// Command history capacity
    #[serde(rename = "commandBackup")]
    pub command_backup: usize,

    /// Seconds simulated per command
    #[serde(rename = "tickInterval")]
    pub tick_interval: f32,

    /// Discrepancy above which a soft error is recorded
    #[serde(rename = "reportableError")]
    pub reportable_error: f32,

    /// Discrepancy above which the error is treated as a teleport
    #[serde(rename = "teleportDistance")]
    pub teleport_distance: f32,

    pub tolerance: FieldTolerance,

    /// Log every soft prediction error with its diverging fields
    #[serde(rename = "showErrors")]
    pub show_errors: bool,

    /// Visually smooth soft errors on the primary object
    pub smoothing: bool,

    /// Seconds over which a soft error decays
    #[serde(rename = "smoothingTime")]
    pub smoothing_time: f32,

    /// Interpolation samples kept per object
    #[serde(rename = "interpolationSamples")]
    pub interpolation_samples: usize,
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            optimize: OptimizeLevel::ShiftSnapshots,
            max_in_flight_commands: 90,
            command_backup: 128,
            tick_interval: 0.015,
            reportable_error: 0.03,
            teleport_distance: 64.0,
            tolerance: FieldTolerance::default(),
            show_errors: false,
            smoothing: true,
            smoothing_time: 0.1,
            interpolation_samples: 16,
        }
    }
}

impl PredictionConfig {
    /// Parse config from bytes (JSON)
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.is_empty() {
            log::warn!("Empty prediction config, using defaults");
            return Ok(Self::default());
        }

        let config: Self = serde_json::from_slice(data)
            .map_err(|e| PredictionError::Config(format!("parse error: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_default()
    }

    /// Reject configurations the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.max_in_flight_commands == 0 {
            return Err(PredictionError::Config("maxInFlightCommands must be positive".into()));
        }
        if self.command_backup < self.max_in_flight_commands as usize {
            return Err(PredictionError::Config(format!(
                "commandBackup ({}) must hold the in-flight window ({})",
                self.command_backup, self.max_in_flight_commands
            )));
        }
        if !(self.tick_interval > 0.0) {
            return Err(PredictionError::Config("tickInterval must be positive".into()));
        }
        if self.reportable_error < 0.0 || self.reportable_error >= self.teleport_distance {
            return Err(PredictionError::Config(format!(
                "reportableError ({}) must be below teleportDistance ({})",
                self.reportable_error, self.teleport_distance
            )));
        }
        Ok(())
    }

    /// Defaults with the two error thresholds replaced
    pub fn with_thresholds(reportable_error: f32, teleport_distance: f32) -> Self {
        Self {
            reportable_error,
            teleport_distance,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(PredictionConfig::default().validate().is_ok());
    }

    #[test]
    fn test_empty_bytes_use_defaults() {
        let config = PredictionConfig::from_bytes(&[]).unwrap();
        assert_eq!(config, PredictionConfig::default());
    }

    #[test]
    fn test_partial_json() {
        let json = br#"{"maxInFlightCommands": 100, "optimize": "SKIP_SETTLED", "tolerance": {"velocity": 2.0}}"#;
        let config = PredictionConfig::from_bytes(json).unwrap();

        assert_eq!(config.max_in_flight_commands, 100);
        assert_eq!(config.optimize, OptimizeLevel::SkipSettled);
        assert_eq!(config.tolerance.velocity, 2.0);
        assert_eq!(config.tolerance.angles, 0.5);
        assert!(config.enabled);
    }

    #[test]
    fn test_rejects_inverted_thresholds() {
        let config = PredictionConfig::with_thresholds(10.0, 5.0);
        assert!(matches!(config.validate(), Err(PredictionError::Config(_))));

        let json = br#"{"reportableError": 10.0, "teleportDistance": 5.0}"#;
        assert!(PredictionConfig::from_bytes(json).is_err());
    }

    #[test]
    fn test_rejects_small_backup() {
        let config = PredictionConfig {
            command_backup: 10,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_malformed_json() {
        assert!(PredictionConfig::from_bytes(b"{not json").is_err());
    }
}
