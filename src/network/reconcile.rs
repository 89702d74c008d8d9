//! # Reconciliation
//!
//! Compares newly arrived authoritative state against the snapshot predicted
//! for the same command and classifies the discrepancy:
//!
//! - above the teleport distance: intentional discontinuity, no smoothing
//! - above the reportable threshold: soft error, smoothed and forces a full replay
//! - otherwise: nothing to do

use glam::Vec3;

use crate::engine::config::{FieldTolerance, PredictionConfig};
use crate::registry::{ObjectHandle, Registry};
use crate::snapshot::{FieldMask, PredictedState, SnapshotStore};

/// Outcome of comparing a prediction with the server's answer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    None,
    Soft,
    Teleport,
}

/// Measured difference between predicted and authoritative state
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Discrepancy {
    /// Origin distance
    pub magnitude: f32,
    /// Predicted origin minus authoritative origin
    pub delta: Vec3,
    /// Declared fields that diverge beyond tolerance
    pub fields: FieldMask,
}

impl Discrepancy {
    /// Offset to smooth out; zero unless the origin itself diverged
    pub fn smoothing_offset(&self) -> Vec3 {
        if self.fields.contains(FieldMask::ORIGIN) {
            self.delta
        } else {
            Vec3::ZERO
        }
    }

    /// Compare the declared fields of two states
    pub fn measure(
        predicted: &PredictedState,
        authoritative: &PredictedState,
        declared: FieldMask,
        tolerance: &FieldTolerance,
        reportable: f32,
    ) -> Self {
        let mut fields = FieldMask::empty();
        let mut delta = Vec3::ZERO;

        if declared.contains(FieldMask::ORIGIN) {
            delta = predicted.origin - authoritative.origin;
            if delta.length() > reportable {
                fields |= FieldMask::ORIGIN;
            }
        }
        if declared.contains(FieldMask::VELOCITY)
            && predicted.velocity.distance(authoritative.velocity) > tolerance.velocity
        {
            fields |= FieldMask::VELOCITY;
        }
        if declared.contains(FieldMask::VIEW_ANGLES)
            && (predicted.view_angles - authoritative.view_angles).abs().max_element() > tolerance.angles
        {
            fields |= FieldMask::VIEW_ANGLES;
        }
        if declared.contains(FieldMask::VIEW_OFFSET)
            && predicted.view_offset.distance(authoritative.view_offset) > tolerance.view_offset
        {
            fields |= FieldMask::VIEW_OFFSET;
        }
        if declared.contains(FieldMask::FLAGS) && predicted.flags != authoritative.flags {
            fields |= FieldMask::FLAGS;
        }

        Self {
            magnitude: delta.length(),
            delta,
            fields,
        }
    }
}

/// Decaying visual offset left behind by a soft error
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SmoothingError {
    pub offset: Vec3,
    /// Time the error was detected
    pub time: f64,
}

impl SmoothingError {
    /// Remaining offset at `now`, fading linearly to zero over `duration`
    pub fn offset_at(&self, now: f64, duration: f32) -> Vec3 {
        if duration <= 0.0 {
            return Vec3::ZERO;
        }
        let elapsed = (now - self.time).max(0.0) as f32;
        let frac = 1.0 - (elapsed / duration).min(1.0);
        self.offset * frac
    }
}

/// Summary of one reconciliation check
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CheckReport {
    pub checked: u32,
    pub soft_errors: u32,
    pub teleports: u32,
    /// The stored trajectory can no longer be trusted
    pub had_errors: bool,
}

/// Two-threshold prediction error classifier
#[derive(Debug, Clone)]
pub struct ErrorDetector {
    reportable: f32,
    teleport: f32,
    tolerance: FieldTolerance,
    show_errors: bool,
    smoothing: bool,
    smoothing_time: f32,
}

impl ErrorDetector {
    pub fn new(reportable: f32, teleport: f32) -> Self {
        Self {
            reportable,
            teleport,
            tolerance: FieldTolerance::default(),
            show_errors: false,
            smoothing: true,
            smoothing_time: 0.1,
        }
    }

    pub fn from_config(config: &PredictionConfig) -> Self {
        Self {
            reportable: config.reportable_error,
            teleport: config.teleport_distance,
            tolerance: config.tolerance,
            show_errors: config.show_errors,
            smoothing: config.smoothing,
            smoothing_time: config.smoothing_time,
        }
    }

    pub fn smoothing_time(&self) -> f32 {
        self.smoothing_time
    }

    /// Classify a measured discrepancy
    pub fn classify(&self, discrepancy: &Discrepancy) -> ErrorClass {
        if discrepancy.magnitude > self.teleport {
            ErrorClass::Teleport
        } else if discrepancy.magnitude > self.reportable || !discrepancy.fields.is_empty() {
            ErrorClass::Soft
        } else {
            ErrorClass::None
        }
    }

    /// Compare every rewindable object's snapshot for `acked_command` with
    /// its authoritative state.
    ///
    /// `previous_ack` and `commands_predicted` describe the ring as it was
    /// filled by the previous pass; the snapshot for `acked_command` lives in
    /// slot `acked_command - previous_ack - 1`.
    pub fn check_error(
        &self,
        registry: &mut Registry,
        snapshots: &SnapshotStore,
        previous_ack: u32,
        commands_predicted: u32,
        acked_command: u32,
        now: f64,
    ) -> CheckReport {
        let mut report = CheckReport::default();
        if acked_command <= previous_ack {
            return report;
        }
        let slot = (acked_command - previous_ack - 1) as usize;
        if slot >= commands_predicted as usize {
            return report;
        }

        let smoothing = self.smoothing;
        let smoothing_time = self.smoothing_time;
        let primary = registry.primary();
        registry.for_each_in_order(|handle, object| {
            if !object.is_rewindable() || object.is_dormant() {
                return;
            }
            let Some(predicted) = snapshots.get(handle, slot) else {
                return;
            };

            let discrepancy = Discrepancy::measure(
                predicted,
                &object.network,
                object.fields(),
                &self.tolerance,
                self.reportable,
            );
            report.checked += 1;

            match self.classify(&discrepancy) {
                ErrorClass::Teleport => {
                    log::trace!(
                        "Teleport on '{}' at command {} ({:.2} units), discarding error",
                        object.name(),
                        acked_command,
                        discrepancy.magnitude
                    );
                    object.smoothing = None;
                    report.teleports += 1;
                    report.had_errors = true;
                }
                ErrorClass::Soft => {
                    if self.show_errors {
                        self.describe(handle, object.name(), acked_command, &discrepancy);
                    }
                    if smoothing && Some(handle) == primary {
                        let remaining = object
                            .smoothing
                            .map(|s| s.offset_at(now, smoothing_time))
                            .unwrap_or(Vec3::ZERO);
                        object.smoothing = Some(SmoothingError {
                            offset: discrepancy.smoothing_offset() + remaining,
                            time: now,
                        });
                    }
                    report.soft_errors += 1;
                    report.had_errors = true;
                }
                ErrorClass::None => {}
            }
        });

        report
    }

    fn describe(&self, handle: ObjectHandle, name: &str, command: u32, discrepancy: &Discrepancy) {
        log::debug!(
            "Prediction error on {:?} '{}' at command {}: {:.3} units, fields {:?}",
            handle,
            name,
            command,
            discrepancy.magnitude,
            discrepancy.fields
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::NetworkId;
    use crate::registry::PredictableObject;

    fn measure(predicted: Vec3, authoritative: Vec3) -> Discrepancy {
        Discrepancy::measure(
            &PredictedState::at(predicted),
            &PredictedState::at(authoritative),
            FieldMask::all(),
            &FieldTolerance::default(),
            0.1,
        )
    }

    #[test]
    fn test_three_way_classification() {
        let detector = ErrorDetector::new(0.1, 10.0);

        assert_eq!(detector.classify(&measure(Vec3::ZERO, Vec3::ZERO)), ErrorClass::None);
        assert_eq!(detector.classify(&measure(Vec3::ZERO, Vec3::new(0.05, 0.0, 0.0))), ErrorClass::None);
        assert_eq!(detector.classify(&measure(Vec3::ZERO, Vec3::new(2.0, 0.0, 0.0))), ErrorClass::Soft);
        assert_eq!(detector.classify(&measure(Vec3::ZERO, Vec3::new(50.0, 0.0, 0.0))), ErrorClass::Teleport);
    }

    #[test]
    fn test_flag_divergence_is_soft() {
        let detector = ErrorDetector::new(0.1, 10.0);
        let mut authoritative = PredictedState::default();
        authoritative.flags = crate::snapshot::StateFlags::ON_GROUND;

        let d = Discrepancy::measure(
            &PredictedState::default(),
            &authoritative,
            FieldMask::all(),
            &FieldTolerance::default(),
            0.1,
        );
        assert_eq!(d.fields, FieldMask::FLAGS);
        assert_eq!(detector.classify(&d), ErrorClass::Soft);
    }

    #[test]
    fn test_undeclared_fields_ignored() {
        let mut authoritative = PredictedState::at(Vec3::splat(3.0));
        authoritative.velocity = Vec3::splat(100.0);

        let d = Discrepancy::measure(
            &PredictedState::default(),
            &authoritative,
            FieldMask::FLAGS,
            &FieldTolerance::default(),
            0.1,
        );
        assert_eq!(d.magnitude, 0.0);
        assert!(d.fields.is_empty());
    }

    #[test]
    fn test_smoothing_decays() {
        let error = SmoothingError {
            offset: Vec3::new(1.0, 0.0, 0.0),
            time: 1.0,
        };

        assert_eq!(error.offset_at(1.0, 0.1), Vec3::new(1.0, 0.0, 0.0));
        assert!((error.offset_at(1.05, 0.1).x - 0.5).abs() < 1e-4);
        assert_eq!(error.offset_at(2.0, 0.1), Vec3::ZERO);
    }

    #[test]
    fn test_check_error_uses_acked_slot() {
        let mut registry = Registry::new();
        let mut snapshots = SnapshotStore::new(8);
        let h = registry
            .register(PredictableObject::primary(NetworkId(1), PredictedState::default()))
            .unwrap();

        // Previous ack 99; slots 0..3 hold commands 100..102
        for slot in 0..3 {
            snapshots.store(h, slot, PredictedState::at(Vec3::splat(slot as f32))).unwrap();
        }
        registry.get_mut(h).unwrap().apply_network(PredictedState::at(Vec3::splat(1.0)), 1.0);

        let detector = ErrorDetector::new(0.1, 10.0);
        let report = detector.check_error(&mut registry, &snapshots, 99, 3, 101, 1.0);
        assert_eq!(report.checked, 1);
        assert!(!report.had_errors);

        let report = detector.check_error(&mut registry, &snapshots, 99, 3, 102, 1.0);
        assert_eq!(report.soft_errors, 1);
        assert!(report.had_errors);
        assert!(registry.get(h).unwrap().smoothing().is_some());
    }

    #[test]
    fn test_velocity_only_error_has_zero_offset() {
        let mut registry = Registry::new();
        let mut snapshots = SnapshotStore::new(8);
        let h = registry
            .register(PredictableObject::primary(NetworkId(1), PredictedState::default()))
            .unwrap();

        snapshots.store(h, 0, PredictedState::at(Vec3::new(1.02, 0.0, 0.0))).unwrap();
        let mut authoritative = PredictedState::at(Vec3::X);
        authoritative.velocity = Vec3::new(0.0, 0.0, 5.0);
        registry.get_mut(h).unwrap().apply_network(authoritative, 1.0);

        let detector = ErrorDetector::new(0.1, 10.0);
        let report = detector.check_error(&mut registry, &snapshots, 0, 1, 1, 1.0);
        assert_eq!(report.soft_errors, 1);
        assert_eq!(registry.get(h).unwrap().smoothing().unwrap().offset, Vec3::ZERO);
    }

    #[test]
    fn test_smoothing_only_on_primary() {
        let mut registry = Registry::new();
        let mut snapshots = SnapshotStore::new(8);
        let player = registry
            .register(PredictableObject::primary(NetworkId(1), PredictedState::default()))
            .unwrap();
        let barrel = registry
            .register(PredictableObject::secondary(NetworkId(2), PredictedState::default()))
            .unwrap();

        for h in [player, barrel] {
            snapshots.store(h, 0, PredictedState::at(Vec3::new(2.0, 0.0, 0.0))).unwrap();
            registry.get_mut(h).unwrap().apply_network(PredictedState::at(Vec3::X), 1.0);
        }

        let detector = ErrorDetector::new(0.1, 10.0);
        let report = detector.check_error(&mut registry, &snapshots, 0, 1, 1, 1.0);
        assert_eq!(report.soft_errors, 2);
        assert_eq!(registry.get(player).unwrap().smoothing().unwrap().offset, Vec3::X);
        assert!(registry.get(barrel).unwrap().smoothing().is_none());
    }

    #[test]
    fn test_check_error_outside_window() {
        let mut registry = Registry::new();
        let snapshots = SnapshotStore::new(8);
        let detector = ErrorDetector::new(0.1, 10.0);

        let report = detector.check_error(&mut registry, &snapshots, 10, 2, 10, 0.0);
        assert_eq!(report, CheckReport::default());
        let report = detector.check_error(&mut registry, &snapshots, 10, 2, 20, 0.0);
        assert_eq!(report, CheckReport::default());
    }
}
