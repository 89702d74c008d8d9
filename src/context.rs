//! # Prediction Context
//!
//! Per-session owner of the command history, object registry and snapshot
//! store. Only the prediction engine mutates these during `update`; between
//! passes the client feeds commands, registrations and world snapshots in
//! through this type.

use crate::command::{Command, CommandHistory};
use crate::engine::config::PredictionConfig;
use crate::engine::state::{PredictionStats, ReplayWindow};
use crate::error::{PredictionError, Result};
use crate::network::reconcile::ErrorDetector;
use crate::network::{NetworkId, WorldSnapshot};
use crate::registry::{ObjectHandle, PredictableObject, Registry, StaleEntityCollector};
use crate::snapshot::SnapshotStore;

/// Session-scoped prediction state
pub struct PredictionContext {
    pub(crate) config: PredictionConfig,
    pub(crate) history: CommandHistory,
    pub(crate) registry: Registry,
    pub(crate) snapshots: SnapshotStore,
    pub(crate) detector: ErrorDetector,
    pub(crate) collector: StaleEntityCollector,
    pub(crate) stats: PredictionStats,

    /// Metadata of the last completed pass
    pub(crate) window: ReplayWindow,
    /// Ring base as of the last pass
    pub(crate) last_acknowledged: u32,
    pub(crate) previous_start_frame: Option<u32>,
    /// Stored trajectory cannot be trusted; the next pass starts from authoritative state
    pub(crate) needs_full_replay: bool,
    pub(crate) server_time: f64,
    pub(crate) server_tick: u32,

    pub(crate) in_prediction: bool,
    pub(crate) current_command: Option<u32>,
    pub(crate) first_time_predicted: bool,
}

impl PredictionContext {
    /// Create a context for a new session
    pub fn new(config: PredictionConfig) -> Result<Self> {
        config.validate()?;

        log::info!(
            "Prediction context: window {} commands, backup {}, optimize {:?}",
            config.max_in_flight_commands,
            config.command_backup,
            config.optimize
        );

        Ok(Self {
            history: CommandHistory::new(config.command_backup),
            registry: Registry::new(),
            snapshots: SnapshotStore::new(config.max_in_flight_commands as usize),
            detector: ErrorDetector::from_config(&config),
            collector: StaleEntityCollector::new(),
            stats: PredictionStats::default(),
            window: ReplayWindow::default(),
            last_acknowledged: 0,
            previous_start_frame: None,
            needs_full_replay: true,
            server_time: 0.0,
            server_tick: 0,
            in_prediction: false,
            current_command: None,
            first_time_predicted: false,
            config,
        })
    }

    pub fn config(&self) -> &PredictionConfig {
        &self.config
    }

    pub fn history(&self) -> &CommandHistory {
        &self.history
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn snapshots(&self) -> &SnapshotStore {
        &self.snapshots
    }

    pub fn stats(&self) -> &PredictionStats {
        &self.stats
    }

    /// Metadata of the last completed pass
    pub fn window(&self) -> &ReplayWindow {
        &self.window
    }

    pub fn server_time(&self) -> f64 {
        self.server_time
    }

    pub fn server_tick(&self) -> u32 {
        self.server_tick
    }

    fn ensure_idle(&self) -> Result<()> {
        if self.in_prediction {
            return Err(PredictionError::Reentrant);
        }
        Ok(())
    }

    /// Record the input source's command for this output tick
    pub fn record_command(&mut self, command: Command) -> Result<()> {
        self.ensure_idle()?;
        self.history.record(command)
    }

    pub fn command_at(&self, sequence: u32) -> Result<&Command> {
        self.history.command_at(sequence)
    }

    /// Register a predictable object
    pub fn register(&mut self, object: PredictableObject) -> Result<ObjectHandle> {
        self.ensure_idle()?;
        let object = object.with_interpolation_samples(self.config.interpolation_samples);
        self.registry.register(object)
    }

    /// Remove an object and its snapshots. Unknown handles are ignored.
    pub fn unregister(&mut self, handle: ObjectHandle) -> Option<PredictableObject> {
        self.snapshots.remove(handle);
        self.registry.unregister(handle)
    }

    pub fn object(&self, handle: ObjectHandle) -> Option<&PredictableObject> {
        self.registry.get(handle)
    }

    /// Stop simulating an object locally
    pub fn mark_dormant(&mut self, handle: ObjectHandle) -> Result<()> {
        self.registry.mark_dormant(handle)
    }

    pub fn wake(&mut self, handle: ObjectHandle) -> Result<()> {
        self.registry.wake(handle)
    }

    /// Server confirmed a speculative object and created its authoritative twin
    pub fn link(&mut self, speculative: ObjectHandle, twin: NetworkId) -> Result<()> {
        self.registry.link(speculative, twin)
    }

    /// Apply a confirmed world update. Objects unknown to the registry are skipped.
    pub fn apply_snapshot(&mut self, snapshot: &WorldSnapshot) -> Result<()> {
        self.ensure_idle()?;

        for entry in &snapshot.objects {
            let Some(handle) = self.registry.find_by_network_id(entry.id) else {
                log::trace!("Snapshot for unregistered object {:?}", entry.id);
                continue;
            };

            if let Some(object) = self.registry.get_mut(handle) {
                object.apply_network(entry.state, snapshot.server_time);
            }
            if entry.dormant {
                self.registry.mark_dormant(handle)?;
            }
        }

        self.server_time = snapshot.server_time;
        self.server_tick = snapshot.server_tick;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::UserInput;
    use crate::snapshot::PredictedState;
    use glam::Vec3;

    #[test]
    fn test_rejects_invalid_config() {
        let config = PredictionConfig {
            max_in_flight_commands: 0,
            ..Default::default()
        };
        assert!(PredictionContext::new(config).is_err());
    }

    #[test]
    fn test_apply_snapshot() {
        let mut ctx = PredictionContext::new(PredictionConfig::default()).unwrap();
        let h = ctx
            .register(PredictableObject::secondary(NetworkId(3), PredictedState::default()))
            .unwrap();

        let snapshot = WorldSnapshot::new(10, 0.15)
            .with(NetworkId(3), PredictedState::at(Vec3::X))
            .with(NetworkId(99), PredictedState::default());
        ctx.apply_snapshot(&snapshot).unwrap();

        let object = ctx.object(h).unwrap();
        assert_eq!(object.network_state().origin, Vec3::X);
        assert_eq!(object.state().origin, Vec3::ZERO);
        assert_eq!(object.confirmed_time(), 0.15);
        assert_eq!(ctx.server_tick(), 10);
    }

    #[test]
    fn test_snapshot_dormancy() {
        let mut ctx = PredictionContext::new(PredictionConfig::default()).unwrap();
        let h = ctx
            .register(PredictableObject::secondary(NetworkId(3), PredictedState::default()))
            .unwrap();

        let snapshot = WorldSnapshot::new(1, 0.0).with_dormant(NetworkId(3), PredictedState::default());
        ctx.apply_snapshot(&snapshot).unwrap();
        assert!(ctx.object(h).unwrap().is_dormant());
    }

    #[test]
    fn test_reentrancy_guard() {
        let mut ctx = PredictionContext::new(PredictionConfig::default()).unwrap();
        ctx.in_prediction = true;

        let err = ctx.record_command(Command::new(1, UserInput::default())).unwrap_err();
        assert_eq!(err, PredictionError::Reentrant);
    }

    #[test]
    fn test_unregister_drops_snapshots() {
        let mut ctx = PredictionContext::new(PredictionConfig::default()).unwrap();
        let h = ctx
            .register(PredictableObject::secondary(NetworkId(3), PredictedState::default()))
            .unwrap();
        ctx.snapshots.store(h, 0, PredictedState::default()).unwrap();

        assert!(ctx.unregister(h).is_some());
        assert_eq!(ctx.snapshots().occupied(), 0);
        assert!(ctx.unregister(h).is_none());
    }
}
