//! # Prediction Engine
//!
//! Per-frame driver. Each `update` call decides how much of the previously
//! predicted trajectory survives the latest acknowledgement, restores every
//! object to that point and replays the remaining unacknowledged commands
//! through the game's simulation step.

pub mod config;
pub mod state;
pub mod strategy;

use std::time::Instant;

use glam::Vec3;

use crate::command::Command;
use crate::context::PredictionContext;
use crate::error::{PredictionError, Result};
use crate::network::{FrameRequest, WorldSnapshot};
use crate::registry::{ObjectHandle, PredictableObject};
use crate::simulation::Simulator;

pub use config::{FieldTolerance, OptimizeLevel, PredictionConfig};
pub use state::{PassKind, PredictionStats, ReplayWindow, UpdateOutcome};
pub use strategy::{FrameStrategy, PassThroughStrategy, ReplayStrategy};

/// Client-side prediction engine
pub struct PredictionEngine {
    /// Session state
    ctx: PredictionContext,

    /// Used while prediction is enabled and the frame is valid
    replay: ReplayStrategy,

    /// Used otherwise
    passthrough: PassThroughStrategy,
}

impl PredictionEngine {
    /// Create an engine with the given configuration
    pub fn new(config: PredictionConfig) -> Result<Self> {
        log::info!("Creating PredictionEngine...");

        let ctx = PredictionContext::new(config)?;

        log::info!("  Prediction: {}", if ctx.config.enabled { "enabled" } else { "disabled" });
        log::info!("  Tick interval: {:.4}s", ctx.config.tick_interval);
        log::info!(
            "  Error thresholds: reportable {:.3}, teleport {:.1}",
            ctx.config.reportable_error,
            ctx.config.teleport_distance
        );

        Ok(Self {
            ctx,
            replay: ReplayStrategy,
            passthrough: PassThroughStrategy,
        })
    }

    /// Create an engine from a JSON configuration blob
    pub fn from_bytes(config_data: &[u8]) -> Result<Self> {
        Self::new(PredictionConfig::from_bytes(config_data)?)
    }

    // ========================================================================
    // FRAME UPDATE
    // ========================================================================

    /// Run one prediction pass.
    ///
    /// Call once per rendered frame after the latest world snapshot has been
    /// applied. Returns an error only for broken invariants; exceeding the
    /// prediction window is reported through [`UpdateOutcome::is_failure`].
    pub fn update<S: Simulator>(&mut self, simulator: &mut S, request: &FrameRequest) -> Result<UpdateOutcome> {
        if self.ctx.in_prediction {
            return Err(PredictionError::Reentrant);
        }

        let span = tracing::debug_span!(
            "prediction_update",
            start = request.start_frame,
            ack = request.last_acknowledged_command,
            outgoing = request.outgoing_command
        );
        let _guard = span.enter();
        let started = Instant::now();

        let received_new_world_update = self.ctx.previous_start_frame != Some(request.start_frame)
            || self.ctx.config.optimize == OptimizeLevel::Off;
        self.ctx.registry.begin_pass();

        let strategy: &mut dyn FrameStrategy = if self.ctx.config.enabled && request.valid_frame {
            &mut self.replay
        } else {
            &mut self.passthrough
        };
        let mut outcome = strategy.run(&mut self.ctx, simulator, request, received_new_world_update)?;

        self.finish_pass(request, &mut outcome);

        let micros = started.elapsed().as_secs_f32() * 1_000_000.0;
        self.ctx.stats.record_pass_time(micros);

        log::trace!(
            "Pass {:?}: first {} ack {} outgoing {} predicted {}",
            outcome.kind(),
            outcome.window.first_command_to_execute,
            outcome.window.last_acknowledged_command,
            outcome.window.outgoing_command,
            outcome.window.commands_predicted_this_pass
        );

        Ok(outcome)
    }

    /// Bookkeeping shared by every strategy
    fn finish_pass(&mut self, request: &FrameRequest, outcome: &mut UpdateOutcome) {
        let ctx = &mut self.ctx;

        ctx.window = outcome.window;
        if request.valid_frame {
            ctx.previous_start_frame = Some(request.start_frame);
        }
        ctx.history.retire_through(ctx.last_acknowledged);

        let oldest_allowable = request
            .outgoing_command
            .saturating_sub(ctx.config.max_in_flight_commands)
            + 1;
        outcome.released = ctx
            .collector
            .collect(&mut ctx.registry, &mut ctx.snapshots, oldest_allowable);

        ctx.stats.passes += 1;
        ctx.stats.speculative_confirmed = ctx.collector.confirmed_released();
        ctx.stats.speculative_abandoned = ctx.collector.abandoned();
    }

    // ========================================================================
    // SESSION INPUT
    // ========================================================================

    /// Record the command produced for the next outgoing tick
    pub fn record_command(&mut self, command: Command) -> Result<()> {
        self.ctx.record_command(command)
    }

    /// Apply a confirmed world update received from the server
    pub fn apply_snapshot(&mut self, snapshot: &WorldSnapshot) -> Result<()> {
        self.ctx.apply_snapshot(snapshot)
    }

    pub fn register(&mut self, object: PredictableObject) -> Result<ObjectHandle> {
        self.ctx.register(object)
    }

    pub fn unregister(&mut self, handle: ObjectHandle) -> Option<PredictableObject> {
        self.ctx.unregister(handle)
    }

    pub fn object(&self, handle: ObjectHandle) -> Option<&PredictableObject> {
        self.ctx.object(handle)
    }

    // ========================================================================
    // TOGGLE
    // ========================================================================

    /// Turn prediction on or off. Takes effect on the next `update`.
    pub fn set_enabled(&mut self, enabled: bool) {
        if self.ctx.config.enabled != enabled {
            log::info!("Prediction {}", if enabled { "enabled" } else { "disabled" });
        }
        self.ctx.config.enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.ctx.config.enabled
    }

    // ========================================================================
    // PASS QUERIES
    // ========================================================================

    /// True while the replay loop is running.
    ///
    /// `update` holds the engine mutably for the whole pass, so from the
    /// caller's side this reads false between passes. Simulation callbacks
    /// get the per-command flags through [`StepInput`](crate::simulation::StepInput).
    pub fn is_prediction_in_progress(&self) -> bool {
        self.ctx.in_prediction
    }

    /// Whether the command being simulated has never been simulated before.
    /// Post-pass this is always false; see `StepInput::first_time_predicted`.
    pub fn is_first_time_predicted(&self) -> bool {
        self.ctx.in_prediction && self.ctx.first_time_predicted
    }

    /// Command currently being replayed
    pub fn current_command(&self) -> Option<u32> {
        self.ctx.current_command
    }

    /// Metadata of the last completed pass
    pub fn replay_window(&self) -> &ReplayWindow {
        &self.ctx.window
    }

    /// The last pass simulated up to the outgoing command
    pub fn has_final_predicted_tick(&self) -> bool {
        self.ctx.window.stored_final_tick
    }

    // ========================================================================
    // VIEW
    // ========================================================================

    /// Primary object's predicted eye position
    pub fn view_origin(&self) -> Option<Vec3> {
        self.ctx.registry.view_origin()
    }

    pub fn view_angles(&self) -> Option<Vec3> {
        self.ctx.registry.primary_object().map(|p| p.state().view_angles)
    }

    /// Eye position with the pending error correction blended out over time
    pub fn smoothed_view_origin(&self, now: f64) -> Option<Vec3> {
        let primary = self.ctx.registry.primary_object()?;
        let offset = primary
            .smoothing()
            .map(|s| s.offset_at(now, self.ctx.config.smoothing_time))
            .unwrap_or(Vec3::ZERO);
        Some(primary.state().eye_position() + offset)
    }

    /// Authoritative origin of `handle` interpolated at server time `time`
    pub fn interpolated_origin(&self, handle: ObjectHandle, time: f64) -> Option<Vec3> {
        self.ctx.registry.get(handle)?.interpolation().sample(time)
    }

    // ========================================================================
    // ACCESSORS
    // ========================================================================

    pub fn context(&self) -> &PredictionContext {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut PredictionContext {
        &mut self.ctx
    }

    pub fn config(&self) -> &PredictionConfig {
        &self.ctx.config
    }

    pub fn stats(&self) -> &PredictionStats {
        &self.ctx.stats
    }

    /// Human-readable summary for debug overlays
    pub fn debug_info(&self) -> String {
        let stats = &self.ctx.stats;
        format!(
            "{} v{}\n\
             Passes: {}\n\
             Commands simulated: {}\n\
             Full replays: {} / shifts: {} / continued: {}\n\
             Soft errors: {} / teleports: {}\n\
             Overflows: {}\n\
             Objects: {}\n\
             Avg pass: {:.1} us",
            crate::NAME,
            crate::VERSION,
            stats.passes,
            stats.commands_simulated,
            stats.full_replays,
            stats.fast_path_shifts,
            stats.continued,
            stats.soft_errors,
            stats.teleports,
            stats.overflows,
            self.ctx.registry.len(),
            stats.avg_pass_time_us
        )
    }
}
