//! # Frame Strategies
//!
//! `update` picks one strategy per frame: the replay strategy when prediction
//! is enabled and the frame is valid, otherwise the pass-through strategy,
//! which copies authoritative state straight to every object.

use crate::context::PredictionContext;
use crate::engine::config::OptimizeLevel;
use crate::engine::state::{PassKind, ReplayWindow, UpdateOutcome};
use crate::error::Result;
use crate::network::reconcile::CheckReport;
use crate::network::FrameRequest;
use crate::registry::ObjectHandle;
use crate::simulation::{self, Simulator, StepInput, TouchList};
use crate::snapshot::PredictedState;

/// One way of producing this frame's predicted state
pub trait FrameStrategy {
    fn run(
        &mut self,
        ctx: &mut PredictionContext,
        simulator: &mut dyn Simulator,
        request: &FrameRequest,
        received_new_world_update: bool,
    ) -> Result<UpdateOutcome>;
}

/// Copies authoritative state through without simulating anything
#[derive(Debug, Default)]
pub struct PassThroughStrategy;

impl FrameStrategy for PassThroughStrategy {
    fn run(
        &mut self,
        ctx: &mut PredictionContext,
        _simulator: &mut dyn Simulator,
        request: &FrameRequest,
        _received_new_world_update: bool,
    ) -> Result<UpdateOutcome> {
        let kind = if request.valid_frame {
            PassKind::Disabled
        } else {
            PassKind::InvalidFrame
        };

        restore_authoritative(ctx);
        ctx.snapshots.clear();
        ctx.needs_full_replay = true;
        ctx.last_acknowledged = ctx.last_acknowledged.max(request.last_acknowledged_command);
        ctx.stats.passthrough_frames += 1;

        Ok(UpdateOutcome {
            window: ReplayWindow {
                kind,
                first_command_to_execute: ctx.last_acknowledged + 1,
                last_acknowledged_command: ctx.last_acknowledged,
                outgoing_command: request.outgoing_command,
                ..Default::default()
            },
            ..Default::default()
        })
    }
}

/// Rollback-and-replay prediction
#[derive(Debug, Default)]
pub struct ReplayStrategy;

/// Where a pass starts replaying from
struct StartPoint {
    kind: PassKind,
    /// Ring slots already valid before the loop runs
    skip: u32,
}

impl ReplayStrategy {
    /// Decide how much of the stored trajectory can be reused and restore
    /// objects to the state the replay loop starts from.
    fn compute_first_command(
        &self,
        ctx: &mut PredictionContext,
        received_new_world_update: bool,
        commands_acknowledged: u32,
        had_errors: bool,
    ) -> StartPoint {
        let optimize = ctx.config.optimize;
        let predicted = ctx.window.commands_predicted_this_pass;

        // Nothing newly confirmed: continue from the last predicted command
        if optimize >= OptimizeLevel::SkipSettled
            && (!received_new_world_update || commands_acknowledged == 0)
            && !ctx.needs_full_replay
            && !had_errors
        {
            if predicted > 0 {
                restore_slot(ctx, predicted - 1);
            } else {
                restore_authoritative(ctx);
            }
            ctx.stats.continued += 1;
            return StartPoint {
                kind: PassKind::Continued,
                skip: predicted,
            };
        }

        // Server agreed with our trajectory: drop the acknowledged slots
        if optimize >= OptimizeLevel::ShiftSnapshots
            && received_new_world_update
            && !ctx.needs_full_replay
            && !had_errors
            && commands_acknowledged > 0
            && predicted >= commands_acknowledged
        {
            let skip = predicted - commands_acknowledged;
            ctx.snapshots
                .shift_forward(commands_acknowledged as usize, predicted as usize);
            if skip > 0 {
                restore_slot(ctx, skip - 1);
            } else {
                restore_authoritative(ctx);
            }
            ctx.stats.fast_path_shifts += 1;
            return StartPoint {
                kind: PassKind::Shifted,
                skip,
            };
        }

        // First pass or the stored trajectory was wrong: start over from the server's state
        let tick = ctx.config.tick_interval as f64;
        ctx.registry.for_each_in_order(|_, object| {
            if !object.is_rewindable() {
                return;
            }
            object.restore_network();
            let reset_at = object.confirmed_time - tick;
            let origin = object.network.origin;
            object.interpolation.reset(reset_at, origin);
        });
        ctx.snapshots.clear();
        ctx.needs_full_replay = false;
        ctx.stats.full_replays += 1;
        StartPoint {
            kind: PassKind::FullReplay,
            skip: 0,
        }
    }

    /// Simulate every active object for one command, then deliver end-touch events
    fn run_command(
        &self,
        ctx: &mut PredictionContext,
        simulator: &mut dyn Simulator,
        order: &[ObjectHandle],
        sequence: u32,
        first_time: bool,
    ) -> Result<u32> {
        let command = ctx.history.command_at(sequence)?.clone();
        let delta_time = ctx.config.tick_interval;
        let primary = ctx.registry.primary();
        let mut primary_state: Option<PredictedState> = None;
        let mut ended = Vec::new();
        let mut calls = 0;

        for &handle in order {
            let Some(object) = ctx.registry.get(handle) else {
                continue;
            };
            if object.is_dormant() {
                continue;
            }
            // Speculative objects cannot be rewound; they only advance on fresh commands after they exist
            if !object.is_rewindable()
                && (!first_time || object.creation_command().is_some_and(|c| c >= sequence))
            {
                continue;
            }

            let mut touches = TouchList::new();
            let next = {
                let step = StepInput {
                    handle,
                    object,
                    command: &command,
                    delta_time,
                    first_time_predicted: first_time,
                    primary: primary_state.as_ref().filter(|_| Some(handle) != primary),
                };
                simulation::dispatch(simulator, &step, &mut touches)
            };
            calls += 1;

            if Some(handle) == primary {
                primary_state = Some(next);
            }
            if let Some(object) = ctx.registry.get_mut(handle) {
                object.current = next;
                let previous = std::mem::replace(&mut object.touching, touches.take());
                for other in previous {
                    if !object.touching.contains(&other) {
                        ended.push((handle, other));
                    }
                }
            }
        }

        for (object, other) in ended {
            simulator.end_touch(object, other);
        }

        Ok(calls)
    }

    /// Store every rewindable object's predicted fields into `slot`
    fn store_results(&self, ctx: &mut PredictionContext, order: &[ObjectHandle], slot: usize) -> Result<()> {
        for &handle in order {
            let Some(object) = ctx.registry.get(handle) else {
                continue;
            };
            if !object.is_rewindable() || object.is_dormant() {
                continue;
            }
            let state = object.current.masked(object.fields());
            ctx.snapshots.store(handle, slot, state)?;
        }
        Ok(())
    }

    /// Drive commands `base + skip + 1 ..= outgoing`. Returns the number of
    /// occupied slots and whether the outgoing command was reached.
    fn replay(
        &self,
        ctx: &mut PredictionContext,
        simulator: &mut dyn Simulator,
        base: u32,
        skip: u32,
        outgoing: u32,
    ) -> Result<(u32, bool)> {
        let order = ctx.registry.ordered();
        let mut predicted = skip;
        let mut reached_final = base + skip >= outgoing;

        let mut i = skip + 1;
        while base + i <= outgoing {
            let sequence = base + i;
            let first_time = match ctx.history.command_at(sequence) {
                Ok(command) => !command.has_been_simulated(),
                Err(_) => {
                    log::debug!("Command {} missing from history, stopping replay", sequence);
                    ctx.stats.missing_commands += 1;
                    break;
                }
            };

            ctx.current_command = Some(sequence);
            ctx.first_time_predicted = first_time;

            let calls = self.run_command(ctx, simulator, &order, sequence, first_time)?;
            self.store_results(ctx, &order, (i - 1) as usize)?;
            ctx.history.mark_simulated(sequence)?;

            ctx.stats.commands_simulated += 1;
            ctx.stats.simulation_calls += calls as u64;
            predicted = i;
            if sequence == outgoing {
                reached_final = true;
            }
            i += 1;
        }

        Ok((predicted, reached_final))
    }
}

impl FrameStrategy for ReplayStrategy {
    fn run(
        &mut self,
        ctx: &mut PredictionContext,
        simulator: &mut dyn Simulator,
        request: &FrameRequest,
        received_new_world_update: bool,
    ) -> Result<UpdateOutcome> {
        let previous_ack = ctx.last_acknowledged;
        let acked = request.last_acknowledged_command;
        let advanced = received_new_world_update && acked > previous_ack;
        let base = if advanced { acked } else { previous_ack };
        let commands_acknowledged = base - previous_ack;

        let mut check = CheckReport::default();
        if commands_acknowledged > 0 {
            check = ctx.detector.check_error(
                &mut ctx.registry,
                &ctx.snapshots,
                previous_ack,
                ctx.window.commands_predicted_this_pass,
                acked,
                ctx.server_time,
            );
            ctx.stats.soft_errors += check.soft_errors as u64;
            ctx.stats.teleports += check.teleports as u64;
        }
        let had_errors = check.had_errors;

        let requested = request.outgoing_command.saturating_sub(base);
        if let Err(err) = ReplayWindow::check_bounds(requested, ctx.config.max_in_flight_commands) {
            log::warn!(
                "{} (ack {}, outgoing {}), using authoritative state",
                err,
                base,
                request.outgoing_command
            );
            restore_authoritative(ctx);
            ctx.snapshots.clear();
            ctx.needs_full_replay = true;
            ctx.last_acknowledged = base;
            ctx.stats.overflows += 1;

            return Ok(UpdateOutcome {
                window: ReplayWindow {
                    kind: PassKind::Overflow,
                    first_command_to_execute: base + 1,
                    last_acknowledged_command: base,
                    outgoing_command: request.outgoing_command,
                    commands_predicted_this_pass: 0,
                    previous_pass_had_errors: had_errors,
                    stored_final_tick: false,
                },
                check,
                released: Vec::new(),
            });
        }

        let start = self.compute_first_command(ctx, received_new_world_update, commands_acknowledged, had_errors);
        ctx.last_acknowledged = base;

        ctx.in_prediction = true;
        let replayed = self.replay(ctx, simulator, base, start.skip, request.outgoing_command);
        ctx.in_prediction = false;
        ctx.current_command = None;
        let (predicted, stored_final_tick) = replayed?;

        Ok(UpdateOutcome {
            window: ReplayWindow {
                kind: start.kind,
                first_command_to_execute: base + start.skip + 1,
                last_acknowledged_command: base,
                outgoing_command: request.outgoing_command,
                commands_predicted_this_pass: predicted,
                previous_pass_had_errors: had_errors,
                stored_final_tick,
            },
            check,
            released: Vec::new(),
        })
    }
}

/// Restore every rewindable object's stored prediction from `slot`
fn restore_slot(ctx: &mut PredictionContext, slot: u32) {
    let snapshots = &ctx.snapshots;
    ctx.registry.for_each_in_order(|handle, object| {
        if let Some(snapshot) = snapshots.get(handle, slot as usize) {
            object.restore_snapshot(snapshot);
        }
    });
}

/// Put every rewindable object back on its authoritative state
fn restore_authoritative(ctx: &mut PredictionContext) {
    ctx.registry.for_each_in_order(|_, object| {
        if object.is_rewindable() {
            object.restore_network();
        }
    });
}
