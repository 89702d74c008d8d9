//! # Command History
//!
//! Per-tick input records captured by the local input source. Commands are
//! immutable once recorded apart from the "has been simulated" marker, and
//! are retired once the server has acknowledged execution past them.

use std::collections::VecDeque;

use bitflags::bitflags;
use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::error::{PredictionError, Result};

bitflags! {
    /// Discrete actions held during a tick
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct Buttons: u32 {
        const ATTACK = 1 << 0;
        const JUMP = 1 << 1;
        const DUCK = 1 << 2;
        const USE = 1 << 3;
        const ATTACK2 = 1 << 4;
        const RELOAD = 1 << 5;
        const SPRINT = 1 << 6;
        const WALK = 1 << 7;
    }
}

/// One tick of captured input
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct UserInput {
    /// Forward/back movement axis
    pub forward_move: f32,
    /// Strafe axis
    pub side_move: f32,
    /// Vertical axis (swim, fly)
    pub up_move: f32,
    /// View orientation (pitch, yaw, roll) in degrees
    pub view_angles: Vec3,
    /// Held buttons
    pub buttons: Buttons,
    /// Requested selection (weapon slot, tool, ...)
    pub select: Option<u32>,
}

impl UserInput {
    /// Movement intent as a vector (forward, side, up)
    pub fn movement(&self) -> Vec3 {
        Vec3::new(self.forward_move, self.side_move, self.up_move)
    }
}

/// A recorded input command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    sequence: u32,
    input: UserInput,
    has_been_simulated: bool,
}

impl Command {
    /// Create a command that has not yet been simulated
    pub fn new(sequence: u32, input: UserInput) -> Self {
        Self {
            sequence,
            input,
            has_been_simulated: false,
        }
    }

    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    pub fn input(&self) -> &UserInput {
        &self.input
    }

    /// Whether any prediction pass has already run this command
    pub fn has_been_simulated(&self) -> bool {
        self.has_been_simulated
    }
}

/// Append-only buffer of recorded commands, ordered by sequence number
pub struct CommandHistory {
    commands: VecDeque<Command>,
    capacity: usize,
}

impl CommandHistory {
    /// Create a history holding at most `capacity` commands
    pub fn new(capacity: usize) -> Self {
        Self {
            commands: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Append a command. Sequence numbers must strictly increase.
    pub fn record(&mut self, command: Command) -> Result<()> {
        if let Some(last) = self.commands.back() {
            if command.sequence <= last.sequence {
                return Err(PredictionError::CommandOutOfOrder {
                    last: last.sequence,
                    got: command.sequence,
                });
            }
        }

        if self.commands.len() >= self.capacity {
            // Server has stopped acknowledging; the replay window will overflow anyway
            if let Some(evicted) = self.commands.pop_front() {
                log::warn!(
                    "Command history full ({}), evicting unacknowledged command {}",
                    self.capacity,
                    evicted.sequence
                );
            }
        }

        self.commands.push_back(command);
        Ok(())
    }

    fn index_of(&self, sequence: u32) -> Result<usize> {
        self.commands
            .binary_search_by_key(&sequence, |c| c.sequence)
            .map_err(|_| PredictionError::CommandNotFound(sequence))
    }

    /// Fetch a command by sequence number
    pub fn command_at(&self, sequence: u32) -> Result<&Command> {
        let index = self.index_of(sequence)?;
        Ok(&self.commands[index])
    }

    /// Flag a command as simulated by a prediction pass
    pub fn mark_simulated(&mut self, sequence: u32) -> Result<()> {
        let index = self.index_of(sequence)?;
        self.commands[index].has_been_simulated = true;
        Ok(())
    }

    /// Drop every command with a sequence number at or below `sequence`.
    /// Returns the number of commands retired.
    pub fn retire_through(&mut self, sequence: u32) -> usize {
        let mut retired = 0;
        while self.commands.front().is_some_and(|c| c.sequence <= sequence) {
            self.commands.pop_front();
            retired += 1;
        }
        retired
    }

    /// Oldest command still held
    pub fn oldest(&self) -> Option<u32> {
        self.commands.front().map(|c| c.sequence)
    }

    /// Most recently recorded command
    pub fn newest(&self) -> Option<u32> {
        self.commands.back().map(|c| c.sequence)
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.commands.clear();
    }
}
