//! Unit commands and the per-unit command queue.
//!
//! A command is a closed variant with one payload shape per kind; the
//! queue holds exactly one current command plus a FIFO of pending ones.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::buildings::BuildingId;
use crate::math::Vec3Fixed;
use crate::unit::UnitId;

/// A command that can be issued to a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    /// Move to a target position.
    Move(Vec3Fixed),
    /// Move at fast pace (road speed bonus, no combat scanning).
    FastMove(Vec3Fixed),
    /// Move in reverse, keeping the hull faced away from travel.
    Reverse(Vec3Fixed),
    /// Attack a specific unit, chasing it into range.
    Attack(UnitId),
    /// Move to a position, engaging enemies found along the way.
    AttackMove(Vec3Fixed),
    /// Enter a building.
    Garrison(BuildingId),
    /// Board a transport unit.
    Mount(UnitId),
    /// Unload all carried passengers.
    Unload,
    /// Entrench and garrison into a spawned field fortification.
    DigIn,
}

impl Command {
    /// The movement destination this command drives toward, if any.
    #[must_use]
    pub const fn destination(&self) -> Option<Vec3Fixed> {
        match self {
            Self::Move(p) | Self::FastMove(p) | Self::Reverse(p) | Self::AttackMove(p) => Some(*p),
            _ => None,
        }
    }
}

/// One current command plus an ordered queue of pending commands.
///
/// `set` clears everything and replaces the current command; `queue`
/// appends when something is active and behaves like `set` otherwise.
/// Completing the current command promotes the FIFO head, or leaves the
/// unit idle.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CommandQueue {
    current: Option<Command>,
    pending: VecDeque<Command>,
}

impl CommandQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The command being executed, if any.
    #[must_use]
    pub const fn current(&self) -> Option<&Command> {
        self.current.as_ref()
    }

    /// Number of pending (not current) commands.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Whether the unit is idle.
    #[must_use]
    pub const fn is_idle(&self) -> bool {
        self.current.is_none()
    }

    /// Replace everything with a single new command.
    pub fn set(&mut self, command: Command) {
        self.pending.clear();
        self.current = Some(command);
    }

    /// Append if a command is active, otherwise start immediately.
    pub fn queue(&mut self, command: Command) {
        if self.current.is_some() {
            self.pending.push_back(command);
        } else {
            self.current = Some(command);
        }
    }

    /// Finish the current command and promote the next pending one.
    /// Returns the newly current command, if any.
    pub fn complete(&mut self) -> Option<&Command> {
        self.current = self.pending.pop_front();
        self.current.as_ref()
    }

    /// Drop the current command and all pending commands.
    pub fn clear(&mut self) {
        self.current = None;
        self.pending.clear();
    }
}
