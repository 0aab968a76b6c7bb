//! Garrisonable buildings and field fortifications.
//!
//! Buildings are the authority for their own occupancy: units hold only
//! a back-reference to the building they are inside, and all seat
//! bookkeeping goes through [`Building`] methods so the two views cannot
//! drift apart.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SimError};
use crate::math::{fixed_serde, Fixed, Vec3Fixed};
use crate::unit::UnitId;

/// Unique identifier for a building.
pub type BuildingId = u64;

/// A static structure units can garrison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Building {
    /// Unique id.
    pub id: BuildingId,
    /// World position of the building's center.
    pub position: Vec3Fixed,
    /// Footprint radius in world units.
    #[serde(with = "fixed_serde")]
    pub radius: Fixed,
    /// Total seats.
    pub capacity: u8,
    /// Spawned by a dig-in order rather than placed by the map.
    pub is_fortification: bool,
    occupants: Vec<UnitId>,
}

impl Building {
    /// Create an empty building.
    #[must_use]
    pub fn new(id: BuildingId, position: Vec3Fixed, radius: Fixed, capacity: u8) -> Self {
        Self {
            id,
            position,
            radius,
            capacity,
            is_fortification: false,
            occupants: Vec::new(),
        }
    }

    /// Create a field fortification spawned by a dig-in order.
    #[must_use]
    pub fn fortification(id: BuildingId, position: Vec3Fixed, capacity: u8) -> Self {
        Self {
            id,
            position,
            radius: Fixed::from_num(2),
            capacity,
            is_fortification: true,
            occupants: Vec::new(),
        }
    }

    /// Whether at least one seat is free.
    #[must_use]
    pub fn has_capacity(&self) -> bool {
        self.occupants.len() < usize::from(self.capacity)
    }

    /// Units currently inside, in entry order.
    #[must_use]
    pub fn occupants(&self) -> &[UnitId] {
        &self.occupants
    }

    /// Seat a unit. Fails when the building is full; re-seating an
    /// occupant is also rejected.
    pub fn add_occupant(&mut self, unit: UnitId) -> Result<()> {
        if !self.has_capacity() {
            return Err(SimError::InvalidState(format!(
                "building {} is full",
                self.id
            )));
        }
        if self.occupants.contains(&unit) {
            return Err(SimError::InvalidState(format!(
                "unit {unit} is already inside building {}",
                self.id
            )));
        }
        self.occupants.push(unit);
        Ok(())
    }

    /// Release a seated unit. Fails when the unit is not inside.
    pub fn remove_occupant(&mut self, unit: UnitId) -> Result<()> {
        let idx = self.occupants.iter().position(|&u| u == unit).ok_or_else(|| {
            SimError::InvalidState(format!(
                "unit {unit} is not inside building {}",
                self.id
            ))
        })?;
        self.occupants.remove(idx);
        Ok(())
    }

    /// World position a released unit should appear at: just outside the
    /// footprint, offset deterministically by seat index.
    #[must_use]
    pub fn exit_position(&self, seat: usize) -> Vec3Fixed {
        // Eight exit points around the footprint, reused cyclically.
        const DIRS: [(i32, i32); 8] = [
            (1, 0),
            (1, 1),
            (0, 1),
            (-1, 1),
            (-1, 0),
            (-1, -1),
            (0, -1),
            (1, -1),
        ];
        let (dx, dz) = DIRS[seat % DIRS.len()];
        let step = self.radius + Fixed::ONE;
        self.position.offset(crate::math::Vec2Fixed::new(
            Fixed::from_num(dx) * step,
            Fixed::from_num(dz) * step,
        ))
    }
}
