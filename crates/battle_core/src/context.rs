//! World access seam for unit updates.
//!
//! During a tick each unit is detached from the world and updated
//! against a [`Context`] built over everything else. Units never hold
//! references to each other; they see neighbors as [`UnitView`]
//! snapshots and reach the world only through this trait, which is also
//! what tests mock.

use crate::buildings::BuildingId;
use crate::data::UnitCategory;
use crate::math::{Fixed, Vec2Fixed, Vec3Fixed};
use crate::terrain::TerrainKind;
use crate::unit::UnitId;
use crate::Result;

/// Immutable snapshot of a unit, as seen by other units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnitView {
    /// Unit id.
    pub id: UnitId,
    /// Owning team.
    pub team: u8,
    /// World position.
    pub position: Vec3Fixed,
    /// Ground-plane velocity.
    pub velocity: Vec2Fixed,
    /// Collision radius.
    pub radius: Fixed,
    /// Hull heading in radians.
    pub yaw: Fixed,
    /// Mobility class.
    pub category: UnitCategory,
    /// Projects a morale aura.
    pub is_commander: bool,
    /// Currently in panic flight.
    pub is_routing: bool,
    /// Concealed by a smoke screen.
    pub in_smoke: bool,
    /// Free passenger seats, zero for non-transports.
    pub seats_free: u8,
}

/// Result of applying weapon damage to a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DamageOutcome {
    /// The target's health reached zero.
    pub destroyed: bool,
}

/// Everything a unit may ask of, or do to, the rest of the world during
/// its update.
pub trait Context {
    /// Current simulation tick.
    fn tick(&self) -> u64;

    // --- terrain ---

    /// Ground elevation at a world position.
    fn elevation_at(&self, x: Fixed, z: Fixed) -> Fixed;

    /// Terrain kind at a world position.
    fn kind_at(&self, x: Fixed, z: Fixed) -> TerrainKind;

    /// Slope ratio ahead of a position along a direction.
    fn slope_ratio(&self, x: Fixed, z: Fixed, dir: Vec2Fixed, lookahead: Fixed) -> Fixed;

    // --- pathfinding ---

    /// Whether a path search can still run this tick.
    fn path_budget_available(&self) -> bool;

    /// Budgeted path search. `None` means unreachable, or budget
    /// exhausted when [`Self::path_budget_available`] was false.
    fn find_path(&mut self, start: Vec3Fixed, goal: Vec3Fixed) -> Option<Vec<Vec3Fixed>>;

    /// Nearest reachable stand-in for an unreachable goal.
    fn find_nearest_reachable(&mut self, start: Vec3Fixed, goal: Vec3Fixed) -> Option<Vec3Fixed>;

    // --- neighbors ---

    /// Snapshots of all other units within `radius` of `center`, in
    /// ascending id order.
    fn units_in_radius(&self, center: Vec3Fixed, radius: Fixed) -> Vec<UnitView>;

    /// Snapshot of a specific unit, if it is alive and deployed.
    fn unit_view(&self, id: UnitId) -> Option<UnitView>;

    // --- combat ---

    /// Apply weapon damage to a unit. The world resolves the struck
    /// facing from `from` and the target's heading, mitigates by armor,
    /// and applies the morale and suppression side effects of a hit.
    fn apply_damage(
        &mut self,
        target: UnitId,
        damage: Fixed,
        from: Vec3Fixed,
        targets_top: bool,
    ) -> Result<DamageOutcome>;

    /// Apply suppression without damage (near misses).
    fn apply_suppression(&mut self, target: UnitId, amount: Fixed) -> Result<()>;

    // --- buildings and transports ---

    /// Position of a building.
    fn building_position(&self, id: BuildingId) -> Option<Vec3Fixed>;

    /// Closest building within `max_radius` of a position, ties broken
    /// by lowest id.
    fn nearest_building(&self, position: Vec3Fixed, max_radius: Fixed) -> Option<BuildingId>;

    /// Whether a building has a free seat.
    fn building_has_capacity(&self, id: BuildingId) -> bool;

    /// Seat a unit inside a building. The caller marks itself garrisoned
    /// only on `Ok`.
    fn try_garrison(&mut self, unit: UnitId, building: BuildingId) -> Result<()>;

    /// Release a unit from a building, returning the exit position.
    fn ungarrison(&mut self, unit: UnitId, building: BuildingId) -> Result<Vec3Fixed>;

    /// Spawn a field fortification for a dig-in order and seat the unit
    /// in it. Returns the new building's id.
    fn dig_in(&mut self, unit: UnitId, position: Vec3Fixed, capacity: u8) -> Result<BuildingId>;

    /// Seat a unit inside a transport. The caller marks itself mounted
    /// only on `Ok`.
    fn try_mount(&mut self, passenger: UnitId, transport: UnitId) -> Result<()>;

    /// Deploy a carried passenger at a world position. Called by the
    /// transport, which owns the passenger list.
    fn deploy_passenger(&mut self, passenger: UnitId, at: Vec3Fixed) -> Result<()>;

    /// Hand another unit a move order. Used by transports to fan their
    /// dismounts out after an unload.
    fn order_move(&mut self, unit: UnitId, to: Vec3Fixed) -> Result<()>;

    // --- randomness ---

    /// Draw from the shared deterministic stream: uniform in [0, 1).
    fn rng_roll(&mut self) -> Fixed;
}
