//! The battle world: unit storage, the tick loop, and determinism
//! plumbing.
//!
//! [`Battle::tick`] advances everything by one fixed step. Units update
//! one at a time in ascending id order; the active unit is detached
//! from storage and given a [`Context`] over the remainder, so it can
//! read and mutate the rest of the world without aliasing itself.
//!
//! Determinism contract: fixed timestep, fixed iteration order, fixed
//! point math, one seeded random stream. Two battles constructed with
//! the same terrain, seed, and command sequence produce identical
//! [`Battle::state_hash`] values forever.

use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, HashMap};
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::buildings::{Building, BuildingId};
use crate::context::{Context, DamageOutcome, UnitView};
use crate::data::UnitCatalog;
use crate::economy::{CaptureZone, Economy};
use crate::error::{Result, SimError};
use crate::events::TickEvents;
use crate::math::{Fixed, Vec2Fixed, Vec3Fixed};
use crate::pathfinding::{PathEngine, CELL_SIZE};
use crate::rng::SimRng;
use crate::terrain::{HeightMap, Terrain};
use crate::unit::{Unit, UnitId};
use crate::command::Command;

/// Simulation ticks per second.
pub const TICK_RATE: u32 = 20;

/// Length of one tick in seconds.
#[must_use]
pub fn tick_duration() -> Fixed {
    Fixed::ONE / Fixed::from_num(TICK_RATE)
}

/// Search window for rerouting unreachable goals, in world units.
fn reroute_radius() -> Fixed {
    CELL_SIZE * Fixed::from_num(8)
}

/// Unit storage with deterministic id-ordered iteration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UnitStorage {
    units: HashMap<UnitId, Unit>,
    next_id: UnitId,
}

impl UnitStorage {
    /// Create empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self {
            units: HashMap::new(),
            next_id: 1,
        }
    }

    fn allocate_id(&mut self) -> UnitId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn insert(&mut self, unit: Unit) {
        self.units.insert(unit.id, unit);
    }

    fn remove(&mut self, id: UnitId) -> Option<Unit> {
        self.units.remove(&id)
    }

    /// Get a unit by id.
    #[must_use]
    pub fn get(&self, id: UnitId) -> Option<&Unit> {
        self.units.get(&id)
    }

    /// Get a unit mutably.
    pub fn get_mut(&mut self, id: UnitId) -> Option<&mut Unit> {
        self.units.get_mut(&id)
    }

    /// Number of living units.
    #[must_use]
    pub fn len(&self) -> usize {
        self.units.len()
    }

    /// Whether storage is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// All unit ids in ascending order. The iteration order of every
    /// system in the simulation.
    #[must_use]
    pub fn sorted_ids(&self) -> Vec<UnitId> {
        let mut ids: Vec<UnitId> = self.units.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Iterate over units in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = &Unit> {
        self.units.values()
    }
}

/// A running battle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Battle {
    tick: u64,
    frozen: bool,
    units: UnitStorage,
    buildings: BTreeMap<BuildingId, Building>,
    next_building_id: BuildingId,
    terrain: HeightMap,
    engine: PathEngine,
    catalog: UnitCatalog,
    economy: Economy,
    rng: SimRng,
}

impl Battle {
    /// Create a battle over a terrain map.
    #[must_use]
    pub fn new(terrain: HeightMap, catalog: UnitCatalog, seed: u64) -> Self {
        let engine = PathEngine::new(&terrain);
        Self {
            tick: 0,
            frozen: false,
            units: UnitStorage::new(),
            buildings: BTreeMap::new(),
            next_building_id: 1,
            terrain,
            engine,
            catalog,
            economy: Economy::new(Vec::new()),
            rng: SimRng::new(seed),
        }
    }

    /// Current tick number.
    #[must_use]
    pub const fn tick_count(&self) -> u64 {
        self.tick
    }

    /// Unit storage.
    #[must_use]
    pub const fn units(&self) -> &UnitStorage {
        &self.units
    }

    /// All buildings by id.
    #[must_use]
    pub const fn buildings(&self) -> &BTreeMap<BuildingId, Building> {
        &self.buildings
    }

    /// The economy layer.
    #[must_use]
    pub const fn economy(&self) -> &Economy {
        &self.economy
    }

    /// The terrain map.
    #[must_use]
    pub const fn terrain(&self) -> &HeightMap {
        &self.terrain
    }

    /// Pause or resume the simulation. Frozen battles ignore ticks.
    pub fn set_frozen(&mut self, frozen: bool) {
        self.frozen = frozen;
    }

    /// Whether the battle is paused.
    #[must_use]
    pub const fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Install the capture zones for this map.
    pub fn set_zones(&mut self, zones: Vec<CaptureZone>) {
        self.economy = Economy::new(zones);
    }

    /// Place a garrisonable building and block its footprint on the
    /// navigation grid.
    pub fn add_building(&mut self, position: Vec3Fixed, radius: Fixed, capacity: u8) -> BuildingId {
        let id = self.next_building_id;
        self.next_building_id += 1;
        self.buildings
            .insert(id, Building::new(id, position, radius, capacity));
        self.engine.grid.block_cell(position);
        id
    }

    /// Spawn a unit of a catalog type. The unit starts under spawn
    /// protection.
    pub fn spawn_unit(&mut self, team: u8, type_id: &str, position: Vec3Fixed) -> Result<UnitId> {
        let data = self.catalog.get(type_id)?.clone();
        let id = self.units.allocate_id();
        let mut unit = Unit::from_data(id, team, &data, position);
        unit.position.y = self.terrain.elevation_at(position.x, position.z);
        info!(unit = id, team, type_id, "unit spawned");
        self.units.insert(unit);
        Ok(id)
    }

    /// Hand a unit to a different owning player (allied control).
    pub fn assign_player(&mut self, unit: UnitId, player: u8) -> Result<()> {
        self.units
            .get_mut(unit)
            .ok_or(SimError::UnitNotFound(unit))?
            .player = player;
        Ok(())
    }

    /// Replace a unit's orders.
    pub fn apply_command(&mut self, unit: UnitId, command: Command) -> Result<()> {
        self.units
            .get_mut(unit)
            .ok_or(SimError::UnitNotFound(unit))?
            .give_command(command);
        Ok(())
    }

    /// Append to a unit's orders.
    pub fn queue_command(&mut self, unit: UnitId, command: Command) -> Result<()> {
        self.units
            .get_mut(unit)
            .ok_or(SimError::UnitNotFound(unit))?
            .queue_command(command);
        Ok(())
    }

    /// Advance the battle by one fixed tick.
    pub fn tick(&mut self) -> TickEvents {
        let mut events = TickEvents::default();
        if self.frozen {
            return events;
        }

        let dt = tick_duration();
        self.engine.reset_budget();

        // Detach each unit, update it against the rest of the world,
        // reinsert.
        for id in self.units.sorted_ids() {
            let Some(mut unit) = self.units.remove(id) else {
                continue;
            };
            if !unit.is_dead() {
                let mut ctx = WorldContext {
                    tick: self.tick,
                    terrain: &self.terrain,
                    engine: &mut self.engine,
                    units: &mut self.units,
                    buildings: &mut self.buildings,
                    next_building_id: &mut self.next_building_id,
                    rng: &mut self.rng,
                };
                unit.fixed_update(dt, &mut ctx);
            }
            self.units.insert(unit);
        }

        self.sync_passengers();
        self.collect_events(&mut events);
        self.sweep_dead(&mut events);

        let presence: Vec<(u8, Vec3Fixed)> = self
            .units
            .sorted_ids()
            .into_iter()
            .filter_map(|id| self.units.get(id))
            .filter(|u| u.is_deployed())
            .map(|u| (u.team, u.position))
            .collect();
        events.zone_events = self.economy.tick(dt, &presence);

        self.tick += 1;
        events
    }

    /// Riders travel with their transport.
    fn sync_passengers(&mut self) {
        let mut moves: Vec<(UnitId, Vec3Fixed)> = Vec::new();
        for id in self.units.sorted_ids() {
            if let Some(transport) = self.units.get(id) {
                for &rider in &transport.passengers {
                    moves.push((rider, transport.position));
                }
            }
        }
        for (rider, position) in moves {
            if let Some(unit) = self.units.get_mut(rider) {
                unit.position = position;
            }
        }
    }

    fn collect_events(&mut self, events: &mut TickEvents) {
        for id in self.units.sorted_ids() {
            if let Some(unit) = self.units.get_mut(id) {
                for event in unit.drain_events() {
                    events.unit_events.push((id, event));
                }
            }
        }
    }

    /// Remove dead units, freeing any seats they held. Passengers of a
    /// destroyed transport bail out shaken but alive.
    fn sweep_dead(&mut self, events: &mut TickEvents) {
        let dead: Vec<UnitId> = self
            .units
            .sorted_ids()
            .into_iter()
            .filter(|&id| self.units.get(id).is_some_and(Unit::is_dead))
            .collect();

        for id in dead {
            let Some(unit) = self.units.remove(id) else {
                continue;
            };
            debug!(unit = id, "unit destroyed");

            if let crate::unit::Deployment::Garrisoned(building) = unit.deployment {
                if let Some(b) = self.buildings.get_mut(&building) {
                    let _ = b.remove_occupant(id);
                }
            }

            for (seat, rider) in unit.passengers.iter().enumerate() {
                if let Some(passenger) = self.units.get_mut(*rider) {
                    let exit = unit.position.offset(bailout_offset(seat));
                    passenger.deploy_at(exit);
                    passenger.add_suppression(Fixed::from_num(50));
                }
            }

            // Fortifications vanish with their sole occupant.
            self.buildings
                .retain(|_, b| !(b.is_fortification && b.occupants().is_empty()));

            events.deaths.push(id);
        }
    }

    /// Hash of the full deterministic state. Two battles that have
    /// processed the same inputs produce the same hash; divergence
    /// means desync.
    #[must_use]
    pub fn state_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.tick.hash(&mut hasher);

        let ids = self.units.sorted_ids();
        ids.len().hash(&mut hasher);
        for id in ids {
            if let Some(unit) = self.units.get(id) {
                id.hash(&mut hasher);
                unit.position.x.to_bits().hash(&mut hasher);
                unit.position.z.to_bits().hash(&mut hasher);
                unit.yaw.to_bits().hash(&mut hasher);
                unit.health.to_bits().hash(&mut hasher);
                unit.morale.to_bits().hash(&mut hasher);
                unit.suppression.to_bits().hash(&mut hasher);
                unit.kills.hash(&mut hasher);
                unit.veterancy.hash(&mut hasher);
            }
        }

        for (id, building) in &self.buildings {
            id.hash(&mut hasher);
            building.occupants().hash(&mut hasher);
        }

        for zone in self.economy.zones() {
            zone.id.hash(&mut hasher);
            zone.owner.hash(&mut hasher);
        }

        hasher.finish()
    }

    /// Serialize the battle for snapshots and replays.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        bincode::serialize(self)
            .map_err(|e| SimError::InvalidState(format!("failed to serialize battle: {e}")))
    }

    /// Restore a battle from a snapshot.
    pub fn deserialize(data: &[u8]) -> Result<Self> {
        bincode::deserialize(data)
            .map_err(|e| SimError::InvalidState(format!("failed to deserialize battle: {e}")))
    }

    /// Compare against a remote hash for the same tick.
    pub fn verify_hash(&self, remote_hash: u64) -> Result<()> {
        let local_hash = self.state_hash();
        if local_hash == remote_hash {
            Ok(())
        } else {
            Err(SimError::DesyncDetected {
                tick: self.tick,
                local_hash,
                remote_hash,
            })
        }
    }
}

/// The world as seen by one detached unit.
struct WorldContext<'a> {
    tick: u64,
    terrain: &'a HeightMap,
    engine: &'a mut PathEngine,
    units: &'a mut UnitStorage,
    buildings: &'a mut BTreeMap<BuildingId, Building>,
    next_building_id: &'a mut BuildingId,
    rng: &'a mut SimRng,
}

impl Context for WorldContext<'_> {
    fn tick(&self) -> u64 {
        self.tick
    }

    fn elevation_at(&self, x: Fixed, z: Fixed) -> Fixed {
        self.terrain.elevation_at(x, z)
    }

    fn kind_at(&self, x: Fixed, z: Fixed) -> crate::terrain::TerrainKind {
        self.terrain.kind_at(x, z)
    }

    fn slope_ratio(&self, x: Fixed, z: Fixed, dir: Vec2Fixed, lookahead: Fixed) -> Fixed {
        self.terrain.slope_ratio(x, z, dir, lookahead)
    }

    fn path_budget_available(&self) -> bool {
        self.engine.searches_left() > 0
    }

    fn find_path(&mut self, start: Vec3Fixed, goal: Vec3Fixed) -> Option<Vec<Vec3Fixed>> {
        self.engine.find_path(start, goal)
    }

    fn find_nearest_reachable(&mut self, start: Vec3Fixed, goal: Vec3Fixed) -> Option<Vec3Fixed> {
        self.engine.find_nearest_reachable(start, goal, reroute_radius())
    }

    fn units_in_radius(&self, center: Vec3Fixed, radius: Fixed) -> Vec<UnitView> {
        let mut views: Vec<UnitView> = self
            .units
            .iter()
            .filter(|u| u.is_deployed() && !u.is_dead())
            .filter(|u| u.position.ground_distance_squared(center) <= radius * radius)
            .map(Unit::view)
            .collect();
        views.sort_unstable_by_key(|v| v.id);
        views
    }

    fn unit_view(&self, id: UnitId) -> Option<UnitView> {
        self.units
            .get(id)
            .filter(|u| u.is_deployed() && !u.is_dead())
            .map(Unit::view)
    }

    fn apply_damage(
        &mut self,
        target: UnitId,
        damage: Fixed,
        from: Vec3Fixed,
        targets_top: bool,
    ) -> Result<DamageOutcome> {
        let unit = self
            .units
            .get_mut(target)
            .ok_or(SimError::UnitNotFound(target))?;
        let facing = if targets_top {
            crate::combat::ArmorFacing::Top
        } else {
            unit.facing_toward(from)
        };
        let mitigated = unit.armor.mitigate(damage, facing);
        unit.take_damage(mitigated);
        Ok(DamageOutcome {
            destroyed: unit.is_dead(),
        })
    }

    fn apply_suppression(&mut self, target: UnitId, amount: Fixed) -> Result<()> {
        self.units
            .get_mut(target)
            .ok_or(SimError::UnitNotFound(target))?
            .add_suppression(amount);
        Ok(())
    }

    fn building_position(&self, id: BuildingId) -> Option<Vec3Fixed> {
        self.buildings.get(&id).map(|b| b.position)
    }

    fn nearest_building(&self, position: Vec3Fixed, max_radius: Fixed) -> Option<BuildingId> {
        self.buildings
            .iter()
            .map(|(id, b)| (b.position.ground_distance_squared(position), *id))
            .filter(|(d, _)| *d <= max_radius * max_radius)
            .min()
            .map(|(_, id)| id)
    }

    fn building_has_capacity(&self, id: BuildingId) -> bool {
        self.buildings.get(&id).is_some_and(Building::has_capacity)
    }

    fn try_garrison(&mut self, unit: UnitId, building: BuildingId) -> Result<()> {
        self.buildings
            .get_mut(&building)
            .ok_or(SimError::BuildingNotFound(building))?
            .add_occupant(unit)
    }

    fn ungarrison(&mut self, unit: UnitId, building: BuildingId) -> Result<Vec3Fixed> {
        let b = self
            .buildings
            .get_mut(&building)
            .ok_or(SimError::BuildingNotFound(building))?;
        let seat = b
            .occupants()
            .iter()
            .position(|&u| u == unit)
            .unwrap_or_default();
        b.remove_occupant(unit)?;
        Ok(b.exit_position(seat))
    }

    fn dig_in(&mut self, unit: UnitId, position: Vec3Fixed, capacity: u8) -> Result<BuildingId> {
        let id = *self.next_building_id;
        *self.next_building_id += 1;
        let mut fort = Building::fortification(id, position, capacity);
        fort.add_occupant(unit)?;
        self.buildings.insert(id, fort);
        Ok(id)
    }

    fn try_mount(&mut self, passenger: UnitId, transport: UnitId) -> Result<()> {
        self.units
            .get_mut(transport)
            .ok_or(SimError::UnitNotFound(transport))?
            .add_passenger(passenger)
    }

    fn deploy_passenger(&mut self, passenger: UnitId, at: Vec3Fixed) -> Result<()> {
        let ground = self.terrain.elevation_at(at.x, at.z);
        let unit = self
            .units
            .get_mut(passenger)
            .ok_or(SimError::UnitNotFound(passenger))?;
        let mut at = at;
        at.y = ground;
        unit.deploy_at(at);
        Ok(())
    }

    fn order_move(&mut self, unit: UnitId, to: Vec3Fixed) -> Result<()> {
        self.units
            .get_mut(unit)
            .ok_or(SimError::UnitNotFound(unit))?
            .give_command(Command::Move(to));
        Ok(())
    }

    fn rng_roll(&mut self) -> Fixed {
        self.rng.next_fixed()
    }
}

/// Deterministic bail-out spread around a destroyed transport.
fn bailout_offset(seat: usize) -> Vec2Fixed {
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
    Vec2Fixed::new(
        Fixed::from_num(dx * 3),
        Fixed::from_num(dz * 3),
    )
}
