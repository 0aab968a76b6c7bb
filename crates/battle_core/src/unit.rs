//! The unit entity and its per-tick state machine.
//!
//! A unit owns its full battlefield state: kinematics, health, morale,
//! suppression, veterancy, weapons, command queue, and its current path.
//! Once per tick the battle detaches the unit and calls
//! [`Unit::fixed_update`] with a [`Context`] over the rest of the world;
//! everything the unit does to anyone else goes through that trait.
//!
//! Update order inside a tick is fixed: timers, morale and suppression
//! recovery, routing flight, then command execution (movement, combat,
//! garrison/transport transitions). Events produced along the way are
//! buffered on the unit and drained by the battle after the tick.

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::avoidance;
use crate::buildings::BuildingId;
use crate::combat::{
    self, facing_from_angle, hit_chance, veterancy_for_kills, ArmorProfile, WeaponSlot,
    AURA_MORALE_PER_SEC, COMMANDER_SCAN_RADIUS, MORALE_CRITICAL, MORALE_LOW, MORALE_MAX,
    ROUT_RECOVER_MORALE, ROUT_SHELTER_RECOVERY_PER_SEC, SPAWN_PROTECTION_SECS,
    SUPPRESSION_FIRE_BLOCK,
    SUPPRESSION_RECOVERY_PER_SEC, VETERANCY_HEAL_DEN, VETERANCY_HEAL_NUM, VETERANCY_MORALE_BONUS,
};
use crate::command::{Command, CommandQueue};
use crate::context::{Context, UnitView};
use crate::data::{UnitCategory, UnitData};
use crate::events::UnitEvent;
use crate::math::{angle_diff, fixed_serde, heading_of, wrap_angle, Fixed, Vec2Fixed, Vec3Fixed};

/// Unique identifier for a unit.
pub type UnitId = u64;

/// Distance from a building or transport at which entry begins.
pub const GARRISON_RANGE: Fixed = Fixed::const_from_int(5);

/// Distance from a transport at which boarding begins.
pub const MOUNT_RANGE: Fixed = Fixed::const_from_int(3);

/// Waypoint reached when closer than this.
pub const WAYPOINT_TOLERANCE: Fixed = Fixed::const_from_int(2);

/// Seconds of no progress before a stuck escape is attempted.
pub const STUCK_WINDOW: Fixed = Fixed::from_bits(0x8000_0000); // 0.5

/// Length of a stuck escape nudge in world units.
pub const ESCAPE_DISTANCE: Fixed = Fixed::const_from_int(5);

/// Minimum seconds between path replans.
pub const REPLAN_COOLDOWN: Fixed = Fixed::const_from_int(1);

/// Speed multiplier while reversing.
fn reverse_factor() -> Fixed {
    Fixed::from_num(0.6)
}

/// Speed multiplier on road cells.
fn road_factor() -> Fixed {
    Fixed::from_num(1.5)
}

/// Seconds an infantry squad spends entrenching before its foxhole
/// exists.
pub const DIG_IN_SECS: Fixed = Fixed::const_from_int(3);

/// Where an in-progress entry transition is headed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
enum EntryTarget {
    Building(BuildingId),
    Transport(UnitId),
    Fortification,
}

/// A timed entry transition (garrison, mount, or dig-in).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct EntryProgress {
    target: EntryTarget,
    #[serde(with = "fixed_serde")]
    remaining: Fixed,
}

/// Deployment state. Garrisoned and mounted units are off the field:
/// they do not move, collide, or appear in neighbor scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Deployment {
    /// On the field.
    #[default]
    Deployed,
    /// Inside a building. Fires out, cannot move.
    Garrisoned(BuildingId),
    /// Inside a transport. Fully inert.
    Mounted(UnitId),
}

/// A battlefield unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Unit {
    /// Unique id.
    pub id: UnitId,
    /// Owning team.
    pub team: u8,
    /// Owning player. Distinct from team for allied contributions.
    pub player: u8,
    /// Unit type id in the catalog.
    pub type_id: String,
    /// Display name from the catalog.
    pub name: String,

    /// World position. Y tracks ground elevation.
    pub position: Vec3Fixed,
    /// Hull heading in radians.
    #[serde(with = "fixed_serde")]
    pub yaw: Fixed,
    /// Ground-plane velocity, set each tick.
    pub velocity: Vec2Fixed,

    /// Current health.
    #[serde(with = "fixed_serde")]
    pub health: Fixed,
    /// Morale in [0, 100]. Zero means routing.
    #[serde(with = "fixed_serde")]
    pub morale: Fixed,
    /// Suppression in [0, 100].
    #[serde(with = "fixed_serde")]
    pub suppression: Fixed,
    /// Lifetime kills.
    pub kills: u32,
    /// Veterancy tier (0..=2).
    pub veterancy: u8,

    /// Mobility class.
    pub category: UnitCategory,
    /// Collision radius.
    #[serde(with = "fixed_serde")]
    pub radius: Fixed,
    /// Sight radius.
    #[serde(with = "fixed_serde")]
    pub sight_radius: Fixed,
    /// Per-facing armor.
    pub armor: ArmorProfile,
    /// Weapon slots in priority order.
    pub weapons: Vec<WeaponSlot>,
    /// Projects a morale aura.
    pub is_commander: bool,
    /// Passenger seats if this unit is a transport.
    pub transport_capacity: u8,

    /// Passengers riding this transport.
    pub passengers: Vec<UnitId>,
    /// Deployment state.
    pub deployment: Deployment,

    #[serde(with = "fixed_serde")]
    max_health: Fixed,
    #[serde(with = "fixed_serde")]
    max_speed: Fixed,
    #[serde(with = "fixed_serde")]
    rotation_rate: Fixed,
    can_garrison: bool,
    can_dig_in: bool,

    commands: CommandQueue,
    path: Option<Vec<Vec3Fixed>>,
    path_index: usize,
    path_goal: Option<Vec3Fixed>,
    entering: Option<EntryProgress>,

    routing: bool,
    morale_dipped: bool,
    #[serde(with = "fixed_serde")]
    spawn_protection: Fixed,
    #[serde(with = "fixed_serde")]
    smoke_timer: Fixed,
    #[serde(with = "fixed_serde")]
    stuck_timer: Fixed,
    #[serde(with = "fixed_serde")]
    replan_cooldown: Fixed,
    last_position: Vec3Fixed,

    #[serde(skip)]
    pending_events: Vec<UnitEvent>,
}

impl Unit {
    /// Instantiate a unit of a catalog type.
    #[must_use]
    pub fn from_data(id: UnitId, team: u8, data: &UnitData, position: Vec3Fixed) -> Self {
        Self {
            id,
            team,
            player: team,
            type_id: data.id.clone(),
            name: data.name.clone(),
            position,
            yaw: Fixed::ZERO,
            velocity: Vec2Fixed::ZERO,
            health: data.max_health,
            morale: MORALE_MAX,
            suppression: Fixed::ZERO,
            kills: 0,
            veterancy: 0,
            category: data.category,
            radius: data.radius,
            sight_radius: data.sight_radius,
            armor: data.armor,
            weapons: data.weapons.iter().cloned().map(WeaponSlot::new).collect(),
            is_commander: data.is_commander,
            transport_capacity: data.transport_capacity,
            passengers: Vec::new(),
            deployment: Deployment::Deployed,
            max_health: data.max_health,
            max_speed: data.max_speed,
            rotation_rate: data.rotation_rate,
            can_garrison: data.can_garrison,
            can_dig_in: data.can_dig_in,
            commands: CommandQueue::new(),
            path: None,
            path_index: 0,
            path_goal: None,
            entering: None,
            routing: false,
            morale_dipped: false,
            spawn_protection: SPAWN_PROTECTION_SECS,
            smoke_timer: Fixed::ZERO,
            stuck_timer: Fixed::ZERO,
            replan_cooldown: Fixed::ZERO,
            last_position: position,
            pending_events: Vec::new(),
        }
    }

    /// Whether the unit is dead.
    #[must_use]
    pub fn is_dead(&self) -> bool {
        self.health <= Fixed::ZERO
    }

    /// Whether the unit is in panic flight.
    #[must_use]
    pub const fn is_routing(&self) -> bool {
        self.routing
    }

    /// Whether spawn protection is still active.
    #[must_use]
    pub fn is_protected(&self) -> bool {
        self.spawn_protection > Fixed::ZERO
    }

    /// Whether the unit is on the field (not garrisoned or mounted).
    #[must_use]
    pub fn is_deployed(&self) -> bool {
        self.deployment == Deployment::Deployed
    }

    /// Maximum health for this unit.
    #[must_use]
    pub const fn max_health(&self) -> Fixed {
        self.max_health
    }

    /// The command queue.
    #[must_use]
    pub const fn commands(&self) -> &CommandQueue {
        &self.commands
    }

    /// Replace all orders with `command`.
    pub fn give_command(&mut self, command: Command) {
        self.commands.set(command);
        self.invalidate_path();
    }

    /// Append `command` after current orders.
    pub fn queue_command(&mut self, command: Command) {
        self.commands.queue(command);
    }

    /// Snapshot for other units' neighbor scans.
    #[must_use]
    pub fn view(&self) -> UnitView {
        UnitView {
            id: self.id,
            team: self.team,
            position: self.position,
            velocity: self.velocity,
            radius: self.radius,
            yaw: self.yaw,
            category: self.category,
            is_commander: self.is_commander,
            is_routing: self.routing,
            in_smoke: self.in_smoke(),
            seats_free: self
                .transport_capacity
                .saturating_sub(self.passengers.len() as u8),
        }
    }

    /// Drain events buffered during the last update.
    pub fn drain_events(&mut self) -> Vec<UnitEvent> {
        std::mem::take(&mut self.pending_events)
    }

    // --- mutations applied by the world on behalf of attackers ---

    /// Apply already-mitigated damage. No-op under spawn protection.
    /// Hits also shake morale and add suppression.
    pub fn take_damage(&mut self, amount: Fixed) {
        if self.is_protected() || self.is_dead() {
            return;
        }
        self.health -= amount;
        if self.health <= Fixed::ZERO {
            self.health = Fixed::ZERO;
            self.pending_events.push(UnitEvent::Death);
            return;
        }
        self.add_suppression(amount);
        self.shift_morale(-amount / Fixed::from_num(2));
    }

    /// Add suppression, clamped to [0, 100]. No-op under spawn
    /// protection.
    pub fn add_suppression(&mut self, amount: Fixed) {
        if self.is_protected() || self.is_dead() {
            return;
        }
        self.suppression = (self.suppression + amount).clamp(Fixed::ZERO, MORALE_MAX);
    }

    /// Struck facing for fire arriving from `from`.
    #[must_use]
    pub fn facing_toward(&self, from: Vec3Fixed) -> crate::combat::ArmorFacing {
        let bearing = heading_of(self.position.ground_direction_to(from));
        facing_from_angle(angle_diff(self.yaw, bearing))
    }

    /// Move morale by a delta, clamping and emitting threshold events.
    pub fn shift_morale(&mut self, delta: Fixed) {
        let old = self.morale;
        let new = (old + delta).clamp(Fixed::ZERO, MORALE_MAX);
        if new == old {
            return;
        }
        self.morale = new;

        if new < old {
            if new < MORALE_LOW && old >= MORALE_LOW {
                self.morale_dipped = true;
                self.pending_events.push(UnitEvent::MoraleLow);
            }
            if new < MORALE_CRITICAL && old >= MORALE_CRITICAL {
                self.pending_events.push(UnitEvent::MoraleCritical);
            }
            if new == Fixed::ZERO && !self.routing {
                self.start_routing();
            }
        } else {
            if self.routing && new >= ROUT_RECOVER_MORALE {
                self.routing = false;
                self.pending_events.push(UnitEvent::RoutRecovered);
            }
            if !self.routing && self.morale_dipped && new > MORALE_LOW {
                self.morale_dipped = false;
                self.pending_events.push(UnitEvent::Rallied);
            }
        }
    }

    fn start_routing(&mut self) {
        self.routing = true;
        self.commands.clear();
        self.invalidate_path();
        self.entering = None;
        self.pending_events.push(UnitEvent::RoutStarted);
        debug!(unit = self.id, "unit routed");

        // Vehicles pop smoke to cover the flight, if a charge is left.
        if let Some(slot) = self
            .weapons
            .iter_mut()
            .find(|s| s.weapon.is_smoke && s.is_ready())
        {
            slot.fire(Fixed::ONE);
            self.smoke_timer = Fixed::from_num(10);
        }
    }

    /// Whether the unit is currently concealed by smoke.
    #[must_use]
    pub fn in_smoke(&self) -> bool {
        self.smoke_timer > Fixed::ZERO
    }

    fn vet_multiplier(&self) -> Fixed {
        let mut m = Fixed::ONE;
        for _ in 0..self.veterancy {
            m *= combat::veterancy_step_multiplier();
        }
        m
    }

    /// Top speed including the veterancy bonus.
    fn effective_speed(&self) -> Fixed {
        self.max_speed * self.vet_multiplier()
    }

    /// Turn rate including the veterancy bonus.
    fn effective_rotation(&self) -> Fixed {
        self.rotation_rate * self.vet_multiplier()
    }

    fn record_kill(&mut self) {
        self.kills += 1;
        let tier = veterancy_for_kills(self.kills);
        if tier > self.veterancy {
            self.veterancy = tier;
            let heal = self.max_health * VETERANCY_HEAL_NUM / VETERANCY_HEAL_DEN;
            self.health = (self.health + heal).min(self.max_health);
            self.shift_morale(VETERANCY_MORALE_BONUS);
            self.pending_events.push(UnitEvent::VeterancyGained(tier));
            debug!(unit = self.id, tier, "veterancy gained");
        }
    }

    fn invalidate_path(&mut self) {
        self.path = None;
        self.path_index = 0;
        self.path_goal = None;
    }

    // --- the tick ---

    /// Advance this unit by `dt` seconds.
    pub fn fixed_update(&mut self, dt: Fixed, ctx: &mut dyn Context) {
        if self.is_dead() {
            return;
        }

        self.tick_timers(dt);

        if matches!(self.deployment, Deployment::Mounted(_)) {
            // Riders recover but do nothing else.
            self.recover(dt, false);
            self.velocity = Vec2Fixed::ZERO;
            return;
        }

        let in_aura = self.near_friendly_commander(ctx);
        self.recover(dt, in_aura);

        if self.routing {
            self.velocity = Vec2Fixed::ZERO;
            if self.is_deployed() {
                self.flee(dt, ctx);
            }
            return;
        }

        if let Deployment::Garrisoned(building) = self.deployment {
            self.update_garrisoned(dt, ctx, building);
            return;
        }

        if let Some(progress) = self.entering {
            self.update_entering(dt, ctx, progress);
            return;
        }

        self.velocity = Vec2Fixed::ZERO;
        match self.commands.current().copied() {
            None => {
                // Idle units still defend themselves.
                self.scan_and_fire(dt, ctx, None);
            }
            Some(Command::Move(dest)) => {
                self.drive_toward(dt, ctx, dest, Fixed::ONE, false);
            }
            Some(Command::FastMove(dest)) => {
                // Fast pace trades combat scanning for speed.
                self.drive_toward(dt, ctx, dest, road_factor(), false);
            }
            Some(Command::Reverse(dest)) => {
                self.drive_toward(dt, ctx, dest, reverse_factor(), true);
            }
            Some(Command::AttackMove(dest)) => {
                let engaged = self.scan_and_fire(dt, ctx, None);
                if !engaged {
                    self.drive_toward(dt, ctx, dest, Fixed::ONE, false);
                }
            }
            Some(Command::Attack(target)) => {
                self.update_attack(dt, ctx, target);
            }
            Some(Command::Garrison(building)) => {
                self.update_garrison_approach(dt, ctx, building);
            }
            Some(Command::Mount(transport)) => {
                self.update_mount_approach(dt, ctx, transport);
            }
            Some(Command::Unload) => {
                self.update_unload(ctx);
            }
            Some(Command::DigIn) => {
                self.update_dig_in();
            }
        }
    }

    fn tick_timers(&mut self, dt: Fixed) {
        if self.spawn_protection > Fixed::ZERO {
            self.spawn_protection = (self.spawn_protection - dt).max(Fixed::ZERO);
        }
        if self.smoke_timer > Fixed::ZERO {
            self.smoke_timer = (self.smoke_timer - dt).max(Fixed::ZERO);
        }
        if self.replan_cooldown > Fixed::ZERO {
            self.replan_cooldown = (self.replan_cooldown - dt).max(Fixed::ZERO);
        }
        for slot in &mut self.weapons {
            slot.tick(dt);
        }
    }

    /// Morale and suppression recovery. Veterans shrug off suppression
    /// faster; commanders rally nearby friendlies.
    fn recover(&mut self, dt: Fixed, in_aura: bool) {
        let vet_bonus = Fixed::ONE
            + Fixed::from_num(self.veterancy) / Fixed::from_num(4);
        let recovery = SUPPRESSION_RECOVERY_PER_SEC * vet_bonus * dt;
        self.suppression = (self.suppression - recovery).max(Fixed::ZERO);

        let mut regen = Fixed::ONE;
        if in_aura {
            regen += AURA_MORALE_PER_SEC;
        }
        self.shift_morale(regen * dt);
    }

    fn near_friendly_commander(&self, ctx: &dyn Context) -> bool {
        if self.is_commander {
            return true;
        }
        ctx.units_in_radius(self.position, COMMANDER_SCAN_RADIUS)
            .iter()
            .any(|v| {
                v.is_commander
                    && v.team == self.team
                    && !v.is_routing
                    && v.position.ground_distance_squared(self.position)
                        <= COMMANDER_SCAN_RADIUS * COMMANDER_SCAN_RADIUS
            })
    }

    /// Panic flight: run from the centroid of visible enemies,
    /// preferring cover. A unit already in cover goes to ground instead.
    fn flee(&mut self, dt: Fixed, ctx: &mut dyn Context) {
        let here = self.position;
        if ctx.kind_at(here.x, here.z).is_cover() {
            // Sheltered: hold position, morale comes back faster.
            self.shift_morale(ROUT_SHELTER_RECOVERY_PER_SEC * dt);
            return;
        }

        let enemies: Vec<UnitView> = ctx
            .units_in_radius(here, self.sight_radius)
            .into_iter()
            .filter(|v| v.team != self.team)
            .collect();
        if enemies.is_empty() {
            // Nobody in sight: go to ground and recover.
            self.shift_morale(ROUT_SHELTER_RECOVERY_PER_SEC * dt);
            return;
        }

        // Flight direction is away from the mass of the threat, not
        // just the closest unit, so a flanked unit does not run into
        // the far half of the pincer.
        let mut sum = Vec2Fixed::ZERO;
        for enemy in &enemies {
            sum = sum + enemy.position.ground();
        }
        let count = Fixed::from_num(enemies.len() as i32);
        let centroid = Vec3Fixed::new(sum.x / count, Fixed::ZERO, sum.z / count);

        // Angle toward a building when one lies in the escape
        // half-plane.
        let away = centroid.ground_direction_to(here);
        let desired = ctx
            .nearest_building(here, self.sight_radius)
            .and_then(|id| ctx.building_position(id))
            .map(|shelter| here.ground_direction_to(shelter))
            .filter(|to_shelter| to_shelter.dot(away) > Fixed::ZERO)
            .unwrap_or(away)
            .scale(self.effective_speed());
        let neighbors = ctx.units_in_radius(here, avoidance::SCAN_RADIUS);
        let velocity = avoidance::resolve(here, self.radius, desired, &neighbors, |dir| {
            ctx.slope_ratio(here.x, here.z, dir, WAYPOINT_TOLERANCE)
        });
        self.integrate(dt, ctx, velocity, false);
    }

    // --- movement ---

    /// Path-following movement toward `dest`. Returns true on arrival.
    fn drive_toward(
        &mut self,
        dt: Fixed,
        ctx: &mut dyn Context,
        dest: Vec3Fixed,
        pace: Fixed,
        reverse: bool,
    ) -> bool {
        let stop_distance = self.radius * Fixed::from_num(0.8);
        if self.position.ground_distance_squared(dest) <= stop_distance * stop_distance {
            self.arrive();
            return true;
        }

        if self.category == UnitCategory::Aircraft {
            // Aircraft fly direct; the grid does not apply to them.
            let desired = self
                .position
                .ground_direction_to(dest)
                .scale(self.effective_speed() * pace);
            self.integrate(dt, ctx, desired, reverse);
            return false;
        }

        if !self.ensure_path(ctx, dest) {
            return false;
        }

        let Some(waypoint) = self.current_waypoint() else {
            self.arrive();
            return true;
        };

        let mut desired = self.desired_velocity(ctx, waypoint, pace);
        let neighbors = ctx.units_in_radius(self.position, avoidance::SCAN_RADIUS);
        if !reverse {
            desired = self.overtake_bias(ctx, desired, &neighbors);
        }
        let here = self.position;
        let velocity = avoidance::resolve(here, self.radius, desired, &neighbors, |dir| {
            ctx.slope_ratio(here.x, here.z, dir, WAYPOINT_TOLERANCE)
        });
        self.integrate(dt, ctx, velocity, reverse);
        self.advance_waypoints();
        self.detect_stuck(dt, ctx);
        false
    }

    /// Lane logic on roads: a slower friendly directly ahead gets
    /// passed on a fixed side instead of tailgated.
    fn overtake_bias(
        &self,
        ctx: &dyn Context,
        desired: Vec2Fixed,
        neighbors: &[UnitView],
    ) -> Vec2Fixed {
        if ctx.kind_at(self.position.x, self.position.z) != crate::terrain::TerrainKind::Road {
            return desired;
        }
        let speed_sq = desired.length_squared();
        if speed_sq == Fixed::ZERO {
            return desired;
        }
        let dir = desired.normalize();
        let window = self.effective_speed() * Fixed::from_num(2);
        let blocked = neighbors.iter().any(|v| {
            if v.team != self.team {
                return false;
            }
            let offset = v.position.ground() - self.position.ground();
            let ahead = offset.dot(dir);
            if ahead <= Fixed::ZERO || ahead > window {
                return false;
            }
            let lateral = offset.dot(dir.perpendicular()).abs();
            lateral <= self.radius + v.radius && v.velocity.length_squared() < speed_sq
        });
        if !blocked {
            return desired;
        }
        // 0.8/0.6 keeps the overall speed unchanged.
        let speed = desired.length();
        dir.scale(speed * Fixed::from_num(0.8))
            + dir.perpendicular().scale(speed * Fixed::from_num(0.6))
    }

    /// Make sure a path to `dest` exists, requesting one inside the
    /// shared search budget. Returns false while no path is available.
    fn ensure_path(&mut self, ctx: &mut dyn Context, dest: Vec3Fixed) -> bool {
        if self.path_goal == Some(dest) && self.path.is_some() {
            return true;
        }
        if self.replan_cooldown > Fixed::ZERO || !ctx.path_budget_available() {
            // Budget exhausted or cooling down: try again next tick.
            return self.path.is_some();
        }

        match ctx.find_path(self.position, dest) {
            Some(path) => {
                trace!(unit = self.id, waypoints = path.len(), "path found");
                self.path = Some(path);
                self.path_index = 0;
                self.path_goal = Some(dest);
                true
            }
            None => {
                // Unreachable: fall back to the closest spot we can get
                // to, or give the order up entirely.
                if let Some(nearby) = ctx.find_nearest_reachable(self.position, dest) {
                    if nearby != dest {
                        debug!(unit = self.id, "goal unreachable, rerouting to nearest");
                        return self.ensure_path(ctx, nearby);
                    }
                }
                debug!(unit = self.id, "goal unreachable, abandoning order");
                self.arrive();
                false
            }
        }
    }

    fn current_waypoint(&self) -> Option<Vec3Fixed> {
        self.path
            .as_ref()
            .and_then(|p| p.get(self.path_index))
            .copied()
    }

    fn advance_waypoints(&mut self) {
        let Some(len) = self.path.as_ref().map(Vec::len) else {
            return;
        };
        while let Some(wp) = self.current_waypoint() {
            let tolerance = if self.path_index + 1 == len {
                self.radius * Fixed::from_num(0.8)
            } else {
                WAYPOINT_TOLERANCE
            };
            if self.position.ground_distance_squared(wp) <= tolerance * tolerance {
                self.path_index += 1;
            } else {
                break;
            }
        }
        if self.path_index >= len {
            self.arrive();
        }
    }

    fn arrive(&mut self) {
        self.invalidate_path();
        self.velocity = Vec2Fixed::ZERO;
        self.stuck_timer = Fixed::ZERO;
        self.commands.complete();
    }

    /// Desired velocity toward a waypoint, before avoidance: top speed
    /// shaped by pace, terrain, slope, and suppression.
    fn desired_velocity(&self, ctx: &dyn Context, waypoint: Vec3Fixed, pace: Fixed) -> Vec2Fixed {
        let dir = self.position.ground_direction_to(waypoint);
        let mut speed = self.effective_speed() * pace;

        // On roads the better of the pace and road multiplier applies,
        // never both; reversing gets no road boost.
        if pace >= Fixed::ONE
            && ctx.kind_at(self.position.x, self.position.z) == crate::terrain::TerrainKind::Road
        {
            speed = self.effective_speed() * pace.max(road_factor());
        }

        // Climbing suppresses speed; anything steeper than 45 degrees
        // stops the unit until the path routes around it.
        let slope = ctx.slope_ratio(self.position.x, self.position.z, dir, WAYPOINT_TOLERANCE);
        if slope > Fixed::ONE {
            return Vec2Fixed::ZERO;
        }
        speed = speed / (Fixed::ONE + slope);

        // Heavy suppression slows movement by up to half.
        let suppression_factor =
            Fixed::ONE - self.suppression / (MORALE_MAX * Fixed::from_num(2));
        speed *= suppression_factor;

        dir.scale(speed)
    }

    /// Rotate toward the travel heading and integrate position.
    /// Vehicles translate only once roughly aligned; infantry turn
    /// freely. Reversing vehicles keep the hull faced away from travel.
    fn integrate(&mut self, dt: Fixed, ctx: &dyn Context, velocity: Vec2Fixed, reverse: bool) {
        if velocity.length_squared() == Fixed::ZERO {
            self.velocity = Vec2Fixed::ZERO;
            return;
        }

        let travel_heading = heading_of(velocity);
        let hull_target = if reverse {
            wrap_angle(travel_heading + crate::math::PI)
        } else {
            travel_heading
        };

        let alignment = match self.category {
            UnitCategory::Infantry => {
                self.yaw = hull_target;
                Fixed::ONE
            }
            UnitCategory::Vehicle | UnitCategory::Aircraft => {
                let diff = angle_diff(self.yaw, hull_target);
                let max_turn = self.effective_rotation() * dt;
                if diff.abs() <= max_turn {
                    self.yaw = hull_target;
                } else if diff > Fixed::ZERO {
                    self.yaw = wrap_angle(self.yaw + max_turn);
                } else {
                    self.yaw = wrap_angle(self.yaw - max_turn);
                }
                // Full speed when aligned, none when perpendicular.
                let remaining = angle_diff(self.yaw, hull_target).abs();
                (Fixed::ONE - remaining / crate::math::FRAC_PI_2).max(Fixed::ZERO)
            }
        };

        let applied = velocity.scale(alignment);
        self.velocity = applied;
        self.position = self.position.offset(applied.scale(dt));
        self.position.y = ctx.elevation_at(self.position.x, self.position.z);
    }

    /// Track displacement while under movement orders; when progress
    /// stalls, nudge sideways and force a replan.
    fn detect_stuck(&mut self, dt: Fixed, ctx: &mut dyn Context) {
        let moved = self.position.ground_distance_squared(self.last_position);
        let expected = self.effective_speed() * dt / Fixed::from_num(4);
        if moved < expected * expected {
            self.stuck_timer += dt;
        } else {
            self.stuck_timer = Fixed::ZERO;
        }
        self.last_position = self.position;

        if self.stuck_timer < STUCK_WINDOW {
            return;
        }
        self.stuck_timer = Fixed::ZERO;
        debug!(unit = self.id, "stuck, attempting escape");

        // Eight candidate nudges around the unit; take the first one
        // standing on passable ground reachable without climbing a
        // cliff.
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
        for (dx, dz) in DIRS {
            let dir = Vec2Fixed::new(Fixed::from_num(dx), Fixed::from_num(dz)).normalize();
            let candidate = self.position.offset(dir.scale(ESCAPE_DISTANCE));
            if ctx.kind_at(candidate.x, candidate.z).is_passable()
                && ctx.slope_ratio(self.position.x, self.position.z, dir, ESCAPE_DISTANCE)
                    <= Fixed::ONE
            {
                self.position = candidate;
                self.position.y = ctx.elevation_at(candidate.x, candidate.z);
                break;
            }
        }

        self.invalidate_path();
        self.replan_cooldown = REPLAN_COOLDOWN;
    }

    // --- combat ---

    /// Fire at `explicit` or, when `None`, at the nearest visible enemy
    /// in weapon range. Returns true if a target was engaged.
    fn scan_and_fire(&mut self, dt: Fixed, ctx: &mut dyn Context, explicit: Option<UnitId>) -> bool {
        if self.suppression >= SUPPRESSION_FIRE_BLOCK {
            return false;
        }
        let max_range = self
            .weapons
            .iter()
            .filter(|s| !s.weapon.is_smoke)
            .map(|s| s.weapon.range)
            .max()
            .unwrap_or(Fixed::ZERO);
        if max_range == Fixed::ZERO {
            return false;
        }

        let target = match explicit {
            Some(id) => ctx.unit_view(id),
            None => ctx
                .units_in_radius(self.position, max_range)
                .into_iter()
                .filter(|v| v.team != self.team && self.can_see(ctx, v))
                .min_by_key(|v| v.position.ground_distance_squared(self.position)),
        };
        let Some(target) = target else {
            return false;
        };

        let dist_sq = self.position.ground_distance_squared(target.position);
        if dist_sq > max_range * max_range {
            return false;
        }

        // Stationary units track the target with the hull.
        if self.velocity.length_squared() == Fixed::ZERO
            && self.category != UnitCategory::Infantry
        {
            let bearing = heading_of(self.position.ground_direction_to(target.position));
            let diff = angle_diff(self.yaw, bearing);
            let max_turn = self.effective_rotation() * dt;
            if diff.abs() <= max_turn {
                self.yaw = bearing;
            } else if diff > Fixed::ZERO {
                self.yaw = wrap_angle(self.yaw + max_turn);
            } else {
                self.yaw = wrap_angle(self.yaw - max_turn);
            }
        }

        let vet = self.vet_multiplier();
        let mut fired = false;
        for i in 0..self.weapons.len() {
            let (ready, range, damage, targets_top, is_smoke) = {
                let slot = &self.weapons[i];
                (
                    slot.is_ready(),
                    slot.weapon.range,
                    slot.weapon.damage,
                    slot.weapon.targets_top,
                    slot.weapon.is_smoke,
                )
            };
            if is_smoke || !ready || dist_sq > range * range {
                continue;
            }

            self.weapons[i].fire(vet);
            fired = true;

            if ctx.rng_roll() < hit_chance(dt) {
                match ctx.apply_damage(target.id, damage * vet, self.position, targets_top) {
                    Ok(outcome) => {
                        if outcome.destroyed {
                            self.record_kill();
                        }
                    }
                    Err(_) => continue,
                }
            } else {
                // Near miss still rattles the target.
                let _ = ctx.apply_suppression(target.id, damage / Fixed::from_num(2));
            }
        }

        if fired {
            // Opening fire forfeits spawn protection.
            self.spawn_protection = Fixed::ZERO;
        }
        true
    }

    /// Sight check against concealment. Units in terrain cover are only
    /// spotted at half range; a smoke screen cuts it to a quarter.
    fn can_see(&self, ctx: &dyn Context, target: &UnitView) -> bool {
        let dist_sq = self.position.ground_distance_squared(target.position);
        let mut range = self.sight_radius;
        if ctx.kind_at(target.position.x, target.position.z).is_cover() {
            range /= Fixed::from_num(2);
        }
        if target.in_smoke {
            range /= Fixed::from_num(4);
        }
        dist_sq <= range * range
    }

    fn update_attack(&mut self, dt: Fixed, ctx: &mut dyn Context, target: UnitId) {
        let Some(view) = ctx.unit_view(target) else {
            // Target destroyed or out of play.
            self.arrive();
            return;
        };

        let max_range = self
            .weapons
            .iter()
            .filter(|s| !s.weapon.is_smoke)
            .map(|s| s.weapon.range)
            .max()
            .unwrap_or(Fixed::ZERO);
        if max_range == Fixed::ZERO {
            self.arrive();
            return;
        }

        let dist_sq = self.position.ground_distance_squared(view.position);
        if dist_sq <= max_range * max_range && self.can_see(ctx, &view) {
            self.velocity = Vec2Fixed::ZERO;
            self.invalidate_path();
            self.scan_and_fire(dt, ctx, Some(target));
        } else {
            // Chase. The goal moves, so replan when it drifts far from
            // the last planned goal.
            if let Some(goal) = self.path_goal {
                if goal.ground_distance_squared(view.position)
                    > WAYPOINT_TOLERANCE * WAYPOINT_TOLERANCE
                    && self.replan_cooldown <= Fixed::ZERO
                {
                    self.invalidate_path();
                }
            }
            self.drive_toward(dt, ctx, view.position, Fixed::ONE, false);
        }
    }

    // --- garrison / transport transitions ---

    fn update_garrison_approach(&mut self, dt: Fixed, ctx: &mut dyn Context, building: BuildingId) {
        if !self.can_garrison {
            self.arrive();
            return;
        }
        let Some(pos) = ctx.building_position(building) else {
            self.arrive();
            return;
        };
        if !ctx.building_has_capacity(building) {
            self.arrive();
            return;
        }
        if self.position.ground_distance_squared(pos) <= GARRISON_RANGE * GARRISON_RANGE {
            self.velocity = Vec2Fixed::ZERO;
            self.invalidate_path();
            self.entering = Some(EntryProgress {
                target: EntryTarget::Building(building),
                remaining: self.category.entry_secs(),
            });
        } else {
            self.drive_toward(dt, ctx, pos, Fixed::ONE, false);
        }
    }

    fn update_mount_approach(&mut self, dt: Fixed, ctx: &mut dyn Context, transport: UnitId) {
        if !self.can_garrison {
            self.arrive();
            return;
        }
        let Some(view) = ctx.unit_view(transport) else {
            self.arrive();
            return;
        };
        if view.team != self.team || view.seats_free == 0 {
            self.arrive();
            return;
        }
        let reach = MOUNT_RANGE + view.radius;
        if self.position.ground_distance_squared(view.position) <= reach * reach {
            self.velocity = Vec2Fixed::ZERO;
            self.invalidate_path();
            self.entering = Some(EntryProgress {
                target: EntryTarget::Transport(transport),
                remaining: self.category.entry_secs(),
            });
        } else {
            self.drive_toward(dt, ctx, view.position, Fixed::ONE, false);
        }
    }

    fn update_entering(&mut self, dt: Fixed, ctx: &mut dyn Context, progress: EntryProgress) {
        let remaining = progress.remaining - dt;
        if remaining > Fixed::ZERO {
            self.entering = Some(EntryProgress {
                target: progress.target,
                remaining,
            });
            return;
        }
        self.entering = None;

        let result = match progress.target {
            EntryTarget::Building(building) => ctx
                .try_garrison(self.id, building)
                .map(|()| Deployment::Garrisoned(building)),
            EntryTarget::Transport(transport) => ctx
                .try_mount(self.id, transport)
                .map(|()| Deployment::Mounted(transport)),
            EntryTarget::Fortification => ctx
                .dig_in(self.id, self.position, 1)
                .map(Deployment::Garrisoned),
        };
        match result {
            Ok(deployment) => {
                self.deployment = deployment;
                self.velocity = Vec2Fixed::ZERO;
                self.commands.complete();
            }
            Err(err) => {
                // Filled up while we were climbing in.
                debug!(unit = self.id, %err, "entry failed");
                self.commands.complete();
            }
        }
    }

    fn update_garrisoned(&mut self, dt: Fixed, ctx: &mut dyn Context, building: BuildingId) {
        // Any fresh order means leaving the building first.
        let wants_out = match self.commands.current().copied() {
            None => false,
            Some(Command::Garrison(b)) if b == building => {
                self.commands.complete();
                false
            }
            Some(_) => true,
        };
        if wants_out {
            match ctx.ungarrison(self.id, building) {
                Ok(exit) => {
                    self.deployment = Deployment::Deployed;
                    self.position = exit;
                    self.position.y = ctx.elevation_at(exit.x, exit.z);
                    if matches!(self.commands.current(), Some(Command::Unload)) {
                        self.commands.complete();
                    }
                }
                Err(err) => {
                    debug!(unit = self.id, %err, "ungarrison failed");
                    self.commands.clear();
                }
            }
            return;
        }

        // Fire from the building. Garrisoned units do not move.
        self.velocity = Vec2Fixed::ZERO;
        self.scan_and_fire(dt, ctx, None);
    }

    fn update_unload(&mut self, ctx: &mut dyn Context) {
        // A transport dropping its passengers.
        let riders = std::mem::take(&mut self.passengers);
        for (seat, rider) in riders.iter().enumerate() {
            let exit = self.exit_position(seat);
            if let Err(err) = ctx.deploy_passenger(*rider, exit) {
                debug!(unit = self.id, rider, %err, "unload failed");
                continue;
            }
            // Short randomized move so the dismounts fan out from the
            // ramp instead of stacking on it.
            let half = Fixed::from_num(0.5);
            let spread = Vec2Fixed::new(
                (ctx.rng_roll() - half) * Fixed::from_num(8),
                (ctx.rng_roll() - half) * Fixed::from_num(8),
            );
            if let Err(err) = ctx.order_move(*rider, exit.offset(spread)) {
                debug!(unit = self.id, rider, %err, "spread move failed");
            }
        }
        self.velocity = Vec2Fixed::ZERO;
        self.commands.complete();
    }

    fn exit_position(&self, seat: usize) -> Vec3Fixed {
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
        let step = self.radius + Fixed::from_num(2);
        self.position.offset(Vec2Fixed::new(
            Fixed::from_num(dx) * step,
            Fixed::from_num(dz) * step,
        ))
    }

    fn update_dig_in(&mut self) {
        if !self.can_dig_in {
            self.arrive();
            return;
        }
        // Entrenching takes time; the fortification only exists once the
        // timer runs out.
        self.velocity = Vec2Fixed::ZERO;
        self.invalidate_path();
        self.entering = Some(EntryProgress {
            target: EntryTarget::Fortification,
            remaining: DIG_IN_SECS,
        });
    }

    // --- hooks for the battle world ---

    /// Seat a passenger on this transport. Called by the world after the
    /// passenger's mount transition succeeds.
    pub fn add_passenger(&mut self, rider: UnitId) -> crate::Result<()> {
        if self.passengers.len() >= usize::from(self.transport_capacity) {
            return Err(crate::SimError::InvalidState(format!(
                "transport {} is full",
                self.id
            )));
        }
        self.passengers.push(rider);
        Ok(())
    }

    /// Place this unit back on the field at `at` (transport unload or
    /// building exit performed by someone else).
    pub fn deploy_at(&mut self, at: Vec3Fixed) {
        self.deployment = Deployment::Deployed;
        self.position = at;
        self.velocity = Vec2Fixed::ZERO;
        self.invalidate_path();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::DamageOutcome;
    use crate::data::UnitCatalog;
    use crate::rng::SimRng;
    use crate::terrain::{HeightMap, Terrain, TerrainKind};

    fn fx(n: f64) -> Fixed {
        Fixed::from_num(n)
    }

    fn pos(x: f64, z: f64) -> Vec3Fixed {
        Vec3Fixed::new(fx(x), Fixed::ZERO, fx(z))
    }

    /// World stand-in for exercising units in isolation.
    struct MockContext {
        terrain: HeightMap,
        others: Vec<UnitView>,
        damage_calls: Vec<(UnitId, Fixed)>,
        suppression_calls: Vec<(UnitId, Fixed)>,
        deployed: Vec<(UnitId, Vec3Fixed)>,
        garrisoned: Vec<(UnitId, BuildingId)>,
        mounted: Vec<(UnitId, UnitId)>,
        move_orders: Vec<(UnitId, Vec3Fixed)>,
        building_pos: Option<Vec3Fixed>,
        destroy_on_hit: bool,
        rng: SimRng,
        force_roll: Option<Fixed>,
    }

    impl MockContext {
        fn flat() -> Self {
            Self {
                terrain: HeightMap::flat(50, 50, fx(4.0)),
                others: Vec::new(),
                damage_calls: Vec::new(),
                suppression_calls: Vec::new(),
                deployed: Vec::new(),
                garrisoned: Vec::new(),
                mounted: Vec::new(),
                move_orders: Vec::new(),
                building_pos: None,
                destroy_on_hit: false,
                rng: SimRng::new(42),
                force_roll: None,
            }
        }

        fn with_enemy(mut self, id: UnitId, at: Vec3Fixed) -> Self {
            self.others.push(UnitView {
                id,
                team: 2,
                position: at,
                velocity: Vec2Fixed::ZERO,
                radius: Fixed::ONE,
                yaw: Fixed::ZERO,
                category: UnitCategory::Infantry,
                is_commander: false,
                is_routing: false,
                in_smoke: false,
                seats_free: 0,
            });
            self.others.sort_by_key(|v| v.id);
            self
        }
    }

    impl Context for MockContext {
        fn tick(&self) -> u64 {
            0
        }

        fn elevation_at(&self, x: Fixed, z: Fixed) -> Fixed {
            self.terrain.elevation_at(x, z)
        }

        fn kind_at(&self, x: Fixed, z: Fixed) -> TerrainKind {
            self.terrain.kind_at(x, z)
        }

        fn slope_ratio(&self, x: Fixed, z: Fixed, dir: Vec2Fixed, lookahead: Fixed) -> Fixed {
            self.terrain.slope_ratio(x, z, dir, lookahead)
        }

        fn path_budget_available(&self) -> bool {
            true
        }

        fn find_path(&mut self, _start: Vec3Fixed, goal: Vec3Fixed) -> Option<Vec<Vec3Fixed>> {
            Some(vec![goal])
        }

        fn find_nearest_reachable(
            &mut self,
            _start: Vec3Fixed,
            goal: Vec3Fixed,
        ) -> Option<Vec3Fixed> {
            Some(goal)
        }

        fn units_in_radius(&self, center: Vec3Fixed, radius: Fixed) -> Vec<UnitView> {
            self.others
                .iter()
                .filter(|v| v.position.ground_distance_squared(center) <= radius * radius)
                .copied()
                .collect()
        }

        fn unit_view(&self, id: UnitId) -> Option<UnitView> {
            self.others.iter().find(|v| v.id == id).copied()
        }

        fn apply_damage(
            &mut self,
            target: UnitId,
            damage: Fixed,
            _from: Vec3Fixed,
            _targets_top: bool,
        ) -> crate::Result<DamageOutcome> {
            self.damage_calls.push((target, damage));
            Ok(DamageOutcome {
                destroyed: self.destroy_on_hit,
            })
        }

        fn apply_suppression(&mut self, target: UnitId, amount: Fixed) -> crate::Result<()> {
            self.suppression_calls.push((target, amount));
            Ok(())
        }

        fn building_position(&self, _id: BuildingId) -> Option<Vec3Fixed> {
            self.building_pos
        }

        fn nearest_building(&self, position: Vec3Fixed, max_radius: Fixed) -> Option<BuildingId> {
            self.building_pos
                .filter(|p| p.ground_distance_squared(position) <= max_radius * max_radius)
                .map(|_| 7)
        }

        fn building_has_capacity(&self, _id: BuildingId) -> bool {
            true
        }

        fn try_garrison(&mut self, unit: UnitId, building: BuildingId) -> crate::Result<()> {
            self.garrisoned.push((unit, building));
            Ok(())
        }

        fn ungarrison(&mut self, _unit: UnitId, building: BuildingId) -> crate::Result<Vec3Fixed> {
            let base = self.building_pos.unwrap_or(Vec3Fixed::ZERO);
            let _ = building;
            Ok(base.offset(Vec2Fixed::new(fx(5.0), Fixed::ZERO)))
        }

        fn dig_in(
            &mut self,
            unit: UnitId,
            _position: Vec3Fixed,
            _capacity: u8,
        ) -> crate::Result<BuildingId> {
            self.garrisoned.push((unit, 99));
            Ok(99)
        }

        fn try_mount(&mut self, passenger: UnitId, transport: UnitId) -> crate::Result<()> {
            self.mounted.push((passenger, transport));
            Ok(())
        }

        fn deploy_passenger(&mut self, passenger: UnitId, at: Vec3Fixed) -> crate::Result<()> {
            self.deployed.push((passenger, at));
            Ok(())
        }

        fn order_move(&mut self, unit: UnitId, to: Vec3Fixed) -> crate::Result<()> {
            self.move_orders.push((unit, to));
            Ok(())
        }

        fn rng_roll(&mut self) -> Fixed {
            self.force_roll.unwrap_or_else(|| self.rng.next_fixed())
        }
    }

    fn rifle_squad(id: UnitId, team: u8, at: Vec3Fixed) -> Unit {
        let catalog = UnitCatalog::builtin();
        let mut unit = Unit::from_data(id, team, catalog.get("rifle_squad").unwrap(), at);
        unit.spawn_protection = Fixed::ZERO;
        unit
    }

    fn truck(id: UnitId, team: u8, at: Vec3Fixed) -> Unit {
        let catalog = UnitCatalog::builtin();
        let mut unit = Unit::from_data(id, team, catalog.get("transport_truck").unwrap(), at);
        unit.spawn_protection = Fixed::ZERO;
        unit
    }

    const DT: f64 = 0.25;

    #[test]
    fn test_move_command_reaches_destination() {
        let mut ctx = MockContext::flat();
        let mut unit = rifle_squad(1, 1, pos(10.0, 10.0));
        unit.give_command(Command::Move(pos(40.0, 10.0)));

        for _ in 0..100 {
            unit.fixed_update(fx(DT), &mut ctx);
            if unit.commands().is_idle() {
                break;
            }
        }
        assert!(unit.commands().is_idle());
        assert!(unit.position.ground_distance(pos(40.0, 10.0)) <= fx(1.0));
    }

    #[test]
    fn test_spawn_protection_blocks_damage() {
        let mut unit = rifle_squad(1, 1, pos(10.0, 10.0));
        unit.spawn_protection = fx(5.0);
        unit.take_damage(fx(50.0));
        assert_eq!(unit.health, unit.max_health());

        unit.spawn_protection = Fixed::ZERO;
        unit.take_damage(fx(50.0));
        assert!(unit.health < unit.max_health());
    }

    #[test]
    fn test_damage_shakes_morale_and_suppresses() {
        let mut unit = rifle_squad(1, 1, pos(10.0, 10.0));
        unit.take_damage(fx(20.0));
        assert_eq!(unit.suppression, fx(20.0));
        assert_eq!(unit.morale, fx(90.0));
    }

    #[test]
    fn test_morale_threshold_events_fire_once() {
        let mut unit = rifle_squad(1, 1, pos(10.0, 10.0));
        unit.shift_morale(fx(-55.0));
        unit.shift_morale(fx(-30.0));
        let events = unit.drain_events();
        assert!(events.contains(&UnitEvent::MoraleLow));
        assert!(events.contains(&UnitEvent::MoraleCritical));

        // No repeat on further drops above zero.
        unit.shift_morale(fx(-5.0));
        assert!(unit.drain_events().is_empty());
    }

    #[test]
    fn test_rout_and_recovery() {
        let mut unit = rifle_squad(1, 1, pos(10.0, 10.0));
        unit.give_command(Command::Move(pos(40.0, 10.0)));
        unit.shift_morale(fx(-100.0));
        assert!(unit.is_routing());
        assert!(unit.commands().is_idle());
        assert!(unit.drain_events().contains(&UnitEvent::RoutStarted));

        unit.shift_morale(fx(25.0));
        assert!(unit.is_routing());
        unit.shift_morale(fx(10.0));
        assert!(!unit.is_routing());
        assert!(unit.drain_events().contains(&UnitEvent::RoutRecovered));
    }

    #[test]
    fn test_routing_unit_flees_from_enemies() {
        let mut ctx = MockContext::flat().with_enemy(2, pos(20.0, 10.0));
        let mut unit = rifle_squad(1, 1, pos(10.0, 10.0));
        unit.shift_morale(fx(-100.0));

        let before = unit.position;
        for _ in 0..4 {
            unit.fixed_update(fx(DT), &mut ctx);
        }
        // Fled along -x, away from the enemy at +x.
        assert!(unit.position.x < before.x);
    }

    #[test]
    fn test_routing_unit_recovers_faster_in_cover() {
        let mut cover_ctx = MockContext::flat();
        cover_ctx
            .terrain
            .set_kind(fx(10.0), fx(10.0), TerrainKind::Forest);
        let mut sheltered = rifle_squad(1, 1, pos(10.0, 10.0));
        sheltered.shift_morale(fx(-100.0));

        let mut open_ctx = MockContext::flat().with_enemy(2, pos(20.0, 10.0));
        let mut exposed = rifle_squad(3, 1, pos(10.0, 10.0));
        exposed.shift_morale(fx(-100.0));

        for _ in 0..8 {
            sheltered.fixed_update(fx(DT), &mut cover_ctx);
            exposed.fixed_update(fx(DT), &mut open_ctx);
        }
        assert!(sheltered.morale > exposed.morale);
    }

    #[test]
    fn test_routing_unit_angles_toward_building() {
        let mut ctx = MockContext::flat().with_enemy(2, pos(20.0, 10.0));
        ctx.building_pos = Some(pos(6.0, 18.0));
        let mut unit = rifle_squad(1, 1, pos(10.0, 10.0));
        unit.shift_morale(fx(-100.0));

        let before = unit.position;
        for _ in 0..4 {
            unit.fixed_update(fx(DT), &mut ctx);
        }
        // Still away from the enemy, but bent toward the shelter.
        assert!(unit.position.x < before.x);
        assert!(unit.position.z > before.z);
    }

    #[test]
    fn test_road_overtake_shifts_lane() {
        let mut ctx = MockContext::flat();
        ctx.terrain.set_kind(fx(10.0), fx(10.0), TerrainKind::Road);
        let unit = rifle_squad(1, 1, pos(10.0, 10.0));
        let desired = Vec2Fixed::new(fx(9.0), Fixed::ZERO);
        let slow_friend = UnitView {
            id: 2,
            team: 1,
            position: pos(18.0, 10.0),
            velocity: Vec2Fixed::ZERO,
            radius: Fixed::ONE,
            yaw: Fixed::ZERO,
            category: UnitCategory::Infantry,
            is_commander: false,
            is_routing: false,
            in_smoke: false,
            seats_free: 0,
        };

        let biased = unit.overtake_bias(&ctx, desired, &[slow_friend]);
        assert!(biased.z > Fixed::ZERO);
        assert!(biased.x > Fixed::ZERO);

        // No lane shift off the road.
        let open = MockContext::flat();
        let unbiased = unit.overtake_bias(&open, desired, &[slow_friend]);
        assert_eq!(unbiased, desired);
    }

    #[test]
    fn test_identity_defaults_from_catalog() {
        let catalog = UnitCatalog::builtin();
        let data = catalog.get("rifle_squad").unwrap();
        let unit = Unit::from_data(4, 2, data, pos(10.0, 10.0));
        assert_eq!(unit.player, unit.team);
        assert_eq!(unit.name, data.name);
        assert_eq!(unit.type_id, data.id);
    }

    #[test]
    fn test_suppression_blocks_fire() {
        let mut ctx = MockContext::flat().with_enemy(2, pos(20.0, 10.0));
        ctx.force_roll = Some(Fixed::ZERO);
        let mut unit = rifle_squad(1, 1, pos(10.0, 10.0));
        unit.suppression = fx(90.0);

        unit.fixed_update(fx(DT), &mut ctx);
        assert!(ctx.damage_calls.is_empty());
        assert!(ctx.suppression_calls.is_empty());
    }

    #[test]
    fn test_idle_unit_engages_nearby_enemy() {
        let mut ctx = MockContext::flat().with_enemy(2, pos(20.0, 10.0));
        ctx.force_roll = Some(Fixed::ZERO);
        let mut unit = rifle_squad(1, 1, pos(10.0, 10.0));

        unit.fixed_update(fx(DT), &mut ctx);
        assert_eq!(ctx.damage_calls.len(), 1);
        assert_eq!(ctx.damage_calls[0].0, 2);
    }

    #[test]
    fn test_kills_grant_veterancy_with_heal_and_morale() {
        let mut ctx = MockContext::flat().with_enemy(2, pos(20.0, 10.0));
        ctx.force_roll = Some(Fixed::ZERO);
        ctx.destroy_on_hit = true;
        let mut unit = rifle_squad(1, 1, pos(10.0, 10.0));
        unit.health = fx(40.0);
        unit.morale = fx(60.0);

        for _ in 0..200 {
            unit.fixed_update(fx(DT), &mut ctx);
            if unit.kills >= 3 {
                break;
            }
        }
        assert_eq!(unit.veterancy, 1);
        // 20% of 80 max health healed.
        assert_eq!(unit.health, fx(56.0));
        assert!(unit.drain_events().contains(&UnitEvent::VeterancyGained(1)));
    }

    #[test]
    fn test_miss_applies_suppression_to_target() {
        let mut ctx = MockContext::flat().with_enemy(2, pos(20.0, 10.0));
        ctx.force_roll = Some(Fixed::ONE); // always miss
        let mut unit = rifle_squad(1, 1, pos(10.0, 10.0));

        unit.fixed_update(fx(DT), &mut ctx);
        assert!(ctx.damage_calls.is_empty());
        assert_eq!(ctx.suppression_calls.len(), 1);
        assert_eq!(ctx.suppression_calls[0].0, 2);
    }

    #[test]
    fn test_garrison_command_enters_building() {
        let mut ctx = MockContext::flat();
        ctx.building_pos = Some(pos(14.0, 10.0));
        let mut unit = rifle_squad(1, 1, pos(10.0, 10.0));
        unit.give_command(Command::Garrison(7));

        for _ in 0..20 {
            unit.fixed_update(fx(DT), &mut ctx);
            if !unit.is_deployed() {
                break;
            }
        }
        assert_eq!(unit.deployment, Deployment::Garrisoned(7));
        assert_eq!(ctx.garrisoned, vec![(1, 7)]);
        assert!(unit.commands().is_idle());
    }

    #[test]
    fn test_garrisoned_unit_leaves_on_new_order() {
        let mut ctx = MockContext::flat();
        ctx.building_pos = Some(pos(14.0, 10.0));
        let mut unit = rifle_squad(1, 1, pos(14.0, 10.0));
        unit.deployment = Deployment::Garrisoned(7);

        unit.give_command(Command::Move(pos(40.0, 10.0)));
        unit.fixed_update(fx(DT), &mut ctx);
        assert!(unit.is_deployed());
        assert_eq!(unit.position.ground(), Vec2Fixed::new(fx(19.0), fx(10.0)));
        // The move order is still pending.
        assert!(!unit.commands().is_idle());
    }

    #[test]
    fn test_transport_unloads_passengers() {
        let mut ctx = MockContext::flat();
        let mut transport = truck(1, 1, pos(10.0, 10.0));
        transport.add_passenger(5).unwrap();
        transport.add_passenger(6).unwrap();
        transport.give_command(Command::Unload);

        transport.fixed_update(fx(DT), &mut ctx);
        assert!(transport.passengers.is_empty());
        assert_eq!(ctx.deployed.len(), 2);
        assert_eq!(ctx.deployed[0].0, 5);
        // Each dismount was handed a short spread move.
        assert_eq!(ctx.move_orders.len(), 2);
        assert_eq!(ctx.move_orders[0].0, 5);
        assert!(transport.commands().is_idle());
    }

    #[test]
    fn test_transport_capacity_enforced() {
        let mut transport = truck(1, 1, pos(10.0, 10.0));
        for rider in 0..8 {
            transport.add_passenger(rider).unwrap();
        }
        assert!(transport.add_passenger(9).is_err());
    }

    #[test]
    fn test_mount_command_boards_transport() {
        let mut ctx = MockContext::flat();
        ctx.others.push(UnitView {
            id: 9,
            team: 1,
            position: pos(13.0, 10.0),
            velocity: Vec2Fixed::ZERO,
            radius: fx(2.0),
            yaw: Fixed::ZERO,
            category: UnitCategory::Vehicle,
            is_commander: false,
            is_routing: false,
            in_smoke: false,
            seats_free: 8,
        });
        let mut unit = rifle_squad(1, 1, pos(10.0, 10.0));
        unit.give_command(Command::Mount(9));

        for _ in 0..20 {
            unit.fixed_update(fx(DT), &mut ctx);
            if !unit.is_deployed() {
                break;
            }
        }
        assert_eq!(unit.deployment, Deployment::Mounted(9));
        assert_eq!(ctx.mounted, vec![(1, 9)]);
    }

    #[test]
    fn test_dig_in_takes_time_then_spawns_fortification() {
        let mut ctx = MockContext::flat();
        let mut unit = rifle_squad(1, 1, pos(10.0, 10.0));
        unit.give_command(Command::DigIn);

        // Entrenching is not instant; after one tick the squad is still
        // on the field with no fortification placed.
        unit.fixed_update(fx(DT), &mut ctx);
        assert!(unit.is_deployed());
        assert!(ctx.garrisoned.is_empty());

        for _ in 0..20 {
            unit.fixed_update(fx(DT), &mut ctx);
            if !unit.is_deployed() {
                break;
            }
        }
        assert_eq!(unit.deployment, Deployment::Garrisoned(99));
        assert_eq!(ctx.garrisoned, vec![(1, 99)]);
        assert!(unit.commands().is_idle());
    }

    #[test]
    fn test_commander_aura_restores_morale_faster() {
        let mut ctx = MockContext::flat();
        ctx.others.push(UnitView {
            id: 3,
            team: 1,
            position: pos(20.0, 10.0),
            velocity: Vec2Fixed::ZERO,
            radius: fx(2.0),
            yaw: Fixed::ZERO,
            category: UnitCategory::Vehicle,
            is_commander: true,
            is_routing: false,
            in_smoke: false,
            seats_free: 0,
        });
        let mut near = rifle_squad(1, 1, pos(10.0, 10.0));
        near.morale = fx(50.0);
        let mut far = rifle_squad(2, 1, pos(150.0, 150.0));
        far.morale = fx(50.0);

        near.fixed_update(fx(DT), &mut ctx);
        let mut far_ctx = MockContext::flat();
        far.fixed_update(fx(DT), &mut far_ctx);
        assert!(near.morale > far.morale);
    }

    #[test]
    fn test_firing_ends_spawn_protection() {
        let mut ctx = MockContext::flat().with_enemy(2, pos(20.0, 10.0));
        ctx.force_roll = Some(Fixed::ONE);
        let catalog = UnitCatalog::builtin();
        let mut unit = Unit::from_data(1, 1, catalog.get("rifle_squad").unwrap(), pos(10.0, 10.0));
        assert!(unit.is_protected());

        unit.fixed_update(fx(DT), &mut ctx);
        assert!(!unit.is_protected());
    }

    #[test]
    fn test_unit_state_survives_snapshot() {
        let mut unit = rifle_squad(1, 1, pos(10.0, 10.0));
        unit.yaw = fx(1.25);
        unit.health = fx(33.5);
        unit.morale = fx(61.0);
        unit.suppression = fx(12.5);
        unit.veterancy = 1;
        unit.give_command(Command::DigIn);
        unit.update_dig_in();

        let bytes = bincode::serialize(&unit).unwrap();
        let restored: Unit = bincode::deserialize(&bytes).unwrap();
        assert_eq!(restored.yaw, unit.yaw);
        assert_eq!(restored.health, unit.health);
        assert_eq!(restored.morale, unit.morale);
        assert_eq!(restored.suppression, unit.suppression);
        assert_eq!(restored.veterancy, unit.veterancy);
        assert_eq!(restored.entering, unit.entering);
        assert_eq!(restored.max_speed, unit.max_speed);
    }

    #[test]
    fn test_veterancy_quickens_movement() {
        let mut rookie_ctx = MockContext::flat();
        let mut rookie = rifle_squad(1, 1, pos(10.0, 10.0));
        rookie.give_command(Command::Move(pos(40.0, 10.0)));

        let mut vet_ctx = MockContext::flat();
        let mut vet = rifle_squad(2, 1, pos(10.0, 10.0));
        vet.veterancy = 2;
        vet.give_command(Command::Move(pos(40.0, 10.0)));

        for _ in 0..8 {
            rookie.fixed_update(fx(DT), &mut rookie_ctx);
            vet.fixed_update(fx(DT), &mut vet_ctx);
        }
        assert!(vet.position.x > rookie.position.x);
    }

    #[test]
    fn test_smoke_conceals_target_from_fire() {
        let mut ctx = MockContext::flat();
        ctx.force_roll = Some(Fixed::ZERO);
        ctx.others.push(UnitView {
            id: 2,
            team: 2,
            position: pos(40.0, 10.0),
            velocity: Vec2Fixed::ZERO,
            radius: Fixed::ONE,
            yaw: Fixed::ZERO,
            category: UnitCategory::Infantry,
            is_commander: false,
            is_routing: false,
            in_smoke: true,
            seats_free: 0,
        });
        let mut unit = rifle_squad(1, 1, pos(10.0, 10.0));
        unit.fixed_update(fx(DT), &mut ctx);
        assert!(ctx.damage_calls.is_empty());
        assert!(ctx.suppression_calls.is_empty());

        // The same target without the screen gets engaged.
        let mut clear_ctx = MockContext::flat().with_enemy(2, pos(40.0, 10.0));
        clear_ctx.force_roll = Some(Fixed::ZERO);
        let mut shooter = rifle_squad(3, 1, pos(10.0, 10.0));
        shooter.fixed_update(fx(DT), &mut clear_ctx);
        assert_eq!(clear_ctx.damage_calls.len(), 1);
    }

    #[test]
    fn test_vehicle_pops_smoke_when_routing() {
        let catalog = UnitCatalog::builtin();
        let mut tank = Unit::from_data(1, 1, catalog.get("medium_tank").unwrap(), pos(10.0, 10.0));
        tank.shift_morale(fx(-100.0));
        assert!(tank.is_routing());
        assert!(tank.in_smoke());
        assert!(tank.view().in_smoke);

        // Infantry carry no smoke and rout uncovered.
        let mut squad = rifle_squad(2, 1, pos(10.0, 10.0));
        squad.shift_morale(fx(-100.0));
        assert!(!squad.in_smoke());
    }

    #[test]
    fn test_flee_runs_from_enemy_centroid() {
        let mut ctx = MockContext::flat()
            .with_enemy(2, pos(20.0, 10.0))
            .with_enemy(3, pos(10.0, 20.0));
        let mut unit = rifle_squad(1, 1, pos(10.0, 10.0));
        unit.shift_morale(fx(-100.0));

        for _ in 0..4 {
            unit.fixed_update(fx(DT), &mut ctx);
        }
        // Fleeing the nearest enemy alone would leave one axis pinned;
        // the centroid sends the unit diagonally away from both.
        assert!(unit.position.x < fx(10.0));
        assert!(unit.position.z < fx(10.0));
    }

    #[test]
    fn test_stuck_escape_avoids_cliffs() {
        let mut ctx = MockContext::flat();
        // Cliffs ahead of the move and on every flank except due west.
        ctx.terrain.set_elevation(fx(13.0), fx(10.0), fx(100.0));
        ctx.terrain.set_elevation(fx(13.0), fx(13.0), fx(100.0));
        ctx.terrain.set_elevation(fx(10.0), fx(13.0), fx(100.0));
        ctx.terrain.set_elevation(fx(6.0), fx(13.0), fx(100.0));
        let mut unit = rifle_squad(1, 1, pos(10.0, 10.0));
        unit.give_command(Command::Move(pos(30.0, 10.0)));

        for _ in 0..2 {
            unit.fixed_update(fx(DT), &mut ctx);
        }
        // The escape nudge skipped the climbable-looking cells on the
        // cliff and landed on the flat ground to the west.
        assert_eq!(unit.position.x, fx(5.0));
        assert_eq!(unit.position.z, fx(10.0));
        assert_eq!(unit.position.y, Fixed::ZERO);
    }

    #[test]
    fn test_road_speed_uses_single_multiplier() {
        let mut ctx = MockContext::flat();
        ctx.terrain.set_kind(fx(10.0), fx(10.0), TerrainKind::Road);
        let unit = rifle_squad(1, 1, pos(10.0, 10.0));

        // Fast pace and the road bonus do not stack; the better of the
        // two applies.
        let fast = unit.desired_velocity(&ctx, pos(30.0, 10.0), road_factor());
        assert_eq!(fast, Vec2Fixed::new(fx(9.0), Fixed::ZERO));
        let normal = unit.desired_velocity(&ctx, pos(30.0, 10.0), Fixed::ONE);
        assert_eq!(normal, Vec2Fixed::new(fx(9.0), Fixed::ZERO));

        // Reversing gets no road boost at all.
        let reversing = unit.desired_velocity(&ctx, pos(30.0, 10.0), reverse_factor());
        assert_eq!(
            reversing,
            Vec2Fixed::new(fx(6.0) * reverse_factor(), Fixed::ZERO)
        );
    }
}
