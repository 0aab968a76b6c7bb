//! Combat resolution building blocks.
//!
//! Armor is per facing; damage mitigation is a simple diminishing
//! curve on the facing's armor value. Hit resolution is a dt-scaled
//! probability with a fixed rate constant - a deliberate placeholder
//! for a full accuracy/penetration model, reproduced as-is because
//! changing it changes observable balance.

use serde::{Deserialize, Serialize};

use crate::data::WeaponData;
use crate::math::{fixed_serde, Fixed, FRAC_PI_2, PI};

/// Upper bound for morale and suppression.
pub const MORALE_MAX: Fixed = Fixed::const_from_int(100);

/// Morale threshold below which a `MoraleLow` event fires.
pub const MORALE_LOW: Fixed = Fixed::const_from_int(50);

/// Morale threshold below which a `MoraleCritical` event fires.
pub const MORALE_CRITICAL: Fixed = Fixed::const_from_int(20);

/// Morale level at which a routing unit rallies.
pub const ROUT_RECOVER_MORALE: Fixed = Fixed::const_from_int(30);

/// Extra morale per second for a routing unit that is in cover or out
/// of enemy sight.
pub const ROUT_SHELTER_RECOVERY_PER_SEC: Fixed = Fixed::const_from_int(2);

/// Suppression level at or above which a unit cannot fire.
pub const SUPPRESSION_FIRE_BLOCK: Fixed = Fixed::const_from_int(80);

/// Base suppression recovery per second (scaled up by veterancy).
pub const SUPPRESSION_RECOVERY_PER_SEC: Fixed = Fixed::const_from_int(5);

/// Commander aura scan radius in world units.
pub const COMMANDER_SCAN_RADIUS: Fixed = Fixed::const_from_int(100);

/// Morale restored per second while inside a commander aura.
pub const AURA_MORALE_PER_SEC: Fixed = Fixed::const_from_int(2);

/// Hit probability per second of continuous fire.
pub const HIT_RATE_PER_SEC: Fixed = Fixed::const_from_int(2);

/// Spawn protection window in seconds. Forfeited early the moment the
/// unit opens fire; a protected unit cannot shoot with impunity.
pub const SPAWN_PROTECTION_SECS: Fixed = Fixed::const_from_int(5);

/// Kill counts unlocking veterancy tiers 1 and 2.
pub const VETERANCY_THRESHOLDS: [u32; 2] = [3, 7];

/// Fraction of max health healed on gaining a tier (20%).
pub const VETERANCY_HEAL_NUM: Fixed = Fixed::const_from_int(1);
/// Denominator of the veterancy heal fraction.
pub const VETERANCY_HEAL_DEN: Fixed = Fixed::const_from_int(5);

/// Morale restored on gaining a tier.
pub const VETERANCY_MORALE_BONUS: Fixed = Fixed::const_from_int(30);

/// Armor facing hit by incoming fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArmorFacing {
    /// Frontal arc (within 45 degrees of the hull heading).
    Front,
    /// Side arcs.
    Side,
    /// Rear arc (within 45 degrees of directly behind).
    Rear,
    /// Top armor (artillery and strike aircraft collaborators).
    Top,
}

/// Armor values per facing, from the unit-type catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ArmorProfile {
    /// Frontal armor.
    pub front: u16,
    /// Side armor.
    pub side: u16,
    /// Rear armor.
    pub rear: u16,
    /// Top armor.
    pub top: u16,
}

impl ArmorProfile {
    /// Armor value for a facing.
    #[must_use]
    pub const fn value(&self, facing: ArmorFacing) -> u16 {
        match facing {
            ArmorFacing::Front => self.front,
            ArmorFacing::Side => self.side,
            ArmorFacing::Rear => self.rear,
            ArmorFacing::Top => self.top,
        }
    }

    /// Mitigate incoming damage against a facing.
    ///
    /// Diminishing curve: effective = amount * 10 / (10 + armor).
    /// Zero armor passes damage through unchanged.
    #[must_use]
    pub fn mitigate(&self, amount: Fixed, facing: ArmorFacing) -> Fixed {
        let armor = Fixed::from_num(self.value(facing));
        let ten = Fixed::from_num(10);
        amount * ten / (ten + armor)
    }
}

/// Classify which facing an attack from `relative_angle` strikes.
///
/// `relative_angle` is the wrapped angle between the attack's incoming
/// bearing (target to attacker) and the target's hull heading.
#[must_use]
pub fn facing_from_angle(relative_angle: Fixed) -> ArmorFacing {
    let abs = relative_angle.abs();
    let quarter = FRAC_PI_2 / Fixed::from_num(2); // 45 degrees
    if abs <= quarter {
        ArmorFacing::Front
    } else if abs >= PI - quarter {
        ArmorFacing::Rear
    } else {
        ArmorFacing::Side
    }
}

/// Runtime state of one weapon slot: catalog stats plus ammo and
/// cooldown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeaponSlot {
    /// Catalog stats for this weapon.
    pub weapon: WeaponData,
    /// Rounds remaining. Never exceeds `weapon.ammo_capacity`.
    pub ammo: u32,
    /// Seconds until the weapon can fire again.
    #[serde(with = "fixed_serde")]
    pub cooldown: Fixed,
}

impl WeaponSlot {
    /// Create a slot at full ammo, ready to fire.
    #[must_use]
    pub fn new(weapon: WeaponData) -> Self {
        let ammo = weapon.ammo_capacity;
        Self {
            weapon,
            ammo,
            cooldown: Fixed::ZERO,
        }
    }

    /// Whether this slot has ammo and its cooldown has elapsed.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ammo > 0 && self.cooldown <= Fixed::ZERO
    }

    /// Cooldown between shots: `60 / rounds_per_minute`, shortened by
    /// the unit's veterancy fire-rate multiplier.
    #[must_use]
    pub fn cooldown_secs(&self, fire_rate_multiplier: Fixed) -> Fixed {
        let base = Fixed::from_num(60) / Fixed::from_num(self.weapon.rounds_per_minute.max(1));
        base / fire_rate_multiplier
    }

    /// Consume a round and restart the cooldown. Call only when
    /// [`Self::is_ready`].
    pub fn fire(&mut self, fire_rate_multiplier: Fixed) {
        self.ammo = self.ammo.saturating_sub(1);
        self.cooldown = self.cooldown_secs(fire_rate_multiplier);
    }

    /// Advance the cooldown timer.
    pub fn tick(&mut self, dt: Fixed) {
        if self.cooldown > Fixed::ZERO {
            self.cooldown -= dt;
        }
    }

    /// Resupply up to capacity.
    pub fn resupply(&mut self, rounds: u32) {
        self.ammo = (self.ammo + rounds).min(self.weapon.ammo_capacity);
    }
}

/// Veterancy tier (0..=2) for a kill count. Thresholds: 3 and 7 kills.
#[must_use]
pub fn veterancy_for_kills(kills: u32) -> u8 {
    VETERANCY_THRESHOLDS
        .iter()
        .filter(|&&t| kills >= t)
        .count() as u8
}

/// Multiplicative stat bonus for one veterancy tier crossing (+10%).
#[must_use]
pub fn veterancy_step_multiplier() -> Fixed {
    Fixed::ONE + Fixed::ONE / Fixed::from_num(10)
}

/// Probability that a shot connects during a tick of length `dt`.
#[must_use]
pub fn hit_chance(dt: Fixed) -> Fixed {
    let chance = HIT_RATE_PER_SEC * dt;
    if chance > Fixed::ONE {
        Fixed::ONE
    } else {
        chance
    }
}
