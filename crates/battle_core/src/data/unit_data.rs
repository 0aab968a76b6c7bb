//! Unit data structures for data-driven unit definitions.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::combat::ArmorProfile;
use crate::error::{Result, SimError};
use crate::math::{fixed_serde, Fixed};

/// Broad mobility class of a unit type.
///
/// Drives garrison entry times, road behavior, and which weapons can
/// target the unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnitCategory {
    /// Foot soldiers. Can garrison buildings and ride transports.
    Infantry,
    /// Ground vehicles. Use road lanes and reverse movement.
    Vehicle,
    /// Aircraft. Ignore ground obstacles and slopes.
    Aircraft,
}

impl UnitCategory {
    /// Seconds taken to enter a building or transport.
    #[must_use]
    pub fn entry_secs(self) -> Fixed {
        match self {
            Self::Infantry => Fixed::from_num(1),
            Self::Vehicle | Self::Aircraft => Fixed::from_num(3),
        }
    }
}

/// Catalog statistics for one weapon.
///
/// # Example RON
///
/// ```ron
/// WeaponData(
///     name: "75mm cannon",
///     damage: 128849018880,  // Fixed-point for 30.0
///     range: 515396075520,   // Fixed-point for 120.0
///     rounds_per_minute: 30,
///     ammo_capacity: 40,
///     targets_top: false,
///     is_smoke: false,
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeaponData {
    /// Display name.
    pub name: String,

    /// Damage per hit, before armor mitigation (fixed-point).
    #[serde(with = "fixed_serde")]
    pub damage: Fixed,

    /// Maximum engagement range in world units (fixed-point).
    #[serde(with = "fixed_serde")]
    pub range: Fixed,

    /// Sustained rate of fire.
    pub rounds_per_minute: u32,

    /// Rounds carried at spawn.
    pub ammo_capacity: u32,

    /// Whether hits strike top armor instead of a hull facing.
    #[serde(default)]
    pub targets_top: bool,

    /// Smoke discharger: obscures instead of damaging.
    #[serde(default)]
    pub is_smoke: bool,
}

/// Data-driven unit type definition.
///
/// Defines all properties of a unit type loadable from RON. One entry
/// per type in the [`UnitCatalog`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitData {
    /// Unique string identifier for this unit type.
    pub id: String,

    /// Localization key for the unit's display name.
    pub name: String,

    /// Mobility class.
    pub category: UnitCategory,

    /// Maximum health points (fixed-point).
    #[serde(with = "fixed_serde")]
    pub max_health: Fixed,

    /// Top movement speed in world units per second (fixed-point).
    #[serde(with = "fixed_serde")]
    pub max_speed: Fixed,

    /// Maximum turn rate in radians per second (fixed-point).
    #[serde(with = "fixed_serde")]
    pub rotation_rate: Fixed,

    /// Collision radius in world units (fixed-point).
    #[serde(with = "fixed_serde")]
    pub radius: Fixed,

    /// Sight radius in world units (fixed-point).
    #[serde(with = "fixed_serde")]
    pub sight_radius: Fixed,

    /// Per-facing armor.
    #[serde(default)]
    pub armor: ArmorProfile,

    /// Weapons carried, in priority order. Empty for non-combatants.
    #[serde(default)]
    pub weapons: Vec<WeaponData>,

    /// Passenger seats if this type is a transport.
    #[serde(default)]
    pub transport_capacity: u8,

    /// Whether this type can enter buildings and transports.
    #[serde(default)]
    pub can_garrison: bool,

    /// Whether this type can entrench in place.
    #[serde(default)]
    pub can_dig_in: bool,

    /// Commander unit: projects a morale aura around itself.
    #[serde(default)]
    pub is_commander: bool,

    /// Feedstock cost to field this unit.
    #[serde(default)]
    pub cost: u32,
}

impl UnitData {
    /// Whether this unit can engage in combat.
    #[must_use]
    pub fn is_combatant(&self) -> bool {
        self.weapons.iter().any(|w| !w.is_smoke)
    }

    /// Longest non-smoke weapon range, or zero for non-combatants.
    #[must_use]
    pub fn max_weapon_range(&self) -> Fixed {
        self.weapons
            .iter()
            .filter(|w| !w.is_smoke)
            .map(|w| w.range)
            .max()
            .unwrap_or(Fixed::ZERO)
    }
}

/// All unit types known to a battle, indexed by id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UnitCatalog {
    units: HashMap<String, UnitData>,
}

impl UnitCatalog {
    /// Parse a catalog from RON text. `source` names the origin for
    /// error reporting (a file path or "builtin").
    pub fn from_ron(source: &str, text: &str) -> Result<Self> {
        let units: Vec<UnitData> =
            ron::from_str(text).map_err(|e| SimError::CatalogParseError {
                path: source.to_string(),
                message: e.to_string(),
            })?;
        let mut map = HashMap::with_capacity(units.len());
        for unit in units {
            map.insert(unit.id.clone(), unit);
        }
        Ok(Self { units: map })
    }

    /// Look up a unit type by id.
    pub fn get(&self, id: &str) -> Result<&UnitData> {
        self.units
            .get(id)
            .ok_or_else(|| SimError::UnknownUnitType(id.to_string()))
    }

    /// Number of unit types in the catalog.
    #[must_use]
    pub fn len(&self) -> usize {
        self.units.len()
    }

    /// Whether the catalog is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Iterate over all unit types in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = &UnitData> {
        self.units.values()
    }

    /// Small built-in catalog used by tests and headless smoke runs:
    /// a rifle squad, a medium tank, a transport truck, and a commander.
    #[must_use]
    pub fn builtin() -> Self {
        let mut units = HashMap::new();
        for unit in [
            UnitData {
                id: "rifle_squad".to_string(),
                name: "unit.rifle_squad.name".to_string(),
                category: UnitCategory::Infantry,
                max_health: Fixed::from_num(80),
                max_speed: Fixed::from_num(6),
                rotation_rate: Fixed::from_num(8),
                radius: Fixed::from_num(1),
                sight_radius: Fixed::from_num(80),
                armor: ArmorProfile::default(),
                weapons: vec![WeaponData {
                    name: "rifles".to_string(),
                    damage: Fixed::from_num(8),
                    range: Fixed::from_num(60),
                    rounds_per_minute: 60,
                    ammo_capacity: 300,
                    targets_top: false,
                    is_smoke: false,
                }],
                transport_capacity: 0,
                can_garrison: true,
                can_dig_in: true,
                is_commander: false,
                cost: 50,
            },
            UnitData {
                id: "medium_tank".to_string(),
                name: "unit.medium_tank.name".to_string(),
                category: UnitCategory::Vehicle,
                max_health: Fixed::from_num(250),
                max_speed: Fixed::from_num(10),
                rotation_rate: Fixed::from_num(2),
                radius: Fixed::from_num(3),
                sight_radius: Fixed::from_num(100),
                armor: ArmorProfile {
                    front: 20,
                    side: 10,
                    rear: 5,
                    top: 2,
                },
                weapons: vec![
                    WeaponData {
                        name: "75mm cannon".to_string(),
                        damage: Fixed::from_num(40),
                        range: Fixed::from_num(120),
                        rounds_per_minute: 12,
                        ammo_capacity: 40,
                        targets_top: false,
                        is_smoke: false,
                    },
                    WeaponData {
                        name: "smoke dischargers".to_string(),
                        damage: Fixed::ZERO,
                        range: Fixed::from_num(20),
                        rounds_per_minute: 4,
                        ammo_capacity: 2,
                        targets_top: false,
                        is_smoke: true,
                    },
                ],
                transport_capacity: 0,
                can_garrison: false,
                can_dig_in: false,
                is_commander: false,
                cost: 300,
            },
            UnitData {
                id: "transport_truck".to_string(),
                name: "unit.transport_truck.name".to_string(),
                category: UnitCategory::Vehicle,
                max_health: Fixed::from_num(100),
                max_speed: Fixed::from_num(14),
                rotation_rate: Fixed::from_num(3),
                radius: Fixed::from_num(2),
                sight_radius: Fixed::from_num(70),
                armor: ArmorProfile::default(),
                weapons: Vec::new(),
                transport_capacity: 8,
                can_garrison: false,
                can_dig_in: false,
                is_commander: false,
                cost: 80,
            },
            UnitData {
                id: "commander".to_string(),
                name: "unit.commander.name".to_string(),
                category: UnitCategory::Vehicle,
                max_health: Fixed::from_num(150),
                max_speed: Fixed::from_num(9),
                rotation_rate: Fixed::from_num(3),
                radius: Fixed::from_num(2),
                sight_radius: Fixed::from_num(110),
                armor: ArmorProfile {
                    front: 8,
                    side: 5,
                    rear: 3,
                    top: 1,
                },
                weapons: vec![WeaponData {
                    name: "pintle mg".to_string(),
                    damage: Fixed::from_num(6),
                    range: Fixed::from_num(50),
                    rounds_per_minute: 120,
                    ammo_capacity: 500,
                    targets_top: false,
                    is_smoke: false,
                }],
                transport_capacity: 0,
                can_garrison: false,
                can_dig_in: false,
                is_commander: true,
                cost: 200,
            },
        ] {
            units.insert(unit.id.clone(), unit);
        }
        Self { units }
    }
}

#[cfg(test)]
impl WeaponData {
    /// A 30 rpm direct-fire cannon for unit tests.
    pub(crate) fn test_cannon() -> Self {
        Self {
            name: "test cannon".to_string(),
            damage: Fixed::from_num(40),
            range: Fixed::from_num(100),
            rounds_per_minute: 30,
            ammo_capacity: 20,
            targets_top: false,
            is_smoke: false,
        }
    }
}
