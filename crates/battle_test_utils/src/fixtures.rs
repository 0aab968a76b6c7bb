//! Test fixtures and scenario builders.
//!
//! Pre-built battles and helpers for consistent testing across crates
//! and benchmarks.

use battle_core::command::Command;
use battle_core::data::UnitCatalog;
use battle_core::economy::CaptureZone;
use battle_core::math::{Fixed, Vec3Fixed};
use battle_core::simulation::Battle;
use battle_core::terrain::{HeightMap, TerrainKind};

/// Create a fixed-point number from an integer.
#[must_use]
pub fn fixed(n: i32) -> Fixed {
    Fixed::from_num(n)
}

/// Create a fixed-point number from a float (for tests only).
///
/// Note: In real simulation code, never use floats.
/// This is only for convenient test setup.
#[must_use]
pub fn fixed_f(n: f64) -> Fixed {
    Fixed::from_num(n)
}

/// Ground-plane position at elevation zero.
#[must_use]
pub fn pos(x: f64, z: f64) -> Vec3Fixed {
    Vec3Fixed::new(fixed_f(x), Fixed::ZERO, fixed_f(z))
}

/// An empty battle on a flat, open 200x200 unit map.
#[must_use]
pub fn flat_battle(seed: u64) -> Battle {
    Battle::new(
        HeightMap::flat(50, 50, fixed(4)),
        UnitCatalog::builtin(),
        seed,
    )
}

/// A battle on a map with a central forest belt and a road crossing it.
#[must_use]
pub fn forest_road_battle(seed: u64) -> Battle {
    let mut terrain = HeightMap::flat(50, 50, fixed(4));
    for cx in 0..50 {
        for cz in 20..30 {
            terrain.set_kind(
                fixed(cx * 4),
                fixed(cz * 4),
                TerrainKind::Forest,
            );
        }
    }
    for cz in 0..50 {
        terrain.set_kind(fixed(100), fixed(cz * 4), TerrainKind::Road);
    }
    Battle::new(terrain, UnitCatalog::builtin(), seed)
}

/// Two squads per team advancing on each other across open ground, with
/// a contested capture zone in the middle. The workhorse scenario for
/// determinism and benchmark runs.
///
/// # Panics
///
/// Panics if the builtin catalog is missing its standard types.
#[must_use]
pub fn skirmish_battle(seed: u64) -> Battle {
    let mut battle = flat_battle(seed);
    battle.set_zones(vec![CaptureZone::new(
        1,
        pos(100.0, 100.0),
        fixed(20),
        fixed(2),
    )]);

    for z in [80.0, 120.0] {
        let west = battle
            .spawn_unit(1, "rifle_squad", pos(20.0, z))
            .expect("builtin catalog has rifle_squad");
        let east = battle
            .spawn_unit(2, "rifle_squad", pos(180.0, z))
            .expect("builtin catalog has rifle_squad");
        battle
            .apply_command(west, Command::AttackMove(pos(100.0, 100.0)))
            .expect("unit exists");
        battle
            .apply_command(east, Command::AttackMove(pos(100.0, 100.0)))
            .expect("unit exists");
    }

    let tank = battle
        .spawn_unit(1, "medium_tank", pos(20.0, 100.0))
        .expect("builtin catalog has medium_tank");
    battle
        .apply_command(tank, Command::AttackMove(pos(100.0, 100.0)))
        .expect("unit exists");

    battle
}
