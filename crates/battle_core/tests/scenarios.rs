//! Full-battle scenario tests.
//!
//! These drive the public [`battle_core::simulation::Battle`] API the
//! way a headless server would: spawn, order, tick, observe events.

use battle_core::command::Command;
use battle_core::events::UnitEvent;
use battle_core::math::Fixed;
use battle_core::simulation::TICK_RATE;
use battle_test_utils::determinism::{strategies, verify_battle_determinism};
use battle_test_utils::fixtures::{fixed, flat_battle, pos, skirmish_battle};
use battle_test_utils::proptest::prelude::*;

#[test]
fn skirmish_fights_to_casualties() {
    let mut battle = skirmish_battle(42);
    let starting = battle.units().len();

    let mut deaths = 0;
    let mut saw_morale_event = false;
    for _ in 0..(TICK_RATE as usize * 400) {
        let events = battle.tick();
        deaths += events.deaths.len();
        saw_morale_event |= events
            .unit_events
            .iter()
            .any(|(_, e)| matches!(e, UnitEvent::MoraleLow | UnitEvent::Death));
        if deaths > 0 {
            break;
        }
    }

    assert!(deaths > 0, "no casualties after 400 simulated seconds");
    assert!(saw_morale_event);
    assert_eq!(battle.units().len(), starting - deaths);
}

#[test]
fn garrison_round_trip_through_public_api() {
    let mut battle = flat_battle(1);
    let building = battle.add_building(pos(100.0, 100.0), fixed(3), 4);
    let squad = battle.spawn_unit(1, "rifle_squad", pos(80.0, 100.0)).unwrap();

    battle
        .apply_command(squad, Command::Garrison(building))
        .unwrap();
    for _ in 0..(TICK_RATE as usize * 20) {
        battle.tick();
        if !battle.units().get(squad).unwrap().is_deployed() {
            break;
        }
    }
    assert!(!battle.units().get(squad).unwrap().is_deployed());
    assert_eq!(battle.buildings()[&building].occupants(), &[squad]);

    // A move order pulls the squad back out.
    battle
        .apply_command(squad, Command::Move(pos(140.0, 100.0)))
        .unwrap();
    for _ in 0..(TICK_RATE as usize * 30) {
        battle.tick();
        if battle.units().get(squad).unwrap().commands().is_idle() {
            break;
        }
    }
    let unit = battle.units().get(squad).unwrap();
    assert!(unit.is_deployed());
    assert!(unit.commands().is_idle());
    assert!(battle.buildings()[&building].occupants().is_empty());
    assert!(unit.position.ground_distance(pos(140.0, 100.0)) <= Fixed::from_num(2));
}

#[test]
fn long_skirmish_is_reproducible() {
    assert!(verify_battle_determinism(|| skirmish_battle(9), 1_000));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// Random command streams still replay identically.
    #[test]
    fn random_orders_are_deterministic(
        seed in strategies::arb_seed(),
        commands in prop::collection::vec(strategies::arb_movement_command(), 1..5),
    ) {
        let run = |seed: u64, commands: &[Command]| {
            let mut battle = flat_battle(seed);
            let unit = battle.spawn_unit(1, "medium_tank", pos(100.0, 100.0)).unwrap();
            if let Some((first, rest)) = commands.split_first() {
                battle.apply_command(unit, *first).unwrap();
                for command in rest {
                    battle.queue_command(unit, *command).unwrap();
                }
            }
            for _ in 0..200 {
                battle.tick();
            }
            battle.state_hash()
        };
        prop_assert_eq!(run(seed, &commands), run(seed, &commands));
    }
}
