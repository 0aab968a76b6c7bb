//! Determinism testing utilities.
//!
//! Provides a harness for verifying that the battle simulation
//! produces identical results given identical inputs.
//!
//! # Testing Strategy
//!
//! Lockstep multiplayer requires the simulation to be 100%
//! deterministic. Sources of non-determinism include:
//!
//! - **Floating-point math**: Different CPUs can produce different
//!   results. We use fixed-point arithmetic via
//!   [`battle_core::math::Fixed`] throughout.
//!
//! - **HashMap iteration order**: Rust's default hasher is randomized.
//!   We always iterate in sorted unit ID order.
//!
//! - **System randomness**: No calls to `rand()` without explicit
//!   seeds. All "random" behavior draws from the battle's seeded PRNG.
//!
//! # Test Levels
//!
//! 1. **Unit tests**: Individual module determinism (pathfinding, combat)
//! 2. **Property tests**: Random inputs must still produce deterministic outputs
//! 3. **Integration tests**: Full battle scenarios are reproducible
//! 4. **Parallel tests**: Running N battles in parallel all match

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::thread;

use battle_core::simulation::Battle;

/// Result of a determinism test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeterminismResult {
    /// Whether all runs produced identical results.
    pub is_deterministic: bool,
    /// Hashes from each run.
    pub hashes: Vec<u64>,
    /// Number of ticks simulated.
    pub ticks: u64,
}

impl DeterminismResult {
    /// Get all unique hashes (should be 1 for a deterministic battle).
    #[must_use]
    pub fn unique_hashes(&self) -> Vec<u64> {
        let mut unique: Vec<u64> = self.hashes.clone();
        unique.sort_unstable();
        unique.dedup();
        unique
    }

    /// Assert that the battle was deterministic, with a detailed error
    /// message.
    ///
    /// # Panics
    ///
    /// Panics if the battle produced different hashes across runs.
    pub fn assert_deterministic(&self) {
        if !self.is_deterministic {
            let unique = self.unique_hashes();
            panic!(
                "Battle is non-deterministic!\n\
                 Runs: {}\n\
                 Ticks: {}\n\
                 Unique hashes: {} (expected 1)\n\
                 All hashes: {:?}",
                self.hashes.len(),
                self.ticks,
                unique.len(),
                self.hashes
            );
        }
    }
}

/// Result of parallel battle runs.
#[derive(Debug, Clone)]
pub struct ParallelRunResult {
    /// Final state hash from each battle.
    pub hashes: Vec<u64>,
    /// Number of ticks each battle ran.
    pub ticks: u64,
    /// Number of battles run.
    pub num_runs: usize,
}

impl ParallelRunResult {
    /// Check if all battles produced identical results.
    #[must_use]
    pub fn is_deterministic(&self) -> bool {
        self.hashes.windows(2).all(|w| w[0] == w[1])
    }

    /// Assert all battles matched.
    ///
    /// # Panics
    ///
    /// Panics if battles produced different hashes.
    pub fn assert_deterministic(&self) {
        if !self.is_deterministic() {
            let mut unique: Vec<u64> = self.hashes.clone();
            unique.sort_unstable();
            unique.dedup();
            panic!(
                "Parallel battles diverged!\n\
                 Battles: {}\n\
                 Ticks: {}\n\
                 Unique hashes: {}\n\
                 All hashes: {:?}",
                self.num_runs,
                self.ticks,
                unique.len(),
                self.hashes
            );
        }
    }
}

/// Run a scenario multiple times and verify determinism.
///
/// # Arguments
///
/// * `runs` - Number of times to run the scenario
/// * `ticks` - Number of ticks to simulate per run
/// * `setup` - Function to create the initial state
/// * `step` - Function to advance the state by one tick
/// * `hash` - Function to compute a state hash
///
/// # Example
///
/// ```
/// use battle_test_utils::determinism::verify_determinism;
/// use battle_test_utils::fixtures::skirmish_battle;
///
/// let result = verify_determinism(
///     3,
///     100,
///     || skirmish_battle(42),
///     |battle| {
///         battle.tick();
///     },
///     battle_core::simulation::Battle::state_hash,
/// );
/// result.assert_deterministic();
/// ```
pub fn verify_determinism<S, Setup, Step, HashFn>(
    runs: usize,
    ticks: u64,
    setup: Setup,
    step: Step,
    hash: HashFn,
) -> DeterminismResult
where
    Setup: Fn() -> S,
    Step: Fn(&mut S),
    HashFn: Fn(&S) -> u64,
{
    let mut hashes = Vec::with_capacity(runs);

    for _ in 0..runs {
        let mut state = setup();

        for _ in 0..ticks {
            step(&mut state);
        }

        hashes.push(hash(&state));
    }

    let is_deterministic = hashes.windows(2).all(|w| w[0] == w[1]);

    DeterminismResult {
        is_deterministic,
        hashes,
        ticks,
    }
}

/// Simplified determinism verification for [`Battle`].
///
/// Runs the battle twice with identical setup and verifies the final
/// state hashes match exactly.
pub fn verify_battle_determinism<F>(setup_fn: F, num_ticks: u64) -> bool
where
    F: Fn() -> Battle,
{
    let result = verify_determinism(
        2,
        num_ticks,
        &setup_fn,
        |battle| {
            battle.tick();
        },
        Battle::state_hash,
    );
    result.is_deterministic
}

/// Run N battles in parallel and collect final hashes.
///
/// This is useful for catching non-determinism that only manifests
/// under thread scheduling variations, memory layout differences, etc.
pub fn run_parallel_battles<F>(setup_fn: F, num_runs: usize, num_ticks: u64) -> ParallelRunResult
where
    F: Fn() -> Battle + Sync,
{
    let hashes = thread::scope(|s| {
        let handles: Vec<_> = (0..num_runs)
            .map(|_| {
                s.spawn(|| {
                    let mut battle = setup_fn();
                    for _ in 0..num_ticks {
                        battle.tick();
                    }
                    battle.state_hash()
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|h| h.join().expect("battle thread panicked"))
            .collect()
    });

    ParallelRunResult {
        hashes,
        ticks: num_ticks,
        num_runs,
    }
}

/// Compare two battle runs tick-by-tick, finding the first divergence.
///
/// Useful for debugging non-determinism by finding exactly when the
/// runs start to differ.
///
/// # Returns
///
/// `None` if the runs are deterministic, `Some(tick)` if they diverge
/// at that tick.
pub fn find_first_divergence<F>(setup_fn: F, num_ticks: u64) -> Option<u64>
where
    F: Fn() -> Battle,
{
    let mut battle1 = setup_fn();
    let mut battle2 = setup_fn();

    // Check initial state
    if battle1.state_hash() != battle2.state_hash() {
        return Some(0);
    }

    for tick in 1..=num_ticks {
        battle1.tick();
        battle2.tick();

        if battle1.state_hash() != battle2.state_hash() {
            return Some(tick);
        }
    }

    None
}

/// Verify that serialization round-trip preserves battle state exactly.
///
/// This is critical for save/load and network synchronization.
pub fn verify_serialization_determinism<F>(setup_fn: F, num_ticks: u64) -> bool
where
    F: Fn() -> Battle,
{
    let mut battle = setup_fn();

    for _ in 0..num_ticks {
        battle.tick();
    }

    let hash_before = battle.state_hash();

    let Ok(bytes) = battle.serialize() else {
        return false;
    };
    let Ok(restored) = Battle::deserialize(&bytes) else {
        return false;
    };

    hash_before == restored.state_hash()
}

/// Compute a simple hash for any hashable value.
pub fn compute_hash<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

/// Proptest strategies for determinism testing.
///
/// These strategies generate random but reproducible inputs for
/// property-based testing of battle determinism.
pub mod strategies {
    use battle_core::command::Command;
    use battle_core::math::{Fixed, Vec3Fixed};
    use proptest::prelude::*;

    /// Generate a fixed-point coordinate inside a 200x200 unit map.
    pub fn arb_fixed_coord() -> impl Strategy<Value = Fixed> {
        (4i32..196i32).prop_map(Fixed::from_num)
    }

    /// Generate a ground position inside the standard test map.
    pub fn arb_position() -> impl Strategy<Value = Vec3Fixed> {
        (arb_fixed_coord(), arb_fixed_coord())
            .prop_map(|(x, z)| Vec3Fixed::new(x, Fixed::ZERO, z))
    }

    /// Generate a Move command.
    pub fn arb_move_command() -> impl Strategy<Value = Command> {
        arb_position().prop_map(Command::Move)
    }

    /// Generate an AttackMove command.
    pub fn arb_attack_move_command() -> impl Strategy<Value = Command> {
        arb_position().prop_map(Command::AttackMove)
    }

    /// Generate any movement-class command.
    pub fn arb_movement_command() -> impl Strategy<Value = Command> {
        prop_oneof![
            arb_position().prop_map(Command::Move),
            arb_position().prop_map(Command::FastMove),
            arb_position().prop_map(Command::Reverse),
            arb_position().prop_map(Command::AttackMove),
        ]
    }

    /// Generate a PRNG seed.
    pub fn arb_seed() -> impl Strategy<Value = u64> {
        any::<u64>()
    }
}
