//! # Battle Core
//!
//! Deterministic battle simulation core for a real-time tactics game.
//!
//! This crate contains **only** deterministic logic:
//! - No rendering
//! - No IO
//! - No system randomness
//! - No floating-point math (uses fixed-point)
//!
//! This separation enables:
//! - Lockstep multiplayer (identical simulation across clients)
//! - Headless server builds
//! - Replay systems
//! - Determinism testing
//!
//! ## Crate Structure
//!
//! - [`simulation`] - The battle world and tick loop
//! - [`unit`] - The unit entity and its command state machine
//! - [`pathfinding`] - Budgeted grid A* with path smoothing
//! - [`avoidance`] - Reciprocal local collision avoidance
//! - [`combat`] - Armor, weapons, morale and veterancy rules
//! - [`terrain`] - Elevation and terrain-kind sampling
//! - [`economy`] - Capture zones and team income
//! - [`math`] - Fixed-point math utilities

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod avoidance;
pub mod buildings;
pub mod combat;
pub mod command;
pub mod context;
pub mod data;
pub mod economy;
pub mod error;
pub mod events;
pub mod math;
pub mod pathfinding;
pub mod rng;
pub mod simulation;
pub mod terrain;
pub mod unit;

pub use error::{Result, SimError};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::buildings::{Building, BuildingId};
    pub use crate::combat::{ArmorFacing, ArmorProfile, WeaponSlot};
    pub use crate::command::{Command, CommandQueue};
    pub use crate::context::{Context, DamageOutcome, UnitView};
    pub use crate::data::{UnitCatalog, UnitCategory, UnitData, WeaponData};
    pub use crate::economy::{CaptureZone, Economy, ZoneEvent, ZoneId};
    pub use crate::error::{Result, SimError};
    pub use crate::events::{TickEvents, UnitEvent};
    pub use crate::math::{Fixed, Vec2Fixed, Vec3Fixed};
    pub use crate::rng::SimRng;
    pub use crate::simulation::{Battle, TICK_RATE};
    pub use crate::terrain::{HeightMap, Terrain, TerrainKind};
    pub use crate::unit::{Deployment, Unit, UnitId};
}
