//! Per-tick simulation events.
//!
//! Events are emitted by units during `fixed_update` and drained by the
//! host once per tick for the rendering/audio layer. They never feed
//! back into simulation state.

use serde::{Deserialize, Serialize};

use crate::unit::UnitId;

/// Event emitted by a single unit during one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnitEvent {
    /// Health reached zero. Terminal.
    Death,
    /// Morale dropped below 50.
    MoraleLow,
    /// Morale dropped below 20.
    MoraleCritical,
    /// Morale collapsed to 0 and panic flight began.
    RoutStarted,
    /// Morale recovered above the rout-recovery threshold.
    RoutRecovered,
    /// A veterancy tier was reached (payload: new tier, 1 or 2).
    VeterancyGained(u8),
    /// Morale recovered above the low-morale threshold after a dip.
    Rallied,
}

/// Events generated during one battle tick, for consumption by the
/// presentation layer and the networking snapshot writer.
#[derive(Debug, Clone, Default)]
pub struct TickEvents {
    /// Unit events tagged with the emitting unit.
    pub unit_events: Vec<(UnitId, UnitEvent)>,
    /// Units destroyed this tick (also present as `Death` unit events).
    pub deaths: Vec<UnitId>,
    /// Zone-capture events from the economy tick.
    pub zone_events: Vec<crate::economy::ZoneEvent>,
}
