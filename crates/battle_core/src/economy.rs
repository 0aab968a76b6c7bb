//! Capture zones and team income.
//!
//! A thin layer over the battle: zones flip after sustained uncontested
//! presence and pay their owner a credit trickle. Units never read
//! economy state; the battle feeds unit positions in once per tick.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::math::{fixed_serde, Fixed, Vec3Fixed};

/// Unique identifier for a capture zone.
pub type ZoneId = u64;

/// Seconds of uncontested presence needed to flip a zone.
pub const CAPTURE_SECS: Fixed = Fixed::const_from_int(10);

/// Zone ownership change emitted by the economy tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ZoneEvent {
    /// A team completed a capture.
    Captured {
        /// Flipped zone.
        zone: ZoneId,
        /// New owner.
        team: u8,
    },
    /// An owned zone fell to an enemy capture. Emitted alongside the
    /// matching `Captured` event; flips from neutral emit `Captured`
    /// alone.
    Lost {
        /// Affected zone.
        zone: ZoneId,
        /// Previous owner.
        team: u8,
    },
}

/// One capturable map zone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureZone {
    /// Unique id.
    pub id: ZoneId,
    /// Zone center.
    pub center: Vec3Fixed,
    /// Capture radius in world units.
    #[serde(with = "fixed_serde")]
    pub radius: Fixed,
    /// Credits per second paid to the owner.
    #[serde(with = "fixed_serde")]
    pub income_per_sec: Fixed,
    /// Current owner, if any.
    pub owner: Option<u8>,
    contender: Option<u8>,
    #[serde(with = "fixed_serde")]
    progress: Fixed,
}

impl CaptureZone {
    /// Create an unowned zone.
    #[must_use]
    pub fn new(id: ZoneId, center: Vec3Fixed, radius: Fixed, income_per_sec: Fixed) -> Self {
        Self {
            id,
            center,
            radius,
            income_per_sec,
            owner: None,
            contender: None,
            progress: Fixed::ZERO,
        }
    }

    fn contains(&self, pos: Vec3Fixed) -> bool {
        self.center.ground_distance_squared(pos) <= self.radius * self.radius
    }
}

/// Zones plus per-team credit balances.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Economy {
    zones: Vec<CaptureZone>,
    credits: BTreeMap<u8, i64>,
}

impl Economy {
    /// Create an economy over a set of zones.
    #[must_use]
    pub fn new(zones: Vec<CaptureZone>) -> Self {
        Self {
            zones,
            credits: BTreeMap::new(),
        }
    }

    /// All zones, in id order as constructed.
    #[must_use]
    pub fn zones(&self) -> &[CaptureZone] {
        &self.zones
    }

    /// A team's credit balance.
    #[must_use]
    pub fn credits(&self, team: u8) -> Fixed {
        self.credits
            .get(&team)
            .map_or(Fixed::ZERO, |&bits| Fixed::from_bits(bits))
    }

    /// Spend credits. Returns false (and deducts nothing) when the
    /// balance is short.
    pub fn spend(&mut self, team: u8, amount: Fixed) -> bool {
        let balance = self.credits(team);
        if balance < amount {
            return false;
        }
        self.credits.insert(team, (balance - amount).to_bits());
        true
    }

    /// Advance zone capture and pay income. `presence` lists the team
    /// and position of every living deployed unit.
    pub fn tick(&mut self, dt: Fixed, presence: &[(u8, Vec3Fixed)]) -> Vec<ZoneEvent> {
        let mut events = Vec::new();

        for zone in &mut self.zones {
            let mut teams_present: Vec<u8> = presence
                .iter()
                .filter(|(_, pos)| zone.contains(*pos))
                .map(|(team, _)| *team)
                .collect();
            teams_present.sort_unstable();
            teams_present.dedup();

            match teams_present.as_slice() {
                [] => {
                    // Empty zone: capture progress bleeds away.
                    zone.progress = (zone.progress - dt).max(Fixed::ZERO);
                    if zone.progress == Fixed::ZERO {
                        zone.contender = None;
                    }
                }
                [team] if Some(*team) != zone.owner => {
                    if zone.contender != Some(*team) {
                        zone.contender = Some(*team);
                        zone.progress = Fixed::ZERO;
                    }
                    zone.progress += dt;
                    if zone.progress >= CAPTURE_SECS {
                        if let Some(previous) = zone.owner {
                            events.push(ZoneEvent::Lost {
                                zone: zone.id,
                                team: previous,
                            });
                        }
                        zone.owner = Some(*team);
                        zone.contender = None;
                        zone.progress = Fixed::ZERO;
                        events.push(ZoneEvent::Captured {
                            zone: zone.id,
                            team: *team,
                        });
                    }
                }
                // Owner alone in their own zone, or a contested zone:
                // progress is frozen.
                _ => {}
            }

            if let Some(owner) = zone.owner {
                let balance = self
                    .credits
                    .get(&owner)
                    .map_or(Fixed::ZERO, |&bits| Fixed::from_bits(bits));
                self.credits
                    .insert(owner, (balance + zone.income_per_sec * dt).to_bits());
            }
        }

        events
    }
}
