//! Local collision avoidance.
//!
//! A reciprocal steering pass runs after path following and before
//! integration: each unit gives up half of the velocity component that
//! closes on a nearby unit, so two approaching units split the detour
//! instead of either swerving the full amount. Overlapping units are
//! pushed apart directly.
//!
//! The adjusted speed is clamped to no less than half and no more than
//! all of the desired speed, so avoidance can never stall a unit or
//! fling it faster than it can drive. If the adjusted course would lead
//! onto terrain the unit cannot climb, the pass backs off entirely and
//! returns the unadjusted desired velocity; the pathfinder owns terrain
//! and avoidance must not override it.

use crate::context::UnitView;
use crate::math::{Fixed, Vec2Fixed, Vec3Fixed};

/// Seconds of lookahead when predicting conflicts.
pub const LOOKAHEAD_SECS: Fixed = Fixed::const_from_int(2);

/// Extra clearance kept beyond combined radii, in world units.
pub const CLEARANCE: Fixed = Fixed::const_from_int(1);

/// Neighbor scan radius for the avoidance pass.
pub const SCAN_RADIUS: Fixed = Fixed::const_from_int(20);

/// Bend a desired velocity around nearby units.
///
/// `neighbors` must be in ascending id order; the accumulation order is
/// part of the deterministic contract. `slope_ratio` reports the ground
/// slope along a direction from the unit's position; an adjusted course
/// steeper than 45 degrees falls back to `desired` untouched.
#[must_use]
pub fn resolve(
    position: Vec3Fixed,
    radius: Fixed,
    desired: Vec2Fixed,
    neighbors: &[UnitView],
    slope_ratio: impl Fn(Vec2Fixed) -> Fixed,
) -> Vec2Fixed {
    let desired_speed = desired.length();
    if desired_speed == Fixed::ZERO && neighbors.is_empty() {
        return Vec2Fixed::ZERO;
    }

    let here = position.ground();
    let mut adjustment = Vec2Fixed::ZERO;
    let mut separation = Vec2Fixed::ZERO;

    for other in neighbors {
        let offset = other.position.ground() - here;
        let dist = offset.length();
        let combined = radius + other.radius;

        if dist < combined {
            // Overlapping. Push straight apart, half responsibility,
            // harder the deeper the penetration.
            let penetration = combined - dist;
            let away = if dist > Fixed::ZERO {
                offset.normalize().scale(-Fixed::ONE)
            } else {
                // Coincident centers: deterministic fallback axis.
                Vec2Fixed::new(Fixed::ONE, Fixed::ZERO)
            };
            separation = separation + away.scale(penetration / Fixed::from_num(2));
            continue;
        }

        if desired_speed == Fixed::ZERO {
            continue;
        }

        // Relative velocity component closing along the line to the
        // neighbor. Receding pairs never conflict.
        let ahead = offset.normalize();
        let closing = (desired - other.velocity).dot(ahead);
        if closing <= Fixed::ZERO {
            continue;
        }

        // Will the current course eat the clearance envelope within the
        // lookahead window?
        let gap = (dist - combined - CLEARANCE).max(Fixed::ZERO);
        if gap > closing * LOOKAHEAD_SECS {
            continue;
        }

        // Give up half the closing component; the neighbor's own pass
        // surrenders the other half.
        adjustment = adjustment - ahead.scale(closing / Fixed::from_num(2));
    }

    let mut velocity = desired + adjustment + separation;

    if desired_speed > Fixed::ZERO {
        // Clamp into [half, full] desired speed.
        let speed = velocity.length();
        let min_speed = desired_speed / Fixed::from_num(2);
        if speed > desired_speed {
            velocity = velocity.normalize().scale(desired_speed);
        } else if speed < min_speed {
            velocity = if speed > Fixed::ZERO {
                velocity.normalize().scale(min_speed)
            } else {
                // Fully cancelled out. Keep crawling along the desired
                // course rather than deadlocking.
                desired.normalize().scale(min_speed)
            };
        }
    }

    // Terrain guard: never steer onto a slope the unit cannot take.
    if velocity != desired && velocity.length_squared() > Fixed::ZERO {
        let course = velocity.normalize();
        if slope_ratio(course) > Fixed::ONE {
            return desired;
        }
    }

    velocity
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::UnitCategory;

    fn fx(n: f64) -> Fixed {
        Fixed::from_num(n)
    }

    fn flat(_dir: Vec2Fixed) -> Fixed {
        Fixed::ZERO
    }

    fn view(id: u64, x: f64, z: f64, vx: f64, vz: f64) -> UnitView {
        UnitView {
            id,
            team: 1,
            position: Vec3Fixed::new(fx(x), Fixed::ZERO, fx(z)),
            velocity: Vec2Fixed::new(fx(vx), fx(vz)),
            radius: Fixed::ONE,
            yaw: Fixed::ZERO,
            category: UnitCategory::Infantry,
            is_commander: false,
            is_routing: false,
            in_smoke: false,
            seats_free: 0,
        }
    }

    #[test]
    fn test_open_ground_keeps_desired_velocity() {
        let desired = Vec2Fixed::new(fx(5.0), Fixed::ZERO);
        let out = resolve(Vec3Fixed::ZERO, Fixed::ONE, desired, &[], flat);
        assert_eq!(out, desired);
    }

    #[test]
    fn test_head_on_neighbor_sheds_half_the_closing_speed() {
        let desired = Vec2Fixed::new(fx(5.0), Fixed::ZERO);
        let oncoming = view(2, 6.0, 0.0, -5.0, 0.0);
        let out = resolve(Vec3Fixed::ZERO, Fixed::ONE, desired, &[oncoming], flat);
        // Closing speed is 10; this side gives up half of it, and the
        // floor keeps the unit crawling forward instead of stalling.
        assert_eq!(out.z, Fixed::ZERO);
        assert!(out.x >= fx(2.5) - fx(0.01));
        assert!(out.x < fx(5.0));
    }

    #[test]
    fn test_offset_neighbor_bends_course_away() {
        let desired = Vec2Fixed::new(fx(5.0), Fixed::ZERO);
        let crossing = view(2, 4.0, -1.0, 0.0, 0.0);
        let out = resolve(Vec3Fixed::ZERO, Fixed::ONE, desired, &[crossing], flat);
        // The closing line points below the x axis, so shedding it
        // steers the course upward and off the neighbor.
        assert!(out.z > Fixed::ZERO);
        assert!(out.x > Fixed::ZERO);
    }

    #[test]
    fn test_receding_neighbor_is_ignored() {
        let desired = Vec2Fixed::new(fx(5.0), Fixed::ZERO);
        let behind = view(2, -6.0, 0.0, -5.0, 0.0);
        let out = resolve(Vec3Fixed::ZERO, Fixed::ONE, desired, &[behind], flat);
        assert_eq!(out, desired);
    }

    #[test]
    fn test_overlap_pushes_apart_even_when_stationary() {
        let overlapping = view(2, 1.0, 0.0, 0.0, 0.0);
        let out = resolve(
            Vec3Fixed::ZERO,
            Fixed::ONE,
            Vec2Fixed::ZERO,
            &[overlapping],
            flat,
        );
        // Pushed away from the neighbor, along -x.
        assert!(out.x < Fixed::ZERO);
    }

    #[test]
    fn test_steep_adjustment_falls_back_to_desired() {
        let desired = Vec2Fixed::new(fx(5.0), Fixed::ZERO);
        let crossing = view(2, 4.0, -1.0, 0.0, 0.0);
        // A cliff on every course that gains any +z component.
        let walled = |dir: Vec2Fixed| {
            if dir.z > Fixed::ZERO {
                fx(20.0)
            } else {
                Fixed::ZERO
            }
        };
        let out = resolve(Vec3Fixed::ZERO, Fixed::ONE, desired, &[crossing], walled);
        assert_eq!(out, desired);

        // The same conflict on flat ground does adjust.
        let open = resolve(Vec3Fixed::ZERO, Fixed::ONE, desired, &[crossing], flat);
        assert_ne!(open, desired);
    }

    #[test]
    fn test_speed_clamped_between_half_and_full() {
        let desired = Vec2Fixed::new(fx(6.0), Fixed::ZERO);
        let crowd = [
            view(2, 4.0, -1.5, -2.0, 0.0),
            view(3, 5.0, 1.0, -2.0, 0.0),
            view(4, 6.0, 0.0, -2.0, 0.0),
        ];
        let out = resolve(Vec3Fixed::ZERO, Fixed::ONE, desired, &crowd, flat);
        let speed = out.length();
        assert!(speed >= fx(3.0) - fx(0.01), "speed {speed} fell below half");
        assert!(speed <= fx(6.0) + fx(0.01), "speed {speed} exceeded desired");
    }
}
