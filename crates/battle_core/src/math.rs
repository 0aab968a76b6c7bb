//! Fixed-point math utilities for deterministic simulation.
//!
//! All battle simulation uses fixed-point arithmetic so the headless
//! server and the client prediction path produce bit-identical state.
//! Floating-point operations can produce different results on
//! different CPUs.

use fixed::types::I32F32;
use serde::{Deserialize, Serialize};

/// Fixed-point number type for all simulation math.
///
/// Uses 32 bits for integer part and 32 bits for fractional part.
pub type Fixed = I32F32;

/// Pi in I32F32 raw bits.
pub const PI: Fixed = Fixed::from_bits(0x3_243F_6A88);

/// Two pi in I32F32 raw bits.
pub const TAU: Fixed = Fixed::from_bits(0x6_487E_D511);

/// Pi over two in I32F32 raw bits.
pub const FRAC_PI_2: Fixed = Fixed::from_bits(0x1_921F_B544);

/// Square root of two in I32F32 raw bits (diagonal step cost).
pub const SQRT_2: Fixed = Fixed::from_bits(0x1_6A09_E668);

/// Serde support for fixed-point numbers.
///
/// Serializes fixed-point numbers as their raw bit representation (i64)
/// to preserve exact precision across serialization boundaries.
pub mod fixed_serde {
    use super::Fixed;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a fixed-point number as its raw bit representation.
    pub fn serialize<S>(value: &Fixed, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        value.to_bits().serialize(serializer)
    }

    /// Deserialize a fixed-point number from its raw bit representation.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Fixed, D::Error>
    where
        D: Deserializer<'de>,
    {
        let bits = i64::deserialize(deserializer)?;
        Ok(Fixed::from_bits(bits))
    }
}

/// Serde support for `Option<Fixed>`.
pub mod option_fixed_serde {
    use super::Fixed;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize an optional fixed-point number.
    pub fn serialize<S>(value: &Option<Fixed>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(v) => serializer.serialize_some(&v.to_bits()),
            None => serializer.serialize_none(),
        }
    }

    /// Deserialize an optional fixed-point number.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Fixed>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let opt = Option::<i64>::deserialize(deserializer)?;
        Ok(opt.map(Fixed::from_bits))
    }
}

/// Fixed-point 2D vector for ground-plane math (velocities, grid space).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Vec2Fixed {
    /// X coordinate.
    #[serde(with = "fixed_serde")]
    pub x: Fixed,
    /// Z coordinate (ground plane uses x/z, elevation is y).
    #[serde(with = "fixed_serde")]
    pub z: Fixed,
}

impl Vec2Fixed {
    /// Create a new fixed-point vector.
    #[must_use]
    pub const fn new(x: Fixed, z: Fixed) -> Self {
        Self { x, z }
    }

    /// Zero vector.
    pub const ZERO: Self = Self {
        x: Fixed::ZERO,
        z: Fixed::ZERO,
    };

    /// Calculate squared distance (avoids sqrt for comparisons).
    #[must_use]
    pub fn distance_squared(self, other: Self) -> Fixed {
        let dx = self.x - other.x;
        let dz = self.z - other.z;
        dx * dx + dz * dz
    }

    /// Dot product of two vectors.
    #[must_use]
    pub fn dot(self, other: Self) -> Fixed {
        self.x * other.x + self.z * other.z
    }

    /// Squared length.
    #[must_use]
    pub fn length_squared(self) -> Fixed {
        self.dot(self)
    }

    /// Length via fixed-point square root.
    #[must_use]
    pub fn length(self) -> Fixed {
        fixed_sqrt(self.length_squared())
    }

    /// Scale by a scalar.
    #[must_use]
    pub fn scale(self, s: Fixed) -> Self {
        Self::new(self.x * s, self.z * s)
    }

    /// Normalize vector using fixed-point math.
    #[must_use]
    pub fn normalize(self) -> Self {
        let len_sq = self.dot(self);

        if len_sq == Fixed::ZERO {
            return Self::ZERO;
        }

        let len = fixed_sqrt(len_sq);
        if len == Fixed::ZERO {
            return Self::ZERO;
        }

        Self::new(self.x / len, self.z / len)
    }

    /// Perpendicular vector (rotated 90 degrees in the ground plane).
    #[must_use]
    pub fn perpendicular(self) -> Self {
        Self::new(-self.z, self.x)
    }
}

impl std::ops::Add for Vec2Fixed {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self {
            x: self.x + rhs.x,
            z: self.z + rhs.z,
        }
    }
}

impl std::ops::Sub for Vec2Fixed {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self {
            x: self.x - rhs.x,
            z: self.z - rhs.z,
        }
    }
}

/// Fixed-point 3D position. Y is elevation; movement and distances on
/// the battlefield happen in the X/Z ground plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Vec3Fixed {
    /// X coordinate.
    #[serde(with = "fixed_serde")]
    pub x: Fixed,
    /// Elevation.
    #[serde(with = "fixed_serde")]
    pub y: Fixed,
    /// Z coordinate.
    #[serde(with = "fixed_serde")]
    pub z: Fixed,
}

impl Vec3Fixed {
    /// Create a new fixed-point position.
    #[must_use]
    pub const fn new(x: Fixed, y: Fixed, z: Fixed) -> Self {
        Self { x, y, z }
    }

    /// Origin.
    pub const ZERO: Self = Self {
        x: Fixed::ZERO,
        y: Fixed::ZERO,
        z: Fixed::ZERO,
    };

    /// Ground-plane projection.
    #[must_use]
    pub const fn ground(self) -> Vec2Fixed {
        Vec2Fixed::new(self.x, self.z)
    }

    /// Squared ground-plane distance (elevation ignored).
    #[must_use]
    pub fn ground_distance_squared(self, other: Self) -> Fixed {
        let dx = self.x - other.x;
        let dz = self.z - other.z;
        dx * dx + dz * dz
    }

    /// Ground-plane distance.
    #[must_use]
    pub fn ground_distance(self, other: Self) -> Fixed {
        fixed_sqrt(self.ground_distance_squared(other))
    }

    /// Normalized ground-plane direction toward `other`.
    #[must_use]
    pub fn ground_direction_to(self, other: Self) -> Vec2Fixed {
        (other.ground() - self.ground()).normalize()
    }

    /// Offset this position by a ground-plane vector.
    #[must_use]
    pub fn offset(self, v: Vec2Fixed) -> Self {
        Self::new(self.x + v.x, self.y, self.z + v.z)
    }
}

impl std::ops::Add for Vec3Fixed {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self {
            x: self.x + rhs.x,
            y: self.y + rhs.y,
            z: self.z + rhs.z,
        }
    }
}

impl std::ops::Sub for Vec3Fixed {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self {
            x: self.x - rhs.x,
            y: self.y - rhs.y,
            z: self.z - rhs.z,
        }
    }
}

/// Computes the square root of a fixed-point number using binary search.
#[must_use]
pub fn fixed_sqrt(value: Fixed) -> Fixed {
    if value <= Fixed::ZERO {
        return Fixed::ZERO;
    }

    let mut low = Fixed::ZERO;
    let mut high = if value > Fixed::from_num(1) {
        value
    } else {
        Fixed::from_num(1)
    };

    for _ in 0..32 {
        let mid = (low + high) / Fixed::from_num(2);
        let mid_sq = mid.saturating_mul(mid);

        if mid_sq <= value {
            low = mid;
        } else {
            high = mid;
        }
    }

    low
}

/// Arctangent on [-1, 1] via a quadratic polynomial approximation.
///
/// Max error is around 0.0015 rad, well below the rotation step of
/// any unit over a single tick.
fn atan_unit(ratio: Fixed) -> Fixed {
    let abs = ratio.abs();
    let quarter_pi = PI / Fixed::from_num(4);
    let c1 = Fixed::from_num(0.2447);
    let c2 = Fixed::from_num(0.0663);
    quarter_pi * ratio - ratio * (abs - Fixed::ONE) * (c1 + c2 * abs)
}

/// Fixed-point `atan2(z, x)` returning an angle in `(-pi, pi]`.
#[must_use]
pub fn fixed_atan2(z: Fixed, x: Fixed) -> Fixed {
    if x == Fixed::ZERO && z == Fixed::ZERO {
        return Fixed::ZERO;
    }

    if z.abs() <= x.abs() {
        let a = atan_unit(z / x);
        if x > Fixed::ZERO {
            a
        } else if z >= Fixed::ZERO {
            a + PI
        } else {
            a - PI
        }
    } else {
        let a = atan_unit(x / z);
        if z > Fixed::ZERO {
            FRAC_PI_2 - a
        } else {
            -FRAC_PI_2 - a
        }
    }
}

/// Wrap an angle into `(-pi, pi]`.
#[must_use]
pub fn wrap_angle(mut a: Fixed) -> Fixed {
    while a > PI {
        a -= TAU;
    }
    while a <= -PI {
        a += TAU;
    }
    a
}

/// Shortest signed angle from `current` to `target`.
#[must_use]
pub fn angle_diff(target: Fixed, current: Fixed) -> Fixed {
    wrap_angle(target - current)
}

/// Heading (yaw) of a ground-plane direction vector.
#[must_use]
pub fn heading_of(dir: Vec2Fixed) -> Fixed {
    fixed_atan2(dir.z, dir.x)
}
