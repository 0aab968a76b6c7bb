//! Terrain sampling seam between the map and the simulation.
//!
//! The core never owns map generation; it samples elevation and terrain
//! kind through the [`Terrain`] trait. [`HeightMap`] is the concrete,
//! serializable implementation the battle world carries (and the one
//! tests build synthetic maps with).

use serde::{Deserialize, Serialize};

use crate::math::{fixed_serde, Fixed, Vec2Fixed};

/// Terrain classification at a sample point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TerrainKind {
    /// Open ground.
    #[default]
    Open,
    /// Road. Grants a movement bonus and enables overtaking lanes.
    Road,
    /// Forest. Slower to path through, conceals routing units.
    Forest,
    /// Water. Impassable to ground units.
    Water,
    /// Static structure footprint. Impassable.
    Structure,
    /// No terrain data (outside the map). Impassable.
    Void,
}

impl TerrainKind {
    /// Whether ground units can enter cells of this kind at all.
    #[must_use]
    pub const fn is_passable(self) -> bool {
        !matches!(self, Self::Water | Self::Structure | Self::Void)
    }

    /// Whether this kind conceals a unit from enemy observation.
    #[must_use]
    pub const fn is_cover(self) -> bool {
        matches!(self, Self::Forest | Self::Structure)
    }
}

/// Read access to map elevation and terrain classification.
pub trait Terrain {
    /// Elevation at a world position. Positions outside the map return zero.
    fn elevation_at(&self, x: Fixed, z: Fixed) -> Fixed;

    /// Terrain kind at a world position. Outside the map returns [`TerrainKind::Void`].
    fn kind_at(&self, x: Fixed, z: Fixed) -> TerrainKind;

    /// Map extent in world units (width, depth).
    fn extent(&self) -> (Fixed, Fixed);

    /// Slope ratio (rise over run) between a position and a point
    /// `lookahead` units along `dir`. A ratio above 1 is steeper than 45
    /// degrees.
    fn slope_ratio(&self, x: Fixed, z: Fixed, dir: Vec2Fixed, lookahead: Fixed) -> Fixed {
        if lookahead <= Fixed::ZERO {
            return Fixed::ZERO;
        }
        let here = self.elevation_at(x, z);
        let there = self.elevation_at(x + dir.x * lookahead, z + dir.z * lookahead);
        (there - here).abs() / lookahead
    }
}

/// Grid-sampled terrain map. Samples are nearest-cell, matching the
/// pathfinding grid resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeightMap {
    width: u32,
    depth: u32,
    #[serde(with = "fixed_serde")]
    cell_size: Fixed,
    elevation: Vec<i64>,
    kinds: Vec<TerrainKind>,
}

impl HeightMap {
    /// Create a flat, open map of `width` x `depth` cells.
    ///
    /// # Panics
    ///
    /// Panics if `width` or `depth` is zero or `cell_size` is not positive.
    #[must_use]
    pub fn flat(width: u32, depth: u32, cell_size: Fixed) -> Self {
        assert!(width > 0, "HeightMap width must be positive");
        assert!(depth > 0, "HeightMap depth must be positive");
        assert!(cell_size > Fixed::ZERO, "HeightMap cell_size must be positive");

        let count = (width as usize) * (depth as usize);
        Self {
            width,
            depth,
            cell_size,
            elevation: vec![0; count],
            kinds: vec![TerrainKind::Open; count],
        }
    }

    /// Width in cells.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Depth in cells.
    #[must_use]
    pub const fn depth(&self) -> u32 {
        self.depth
    }

    /// Cell size in world units.
    #[must_use]
    pub const fn cell_size(&self) -> Fixed {
        self.cell_size
    }

    fn cell_index(&self, x: Fixed, z: Fixed) -> Option<usize> {
        if x < Fixed::ZERO || z < Fixed::ZERO {
            return None;
        }
        let cx = (x / self.cell_size).to_num::<i64>();
        let cz = (z / self.cell_size).to_num::<i64>();
        if cx >= 0 && cx < i64::from(self.width) && cz >= 0 && cz < i64::from(self.depth) {
            Some((cz as usize) * (self.width as usize) + (cx as usize))
        } else {
            None
        }
    }

    /// Set the elevation of the cell containing a world position.
    pub fn set_elevation(&mut self, x: Fixed, z: Fixed, elevation: Fixed) {
        if let Some(idx) = self.cell_index(x, z) {
            self.elevation[idx] = elevation.to_bits();
        }
    }

    /// Set the terrain kind of the cell containing a world position.
    pub fn set_kind(&mut self, x: Fixed, z: Fixed, kind: TerrainKind) {
        if let Some(idx) = self.cell_index(x, z) {
            self.kinds[idx] = kind;
        }
    }
}

impl Terrain for HeightMap {
    fn elevation_at(&self, x: Fixed, z: Fixed) -> Fixed {
        self.cell_index(x, z)
            .map_or(Fixed::ZERO, |idx| Fixed::from_bits(self.elevation[idx]))
    }

    fn kind_at(&self, x: Fixed, z: Fixed) -> TerrainKind {
        self.cell_index(x, z)
            .map_or(TerrainKind::Void, |idx| self.kinds[idx])
    }

    fn extent(&self) -> (Fixed, Fixed) {
        (
            Fixed::from_num(self.width) * self.cell_size,
            Fixed::from_num(self.depth) * self.cell_size,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fx(n: f64) -> Fixed {
        Fixed::from_num(n)
    }

    #[test]
    fn test_flat_map_samples() {
        let map = HeightMap::flat(10, 10, fx(4.0));
        assert_eq!(map.elevation_at(fx(5.0), fx(5.0)), Fixed::ZERO);
        assert_eq!(map.kind_at(fx(5.0), fx(5.0)), TerrainKind::Open);
    }

    #[test]
    fn test_out_of_bounds_is_void() {
        let map = HeightMap::flat(10, 10, fx(4.0));
        assert_eq!(map.kind_at(fx(-1.0), fx(0.0)), TerrainKind::Void);
        assert_eq!(map.kind_at(fx(41.0), fx(0.0)), TerrainKind::Void);
        assert!(!TerrainKind::Void.is_passable());
    }

    #[test]
    fn test_set_and_sample_kind() {
        let mut map = HeightMap::flat(10, 10, fx(4.0));
        map.set_kind(fx(10.0), fx(10.0), TerrainKind::Water);
        assert_eq!(map.kind_at(fx(11.0), fx(9.0)), TerrainKind::Water);
        assert!(!map.kind_at(fx(11.0), fx(9.0)).is_passable());
    }

    #[test]
    fn test_slope_ratio() {
        let mut map = HeightMap::flat(10, 1, fx(4.0));
        // Cells at x = 0..4 and 4..8; 6 units of rise over a 4 unit run.
        map.set_elevation(fx(6.0), fx(2.0), fx(6.0));
        let ratio = map.slope_ratio(
            fx(2.0),
            fx(2.0),
            Vec2Fixed::new(Fixed::ONE, Fixed::ZERO),
            fx(4.0),
        );
        assert_eq!(ratio, fx(1.5));
    }

    #[test]
    fn test_cover_classification() {
        assert!(TerrainKind::Forest.is_cover());
        assert!(!TerrainKind::Open.is_cover());
        assert!(!TerrainKind::Road.is_cover());
    }
}
