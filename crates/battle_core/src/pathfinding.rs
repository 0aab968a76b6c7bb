//! Grid-based pathfinding with terrain costs and obstacle inflation.
//!
//! A uniform cost grid is built once from the terrain (and patched via
//! [`PathEngine::update_cell`] when structures appear or disappear).
//! Searches are budgeted per tick so a mass replan can never blow up a
//! single simulation tick; callers that miss the budget retry later.
//!
//! All calculations use fixed-point math for deterministic results
//! across platforms and clients.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

use serde::{Deserialize, Serialize};

use crate::math::{fixed_serde, fixed_sqrt, Fixed, Vec3Fixed, SQRT_2};
use crate::terrain::Terrain;

/// Side length of one navigation cell in world units.
pub const CELL_SIZE: Fixed = Fixed::const_from_int(4);

/// Straight-line search range cap, in cells (500 world units).
pub const MAX_SEARCH_CELLS: u32 = 125;

/// A* iteration cap per search.
pub const MAX_ITERATIONS: u32 = 2_000;

/// Shared A* invocation budget per simulation tick.
pub const SEARCHES_PER_TICK: u32 = 5;

/// Navigation cost grid.
///
/// Each cell holds a movement cost: 1 for normal ground, graduated up
/// to 5 for steep-but-passable slopes, `None` for impassable cells
/// (water, structures, slope beyond 45 degrees, missing terrain data at
/// the map edge).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavGrid {
    width: u32,
    height: u32,
    /// Per-cell base cost (raw fixed bits), before obstacle inflation.
    base: Vec<Option<i64>>,
    /// Per-cell effective cost after obstacle inflation.
    cost: Vec<Option<i64>>,
    /// Per-cell terrain elevation (raw fixed bits) for waypoint heights.
    elevation: Vec<i64>,
}

/// Kind-specific base cost. Roads path like open ground; the road speed
/// bonus is applied by unit movement, not by the grid.
fn kind_cost(kind: crate::terrain::TerrainKind) -> Option<Fixed> {
    use crate::terrain::TerrainKind;
    match kind {
        TerrainKind::Open | TerrainKind::Road => Some(Fixed::ONE),
        TerrainKind::Forest => Some(Fixed::from_num(2)),
        TerrainKind::Water | TerrainKind::Structure | TerrainKind::Void => None,
    }
}

impl NavGrid {
    /// Build a grid covering the terrain extent.
    #[must_use]
    pub fn from_terrain(terrain: &dyn Terrain) -> Self {
        let (w, d) = terrain.extent();
        let width = (w / CELL_SIZE).to_num::<i64>().max(1) as u32;
        let height = (d / CELL_SIZE).to_num::<i64>().max(1) as u32;
        let count = (width as usize) * (height as usize);

        let mut grid = Self {
            width,
            height,
            base: vec![None; count],
            cost: vec![None; count],
            elevation: vec![0; count],
        };

        for cz in 0..height {
            for cx in 0..width {
                let idx = grid.index(cx, cz);
                let (x, z) = grid.cell_center(cx, cz);
                let base = grid.derive_base_cost(terrain, cx, cz).map(Fixed::to_bits);
                grid.elevation[idx] = terrain.elevation_at(x, z).to_bits();
                grid.base[idx] = base;
            }
        }

        grid.reinflate_all();
        grid
    }

    /// Per-cell cost from terrain kind plus 4-direction slope sampling.
    fn derive_base_cost(&self, terrain: &dyn Terrain, cx: u32, cz: u32) -> Option<Fixed> {
        let (x, z) = self.cell_center(cx, cz);
        let kind = terrain.kind_at(x, z);
        let base = kind_cost(kind)?;

        let here = terrain.elevation_at(x, z);
        let mut max_rise = Fixed::ZERO;
        for (dx, dz) in [(1i64, 0i64), (-1, 0), (0, 1), (0, -1)] {
            let nx = x + Fixed::from_num(dx) * CELL_SIZE;
            let nz = z + Fixed::from_num(dz) * CELL_SIZE;
            let rise = (terrain.elevation_at(nx, nz) - here).abs();
            if rise > max_rise {
                max_rise = rise;
            }
        }

        // Rise over one cell length; ratio above 1 is steeper than 45 degrees.
        let ratio = max_rise / CELL_SIZE;
        if ratio > Fixed::ONE {
            return None;
        }

        let slope_cost = Fixed::ONE + ratio * Fixed::from_num(4);
        Some(if slope_cost > base { slope_cost } else { base })
    }

    /// Re-derive effective costs for every cell from base costs.
    fn reinflate_all(&mut self) {
        for cz in 0..self.height {
            for cx in 0..self.width {
                let idx = self.index(cx, cz);
                let inflated = self.inflated_cost(cx, cz).map(Fixed::to_bits);
                self.cost[idx] = inflated;
            }
        }
    }

    /// Obstacle inflation: the strongest nearby-blocked factor applies.
    /// x5 within 1.5 cells of a blocked cell, x2 within 2.5 cells.
    fn inflated_cost(&self, cx: u32, cz: u32) -> Option<Fixed> {
        let base = self.base_cost(cx, cz)?;

        let mut factor = 1i64;
        for dz in -2i64..=2 {
            for dx in -2i64..=2 {
                if dx == 0 && dz == 0 {
                    continue;
                }
                let nx = i64::from(cx) + dx;
                let nz = i64::from(cz) + dz;
                if nx < 0 || nz < 0 || nx >= i64::from(self.width) || nz >= i64::from(self.height) {
                    continue;
                }
                if self.base_cost(nx as u32, nz as u32).is_some() {
                    continue;
                }
                let dist_sq = dx * dx + dz * dz;
                if dist_sq <= 2 {
                    factor = factor.max(5);
                } else if dist_sq <= 6 {
                    factor = factor.max(2);
                }
            }
        }

        Some(base * Fixed::from_num(factor))
    }

    #[inline]
    fn index(&self, cx: u32, cz: u32) -> usize {
        (cz as usize) * (self.width as usize) + (cx as usize)
    }

    /// Grid width in cells.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Grid height in cells.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Check if coordinates are within grid bounds.
    #[must_use]
    pub fn in_bounds(&self, cx: u32, cz: u32) -> bool {
        cx < self.width && cz < self.height
    }

    /// Base cost before inflation. `None` for blocked or out of bounds.
    #[must_use]
    pub fn base_cost(&self, cx: u32, cz: u32) -> Option<Fixed> {
        if self.in_bounds(cx, cz) {
            self.base[self.index(cx, cz)].map(Fixed::from_bits)
        } else {
            None
        }
    }

    /// Effective (inflated) cost. `None` for blocked or out of bounds.
    #[must_use]
    pub fn cell_cost(&self, cx: u32, cz: u32) -> Option<Fixed> {
        if self.in_bounds(cx, cz) {
            self.cost[self.index(cx, cz)].map(Fixed::from_bits)
        } else {
            None
        }
    }

    /// Whether a cell can be entered at all.
    #[must_use]
    pub fn is_passable(&self, cx: u32, cz: u32) -> bool {
        self.cell_cost(cx, cz).is_some()
    }

    /// Convert world position to grid coordinates.
    #[must_use]
    pub fn world_to_grid(&self, pos: Vec3Fixed) -> Option<(u32, u32)> {
        if pos.x < Fixed::ZERO || pos.z < Fixed::ZERO {
            return None;
        }
        let cx = (pos.x / CELL_SIZE).to_num::<i64>();
        let cz = (pos.z / CELL_SIZE).to_num::<i64>();
        if cx >= 0 && cx < i64::from(self.width) && cz >= 0 && cz < i64::from(self.height) {
            Some((cx as u32, cz as u32))
        } else {
            None
        }
    }

    fn cell_center(&self, cx: u32, cz: u32) -> (Fixed, Fixed) {
        let half = CELL_SIZE / Fixed::from_num(2);
        (
            Fixed::from_num(cx) * CELL_SIZE + half,
            Fixed::from_num(cz) * CELL_SIZE + half,
        )
    }

    /// Convert grid coordinates to a world position at the cell center,
    /// with the terrain elevation sampled at build time.
    #[must_use]
    pub fn grid_to_world(&self, cx: u32, cz: u32) -> Vec3Fixed {
        let (x, z) = self.cell_center(cx, cz);
        let y = Fixed::from_bits(self.elevation[self.index(cx, cz)]);
        Vec3Fixed::new(x, y, z)
    }

    /// Re-derive one cell from the terrain (e.g. after a structure was
    /// destroyed) and re-apply inflation in its neighborhood.
    pub fn update_cell(&mut self, pos: Vec3Fixed, terrain: &dyn Terrain) {
        let Some((cx, cz)) = self.world_to_grid(pos) else {
            return;
        };
        let idx = self.index(cx, cz);
        let (x, z) = self.cell_center(cx, cz);
        let base = self.derive_base_cost(terrain, cx, cz).map(Fixed::to_bits);
        self.elevation[idx] = terrain.elevation_at(x, z).to_bits();
        self.base[idx] = base;
        self.reinflate_window(cx, cz);
    }

    /// Mark the cell containing `pos` impassable (a structure was placed).
    pub fn block_cell(&mut self, pos: Vec3Fixed) {
        let Some((cx, cz)) = self.world_to_grid(pos) else {
            return;
        };
        let idx = self.index(cx, cz);
        self.base[idx] = None;
        self.reinflate_window(cx, cz);
    }

    /// Recompute effective costs for cells whose inflation can be
    /// affected by a change at (cx, cz).
    fn reinflate_window(&mut self, cx: u32, cz: u32) {
        for dz in -2i64..=2 {
            for dx in -2i64..=2 {
                let nx = i64::from(cx) + dx;
                let nz = i64::from(cz) + dz;
                if nx < 0 || nz < 0 || nx >= i64::from(self.width) || nz >= i64::from(self.height) {
                    continue;
                }
                let idx = self.index(nx as u32, nz as u32);
                let inflated = self.inflated_cost(nx as u32, nz as u32).map(Fixed::to_bits);
                self.cost[idx] = inflated;
            }
        }
    }

    /// Line-of-sight between two world positions, sampled every half cell.
    #[must_use]
    pub fn has_line_of_sight(&self, start: Vec3Fixed, end: Vec3Fixed) -> bool {
        let dist = start.ground_distance(end);
        let step = CELL_SIZE / Fixed::from_num(2);
        if dist <= step {
            return true;
        }

        let steps = (dist / step).to_num::<i64>();
        let dir = start.ground_direction_to(end);
        for i in 0..=steps {
            let d = step * Fixed::from_num(i);
            let p = start.offset(dir.scale(d));
            match self.world_to_grid(p) {
                Some((cx, cz)) if self.is_passable(cx, cz) => {}
                _ => return false,
            }
        }
        // The stepped samples may fall short of the endpoint.
        match self.world_to_grid(end) {
            Some((cx, cz)) => self.is_passable(cx, cz),
            None => false,
        }
    }
}

/// A node in the A* open set priority queue.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
struct AStarNode {
    cx: u32,
    cz: u32,
    /// f_score = g_score + heuristic.
    f_score: Fixed,
    /// Tie-breaker for determinism: lower coordinates first.
    tie_breaker: u64,
}

impl Ord for AStarNode {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; reverse for min-heap behavior.
        match other.f_score.cmp(&self.f_score) {
            Ordering::Equal => other.tie_breaker.cmp(&self.tie_breaker),
            ord => ord,
        }
    }
}

impl PartialOrd for AStarNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[inline]
fn coords_to_tie_breaker(cx: u32, cz: u32) -> u64 {
    (u64::from(cz) << 32) | u64::from(cx)
}

/// Direction offsets for 8-directional movement.
const DIRECTIONS: [(i32, i32); 8] = [
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
    (-1, 0),
    (-1, -1),
    (0, -1),
    (1, -1),
];

/// Straight-line heuristic in cell units.
///
/// Deliberately inadmissible once terrain cost multipliers exceed the
/// diagonal discount; traded for speed and kept because changing it
/// would change observable paths.
#[inline]
fn euclid_heuristic(x1: u32, z1: u32, x2: u32, z2: u32) -> Fixed {
    let dx = Fixed::from_num(x1.abs_diff(x2));
    let dz = Fixed::from_num(z1.abs_diff(z2));
    fixed_sqrt(dx * dx + dz * dz)
}

/// Pathfinding engine: the cost grid plus the shared per-tick search
/// budget. Owned by the battle world, reachable by units through the
/// context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathEngine {
    /// The navigation grid.
    pub grid: NavGrid,
    searches_left: u32,
}

impl PathEngine {
    /// Build an engine over a terrain map with a full budget.
    #[must_use]
    pub fn new(terrain: &dyn Terrain) -> Self {
        Self {
            grid: NavGrid::from_terrain(terrain),
            searches_left: SEARCHES_PER_TICK,
        }
    }

    /// Restore the per-tick search budget. Called by the world at the
    /// start of every tick.
    pub fn reset_budget(&mut self) {
        self.searches_left = SEARCHES_PER_TICK;
    }

    /// Remaining searches this tick.
    #[must_use]
    pub const fn searches_left(&self) -> u32 {
        self.searches_left
    }

    /// Find a smoothed path between two world positions.
    ///
    /// Returns `None` when the budget is exhausted, either endpoint is
    /// off-grid or blocked, the goal is beyond the straight-line range
    /// cap, or no route exists within the iteration cap. Callers treat
    /// every `None` the same way: nothing productive this tick.
    pub fn find_path(&mut self, start: Vec3Fixed, goal: Vec3Fixed) -> Option<Vec<Vec3Fixed>> {
        if self.searches_left == 0 {
            tracing::trace!("path budget exhausted, deferring search");
            return None;
        }
        self.searches_left -= 1;

        let (sx, sz) = self.grid.world_to_grid(start)?;
        let (gx, gz) = self.grid.world_to_grid(goal)?;

        if !self.grid.is_passable(sx, sz) || !self.grid.is_passable(gx, gz) {
            return None;
        }

        if sx == gx && sz == gz {
            let cell = self.grid.grid_to_world(gx, gz);
            return Some(vec![Vec3Fixed::new(goal.x, cell.y, goal.z)]);
        }

        let range = Fixed::from_num(MAX_SEARCH_CELLS);
        if euclid_heuristic(sx, sz, gx, gz) > range {
            tracing::debug!("path goal beyond range cap");
            return None;
        }

        let raw = self.search(sx, sz, gx, gz)?;
        let mut smoothed = self.smooth(raw);
        // The last waypoint lands on the exact goal, not the cell
        // center it falls in.
        if let Some(last) = smoothed.last_mut() {
            last.x = goal.x;
            last.z = goal.z;
        }
        Some(smoothed)
    }

    /// Core A* over 8-directional neighbors.
    fn search(&self, sx: u32, sz: u32, gx: u32, gz: u32) -> Option<Vec<Vec3Fixed>> {
        let mut open_set: BinaryHeap<AStarNode> = BinaryHeap::new();
        let mut came_from: HashMap<(u32, u32), (u32, u32)> = HashMap::new();
        let mut g_score: HashMap<(u32, u32), Fixed> = HashMap::new();

        g_score.insert((sx, sz), Fixed::ZERO);
        open_set.push(AStarNode {
            cx: sx,
            cz: sz,
            f_score: euclid_heuristic(sx, sz, gx, gz),
            tie_breaker: coords_to_tie_breaker(sx, sz),
        });

        let mut iterations = 0u32;

        while let Some(current) = open_set.pop() {
            iterations += 1;
            if iterations > MAX_ITERATIONS {
                tracing::debug!("path search iteration cap hit");
                return None;
            }

            if current.cx == gx && current.cz == gz {
                return Some(self.reconstruct(&came_from, gx, gz));
            }

            let current_g = g_score
                .get(&(current.cx, current.cz))
                .copied()
                .unwrap_or(Fixed::MAX);

            for &(dx, dz) in &DIRECTIONS {
                let nx = current.cx as i32 + dx;
                let nz = current.cz as i32 + dz;
                if nx < 0 || nz < 0 {
                    continue;
                }
                let nx = nx as u32;
                let nz = nz as u32;
                if !self.grid.in_bounds(nx, nz) {
                    continue;
                }

                let Some(cell_cost) = self.grid.cell_cost(nx, nz) else {
                    continue;
                };

                // No corner cutting past blocked cells on diagonals.
                if dx != 0
                    && dz != 0
                    && (!self.grid.is_passable((current.cx as i32 + dx) as u32, current.cz)
                        || !self.grid.is_passable(current.cx, (current.cz as i32 + dz) as u32))
                {
                    continue;
                }

                let step = if dx != 0 && dz != 0 {
                    SQRT_2 * cell_cost
                } else {
                    cell_cost
                };

                let tentative_g = current_g + step;
                let neighbor_g = g_score.get(&(nx, nz)).copied().unwrap_or(Fixed::MAX);

                if tentative_g < neighbor_g {
                    came_from.insert((nx, nz), (current.cx, current.cz));
                    g_score.insert((nx, nz), tentative_g);
                    open_set.push(AStarNode {
                        cx: nx,
                        cz: nz,
                        f_score: tentative_g + euclid_heuristic(nx, nz, gx, gz),
                        tie_breaker: coords_to_tie_breaker(nx, nz),
                    });
                }
            }
        }

        None
    }

    fn reconstruct(
        &self,
        came_from: &HashMap<(u32, u32), (u32, u32)>,
        gx: u32,
        gz: u32,
    ) -> Vec<Vec3Fixed> {
        let mut path = Vec::new();
        let mut current = (gx, gz);
        path.push(self.grid.grid_to_world(current.0, current.1));
        while let Some(&prev) = came_from.get(&current) {
            path.push(self.grid.grid_to_world(prev.0, prev.1));
            current = prev;
        }
        path.reverse();
        path
    }

    /// Greedily skip to the farthest waypoint with clear line of sight.
    fn smooth(&self, path: Vec<Vec3Fixed>) -> Vec<Vec3Fixed> {
        if path.len() <= 2 {
            return path;
        }

        let mut smoothed = Vec::with_capacity(path.len());
        smoothed.push(path[0]);

        let mut current = 0;
        while current < path.len() - 1 {
            let mut furthest = current + 1;
            for check in (current + 2)..path.len() {
                if self.grid.has_line_of_sight(path[current], path[check]) {
                    furthest = check;
                }
            }
            smoothed.push(path[furthest]);
            current = furthest;
        }

        smoothed
    }

    /// Spiral outward from the goal in grid rings, returning the first
    /// position reachable from `start`. Each verification runs a real
    /// (budgeted) path search.
    pub fn find_nearest_reachable(
        &mut self,
        start: Vec3Fixed,
        goal: Vec3Fixed,
        max_radius: Fixed,
    ) -> Option<Vec3Fixed> {
        let (gx, gz) = self.grid.world_to_grid(goal)?;
        let max_ring = (max_radius / CELL_SIZE).to_num::<i64>().max(1);

        for ring in 0..=max_ring {
            for dz in -ring..=ring {
                for dx in -ring..=ring {
                    // Ring perimeter only.
                    if dx.abs() != ring && dz.abs() != ring {
                        continue;
                    }
                    let cx = i64::from(gx) + dx;
                    let cz = i64::from(gz) + dz;
                    if cx < 0 || cz < 0 {
                        continue;
                    }
                    let (cx, cz) = (cx as u32, cz as u32);
                    if !self.grid.in_bounds(cx, cz) || !self.grid.is_passable(cx, cz) {
                        continue;
                    }
                    let candidate = self.grid.grid_to_world(cx, cz);
                    if self.searches_left == 0 {
                        return None;
                    }
                    if self.find_path(start, candidate).is_some() {
                        return Some(candidate);
                    }
                }
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terrain::{HeightMap, TerrainKind};

    fn fx(n: f64) -> Fixed {
        Fixed::from_num(n)
    }

    fn pos(x: f64, z: f64) -> Vec3Fixed {
        Vec3Fixed::new(fx(x), Fixed::ZERO, fx(z))
    }

    /// 20x20 cell flat map (80x80 world units).
    fn open_map() -> HeightMap {
        HeightMap::flat(20, 20, CELL_SIZE)
    }

    /// Map with a full-height water band at cell x = 10.
    fn walled_map() -> HeightMap {
        let mut map = open_map();
        for cz in 0..20 {
            map.set_kind(fx(42.0), fx(cz as f64 * 4.0 + 2.0), TerrainKind::Water);
        }
        map
    }

    #[test]
    fn test_simple_path_reaches_goal() {
        let mut engine = PathEngine::new(&open_map());
        let path = engine.find_path(pos(2.0, 2.0), pos(70.0, 70.0)).unwrap();
        assert!(!path.is_empty());
        let last = path.last().unwrap();
        assert!(last.ground_distance(pos(70.0, 70.0)) < CELL_SIZE);
    }

    #[test]
    fn test_same_cell_path_is_near_zero_length() {
        let mut engine = PathEngine::new(&open_map());
        let path = engine.find_path(pos(10.0, 10.0), pos(10.0, 10.0)).unwrap();
        assert_eq!(path.len(), 1);
    }

    #[test]
    fn test_impassable_band_returns_none() {
        let mut engine = PathEngine::new(&walled_map());
        assert!(engine.find_path(pos(2.0, 40.0), pos(78.0, 40.0)).is_none());
    }

    #[test]
    fn test_path_avoids_water() {
        let mut map = open_map();
        // Partial wall: water at cell x = 10 except the top row.
        for cz in 1..20 {
            map.set_kind(fx(42.0), fx(cz as f64 * 4.0 + 2.0), TerrainKind::Water);
        }
        let mut engine = PathEngine::new(&map);
        let path = engine.find_path(pos(2.0, 40.0), pos(78.0, 40.0)).unwrap();
        for p in &path {
            let (cx, cz) = engine.grid.world_to_grid(*p).unwrap();
            assert!(engine.grid.is_passable(cx, cz));
        }
    }

    #[test]
    fn test_budget_exhaustion_returns_none() {
        let mut engine = PathEngine::new(&open_map());
        for _ in 0..SEARCHES_PER_TICK {
            assert!(engine.find_path(pos(2.0, 2.0), pos(70.0, 70.0)).is_some());
        }
        assert!(engine.find_path(pos(2.0, 2.0), pos(70.0, 70.0)).is_none());

        engine.reset_budget();
        assert!(engine.find_path(pos(2.0, 2.0), pos(70.0, 70.0)).is_some());
    }

    #[test]
    fn test_steep_slope_blocks() {
        let mut map = open_map();
        // 8 units of rise across one 4-unit cell: steeper than 45 degrees.
        map.set_elevation(fx(42.0), fx(42.0), fx(8.0));
        let grid = NavGrid::from_terrain(&map);
        // The raised cell and its cardinal neighbors see a >1 rise ratio.
        let (cx, cz) = grid.world_to_grid(pos(42.0, 42.0)).unwrap();
        assert!(!grid.is_passable(cx, cz));
    }

    #[test]
    fn test_moderate_slope_costs_more() {
        let mut map = open_map();
        // 2 units of rise over a 4-unit cell: passable, graduated cost.
        map.set_elevation(fx(42.0), fx(42.0), fx(2.0));
        let grid = NavGrid::from_terrain(&map);
        let (cx, cz) = grid.world_to_grid(pos(42.0, 42.0)).unwrap();
        let cost = grid.base_cost(cx, cz).unwrap();
        assert!(cost > Fixed::ONE && cost <= fx(5.0), "cost {cost:?}");
    }

    #[test]
    fn test_obstacle_inflation_raises_neighbor_costs() {
        let mut map = open_map();
        map.set_kind(fx(42.0), fx(42.0), TerrainKind::Water);
        let grid = NavGrid::from_terrain(&map);

        let (wx, wz) = grid.world_to_grid(pos(42.0, 42.0)).unwrap();
        // Adjacent cell: x5.
        assert_eq!(grid.cell_cost(wx + 1, wz), Some(fx(5.0)));
        // Two cells out: x2.
        assert_eq!(grid.cell_cost(wx + 2, wz), Some(fx(2.0)));
        // Three cells out: untouched.
        assert_eq!(grid.cell_cost(wx + 3, wz), Some(Fixed::ONE));
    }

    #[test]
    fn test_update_cell_reopens_terrain() {
        let mut map = walled_map();
        let mut engine = PathEngine::new(&map);
        assert!(engine.find_path(pos(2.0, 40.0), pos(78.0, 40.0)).is_none());

        // The wall cell at z = 40 reverts to open ground.
        map.set_kind(fx(42.0), fx(42.0), TerrainKind::Open);
        engine.grid.update_cell(pos(42.0, 42.0), &map);

        engine.reset_budget();
        assert!(engine.find_path(pos(2.0, 42.0), pos(78.0, 42.0)).is_some());
    }

    #[test]
    fn test_block_cell_closes_terrain() {
        let mut engine = PathEngine::new(&open_map());
        engine.grid.block_cell(pos(42.0, 42.0));
        let (cx, cz) = engine.grid.world_to_grid(pos(42.0, 42.0)).unwrap();
        assert!(!engine.grid.is_passable(cx, cz));
        // Inflation applied around the new obstacle.
        assert_eq!(engine.grid.cell_cost(cx + 1, cz), Some(fx(5.0)));
    }

    #[test]
    fn test_smoothing_straightens_open_ground() {
        let mut engine = PathEngine::new(&open_map());
        let path = engine.find_path(pos(2.0, 2.0), pos(70.0, 2.0)).unwrap();
        // A straight corridor should collapse to start and end.
        assert!(path.len() <= 2, "expected smoothed path, got {}", path.len());
    }

    #[test]
    fn test_nearest_reachable_falls_back_to_ring() {
        let mut map = open_map();
        // Island goal: surround cell (10, 10) with water.
        for dz in -1i64..=1 {
            for dx in -1i64..=1 {
                if dx == 0 && dz == 0 {
                    continue;
                }
                map.set_kind(
                    fx(42.0 + dx as f64 * 4.0),
                    fx(42.0 + dz as f64 * 4.0),
                    TerrainKind::Water,
                );
            }
        }
        let mut engine = PathEngine::new(&map);
        let found = engine
            .find_nearest_reachable(pos(2.0, 2.0), pos(42.0, 42.0), fx(40.0))
            .unwrap();
        // Lands somewhere outside the water ring, reachable from start.
        assert!(found.ground_distance(pos(42.0, 42.0)) >= CELL_SIZE);
        engine.reset_budget();
        assert!(engine.find_path(pos(2.0, 2.0), found).is_some());
    }

    #[test]
    fn test_range_cap_rejects_far_goals() {
        let map = HeightMap::flat(200, 200, CELL_SIZE);
        let mut engine = PathEngine::new(&map);
        // 190 cells apart, beyond the 125-cell cap.
        assert!(engine.find_path(pos(2.0, 2.0), pos(762.0, 2.0)).is_none());
    }

    #[test]
    fn test_determinism() {
        let map = walled_map();
        let mut e1 = PathEngine::new(&map);
        let mut e2 = PathEngine::new(&map);
        let p1 = e1.find_path(pos(2.0, 2.0), pos(78.0, 78.0));
        let p2 = e2.find_path(pos(2.0, 2.0), pos(78.0, 78.0));
        assert_eq!(p1, p2);
    }
}
