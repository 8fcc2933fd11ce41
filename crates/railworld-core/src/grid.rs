//! Two-level spatial grid: kilometer squares lazily subdivided into
//! sectors.
//!
//! Sector and square addressing is integer column/row derived from world
//! x/z. Out-of-bounds lookups yield no sector and callers skip; the world
//! edge is not an error. Squares and sectors materialize on first mutable
//! access, so an empty scene costs nothing.

use std::collections::HashMap;

use crate::id::{NodeId, SectorCoord};
use crate::math::Vec3;

/// Meters per kilometer square side.
pub const SQUARE_SIZE: f64 = 1000.0;

/// Render-class lists kept per sector. Each class is a singly linked list
/// through `WorldNode::next_render`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderClass {
    /// Opaque geometry rendered from the shared sector buffer.
    Opaque,
    /// Opaque nodes rendered from their own buffer (switches, models).
    SoloOpaque,
    /// Alpha-blended, drawn back-to-front after opaque passes.
    Alpha,
    /// Traction spans and line geometry.
    Wires,
    /// Non-visual nodes polled every frame (sounds, launchers).
    Hidden,
    /// Texture-groupable geometry awaiting the sector sort.
    Pending,
    /// Members consumed into a mesh aggregate; kept for re-sorting.
    Meshed,
}

impl RenderClass {
    pub const COUNT: usize = 7;

    pub fn index(self) -> usize {
        match self {
            RenderClass::Opaque => 0,
            RenderClass::SoloOpaque => 1,
            RenderClass::Alpha => 2,
            RenderClass::Wires => 3,
            RenderClass::Hidden => 4,
            RenderClass::Pending => 5,
            RenderClass::Meshed => 6,
        }
    }
}

/// Geometry-cache state of a sector. `Unchecked` is distinct from stale:
/// a freshly sorted sector has not been compiled at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheState {
    #[default]
    Unchecked,
    /// Compiled under this recompile version; stale once the context
    /// version moves past it.
    Compiled(u32),
}

/// A 200 m (by default) grid cell holding node and render lists.
#[derive(Debug, Default)]
pub struct Sector {
    /// Head of the sector node list (`WorldNode::next_in_sector`).
    pub nodes: Option<NodeId>,
    pub node_count: usize,

    /// Render-class list heads (`WorldNode::next_render`).
    pub render: [Option<NodeId>; RenderClass::COUNT],

    /// Compact track array rebuilt by the classifier's sort; the topology
    /// search scans this, never the node list.
    pub tracks: Vec<NodeId>,

    pub cache: CacheState,
}

impl Sector {
    pub fn render_head(&self, class: RenderClass) -> Option<NodeId> {
        self.render[class.index()]
    }
}

/// A kilometer square: lazily created sectors plus the square's own node
/// list for geometry too large to confine to one sector.
#[derive(Debug)]
pub struct KilometerSquare {
    sectors: Vec<Option<Sector>>,

    /// Head of the square-level node list (large plain opaque triangles
    /// and terrain patches).
    pub nodes: Option<NodeId>,
    pub node_count: usize,

    /// Synthetic aggregate replacing the square node list after merging.
    pub merged: Option<NodeId>,

    /// Frame stamp; a square renders once per frame no matter how many
    /// traversals touch it.
    pub last_frame: u32,
}

impl KilometerSquare {
    fn new(sectors_per_square: usize) -> Self {
        let mut sectors = Vec::new();
        sectors.resize_with(sectors_per_square * sectors_per_square, || None);
        Self {
            sectors,
            nodes: None,
            node_count: 0,
            merged: None,
            last_frame: 0,
        }
    }
}

/// Probe offsets for ring searches around a sector, nearest first. Each
/// entry is mirrored over the four sign combinations, skipping the mirrors
/// that repeat when a component is zero.
pub const SECTOR_ORDER: [(i32, i32); 9] = [
    (0, 0),
    (1, 0),
    (0, 1),
    (1, 1),
    (2, 0),
    (0, 2),
    (2, 1),
    (1, 2),
    (2, 2),
];

/// Expand one [`SECTOR_ORDER`] entry into its probe coordinates around
/// `center`, in the deterministic sign order (+, +), (+, -), (-, +), (-, -).
pub fn ring_probes(center: SectorCoord, offset: (i32, i32)) -> Vec<SectorCoord> {
    let (dx, dy) = offset;
    let mut probes = vec![SectorCoord {
        col: center.col + dy,
        row: center.row + dx,
    }];
    if dx != 0 {
        probes.push(SectorCoord {
            col: center.col + dy,
            row: center.row - dx,
        });
    }
    if dy != 0 {
        probes.push(SectorCoord {
            col: center.col - dy,
            row: center.row + dx,
        });
    }
    if dx != 0 && dy != 0 {
        probes.push(SectorCoord {
            col: center.col - dy,
            row: center.row - dx,
        });
    }
    probes
}

/// The world grid.
#[derive(Debug)]
pub struct SpatialGrid {
    sectors_per_square: usize,
    sector_size: f64,
    /// Sectors per world side; valid columns and rows are `0..total`.
    total_sectors: i32,

    squares: HashMap<(i32, i32), KilometerSquare>,

    /// Catch-all sector for nodes without a position in the world, such as
    /// global launchers.
    pub global: Sector,
}

impl SpatialGrid {
    pub fn new(squares_per_side: usize, sectors_per_square: usize) -> Self {
        Self {
            sectors_per_square,
            sector_size: SQUARE_SIZE / sectors_per_square as f64,
            total_sectors: (squares_per_side * sectors_per_square) as i32,
            squares: HashMap::new(),
            global: Sector::default(),
        }
    }

    pub fn sector_size(&self) -> f64 {
        self.sector_size
    }

    pub fn sectors_per_square(&self) -> usize {
        self.sectors_per_square
    }

    /// Sector column for a world x (row uses z identically).
    pub fn axis_to_sector(&self, v: f64) -> i32 {
        (v / self.sector_size).floor() as i32 + self.total_sectors / 2
    }

    pub fn sector_of(&self, position: Vec3) -> SectorCoord {
        SectorCoord {
            col: self.axis_to_sector(position.x),
            row: self.axis_to_sector(position.z),
        }
    }

    fn in_bounds(&self, coord: SectorCoord) -> bool {
        coord.col >= 0
            && coord.row >= 0
            && coord.col < self.total_sectors
            && coord.row < self.total_sectors
    }

    fn split(&self, coord: SectorCoord) -> ((i32, i32), usize) {
        let n = self.sectors_per_square as i32;
        let square = (coord.col / n, coord.row / n);
        let sub = ((coord.row % n) * n + coord.col % n) as usize;
        (square, sub)
    }

    /// Existing sector, never allocating. `None` for out-of-bounds or
    /// never-touched cells.
    pub fn fast_sector(&self, coord: SectorCoord) -> Option<&Sector> {
        if !self.in_bounds(coord) {
            return None;
        }
        let (square, sub) = self.split(coord);
        self.squares.get(&square)?.sectors[sub].as_ref()
    }

    /// Existing sector, mutable, never allocating.
    pub fn fast_sector_mut(&mut self, coord: SectorCoord) -> Option<&mut Sector> {
        if !self.in_bounds(coord) {
            return None;
        }
        let (square, sub) = self.split(coord);
        self.squares.get_mut(&square)?.sectors[sub].as_mut()
    }

    /// Sector, created on demand. `None` only out of bounds.
    pub fn sector_mut(&mut self, coord: SectorCoord) -> Option<&mut Sector> {
        if !self.in_bounds(coord) {
            return None;
        }
        let (square, sub) = self.split(coord);
        let per = self.sectors_per_square;
        let square = self
            .squares
            .entry(square)
            .or_insert_with(|| KilometerSquare::new(per));
        Some(square.sectors[sub].get_or_insert_with(Sector::default))
    }

    /// Kilometer square containing a sector, created on demand.
    pub fn square_mut(&mut self, coord: SectorCoord) -> Option<&mut KilometerSquare> {
        if !self.in_bounds(coord) {
            return None;
        }
        let (square, _) = self.split(coord);
        let per = self.sectors_per_square;
        Some(
            self.squares
                .entry(square)
                .or_insert_with(|| KilometerSquare::new(per)),
        )
    }

    /// Square addressed directly by square column/row (for terrain patches
    /// whose name encodes the square).
    pub fn square_by_code_mut(&mut self, col: i32, row: i32) -> Option<&mut KilometerSquare> {
        let n = self.sectors_per_square as i32;
        self.square_mut(SectorCoord {
            col: col * n,
            row: row * n,
        })
    }

    /// Every materialized sector, for whole-world passes.
    pub fn sectors_mut(&mut self) -> impl Iterator<Item = &mut Sector> {
        self.squares
            .values_mut()
            .flat_map(|sq| sq.sectors.iter_mut().filter_map(|s| s.as_mut()))
            .chain(std::iter::once(&mut self.global))
    }

    /// Every materialized square with its column/row key, for whole-world
    /// passes such as the terrain export.
    pub fn squares(&self) -> impl Iterator<Item = ((i32, i32), &KilometerSquare)> {
        self.squares.iter().map(|(&key, square)| (key, square))
    }

    /// All sector coordinates currently materialized.
    pub fn sector_coords(&self) -> Vec<SectorCoord> {
        let n = self.sectors_per_square as i32;
        let mut coords = Vec::new();
        for (&(sc, sr), square) in &self.squares {
            for (i, sector) in square.sectors.iter().enumerate() {
                if sector.is_some() {
                    let i = i as i32;
                    coords.push(SectorCoord {
                        col: sc * n + i % n,
                        row: sr * n + i / n,
                    });
                }
            }
        }
        coords
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> SpatialGrid {
        SpatialGrid::new(500, 5)
    }

    #[test]
    fn origin_maps_to_grid_center() {
        let g = grid();
        let c = g.sector_of(Vec3::ZERO);
        assert_eq!(c.col, 1250);
        assert_eq!(c.row, 1250);
        // Just below the origin falls in the previous cell.
        let c = g.sector_of(Vec3::new(-0.1, 0.0, -0.1));
        assert_eq!(c.col, 1249);
        assert_eq!(c.row, 1249);
    }

    #[test]
    fn fast_sector_never_allocates() {
        let mut g = grid();
        let coord = g.sector_of(Vec3::new(350.0, 0.0, -1200.0));
        assert!(g.fast_sector(coord).is_none());
        g.sector_mut(coord).unwrap();
        assert!(g.fast_sector(coord).is_some());
    }

    #[test]
    fn out_of_bounds_is_no_sector() {
        let mut g = grid();
        let far = g.sector_of(Vec3::new(300_000.0, 0.0, 0.0));
        assert!(g.sector_mut(far).is_none());
        assert!(g.fast_sector(far).is_none());
    }

    #[test]
    fn neighboring_sectors_share_a_square() {
        let mut g = grid();
        let a = g.sector_of(Vec3::new(10.0, 0.0, 10.0));
        let b = g.sector_of(Vec3::new(210.0, 0.0, 10.0));
        assert_ne!(a, b);
        g.sector_mut(a).unwrap();
        g.sector_mut(b).unwrap();
        assert_eq!(g.squares.len(), 1);
    }

    #[test]
    fn ring_probes_skip_degenerate_mirrors() {
        let c = SectorCoord { col: 100, row: 100 };
        assert_eq!(ring_probes(c, (0, 0)).len(), 1);
        assert_eq!(ring_probes(c, (1, 0)).len(), 2);
        assert_eq!(ring_probes(c, (0, 2)).len(), 2);
        assert_eq!(ring_probes(c, (1, 1)).len(), 4);
        let probes = ring_probes(c, (2, 1));
        assert_eq!(probes.len(), 4);
        assert_eq!(probes[0], SectorCoord { col: 101, row: 102 });
        assert_eq!(probes[1], SectorCoord { col: 101, row: 98 });
        assert_eq!(probes[2], SectorCoord { col: 99, row: 102 });
        assert_eq!(probes[3], SectorCoord { col: 99, row: 98 });
    }
}
