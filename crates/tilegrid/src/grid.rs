use serde::{Deserialize, Serialize};

/// Fractional tile coordinates closer than this to an integer snap onto it.
const FLOOR_SNAP_EPSILON: f32 = 1e-4;

/// Largest number of cells a grid may have (4096 × 4096).
pub const MAX_GRID_CELLS: usize = 1 << 24;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance_sq(self, other: Vec2) -> f32 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        dx * dx + dy * dy
    }

    pub fn is_zero(self) -> bool {
        self.x == 0.0 && self.y == 0.0
    }
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct TileCoord {
    pub x: i32,
    pub z: i32,
}

impl TileCoord {
    pub const ORIGIN: TileCoord = TileCoord { x: 0, z: 0 };

    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    pub fn offset(self, delta: TileCoord) -> TileCoord {
        TileCoord {
            x: self.x.saturating_add(delta.x),
            z: self.z.saturating_add(delta.z),
        }
    }

    pub fn delta_to(self, other: TileCoord) -> TileCoord {
        TileCoord {
            x: other.x.saturating_sub(self.x),
            z: other.z.saturating_sub(self.z),
        }
    }

    pub fn distance_sq(self, other: TileCoord) -> i64 {
        let dx = i64::from(other.x) - i64::from(self.x);
        let dz = i64::from(other.z) - i64::from(self.z);
        dx * dx + dz * dz
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridSize {
    pub x: u32,
    pub z: u32,
}

impl GridSize {
    pub const fn new(x: u32, z: u32) -> Self {
        Self { x, z }
    }

    pub fn contains(self, tile: TileCoord) -> bool {
        tile.x >= 0 && tile.z >= 0 && (tile.x as u32) < self.x && (tile.z as u32) < self.z
    }

    pub fn cell_count(self) -> usize {
        self.x as usize * self.z as usize
    }

    /// Cell count when it fits under [`MAX_GRID_CELLS`].
    pub fn checked_cell_count(self) -> Option<usize> {
        (self.x as usize)
            .checked_mul(self.z as usize)
            .filter(|count| *count <= MAX_GRID_CELLS)
    }

    pub fn is_supported(self) -> bool {
        self.checked_cell_count().is_some()
    }

    /// Row-major index (`x` varies fastest).
    pub fn index_of(self, tile: TileCoord) -> Option<usize> {
        if !self.contains(tile) {
            return None;
        }
        Some(tile.z as usize * self.x as usize + tile.x as usize)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Projection {
    #[default]
    Isometric,
    Orthogonal,
}

/// Result of a world → tile lookup. Out-of-grid points are reported with
/// `valid: false` rather than as an error; callers must check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileLookup {
    pub tile: TileCoord,
    pub valid: bool,
}

impl TileLookup {
    pub fn valid_tile(self) -> Option<TileCoord> {
        self.valid.then_some(self.tile)
    }
}

/// Conversions between tile indices and world space.
///
/// Isometric convention: world `y` grows downward, so tiles with a smaller
/// `x + z` sit nearer the viewer. Height offsets raise a tile (subtract from
/// `y`). The "flat" conversions ignore height entirely; tile lookups always go
/// through them so that height never feeds back into which tile a point is in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridGeometry {
    projection: Projection,
    tile_width: f32,
    tile_height: f32,
    origin: Vec2,
    size: GridSize,
}

impl GridGeometry {
    pub fn new(
        projection: Projection,
        tile_width: f32,
        tile_height: f32,
        origin: Vec2,
        size: GridSize,
    ) -> Self {
        Self {
            projection,
            tile_width,
            tile_height,
            origin,
            size,
        }
    }

    pub fn projection(&self) -> Projection {
        self.projection
    }

    pub fn tile_width(&self) -> f32 {
        self.tile_width
    }

    pub fn tile_height(&self) -> f32 {
        self.tile_height
    }

    pub fn size(&self) -> GridSize {
        self.size
    }

    pub(crate) fn set_size(&mut self, size: GridSize) {
        self.size = size;
    }

    pub fn tile_to_world(&self, tile: TileCoord, height_offset: f32) -> Vec2 {
        match self.projection {
            Projection::Isometric => {
                let flat = self.tile_to_world_flat(tile);
                Vec2 {
                    x: flat.x,
                    y: flat.y - height_offset,
                }
            }
            Projection::Orthogonal => self.tile_to_world_flat(tile),
        }
    }

    pub fn tile_to_world_flat(&self, tile: TileCoord) -> Vec2 {
        let tx = tile.x as f32;
        let tz = tile.z as f32;
        match self.projection {
            Projection::Isometric => Vec2 {
                x: (tx - tz) * self.tile_width * 0.5,
                y: -(tx + tz) * self.tile_height * 0.5,
            },
            Projection::Orthogonal => Vec2 {
                x: tx * self.tile_width + self.origin.x,
                y: tz * self.tile_height + self.origin.y,
            },
        }
    }

    /// Where an entity standing on `tile` is positioned. For the isometric
    /// projection this is the forward projection itself; orthogonal tiles are
    /// addressed by their corner, so the half-tile is added here.
    pub fn tile_center_flat(&self, tile: TileCoord) -> Vec2 {
        let anchor = self.tile_to_world_flat(tile);
        match self.projection {
            Projection::Isometric => anchor,
            Projection::Orthogonal => Vec2 {
                x: anchor.x + self.tile_width * 0.5,
                y: anchor.y + self.tile_height * 0.5,
            },
        }
    }

    /// Fractional tile coordinates of a world point on the flat grid. Cell
    /// `(x, z)` covers `[x, x + 1) × [z, z + 1)`.
    pub fn world_to_continuous(&self, world: Vec2) -> (f32, f32) {
        match self.projection {
            Projection::Isometric => {
                // Inverse of the forward matrix [[w/2, -w/2], [-h/2, -h/2]]
                // with the half-tile bias that puts tile centres at +0.5.
                let x = world.x;
                let y = world.y - self.tile_height * 0.5;
                let u = x / self.tile_width - y / self.tile_height;
                let v = -x / self.tile_width - y / self.tile_height;
                (u, v)
            }
            Projection::Orthogonal => (
                (world.x - self.origin.x) / self.tile_width,
                (world.y - self.origin.y) / self.tile_height,
            ),
        }
    }

    pub fn world_to_tile(&self, world: Vec2) -> TileLookup {
        let (u, v) = self.world_to_continuous(world);
        let tile = TileCoord {
            x: floor_snapped(u),
            z: floor_snapped(v),
        };
        TileLookup {
            tile,
            valid: self.size.contains(tile),
        }
    }

    /// True when the point lies within `epsilon` (in tile units) of a corner
    /// shared by four tiles.
    pub fn is_near_intersection(&self, world: Vec2, epsilon: f32) -> bool {
        let (u, v) = self.world_to_continuous(world);
        near_integer(u, epsilon) && near_integer(v, epsilon)
    }

    /// Shape test against the drawn footprint of a tile: a diamond for the
    /// isometric projection, a rectangle for the orthogonal one.
    pub fn contains_point(&self, tile: TileCoord, height_offset: f32, point: Vec2) -> bool {
        match self.projection {
            Projection::Isometric => {
                let center = self.tile_to_world(tile, height_offset);
                let half_w = self.tile_width * 0.5;
                let half_h = self.tile_height * 0.5;
                let dx = (point.x - center.x).abs() / half_w;
                let dy = (point.y - center.y).abs() / half_h;
                dx + dy <= 1.0
            }
            Projection::Orthogonal => {
                let corner = self.tile_to_world_flat(tile);
                point.x >= corner.x
                    && point.x < corner.x + self.tile_width
                    && point.y >= corner.y
                    && point.y < corner.y + self.tile_height
            }
        }
    }

    /// Back-to-front draw depth of a cell; larger values are drawn later.
    pub fn draw_depth(&self, tile: TileCoord) -> i32 {
        match self.projection {
            Projection::Isometric => -(tile.x + tile.z),
            Projection::Orthogonal => tile.z,
        }
    }
}

fn floor_snapped(value: f32) -> i32 {
    let rounded = value.round();
    if (value - rounded).abs() < FLOOR_SNAP_EPSILON {
        rounded as i32
    } else {
        value.floor() as i32
    }
}

fn near_integer(value: f32, epsilon: f32) -> bool {
    (value - value.round()).abs() <= epsilon
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iso(size: GridSize) -> GridGeometry {
        GridGeometry::new(Projection::Isometric, 256.0, 128.0, Vec2::ZERO, size)
    }

    fn ortho(size: GridSize) -> GridGeometry {
        GridGeometry::new(
            Projection::Orthogonal,
            32.0,
            32.0,
            Vec2 { x: -160.0, y: 48.5 },
            size,
        )
    }

    #[test]
    fn iso_round_trip_covers_whole_grid() {
        let geometry = iso(GridSize::new(24, 17));
        for x in 0..24 {
            for z in 0..17 {
                let tile = TileCoord::new(x, z);
                let lookup = geometry.world_to_tile(geometry.tile_to_world_flat(tile));
                assert_eq!(lookup, TileLookup { tile, valid: true }, "tile {x},{z}");
            }
        }
    }

    #[test]
    fn ortho_round_trip_covers_whole_grid() {
        let geometry = ortho(GridSize::new(13, 9));
        for x in 0..13 {
            for z in 0..9 {
                let tile = TileCoord::new(x, z);
                let lookup = geometry.world_to_tile(geometry.tile_to_world_flat(tile));
                assert_eq!(lookup, TileLookup { tile, valid: true }, "tile {x},{z}");
            }
        }
    }

    #[test]
    fn iso_forward_matches_projection_formula() {
        let geometry = iso(GridSize::new(10, 10));
        let world = geometry.tile_to_world(TileCoord::new(3, 1), 20.0);
        assert_eq!(world.x, 256.0);
        assert_eq!(world.y, -256.0 - 20.0);
    }

    #[test]
    fn tile_centers_are_never_on_an_intersection() {
        for geometry in [iso(GridSize::new(6, 6)), ortho(GridSize::new(6, 6))] {
            for x in 0..6 {
                for z in 0..6 {
                    let tile = TileCoord::new(x, z);
                    let center = geometry.tile_center_flat(tile);
                    assert!(!geometry.is_near_intersection(center, 0.05));
                    assert_eq!(geometry.world_to_tile(center).tile, tile);
                }
            }
        }
    }

    #[test]
    fn oversized_grids_are_not_supported() {
        assert_eq!(GridSize::new(16, 16).checked_cell_count(), Some(256));
        assert!(GridSize::new(4096, 4096).is_supported());
        assert!(!GridSize::new(4097, 4096).is_supported());
        assert!(!GridSize::new(u32::MAX, u32::MAX).is_supported());
    }

    #[test]
    fn lookups_outside_the_grid_are_invalid() {
        let geometry = iso(GridSize::new(4, 4));
        let lookup = geometry.world_to_tile(geometry.tile_to_world_flat(TileCoord::new(-1, 2)));
        assert_eq!(lookup.tile, TileCoord::new(-1, 2));
        assert!(!lookup.valid);
        let lookup = geometry.world_to_tile(geometry.tile_to_world_flat(TileCoord::new(4, 0)));
        assert!(!lookup.valid);
    }

    #[test]
    fn boundary_points_floor_into_the_cell_they_start() {
        let geometry = ortho(GridSize::new(8, 8));
        let boundary = Vec2 {
            x: -160.0 + 32.0 * 3.0,
            y: 48.5,
        };
        assert_eq!(geometry.world_to_tile(boundary).tile, TileCoord::new(3, 0));
        let just_before = Vec2 {
            x: boundary.x - 0.5,
            y: 48.5,
        };
        assert_eq!(geometry.world_to_tile(just_before).tile, TileCoord::new(2, 0));
        let below_zero = Vec2 {
            x: -160.0 - 1.0,
            y: 48.5,
        };
        assert_eq!(geometry.world_to_tile(below_zero).tile.x, -1);
    }

    #[test]
    fn intersection_detection_uses_tile_units() {
        let geometry = iso(GridSize::new(8, 8));
        // Shared corner of tiles (0,0), (1,0), (0,1), (1,1).
        let corner = Vec2 { x: 0.0, y: -128.0 + 64.0 };
        assert!(geometry.is_near_intersection(corner, 0.01));
        let center = geometry.tile_to_world_flat(TileCoord::new(1, 1));
        assert!(!geometry.is_near_intersection(center, 0.01));
    }

    #[test]
    fn diamond_containment_respects_height() {
        let geometry = iso(GridSize::new(8, 8));
        let tile = TileCoord::new(2, 2);
        let raised_center = geometry.tile_to_world(tile, 40.0);
        assert!(geometry.contains_point(tile, 40.0, raised_center));
        let flat_center = geometry.tile_to_world_flat(tile);
        assert!(geometry.contains_point(tile, 0.0, flat_center));
        let outside = Vec2 {
            x: flat_center.x + 100.0,
            y: flat_center.y + 40.0,
        };
        assert!(!geometry.contains_point(tile, 0.0, outside));
    }
}
