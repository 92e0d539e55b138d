use crate::grid::{TileCoord, Vec2};

use super::records::{SpriteSource, TerrainLayer};

/// Where a cell's sprite goes: its raised world position and a back-to-front
/// depth (larger is drawn later).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawPlacement {
    pub position: Vec2,
    pub depth: i32,
}

/// Rendering collaborator. The store tells it which cell sprites exist and
/// where they sit; how they are drawn is up to the implementation.
pub trait TerrainVisuals {
    /// Creates or updates the sprite of `layer` at `tile`.
    fn place(
        &mut self,
        layer: TerrainLayer,
        tile: TileCoord,
        source: SpriteSource<'_>,
        placement: DrawPlacement,
    );
    fn remove(&mut self, layer: TerrainLayer, tile: TileCoord);
    fn place_highlight(&mut self, tile: TileCoord, placement: DrawPlacement);
    fn clear_highlight(&mut self);
}

#[derive(Debug, Default)]
pub struct NoopVisuals;

impl TerrainVisuals for NoopVisuals {
    fn place(
        &mut self,
        _layer: TerrainLayer,
        _tile: TileCoord,
        _source: SpriteSource<'_>,
        _placement: DrawPlacement,
    ) {
    }

    fn remove(&mut self, _layer: TerrainLayer, _tile: TileCoord) {}

    fn place_highlight(&mut self, _tile: TileCoord, _placement: DrawPlacement) {}

    fn clear_highlight(&mut self) {}
}
