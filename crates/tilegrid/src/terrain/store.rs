use std::collections::BTreeSet;

use tracing::{debug, info, warn};

use crate::entity::EntityId;
use crate::grid::{GridGeometry, GridSize, Projection, TileCoord, TileLookup, Vec2};
use crate::occupancy::{Claim, OccupancyIndex};

use super::records::{DecorRecord, SpriteSource, TerrainLayer, TileRecord};
use super::visuals::{DrawPlacement, NoopVisuals, TerrainVisuals};

const NEIGHBOR_OFFSETS: [TileCoord; 4] = [
    TileCoord::new(1, 0),
    TileCoord::new(-1, 0),
    TileCoord::new(0, 1),
    TileCoord::new(0, -1),
];

#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct TerrainCell {
    pub(crate) tile: Option<TileRecord>,
    pub(crate) transition: Option<DecorRecord>,
    pub(crate) detail: Option<DecorRecord>,
    pub(crate) height: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileEdit {
    Rejected,
    Applied { height_changed: bool },
}

impl TileEdit {
    pub fn is_applied(self) -> bool {
        matches!(self, Self::Applied { .. })
    }
}

/// Authoritative tile, transition and detail records plus per-cell heights,
/// stored densely (row-major) for the current grid size.
pub struct TerrainStore {
    geometry: GridGeometry,
    cells: Vec<TerrainCell>,
    default_tile: TileRecord,
    visuals: Box<dyn TerrainVisuals>,
}

impl TerrainStore {
    /// Creates a grid of `geometry.size()` cells filled with `default_tile`.
    pub fn new(geometry: GridGeometry, default_tile: TileRecord) -> Self {
        let fill = TerrainCell {
            tile: Some(default_tile.clone()),
            ..TerrainCell::default()
        };
        Self {
            cells: vec![fill; geometry.size().cell_count()],
            geometry,
            default_tile,
            visuals: Box::new(NoopVisuals),
        }
    }

    pub fn set_visuals(&mut self, visuals: Box<dyn TerrainVisuals>) {
        self.visuals = visuals;
        self.redraw_all();
    }

    pub fn geometry(&self) -> &GridGeometry {
        &self.geometry
    }

    pub fn size(&self) -> GridSize {
        self.geometry.size()
    }

    pub fn default_tile(&self) -> &TileRecord {
        &self.default_tile
    }

    pub fn tile(&self, tile: TileCoord) -> Option<&TileRecord> {
        self.cell(tile).and_then(|cell| cell.tile.as_ref())
    }

    pub fn transition(&self, tile: TileCoord) -> Option<&DecorRecord> {
        self.cell(tile).and_then(|cell| cell.transition.as_ref())
    }

    pub fn detail(&self, tile: TileCoord) -> Option<&DecorRecord> {
        self.cell(tile).and_then(|cell| cell.detail.as_ref())
    }

    /// Height offset of a cell; 0 for unset or out-of-grid cells.
    pub fn tile_height(&self, tile: TileCoord) -> f32 {
        self.cell(tile).map(|cell| cell.height).unwrap_or(0.0)
    }

    /// Replaces the tile record of a cell. `None` clears the cell (tile,
    /// transition, detail and height).
    ///
    /// Rejected without any change when the cell is out of the grid, or when
    /// an entity holds its collision claim and the edit would either remove
    /// the tile or make it colliding.
    pub fn set_tile(
        &mut self,
        tile: TileCoord,
        record: Option<TileRecord>,
        height: f32,
        occupancy: &mut OccupancyIndex,
    ) -> TileEdit {
        let Some(index) = self.size().index_of(tile) else {
            return TileEdit::Rejected;
        };
        let held_by_entity = matches!(occupancy.claim_at(tile), Some(Claim::Entity(_)));
        let wants_collision = record.as_ref().is_some_and(|record| record.collision);
        if held_by_entity && (record.is_none() || wants_collision) {
            warn!(x = tile.x, z = tile.z, "tile_edit_rejected_cell_blocked");
            return TileEdit::Rejected;
        }

        let old_height = self.cells[index].height;
        match record {
            None => self.clear_cell(index, tile, occupancy),
            Some(record) => {
                if record.collision {
                    occupancy.claim_terrain(tile);
                } else {
                    occupancy.release_terrain(tile);
                }
                let cell = &mut self.cells[index];
                cell.tile = Some(record);
                cell.height = height;
                self.draw_cell(tile);
            }
        }

        let height_changed = self.cells[index].height != old_height;
        if height_changed {
            for offset in NEIGHBOR_OFFSETS {
                self.draw_cell(tile.offset(offset));
            }
        }
        TileEdit::Applied { height_changed }
    }

    /// Sets or clears the transition layer. A transition needs a tile
    /// underneath it.
    pub fn set_transition(&mut self, tile: TileCoord, record: Option<DecorRecord>) -> bool {
        self.set_decor(TerrainLayer::Transition, tile, record)
    }

    /// Sets or clears the detail layer. A detail needs a tile underneath it.
    pub fn set_detail(&mut self, tile: TileCoord, record: Option<DecorRecord>) -> bool {
        self.set_decor(TerrainLayer::Detail, tile, record)
    }

    fn set_decor(
        &mut self,
        layer: TerrainLayer,
        tile: TileCoord,
        record: Option<DecorRecord>,
    ) -> bool {
        let Some(index) = self.size().index_of(tile) else {
            return false;
        };
        let cell = &mut self.cells[index];
        if record.is_some() && cell.tile.is_none() {
            return false;
        }
        let slot = match layer {
            TerrainLayer::Transition => &mut cell.transition,
            TerrainLayer::Detail => &mut cell.detail,
            TerrainLayer::Tile => return false,
        };
        *slot = record;
        self.draw_cell(tile);
        true
    }

    /// Resizes the grid. Dropped cells are cleared first (releasing terrain
    /// claims), new cells get the default non-colliding tile. Returns the
    /// entities the occupancy index evicted, or `None` (nothing changed) when
    /// `size` exceeds the cell limit.
    pub fn set_num_tiles(
        &mut self,
        size: GridSize,
        occupancy: &mut OccupancyIndex,
    ) -> Option<Vec<EntityId>> {
        let Some(cell_count) = size.checked_cell_count() else {
            warn!(x = size.x, z = size.z, "terrain_resize_rejected_too_large");
            return None;
        };
        let old_size = self.size();
        if old_size == size {
            return Some(Vec::new());
        }

        for z in 0..old_size.z as i32 {
            for x in 0..old_size.x as i32 {
                let tile = TileCoord::new(x, z);
                if size.contains(tile) {
                    continue;
                }
                if let Some(index) = old_size.index_of(tile) {
                    self.clear_cell(index, tile, occupancy);
                }
            }
        }

        let fill = TerrainCell {
            tile: Some(self.default_tile.clone()),
            ..TerrainCell::default()
        };
        let mut cells = Vec::with_capacity(cell_count);
        for z in 0..size.z as i32 {
            for x in 0..size.x as i32 {
                let tile = TileCoord::new(x, z);
                let cell = match old_size.index_of(tile) {
                    Some(index) => std::mem::take(&mut self.cells[index]),
                    None => fill.clone(),
                };
                cells.push(cell);
            }
        }
        self.cells = cells;
        self.geometry.set_size(size);
        let evicted = occupancy.set_bounds(size);

        for z in 0..size.z as i32 {
            for x in 0..size.x as i32 {
                let tile = TileCoord::new(x, z);
                if !old_size.contains(tile) {
                    self.draw_cell(tile);
                }
            }
        }
        info!(
            old_x = old_size.x,
            old_z = old_size.z,
            new_x = size.x,
            new_z = size.z,
            evicted = evicted.len(),
            "terrain_resized"
        );
        Some(evicted)
    }

    /// Pointer hit test against drawn tiles, nearest first, honouring height.
    /// Holes and invisible tiles are skipped; when nothing is hit the flat
    /// analytic lookup is returned.
    pub fn pick_tile(&self, point: Vec2) -> TileLookup {
        if self.geometry.projection() == Projection::Isometric {
            let size = self.size();
            let max_sum = (size.x as i32 - 1) + (size.z as i32 - 1);
            for sum in 0..=max_sum {
                for x in 0..=sum {
                    let tile = TileCoord::new(x, sum - x);
                    let Some(cell) = self.cell(tile) else {
                        continue;
                    };
                    let drawn = cell
                        .tile
                        .as_ref()
                        .is_some_and(|record| record.texture.is_some());
                    if drawn && self.geometry.contains_point(tile, cell.height, point) {
                        return TileLookup { tile, valid: true };
                    }
                }
            }
        }
        self.geometry.world_to_tile(point)
    }

    pub fn place_highlight(&mut self, tile: Option<TileCoord>) {
        match tile.filter(|tile| self.size().contains(*tile)) {
            Some(tile) => {
                let placement = self.placement(tile, TerrainLayer::Detail);
                self.visuals.place_highlight(tile, placement);
            }
            None => self.visuals.clear_highlight(),
        }
    }

    /// Every texture name the terrain refers to, across all layers.
    pub fn referenced_textures(&self) -> BTreeSet<String> {
        let mut textures = BTreeSet::new();
        for cell in &self.cells {
            let names = [
                cell.tile.as_ref().and_then(|record| record.texture.as_ref()),
                cell.transition
                    .as_ref()
                    .and_then(|record| record.texture.as_ref()),
                cell.detail.as_ref().and_then(|record| record.texture.as_ref()),
            ];
            textures.extend(names.into_iter().flatten().cloned());
        }
        textures
    }

    /// Drops every record (leaving holes) and releases every terrain claim.
    pub fn clear(&mut self, occupancy: &mut OccupancyIndex) {
        let size = self.size();
        for z in 0..size.z as i32 {
            for x in 0..size.x as i32 {
                let tile = TileCoord::new(x, z);
                if let Some(index) = size.index_of(tile) {
                    self.clear_cell(index, tile, occupancy);
                }
            }
        }
        debug!(x = size.x, z = size.z, "terrain_cleared");
    }

    /// Swaps in a fully built grid. Callers have already validated `cells`
    /// against `size`; occupancy is reset to the new bounds.
    pub(crate) fn replace_all(
        &mut self,
        size: GridSize,
        cells: Vec<TerrainCell>,
        occupancy: &mut OccupancyIndex,
    ) {
        self.clear(occupancy);
        occupancy.clear();
        occupancy.set_bounds(size);
        self.geometry.set_size(size);
        self.cells = cells;
        for z in 0..size.z as i32 {
            for x in 0..size.x as i32 {
                let tile = TileCoord::new(x, z);
                if self.tile(tile).is_some_and(|record| record.collision) {
                    occupancy.claim_terrain(tile);
                }
            }
        }
        self.redraw_all();
    }

    pub(crate) fn cell(&self, tile: TileCoord) -> Option<&TerrainCell> {
        self.size()
            .index_of(tile)
            .and_then(|index| self.cells.get(index))
    }

    pub(crate) fn redraw_all(&mut self) {
        for z in 0..self.size().z as i32 {
            for x in 0..self.size().x as i32 {
                self.draw_cell(TileCoord::new(x, z));
            }
        }
    }

    fn clear_cell(&mut self, index: usize, tile: TileCoord, occupancy: &mut OccupancyIndex) {
        if let Some(cell) = self.cells.get_mut(index) {
            *cell = TerrainCell::default();
        }
        occupancy.release_terrain(tile);
        for layer in [TerrainLayer::Tile, TerrainLayer::Transition, TerrainLayer::Detail] {
            self.visuals.remove(layer, tile);
        }
    }

    pub(crate) fn draw_cell(&mut self, tile: TileCoord) {
        let Some(index) = self.size().index_of(tile) else {
            return;
        };
        let placements = [
            self.placement(tile, TerrainLayer::Tile),
            self.placement(tile, TerrainLayer::Transition),
            self.placement(tile, TerrainLayer::Detail),
        ];
        let cell = &self.cells[index];
        let visuals = &mut self.visuals;
        match &cell.tile {
            Some(record) => visuals.place(TerrainLayer::Tile, tile, record.into(), placements[0]),
            None => visuals.remove(TerrainLayer::Tile, tile),
        }
        match &cell.transition {
            Some(record) => visuals.place(
                TerrainLayer::Transition,
                tile,
                SpriteSource::from(record),
                placements[1],
            ),
            None => visuals.remove(TerrainLayer::Transition, tile),
        }
        match &cell.detail {
            Some(record) => visuals.place(
                TerrainLayer::Detail,
                tile,
                SpriteSource::from(record),
                placements[2],
            ),
            None => visuals.remove(TerrainLayer::Detail, tile),
        }
    }

    fn placement(&self, tile: TileCoord, layer: TerrainLayer) -> DrawPlacement {
        let layer_rank = match layer {
            TerrainLayer::Tile => 0,
            TerrainLayer::Transition => 1,
            TerrainLayer::Detail => 2,
        };
        DrawPlacement {
            position: self.geometry.tile_to_world(tile, self.tile_height(tile)),
            depth: self.geometry.draw_depth(tile).saturating_mul(4) + layer_rank,
        }
    }
}
