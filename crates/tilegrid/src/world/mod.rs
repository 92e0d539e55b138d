use std::collections::BTreeMap;
use std::path::Path;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, warn};

use crate::assets::{AssetLoader, LoadingStatus, PendingLoads};
use crate::character::{collapse_waypoints, CharacterController, CharacterState, Direction};
use crate::config::{CharacterSettings, ConfigError, WanderSettings, WorldConfig};
use crate::entity::{EntityId, EntityIdAllocator, GridEntity, GridEvent, PlaybackDirection};
use crate::grid::{GridGeometry, GridSize, TileCoord, TileLookup, Vec2};
use crate::movement::{EntityMap, MovementContext, MovementController, MovementOutcome};
use crate::occupancy::{Claim, OccupancyIndex};
use crate::pathfinding::{GridAStar, PathRequest, Pathfinder};
use crate::terrain::{
    DecorRecord, MapDocument, MapError, TerrainStore, TerrainVisuals, TileEdit, TileRecord,
};

include!("characters.rs");

/// One loaded map: terrain, occupancy, moving entities and characters.
///
/// Everything the grid needs is owned here and reached through `&mut self`;
/// there is no shared global state. Reloading a map resets all of it.
pub struct World {
    config: WorldConfig,
    terrain: TerrainStore,
    occupancy: OccupancyIndex,
    movement: MovementController,
    entities: EntityMap,
    characters: BTreeMap<EntityId, CharacterController>,
    ids: EntityIdAllocator,
    pathfinder: Box<dyn Pathfinder>,
    offsets: Vec<TileCoord>,
    rng: StdRng,
    loads: PendingLoads,
    terrain_ready: bool,
    events: Vec<GridEvent>,
}

impl World {
    /// Builds an empty world filled with the default tile. Fails when the
    /// config does not validate.
    pub fn new(config: WorldConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let size = config.grid_size();
        let geometry = GridGeometry::new(
            config.projection,
            config.tile_width,
            config.tile_height,
            config.origin,
            size,
        );
        let default_tile = TileRecord {
            texture: config.default_tile_texture.clone(),
            ..TileRecord::default()
        };
        let rng = match config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        info!(
            projection = ?config.projection,
            tiles_x = size.x,
            tiles_z = size.z,
            "world_created"
        );
        Ok(Self {
            terrain: TerrainStore::new(geometry, default_tile),
            occupancy: OccupancyIndex::new(size),
            movement: MovementController::new(config.intersection_epsilon),
            entities: EntityMap::new(),
            characters: BTreeMap::new(),
            ids: EntityIdAllocator::default(),
            pathfinder: Box::new(GridAStar),
            offsets: config.movement_offsets.offsets(),
            rng,
            loads: PendingLoads::default(),
            terrain_ready: true,
            events: Vec::new(),
            config,
        })
    }

    pub fn with_pathfinder(mut self, pathfinder: Box<dyn Pathfinder>) -> Self {
        self.pathfinder = pathfinder;
        self
    }

    pub fn with_visuals(mut self, visuals: Box<dyn TerrainVisuals>) -> Self {
        self.terrain.set_visuals(visuals);
        self
    }

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    pub fn terrain(&self) -> &TerrainStore {
        &self.terrain
    }

    pub fn occupancy(&self) -> &OccupancyIndex {
        &self.occupancy
    }

    pub fn geometry(&self) -> &GridGeometry {
        self.terrain.geometry()
    }

    // Map lifecycle

    /// Replaces the whole map. Entities, characters, motions, pending loads
    /// and queued events are dropped; on error nothing changes.
    pub fn load_map(&mut self, document: &MapDocument) -> Result<(), MapError> {
        self.terrain.import(document, &mut self.occupancy)?;
        let dropped = self.entities.len();
        self.entities.clear();
        self.characters.clear();
        self.movement.clear();
        self.ids.reset();
        self.loads.reset();
        self.terrain_ready = true;
        self.events.clear();
        info!(dropped_entities = dropped, "world_reset_for_map");
        Ok(())
    }

    pub fn load_map_json(&mut self, raw: &str) -> Result<(), MapError> {
        let document = MapDocument::from_json_str(raw)?;
        self.load_map(&document)
    }

    pub fn load_map_file(&mut self, path: &Path) -> Result<(), MapError> {
        let document = MapDocument::load(path)?;
        self.load_map(&document)
    }

    pub fn export_map(&self) -> MapDocument {
        self.terrain.export_document()
    }

    pub fn save_map_file(&self, path: &Path) -> Result<(), MapError> {
        self.export_map().save(path)?;
        info!(path = %path.display(), "map_saved");
        Ok(())
    }

    // Terrain

    /// Sets or clears (`None`) a tile. Entities standing on the cell are
    /// re-grounded when its height changes.
    pub fn set_tile(&mut self, tile: TileCoord, record: Option<TileRecord>, height: f32) -> bool {
        let edit = self.terrain.set_tile(tile, record, height, &mut self.occupancy);
        if edit == (TileEdit::Applied { height_changed: true }) {
            self.reground(tile);
        }
        edit.is_applied()
    }

    pub fn set_transition(&mut self, tile: TileCoord, record: Option<DecorRecord>) -> bool {
        self.terrain.set_transition(tile, record)
    }

    pub fn set_detail(&mut self, tile: TileCoord, record: Option<DecorRecord>) -> bool {
        self.terrain.set_detail(tile, record)
    }

    pub fn tile(&self, tile: TileCoord) -> Option<&TileRecord> {
        self.terrain.tile(tile)
    }

    pub fn transition(&self, tile: TileCoord) -> Option<&DecorRecord> {
        self.terrain.transition(tile)
    }

    pub fn detail(&self, tile: TileCoord) -> Option<&DecorRecord> {
        self.terrain.detail(tile)
    }

    pub fn tile_height(&self, tile: TileCoord) -> f32 {
        self.terrain.tile_height(tile)
    }

    pub fn num_tiles(&self) -> GridSize {
        self.terrain.size()
    }

    /// Grows or shrinks the grid. Entities pushed off the grid stay in the
    /// world but lose their grid registration and any motion. Sizes above
    /// [`crate::grid::MAX_GRID_CELLS`] cells are refused.
    pub fn set_num_tiles(&mut self, tiles_x: u32, tiles_z: u32) -> bool {
        let Some(evicted) = self
            .terrain
            .set_num_tiles(GridSize::new(tiles_x, tiles_z), &mut self.occupancy)
        else {
            return false;
        };
        for id in evicted {
            warn!(entity = id.0, "entity_evicted_by_resize");
            self.movement.cancel(id);
            if let Some(character) = self.characters.get_mut(&id) {
                character.clear_route();
            }
        }
        true
    }

    pub fn tile_to_world(&self, tile: TileCoord) -> Vec2 {
        self.geometry().tile_to_world(tile, self.tile_height(tile))
    }

    pub fn world_to_tile(&self, world: Vec2) -> TileLookup {
        self.geometry().world_to_tile(world)
    }

    pub fn pick_tile(&self, point: Vec2) -> TileLookup {
        self.terrain.pick_tile(point)
    }

    pub fn place_highlight(&mut self, tile: Option<TileCoord>) {
        self.terrain.place_highlight(tile);
    }

    fn reground(&mut self, tile: TileCoord) {
        let occupants = self.occupancy.objects_in_tile(tile).to_vec();
        for id in occupants {
            let Some(anchor) = self.occupancy.anchor_of(id) else {
                continue;
            };
            let height = self.terrain.tile_height(anchor);
            if let Some(entity) = self.entities.get_mut(&id) {
                entity.set_ground_height(height);
            }
        }
    }

    // Entities

    /// Adds an entity anchored at `anchor`, positioned on the tile's flat
    /// centre. `None` when the anchor is off the grid or any blocking cell is
    /// already claimed.
    pub fn add_entity(&mut self, mut entity: Box<dyn GridEntity>, anchor: TileCoord) -> Option<EntityId> {
        if !self.terrain.size().contains(anchor) {
            return None;
        }
        let footprint = entity.footprint().clone();
        if !self.occupancy.can_place(&footprint, anchor) {
            warn!(x = anchor.x, z = anchor.z, "entity_placement_rejected");
            return None;
        }
        let id = self.ids.allocate();
        if !self.occupancy.place(id, &footprint, anchor) {
            return None;
        }
        entity.set_world_position(self.geometry().tile_center_flat(anchor));
        entity.set_ground_height(self.terrain.tile_height(anchor));
        self.entities.insert(id, entity);
        debug!(entity = id.0, x = anchor.x, z = anchor.z, "entity_added");
        Some(id)
    }

    /// Removes an entity and every trace of it: grid claims, motion and
    /// character state.
    pub fn remove_entity(&mut self, id: EntityId) -> Option<Box<dyn GridEntity>> {
        self.occupancy.remove(id);
        self.movement.cancel(id);
        self.characters.remove(&id);
        for character in self.characters.values_mut() {
            if character.object_target == Some(id) {
                character.object_target = None;
            }
            if let Some(wander) = character.settings.wander.as_mut() {
                if wander.target == Some(id) {
                    wander.target = None;
                }
            }
        }
        self.entities.remove(&id)
    }

    pub fn entity(&self, id: EntityId) -> Option<&dyn GridEntity> {
        self.entities.get(&id).map(|entity| &**entity)
    }

    pub fn entity_mut(&mut self, id: EntityId) -> Option<&mut dyn GridEntity> {
        self.entities
            .get_mut(&id)
            .map(|entity| entity.as_mut() as &mut dyn GridEntity)
    }

    pub fn entity_ids(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.entities.keys().copied()
    }

    pub fn entity_tile(&self, id: EntityId) -> Option<TileCoord> {
        self.occupancy.anchor_of(id)
    }

    pub fn objects_in_tile(&self, tile: TileCoord) -> &[EntityId] {
        self.occupancy.objects_in_tile(tile)
    }

    pub fn is_blocked(&self, tile: TileCoord) -> bool {
        self.occupancy.is_blocked(tile)
    }

    /// Sends an entity to `tile` in a straight line at `speed` world units
    /// per second, or teleports it when `speed` is zero. Character routes are
    /// abandoned.
    pub fn move_object_to_tile(&mut self, id: EntityId, tile: TileCoord, speed: f32) -> bool {
        if !self.terrain.size().contains(tile) || !self.occupancy.contains(id) {
            return false;
        }
        let Some(position) = self.entities.get(&id).map(|entity| entity.world_position()) else {
            return false;
        };
        if let Some(character) = self.characters.get_mut(&id) {
            character.clear_route();
        }

        let center = self.geometry().tile_center_flat(tile);
        if speed > 0.0 {
            self.movement.move_to(id, tile, center, speed, position);
            return true;
        }

        self.movement.cancel(id);
        let from = self.occupancy.anchor_of(id);
        if !self.occupancy.move_entity(id, tile) {
            return false;
        }
        let height = self.terrain.tile_height(tile);
        if let Some(entity) = self.entities.get_mut(&id) {
            entity.set_world_position(center);
            entity.set_ground_height(height);
        }
        if let Some(from) = from.filter(|from| *from != tile) {
            self.emit(GridEvent::TileChanged {
                entity: id,
                from,
                to: tile,
            });
        }
        self.emit(GridEvent::MoveComplete { entity: id, tile });
        true
    }

    pub fn set_velocity(&mut self, id: EntityId, velocity: Vec2) -> bool {
        if !self.occupancy.contains(id) {
            return false;
        }
        let Some(position) = self.entities.get(&id).map(|entity| entity.world_position()) else {
            return false;
        };
        self.movement.set_velocity(id, velocity, position);
        true
    }

    pub fn is_moving(&self, id: EntityId) -> bool {
        self.movement.is_moving(id)
    }

    /// Path from the entity's current tile to `goal`, start included; empty
    /// when unreachable.
    pub fn find_path(&self, id: EntityId, goal: TileCoord) -> Vec<TileCoord> {
        match self.occupancy.anchor_of(id) {
            Some(start) => self.find_path_from(id, start, goal),
            None => Vec::new(),
        }
    }

    fn find_path_from(&self, id: EntityId, start: TileCoord, goal: TileCoord) -> Vec<TileCoord> {
        let occupancy = &self.occupancy;
        let terrain = &self.terrain;
        let blocked = |tile: TileCoord| {
            occupancy
                .claim_at(tile)
                .is_some_and(|claim| claim != Claim::Entity(id))
                || !occupancy.can_move_to(id, tile)
        };
        let height = |tile: TileCoord| terrain.tile_height(tile);
        self.pathfinder.find_path(&PathRequest {
            start,
            goal,
            bounds: terrain.size(),
            blocked: &blocked,
            height: &height,
            max_step_height: self.config.max_step_height,
            allowed_offsets: &self.offsets,
        })
    }

    // Assets

    /// Requests every texture the terrain uses. `TerrainReady` is emitted
    /// once all of them have been reported through [`World::asset_loaded`],
    /// or right away when none are outstanding.
    pub fn request_terrain_assets(&mut self, loader: &mut dyn AssetLoader) {
        let mut pending = Vec::new();
        for name in self.terrain.referenced_textures() {
            match loader.loading_status(&name) {
                LoadingStatus::Loaded => {}
                LoadingStatus::Failed => warn!(texture = %name, "terrain_texture_failed"),
                LoadingStatus::Loading => pending.push(name),
                LoadingStatus::NotRequested => {
                    loader.load_image(&name);
                    pending.push(name);
                }
            }
        }
        self.terrain_ready = false;
        if self.loads.begin(pending) {
            self.mark_terrain_ready();
        }
    }

    pub fn asset_loaded(&mut self, name: &str) {
        if self.loads.finish(name) {
            self.mark_terrain_ready();
        }
    }

    pub fn is_terrain_ready(&self) -> bool {
        self.terrain_ready
    }

    pub fn pending_asset_count(&self) -> usize {
        self.loads.pending_count()
    }

    fn mark_terrain_ready(&mut self) {
        self.terrain_ready = true;
        info!("terrain_ready");
        self.emit(GridEvent::TerrainReady);
    }

    // Simulation

    /// Runs one simulation step of `dt` seconds: the movement sweep, then
    /// route bookkeeping, then idle behaviour.
    pub fn tick(&mut self, dt: f32) {
        let outcomes = self.movement.sweep(
            dt,
            MovementContext {
                terrain: &self.terrain,
                occupancy: &mut self.occupancy,
                entities: &mut self.entities,
            },
        );
        for outcome in outcomes {
            self.handle_outcome(outcome);
        }
        self.update_idle_characters();
    }

    pub fn drain_events(&mut self) -> Vec<GridEvent> {
        std::mem::take(&mut self.events)
    }

    fn handle_outcome(&mut self, outcome: MovementOutcome) {
        match outcome {
            MovementOutcome::TileChanged { entity, from, to } => {
                self.emit(GridEvent::TileChanged { entity, from, to });
            }
            MovementOutcome::Stuck {
                entity,
                tile,
                blocked,
            } => {
                self.emit(GridEvent::Stuck {
                    entity,
                    tile,
                    blocked,
                });
                self.abandon_route(entity);
            }
            MovementOutcome::Arrived { entity, tile } => {
                let routed = self
                    .characters
                    .get(&entity)
                    .and_then(CharacterController::head)
                    .is_some();
                if routed {
                    self.advance_route(entity, tile);
                } else {
                    self.emit(GridEvent::MoveComplete { entity, tile });
                }
            }
        }
    }

    fn emit(&mut self, event: GridEvent) {
        debug!(?event, "grid_event");
        if let Some(entity) = event.entity().and_then(|id| self.entities.get_mut(&id)) {
            entity.notify(&event);
        }
        self.events.push(event);
    }
}

#[cfg(test)]
mod tests {
    include!("tests.rs");
}
