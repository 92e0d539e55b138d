use std::collections::HashMap;

use crate::entity::EntityId;
use crate::grid::{GridSize, TileCoord};

/// Cells an entity covers, relative to its anchor tile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Footprint {
    /// Cells the entity is listed in for queries. Never exclusive.
    pub grid_map: Vec<TileCoord>,
    /// Cells the entity blocks for other collidable entities. `None` means
    /// the entity never blocks anything.
    pub collision_map: Option<Vec<TileCoord>>,
}

impl Default for Footprint {
    fn default() -> Self {
        Self {
            grid_map: vec![TileCoord::ORIGIN],
            collision_map: None,
        }
    }
}

impl Footprint {
    pub fn single_blocking() -> Self {
        Self {
            grid_map: vec![TileCoord::ORIGIN],
            collision_map: Some(vec![TileCoord::ORIGIN]),
        }
    }

    /// `width × depth` block of cells starting at the anchor.
    pub fn rect(width: u32, depth: u32, blocking: bool) -> Self {
        let mut cells = Vec::with_capacity(width as usize * depth as usize);
        for x in 0..width as i32 {
            for z in 0..depth as i32 {
                cells.push(TileCoord::new(x, z));
            }
        }
        Self {
            collision_map: blocking.then(|| cells.clone()),
            grid_map: cells,
        }
    }

    pub fn is_blocking(&self) -> bool {
        self.collision_map
            .as_ref()
            .is_some_and(|cells| !cells.is_empty())
    }

    fn grid_cells(&self, anchor: TileCoord) -> impl Iterator<Item = TileCoord> + '_ {
        self.grid_map.iter().map(move |offset| anchor.offset(*offset))
    }

    fn collision_cells(&self, anchor: TileCoord) -> impl Iterator<Item = TileCoord> + '_ {
        self.collision_map
            .iter()
            .flatten()
            .map(move |offset| anchor.offset(*offset))
    }
}

/// Who holds the exclusive blocking claim on a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Claim {
    /// A tile record marked `collision`.
    Terrain,
    Entity(EntityId),
}

#[derive(Debug, Clone)]
struct Registration {
    anchor: TileCoord,
    footprint: Footprint,
}

/// Grid-map (who touches a cell) and collision-map (who blocks a cell).
///
/// Invariant: for every registered entity with anchor `a` and collision
/// offsets `C`, `collision[a + c] == Entity(id)` for all `c` in `C`, and no
/// cell is ever claimed twice.
#[derive(Debug, Default)]
pub struct OccupancyIndex {
    bounds: GridSize,
    grid_map: HashMap<TileCoord, Vec<EntityId>>,
    collision_map: HashMap<TileCoord, Claim>,
    registrations: HashMap<EntityId, Registration>,
}

impl OccupancyIndex {
    pub fn new(bounds: GridSize) -> Self {
        Self {
            bounds,
            ..Self::default()
        }
    }

    pub fn bounds(&self) -> GridSize {
        self.bounds
    }

    pub fn can_place(&self, footprint: &Footprint, anchor: TileCoord) -> bool {
        self.cells_free_for(footprint, anchor, None)
    }

    /// Registers `entity` at `anchor`. Re-placing an entity that is already
    /// registered ignores its own current claims. Returns false and changes
    /// nothing when any collision cell is claimed or off the grid.
    pub fn place(&mut self, entity: EntityId, footprint: &Footprint, anchor: TileCoord) -> bool {
        if !self.cells_free_for(footprint, anchor, Some(entity)) {
            return false;
        }
        self.unregister(entity);
        self.register(entity, footprint.clone(), anchor);
        true
    }

    pub fn remove(&mut self, entity: EntityId) {
        self.unregister(entity);
    }

    pub fn can_move_to(&self, entity: EntityId, anchor: TileCoord) -> bool {
        let Some(registration) = self.registrations.get(&entity) else {
            return false;
        };
        self.cells_free_for(&registration.footprint, anchor, Some(entity))
    }

    /// Moves a registered entity to a new anchor with its own footprint.
    /// The check and the commit happen together; on failure nothing changes.
    pub fn move_entity(&mut self, entity: EntityId, anchor: TileCoord) -> bool {
        if !self.can_move_to(entity, anchor) {
            return false;
        }
        let Some(registration) = self.unregister(entity) else {
            return false;
        };
        self.register(entity, registration.footprint, anchor);
        true
    }

    pub fn objects_in_tile(&self, tile: TileCoord) -> &[EntityId] {
        self.grid_map
            .get(&tile)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn is_blocked(&self, tile: TileCoord) -> bool {
        self.collision_map.contains_key(&tile)
    }

    pub fn claim_at(&self, tile: TileCoord) -> Option<Claim> {
        self.collision_map.get(&tile).copied()
    }

    pub fn anchor_of(&self, entity: EntityId) -> Option<TileCoord> {
        self.registrations
            .get(&entity)
            .map(|registration| registration.anchor)
    }

    pub fn footprint_of(&self, entity: EntityId) -> Option<&Footprint> {
        self.registrations
            .get(&entity)
            .map(|registration| &registration.footprint)
    }

    pub fn contains(&self, entity: EntityId) -> bool {
        self.registrations.contains_key(&entity)
    }

    /// Marks a cell as blocked by terrain. Fails when an entity holds it.
    pub fn claim_terrain(&mut self, tile: TileCoord) -> bool {
        if !self.bounds.contains(tile) {
            return false;
        }
        match self.collision_map.get(&tile) {
            Some(Claim::Entity(_)) => false,
            Some(Claim::Terrain) => true,
            None => {
                self.collision_map.insert(tile, Claim::Terrain);
                true
            }
        }
    }

    pub fn release_terrain(&mut self, tile: TileCoord) {
        if self.collision_map.get(&tile) == Some(&Claim::Terrain) {
            self.collision_map.remove(&tile);
        }
    }

    /// Shrinks or grows the addressable area. Entities whose anchor or any
    /// collision cell falls outside the new bounds are unregistered and
    /// returned.
    pub fn set_bounds(&mut self, bounds: GridSize) -> Vec<EntityId> {
        self.bounds = bounds;
        let mut evicted: Vec<EntityId> = self
            .registrations
            .iter()
            .filter(|(_, registration)| {
                !bounds.contains(registration.anchor)
                    || registration
                        .footprint
                        .collision_cells(registration.anchor)
                        .any(|cell| !bounds.contains(cell))
            })
            .map(|(entity, _)| *entity)
            .collect();
        evicted.sort();
        for entity in &evicted {
            self.unregister(*entity);
        }
        self.collision_map.retain(|cell, _| bounds.contains(*cell));
        self.grid_map.retain(|cell, _| bounds.contains(*cell));
        evicted
    }

    pub fn clear(&mut self) {
        self.grid_map.clear();
        self.collision_map.clear();
        self.registrations.clear();
    }

    fn cells_free_for(
        &self,
        footprint: &Footprint,
        anchor: TileCoord,
        ignoring: Option<EntityId>,
    ) -> bool {
        footprint.collision_cells(anchor).all(|cell| {
            if !self.bounds.contains(cell) {
                return false;
            }
            match self.collision_map.get(&cell) {
                None => true,
                Some(Claim::Entity(owner)) => Some(*owner) == ignoring,
                Some(Claim::Terrain) => false,
            }
        })
    }

    fn register(&mut self, entity: EntityId, footprint: Footprint, anchor: TileCoord) {
        for cell in footprint.grid_cells(anchor) {
            if !self.bounds.contains(cell) {
                continue;
            }
            let occupants = self.grid_map.entry(cell).or_default();
            if !occupants.contains(&entity) {
                occupants.push(entity);
            }
        }
        for cell in footprint.collision_cells(anchor) {
            self.collision_map.insert(cell, Claim::Entity(entity));
        }
        self.registrations
            .insert(entity, Registration { anchor, footprint });
    }

    fn unregister(&mut self, entity: EntityId) -> Option<Registration> {
        let registration = self.registrations.remove(&entity)?;
        for cell in registration.footprint.grid_cells(registration.anchor) {
            if let Some(occupants) = self.grid_map.get_mut(&cell) {
                occupants.retain(|occupant| *occupant != entity);
                if occupants.is_empty() {
                    self.grid_map.remove(&cell);
                }
            }
        }
        for cell in registration.footprint.collision_cells(registration.anchor) {
            if self.collision_map.get(&cell) == Some(&Claim::Entity(entity)) {
                self.collision_map.remove(&cell);
            }
        }
        Some(registration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index() -> OccupancyIndex {
        OccupancyIndex::new(GridSize::new(10, 10))
    }

    fn blocking_pair() -> Footprint {
        Footprint {
            grid_map: vec![TileCoord::new(0, 0), TileCoord::new(1, 0)],
            collision_map: Some(vec![TileCoord::new(0, 0), TileCoord::new(1, 0)]),
        }
    }

    #[test]
    fn second_blocker_on_a_claimed_cell_is_rejected_without_side_effects() {
        let mut occupancy = index();
        let first = EntityId(1);
        let second = EntityId(2);
        assert!(occupancy.place(first, &Footprint::single_blocking(), TileCoord::new(3, 2)));

        assert!(!occupancy.place(second, &blocking_pair(), TileCoord::new(2, 2)));
        assert_eq!(occupancy.objects_in_tile(TileCoord::new(2, 2)), &[] as &[EntityId]);
        assert_eq!(occupancy.objects_in_tile(TileCoord::new(3, 2)), &[first]);
        assert_eq!(
            occupancy.claim_at(TileCoord::new(3, 2)),
            Some(Claim::Entity(first))
        );
        assert!(!occupancy.is_blocked(TileCoord::new(2, 2)));
        assert!(!occupancy.contains(second));
    }

    #[test]
    fn two_by_two_placement_is_all_or_nothing() {
        let mut occupancy = index();
        assert!(occupancy.claim_terrain(TileCoord::new(5, 6)));
        let building = EntityId(9);
        assert!(!occupancy.place(building, &Footprint::rect(2, 2, true), TileCoord::new(4, 5)));
        for cell in [(4, 5), (5, 5), (4, 6), (5, 6)] {
            let tile = TileCoord::new(cell.0, cell.1);
            assert!(
                !occupancy.objects_in_tile(tile).contains(&building),
                "cell {tile:?} lists the rejected building"
            );
        }
        assert_eq!(occupancy.claim_at(TileCoord::new(5, 6)), Some(Claim::Terrain));
        assert!(occupancy.place(building, &Footprint::rect(2, 2, true), TileCoord::new(1, 1)));
    }

    #[test]
    fn non_blocking_entities_share_cells() {
        let mut occupancy = index();
        let tile = TileCoord::new(4, 4);
        assert!(occupancy.place(EntityId(1), &Footprint::default(), tile));
        assert!(occupancy.place(EntityId(2), &Footprint::default(), tile));
        assert!(occupancy.place(EntityId(3), &Footprint::single_blocking(), tile));
        assert_eq!(
            occupancy.objects_in_tile(tile),
            &[EntityId(1), EntityId(2), EntityId(3)]
        );
        assert!(!occupancy.place(EntityId(4), &Footprint::single_blocking(), tile));
    }

    #[test]
    fn move_keeps_own_claims_and_respects_others() {
        let mut occupancy = index();
        let mover = EntityId(1);
        let wall = EntityId(2);
        assert!(occupancy.place(mover, &blocking_pair(), TileCoord::new(0, 0)));
        assert!(occupancy.place(wall, &Footprint::single_blocking(), TileCoord::new(3, 0)));

        // Overlaps its own old cell (1,0).
        assert!(occupancy.move_entity(mover, TileCoord::new(1, 0)));
        assert_eq!(occupancy.anchor_of(mover), Some(TileCoord::new(1, 0)));
        assert!(!occupancy.is_blocked(TileCoord::new(0, 0)));
        assert_eq!(
            occupancy.claim_at(TileCoord::new(2, 0)),
            Some(Claim::Entity(mover))
        );

        // (3,0) belongs to the wall.
        assert!(!occupancy.move_entity(mover, TileCoord::new(2, 0)));
        assert_eq!(occupancy.anchor_of(mover), Some(TileCoord::new(1, 0)));
        assert_eq!(
            occupancy.claim_at(TileCoord::new(1, 0)),
            Some(Claim::Entity(mover))
        );
        assert_eq!(
            occupancy.claim_at(TileCoord::new(3, 0)),
            Some(Claim::Entity(wall))
        );
    }

    #[test]
    fn collision_cells_off_the_grid_cannot_be_claimed() {
        let mut occupancy = index();
        assert!(!occupancy.place(EntityId(1), &blocking_pair(), TileCoord::new(9, 0)));
        assert!(!occupancy.claim_terrain(TileCoord::new(-1, 0)));
    }

    #[test]
    fn remove_clears_every_registration_and_is_idempotent() {
        let mut occupancy = index();
        let building = EntityId(4);
        assert!(occupancy.place(building, &Footprint::rect(2, 2, true), TileCoord::new(2, 2)));
        occupancy.remove(building);
        occupancy.remove(building);
        for x in 2..4 {
            for z in 2..4 {
                let tile = TileCoord::new(x, z);
                assert!(!occupancy.is_blocked(tile));
                assert!(occupancy.objects_in_tile(tile).is_empty());
            }
        }
    }

    #[test]
    fn shrinking_bounds_evicts_entities_and_drops_claims() {
        let mut occupancy = index();
        assert!(occupancy.place(EntityId(1), &Footprint::single_blocking(), TileCoord::new(8, 8)));
        assert!(occupancy.place(EntityId(2), &Footprint::single_blocking(), TileCoord::new(1, 1)));
        assert!(occupancy.claim_terrain(TileCoord::new(9, 0)));

        let evicted = occupancy.set_bounds(GridSize::new(5, 5));
        assert_eq!(evicted, vec![EntityId(1)]);
        assert!(!occupancy.is_blocked(TileCoord::new(8, 8)));
        assert!(!occupancy.is_blocked(TileCoord::new(9, 0)));
        assert!(occupancy.is_blocked(TileCoord::new(1, 1)));
    }

    #[test]
    fn terrain_claims_do_not_override_entities() {
        let mut occupancy = index();
        let tile = TileCoord::new(2, 2);
        assert!(occupancy.place(EntityId(1), &Footprint::single_blocking(), tile));
        assert!(!occupancy.claim_terrain(tile));
        occupancy.release_terrain(tile);
        assert_eq!(occupancy.claim_at(tile), Some(Claim::Entity(EntityId(1))));
    }
}
