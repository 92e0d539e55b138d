use std::collections::BTreeMap;

use tracing::debug;

use crate::entity::{EntityId, GridEntity};
use crate::grid::{GridGeometry, TileCoord, Vec2};
use crate::occupancy::OccupancyIndex;
use crate::terrain::TerrainStore;

/// Positions closer than this (world units) to a target count as on it.
const ARRIVAL_THRESHOLD: f32 = 1e-3;
/// Longest distance, in tiles along either axis, covered by one sub-step.
const MAX_SUBSTEP_TILES: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Motion {
    /// Constant velocity in world units per second, until stopped.
    Velocity(Vec2),
    /// Straight line toward the flat centre of `tile`.
    Target {
        tile: TileCoord,
        world: Vec2,
        speed: f32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MovementOutcome {
    TileChanged {
        entity: EntityId,
        from: TileCoord,
        to: TileCoord,
    },
    Stuck {
        entity: EntityId,
        tile: TileCoord,
        blocked: TileCoord,
    },
    Arrived {
        entity: EntityId,
        tile: TileCoord,
    },
}

#[derive(Debug, Clone, Copy)]
struct MovingEntity {
    motion: Motion,
    rollback: Vec2,
}

pub type EntityMap = BTreeMap<EntityId, Box<dyn GridEntity>>;

/// Borrowed world state a sweep reads and mutates.
pub struct MovementContext<'a> {
    pub terrain: &'a TerrainStore,
    pub occupancy: &'a mut OccupancyIndex,
    pub entities: &'a mut EntityMap,
}

/// The set of continuously moving entities.
#[derive(Debug, Default)]
pub struct MovementController {
    moving: BTreeMap<EntityId, MovingEntity>,
    intersection_epsilon: f32,
}

impl MovementController {
    pub fn new(intersection_epsilon: f32) -> Self {
        Self {
            moving: BTreeMap::new(),
            intersection_epsilon,
        }
    }

    /// Starts (or redirects) a target motion. `from` is the entity's current
    /// position and becomes its first rollback point.
    pub fn move_to(&mut self, entity: EntityId, tile: TileCoord, world: Vec2, speed: f32, from: Vec2) {
        self.moving.insert(
            entity,
            MovingEntity {
                motion: Motion::Target { tile, world, speed },
                rollback: from,
            },
        );
    }

    /// Sets a constant velocity; a zero vector stops the entity.
    pub fn set_velocity(&mut self, entity: EntityId, velocity: Vec2, from: Vec2) {
        if velocity.is_zero() {
            self.stop(entity);
            return;
        }
        let rollback = self
            .moving
            .get(&entity)
            .map(|moving| moving.rollback)
            .unwrap_or(from);
        self.moving.insert(
            entity,
            MovingEntity {
                motion: Motion::Velocity(velocity),
                rollback,
            },
        );
    }

    pub fn stop(&mut self, entity: EntityId) {
        self.moving.remove(&entity);
    }

    /// Drops the entity from the moving set (entity removal, map reload).
    pub fn cancel(&mut self, entity: EntityId) {
        self.stop(entity);
    }

    pub fn clear(&mut self) {
        self.moving.clear();
    }

    pub fn is_moving(&self, entity: EntityId) -> bool {
        self.moving.contains_key(&entity)
    }

    pub fn motion(&self, entity: EntityId) -> Option<Motion> {
        self.moving.get(&entity).map(|moving| moving.motion)
    }

    pub fn target_tile(&self, entity: EntityId) -> Option<TileCoord> {
        match self.motion(entity)? {
            Motion::Target { tile, .. } => Some(tile),
            Motion::Velocity(_) => None,
        }
    }

    /// Advances every moving entity by `dt` seconds in ascending id order.
    /// Each entity's occupancy check and commit completes before the next
    /// entity is looked at.
    ///
    /// A step is walked in sub-steps of at most half a tile, so every tile
    /// boundary crossed gets its own occupancy check. The first refusal puts
    /// the entity back where it last changed tile this tick, or where it
    /// started the tick.
    pub fn sweep(&mut self, dt: f32, ctx: MovementContext<'_>) -> Vec<MovementOutcome> {
        let MovementContext {
            terrain,
            occupancy,
            entities,
        } = ctx;
        let geometry = terrain.geometry();
        let mut outcomes = Vec::new();
        let ids: Vec<EntityId> = self.moving.keys().copied().collect();

        for id in ids {
            let Some(state) = self.moving.get_mut(&id) else {
                continue;
            };
            let (Some(entity), Some(anchor)) = (entities.get_mut(&id), occupancy.anchor_of(id))
            else {
                self.moving.remove(&id);
                continue;
            };

            let position = entity.world_position();
            let (next, reached) = match state.motion {
                Motion::Velocity(velocity) => (
                    Vec2::new(position.x + velocity.x * dt, position.y + velocity.y * dt),
                    false,
                ),
                Motion::Target { world, speed, .. } => {
                    step_toward(position, world, speed, dt, ARRIVAL_THRESHOLD)
                }
            };
            let is_target = matches!(state.motion, Motion::Target { .. });
            entity.set_world_position(next);

            let substeps = substep_count(geometry, position, next);
            let mut tile = anchor;
            let mut blocked = None;
            for step in 1..=substeps {
                let point = if step == substeps {
                    next
                } else {
                    lerp(position, next, step as f32 / substeps as f32)
                };
                let lookup = geometry.world_to_tile(point);
                if lookup.tile == tile {
                    continue;
                }
                let lands = reached && step == substeps;
                if is_target && !lands && geometry.is_near_intersection(point, self.intersection_epsilon)
                {
                    continue;
                }
                if lookup.valid && occupancy.move_entity(id, lookup.tile) {
                    state.rollback = point;
                    entity.set_ground_height(terrain.tile_height(lookup.tile));
                    debug!(entity = id.0, from_x = tile.x, from_z = tile.z, to_x = lookup.tile.x, to_z = lookup.tile.z, "entity_tile_changed");
                    outcomes.push(MovementOutcome::TileChanged {
                        entity: id,
                        from: tile,
                        to: lookup.tile,
                    });
                    tile = lookup.tile;
                } else {
                    blocked = Some(lookup.tile);
                    break;
                }
            }

            if let Some(blocked) = blocked {
                entity.set_world_position(state.rollback);
                debug!(entity = id.0, x = tile.x, z = tile.z, blocked_x = blocked.x, blocked_z = blocked.z, "entity_stuck");
                if is_target {
                    self.moving.remove(&id);
                }
                outcomes.push(MovementOutcome::Stuck {
                    entity: id,
                    tile,
                    blocked,
                });
                continue;
            }
            if geometry.world_to_tile(next).tile == tile {
                state.rollback = next;
            }
            if reached {
                self.moving.remove(&id);
                outcomes.push(MovementOutcome::Arrived { entity: id, tile });
            }
        }
        outcomes
    }
}

/// Sub-steps needed so that no sub-step moves more than half a tile along
/// either grid axis.
fn substep_count(geometry: &GridGeometry, from: Vec2, to: Vec2) -> u32 {
    let (from_u, from_v) = geometry.world_to_continuous(from);
    let (to_u, to_v) = geometry.world_to_continuous(to);
    let span = (to_u - from_u).abs().max((to_v - from_v).abs());
    // Saturating cast; NaN becomes 0.
    ((span / MAX_SUBSTEP_TILES).ceil() as u32).max(1)
}

fn lerp(from: Vec2, to: Vec2, t: f32) -> Vec2 {
    Vec2::new(from.x + (to.x - from.x) * t, from.y + (to.y - from.y) * t)
}

/// Moves `current` toward `target` by at most `speed * dt`. Returns the new
/// position and whether it landed on the target.
pub(crate) fn step_toward(
    current: Vec2,
    target: Vec2,
    speed: f32,
    dt: f32,
    arrival_threshold: f32,
) -> (Vec2, bool) {
    let distance_sq = current.distance_sq(target);
    if distance_sq <= arrival_threshold * arrival_threshold {
        return (target, true);
    }
    let distance = distance_sq.sqrt();
    let max_step = speed * dt;
    if max_step >= distance {
        return (target, true);
    }
    let scale = max_step / distance;
    (
        Vec2::new(
            current.x + (target.x - current.x) * scale,
            current.y + (target.y - current.y) * scale,
        ),
        false,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Actor;
    use crate::grid::{GridGeometry, GridSize, Projection};
    use crate::occupancy::Footprint;
    use crate::terrain::TileRecord;

    struct Fixture {
        terrain: TerrainStore,
        occupancy: OccupancyIndex,
        entities: EntityMap,
        movement: MovementController,
    }

    impl Fixture {
        fn new() -> Self {
            let size = GridSize::new(8, 8);
            let geometry =
                GridGeometry::new(Projection::Orthogonal, 10.0, 10.0, Vec2::ZERO, size);
            Self {
                terrain: TerrainStore::new(geometry, TileRecord::textured("grass")),
                occupancy: OccupancyIndex::new(size),
                entities: EntityMap::new(),
                movement: MovementController::new(0.02),
            }
        }

        fn spawn(&mut self, id: u64, tile: TileCoord, footprint: Footprint) -> EntityId {
            let id = EntityId(id);
            let mut actor = Actor::new(format!("actor{}", id.0), footprint.clone());
            actor.position = self.terrain.geometry().tile_center_flat(tile);
            assert!(self.occupancy.place(id, &footprint, tile));
            self.entities.insert(id, Box::new(actor));
            id
        }

        fn position(&self, id: EntityId) -> Vec2 {
            self.entities[&id].world_position()
        }

        fn sweep(&mut self, dt: f32) -> Vec<MovementOutcome> {
            self.movement.sweep(
                dt,
                MovementContext {
                    terrain: &self.terrain,
                    occupancy: &mut self.occupancy,
                    entities: &mut self.entities,
                },
            )
        }
    }

    #[test]
    fn step_toward_moves_by_speed_times_dt_without_overshoot() {
        let (next, arrived) = step_toward(Vec2::ZERO, Vec2::new(10.0, 0.0), 2.0, 0.5, 0.1);
        assert!(!arrived);
        assert!((next.x - 1.0).abs() < 0.0001);
        let (next, arrived) = step_toward(Vec2::ZERO, Vec2::new(0.5, 0.0), 100.0, 0.5, 0.1);
        assert!(arrived);
        assert_eq!(next, Vec2::new(0.5, 0.0));
    }

    #[test]
    fn target_motion_changes_tile_then_arrives() {
        let mut fixture = Fixture::new();
        let id = fixture.spawn(1, TileCoord::new(1, 1), Footprint::single_blocking());
        let goal = TileCoord::new(2, 1);
        let world = fixture.terrain.geometry().tile_center_flat(goal);
        let from = fixture.position(id);
        fixture.movement.move_to(id, goal, world, 10.0, from);

        let mut outcomes = Vec::new();
        for _ in 0..20 {
            outcomes.extend(fixture.sweep(0.1));
        }
        assert_eq!(
            outcomes,
            vec![
                MovementOutcome::TileChanged {
                    entity: id,
                    from: TileCoord::new(1, 1),
                    to: goal
                },
                MovementOutcome::Arrived { entity: id, tile: goal },
            ]
        );
        assert_eq!(fixture.position(id), world);
        assert!(!fixture.movement.is_moving(id));
        assert_eq!(fixture.occupancy.anchor_of(id), Some(goal));
    }

    #[test]
    fn blocked_transition_restores_the_pre_tick_position() {
        let mut fixture = Fixture::new();
        let mover = fixture.spawn(1, TileCoord::new(1, 1), Footprint::single_blocking());
        fixture.spawn(2, TileCoord::new(2, 1), Footprint::single_blocking());
        fixture
            .movement
            .set_velocity(mover, Vec2::new(30.0, 0.0), fixture.position(mover));

        let start = fixture.position(mover);
        assert!(fixture.sweep(0.1).is_empty());
        let before_crossing = fixture.position(mover);
        assert_eq!(before_crossing.x, start.x + 3.0);

        let outcomes = fixture.sweep(0.1);
        assert_eq!(
            outcomes,
            vec![MovementOutcome::Stuck {
                entity: mover,
                tile: TileCoord::new(1, 1),
                blocked: TileCoord::new(2, 1)
            }]
        );
        assert_eq!(fixture.position(mover), before_crossing);
        assert!(fixture.movement.is_moving(mover), "velocity motion keeps pushing");
    }

    #[test]
    fn stuck_target_motion_is_cancelled() {
        let mut fixture = Fixture::new();
        let mover = fixture.spawn(1, TileCoord::new(1, 1), Footprint::single_blocking());
        fixture.spawn(2, TileCoord::new(1, 2), Footprint::single_blocking());
        let goal = TileCoord::new(1, 2);
        let world = fixture.terrain.geometry().tile_center_flat(goal);
        let from = fixture.position(mover);
        fixture.movement.move_to(mover, goal, world, 100.0, from);

        let outcomes = fixture.sweep(0.1);
        assert!(matches!(outcomes.as_slice(), [MovementOutcome::Stuck { .. }]));
        assert_eq!(fixture.position(mover), from);
        assert!(!fixture.movement.is_moving(mover));
    }

    #[test]
    fn lower_id_wins_a_contested_cell() {
        let mut fixture = Fixture::new();
        let left = fixture.spawn(1, TileCoord::new(1, 1), Footprint::single_blocking());
        let right = fixture.spawn(2, TileCoord::new(3, 1), Footprint::single_blocking());
        let contested = TileCoord::new(2, 1);
        let world = fixture.terrain.geometry().tile_center_flat(contested);
        for id in [right, left] {
            let from = fixture.position(id);
            fixture.movement.move_to(id, contested, world, 1000.0, from);
        }

        let outcomes = fixture.sweep(0.1);
        assert_eq!(fixture.occupancy.anchor_of(left), Some(contested));
        assert_eq!(fixture.occupancy.anchor_of(right), Some(TileCoord::new(3, 1)));
        assert!(outcomes.contains(&MovementOutcome::Stuck {
            entity: right,
            tile: TileCoord::new(3, 1),
            blocked: contested
        }));
    }

    #[test]
    fn leaving_the_grid_counts_as_blocked() {
        let mut fixture = Fixture::new();
        let id = fixture.spawn(1, TileCoord::new(0, 0), Footprint::default());
        let from = fixture.position(id);
        fixture.movement.set_velocity(id, Vec2::new(-100.0, 0.0), from);
        let outcomes = fixture.sweep(0.1);
        assert!(matches!(
            outcomes.as_slice(),
            [MovementOutcome::Stuck { blocked, .. }] if blocked.x == -1
        ));
        assert_eq!(fixture.position(id), from);
    }

    #[test]
    fn fast_movers_check_every_tile_they_cross() {
        let mut fixture = Fixture::new();
        let mover = fixture.spawn(1, TileCoord::new(1, 1), Footprint::single_blocking());
        fixture.spawn(2, TileCoord::new(3, 1), Footprint::single_blocking());
        let goal = TileCoord::new(6, 1);
        let world = fixture.terrain.geometry().tile_center_flat(goal);
        let from = fixture.position(mover);
        fixture.movement.move_to(mover, goal, world, 1000.0, from);

        let outcomes = fixture.sweep(0.1);
        assert_eq!(
            outcomes,
            vec![
                MovementOutcome::TileChanged {
                    entity: mover,
                    from: TileCoord::new(1, 1),
                    to: TileCoord::new(2, 1)
                },
                MovementOutcome::Stuck {
                    entity: mover,
                    tile: TileCoord::new(2, 1),
                    blocked: TileCoord::new(3, 1)
                },
            ]
        );
        assert_eq!(fixture.occupancy.anchor_of(mover), Some(TileCoord::new(2, 1)));
        let rolled_back = fixture.position(mover);
        assert_eq!(
            fixture.terrain.geometry().world_to_tile(rolled_back).tile,
            TileCoord::new(2, 1)
        );
        assert!(!fixture.movement.is_moving(mover));
    }

    #[test]
    fn target_motion_waits_out_a_four_tile_corner() {
        let mut fixture = Fixture::new();
        let id = fixture.spawn(1, TileCoord::new(1, 1), Footprint::single_blocking());
        let goal = TileCoord::new(2, 2);
        let world = fixture.terrain.geometry().tile_center_flat(goal);
        let from = fixture.position(id);
        // Half the diagonal per tick: the first tick ends on the shared corner.
        let speed = from.distance_sq(world).sqrt() * 0.5 / 0.1;
        fixture.movement.move_to(id, goal, world, speed, from);

        assert!(fixture.sweep(0.1).is_empty());
        assert_eq!(fixture.occupancy.anchor_of(id), Some(TileCoord::new(1, 1)));
        assert!(fixture.movement.is_moving(id));

        let outcomes = fixture.sweep(0.2);
        assert_eq!(
            outcomes,
            vec![
                MovementOutcome::TileChanged {
                    entity: id,
                    from: TileCoord::new(1, 1),
                    to: goal
                },
                MovementOutcome::Arrived { entity: id, tile: goal },
            ]
        );
    }

    #[test]
    fn zero_velocity_stops() {
        let mut fixture = Fixture::new();
        let id = fixture.spawn(1, TileCoord::new(0, 0), Footprint::default());
        fixture.movement.set_velocity(id, Vec2::new(1.0, 0.0), Vec2::ZERO);
        assert!(fixture.movement.is_moving(id));
        fixture.movement.set_velocity(id, Vec2::ZERO, Vec2::ZERO);
        assert!(!fixture.movement.is_moving(id));
    }
}
