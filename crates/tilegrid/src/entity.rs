use crate::grid::{TileCoord, Vec2};
use crate::occupancy::Footprint;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(pub u64);

#[derive(Debug, Default)]
pub struct EntityIdAllocator {
    next: u64,
}

impl EntityIdAllocator {
    pub fn allocate(&mut self) -> EntityId {
        let id = EntityId(self.next);
        self.next = self.next.saturating_add(1);
        id
    }

    pub fn reset(&mut self) {
        self.next = 0;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackDirection {
    Forward,
    Reverse,
}

impl PlaybackDirection {
    pub fn flipped(self) -> Self {
        match self {
            Self::Forward => Self::Reverse,
            Self::Reverse => Self::Forward,
        }
    }
}

/// Notifications the grid sends to entities (and records for the caller).
#[derive(Debug, Clone, PartialEq)]
pub enum GridEvent {
    TileChanged {
        entity: EntityId,
        from: TileCoord,
        to: TileCoord,
    },
    /// A transition into `blocked` was refused; the entity was put back at
    /// its last good position on `tile`.
    Stuck {
        entity: EntityId,
        tile: TileCoord,
        blocked: TileCoord,
    },
    MoveComplete {
        entity: EntityId,
        tile: TileCoord,
    },
    DestinationReached {
        entity: EntityId,
        tile: TileCoord,
    },
    ObjectReached {
        entity: EntityId,
        target: EntityId,
    },
    TerrainReady,
}

impl GridEvent {
    pub fn entity(&self) -> Option<EntityId> {
        match self {
            Self::TileChanged { entity, .. }
            | Self::Stuck { entity, .. }
            | Self::MoveComplete { entity, .. }
            | Self::DestinationReached { entity, .. }
            | Self::ObjectReached { entity, .. } => Some(*entity),
            Self::TerrainReady => None,
        }
    }
}

pub trait Positionable {
    /// Ground-level (flat) world position. Height offsets are applied at draw
    /// time through [`Positionable::set_ground_height`].
    fn world_position(&self) -> Vec2;
    fn set_world_position(&mut self, position: Vec2);
    fn ground_height(&self) -> f32;
    fn set_ground_height(&mut self, height: f32);
}

pub trait Collidable {
    fn footprint(&self) -> &Footprint;

    /// Where another character should stand to interact with this one,
    /// relative to its anchor tile.
    fn interaction_offset(&self) -> Option<TileCoord> {
        None
    }
}

pub trait Animatable {
    fn play_animation(&mut self, name: &str, direction: PlaybackDirection);
    fn is_current_animation(&self, name: &str) -> bool;
}

pub trait GridEntity: Positionable + Collidable + Animatable {
    fn notify(&mut self, _event: &GridEvent) {}
}

/// Plain entity record usable wherever no richer scene object exists.
#[derive(Debug, Clone)]
pub struct Actor {
    pub debug_name: String,
    pub position: Vec2,
    pub ground_height: f32,
    pub footprint: Footprint,
    pub interaction_offset: Option<TileCoord>,
    pub current_animation: Option<(String, PlaybackDirection)>,
    pub received_events: Vec<GridEvent>,
}

impl Actor {
    pub fn new(debug_name: impl Into<String>, footprint: Footprint) -> Self {
        Self {
            debug_name: debug_name.into(),
            position: Vec2::ZERO,
            ground_height: 0.0,
            footprint,
            interaction_offset: None,
            current_animation: None,
            received_events: Vec::new(),
        }
    }

    pub fn with_interaction_offset(mut self, offset: TileCoord) -> Self {
        self.interaction_offset = Some(offset);
        self
    }

    pub fn current_animation_name(&self) -> Option<&str> {
        self.current_animation.as_ref().map(|(name, _)| name.as_str())
    }
}

impl Positionable for Actor {
    fn world_position(&self) -> Vec2 {
        self.position
    }

    fn set_world_position(&mut self, position: Vec2) {
        self.position = position;
    }

    fn ground_height(&self) -> f32 {
        self.ground_height
    }

    fn set_ground_height(&mut self, height: f32) {
        self.ground_height = height;
    }
}

impl Collidable for Actor {
    fn footprint(&self) -> &Footprint {
        &self.footprint
    }

    fn interaction_offset(&self) -> Option<TileCoord> {
        self.interaction_offset
    }
}

impl Animatable for Actor {
    fn play_animation(&mut self, name: &str, direction: PlaybackDirection) {
        self.current_animation = Some((name.to_string(), direction));
    }

    fn is_current_animation(&self, name: &str) -> bool {
        self.current_animation_name() == Some(name)
    }
}

impl GridEntity for Actor {
    fn notify(&mut self, event: &GridEvent) {
        self.received_events.push(event.clone());
    }
}
