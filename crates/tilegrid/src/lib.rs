pub mod assets;
pub mod character;
pub mod clock;
pub mod config;
pub mod entity;
pub mod grid;
pub mod movement;
pub mod occupancy;
pub mod pathfinding;
pub mod terrain;
pub mod world;

pub use assets::{AssetLoader, LoadingStatus, PendingLoads};
pub use character::{
    collapse_waypoints, CharacterController, CharacterState, Direction, FacingArity,
};
pub use clock::FixedStepClock;
pub use config::{CharacterSettings, ConfigError, WanderSettings, WorldConfig};
pub use entity::{
    Actor, Animatable, Collidable, EntityId, GridEntity, GridEvent, PlaybackDirection,
    Positionable,
};
pub use grid::{GridGeometry, GridSize, Projection, TileCoord, TileLookup, Vec2};
pub use movement::{Motion, MovementOutcome};
pub use occupancy::{Claim, Footprint, OccupancyIndex};
pub use pathfinding::{GridAStar, MovementOffsets, PathRequest, Pathfinder};
pub use terrain::{
    DecorRecord, DrawPlacement, MapDocument, MapError, NoopVisuals, SpriteSource,
    TerrainDocument, TerrainLayer, TerrainStore, TerrainVisuals, TileAnimation, TileEdit,
    TileRecord,
};
pub use world::World;
