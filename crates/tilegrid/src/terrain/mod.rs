mod atomic_io;
mod map_format;
mod records;
mod store;
mod visuals;

pub use map_format::{MapDocument, MapError, TerrainDocument};
pub use records::{DecorRecord, SpriteSource, TerrainLayer, TileAnimation, TileRecord};
pub use store::{TerrainStore, TileEdit};
pub use visuals::{DrawPlacement, NoopVisuals, TerrainVisuals};
