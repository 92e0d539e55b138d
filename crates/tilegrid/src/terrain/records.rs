use serde::{Deserialize, Serialize};

/// Sprite-sheet animation for a tile: a grid of frames played at `speed`
/// frames per second.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TileAnimation {
    pub num_cells_x: u32,
    pub num_cells_y: u32,
    pub speed: f32,
    #[serde(default = "default_looping")]
    pub looping: bool,
}

fn default_looping() -> bool {
    true
}

fn default_scale() -> f32 {
    1.0
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Base terrain tile. A present record with no texture is an invisible tile;
/// an absent record (see [`crate::terrain::TerrainStore::tile`]) is a hole.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TileRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub texture: Option<String>,
    /// Quarter turns, 0..=3.
    #[serde(default)]
    pub rotation: u8,
    #[serde(default = "default_scale")]
    pub scale: f32,
    /// Draw height follows the texture aspect instead of the tile height.
    #[serde(default, skip_serializing_if = "is_false")]
    pub custom_height: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub collision: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub animation: Option<TileAnimation>,
}

impl Default for TileRecord {
    fn default() -> Self {
        Self {
            texture: None,
            rotation: 0,
            scale: 1.0,
            custom_height: false,
            collision: false,
            animation: None,
        }
    }
}

impl TileRecord {
    pub fn textured(texture: impl Into<String>) -> Self {
        Self {
            texture: Some(texture.into()),
            ..Self::default()
        }
    }

    pub fn with_collision(mut self, collision: bool) -> Self {
        self.collision = collision;
        self
    }

    pub fn with_rotation(mut self, rotation: u8) -> Self {
        self.rotation = rotation;
        self
    }
}

/// Decorative layer record (transitions and details): a tile record without
/// collision semantics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecorRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub texture: Option<String>,
    #[serde(default)]
    pub rotation: u8,
    #[serde(default = "default_scale")]
    pub scale: f32,
    #[serde(default, skip_serializing_if = "is_false")]
    pub custom_height: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub animation: Option<TileAnimation>,
}

impl Default for DecorRecord {
    fn default() -> Self {
        Self {
            texture: None,
            rotation: 0,
            scale: 1.0,
            custom_height: false,
            animation: None,
        }
    }
}

impl DecorRecord {
    pub fn textured(texture: impl Into<String>) -> Self {
        Self {
            texture: Some(texture.into()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TerrainLayer {
    Tile,
    Transition,
    Detail,
}

/// Borrowed view of whichever record a layer holds, handed to the visuals
/// collaborator.
#[derive(Debug, Clone, Copy)]
pub struct SpriteSource<'a> {
    pub texture: Option<&'a str>,
    pub rotation: u8,
    pub scale: f32,
    pub custom_height: bool,
    pub animation: Option<&'a TileAnimation>,
}

impl<'a> From<&'a TileRecord> for SpriteSource<'a> {
    fn from(record: &'a TileRecord) -> Self {
        Self {
            texture: record.texture.as_deref(),
            rotation: record.rotation,
            scale: record.scale,
            custom_height: record.custom_height,
            animation: record.animation.as_ref(),
        }
    }
}

impl<'a> From<&'a DecorRecord> for SpriteSource<'a> {
    fn from(record: &'a DecorRecord) -> Self {
        Self {
            texture: record.texture.as_deref(),
            rotation: record.rotation,
            scale: record.scale,
            custom_height: record.custom_height,
            animation: record.animation.as_ref(),
        }
    }
}
