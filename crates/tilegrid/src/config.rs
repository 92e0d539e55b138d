use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::character::FacingArity;
use crate::grid::{GridSize, Projection, Vec2, MAX_GRID_CELLS};
use crate::pathfinding::MovementOffsets;

pub const DEFAULT_TILE_WIDTH: f32 = 256.0;
pub const DEFAULT_TILE_HEIGHT: f32 = 128.0;
pub const DEFAULT_NUM_TILES: u32 = 16;
pub const DEFAULT_INTERSECTION_EPSILON: f32 = 0.02;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct WorldConfig {
    pub projection: Projection,
    pub tile_width: f32,
    pub tile_height: f32,
    /// World position of tile (0,0) for the orthogonal projection.
    pub origin: Vec2,
    pub num_tiles_x: u32,
    pub num_tiles_z: u32,
    /// Texture given to cells created by growing the grid. `None` makes
    /// them invisible (but present) tiles.
    pub default_tile_texture: Option<String>,
    pub movement_offsets: MovementOffsets,
    pub facing_arity: FacingArity,
    /// Largest height difference a path may climb in one step.
    pub max_step_height: Option<f32>,
    /// Distance (in tile units) from a four-tile corner inside which a
    /// target-driven mover does not resolve tile changes.
    pub intersection_epsilon: f32,
    pub rng_seed: Option<u64>,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            projection: Projection::Isometric,
            tile_width: DEFAULT_TILE_WIDTH,
            tile_height: DEFAULT_TILE_HEIGHT,
            origin: Vec2::ZERO,
            num_tiles_x: DEFAULT_NUM_TILES,
            num_tiles_z: DEFAULT_NUM_TILES,
            default_tile_texture: None,
            movement_offsets: MovementOffsets::Both,
            facing_arity: FacingArity::Eight,
            max_step_height: None,
            intersection_epsilon: DEFAULT_INTERSECTION_EPSILON,
            rng_seed: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parse config json at {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid config value at {field}: {message}")]
    Invalid { field: &'static str, message: String },
}

impl WorldConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let mut deserializer = serde_json::Deserializer::from_str(raw);
        let config: WorldConfig = serde_path_to_error::deserialize(&mut deserializer).map_err(
            |error| {
                let path = error.path().to_string();
                ConfigError::Parse {
                    path,
                    source: error.into_inner(),
                }
            },
        )?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.tile_width.is_finite() && self.tile_width > 0.0) {
            return Err(invalid("tileWidth", "expected a positive number", self.tile_width));
        }
        if !(self.tile_height.is_finite() && self.tile_height > 0.0) {
            return Err(invalid("tileHeight", "expected a positive number", self.tile_height));
        }
        if !self.grid_size().is_supported() {
            return Err(ConfigError::Invalid {
                field: "numTilesX",
                message: format!(
                    "{}x{} tiles exceeds the {MAX_GRID_CELLS} cell limit",
                    self.num_tiles_x, self.num_tiles_z
                ),
            });
        }
        if let Some(step) = self.max_step_height {
            if !(step.is_finite() && step >= 0.0) {
                return Err(invalid("maxStepHeight", "expected a non-negative number", step));
            }
        }
        if !(0.0..0.5).contains(&self.intersection_epsilon) {
            return Err(invalid(
                "intersectionEpsilon",
                "expected a value in [0, 0.5)",
                self.intersection_epsilon,
            ));
        }
        Ok(())
    }

    pub fn grid_size(&self) -> GridSize {
        GridSize::new(self.num_tiles_x, self.num_tiles_z)
    }
}

fn invalid(field: &'static str, expected: &str, actual: f32) -> ConfigError {
    ConfigError::Invalid {
        field,
        message: format!("{expected}, got {actual}"),
    }
}

/// Per-character behaviour knobs.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CharacterSettings {
    /// Movement speed in world units per second.
    pub speed: f32,
    pub idle_variations: Vec<String>,
    /// Chance per tick, while idle, of playing one of `idle_variations`.
    pub variation_probability: f64,
    pub wander: Option<WanderSettings>,
}

impl Default for CharacterSettings {
    fn default() -> Self {
        Self {
            speed: 300.0,
            idle_variations: Vec::new(),
            variation_probability: 0.0,
            wander: None,
        }
    }
}

impl CharacterSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.speed.is_finite() && self.speed > 0.0) {
            return Err(invalid("speed", "expected a positive number", self.speed));
        }
        check_probability("variationProbability", self.variation_probability)?;
        if let Some(wander) = &self.wander {
            check_probability("wander.probability", wander.probability)?;
            if wander.step_radius < 0 {
                return Err(ConfigError::Invalid {
                    field: "wander.stepRadius",
                    message: format!("expected a non-negative radius, got {}", wander.step_radius),
                });
            }
        }
        Ok(())
    }
}

fn check_probability(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            field,
            message: format!("expected a probability in [0, 1], got {value}"),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WanderSettings {
    /// Chance per idle tick of picking a new wander destination.
    pub probability: f64,
    pub step_radius: i32,
    /// Entity whose side of the map wander steps lean toward.
    #[serde(skip)]
    pub target: Option<crate::entity::EntityId>,
}

impl Default for WanderSettings {
    fn default() -> Self {
        Self {
            probability: 0.01,
            step_radius: 2,
            target: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_yields_defaults() {
        let config = WorldConfig::from_json_str("{}").expect("config");
        assert_eq!(config, WorldConfig::default());
    }

    #[test]
    fn invalid_world_values_are_rejected() {
        let zero_width = WorldConfig {
            tile_width: 0.0,
            ..WorldConfig::default()
        };
        assert!(matches!(
            zero_width.validate(),
            Err(ConfigError::Invalid { field: "tileWidth", .. })
        ));
        let huge = WorldConfig::from_json_str(r#"{"numTilesX":100000,"numTilesZ":100000}"#);
        assert!(matches!(
            huge,
            Err(ConfigError::Invalid { field: "numTilesX", .. })
        ));
    }

    #[test]
    fn character_settings_reject_bad_values() {
        let mut settings = CharacterSettings::default();
        assert!(settings.validate().is_ok());
        settings.speed = 0.0;
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::Invalid { field: "speed", .. })
        ));
        settings.speed = 100.0;
        settings.variation_probability = 1.5;
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::Invalid { field: "variationProbability", .. })
        ));
        settings.variation_probability = 0.5;
        settings.wander = Some(WanderSettings {
            probability: f64::NAN,
            ..WanderSettings::default()
        });
        assert!(settings.validate().is_err());
    }

    #[test]
    fn camel_case_fields_are_read() {
        let config = WorldConfig::from_json_str(
            r#"{"projection":"orthogonal","tileWidth":32,"tileHeight":32,"numTilesX":8,
                "movementOffsets":"straight","facingArity":"four","rngSeed":7}"#,
        )
        .expect("config");
        assert_eq!(config.projection, Projection::Orthogonal);
        assert_eq!(config.grid_size(), GridSize::new(8, DEFAULT_NUM_TILES));
        assert_eq!(config.movement_offsets, MovementOffsets::Straight);
        assert_eq!(config.facing_arity, FacingArity::Four);
        assert_eq!(config.rng_seed, Some(7));
    }

    #[test]
    fn parse_errors_carry_the_failing_path() {
        let error = WorldConfig::from_json_str(r#"{"origin":{"x":"left","y":0}}"#)
            .expect_err("bad origin");
        match error {
            ConfigError::Parse { path, .. } => assert_eq!(path, "origin.x"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn non_positive_tile_size_is_rejected() {
        let error = WorldConfig::from_json_str(r#"{"tileHeight":0}"#).expect_err("invalid");
        assert!(matches!(
            error,
            ConfigError::Invalid {
                field: "tileHeight",
                ..
            }
        ));
    }
}
