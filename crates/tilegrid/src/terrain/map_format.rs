use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::grid::{GridSize, TileCoord, MAX_GRID_CELLS};
use crate::occupancy::OccupancyIndex;

use super::atomic_io::write_map_text;
use super::records::{DecorRecord, TileRecord};
use super::store::{TerrainCell, TerrainStore};

const ABSENT: i64 = -1;

/// On-disk map description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapDocument {
    pub terrain: TerrainDocument,
}

/// Terrain tables. Records are stored once in the `*_data` lists and referred
/// to by index from the `*_data_ids[x][z]` tables; `-1` marks an empty cell.
/// Missing id or height tables mean "nothing on any cell".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerrainDocument {
    pub num_tiles_x: u32,
    pub num_tiles_z: u32,
    #[serde(default)]
    pub tile_data: Vec<TileRecord>,
    #[serde(default)]
    pub tile_data_ids: Vec<Vec<i64>>,
    #[serde(default)]
    pub transition_data: Vec<DecorRecord>,
    #[serde(default)]
    pub transition_data_ids: Vec<Vec<i64>>,
    #[serde(default)]
    pub detail_data: Vec<DecorRecord>,
    #[serde(default)]
    pub detail_data_ids: Vec<Vec<i64>>,
    #[serde(default)]
    pub tile_height: Vec<Vec<f32>>,
}

#[derive(Debug, Error)]
pub enum MapError {
    #[error("failed to read map file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write map file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parse map json at {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("serialize map json: {0}")]
    Serialize(#[source] serde_json::Error),
    #[error("{table} has {actual} entries along {axis}, expected {expected}")]
    Dimensions {
        table: &'static str,
        axis: &'static str,
        expected: u32,
        actual: usize,
    },
    #[error("{table}[{x}][{z}] refers to record {id}, but only {available} exist")]
    RecordId {
        table: &'static str,
        x: usize,
        z: usize,
        id: i64,
        available: usize,
    },
    #[error("{table}[{index}] has rotation {rotation}, expected 0..=3")]
    Rotation {
        table: &'static str,
        index: usize,
        rotation: u8,
    },
    #[error("tileHeight[{x}][{z}] is not a finite number")]
    Height { x: usize, z: usize },
    #[error("map of {x}x{z} tiles exceeds the {max} cell limit")]
    TooLarge { x: u32, z: u32, max: usize },
}

impl MapDocument {
    pub fn from_json_str(raw: &str) -> Result<Self, MapError> {
        let mut deserializer = serde_json::Deserializer::from_str(raw);
        serde_path_to_error::deserialize(&mut deserializer).map_err(|error| {
            let path = error.path().to_string();
            MapError::Parse {
                path,
                source: error.into_inner(),
            }
        })
    }

    pub fn to_json_string_pretty(&self) -> Result<String, MapError> {
        serde_json::to_string_pretty(self).map_err(MapError::Serialize)
    }

    pub fn load(path: &Path) -> Result<Self, MapError> {
        let raw = fs::read_to_string(path).map_err(|source| MapError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    pub fn save(&self, path: &Path) -> Result<(), MapError> {
        let text = self.to_json_string_pretty()?;
        write_map_text(path, &text).map_err(|source| MapError::Write {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl TerrainDocument {
    pub fn size(&self) -> GridSize {
        GridSize::new(self.num_tiles_x, self.num_tiles_z)
    }

    /// Resolves every id table into per-cell records, failing on the first
    /// inconsistency. Nothing outside the returned cells is touched.
    pub(crate) fn build_cells(&self) -> Result<Vec<TerrainCell>, MapError> {
        let size = self.size();
        let Some(cell_count) = size.checked_cell_count() else {
            return Err(MapError::TooLarge {
                x: size.x,
                z: size.z,
                max: MAX_GRID_CELLS,
            });
        };
        check_rotations("tileData", self.tile_data.iter().map(|record| record.rotation))?;
        check_rotations(
            "transitionData",
            self.transition_data.iter().map(|record| record.rotation),
        )?;
        check_rotations("detailData", self.detail_data.iter().map(|record| record.rotation))?;
        check_table_shape("tileDataIds", &self.tile_data_ids, size)?;
        check_table_shape("transitionDataIds", &self.transition_data_ids, size)?;
        check_table_shape("detailDataIds", &self.detail_data_ids, size)?;
        check_table_shape("tileHeight", &self.tile_height, size)?;

        let mut cells = vec![TerrainCell::default(); cell_count];
        for x in 0..size.x as usize {
            for z in 0..size.z as usize {
                let Some(index) = size.index_of(TileCoord::new(x as i32, z as i32)) else {
                    continue;
                };
                let cell = &mut cells[index];
                cell.tile = lookup("tileDataIds", &self.tile_data_ids, &self.tile_data, x, z)?;
                cell.transition = lookup(
                    "transitionDataIds",
                    &self.transition_data_ids,
                    &self.transition_data,
                    x,
                    z,
                )?;
                cell.detail =
                    lookup("detailDataIds", &self.detail_data_ids, &self.detail_data, x, z)?;
                if let Some(height) = self.tile_height.get(x).and_then(|column| column.get(z)) {
                    if !height.is_finite() {
                        return Err(MapError::Height { x, z });
                    }
                    cell.height = *height;
                }
                if cell.tile.is_none() {
                    // Decor and height only live on tiles.
                    *cell = TerrainCell::default();
                }
            }
        }
        Ok(cells)
    }
}

fn check_rotations(
    table: &'static str,
    rotations: impl Iterator<Item = u8>,
) -> Result<(), MapError> {
    for (index, rotation) in rotations.enumerate() {
        if rotation > 3 {
            return Err(MapError::Rotation {
                table,
                index,
                rotation,
            });
        }
    }
    Ok(())
}

fn check_table_shape<T>(
    table: &'static str,
    columns: &[Vec<T>],
    size: GridSize,
) -> Result<(), MapError> {
    if columns.is_empty() {
        return Ok(());
    }
    if columns.len() != size.x as usize {
        return Err(MapError::Dimensions {
            table,
            axis: "x",
            expected: size.x,
            actual: columns.len(),
        });
    }
    for column in columns {
        if column.len() != size.z as usize {
            return Err(MapError::Dimensions {
                table,
                axis: "z",
                expected: size.z,
                actual: column.len(),
            });
        }
    }
    Ok(())
}

fn lookup<R: Clone>(
    table: &'static str,
    ids: &[Vec<i64>],
    records: &[R],
    x: usize,
    z: usize,
) -> Result<Option<R>, MapError> {
    let Some(id) = ids.get(x).and_then(|column| column.get(z)).copied() else {
        return Ok(None);
    };
    if id == ABSENT {
        return Ok(None);
    }
    usize::try_from(id)
        .ok()
        .and_then(|index| records.get(index))
        .cloned()
        .map(Some)
        .ok_or(MapError::RecordId {
            table,
            x,
            z,
            id,
            available: records.len(),
        })
}

/// Collects records into a de-duplicated list plus an `[x][z]` id table.
struct RecordTable<R> {
    records: Vec<R>,
    ids: Vec<Vec<i64>>,
}

impl<R: Clone + PartialEq> RecordTable<R> {
    fn new(size: GridSize) -> Self {
        Self {
            records: Vec::new(),
            ids: vec![vec![ABSENT; size.z as usize]; size.x as usize],
        }
    }

    fn insert(&mut self, x: usize, z: usize, record: Option<&R>) {
        let Some(record) = record else {
            return;
        };
        let index = match self.records.iter().position(|known| known == record) {
            Some(index) => index,
            None => {
                self.records.push(record.clone());
                self.records.len() - 1
            }
        };
        self.ids[x][z] = index as i64;
    }
}

impl TerrainStore {
    pub fn export_document(&self) -> MapDocument {
        let size = self.size();
        let mut tiles = RecordTable::<TileRecord>::new(size);
        let mut transitions = RecordTable::<DecorRecord>::new(size);
        let mut details = RecordTable::<DecorRecord>::new(size);
        let mut heights = vec![vec![0.0; size.z as usize]; size.x as usize];

        for x in 0..size.x as usize {
            for z in 0..size.z as usize {
                let Some(cell) = self.cell(TileCoord::new(x as i32, z as i32)) else {
                    continue;
                };
                tiles.insert(x, z, cell.tile.as_ref());
                transitions.insert(x, z, cell.transition.as_ref());
                details.insert(x, z, cell.detail.as_ref());
                heights[x][z] = cell.height;
            }
        }

        info!(
            tiles_x = size.x,
            tiles_z = size.z,
            tile_records = tiles.records.len(),
            "map_exported"
        );
        MapDocument {
            terrain: TerrainDocument {
                num_tiles_x: size.x,
                num_tiles_z: size.z,
                tile_data: tiles.records,
                tile_data_ids: tiles.ids,
                transition_data: transitions.records,
                transition_data_ids: transitions.ids,
                detail_data: details.records,
                detail_data_ids: details.ids,
                tile_height: heights,
            },
        }
    }

    /// Replaces the whole terrain with `document`. Occupancy is reset to the
    /// document's bounds and re-seeded with terrain claims only. On error the
    /// store and the index are left untouched.
    pub fn import(
        &mut self,
        document: &MapDocument,
        occupancy: &mut OccupancyIndex,
    ) -> Result<(), MapError> {
        let cells = document.terrain.build_cells()?;
        let size = document.terrain.size();
        self.replace_all(size, cells, occupancy);
        info!(tiles_x = size.x, tiles_z = size.z, "map_loaded");
        Ok(())
    }
}
