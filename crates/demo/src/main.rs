mod scenario;

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use tilegrid::{
    Actor, AssetLoader, DecorRecord, EntityId, FixedStepClock, Footprint, GridEvent,
    LoadingStatus, TileCoord, TileRecord, World, WorldConfig,
};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use scenario::{Scenario, ScenarioResult, BUILTIN_SCENARIO};

const CONFIG_ENV_VAR: &str = "TILEGRID_CONFIG";
const MAP_ENV_VAR: &str = "TILEGRID_MAP";
const SCENARIO_ENV_VAR: &str = "TILEGRID_SCENARIO";
const FRAME_DELTA: Duration = Duration::from_millis(16);
const RAISED_TILE_HEIGHT: f32 = 24.0;

/// Loader for a run with no renderer: every image is available at once.
#[derive(Debug, Default)]
struct HeadlessLoader {
    requested: Vec<String>,
}

impl AssetLoader for HeadlessLoader {
    fn load_image(&mut self, name: &str) {
        self.requested.push(name.to_string());
    }

    fn loading_status(&self, name: &str) -> LoadingStatus {
        if self.requested.iter().any(|requested| requested == name) {
            LoadingStatus::Loading
        } else {
            LoadingStatus::NotRequested
        }
    }
}

fn main() {
    init_tracing();
    info!("=== Tilegrid Demo ===");

    if let Err(err) = run() {
        error!(error = %err, "demo_failed");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .init();
}

fn run() -> ScenarioResult<()> {
    let config = match std::env::var(CONFIG_ENV_VAR).ok() {
        Some(path) => WorldConfig::load(Path::new(&path)).map_err(|err| err.to_string())?,
        None => WorldConfig {
            rng_seed: Some(7),
            ..WorldConfig::default()
        },
    };
    let scenario = match std::env::var(SCENARIO_ENV_VAR).ok() {
        Some(path) => {
            let raw = std::fs::read_to_string(&path)
                .map_err(|err| format!("failed to read scenario file {path}: {err}"))?;
            Scenario::from_json_str(&raw)?
        }
        None => Scenario::from_json_str(BUILTIN_SCENARIO)?,
    };

    let mut world = World::new(config).map_err(|err| err.to_string())?;
    match std::env::var(MAP_ENV_VAR).ok() {
        Some(path) => world
            .load_map_file(Path::new(&path))
            .map_err(|err| err.to_string())?,
        None => paint_sample_map(&mut world),
    }
    info!(
        tiles_x = world.num_tiles().x,
        tiles_z = world.num_tiles().z,
        "map_ready"
    );

    let mut loader = HeadlessLoader::default();
    world.request_terrain_assets(&mut loader);
    for name in std::mem::take(&mut loader.requested) {
        world.asset_loaded(&name);
    }

    let names = populate(&mut world, &scenario)?;
    let mut clock = FixedStepClock::default();
    let dt = clock.fixed_dt_seconds();
    let mut ticks_run = 0u32;
    while ticks_run < scenario.ticks {
        let ticks = clock.advance(FRAME_DELTA).min(scenario.ticks - ticks_run);
        for _ in 0..ticks {
            world.tick(dt);
        }
        ticks_run += ticks;
        for event in world.drain_events() {
            log_event(&event, &names);
        }
    }

    for (id, name) in &names {
        if let Some(tile) = world.entity_tile(*id) {
            info!(entity = %name, x = tile.x, z = tile.z, "final_position");
        }
    }
    if let Some(path) = &scenario.save_map_to {
        world
            .save_map_file(Path::new(path))
            .map_err(|err| err.to_string())?;
        info!(path = %path, "map_saved");
    }
    info!(ticks = ticks_run, "demo_complete");
    Ok(())
}

/// Grass everywhere, a short wall with a gap, a raised plateau and some
/// flowers along the edges.
fn paint_sample_map(world: &mut World) {
    let size = world.num_tiles();
    let tiles_x = i32::try_from(size.x).unwrap_or(i32::MAX);
    let tiles_z = i32::try_from(size.z).unwrap_or(i32::MAX);
    for x in 0..tiles_x {
        for z in 0..tiles_z {
            let tile = TileCoord::new(x, z);
            let (record, height) = if z == tiles_z / 2 && x % 5 != 2 {
                (TileRecord::textured("stone_wall").with_collision(true), 0.0)
            } else if x >= tiles_x - 4 && z >= tiles_z - 4 {
                (TileRecord::textured("dirt"), RAISED_TILE_HEIGHT)
            } else {
                (TileRecord::textured("grass").with_rotation(((x + z) % 4) as u8), 0.0)
            };
            world.set_tile(tile, Some(record), height);
            if (x == 0 || z == 0) && (x + z) % 3 == 0 {
                world.set_detail(tile, Some(DecorRecord::textured("flowers")));
            }
        }
    }
}

fn populate(world: &mut World, scenario: &Scenario) -> ScenarioResult<BTreeMap<EntityId, String>> {
    let mut names = BTreeMap::new();
    let mut by_name = BTreeMap::new();

    for prop in &scenario.props {
        let footprint = if prop.blocking {
            Footprint::single_blocking()
        } else {
            Footprint::default()
        };
        let mut actor = Actor::new(prop.name.clone(), footprint);
        actor.interaction_offset = prop.interaction_offset;
        let id = world
            .add_entity(Box::new(actor), prop.tile)
            .ok_or_else(|| format!("prop '{}' cannot be placed at {:?}", prop.name, prop.tile))?;
        names.insert(id, prop.name.clone());
        by_name.insert(prop.name.clone(), id);
    }

    for entry in &scenario.characters {
        let actor = Actor::new(entry.name.clone(), Footprint::single_blocking());
        let id = world.add_entity(Box::new(actor), entry.spawn).ok_or_else(|| {
            format!("character '{}' cannot be placed at {:?}", entry.name, entry.spawn)
        })?;
        if !world.make_character(id, entry.settings.clone()) {
            return Err(format!("character '{}' has invalid settings", entry.name));
        }
        names.insert(id, entry.name.clone());
        by_name.insert(entry.name.clone(), id);
    }

    for entry in &scenario.characters {
        let Some(&id) = by_name.get(&entry.name) else {
            continue;
        };
        if let Some(goal) = entry.destination {
            if !world.set_destination(id, goal) {
                warn!(entity = %entry.name, x = goal.x, z = goal.z, "destination_refused");
            }
        }
        if let Some(target_name) = &entry.approach {
            let Some(&target) = by_name.get(target_name) else {
                continue;
            };
            if !world.go_to_object(id, target) {
                warn!(entity = %entry.name, target = %target_name, "approach_refused");
            }
        }
    }
    Ok(names)
}

fn log_event(event: &GridEvent, names: &BTreeMap<EntityId, String>) {
    let name_of = |id: &EntityId| names.get(id).map(String::as_str).unwrap_or("?");
    match event {
        GridEvent::TileChanged { entity, from, to } => debug!(
            entity = name_of(entity),
            from_x = from.x,
            from_z = from.z,
            to_x = to.x,
            to_z = to.z,
            "tile_changed"
        ),
        GridEvent::Stuck {
            entity,
            tile,
            blocked,
        } => warn!(
            entity = name_of(entity),
            x = tile.x,
            z = tile.z,
            blocked_x = blocked.x,
            blocked_z = blocked.z,
            "entity_stuck"
        ),
        GridEvent::MoveComplete { entity, tile } => {
            info!(entity = name_of(entity), x = tile.x, z = tile.z, "move_complete")
        }
        GridEvent::DestinationReached { entity, tile } => info!(
            entity = name_of(entity),
            x = tile.x,
            z = tile.z,
            "destination_reached"
        ),
        GridEvent::ObjectReached { entity, target } => info!(
            entity = name_of(entity),
            target = name_of(target),
            "object_reached"
        ),
        GridEvent::TerrainReady => info!("terrain_ready_event"),
    }
}
