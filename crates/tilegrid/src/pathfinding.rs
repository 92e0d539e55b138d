use serde::Deserialize;

use crate::grid::{GridSize, TileCoord};

const STRAIGHT_OFFSETS: [TileCoord; 4] = [
    TileCoord::new(1, 0),
    TileCoord::new(-1, 0),
    TileCoord::new(0, 1),
    TileCoord::new(0, -1),
];
const DIAGONAL_OFFSETS: [TileCoord; 4] = [
    TileCoord::new(1, 1),
    TileCoord::new(-1, -1),
    TileCoord::new(1, -1),
    TileCoord::new(-1, 1),
];

/// Which neighbour steps movement and path search may take.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MovementOffsets {
    Straight,
    Diagonal,
    #[default]
    Both,
}

impl MovementOffsets {
    pub fn offsets(self) -> Vec<TileCoord> {
        match self {
            Self::Straight => STRAIGHT_OFFSETS.to_vec(),
            Self::Diagonal => DIAGONAL_OFFSETS.to_vec(),
            Self::Both => STRAIGHT_OFFSETS
                .iter()
                .chain(DIAGONAL_OFFSETS.iter())
                .copied()
                .collect(),
        }
    }
}

pub struct PathRequest<'a> {
    pub start: TileCoord,
    pub goal: TileCoord,
    pub bounds: GridSize,
    pub blocked: &'a dyn Fn(TileCoord) -> bool,
    pub height: &'a dyn Fn(TileCoord) -> f32,
    pub max_step_height: Option<f32>,
    pub allowed_offsets: &'a [TileCoord],
}

/// Grid search collaborator. Returns the tiles from `start` to `goal`, both
/// inclusive, or an empty list when the goal cannot be reached.
pub trait Pathfinder {
    fn find_path(&self, request: &PathRequest<'_>) -> Vec<TileCoord>;
}

/// Deterministic A* over the tile grid. Costs are 10 per straight step and
/// 14 per diagonal step; ties break on (f, h, z, x, insertion order).
#[derive(Debug, Clone, Copy, Default)]
pub struct GridAStar;

#[derive(Debug, Clone, Copy)]
struct OpenNode {
    coord: TileCoord,
    h_cost: u32,
    f_cost: u32,
    insertion_order: u64,
}

impl Pathfinder for GridAStar {
    fn find_path(&self, request: &PathRequest<'_>) -> Vec<TileCoord> {
        self.search(request).unwrap_or_default()
    }
}

impl GridAStar {
    fn search(&self, request: &PathRequest<'_>) -> Option<Vec<TileCoord>> {
        let bounds = request.bounds;
        let start_index = bounds.index_of(request.start)?;
        let goal_index = bounds.index_of(request.goal)?;
        if (request.blocked)(request.goal) {
            return None;
        }
        if request.start == request.goal {
            return Some(vec![request.start]);
        }

        let node_count = bounds.cell_count();
        let mut closed = vec![false; node_count];
        let mut best_g = vec![u32::MAX; node_count];
        let mut parent = vec![None::<usize>; node_count];
        let mut open = Vec::new();
        let mut next_insertion = 0u64;

        let start_h = heuristic(request.start, request.goal);
        open.push(OpenNode {
            coord: request.start,
            h_cost: start_h,
            f_cost: start_h,
            insertion_order: next_insertion,
        });
        next_insertion = next_insertion.saturating_add(1);
        best_g[start_index] = 0;

        while !open.is_empty() {
            let best_index = pick_best_open_node_index(&open);
            let current = open.swap_remove(best_index);
            let Some(current_index) = bounds.index_of(current.coord) else {
                continue;
            };
            if closed[current_index] {
                continue;
            }
            closed[current_index] = true;

            if current_index == goal_index {
                return reconstruct_tile_path(&parent, bounds, start_index, goal_index);
            }

            let current_g = best_g[current_index];
            for offset in request.allowed_offsets {
                let neighbor = current.coord.offset(*offset);
                let Some(neighbor_index) = bounds.index_of(neighbor) else {
                    continue;
                };
                if closed[neighbor_index] || !self.can_step(request, current.coord, *offset) {
                    continue;
                }

                let tentative_g = current_g.saturating_add(step_cost(*offset));
                if tentative_g >= best_g[neighbor_index] {
                    continue;
                }

                best_g[neighbor_index] = tentative_g;
                parent[neighbor_index] = Some(current_index);
                let h_cost = heuristic(neighbor, request.goal);
                open.push(OpenNode {
                    coord: neighbor,
                    h_cost,
                    f_cost: tentative_g.saturating_add(h_cost),
                    insertion_order: next_insertion,
                });
                next_insertion = next_insertion.saturating_add(1);
            }
        }

        None
    }

    fn can_step(&self, request: &PathRequest<'_>, from: TileCoord, offset: TileCoord) -> bool {
        let to = from.offset(offset);
        if (request.blocked)(to) {
            return false;
        }
        if let Some(max_step) = request.max_step_height {
            let climb = ((request.height)(to) - (request.height)(from)).abs();
            if climb > max_step {
                return false;
            }
        }
        if offset.x != 0 && offset.z != 0 {
            // No squeezing between two blocked orthogonal neighbours.
            let side_x = from.offset(TileCoord::new(offset.x, 0));
            let side_z = from.offset(TileCoord::new(0, offset.z));
            let side_x_blocked = !request.bounds.contains(side_x) || (request.blocked)(side_x);
            let side_z_blocked = !request.bounds.contains(side_z) || (request.blocked)(side_z);
            if side_x_blocked && side_z_blocked {
                return false;
            }
        }
        true
    }
}

fn step_cost(offset: TileCoord) -> u32 {
    if offset.x != 0 && offset.z != 0 {
        14
    } else {
        10
    }
}

/// Octile distance; admissible for every offset set since diagonal-only
/// grids never take a shorter route than it.
fn heuristic(a: TileCoord, b: TileCoord) -> u32 {
    let dx = a.x.abs_diff(b.x);
    let dz = a.z.abs_diff(b.z);
    let (low, high) = if dx < dz { (dx, dz) } else { (dz, dx) };
    low.saturating_mul(14)
        .saturating_add((high - low).saturating_mul(10))
}

fn pick_best_open_node_index(open: &[OpenNode]) -> usize {
    let mut best_index = 0usize;
    for index in 1..open.len() {
        if open_node_order_key(open[index]) < open_node_order_key(open[best_index]) {
            best_index = index;
        }
    }
    best_index
}

fn open_node_order_key(node: OpenNode) -> (u32, u32, i32, i32, u64) {
    (
        node.f_cost,
        node.h_cost,
        node.coord.z,
        node.coord.x,
        node.insertion_order,
    )
}

fn reconstruct_tile_path(
    parent: &[Option<usize>],
    bounds: GridSize,
    start_index: usize,
    goal_index: usize,
) -> Option<Vec<TileCoord>> {
    let mut cursor = goal_index;
    let mut indices = vec![cursor];

    while cursor != start_index {
        let next = parent.get(cursor).and_then(|value| *value)?;
        cursor = next;
        indices.push(cursor);
    }
    indices.reverse();
    let width = bounds.x as usize;
    Some(
        indices
            .into_iter()
            .map(|index| TileCoord::new((index % width) as i32, (index / width) as i32))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn run(
        bounds: GridSize,
        walls: &HashSet<TileCoord>,
        start: TileCoord,
        goal: TileCoord,
        offsets: MovementOffsets,
    ) -> Vec<TileCoord> {
        let blocked = |tile: TileCoord| walls.contains(&tile);
        let height = |_tile: TileCoord| 0.0;
        let allowed = offsets.offsets();
        GridAStar.find_path(&PathRequest {
            start,
            goal,
            bounds,
            blocked: &blocked,
            height: &height,
            max_step_height: None,
            allowed_offsets: &allowed,
        })
    }

    #[test]
    fn path_detours_around_a_wall_and_never_enters_it() {
        let mut walls = HashSet::new();
        for z in 0..4 {
            walls.insert(TileCoord::new(3, z));
        }
        let path = run(
            GridSize::new(7, 5),
            &walls,
            TileCoord::new(1, 2),
            TileCoord::new(5, 2),
            MovementOffsets::Straight,
        );
        assert_eq!(path.first(), Some(&TileCoord::new(1, 2)));
        assert_eq!(path.last(), Some(&TileCoord::new(5, 2)));
        for tile in &path {
            assert!(!walls.contains(tile), "path stepped onto wall {tile:?}");
        }
        for pair in path.windows(2) {
            let delta = pair[0].delta_to(pair[1]);
            assert_eq!(delta.x.abs() + delta.z.abs(), 1, "non-straight step {pair:?}");
        }
    }

    #[test]
    fn blocked_goal_yields_empty_path() {
        let walls: HashSet<TileCoord> = [TileCoord::new(4, 4)].into_iter().collect();
        let path = run(
            GridSize::new(6, 6),
            &walls,
            TileCoord::new(0, 0),
            TileCoord::new(4, 4),
            MovementOffsets::Both,
        );
        assert!(path.is_empty());
    }

    #[test]
    fn tie_break_is_deterministic() {
        let walls: HashSet<TileCoord> = [TileCoord::new(2, 2)].into_iter().collect();
        let first = run(
            GridSize::new(5, 5),
            &walls,
            TileCoord::new(0, 2),
            TileCoord::new(4, 2),
            MovementOffsets::Straight,
        );
        let second = run(
            GridSize::new(5, 5),
            &walls,
            TileCoord::new(0, 2),
            TileCoord::new(4, 2),
            MovementOffsets::Straight,
        );
        assert!(!first.is_empty());
        assert_eq!(first, second);
    }

    #[test]
    fn diagonal_offsets_take_the_diagonal() {
        let path = run(
            GridSize::new(6, 6),
            &HashSet::new(),
            TileCoord::new(0, 0),
            TileCoord::new(3, 3),
            MovementOffsets::Both,
        );
        assert_eq!(
            path,
            vec![
                TileCoord::new(0, 0),
                TileCoord::new(1, 1),
                TileCoord::new(2, 2),
                TileCoord::new(3, 3)
            ]
        );
    }

    #[test]
    fn step_height_limit_forces_a_detour() {
        let bounds = GridSize::new(3, 3);
        let cliff = TileCoord::new(1, 0);
        let blocked = |_tile: TileCoord| false;
        let height = |tile: TileCoord| if tile == cliff { 50.0 } else { 0.0 };
        let allowed = MovementOffsets::Straight.offsets();
        let path = GridAStar.find_path(&PathRequest {
            start: TileCoord::new(0, 0),
            goal: TileCoord::new(2, 0),
            bounds,
            blocked: &blocked,
            height: &height,
            max_step_height: Some(10.0),
            allowed_offsets: &allowed,
        });
        assert!(!path.is_empty());
        assert!(!path.contains(&cliff));
    }

    #[test]
    fn diagonal_steps_do_not_cut_between_two_walls() {
        let walls: HashSet<TileCoord> = [TileCoord::new(1, 0), TileCoord::new(0, 1)]
            .into_iter()
            .collect();
        let path = run(
            GridSize::new(2, 2),
            &walls,
            TileCoord::new(0, 0),
            TileCoord::new(1, 1),
            MovementOffsets::Both,
        );
        assert!(path.is_empty());
    }
}
