use std::collections::VecDeque;

use crate::config::CharacterSettings;
use crate::entity::{EntityId, PlaybackDirection};
use crate::grid::TileCoord;

use super::direction::Direction;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharacterState {
    Idle,
    Moving,
}

/// Per-character navigation state: the waypoint queue, facing and idle
/// animation bookkeeping. Decisions that need the grid live on the world.
#[derive(Debug, Clone)]
pub struct CharacterController {
    pub(crate) settings: CharacterSettings,
    pub(crate) waypoints: VecDeque<TileCoord>,
    pub(crate) facing: Direction,
    pub(crate) object_target: Option<EntityId>,
    next_variation_playback: PlaybackDirection,
    playing_variation: bool,
}

impl CharacterController {
    pub fn new(settings: CharacterSettings) -> Self {
        Self {
            settings,
            waypoints: VecDeque::new(),
            facing: Direction::S,
            object_target: None,
            next_variation_playback: PlaybackDirection::Forward,
            playing_variation: false,
        }
    }

    pub fn settings(&self) -> &CharacterSettings {
        &self.settings
    }

    pub fn state(&self) -> CharacterState {
        if self.waypoints.is_empty() {
            CharacterState::Idle
        } else {
            CharacterState::Moving
        }
    }

    pub fn facing(&self) -> Direction {
        self.facing
    }

    pub fn waypoints(&self) -> impl Iterator<Item = TileCoord> + '_ {
        self.waypoints.iter().copied()
    }

    /// The waypoint currently being walked toward.
    pub fn head(&self) -> Option<TileCoord> {
        self.waypoints.front().copied()
    }

    pub fn object_target(&self) -> Option<EntityId> {
        self.object_target
    }

    pub fn is_playing_variation(&self) -> bool {
        self.playing_variation
    }

    /// Playback direction for the next idle variation; alternates per call.
    pub(crate) fn take_variation_playback(&mut self) -> PlaybackDirection {
        let playback = self.next_variation_playback;
        self.next_variation_playback = playback.flipped();
        self.playing_variation = true;
        playback
    }

    pub(crate) fn end_variation(&mut self) {
        self.playing_variation = false;
    }

    pub(crate) fn clear_route(&mut self) {
        self.waypoints.clear();
        self.object_target = None;
    }
}

/// Reduces a tile path (start included) to the tiles where the step
/// direction changes, plus the final tile. A straight run collapses to its
/// far end. The start tile itself is never a waypoint.
pub fn collapse_waypoints(path: &[TileCoord]) -> Vec<TileCoord> {
    let mut waypoints = Vec::new();
    for index in 1..path.len() {
        let step = path[index - 1].delta_to(path[index]);
        let is_last = index + 1 == path.len();
        if is_last || path[index].delta_to(path[index + 1]) != step {
            waypoints.push(path[index]);
        }
    }
    waypoints
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiles(coords: &[(i32, i32)]) -> Vec<TileCoord> {
        coords.iter().map(|(x, z)| TileCoord::new(*x, *z)).collect()
    }

    #[test]
    fn straight_run_collapses_to_its_far_end() {
        let path = tiles(&[(0, 0), (1, 0), (2, 0), (3, 0), (4, 0)]);
        assert_eq!(collapse_waypoints(&path), tiles(&[(4, 0)]));
    }

    #[test]
    fn turns_become_waypoints() {
        let path = tiles(&[(0, 0), (1, 0), (2, 0), (2, 1), (2, 2), (3, 3)]);
        assert_eq!(collapse_waypoints(&path), tiles(&[(2, 0), (2, 2), (3, 3)]));
    }

    #[test]
    fn trivial_paths_have_no_waypoints() {
        assert!(collapse_waypoints(&[]).is_empty());
        assert!(collapse_waypoints(&tiles(&[(4, 4)])).is_empty());
    }

    #[test]
    fn variation_playback_alternates() {
        let mut controller = CharacterController::new(CharacterSettings::default());
        assert_eq!(controller.take_variation_playback(), PlaybackDirection::Forward);
        assert!(controller.is_playing_variation());
        controller.end_variation();
        assert_eq!(controller.take_variation_playback(), PlaybackDirection::Reverse);
        assert_eq!(controller.take_variation_playback(), PlaybackDirection::Forward);
    }
}
