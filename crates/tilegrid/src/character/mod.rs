mod controller;
mod direction;

pub use controller::{collapse_waypoints, CharacterController, CharacterState};
pub use direction::{Direction, FacingArity};
