use serde::Deserialize;

use crate::grid::{Projection, TileCoord};

/// Compass facing, clockwise from north.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    N,
    Ne,
    E,
    Se,
    S,
    Sw,
    W,
    Nw,
}

const CLOCKWISE: [Direction; 8] = [
    Direction::N,
    Direction::Ne,
    Direction::E,
    Direction::Se,
    Direction::S,
    Direction::Sw,
    Direction::W,
    Direction::Nw,
];

/// How many facings a character's sprite set provides.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FacingArity {
    Four,
    #[default]
    Eight,
}

impl Direction {
    pub fn label(self) -> &'static str {
        match self {
            Self::N => "n",
            Self::Ne => "ne",
            Self::E => "e",
            Self::Se => "se",
            Self::S => "s",
            Self::Sw => "sw",
            Self::W => "w",
            Self::Nw => "nw",
        }
    }

    fn index(self) -> usize {
        match self {
            Self::N => 0,
            Self::Ne => 1,
            Self::E => 2,
            Self::Se => 3,
            Self::S => 4,
            Self::Sw => 5,
            Self::W => 6,
            Self::Nw => 7,
        }
    }

    /// Screen-space facing of a tile delta, by the signs of `dx` and `dz`.
    /// `None` for a zero delta.
    pub fn from_delta(delta: TileCoord, projection: Projection) -> Option<Self> {
        let key = (delta.x.signum(), delta.z.signum());
        let direction = match projection {
            // +x runs up-right and +z up-left on screen.
            Projection::Isometric => match key {
                (1, 0) => Self::Ne,
                (0, 1) => Self::Nw,
                (1, 1) => Self::N,
                (1, -1) => Self::E,
                (-1, 0) => Self::Sw,
                (0, -1) => Self::Se,
                (-1, -1) => Self::S,
                (-1, 1) => Self::W,
                _ => return None,
            },
            Projection::Orthogonal => match key {
                (1, 0) => Self::E,
                (-1, 0) => Self::W,
                (0, 1) => Self::S,
                (0, -1) => Self::N,
                (1, 1) => Self::Se,
                (1, -1) => Self::Ne,
                (-1, 1) => Self::Sw,
                (-1, -1) => Self::Nw,
                _ => return None,
            },
        };
        Some(direction)
    }

    /// Nearest facing the sprite set actually has. With four facings the
    /// grid axes are kept (the diagonals on screen for isometric maps) and
    /// an in-between direction turns clockwise.
    pub fn snapped(self, arity: FacingArity, projection: Projection) -> Self {
        if arity == FacingArity::Eight {
            return self;
        }
        let axis_parity = match projection {
            Projection::Isometric => 1,
            Projection::Orthogonal => 0,
        };
        if self.index() % 2 == axis_parity {
            self
        } else {
            CLOCKWISE[(self.index() + 1) % CLOCKWISE.len()]
        }
    }

    pub fn walk_animation(self) -> String {
        format!("Walk_iso_{}", self.label())
    }

    pub fn idle_animation(self) -> String {
        format!("Idle_iso_{}", self.label())
    }
}
