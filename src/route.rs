use serde::{Deserialize, Serialize};

use crate::geometry::Vec2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    NorthSouth,
    EastWest,
}

impl Axis {
    pub fn other(self) -> Axis {
        match self {
            Axis::NorthSouth => Axis::EastWest,
            Axis::EastWest => Axis::NorthSouth,
        }
    }
}

/// Lane a vehicle enters the junction from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Origin {
    North, // Enters at the top, drives south
    South, // Enters at the bottom, drives north
    East,  // Enters on the right, drives west
    West,  // Enters on the left, drives east
}

impl Origin {
    pub const ALL: [Origin; 4] = [Origin::North, Origin::South, Origin::East, Origin::West];

    pub fn axis(self) -> Axis {
        match self {
            Origin::North | Origin::South => Axis::NorthSouth,
            Origin::East | Origin::West => Axis::EastWest,
        }
    }

    /// Unit travel direction in screen coordinates (y grows downwards).
    pub fn heading(self) -> Vec2 {
        match self {
            Origin::North => Vec2::new(0.0, 1.0),
            Origin::South => Vec2::new(0.0, -1.0),
            Origin::East => Vec2::new(-1.0, 0.0),
            Origin::West => Vec2::new(1.0, 0.0),
        }
    }

    pub fn is_horizontal(self) -> bool {
        self.axis() == Axis::EastWest
    }
}
