use std::fmt;

use serde::{Deserialize, Serialize};

/// Tile coordinate convention:
/// - `x` grows to the right, `y` grows downward (screen order).
/// - Coordinates are signed so callers can ask about tiles outside the map; walkability decides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Tile {
    pub x: i32,
    pub y: i32,
}

impl Tile {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn manhattan(self, other: Tile) -> u32 {
        self.x.abs_diff(other.x).saturating_add(self.y.abs_diff(other.y))
    }

    pub fn offset(self, direction: Direction) -> Tile {
        let (dx, dy) = direction.delta();
        Tile {
            x: self.x.saturating_add(dx),
            y: self.y.saturating_add(dy),
        }
    }

    /// Neighbor order is fixed: up, right, down, left.
    pub fn neighbors(self) -> [Tile; 4] {
        [
            self.offset(Direction::Up),
            self.offset(Direction::Right),
            self.offset(Direction::Down),
            self.offset(Direction::Left),
        ]
    }
}

impl fmt::Display for Tile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Up,
    Right,
    Down,
    Left,
}

impl Direction {
    pub fn delta(self) -> (i32, i32) {
        match self {
            Self::Up => (0, -1),
            Self::Right => (1, 0),
            Self::Down => (0, 1),
            Self::Left => (-1, 0),
        }
    }

    /// Unit step from `from` toward `to`. Horizontal wins over vertical so a diagonal
    /// delta never yields two presses in one tick.
    pub fn toward(from: Tile, to: Tile) -> Option<Direction> {
        let dx = to.x - from.x;
        let dy = to.y - from.y;
        if dx > 0 {
            Some(Self::Right)
        } else if dx < 0 {
            Some(Self::Left)
        } else if dy > 0 {
            Some(Self::Down)
        } else if dy < 0 {
            Some(Self::Up)
        } else {
            None
        }
    }

    pub fn as_token(self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Right => "right",
            Self::Down => "down",
            Self::Left => "left",
        }
    }
}

/// Ordered waypoints from (excluding) the start tile to (including) the goal tile.
/// Empty means the mover already stands on the goal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Path {
    waypoints: Vec<Tile>,
}

impl Path {
    pub fn new(waypoints: Vec<Tile>) -> Self {
        Self { waypoints }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.waypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Tile> {
        self.waypoints.get(index).copied()
    }

    pub fn last(&self) -> Option<Tile> {
        self.waypoints.last().copied()
    }

    pub fn tiles(&self) -> &[Tile] {
        &self.waypoints
    }

    /// True when every waypoint is one orthogonal step from its predecessor, starting at `start`.
    pub fn is_contiguous_from(&self, start: Tile) -> bool {
        let mut previous = start;
        for tile in &self.waypoints {
            if previous.manhattan(*tile) != 1 {
                return false;
            }
            previous = *tile;
        }
        true
    }
}
