use std::fmt;

use serde::{Deserialize, Serialize};

/// The four compass actions available in every cell.
///
/// `Up` increases `y`, `Right` increases `x`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Up,
    Down,
    Left,
    Right,
}

/// Geometry of one action: unit displacement and its rotated/reversed
/// counterparts in the cyclic order UP -> RIGHT -> DOWN -> LEFT -> UP.
struct Geometry {
    dx: isize,
    dy: isize,
    left: Action,
    right: Action,
    reverse: Action,
}

// Indexed by `Action::index`.
const GEOMETRY: [Geometry; 4] = [
    Geometry { dx: 0, dy: 1, left: Action::Left, right: Action::Right, reverse: Action::Down },
    Geometry { dx: 0, dy: -1, left: Action::Right, right: Action::Left, reverse: Action::Up },
    Geometry { dx: -1, dy: 0, left: Action::Down, right: Action::Up, reverse: Action::Right },
    Geometry { dx: 1, dy: 0, left: Action::Up, right: Action::Down, reverse: Action::Left },
];

impl Action {
    /// Enumeration order. Every arg-max in the crate scans in this order and
    /// keeps the first maximum.
    pub const ALL: [Action; 4] = [Action::Up, Action::Down, Action::Left, Action::Right];

    pub const fn index(self) -> usize {
        match self {
            Action::Up => 0,
            Action::Down => 1,
            Action::Left => 2,
            Action::Right => 3,
        }
    }

    pub fn from_index(index: usize) -> Option<Action> {
        Action::ALL.get(index).copied()
    }

    fn geometry(self) -> &'static Geometry {
        &GEOMETRY[self.index()]
    }

    /// Unit displacement `(dx, dy)`.
    pub fn delta(self) -> (isize, isize) {
        let g = self.geometry();
        (g.dx, g.dy)
    }

    /// 90 degrees counter-clockwise (UP -> LEFT).
    pub fn rotate_left(self) -> Action {
        self.geometry().left
    }

    /// 90 degrees clockwise (UP -> RIGHT).
    pub fn rotate_right(self) -> Action {
        self.geometry().right
    }

    pub fn reverse(self) -> Action {
        self.geometry().reverse
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Action::Up => "UP",
            Action::Down => "DOWN",
            Action::Left => "LEFT",
            Action::Right => "RIGHT",
        };
        // `pad` so width/alignment specifiers work in table layouts.
        f.pad(name)
    }
}
