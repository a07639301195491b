use serde::{Deserialize, Serialize};

/// Kind of a grid cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    /// Cannot be entered.
    Obstacle,
    Empty,
    /// Terminal, yields the positive reward.
    Reward,
    /// Terminal, yields the negative reward.
    NegReward,
    /// Returned for queries outside the grid, never stored.
    OutOfBounds,
}

impl Field {
    /// Entering this cell ends the episode.
    pub fn is_terminal(self) -> bool {
        matches!(self, Field::Reward | Field::NegReward)
    }

    /// The agent may stand on this cell.
    pub fn is_passable(self) -> bool {
        !matches!(self, Field::Obstacle | Field::OutOfBounds)
    }
}
