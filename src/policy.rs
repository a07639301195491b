use ndarray::{Array2, Array3};

use crate::action::Action;
use crate::grid::{GridWorld, Position};

/// State values, indexed `[[x, y]]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueTable {
    pub values: Array2<f64>,
}

impl ValueTable {
    pub fn zeros(width: usize, height: usize) -> ValueTable {
        ValueTable { values: Array2::zeros((width, height)) }
    }

    pub fn get(&self, position: Position) -> f64 {
        self.values[[position.x, position.y]]
    }
}

/// Action values, indexed `[[x, y, action.index()]]`.
///
/// Every (position, action) pair is present, including obstacle and
/// terminal cells.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionValueTable {
    pub values: Array3<f64>,
}

impl ActionValueTable {
    pub fn zeros(width: usize, height: usize) -> ActionValueTable {
        ActionValueTable { values: Array3::zeros((width, height, Action::ALL.len())) }
    }

    pub fn get(&self, position: Position, action: Action) -> f64 {
        self.values[[position.x, position.y, action.index()]]
    }

    pub fn set(&mut self, position: Position, action: Action, value: f64) {
        self.values[[position.x, position.y, action.index()]] = value;
    }

    /// Highest action value at `position` and the first action reaching it
    /// in `Action::ALL` order.
    pub fn best(&self, position: Position) -> (Action, f64) {
        first_max(Action::ALL.iter().map(|&a| (a, self.get(position, a))))
    }

    pub fn best_action(&self, position: Position) -> Action {
        self.best(position).0
    }

    pub fn max_value(&self, position: Position) -> f64 {
        self.best(position).1
    }

    /// Greedy policy over the non-terminal cells of `grid`.
    pub fn greedy_policy(&self, grid: &GridWorld) -> PolicyTable {
        let mut policy = PolicyTable::empty(grid.width(), grid.height());
        for position in grid.non_terminal_positions() {
            policy.set(position, Some(self.best_action(position)));
        }
        policy
    }
}

/// Arg-max keeping the first of equal maxima.
pub(crate) fn first_max(candidates: impl Iterator<Item = (Action, f64)>) -> (Action, f64) {
    let mut best = (Action::Up, f64::NEG_INFINITY);
    for (action, value) in candidates {
        if value > best.1 {
            best = (action, value);
        }
    }
    best
}

/// Chosen action per cell, `None` at terminal and obstacle cells.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyTable {
    pub actions: Array2<Option<Action>>,
}

impl PolicyTable {
    pub fn empty(width: usize, height: usize) -> PolicyTable {
        PolicyTable { actions: Array2::from_elem((width, height), None) }
    }

    pub fn get(&self, position: Position) -> Option<Action> {
        self.actions[[position.x, position.y]]
    }

    pub fn set(&mut self, position: Position, action: Option<Action>) {
        self.actions[[position.x, position.y]] = action;
    }

    /// Follows the policy deterministically from `start` using the grid's
    /// bounce rule, for at most `limit` steps.
    ///
    /// Returns every visited position including `start`. Stops at the first
    /// cell without an action (terminal or obstacle).
    pub fn trajectory(&self, grid: &GridWorld, start: Position, limit: usize) -> Vec<Position> {
        let mut path = vec![start];
        let mut current = start;
        for _ in 0..limit {
            let Some(action) = self.get(current) else {
                break;
            };
            current = grid.target(current, action);
            path.push(current);
        }
        path
    }

    /// Number of cells where both policies pick an action and agree.
    pub fn agreement(&self, other: &PolicyTable) -> usize {
        self.actions
            .iter()
            .zip(other.actions.iter())
            .filter(|(a, b)| a.is_some() && a == b)
            .count()
    }
}
