//! Value iteration over a known grid-world model.
//!
//! Each sweep applies the Bellman optimality operator to every cell the
//! agent can act from, reading only the previous sweep's table (Jacobi
//! update), until the largest change drops below `theta`.

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::action::Action;
use crate::field::Field;
use crate::grid::{GridWorld, Position};
use crate::policy::{first_max, ActionValueTable, PolicyTable, ValueTable};

/// Value iteration parameters.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct ValueIterationConfig {
    /// Discount factor.
    pub gamma: f64,
    /// Convergence threshold on the largest per-sweep change.
    pub theta: f64,
    /// Safety valve against non-convergence, e.g. `gamma >= 1` with no
    /// reachable terminal.
    pub max_sweeps: Option<usize>,
}

impl Default for ValueIterationConfig {
    fn default() -> Self {
        ValueIterationConfig { gamma: 0.9, theta: 1e-6, max_sweeps: Some(100_000) }
    }
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Convergence {
    /// No sweep has run yet, or the last one still changed values by `theta` or more.
    Unconverged { sweeps: usize, residual: f64 },
    Converged { sweeps: usize },
    /// Sweep cap reached; the table is a best effort.
    SweepLimit { sweeps: usize, residual: f64 },
}

impl Convergence {
    pub fn is_converged(&self) -> bool {
        matches!(self, Convergence::Converged { .. })
    }

    pub fn sweeps(&self) -> usize {
        match *self {
            Convergence::Unconverged { sweeps, .. }
            | Convergence::Converged { sweeps }
            | Convergence::SweepLimit { sweeps, .. } => sweeps,
        }
    }
}

/// Final values, derived policy and how the run ended.
#[derive(Debug, Clone)]
pub struct ValueSolution {
    pub values: ValueTable,
    pub policy: PolicyTable,
    pub convergence: Convergence,
}

/// Computes optimal state values for a grid without ever moving its agent.
pub struct ValueIterator<'a> {
    grid: &'a GridWorld,
    config: ValueIterationConfig,
    values: ValueTable,
    convergence: Convergence,
}

impl<'a> ValueIterator<'a> {
    pub fn new(grid: &'a GridWorld, config: ValueIterationConfig) -> ValueIterator<'a> {
        ValueIterator {
            grid,
            config,
            values: ValueTable::zeros(grid.width(), grid.height()),
            convergence: Convergence::Unconverged { sweeps: 0, residual: f64::INFINITY },
        }
    }

    pub fn values(&self) -> &ValueTable {
        &self.values
    }

    pub fn convergence(&self) -> Convergence {
        self.convergence
    }

    /// Expected return of taking `action` at `position` under `values`.
    pub fn q_value(&self, values: &ValueTable, position: Position, action: Action) -> f64 {
        let model = self.grid.transition_model();
        let gamma = self.config.gamma;
        model
            .outcomes(action)
            .iter()
            .filter(|(_, p)| *p > 0.0)
            .map(|(executed, p)| {
                let next = match executed {
                    Some(a) => self.grid.target(position, a),
                    None => position,
                };
                p * (self.grid.reward(next) + gamma * values.get(next))
            })
            .sum()
    }

    /// One synchronous sweep. Returns the largest absolute change.
    pub fn sweep(&mut self) -> f64 {
        let mut next = self.values.clone();
        let mut residual: f64 = 0.0;
        for position in self.grid.non_terminal_positions() {
            let best = Action::ALL
                .iter()
                .map(|&a| self.q_value(&self.values, position, a))
                .fold(f64::NEG_INFINITY, f64::max);
            residual = residual.max((best - self.values.get(position)).abs());
            next.values[[position.x, position.y]] = best;
        }
        self.values = next;
        let sweeps = self.convergence.sweeps() + 1;
        self.convergence = if residual < self.config.theta {
            Convergence::Converged { sweeps }
        } else {
            Convergence::Unconverged { sweeps, residual }
        };
        residual
    }

    /// Sweeps until converged or the sweep cap is hit.
    pub fn run(&mut self) -> ValueSolution {
        while !self.convergence.is_converged() {
            if let Some(cap) = self.config.max_sweeps {
                let sweeps = self.convergence.sweeps();
                if sweeps >= cap {
                    let residual = match self.convergence {
                        Convergence::Unconverged { residual, .. } => residual,
                        _ => f64::INFINITY,
                    };
                    warn!(sweeps, residual, "value iteration hit the sweep cap before converging");
                    self.convergence = Convergence::SweepLimit { sweeps, residual };
                    break;
                }
            }
            let residual = self.sweep();
            debug!(sweep = self.convergence.sweeps(), residual, "value iteration sweep");
        }
        if self.convergence.is_converged() {
            info!(sweeps = self.convergence.sweeps(), "value iteration converged");
        }
        ValueSolution {
            values: self.values.clone(),
            policy: self.policy(),
            convergence: self.convergence,
        }
    }

    /// Full expected action-value table under the current values.
    pub fn action_values(&self) -> ActionValueTable {
        let mut q = ActionValueTable::zeros(self.grid.width(), self.grid.height());
        for position in self.grid.non_terminal_positions() {
            for a in Action::ALL {
                q.set(position, a, self.q_value(&self.values, position, a));
            }
        }
        q
    }

    /// Policy from the current values.
    ///
    /// An adjacent reward cell is taken immediately. Otherwise the action
    /// whose destination has the best one-step backup wins, first in
    /// `Action::ALL` order on ties.
    pub fn policy(&self) -> PolicyTable {
        let grid = self.grid;
        let gamma = self.config.gamma;
        let mut policy = PolicyTable::empty(grid.width(), grid.height());
        for position in grid.non_terminal_positions() {
            let towards_reward = Action::ALL.iter().copied().find(|&a| {
                grid.neighbor(position, a)
                    .is_some_and(|n| grid.field(n) == Field::Reward)
            });
            let action = towards_reward.unwrap_or_else(|| {
                first_max(Action::ALL.iter().map(|&a| {
                    let next = grid.target(position, a);
                    (a, grid.reward(next) + gamma * self.values.get(next))
                }))
                .0
            });
            policy.set(position, Some(action));
        }
        policy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Rewards;
    use approx::assert_abs_diff_eq;
    use test_case::test_case;

    fn exact() -> ValueIterationConfig {
        ValueIterationConfig { gamma: 0.9, theta: 1e-12, max_sweeps: Some(10_000) }
    }

    fn corridor() -> GridWorld {
        let mut grid = GridWorld::new(5, 1);
        grid.set_deterministic(true);
        grid.set_field(4, 0, Field::Reward);
        grid
    }

    #[test]
    fn corridor_values() {
        // Arrange
        let grid = corridor();
        let mut vi = ValueIterator::new(&grid, exact());
        // Act
        let solution = vi.run();
        // Assert
        assert!(solution.convergence.is_converged());
        let expected = [0.6206, 0.734, 0.86, 1.0, 0.0];
        for (x, v) in expected.iter().enumerate() {
            assert_abs_diff_eq!(solution.values.get(Position::new(x, 0)), *v, epsilon = 1e-9);
        }
        for x in 0..4 {
            assert_eq!(solution.policy.get(Position::new(x, 0)), Some(Action::Right));
        }
        assert_eq!(solution.policy.get(Position::new(4, 0)), None);
    }

    #[test]
    fn sweeps_read_only_previous_table() {
        // Arrange
        let grid = corridor();
        let mut vi = ValueIterator::new(&grid, exact());
        // Act
        vi.sweep();
        // Assert: a Gauss-Seidel sweep would already have propagated past x = 3.
        assert_eq!(vi.values().get(Position::new(3, 0)), 1.0);
        assert_abs_diff_eq!(vi.values().get(Position::new(2, 0)), -0.04, epsilon = 1e-12);
        assert_abs_diff_eq!(vi.values().get(Position::new(0, 0)), -0.04, epsilon = 1e-12);
        // Act
        vi.sweep();
        // Assert
        assert_abs_diff_eq!(vi.values().get(Position::new(2, 0)), 0.86, epsilon = 1e-12);
        assert_abs_diff_eq!(vi.values().get(Position::new(1, 0)), -0.076, epsilon = 1e-12);
        assert_eq!(vi.convergence().sweeps(), 2);
    }

    #[test]
    fn terminal_and_obstacle_cells_stay_zero() {
        // Arrange
        let grid = GridWorld::russell_norvig();
        let mut vi = ValueIterator::new(&grid, ValueIterationConfig::default());
        // Act
        let solution = vi.run();
        // Assert
        for (x, y) in [(1, 1), (3, 1), (3, 2)] {
            assert_eq!(solution.values.get(Position::new(x, y)), 0.0);
            assert_eq!(solution.policy.get(Position::new(x, y)), None);
        }
    }

    #[test]
    fn russell_norvig_policy_heads_for_reward() {
        // Arrange
        let grid = GridWorld::russell_norvig();
        let mut vi = ValueIterator::new(&grid, exact());
        // Act
        let solution = vi.run();
        // Assert
        assert_eq!(solution.policy.get(Position::new(2, 2)), Some(Action::Right));
        assert_eq!(solution.policy.get(Position::new(3, 0)), Some(Action::Left));
        let path = solution.policy.trajectory(&grid, Position::new(0, 0), 50);
        assert_eq!(path.last(), Some(&Position::new(3, 2)));
        assert!(!path.contains(&Position::new(3, 1)));
    }

    #[test]
    fn adjacent_reward_overrides_higher_backup() {
        // Arrange: a positive living reward makes bouncing in place worth
        // 0.5 / (1 - 0.9) = 5, far more than the 0.1 goal next door.
        let mut grid = GridWorld::new(2, 1);
        grid.set_deterministic(true);
        grid.set_field(1, 0, Field::Reward);
        grid.set_rewards(Rewards { positive: 0.1, negative: -1.0, living: 0.5 });
        let mut vi = ValueIterator::new(&grid, exact());
        // Act
        let solution = vi.run();
        let q = vi.action_values();
        // Assert
        let start = Position::new(0, 0);
        assert_abs_diff_eq!(solution.values.get(start), 5.0, epsilon = 1e-6);
        assert_eq!(q.best_action(start), Action::Up);
        assert_eq!(solution.policy.get(start), Some(Action::Right));
    }

    #[test]
    fn sweep_cap_reports_best_effort() {
        // Arrange: no terminal and gamma = 1 never converges.
        let mut grid = GridWorld::new(3, 3);
        grid.set_deterministic(true);
        let config = ValueIterationConfig { gamma: 1.0, theta: 1e-9, max_sweeps: Some(25) };
        let mut vi = ValueIterator::new(&grid, config);
        // Act
        let solution = vi.run();
        // Assert
        assert!(matches!(solution.convergence, Convergence::SweepLimit { sweeps: 25, .. }));
        assert_abs_diff_eq!(solution.values.get(Position::new(1, 1)), -0.04 * 25.0, epsilon = 1e-9);
    }

    #[test]
    fn grid_without_free_cells_converges_immediately() {
        let mut grid = GridWorld::new(1, 1);
        grid.set_field(0, 0, Field::Reward);
        let mut vi = ValueIterator::new(&grid, exact());
        let solution = vi.run();
        assert_eq!(solution.convergence, Convergence::Converged { sweeps: 1 });
    }

    #[test_case(0.8, 0.2, 0.0, 0.0; "sidestep")]
    #[test_case(0.7, 0.1, 0.1, 0.1; "all kinds")]
    fn action_values_match_bellman_fixed_point(forward: f64, side: f64, back: f64, none: f64) {
        // Arrange
        let mut grid = GridWorld::russell_norvig();
        grid.set_step_probabilities(forward, side, back, none).unwrap();
        let mut vi = ValueIterator::new(&grid, exact());
        // Act
        let solution = vi.run();
        let q = vi.action_values();
        // Assert
        for p in grid.non_terminal_positions() {
            assert_abs_diff_eq!(q.max_value(p), solution.values.get(p), epsilon = 1e-9);
        }
    }
}
