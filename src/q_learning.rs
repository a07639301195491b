//! Tabular Q-learning against a live `GridWorld`.
//!
//! The learner drives the world's agent step by step with an ε-greedy
//! behaviour policy and applies the off-policy TD update
//! `Q(s,a) += α (r + γ max_a' Q(s',a') - Q(s,a))`.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::action::Action;
use crate::error::{MdpError, Result};
use crate::grid::{GridWorld, Position};
use crate::policy::{ActionValueTable, PolicyTable};

/// How ε evolves over training. Every schedule is non-increasing.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EpsilonSchedule {
    Constant,
    /// Multiply ε by `factor` once, at `at_fraction` of the epochs.
    StepDecay { factor: f64, at_fraction: f64 },
    /// Multiply ε by `factor` after every epoch, never going below `floor`.
    Exponential { factor: f64, floor: f64 },
}

impl Default for EpsilonSchedule {
    fn default() -> Self {
        EpsilonSchedule::StepDecay { factor: 0.5, at_fraction: 0.5 }
    }
}

impl EpsilonSchedule {
    pub fn epsilon_at(&self, initial: f64, epoch: usize, epochs: usize) -> f64 {
        match *self {
            EpsilonSchedule::Constant => initial,
            EpsilonSchedule::StepDecay { factor, at_fraction } => {
                let decay_epoch = (epochs as f64 * at_fraction).floor() as usize;
                if epoch >= decay_epoch {
                    initial * factor.clamp(0.0, 1.0)
                } else {
                    initial
                }
            }
            EpsilonSchedule::Exponential { factor, floor } => {
                let decayed = initial * factor.clamp(0.0, 1.0).powi(epoch as i32);
                decayed.max(floor.min(initial))
            }
        }
    }
}

/// Q-learning parameters.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct QLearningConfig {
    pub epochs: usize,
    /// Discount factor.
    pub gamma: f64,
    /// Learning rate.
    pub alpha: f64,
    /// Initial exploration rate.
    pub epsilon: f64,
    pub schedule: EpsilonSchedule,
    /// Episodes longer than this are abandoned.
    pub max_steps_per_episode: Option<usize>,
    pub seed: Option<u64>,
    /// Learn on a world that executes every action as intended.
    pub deterministic: bool,
}

impl Default for QLearningConfig {
    fn default() -> Self {
        QLearningConfig {
            epochs: 300,
            gamma: 0.8,
            alpha: 0.2,
            epsilon: 0.2,
            schedule: EpsilonSchedule::default(),
            max_steps_per_episode: Some(10_000),
            seed: None,
            deterministic: false,
        }
    }
}

/// One training episode, as recorded in the trace.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EpochRecord {
    pub epoch: usize,
    /// Reward collected during this episode.
    pub reward: f64,
    /// Running total over all episodes so far.
    pub cumulative: f64,
    pub steps: usize,
    pub epsilon: f64,
    /// False when the step cap cut the episode short.
    pub terminated: bool,
}

/// Result of a single episode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpisodeSummary {
    pub start: Position,
    pub reward: f64,
    pub steps: usize,
    pub terminated: bool,
}

/// Tabular Q-learner. Owns its action-value table and RNG.
pub struct QLearner {
    config: QLearningConfig,
    q: ActionValueTable,
    rng: StdRng,
    trace: Vec<EpochRecord>,
}

impl QLearner {
    pub fn new(width: usize, height: usize, config: QLearningConfig) -> QLearner {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        QLearner {
            config,
            q: ActionValueTable::zeros(width, height),
            rng,
            trace: Vec::new(),
        }
    }

    /// Learner sized for `grid`.
    pub fn for_grid(grid: &GridWorld, config: QLearningConfig) -> QLearner {
        QLearner::new(grid.width(), grid.height(), config)
    }

    pub fn config(&self) -> &QLearningConfig {
        &self.config
    }

    pub fn q_table(&self) -> &ActionValueTable {
        &self.q
    }

    /// Per-epoch reward trace, one record per completed epoch.
    pub fn trace(&self) -> &[EpochRecord] {
        &self.trace
    }

    /// Greedy policy from the learned action values.
    pub fn policy(&self, grid: &GridWorld) -> PolicyTable {
        self.q.greedy_policy(grid)
    }

    /// Fails unless the action-value table has one row per cell of `grid`.
    fn check_dimensions(&self, grid: &GridWorld) -> Result<()> {
        let (width, height, _) = self.q.values.dim();
        if (width, height) != (grid.width(), grid.height()) {
            return Err(MdpError::InvalidConfiguration {
                message: format!(
                    "learner is sized {width}x{height} but the grid is {}x{}",
                    grid.width(),
                    grid.height()
                ),
            });
        }
        Ok(())
    }

    /// Runs `config.epochs` episodes, appending to the trace.
    ///
    /// Repeated calls continue the ε schedule where the previous call left
    /// off, so exploration never increases over the whole trace.
    pub fn train(&mut self, grid: &mut GridWorld) -> Result<()> {
        self.check_dimensions(grid)?;
        let epochs = self.config.epochs;
        let starts: Vec<Position> = grid.non_terminal_positions().collect();
        if starts.is_empty() {
            return Err(MdpError::NoStartPosition);
        }
        let first_epoch = self.trace.len();
        for epoch in 0..epochs {
            let epsilon = self.config.schedule.epsilon_at(self.config.epsilon, first_epoch + epoch, epochs);
            let summary = self.run_episode_from(grid, &starts, epsilon);
            let cumulative = self.trace.last().map_or(0.0, |r| r.cumulative) + summary.reward;
            self.trace.push(EpochRecord {
                epoch: first_epoch + epoch,
                reward: summary.reward,
                cumulative,
                steps: summary.steps,
                epsilon,
                terminated: summary.terminated,
            });
            if epoch % 50 == 0 {
                debug!(epoch, epsilon, reward = summary.reward, steps = summary.steps, "q-learning epoch");
            }
        }
        info!(
            epochs,
            cumulative = self.trace.last().map_or(0.0, |r| r.cumulative),
            "q-learning finished"
        );
        Ok(())
    }

    /// Runs one episode from a uniformly random non-terminal cell.
    pub fn run_episode(&mut self, grid: &mut GridWorld, epsilon: f64) -> Result<EpisodeSummary> {
        self.check_dimensions(grid)?;
        let starts: Vec<Position> = grid.non_terminal_positions().collect();
        if starts.is_empty() {
            return Err(MdpError::NoStartPosition);
        }
        Ok(self.run_episode_from(grid, &starts, epsilon))
    }

    fn run_episode_from(&mut self, grid: &mut GridWorld, starts: &[Position], epsilon: f64) -> EpisodeSummary {
        // Callers guarantee `starts` is non-empty.
        let start = starts[self.rng.gen_range(0..starts.len())];
        grid.set_initial_state(start.x as isize, start.y as isize);
        grid.restart();

        let mut reward = 0.0;
        while !grid.is_terminated() {
            if let Some(cap) = self.config.max_steps_per_episode {
                if grid.action_counter() >= cap {
                    warn!(%start, steps = cap, "episode hit the step cap, abandoning");
                    break;
                }
            }
            let state = grid.agent_position();
            let action = self.choose_action(state, epsilon);
            let r = grid.perform_action(action);
            reward += r;
            self.update(state, action, r, grid.agent_position());
        }
        EpisodeSummary {
            start,
            reward,
            steps: grid.action_counter(),
            terminated: grid.is_terminated(),
        }
    }

    /// ε-greedy: uniform random action with probability ε, otherwise the
    /// first best action in `Action::ALL` order.
    pub fn choose_action(&mut self, state: Position, epsilon: f64) -> Action {
        if self.rng.gen::<f64>() < epsilon {
            Action::ALL[self.rng.gen_range(0..Action::ALL.len())]
        } else {
            self.q.best_action(state)
        }
    }

    /// TD update for one observed transition.
    pub fn update(&mut self, state: Position, action: Action, reward: f64, next: Position) {
        let old = self.q.get(state, action);
        let target = reward + self.config.gamma * self.q.max_value(next);
        self.q.set(state, action, old + self.config.alpha * (target - old));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::Field;
    use approx::assert_abs_diff_eq;
    use test_case::test_case;

    fn seeded(epochs: usize) -> QLearningConfig {
        QLearningConfig { epochs, seed: Some(11), ..QLearningConfig::default() }
    }

    #[test_case(EpsilonSchedule::Constant; "constant")]
    #[test_case(EpsilonSchedule::StepDecay { factor: 0.5, at_fraction: 0.5 }; "step decay")]
    #[test_case(EpsilonSchedule::Exponential { factor: 0.99, floor: 0.01 }; "exponential")]
    fn schedule_never_increases(schedule: EpsilonSchedule) {
        let epochs = 400;
        let mut previous = f64::INFINITY;
        for epoch in 0..epochs {
            let eps = schedule.epsilon_at(0.3, epoch, epochs);
            assert!(eps <= previous);
            assert!(eps >= 0.0);
            previous = eps;
        }
    }

    #[test]
    fn step_decay_happens_once() {
        let schedule = EpsilonSchedule::StepDecay { factor: 0.5, at_fraction: 0.5 };
        assert_eq!(schedule.epsilon_at(0.2, 0, 100), 0.2);
        assert_eq!(schedule.epsilon_at(0.2, 49, 100), 0.2);
        assert_eq!(schedule.epsilon_at(0.2, 50, 100), 0.1);
        assert_eq!(schedule.epsilon_at(0.2, 99, 100), 0.1);
    }

    #[test]
    fn td_update_moves_toward_target() {
        // Arrange
        let config = QLearningConfig { alpha: 0.5, gamma: 0.8, ..QLearningConfig::default() };
        let mut learner = QLearner::new(2, 1, config);
        let (s, next) = (Position::new(0, 0), Position::new(1, 0));
        learner.q.set(next, Action::Left, 2.0);
        // Act
        learner.update(s, Action::Right, -0.04, next);
        // Assert: 0 + 0.5 * (-0.04 + 0.8 * 2.0 - 0)
        assert_abs_diff_eq!(learner.q_table().get(s, Action::Right), 0.78, epsilon = 1e-12);
    }

    #[test]
    fn greedy_choice_without_exploration() {
        let mut learner = QLearner::new(2, 2, seeded(1));
        let p = Position::new(1, 0);
        learner.q.set(p, Action::Left, 0.3);
        for _ in 0..20 {
            assert_eq!(learner.choose_action(p, 0.0), Action::Left);
        }
    }

    #[test]
    fn trace_has_one_record_per_epoch() {
        // Arrange
        let mut grid = GridWorld::russell_norvig().with_seed(5);
        grid.set_deterministic(true);
        let mut learner = QLearner::for_grid(&grid, seeded(40));
        // Act
        learner.train(&mut grid).unwrap();
        // Assert
        let trace = learner.trace();
        assert_eq!(trace.len(), 40);
        let mut running = 0.0;
        for (i, record) in trace.iter().enumerate() {
            running += record.reward;
            assert_eq!(record.epoch, i);
            assert!(record.terminated);
            assert!(record.steps >= 1);
            assert_abs_diff_eq!(record.cumulative, running, epsilon = 1e-9);
        }
        assert!(trace[39].epsilon < trace[0].epsilon);
    }

    #[test]
    fn sequential_episodes_do_not_leak_state() {
        // Arrange
        let mut grid = GridWorld::russell_norvig().with_seed(9);
        let mut learner = QLearner::for_grid(&grid, seeded(1));
        // Act / Assert
        for _ in 0..20 {
            let summary = learner.run_episode(&mut grid, 0.5).unwrap();
            assert!(summary.terminated);
            assert_eq!(grid.action_counter(), summary.steps);
            assert_ne!(grid.field(summary.start), Field::Obstacle);
            assert!(!grid.is_terminal(summary.start));
            grid.restart();
            assert!(!grid.is_terminated());
            assert_eq!(grid.action_counter(), 0);
            assert_eq!(grid.agent_position(), summary.start);
        }
    }

    #[test]
    fn step_cap_abandons_endless_episode() {
        // Arrange: no terminal anywhere.
        let mut grid = GridWorld::new(3, 3).with_seed(1);
        let config = QLearningConfig { epochs: 3, max_steps_per_episode: Some(25), ..seeded(3) };
        let mut learner = QLearner::for_grid(&grid, config);
        // Act
        learner.train(&mut grid).unwrap();
        // Assert
        for record in learner.trace() {
            assert!(!record.terminated);
            assert_eq!(record.steps, 25);
        }
    }

    #[test]
    fn no_start_position_is_an_error() {
        let mut grid = GridWorld::new(2, 1);
        grid.set_field(0, 0, Field::Reward);
        grid.set_field(1, 0, Field::Obstacle);
        let mut learner = QLearner::for_grid(&grid, seeded(5));
        assert!(matches!(learner.train(&mut grid), Err(MdpError::NoStartPosition)));
        assert!(learner.trace().is_empty());
    }

    #[test]
    fn continued_training_keeps_decaying_epsilon() {
        // Arrange
        let mut grid = GridWorld::russell_norvig().with_seed(3);
        grid.set_deterministic(true);
        let mut learner = QLearner::for_grid(&grid, seeded(10));
        // Act
        learner.train(&mut grid).unwrap();
        learner.train(&mut grid).unwrap();
        // Assert
        let trace = learner.trace();
        assert_eq!(trace.len(), 20);
        for pair in trace.windows(2) {
            assert_eq!(pair[1].epoch, pair[0].epoch + 1);
            assert!(pair[1].epsilon <= pair[0].epsilon);
        }
        assert_eq!(trace[19].epsilon, 0.1);
    }

    #[test]
    fn learner_sized_for_another_grid_is_rejected() {
        // Arrange
        let mut grid = GridWorld::russell_norvig();
        let mut learner = QLearner::new(2, 2, seeded(5));
        // Act / Assert
        assert!(matches!(learner.train(&mut grid), Err(MdpError::InvalidConfiguration { .. })));
        assert!(matches!(learner.run_episode(&mut grid, 0.2), Err(MdpError::InvalidConfiguration { .. })));
        assert!(learner.trace().is_empty());
        assert_eq!(grid.action_counter(), 0);
    }
}
