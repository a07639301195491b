use std::fmt;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;
use tracing::{trace, warn};

use crate::action::Action;
use crate::error::Result;
use crate::field::Field;
use crate::transition::TransitionModel;

/// A cell inside the grid. `(0, 0)` is the bottom-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Position {
    pub x: usize,
    pub y: usize,
}

impl Position {
    pub fn new(x: usize, y: usize) -> Position {
        Position { x, y }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Iterates every position column by column: x outer, y inner.
pub struct Positions {
    x: usize,
    y: usize,
    width: usize,
    height: usize,
}

impl Positions {
    pub fn new(width: usize, height: usize) -> Positions {
        Positions { x: 0, y: 0, width, height }
    }
}

impl Iterator for Positions {
    type Item = Position;

    fn next(&mut self) -> Option<Self::Item> {
        if self.x >= self.width || self.height == 0 {
            return None;
        }
        let position = Position { x: self.x, y: self.y };
        if self.y + 1 < self.height {
            self.y += 1;
        } else {
            self.y = 0;
            self.x += 1;
        }
        Some(position)
    }
}

/// Reward paid on entering a cell.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct Rewards {
    /// Entering a `Field::Reward` cell.
    pub positive: f64,
    /// Entering a `Field::NegReward` cell.
    pub negative: f64,
    /// Entering an empty cell. Negative values favour short paths.
    pub living: f64,
}

impl Default for Rewards {
    fn default() -> Self {
        Rewards { positive: 1.0, negative: -1.0, living: -0.04 }
    }
}

/// State changes reported to observers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GridEvent {
    FieldChanged { position: Position, field: Field },
    /// The agent was placed directly, outside of an action.
    Moved { position: Position },
    Stepped {
        from: Position,
        to: Position,
        intended: Action,
        /// `None` when the action was not executed at all.
        executed: Option<Action>,
        reward: f64,
        terminated: bool,
    },
    Restarted { position: Position },
}

/// Hook for renderers and progress reporting.
///
/// Observers are called synchronously after every state change and only
/// see the event, never the world itself.
pub trait GridObserver {
    fn notify(&mut self, event: &GridEvent);
}

/// Logs every event at trace level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl GridObserver for TracingObserver {
    fn notify(&mut self, event: &GridEvent) {
        match event {
            GridEvent::Stepped { from, to, intended, executed, reward, terminated } => {
                let executed = executed.map_or_else(|| "none".to_string(), |a| a.to_string());
                trace!(%from, %to, %intended, %executed, reward, terminated, "step");
            }
            GridEvent::Restarted { position } => trace!(%position, "restart"),
            GridEvent::Moved { position } => trace!(%position, "agent placed"),
            GridEvent::FieldChanged { position, field } => trace!(%position, ?field, "field set"),
        }
    }
}

/// Grid-world MDP with an agent that can roam around in it.
///
/// The world owns the landscape and the agent's episode state (position,
/// termination flag, action counter). It has no internal locking: one
/// writer at a time, which `&mut self` on every mutator enforces.
pub struct GridWorld {
    width: usize,
    height: usize,
    /// Indexed `[[x, y]]`.
    landscape: ndarray::Array2<Field>,
    agent: Position,
    initial: Position,
    terminated: bool,
    deterministic: bool,
    model: TransitionModel,
    rewards: Rewards,
    action_counter: usize,
    rng: StdRng,
    observers: Vec<Box<dyn GridObserver>>,
}

impl fmt::Debug for GridWorld {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("GridWorld")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("agent", &self.agent)
            .field("initial", &self.initial)
            .field("terminated", &self.terminated)
            .field("deterministic", &self.deterministic)
            .field("model", &self.model)
            .field("rewards", &self.rewards)
            .field("action_counter", &self.action_counter)
            .finish_non_exhaustive()
    }
}

impl GridWorld {
    /// Empty `width` x `height` grid with default rewards and a stochastic
    /// 0.8 / 0.2 transition model.
    pub fn new(width: usize, height: usize) -> GridWorld {
        GridWorld {
            width,
            height,
            landscape: ndarray::Array2::from_elem((width, height), Field::Empty),
            agent: Position::new(0, 0),
            initial: Position::new(0, 0),
            terminated: false,
            deterministic: false,
            model: TransitionModel::default(),
            rewards: Rewards::default(),
            action_counter: 0,
            rng: StdRng::from_entropy(),
            observers: Vec::new(),
        }
    }

    /// The 4x3 world from chapter 17 of Russell & Norvig.
    pub fn russell_norvig() -> GridWorld {
        let mut grid = GridWorld::new(4, 3);
        grid.set_field(1, 1, Field::Obstacle);
        grid.set_field(3, 1, Field::NegReward);
        grid.set_field(3, 2, Field::Reward);
        grid
    }

    pub fn with_seed(mut self, seed: u64) -> GridWorld {
        self.reseed(seed);
        self
    }

    pub fn reseed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    pub fn subscribe(&mut self, observer: Box<dyn GridObserver>) {
        self.observers.push(observer);
    }

    fn notify(&mut self, event: GridEvent) {
        for observer in self.observers.iter_mut() {
            observer.notify(&event);
        }
    }

    /// Converts signed coordinates into a position, `None` when off-grid.
    pub fn position(&self, x: isize, y: isize) -> Option<Position> {
        if x < 0 || y < 0 {
            return None;
        }
        let (x, y) = (x as usize, y as usize);
        if x < self.width && y < self.height {
            Some(Position { x, y })
        } else {
            None
        }
    }

    pub fn field_at(&self, x: isize, y: isize) -> Field {
        match self.position(x, y) {
            Some(p) => self.field(p),
            None => Field::OutOfBounds,
        }
    }

    pub fn field(&self, position: Position) -> Field {
        self.landscape
            .get([position.x, position.y])
            .copied()
            .unwrap_or(Field::OutOfBounds)
    }

    /// Overwrites a cell. Out-of-range coordinates are ignored.
    pub fn set_field(&mut self, x: isize, y: isize, field: Field) {
        // OutOfBounds is a query result, not a storable kind.
        if field == Field::OutOfBounds {
            return;
        }
        if let Some(position) = self.position(x, y) {
            self.landscape[[position.x, position.y]] = field;
            self.notify(GridEvent::FieldChanged { position, field });
        }
    }

    /// Records where `restart` puts the agent. Does not move it.
    pub fn set_initial_state(&mut self, x: isize, y: isize) {
        match self.position(x, y) {
            Some(p) => self.initial = p,
            None => warn!(x, y, "initial state outside the grid, ignoring"),
        }
    }

    /// Places the agent directly, leaving the counter and termination flag alone.
    pub fn set_agent_position(&mut self, x: isize, y: isize) {
        match self.position(x, y) {
            Some(position) => {
                self.agent = position;
                self.notify(GridEvent::Moved { position });
            }
            None => warn!(x, y, "agent position outside the grid, ignoring"),
        }
    }

    /// Starts a new episode from the initial state.
    pub fn restart(&mut self) {
        self.agent = self.initial;
        self.terminated = false;
        self.action_counter = 0;
        self.notify(GridEvent::Restarted { position: self.agent });
    }

    /// Neighbor in direction `action`, `None` when off-grid.
    pub fn neighbor(&self, position: Position, action: Action) -> Option<Position> {
        let (dx, dy) = action.delta();
        self.position(position.x as isize + dx, position.y as isize + dy)
    }

    /// Where `action` actually leads from `position`: the agent stays put
    /// when the move would leave the grid or enter an obstacle.
    pub fn target(&self, position: Position, action: Action) -> Position {
        match self.neighbor(position, action) {
            Some(next) if self.field(next).is_passable() => next,
            _ => position,
        }
    }

    /// Executes `intended`, possibly misexecuted, and returns the reward of
    /// the cell the agent ends up in.
    ///
    /// Once terminated every call returns 0 and changes nothing.
    pub fn perform_action(&mut self, intended: Action) -> f64 {
        if self.terminated {
            return 0.0;
        }
        let executed = if self.deterministic {
            Some(intended)
        } else {
            let u: f64 = self.rng.gen();
            self.model.sample(intended, u)
        };
        let from = self.agent;
        if let Some(action) = executed {
            self.agent = self.target(from, action);
        }
        self.action_counter += 1;
        let reward = self.reward(self.agent);
        self.terminated = self.field(self.agent).is_terminal();
        self.notify(GridEvent::Stepped {
            from,
            to: self.agent,
            intended,
            executed,
            reward,
            terminated: self.terminated,
        });
        reward
    }

    pub fn reward_at(&self, x: isize, y: isize) -> f64 {
        self.reward_for(self.field_at(x, y))
    }

    pub fn reward(&self, position: Position) -> f64 {
        self.reward_for(self.field(position))
    }

    fn reward_for(&self, field: Field) -> f64 {
        match field {
            Field::Empty => self.rewards.living,
            Field::Reward => self.rewards.positive,
            Field::NegReward => self.rewards.negative,
            Field::Obstacle | Field::OutOfBounds => 0.0,
        }
    }

    /// Reward of the agent's cell; 0 once the episode has terminated.
    pub fn current_reward(&self) -> f64 {
        if self.terminated {
            0.0
        } else {
            self.reward(self.agent)
        }
    }

    pub fn set_deterministic(&mut self, deterministic: bool) {
        self.deterministic = deterministic;
    }

    /// Sets the misexecution weights, normalizing them if they do not add up to 1.
    pub fn set_step_probabilities(
        &mut self, forward: f64, sidestep: f64, backstep: f64, nostep: f64,
    ) -> Result<()> {
        self.model = TransitionModel::new(forward, sidestep, backstep, nostep)?;
        Ok(())
    }

    pub fn set_rewards(&mut self, rewards: Rewards) {
        self.rewards = rewards;
    }

    pub fn set_positive_reward(&mut self, reward: f64) {
        self.rewards.positive = reward;
    }

    pub fn set_negative_reward(&mut self, reward: f64) {
        self.rewards.negative = reward;
    }

    pub fn set_living_reward(&mut self, reward: f64) {
        self.rewards.living = reward;
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn agent_position(&self) -> Position {
        self.agent
    }

    pub fn initial_position(&self) -> Position {
        self.initial
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    pub fn is_deterministic(&self) -> bool {
        self.deterministic
    }

    /// Actions performed since the last restart.
    pub fn action_counter(&self) -> usize {
        self.action_counter
    }

    pub fn rewards(&self) -> Rewards {
        self.rewards
    }

    /// The model actually in effect: a point mass when deterministic.
    pub fn transition_model(&self) -> TransitionModel {
        if self.deterministic {
            TransitionModel::deterministic()
        } else {
            self.model
        }
    }

    pub fn positions(&self) -> Positions {
        Positions::new(self.width, self.height)
    }

    pub fn is_terminal(&self, position: Position) -> bool {
        self.field(position).is_terminal()
    }

    /// Cells where the agent can stand and still has to act.
    pub fn non_terminal_positions(&self) -> impl Iterator<Item = Position> + '_ {
        self.positions().filter(|p| self.field(*p) == Field::Empty)
    }
}
