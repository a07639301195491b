//! Grid-world Markov Decision Processes solved by value iteration and
//! tabular Q-learning.

pub mod action;
pub mod config;
pub mod error;
pub mod field;
pub mod format;
pub mod grid;
pub mod policy;
pub mod q_learning;
pub mod report;
pub mod transition;
pub mod value_iteration;

pub use action::Action;
pub use error::{MdpError, Result};
pub use field::Field;
pub use grid::{GridEvent, GridObserver, GridWorld, Position, Rewards};
pub use q_learning::{QLearner, QLearningConfig};
pub use transition::TransitionModel;
pub use value_iteration::{ValueIterationConfig, ValueIterator};
