use std::path::Path;

use config_file::FromConfigFile;
use serde::Deserialize;
use tracing::info;

use crate::error::{MdpError, Result};
use crate::field::Field;
use crate::grid::{GridWorld, Rewards};
use crate::q_learning::QLearningConfig;
use crate::value_iteration::ValueIterationConfig;

/// Misexecution weights as written in the config file.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct StepConfig {
    pub forward: f64,
    pub sidestep: f64,
    pub backstep: f64,
    pub nostep: f64,
}

impl Default for StepConfig {
    fn default() -> Self {
        StepConfig { forward: 0.8, sidestep: 0.2, backstep: 0.0, nostep: 0.0 }
    }
}

/// One non-empty cell of the landscape.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct FieldConfig {
    pub x: usize,
    pub y: usize,
    pub kind: Field,
}

/// Problem instance and solver parameters, read from a TOML file.
///
/// ```toml
/// width = 4
/// height = 3
/// fields = [
///     { x = 1, y = 1, kind = "obstacle" },
///     { x = 3, y = 1, kind = "neg_reward" },
///     { x = 3, y = 2, kind = "reward" },
/// ]
///
/// [rewards]
/// living = -0.04
///
/// [value_iteration]
/// gamma = 0.9
/// ```
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct MdpConfig {
    pub width: usize,
    pub height: usize,
    #[serde(default)]
    pub deterministic: bool,
    /// Episode start `[x, y]` for a manually driven agent.
    #[serde(default)]
    pub initial: Option<[usize; 2]>,
    #[serde(default)]
    pub probabilities: StepConfig,
    #[serde(default)]
    pub rewards: Rewards,
    #[serde(default)]
    pub fields: Vec<FieldConfig>,
    #[serde(default)]
    pub value_iteration: ValueIterationConfig,
    #[serde(default)]
    pub q_learning: QLearningConfig,
}

/// The three built-in problems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Preset {
    /// 4x3 world from Russell & Norvig, chapter 17.
    RussellNorvig,
    /// 10x10 world with scattered obstacles and one reward.
    Maze,
    /// 10x10 world with one reward and one penalty.
    OpenField,
}

impl MdpConfig {
    pub fn load(path: &Path) -> Result<MdpConfig> {
        info!(path = %path.display(), "reading config file");
        Ok(MdpConfig::from_config_file(path)?)
    }

    fn empty(width: usize, height: usize) -> MdpConfig {
        MdpConfig {
            width,
            height,
            deterministic: false,
            initial: None,
            probabilities: StepConfig::default(),
            rewards: Rewards::default(),
            fields: Vec::new(),
            value_iteration: ValueIterationConfig::default(),
            q_learning: QLearningConfig::default(),
        }
    }

    pub fn preset(preset: Preset) -> MdpConfig {
        let cell = |x, y, kind| FieldConfig { x, y, kind };
        match preset {
            Preset::RussellNorvig => MdpConfig {
                fields: vec![
                    cell(1, 1, Field::Obstacle),
                    cell(3, 1, Field::NegReward),
                    cell(3, 2, Field::Reward),
                ],
                q_learning: QLearningConfig { deterministic: true, ..QLearningConfig::default() },
                ..MdpConfig::empty(4, 3)
            },
            Preset::Maze => {
                let mut config = MdpConfig::empty(10, 10);
                config.fields.push(cell(5, 5, Field::Reward));
                for (x, y) in [(1, 1), (1, 2), (3, 4), (5, 6), (7, 1)] {
                    config.fields.push(cell(x, y, Field::Obstacle));
                }
                config.q_learning.epochs = 1000;
                config.q_learning.deterministic = true;
                config
            }
            Preset::OpenField => {
                let mut config = MdpConfig::empty(10, 10);
                config.fields.push(cell(5, 5, Field::Reward));
                config.fields.push(cell(2, 3, Field::NegReward));
                config.q_learning.epochs = 2000;
                config.q_learning.gamma = 0.9;
                config.q_learning.deterministic = true;
                config
            }
        }
    }

    /// Builds the world, rejecting layouts that reference cells outside it.
    pub fn build_world(&self) -> Result<GridWorld> {
        if self.width == 0 || self.height == 0 {
            return Err(MdpError::InvalidConfiguration {
                message: format!("grid must not be empty, got {}x{}", self.width, self.height),
            });
        }
        let mut grid = GridWorld::new(self.width, self.height);
        for f in &self.fields {
            if f.x >= self.width || f.y >= self.height {
                return Err(MdpError::InvalidConfiguration {
                    message: format!("field ({}, {}) lies outside the {}x{} grid", f.x, f.y, self.width, self.height),
                });
            }
            if f.kind == Field::OutOfBounds {
                return Err(MdpError::InvalidConfiguration {
                    message: format!("field ({}, {}) cannot be out_of_bounds", f.x, f.y),
                });
            }
            grid.set_field(f.x as isize, f.y as isize, f.kind);
        }
        let p = self.probabilities;
        grid.set_step_probabilities(p.forward, p.sidestep, p.backstep, p.nostep)?;
        grid.set_rewards(self.rewards);
        grid.set_deterministic(self.deterministic);
        if let Some([x, y]) = self.initial {
            if x >= self.width || y >= self.height {
                return Err(MdpError::InvalidConfiguration {
                    message: format!("initial state ({x}, {y}) lies outside the grid"),
                });
            }
            grid.set_initial_state(x as isize, y as isize);
            grid.restart();
        }
        Ok(grid)
    }

    /// Like `build_world`, but honours `q_learning.deterministic`.
    pub fn build_learning_world(&self) -> Result<GridWorld> {
        let mut grid = self.build_world()?;
        if self.q_learning.deterministic {
            grid.set_deterministic(true);
        }
        Ok(grid)
    }
}
