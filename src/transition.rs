use approx::abs_diff_eq;
use tracing::warn;

use crate::action::Action;
use crate::error::{MdpError, Result};

/// Misexecution probabilities for an intended action.
///
/// The same model drives sampling in `GridWorld::perform_action` and the
/// expectation in value iteration, so planning and execution agree.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransitionModel {
    forward: f64,
    sidestep: f64,
    backstep: f64,
    nostep: f64,
}

/// Distribution over what actually happens when an action is intended.
///
/// Entries are in sampling order: intended, left sidestep, right sidestep,
/// backstep. Whatever mass remains is "no step" (the agent stays put).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Outcomes {
    moves: [(Action, f64); 4],
    stay: f64,
}

impl Outcomes {
    /// `(Some(action), p)` for every executed move, then `(None, p)` for no step.
    pub fn iter(&self) -> impl Iterator<Item = (Option<Action>, f64)> + '_ {
        self.moves
            .iter()
            .map(|&(a, p)| (Some(a), p))
            .chain(std::iter::once((None, self.stay)))
    }

    /// Probability that `action` is the one executed.
    pub fn probability(&self, action: Action) -> f64 {
        self.moves
            .iter()
            .filter(|(a, _)| *a == action)
            .map(|(_, p)| p)
            .sum()
    }

    pub fn stay_probability(&self) -> f64 {
        self.stay
    }

    pub fn total(&self) -> f64 {
        self.iter().map(|(_, p)| p).sum()
    }
}

impl Default for TransitionModel {
    /// Russell & Norvig defaults: 0.8 as intended, 0.1 to either side.
    fn default() -> Self {
        TransitionModel { forward: 0.8, sidestep: 0.2, backstep: 0.0, nostep: 0.0 }
    }
}

impl TransitionModel {
    /// Build a model from raw weights.
    ///
    /// Weights that do not add up to 1 are normalized with a warning.
    /// Negative or non-finite weights, or an all-zero total, are rejected.
    pub fn new(forward: f64, sidestep: f64, backstep: f64, nostep: f64) -> Result<TransitionModel> {
        let invalid = |reason: &'static str| MdpError::InvalidProbabilities {
            forward, sidestep, backstep, nostep, reason,
        };
        let parts = [forward, sidestep, backstep, nostep];
        if parts.iter().any(|p| !p.is_finite()) {
            return Err(invalid("weights must be finite"));
        }
        if parts.iter().any(|p| *p < 0.0) {
            return Err(invalid("weights must be non-negative"));
        }
        let total: f64 = parts.iter().sum();
        if total <= 0.0 {
            return Err(invalid("weights must not all be zero"));
        }
        if !abs_diff_eq!(total, 1.0, epsilon = 1e-9) {
            warn!(total, "step probabilities do not add up to 1, normalizing");
        }
        Ok(TransitionModel {
            forward: forward / total,
            sidestep: sidestep / total,
            backstep: backstep / total,
            nostep: nostep / total,
        })
    }

    /// Point mass on the intended action.
    pub fn deterministic() -> TransitionModel {
        TransitionModel { forward: 1.0, sidestep: 0.0, backstep: 0.0, nostep: 0.0 }
    }

    pub fn forward(&self) -> f64 {
        self.forward
    }

    /// Total sidestep probability, split evenly between left and right.
    pub fn sidestep(&self) -> f64 {
        self.sidestep
    }

    pub fn backstep(&self) -> f64 {
        self.backstep
    }

    pub fn nostep(&self) -> f64 {
        self.nostep
    }

    pub fn is_deterministic(&self) -> bool {
        self.forward == 1.0
    }

    pub fn outcomes(&self, intended: Action) -> Outcomes {
        let side = self.sidestep / 2.0;
        Outcomes {
            moves: [
                (intended, self.forward),
                (intended.rotate_left(), side),
                (intended.rotate_right(), side),
                (intended.reverse(), self.backstep),
            ],
            stay: self.nostep,
        }
    }

    /// Pick the executed action by inverse CDF over `outcomes(intended)`.
    ///
    /// `u` is a uniform draw from `[0, 1)`. `None` means no step.
    pub fn sample(&self, intended: Action, u: f64) -> Option<Action> {
        let mut cumulative = 0.0;
        for (executed, p) in self.outcomes(intended).iter() {
            cumulative += p;
            if u < cumulative {
                return executed;
            }
        }
        // Rounding can leave the last bucket a hair short of 1.
        if self.nostep > 0.0 {
            None
        } else {
            Some(intended)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use test_case::test_case;

    #[test_case(0.8, 0.2, 0.0, 0.0; "russell norvig")]
    #[test_case(1.0, 0.0, 0.0, 0.0; "deterministic")]
    #[test_case(0.6, 0.2, 0.1, 0.1; "all four")]
    #[test_case(0.0, 0.0, 1.0, 0.0; "always reversed")]
    #[test_case(0.25, 0.25, 0.25, 0.25; "uniform")]
    fn outcomes_sum_to_one(forward: f64, sidestep: f64, backstep: f64, nostep: f64) {
        // Arrange
        let model = TransitionModel::new(forward, sidestep, backstep, nostep).unwrap();
        // Act / Assert
        for a in Action::ALL {
            assert_abs_diff_eq!(model.outcomes(a).total(), 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn deterministic_is_point_mass() {
        let model = TransitionModel::deterministic();
        assert!(model.is_deterministic());
        for a in Action::ALL {
            let outcomes = model.outcomes(a);
            assert_eq!(outcomes.probability(a), 1.0);
            assert_eq!(outcomes.stay_probability(), 0.0);
            assert_eq!(model.sample(a, 0.0), Some(a));
            assert_eq!(model.sample(a, 0.999_999), Some(a));
        }
    }

    #[test]
    fn sidestep_splits_between_laterals() {
        // Arrange
        let model = TransitionModel::new(0.7, 0.2, 0.1, 0.0).unwrap();
        // Act
        let outcomes = model.outcomes(Action::Up);
        // Assert
        assert_abs_diff_eq!(outcomes.probability(Action::Up), 0.7, epsilon = 1e-12);
        assert_abs_diff_eq!(outcomes.probability(Action::Left), 0.1, epsilon = 1e-12);
        assert_abs_diff_eq!(outcomes.probability(Action::Right), 0.1, epsilon = 1e-12);
        assert_abs_diff_eq!(outcomes.probability(Action::Down), 0.1, epsilon = 1e-12);
    }

    #[test]
    fn unnormalized_weights_are_scaled() {
        // Act
        let model = TransitionModel::new(4.0, 1.0, 0.0, 0.0).unwrap();
        // Assert
        assert_abs_diff_eq!(model.forward(), 0.8, epsilon = 1e-12);
        assert_abs_diff_eq!(model.sidestep(), 0.2, epsilon = 1e-12);
    }

    #[test_case(-0.1, 1.1, 0.0, 0.0; "negative")]
    #[test_case(0.0, 0.0, 0.0, 0.0; "all zero")]
    #[test_case(f64::NAN, 0.2, 0.0, 0.0; "not a number")]
    fn invalid_weights_are_rejected(forward: f64, sidestep: f64, backstep: f64, nostep: f64) {
        let result = TransitionModel::new(forward, sidestep, backstep, nostep);
        assert!(matches!(result, Err(MdpError::InvalidProbabilities { .. })));
    }

    #[test]
    fn sampling_reproduces_distribution() {
        // Arrange
        let model = TransitionModel::new(0.6, 0.2, 0.1, 0.1).unwrap();
        let n = 10_000;
        for intended in Action::ALL {
            let outcomes = model.outcomes(intended);
            let mut counts = [0usize; 4];
            let mut stays = 0usize;
            // Act
            for i in 0..n {
                let u = (i as f64 + 0.5) / n as f64;
                match model.sample(intended, u) {
                    Some(a) => counts[a.index()] += 1,
                    None => stays += 1,
                }
            }
            // Assert
            for a in Action::ALL {
                let freq = counts[a.index()] as f64 / n as f64;
                assert_abs_diff_eq!(freq, outcomes.probability(a), epsilon = 1e-3);
            }
            let stay_freq = stays as f64 / n as f64;
            assert_abs_diff_eq!(stay_freq, outcomes.stay_probability(), epsilon = 1e-3);
        }
    }
}
