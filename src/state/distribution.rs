//! Belief models for a single (entity, metric) pair.
//!
//! Binary metrics (liveness) are modelled with a Beta distribution over the
//! probability that the entity is up, continuous metrics with a Gaussian over
//! the metric's true value. Both variants share the [`BeliefModel`] capability
//! set; [`StateDistribution`] dispatches to the variant explicitly.

use serde::Serialize;

use crate::{
    error::{MonitorError, MonitorResult},
    uncertainty,
};

/// One observation of a pair, as delivered by a probe.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Observation {
    /// Outcome of a liveness probe
    Up(bool),
    /// Measured value of a continuous metric
    Value(f64),
}

impl Observation {
    /// Value recorded in the stability window.
    pub fn raw_value(&self) -> f64 {
        match self {
            Observation::Up(true) => 1.0,
            Observation::Up(false) => 0.0,
            Observation::Value(value) => *value,
        }
    }
}

/// Shared capabilities of both belief variants.
pub trait BeliefModel {
    /// Entropy of the current belief, in nats.
    fn entropy(&self) -> f64;

    /// Bayes-expected entropy after fusing one more probe.
    fn expected_entropy_after_probe(&self) -> f64;

    /// Fuse one observation. The belief is left untouched on error.
    fn update(&mut self, observation: &Observation) -> MonitorResult<()>;

    fn to_snapshot(&self) -> StateDistribution;
}

/// Beta belief over the probability that an entity is up.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BetaBelief {
    pub alpha: f64,
    pub beta: f64,
}

impl BetaBelief {
    pub fn new(alpha: f64, beta: f64) -> Self {
        Self { alpha, beta }
    }

    /// Posterior probability that the entity is up.
    pub fn confidence(&self) -> f64 {
        self.alpha / (self.alpha + self.beta)
    }
}

impl Default for BetaBelief {
    fn default() -> Self {
        Self::new(1.0, 1.0)
    }
}

impl BeliefModel for BetaBelief {
    fn entropy(&self) -> f64 {
        uncertainty::bernoulli_entropy(self.confidence())
    }

    fn expected_entropy_after_probe(&self) -> f64 {
        let p = self.confidence();
        let total = self.alpha + self.beta + 1.0;
        let after_success = uncertainty::bernoulli_entropy((self.alpha + 1.0) / total);
        let after_failure = uncertainty::bernoulli_entropy(self.alpha / total);

        p * after_success + (1.0 - p) * after_failure
    }

    fn update(&mut self, observation: &Observation) -> MonitorResult<()> {
        match observation {
            Observation::Up(true) => self.alpha += 1.0,
            Observation::Up(false) => self.beta += 1.0,
            Observation::Value(value) => {
                return Err(MonitorError::InvalidMeasurement(format!(
                    "binary belief cannot fuse value {value}"
                )));
            }
        }
        Ok(())
    }

    fn to_snapshot(&self) -> StateDistribution {
        StateDistribution::Binary(*self)
    }
}

/// Gaussian belief over a continuous metric.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GaussianBelief {
    pub mean: f64,
    pub variance: f64,
    /// Observation noise variance of the metric, fixed by configuration
    pub noise_variance: f64,
}

impl GaussianBelief {
    pub fn new(mean: f64, variance: f64, noise_variance: f64) -> Self {
        Self {
            mean,
            variance,
            noise_variance,
        }
    }

    /// Variance after fusing one observation at the configured noise level.
    pub fn posterior_variance(&self) -> f64 {
        1.0 / (1.0 / self.variance + 1.0 / self.noise_variance)
    }
}

impl BeliefModel for GaussianBelief {
    fn entropy(&self) -> f64 {
        uncertainty::gaussian_entropy(self.variance)
    }

    fn expected_entropy_after_probe(&self) -> f64 {
        uncertainty::gaussian_entropy(self.posterior_variance())
    }

    fn update(&mut self, observation: &Observation) -> MonitorResult<()> {
        let Observation::Value(measurement) = observation else {
            return Err(MonitorError::InvalidMeasurement(
                "continuous belief cannot fuse an up/down outcome".to_string(),
            ));
        };
        if !measurement.is_finite() {
            return Err(MonitorError::InvalidMeasurement(format!(
                "non-finite measurement {measurement}"
            )));
        }

        let variance = self.posterior_variance();
        self.mean = variance * (self.mean / self.variance + measurement / self.noise_variance);
        self.variance = variance;
        Ok(())
    }

    fn to_snapshot(&self) -> StateDistribution {
        StateDistribution::Continuous(*self)
    }
}

/// Belief held for one (entity, metric) pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StateDistribution {
    Binary(BetaBelief),
    Continuous(GaussianBelief),
}

impl StateDistribution {
    /// Confidence of a binary belief, `None` for continuous ones.
    pub fn confidence(&self) -> Option<f64> {
        match self {
            StateDistribution::Binary(belief) => Some(belief.confidence()),
            StateDistribution::Continuous(_) => None,
        }
    }

    /// Mean of a continuous belief, `None` for binary ones.
    pub fn mean(&self) -> Option<f64> {
        match self {
            StateDistribution::Binary(_) => None,
            StateDistribution::Continuous(belief) => Some(belief.mean),
        }
    }

    pub fn variance(&self) -> Option<f64> {
        match self {
            StateDistribution::Binary(_) => None,
            StateDistribution::Continuous(belief) => Some(belief.variance),
        }
    }
}

impl BeliefModel for StateDistribution {
    fn entropy(&self) -> f64 {
        match self {
            StateDistribution::Binary(belief) => belief.entropy(),
            StateDistribution::Continuous(belief) => belief.entropy(),
        }
    }

    fn expected_entropy_after_probe(&self) -> f64 {
        match self {
            StateDistribution::Binary(belief) => belief.expected_entropy_after_probe(),
            StateDistribution::Continuous(belief) => belief.expected_entropy_after_probe(),
        }
    }

    fn update(&mut self, observation: &Observation) -> MonitorResult<()> {
        match self {
            StateDistribution::Binary(belief) => belief.update(observation),
            StateDistribution::Continuous(belief) => belief.update(observation),
        }
    }

    fn to_snapshot(&self) -> StateDistribution {
        *self
    }
}
