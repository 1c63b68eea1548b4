//! Candidate-ordering strategies and the epsilon-greedy bandit choosing between them.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use crate::PairKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// Highest priority first
    GreedyHighestGain,
    /// Sample without replacement, weighted by priority
    WeightedRandomByGain,
    /// Least recently dispatched first
    RoundRobinLeastRecent,
    /// Pairs with an open event first, then greedy
    EventFocus,
}

impl Strategy {
    /// All strategies, in tie-break order.
    pub const ALL: [Strategy; 4] = [
        Strategy::GreedyHighestGain,
        Strategy::WeightedRandomByGain,
        Strategy::RoundRobinLeastRecent,
        Strategy::EventFocus,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Strategy::GreedyHighestGain => "greedy-highest-gain",
            Strategy::WeightedRandomByGain => "weighted-random-by-gain",
            Strategy::RoundRobinLeastRecent => "round-robin-least-recent",
            Strategy::EventFocus => "event-focus",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A scored, eligible pair.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub key: PairKey,
    pub information_gain: f64,
    pub stability_score: f64,
    pub priority: f64,
    pub cost: f64,
    pub last_dispatch: Option<DateTime<Utc>>,
}

/// Never-dispatched pairs count as the oldest.
fn older_first(a: &Option<DateTime<Utc>>, b: &Option<DateTime<Utc>>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => a.cmp(b),
    }
}

/// Priority descending, then oldest last dispatch, then pair key.
pub fn priority_order(a: &Candidate, b: &Candidate) -> Ordering {
    b.priority
        .total_cmp(&a.priority)
        .then_with(|| older_first(&a.last_dispatch, &b.last_dispatch))
        .then_with(|| a.key.cmp(&b.key))
}

fn recency_order(a: &Candidate, b: &Candidate) -> Ordering {
    older_first(&a.last_dispatch, &b.last_dispatch)
        .then_with(|| b.priority.total_cmp(&a.priority))
        .then_with(|| a.key.cmp(&b.key))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ArmStats {
    pub selections: u64,
    pub rewards: u64,
    pub average_reward: f64,
}

/// Epsilon-greedy choice between [`Strategy`] arms.
///
/// With probability `epsilon` a uniformly random arm is explored, otherwise
/// the arm with the highest running average reward is exploited. Ties go to
/// the arm listed first in [`Strategy::ALL`].
#[derive(Debug, Clone)]
pub struct StrategySelector {
    epsilon: f64,
    rng: StdRng,
    arms: BTreeMap<Strategy, ArmStats>,
}

impl StrategySelector {
    pub fn new(epsilon: f64, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        Self {
            epsilon,
            rng,
            arms: Strategy::ALL
                .into_iter()
                .map(|strategy| (strategy, ArmStats::default()))
                .collect(),
        }
    }

    pub fn select(&mut self) -> Strategy {
        let explore: f64 = self.rng.random();
        let strategy = if explore < self.epsilon {
            Strategy::ALL[self.rng.random_range(0..Strategy::ALL.len())]
        } else {
            self.best()
        };

        if let Some(arm) = self.arms.get_mut(&strategy) {
            arm.selections += 1;
        }
        strategy
    }

    /// Arm with the highest running average reward.
    pub fn best(&self) -> Strategy {
        let mut best = Strategy::ALL[0];
        let mut best_reward = f64::NEG_INFINITY;
        for strategy in Strategy::ALL {
            let reward = self.average_reward(strategy);
            if reward > best_reward {
                best = strategy;
                best_reward = reward;
            }
        }
        best
    }

    /// Fold a reward into the arm's running average.
    pub fn record(&mut self, strategy: Strategy, reward: f64) {
        let arm = self.arms.entry(strategy).or_default();
        arm.rewards += 1;
        arm.average_reward += (reward - arm.average_reward) / arm.rewards as f64;
    }

    pub fn average_reward(&self, strategy: Strategy) -> f64 {
        self.arms
            .get(&strategy)
            .map_or(0.0, |arm| arm.average_reward)
    }

    pub fn arms(&self) -> &BTreeMap<Strategy, ArmStats> {
        &self.arms
    }

    /// Order candidates for dispatch under `strategy`.
    pub fn order(
        &mut self,
        strategy: Strategy,
        mut candidates: Vec<Candidate>,
        triggered: &BTreeSet<PairKey>,
    ) -> Vec<Candidate> {
        match strategy {
            Strategy::GreedyHighestGain => {
                candidates.sort_by(priority_order);
                candidates
            }
            Strategy::RoundRobinLeastRecent => {
                candidates.sort_by(recency_order);
                candidates
            }
            Strategy::EventFocus => {
                candidates.sort_by(|a, b| {
                    let a_hit = triggered.contains(&a.key);
                    let b_hit = triggered.contains(&b.key);
                    b_hit.cmp(&a_hit).then_with(|| priority_order(a, b))
                });
                candidates
            }
            Strategy::WeightedRandomByGain => {
                candidates.sort_by(priority_order);
                self.weighted_shuffle(candidates)
            }
        }
    }

    /// Sample without replacement, each draw proportional to priority.
    fn weighted_shuffle(&mut self, mut remaining: Vec<Candidate>) -> Vec<Candidate> {
        let mut ordered = Vec::with_capacity(remaining.len());

        while !remaining.is_empty() {
            let total: f64 = remaining.iter().map(|c| c.priority.max(0.0)).sum();
            if !(total > 0.0 && total.is_finite()) {
                ordered.append(&mut remaining);
                break;
            }

            let r: f64 = self.rng.random::<f64>() * total;
            let mut cdf = 0.0;
            let mut picked = remaining.len() - 1;
            for (i, candidate) in remaining.iter().enumerate() {
                cdf += candidate.priority.max(0.0);
                if r < cdf {
                    picked = i;
                    break;
                }
            }
            ordered.push(remaining.remove(picked));
        }

        ordered
    }
}
