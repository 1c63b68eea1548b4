//! Probe executors
//!
//! The monitor never reaches an entity itself. It hands each [`ProbeTask`] to
//! a [`ProbeExecutor`] and waits for the result on its outcome channel.

use std::sync::Mutex;

use async_trait::async_trait;
use rand::{Rng, SeedableRng, rngs::StdRng};
use tracing::trace;

use crate::{
    Metric,
    config::SimulationConfig,
    probe::{ProbeResult, ProbeTask},
    state::Observation,
};

/// Collaborator that actually measures a pair.
///
/// Implementations own all protocol mechanics. They do not need to report
/// timeouts: a probe that never returns is timed out by the scheduler.
#[async_trait]
pub trait ProbeExecutor: Send + Sync {
    async fn execute(&self, task: &ProbeTask) -> ProbeResult;
}

/// Executor producing random measurements, for running without a network.
pub struct SimulatedExecutor {
    config: SimulationConfig,
    rng: Mutex<StdRng>,
}

impl SimulatedExecutor {
    pub fn new(config: SimulationConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            config,
            rng: Mutex::new(rng),
        }
    }

    fn sample(&self, metric: Metric) -> ProbeResult {
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        if self.config.error_rate > 0.0 && chance(&mut rng, self.config.error_rate) {
            return ProbeResult::Failed("simulated executor error".to_string());
        }

        let observation = match metric {
            Metric::Liveness => Observation::Up(chance(&mut rng, self.config.base_success_rate)),
            Metric::Latency => {
                let (low, high) = self.config.latency_range_ms;
                Observation::Value(uniform(&mut rng, low, high))
            }
            Metric::Loss => {
                let packets = self.config.packets_per_loss_probe.max(1);
                let dropped = (0..packets)
                    .filter(|_| chance(&mut rng, self.config.loss_rate))
                    .count();
                Observation::Value(dropped as f64 / packets as f64)
            }
            Metric::Bandwidth => {
                let (low, high) = self.config.bandwidth_range;
                Observation::Value(uniform(&mut rng, low, high))
            }
        };

        ProbeResult::Completed(observation)
    }
}

fn chance(rng: &mut StdRng, probability: f64) -> bool {
    rng.random_bool(probability.clamp(0.0, 1.0))
}

fn uniform(rng: &mut StdRng, low: f64, high: f64) -> f64 {
    if high > low {
        rng.random_range(low..=high)
    } else {
        low
    }
}

#[async_trait]
impl ProbeExecutor for SimulatedExecutor {
    async fn execute(&self, task: &ProbeTask) -> ProbeResult {
        let result = self.sample(task.key.metric);
        trace!(task_id = %task.id, pair = %task.key, ?result, "simulated probe");
        result
    }
}
