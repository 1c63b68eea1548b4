//! Uncertainty quantification over state snapshots.
//!
//! Everything here is a pure function. Entropies are in nats.

use std::f64::consts::{E, PI};

use crate::state::{BeliefModel, StabilityTracker, StateDistribution};

/// Shannon entropy of a Bernoulli variable with success probability `p`.
///
/// Degenerate (and out-of-range) probabilities yield 0.
pub fn bernoulli_entropy(p: f64) -> f64 {
    if !(p > 0.0 && p < 1.0) {
        return 0.0;
    }
    -(p * p.ln() + (1.0 - p) * (1.0 - p).ln())
}

/// Differential entropy of a Gaussian, `0.5 * ln(2*pi*e*variance)`.
///
/// Non-positive or non-finite variances yield 0.
pub fn gaussian_entropy(variance: f64) -> f64 {
    if !(variance.is_finite() && variance > 0.0) {
        return 0.0;
    }
    0.5 * (2.0 * PI * E * variance).ln()
}

pub fn entropy(dist: &StateDistribution) -> f64 {
    dist.entropy()
}

pub fn expected_entropy_after_probe(dist: &StateDistribution) -> f64 {
    dist.expected_entropy_after_probe()
}

/// Expected entropy reduction from one more probe, never negative.
pub fn information_gain(dist: &StateDistribution) -> f64 {
    (entropy(dist) - expected_entropy_after_probe(dist)).max(0.0)
}

/// Window variance divided by `max_stability`, clamped to `[0, 1]`.
///
/// Windows with fewer than two samples score 0.
pub fn stability_score(tracker: &StabilityTracker, max_stability: f64) -> f64 {
    match tracker.variance() {
        Some(variance) if max_stability > 0.0 => (variance / max_stability).clamp(0.0, 1.0),
        _ => 0.0,
    }
}

/// Entropy divided by `max_uncertainty`, clamped to `[0, 1]`.
pub fn normalized_uncertainty(dist: &StateDistribution, max_uncertainty: f64) -> f64 {
    if max_uncertainty <= 0.0 {
        return 0.0;
    }
    (entropy(dist) / max_uncertainty).clamp(0.0, 1.0)
}
