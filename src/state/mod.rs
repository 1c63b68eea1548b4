//! Per-pair state: beliefs, stability windows and the entity topology.

pub mod distribution;
pub mod stability;
pub mod store;
pub mod topology;

pub use distribution::{BeliefModel, BetaBelief, GaussianBelief, Observation, StateDistribution};
pub use stability::StabilityTracker;
pub use store::{PairState, StateStore};
pub use topology::TopologyStore;
