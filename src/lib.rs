pub mod actors;
pub mod alerts;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod executor;
pub mod fusion;
pub mod probe;
pub mod scheduler;
pub mod state;
pub mod telemetry;
pub mod uncertainty;
pub mod util;

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a monitored network object.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Identifier of a directed link between two switch ports.
    pub fn link(src_dpid: u64, src_port: u32, dst_dpid: u64, dst_port: u32) -> Self {
        Self(format!("link_{src_dpid}_{src_port}_{dst_dpid}_{dst_port}"))
    }

    /// Identifier of a host attachment, keyed by its MAC address.
    pub fn host(mac: &str) -> Self {
        Self(format!("host_{}", mac.to_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for EntityId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Link,
    Host,
}

/// A network object as reported by the topology collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub kind: EntityKind,
}

impl Entity {
    pub fn link(src_dpid: u64, src_port: u32, dst_dpid: u64, dst_port: u32) -> Self {
        Self {
            id: EntityId::link(src_dpid, src_port, dst_dpid, dst_port),
            kind: EntityKind::Link,
        }
    }

    pub fn host(mac: &str) -> Self {
        Self {
            id: EntityId::host(mac),
            kind: EntityKind::Host,
        }
    }
}

/// Observable property of an entity.
///
/// The declaration order is the tie-break order used by the scheduler, so it
/// must stay stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Liveness,
    Latency,
    Loss,
    Bandwidth,
}

impl Metric {
    pub const ALL: [Metric; 4] = [
        Metric::Liveness,
        Metric::Latency,
        Metric::Loss,
        Metric::Bandwidth,
    ];

    pub fn kind(self) -> MetricKind {
        match self {
            Metric::Liveness => MetricKind::Binary,
            Metric::Latency | Metric::Loss | Metric::Bandwidth => MetricKind::Continuous,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Metric::Liveness => "liveness",
            Metric::Latency => "latency",
            Metric::Loss => "loss",
            Metric::Bandwidth => "bandwidth",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Binary,
    Continuous,
}

/// Key of one monitored (entity, metric) pair.
///
/// Ordering is by entity id first, then metric, which gives the scheduler a
/// stable identifier ordering for tie-breaks.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PairKey {
    pub entity: EntityId,
    pub metric: Metric,
}

impl PairKey {
    pub fn new(entity: impl Into<EntityId>, metric: Metric) -> Self {
        Self {
            entity: entity.into(),
            metric,
        }
    }
}

impl fmt::Display for PairKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.entity, self.metric)
    }
}
