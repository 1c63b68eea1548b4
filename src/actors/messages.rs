//! Message types for actor communication
//!
//! Commands are sent to one actor over mpsc and answered over oneshot.
//! Events fan out to every subscriber over broadcast.

use serde::Serialize;
use tokio::sync::oneshot;

use crate::{
    Entity, EntityId, Metric,
    engine::{Estimate, MonitorStats, TickReport},
    events::Event,
};

/// Commands that can be sent to the MonitorActor
#[derive(Debug)]
pub enum MonitorCommand {
    /// Topology reported a new entity
    AddEntity {
        entity: Entity,
        respond_to: oneshot::Sender<bool>,
    },

    /// Topology reported an entity as gone
    RemoveEntity {
        id: EntityId,
        respond_to: oneshot::Sender<bool>,
    },

    /// Run a scheduling round now, bypassing the tick timer
    TickNow {
        respond_to: oneshot::Sender<TickReport>,
    },

    GetEstimate {
        entity: EntityId,
        metric: Metric,
        respond_to: oneshot::Sender<Option<Estimate>>,
    },

    GetStats {
        respond_to: oneshot::Sender<MonitorStats>,
    },

    GetOpenEvents {
        respond_to: oneshot::Sender<Vec<Event>>,
    },

    /// Stop the loop. Probes still running are abandoned.
    Shutdown,
}

/// Commands that can be sent to the AlertActor
#[derive(Debug)]
pub enum AlertCommand {
    GetState {
        respond_to: oneshot::Sender<AlertState>,
    },

    /// Mute alerts for a duration
    ///
    /// Useful for maintenance windows. Alerts resume on their own afterwards.
    MuteAlerts { duration_secs: u64 },

    UnmuteAlerts,

    Shutdown,
}

/// Delivery counters of the AlertActor
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AlertState {
    pub muted: bool,
    /// Seconds left until alerts resume, `None` for an open-ended mute
    pub muted_for_secs: Option<u64>,
    pub received: u64,
    pub delivered: u64,
    pub failed: u64,
    /// Events dropped while muted
    pub suppressed: u64,
    /// Events lost because the actor fell behind the broadcast channel
    pub lagged: u64,
}
