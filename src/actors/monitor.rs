//! MonitorActor - Drives the monitor with wall-clock time
//!
//! ## Message Flow
//!
//! ```text
//! Tick timer ──▶ Monitor::tick ──▶ spawn executor task per dispatch
//!                                           │
//! Outcome channel ◀─────────────────────────┘
//!       │
//!       └──▶ Monitor::handle_outcome ──▶ BroadcastSink ──▶ [AlertActor, subscribers]
//!
//! Deadline timer (1s) ──▶ Monitor::expire_deadlines
//! ```
//!
//! One task owns the [`Monitor`], so ticks and outcome fusion never interleave.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior, interval, interval_at};
use tracing::{debug, instrument, trace, warn};

use crate::{
    Entity, EntityId, Metric,
    config::Config,
    engine::{Estimate, Monitor, MonitorStats, TickReport},
    error::MonitorError,
    events::{BroadcastSink, Event},
    executor::ProbeExecutor,
    fusion::FusionReport,
    probe::{Dispatch, ProbeOutcome},
};

use super::messages::MonitorCommand;

const DEADLINE_CHECK: Duration = Duration::from_secs(1);

const EVENT_CAPACITY: usize = 256;

/// Actor that owns the monitor and runs its tick loop
pub struct MonitorActor {
    monitor: Monitor,

    executor: Arc<dyn ProbeExecutor>,

    command_rx: mpsc::Receiver<MonitorCommand>,

    /// Executor tasks report back through this channel
    outcome_tx: mpsc::Sender<ProbeOutcome>,
    outcome_rx: mpsc::Receiver<ProbeOutcome>,

    tick_interval: Duration,
}

impl MonitorActor {
    pub fn new(
        monitor: Monitor,
        executor: Arc<dyn ProbeExecutor>,
        command_rx: mpsc::Receiver<MonitorCommand>,
    ) -> Self {
        let tick_interval = Duration::from_secs(monitor.config().scheduler.tick_interval);
        let capacity = monitor.config().scheduler.max_concurrent_probes.max(1) * 4;
        let (outcome_tx, outcome_rx) = mpsc::channel(capacity);

        Self {
            monitor,
            executor,
            command_rx,
            outcome_tx,
            outcome_rx,
            tick_interval,
        }
    }

    /// Run the actor's main loop until a Shutdown command arrives or every
    /// handle is dropped.
    #[instrument(skip(self))]
    pub async fn run(mut self) {
        debug!("starting monitor actor");

        let mut ticker = interval_at(Instant::now() + self.tick_interval, self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut deadlines = interval(DEADLINE_CHECK);
        deadlines.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_tick();
                }

                _ = deadlines.tick() => {
                    self.expire_deadlines();
                }

                Some(outcome) = self.outcome_rx.recv() => {
                    self.handle_outcome(outcome);
                }

                cmd = self.command_rx.recv() => {
                    let Some(cmd) = cmd else {
                        warn!("command channel closed, shutting down");
                        break;
                    };
                    if !self.handle_command(cmd) {
                        debug!("received shutdown command");
                        break;
                    }
                }
            }
        }

        debug!("monitor actor stopped");
    }

    /// Returns `false` when the actor should stop.
    fn handle_command(&mut self, cmd: MonitorCommand) -> bool {
        match cmd {
            MonitorCommand::AddEntity { entity, respond_to } => {
                let _ = respond_to.send(self.monitor.on_entity_added(entity));
            }
            MonitorCommand::RemoveEntity { id, respond_to } => {
                let _ = respond_to.send(self.monitor.on_entity_removed(&id, Utc::now()));
            }
            MonitorCommand::TickNow { respond_to } => {
                let report = self.run_tick();
                let _ = respond_to.send(report);
            }
            MonitorCommand::GetEstimate {
                entity,
                metric,
                respond_to,
            } => {
                let _ = respond_to.send(self.monitor.estimate(&entity, metric));
            }
            MonitorCommand::GetStats { respond_to } => {
                let _ = respond_to.send(self.monitor.statistics(Utc::now()));
            }
            MonitorCommand::GetOpenEvents { respond_to } => {
                let _ = respond_to.send(self.monitor.open_events());
            }
            MonitorCommand::Shutdown => return false,
        }
        true
    }

    fn run_tick(&mut self) -> TickReport {
        let report = self.monitor.tick(Utc::now());
        for dispatch in &report.dispatched {
            self.dispatch(dispatch.clone());
        }
        report
    }

    fn expire_deadlines(&mut self) {
        let reports = self.monitor.expire_deadlines(Utc::now());
        for report in reports {
            if let FusionReport::TimedOut { key, .. } = report {
                debug!(pair = %key, "probe deadline passed");
            }
        }
    }

    fn handle_outcome(&mut self, outcome: ProbeOutcome) {
        let report = self.monitor.handle_outcome(outcome);
        trace!(
            pair = %report.fusion.key(),
            reward = ?report.fusion.reward(),
            events = report.events.len(),
            "outcome applied"
        );
    }

    /// Run one probe on the executor. The task gives up silently at the
    /// deadline; the scheduler synthesizes the timeout.
    fn dispatch(&self, dispatch: Dispatch) {
        let executor = Arc::clone(&self.executor);
        let outcome_tx = self.outcome_tx.clone();
        let budget = (dispatch.deadline - Utc::now())
            .to_std()
            .unwrap_or_default();

        tokio::spawn(async move {
            let task = dispatch.task;
            match tokio::time::timeout(budget, executor.execute(&task)).await {
                Ok(result) => {
                    let outcome = ProbeOutcome::new(&task, result, Utc::now());
                    if outcome_tx.send(outcome).await.is_err() {
                        trace!(task_id = %task.id, "monitor stopped before outcome arrived");
                    }
                }
                Err(_) => {
                    trace!(task_id = %task.id, "executor missed the deadline");
                }
            }
        });
    }
}

/// Handle for controlling a MonitorActor
///
/// Cloneable typed API over the actor's command channel.
#[derive(Clone)]
pub struct MonitorHandle {
    sender: mpsc::Sender<MonitorCommand>,

    event_tx: broadcast::Sender<Event>,
}

impl MonitorHandle {
    /// Validate the configuration, build the monitor and spawn its actor.
    pub fn spawn(config: Config, executor: Arc<dyn ProbeExecutor>) -> Result<Self> {
        let (event_tx, _) = broadcast::channel(EVENT_CAPACITY);
        let sink = BroadcastSink::new(event_tx.clone());
        let monitor = Monitor::new(config, Box::new(sink), Utc::now())
            .context("failed to build monitor")?;

        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let actor = MonitorActor::new(monitor, executor, cmd_rx);

        tokio::spawn(actor.run());

        Ok(Self {
            sender: cmd_tx,
            event_tx,
        })
    }

    /// Receive every event raised or cleared from now on.
    pub fn subscribe_events(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> MonitorCommand,
        name: &str,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(build(tx))
            .await
            .map_err(|_| MonitorError::ChannelClosed(format!("failed to send {name} command")))?;
        let response = rx
            .await
            .map_err(|_| MonitorError::ChannelClosed(format!("no response to {name} command")))?;
        Ok(response)
    }

    pub async fn add_entity(&self, entity: Entity) -> Result<bool> {
        self.request(
            |respond_to| MonitorCommand::AddEntity { entity, respond_to },
            "AddEntity",
        )
        .await
    }

    pub async fn remove_entity(&self, id: EntityId) -> Result<bool> {
        self.request(
            |respond_to| MonitorCommand::RemoveEntity { id, respond_to },
            "RemoveEntity",
        )
        .await
    }

    /// Run a scheduling round immediately.
    pub async fn tick_now(&self) -> Result<TickReport> {
        self.request(|respond_to| MonitorCommand::TickNow { respond_to }, "TickNow")
            .await
    }

    pub async fn estimate(&self, entity: EntityId, metric: Metric) -> Result<Option<Estimate>> {
        self.request(
            |respond_to| MonitorCommand::GetEstimate {
                entity,
                metric,
                respond_to,
            },
            "GetEstimate",
        )
        .await
    }

    pub async fn stats(&self) -> Result<MonitorStats> {
        self.request(|respond_to| MonitorCommand::GetStats { respond_to }, "GetStats")
            .await
    }

    pub async fn open_events(&self) -> Result<Vec<Event>> {
        self.request(
            |respond_to| MonitorCommand::GetOpenEvents { respond_to },
            "GetOpenEvents",
        )
        .await
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(MonitorCommand::Shutdown)
            .await
            .context("failed to send Shutdown command")?;
        Ok(())
    }
}
