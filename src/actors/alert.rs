//! AlertActor - Forwards monitor events to the alert channel
//!
//! ```text
//! Event broadcast ──▶ muted? ──yes──▶ suppressed
//!                        │
//!                        no ──▶ AlertManager::send_event_alert ──▶ delivered / failed
//! ```

use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;
use tracing::{debug, instrument, trace, warn};

use crate::{alerts::AlertManager, config::Alert, events::Event};

use super::messages::{AlertCommand, AlertState};

#[derive(Debug, Clone, Copy)]
enum Mute {
    Until(Instant),
    Indefinite,
}

pub struct AlertActor {
    alert_manager: AlertManager,

    command_rx: mpsc::Receiver<AlertCommand>,

    event_rx: broadcast::Receiver<Event>,

    mute: Option<Mute>,

    state: AlertState,
}

impl AlertActor {
    pub fn new(
        alert_manager: AlertManager,
        command_rx: mpsc::Receiver<AlertCommand>,
        event_rx: broadcast::Receiver<Event>,
    ) -> Self {
        Self {
            alert_manager,
            command_rx,
            event_rx,
            mute: None,
            state: AlertState::default(),
        }
    }

    /// Whether alerts are muted right now. An expired mute is lifted here.
    fn is_muted(&mut self) -> bool {
        match self.mute {
            Some(Mute::Indefinite) => true,
            Some(Mute::Until(until)) if Instant::now() < until => true,
            Some(Mute::Until(_)) => {
                debug!("mute expired, alerts resumed");
                self.mute = None;
                false
            }
            None => false,
        }
    }

    fn snapshot(&mut self) -> AlertState {
        let muted = self.is_muted();
        AlertState {
            muted,
            muted_for_secs: match self.mute {
                Some(Mute::Until(until)) => {
                    Some(until.saturating_duration_since(Instant::now()).as_secs())
                }
                _ => None,
            },
            ..self.state.clone()
        }
    }

    #[instrument(skip(self))]
    pub async fn run(mut self) {
        debug!("starting alert actor");

        loop {
            tokio::select! {
                result = self.event_rx.recv() => {
                    match result {
                        Ok(event) => self.handle_event(event).await,
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!("alert actor lagged, skipped {skipped} events");
                            self.state.lagged += skipped;
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            warn!("event channel closed, shutting down");
                            break;
                        }
                    }
                }

                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(AlertCommand::GetState { respond_to }) => {
                            let _ = respond_to.send(self.snapshot());
                        }

                        Some(AlertCommand::MuteAlerts { duration_secs }) => {
                            debug!("muting alerts for {duration_secs}s");
                            let until =
                                Instant::now().checked_add(Duration::from_secs(duration_secs));
                            self.mute = Some(until.map_or(Mute::Indefinite, Mute::Until));
                        }

                        Some(AlertCommand::UnmuteAlerts) => {
                            debug!("unmuting alerts");
                            self.mute = None;
                        }

                        Some(AlertCommand::Shutdown) => {
                            debug!("received shutdown command");
                            break;
                        }

                        None => {
                            warn!("command channel closed, shutting down");
                            break;
                        }
                    }
                }
            }
        }

        debug!("alert actor stopped");
    }

    #[instrument(skip(self, event), fields(event_id = event.id))]
    async fn handle_event(&mut self, event: Event) {
        self.state.received += 1;

        if self.is_muted() {
            trace!("alerts muted, suppressing event");
            self.state.suppressed += 1;
            return;
        }

        if !self.alert_manager.is_configured() {
            trace!("no alert channel configured");
            return;
        }

        if self.alert_manager.send_event_alert(&event).await {
            self.state.delivered += 1;
        } else {
            self.state.failed += 1;
        }
    }
}

/// Handle for controlling the AlertActor
#[derive(Clone)]
pub struct AlertHandle {
    sender: mpsc::Sender<AlertCommand>,
}

impl AlertHandle {
    /// Spawn the alert actor on an event subscription.
    pub fn spawn(alert: Option<Alert>, event_rx: broadcast::Receiver<Event>) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);

        let actor = AlertActor::new(AlertManager::new(alert), cmd_rx, event_rx);

        tokio::spawn(actor.run());

        Self { sender: cmd_tx }
    }

    /// Get the delivery counters and mute state
    pub async fn get_state(&self) -> Option<AlertState> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(AlertCommand::GetState { respond_to: tx })
            .await
            .ok()?;

        rx.await.ok()
    }

    /// Mute alerts for a duration
    pub async fn mute_alerts(&self, duration_secs: u64) {
        let _ = self
            .sender
            .send(AlertCommand::MuteAlerts { duration_secs })
            .await;
    }

    pub async fn unmute_alerts(&self) {
        let _ = self.sender.send(AlertCommand::UnmuteAlerts).await;
    }

    /// Shutdown the alert actor
    pub async fn shutdown(&self) {
        let _ = self.sender.send(AlertCommand::Shutdown).await;
    }
}
