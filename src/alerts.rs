use chrono::Utc;
use reqwest::Client;
use serde_json::json;
use tracing::{error, info, instrument};

use crate::{
    config::{Alert, Webhook},
    events::{Event, EventKind, Severity},
};

/// Delivers raised and cleared events to the configured alert channel.
#[derive(Debug, Clone)]
pub struct AlertManager {
    client: Client,
    alert: Option<Alert>,
}

impl AlertManager {
    pub fn new(alert: Option<Alert>) -> Self {
        Self {
            client: Client::new(),
            alert,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.alert.is_some()
    }

    /// Send one event. Returns whether it was delivered.
    #[instrument(skip(self, event), fields(event_id = event.id, pair = %event.key()))]
    pub async fn send_event_alert(&self, event: &Event) -> bool {
        let Some(alert) = &self.alert else {
            return false;
        };

        match alert {
            Alert::Webhook(webhook) => self.send_webhook_alert(webhook, event).await,
        }
    }

    async fn send_webhook_alert(&self, webhook: &Webhook, event: &Event) -> bool {
        let payload = json!({
            "message": format_event_message(event),
            "entity": event.entity,
            "metric": event.metric,
            "severity": event.severity,
            "kind": event.kind,
            "score": event.score,
            "status": if event.is_open() { "raised" } else { "cleared" },
            "raised_at": event.raised_at.to_rfc3339(),
            "cleared_at": event.cleared_at.map(|at| at.to_rfc3339()),
            "timestamp": Utc::now().to_rfc3339()
        });

        match self.client.post(&webhook.url).json(&payload).send().await {
            Ok(response) => {
                if response.status().is_success() {
                    info!("Successfully sent webhook alert");
                    true
                } else {
                    error!("Webhook alert failed with status: {}", response.status());
                    false
                }
            }
            Err(e) => {
                error!("Failed to send webhook alert: {}", e);
                false
            }
        }
    }
}

pub fn format_event_message(event: &Event) -> String {
    if !event.is_open() {
        return format!(
            "✅ **Recovered**: `{}` {} is back to normal",
            event.entity, event.metric
        );
    }

    let icon = match event.severity {
        Severity::Warning => "⚠️",
        Severity::Critical => "🔴",
    };
    let what = match event.kind {
        EventKind::LivenessLow => "liveness confidence is low",
        EventKind::ValueDeviation => "deviates from its recent history",
    };
    format!(
        "{icon} **{:?}**: `{}` {} {what} (score {:.2})",
        event.severity, event.entity, event.metric, event.score
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EntityId, Metric};
    use chrono::DateTime;

    fn event(severity: Severity, cleared: bool) -> Event {
        let at = DateTime::from_timestamp(100, 0).unwrap();
        Event {
            id: 1,
            entity: EntityId::host("aa:bb"),
            metric: Metric::Liveness,
            severity,
            kind: EventKind::LivenessLow,
            score: 0.75,
            raised_at: at,
            cleared_at: cleared.then_some(at),
        }
    }

    #[test]
    fn test_raised_message() {
        let message = format_event_message(&event(Severity::Critical, false));
        assert!(message.contains("Critical"));
        assert!(message.contains("host_aa:bb"));
        assert!(message.contains("0.75"));
    }

    #[test]
    fn test_cleared_message() {
        let message = format_event_message(&event(Severity::Warning, true));
        assert!(message.starts_with("✅"));
    }

    #[tokio::test]
    async fn test_unconfigured_manager_delivers_nothing() {
        let manager = AlertManager::new(None);
        assert!(!manager.is_configured());
        assert!(!manager.send_event_alert(&event(Severity::Warning, false)).await);
    }
}
