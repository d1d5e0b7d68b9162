//! NATS event publisher

use tracing::{debug, warn};

use crate::domain::events::DomainEvent;

#[derive(Clone, Default)]
pub struct EventPublisher { nats: Option<async_nats::Client> }

impl EventPublisher {
    pub fn new(nats: Option<async_nats::Client>) -> Self { Self { nats } }

    pub fn disabled() -> Self { Self { nats: None } }

    /// Publishes in the background.
    pub fn emit(&self, event: DomainEvent) {
        let publisher = self.clone();
        tokio::spawn(async move { publisher.publish(event).await });
    }

    /// Best effort: one retry, then the event is dropped with a warning.
    pub async fn publish(&self, event: DomainEvent) {
        let subject = event.subject();
        let Some(client) = &self.nats else {
            debug!(%subject, "event bus not configured, dropping event");
            return;
        };
        let payload = match serde_json::to_vec(&event) {
            Ok(p) => p,
            Err(e) => {
                warn!(%subject, error = %e, "failed to encode event");
                return;
            }
        };
        for attempt in 1..=2 {
            match client.publish(subject.clone(), payload.clone().into()).await {
                Ok(()) => return,
                Err(e) => warn!(%subject, attempt, error = %e, "failed to publish event"),
            }
        }
    }
}
