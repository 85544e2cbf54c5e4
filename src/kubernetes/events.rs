use k8s_openapi::api::core::v1::ObjectReference;
use kube::{
    Client,
    runtime::events::{Event, EventType, Recorder, Reporter},
};

use crate::metrics::Metrics;

/// An Event waiting to be published, together with the object it regards.
pub struct PendingEvent {
    pub event: Event,
    pub regarding: ObjectReference,
}

impl PendingEvent {
    #[must_use]
    pub fn warning(
        regarding: ObjectReference,
        related: Option<ObjectReference>,
        reason: &str,
        action: &str,
        note: String,
    ) -> Self {
        Self {
            event: Event {
                type_: EventType::Warning,
                reason: reason.into(),
                note: Some(note),
                action: action.into(),
                secondary: related,
            },
            regarding,
        }
    }
}

/// Publishes Events through the `events.k8s.io` API.
///
/// Events are fire and forget: a failed publish is logged and counted, it
/// never fails the reconciliation that produced it.
pub struct Publisher {
    metrics: Metrics,
    recorder: Recorder,
}

impl Publisher {
    #[must_use]
    pub fn new(client: Client, reporter: Reporter, metrics: &Metrics) -> Self {
        Self {
            metrics: metrics.clone(),
            recorder: Recorder::new(client, reporter),
        }
    }

    /// Returns the number of events successfully published.
    pub async fn publish(&self, controller: &'static str, events: &[PendingEvent]) -> usize {
        let mut published = 0;

        for PendingEvent { event, regarding } in events {
            self.metrics
                .kubernetes_api_usage_count::<k8s_openapi::api::events::v1::Event>("create");
            match self.recorder.publish(event, regarding).await {
                Ok(()) => {
                    published += 1;
                    self.metrics.event_published(controller, true);
                }
                Err(error) => {
                    tracing::warn!(
                        error =% error,
                        reason = event.reason.as_str(),
                        kind = regarding.kind.as_deref().unwrap_or_default(),
                        name = regarding.name.as_deref().unwrap_or_default(),
                        namespace = regarding.namespace.as_deref().unwrap_or_default(),
                        "failed to publish event"
                    );
                    self.metrics.event_published(controller, false);
                }
            }
        }

        published
    }
}
