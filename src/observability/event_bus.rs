//! Tokio broadcast event bus for cross-component notifications.

use crate::models::ContactEvent;
use tokio::sync::broadcast;

const DEFAULT_EVENT_BUS_CAPACITY: usize = 256;

/// Central event bus for broadcasting contact and suggestion events.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ContactEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUS_CAPACITY)
    }
}

/// Filtered receiver that yields events matching a predicate.
pub struct FilteredReceiver<F> {
    receiver: broadcast::Receiver<ContactEvent>,
    predicate: F,
}

impl EventBus {
    /// Creates a new event bus with the given buffer capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes an event to all subscribers (best effort).
    ///
    /// Publishing with no subscribers is not an error.
    #[allow(clippy::cast_precision_loss)]
    pub fn publish(&self, event: ContactEvent) {
        metrics::counter!("event_bus_publish_total", "event_type" => event.event_type())
            .increment(1);
        if self.sender.send(event).is_err() {
            metrics::counter!("event_bus_publish_unobserved_total").increment(1);
        }
        metrics::gauge!("event_bus_receivers").set(self.sender.receiver_count() as f64);
    }

    /// Subscribes to all events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ContactEvent> {
        metrics::counter!("event_bus_subscriptions_total").increment(1);
        self.sender.subscribe()
    }

    /// Subscribes with a predicate to filter events by type or attributes.
    #[must_use]
    pub fn subscribe_filtered<F>(&self, predicate: F) -> FilteredReceiver<F>
    where
        F: Fn(&ContactEvent) -> bool,
    {
        FilteredReceiver {
            receiver: self.subscribe(),
            predicate,
        }
    }

    /// Subscribes to events matching the provided event type.
    #[must_use]
    pub fn subscribe_event_type(
        &self,
        event_type: &'static str,
    ) -> FilteredReceiver<impl Fn(&ContactEvent) -> bool + use<>> {
        self.subscribe_filtered(move |event| event.event_type() == event_type)
    }
}

impl<F> FilteredReceiver<F>
where
    F: Fn(&ContactEvent) -> bool,
{
    /// Receives the next event that matches the predicate.
    ///
    /// Lagged events are counted and skipped.
    ///
    /// # Errors
    ///
    /// Returns [`broadcast::error::RecvError::Closed`] once every sender is gone.
    pub async fn recv(&mut self) -> Result<ContactEvent, broadcast::error::RecvError> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if (self.predicate)(&event) => return Ok(event),
                Ok(_) => {},
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event receiver lagged");
                    metrics::counter!("event_bus_lagged_total").increment(skipped);
                },
                Err(err) => return Err(err),
            }
        }
    }
}
