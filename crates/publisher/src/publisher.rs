use tracing::{debug, warn};

use common::MarketEvent;

use crate::bus::{Delivery, EventBus};
use crate::log::EventLog;

/// Durable append plus in-memory broadcast of market events.
#[derive(Clone)]
pub struct Publisher {
    log: EventLog,
    bus: EventBus,
}

impl Publisher {
    pub fn new(log: EventLog, bus: EventBus) -> Self {
        Self { log, bus }
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn log(&self) -> &EventLog {
        &self.log
    }

    /// Append `event` to its capped log, then broadcast it.
    ///
    /// A store failure is logged and the broadcast still happens. Events
    /// carrying non-finite numbers are dropped and `None` is returned.
    pub async fn publish(&self, event: MarketEvent) -> Option<Delivery> {
        if let Err(e) = event.validate() {
            warn!(symbol = %event.symbol, kind = %event.kind(), error = %e, "Refusing to publish invalid event");
            return None;
        }
        if let Err(e) = self.log.append(&event).await {
            warn!(symbol = %event.symbol, kind = %event.kind(), error = %e, "Event log append failed");
        }
        let delivery = self.bus.publish(&event);
        debug!(
            symbol = %event.symbol,
            kind = %event.kind(),
            window = event.window.as_deref().unwrap_or("-"),
            delivered = delivery.delivered,
            "Event published"
        );
        Some(delivery)
    }
}
