//! Pump Event Bus
//!
//! Typed pub/sub notifications raised after inbound responses mutate pump
//! state. Delivery is fire-and-forget over a tokio broadcast channel: every
//! subscriber gets its own receiver, and a slow or dropped subscriber never
//! blocks delivery to the others.

use tokio::sync::broadcast;
use tracing::debug;

use crate::types::PumpStatus;

/// Default event channel capacity
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Notification raised by the core after a pump/nozzle field changed
#[derive(Debug, Clone, PartialEq)]
pub enum PumpEvent {
    /// Taken-up nozzle changed (0 = hung up)
    NozzleChanged { pump_id: u16, nozzle_id: u8 },
    /// Operating state changed
    StatusChanged { pump_id: u16, status: PumpStatus },
    /// Lifetime totals arrived for one nozzle
    TotalsUpdated { pump_id: u16, nozzle_id: u8 },
    /// Price list read back from the dispenser
    PricesReceived { pump_id: u16 },
    /// Transaction finished on the dispenser side
    TransactionFinished {
        pump_id: u16,
        transaction_id: u32,
        amount: f64,
        volume: u32,
    },
    /// Nozzle ID tag read back
    TagReceived {
        pump_id: u16,
        nozzle_id: u8,
        code: String,
    },
}

impl PumpEvent {
    /// Pump the event belongs to
    pub fn pump_id(&self) -> u16 {
        match self {
            PumpEvent::NozzleChanged { pump_id, .. }
            | PumpEvent::StatusChanged { pump_id, .. }
            | PumpEvent::TotalsUpdated { pump_id, .. }
            | PumpEvent::PricesReceived { pump_id }
            | PumpEvent::TransactionFinished { pump_id, .. }
            | PumpEvent::TagReceived { pump_id, .. } => *pump_id,
        }
    }

    /// Event kind as a static label, for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            PumpEvent::NozzleChanged { .. } => "NozzleChanged",
            PumpEvent::StatusChanged { .. } => "StatusChanged",
            PumpEvent::TotalsUpdated { .. } => "TotalsUpdated",
            PumpEvent::PricesReceived { .. } => "PricesReceived",
            PumpEvent::TransactionFinished { .. } => "TransactionFinished",
            PumpEvent::TagReceived { .. } => "TagReceived",
        }
    }
}

/// Central event bus for pump notifications
pub struct EventBus {
    tx: broadcast::Sender<PumpEvent>,
}

impl EventBus {
    /// Create a new event bus with the given capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Emit an event to all subscribers
    ///
    /// Fire-and-forget: with no subscribers the event is dropped, and a full
    /// receiver drops its oldest events rather than stalling the sender.
    pub fn emit(&self, event: PumpEvent) {
        debug!(
            event_type = event.event_type(),
            pump_id = event.pump_id(),
            "emit"
        );
        let _ = self.tx.send(event);
    }

    /// Subscribe to events emitted after this call
    pub fn subscribe(&self) -> broadcast::Receiver<PumpEvent> {
        self.tx.subscribe()
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_emit_and_receive() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        bus.emit(PumpEvent::StatusChanged {
            pump_id: 1,
            status: PumpStatus::Filling,
        });

        let event = rx.recv().await.unwrap();
        assert_eq!(event.pump_id(), 1);
        assert_eq!(event.event_type(), "StatusChanged");
    }

    #[test]
    fn test_emit_without_subscribers_is_ok() {
        let bus = EventBus::new(8);
        bus.emit(PumpEvent::PricesReceived { pump_id: 3 });
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_all_subscribers_receive() {
        let bus = EventBus::default();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.emit(PumpEvent::NozzleChanged {
            pump_id: 2,
            nozzle_id: 1,
        });

        assert_eq!(rx1.recv().await.unwrap().pump_id(), 2);
        assert_eq!(rx2.recv().await.unwrap().pump_id(), 2);
    }

    #[tokio::test]
    async fn test_dropped_subscriber_does_not_block_delivery() {
        let bus = EventBus::default();
        let rx_dead = bus.subscribe();
        let mut rx_live = bus.subscribe();
        drop(rx_dead);

        bus.emit(PumpEvent::TagReceived {
            pump_id: 4,
            nozzle_id: 2,
            code: "A1B2".to_string(),
        });

        let event = rx_live.recv().await.unwrap();
        assert_eq!(event.event_type(), "TagReceived");
    }
}
