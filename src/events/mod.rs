use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::entities::{InventoryStatus, TransactionType};

/// Why a hold went back to available stock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ReleaseReason {
    Cancelled,
    Expired,
}

/// Domain events, emitted only after the ledger write has committed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    InventoryItemCreated {
        inventory_item_id: Uuid,
        product_id: Uuid,
        sku: String,
        initial_quantity: i32,
    },
    InventoryAdjusted {
        inventory_item_id: Uuid,
        warehouse_id: Option<Uuid>,
        transaction_type: TransactionType,
        quantity: i32,
        previous_total: i32,
        new_total: i32,
        reference_id: Option<Uuid>,
    },
    InventoryReserved {
        reservation_id: Uuid,
        inventory_item_id: Uuid,
        warehouse_id: Option<Uuid>,
        quantity: i32,
        reference_id: Uuid,
        reference_type: String,
    },
    ReservationConfirmed {
        reservation_id: Uuid,
        inventory_item_id: Uuid,
    },
    ReservationFulfilled {
        reservation_id: Uuid,
        inventory_item_id: Uuid,
        quantity: i32,
    },
    ReservationReleased {
        reservation_id: Uuid,
        inventory_item_id: Uuid,
        quantity: i32,
        reason: ReleaseReason,
    },
    LowStockDetected {
        inventory_item_id: Uuid,
        sku: String,
        available_quantity: i32,
        reorder_point: i32,
        status: InventoryStatus,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Creates a sender together with the receiving end for [`process_events`].
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Publishes post-commit events. The write already happened, so a closed
    /// channel is logged and otherwise ignored.
    pub async fn publish_all(&self, events: Vec<Event>) {
        for event in events {
            if let Err(e) = self.send(event).await {
                warn!(error = %e, "dropping domain event");
            }
        }
    }
}

/// Drains the event channel until every sender is dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::LowStockDetected {
                inventory_item_id,
                sku,
                available_quantity,
                reorder_point,
                ..
            } => {
                warn!(
                    %inventory_item_id,
                    %sku,
                    available_quantity,
                    reorder_point,
                    "inventory item dropped to reorder point"
                );
            }
            Event::ReservationReleased {
                reservation_id,
                quantity,
                reason,
                ..
            } => {
                info!(%reservation_id, quantity, %reason, "reservation released");
            }
            other => info!(event = ?other, "domain event"),
        }
    }

    info!("Event processing loop finished");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_all_survives_closed_channel() {
        let (sender, rx) = EventSender::channel(4);
        drop(rx);
        sender
            .publish_all(vec![Event::ReservationConfirmed {
                reservation_id: Uuid::new_v4(),
                inventory_item_id: Uuid::new_v4(),
            }])
            .await;
    }

    #[tokio::test]
    async fn events_arrive_in_order() {
        let (sender, mut rx) = EventSender::channel(4);
        let item = Uuid::new_v4();
        let first = Event::ReservationConfirmed {
            reservation_id: Uuid::new_v4(),
            inventory_item_id: item,
        };
        let second = Event::ReservationReleased {
            reservation_id: Uuid::new_v4(),
            inventory_item_id: item,
            quantity: 3,
            reason: ReleaseReason::Expired,
        };
        sender
            .publish_all(vec![first.clone(), second.clone()])
            .await;

        assert_eq!(rx.recv().await, Some(first));
        assert_eq!(rx.recv().await, Some(second));
    }

    #[test]
    fn release_reason_serializes_screaming_case() {
        assert_eq!(
            serde_json::to_string(&ReleaseReason::Expired).unwrap(),
            "\"EXPIRED\""
        );
        assert_eq!(ReleaseReason::Cancelled.to_string(), "CANCELLED");
    }
}
