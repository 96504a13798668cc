//! Inventory Reservation Service
//!
//! Temporary holds on available stock. A reservation starts `PENDING` and ends
//! in exactly one terminal state. Every transition reads the reservation row
//! under `SELECT ... FOR UPDATE`, so a hold is released at most once.
//!
//! Lock order is reservation, then item, then location.

use chrono::{DateTime, Duration, Utc};
use metrics::counter;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::entities::inventory_reservation::{self, Entity as InventoryReservationEntity};
use crate::entities::{ReservationStatus, TransactionType};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender, ReleaseReason};
use crate::services::inventory::{
    apply_delta, lock_item, lock_locations_by_availability, location_count, CounterDelta,
};
use crate::services::inventory_transactions::{record, LedgerEntry};

/// One item line of a reservation request.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ReservationLine {
    pub inventory_item_id: Uuid,
    /// Hold in this warehouse; `None` holds against the item as a whole.
    pub warehouse_id: Option<Uuid>,
    pub quantity: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct ReserveInventoryRequest {
    #[validate(length(min = 1, max = 100))]
    pub items: Vec<ReservationLine>,
    pub reference_id: Uuid,
    #[validate(length(min = 1, max = 64))]
    pub reference_type: String,
    /// Minutes until the hold lapses. `0` creates an already expired hold.
    pub expiration_minutes: Option<i64>,
    pub created_by: Option<String>,
}

/// What `ReserveInventory` hands back to the caller.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ReservationReceipt {
    pub reservation_ids: Vec<Uuid>,
    pub reference_id: Uuid,
    pub reference_type: String,
    pub expiration_time: DateTime<Utc>,
}

/// Statistics about reservations.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ReservationStats {
    pub total_reservations: u64,
    pub active_reservations: u64,
    pub expired_not_swept: u64,
    pub expiring_within_24h: u64,
    pub stats_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReservationFilter {
    pub status: Option<ReservationStatus>,
    pub inventory_item_id: Option<Uuid>,
}

/// Moves a locked reservation to `target`, adjusting the counters it holds.
///
/// The caller must have read `reservation` with a row lock in the same
/// transaction. Returns the updated row and the events to publish after
/// commit.
pub(crate) async fn apply_transition<C: ConnectionTrait>(
    conn: &C,
    reservation: inventory_reservation::Model,
    target: ReservationStatus,
    created_by: Option<String>,
) -> Result<(inventory_reservation::Model, Vec<Event>), ServiceError> {
    if !reservation.status.can_transition_to(target) {
        return Err(ServiceError::InvalidTransition {
            reservation_id: reservation.id,
            from: reservation.status,
            to: target,
        });
    }

    let item = lock_item(conn, reservation.inventory_item_id).await?;
    let quantity = reservation.quantity;
    let mut events = Vec::new();

    let (transaction_type, previous_total, new_total, note) = match target {
        ReservationStatus::Confirmed => {
            events.push(Event::ReservationConfirmed {
                reservation_id: reservation.id,
                inventory_item_id: item.id,
            });
            (
                TransactionType::StockRemoval,
                item.total_quantity,
                item.total_quantity,
                "Reservation confirmed",
            )
        }
        ReservationStatus::Fulfilled => {
            let write = apply_delta(
                conn,
                item,
                reservation.warehouse_id,
                CounterDelta::consume(quantity),
            )
            .await?;
            events.push(Event::ReservationFulfilled {
                reservation_id: reservation.id,
                inventory_item_id: write.item.id,
                quantity,
            });
            events.extend(write.low_stock_event());
            (
                TransactionType::StockRemoval,
                write.before.total_quantity,
                write.item.total_quantity,
                "Reservation fulfilled",
            )
        }
        ReservationStatus::Cancelled | ReservationStatus::Expired => {
            let write = apply_delta(
                conn,
                item,
                reservation.warehouse_id,
                CounterDelta::release(quantity),
            )
            .await?;
            let reason = if target == ReservationStatus::Expired {
                ReleaseReason::Expired
            } else {
                ReleaseReason::Cancelled
            };
            events.push(Event::ReservationReleased {
                reservation_id: reservation.id,
                inventory_item_id: write.item.id,
                quantity,
                reason,
            });
            (
                TransactionType::ReservationRelease,
                write.before.total_quantity,
                write.item.total_quantity,
                if reason == ReleaseReason::Expired {
                    "Reservation expired"
                } else {
                    "Reservation cancelled"
                },
            )
        }
        ReservationStatus::Pending => {
            return Err(ServiceError::InvalidTransition {
                reservation_id: reservation.id,
                from: reservation.status,
                to: target,
            })
        }
    };

    record(
        conn,
        LedgerEntry::new(
            reservation.inventory_item_id,
            reservation.warehouse_id,
            transaction_type,
            quantity,
        )
        .totals(previous_total, new_total)
        .reference(
            Some(reservation.reference_id),
            Some(reservation.reference_type.clone()),
        )
        .notes(Some(format!("{} ({})", note, reservation.id)))
        .created_by(created_by),
    )
    .await?;

    let mut active: inventory_reservation::ActiveModel = reservation.into();
    active.status = Set(target);
    let updated = active.update(conn).await.map_err(ServiceError::db_error)?;

    debug!(reservation_id = %updated.id, status = %updated.status, "reservation transitioned");
    Ok((updated, events))
}

async fn insert_hold<C: ConnectionTrait>(
    conn: &C,
    item_id: Uuid,
    warehouse_id: Option<Uuid>,
    quantity: i32,
    request: &ReserveInventoryRequest,
    expiration_time: DateTime<Utc>,
    events: &mut Vec<Event>,
) -> Result<Uuid, ServiceError> {
    let item = lock_item(conn, item_id).await?;
    let write = apply_delta(conn, item, warehouse_id, CounterDelta::hold(quantity)).await?;

    let reservation = inventory_reservation::ActiveModel {
        inventory_item_id: Set(item_id),
        warehouse_id: Set(warehouse_id),
        quantity: Set(quantity),
        status: Set(ReservationStatus::Pending),
        expiration_time: Set(expiration_time),
        reference_id: Set(request.reference_id),
        reference_type: Set(request.reference_type.clone()),
        ..Default::default()
    }
    .insert(conn)
    .await
    .map_err(ServiceError::db_error)?;

    record(
        conn,
        LedgerEntry::new(item_id, warehouse_id, TransactionType::Reservation, quantity)
            .totals(write.before.total_quantity, write.item.total_quantity)
            .reference(
                Some(request.reference_id),
                Some(request.reference_type.clone()),
            )
            .notes(Some(format!("Reservation {}", reservation.id)))
            .created_by(request.created_by.clone()),
    )
    .await?;

    events.push(Event::InventoryReserved {
        reservation_id: reservation.id,
        inventory_item_id: item_id,
        warehouse_id,
        quantity,
        reference_id: request.reference_id,
        reference_type: request.reference_type.clone(),
    });
    events.extend(write.low_stock_event());

    Ok(reservation.id)
}

/// Service for managing inventory reservations.
#[derive(Clone)]
pub struct InventoryReservationService {
    db_pool: Arc<DatabaseConnection>,
    event_sender: EventSender,
    default_expiration_minutes: i64,
}

impl InventoryReservationService {
    pub fn new(
        db_pool: Arc<DatabaseConnection>,
        event_sender: EventSender,
        default_expiration_minutes: i64,
    ) -> Self {
        Self {
            db_pool,
            event_sender,
            default_expiration_minutes,
        }
    }

    /// Places holds for every line, or for none of them.
    ///
    /// Items are locked in ascending id order. A line without a warehouse on an
    /// item tracked per warehouse is split across its locations, largest
    /// available first, producing one reservation per location drawn.
    #[instrument(skip(self, request), fields(reference_id = %request.reference_id, lines = request.items.len()))]
    pub async fn reserve_inventory(
        &self,
        request: ReserveInventoryRequest,
    ) -> Result<ReservationReceipt, ServiceError> {
        request.validate()?;
        if let Some(line) = request.items.iter().find(|line| line.quantity <= 0) {
            return Err(ServiceError::ValidationError(format!(
                "Reservation quantity for item {} must be positive",
                line.inventory_item_id
            )));
        }

        let minutes = request
            .expiration_minutes
            .unwrap_or(self.default_expiration_minutes);
        if minutes < 0 {
            return Err(ServiceError::ValidationError(
                "expiration_minutes must not be negative".to_string(),
            ));
        }
        let expiration_time = Duration::try_minutes(minutes)
            .and_then(|d| Utc::now().checked_add_signed(d))
            .ok_or_else(|| {
                ServiceError::ValidationError("expiration_minutes is too large".to_string())
            })?;

        let db = &*self.db_pool;
        let reference_id = request.reference_id;
        let reference_type = request.reference_type.clone();

        let (reservation_ids, events) = db
            .transaction::<_, (Vec<Uuid>, Vec<Event>), ServiceError>(move |txn| {
                Box::pin(async move {
                    let mut lines = request.items.clone();
                    lines.sort_by_key(|line| line.inventory_item_id);

                    let mut ids = Vec::new();
                    let mut events = Vec::new();

                    for line in lines {
                        let item = lock_item(txn, line.inventory_item_id).await?;
                        if item.is_discontinued() {
                            return Err(ServiceError::InvalidOperation(format!(
                                "Inventory item {} is discontinued",
                                item.id
                            )));
                        }

                        if line.warehouse_id.is_some()
                            || location_count(txn, item.id).await? == 0
                        {
                            ids.push(
                                insert_hold(
                                    txn,
                                    item.id,
                                    line.warehouse_id,
                                    line.quantity,
                                    &request,
                                    expiration_time,
                                    &mut events,
                                )
                                .await?,
                            );
                            continue;
                        }

                        if item.available_quantity < line.quantity {
                            return Err(ServiceError::insufficient(
                                item.id,
                                None,
                                line.quantity,
                                item.available_quantity,
                            ));
                        }

                        let mut remaining = line.quantity;
                        for location in lock_locations_by_availability(txn, item.id).await? {
                            if remaining == 0 {
                                break;
                            }
                            let take = remaining.min(location.available_quantity);
                            if take <= 0 {
                                continue;
                            }
                            ids.push(
                                insert_hold(
                                    txn,
                                    item.id,
                                    Some(location.warehouse_id),
                                    take,
                                    &request,
                                    expiration_time,
                                    &mut events,
                                )
                                .await?,
                            );
                            remaining -= take;
                        }

                        if remaining > 0 {
                            return Err(ServiceError::insufficient(
                                item.id,
                                None,
                                line.quantity,
                                line.quantity - remaining,
                            ));
                        }
                    }

                    Ok((ids, events))
                })
            })
            .await?;

        info!(
            %reference_id,
            %reference_type,
            reservations = reservation_ids.len(),
            %expiration_time,
            "inventory reserved"
        );
        counter!(
            "inventory_ledger.reservations.created",
            reservation_ids.len() as u64
        );
        self.event_sender.publish_all(events).await;

        Ok(ReservationReceipt {
            reservation_ids,
            reference_id,
            reference_type,
            expiration_time,
        })
    }

    /// `PENDING -> CONFIRMED`. Units stay reserved.
    #[instrument(skip(self))]
    pub async fn confirm_reservation(
        &self,
        reservation_id: Uuid,
    ) -> Result<inventory_reservation::Model, ServiceError> {
        self.transition(reservation_id, ReservationStatus::Confirmed)
            .await
    }

    /// `PENDING -> CANCELLED`, returning the held units to available stock.
    #[instrument(skip(self))]
    pub async fn cancel_reservation(
        &self,
        reservation_id: Uuid,
    ) -> Result<inventory_reservation::Model, ServiceError> {
        self.transition(reservation_id, ReservationStatus::Cancelled)
            .await
    }

    /// `PENDING | CONFIRMED -> FULFILLED`, deducting the units from stock.
    #[instrument(skip(self))]
    pub async fn fulfill_reservation(
        &self,
        reservation_id: Uuid,
    ) -> Result<inventory_reservation::Model, ServiceError> {
        self.transition(reservation_id, ReservationStatus::Fulfilled)
            .await
    }

    async fn transition(
        &self,
        reservation_id: Uuid,
        target: ReservationStatus,
    ) -> Result<inventory_reservation::Model, ServiceError> {
        let db = &*self.db_pool;

        let (reservation, events) = db
            .transaction::<_, (inventory_reservation::Model, Vec<Event>), ServiceError>(
                move |txn| {
                    Box::pin(async move {
                        let reservation = InventoryReservationEntity::find_by_id(reservation_id)
                            .lock_exclusive()
                            .one(txn)
                            .await
                            .map_err(ServiceError::db_error)?
                            .ok_or_else(|| {
                                ServiceError::NotFound(format!(
                                    "Reservation {} not found",
                                    reservation_id
                                ))
                            })?;

                        apply_transition(txn, reservation, target, None).await
                    })
                },
            )
            .await?;

        info!(%reservation_id, status = %reservation.status, "reservation updated");
        self.count_transition(target, 1);
        self.event_sender.publish_all(events).await;

        Ok(reservation)
    }

    /// Confirms every pending reservation of a reference.
    #[instrument(skip(self))]
    pub async fn confirm_by_reference(
        &self,
        reference_id: Uuid,
        reference_type: &str,
    ) -> Result<Vec<inventory_reservation::Model>, ServiceError> {
        self.transition_reference(reference_id, reference_type, ReservationStatus::Confirmed)
            .await
    }

    /// Cancels every pending reservation of a reference.
    #[instrument(skip(self))]
    pub async fn cancel_by_reference(
        &self,
        reference_id: Uuid,
        reference_type: &str,
    ) -> Result<Vec<inventory_reservation::Model>, ServiceError> {
        self.transition_reference(reference_id, reference_type, ReservationStatus::Cancelled)
            .await
    }

    /// Fulfills every pending or confirmed reservation of a reference.
    #[instrument(skip(self))]
    pub async fn fulfill_by_reference(
        &self,
        reference_id: Uuid,
        reference_type: &str,
    ) -> Result<Vec<inventory_reservation::Model>, ServiceError> {
        self.transition_reference(reference_id, reference_type, ReservationStatus::Fulfilled)
            .await
    }

    /// Applies `target` to every reservation of the reference that permits it.
    /// Rows that cannot make the transition are left alone; if none can, the
    /// first refusal is returned.
    async fn transition_reference(
        &self,
        reference_id: Uuid,
        reference_type: &str,
        target: ReservationStatus,
    ) -> Result<Vec<inventory_reservation::Model>, ServiceError> {
        let db = &*self.db_pool;
        let reference_type = reference_type.to_string();

        let (updated, events) = db
            .transaction::<_, (Vec<inventory_reservation::Model>, Vec<Event>), ServiceError>(
                move |txn| {
                    Box::pin(async move {
                        let reservations = InventoryReservationEntity::find()
                            .filter(inventory_reservation::Column::ReferenceId.eq(reference_id))
                            .filter(
                                inventory_reservation::Column::ReferenceType
                                    .eq(reference_type.as_str()),
                            )
                            .order_by_asc(inventory_reservation::Column::InventoryItemId)
                            .order_by_asc(inventory_reservation::Column::Id)
                            .lock_exclusive()
                            .all(txn)
                            .await
                            .map_err(ServiceError::db_error)?;

                        let Some(first) = reservations.first() else {
                            return Err(ServiceError::NotFound(format!(
                                "No reservations for {} {}",
                                reference_type, reference_id
                            )));
                        };
                        let refusal = ServiceError::InvalidTransition {
                            reservation_id: first.id,
                            from: first.status,
                            to: target,
                        };

                        let mut updated = Vec::new();
                        let mut events = Vec::new();
                        for reservation in reservations {
                            if !reservation.status.can_transition_to(target) {
                                continue;
                            }
                            let (row, row_events) =
                                apply_transition(txn, reservation, target, None).await?;
                            updated.push(row);
                            events.extend(row_events);
                        }

                        if updated.is_empty() {
                            return Err(refusal);
                        }
                        Ok((updated, events))
                    })
                },
            )
            .await?;

        info!(%reference_id, %target, count = updated.len(), "reference reservations updated");
        self.count_transition(target, updated.len() as u64);
        self.event_sender.publish_all(events).await;

        Ok(updated)
    }

    fn count_transition(&self, target: ReservationStatus, count: u64) {
        match target {
            ReservationStatus::Cancelled | ReservationStatus::Expired => {
                counter!("inventory_ledger.reservations.released", count)
            }
            ReservationStatus::Confirmed => {
                counter!("inventory_ledger.reservations.confirmed", count)
            }
            ReservationStatus::Fulfilled => {
                counter!("inventory_ledger.reservations.fulfilled", count)
            }
            ReservationStatus::Pending => {}
        }
    }

    /// Gets a reservation by ID.
    #[instrument(skip(self))]
    pub async fn get_reservation(
        &self,
        reservation_id: Uuid,
    ) -> Result<inventory_reservation::Model, ServiceError> {
        InventoryReservationEntity::find_by_id(reservation_id)
            .one(&*self.db_pool)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Reservation {} not found", reservation_id)))
    }

    /// Lists reservations with pagination and optional filters, newest first.
    #[instrument(skip(self))]
    pub async fn list_reservations(
        &self,
        filter: &ReservationFilter,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<inventory_reservation::Model>, u64), ServiceError> {
        if page == 0 {
            return Err(ServiceError::ValidationError(
                "Page number must be greater than 0".to_string(),
            ));
        }

        let mut query = InventoryReservationEntity::find();

        if let Some(status) = filter.status {
            query = query.filter(inventory_reservation::Column::Status.eq(status));
        }

        if let Some(item_id) = filter.inventory_item_id {
            query = query.filter(inventory_reservation::Column::InventoryItemId.eq(item_id));
        }

        let paginator = query
            .order_by_desc(inventory_reservation::Column::CreatedAt)
            .order_by_desc(inventory_reservation::Column::Id)
            .paginate(&*self.db_pool, limit.max(1));

        let total = paginator.num_items().await.map_err(ServiceError::db_error)?;
        let rows = paginator
            .fetch_page(page - 1)
            .await
            .map_err(ServiceError::db_error)?;

        Ok((rows, total))
    }

    /// Lists reservations for a specific reference (e.g., order).
    #[instrument(skip(self))]
    pub async fn list_reservations_by_reference(
        &self,
        reference_id: Uuid,
        reference_type: &str,
    ) -> Result<Vec<inventory_reservation::Model>, ServiceError> {
        InventoryReservationEntity::find()
            .filter(inventory_reservation::Column::ReferenceId.eq(reference_id))
            .filter(inventory_reservation::Column::ReferenceType.eq(reference_type))
            .order_by_asc(inventory_reservation::Column::CreatedAt)
            .all(&*self.db_pool)
            .await
            .map_err(ServiceError::db_error)
    }

    /// Gets statistics about reservations.
    #[instrument(skip(self))]
    pub async fn get_reservation_stats(&self) -> Result<ReservationStats, ServiceError> {
        let db = &*self.db_pool;
        let now = Utc::now();

        let total = InventoryReservationEntity::find()
            .count(db)
            .await
            .map_err(ServiceError::db_error)?;

        let active = InventoryReservationEntity::find()
            .filter(inventory_reservation::Column::Status.is_in(ReservationStatus::HOLDING))
            .count(db)
            .await
            .map_err(ServiceError::db_error)?;

        let expired_not_swept = InventoryReservationEntity::find()
            .filter(inventory_reservation::Column::Status.eq(ReservationStatus::Pending))
            .filter(inventory_reservation::Column::ExpirationTime.lt(now))
            .count(db)
            .await
            .map_err(ServiceError::db_error)?;

        let expiring_soon = InventoryReservationEntity::find()
            .filter(inventory_reservation::Column::Status.eq(ReservationStatus::Pending))
            .filter(inventory_reservation::Column::ExpirationTime.gte(now))
            .filter(inventory_reservation::Column::ExpirationTime.lt(now + Duration::hours(24)))
            .count(db)
            .await
            .map_err(ServiceError::db_error)?;

        Ok(ReservationStats {
            total_reservations: total,
            active_reservations: active,
            expired_not_swept,
            expiring_within_24h: expiring_soon,
            stats_at: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn receipt_serializes_ids_and_reference() {
        let receipt = ReservationReceipt {
            reservation_ids: vec![Uuid::nil()],
            reference_id: Uuid::nil(),
            reference_type: "ORDER".into(),
            expiration_time: Utc::now(),
        };
        let json = serde_json::to_value(&receipt).unwrap();
        assert_eq!(json["reference_type"], "ORDER");
        assert_eq!(json["reservation_ids"].as_array().map(Vec::len), Some(1));
    }

    #[test]
    fn request_requires_lines_and_reference_type() {
        let request = ReserveInventoryRequest {
            items: vec![],
            reference_id: Uuid::new_v4(),
            reference_type: String::new(),
            expiration_minutes: None,
            created_by: None,
        };
        let errors = request.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("items"));
        assert!(errors.field_errors().contains_key("reference_type"));
    }
}
